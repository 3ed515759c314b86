//! Static task catalog.

use serde::{Deserialize, Serialize};

use crate::progress::TaskId;

/// One externally performed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    /// Destination opened in a new browsing context when the task starts.
    pub action_url: String,
    /// Seconds the opened destination must stay open before verification.
    pub required_dwell_secs: u32,
}

impl TaskDefinition {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        action_url: impl Into<String>,
        required_dwell_secs: u32,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            action_url: action_url.into(),
            required_dwell_secs,
        }
    }
}

/// Ordered, fixed set of tasks that make up one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCatalog {
    tasks: Vec<TaskDefinition>,
}

impl TaskCatalog {
    /// Build a catalog from explicit definitions.
    #[must_use]
    pub fn new(tasks: Vec<TaskDefinition>) -> Self {
        Self { tasks }
    }

    /// The three tasks every session consists of.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(vec![
            TaskDefinition::new(
                "opera",
                "Download Opera Browser",
                "Visit the Opera download page and install the browser",
                "https://www.opera.com/download",
                10,
            ),
            TaskDefinition::new(
                "extension",
                "Install Extension",
                "Add our browser extension to enhance your experience",
                "https://chrome.google.com/webstore",
                8,
            ),
            TaskDefinition::new(
                "video",
                "Watch Video",
                "Watch our short introduction video",
                "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
                15,
            ),
        ])
    }

    #[must_use]
    pub fn tasks(&self) -> &[TaskDefinition] {
        &self.tasks
    }

    #[must_use]
    pub fn ids(&self) -> Vec<TaskId> {
        self.tasks.iter().map(|t| t.id.clone()).collect()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&TaskDefinition> {
        self.tasks.iter().find(|t| t.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Default for TaskCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog() {
        let catalog = TaskCatalog::standard();
        assert_eq!(catalog.ids(), ["opera", "extension", "video"]);
        assert_eq!(catalog.get("opera").unwrap().required_dwell_secs, 10);
        assert_eq!(catalog.get("extension").unwrap().required_dwell_secs, 8);
        assert_eq!(catalog.get("video").unwrap().required_dwell_secs, 15);
        assert!(catalog.get("missing").is_none());
    }
}
