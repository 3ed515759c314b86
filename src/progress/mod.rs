//! Session progress and cooldown gating.
//!
//! A [`SessionProgress`] record exists per [`Identity`] and answers two
//! questions: which catalog tasks are done in the current session, and when
//! the last full-session completion happened. The cooldown window is never
//! stored; it is derived from `last_completion_time` on every query.
//!
//! # Lifecycle
//!
//! ```text
//! load ──► complete_task* ──► (catalog covered) ──► mark_session_complete
//!   ▲                                                      │
//!   │                                              cooldown (30 min)
//!   └──────────────── reset_cooldown / self-heal ◄─────────┘
//! ```
//!
//! All mutations go through [`ProgressTracker`], which persists each new
//! record before handing it back.

pub mod tracker;

pub use tracker::{ProgressTracker, STORAGE_KEY};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of the lockout after a completed session, in seconds.
pub const COOLDOWN_SECS: i64 = 30 * 60;

/// Cooldown length as a duration.
#[must_use]
pub fn cooldown_duration() -> Duration {
    Duration::seconds(COOLDOWN_SECS)
}

/// Identifier of a catalog task (`"opera"`, `"video"`, ...).
pub type TaskId = String;

/// Stable user key issued by the identity provider.
///
/// Treated as an opaque lookup key: never generated, parsed or validated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wrap a provider-issued id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Per-identity task progress.
///
/// Field names on the wire match the blob layout used by earlier clients
/// (`discordId`, `completedTasks`, epoch-millisecond `lastCompletionTime`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProgress {
    #[serde(rename = "discordId")]
    identity: Identity,
    #[serde(default)]
    completed_tasks: Vec<TaskId>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    last_completion_time: Option<DateTime<Utc>>,
    #[serde(default)]
    tasks_completed_this_session: Vec<TaskId>,
}

impl SessionProgress {
    /// Fresh record: nothing completed, never on cooldown.
    #[must_use]
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            completed_tasks: Vec::new(),
            last_completion_time: None,
            tasks_completed_this_session: Vec::new(),
        }
    }

    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Every task ever completed, across all sessions.
    #[must_use]
    pub fn completed_tasks(&self) -> &[TaskId] {
        &self.completed_tasks
    }

    #[must_use]
    pub fn last_completion_time(&self) -> Option<DateTime<Utc>> {
        self.last_completion_time
    }

    /// Tasks completed since the last cooldown reset.
    #[must_use]
    pub fn tasks_completed_this_session(&self) -> &[TaskId] {
        &self.tasks_completed_this_session
    }

    /// Whether `task_id` is done in the current session.
    #[must_use]
    pub fn has_completed(&self, task_id: &str) -> bool {
        self.tasks_completed_this_session
            .iter()
            .any(|id| id == task_id)
    }

    /// End of the current cooldown window, if a completion was ever recorded.
    #[must_use]
    pub fn cooldown_end(&self) -> Option<DateTime<Utc>> {
        self.last_completion_time.map(|t| t + cooldown_duration())
    }

    /// `now < last_completion_time + 30 min`.
    #[must_use]
    pub fn is_on_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_end().is_some_and(|end| now < end)
    }

    /// Time left on the cooldown, `None` when not on cooldown.
    #[must_use]
    pub fn cooldown_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.cooldown_end()
            .filter(|end| now < *end)
            .map(|end| end - now)
    }
}

/// Render a remaining duration as `MM:SS` (or `H:MM:SS` past an hour).
#[must_use]
pub fn format_countdown(remaining: Duration) -> String {
    let total = remaining.num_seconds().max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_new_progress_is_empty() {
        let progress = SessionProgress::new(Identity::new("42"));
        assert_eq!(progress.identity().as_str(), "42");
        assert!(progress.completed_tasks().is_empty());
        assert!(progress.tasks_completed_this_session().is_empty());
        assert!(progress.last_completion_time().is_none());
        assert!(!progress.is_on_cooldown(at(0)));
    }

    #[test]
    fn test_cooldown_boundary_is_exclusive() {
        let mut progress = SessionProgress::new(Identity::new("42"));
        progress.last_completion_time = Some(at(0));

        assert!(progress.is_on_cooldown(at(0)));
        assert!(progress.is_on_cooldown(at(COOLDOWN_SECS - 1)));
        assert!(!progress.is_on_cooldown(at(COOLDOWN_SECS)));
        assert!(!progress.is_on_cooldown(at(COOLDOWN_SECS + 3600)));
    }

    #[test]
    fn test_cooldown_remaining() {
        let mut progress = SessionProgress::new(Identity::new("42"));
        assert!(progress.cooldown_remaining(at(0)).is_none());

        progress.last_completion_time = Some(at(0));
        assert_eq!(
            progress.cooldown_remaining(at(60)),
            Some(Duration::seconds(COOLDOWN_SECS - 60))
        );
        assert!(progress.cooldown_remaining(at(COOLDOWN_SECS)).is_none());
    }

    #[test]
    fn test_wire_format_uses_legacy_field_names() {
        let mut progress = SessionProgress::new(Identity::new("1234"));
        progress.last_completion_time = Some(Utc.timestamp_millis_opt(1_700_000_000_123).unwrap());
        progress.tasks_completed_this_session.push("opera".into());

        let json = serde_json::to_value(&progress).unwrap();
        assert_eq!(json["discordId"], "1234");
        assert_eq!(json["lastCompletionTime"], 1_700_000_000_123_i64);
        assert_eq!(json["tasksCompletedThisSession"][0], "opera");
        assert!(json["completedTasks"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_reads_null_completion_time() {
        let json = r#"{"discordId":"9","completedTasks":[],"lastCompletionTime":null,"tasksCompletedThisSession":["video"]}"#;
        let progress: SessionProgress = serde_json::from_str(json).unwrap();
        assert!(progress.last_completion_time().is_none());
        assert!(progress.has_completed("video"));
        assert!(!progress.has_completed("opera"));
    }

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(Duration::seconds(0)), "00:00");
        assert_eq!(format_countdown(Duration::seconds(29 * 60 + 5)), "29:05");
        assert_eq!(format_countdown(Duration::seconds(3600 + 61)), "1:01:01");
        assert_eq!(format_countdown(Duration::seconds(-4)), "00:00");
    }
}
