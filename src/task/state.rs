//! Task runtime states.
//!
//! A single tagged enum replaces the loose `started` / `window open` /
//! `verifying` / `active time` flags, so combinations such as "verifying but
//! never started" cannot be represented.

use std::fmt;

use crate::launcher::ContextHandle;
use crate::progress::TaskId;

// ============================================================================
// Task State
// ============================================================================

/// Where a task is in its verification lifecycle.
///
/// # State Transitions
///
/// - `NotStarted` -> `ExternalWindowOpened`: destination opened
/// - `ExternalWindowOpened` -> `AccumulatingDwell`: first live tick
/// - `ExternalWindowOpened` / `AccumulatingDwell` -> `WindowClosedPaused`: context closed
/// - `WindowClosedPaused` -> `AccumulatingDwell`: reopened, dwell carried over
/// - `ExternalWindowOpened` / `AccumulatingDwell` -> `Eligible`: dwell threshold reached
/// - `Eligible` -> `Verifying`: user asked to verify
/// - `Verifying` -> `Completed`: confirmation countdown elapsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskState {
    /// Nothing opened yet
    #[default]
    NotStarted,
    /// Destination opened, no dwell counted yet
    ExternalWindowOpened { context: ContextHandle },
    /// Destination live, dwell counting
    AccumulatingDwell {
        context: ContextHandle,
        dwell_secs: u32,
    },
    /// Destination was closed before the threshold
    WindowClosedPaused { dwell_secs: u32 },
    /// Threshold reached, waiting for the user to verify
    Eligible { dwell_secs: u32 },
    /// Confirmation countdown running
    Verifying { remaining_secs: u32 },
    /// Done for this session
    Completed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::NotStarted => write!(f, "Not Started"),
            TaskState::ExternalWindowOpened { .. } => write!(f, "Opened"),
            TaskState::AccumulatingDwell { dwell_secs, .. } => {
                write!(f, "In Progress ({dwell_secs}s)")
            }
            TaskState::WindowClosedPaused { dwell_secs } => {
                write!(f, "Paused at {dwell_secs}s - reopen to continue")
            }
            TaskState::Eligible { .. } => write!(f, "Ready to Verify"),
            TaskState::Verifying { remaining_secs } => write!(f, "Verifying... {remaining_secs}s"),
            TaskState::Completed => write!(f, "Completed"),
        }
    }
}

impl TaskState {
    /// Dwell seconds counted so far.
    #[must_use]
    pub fn dwell_secs(&self) -> u32 {
        match self {
            TaskState::AccumulatingDwell { dwell_secs, .. }
            | TaskState::WindowClosedPaused { dwell_secs }
            | TaskState::Eligible { dwell_secs } => *dwell_secs,
            _ => 0,
        }
    }

    /// Handle of the live browsing context, if one is being watched.
    #[must_use]
    pub fn context(&self) -> Option<ContextHandle> {
        match self {
            TaskState::ExternalWindowOpened { context }
            | TaskState::AccumulatingDwell { context, .. } => Some(*context),
            _ => None,
        }
    }

    /// Whether dwell is currently being counted.
    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.context().is_some()
    }

    /// Whether this state needs a 1-second tick.
    #[must_use]
    pub fn needs_tick(&self) -> bool {
        self.is_watching() || matches!(self, TaskState::Verifying { .. })
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed)
    }
}

// ============================================================================
// Task Events
// ============================================================================

/// Notable transitions reported to the orchestration layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// Dwell threshold reached
    Eligible(TaskId),
    /// Opened context was closed; dwell paused
    Paused(TaskId),
    /// Verification countdown elapsed
    Completed(TaskId),
}

impl TaskEvent {
    #[must_use]
    pub fn task_id(&self) -> &str {
        match self {
            TaskEvent::Eligible(id) | TaskEvent::Paused(id) | TaskEvent::Completed(id) => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(TaskState::NotStarted.to_string(), "Not Started");
        assert_eq!(
            TaskState::WindowClosedPaused { dwell_secs: 4 }.to_string(),
            "Paused at 4s - reopen to continue"
        );
        assert_eq!(
            TaskState::Verifying { remaining_secs: 2 }.to_string(),
            "Verifying... 2s"
        );
    }

    #[test]
    fn test_tick_needs() {
        let context = ContextHandle::new(1);
        assert!(!TaskState::NotStarted.needs_tick());
        assert!(TaskState::ExternalWindowOpened { context }.needs_tick());
        assert!(TaskState::AccumulatingDwell { context, dwell_secs: 3 }.needs_tick());
        assert!(!TaskState::WindowClosedPaused { dwell_secs: 3 }.needs_tick());
        assert!(!TaskState::Eligible { dwell_secs: 10 }.needs_tick());
        assert!(TaskState::Verifying { remaining_secs: 3 }.needs_tick());
        assert!(!TaskState::Completed.needs_tick());
    }

    #[test]
    fn test_dwell_secs() {
        assert_eq!(TaskState::WindowClosedPaused { dwell_secs: 4 }.dwell_secs(), 4);
        assert_eq!(TaskState::Completed.dwell_secs(), 0);
    }
}
