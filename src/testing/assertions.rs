//! Custom assertions for domain-specific testing.

use crate::controller::{Notification, NotificationLevel};
use crate::task::{TaskState, TaskVerifier};

/// Assert that a task is in the `Completed` state.
///
/// # Panics
///
/// Panics with the actual state if the task isn't completed.
pub fn assert_task_completed(task: &TaskVerifier) {
    assert!(
        task.is_completed(),
        "Expected task '{}' to be completed, but it is {}",
        task.id(),
        task.state()
    );
}

/// Assert that a task is in exactly `expected`.
///
/// # Panics
///
/// Panics if the states differ.
pub fn assert_task_state(task: &TaskVerifier, expected: TaskState) {
    assert_eq!(
        task.state(),
        expected,
        "Task '{}' is in {} but {} was expected",
        task.id(),
        task.state(),
        expected
    );
}

/// Assert that at least one notification of `level` has a title containing
/// `needle`.
///
/// # Panics
///
/// Panics listing the notifications that were seen.
pub fn assert_notified(notifications: &[Notification], level: NotificationLevel, needle: &str) {
    assert!(
        notifications
            .iter()
            .any(|n| n.level == level && n.title.contains(needle)),
        "Expected a {level:?} notification containing '{needle}', got: {:?}",
        notifications
            .iter()
            .map(|n| format!("{:?}: {}", n.level, n.title))
            .collect::<Vec<_>>()
    );
}
