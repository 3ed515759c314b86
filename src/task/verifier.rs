//! Per-task verification state machine.
//!
//! The machine itself holds no timers. Its owner calls [`TaskVerifier::tick`]
//! once per second while [`TaskState::needs_tick`] is true and
//! [`TaskVerifier::poll_liveness`] every 500ms while a context is watched.

use tracing::{debug, info};

use super::catalog::TaskDefinition;
use super::state::{TaskEvent, TaskState};
use super::VERIFICATION_COUNTDOWN_SECS;
use crate::testing::ContextLauncher;

/// Drives one catalog task from `NotStarted` to `Completed`.
#[derive(Debug, Clone)]
pub struct TaskVerifier {
    definition: TaskDefinition,
    state: TaskState,
}

impl TaskVerifier {
    pub fn new(definition: TaskDefinition) -> Self {
        Self {
            definition,
            state: TaskState::NotStarted,
        }
    }

    /// A verifier for a task whose completion was already recorded.
    pub fn completed(definition: TaskDefinition) -> Self {
        Self {
            definition,
            state: TaskState::Completed,
        }
    }

    #[must_use]
    pub fn definition(&self) -> &TaskDefinition {
        &self.definition
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.definition.id
    }

    #[must_use]
    pub fn state(&self) -> TaskState {
        self.state
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state.is_terminal()
    }

    /// Seconds of dwell still needed. Presentational only.
    #[must_use]
    pub fn remaining_dwell_secs(&self) -> u32 {
        match self.state {
            TaskState::Eligible { .. } | TaskState::Verifying { .. } | TaskState::Completed => 0,
            other => self
                .definition
                .required_dwell_secs
                .saturating_sub(other.dwell_secs()),
        }
    }

    /// Open the task destination and begin counting dwell.
    ///
    /// Allowed from `NotStarted`, and from `WindowClosedPaused` to reopen
    /// (accumulated dwell is kept). Refused when the session is disabled. A
    /// failed open leaves the state untouched. Returns whether the state
    /// changed.
    pub fn start(&mut self, launcher: &mut dyn ContextLauncher, session_disabled: bool) -> bool {
        if session_disabled {
            debug!("Task {} not started: session disabled", self.id());
            return false;
        }
        let carried = match self.state {
            TaskState::NotStarted => 0,
            TaskState::WindowClosedPaused { dwell_secs } => dwell_secs,
            _ => return false,
        };

        let Some(context) = launcher.open(&self.definition.action_url) else {
            info!("Could not open {} for task {}", self.definition.action_url, self.id());
            return false;
        };

        self.state = if carried >= self.definition.required_dwell_secs {
            launcher.release(context);
            TaskState::Eligible {
                dwell_secs: carried,
            }
        } else if carried > 0 {
            TaskState::AccumulatingDwell {
                context,
                dwell_secs: carried,
            }
        } else {
            TaskState::ExternalWindowOpened { context }
        };
        debug!("Task {} -> {}", self.id(), self.state);
        true
    }

    /// Advance one second.
    ///
    /// While watching, adds a second of dwell if the context is still live
    /// (pausing otherwise). While verifying, counts the confirmation down.
    pub fn tick(&mut self, launcher: &mut dyn ContextLauncher) -> Option<TaskEvent> {
        match self.state {
            TaskState::ExternalWindowOpened { context }
            | TaskState::AccumulatingDwell { context, .. } => {
                if !launcher.is_live(context) {
                    return self.pause();
                }
                let dwell_secs = self.state.dwell_secs() + 1;
                if dwell_secs >= self.definition.required_dwell_secs {
                    launcher.release(context);
                    self.state = TaskState::Eligible { dwell_secs };
                    info!("Task {} eligible for verification", self.id());
                    return Some(TaskEvent::Eligible(self.definition.id.clone()));
                }
                self.state = TaskState::AccumulatingDwell {
                    context,
                    dwell_secs,
                };
                None
            }
            TaskState::Verifying { remaining_secs } => {
                let remaining_secs = remaining_secs.saturating_sub(1);
                if remaining_secs == 0 {
                    self.state = TaskState::Completed;
                    info!("Task {} completed", self.id());
                    return Some(TaskEvent::Completed(self.definition.id.clone()));
                }
                self.state = TaskState::Verifying { remaining_secs };
                None
            }
            _ => None,
        }
    }

    /// Check whether the watched context has been closed.
    pub fn poll_liveness(&mut self, launcher: &mut dyn ContextLauncher) -> Option<TaskEvent> {
        let context = self.state.context()?;
        if launcher.is_live(context) {
            None
        } else {
            self.pause()
        }
    }

    /// Begin the confirmation countdown. Only valid from `Eligible`; a no-op
    /// everywhere else. Returns whether the countdown started.
    pub fn verify(&mut self) -> bool {
        if !matches!(self.state, TaskState::Eligible { .. }) {
            debug!("Ignoring verify for task {} in state {}", self.id(), self.state);
            return false;
        }
        self.state = TaskState::Verifying {
            remaining_secs: VERIFICATION_COUNTDOWN_SECS,
        };
        true
    }

    /// Forget all runtime progress, e.g. after a cooldown ends. A context
    /// still being watched is handed back to the launcher.
    pub fn reset(&mut self, launcher: &mut dyn ContextLauncher) {
        if let Some(context) = self.state.context() {
            launcher.release(context);
        }
        self.state = TaskState::NotStarted;
    }

    fn pause(&mut self) -> Option<TaskEvent> {
        let dwell_secs = self.state.dwell_secs();
        self.state = TaskState::WindowClosedPaused { dwell_secs };
        info!("Task {} paused at {}s: window closed", self.id(), dwell_secs);
        Some(TaskEvent::Paused(self.definition.id.clone()))
    }
}
