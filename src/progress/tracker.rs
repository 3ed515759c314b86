//! The session progress tracker.
//!
//! Owns reads and writes of [`SessionProgress`] records. All records live in
//! one blob under [`STORAGE_KEY`], a JSON object keyed by identity. Writes
//! are assumed to succeed; a failed write is logged and the in-memory record
//! is still returned so the session keeps working.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{Identity, SessionProgress, TaskId};
use crate::error::{Result, TaskgateError};
use crate::task::TaskCatalog;
use crate::testing::{Clock, KeyValueStore};

/// Well-known key holding every identity's progress.
pub const STORAGE_KEY: &str = "user_progress";

/// Single source of truth for session-scoped completion and cooldown state.
///
/// # Example
///
/// ```rust,ignore
/// use taskgate::progress::{Identity, ProgressTracker};
/// use taskgate::task::TaskCatalog;
/// use taskgate::testing::{MemoryKeyValueStore, MockClock};
///
/// let tracker = ProgressTracker::new(MemoryKeyValueStore::new(), MockClock::new(), &TaskCatalog::standard());
/// let progress = tracker.load(&Identity::new("42"));
/// let progress = tracker.complete_task(Some(&progress), "opera").unwrap();
/// assert!(progress.has_completed("opera"));
/// ```
#[derive(Debug)]
pub struct ProgressTracker<S, C> {
    store: S,
    clock: C,
    catalog: Vec<TaskId>,
}

impl<S: KeyValueStore, C: Clock> ProgressTracker<S, C> {
    /// Create a tracker over `store` for the ids in `catalog`.
    pub fn new(store: S, clock: C, catalog: &TaskCatalog) -> Self {
        Self {
            store,
            clock,
            catalog: catalog.ids(),
        }
    }

    /// Load the record for `identity`, creating and persisting an empty one
    /// if none exists.
    ///
    /// A record whose cooldown has already elapsed but still lists session
    /// tasks is reset and persisted on the spot; the record may be read long
    /// after the cooldown actually ran out.
    pub fn load(&self, identity: &Identity) -> SessionProgress {
        let stored = self
            .read_all()
            .remove(identity.as_str())
            .and_then(|value| match decode_record(identity, value) {
                Ok(progress) => Some(progress),
                Err(e) => {
                    warn!("{}. Starting fresh.", e);
                    None
                }
            });

        let Some(mut progress) = stored else {
            debug!("No progress stored for {}, creating", identity);
            let progress = SessionProgress::new(identity.clone());
            self.persist(&progress);
            return progress;
        };

        // Records written by hand or by older clients may carry the wrong key
        // or ids outside the catalog.
        progress.identity = identity.clone();
        let mut dirty = self.sanitize(&mut progress);

        let now = self.clock.now();
        if progress.last_completion_time.is_some()
            && !progress.is_on_cooldown(now)
            && !progress.tasks_completed_this_session.is_empty()
        {
            info!("Cooldown for {} expired while away, resetting session", identity);
            progress.tasks_completed_this_session.clear();
            dirty = true;
        }

        if dirty {
            self.persist(&progress);
        }
        progress
    }

    /// Whether `progress` is inside its cooldown window at `now`.
    #[must_use]
    pub fn is_on_cooldown(progress: &SessionProgress, now: DateTime<Utc>) -> bool {
        progress.is_on_cooldown(now)
    }

    /// Record `task_id` as done this session.
    ///
    /// Returns `None` when no progress is loaded. Duplicate or unknown ids
    /// are no-ops and hand back the record unchanged.
    pub fn complete_task(
        &self,
        progress: Option<&SessionProgress>,
        task_id: &str,
    ) -> Option<SessionProgress> {
        let progress = progress?;
        if progress.has_completed(task_id) {
            debug!("Task {} already completed this session", task_id);
            return Some(progress.clone());
        }
        if !self.catalog.iter().any(|id| id == task_id) {
            warn!("Ignoring completion of unknown task {}", task_id);
            return Some(progress.clone());
        }

        let mut updated = progress.clone();
        updated.tasks_completed_this_session.push(task_id.to_string());
        self.persist(&updated);
        Some(updated)
    }

    /// Whether every catalog task is present in the session list.
    #[must_use]
    pub fn covers_catalog(&self, progress: &SessionProgress) -> bool {
        self.catalog.iter().all(|id| progress.has_completed(id))
    }

    /// Close out the session: fold the session tasks into history, stamp the
    /// completion time (starting the cooldown) and clear the session list.
    pub fn mark_session_complete(
        &self,
        progress: &SessionProgress,
        now: DateTime<Utc>,
    ) -> SessionProgress {
        let mut updated = progress.clone();
        for id in std::mem::take(&mut updated.tasks_completed_this_session) {
            if !updated.completed_tasks.contains(&id) {
                updated.completed_tasks.push(id);
            }
        }
        updated.last_completion_time = Some(now);
        self.persist(&updated);
        info!(
            "Session complete for {}, cooldown until {}",
            updated.identity,
            now + super::cooldown_duration()
        );
        updated
    }

    /// Clear the session list once a running cooldown timer hits zero.
    ///
    /// `last_completion_time` is kept; the cooldown check is already false
    /// by then, this only refreshes dependent state immediately.
    pub fn reset_cooldown(&self, progress: &SessionProgress) -> SessionProgress {
        let mut updated = progress.clone();
        updated.tasks_completed_this_session.clear();
        self.persist(&updated);
        updated
    }

    /// Access the clock this tracker reads.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    fn sanitize(&self, progress: &mut SessionProgress) -> bool {
        let before = progress.tasks_completed_this_session.len();
        let mut seen: Vec<TaskId> = Vec::with_capacity(before);
        for id in progress.tasks_completed_this_session.drain(..) {
            if self.catalog.contains(&id) && !seen.contains(&id) {
                seen.push(id);
            }
        }
        progress.tasks_completed_this_session = seen;
        progress.tasks_completed_this_session.len() != before
    }

    fn read_all(&self) -> BTreeMap<String, Value> {
        let raw = match self.store.get(STORAGE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return BTreeMap::new(),
            Err(e) => {
                warn!("Failed to read {}: {}", STORAGE_KEY, e);
                return BTreeMap::new();
            }
        };

        match decode_blob(&raw) {
            Ok(all) => all,
            Err(e) => {
                warn!("{}. Discarding and starting fresh.", e);
                BTreeMap::new()
            }
        }
    }

    fn persist(&self, progress: &SessionProgress) {
        let mut all = self.read_all();
        let value = match serde_json::to_value(progress) {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to serialize progress for {}: {}", progress.identity, e);
                return;
            }
        };
        all.insert(progress.identity.as_str().to_string(), value);

        let result = serde_json::to_string(&all)
            .map_err(anyhow::Error::from)
            .and_then(|json| self.store.set(STORAGE_KEY, &json));
        if let Err(e) = result {
            warn!("Failed to persist progress for {}: {}", progress.identity, e);
        }
    }
}

fn decode_blob(raw: &str) -> Result<BTreeMap<String, Value>> {
    serde_json::from_str(raw).map_err(|e| TaskgateError::malformed(STORAGE_KEY, e.to_string()))
}

fn decode_record(identity: &Identity, value: Value) -> Result<SessionProgress> {
    serde_json::from_value(value)
        .map_err(|e| TaskgateError::malformed(format!("{STORAGE_KEY}.{identity}"), e.to_string()))
}
