//! Session orchestration.
//!
//! [`SessionController`] owns one logged-in session: the progress record,
//! a verifier per catalog task, and every timer those need. It is driven by
//! [`SessionController::pump`], which fires due timers against the injected
//! clock. When the last task of a session completes the controller extends
//! the license by [`REWARD_HOURS`] and only then starts the cooldown.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::error::{Result, TaskgateError};
use crate::identity::UserProfile;
use crate::license::{LicenseRecord, REWARD_HOURS};
use crate::progress::{ProgressTracker, SessionProgress};
use crate::task::{
    TaskCatalog, TaskEvent, TaskState, TaskVerifier, LIVENESS_POLL_MS, TICK_INTERVAL_MS,
};
use crate::testing::{Clock, ContextLauncher, KeyValueStore, LicenseStore};
use crate::timer::{TimerToken, TimerWheel};

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

/// A message for the user, drained by the front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn info(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::with_level(NotificationLevel::Info, title, body)
    }

    pub fn success(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::with_level(NotificationLevel::Success, title, body)
    }

    pub fn error(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::with_level(NotificationLevel::Error, title, body)
    }

    fn with_level(level: NotificationLevel, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControllerTimer {
    Tick(usize),
    Liveness(usize),
    Cooldown,
}

#[derive(Debug, Default, Clone, Copy)]
struct TaskTimers {
    tick: Option<TimerToken>,
    liveness: Option<TimerToken>,
}

/// Runs the task session for one identity.
pub struct SessionController<S, C> {
    profile: UserProfile,
    tracker: ProgressTracker<S, C>,
    progress: SessionProgress,
    verifiers: Vec<TaskVerifier>,
    task_timers: Vec<TaskTimers>,
    cooldown_timer: Option<TimerToken>,
    timers: TimerWheel<ControllerTimer>,
    licenses: Arc<dyn LicenseStore>,
    launcher: Box<dyn ContextLauncher + Send>,
    license: Option<LicenseRecord>,
    granting: bool,
    notifications: VecDeque<Notification>,
}

impl<S: KeyValueStore, C: Clock> SessionController<S, C> {
    /// Open a session for `profile`.
    ///
    /// Loads (or creates) the progress record, restores tasks already done
    /// this session, fetches the license and arms the cooldown timer if a
    /// cooldown is running. A session left fully covered by an earlier run
    /// whose reward failed is granted here.
    pub async fn open(
        profile: UserProfile,
        catalog: &TaskCatalog,
        store: S,
        clock: C,
        licenses: Arc<dyn LicenseStore>,
        launcher: Box<dyn ContextLauncher + Send>,
    ) -> Self {
        let tracker = ProgressTracker::new(store, clock, catalog);
        let progress = tracker.load(&profile.identity);

        let verifiers: Vec<TaskVerifier> = catalog
            .tasks()
            .iter()
            .map(|def| {
                if progress.has_completed(&def.id) {
                    TaskVerifier::completed(def.clone())
                } else {
                    TaskVerifier::new(def.clone())
                }
            })
            .collect();

        let mut controller = Self {
            profile,
            tracker,
            progress,
            task_timers: vec![TaskTimers::default(); verifiers.len()],
            verifiers,
            cooldown_timer: None,
            timers: TimerWheel::new(),
            licenses,
            launcher,
            license: None,
            granting: false,
            notifications: VecDeque::new(),
        };

        controller.refresh_license().await;
        if controller.is_on_cooldown() {
            controller.schedule_cooldown();
        }
        controller.check_all_complete().await;
        controller
    }

    #[must_use]
    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    #[must_use]
    pub fn progress(&self) -> &SessionProgress {
        &self.progress
    }

    #[must_use]
    pub fn tasks(&self) -> &[TaskVerifier] {
        &self.verifiers
    }

    #[must_use]
    pub fn task(&self, task_id: &str) -> Option<&TaskVerifier> {
        self.verifiers.iter().find(|v| v.id() == task_id)
    }

    #[must_use]
    pub fn license(&self) -> Option<&LicenseRecord> {
        self.license.as_ref()
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.tracker.clock().now()
    }

    #[must_use]
    pub fn is_on_cooldown(&self) -> bool {
        ProgressTracker::<S, C>::is_on_cooldown(&self.progress, self.now())
    }

    #[must_use]
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        self.progress.cooldown_remaining(self.now())
    }

    /// Whether a reward grant is in flight.
    #[must_use]
    pub fn is_granting(&self) -> bool {
        self.granting
    }

    /// Tasks completed in the current session.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.progress.tasks_completed_this_session().len()
    }

    /// Whether every task is done and the reward still has to be granted.
    /// Never true during a cooldown, even if the session list still names
    /// every task.
    #[must_use]
    pub fn reward_pending(&self) -> bool {
        !self.granting && !self.is_on_cooldown() && self.tracker.covers_catalog(&self.progress)
    }

    /// Earliest pending timer deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.timers.next_deadline()
    }

    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Take every notification queued since the last drain.
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        self.notifications.drain(..).collect()
    }

    /// Open the destination of `task_id` and start counting dwell.
    ///
    /// Refused during a cooldown or while a reward is being granted.
    pub fn start_task(&mut self, task_id: &str) -> bool {
        let Some(index) = self.index_of(task_id) else {
            warn!("Unknown task {}", task_id);
            return false;
        };
        let disabled = self.granting || self.is_on_cooldown();
        let verifier = &mut self.verifiers[index];
        let started = verifier.start(self.launcher.as_mut(), disabled);

        if !started
            && !disabled
            && matches!(
                verifier.state(),
                TaskState::NotStarted | TaskState::WindowClosedPaused { .. }
            )
        {
            let title = verifier.definition().title.clone();
            self.notify(Notification::error(
                "Could not open task",
                format!("{title}: the destination could not be opened. Check your browser settings."),
            ));
        }
        self.reconcile_timers(index);
        started
    }

    /// Confirm an eligible task, starting its short countdown.
    pub fn verify_task(&mut self, task_id: &str) -> bool {
        let Some(index) = self.index_of(task_id) else {
            warn!("Unknown task {}", task_id);
            return false;
        };
        let verifying = self.verifiers[index].verify();
        self.reconcile_timers(index);
        verifying
    }

    /// Fire every timer due at the current time and apply the results.
    pub async fn pump(&mut self) -> Vec<TaskEvent> {
        let now = self.now();
        let mut events = Vec::new();

        while let Some((_, timer)) = self.timers.pop_due(now) {
            match timer {
                ControllerTimer::Tick(index) | ControllerTimer::Liveness(index) => {
                    let Some(verifier) = self.verifiers.get_mut(index) else {
                        continue;
                    };
                    let event = if matches!(timer, ControllerTimer::Tick(_)) {
                        verifier.tick(self.launcher.as_mut())
                    } else {
                        verifier.poll_liveness(self.launcher.as_mut())
                    };
                    self.reconcile_timers(index);
                    if let Some(event) = event {
                        self.handle_event(&event).await;
                        events.push(event);
                    }
                }
                ControllerTimer::Cooldown => self.end_cooldown(),
            }
        }
        events
    }

    /// Re-attempt a reward grant that failed earlier.
    ///
    /// Task completions are kept across failures, so nothing has to be
    /// redone. Returns whether the grant went through.
    pub async fn retry_reward(&mut self) -> bool {
        if !self.reward_pending() {
            debug!("No reward pending for {}", self.profile.identity);
            return false;
        }
        self.grant_reward().await
    }

    /// Return the license for this identity, issuing one if none exists.
    pub async fn ensure_license(&mut self) -> Result<LicenseRecord> {
        if let Some(license) = &self.license {
            return Ok(license.clone());
        }
        let identity = self.profile.identity.clone();
        let existing = self
            .licenses
            .fetch_license(&identity)
            .await
            .map_err(|e| TaskgateError::license_lookup(e.to_string()))?;
        let license = match existing {
            Some(license) => license,
            None => {
                info!("Issuing a new license for {}", identity);
                self.licenses
                    .create_license(&identity, &self.profile.display_name)
                    .await
                    .map_err(|e| TaskgateError::license_lookup(e.to_string()))?
            }
        };
        self.license = Some(license.clone());
        Ok(license)
    }

    async fn refresh_license(&mut self) {
        match self.licenses.fetch_license(&self.profile.identity).await {
            Ok(Some(license)) => self.license = Some(license),
            Ok(None) => {
                self.license = None;
                self.notify(Notification::info(
                    "No license",
                    TaskgateError::license_lookup("absent").user_message(),
                ));
            }
            Err(e) => {
                warn!("License lookup failed for {}: {}", self.profile.identity, e);
                self.notify(Notification::error(
                    "License lookup failed",
                    TaskgateError::license_lookup(e.to_string()).user_message(),
                ));
            }
        }
    }

    async fn handle_event(&mut self, event: &TaskEvent) {
        match event {
            TaskEvent::Completed(task_id) => {
                if let Some(updated) = self.tracker.complete_task(Some(&self.progress), task_id) {
                    self.progress = updated;
                }
                let title = self
                    .task(task_id)
                    .map_or_else(|| task_id.clone(), |v| v.definition().title.clone());
                self.notify(Notification::success("Task Completed!", format!("{title} verified.")));
                self.check_all_complete().await;
            }
            TaskEvent::Paused(task_id) => {
                debug!("Task {} paused", task_id);
            }
            TaskEvent::Eligible(task_id) => {
                debug!("Task {} ready to verify", task_id);
            }
        }
    }

    async fn check_all_complete(&mut self) {
        if self.reward_pending() {
            self.grant_reward().await;
        }
    }

    async fn grant_reward(&mut self) -> bool {
        if self.granting {
            return false;
        }
        self.granting = true;
        let identity = self.profile.identity.clone();
        info!("All tasks complete for {}, granting reward", identity);
        let result = self.licenses.extend_license(&identity, REWARD_HOURS).await;
        self.granting = false;

        match result {
            Ok(expires_at) => {
                let now = self.now();
                self.progress = self.tracker.mark_session_complete(&self.progress, now);
                match &mut self.license {
                    Some(license) => license.expires_at = expires_at,
                    None => self.refresh_license().await,
                }
                self.schedule_cooldown();
                self.notify(Notification::success(
                    "Reward Granted!",
                    format!("{REWARD_HOURS} hour has been added to your key!"),
                ));
                true
            }
            Err(e) => {
                warn!("Reward grant failed for {}: {}", identity, e);
                self.notify(Notification::error(
                    "Reward Failed",
                    TaskgateError::reward_grant(e.to_string()).user_message(),
                ));
                false
            }
        }
    }

    fn schedule_cooldown(&mut self) {
        let Some(end) = self.progress.cooldown_end() else {
            return;
        };
        if let Some(token) = self.cooldown_timer.take() {
            self.timers.cancel(token);
        }
        debug!("Cooldown timer armed until {}", end);
        self.cooldown_timer = Some(self.timers.schedule_at(end, ControllerTimer::Cooldown));
    }

    fn end_cooldown(&mut self) {
        self.cooldown_timer = None;
        self.progress = self.tracker.reset_cooldown(&self.progress);
        for index in 0..self.verifiers.len() {
            self.verifiers[index].reset(self.launcher.as_mut());
            self.reconcile_timers(index);
        }
        info!("Cooldown over for {}", self.profile.identity);
        self.notify(Notification::success(
            "Cooldown Complete!",
            "You can now complete tasks again to earn more time.",
        ));
    }

    /// Arm or cancel the tick and liveness timers of one task to match its
    /// state.
    fn reconcile_timers(&mut self, index: usize) {
        let Some(verifier) = self.verifiers.get(index) else {
            return;
        };
        let state = verifier.state();
        let now = self.now();
        let slot = &mut self.task_timers[index];

        match (state.needs_tick(), slot.tick) {
            (true, None) => {
                slot.tick = Some(self.timers.schedule_repeating(
                    now,
                    Duration::milliseconds(TICK_INTERVAL_MS),
                    ControllerTimer::Tick(index),
                ));
            }
            (false, Some(token)) => {
                self.timers.cancel(token);
                slot.tick = None;
            }
            _ => {}
        }

        match (state.is_watching(), slot.liveness) {
            (true, None) => {
                slot.liveness = Some(self.timers.schedule_repeating(
                    now,
                    Duration::milliseconds(LIVENESS_POLL_MS),
                    ControllerTimer::Liveness(index),
                ));
            }
            (false, Some(token)) => {
                self.timers.cancel(token);
                slot.liveness = None;
            }
            _ => {}
        }
    }

    fn index_of(&self, task_id: &str) -> Option<usize> {
        self.verifiers.iter().position(|v| v.id() == task_id)
    }

    fn notify(&mut self, notification: Notification) {
        debug!("Notify [{:?}] {}", notification.level, notification.title);
        self.notifications.push_back(notification);
    }
}

impl<S, C> SessionController<S, C> {
    /// Cancel every timer. In-memory task state is dropped with the
    /// controller; recorded completions stay persisted.
    pub fn teardown(&mut self) {
        self.timers.cancel_all();
        self.task_timers.iter_mut().for_each(|t| *t = TaskTimers::default());
        self.cooldown_timer = None;
    }
}

impl<S, C> Drop for SessionController<S, C> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{Identity, STORAGE_KEY};
    use crate::testing::{
        assert_notified, assert_task_completed, assert_task_state, MemoryKeyValueStore, MockClock,
        MockLauncher, MockLicenseStore,
    };

    struct Harness {
        clock: MockClock,
        store: MemoryKeyValueStore,
        launcher: MockLauncher,
        licenses: MockLicenseStore,
    }

    impl Harness {
        fn new() -> Self {
            let clock = MockClock::new();
            let licenses = MockLicenseStore::new().with_license("42", clock.now() + Duration::hours(5));
            Self {
                clock,
                store: MemoryKeyValueStore::new(),
                launcher: MockLauncher::new(),
                licenses,
            }
        }

        fn profile() -> UserProfile {
            UserProfile {
                identity: Identity::new("42"),
                username: "ana".into(),
                display_name: "Ana".into(),
                avatar_url: String::new(),
                email: None,
            }
        }

        async fn open(&self) -> SessionController<MemoryKeyValueStore, MockClock> {
            SessionController::open(
                Self::profile(),
                &TaskCatalog::standard(),
                self.store.clone(),
                self.clock.clone(),
                Arc::new(self.licenses.clone()),
                Box::new(self.launcher.clone()),
            )
            .await
        }

        /// Advance virtual time in half-second steps, pumping after each.
        async fn run_for(&self, ctrl: &mut SessionController<MemoryKeyValueStore, MockClock>, secs: i64) {
            for _ in 0..secs * 2 {
                self.clock.advance(Duration::milliseconds(500));
                ctrl.pump().await;
            }
        }

        async fn complete(&self, ctrl: &mut SessionController<MemoryKeyValueStore, MockClock>, task_id: &str) {
            let dwell = i64::from(ctrl.task(task_id).unwrap().definition().required_dwell_secs);
            assert!(ctrl.start_task(task_id));
            self.run_for(ctrl, dwell).await;
            assert!(ctrl.verify_task(task_id), "{task_id} should be eligible");
            self.run_for(ctrl, 3).await;
            assert_task_completed(ctrl.task(task_id).unwrap());
        }
    }

    #[tokio::test]
    async fn test_full_session_grants_reward_once_and_starts_cooldown() {
        let h = Harness::new();
        let before = h.licenses.expires_at("42").unwrap();
        let mut ctrl = h.open().await;
        assert!(ctrl.license().is_some());

        h.complete(&mut ctrl, "opera").await;
        h.complete(&mut ctrl, "extension").await;
        assert_eq!(h.licenses.extend_calls(), 0);
        h.complete(&mut ctrl, "video").await;

        assert_eq!(h.licenses.extend_calls(), 1);
        assert_eq!(h.licenses.expires_at("42").unwrap(), before + Duration::hours(1));
        assert_eq!(ctrl.license().unwrap().expires_at, before + Duration::hours(1));
        assert!(ctrl.is_on_cooldown());
        assert!(ctrl.progress().tasks_completed_this_session().is_empty());
        assert_eq!(ctrl.progress().completed_tasks().len(), 3);
        assert_notified(&ctrl.drain_notifications(), NotificationLevel::Success, "Reward Granted");

        // Still locked just short of thirty minutes, and no second grant.
        h.run_for(&mut ctrl, 29 * 60 + 50).await;
        assert!(ctrl.is_on_cooldown());
        assert!(!ctrl.start_task("opera"));
        assert_eq!(h.licenses.extend_calls(), 1);
    }

    #[tokio::test]
    async fn test_cooldown_expiry_reenables_tasks() {
        let h = Harness::new();
        let mut ctrl = h.open().await;
        for id in ["opera", "extension", "video"] {
            h.complete(&mut ctrl, id).await;
        }
        ctrl.drain_notifications();

        h.clock.advance(Duration::minutes(30));
        ctrl.pump().await;

        assert!(!ctrl.is_on_cooldown());
        for task in ctrl.tasks() {
            assert_task_state(task, TaskState::NotStarted);
        }
        assert_notified(&ctrl.drain_notifications(), NotificationLevel::Success, "Cooldown Complete");
        assert!(ctrl.start_task("opera"));
    }

    #[tokio::test]
    async fn test_closing_window_pauses_and_reopen_carries_dwell() {
        let h = Harness::new();
        let mut ctrl = h.open().await;

        assert!(ctrl.start_task("opera"));
        h.run_for(&mut ctrl, 4).await;
        h.launcher.close_all();
        h.run_for(&mut ctrl, 1).await;
        assert_task_state(ctrl.task("opera").unwrap(), TaskState::WindowClosedPaused { dwell_secs: 4 });
        assert_eq!(ctrl.pending_timers(), 0);

        // Paused time does not count.
        h.run_for(&mut ctrl, 20).await;
        assert_eq!(ctrl.task("opera").unwrap().remaining_dwell_secs(), 6);

        assert!(ctrl.start_task("opera"));
        h.run_for(&mut ctrl, 6).await;
        assert!(matches!(ctrl.task("opera").unwrap().state(), TaskState::Eligible { .. }));
        assert_eq!(h.launcher.opened_urls().len(), 2);
    }

    #[tokio::test]
    async fn test_reward_failure_keeps_progress_and_retry_succeeds() {
        let h = Harness::new();
        h.licenses.set_extend_error(Some("connection reset"));
        let mut ctrl = h.open().await;
        for id in ["opera", "extension", "video"] {
            h.complete(&mut ctrl, id).await;
        }

        assert_eq!(h.licenses.extend_calls(), 1);
        assert!(!ctrl.is_on_cooldown());
        assert_eq!(ctrl.completed_count(), 3);
        assert!(ctrl.reward_pending());
        assert_notified(&ctrl.drain_notifications(), NotificationLevel::Error, "Reward Failed");

        h.licenses.set_extend_error(None);
        assert!(ctrl.retry_reward().await);
        assert_eq!(h.licenses.extend_calls(), 2);
        assert!(ctrl.is_on_cooldown());
        assert!(!ctrl.retry_reward().await);
        assert_eq!(h.licenses.extend_calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_retry_leaves_reward_pending() {
        let h = Harness::new();
        h.licenses.set_extend_error(Some("connection reset"));
        let mut ctrl = h.open().await;
        for id in ["opera", "extension", "video"] {
            h.complete(&mut ctrl, id).await;
        }
        ctrl.drain_notifications();

        assert!(!ctrl.retry_reward().await);
        assert_eq!(h.licenses.extend_calls(), 2);
        assert!(ctrl.reward_pending());
        assert!(!ctrl.is_on_cooldown());
        assert_notified(&ctrl.drain_notifications(), NotificationLevel::Error, "Reward Failed");
    }

    #[tokio::test]
    async fn test_pending_reward_is_granted_on_reopen() {
        let h = Harness::new();
        h.licenses.set_extend_error(Some("offline"));
        {
            let mut ctrl = h.open().await;
            for id in ["opera", "extension", "video"] {
                h.complete(&mut ctrl, id).await;
            }
        }
        h.licenses.set_extend_error(None);

        let ctrl = h.open().await;
        assert_eq!(h.licenses.extend_calls(), 2);
        assert!(ctrl.is_on_cooldown());
    }

    #[tokio::test]
    async fn test_full_session_list_during_cooldown_is_not_granted_again() {
        let h = Harness::new();
        let completed_at = h.clock.now() - Duration::minutes(5);
        let record = serde_json::json!({
            "42": {
                "discordId": "42",
                "completedTasks": ["opera", "extension", "video"],
                "lastCompletionTime": completed_at.timestamp_millis(),
                "tasksCompletedThisSession": ["opera", "extension", "video"]
            }
        });
        h.store.set(STORAGE_KEY, &record.to_string()).unwrap();

        let mut ctrl = h.open().await;
        assert_eq!(h.licenses.extend_calls(), 0);
        assert!(!ctrl.reward_pending());
        assert_eq!(ctrl.cooldown_remaining(), Some(Duration::minutes(25)));
        assert!(!ctrl.retry_reward().await);
        assert_eq!(h.licenses.extend_calls(), 0);
    }

    #[tokio::test]
    async fn test_reopen_restores_session_completions() {
        let h = Harness::new();
        {
            let mut ctrl = h.open().await;
            h.complete(&mut ctrl, "opera").await;
        }
        assert!(h.store.get(STORAGE_KEY).unwrap().is_some());

        let ctrl = h.open().await;
        assert_task_completed(ctrl.task("opera").unwrap());
        assert_task_state(ctrl.task("video").unwrap(), TaskState::NotStarted);
        assert_eq!(ctrl.completed_count(), 1);
    }

    #[tokio::test]
    async fn test_reopen_during_cooldown_arms_cooldown_timer() {
        let h = Harness::new();
        {
            let mut ctrl = h.open().await;
            for id in ["opera", "extension", "video"] {
                h.complete(&mut ctrl, id).await;
            }
        }
        h.clock.advance(Duration::minutes(10));

        let mut ctrl = h.open().await;
        assert!(ctrl.is_on_cooldown());
        assert_eq!(ctrl.pending_timers(), 1);
        assert_eq!(ctrl.cooldown_remaining(), Some(Duration::minutes(20)));

        h.clock.advance(Duration::minutes(20));
        ctrl.pump().await;
        assert!(!ctrl.is_on_cooldown());
        assert_eq!(ctrl.pending_timers(), 0);
    }

    #[tokio::test]
    async fn test_blocked_open_notifies_and_leaves_task_untouched() {
        let h = Harness::new();
        let mut ctrl = SessionController::open(
            Harness::profile(),
            &TaskCatalog::standard(),
            h.store.clone(),
            h.clock.clone(),
            Arc::new(h.licenses.clone()),
            Box::new(MockLauncher::new().with_blocked_opens()),
        )
        .await;

        assert!(!ctrl.start_task("opera"));
        assert_task_state(ctrl.task("opera").unwrap(), TaskState::NotStarted);
        assert_eq!(ctrl.pending_timers(), 0);
        assert_notified(&ctrl.drain_notifications(), NotificationLevel::Error, "Could not open");
    }

    #[tokio::test]
    async fn test_verify_before_eligible_is_ignored() {
        let h = Harness::new();
        let mut ctrl = h.open().await;
        assert!(ctrl.start_task("opera"));
        h.run_for(&mut ctrl, 3).await;
        assert!(!ctrl.verify_task("opera"));
        assert!(!ctrl.verify_task("nope"));
        assert!(!ctrl.start_task("nope"));
    }

    #[tokio::test]
    async fn test_missing_license_is_not_fatal() {
        let h = Harness::new();
        let licenses = MockLicenseStore::new();
        licenses.set_fetch_error(Some("timeout"));
        let mut ctrl = SessionController::open(
            Harness::profile(),
            &TaskCatalog::standard(),
            h.store.clone(),
            h.clock.clone(),
            Arc::new(licenses),
            Box::new(h.launcher.clone()),
        )
        .await;

        assert!(ctrl.license().is_none());
        assert_notified(&ctrl.drain_notifications(), NotificationLevel::Error, "License lookup failed");
        assert!(ctrl.start_task("opera"));
    }

    #[tokio::test]
    async fn test_ensure_license_issues_once() {
        let h = Harness::new();
        let licenses = MockLicenseStore::new();
        let mut ctrl = SessionController::open(
            Harness::profile(),
            &TaskCatalog::standard(),
            h.store.clone(),
            h.clock.clone(),
            Arc::new(licenses.clone()),
            Box::new(h.launcher.clone()),
        )
        .await;
        assert_notified(&ctrl.drain_notifications(), NotificationLevel::Info, "No license");

        let first = ctrl.ensure_license().await.unwrap();
        let second = ctrl.ensure_license().await.unwrap();
        assert_eq!(first.key, second.key);
        assert!(first.key.starts_with("QV-"));
        assert_eq!(licenses.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_teardown_cancels_timers() {
        let h = Harness::new();
        let mut ctrl = h.open().await;
        ctrl.start_task("opera");
        ctrl.start_task("video");
        assert_eq!(ctrl.pending_timers(), 4);

        ctrl.teardown();
        assert_eq!(ctrl.pending_timers(), 0);
        h.run_for(&mut ctrl, 2).await;
        assert_eq!(ctrl.task("opera").unwrap().state().dwell_secs(), 0);
    }
}
