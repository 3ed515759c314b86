//! Mock implementations of testing traits.
//!
//! These mocks provide controllable test doubles for external dependencies,
//! enabling deterministic unit tests. Clones share state, so a test can keep
//! one handle for inspection while the code under test owns another.

use super::traits::{Clock, ContextLauncher, IdentityProvider, KeyValueStore, LicenseStore};
use crate::identity::{AuthGrant, UserProfile};
use crate::launcher::ContextHandle;
use crate::license::{LicenseLedger, LicenseRecord};
use crate::progress::Identity;
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use url::Url;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Clock
// ============================================================================

/// Manually advanced clock.
///
/// # Example
///
/// ```rust,ignore
/// let clock = MockClock::new();
/// clock.advance(chrono::Duration::minutes(30));
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl Default for MockClock {
    fn default() -> Self {
        // 2025-01-01T12:00:00Z
        Self::at(DateTime::from_timestamp(1_735_732_800, 0).unwrap_or_default())
    }
}

impl MockClock {
    /// Clock starting at a fixed instant.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn advance(&self, by: Duration) {
        *lock(&self.now) += by;
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *lock(&self.now) = now;
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}

// ============================================================================
// Key-value store
// ============================================================================

/// In-memory key-value store.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
    write_error: Option<String>,
}

impl MemoryKeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `set` fail with `error`.
    #[must_use]
    pub fn with_write_error(mut self, error: &str) -> Self {
        self.write_error = Some(error.to_string());
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if let Some(error) = &self.write_error {
            bail!("{error}");
        }
        lock(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        lock(&self.entries).remove(key);
        Ok(())
    }
}

// ============================================================================
// Context launcher
// ============================================================================

#[derive(Debug, Default)]
struct LauncherState {
    next_id: u64,
    opened: Vec<String>,
    live: HashSet<ContextHandle>,
    released: Vec<ContextHandle>,
}

/// Launcher whose contexts stay open until the test closes them.
#[derive(Debug, Clone, Default)]
pub struct MockLauncher {
    state: Arc<Mutex<LauncherState>>,
    blocked: bool,
}

impl MockLauncher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every open, as a popup blocker would.
    #[must_use]
    pub fn with_blocked_opens(mut self) -> Self {
        self.blocked = true;
        self
    }

    /// URLs opened so far, in order.
    #[must_use]
    pub fn opened_urls(&self) -> Vec<String> {
        lock(&self.state).opened.clone()
    }

    /// Close one context.
    pub fn close(&self, handle: ContextHandle) {
        lock(&self.state).live.remove(&handle);
    }

    /// Close every open context.
    pub fn close_all(&self) {
        lock(&self.state).live.clear();
    }

    /// Number of contexts still open.
    #[must_use]
    pub fn live_count(&self) -> usize {
        lock(&self.state).live.len()
    }

    /// Handles given back through `release`, in order.
    #[must_use]
    pub fn released(&self) -> Vec<ContextHandle> {
        lock(&self.state).released.clone()
    }
}

impl ContextLauncher for MockLauncher {
    fn open(&mut self, url: &str) -> Option<ContextHandle> {
        if self.blocked {
            return None;
        }
        let mut state = lock(&self.state);
        state.next_id += 1;
        let handle = ContextHandle::new(state.next_id);
        state.opened.push(url.to_string());
        state.live.insert(handle);
        Some(handle)
    }

    fn is_live(&mut self, handle: ContextHandle) -> bool {
        lock(&self.state).live.contains(&handle)
    }

    fn release(&mut self, handle: ContextHandle) {
        lock(&self.state).released.push(handle);
    }
}

// ============================================================================
// License store
// ============================================================================

/// In-memory license store that counts calls.
///
/// # Example
///
/// ```rust,ignore
/// let licenses = MockLicenseStore::new().with_license("42", expires_at);
/// licenses.extend_license(&Identity::new("42"), 1).await?;
/// assert_eq!(licenses.extend_calls(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockLicenseStore {
    ledger: Arc<Mutex<LicenseLedger>>,
    fail_fetch: Arc<Mutex<Option<String>>>,
    fail_extend: Arc<Mutex<Option<String>>>,
    extend_calls: Arc<AtomicU32>,
    create_calls: Arc<AtomicU32>,
}

impl MockLicenseStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a license for `identity` expiring at `expires_at`.
    #[must_use]
    pub fn with_license(self, identity: &str, expires_at: DateTime<Utc>) -> Self {
        let record = LicenseRecord {
            expires_at,
            ..LicenseRecord::issue(
                &Identity::new(identity),
                identity,
                "QV-TEST-TEST-TEST-TEST".to_string(),
                expires_at,
            )
        };
        let mut records = lock(&self.ledger).records().to_vec();
        records.push(record);
        *lock(&self.ledger) = LicenseLedger::new(records);
        self
    }

    /// Make fetches fail until cleared with `set_fetch_error(None)`.
    pub fn set_fetch_error(&self, error: Option<&str>) {
        *lock(&self.fail_fetch) = error.map(String::from);
    }

    /// Make extensions fail until cleared with `set_extend_error(None)`.
    pub fn set_extend_error(&self, error: Option<&str>) {
        *lock(&self.fail_extend) = error.map(String::from);
    }

    #[must_use]
    pub fn extend_calls(&self) -> u32 {
        self.extend_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Current expiry for `identity`.
    #[must_use]
    pub fn expires_at(&self, identity: &str) -> Option<DateTime<Utc>> {
        lock(&self.ledger)
            .find(&Identity::new(identity))
            .map(|r| r.expires_at)
    }
}

#[async_trait]
impl LicenseStore for MockLicenseStore {
    async fn fetch_license(&self, identity: &Identity) -> Result<Option<LicenseRecord>> {
        if let Some(error) = lock(&self.fail_fetch).clone() {
            bail!("{error}");
        }
        Ok(lock(&self.ledger).find(identity).cloned())
    }

    async fn create_license(&self, identity: &Identity, display_name: &str) -> Result<LicenseRecord> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let issued = lock(&self.ledger).issue(
            identity,
            display_name,
            Utc::now(),
            &mut rand::thread_rng(),
        );
        Ok(issued.record)
    }

    async fn extend_license(&self, identity: &Identity, hours: i64) -> Result<DateTime<Utc>> {
        self.extend_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = lock(&self.fail_extend).clone() {
            bail!("{error}");
        }
        Ok(lock(&self.ledger).extend(identity, hours)?)
    }
}

// ============================================================================
// Identity provider
// ============================================================================

/// Identity provider that accepts one fixed token.
#[derive(Debug, Clone)]
pub struct MockIdentityProvider {
    token: String,
    profile: UserProfile,
}

impl MockIdentityProvider {
    pub fn new(token: &str, profile: UserProfile) -> Self {
        Self {
            token: token.to_string(),
            profile,
        }
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    fn authorize_url(&self) -> Result<Url> {
        Ok(Url::parse("https://identity.invalid/authorize")?)
    }

    async fn exchange(&self, callback_fragment: &str) -> Result<AuthGrant> {
        let token = crate::identity::discord::parse_fragment(callback_fragment)?;
        if token != self.token {
            bail!("Failed to fetch user info");
        }
        Ok(AuthGrant {
            profile: self.profile.clone(),
            access_token: token,
        })
    }
}
