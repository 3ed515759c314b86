//! Trait definitions for testable abstractions.
//!
//! These traits abstract the collaborators of the task tracker so the core
//! can be driven without a wall clock, a browser, a disk or a network.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use url::Url;

use crate::identity::AuthGrant;
use crate::launcher::ContextHandle;
use crate::license::LicenseRecord;
use crate::progress::Identity;

/// Source of wall-clock time.
///
/// Cooldown windows and timer deadlines are computed against this, so tests
/// can move time forward deterministically.
///
/// # Example
///
/// ```rust,ignore
/// use taskgate::testing::{Clock, MockClock};
///
/// let clock = MockClock::new();
/// let before = clock.now();
/// clock.advance(chrono::Duration::seconds(5));
/// assert_eq!(clock.now() - before, chrono::Duration::seconds(5));
/// ```
pub trait Clock {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Local persistent key-value store holding serialized blobs.
pub trait KeyValueStore {
    /// Read the blob stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing medium can't be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the blob stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob can't be written.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Opens external destinations in a new browsing context and reports
/// whether that context is still alive.
pub trait ContextLauncher {
    /// Open `url`. Returns `None` when the open was refused (popup blocker,
    /// missing browser binary).
    fn open(&mut self, url: &str) -> Option<ContextHandle>;

    /// Whether the context behind `handle` is still open.
    fn is_live(&mut self, handle: ContextHandle) -> bool;

    /// Stop tracking `handle`. The context itself may stay open.
    fn release(&mut self, handle: ContextHandle);
}

/// External key/license store.
///
/// Writes are read-modify-write with last-write-wins semantics; an
/// implementation backed by a store with compare-and-swap can tighten this
/// without changing callers.
#[async_trait]
pub trait LicenseStore: Send + Sync {
    /// Look up the license for `identity`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable or its content is
    /// unreadable. An absent record is `Ok(None)`.
    async fn fetch_license(&self, identity: &Identity) -> Result<Option<LicenseRecord>>;

    /// Issue a license for `identity`. Idempotent: returns the existing
    /// record when one is already present.
    async fn create_license(
        &self,
        identity: &Identity,
        display_name: &str,
    ) -> Result<LicenseRecord>;

    /// Push the expiry of `identity`'s license out by `hours`, returning the
    /// new expiry.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no record for `identity` or the write
    /// fails.
    async fn extend_license(&self, identity: &Identity, hours: i64) -> Result<DateTime<Utc>>;
}

/// External identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// URL the user visits to log in.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is not configured.
    fn authorize_url(&self) -> Result<Url>;

    /// Exchange the redirect fragment returned by the provider for a user
    /// profile and access token.
    async fn exchange(&self, callback_fragment: &str) -> Result<AuthGrant>;
}
