//! User identity: provider login and the locally remembered session.

pub mod discord;

pub use discord::DiscordIdentityProvider;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::progress::Identity;
use crate::testing::KeyValueStore;

/// Store key holding the logged-in profile.
pub const USER_KEY: &str = "discord_user";

/// Store key holding the provider access token.
pub const TOKEN_KEY: &str = "discord_token";

/// Authenticated user as seen by the task tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub identity: Identity,
    pub username: String,
    pub display_name: String,
    pub avatar_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Result of a successful identity exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthGrant {
    pub profile: UserProfile,
    pub access_token: String,
}

/// The login remembered between runs.
#[derive(Debug)]
pub struct AuthSession<S> {
    store: S,
}

impl<S: KeyValueStore> AuthSession<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Profile of the remembered login, if both profile and token are
    /// present and readable.
    #[must_use]
    pub fn current(&self) -> Option<UserProfile> {
        let token = self.store.get(TOKEN_KEY).ok().flatten()?;
        if token.trim().is_empty() {
            return None;
        }
        let raw = self.store.get(USER_KEY).ok().flatten()?;
        match serde_json::from_str(&raw) {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!("Stored login is unreadable: {}. Ignoring it.", e);
                None
            }
        }
    }

    /// Remember a successful login.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    pub fn save(&self, grant: &AuthGrant) -> anyhow::Result<()> {
        self.store.set(TOKEN_KEY, &grant.access_token)?;
        self.store
            .set(USER_KEY, &serde_json::to_string(&grant.profile)?)?;
        Ok(())
    }

    /// Forget the login. Task progress is kept so a logout can't be used to
    /// skip a running cooldown.
    pub fn logout(&self) -> anyhow::Result<()> {
        self.store.remove(USER_KEY)?;
        self.store.remove(TOKEN_KEY)?;
        Ok(())
    }
}
