//! Collaborator traits and their test doubles.
//!
//! # Architecture
//!
//! - **Traits**: abstractions for the clock, local store, context launcher,
//!   license store and identity provider
//! - **Mocks**: in-memory implementations with controllable behavior
//! - **Assertions**: task and notification assertions
//!
//! # Example
//!
//! ```rust,ignore
//! use taskgate::testing::{MockClock, MockLauncher, MockLicenseStore};
//!
//! let clock = MockClock::new();
//! let launcher = MockLauncher::new();
//! let licenses = MockLicenseStore::new().with_license("42", clock.now());
//! ```

pub mod assertions;
pub mod mocks;
pub mod traits;

pub use assertions::*;
pub use mocks::*;
pub use traits::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::UserProfile;
    use crate::progress::Identity;
    use chrono::Duration;

    #[test]
    fn test_mock_clock_shared_between_clones() {
        let clock = MockClock::new();
        let other = clock.clone();
        let start = clock.now();
        other.advance(Duration::seconds(90));
        assert_eq!(clock.now() - start, Duration::seconds(90));
    }

    #[test]
    fn test_memory_store_shared_between_clones() {
        let store = MemoryKeyValueStore::new();
        store.clone().set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_mock_launcher_lifecycle() {
        let mut launcher = MockLauncher::new();
        let a = launcher.open("https://a").unwrap();
        let b = launcher.open("https://b").unwrap();
        assert_ne!(a, b);
        assert!(launcher.is_live(a));

        launcher.close(a);
        assert!(!launcher.is_live(a));
        assert!(launcher.is_live(b));
        assert_eq!(launcher.live_count(), 1);
        assert_eq!(launcher.opened_urls(), ["https://a", "https://b"]);
    }

    #[tokio::test]
    async fn test_mock_license_store_counts_calls() {
        let clock = MockClock::new();
        let licenses = MockLicenseStore::new().with_license("42", clock.now());
        let id = Identity::new("42");

        let expiry = licenses.extend_license(&id, 2).await.unwrap();
        assert_eq!(expiry, clock.now() + Duration::hours(2));
        assert_eq!(licenses.extend_calls(), 1);

        licenses.set_extend_error(Some("boom"));
        assert!(licenses.extend_license(&id, 1).await.is_err());
        assert_eq!(licenses.extend_calls(), 2);
        assert_eq!(licenses.expires_at("42"), Some(expiry));
    }

    #[tokio::test]
    async fn test_mock_identity_provider() {
        let profile = UserProfile {
            identity: Identity::new("7"),
            username: "u".into(),
            display_name: "U".into(),
            avatar_url: String::new(),
            email: None,
        };
        let provider = MockIdentityProvider::new("good", profile.clone());

        let grant = provider.exchange("#access_token=good").await.unwrap();
        assert_eq!(grant.profile, profile);
        assert!(provider.exchange("#access_token=bad").await.is_err());
        assert!(provider.exchange("#error=denied").await.is_err());
    }
}
