//! taskgate - reward-gated task tracker
//!
//! A user logs in, completes a fixed catalog of external tasks (each gated
//! on a minimum dwell time in an opened browser window) and, once every task
//! of a session is done, earns an hour on their license key. A 30 minute
//! cooldown then blocks further earning.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`progress`] - Session progress and the cooldown window
//! - [`task`] - Task catalog and the per-task verification state machine
//! - [`timer`] - Deterministic timer wheel and the system clock
//! - [`controller`] - Session orchestration and reward granting
//! - [`license`] - License ledger and its file and GitHub backends
//! - [`identity`] - Discord login and the remembered session
//! - [`launcher`] - Opening task destinations as child processes
//! - [`store`] - File-backed key-value store
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Custom error types and handling
//! - [`testing`] - Collaborator traits, mocks and assertions
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use taskgate::controller::SessionController;
//! use taskgate::task::TaskCatalog;
//! use taskgate::testing::{MemoryKeyValueStore, MockClock, MockLauncher, MockLicenseStore};
//!
//! let mut session = SessionController::open(
//!     profile,
//!     &TaskCatalog::standard(),
//!     MemoryKeyValueStore::new(),
//!     MockClock::new(),
//!     Arc::new(MockLicenseStore::new()),
//!     Box::new(MockLauncher::new()),
//! )
//! .await;
//!
//! session.start_task("opera");
//! session.pump().await;
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod identity;
pub mod launcher;
pub mod license;
pub mod progress;
pub mod store;
pub mod task;
pub mod testing;
pub mod timer;

// Re-export commonly used types
pub use error::{Result, TaskgateError};

pub use config::{AppConfig, DiscordConfig, GithubLedgerConfig, LauncherConfig, LicenseConfig};
pub use controller::{Notification, NotificationLevel, SessionController};
pub use identity::{AuthGrant, AuthSession, DiscordIdentityProvider, UserProfile};
pub use launcher::{ContextHandle, ProcessLauncher};
pub use license::{FileLicenseStore, GithubLicenseStore, LicenseLedger, LicenseRecord};
pub use progress::{Identity, ProgressTracker, SessionProgress};
pub use store::FileKeyValueStore;
pub use task::{TaskCatalog, TaskDefinition, TaskEvent, TaskState, TaskVerifier};
pub use timer::{SystemClock, TimerToken, TimerWheel};

// Re-export collaborator traits for convenience
pub use testing::{Clock, ContextLauncher, IdentityProvider, KeyValueStore, LicenseStore};
