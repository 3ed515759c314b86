//! Task catalog and the per-task verification state machine.
//!
//! A task is verified by keeping its destination open for a minimum dwell
//! time, then confirming through a short fixed countdown:
//!
//! ```text
//! NotStarted ─start─► ExternalWindowOpened ─tick─► AccumulatingDwell ─tick*─► Eligible
//!                             │                        ▲    │                   │
//!                             └──────closed──────► WindowClosedPaused         verify
//!                                                   (start reopens)             ▼
//!                                                               Completed ◄─3s─ Verifying
//! ```
//!
//! Dwell is a soft gate: it measures liveness of the opened context, not
//! what the user did there.

pub mod catalog;
pub mod state;
pub mod verifier;

pub use catalog::{TaskCatalog, TaskDefinition};
pub use state::{TaskEvent, TaskState};
pub use verifier::TaskVerifier;

/// Seconds of the confirmation countdown that follows `verify()`.
pub const VERIFICATION_COUNTDOWN_SECS: u32 = 3;

/// Period of the dwell and countdown tick, in milliseconds.
pub const TICK_INTERVAL_MS: i64 = 1_000;

/// Period of the liveness poll on an opened context, in milliseconds.
pub const LIVENESS_POLL_MS: i64 = 500;
