//! Custom error types for taskgate.
//!
//! Only the network-backed collaborators (identity exchange, license
//! lookup, license extension) can really fail. Timer, dwell and
//! verification logic is infallible by construction, and malformed local
//! state is recovered in place rather than surfaced.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for taskgate operations
#[derive(Error, Debug)]
pub enum TaskgateError {
    // =========================================================================
    // Collaborator Errors
    // =========================================================================
    /// Identity exchange failed; no session is established
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// License store unreachable or returned garbage
    #[error("License lookup failed: {message}")]
    LicenseLookup { message: String },

    /// Extending the license failed; recorded task progress is kept
    #[error("Reward grant failed: {message}")]
    RewardGrant { message: String },

    /// Local store held data that could not be parsed
    #[error("Malformed persisted state under '{key}': {message}")]
    MalformedState { key: String, message: String },

    // =========================================================================
    // Local Errors
    // =========================================================================
    /// Failed to load configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    /// Local key-value store failure
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// No login stored for this data directory
    #[error("Not logged in - run `taskgate login` first")]
    NotLoggedIn,

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// HTTP client error wrapper
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TaskgateError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create an authentication error
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create a license lookup error
    pub fn license_lookup(message: impl Into<String>) -> Self {
        Self::LicenseLookup {
            message: message.into(),
        }
    }

    /// Create a reward grant error
    pub fn reward_grant(message: impl Into<String>) -> Self {
        Self::RewardGrant {
            message: message.into(),
        }
    }

    /// Create a malformed state error
    pub fn malformed(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedState {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// Check if the user can simply try again later
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::LicenseLookup { .. }
                | Self::RewardGrant { .. }
                | Self::MalformedState { .. }
                | Self::Http(_)
        )
    }

    /// Short text suitable for a notification
    pub fn user_message(&self) -> String {
        match self {
            Self::Authentication { .. } => "Authentication failed. Please log in again.".into(),
            Self::LicenseLookup { .. } => "No active license found.".into(),
            Self::RewardGrant { .. } => "Failed to update your key. Please try again.".into(),
            Self::NotLoggedIn => "You are not logged in.".into(),
            other => other.to_string(),
        }
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Authentication { .. } | Self::NotLoggedIn => 2,
            Self::LicenseLookup { .. } | Self::RewardGrant { .. } | Self::Http(_) => 3,
            Self::Config { .. } | Self::InvalidConfig { .. } => 7,
            _ => 1,
        }
    }
}

/// Type alias for taskgate results
pub type Result<T> = std::result::Result<T, TaskgateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TaskgateError::malformed("user_progress", "expected value at line 1");
        assert!(err.to_string().contains("user_progress"));
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_is_recoverable() {
        assert!(TaskgateError::reward_grant("503").is_recoverable());
        assert!(TaskgateError::license_lookup("timeout").is_recoverable());
        assert!(!TaskgateError::authentication("no token").is_recoverable());
        assert!(!TaskgateError::config("bad").is_recoverable());
    }

    #[test]
    fn test_user_message_hides_detail() {
        let err = TaskgateError::reward_grant("PUT returned 409 conflict");
        assert_eq!(
            err.user_message(),
            "Failed to update your key. Please try again."
        );
        assert!(!err.user_message().contains("409"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(TaskgateError::authentication("x").exit_code(), 2);
        assert_eq!(TaskgateError::NotLoggedIn.exit_code(), 2);
        assert_eq!(TaskgateError::reward_grant("x").exit_code(), 3);
        assert_eq!(TaskgateError::config("x").exit_code(), 7);
        assert_eq!(TaskgateError::storage("x").exit_code(), 1);
    }

    #[test]
    fn test_config_with_path() {
        let path = PathBuf::from("/tmp/taskgate/config.toml");
        let err = TaskgateError::config_with_path("failed to parse", path.clone());
        if let TaskgateError::Config {
            message,
            path: opt_path,
        } = err
        {
            assert_eq!(message, "failed to parse");
            assert_eq!(opt_path, Some(path));
        } else {
            panic!("Wrong error variant");
        }
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: TaskgateError = io_err.into();
        assert!(matches!(err, TaskgateError::Io(_)));
        assert!(err.to_string().contains("access denied"));
    }
}
