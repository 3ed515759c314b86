//! Configuration for the taskgate binary.
//!
//! Task timings (dwell thresholds, cooldown, reward size) are compile-time
//! constants. What varies per install is where data lives, which license
//! backend is used, the OAuth client, and how task destinations are opened.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, TaskgateError};

/// Config file name inside the data directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Environment variable holding the GitHub token for the ledger.
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Environment variable overriding the Discord client id.
pub const DISCORD_CLIENT_ID_ENV: &str = "TASKGATE_DISCORD_CLIENT_ID";

fn default_redirect_uri() -> String {
    "http://localhost:8080/callback".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_ledger_path() -> String {
    "Keys.json".to_string()
}

fn default_keys_file() -> String {
    "keys.json".to_string()
}

/// Default data directory: `<platform data dir>/taskgate`.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskgate")
}

/// Location of a ledger file in a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubLedgerConfig {
    pub owner: String,
    pub repo: String,
    #[serde(default = "default_ledger_path")]
    pub path: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

/// Where licenses are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum LicenseConfig {
    /// Local JSON ledger, relative paths resolve against the data dir.
    File {
        #[serde(default = "default_keys_file")]
        path: String,
    },
    /// Ledger file in a GitHub repository; token read from `GITHUB_TOKEN`.
    Github(GithubLedgerConfig),
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self::File {
            path: default_keys_file(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            redirect_uri: default_redirect_uri(),
        }
    }
}

/// Command used to open task destinations; the URL is appended.
/// Empty means "first known browser on PATH".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LauncherConfig {
    #[serde(default)]
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub license: LicenseConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub launcher: LauncherConfig,
}

impl AppConfig {
    /// Load `config.toml` from `data_dir`, or defaults if it doesn't exist.
    /// Environment overrides are applied afterwards.
    pub fn load(data_dir: &Path) -> Result<Self> {
        Self::load_from(&Self::config_path(data_dir))
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| {
                TaskgateError::config_with_path(e.to_string(), path.to_path_buf())
            })?
        } else {
            Self::default()
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn config_path(data_dir: &Path) -> PathBuf {
        data_dir.join(CONFIG_FILE)
    }

    fn apply_env(&mut self) {
        if let Ok(id) = std::env::var(DISCORD_CLIENT_ID_ENV) {
            if !id.trim().is_empty() {
                self.discord.client_id = Some(id.trim().to_string());
            }
        }
    }

    /// Reject values that would only fail later, at first use.
    pub fn validate(&self) -> Result<()> {
        match &self.license {
            LicenseConfig::File { path } if path.trim().is_empty() => {
                return Err(TaskgateError::InvalidConfig {
                    field: "license.path".into(),
                    reason: "must not be empty".into(),
                });
            }
            LicenseConfig::Github(github) => {
                for (field, value) in [
                    ("license.owner", &github.owner),
                    ("license.repo", &github.repo),
                    ("license.path", &github.path),
                    ("license.branch", &github.branch),
                ] {
                    if value.trim().is_empty() {
                        return Err(TaskgateError::InvalidConfig {
                            field: field.into(),
                            reason: "must not be empty".into(),
                        });
                    }
                }
            }
            LicenseConfig::File { .. } => {}
        }

        if url::Url::parse(&self.discord.redirect_uri).is_err() {
            return Err(TaskgateError::InvalidConfig {
                field: "discord.redirect_uri".into(),
                reason: format!("'{}' is not a URL", self.discord.redirect_uri),
            });
        }

        if self.launcher.command.first().is_some_and(|p| p.trim().is_empty()) {
            return Err(TaskgateError::InvalidConfig {
                field: "launcher.command".into(),
                reason: "program must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Resolve the file ledger path against `data_dir`.
    #[must_use]
    pub fn keys_file(&self, data_dir: &Path) -> Option<PathBuf> {
        match &self.license {
            LicenseConfig::File { path } => {
                let path = PathBuf::from(path);
                Some(if path.is_absolute() {
                    path
                } else {
                    data_dir.join(path)
                })
            }
            LicenseConfig::Github(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = AppConfig::load(temp.path()).unwrap();
        assert_eq!(config.license, LicenseConfig::default());
        assert_eq!(
            config.keys_file(temp.path()),
            Some(temp.path().join("keys.json"))
        );
    }

    #[test]
    fn test_parse_github_backend() {
        let toml = r#"
            [license]
            backend = "github"
            owner = "acme"
            repo = "key-holder"

            [discord]
            client_id = "1234"

            [launcher]
            command = ["firefox", "--new-window"]
        "#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        let LicenseConfig::Github(github) = &config.license else {
            panic!("expected github backend");
        };
        assert_eq!(github.path, "Keys.json");
        assert_eq!(github.branch, "main");
        assert_eq!(config.discord.client_id.as_deref(), Some("1234"));
        assert_eq!(config.launcher.command, ["firefox", "--new-window"]);
        assert!(config.validate().is_ok());
        assert!(config.keys_file(Path::new("/data")).is_none());
    }

    #[test]
    fn test_load_file_backend() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        std::fs::write(&path, "[license]\nbackend = \"file\"\npath = \"/var/lib/keys.json\"\n")
            .unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(
            loaded.license,
            LicenseConfig::File {
                path: "/var/lib/keys.json".into(),
            }
        );
        assert_eq!(
            loaded.keys_file(temp.path()),
            Some(PathBuf::from("/var/lib/keys.json"))
        );
    }

    #[test]
    fn test_invalid_toml_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        std::fs::write(&path, "[license\nbackend=").unwrap();

        match AppConfig::load_from(&path) {
            Err(TaskgateError::Config { path: Some(p), .. }) => assert_eq!(p, path),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        let mut config = AppConfig::default();
        config.license = LicenseConfig::Github(GithubLedgerConfig {
            owner: "".into(),
            repo: "r".into(),
            path: "Keys.json".into(),
            branch: "main".into(),
        });
        assert!(matches!(
            config.validate(),
            Err(TaskgateError::InvalidConfig { field, .. }) if field == "license.owner"
        ));

        let mut config = AppConfig::default();
        config.discord.redirect_uri = "not a url".into();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.launcher.command = vec!["  ".into()];
        assert!(config.validate().is_err());
    }
}
