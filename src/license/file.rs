//! License ledger kept in a local JSON file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use super::{LicenseLedger, LicenseRecord};
use crate::error::Result;
use crate::progress::Identity;
use crate::store::{read_locked, write_atomic};
use crate::testing::LicenseStore;

/// Ledger stored as a JSON array at `path`. A missing file is an empty
/// ledger.
#[derive(Debug, Clone)]
pub struct FileLicenseStore {
    path: PathBuf,
}

impl FileLicenseStore {
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<LicenseLedger> {
        match read_locked(&self.path)? {
            Some(json) if !json.trim().is_empty() => LicenseLedger::from_json(&json),
            _ => Ok(LicenseLedger::default()),
        }
    }

    fn write(&self, ledger: &LicenseLedger) -> Result<()> {
        write_atomic(&self.path, &ledger.to_json()?)
    }
}

#[async_trait]
impl LicenseStore for FileLicenseStore {
    async fn fetch_license(&self, identity: &Identity) -> anyhow::Result<Option<LicenseRecord>> {
        Ok(self.read()?.find(identity).map(LicenseRecord::redacted))
    }

    async fn create_license(
        &self,
        identity: &Identity,
        display_name: &str,
    ) -> anyhow::Result<LicenseRecord> {
        let mut ledger = self.read()?;
        let issued = ledger.issue(identity, display_name, Utc::now(), &mut rand::thread_rng());
        if issued.created {
            self.write(&ledger)?;
            info!("New key created for {}", identity);
        }
        Ok(issued.record.redacted())
    }

    async fn extend_license(&self, identity: &Identity, hours: i64) -> anyhow::Result<DateTime<Utc>> {
        let mut ledger = self.read()?;
        let new_expiry = ledger.extend(identity, hours)?;
        self.write(&ledger)?;
        info!("Extended license for {} to {}", identity, new_expiry);
        Ok(new_expiry)
    }
}
