//! License ledger stored as a file in a GitHub repository.
//!
//! Reads and writes go through the repository contents API: the file body is
//! base64 in both directions and each write must quote the blob `sha` it
//! replaces. A write racing another writer fails on the stale sha instead of
//! being retried; anything written between our read and our write by a
//! client that does not send the sha is overwritten.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{LicenseLedger, LicenseRecord};
use crate::config::GithubLedgerConfig;
use crate::error::{Result, TaskgateError};
use crate::progress::Identity;
use crate::testing::LicenseStore;

const GITHUB_API_URL: &str = "https://api.github.com";
const USER_AGENT: &str = "taskgate-key-system";

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    content: String,
    sha: String,
}

#[derive(Debug, Serialize)]
struct UpdateRequest<'a> {
    message: String,
    content: String,
    sha: &'a str,
    branch: &'a str,
}

/// GitHub-backed license store.
#[derive(Debug, Clone)]
pub struct GithubLicenseStore {
    client: Client,
    api_base: String,
    ledger: GithubLedgerConfig,
    token: String,
}

impl GithubLicenseStore {
    pub fn new(ledger: GithubLedgerConfig, token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: GITHUB_API_URL.to_string(),
            ledger,
            token: token.into(),
        }
    }

    /// Point at a different API host (GitHub Enterprise, test servers).
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn contents_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base, self.ledger.owner, self.ledger.repo, self.ledger.path
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", USER_AGENT)
    }

    async fn read(&self) -> Result<(LicenseLedger, String)> {
        let response = self
            .authorized(self.client.get(self.contents_url()))
            .query(&[("ref", self.ledger.branch.as_str())])
            .send()
            .await
            .map_err(|e| TaskgateError::license_lookup(format!("Request failed: {e}")))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(TaskgateError::license_lookup(format!(
                "Fetching {} returned {}: {}",
                self.ledger.path, status, body
            )));
        }

        let contents: ContentsResponse = serde_json::from_str(&body)
            .map_err(|e| TaskgateError::license_lookup(format!("Unexpected response: {e}")))?;
        let json = decode_content(&contents.content)?;
        let ledger = LicenseLedger::from_json(&json)?;
        debug!("Read {} license records", ledger.len());
        Ok((ledger, contents.sha))
    }

    async fn write(&self, ledger: &LicenseLedger, sha: &str, message: String) -> Result<()> {
        let request = UpdateRequest {
            message,
            content: STANDARD.encode(ledger.to_json()?),
            sha,
            branch: &self.ledger.branch,
        };
        let response = self
            .authorized(self.client.put(self.contents_url()))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TaskgateError::storage(format!(
                "Updating {} returned {}: {}",
                self.ledger.path, status, body
            )));
        }
        Ok(())
    }
}

/// Decode the base64 body of a contents response. GitHub wraps it at 60
/// columns.
fn decode_content(content: &str) -> Result<String> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| TaskgateError::license_lookup(format!("Invalid base64 content: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| TaskgateError::license_lookup(format!("Ledger is not UTF-8: {e}")))
}

#[async_trait]
impl LicenseStore for GithubLicenseStore {
    async fn fetch_license(&self, identity: &Identity) -> anyhow::Result<Option<LicenseRecord>> {
        let (ledger, _) = self.read().await?;
        Ok(ledger.find(identity).map(LicenseRecord::redacted))
    }

    async fn create_license(
        &self,
        identity: &Identity,
        display_name: &str,
    ) -> anyhow::Result<LicenseRecord> {
        let (mut ledger, sha) = self.read().await?;
        let issued = ledger.issue(identity, display_name, Utc::now(), &mut rand::thread_rng());
        if issued.created {
            self.write(&ledger, &sha, format!("Create key for user {identity}"))
                .await?;
            info!("New key created for {}", identity);
        }
        Ok(issued.record.redacted())
    }

    async fn extend_license(&self, identity: &Identity, hours: i64) -> anyhow::Result<DateTime<Utc>> {
        let (mut ledger, sha) = self.read().await?;
        let new_expiry = ledger.extend(identity, hours)?;
        self.write(&ledger, &sha, format!("Update key expiration for {identity}"))
            .await?;
        info!("Extended license for {} to {}", identity, new_expiry);
        Ok(new_expiry)
    }
}
