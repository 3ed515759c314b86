//! License records and the key ledger.
//!
//! Licenses live in a single JSON array (the "ledger") shared with other
//! tooling, so records keep their established field names and any fields
//! this crate doesn't know about are carried through untouched. Every
//! mutation is a read-modify-write of the whole ledger; the last writer
//! wins.

pub mod file;
pub mod github;

pub use file::FileLicenseStore;
pub use github::GithubLicenseStore;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, TaskgateError};
use crate::progress::Identity;

/// Hours added to a license when a session is completed.
pub const REWARD_HOURS: i64 = 1;

/// Validity of a freshly issued license, in hours.
pub const INITIAL_GRANT_HOURS: i64 = 24;

const KEY_PREFIX: &str = "QV-";
const KEY_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const KEY_GROUPS: usize = 4;
const KEY_GROUP_LEN: usize = 4;

// Account fields other tooling writes into each record. They stay raw JSON
// in `extra` so a foreign or legacy value can't make the ledger unreadable.
const CREATED_AT: &str = "createdAt";
const ALT_GEN: &str = "AltGen";
const BLACKLISTED: &str = "Blacklisted";
const EXEC_AMT: &str = "ExecAmt";
const ACCOUNT_EMAIL: &str = "accountEmail";
const ACCOUNT_PASSWORD: &str = "accountPassword";
const WEBSITE_PURCHASE: &str = "websitePurchase";

/// One entry of the license ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseRecord {
    #[serde(rename = "discordID")]
    pub discord_id: String,
    pub key: String,
    #[serde(rename = "expiresAt")]
    pub expires_at: DateTime<Utc>,
    #[serde(rename = "Note", default)]
    pub note: String,
    /// Everything else, untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LicenseRecord {
    /// New website-issued license valid for [`INITIAL_GRANT_HOURS`].
    pub fn issue(identity: &Identity, display_name: &str, key: String, now: DateTime<Utc>) -> Self {
        let mut extra = Map::new();
        extra.insert(
            CREATED_AT.into(),
            Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        extra.insert(ALT_GEN.into(), Value::Bool(false));
        extra.insert(BLACKLISTED.into(), Value::Bool(false));
        extra.insert(EXEC_AMT.into(), Value::from(0));
        extra.insert(ACCOUNT_EMAIL.into(), Value::String(String::new()));
        extra.insert(ACCOUNT_PASSWORD.into(), Value::String(String::new()));
        extra.insert(WEBSITE_PURCHASE.into(), Value::Bool(true));

        Self {
            discord_id: identity.as_str().to_string(),
            key,
            expires_at: now + Duration::hours(INITIAL_GRANT_HOURS),
            note: format!("Created via website for {display_name}"),
            extra,
        }
    }

    /// Copy without the account credentials, for handing to clients.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for field in [ACCOUNT_EMAIL, ACCOUNT_PASSWORD] {
            if let Some(value) = copy.extra.get_mut(field) {
                *value = Value::String(String::new());
            }
        }
        copy
    }

    /// Whether the record was bought through the website. Missing or
    /// non-boolean values count as no.
    #[must_use]
    pub fn website_purchase(&self) -> bool {
        self.extra
            .get(WEBSITE_PURCHASE)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    #[must_use]
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        (self.expires_at > now).then(|| self.expires_at - now)
    }

    /// Human summary of the remaining time: `"2d 3h remaining"`,
    /// `"3h 5m remaining"`, `"5m remaining"` or `"Expired"`.
    #[must_use]
    pub fn time_remaining_label(&self, now: DateTime<Utc>) -> String {
        let Some(left) = self.time_remaining(now) else {
            return "Expired".to_string();
        };
        let days = left.num_days();
        let hours = left.num_hours() % 24;
        let minutes = left.num_minutes() % 60;
        if days > 0 {
            format!("{days}d {hours}h remaining")
        } else if hours > 0 {
            format!("{hours}h {minutes}m remaining")
        } else {
            format!("{minutes}m remaining")
        }
    }
}

/// Generate a key of the form `QV-XXXX-XXXX-XXXX-XXXX`.
pub fn generate_key(rng: &mut impl Rng) -> String {
    let groups: Vec<String> = (0..KEY_GROUPS)
        .map(|_| {
            (0..KEY_GROUP_LEN)
                .map(|_| KEY_ALPHABET[rng.gen_range(0..KEY_ALPHABET.len())] as char)
                .collect()
        })
        .collect();
    format!("{KEY_PREFIX}{}", groups.join("-"))
}

/// Outcome of issuing a license.
#[derive(Debug, Clone, PartialEq)]
pub struct Issued {
    pub record: LicenseRecord,
    /// `false` when an existing record was returned.
    pub created: bool,
}

/// The full list of license records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LicenseLedger {
    records: Vec<LicenseRecord>,
}

impl LicenseLedger {
    #[must_use]
    pub fn new(records: Vec<LicenseRecord>) -> Self {
        Self { records }
    }

    /// Parse a ledger document.
    ///
    /// # Errors
    ///
    /// Unlike local progress, a malformed ledger is never discarded: it is
    /// shared state and overwriting it would lose other users' licenses.
    pub fn from_json(json: &str) -> Result<Self> {
        let records = serde_json::from_str(json)
            .map_err(|e| TaskgateError::license_lookup(format!("Unreadable ledger: {e}")))?;
        Ok(Self { records })
    }

    /// Pretty-printed ledger document.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.records)?)
    }

    #[must_use]
    pub fn records(&self) -> &[LicenseRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn find(&self, identity: &Identity) -> Option<&LicenseRecord> {
        self.records
            .iter()
            .find(|r| r.discord_id == identity.as_str())
    }

    /// Return the existing license for `identity` or append a new one.
    pub fn issue(
        &mut self,
        identity: &Identity,
        display_name: &str,
        now: DateTime<Utc>,
        rng: &mut impl Rng,
    ) -> Issued {
        if let Some(existing) = self.find(identity) {
            return Issued {
                record: existing.clone(),
                created: false,
            };
        }
        let record = LicenseRecord::issue(identity, display_name, generate_key(rng), now);
        self.records.push(record.clone());
        Issued {
            record,
            created: true,
        }
    }

    /// Add `hours` to the expiry of `identity`'s license.
    ///
    /// # Errors
    ///
    /// Returns [`TaskgateError::LicenseLookup`] if there is no such license.
    pub fn extend(&mut self, identity: &Identity, hours: i64) -> Result<DateTime<Utc>> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.discord_id == identity.as_str())
            .ok_or_else(|| TaskgateError::license_lookup(format!("No license for {identity}")))?;
        record.expires_at += Duration::seconds(hours * 3600);
        Ok(record.expires_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_generate_key_format() {
        let mut rng = StdRng::seed_from_u64(7);
        let key = generate_key(&mut rng);

        assert_eq!(key.len(), 3 + 16 + 3);
        assert!(key.starts_with("QV-"));
        let groups: Vec<&str> = key[3..].split('-').collect();
        assert_eq!(groups.len(), 4);
        for group in groups {
            assert_eq!(group.len(), 4);
            assert!(group
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_issue_is_idempotent() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut ledger = LicenseLedger::default();
        let id = Identity::new("42");

        let first = ledger.issue(&id, "alice", now(), &mut rng);
        assert!(first.created);
        assert_eq!(first.record.expires_at, now() + Duration::hours(24));
        assert_eq!(first.record.note, "Created via website for alice");
        assert!(first.record.website_purchase());
        assert_eq!(first.record.extra["ExecAmt"], 0);

        let second = ledger.issue(&id, "alice", now() + Duration::hours(1), &mut rng);
        assert!(!second.created);
        assert_eq!(second.record.key, first.record.key);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_extend_adds_hours() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut ledger = LicenseLedger::default();
        let id = Identity::new("42");
        let issued = ledger.issue(&id, "alice", now(), &mut rng);

        let new_expiry = ledger.extend(&id, REWARD_HOURS).unwrap();
        assert_eq!(new_expiry, issued.record.expires_at + Duration::hours(1));
        assert_eq!(ledger.find(&id).unwrap().expires_at, new_expiry);
    }

    #[test]
    fn test_extend_missing_license_fails() {
        let mut ledger = LicenseLedger::default();
        let err = ledger.extend(&Identity::new("nobody"), 1).unwrap_err();
        assert!(matches!(err, TaskgateError::LicenseLookup { .. }));
    }

    #[test]
    fn test_ledger_preserves_unknown_fields() {
        let json = r#"[{
            "AltGen": false, "Blacklisted": false, "ExecAmt": 3, "Note": "legacy",
            "accountEmail": "a@b.c", "accountPassword": "hunter2",
            "createdAt": "2024-01-01T00:00:00.000Z", "discordID": "42",
            "expiresAt": "2024-01-02T00:00:00.000Z", "key": "QV-AAAA-BBBB-CCCC-DDDD",
            "websitePurchase": false, "HWID": "abc"
        }]"#;
        let ledger = LicenseLedger::from_json(json).unwrap();
        let record = ledger.find(&Identity::new("42")).unwrap();
        assert_eq!(record.extra["ExecAmt"], 3);
        assert_eq!(record.extra["HWID"], "abc");
        assert!(!record.website_purchase());

        let written = ledger.to_json().unwrap();
        assert!(written.contains("\"HWID\""));
        assert!(written.contains("\"discordID\""));
        assert!(written.contains("\"accountPassword\": \"hunter2\""));
    }

    #[test]
    fn test_foreign_account_values_do_not_break_the_ledger() {
        let json = r#"[
            {"discordID": "1", "key": "QV-AAAA-AAAA-AAAA-AAAA",
             "expiresAt": "2025-03-02T00:00:00.000Z", "createdAt": "", "ExecAmt": -1},
            {"discordID": "2", "key": "QV-BBBB-BBBB-BBBB-BBBB",
             "expiresAt": "2025-03-02T00:00:00.000Z", "AltGen": "yes", "websitePurchase": null}
        ]"#;
        let mut ledger = LicenseLedger::from_json(json).unwrap();
        assert_eq!(ledger.len(), 2);

        let new_expiry = ledger.extend(&Identity::new("2"), 1).unwrap();
        assert_eq!(new_expiry, Utc.with_ymd_and_hms(2025, 3, 2, 1, 0, 0).unwrap());

        let written = ledger.to_json().unwrap();
        assert!(written.contains("\"createdAt\": \"\""));
        assert!(written.contains("\"ExecAmt\": -1"));
        assert!(written.contains("\"AltGen\": \"yes\""));
    }

    #[test]
    fn test_malformed_ledger_is_an_error() {
        let err = LicenseLedger::from_json("{oops").unwrap_err();
        assert!(matches!(err, TaskgateError::LicenseLookup { .. }));
    }

    #[test]
    fn test_redacted_hides_credentials() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut record =
            LicenseRecord::issue(&Identity::new("1"), "bob", generate_key(&mut rng), now());
        record.extra.insert("accountEmail".into(), "bob@example.com".into());
        record.extra.insert("accountPassword".into(), "pw".into());

        let redacted = record.redacted();
        assert_eq!(redacted.extra["accountEmail"], "");
        assert_eq!(redacted.extra["accountPassword"], "");
        assert_eq!(redacted.key, record.key);
        assert_eq!(record.extra["accountPassword"], "pw");
    }

    #[test]
    fn test_time_remaining_label() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut record =
            LicenseRecord::issue(&Identity::new("1"), "bob", generate_key(&mut rng), now());

        record.expires_at = now() + Duration::days(2) + Duration::hours(3);
        assert_eq!(record.time_remaining_label(now()), "2d 3h remaining");

        record.expires_at = now() + Duration::hours(3) + Duration::minutes(5);
        assert_eq!(record.time_remaining_label(now()), "3h 5m remaining");

        record.expires_at = now() + Duration::minutes(5);
        assert_eq!(record.time_remaining_label(now()), "5m remaining");

        record.expires_at = now();
        assert_eq!(record.time_remaining_label(now()), "Expired");
        assert!(record.is_expired(now()));
    }
}
