use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{error::Error, Result};

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Filesystem path of the competition store.
    pub store_path: PathBuf,
    /// 64-character hex key sealing storefront credentials.
    pub encryption_key: String,
    /// Prize-ledger client settings.
    pub ledger: LedgerConfig,
    /// Revenue-source client settings.
    pub revenue: RevenueConfig,
    /// Background-job tuning.
    pub jobs: JobsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("cartbrawl.db"),
            encryption_key: String::new(),
            ledger: LedgerConfig::default(),
            revenue: RevenueConfig::default(),
            jobs: JobsConfig::default(),
        }
    }
}

impl Config {
    /// Validate settings that would otherwise fail deep inside a job run.
    pub fn validate(&self) -> Result<()> {
        if self.encryption_key.len() != 64
            || !self.encryption_key.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(Error::Config(
                "encryption_key must be a 64-character hex string".into(),
            ));
        }
        if self.ledger.api_key.is_empty() {
            return Err(Error::Config("ledger.api_key must be set".into()));
        }
        self.jobs.validate()
    }
}

/// Settings for the prize-ledger client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Base URL of the ledger API.
    pub base_url: String,
    /// API key authorizing ledger calls.
    pub api_key: String,
    /// Ledger user the service acts on behalf of, if any.
    pub agent_user_id: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.whop.com".into(),
            api_key: String::new(),
            agent_user_id: None,
            timeout_secs: 30,
        }
    }
}

/// Settings for the revenue-source client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RevenueConfig {
    /// Storefront Admin API version.
    pub api_version: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RevenueConfig {
    fn default() -> Self {
        Self {
            api_version: "2023-10".into(),
            timeout_secs: 30,
        }
    }
}

/// Background-job tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Expected seconds between job-runner invocations.
    pub cadence_secs: u64,
    /// Minimum seconds between revenue syncs of one participant.
    pub resync_interval_secs: u64,
    /// Lower edge of the reminder window, minutes before start or end.
    pub lead_min_minutes: i64,
    /// Upper edge of the reminder window, minutes before start or end.
    pub lead_max_minutes: i64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            cadence_secs: 60,
            resync_interval_secs: 300,
            lead_min_minutes: 10,
            lead_max_minutes: 60,
        }
    }
}

impl JobsConfig {
    fn validate(&self) -> Result<()> {
        if self.cadence_secs == 0 {
            return Err(Error::Config("jobs.cadence_secs must be positive".into()));
        }
        if self.resync_interval_secs == 0 {
            return Err(Error::Config(
                "jobs.resync_interval_secs must be positive".into(),
            ));
        }
        if self.lead_min_minutes < 0 || self.lead_max_minutes <= self.lead_min_minutes {
            return Err(Error::Config(
                "jobs reminder window must satisfy 0 <= lead_min < lead_max".into(),
            ));
        }
        // A window narrower than 1.5 cadences can fall entirely between two
        // runs, silently skipping reminders.
        let window_secs = (self.lead_max_minutes - self.lead_min_minutes) * 60;
        if (window_secs as u64) * 2 < self.cadence_secs * 3 {
            return Err(Error::Config(
                "jobs reminder window must span at least 1.5 cadences".into(),
            ));
        }
        Ok(())
    }

    /// Minimum interval between revenue syncs of one participant.
    pub fn resync_interval(&self) -> Duration {
        Duration::seconds(self.resync_interval_secs as i64)
    }

    /// Reminder window `(now + lead_min, now + lead_max]`.
    pub fn reminder_window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            now + Duration::minutes(self.lead_min_minutes),
            now + Duration::minutes(self.lead_max_minutes),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            encryption_key: "0".repeat(64),
            ledger: LedgerConfig {
                api_key: "key".into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn defaults_validate_once_secrets_are_set() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn rejects_bad_encryption_key() {
        let mut config = valid();
        config.encryption_key = "abc".into();
        assert!(config.validate().is_err());
        config.encryption_key = "g".repeat(64);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_missing_api_key() {
        let mut config = valid();
        config.ledger.api_key.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_window_narrower_than_cadence() {
        let mut config = valid();
        config.jobs.cadence_secs = 600;
        config.jobs.lead_min_minutes = 10;
        config.jobs.lead_max_minutes = 20;
        // 10-minute window, 1.5 cadences would need 15 minutes.
        assert!(config.validate().is_err());
        config.jobs.lead_max_minutes = 25;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_inverted_window() {
        let mut config = valid();
        config.jobs.lead_min_minutes = 60;
        config.jobs.lead_max_minutes = 10;
        assert!(config.validate().is_err());
    }
}
