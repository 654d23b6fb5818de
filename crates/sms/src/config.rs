//! Configuration loading for the SMS engine
//!
//! Supports loading API credentials from (in order of priority):
//! 1. JSON file (~/.config/courier/voipms-credentials.json)
//! 2. Runtime environment variables (fallback)

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Error;

/// Credentials filename in the config directory
const CREDENTIALS_FILE: &str = "voipms-credentials.json";

/// Persisted sync settings filename in the config directory
const SETTINGS_FILE: &str = "sync-settings.json";

/// API credentials for the remote SMS provider
#[derive(Debug, Clone, Deserialize)]
pub struct VoipCredentials {
    pub username: String,
    pub password: String,
}

impl VoipCredentials {
    /// Load credentials using the following priority:
    /// 1. JSON file (~/.config/courier/voipms-credentials.json)
    /// 2. Runtime environment variables
    pub fn load() -> Result<Self> {
        if config::config_exists(CREDENTIALS_FILE) {
            return config::load_json(CREDENTIALS_FILE);
        }

        Self::from_env()
    }

    /// Load credentials from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        config::load_json_file(path)
    }

    /// Parse credentials from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse credentials JSON")
    }

    /// Load credentials from environment variables
    pub fn from_env() -> Result<Self> {
        let username = std::env::var("VOIPMS_API_USERNAME")
            .context("VOIPMS_API_USERNAME environment variable not set")?;
        let password = std::env::var("VOIPMS_API_PASSWORD")
            .context("VOIPMS_API_PASSWORD environment variable not set")?;

        Ok(Self { username, password })
    }

    /// Check if credentials are available (file or env vars)
    pub fn is_available() -> bool {
        if config::config_exists(CREDENTIALS_FILE) {
            return true;
        }
        std::env::var("VOIPMS_API_USERNAME").is_ok()
            && std::env::var("VOIPMS_API_PASSWORD").is_ok()
    }
}

fn default_max_window_days() -> i64 {
    90
}

fn default_true() -> bool {
    true
}

/// Per-line synchronization settings
///
/// The boolean flags mirror what a settings screen would expose; the engine
/// narrows them further for forced-recent sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// The account identifier whose messages are synchronized.
    pub line: String,

    /// Lower bound of history the engine will ever retrieve.
    pub start_date: NaiveDate,

    /// Retrieve only messages newer than the newest local one instead of the
    /// whole window span.
    #[serde(default)]
    pub retrieve_only_recent_messages: bool,

    /// Resurrect locally tombstoned rows that still exist remotely.
    #[serde(default)]
    pub retrieve_deleted_messages: bool,

    /// Push local tombstones to the remote store before retrieving.
    #[serde(default = "default_true")]
    pub propagate_local_deletions: bool,

    /// Remove local rows that disappeared from the remote store.
    #[serde(default)]
    pub propagate_remote_deletions: bool,

    /// Upper bound on a single retrieval window, in days.
    #[serde(default = "default_max_window_days")]
    pub max_window_days: i64,
}

impl SyncSettings {
    pub fn new(line: impl Into<String>, start_date: NaiveDate) -> Self {
        Self {
            line: line.into(),
            start_date,
            retrieve_only_recent_messages: false,
            retrieve_deleted_messages: false,
            propagate_local_deletions: true,
            propagate_remote_deletions: false,
            max_window_days: default_max_window_days(),
        }
    }

    /// Load the persisted settings, if any have been saved.
    pub fn load() -> Result<Option<Self>> {
        if !config::config_exists(SETTINGS_FILE) {
            return Ok(None);
        }
        config::load_json(SETTINGS_FILE).map(Some)
    }

    /// Persist the settings for later runs.
    pub fn save(&self) -> Result<()> {
        config::save_json(SETTINGS_FILE, self)
    }

    /// Reject settings a session cannot run with.
    pub fn validate(&self) -> Result<(), Error> {
        if self.line.trim().is_empty() {
            return Err(Error::Config("no line configured".to_string()));
        }
        if self.max_window_days <= 0 {
            return Err(Error::Config(format!(
                "max_window_days must be positive, got {}",
                self.max_window_days
            )));
        }
        Ok(())
    }
}
