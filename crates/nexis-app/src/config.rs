//! Layered client configuration.
//!
//! Merge order, later wins: compiled defaults, `~/.config/dark-nexis/nexis.toml`,
//! `./nexis.toml`, then `NEXIS_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use nexis_mock::MockTiming;
use nexis_upload::UploadTimeouts;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AppError;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "NEXIS_";
/// Config file name looked up in the user config dir and the working dir.
pub const CONFIG_FILE_NAME: &str = "nexis.toml";
/// Directory under the platform config/data dirs.
pub const APP_DIR_NAME: &str = "dark-nexis";

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NexisConfig {
    /// Backend root URL.
    pub api_base_url: String,
    /// Token file location.
    pub session_path: PathBuf,
    /// Default log level when `RUST_LOG` is unset.
    pub log_level: String,
    /// Per-request time bounds.
    pub timeouts: TimeoutConfig,
    /// Pause between analysis polls.
    pub poll_interval_ms: u64,
    /// Pause between simulated upload checkpoints.
    pub mock_step_delay_ms: u64,
    /// Simulated analysis step pace in percent of the stock durations.
    pub mock_analysis_pace_percent: u32,
}

impl Default for NexisConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            session_path: default_session_path(),
            log_level: "info".to_string(),
            timeouts: TimeoutConfig::default(),
            poll_interval_ms: 2_000,
            mock_step_delay_ms: 1_000,
            mock_analysis_pace_percent: 100,
        }
    }
}

/// Time bounds in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Token request.
    pub login_secs: u64,
    /// Upload slot request.
    pub slot_secs: u64,
    /// Byte transfer.
    pub transfer_secs: u64,
    /// Analysis trigger.
    pub trigger_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            login_secs: 10,
            slot_secs: 15,
            transfer_secs: 30,
            trigger_secs: 15,
        }
    }
}

impl NexisConfig {
    /// Parsed backend URL.
    ///
    /// # Errors
    /// Returns [`AppError::InvalidConfig`] for unparsable or non-HTTP(S) URLs.
    pub fn base_url(&self) -> Result<Url, AppError> {
        let url = Url::parse(self.api_base_url.trim()).map_err(|error| {
            AppError::InvalidConfig(format!("api_base_url {:?}: {error}", self.api_base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::InvalidConfig(format!(
                "api_base_url must be http or https, got {}",
                url.scheme()
            )));
        }
        Ok(url)
    }

    /// Checks values that would otherwise fail later at runtime.
    ///
    /// # Errors
    /// Returns [`AppError::InvalidConfig`] naming the first bad key.
    pub fn validate(&self) -> Result<(), AppError> {
        self.base_url()?;

        let timeouts = [
            ("timeouts.login_secs", self.timeouts.login_secs),
            ("timeouts.slot_secs", self.timeouts.slot_secs),
            ("timeouts.transfer_secs", self.timeouts.transfer_secs),
            ("timeouts.trigger_secs", self.timeouts.trigger_secs),
            ("poll_interval_ms", self.poll_interval_ms),
        ];
        if let Some((key, _)) = timeouts.iter().find(|(_, value)| *value == 0) {
            return Err(AppError::InvalidConfig(format!("{key} must be positive")));
        }

        if self.session_path.as_os_str().is_empty() {
            return Err(AppError::InvalidConfig("session_path is empty".to_string()));
        }
        Ok(())
    }

    /// Login timeout.
    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.login_secs)
    }

    /// Upload step timeouts.
    pub fn upload_timeouts(&self) -> UploadTimeouts {
        UploadTimeouts {
            slot: Duration::from_secs(self.timeouts.slot_secs),
            transfer: Duration::from_secs(self.timeouts.transfer_secs),
            trigger: Duration::from_secs(self.timeouts.trigger_secs),
        }
    }

    /// Analysis poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Simulated upload and analysis pacing.
    pub fn mock_timing(&self) -> MockTiming {
        MockTiming {
            step_delay: Duration::from_millis(self.mock_step_delay_ms),
            analysis_pace_percent: self.mock_analysis_pace_percent,
        }
    }
}

/// Loads config from the standard locations with env overrides.
///
/// # Errors
/// Returns the figment error for malformed files or mistyped values.
pub fn load_config() -> Result<NexisConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(NexisConfig::default()))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
                .unwrap_or_default(),
        ))
        .merge(Toml::file(CONFIG_FILE_NAME))
        .merge(env_provider())
        .extract()
}

/// Loads config from one explicit file with env overrides.
///
/// # Errors
/// Returns the figment error for malformed files or mistyped values.
pub fn load_config_from_path(path: &Path) -> Result<NexisConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(NexisConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Loads config from TOML text only; no files or environment.
///
/// # Errors
/// Returns the figment error for malformed TOML or mistyped values.
pub fn load_config_from_str(toml_content: &str) -> Result<NexisConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(NexisConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Maps `NEXIS_TIMEOUTS_SLOT_SECS` to `timeouts.slot_secs`; other keys pass
/// through unchanged.
fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX).map(|key| key.as_str().replacen("timeouts_", "timeouts.", 1).into())
}

fn default_session_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(".nexis"))
        .join("session.json")
}
