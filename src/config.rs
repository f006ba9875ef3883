//! Pipeline configuration.
//!
//! Configuration is an explicit object constructed once at process start and
//! passed into the pipeline, with defaults filled from a TOML file and
//! optional environment overrides. Repository/backend selection lives
//! separately in [`crate::db::RepositoryConfig`].

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Credentials for the automation user that owns alert-generated requests.
/// The user is upserted at the storage boundary on every ingestion, so first
/// use creates it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserCredentials {
    pub username: String,
    pub password: String,
    pub full_name: String,
}

impl Default for UserCredentials {
    fn default() -> Self {
        Self {
            username: "autoalert".to_string(),
            password: "autoalert".to_string(),
            full_name: "Automated alerts".to_string(),
        }
    }
}

/// Configuration for the ingestion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Automation user to attach meta-pointings to
    #[serde(default)]
    pub default_user: UserCredentials,
    /// Camera readout overhead added per exposure when computing the minimum
    /// visit time, in seconds
    #[serde(default = "default_readout_overhead")]
    pub readout_overhead_sec: f64,
    /// Pin tiled scheduling to a named grid instead of "latest defined".
    /// Leave unset to accept the newest grid row.
    #[serde(default)]
    pub grid_name: Option<String>,
}

fn default_readout_overhead() -> f64 {
    30.0
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_user: UserCredentials::default(),
            readout_overhead_sec: default_readout_overhead(),
            grid_name: None,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let config: PipelineConfig =
            toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides, then validate.
    ///
    /// # Environment Variables
    /// - `OBSALERT_USER`: automation username
    /// - `OBSALERT_PASSWORD`: automation password
    /// - `OBSALERT_USER_NAME`: automation user display name
    /// - `OBSALERT_READOUT_OVERHEAD_SEC`: per-exposure readout overhead
    /// - `OBSALERT_GRID`: pin scheduling to this grid name
    pub fn from_env() -> Result<Self, String> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("OBSALERT_USER") {
            config.default_user.username = val;
        }
        if let Ok(val) = std::env::var("OBSALERT_PASSWORD") {
            config.default_user.password = val;
        }
        if let Ok(val) = std::env::var("OBSALERT_USER_NAME") {
            config.default_user.full_name = val;
        }
        if let Ok(val) = std::env::var("OBSALERT_READOUT_OVERHEAD_SEC") {
            config.readout_overhead_sec = val
                .parse::<f64>()
                .map_err(|e| format!("Invalid OBSALERT_READOUT_OVERHEAD_SEC: {}", e))?;
        }
        if let Ok(val) = std::env::var("OBSALERT_GRID") {
            config.grid_name = Some(val);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check invariants once, at construction time.
    pub fn validate(&self) -> Result<(), String> {
        if self.default_user.username.is_empty() {
            return Err("default_user.username must not be empty".to_string());
        }
        if !self.readout_overhead_sec.is_finite() || self.readout_overhead_sec < 0.0 {
            return Err(format!(
                "readout_overhead_sec must be non-negative, got {}",
                self.readout_overhead_sec
            ));
        }
        if let Some(name) = &self.grid_name {
            if name.is_empty() {
                return Err("grid_name must not be empty when set".to_string());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.readout_overhead_sec, 30.0);
        assert!(config.grid_name.is_none());
    }

    #[test]
    fn test_parse_toml_with_partial_fields() {
        let toml = r#"
readout_overhead_sec = 20.0

[default_user]
username = "ops"
password = "secret"
full_name = "Ops automation"
"#;
        let config: PipelineConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.readout_overhead_sec, 20.0);
        assert_eq!(config.default_user.username, "ops");
    }

    #[test]
    fn test_negative_overhead_rejected() {
        let config = PipelineConfig {
            readout_overhead_sec: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
