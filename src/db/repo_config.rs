//! Repository configuration file support.
//!
//! This module provides utilities for reading repository configuration from
//! TOML configuration files.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::factory::RepositoryType;
use super::repository::RepositoryError;

/// Repository configuration from file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub repository: RepositorySettings,
    #[serde(default)]
    pub postgres: PostgresSettings,
}

/// Repository type settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositorySettings {
    #[serde(rename = "type")]
    pub repo_type: String,
}

/// Postgres connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresSettings {
    #[serde(default)]
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

// Keep in sync with the serde field default: a config without a [postgres]
// section goes through this impl, not the field attributes.
impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

impl RepositoryConfig {
    /// Load repository configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            RepositoryError::configuration(format!("Failed to read config file: {}", e))
        })?;

        let config: RepositoryConfig = toml::from_str(&content).map_err(|e| {
            RepositoryError::configuration(format!("Failed to parse config file: {}", e))
        })?;

        Ok(config)
    }

    /// Load repository configuration from the default location.
    ///
    /// Searches for `repository.toml` in the current directory and then the
    /// parent directory.
    pub fn from_default_location() -> Result<Self, RepositoryError> {
        let search_paths = vec![
            PathBuf::from("repository.toml"),
            PathBuf::from("../repository.toml"),
        ];

        for path in search_paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(RepositoryError::configuration(
            "No repository.toml found in standard locations",
        ))
    }

    /// Get the repository type from configuration.
    pub fn repository_type(&self) -> Result<RepositoryType, String> {
        RepositoryType::from_str(&self.repository.repo_type)
    }

    /// Convert to a Postgres config if this selects the Postgres backend.
    #[cfg(feature = "postgres-repo")]
    pub fn to_postgres_config(
        &self,
    ) -> Result<Option<super::repositories::postgres::PostgresConfig>, RepositoryError> {
        let repo_type = self.repository_type().map_err(|e| {
            RepositoryError::configuration(format!("Invalid repository type: {}", e))
        })?;

        if repo_type != RepositoryType::Postgres {
            return Ok(None);
        }

        if self.postgres.database_url.is_empty() {
            return Err(RepositoryError::configuration(
                "postgres.database_url must be set for the postgres repository",
            ));
        }

        Ok(Some(super::repositories::postgres::PostgresConfig {
            database_url: self.postgres.database_url.clone(),
            max_pool_size: self.postgres.max_connections,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let toml_str = r#"
            [repository]
            type = "local"
        "#;
        let config: RepositoryConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.repository_type(), Ok(RepositoryType::Local));
        assert_eq!(config.postgres.max_connections, 10);
    }

    #[test]
    fn test_missing_postgres_section_gets_field_defaults() {
        let config = PostgresSettings::default();
        assert_eq!(config.max_connections, default_max_connections());

        let parsed: PostgresSettings = toml::from_str("").unwrap();
        assert_eq!(parsed.max_connections, config.max_connections);
        assert!(parsed.database_url.is_empty());
    }

    #[test]
    fn test_parse_postgres_config() {
        let toml_str = r#"
            [repository]
            type = "postgres"

            [postgres]
            database_url = "postgres://localhost/alerts"
            max_connections = 4
        "#;
        let config: RepositoryConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.repository_type(), Ok(RepositoryType::Postgres));
        assert_eq!(config.postgres.max_connections, 4);
    }
}
