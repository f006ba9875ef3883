//! Repository factory for dependency injection.
//!
//! This module provides utilities for creating and configuring repository
//! instances based on runtime configuration.

use std::sync::Arc;

#[cfg(feature = "local-repo")]
use super::repositories::LocalRepository;
#[cfg(feature = "postgres-repo")]
use super::repositories::PostgresRepository;
#[cfg(feature = "postgres-repo")]
use super::repositories::postgres::PostgresConfig;
use super::repository::{AlertRepository, RepositoryResult};

/// Repository type configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryType {
    /// Postgres via Diesel (production)
    Postgres,
    /// In-memory repository for tests and local development
    Local,
}

impl RepositoryType {
    /// Parse repository type from string ("postgres", "local").
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "postgres" => Ok(Self::Postgres),
            "local" => Ok(Self::Local),
            _ => Err(format!("Unknown repository type: {}", s)),
        }
    }

    /// Get repository type from the `REPOSITORY_TYPE` environment variable.
    /// Defaults to Local if not set.
    pub fn from_env() -> Self {
        std::env::var("REPOSITORY_TYPE")
            .ok()
            .and_then(|s| Self::from_str(&s).ok())
            .unwrap_or(Self::Local)
    }
}

/// Repository factory for creating repository instances.
///
/// # Example
/// ```
/// use obsalert::db::{RepositoryFactory, RepositoryType};
///
/// let repo = RepositoryFactory::create(RepositoryType::Local);
/// ```
pub struct RepositoryFactory;

impl RepositoryFactory {
    /// Create a repository instance based on type.
    pub fn create(repo_type: RepositoryType) -> RepositoryResult<Arc<dyn AlertRepository>> {
        match repo_type {
            #[cfg(feature = "postgres-repo")]
            RepositoryType::Postgres => {
                let config = PostgresConfig::from_env()
                    .map_err(super::repository::RepositoryError::configuration)?;
                Ok(Self::create_postgres(&config)?)
            }
            #[cfg(not(feature = "postgres-repo"))]
            RepositoryType::Postgres => Err(super::repository::RepositoryError::configuration(
                "Postgres repository requires the postgres-repo feature",
            )),
            #[cfg(feature = "local-repo")]
            RepositoryType::Local => Ok(Self::create_local()),
            #[cfg(not(feature = "local-repo"))]
            RepositoryType::Local => Err(super::repository::RepositoryError::configuration(
                "Local repository requires the local-repo feature",
            )),
        }
    }

    /// Create a Postgres repository, running pending migrations.
    #[cfg(feature = "postgres-repo")]
    pub fn create_postgres(
        config: &PostgresConfig,
    ) -> RepositoryResult<Arc<dyn AlertRepository>> {
        let repo = PostgresRepository::new(config.clone())?;
        Ok(Arc::new(repo))
    }

    /// Create an in-memory local repository.
    #[cfg(feature = "local-repo")]
    pub fn create_local() -> Arc<dyn AlertRepository> {
        Arc::new(LocalRepository::new())
    }

    /// Create repository from environment configuration.
    ///
    /// Reads `REPOSITORY_TYPE` to decide which backend to create.
    pub fn from_env() -> RepositoryResult<Arc<dyn AlertRepository>> {
        Self::create(RepositoryType::from_env())
    }
}
