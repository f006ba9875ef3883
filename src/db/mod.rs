//! Database module for observation-plan storage.
//!
//! This module provides abstractions for database operations via the
//! Repository pattern, allowing different storage backends to be swapped
//! easily.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Pipeline Layer (services) - alert handling             │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Repository Trait (repository) - Abstract Interface     │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//!     ┌───────────────┴────────────────┐
//!     │                                │
//! ┌───▼──────────────────┐  ┌──────────▼──────────────┐
//! │ Postgres Repository  │  │  Local Repository       │
//! │ (Diesel)             │  │  (in-memory)            │
//! └──────────────────────┘  └─────────────────────────┘
//! ```
//!
//! Each repository operation is internally transactional, so callers never
//! see a partially stored plan and never manage transactions themselves.

#[cfg(not(any(feature = "local-repo", feature = "postgres-repo")))]
compile_error!("at least one repository backend must be enabled: feature \"local-repo\" or \"postgres-repo\"");

pub mod factory;
pub mod repo_config;
pub mod repositories;
pub mod repository;

#[cfg(feature = "postgres-repo")]
pub use repositories::postgres::PostgresConfig;

pub use repo_config::RepositoryConfig;

pub use factory::{RepositoryFactory, RepositoryType};
#[cfg(feature = "local-repo")]
pub use repositories::LocalRepository;
#[cfg(feature = "postgres-repo")]
pub use repositories::PostgresRepository;
pub use repository::{AlertRepository, ErrorContext, RepositoryError, RepositoryResult};
