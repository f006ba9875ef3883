//! # obsalert
//!
//! Transient-alert ingestion for a shared observation database.
//!
//! This crate turns astronomical transient alerts (VOEvent notices for
//! gravitational-wave and gamma-ray-burst events) into scheduled observation
//! requests. Each incoming event is reconciled against prior notices for the
//! same astrophysical source, its observing strategy is expanded into typed
//! scheduling parameters, its probability skymap is projected onto the survey
//! tiling grid, and the resulting set of linked records (event, survey,
//! meta-pointings with exposure sets and a queued first pointing) is written
//! to the database in a single transaction.
//!
//! ## Architecture
//!
//! The crate is organized into several logical modules:
//!
//! - [`models`]: Alert objects, typed observing strategies, and the persisted
//!   record types with their status enums
//! - [`grid`]: The narrow interface over the external sky-tiling library
//!   (grid construction, skymap application, tile tables)
//! - [`db`]: Database operations via the Repository pattern, with in-memory
//!   and Postgres backends
//! - [`services`]: The ingestion pipeline itself (deduplication, strategy
//!   derivation, tile resolution, plan building)
//! - [`config`]: Explicit pipeline configuration, loaded once at process start
//!
//! ## Scope
//!
//! VOEvent parsing, alert transport, and the skymap geometry itself are
//! external collaborators; this crate consumes an already-parsed
//! [`models::Event`] and a [`grid::SkyGridEngine`] implementation.

// Allow large error types - RepositoryError contains rich context for debugging
#![allow(clippy::result_large_err)]

pub mod config;

pub mod db;
pub mod grid;
pub mod models;

pub mod services;
