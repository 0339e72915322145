//! # HIS Analytics Backend
//!
//! Analytics table generation engine for a health information system.
//!
//! This crate builds and maintains the denormalized analytics tables the
//! reporting layer queries: event, enrollment, tracked entity, ownership,
//! validation result and completeness tables. Tables are rebuilt into
//! staging tables, populated with generated `insert into ... select`
//! statements and atomically swapped into place, with an incremental
//! "latest partition" path for frequent updates. A battery of data
//! integrity checks over the operational schema is exposed alongside.
//!
//! ## Architecture
//!
//! - [`models`]: metadata model (programs, attributes, organisation units)
//!   and the in-memory registry the table builders read from
//! - [`sql`]: SQL dialect strategies (PostgreSQL and Doris) behind the
//!   [`sql::SqlBuilder`] trait
//! - [`analytics`]: table definitions, column mappers, DDL generation,
//!   per-table-type managers and the update orchestration service
//! - [`db`]: the [`db::SqlEngine`] execution trait with Postgres and
//!   in-memory implementations behind feature flags
//! - [`integrity`]: named data integrity checks with summary and details
//!   runs
//! - [`services`]: background job tracking with live log streaming
//! - [`http`]: Axum-based REST API over the update and integrity services

pub mod analytics;
pub mod db;
pub mod integrity;
pub mod models;
pub mod services;
pub mod settings;
pub mod sql;

#[cfg(feature = "http-server")]
pub mod http;
