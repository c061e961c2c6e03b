//! db-sync
//!
//! A daemon performing continuous one-way replication of relational
//! databases across three strata: table schema, row data, and procedural
//! objects (stored procedures, functions, triggers).
//!
//! # Features
//!
//! - MySQL and PostgreSQL sources and targets, in any combination
//! - Polling change detection over live tables: no binlog, WAL, or trigger
//!   infrastructure required on either side
//! - Primary-key set reconciliation for inserts and deletes; timestamp
//!   witness columns for updates
//! - Schema drift reconciliation with idempotent DDL
//! - Multiple independent source→target pairs per daemon
//!
//! # Architecture
//!
//! ```text
//! service::SyncService            (supervisor: one worker per enabled pair)
//!    │
//!    └─ worker::PairWorker        (connect, initial sync, two poll timers)
//!          ├─ schema::SchemaDiffer
//!          ├─ routine::RoutineSyncer
//!          └─ data::DataDiffer
//!                │
//!                └─ adapter::DatabaseAdapter   (mysql | postgres)
//! ```
//!
//! Everything that reads from or writes to a database flows through the
//! [`adapter::DatabaseAdapter`] trait; dialect differences (identifier
//! quoting, placeholder style, information-schema shape) live nowhere else.

pub mod adapter;
pub mod config;
pub mod daemon;
pub mod data;
pub mod error;
pub mod routine;
pub mod schema;
pub mod service;
pub mod testing;
pub mod worker;

pub use error::SyncError;
