//! Data stratum: the per-table change-detection differ.

pub mod differ;

pub use differ::{DataDiffer, TableSyncState, TickReport, DELETE_BATCH, FETCH_BATCH};
