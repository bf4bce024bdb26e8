//! Data layer of the ledger pipeline.
//!
//! Loads CSV files into warehouse tables, summarizes ledger rows into
//! per-period cash-flow totals, and provides the local and in-memory
//! backing stores.

pub mod aggregator;
pub mod loader;
pub mod store;
pub mod table;

pub use aggregator::PeriodAggregator;
pub use loader::TableLoader;
pub use ledger_core as core;
