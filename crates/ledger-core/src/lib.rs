//! Shared foundation for the ledger pipeline.
//!
//! Error taxonomy, domain models, warehouse configuration and the traits
//! the backing data store must implement.

pub mod error;
pub mod models;
pub mod settings;
pub mod store;

pub use error::{LedgerError, LoadError, Result};
