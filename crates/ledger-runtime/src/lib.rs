//! Runtime layer of the ledger pipeline.
//!
//! Moves blocking loads and summaries onto worker threads, stages uploaded
//! files on disk, and exposes both operations over HTTP.

pub mod http;
pub mod jobs;

pub use ledger_core as core;
pub use ledger_data as data;
