use std::path::PathBuf;
use thiserror::Error;

/// Outcome of a failed table load.
///
/// Loads report failure as a value so the HTTP and CLI layers can surface the
/// message without unwinding. Only two things can go wrong: the source file is
/// missing, or the backing store refused or failed the job.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The source file could not be opened. No job was submitted.
    #[error("Source file {path} is not readable: {source}")]
    FileNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backing store rejected or failed the load job.
    #[error("Failed to load table {table}: {reason}")]
    LoadFailed { table: String, reason: String },
}

impl LoadError {
    /// Build a [`LoadError::LoadFailed`] from a collaborator error, keeping the
    /// whole cause chain in the reason text.
    pub fn load_failed(table: impl Into<String>, err: &anyhow::Error) -> Self {
        LoadError::LoadFailed {
            table: table.into(),
            reason: format!("{err:#}"),
        }
    }
}

/// All other errors produced by the ledger pipeline.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The row-query collaborator could not serve the ledger rows.
    #[error("Query against {table} failed: {reason}")]
    QueryFailed { table: String, reason: String },

    /// A granularity other than `day` or `month` was requested.
    #[error("Invalid granularity: {0} (expected \"day\" or \"month\")")]
    InvalidGranularity(String),

    /// The ledger table has never been loaded.
    #[error("Table {0} does not exist")]
    TableNotFound(String),

    /// A fetched row could not be decoded into a ledger row.
    #[error("Invalid ledger row {index}: {reason}")]
    InvalidRow { index: usize, reason: String },

    /// A sum left the range of the decimal amount type.
    #[error("Amount overflow while summing {period}")]
    AmountOverflow { period: String },

    /// A logical table name is empty or not a valid identifier.
    #[error("Invalid table name: {0:?}")]
    InvalidTableName(String),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A table load failed.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias used throughout the ledger crates.
pub type Result<T> = std::result::Result<T, LedgerError>;
