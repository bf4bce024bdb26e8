//! Bulk CSV loads that fully replace a destination table.
//!
//! Every load is submitted with a `TRUNCATE` write disposition, so loading
//! the same file twice leaves the table exactly as loading it once.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use ledger_core::error::LoadError;
use ledger_core::models::{LoadJobConfig, LoadRequest, LoadSummary};
use ledger_core::settings::WarehouseConfig;
use ledger_core::store::BulkLoadStore;
use tracing::{info, warn};

/// Loads local CSV files into tables of the backing store.
pub struct TableLoader {
    store: Arc<dyn BulkLoadStore>,
    config: WarehouseConfig,
}

impl TableLoader {
    pub fn new(store: Arc<dyn BulkLoadStore>, config: WarehouseConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &WarehouseConfig {
        &self.config
    }

    /// Replace `destination_table` with the rows of `source_path`.
    ///
    /// Blocks until the backing job finishes. Never retries; a failed job
    /// leaves the table as it was.
    pub fn load(&self, request: &LoadRequest) -> Result<LoadSummary, LoadError> {
        let mut file = open_source(&request.source_path)?;

        let table = self
            .config
            .table_ref(&request.destination_table)
            .map_err(|e| LoadError::LoadFailed {
                table: request.destination_table.clone(),
                reason: e.to_string(),
            })?;
        let job_config = LoadJobConfig::csv_truncate(request.header_rows_to_skip);

        let job = self
            .store
            .submit_load(&mut file, &table, &job_config)
            .map_err(|e| {
                warn!(table = %table, error = %format!("{e:#}"), "load job rejected");
                LoadError::load_failed(table.to_string(), &e)
            })?;
        drop(file);

        info!(
            table = %table,
            job_id = job.job_id(),
            path = %request.source_path.display(),
            "load job submitted"
        );

        let stats = job.await_completion().map_err(|e| {
            warn!(table = %table, error = %format!("{e:#}"), "load job failed");
            LoadError::load_failed(table.to_string(), &e)
        })?;

        info!(table = %table, job_id = %stats.job_id, rows = stats.output_rows, "table replaced");
        Ok(LoadSummary {
            table: table.to_string(),
            job_id: stats.job_id,
            rows_loaded: stats.output_rows,
        })
    }

    /// Shorthand for [`TableLoader::load`].
    pub fn load_csv(
        &self,
        source_path: impl AsRef<Path>,
        destination_table: &str,
        header_rows_to_skip: usize,
    ) -> Result<LoadSummary, LoadError> {
        let request = LoadRequest::new(source_path.as_ref(), destination_table)
            .with_header_rows_to_skip(header_rows_to_skip);
        self.load(&request)
    }
}

/// Open the source for reading. Directories count as unreadable.
fn open_source(path: &Path) -> Result<File, LoadError> {
    let not_found = |source| LoadError::FileNotFound {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(not_found)?;
    let meta = file.metadata().map_err(not_found)?;
    if !meta.is_file() {
        return Err(not_found(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "not a regular file",
        )));
    }
    Ok(file)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
