//! Bridges the blocking pipeline calls into async request handling.
//!
//! Loads and summaries block on the backing store, so they run on tokio's
//! blocking pool instead of an executor thread. A worker that panics is
//! reported as an ordinary error value. Upload staging writes go through
//! `tokio::fs`.

use std::path::Path;
use std::sync::Arc;

use anyhow::anyhow;
use ledger_core::error::{LedgerError, LoadError, Result};
use ledger_core::models::{Granularity, LoadRequest, LoadSummary, PeriodSummary};
use ledger_data::{PeriodAggregator, TableLoader};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

/// Run [`TableLoader::load`] on the blocking pool.
pub async fn load_in_background(
    loader: Arc<TableLoader>,
    request: LoadRequest,
) -> std::result::Result<LoadSummary, LoadError> {
    let table = request.destination_table.clone();
    match tokio::task::spawn_blocking(move || loader.load(&request)).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(table = %table, error = %e, "load worker stopped");
            Err(LoadError::LoadFailed {
                table,
                reason: format!("load worker stopped: {e}"),
            })
        }
    }
}

/// Run [`PeriodAggregator::summarize`] on the blocking pool.
pub async fn summarize_in_background(
    aggregator: Arc<PeriodAggregator>,
    granularity: Granularity,
) -> Result<Vec<PeriodSummary>> {
    tokio::task::spawn_blocking(move || aggregator.summarize(granularity))
        .await
        .map_err(|e| LedgerError::Other(anyhow!("summary worker stopped: {e}")))?
}

// ── StagedUpload ──────────────────────────────────────────────────────────────

/// An uploaded file staged on local disk for the loader.
///
/// The file is deleted when the value is dropped, whatever the load outcome.
#[derive(Debug)]
pub struct StagedUpload {
    file: NamedTempFile,
    writer: tokio::fs::File,
    bytes: u64,
}

impl StagedUpload {
    /// Create an empty staging file inside `dir`.
    pub async fn create(dir: &Path) -> std::io::Result<Self> {
        let dir = dir.to_path_buf();
        let file = tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&dir)?;
            tempfile::Builder::new()
                .prefix("upload-")
                .suffix(".csv")
                .tempfile_in(&dir)
        })
        .await
        .map_err(std::io::Error::other)??;
        let writer = tokio::fs::File::from_std(file.as_file().try_clone()?);
        Ok(Self {
            file,
            writer,
            bytes: 0,
        })
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(chunk).await?;
        self.bytes += chunk.len() as u64;
        Ok(())
    }

    /// Flush buffered data so the loader sees the whole upload.
    pub async fn finish(&mut self) -> std::io::Result<()> {
        self.writer.flush().await
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn len(&self) -> u64 {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes == 0
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::settings::WarehouseConfig;
    use ledger_data::store::MemoryWarehouse;
    use ledger_data::table::Table;

    fn loader(wh: &MemoryWarehouse) -> Arc<TableLoader> {
        Arc::new(TableLoader::new(Arc::new(wh.clone()), WarehouseConfig::default()))
    }

    #[tokio::test]
    async fn test_staged_upload_removed_on_drop() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut staged = StagedUpload::create(dir.path()).await.unwrap();
        staged.write_chunk(b"date,predicted,").await.unwrap();
        staged.write_chunk(b"realized\n").await.unwrap();
        staged.finish().await.unwrap();

        let path = staged.path().to_path_buf();
        assert!(path.is_file());
        assert_eq!(staged.len(), 24);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "date,predicted,realized\n"
        );
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("upload-"));

        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_load_in_background() {
        let dir = tempfile::TempDir::new().unwrap();
        let wh = MemoryWarehouse::new();

        let mut staged = StagedUpload::create(dir.path()).await.unwrap();
        staged
            .write_chunk(b"date,predicted,realized\n2025-01-01,100,90\n")
            .await
            .unwrap();
        staged.finish().await.unwrap();

        let summary = load_in_background(loader(&wh), LoadRequest::new(staged.path(), "ledger"))
            .await
            .unwrap();
        assert_eq!(summary.rows_loaded, 1);
    }

    #[tokio::test]
    async fn test_load_in_background_missing_file() {
        let wh = MemoryWarehouse::new();
        let err = load_in_background(loader(&wh), LoadRequest::new("/nonexistent/path", "ledger"))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::FileNotFound { .. }));
        assert_eq!(wh.submitted_jobs(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_loads_into_different_tables() {
        let dir = tempfile::TempDir::new().unwrap();
        let wh = MemoryWarehouse::new();
        let loader = loader(&wh);

        let mut handles = Vec::new();
        for table in ["ledger", "accounts", "categories"] {
            let path = dir.path().join(format!("{table}.csv"));
            std::fs::write(&path, "id,name\n1,a\n2,b\n").unwrap();
            handles.push(tokio::spawn(load_in_background(
                Arc::clone(&loader),
                LoadRequest::new(path, table),
            )));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap().rows_loaded, 2);
        }

        let config = WarehouseConfig::default();
        for table in ["ledger", "accounts", "categories"] {
            assert!(wh.table(&config.table_ref(table).unwrap()).is_some());
        }
    }

    #[tokio::test]
    async fn test_summarize_in_background() {
        let wh = MemoryWarehouse::new();
        let config = WarehouseConfig::default();
        wh.put_table(
            config.ledger_ref().unwrap(),
            Table::from_strs(
                &["date", "predicted", "realized"],
                &[&["2025-01-01", "100", "90"], &["2025-01-15", "200", "180"]],
            ),
        );
        let agg = Arc::new(PeriodAggregator::new(Arc::new(wh), config));

        let periods = summarize_in_background(agg, Granularity::Month).await.unwrap();
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].period, "2025-01");
    }
}
