//! Filesystem-backed warehouse.
//!
//! Each table is a CSV file (header line plus data rows) at
//! `<root>/<project>/<dataset>/<table>.csv`. Completed load jobs write the new
//! contents to a temp file in the same directory and rename it over the
//! table, so readers see either the old table or the new one.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use ledger_core::models::{LoadJobConfig, LoadStats, Row, TableReference};
use ledger_core::store::{BulkLoadStore, Filter, LoadJob, RowQuery, TableNotFound};
use tempfile::NamedTempFile;
use tracing::debug;

use super::JobIds;
use crate::table::{apply_load, Table};

const TABLE_EXTENSION: &str = "csv";

// ── LocalWarehouse ────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct LocalWarehouse {
    root: PathBuf,
    job_ids: JobIds,
}

impl LocalWarehouse {
    /// Open a warehouse rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("creating warehouse root {}", root.display()))?;
        Ok(Self {
            root,
            job_ids: JobIds::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding `table`.
    pub fn table_path(&self, table: &TableReference) -> PathBuf {
        self.dataset_dir(&table.project_id, &table.dataset)
            .join(format!("{}.{TABLE_EXTENSION}", table.table))
    }

    fn dataset_dir(&self, project_id: &str, dataset: &str) -> PathBuf {
        self.root.join(project_id).join(dataset)
    }

    /// Current contents of `table`, or `None` if it was never loaded.
    pub fn read_table(&self, table: &TableReference) -> anyhow::Result<Option<Table>> {
        read_table_at(&self.table_path(table))
    }

    /// Names of the tables in a dataset, sorted.
    pub fn list_tables(&self, project_id: &str, dataset: &str) -> anyhow::Result<Vec<String>> {
        let dir = self.dataset_dir(project_id, dataset);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&dir).with_context(|| format!("listing {}", dir.display()))? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == TABLE_EXTENSION) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

fn read_table_at(path: &Path) -> anyhow::Result<Option<Table>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("opening {}", path.display())),
    };
    let table = Table::read_csv(BufReader::new(file))
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(Some(table))
}

impl BulkLoadStore for LocalWarehouse {
    fn submit_load(
        &self,
        source: &mut dyn Read,
        table: &TableReference,
        config: &LoadJobConfig,
    ) -> anyhow::Result<Box<dyn LoadJob>> {
        let mut payload = Vec::new();
        source
            .read_to_end(&mut payload)
            .context("reading load payload")?;

        let job_id = self.job_ids.next("local_load");
        debug!(job_id = %job_id, table = %table, bytes = payload.len(), "load job accepted");

        Ok(Box::new(LocalLoadJob {
            job_id,
            path: self.table_path(table),
            payload,
            config: config.clone(),
        }))
    }
}

impl RowQuery for LocalWarehouse {
    fn query(&self, table: &TableReference, filters: &[Filter]) -> anyhow::Result<Vec<Row>> {
        let contents = self
            .read_table(table)?
            .ok_or_else(|| TableNotFound(table.clone()))?;

        Ok(contents
            .to_rows()
            .into_iter()
            .filter(|row| filters.iter().all(|f| f.matches(row)))
            .collect())
    }
}

// ── LocalLoadJob ──────────────────────────────────────────────────────────────

struct LocalLoadJob {
    job_id: String,
    path: PathBuf,
    payload: Vec<u8>,
    config: LoadJobConfig,
}

impl LoadJob for LocalLoadJob {
    fn job_id(&self) -> &str {
        &self.job_id
    }

    fn await_completion(self: Box<Self>) -> anyhow::Result<LoadStats> {
        let existing = read_table_at(&self.path)?;
        let table = apply_load(existing.as_ref(), &self.payload, &self.config)?;

        let dir = self
            .path
            .parent()
            .context("table path has no parent directory")?;
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

        let mut tmp = NamedTempFile::new_in(dir).context("staging table contents")?;
        table.write_csv(&mut tmp)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;

        debug!(job_id = %self.job_id, rows = table.row_count(), "load job done");
        Ok(LoadStats {
            job_id: self.job_id,
            output_rows: table.row_count() as u64,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LEDGER_CSV: &str = "date,predicted,realized\n\
                              2025-01-01,100,90\n\
                              2025-01-15,200,180\n\
                              2025-02-01,150,120\n";

    fn ledger_ref() -> TableReference {
        TableReference {
            project_id: "local".to_string(),
            dataset: "bookkeeping".to_string(),
            table: "ledger".to_string(),
        }
    }

    fn load(wh: &LocalWarehouse, data: &str, config: &LoadJobConfig) -> anyhow::Result<LoadStats> {
        let mut src = data.as_bytes();
        wh.submit_load(&mut src, &ledger_ref(), config)?
            .await_completion()
    }

    #[test]
    fn test_load_writes_table_file() {
        let tmp = TempDir::new().expect("tempdir");
        let wh = LocalWarehouse::open(tmp.path()).unwrap();

        let stats = load(&wh, LEDGER_CSV, &LoadJobConfig::csv_truncate(1)).unwrap();
        assert_eq!(stats.output_rows, 3);
        assert!(stats.job_id.starts_with("local_load_"));

        let path = tmp.path().join("local").join("bookkeeping").join("ledger.csv");
        assert!(path.is_file());
        let table = wh.read_table(&ledger_ref()).unwrap().unwrap();
        assert_eq!(table.columns, vec!["date", "predicted", "realized"]);
        assert_eq!(table.row_count(), 3);
    }

    #[test]
    fn test_failed_job_leaves_table_untouched() {
        let tmp = TempDir::new().expect("tempdir");
        let wh = LocalWarehouse::open(tmp.path()).unwrap();
        load(&wh, LEDGER_CSV, &LoadJobConfig::csv_truncate(1)).unwrap();
        let before = std::fs::read(wh.table_path(&ledger_ref())).unwrap();

        let bad = "date,predicted,realized\n2025-03-01,1\n";
        assert!(load(&wh, bad, &LoadJobConfig::csv_truncate(1)).is_err());

        let after = std::fs::read(wh.table_path(&ledger_ref())).unwrap();
        assert_eq!(before, after);

        // No staged temp files left next to the table.
        let leftovers = std::fs::read_dir(tmp.path().join("local").join("bookkeeping"))
            .unwrap()
            .count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_query_returns_rows_and_applies_filters() {
        let tmp = TempDir::new().expect("tempdir");
        let wh = LocalWarehouse::open(tmp.path()).unwrap();
        load(&wh, LEDGER_CSV, &LoadJobConfig::csv_truncate(1)).unwrap();

        let all = wh.query(&ledger_ref(), &[]).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2]["date"], "2025-02-01");

        let one = wh
            .query(&ledger_ref(), &[Filter::eq("date", "2025-01-15")])
            .unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0]["predicted"], "200");
    }

    #[test]
    fn test_query_missing_table_is_error() {
        let tmp = TempDir::new().expect("tempdir");
        let wh = LocalWarehouse::open(tmp.path()).unwrap();
        let err = wh.query(&ledger_ref(), &[]).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
        assert!(err.downcast_ref::<TableNotFound>().is_some());
    }

    #[test]
    fn test_list_tables() {
        let tmp = TempDir::new().expect("tempdir");
        let wh = LocalWarehouse::open(tmp.path()).unwrap();
        assert!(wh.list_tables("local", "bookkeeping").unwrap().is_empty());

        load(&wh, LEDGER_CSV, &LoadJobConfig::csv_truncate(1)).unwrap();
        let accounts = TableReference {
            table: "accounts".to_string(),
            ..ledger_ref()
        };
        let mut src = "id,name\n1,Cash\n".as_bytes();
        wh.submit_load(&mut src, &accounts, &LoadJobConfig::csv_truncate(1))
            .unwrap()
            .await_completion()
            .unwrap();

        assert_eq!(
            wh.list_tables("local", "bookkeeping").unwrap(),
            vec!["accounts", "ledger"]
        );
    }

    #[test]
    fn test_job_ids_are_distinct() {
        let tmp = TempDir::new().expect("tempdir");
        let wh = LocalWarehouse::open(tmp.path()).unwrap();
        let cfg = LoadJobConfig::csv_truncate(1);
        let mut a = LEDGER_CSV.as_bytes();
        let mut b = LEDGER_CSV.as_bytes();
        let first = wh.submit_load(&mut a, &ledger_ref(), &cfg).unwrap();
        let second = wh.submit_load(&mut b, &ledger_ref(), &cfg).unwrap();
        assert_ne!(first.job_id(), second.job_id());
    }
}
