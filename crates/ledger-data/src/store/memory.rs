//! In-memory warehouse for tests and disk-free wiring.
//!
//! Applies loads with the same table engine as [`super::LocalWarehouse`] and
//! can be told to fail the next load or every query.

use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Context};
use ledger_core::models::{LoadJobConfig, LoadStats, Row, TableReference};
use ledger_core::store::{BulkLoadStore, Filter, LoadJob, RowQuery, TableNotFound};

use super::JobIds;
use crate::table::{apply_load, Table};

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<TableReference, Table>,
    submitted_jobs: usize,
    fail_next_load: Option<String>,
    query_failure: Option<String>,
}

/// Cheap to clone; clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryWarehouse {
    inner: Arc<Mutex<Inner>>,
    job_ids: Arc<JobIds>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock_inner(&self.inner)
    }

    /// Replace `table` without going through a load job.
    pub fn put_table(&self, table: TableReference, contents: Table) {
        self.lock().tables.insert(table, contents);
    }

    pub fn table(&self, table: &TableReference) -> Option<Table> {
        self.lock().tables.get(table).cloned()
    }

    /// Number of load jobs submitted so far, successful or not.
    pub fn submitted_jobs(&self) -> usize {
        self.lock().submitted_jobs
    }

    /// Make the next load job fail with `reason` when it completes.
    pub fn fail_next_load(&self, reason: impl Into<String>) {
        self.lock().fail_next_load = Some(reason.into());
    }

    /// Make every query fail with `reason` until cleared with `None`.
    pub fn set_query_failure(&self, reason: Option<String>) {
        self.lock().query_failure = reason;
    }
}

fn lock_inner(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl BulkLoadStore for MemoryWarehouse {
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

        self.lock().submitted_jobs += 1;

        Ok(Box::new(MemoryLoadJob {
            job_id: self.job_ids.next("memory_load"),
            table: table.clone(),
            payload,
            config: config.clone(),
            inner: Arc::clone(&self.inner),
        }))
    }
}

impl RowQuery for MemoryWarehouse {
    fn query(&self, table: &TableReference, filters: &[Filter]) -> anyhow::Result<Vec<Row>> {
        let inner = self.lock();
        if let Some(reason) = &inner.query_failure {
            return Err(anyhow!("{reason}"));
        }
        let contents = inner
            .tables
            .get(table)
            .ok_or_else(|| TableNotFound(table.clone()))?;

        Ok(contents
            .to_rows()
            .into_iter()
            .filter(|row| filters.iter().all(|f| f.matches(row)))
            .collect())
    }
}

struct MemoryLoadJob {
    job_id: String,
    table: TableReference,
    payload: Vec<u8>,
    config: LoadJobConfig,
    inner: Arc<Mutex<Inner>>,
}

impl LoadJob for MemoryLoadJob {
    fn job_id(&self) -> &str {
        &self.job_id
    }

    fn await_completion(self: Box<Self>) -> anyhow::Result<LoadStats> {
        let mut inner = lock_inner(&self.inner);
        if let Some(reason) = inner.fail_next_load.take() {
            return Err(anyhow!("{reason}"));
        }

        // The table is swapped under the lock, so readers never see a partial load.
        let contents = apply_load(inner.tables.get(&self.table), &self.payload, &self.config)?;
        let output_rows = contents.row_count() as u64;
        inner.tables.insert(self.table.clone(), contents);

        Ok(LoadStats {
            job_id: self.job_id.clone(),
            output_rows,
        })
    }
}
