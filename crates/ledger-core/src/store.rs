//! Capabilities the pipeline needs from the backing data store.
//!
//! The loader and the aggregator only ever see these traits, so production
//! warehouses and in-memory fakes are interchangeable.

use std::io::Read;

use thiserror::Error;

use crate::models::{LoadJobConfig, LoadStats, Row, TableReference};

/// A bulk load job accepted by the backing store.
pub trait LoadJob: Send {
    /// Identifier assigned by the store at submission time.
    fn job_id(&self) -> &str;

    /// Block until the job reaches a terminal state.
    fn await_completion(self: Box<Self>) -> anyhow::Result<LoadStats>;
}

/// Accepts files for bulk loading into tables.
pub trait BulkLoadStore: Send + Sync {
    /// Submit `source` as a load job for `table`.
    ///
    /// The store consumes the reader before returning; the caller keeps
    /// ownership of the underlying file.
    fn submit_load(
        &self,
        source: &mut dyn Read,
        table: &TableReference,
        config: &LoadJobConfig,
    ) -> anyhow::Result<Box<dyn LoadJob>>;
}

/// Column equality predicate passed to [`RowQuery::query`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    /// `true` when `row` satisfies the predicate. Missing columns never match.
    pub fn matches(&self, row: &Row) -> bool {
        row.get(&self.column).is_some_and(|v| *v == self.value)
    }
}

/// Serves rows from a table. Already authenticated and tenant-scoped.
pub trait RowQuery: Send + Sync {
    /// Rows of `table` matching every filter.
    ///
    /// A table that was never loaded fails with a [`TableNotFound`] error
    /// (possibly wrapped in context) so callers can tell it from an outage.
    fn query(&self, table: &TableReference, filters: &[Filter]) -> anyhow::Result<Vec<Row>>;
}

/// Returned by [`RowQuery::query`] for a table that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("table {0} does not exist")]
pub struct TableNotFound(pub TableReference);
