//! Backing stores implementing the bulk-load and row-query capabilities.

pub mod local;
pub mod memory;

pub use local::LocalWarehouse;
pub use memory::MemoryWarehouse;

use std::sync::atomic::{AtomicU64, Ordering};

/// Job identifiers unique within the process.
#[derive(Debug, Default)]
pub(crate) struct JobIds {
    next: AtomicU64,
}

impl JobIds {
    pub(crate) fn next(&self, prefix: &str) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        format!(
            "{prefix}_{}_{n:06}",
            chrono::Utc::now().format("%Y%m%d%H%M%S")
        )
    }
}
