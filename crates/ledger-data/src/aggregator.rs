//! Predicted/realized cash-flow totals bucketed by day or month.

use std::collections::BTreeMap;
use std::sync::Arc;

use ledger_core::error::{LedgerError, Result};
use ledger_core::models::{Granularity, LedgerRow, PeriodSummary};
use ledger_core::settings::WarehouseConfig;
use ledger_core::store::{RowQuery, TableNotFound};
use rust_decimal::Decimal;
use tracing::debug;

// ── PeriodTotals ──────────────────────────────────────────────────────────────

/// Grand totals across a set of period summaries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeriodTotals {
    pub predicted: Decimal,
    pub realized: Decimal,
    pub periods: usize,
}

// ── PeriodAggregator ──────────────────────────────────────────────────────────

/// Stateless view over the ledger table. Every call re-reads the rows.
pub struct PeriodAggregator {
    rows: Arc<dyn RowQuery>,
    config: WarehouseConfig,
}

impl PeriodAggregator {
    pub fn new(rows: Arc<dyn RowQuery>, config: WarehouseConfig) -> Self {
        Self { rows, config }
    }

    /// Fetch the ledger rows and sum them per period, ascending by key.
    ///
    /// Either every row is aggregated or an error is returned.
    pub fn summarize(&self, granularity: Granularity) -> Result<Vec<PeriodSummary>> {
        let table = self.config.ledger_ref()?;
        let raw = self
            .rows
            .query(&table, &[])
            .map_err(|e| {
                if e.downcast_ref::<TableNotFound>().is_some() {
                    LedgerError::TableNotFound(table.to_string())
                } else {
                    LedgerError::QueryFailed {
                        table: table.to_string(),
                        reason: format!("{e:#}"),
                    }
                }
            })?;

        let rows = raw
            .iter()
            .enumerate()
            .map(|(index, row)| {
                LedgerRow::from_row(row).map_err(|reason| LedgerError::InvalidRow { index, reason })
            })
            .collect::<Result<Vec<_>>>()?;

        let periods = aggregate(&rows, granularity)?;
        debug!(
            table = %table,
            granularity = %granularity,
            rows = rows.len(),
            periods = periods.len(),
            "ledger summarized"
        );
        Ok(periods)
    }

    /// Like [`PeriodAggregator::summarize`], parsing `granularity` first.
    ///
    /// Anything but `day` or `month` is rejected before the store is queried.
    pub fn summarize_str(&self, granularity: &str) -> Result<Vec<PeriodSummary>> {
        let granularity: Granularity = granularity.parse()?;
        self.summarize(granularity)
    }
}

/// Group `rows` by period key and sum both amounts exactly.
///
/// Fails with [`LedgerError::AmountOverflow`] if a period's sum does not fit.
pub fn aggregate(rows: &[LedgerRow], granularity: Granularity) -> Result<Vec<PeriodSummary>> {
    let mut buckets: BTreeMap<String, (Decimal, Decimal)> = BTreeMap::new();

    for row in rows {
        let key = granularity.period_key(row.date);
        let (predicted, realized) = buckets
            .entry(key.clone())
            .or_insert((Decimal::ZERO, Decimal::ZERO));
        *predicted = checked_sum(*predicted, row.predicted, &key)?;
        *realized = checked_sum(*realized, row.realized, &key)?;
    }

    Ok(buckets
        .into_iter()
        .map(|(period, (predicted, realized))| PeriodSummary {
            period,
            predicted,
            realized,
        })
        .collect())
}

/// Sum all periods into a single footer line.
pub fn totals(periods: &[PeriodSummary]) -> Result<PeriodTotals> {
    periods.iter().try_fold(PeriodTotals::default(), |mut acc, p| {
        acc.predicted = checked_sum(acc.predicted, p.predicted, "totals")?;
        acc.realized = checked_sum(acc.realized, p.realized, "totals")?;
        acc.periods += 1;
        Ok(acc)
    })
}

fn checked_sum(a: Decimal, b: Decimal, period: &str) -> Result<Decimal> {
    a.checked_add(b).ok_or_else(|| LedgerError::AmountOverflow {
        period: period.to_string(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
