use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::LedgerError;

/// Number of leading rows skipped when a request does not say otherwise.
pub const DEFAULT_HEADER_ROWS_TO_SKIP: usize = 1;

/// A single row returned by the row-query collaborator, keyed by column name.
pub type Row = BTreeMap<String, String>;

// ── Load requests ─────────────────────────────────────────────────────────────

/// One invocation of the table loader. Built per call and then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    /// Local file holding the delimited text to load.
    pub source_path: PathBuf,
    /// Logical name of the destination table.
    pub destination_table: String,
    /// Leading rows of the file that are not data.
    pub header_rows_to_skip: usize,
}

impl LoadRequest {
    pub fn new(source_path: impl Into<PathBuf>, destination_table: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            destination_table: destination_table.into(),
            header_rows_to_skip: DEFAULT_HEADER_ROWS_TO_SKIP,
        }
    }

    pub fn with_header_rows_to_skip(mut self, rows: usize) -> Self {
        self.header_rows_to_skip = rows;
        self
    }
}

/// Result of a successful load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    /// Fully-qualified destination table (`project.dataset.table`).
    pub table: String,
    /// Identifier the backing store assigned to the job.
    pub job_id: String,
    /// Number of data rows now in the table.
    pub rows_loaded: u64,
}

// ── Load job description ──────────────────────────────────────────────────────

/// Format of the file handed to a bulk load job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceFormat {
    /// Comma-delimited text.
    Csv,
}

/// How a load job treats rows already present in the destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteDisposition {
    /// Replace the whole table.
    Truncate,
    /// Add rows after the existing ones.
    Append,
    /// Write only if the table holds no rows.
    WriteEmpty,
}

/// Configuration submitted alongside a bulk load job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadJobConfig {
    pub source_format: SourceFormat,
    pub skip_leading_rows: usize,
    pub write_disposition: WriteDisposition,
}

impl LoadJobConfig {
    /// CSV load that fully replaces the destination table.
    pub fn csv_truncate(skip_leading_rows: usize) -> Self {
        Self {
            source_format: SourceFormat::Csv,
            skip_leading_rows,
            write_disposition: WriteDisposition::Truncate,
        }
    }
}

/// Fully-resolved address of a table in the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableReference {
    pub project_id: String,
    pub dataset: String,
    pub table: String,
}

impl fmt::Display for TableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project_id, self.dataset, self.table)
    }
}

/// What a backing store reports once a load job has completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadStats {
    pub job_id: String,
    pub output_rows: u64,
}

// ── Ledger rows and summaries ─────────────────────────────────────────────────

/// A ledger line as stored by the bookkeeping backend. Read-only here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRow {
    pub date: NaiveDate,
    pub predicted: Decimal,
    pub realized: Decimal,
}

impl LedgerRow {
    pub fn new(date: NaiveDate, predicted: Decimal, realized: Decimal) -> Self {
        Self {
            date,
            predicted,
            realized,
        }
    }

    /// Decode a row mapping with `date`, `predicted` and `realized` columns.
    ///
    /// Dates must be `YYYY-MM-DD`. Blank amounts count as zero.
    pub fn from_row(row: &Row) -> Result<Self, String> {
        let raw_date = row.get("date").ok_or("missing column \"date\"")?;
        let date = NaiveDate::parse_from_str(raw_date.trim(), "%Y-%m-%d")
            .map_err(|e| format!("date {raw_date:?}: {e}"))?;

        Ok(Self {
            date,
            predicted: parse_amount(row, "predicted")?,
            realized: parse_amount(row, "realized")?,
        })
    }
}

fn parse_amount(row: &Row, column: &str) -> Result<Decimal, String> {
    let raw = row
        .get(column)
        .ok_or_else(|| format!("missing column {column:?}"))?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Decimal::ZERO);
    }
    Decimal::from_str(trimmed).map_err(|e| format!("{column} {raw:?}: {e}"))
}

/// Summed amounts for one period bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodSummary {
    /// `YYYY-MM-DD` for daily buckets, `YYYY-MM` for monthly ones.
    pub period: String,
    pub predicted: Decimal,
    pub realized: Decimal,
}

/// Bucketing unit for the period aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Month,
}

impl Granularity {
    /// Period key for `date`. Keys sort lexically in chronological order.
    pub fn period_key(self, date: NaiveDate) -> String {
        match self {
            Granularity::Day => date.format("%Y-%m-%d").to_string(),
            Granularity::Month => date.format("%Y-%m").to_string(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Month => "month",
        }
    }
}

impl FromStr for Granularity {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Granularity::Day),
            "month" => Ok(Granularity::Month),
            _ => Err(LedgerError::InvalidGranularity(s.to_string())),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::prelude::FromPrimitive;

    fn row(date: &str, predicted: &str, realized: &str) -> Row {
        let mut r = Row::new();
        r.insert("date".to_string(), date.to_string());
        r.insert("predicted".to_string(), predicted.to_string());
        r.insert("realized".to_string(), realized.to_string());
        r
    }

    #[test]
    fn test_load_request_defaults_to_one_header_row() {
        let req = LoadRequest::new("/tmp/ledger.csv", "ledger");
        assert_eq!(req.header_rows_to_skip, 1);
        assert_eq!(req.with_header_rows_to_skip(0).header_rows_to_skip, 0);
    }

    #[test]
    fn test_csv_truncate_config() {
        let cfg = LoadJobConfig::csv_truncate(2);
        assert_eq!(cfg.source_format, SourceFormat::Csv);
        assert_eq!(cfg.skip_leading_rows, 2);
        assert_eq!(cfg.write_disposition, WriteDisposition::Truncate);
    }

    #[test]
    fn test_table_reference_display() {
        let r = TableReference {
            project_id: "acme-prod".to_string(),
            dataset: "books".to_string(),
            table: "ledger".to_string(),
        };
        assert_eq!(r.to_string(), "acme-prod.books.ledger");
    }

    #[test]
    fn test_granularity_parse() {
        assert_eq!("day".parse::<Granularity>().unwrap(), Granularity::Day);
        assert_eq!(" Month ".parse::<Granularity>().unwrap(), Granularity::Month);
        assert!(matches!(
            "year".parse::<Granularity>(),
            Err(LedgerError::InvalidGranularity(g)) if g == "year"
        ));
        assert!("".parse::<Granularity>().is_err());
    }

    #[test]
    fn test_period_keys() {
        let d = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(Granularity::Day.period_key(d), "2025-03-07");
        assert_eq!(Granularity::Month.period_key(d), "2025-03");
    }

    #[test]
    fn test_ledger_row_from_row() {
        let parsed = LedgerRow::from_row(&row("2025-01-15", "200.10", " 180 ")).unwrap();
        assert_eq!(parsed.date, NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
        assert_eq!(parsed.predicted, Decimal::from_str("200.10").unwrap());
        assert_eq!(parsed.realized, Decimal::from_u32(180).unwrap());
    }

    #[test]
    fn test_ledger_row_blank_amount_is_zero() {
        let parsed = LedgerRow::from_row(&row("2025-01-15", "", "12")).unwrap();
        assert_eq!(parsed.predicted, Decimal::ZERO);
    }

    #[test]
    fn test_ledger_row_rejects_bad_values() {
        assert!(LedgerRow::from_row(&row("15/01/2025", "1", "1")).is_err());
        assert!(LedgerRow::from_row(&row("2025-01-15", "abc", "1")).is_err());

        let mut missing = row("2025-01-15", "1", "1");
        missing.remove("realized");
        let err = LedgerRow::from_row(&missing).unwrap_err();
        assert!(err.contains("realized"));
    }

    #[test]
    fn test_period_summary_serializes_amounts_as_strings() {
        let s = PeriodSummary {
            period: "2025-01".to_string(),
            predicted: Decimal::from_str("300.50").unwrap(),
            realized: Decimal::from_u32(270).unwrap(),
        };
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["period"], "2025-01");
        assert_eq!(json["predicted"], "300.50");
        assert_eq!(json["realized"], "270");
    }
}
