//! Delimited-text table engine shared by the backing stores.
//!
//! Turns a load payload into table contents according to a
//! [`LoadJobConfig`], so every store applies header skipping, column
//! naming and write dispositions the same way.

use std::collections::HashSet;
use std::io::{Read, Write};

use anyhow::{bail, Context};
use csv::{ReaderBuilder, WriterBuilder};
use ledger_core::models::{LoadJobConfig, Row, SourceFormat, WriteDisposition};

// ── Table ─────────────────────────────────────────────────────────────────────

/// Column names plus string cells, one `Vec` per row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    /// Build a table from string slices. Handy for fixtures.
    pub fn from_strs(columns: &[&str], rows: &[&[&str]]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Rows as column-name mappings.
    pub fn to_rows(&self) -> Vec<Row> {
        self.rows
            .iter()
            .map(|cells| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(cells.iter().cloned())
                    .collect()
            })
            .collect()
    }

    /// Read the stored form: a header line followed by data rows.
    pub fn read_csv<R: Read>(reader: R) -> anyhow::Result<Self> {
        let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);
        let columns: Vec<String> = rdr
            .headers()
            .context("reading table header")?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for (idx, rec) in rdr.records().enumerate() {
            let rec = rec.with_context(|| format!("reading stored row {}", idx + 1))?;
            rows.push(rec.iter().map(str::to_string).collect());
        }

        Ok(Self { columns, rows })
    }

    /// Write the stored form. A table without columns writes nothing.
    pub fn write_csv<W: Write>(&self, writer: W) -> anyhow::Result<()> {
        if self.columns.is_empty() {
            return Ok(());
        }
        let mut wtr = WriterBuilder::new().from_writer(writer);
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

// ── Load payloads ─────────────────────────────────────────────────────────────

/// A payload after parsing, before it meets the destination table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedLoad {
    /// Column names taken from the last skipped line, if it was not blank.
    pub header: Option<Vec<String>>,
    /// Data records with their 1-based line number in the source.
    pub rows: Vec<(usize, Vec<String>)>,
}

/// Parse a CSV payload, dropping the first `skip_leading_rows` physical lines.
///
/// Lines are counted before CSV parsing, so blank lines in the skipped region
/// count toward the skip.
pub fn parse_delimited(data: &[u8], skip_leading_rows: usize) -> anyhow::Result<ParsedLoad> {
    let (skipped, body) = split_leading_lines(data, skip_leading_rows);

    let mut parsed = ParsedLoad::default();
    if skipped.len() == skip_leading_rows {
        if let Some(last) = skipped.last() {
            parsed.header = parse_header_line(last)?;
        }
    }

    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body);

    for (idx, rec) in rdr.records().enumerate() {
        let rec = rec.with_context(|| format!("parsing row {}", skipped.len() + idx + 1))?;
        let line_in_body = rec.position().map_or(idx + 1, |p| p.line() as usize);
        let cells: Vec<String> = rec.iter().map(str::to_string).collect();
        parsed.rows.push((skipped.len() + line_in_body, cells));
    }

    Ok(parsed)
}

/// Split off up to `n` leading lines. Returns them without line endings,
/// plus the rest of the payload.
fn split_leading_lines(data: &[u8], n: usize) -> (Vec<&[u8]>, &[u8]) {
    let mut lines = Vec::with_capacity(n);
    let mut rest = data;
    while lines.len() < n && !rest.is_empty() {
        let (line, tail) = match rest.iter().position(|&b| b == b'\n') {
            Some(i) => (&rest[..i], &rest[i + 1..]),
            None => (rest, &rest[rest.len()..]),
        };
        lines.push(line.strip_suffix(b"\r").unwrap_or(line));
        rest = tail;
    }
    (lines, rest)
}

/// Parse one line as a CSV record. A blank line names nothing.
fn parse_header_line(line: &[u8]) -> anyhow::Result<Option<Vec<String>>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line);
    match rdr.records().next() {
        Some(rec) => {
            let rec = rec.context("parsing header line")?;
            Ok(Some(rec.iter().map(str::to_string).collect()))
        }
        None => Ok(None),
    }
}

/// Name header columns, filling blanks and rejecting duplicates.
fn header_columns(header: Vec<String>) -> anyhow::Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(header.len());
    for (i, name) in header.into_iter().enumerate() {
        let name = name.trim();
        let name = if name.is_empty() {
            generated_column(i)
        } else {
            name.to_string()
        };
        if !seen.insert(name.clone()) {
            bail!("duplicate column name {name:?} in header");
        }
        columns.push(name);
    }
    Ok(columns)
}

fn generated_column(i: usize) -> String {
    format!("string_field_{i}")
}

/// Produce the destination table's new contents.
///
/// `existing` is the table as it is now, if it exists. Fails without side
/// effects when the payload does not fit the table.
pub fn apply_load(
    existing: Option<&Table>,
    payload: &[u8],
    config: &LoadJobConfig,
) -> anyhow::Result<Table> {
    match config.source_format {
        SourceFormat::Csv => {}
    }

    let parsed = parse_delimited(payload, config.skip_leading_rows)?;
    let existing_columns = existing.filter(|t| !t.columns.is_empty()).map(|t| &t.columns);

    let columns = match (parsed.header, existing_columns) {
        (Some(header), _) => header_columns(header)?,
        (None, Some(cols)) => cols.clone(),
        (None, None) => {
            let width = parsed.rows.first().map(|(_, r)| r.len()).unwrap_or(0);
            (0..width).map(generated_column).collect()
        }
    };

    let mut rows = Vec::with_capacity(parsed.rows.len());
    for (line, cells) in parsed.rows {
        if cells.len() != columns.len() {
            bail!(
                "row {line} has {} fields, expected {}",
                cells.len(),
                columns.len()
            );
        }
        rows.push(cells);
    }

    match config.write_disposition {
        WriteDisposition::Truncate => Ok(Table::new(columns, rows)),
        WriteDisposition::WriteEmpty => match existing {
            Some(t) if !t.rows.is_empty() => {
                bail!("table already contains {} rows", t.rows.len())
            }
            _ => Ok(Table::new(columns, rows)),
        },
        WriteDisposition::Append => match existing_columns {
            Some(cols) if *cols != columns => {
                bail!("columns {columns:?} do not match existing columns {cols:?}")
            }
            _ => {
                let mut all = existing.map(|t| t.rows.clone()).unwrap_or_default();
                all.extend(rows);
                Ok(Table::new(columns, all))
            }
        },
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
