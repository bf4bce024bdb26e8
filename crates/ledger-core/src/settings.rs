use clap::{Parser, Subcommand};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::{LedgerError, Result};
use crate::models::{TableReference, DEFAULT_HEADER_ROWS_TO_SKIP};

/// Tables that may be (re)loaded from a file.
pub const ALLOWED_TABLES: [&str; 5] = ["ledger", "accounts", "categories", "cost_centers", "tenants"];

pub const DEFAULT_PROJECT_ID: &str = "local";
pub const DEFAULT_DATASET: &str = "bookkeeping";
pub const DEFAULT_LEDGER_TABLE: &str = "ledger";
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

// ── WarehouseConfig ────────────────────────────────────────────────────────────

/// Where tables live in the backing store.
///
/// Passed explicitly to the loader and the aggregator when they are built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseConfig {
    pub project_id: String,
    pub dataset: String,
    /// Table the aggregator reads ledger rows from.
    pub ledger_table: String,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            project_id: DEFAULT_PROJECT_ID.to_string(),
            dataset: DEFAULT_DATASET.to_string(),
            ledger_table: DEFAULT_LEDGER_TABLE.to_string(),
        }
    }
}

impl WarehouseConfig {
    pub fn new(project_id: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            dataset: dataset.into(),
            ..Self::default()
        }
    }

    /// Resolve a logical table name to its full reference.
    pub fn table_ref(&self, table: &str) -> Result<TableReference> {
        validate_table_name(table)?;
        Ok(TableReference {
            project_id: self.project_id.clone(),
            dataset: self.dataset.clone(),
            table: table.to_string(),
        })
    }

    /// Reference to the ledger table.
    pub fn ledger_ref(&self) -> Result<TableReference> {
        self.table_ref(&self.ledger_table)
    }
}

/// Reject names that are empty or not plain identifiers.
pub fn validate_table_name(table: &str) -> Result<()> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,1023}$").expect("table name pattern is valid")
    });
    if re.is_match(table) {
        Ok(())
    } else {
        Err(LedgerError::InvalidTableName(table.to_string()))
    }
}

/// `true` when `table` may be loaded through the CLI or HTTP surfaces.
pub fn is_allowed_table(table: &str) -> bool {
    ALLOWED_TABLES.contains(&table)
}

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Bulk table loads and cash-flow summaries for the bookkeeping warehouse
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ledger-loader",
    about = "Bulk table loads and cash-flow summaries for the bookkeeping warehouse",
    version
)]
pub struct Settings {
    /// Warehouse project
    #[arg(long, global = true, env = "LEDGER_PROJECT_ID")]
    pub project_id: Option<String>,

    /// Logical dataset name
    #[arg(long, global = true, env = "LEDGER_DATASET")]
    pub dataset: Option<String>,

    /// Table holding ledger rows
    #[arg(long, global = true, env = "LEDGER_TABLE")]
    pub ledger_table: Option<String>,

    /// Root directory of the local warehouse
    #[arg(long, global = true, env = "LEDGER_WAREHOUSE_DIR")]
    pub warehouse_dir: Option<PathBuf>,

    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Write the resolved configuration back to the config file
    #[arg(long, global = true)]
    pub save_config: bool,

    /// Logging level
    #[arg(long, global = true, default_value = "INFO", env = "LEDGER_LOG_LEVEL")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Replace a table's contents with each CSV file in turn
    Load {
        /// CSV files to load
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Destination table
        #[arg(long, value_parser = ALLOWED_TABLES)]
        table: String,

        /// Leading rows to skip in every file
        #[arg(long, default_value_t = DEFAULT_HEADER_ROWS_TO_SKIP)]
        skip_rows: usize,
    },

    /// Print predicted and realized totals per period
    Summarize {
        /// Bucketing unit
        #[arg(long, default_value = "month", value_parser = ["day", "month"])]
        granularity: String,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Serve the upload and summary endpoints
    Serve {
        /// Listen address
        #[arg(long)]
        bind: Option<String>,
    },
}

/// Settings after merging CLI flags, environment and the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSettings {
    pub warehouse: WarehouseConfig,
    pub warehouse_dir: PathBuf,
    pub bind: String,
    pub config_path: PathBuf,
}

impl Settings {
    /// Merge with the config file; flags and environment always win.
    pub fn resolve(&self) -> Result<ResolvedSettings> {
        let config_path = self.config.clone().unwrap_or_else(FileConfig::config_path);
        let file = FileConfig::load_from(&config_path);

        let warehouse = WarehouseConfig {
            project_id: pick(&self.project_id, &file.project_id, DEFAULT_PROJECT_ID),
            dataset: pick(&self.dataset, &file.dataset, DEFAULT_DATASET),
            ledger_table: pick(&self.ledger_table, &file.ledger_table, DEFAULT_LEDGER_TABLE),
        };
        if warehouse.project_id.trim().is_empty() || warehouse.dataset.trim().is_empty() {
            return Err(LedgerError::Config(
                "project_id and dataset must not be empty".to_string(),
            ));
        }
        validate_table_name(&warehouse.ledger_table)?;

        let warehouse_dir = self
            .warehouse_dir
            .clone()
            .or(file.warehouse_dir)
            .unwrap_or_else(default_warehouse_dir);

        let cli_bind = match &self.command {
            Command::Serve { bind } => bind.clone(),
            _ => None,
        };
        let bind = pick(&cli_bind, &file.bind, DEFAULT_BIND);

        Ok(ResolvedSettings {
            warehouse,
            warehouse_dir,
            bind,
            config_path,
        })
    }
}

fn pick(cli: &Option<String>, file: &Option<String>, default: &str) -> String {
    cli.clone()
        .or_else(|| file.clone())
        .unwrap_or_else(|| default.to_string())
}

/// `~/.ledger-loader/`, or `./.ledger-loader/` without a home directory.
pub fn app_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ledger-loader")
}

pub fn default_warehouse_dir() -> PathBuf {
    app_dir().join("warehouse")
}

// ── FileConfig ─────────────────────────────────────────────────────────────────

/// Optional settings persisted to `~/.ledger-loader/config.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
}

impl FileConfig {
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Config path rooted at `base_dir`.
    pub fn config_path_in(base_dir: &Path) -> PathBuf {
        base_dir.join(".ledger-loader").join("config.json")
    }

    /// Returns `Default` when the file is absent or cannot be parsed.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config file");
                Self::default()
            }
        }
    }

    /// Atomically write the config, creating parent directories if needed.
    pub fn save_to(&self, path: &Path) -> std::result::Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }
}

impl From<&ResolvedSettings> for FileConfig {
    fn from(s: &ResolvedSettings) -> Self {
        FileConfig {
            project_id: Some(s.warehouse.project_id.clone()),
            dataset: Some(s.warehouse.dataset.clone()),
            ledger_table: Some(s.warehouse.ledger_table.clone()),
            warehouse_dir: Some(s.warehouse_dir.clone()),
            bind: Some(s.bind.clone()),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
