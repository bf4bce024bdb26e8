mod bootstrap;
mod report;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use ledger_core::models::{Granularity, LoadRequest};
use ledger_core::settings::{app_dir, Command, FileConfig, ResolvedSettings, Settings};
use ledger_data::store::LocalWarehouse;
use ledger_data::{PeriodAggregator, TableLoader};
use ledger_runtime::http::{self, AppState};
use ledger_runtime::jobs::{load_in_background, summarize_in_background};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::parse();

    bootstrap::setup_logging(&settings.log_level)?;
    tracing::info!("ledger-loader v{} starting", env!("CARGO_PKG_VERSION"));

    let resolved = settings.resolve()?;
    tracing::info!(
        "Project: {}, Dataset: {}, Warehouse: {}",
        resolved.warehouse.project_id,
        resolved.warehouse.dataset,
        resolved.warehouse_dir.display()
    );

    if settings.save_config {
        FileConfig::from(&resolved)
            .save_to(&resolved.config_path)
            .with_context(|| format!("saving {}", resolved.config_path.display()))?;
        tracing::info!("configuration saved to {}", resolved.config_path.display());
    }

    let staging_dir = bootstrap::ensure_directories(&app_dir(), &resolved.warehouse_dir)?;
    let warehouse = Arc::new(LocalWarehouse::open(&resolved.warehouse_dir)?);
    let loader = Arc::new(TableLoader::new(warehouse.clone(), resolved.warehouse.clone()));
    let aggregator = Arc::new(PeriodAggregator::new(warehouse, resolved.warehouse.clone()));

    match settings.command {
        Command::Load {
            files,
            table,
            skip_rows,
        } => run_load(loader, files, &table, skip_rows).await,

        Command::Summarize { granularity, json } => {
            let granularity: Granularity = granularity.parse()?;
            let periods = summarize_in_background(aggregator, granularity).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&periods)?);
            } else {
                print!("{}", report::render_table(&periods)?);
            }
            Ok(())
        }

        Command::Serve { .. } => run_server(loader, aggregator, staging_dir, &resolved).await,
    }
}

/// Load each file on its own; one failure does not stop the rest.
async fn run_load(
    loader: Arc<TableLoader>,
    files: Vec<PathBuf>,
    table: &str,
    skip_rows: usize,
) -> Result<()> {
    let total = files.len();
    let mut failed = 0usize;

    for path in files {
        let request = LoadRequest::new(&path, table).with_header_rows_to_skip(skip_rows);
        match load_in_background(Arc::clone(&loader), request).await {
            Ok(summary) => tracing::info!(
                path = %path.display(),
                table = %summary.table,
                rows = summary.rows_loaded,
                "loaded"
            ),
            Err(e) => {
                failed += 1;
                tracing::error!(path = %path.display(), "{e}");
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {total} files failed to load into {table}");
    }
    Ok(())
}

async fn run_server(
    loader: Arc<TableLoader>,
    aggregator: Arc<PeriodAggregator>,
    staging_dir: PathBuf,
    resolved: &ResolvedSettings,
) -> Result<()> {
    let state = AppState::new(loader, aggregator).with_staging_dir(staging_dir);
    http::serve(state, &resolved.bind).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::settings::WarehouseConfig;
    use ledger_data::store::MemoryWarehouse;
    use tempfile::TempDir;

    fn loader(wh: &MemoryWarehouse) -> Arc<TableLoader> {
        Arc::new(TableLoader::new(
            Arc::new(wh.clone()),
            WarehouseConfig::default(),
        ))
    }

    fn write_csv(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn test_run_load_continues_past_failed_file() {
        let tmp = TempDir::new().unwrap();
        let wh = MemoryWarehouse::new();
        let files = vec![
            write_csv(&tmp, "jan.csv", "date,predicted,realized\n2025-01-01,100,90\n"),
            tmp.path().join("missing.csv"),
            write_csv(&tmp, "feb.csv", "date,predicted,realized\n2025-02-01,150,120\n"),
        ];

        let err = run_load(loader(&wh), files, "ledger", 1).await.unwrap_err();

        assert_eq!(wh.submitted_jobs(), 2);
        assert!(err.to_string().contains("1 of 3"));
        let ledger = wh
            .table(&WarehouseConfig::default().ledger_ref().unwrap())
            .unwrap();
        assert_eq!(ledger.rows, vec![vec!["2025-02-01", "150", "120"]]);
    }

    #[tokio::test]
    async fn test_run_load_all_files_succeed() {
        let tmp = TempDir::new().unwrap();
        let wh = MemoryWarehouse::new();
        let files = vec![
            write_csv(&tmp, "a.csv", "id,name\n1,rent\n"),
            write_csv(&tmp, "b.csv", "id,name\n2,payroll\n"),
        ];

        run_load(loader(&wh), files, "categories", 1).await.unwrap();
        assert_eq!(wh.submitted_jobs(), 2);
    }

    #[tokio::test]
    async fn test_run_load_store_failure_counts_as_failed_file() {
        let tmp = TempDir::new().unwrap();
        let wh = MemoryWarehouse::new();
        wh.fail_next_load("quota exceeded");
        let files = vec![
            write_csv(&tmp, "a.csv", "id,name\n1,rent\n"),
            write_csv(&tmp, "b.csv", "id,name\n2,payroll\n"),
        ];

        let err = run_load(loader(&wh), files, "accounts", 1).await.unwrap_err();
        assert!(err.to_string().contains("1 of 2"));
    }
}
