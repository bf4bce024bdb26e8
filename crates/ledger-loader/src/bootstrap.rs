use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Directory bootstrap ────────────────────────────────────────────────────────

/// Ensure the warehouse root and the upload staging directory exist.
///
/// Returns the staging directory, `<app_dir>/uploads`.
pub fn ensure_directories(app_dir: &Path, warehouse_dir: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(app_dir)?;
    std::fs::create_dir_all(warehouse_dir)?;
    let staging = app_dir.join("uploads");
    std::fs::create_dir_all(&staging)?;
    Ok(staging)
}

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map a `--log-level` value to an [`EnvFilter`] directive.
///
/// Accepts `DEBUG`/`INFO`/`WARNING`/`ERROR`/`CRITICAL` in any case, and
/// passes anything else through as a raw directive.
pub fn filter_directive(log_level: &str) -> String {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug".to_string(),
        "INFO" => "info".to_string(),
        "WARNING" | "WARN" => "warn".to_string(),
        "ERROR" | "CRITICAL" => "error".to_string(),
        _ => log_level.to_string(),
    }
}

/// Initialise the global `tracing` subscriber. Falls back to `info` when the
/// level does not parse.
pub fn setup_logging(log_level: &str) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_new(filter_directive(log_level)).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(subscriber)
        .try_init()?;

    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_directories() {
        let tmp = TempDir::new().expect("tempdir");
        let app_dir = tmp.path().join(".ledger-loader");
        let warehouse = app_dir.join("warehouse");

        let staging = ensure_directories(&app_dir, &warehouse).expect("ensure_directories");

        assert!(app_dir.is_dir());
        assert!(warehouse.is_dir());
        assert_eq!(staging, app_dir.join("uploads"));
        assert!(staging.is_dir());
    }

    #[test]
    fn test_ensure_directories_is_repeatable() {
        let tmp = TempDir::new().expect("tempdir");
        let app_dir = tmp.path().join("app");
        let warehouse = tmp.path().join("elsewhere").join("wh");

        ensure_directories(&app_dir, &warehouse).unwrap();
        ensure_directories(&app_dir, &warehouse).unwrap();
        assert!(warehouse.is_dir());
    }

    #[test]
    fn test_filter_directive() {
        assert_eq!(filter_directive("DEBUG"), "debug");
        assert_eq!(filter_directive("info"), "info");
        assert_eq!(filter_directive("WARNING"), "warn");
        assert_eq!(filter_directive("CRITICAL"), "error");
        assert_eq!(filter_directive("ledger_data=trace"), "ledger_data=trace");
    }
}
