use std::path::{Path, PathBuf};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map a `--log-level` name to an [`EnvFilter`] directive.
///
/// Unknown names are passed through unchanged so `RUST_LOG`-style directives
/// such as `meter_data=debug` keep working.
pub fn level_directive(log_level: &str) -> String {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug".to_string(),
        "INFO" => "info".to_string(),
        "WARNING" => "warn".to_string(),
        "ERROR" | "CRITICAL" => "error".to_string(),
        _ => log_level.to_string(),
    }
}

/// Initialise the global `tracing` subscriber.
///
/// Output goes to stderr; stdout is reserved for reports.
pub fn setup_logging(log_level: &str) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_new(level_directive(log_level)).unwrap_or_else(|_| EnvFilter::new("info"));

    let layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()?;

    Ok(())
}

// ── Input discovery ────────────────────────────────────────────────────────────

/// Expand files and directories into the list of snapshot files to process.
///
/// Order follows the command line; each directory contributes its files in
/// path order. A path given twice is processed once.
pub fn collect_snapshot_paths(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for input in inputs {
        for path in meter_data::reader::find_snapshot_files(input) {
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
    }
    paths
}

/// Display form of a snapshot path used in reports.
pub fn source_label(path: &Path) -> String {
    path.display().to_string()
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_level_directive() {
        assert_eq!(level_directive("DEBUG"), "debug");
        assert_eq!(level_directive("info"), "info");
        assert_eq!(level_directive("WARNING"), "warn");
        assert_eq!(level_directive("CRITICAL"), "error");
        assert_eq!(level_directive("meter_data=trace"), "meter_data=trace");
    }

    #[test]
    fn test_collect_snapshot_paths() {
        let tmp = TempDir::new().expect("tempdir");
        let a = tmp.path().join("a.json");
        let b = tmp.path().join("b.json");
        std::fs::write(&a, "[]").expect("write a");
        std::fs::write(&b, "[]").expect("write b");

        // The explicit file comes first and is not repeated by the directory.
        let paths = collect_snapshot_paths(&[b.clone(), tmp.path().to_path_buf()]);
        assert_eq!(paths, vec![b, a]);
    }

    #[test]
    fn test_collect_snapshot_paths_missing() {
        let tmp = TempDir::new().expect("tempdir");
        let paths = collect_snapshot_paths(&[tmp.path().join("nope")]);
        assert!(paths.is_empty());
    }
}
