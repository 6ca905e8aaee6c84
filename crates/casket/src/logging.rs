//! Tracing setup: console output plus an optional file sink.

use std::path::Path;

use anyhow::{Context, Result};
use casket_config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

const CRATES: [&str; 4] = ["casket", "casket_session", "casket_codec", "casket_config"];

fn directives(level: &str) -> String {
    let level = level.to_ascii_lowercase();
    let mut filter: Vec<String> = CRATES.iter().map(|c| format!("{c}={level}")).collect();
    filter.push("warn".to_string());
    filter.join(",")
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level. The returned guard flushes the
/// file sink on drop and must be kept alive for the life of the process.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<Option<WorkerGuard>> {
    let level = if verbose { "debug" } else { config.level.as_str() };
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives(level)));

    let console = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    if !config.wants_file_sink() {
        tracing_subscriber::registry().with(console).init();
        return Ok(None);
    }

    let (dir, file) = split_path(&config.filename)?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating log directory {}", dir.display()))?;
    let appender = tracing_appender::rolling::never(&dir, file);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(console)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new(directives(&config.level))),
        )
        .init();

    Ok(Some(guard))
}

fn split_path(path: &Path) -> Result<(std::path::PathBuf, &std::ffi::OsStr)> {
    let file = path
        .file_name()
        .with_context(|| format!("log filename {} has no file name", path.display()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    Ok((dir, file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directives_cover_workspace_crates() {
        let d = directives("DEBUG");
        assert!(d.contains("casket_session=debug"));
        assert!(d.ends_with(",warn"));
    }

    #[test]
    fn test_split_path() {
        let (dir, file) = split_path(Path::new("logs/casket-session.log")).unwrap();
        assert_eq!(dir, Path::new("logs"));
        assert_eq!(file, "casket-session.log");

        let (dir, _) = split_path(Path::new("bare.log")).unwrap();
        assert_eq!(dir, Path::new("."));
    }
}
