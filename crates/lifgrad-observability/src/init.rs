// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Unified logging initialization for lifgrad binaries
//!
//! Console output (text or JSON) filtered by per-crate debug flags, plus
//! optional JSON log files in a timestamped run folder.

use std::path::Path;
#[cfg(feature = "file-logging")]
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::CrateDebugFlags;
use crate::config::{LogFormat, LoggingConfig};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Logging initialization result
///
/// Keep it alive for the lifetime of the program; dropping it flushes and
/// closes any log files.
pub struct LoggingGuard {
    #[cfg(feature = "file-logging")]
    _file_guards: Vec<tracing_appender::non_blocking::WorkerGuard>,
    #[cfg(feature = "file-logging")]
    log_dir: Option<PathBuf>,
}

impl LoggingGuard {
    /// Run folder receiving log files, if file output is active
    pub fn log_dir(&self) -> Option<&Path> {
        #[cfg(feature = "file-logging")]
        {
            self.log_dir.as_deref()
        }
        #[cfg(not(feature = "file-logging"))]
        {
            None
        }
    }
}

/// Build the `EnvFilter` for this run
///
/// `RUST_LOG`, when set, replaces the filter derived from config and flags.
pub fn build_filter(debug_flags: &CrateDebugFlags, config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(directives) = std::env::var("RUST_LOG") {
        return EnvFilter::try_new(&directives)
            .with_context(|| format!("Invalid RUST_LOG filter: {}", directives));
    }
    let filter = debug_flags.to_filter_string(&config.level);
    EnvFilter::try_new(&filter).with_context(|| format!("Invalid log filter: {}", filter))
}

/// Initialize the global subscriber
///
/// With `file_output` (and the `file-logging` feature) creates:
/// ```text
/// <log_dir>/
///   └── run_20250101_120000/
///       └── lifgrad.log (JSON, daily rotation)
/// ```
/// and prunes run folders beyond `retention_runs`.
///
/// # Errors
///
/// Fails on an invalid filter, an unusable log directory, a file output
/// request without the `file-logging` feature, or when a global subscriber
/// is already installed.
pub fn init_logging(debug_flags: &CrateDebugFlags, config: &LoggingConfig) -> Result<LoggingGuard> {
    let mut layers: Vec<BoxedLayer> = Vec::new();

    let console_filter = build_filter(debug_flags, config)?;
    let console_layer = match config.format {
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .with_filter(console_filter)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_filter(console_filter)
            .boxed(),
    };
    layers.push(console_layer);

    let guard = file_layers(debug_flags, config, &mut layers)?;

    Registry::default()
        .with(layers)
        .try_init()
        .context("Failed to install global tracing subscriber")?;

    Ok(guard)
}

#[cfg(feature = "file-logging")]
fn file_layers(
    debug_flags: &CrateDebugFlags,
    config: &LoggingConfig,
    layers: &mut Vec<BoxedLayer>,
) -> Result<LoggingGuard> {
    use tracing_appender::rolling;

    if !config.file_output {
        return Ok(LoggingGuard {
            _file_guards: Vec::new(),
            log_dir: None,
        });
    }

    let run_folder = create_run_folder(&config.log_dir)?;
    cleanup_old_runs(&config.log_dir, config.retention_runs)?;

    let appender = rolling::daily(&run_folder, "lifgrad.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .json()
        .with_filter(build_filter(debug_flags, config)?)
        .boxed();
    layers.push(file_layer);

    Ok(LoggingGuard {
        _file_guards: vec![guard],
        log_dir: Some(run_folder),
    })
}

#[cfg(not(feature = "file-logging"))]
fn file_layers(
    _debug_flags: &CrateDebugFlags,
    config: &LoggingConfig,
    _layers: &mut Vec<BoxedLayer>,
) -> Result<LoggingGuard> {
    if config.file_output {
        anyhow::bail!("File logging requested but the 'file-logging' feature is not enabled");
    }
    Ok(LoggingGuard {})
}

/// Create `<base>/run_<UTC timestamp>`
#[cfg(feature = "file-logging")]
pub fn create_run_folder(base_log_dir: &Path) -> Result<PathBuf> {
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let run_folder = base_log_dir.join(format!("run_{}", timestamp));
    std::fs::create_dir_all(&run_folder)
        .with_context(|| format!("Failed to create log directory: {}", run_folder.display()))?;
    Ok(run_folder)
}

/// Remove all but the `retention_runs` most recent `run_*` folders
///
/// Folder names sort chronologically, so no timestamp parsing is needed.
#[cfg(feature = "file-logging")]
pub fn cleanup_old_runs(base_log_dir: &Path, retention_runs: usize) -> Result<()> {
    if !base_log_dir.exists() {
        return Ok(());
    }

    let mut runs: Vec<PathBuf> = std::fs::read_dir(base_log_dir)
        .with_context(|| format!("Failed to read log directory: {}", base_log_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_dir()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("run_"))
        })
        .collect();

    if runs.len() <= retention_runs {
        return Ok(());
    }

    runs.sort();
    let to_remove = runs.len() - retention_runs;
    for path in runs.iter().take(to_remove) {
        if let Err(e) = std::fs::remove_dir_all(path) {
            eprintln!(
                "Warning: Failed to remove old log directory {}: {}",
                path.display(),
                e
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_from_flags() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let flags = CrateDebugFlags::from_args(vec!["--debug-lifgrad-npu-engine".to_string()]);
        let config = LoggingConfig {
            level: "warn".to_string(),
            ..Default::default()
        };
        let filter = build_filter(&flags, &config).unwrap();
        let rendered = filter.to_string();
        assert!(rendered.contains("lifgrad_npu_engine=debug"));
        assert!(rendered.contains("warn"));
    }

    #[test]
    fn test_invalid_level_rejected() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LoggingConfig {
            level: "lifgrad=loudest".to_string(),
            ..Default::default()
        };
        assert!(build_filter(&CrateDebugFlags::default(), &config).is_err());
    }

    #[cfg(not(feature = "file-logging"))]
    #[test]
    fn test_file_output_needs_feature() {
        let config = LoggingConfig {
            file_output: true,
            ..Default::default()
        };
        let mut layers = Vec::new();
        assert!(file_layers(&CrateDebugFlags::default(), &config, &mut layers).is_err());
    }

    #[cfg(feature = "file-logging")]
    #[test]
    fn test_cleanup_keeps_most_recent_runs() {
        let dir = tempfile::tempdir().unwrap();
        for stamp in ["20250101_000000", "20250102_000000", "20250103_000000"] {
            std::fs::create_dir_all(dir.path().join(format!("run_{}", stamp))).unwrap();
        }
        std::fs::create_dir_all(dir.path().join("unrelated")).unwrap();

        cleanup_old_runs(dir.path(), 2).unwrap();

        assert!(!dir.path().join("run_20250101_000000").exists());
        assert!(dir.path().join("run_20250102_000000").exists());
        assert!(dir.path().join("run_20250103_000000").exists());
        assert!(dir.path().join("unrelated").exists());
    }
}
