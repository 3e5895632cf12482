// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! CLI argument parsing for per-crate debug flags
//!
//! Supports flags like `--debug-lifgrad-npu-engine` to raise one crate to
//! debug level, and `--debug-all` for every crate in [`KNOWN_CRATES`].

use std::collections::BTreeSet;
use std::env;

use crate::KNOWN_CRATES;

/// Parse debug flags from command-line arguments
///
/// # Example
/// ```rust
/// use lifgrad_observability::CrateDebugFlags;
///
/// let flags = CrateDebugFlags::from_args(vec!["--debug-lifgrad-npu-engine".to_string()]);
/// assert!(flags.is_enabled("lifgrad-npu-engine"));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrateDebugFlags {
    enabled_crates: BTreeSet<String>,
}

impl CrateDebugFlags {
    /// Parse debug flags from command-line arguments
    ///
    /// Looks for arguments matching `--debug-{crate-name}`; other arguments
    /// are ignored.
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut flags = CrateDebugFlags::default();

        for arg in args {
            if arg == "--debug-all" {
                flags.enable_all();
            } else if let Some(crate_name) = arg.strip_prefix("--debug-") {
                flags.enable(crate_name);
            }
        }

        flags
    }

    /// Merge a `LIFGRAD_DEBUG` style value: `all` or comma-separated crate names
    pub fn merge_env_value(&mut self, value: &str) {
        if value.trim() == "all" {
            self.enable_all();
            return;
        }
        for crate_name in value.split(',').map(str::trim) {
            if !crate_name.is_empty() {
                self.enable(crate_name);
            }
        }
    }

    pub fn enable(&mut self, crate_name: &str) {
        self.enabled_crates.insert(crate_name.to_string());
    }

    fn enable_all(&mut self) {
        for crate_name in KNOWN_CRATES {
            self.enable(crate_name);
        }
    }

    /// Check if debug is enabled for a specific crate
    pub fn is_enabled(&self, crate_name: &str) -> bool {
        self.enabled_crates.contains(crate_name)
    }

    /// Get all enabled crates, sorted
    pub fn enabled_crates(&self) -> impl Iterator<Item = &str> {
        self.enabled_crates.iter().map(String::as_str)
    }

    /// Check if debug is enabled for any crate
    pub fn any_enabled(&self) -> bool {
        !self.enabled_crates.is_empty()
    }

    /// Get log level for a crate
    ///
    /// Returns `tracing::Level::DEBUG` if enabled, `tracing::Level::INFO` otherwise.
    pub fn log_level(&self, crate_name: &str) -> tracing::Level {
        if self.is_enabled(crate_name) {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Build an `EnvFilter` directive string
    ///
    /// Each enabled crate gets a `debug` directive under both its package
    /// name and its module path (`lifgrad-npu-engine` / `lifgrad_npu_engine`),
    /// since events carry either as target. `base_level` applies to everything
    /// else.
    pub fn to_filter_string(&self, base_level: &str) -> String {
        let mut filters = vec![base_level.to_string()];
        for crate_name in &self.enabled_crates {
            filters.push(format!("{}=debug", crate_name));
            let module_path = crate_name.replace('-', "_");
            if module_path != *crate_name {
                filters.push(format!("{}=debug", module_path));
            }
        }
        filters.join(",")
    }
}

/// Parse debug flags from the process arguments and `LIFGRAD_DEBUG`
///
/// Environment variable format: `all` or comma-separated crate names,
/// e.g. `lifgrad-npu-engine,lifgrad-config`.
pub fn parse_debug_flags() -> CrateDebugFlags {
    let mut flags = CrateDebugFlags::from_args(env::args());
    if let Ok(value) = env::var("LIFGRAD_DEBUG") {
        flags.merge_env_value(&value);
    }
    flags
}

/// Generate help text for debug flags
pub fn debug_flags_help() -> String {
    format!(
        r#"Debug Flags:
  --debug-all                    Enable debug logging for all crates
  --debug-{{crate-name}}          Enable debug logging for specific crate

Available crates:
  {}

Environment Variables:
  LIFGRAD_DEBUG={{crate-name}}[,{{crate-name}}]  Enable debug for crates (comma-separated)
  LIFGRAD_DEBUG=all                             Enable debug for all crates
  LIFGRAD_TRACE_KERNEL=1                        Per-step kernel tracing (trace level)

Examples:
  --debug-lifgrad-npu-engine
  LIFGRAD_DEBUG=lifgrad-npu-engine,lifgrad-config
"#,
        KNOWN_CRATES.join(", ")
    )
}
