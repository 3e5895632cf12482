// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! Three tiers, later ones winning:
//! 1. TOML file (base values, missing keys take defaults)
//! 2. Environment variables (`LIFGRAD_*`)
//! 3. CLI arguments (explicit user overrides)

use crate::{ConfigError, ConfigResult, LifgradConfig, CONFIG_FILE_NAME};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Find the lifgrad configuration file
///
/// Search order:
/// 1. `LIFGRAD_CONFIG_PATH` environment variable
/// 2. Current working directory: `./lifgrad.toml`
/// 3. Up to 5 parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("LIFGRAD_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by LIFGRAD_CONFIG_PATH not found: {}",
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
        search_paths.extend(
            cwd.ancestors()
                .skip(1)
                .take(5)
                .map(|dir| dir.join(CONFIG_FILE_NAME)),
        );
    }

    if let Some(path) = search_paths.iter().find(|p| p.exists()) {
        return Ok(path.clone());
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "Configuration file '{}' not found in any of these locations:\n{}\n\nSet LIFGRAD_CONFIG_PATH environment variable to specify custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, will search for config file.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if the config file is not found or contains invalid TOML.
/// Values are not validated here; call [`crate::validate_config`].
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<LifgradConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    load_config_str(&content, cli_args)
}

/// Same as [`load_config`] for TOML already in memory
pub fn load_config_str(
    content: &str,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<LifgradConfig> {
    let mut config: LifgradConfig = toml::from_str(content)?;

    apply_environment_overrides(&mut config);
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli);
    }

    Ok(config)
}

fn parse_bool(value: &str) -> bool {
    let value = value.to_lowercase();
    value == "true" || value == "1" || value == "yes"
}

/// Overwrite `target` when `value` parses; malformed values are ignored
fn set_parsed<T: FromStr>(target: &mut T, value: &str) {
    if let Ok(parsed) = value.parse::<T>() {
        *target = parsed;
    }
}

/// Apply one `key = value` override shared by the environment and CLI tiers
fn apply_override(config: &mut LifgradConfig, key: &str, value: &str) {
    match key {
        "log_level" => config.system.log_level = value.to_string(),

        "v_threshold" => set_parsed(&mut config.neuron.v_threshold, value),
        "v_reset" => set_parsed(&mut config.neuron.v_reset, value),
        "tau" => set_parsed(&mut config.neuron.tau, value),
        "alpha" => set_parsed(&mut config.neuron.alpha, value),
        "surrogate" => config.neuron.surrogate = value.to_string(),
        "detach_reset" => config.neuron.detach_reset = parse_bool(value),

        "backend" => config.backend.backend = value.to_string(),
        "device_ordinal" => set_parsed(&mut config.backend.device_ordinal, value),
        "cpu_parallel_threshold" => set_parsed(&mut config.backend.cpu_parallel_threshold, value),
        "gpu_neuron_threshold" => set_parsed(&mut config.backend.gpu_neuron_threshold, value),
        "cuda_neuron_threshold" => set_parsed(&mut config.backend.cuda_neuron_threshold, value),
        "force_cpu" => config.backend.force_cpu = parse_bool(value),
        "force_gpu" => config.backend.force_gpu = parse_bool(value),
        "force_cuda" => config.backend.force_cuda = parse_bool(value),

        "log_format" => config.logging.format = value.to_lowercase(),
        "log_file_output" => config.logging.file_output = parse_bool(value),
        "log_dir" => config.logging.log_dir = PathBuf::from(value),

        _ => {}
    }
}

/// Keys understood by both override tiers
pub const OVERRIDE_KEYS: [&str; 18] = [
    "log_level",
    "v_threshold",
    "v_reset",
    "tau",
    "alpha",
    "surrogate",
    "detach_reset",
    "backend",
    "device_ordinal",
    "cpu_parallel_threshold",
    "gpu_neuron_threshold",
    "cuda_neuron_threshold",
    "force_cpu",
    "force_gpu",
    "force_cuda",
    "log_format",
    "log_file_output",
    "log_dir",
];

/// Apply environment variable overrides to configuration
///
/// Every key in [`OVERRIDE_KEYS`] maps to `LIFGRAD_<KEY>`, e.g.
/// - `LIFGRAD_LOG_LEVEL` -> `system.log_level`
/// - `LIFGRAD_TAU` -> `neuron.tau`
/// - `LIFGRAD_SURROGATE` -> `neuron.surrogate`
/// - `LIFGRAD_BACKEND` -> `backend.backend`
/// - `LIFGRAD_FORCE_CPU` -> `backend.force_cpu`
/// - `LIFGRAD_LOG_DIR` -> `logging.log_dir`
pub fn apply_environment_overrides(config: &mut LifgradConfig) {
    for key in OVERRIDE_KEYS {
        let var = format!("LIFGRAD_{}", key.to_uppercase());
        if let Ok(value) = env::var(&var) {
            apply_override(config, key, &value);
        }
    }
}

/// Apply CLI argument overrides to configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - HashMap of CLI arguments (e.g., `{"backend": "cpu", "tau": "4"}`)
///
/// Unknown keys are ignored.
pub fn apply_cli_overrides(config: &mut LifgradConfig, cli_args: &HashMap<String, String>) {
    for (key, value) in cli_args {
        apply_override(config, key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_find_config_file_env_var() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("custom_config.toml");
        File::create(&config_path).unwrap();

        env::set_var("LIFGRAD_CONFIG_PATH", config_path.to_str().unwrap());
        let result = find_config_file();
        env::remove_var("LIFGRAD_CONFIG_PATH");

        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    fn test_find_config_file_env_var_missing_file() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        env::set_var("LIFGRAD_CONFIG_PATH", "/nonexistent/lifgrad.toml");
        let result = find_config_file();
        env::remove_var("LIFGRAD_CONFIG_PATH");

        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_minimal_config() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let saved_tau = env::var("LIFGRAD_TAU").ok();
        env::remove_var("LIFGRAD_TAU");
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[neuron]").unwrap();
        writeln!(file, "tau = 4.0").unwrap();
        writeln!(file, "[backend]").unwrap();
        writeln!(file, "backend = \"cpu\"").unwrap();

        let config = load_config(Some(&config_path), None).unwrap();

        assert_eq!(config.neuron.tau, 4.0);
        assert_eq!(config.backend.backend, "cpu");

        if let Some(value) = saved_tau {
            env::set_var("LIFGRAD_TAU", value);
        }
    }

    #[test]
    fn test_environment_overrides() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let mut config = LifgradConfig::default();

        env::set_var("LIFGRAD_SURROGATE", "sigmoid");
        env::set_var("LIFGRAD_CPU_PARALLEL_THRESHOLD", "128");
        env::set_var("LIFGRAD_FORCE_CPU", "yes");
        env::set_var("LIFGRAD_ALPHA", "not-a-number");

        apply_environment_overrides(&mut config);

        env::remove_var("LIFGRAD_SURROGATE");
        env::remove_var("LIFGRAD_CPU_PARALLEL_THRESHOLD");
        env::remove_var("LIFGRAD_FORCE_CPU");
        env::remove_var("LIFGRAD_ALPHA");

        assert_eq!(config.neuron.surrogate, "sigmoid");
        assert_eq!(config.backend.cpu_parallel_threshold, 128);
        assert!(config.backend.force_cpu);
        // Malformed values leave the previous setting
        assert_eq!(config.neuron.alpha, 2.0);
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = LifgradConfig::default();
        let mut cli_args = HashMap::new();
        cli_args.insert("backend".to_string(), "wgpu".to_string());
        cli_args.insert("device_ordinal".to_string(), "1".to_string());
        cli_args.insert("detach_reset".to_string(), "true".to_string());
        cli_args.insert("no_such_key".to_string(), "ignored".to_string());

        apply_cli_overrides(&mut config, &cli_args);

        assert_eq!(config.backend.backend, "wgpu");
        assert_eq!(config.backend.device_ordinal, 1);
        assert!(config.neuron.detach_reset);
    }

    #[test]
    fn test_override_precedence() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[neuron]").unwrap();
        writeln!(file, "v_threshold = 0.5").unwrap();
        writeln!(file, "tau = 8.0").unwrap();

        env::set_var("LIFGRAD_V_THRESHOLD", "0.75");
        env::set_var("LIFGRAD_TAU", "3.0");

        let mut cli_args = HashMap::new();
        cli_args.insert("v_threshold".to_string(), "0.9".to_string());

        let config = load_config(Some(&config_path), Some(&cli_args)).unwrap();

        env::remove_var("LIFGRAD_V_THRESHOLD");
        env::remove_var("LIFGRAD_TAU");

        // CLI wins for threshold, env wins for tau (no CLI override)
        assert_eq!(config.neuron.v_threshold, 0.9);
        assert_eq!(config.neuron.tau, 3.0);
    }
}
