// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Loading complete `lifgrad.toml` files from disk

use lifgrad_config::{load_config, validate_config, ConfigError, CONFIG_FILE_NAME};
use std::fs;
use tempfile::tempdir;

const FULL_CONFIG: &str = r#"
[system]
log_level = "debug"

[neuron]
v_threshold = 1.0
v_reset = -0.1
tau = 2.5
alpha = 4.0
surrogate = "piecewise_quadratic"
detach_reset = true

[backend]
backend = "cpu"
device_ordinal = 0
cpu_parallel_threshold = 8192
gpu_neuron_threshold = 1000000
cuda_neuron_threshold = 100000
force_cpu = true

[logging]
format = "json"
file_output = false
log_dir = "/tmp/lifgrad-logs"
"#;

#[test]
fn test_full_file_loads_and_validates() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    fs::write(&path, FULL_CONFIG).unwrap();

    let config = load_config(Some(&path), None).unwrap();
    validate_config(&config).unwrap();

    assert_eq!(config.neuron.v_reset, -0.1);
    assert!((config.neuron.reciprocal_tau() - 0.4).abs() < 1e-6);
    assert!(config.neuron.detach_reset);
    assert_eq!(config.backend.cpu_parallel_threshold, 8192);
    assert!(config.backend.force_cpu);
    assert_eq!(config.logging.format, "json");
}

#[test]
fn test_empty_file_is_all_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    fs::write(&path, "").unwrap();

    let config = load_config(Some(&path), None).unwrap();
    assert!(validate_config(&config).is_ok());
    assert_eq!(config.neuron.surrogate, "atan");
}

#[test]
fn test_wrong_type_is_parse_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    fs::write(&path, "[neuron]\ntau = \"slow\"\n").unwrap();

    let err = load_config(Some(&path), None).unwrap_err();
    assert!(matches!(err, ConfigError::ParseError(_)));
}

#[test]
fn test_missing_explicit_path_is_io_error() {
    let dir = tempdir().unwrap();
    let err = load_config(Some(&dir.path().join("absent.toml")), None).unwrap_err();
    assert!(matches!(err, ConfigError::IoError(_)));
}

#[test]
fn test_loaded_but_invalid_values_fail_validation() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    fs::write(&path, "[neuron]\ntau = 0.25\nsurrogate = \"step\"\n").unwrap();

    let config = load_config(Some(&path), None).unwrap();
    let err = validate_config(&config).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("neuron.tau"));
    assert!(msg.contains("step"));
}
