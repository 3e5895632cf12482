// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Every violation is collected before failing, so one run reports all of
//! them.

use crate::types::{canonical_surrogate, KNOWN_BACKENDS, KNOWN_SURROGATES};
use crate::{ConfigError, ConfigResult, LifgradConfig};

/// Validation errors that can occur during config validation
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    MissingRequired { field: String },
    InvalidValue { field: String, reason: String },
    UnknownName { field: String, value: String, known: Vec<&'static str> },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRequired { field } => {
                write!(f, "Missing required configuration: {}", field)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
            Self::UnknownName {
                field,
                value,
                known,
            } => {
                write!(
                    f,
                    "Unknown {} '{}' (expected one of: {})",
                    field,
                    value,
                    known.join(", ")
                )
            }
        }
    }
}

/// Validate the complete configuration
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every violation
pub fn validate_config(config: &LifgradConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_required_fields(config, &mut errors);
    validate_neuron(config, &mut errors);
    validate_names(config, &mut errors);

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

fn validate_required_fields(config: &LifgradConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.system.log_level.trim().is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "system.log_level".to_string(),
        });
    }

    if config.logging.file_output && config.logging.log_dir.as_os_str().is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "logging.log_dir".to_string(),
        });
    }
}

/// Neuron parameters must keep `1 / tau` in (0, 1]
fn validate_neuron(config: &LifgradConfig, errors: &mut Vec<ConfigValidationError>) {
    let neuron = &config.neuron;

    if !(neuron.tau.is_finite() && neuron.tau >= 1.0) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "neuron.tau".to_string(),
            reason: format!("must be a finite value >= 1.0 (got {})", neuron.tau),
        });
    }

    if !(neuron.alpha.is_finite() && neuron.alpha > 0.0) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "neuron.alpha".to_string(),
            reason: format!("must be positive (got {})", neuron.alpha),
        });
    }

    if !neuron.v_threshold.is_finite() || !neuron.v_reset.is_finite() {
        errors.push(ConfigValidationError::InvalidValue {
            field: "neuron.v_threshold/v_reset".to_string(),
            reason: "must be finite".to_string(),
        });
    } else if neuron.v_reset >= neuron.v_threshold {
        errors.push(ConfigValidationError::InvalidValue {
            field: "neuron.v_reset".to_string(),
            reason: format!(
                "must be below v_threshold ({} >= {})",
                neuron.v_reset, neuron.v_threshold
            ),
        });
    }
}

fn validate_names(config: &LifgradConfig, errors: &mut Vec<ConfigValidationError>) {
    if canonical_surrogate(&config.neuron.surrogate).is_none() {
        errors.push(ConfigValidationError::UnknownName {
            field: "neuron.surrogate".to_string(),
            value: config.neuron.surrogate.clone(),
            known: KNOWN_SURROGATES.to_vec(),
        });
    }

    let backend = config.backend.backend.to_lowercase();
    if !KNOWN_BACKENDS.contains(&backend.as_str()) {
        errors.push(ConfigValidationError::UnknownName {
            field: "backend.backend".to_string(),
            value: config.backend.backend.clone(),
            known: KNOWN_BACKENDS.to_vec(),
        });
    }

    if config.logging.format != "text" && config.logging.format != "json" {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.format".to_string(),
            reason: "must be 'text' or 'json'".to_string(),
        });
    }
}
