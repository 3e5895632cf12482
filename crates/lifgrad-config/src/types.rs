// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! This module defines all configuration structs that map to sections in
//! `lifgrad.toml`. Every section and field has a default, so a partial (or
//! empty) file is valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Surrogate names accepted in `neuron.surrogate`, in selector order
pub const KNOWN_SURROGATES: [&str; 4] = ["atan", "sigmoid", "soft_sign", "piecewise_quadratic"];

/// Alternate spellings accepted for surrogate names
pub const SURROGATE_ALIASES: [(&str, &str); 3] = [
    ("arctan", "atan"),
    ("softsign", "soft_sign"),
    ("piecewisequadratic", "piecewise_quadratic"),
];

/// Canonical surrogate name for `name`, ignoring case and `-` vs `_`
pub fn canonical_surrogate(name: &str) -> Option<&'static str> {
    let normalized = name.to_lowercase().replace('-', "_");
    KNOWN_SURROGATES
        .iter()
        .copied()
        .find(|known| *known == normalized)
        .or_else(|| {
            SURROGATE_ALIASES
                .iter()
                .find(|(alias, _)| *alias == normalized)
                .map(|&(_, canonical)| canonical)
        })
}

/// Backend names accepted in `backend.backend`
pub const KNOWN_BACKENDS: [&str; 5] = ["auto", "cpu", "wgpu", "gpu", "cuda"];

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LifgradConfig {
    pub system: SystemConfig,
    pub neuron: NeuronConfig,
    pub backend: BackendSection,
    pub logging: LoggingSection,
}

/// System-level configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SystemConfig {
    pub log_level: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Hard-reset LIF neuron parameters
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NeuronConfig {
    pub v_threshold: f32,
    pub v_reset: f32,
    /// Membrane time constant; kernels receive `1 / tau`
    pub tau: f32,
    /// Surrogate sharpness
    pub alpha: f32,
    pub surrogate: String,
    pub detach_reset: bool,
}

impl Default for NeuronConfig {
    fn default() -> Self {
        Self {
            v_threshold: 1.0,
            v_reset: 0.0,
            tau: 2.0,
            alpha: 2.0,
            surrogate: "atan".to_string(),
            detach_reset: false,
        }
    }
}

impl NeuronConfig {
    /// `1 / tau`, the charge factor the kernels take
    pub fn reciprocal_tau(&self) -> f32 {
        1.0 / self.tau
    }
}

/// Compute backend selection
///
/// Named `BackendSection` to stay clear of the engine's `BackendConfig`,
/// which this section is mapped onto.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendSection {
    /// "auto", "cpu", "wgpu" (alias "gpu") or "cuda"
    pub backend: String,
    pub device_ordinal: u32,
    pub cpu_parallel_threshold: usize,
    pub gpu_neuron_threshold: usize,
    pub cuda_neuron_threshold: usize,
    pub force_cpu: bool,
    pub force_gpu: bool,
    pub force_cuda: bool,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            backend: "auto".to_string(),
            device_ordinal: 0,
            cpu_parallel_threshold: 4_096,
            gpu_neuron_threshold: 262_144,
            cuda_neuron_threshold: 65_536,
            force_cpu: false,
            force_gpu: false,
            force_cuda: false,
        }
    }
}

/// Log output configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSection {
    /// "text" or "json"
    pub format: String,
    pub file_output: bool,
    pub log_dir: PathBuf,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            file_output: false,
            log_dir: PathBuf::from("./logs"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LifgradConfig::default();
        assert_eq!(config.neuron.v_threshold, 1.0);
        assert_eq!(config.neuron.reciprocal_tau(), 0.5);
        assert_eq!(config.backend.cpu_parallel_threshold, 4_096);
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: LifgradConfig = toml::from_str(
            r#"
            [neuron]
            tau = 4.0
            surrogate = "sigmoid"
            "#,
        )
        .unwrap();

        assert_eq!(config.neuron.reciprocal_tau(), 0.25);
        assert_eq!(config.neuron.surrogate, "sigmoid");
        assert_eq!(config.neuron.alpha, 2.0);
        assert_eq!(config.backend, BackendSection::default());
    }

    #[test]
    fn test_serialize_round_trips_through_json() {
        let config = LifgradConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: LifgradConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
