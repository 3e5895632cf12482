// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for LIF kernel operations

use super::device::Device;

/// Error types for LIF kernel operations
///
/// Everything except `ComputationError` is a precondition violation: it is
/// raised at the operator boundary before any kernel work starts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LifError {
    #[error("Device mismatch: {name} is on {actual}, but the call runs on {expected}")]
    DeviceMismatch {
        name: &'static str,
        expected: Device,
        actual: Device,
    },

    #[error("Non-contiguous buffer: {0} must be densely packed in row-major order")]
    NonContiguous(&'static str),

    #[error("Shape mismatch for {name}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Empty sequence: {0} needs a leading time axis with at least one step")]
    EmptySequence(&'static str),

    #[error("Invalid surrogate function: {0}")]
    InvalidSurrogate(String),

    #[error("Invalid backend: {0}")]
    InvalidBackend(String),

    #[error("Computation error: {0}")]
    ComputationError(String),
}

impl LifError {
    /// True when the error was raised by a boundary check (no work was done)
    pub fn is_precondition(&self) -> bool {
        !matches!(self, LifError::ComputationError(_) | LifError::InvalidBackend(_))
    }
}

pub type Result<T> = core::result::Result<T, LifError>;
pub type Error = LifError;
