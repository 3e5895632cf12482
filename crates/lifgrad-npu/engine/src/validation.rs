// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Boundary checks run before any kernel launch.
//!
//! Every operator checks all operands' devices first, then layout, then
//! shapes, so the reported error does not depend on argument order within
//! a category.

use lifgrad_npu_neural::types::{Device, LifError, Result};

use crate::tensor::TensorRef;

/// Device and layout of one operand, captured before any check runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand {
    pub name: &'static str,
    pub device: Device,
    pub contiguous: bool,
}

impl Operand {
    pub fn of(name: &'static str, tensor: &TensorRef<'_>) -> Self {
        Self {
            name,
            device: tensor.device(),
            contiguous: tensor.is_contiguous(),
        }
    }
}

/// Every operand must be recorded on the context's device
pub fn check_devices(expected: Device, operands: &[Operand]) -> Result<()> {
    for operand in operands {
        if operand.device != expected {
            return Err(LifError::DeviceMismatch {
                name: operand.name,
                expected,
                actual: operand.device,
            });
        }
    }
    Ok(())
}

/// Every operand must be densely packed in row-major order
pub fn check_contiguous(operands: &[Operand]) -> Result<()> {
    match operands.iter().find(|operand| !operand.contiguous) {
        Some(operand) => Err(LifError::NonContiguous(operand.name)),
        None => Ok(()),
    }
}

/// Flat data of a contiguous operand
pub fn contiguous_slice<'t>(name: &'static str, tensor: &'t TensorRef<'_>) -> Result<&'t [f32]> {
    tensor.as_slice().ok_or(LifError::NonContiguous(name))
}

pub fn check_shape(name: &'static str, tensor: &TensorRef<'_>, expected: &[usize]) -> Result<()> {
    if tensor.shape() != expected {
        return Err(LifError::ShapeMismatch {
            name,
            expected: expected.to_vec(),
            actual: tensor.shape().to_vec(),
        });
    }
    Ok(())
}

/// Split a sequence operand `[T, ...rest]` into `(T, rest)`; `T` must be at least 1
pub fn split_time_axis<'t>(
    name: &'static str,
    tensor: &'t TensorRef<'_>,
) -> Result<(usize, &'t [usize])> {
    match tensor.shape().split_first() {
        Some((&time_steps, rest)) if time_steps > 0 => Ok((time_steps, rest)),
        _ => Err(LifError::EmptySequence(name)),
    }
}
