// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Dense Float Buffers
//!
//! Minimal stand-in for the host framework's tensors: a shaped `f32` array
//! plus the device it is recorded on. Borrowed inputs are [`TensorRef`],
//! freshly allocated outputs are [`Tensor`].
//!
//! Layout is whatever `ndarray` says it is; operators only accept standard
//! (row-major, densely packed) layout and reject anything else up front.

use lifgrad_npu_neural::types::{Device, LifError, Result};
use ndarray::{ArrayD, ArrayViewD, IxDyn};

/// Borrowed input buffer
#[derive(Debug, Clone)]
pub struct TensorRef<'a> {
    data: ArrayViewD<'a, f32>,
    device: Device,
}

impl<'a> TensorRef<'a> {
    /// Wrap an existing view (any layout)
    pub fn new(data: ArrayViewD<'a, f32>, device: Device) -> Self {
        Self { data, device }
    }

    /// View a flat slice with the given row-major shape
    pub fn from_slice(device: Device, shape: &[usize], data: &'a [f32]) -> Result<Self> {
        let view = ArrayViewD::from_shape(IxDyn(shape), data).map_err(|_| {
            LifError::ShapeMismatch {
                name: "slice",
                expected: shape.to_vec(),
                actual: vec![data.len()],
            }
        })?;
        Ok(Self::new(view, device))
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Number of elements
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Row-major and densely packed
    pub fn is_contiguous(&self) -> bool {
        self.data.is_standard_layout()
    }

    /// Flat data, only for contiguous buffers
    pub fn as_slice(&self) -> Option<&[f32]> {
        self.data.as_slice()
    }
}

/// Owned buffer, always in standard layout
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: ArrayD<f32>,
    device: Device,
}

impl Tensor {
    /// Zero-initialised buffer (`zeros_like` in host terms)
    pub fn zeros(device: Device, shape: &[usize]) -> Self {
        Self {
            data: ArrayD::zeros(IxDyn(shape)),
            device,
        }
    }

    /// Build from flat row-major data
    pub fn from_vec(device: Device, shape: &[usize], data: Vec<f32>) -> Result<Self> {
        let len = data.len();
        let array = ArrayD::from_shape_vec(IxDyn(shape), data).map_err(|_| {
            LifError::ShapeMismatch {
                name: "data",
                expected: shape.to_vec(),
                actual: vec![len],
            }
        })?;
        Ok(Self {
            data: array,
            device,
        })
    }

    /// Take ownership of an array, repacking it into standard layout if needed
    pub fn from_array(device: Device, data: ArrayD<f32>) -> Self {
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };
        Self { data, device }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Borrow as an operator input
    pub fn view(&self) -> TensorRef<'_> {
        TensorRef::new(self.data.view(), self.device)
    }

    pub fn as_slice(&self) -> &[f32] {
        self.data.as_slice().unwrap_or_default()
    }

    pub fn into_vec(self) -> Vec<f32> {
        let (data, _offset) = self.data.into_raw_vec_and_offset();
        data
    }
}
