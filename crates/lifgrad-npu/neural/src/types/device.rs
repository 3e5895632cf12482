// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Device placement recorded on every buffer

use core::fmt;

#[cfg(feature = "std")]
use serde::{Deserialize, Serialize};

/// Where a buffer lives (and where a call executes)
///
/// Every buffer handed to one operator call must carry the same `Device` as
/// the call's context. The ordinal selects the adapter / GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "std", serde(rename_all = "lowercase"))]
pub enum Device {
    /// Host memory, CPU execution
    #[default]
    Cpu,
    /// WGPU adapter (Metal/Vulkan/DirectX)
    Wgpu(u32),
    /// CUDA device ordinal
    Cuda(u32),
}

impl Device {
    /// True for any accelerator placement
    pub fn is_accelerator(&self) -> bool {
        !matches!(self, Device::Cpu)
    }

    /// Device ordinal (0 for CPU)
    pub fn ordinal(&self) -> u32 {
        match self {
            Device::Cpu => 0,
            Device::Wgpu(ordinal) | Device::Cuda(ordinal) => *ordinal,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Wgpu(ordinal) => write!(f, "wgpu:{}", ordinal),
            Device::Cuda(ordinal) => write!(f, "cuda:{}", ordinal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_display() {
        assert_eq!(Device::Cpu.to_string(), "cpu");
        assert_eq!(Device::Wgpu(1).to_string(), "wgpu:1");
        assert_eq!(Device::Cuda(0).to_string(), "cuda:0");
    }

    #[test]
    fn test_device_ordinal() {
        assert_eq!(Device::Cpu.ordinal(), 0);
        assert_eq!(Device::Cuda(3).ordinal(), 3);
        assert!(!Device::Cpu.is_accelerator());
        assert!(Device::Wgpu(0).is_accelerator());
    }
}
