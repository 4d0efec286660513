// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2024 NervoSys

//! DXGI adapter enumeration
//!
//! Uses `IDXGIFactory6::EnumAdapterByGpuPreference` so the same physical
//! adapter can be listed under each preference class in the order the
//! platform would pick it.

#![cfg(windows)]

use super::{AdapterDesc, AdapterSource, GpuPreference};
use crate::error::{BenchError, Result};
use windows::Win32::Graphics::Dxgi::{
    CreateDXGIFactory1, IDXGIAdapter1, IDXGIFactory6, DXGI_ADAPTER_FLAG_SOFTWARE,
    DXGI_ERROR_NOT_FOUND, DXGI_GPU_PREFERENCE, DXGI_GPU_PREFERENCE_HIGH_PERFORMANCE,
    DXGI_GPU_PREFERENCE_MINIMUM_POWER, DXGI_GPU_PREFERENCE_UNSPECIFIED,
};

/// Adapter source backed by a DXGI 1.6 factory
pub struct DxgiAdapterSource {
    factory: IDXGIFactory6,
}

impl DxgiAdapterSource {
    /// Create the DXGI factory.
    ///
    /// Fails on systems without DXGI 1.6 (pre Windows 10 1803).
    pub fn new() -> Result<Self> {
        let factory: IDXGIFactory6 = unsafe { CreateDXGIFactory1() }
            .map_err(|e| BenchError::DeviceEnumeration(format!("CreateDXGIFactory1: {}", e)))?;
        Ok(Self { factory })
    }
}

impl AdapterSource for DxgiAdapterSource {
    fn adapter(&self, preference: GpuPreference, index: u32) -> Result<Option<AdapterDesc>> {
        let adapter: IDXGIAdapter1 = match unsafe {
            self.factory
                .EnumAdapterByGpuPreference(index, to_dxgi_preference(preference))
        } {
            Ok(a) => a,
            Err(e) if e.code() == DXGI_ERROR_NOT_FOUND => return Ok(None),
            Err(e) => {
                return Err(BenchError::DeviceEnumeration(format!(
                    "EnumAdapterByGpuPreference({}, {}): {}",
                    index, preference, e
                )))
            }
        };

        let desc = unsafe { adapter.GetDesc1() }
            .map_err(|e| BenchError::DeviceEnumeration(format!("GetDesc1: {}", e)))?;

        Ok(Some(AdapterDesc {
            description: description_from_wide(&desc.Description),
            vendor_id: desc.VendorId,
            device_id: desc.DeviceId,
            dedicated_video_memory: desc.DedicatedVideoMemory as u64,
            dedicated_system_memory: desc.DedicatedSystemMemory as u64,
            shared_system_memory: desc.SharedSystemMemory as u64,
            is_software: desc.Flags & DXGI_ADAPTER_FLAG_SOFTWARE.0 as u32 != 0,
        }))
    }
}

fn to_dxgi_preference(preference: GpuPreference) -> DXGI_GPU_PREFERENCE {
    match preference {
        GpuPreference::Unspecified => DXGI_GPU_PREFERENCE_UNSPECIFIED,
        GpuPreference::HighPerformance => DXGI_GPU_PREFERENCE_HIGH_PERFORMANCE,
        GpuPreference::MinimumPower => DXGI_GPU_PREFERENCE_MINIMUM_POWER,
    }
}

/// Convert a NUL-terminated wide-char adapter description to a String
fn description_from_wide(wide: &[u16]) -> String {
    let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..len])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_from_wide() {
        let mut buf = [0u16; 128];
        for (slot, c) in buf.iter_mut().zip("Radeon RX 6800".encode_utf16()) {
            *slot = c;
        }
        assert_eq!(description_from_wide(&buf), "Radeon RX 6800");
        assert_eq!(description_from_wide(&[]), "");
    }

    #[test]
    fn test_preference_mapping() {
        assert_eq!(
            to_dxgi_preference(GpuPreference::HighPerformance),
            DXGI_GPU_PREFERENCE_HIGH_PERFORMANCE
        );
        assert_eq!(
            to_dxgi_preference(GpuPreference::MinimumPower),
            DXGI_GPU_PREFERENCE_MINIMUM_POWER
        );
    }
}
