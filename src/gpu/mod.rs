// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2024 NervoSys

//! GPU adapter inventory
//!
//! Enumerates compute adapters once per preference class (default, high
//! performance, minimum power) and drops software adapters and the Microsoft
//! Basic Render Driver. The result is used upstream to decide whether an
//! accelerated device should be requested from the inference engine.
//!
//! Platform access goes through [`AdapterSource`]; on Windows the default
//! source is DXGI (see [`windows_helpers`]), elsewhere no adapters are
//! reported.

#[cfg(windows)]
pub mod windows_helpers;

use crate::error::Result;
use serde::Serialize;
use std::fmt;
use std::io::Write;

/// PCI vendor id of the Microsoft Basic Render Driver
pub const BASIC_RENDER_VENDOR_ID: u32 = 0x1414;
/// PCI device id of the Microsoft Basic Render Driver
pub const BASIC_RENDER_DEVICE_ID: u32 = 0x008c;

/// Adapter ordering hint passed to the platform enumerator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuPreference {
    /// Platform default ordering
    Unspecified,
    /// Discrete / fastest adapter first
    HighPerformance,
    /// Integrated / lowest power adapter first
    MinimumPower,
}

impl GpuPreference {
    /// Preference classes in the order they are enumerated
    pub const ALL: [GpuPreference; 3] = [
        GpuPreference::Unspecified,
        GpuPreference::HighPerformance,
        GpuPreference::MinimumPower,
    ];
}

impl fmt::Display for GpuPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GpuPreference::Unspecified => "default",
            GpuPreference::HighPerformance => "high performance",
            GpuPreference::MinimumPower => "minimum power",
        };
        f.write_str(s)
    }
}

/// Raw adapter description as returned by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterDesc {
    pub description: String,
    pub vendor_id: u32,
    pub device_id: u32,
    pub dedicated_video_memory: u64,
    pub dedicated_system_memory: u64,
    pub shared_system_memory: u64,
    /// Adapter is flagged as a software renderer
    pub is_software: bool,
}

impl AdapterDesc {
    /// Whether this adapter should be skipped by the inventory
    pub fn is_unusable(&self) -> bool {
        self.is_software || is_basic_render_driver(self.vendor_id, self.device_id)
    }
}

/// A usable GPU adapter found during enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDescriptor {
    pub preference: GpuPreference,
    pub description: String,
    pub vendor_id: u32,
    pub device_id: u32,
    /// Dedicated video memory in bytes
    pub dedicated_video_memory: u64,
    /// Dedicated system memory in bytes
    pub dedicated_system_memory: u64,
    /// Shared system memory in bytes
    pub shared_system_memory: u64,
    /// Index within the preference-ordered platform enumeration
    pub adapter_index: u32,
}

impl DeviceDescriptor {
    fn from_desc(preference: GpuPreference, adapter_index: u32, desc: AdapterDesc) -> Self {
        Self {
            preference,
            description: desc.description,
            vendor_id: desc.vendor_id,
            device_id: desc.device_id,
            dedicated_video_memory: desc.dedicated_video_memory,
            dedicated_system_memory: desc.dedicated_system_memory,
            shared_system_memory: desc.shared_system_memory,
            adapter_index,
        }
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "description: {}, type: {}, vendor_id: {}, device_id: {}, dedicated_video_memory: {}, dedicated_system_memory: {}, shared_system_memory: {}",
            self.description,
            self.preference,
            self.vendor_id,
            self.device_id,
            self.dedicated_video_memory,
            self.dedicated_system_memory,
            self.shared_system_memory
        )
    }
}

/// Platform adapter enumeration
pub trait AdapterSource {
    /// Adapter at `index` in the ordering implied by `preference`.
    ///
    /// Returns `Ok(None)` once `index` is past the last adapter.
    fn adapter(&self, preference: GpuPreference, index: u32) -> Result<Option<AdapterDesc>>;
}

/// Source that never reports an adapter (platforms without DXGI)
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAdapters;

impl AdapterSource for NoAdapters {
    fn adapter(&self, _preference: GpuPreference, _index: u32) -> Result<Option<AdapterDesc>> {
        Ok(None)
    }
}

/// Matches the non-functional fallback renderer.
///
/// Seeing it usually means the graphics drivers are broken.
pub fn is_basic_render_driver(vendor_id: u32, device_id: u32) -> bool {
    vendor_id == BASIC_RENDER_VENDOR_ID && device_id == BASIC_RENDER_DEVICE_ID
}

/// Enumerate usable adapters from `source` for every preference class
pub fn enumerate_devices_with<S: AdapterSource + ?Sized>(
    source: &S,
) -> Result<Vec<DeviceDescriptor>> {
    let mut devices = Vec::new();
    for preference in GpuPreference::ALL {
        let mut index = 0u32;
        while let Some(desc) = source.adapter(preference, index)? {
            if desc.is_unusable() {
                log::debug!(
                    "skipping adapter {} ({}): software or basic render driver",
                    index,
                    desc.description
                );
            } else {
                devices.push(DeviceDescriptor::from_desc(preference, index, desc));
            }
            index += 1;
        }
    }
    Ok(devices)
}

/// Enumerate usable adapters on this machine
pub fn enumerate_devices() -> Result<Vec<DeviceDescriptor>> {
    #[cfg(windows)]
    {
        let source = windows_helpers::DxgiAdapterSource::new()?;
        enumerate_devices_with(&source)
    }
    #[cfg(not(windows))]
    {
        log::debug!("DXGI unavailable on this platform, no GPU adapters enumerated");
        enumerate_devices_with(&NoAdapters)
    }
}

/// Write one line per device and report whether any device exists
pub fn display_inventory<W: Write>(out: &mut W, devices: &[DeviceDescriptor]) -> Result<bool> {
    if devices.is_empty() {
        writeln!(out, "No GPU device available")?;
        return Ok(false);
    }
    for device in devices {
        writeln!(out, "GPU device: {}", device)?;
    }
    Ok(true)
}

/// True iff at least one usable GPU adapter is present
pub fn report_available() -> bool {
    match enumerate_devices() {
        Ok(devices) => !devices.is_empty(),
        Err(e) => {
            log::warn!("GPU enumeration failed: {}", e);
            false
        }
    }
}
