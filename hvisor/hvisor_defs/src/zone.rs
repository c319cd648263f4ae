// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Zone configuration and zone list records.

use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// Maximum number of memory regions in a [`ZoneConfig`].
pub const CONFIG_MAX_MEMORY_REGIONS: usize = 16;
/// Maximum number of interrupts in a [`ZoneConfig`].
pub const CONFIG_MAX_INTERRUPTS: usize = 32;
/// Size of the zone name fields, including the terminating NUL.
pub const CONFIG_NAME_MAXLEN: usize = 32;

/// Guest RAM.
pub const MEM_TYPE_RAM: u32 = 0;
/// Passed-through device memory.
pub const MEM_TYPE_IO: u32 = 1;
/// Memory trapped to the virtio backend.
pub const MEM_TYPE_VIRTIO: u32 = 2;

/// A zone memory region.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct MemoryRegion {
    /// One of the `MEM_TYPE_*` values.
    pub mem_type: u32,
    /// Reserved, must be zero.
    pub rsvd: u32,
    /// Host physical start address.
    pub physical_start: u64,
    /// Guest physical start address.
    pub virtual_start: u64,
    /// Size in bytes.
    pub size: u64,
}

/// The configuration of a zone, passed to the supervisor by START_ZONE.
#[repr(C)]
#[derive(Clone, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct ZoneConfig {
    /// The zone id.
    pub zone_id: u32,
    /// Number of valid entries in `memory_regions`.
    pub num_memory_regions: u32,
    /// Bitmap of the CPUs assigned to the zone.
    pub cpus: u64,
    /// The zone's memory regions.
    pub memory_regions: [MemoryRegion; CONFIG_MAX_MEMORY_REGIONS],
    /// Number of valid entries in `interrupts`.
    pub num_interrupts: u32,
    /// Reserved, must be zero.
    pub rsvd: u32,
    /// Interrupt lines routed to the zone.
    pub interrupts: [u32; CONFIG_MAX_INTERRUPTS],
    /// Guest entry point.
    pub entry_point: u64,
    /// Physical address the kernel image was loaded at.
    pub kernel_load_paddr: u64,
    /// Size of the kernel image.
    pub kernel_size: u64,
    /// Physical address the device tree was loaded at.
    pub dtb_load_paddr: u64,
    /// Size of the device tree.
    pub dtb_size: u64,
    /// NUL-padded zone name.
    pub name: [u8; CONFIG_NAME_MAXLEN],
}

const _: () = assert!(size_of::<ZoneConfig>() % 8 == 0);

impl ZoneConfig {
    /// The valid memory regions. A count beyond the array is clamped.
    pub fn memory_regions(&self) -> &[MemoryRegion] {
        let count = (self.num_memory_regions as usize).min(CONFIG_MAX_MEMORY_REGIONS);
        &self.memory_regions[..count]
    }

    /// The valid interrupt lines. A count beyond the array is clamped.
    pub fn interrupts(&self) -> &[u32] {
        let count = (self.num_interrupts as usize).min(CONFIG_MAX_INTERRUPTS);
        &self.interrupts[..count]
    }

    /// The zone name, without NUL padding.
    pub fn name(&self) -> &[u8] {
        trim_nul(&self.name)
    }

    /// Sets the zone name, truncating it so a terminating NUL always fits.
    pub fn set_name(&mut self, name: &[u8]) {
        set_nul_padded(&mut self.name, name);
    }
}

/// A record describing one zone, produced by ZONE_LIST.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct ZoneInfo {
    /// The zone id.
    pub zone_id: u32,
    /// Nonzero if the zone failed.
    pub is_err: u8,
    /// Reserved.
    pub rsvd: [u8; 3],
    /// Bitmap of the CPUs assigned to the zone.
    pub cpus: u64,
    /// NUL-padded zone name.
    pub name: [u8; CONFIG_NAME_MAXLEN],
}

const _: () = assert!(size_of::<ZoneInfo>() == 48);

impl ZoneInfo {
    /// The zone name, without NUL padding.
    pub fn name(&self) -> &[u8] {
        trim_nul(&self.name)
    }

    /// Sets the zone name, truncating it so a terminating NUL always fits.
    pub fn set_name(&mut self, name: &[u8]) {
        set_nul_padded(&mut self.name, name);
    }
}

/// The argument of ZONE_LIST.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct ZoneListArgs {
    /// Capacity of `zones`, in records.
    pub cnt: u64,
    /// Caller address of an array of `cnt` [`ZoneInfo`] records.
    pub zones: u64,
}

fn trim_nul(bytes: &[u8]) -> &[u8] {
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    &bytes[..len]
}

fn set_nul_padded(dest: &mut [u8; CONFIG_NAME_MAXLEN], src: &[u8]) {
    let len = src.len().min(CONFIG_NAME_MAXLEN - 1);
    dest.fill(0);
    dest[..len].copy_from_slice(&src[..len]);
}
