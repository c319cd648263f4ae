// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Layout of the virtio bridge region.
//!
//! The region is a single page shared by the bridge, the management process,
//! and the supervisor. The supervisor appends requests to `req_list` and
//! raises the notification line; the management process appends responses to
//! `res_list` and issues FINISH_REQ. The bridge itself never interprets the
//! contents.

use crate::PAGE_SIZE;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// Capacity of the request and response rings.
pub const MAX_REQ: usize = 32;
/// Maximum number of virtio-mmio devices.
pub const MAX_DEVS: usize = 4;
/// Maximum number of CPUs that may have an outstanding config access.
pub const MAX_CPUS: usize = 32;

/// A device access trapped by the supervisor.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct DeviceReq {
    /// The CPU that performed the access.
    pub src_cpu: u64,
    /// The accessed guest physical address.
    pub address: u64,
    /// Access size in bytes.
    pub size: u64,
    /// The value written, for writes.
    pub value: u64,
    /// The zone that performed the access.
    pub src_zone: u32,
    /// Nonzero for a write.
    pub is_write: u8,
    /// Nonzero if the zone expects an interrupt on completion.
    pub need_interrupt: u8,
    /// Reserved.
    pub rsvd: u16,
}

/// A completion posted by the management process.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct DeviceRes {
    /// The zone to interrupt.
    pub target_zone: u32,
    /// The interrupt to inject.
    pub irq_id: u32,
}

/// The virtio bridge region.
#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct VirtioBridge {
    /// Request ring consumer index.
    pub req_front: u32,
    /// Request ring producer index.
    pub req_rear: u32,
    /// Response ring consumer index.
    pub res_front: u32,
    /// Response ring producer index.
    pub res_rear: u32,
    /// Request ring.
    pub req_list: [DeviceReq; MAX_REQ],
    /// Response ring.
    pub res_list: [DeviceRes; MAX_REQ],
    /// Per-CPU config access completion flags.
    pub cfg_flags: [u64; MAX_CPUS],
    /// Per-CPU config access results.
    pub cfg_values: [u64; MAX_CPUS],
    /// Addresses of the virtio-mmio devices.
    pub mmio_addrs: [u64; MAX_DEVS],
    /// Nonzero once `mmio_addrs` is populated.
    pub mmio_avail: u8,
    /// Nonzero if the supervisor wants a notification for new responses.
    pub need_wakeup: u8,
    /// Reserved.
    pub rsvd: [u8; 6],
}

const _: () = assert!(size_of::<DeviceReq>() == 40);
const _: () = assert!(size_of::<VirtioBridge>() <= PAGE_SIZE);
