// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Control codes for the bridge device.
//!
//! These use the generic Linux `_IOC` encoding (arm64, riscv, loongarch,
//! x86), with type `1`. The size field of the pointer-carrying codes is the
//! size of a pointer, not of the pointee.

use bitfield_struct::bitfield;

/// The bridge device's ioctl type.
pub const TYPE: u8 = 1;

/// An encoded ioctl control code.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct IoctlCode {
    /// Command number.
    pub nr: u8,
    /// Driver type.
    pub ty: u8,
    /// Size of the argument.
    #[bits(14)]
    pub size: u16,
    /// Transfer direction, one of the `DIR_*` values.
    #[bits(2)]
    pub dir: u8,
}

/// No data transfer.
pub const DIR_NONE: u8 = 0;
/// The caller writes data to the bridge.
pub const DIR_WRITE: u8 = 1;
/// The caller reads data from the bridge.
pub const DIR_READ: u8 = 2;

const fn encode(dir: u8, nr: u8, size: u16) -> u32 {
    IoctlCode::new()
        .with_dir(dir)
        .with_ty(TYPE)
        .with_nr(nr)
        .with_size(size)
        .into_bits()
}

const PTR: u16 = size_of::<u64>() as u16;

/// `_IO(1, 0)`
pub const INIT_VIRTIO: u32 = encode(DIR_NONE, 0, 0);
/// `_IOW(1, 1, ptr)`
pub const ZONE_START: u32 = encode(DIR_WRITE, 1, PTR);
/// `_IOW(1, 2, u64)`
pub const ZONE_SHUTDOWN: u32 = encode(DIR_WRITE, 2, PTR);
/// `_IOR(1, 3, ptr)`
pub const ZONE_LIST: u32 = encode(DIR_READ, 3, PTR);
/// `_IO(1, 4)`
pub const FINISH_REQ: u32 = encode(DIR_NONE, 4, 0);
/// `_IOR(1, 5, ptr)`
pub const CONFIG_CHECK: u32 = encode(DIR_READ, 5, PTR);
/// `_IO(1, 6)`
pub const CLEAR_INJECT_IRQ: u32 = encode(DIR_NONE, 6, 0);
