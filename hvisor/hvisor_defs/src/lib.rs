// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Definitions shared between the hvisor control bridge, the management
//! process, and the supervisor.
//!
//! Everything in this crate is part of the ABI: the control codes issued
//! against the bridge device, the supervisor call identifiers, and the memory
//! layouts exchanged by physical address.

#![no_std]
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod ioctl;
pub mod virtio;
pub mod zone;

use core::fmt;
use core::fmt::Debug;

/// The page size used for the virtio bridge region and for mapping offsets.
pub const PAGE_SIZE: usize = 4096;

/// log2 of [`PAGE_SIZE`].
pub const PAGE_SHIFT: u32 = 12;

/// The signal queued to the management process when the supervisor raises
/// the notification line.
pub const SIGHVI: i32 = 10;

/// The path of the bridge device node.
pub const DEVICE_PATH: &str = "/dev/hvisor";

/// The platform description node carrying the notification line and clocks.
pub const PLATFORM_NODE_PATH: &str = "/hvisor_virtio_device";

/// A supervisor call identifier, passed as the first argument of a trapped
/// call.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct HypercallCode(pub u64);

impl HypercallCode {
    /// Registers the virtio bridge region by physical address.
    pub const INIT_VIRTIO: Self = Self(0);
    /// The management process finished the current virtio requests.
    pub const FINISH_REQ: Self = Self(1);
    /// Starts a zone from a configuration blob.
    pub const START_ZONE: Self = Self(2);
    /// Shuts down a zone by id.
    pub const SHUTDOWN_ZONE: Self = Self(3);
    /// Lists the running zones.
    pub const ZONE_LIST: Self = Self(4);
    /// Reports the supervisor's configuration checksum.
    pub const CONFIG_CHECK: Self = Self(6);
    /// Clears an injected interrupt on LoongArch.
    pub const CLEAR_INJECT_IRQ: Self = Self(20);

    fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::INIT_VIRTIO => "INIT_VIRTIO",
            Self::FINISH_REQ => "FINISH_REQ",
            Self::START_ZONE => "START_ZONE",
            Self::SHUTDOWN_ZONE => "SHUTDOWN_ZONE",
            Self::ZONE_LIST => "ZONE_LIST",
            Self::CONFIG_CHECK => "CONFIG_CHECK",
            Self::CLEAR_INJECT_IRQ => "CLEAR_INJECT_IRQ",
            _ => return None,
        })
    }
}

impl Debug for HypercallCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.pad(name),
            None => write!(f, "HypercallCode({:#x})", self.0),
        }
    }
}

/// A control operation accepted by the bridge.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    /// Allocate and register the virtio bridge region, and register the
    /// caller for notifications.
    InitVirtio,
    /// Acknowledge the current virtio bridge contents.
    FinishReq,
    /// Start a zone. The argument is the address of a zone configuration.
    StartZone,
    /// Shut down a zone. The argument is the zone id.
    ShutdownZone,
    /// List zones. The argument is the address of a
    /// [`ZoneListArgs`](zone::ZoneListArgs).
    ZoneList,
    /// Read the supervisor configuration checksum. The argument is the
    /// address of a `u64`.
    ConfigCheck,
    /// Clear the pending injected interrupt.
    #[cfg(feature = "loongarch")]
    ClearInjectIrq,
}

impl Command {
    /// Every command supported by this build.
    pub const ALL: &'static [Command] = &[
        Command::InitVirtio,
        Command::FinishReq,
        Command::StartZone,
        Command::ShutdownZone,
        Command::ZoneList,
        Command::ConfigCheck,
        #[cfg(feature = "loongarch")]
        Command::ClearInjectIrq,
    ];

    /// The supervisor call this command traps into.
    pub const fn hypercall(self) -> HypercallCode {
        match self {
            Command::InitVirtio => HypercallCode::INIT_VIRTIO,
            Command::FinishReq => HypercallCode::FINISH_REQ,
            Command::StartZone => HypercallCode::START_ZONE,
            Command::ShutdownZone => HypercallCode::SHUTDOWN_ZONE,
            Command::ZoneList => HypercallCode::ZONE_LIST,
            Command::ConfigCheck => HypercallCode::CONFIG_CHECK,
            #[cfg(feature = "loongarch")]
            Command::ClearInjectIrq => HypercallCode::CLEAR_INJECT_IRQ,
        }
    }

    /// The control code the management process issues for this command.
    pub const fn ioctl(self) -> u32 {
        match self {
            Command::InitVirtio => ioctl::INIT_VIRTIO,
            Command::FinishReq => ioctl::FINISH_REQ,
            Command::StartZone => ioctl::ZONE_START,
            Command::ShutdownZone => ioctl::ZONE_SHUTDOWN,
            Command::ZoneList => ioctl::ZONE_LIST,
            Command::ConfigCheck => ioctl::CONFIG_CHECK,
            #[cfg(feature = "loongarch")]
            Command::ClearInjectIrq => ioctl::CLEAR_INJECT_IRQ,
        }
    }

    /// Decodes a control code. Returns `None` for codes this build does not
    /// accept.
    pub fn from_ioctl(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|command| command.ioctl() == code)
    }
}
