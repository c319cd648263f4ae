// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::platform::Errno;
use crate::platform::PhysRange;
use crate::platform::UserFault;
use hvisor_defs::HypercallCode;
use thiserror::Error;

/// Error returned by bridge control and mapping operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The notification line is not bound, so virtio cannot be used.
    #[error("virtio notification line is not available")]
    Unavailable,
    /// A bridge-owned buffer could not be allocated.
    #[error("failed to allocate {len} bytes")]
    OutOfMemory {
        /// The requested size.
        len: usize,
    },
    /// Copying to or from the caller's address space failed.
    #[error("failed to copy {len} bytes at caller address {addr:#x}")]
    InvalidAddress {
        /// The caller address.
        addr: u64,
        /// The size of the copy.
        len: usize,
        /// The fault.
        #[source]
        source: UserFault,
    },
    /// The supervisor call returned a negative result.
    #[error("supervisor call {code:?} failed with {status}")]
    Supervisor {
        /// The call.
        code: HypercallCode,
        /// The negative result.
        status: i64,
    },
    /// The control code is not recognized.
    #[error("unrecognized control code {0:#x}")]
    UnknownCommand(u32),
    /// An argument is malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The caller asked to map a physical range it is not entitled to.
    #[error("physical range {0} is not mappable by the caller")]
    RangeNotMappable(PhysRange),
    /// Establishing the mapping failed.
    #[error("failed to map {len:#x} bytes at pfn {pfn:#x}")]
    MappingFailure {
        /// The first page frame.
        pfn: u64,
        /// The requested length.
        len: u64,
        /// The reason.
        #[source]
        source: MapError,
    },
}

/// The reason a mapping could not be established.
#[derive(Debug, Error)]
pub enum MapError {
    /// The virtio bridge region is a single page.
    #[error("the virtio bridge region is one page")]
    TooLarge,
    /// The page table update failed.
    #[error("page table update failed")]
    Remap(#[source] Errno),
}

impl BridgeError {
    /// The negative result code reported to the caller.
    pub fn errno(&self) -> i64 {
        let errno = match self {
            BridgeError::Supervisor { status, .. } => return *status,
            BridgeError::Unavailable => libc::ENOTTY,
            BridgeError::OutOfMemory { .. } => libc::ENOMEM,
            BridgeError::InvalidAddress { .. } => libc::EFAULT,
            BridgeError::UnknownCommand(_)
            | BridgeError::InvalidArgument(_)
            | BridgeError::RangeNotMappable(_)
            | BridgeError::MappingFailure { .. } => libc::EINVAL,
        };
        -i64::from(errno)
    }
}

/// Error returned by [`Bridge::setup`](crate::Bridge::setup).
#[derive(Debug, Error)]
pub enum SetupError {
    /// The notification line could not be bound.
    #[error("failed to bind notification line {line}")]
    BindIrq {
        /// The line.
        line: u32,
        /// The failure.
        #[source]
        source: Errno,
    },
    /// A clock could not be enabled.
    #[error("failed to enable clock {index}")]
    EnableClock {
        /// The index of the clock in the platform node.
        index: usize,
        /// The failure.
        #[source]
        source: Errno,
    },
}
