// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Interfaces to the environment the bridge runs in.
//!
//! The bridge does not touch hardware itself. The trap into the supervisor,
//! physical page allocation, the caller's address space, signal delivery, and
//! interrupt line and clock management are all provided by the embedding
//! environment through these traits.

use hvisor_defs::HypercallCode;
use std::fmt;
use std::fmt::Display;
use std::num::NonZeroU32;
use thiserror::Error;

/// Identifies a management-process task that may receive notifications.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TaskId(NonZeroU32);

impl TaskId {
    /// Returns the task id for `pid`, or `None` for zero.
    pub const fn new(pid: u32) -> Option<Self> {
        match NonZeroU32::new(pid) {
            Some(pid) => Some(Self(pid)),
            None => None,
        }
    }

    /// Returns the raw id.
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

/// An errno-style failure reported by the environment.
#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
#[error("errno {0}")]
pub struct Errno(pub i32);

/// A caller address could not be read or written.
#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
#[error("caller address is not accessible")]
pub struct UserFault;

/// The trapped call into the supervisor.
pub trait Supervisor: Send + Sync {
    /// Transfers control to the supervisor and returns its result. Blocks
    /// until the supervisor returns control; there is no timeout.
    ///
    /// Negative results are errors, non-negative results are call specific.
    fn call(&self, code: HypercallCode, arg0: u64, arg1: u64) -> i64;
}

/// Physically contiguous memory owned by the bridge.
pub trait PhysMemory: Send + Sync {
    /// Allocates `len` bytes of zeroed, physically contiguous memory and
    /// returns its physical address. Allocations of whole pages are page
    /// aligned.
    fn alloc(&self, len: usize) -> Option<u64>;

    /// Frees an allocation returned by [`PhysMemory::alloc`].
    fn free(&self, addr: u64, len: usize);

    /// Marks the pages of an allocation as reserved, so they are never
    /// recycled except by an explicit free.
    fn set_reserved(&self, addr: u64, len: usize, reserved: bool);

    /// Reads from an allocation.
    fn read(&self, addr: u64, data: &mut [u8]);

    /// Writes to an allocation.
    fn write(&self, addr: u64, data: &[u8]);
}

/// The management-process context issuing a control or mapping request.
pub trait Caller {
    /// The calling task.
    fn task(&self) -> TaskId;

    /// Copies from the caller's address space.
    fn read_user(&self, addr: u64, data: &mut [u8]) -> Result<(), UserFault>;

    /// Copies to the caller's address space.
    fn write_user(&self, addr: u64, data: &[u8]) -> Result<(), UserFault>;

    /// Maps `len` bytes starting at page frame `pfn` at virtual address
    /// `start` in the caller's address space.
    fn remap_pfn_range(&self, start: u64, pfn: u64, len: u64) -> Result<(), Errno>;
}

/// Asynchronous signal delivery to tasks.
pub trait SignalSink: Send + Sync {
    /// Queues `signal` with integer payload `value` to `task`.
    ///
    /// This is called from interrupt context and must not block.
    fn queue(&self, task: TaskId, signal: i32, value: i32) -> Result<(), Errno>;
}

/// Interrupt line management.
pub trait IrqLines: Send + Sync {
    /// Attaches the bridge's handler to `line`. The line may be shared.
    fn bind(&self, line: u32) -> Result<(), Errno>;

    /// Detaches the bridge's handler from `line`.
    fn unbind(&self, line: u32);
}

/// A clock that must run while the bridge is operational.
pub trait Clock: Send + Sync {
    /// Prepares and enables the clock.
    fn prepare_enable(&self) -> Result<(), Errno>;

    /// Disables and unprepares the clock.
    fn disable_unprepare(&self);
}

/// The bridge's platform description node, as discovered by the environment
/// at [`PLATFORM_NODE_PATH`](hvisor_defs::PLATFORM_NODE_PATH).
#[derive(Default)]
pub struct PlatformNode {
    /// The notification line the supervisor raises, if one is described.
    pub notification_line: Option<u32>,
    /// Clocks to enable before the bridge becomes operational.
    pub clocks: Vec<Box<dyn Clock>>,
}

impl fmt::Debug for PlatformNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformNode")
            .field("notification_line", &self.notification_line)
            .field("clocks", &self.clocks.len())
            .finish()
    }
}

/// A mapping request from the caller.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MapRequest {
    /// Start of the virtual range.
    pub start: u64,
    /// End of the virtual range, exclusive.
    pub end: u64,
    /// The offset tag, in pages. Zero selects the virtio bridge region; any
    /// other value is a physical page number.
    pub pgoff: u64,
}

/// A range of physical addresses.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhysRange {
    start: u64,
    end: u64,
}

impl PhysRange {
    /// Returns the range `[start, start + len)`, or `None` if it is empty or
    /// wraps.
    pub fn new(start: u64, len: u64) -> Option<Self> {
        let end = start.checked_add(len)?;
        (len != 0).then_some(Self { start, end })
    }

    /// The first address.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// One past the last address.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// The length in bytes.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Returns true if `other` lies entirely within this range.
    pub fn contains(&self, other: &PhysRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl Display for PhysRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}-{:#x}", self.start, self.end)
    }
}
