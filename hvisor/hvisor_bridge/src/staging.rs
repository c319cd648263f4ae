// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::platform::PhysMemory;
use crate::BridgeError;

/// A transient bridge-owned buffer handed to the supervisor by physical
/// address. Freed when dropped, so every exit path of an operation releases
/// it exactly once.
pub(crate) struct StagingBuffer<'a> {
    memory: &'a dyn PhysMemory,
    addr: u64,
    len: usize,
}

impl<'a> StagingBuffer<'a> {
    /// Allocates a zeroed buffer of `len` bytes.
    pub fn alloc(memory: &'a dyn PhysMemory, len: usize) -> Result<Self, BridgeError> {
        let addr = memory.alloc(len).ok_or(BridgeError::OutOfMemory { len })?;
        Ok(Self { memory, addr, len })
    }

    /// The physical address of the buffer.
    pub fn addr(&self) -> u64 {
        self.addr
    }

    /// Reads the start of the buffer.
    pub fn read(&self, data: &mut [u8]) {
        assert!(data.len() <= self.len);
        self.memory.read(self.addr, data);
    }

    /// Writes the start of the buffer.
    pub fn write(&self, data: &[u8]) {
        assert!(data.len() <= self.len);
        self.memory.write(self.addr, data);
    }
}

impl Drop for StagingBuffer<'_> {
    fn drop(&mut self) {
        self.memory.free(self.addr, self.len);
    }
}
