// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The virtio bridge region and its control operations.

use crate::platform::PhysMemory;
use crate::platform::TaskId;
use crate::Bridge;
use crate::BridgeError;
use hvisor_defs::Command;
use hvisor_defs::PAGE_SHIFT;
use hvisor_defs::PAGE_SIZE;
use std::sync::Arc;

/// The page shared with the management process and the supervisor.
///
/// Dropping the region clears the reservation and frees the page.
pub(crate) struct BridgeRegion {
    memory: Arc<dyn PhysMemory>,
    addr: u64,
}

impl BridgeRegion {
    fn alloc(memory: &Arc<dyn PhysMemory>) -> Result<Self, BridgeError> {
        let addr = memory
            .alloc(PAGE_SIZE)
            .ok_or(BridgeError::OutOfMemory { len: PAGE_SIZE })?;
        let region = Self {
            memory: memory.clone(),
            addr,
        };
        region.clear();
        memory.set_reserved(addr, PAGE_SIZE, true);
        Ok(region)
    }

    fn clear(&self) {
        self.memory.write(self.addr, &[0; PAGE_SIZE]);
    }

    pub fn addr(&self) -> u64 {
        self.addr
    }

    pub fn pfn(&self) -> u64 {
        self.addr >> PAGE_SHIFT
    }
}

impl Drop for BridgeRegion {
    fn drop(&mut self) {
        tracing::debug!(addr = self.addr, "releasing virtio bridge region");
        self.memory.set_reserved(self.addr, PAGE_SIZE, false);
        self.memory.free(self.addr, PAGE_SIZE);
    }
}

impl Bridge {
    /// Registers a new virtio bridge region with the supervisor and makes
    /// `task` the notification target.
    ///
    /// Every call stages a fresh zeroed page. Once the supervisor accepts it,
    /// it replaces the previous region, which is then released. If the
    /// supervisor rejects it, the new page is released and the previous
    /// region, its contents, and the previous target stay in place.
    pub(crate) fn init_virtio(&self, task: TaskId) -> Result<u64, BridgeError> {
        if self.relay.line().is_none() {
            return Err(BridgeError::Unavailable);
        }

        let mut region = self.region.lock();
        let new = BridgeRegion::alloc(&self.memory)?;
        let status = self.gateway.invoke(Command::InitVirtio, new.addr(), 0)?;
        tracing::info!(addr = new.addr(), "virtio bridge region registered");
        if let Some(previous) = region.replace(new) {
            tracing::info!(addr = previous.addr(), "replaced virtio bridge region");
        }

        if let Some(previous) = self.relay.set_target(task) {
            if previous != task {
                tracing::info!(
                    previous = previous.get(),
                    task = task.get(),
                    "replacing notification target"
                );
            }
        }
        Ok(status)
    }

    /// Tells the supervisor the management process is done with the current
    /// region contents.
    pub(crate) fn finish_req(&self) -> Result<u64, BridgeError> {
        self.gateway.invoke(Command::FinishReq, 0, 0)
    }

    /// The physical address of the virtio bridge region, once initialized.
    pub fn region_addr(&self) -> Option<u64> {
        self.region.lock().as_ref().map(BridgeRegion::addr)
    }
}
