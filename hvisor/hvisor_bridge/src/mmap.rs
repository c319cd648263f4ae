// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Exposes the virtio bridge region and permitted physical ranges to the
//! management process.

use crate::error::MapError;
use crate::platform::Caller;
use crate::platform::MapRequest;
use crate::platform::PhysRange;
use crate::Bridge;
use crate::BridgeError;
use hvisor_defs::zone::ZoneConfig;
use hvisor_defs::zone::MEM_TYPE_RAM;
use hvisor_defs::PAGE_SHIFT;
use hvisor_defs::PAGE_SIZE;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use zerocopy::FromBytes;

/// Physical ranges the management process may map with a nonzero offset tag.
///
/// Fixed ranges come from the platform. Zone RAM is added when a zone starts
/// and removed when it is shut down.
#[derive(Debug)]
pub(crate) struct MapAllowList {
    fixed: Vec<PhysRange>,
    zones: Mutex<BTreeMap<u64, Vec<PhysRange>>>,
}

impl MapAllowList {
    pub fn new(fixed: Vec<PhysRange>) -> Self {
        Self {
            fixed,
            zones: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns true if `range` lies entirely within a single permitted range.
    pub fn permits(&self, range: &PhysRange) -> bool {
        self.fixed.iter().any(|r| r.contains(range))
            || self
                .zones
                .lock()
                .values()
                .flatten()
                .any(|r| r.contains(range))
    }

    /// Records the RAM of a started zone. Blobs that are not a
    /// [`ZoneConfig`] are ignored.
    pub fn zone_started(&self, blob: &[u8]) {
        let Ok(config) = ZoneConfig::read_from_bytes(blob) else {
            tracing::debug!(len = blob.len(), "zone configuration layout not recognized");
            return;
        };
        // I/O and virtio regions are device windows, not memory.
        let ranges: Vec<_> = config
            .memory_regions()
            .iter()
            .filter(|region| region.mem_type == MEM_TYPE_RAM)
            .filter_map(|region| PhysRange::new(region.physical_start, region.size))
            .collect();
        for range in &ranges {
            tracing::debug!(zone_id = config.zone_id, %range, "zone memory mappable");
        }
        self.zones.lock().insert(config.zone_id.into(), ranges);
    }

    /// Forgets the RAM of a stopped zone.
    pub fn zone_stopped(&self, zone_id: u64) {
        self.zones.lock().remove(&zone_id);
    }
}

impl Bridge {
    /// Maps the range requested by `caller`.
    ///
    /// Offset tag zero maps the virtio bridge region. Any other tag is a
    /// physical page number, which must fall inside the allow-list.
    pub fn mmap(&self, caller: &dyn Caller, request: &MapRequest) -> Result<(), BridgeError> {
        let len = request
            .end
            .checked_sub(request.start)
            .filter(|&len| len != 0)
            .ok_or(BridgeError::InvalidArgument("empty mapping"))?;

        let pfn = if request.pgoff == 0 {
            let region = self.region.lock();
            let region = region.as_ref().ok_or(BridgeError::Unavailable)?;
            if len > PAGE_SIZE as u64 {
                return Err(BridgeError::MappingFailure {
                    pfn: region.pfn(),
                    len,
                    source: MapError::TooLarge,
                });
            }
            region.pfn()
        } else {
            let range = request
                .pgoff
                .checked_mul(PAGE_SIZE as u64)
                .and_then(|addr| PhysRange::new(addr, len))
                .ok_or(BridgeError::InvalidArgument("physical range overflows"))?;
            if !self.allow_list.permits(&range) {
                return Err(BridgeError::RangeNotMappable(range));
            }
            request.pgoff
        };

        caller
            .remap_pfn_range(request.start, pfn, len)
            .map_err(|err| BridgeError::MappingFailure {
                pfn,
                len,
                source: MapError::Remap(err),
            })?;
        tracing::debug!(
            addr = pfn << PAGE_SHIFT,
            len,
            task = caller.task().get(),
            "mapped physical memory"
        );
        Ok(())
    }
}
