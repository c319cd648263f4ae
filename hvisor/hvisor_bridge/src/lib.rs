// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The hvisor control bridge.
//!
//! The bridge sits between the privileged management process and the hvisor
//! supervisor. It turns control requests into trapped supervisor calls,
//! stages the buffers those calls exchange by physical address, shares the
//! virtio bridge region, relays supervisor notifications to the management
//! process as [`SIGHVI`](hvisor_defs::SIGHVI), and exposes permitted physical
//! memory.
//!
//! The environment (trap instruction, page allocator, caller address space,
//! signal delivery, interrupt lines, and clocks) is supplied through the
//! traits in [`platform`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod gateway;
mod mmap;
pub mod platform;
pub mod relay;
mod staging;
mod virtio;
mod zone;

#[cfg(test)]
mod test_support;

pub use error::BridgeError;
pub use error::MapError;
pub use error::SetupError;

use gateway::Gateway;
use hvisor_defs::zone::ZoneConfig;
use hvisor_defs::Command;
use hvisor_defs::PLATFORM_NODE_PATH;
use mmap::MapAllowList;
use parking_lot::Mutex;
use platform::Caller;
use platform::Clock;
use platform::IrqLines;
use platform::PhysMemory;
use platform::PhysRange;
use platform::PlatformNode;
use platform::SignalSink;
use platform::Supervisor;
use relay::InterruptRelay;
use relay::IrqReturn;
use relay::RelayStats;
use std::sync::Arc;
use virtio::BridgeRegion;

/// The environment services the bridge depends on.
#[derive(Clone)]
pub struct Backends {
    /// The trapped supervisor call.
    pub supervisor: Arc<dyn Supervisor>,
    /// Physically contiguous memory.
    pub memory: Arc<dyn PhysMemory>,
    /// Signal delivery.
    pub signals: Arc<dyn SignalSink>,
    /// Interrupt line management.
    pub irq: Arc<dyn IrqLines>,
}

/// Bridge tunables.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Size of the zone configuration blob copied in by START_ZONE. Must
    /// match the supervisor's configuration layout.
    ///
    /// Zone RAM only becomes mappable when this equals the size of
    /// [`ZoneConfig`], since only then can the blob be read as one. The
    /// default assumes the supervisor uses that layout; with any other value
    /// zones still start, but only `mappable_ranges` can be mapped.
    pub zone_config_len: usize,
    /// The largest record count accepted by ZONE_LIST.
    pub max_zone_list: u64,
    /// Physical ranges the management process may always map, such as the
    /// platform's reserved memory used to load zone images.
    pub mappable_ranges: Vec<PhysRange>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            zone_config_len: size_of::<ZoneConfig>(),
            max_zone_list: 1024,
            mappable_ranges: Vec::new(),
        }
    }
}

/// The control bridge.
pub struct Bridge {
    config: BridgeConfig,
    gateway: Gateway,
    memory: Arc<dyn PhysMemory>,
    relay: InterruptRelay,
    region: Mutex<Option<BridgeRegion>>,
    allow_list: MapAllowList,
    irq: Arc<dyn IrqLines>,
    clocks: Vec<Box<dyn Clock>>,
}

impl Bridge {
    /// Brings up the bridge on the described platform.
    ///
    /// Without a notification line the bridge still serves zone operations,
    /// but virtio operations fail with [`BridgeError::Unavailable`].
    pub fn setup(
        backends: Backends,
        platform: PlatformNode,
        config: BridgeConfig,
    ) -> Result<Self, SetupError> {
        let Backends {
            supervisor,
            memory,
            signals,
            irq,
        } = backends;
        let PlatformNode {
            notification_line,
            clocks,
        } = platform;

        match notification_line {
            Some(line) => {
                irq.bind(line)
                    .map_err(|source| SetupError::BindIrq { line, source })?;
                tracing::info!(line, "bound virtio notification line");
            }
            None => {
                tracing::warn!("no virtio notification line, virtio is disabled");
            }
        }

        for (index, clock) in clocks.iter().enumerate() {
            if let Err(source) = clock.prepare_enable() {
                for enabled in clocks[..index].iter().rev() {
                    enabled.disable_unprepare();
                }
                if let Some(line) = notification_line {
                    irq.unbind(line);
                }
                return Err(SetupError::EnableClock { index, source });
            }
        }

        let bridge = Self {
            allow_list: MapAllowList::new(config.mappable_ranges.clone()),
            config,
            gateway: Gateway::new(supervisor),
            memory,
            relay: InterruptRelay::new(notification_line, signals),
            region: Mutex::new(None),
            irq,
            clocks,
        };
        tracing::info!(
            node = PLATFORM_NODE_PATH,
            line = notification_line,
            clocks = bridge.clocks.len(),
            "hvisor bridge ready"
        );
        Ok(bridge)
    }

    /// Handles control code `code` with argument `arg` from `caller`,
    /// returning the supervisor's non-negative result or a negative errno.
    pub fn ioctl(&self, caller: &dyn Caller, code: u32, arg: u64) -> i64 {
        let result = match Command::from_ioctl(code) {
            Some(command) => self.control(caller, command, arg),
            None => Err(BridgeError::UnknownCommand(code)),
        };
        match result {
            Ok(status) => status as i64,
            Err(err) => {
                tracing::error!(
                    error = &err as &dyn std::error::Error,
                    code,
                    task = caller.task().get(),
                    "control operation failed"
                );
                err.errno()
            }
        }
    }

    /// Performs `command` for `caller`.
    pub fn control(
        &self,
        caller: &dyn Caller,
        command: Command,
        arg: u64,
    ) -> Result<u64, BridgeError> {
        match command {
            Command::InitVirtio => self.init_virtio(caller.task()),
            Command::FinishReq => self.finish_req(),
            Command::StartZone => self.start_zone(caller, arg),
            Command::ShutdownZone => self.shutdown_zone(arg),
            Command::ZoneList => self.list_zones(caller, arg),
            Command::ConfigCheck => self.config_check(caller, arg),
            #[cfg(feature = "loongarch")]
            Command::ClearInjectIrq => self.gateway.invoke(Command::ClearInjectIrq, 0, 0),
        }
    }

    /// Handles an interrupt on `line`. Safe to call from interrupt context.
    pub fn handle_interrupt(&self, line: u32) -> IrqReturn {
        self.relay.handle(line)
    }

    /// The interrupt relay.
    pub fn relay(&self) -> &InterruptRelay {
        &self.relay
    }

    /// Notification counters.
    pub fn relay_stats(&self) -> RelayStats {
        self.relay.stats()
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if let Some(line) = self.relay.line() {
            self.irq.unbind(line);
        }
        self.relay.clear_target();
        self.region.get_mut().take();
        for clock in self.clocks.iter().rev() {
            clock.disable_unprepare();
        }
        tracing::info!("hvisor bridge removed");
    }
}
