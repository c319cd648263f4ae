// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Management-process access to the hvisor control bridge through the
//! `/dev/hvisor` device.

#![cfg(target_os = "linux")]
#![warn(missing_docs)]
// UNSAFETY: Calling ioctls and mapping device memory.
#![expect(unsafe_code)]

mod ioctl;
mod mapped_page;
mod notify;

pub use mapped_page::MappedPage;
pub use mapped_page::PhysMapping;
pub use notify::Notifications;

use hvisor_defs::virtio::VirtioBridge;
use hvisor_defs::zone::ZoneConfig;
use hvisor_defs::zone::ZoneInfo;
use hvisor_defs::zone::ZoneListArgs;
use hvisor_defs::Command;
use hvisor_defs::DEVICE_PATH;
use hvisor_defs::PAGE_SIZE;
use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;
use std::path::Path;
use thiserror::Error;
use zerocopy::FromZeros;

/// Error returned by the hvisor device.
#[derive(Debug, Error)]
pub enum Error {
    /// The device could not be opened.
    #[error("failed to open the hvisor device")]
    Open(#[source] io::Error),
    /// The bridge or the supervisor rejected a control operation.
    #[error("{command:?} failed")]
    Control {
        /// The operation.
        command: Command,
        /// The negative result, as an errno.
        #[source]
        source: nix::errno::Errno,
    },
    /// The virtio bridge region could not be mapped.
    #[error("failed to map the virtio bridge region")]
    MapRegion(#[source] io::Error),
    /// A physical range could not be mapped.
    #[error("failed to map physical range {addr:#x}+{len:#x}")]
    MapPhysical {
        /// The physical address.
        addr: u64,
        /// The length.
        len: usize,
        /// The failure.
        #[source]
        source: io::Error,
    },
    /// The physical address is not page aligned.
    #[error("physical address {0:#x} is not page aligned")]
    Unaligned(u64),
    /// The notification signal handler could not be registered.
    #[error("failed to register for supervisor notifications")]
    Notifications(#[source] io::Error),
}

/// An open hvisor device.
#[derive(Debug)]
pub struct HvisorDevice {
    file: File,
}

impl HvisorDevice {
    /// Opens [`DEVICE_PATH`].
    pub fn open() -> Result<Self, Error> {
        Self::open_path(DEVICE_PATH)
    }

    /// Opens the device at `path`.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = fs_err::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())
            .map_err(Error::Open)?;

        Ok(Self { file: file.into() })
    }

    /// Gets the device file.
    pub fn get(&self) -> &File {
        &self.file
    }

    fn control(
        &self,
        command: Command,
        f: impl FnOnce(i32) -> nix::Result<i32>,
    ) -> Result<u64, Error> {
        let status = f(self.file.as_raw_fd()).map_err(|source| Error::Control { command, source })?;
        tracing::debug!(?command, status, "hvisor control operation");
        Ok(status as u64)
    }

    /// Allocates and registers the virtio bridge region, and registers the
    /// calling process for notifications.
    ///
    /// Call [`HvisorDevice::notifications`] first so the first notification
    /// is not lost.
    pub fn init_virtio(&self) -> Result<(), Error> {
        // SAFETY: calling IOCTL as documented, with no special requirements.
        self.control(Command::InitVirtio, |fd| unsafe {
            ioctl::hvisor_init_virtio(fd)
        })?;
        Ok(())
    }

    /// Tells the supervisor the pending virtio requests were handled.
    pub fn finish_req(&self) -> Result<(), Error> {
        // SAFETY: calling IOCTL as documented, with no special requirements.
        self.control(Command::FinishReq, |fd| unsafe {
            ioctl::hvisor_finish_req(fd)
        })?;
        Ok(())
    }

    /// Starts the zone described by `config`.
    pub fn zone_start(&self, config: &ZoneConfig) -> Result<(), Error> {
        tracing::info!(
            zone_id = config.zone_id,
            name = %String::from_utf8_lossy(config.name()),
            "starting zone"
        );
        // SAFETY: the bridge reads a `ZoneConfig` from the pointer, which is
        // valid for the duration of the call.
        self.control(Command::StartZone, |fd| unsafe {
            ioctl::hvisor_zone_start(fd, config)
        })?;
        Ok(())
    }

    /// Shuts down zone `zone_id`.
    pub fn zone_shutdown(&self, zone_id: u32) -> Result<(), Error> {
        // SAFETY: the argument is passed by value.
        self.control(Command::ShutdownZone, |fd| unsafe {
            ioctl::hvisor_zone_shutdown(fd, zone_id as _)
        })?;
        Ok(())
    }

    /// Lists up to `capacity` running zones.
    pub fn zone_list(&self, capacity: usize) -> Result<Vec<ZoneInfo>, Error> {
        let mut zones = vec![ZoneInfo::new_zeroed(); capacity];
        let args = ZoneListArgs {
            cnt: capacity as u64,
            zones: zones.as_mut_ptr() as u64,
        };
        // SAFETY: `args.zones` points to `capacity` writable records, which
        // outlive the call.
        let count = self.control(Command::ZoneList, |fd| unsafe {
            ioctl::hvisor_zone_list(fd, &args)
        })?;
        zones.truncate(count as usize);
        Ok(zones)
    }

    /// Returns the supervisor's configuration checksum.
    pub fn config_check(&self) -> Result<u64, Error> {
        let mut value = 0;
        // SAFETY: the bridge writes a `u64` through the pointer.
        self.control(Command::ConfigCheck, |fd| unsafe {
            ioctl::hvisor_config_check(fd, &mut value)
        })?;
        Ok(value)
    }

    /// Clears the pending injected interrupt.
    #[cfg(feature = "loongarch")]
    pub fn clear_inject_irq(&self) -> Result<(), Error> {
        // SAFETY: calling IOCTL as documented, with no special requirements.
        self.control(Command::ClearInjectIrq, |fd| unsafe {
            ioctl::hvisor_clear_inject_irq(fd)
        })?;
        Ok(())
    }

    /// Maps the virtio bridge region. [`HvisorDevice::init_virtio`] must have
    /// succeeded.
    pub fn map_virtio_bridge(&self) -> Result<MappedPage<VirtioBridge>, Error> {
        MappedPage::new(&self.file, 0).map_err(Error::MapRegion)
    }

    /// Maps `len` bytes of physical memory at `addr`, such as a zone's RAM
    /// for loading images. The bridge only permits ranges it has been told
    /// the management process may access.
    pub fn map_physical(&self, addr: u64, len: usize) -> Result<PhysMapping, Error> {
        if addr % PAGE_SIZE as u64 != 0 {
            return Err(Error::Unaligned(addr));
        }
        PhysMapping::new(&self.file, addr, len)
            .map_err(|source| Error::MapPhysical { addr, len, source })
    }

    /// Registers for supervisor notifications.
    pub fn notifications(&self) -> Result<Notifications, Error> {
        Notifications::new().map_err(Error::Notifications)
    }
}
