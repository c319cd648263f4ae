// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Zone lifecycle and configuration operations.

use crate::platform::Caller;
use crate::staging::StagingBuffer;
use crate::Bridge;
use crate::BridgeError;
use hvisor_defs::zone::ZoneInfo;
use hvisor_defs::zone::ZoneListArgs;
use hvisor_defs::Command;
use zerocopy::FromZeros;
use zerocopy::IntoBytes;

impl Bridge {
    /// Starts a zone from the configuration blob at caller address
    /// `config_addr`.
    pub(crate) fn start_zone(
        &self,
        caller: &dyn Caller,
        config_addr: u64,
    ) -> Result<u64, BridgeError> {
        let len = self.config.zone_config_len;
        let staging = StagingBuffer::alloc(&*self.memory, len)?;
        let mut config = vec![0; len];
        caller
            .read_user(config_addr, &mut config)
            .map_err(|source| BridgeError::InvalidAddress {
                addr: config_addr,
                len,
                source,
            })?;
        staging.write(&config);

        tracing::info!(len, "invoking supervisor to start the zone");
        let status = self.gateway.invoke(Command::StartZone, staging.addr(), len as u64)?;
        drop(staging);

        self.allow_list.zone_started(&config);
        Ok(status)
    }

    /// Shuts down zone `zone_id`.
    pub(crate) fn shutdown_zone(&self, zone_id: u64) -> Result<u64, BridgeError> {
        tracing::info!(zone_id, "invoking supervisor to shut down the zone");
        let status = self.gateway.invoke(Command::ShutdownZone, zone_id, 0)?;
        self.allow_list.zone_stopped(zone_id);
        Ok(status)
    }

    /// Lists zones into the caller's buffer described by the
    /// [`ZoneListArgs`] at `args_addr`. Returns the number of records
    /// copied.
    pub(crate) fn list_zones(
        &self,
        caller: &dyn Caller,
        args_addr: u64,
    ) -> Result<u64, BridgeError> {
        let mut args = ZoneListArgs::new_zeroed();
        caller
            .read_user(args_addr, args.as_mut_bytes())
            .map_err(|source| BridgeError::InvalidAddress {
                addr: args_addr,
                len: size_of::<ZoneListArgs>(),
                source,
            })?;

        if args.cnt == 0 {
            return Ok(0);
        }
        if args.cnt > self.config.max_zone_list {
            return Err(BridgeError::InvalidArgument("zone list capacity too large"));
        }
        let len = usize::try_from(args.cnt)
            .ok()
            .and_then(|cnt| cnt.checked_mul(size_of::<ZoneInfo>()))
            .ok_or(BridgeError::InvalidArgument("zone list capacity too large"))?;

        let staging = StagingBuffer::alloc(&*self.memory, len)?;
        let reported = self.gateway.invoke(Command::ZoneList, staging.addr(), args.cnt)?;
        if reported > args.cnt {
            tracing::warn!(
                reported,
                capacity = args.cnt,
                "supervisor reported more zones than requested"
            );
        }
        let count = reported.min(args.cnt);

        let mut zones = vec![0; count as usize * size_of::<ZoneInfo>()];
        staging.read(&mut zones);
        caller
            .write_user(args.zones, &zones)
            .map_err(|source| BridgeError::InvalidAddress {
                addr: args.zones,
                len: zones.len(),
                source,
            })?;
        Ok(count)
    }

    /// Reads the supervisor's configuration checksum into the `u64` at caller
    /// address `dest`.
    ///
    /// The staged value is copied back even when the call fails; the call's
    /// error is reported after the copy.
    pub(crate) fn config_check(&self, caller: &dyn Caller, dest: u64) -> Result<u64, BridgeError> {
        let staging = StagingBuffer::alloc(&*self.memory, size_of::<u64>())?;
        let result = self.gateway.invoke(Command::ConfigCheck, staging.addr(), 0);
        if let Err(err) = &result {
            tracing::error!(
                error = err as &dyn std::error::Error,
                "failed to get supervisor config"
            );
        }

        let mut value = [0; size_of::<u64>()];
        staging.read(&mut value);
        caller
            .write_user(dest, &value)
            .map_err(|source| BridgeError::InvalidAddress {
                addr: dest,
                len: value.len(),
                source,
            })?;
        result
    }
}
