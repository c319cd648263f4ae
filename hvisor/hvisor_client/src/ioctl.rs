// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The `/dev/hvisor` ioctls.
//!
//! The control codes are fixed by the bridge, so they are declared with the
//! `_bad` macros from the shared definitions rather than recomputed.

use hvisor_defs::ioctl::CONFIG_CHECK;
use hvisor_defs::ioctl::FINISH_REQ;
use hvisor_defs::ioctl::INIT_VIRTIO;
use hvisor_defs::ioctl::ZONE_LIST;
use hvisor_defs::ioctl::ZONE_SHUTDOWN;
use hvisor_defs::ioctl::ZONE_START;
use hvisor_defs::zone::ZoneConfig;
use hvisor_defs::zone::ZoneListArgs;
use nix::ioctl_none_bad;
use nix::ioctl_read_bad;
use nix::ioctl_write_int_bad;
use nix::ioctl_write_ptr_bad;

ioctl_none_bad!(
    /// Allocates and registers the virtio bridge region.
    hvisor_init_virtio,
    INIT_VIRTIO
);

ioctl_none_bad!(
    /// Acknowledges the current virtio requests.
    hvisor_finish_req,
    FINISH_REQ
);

ioctl_write_ptr_bad!(
    /// Starts a zone.
    hvisor_zone_start,
    ZONE_START,
    ZoneConfig
);

ioctl_write_int_bad!(
    /// Shuts down a zone by id.
    hvisor_zone_shutdown,
    ZONE_SHUTDOWN
);

ioctl_write_ptr_bad!(
    /// Lists zones into the buffer described by the argument. Returns the
    /// number of records written.
    hvisor_zone_list,
    ZONE_LIST,
    ZoneListArgs
);

ioctl_read_bad!(
    /// Reads the supervisor configuration checksum.
    hvisor_config_check,
    CONFIG_CHECK,
    u64
);

#[cfg(feature = "loongarch")]
ioctl_none_bad!(
    /// Clears the pending injected interrupt.
    hvisor_clear_inject_irq,
    hvisor_defs::ioctl::CLEAR_INJECT_IRQ
);
