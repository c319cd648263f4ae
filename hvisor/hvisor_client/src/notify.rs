// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use hvisor_defs::SIGHVI;
use signal_hook::iterator::Handle;
use signal_hook::iterator::Signals;
use std::io;

/// Supervisor notifications, delivered to this process as `SIGHVI`.
///
/// The bridge raises one signal per supervisor interrupt. Signals coalesce
/// while pending, so a wakeup means "the virtio bridge region has new
/// requests", not a count of them; the region itself is authoritative.
pub struct Notifications {
    signals: Signals,
}

impl Notifications {
    pub(crate) fn new() -> io::Result<Self> {
        let signals = Signals::new([SIGHVI])?;
        Ok(Self { signals })
    }

    /// Blocks until at least one notification arrives. Returns the number of
    /// notifications observed.
    pub fn wait(&mut self) -> usize {
        let count = self.signals.wait().count();
        tracing::trace!(count, "supervisor notification");
        count
    }

    /// Returns the number of notifications that arrived since the last call,
    /// without blocking.
    pub fn pending(&mut self) -> usize {
        self.signals.pending().count()
    }

    /// A handle that can stop a thread blocked in
    /// [`Notifications::wait`].
    pub fn handle(&self) -> Handle {
        self.signals.handle()
    }
}

impl std::fmt::Debug for Notifications {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifications").finish_non_exhaustive()
    }
}
