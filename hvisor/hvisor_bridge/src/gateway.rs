// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The privileged call gateway.

use crate::platform::Supervisor;
use crate::BridgeError;
use hvisor_defs::Command;
use parking_lot::Mutex;
use std::sync::Arc;

/// Issues trapped calls into the supervisor.
///
/// Only one call is in flight at a time; concurrent callers queue on an
/// internal lock for as long as the supervisor holds the current call.
pub struct Gateway {
    supervisor: Arc<dyn Supervisor>,
    in_flight: Mutex<()>,
}

impl Gateway {
    /// Returns a gateway issuing calls to `supervisor`.
    pub fn new(supervisor: Arc<dyn Supervisor>) -> Self {
        Self {
            supervisor,
            in_flight: Mutex::new(()),
        }
    }

    /// Traps into the supervisor for `command`.
    ///
    /// The meaning of `arg0` and `arg1` is call specific. Negative results
    /// become [`BridgeError::Supervisor`].
    pub fn invoke(&self, command: Command, arg0: u64, arg1: u64) -> Result<u64, BridgeError> {
        let code = command.hypercall();
        let status = {
            let _in_flight = self.in_flight.lock();
            tracing::trace!(?code, arg0, arg1, "supervisor call");
            self.supervisor.call(code, arg0, arg1)
        };
        if status < 0 {
            return Err(BridgeError::Supervisor { code, status });
        }
        tracing::trace!(?code, status, "supervisor call complete");
        Ok(status as u64)
    }
}
