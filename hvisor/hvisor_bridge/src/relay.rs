// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Relays supervisor interrupts to the registered management task.
//!
//! The handler runs in interrupt context, concurrently with control
//! operations. It reads the target with a single atomic load and only ever
//! queues a signal; it takes no locks.

use crate::platform::SignalSink;
use crate::platform::TaskId;
use hvisor_defs::SIGHVI;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Whether an interrupt was for this handler.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IrqReturn {
    /// The interrupt was raised for another user of a shared line.
    None,
    /// The interrupt was consumed.
    Handled,
}

/// The relay's state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RelayState {
    /// No notification line is bound.
    Unbound,
    /// The line is bound but no task has initialized virtio yet.
    BoundNoTarget,
    /// Notifications are delivered to the task.
    BoundWithTarget(TaskId),
}

/// Notification counters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Signals queued to the target.
    pub delivered: u64,
    /// Interrupts acknowledged with no target registered.
    pub dropped: u64,
    /// Signals the environment failed to queue.
    pub failed: u64,
}

/// The interrupt relay.
pub struct InterruptRelay {
    line: Option<u32>,
    target: AtomicU32,
    signals: Arc<dyn SignalSink>,
    delivered: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

impl InterruptRelay {
    pub(crate) fn new(line: Option<u32>, signals: Arc<dyn SignalSink>) -> Self {
        Self {
            line,
            target: AtomicU32::new(0),
            signals,
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// The bound notification line.
    pub fn line(&self) -> Option<u32> {
        self.line
    }

    /// The registered target.
    pub fn target(&self) -> Option<TaskId> {
        TaskId::new(self.target.load(Ordering::Acquire))
    }

    /// The current state.
    pub fn state(&self) -> RelayState {
        match (self.line, self.target()) {
            (None, _) => RelayState::Unbound,
            (Some(_), None) => RelayState::BoundNoTarget,
            (Some(_), Some(task)) => RelayState::BoundWithTarget(task),
        }
    }

    /// Replaces the target, returning the previous one.
    ///
    /// Must be called with the bridge's session lock held.
    pub(crate) fn set_target(&self, task: TaskId) -> Option<TaskId> {
        TaskId::new(self.target.swap(task.get(), Ordering::AcqRel))
    }

    pub(crate) fn clear_target(&self) -> Option<TaskId> {
        TaskId::new(self.target.swap(0, Ordering::AcqRel))
    }

    /// Handles an interrupt on `line`.
    pub fn handle(&self, line: u32) -> IrqReturn {
        if self.line != Some(line) {
            return IrqReturn::None;
        }
        let Some(task) = self.target() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return IrqReturn::Handled;
        };
        match self.signals.queue(task, SIGHVI, 1) {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                let failed = self.failed.fetch_add(1, Ordering::Relaxed) + 1;
                if warn_on_failure(failed) {
                    tracing::warn!(
                        error = &err as &dyn std::error::Error,
                        task = task.get(),
                        failed,
                        "unable to send notification signal"
                    );
                }
            }
        }
        IrqReturn::Handled
    }

    /// Returns the notification counters.
    pub fn stats(&self) -> RelayStats {
        RelayStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Whether the `failed`th delivery failure is logged. A target that has
/// exited fails every delivery, so only powers of two are reported.
fn warn_on_failure(failed: u64) -> bool {
    failed.is_power_of_two()
}
