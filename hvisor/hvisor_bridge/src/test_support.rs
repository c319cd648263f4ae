// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! An in-memory platform for unit tests.

use crate::platform::Caller;
use crate::platform::Clock;
use crate::platform::Errno;
use crate::platform::IrqLines;
use crate::platform::PhysMemory;
use crate::platform::PlatformNode;
use crate::platform::SignalSink;
use crate::platform::Supervisor;
use crate::platform::TaskId;
use crate::platform::UserFault;
use crate::Backends;
use crate::Bridge;
use crate::BridgeConfig;
use hvisor_defs::HypercallCode;
use hvisor_defs::PAGE_SIZE;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// The notification line used by [`TestBed::bridge`].
pub const LINE: u32 = 52;

/// Routes tracing output to the test harness's captured output.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trace"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

type CallHandler = Arc<dyn Fn(HypercallCode, u64, u64) -> i64 + Send + Sync>;

pub struct FakeSupervisor {
    handler: Mutex<CallHandler>,
    calls: Mutex<Vec<(HypercallCode, u64, u64)>>,
}

impl FakeSupervisor {
    /// A supervisor that succeeds every call with 0.
    pub fn new() -> Self {
        Self {
            handler: Mutex::new(Arc::new(|_, _, _| 0)),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_handler(&self, f: impl Fn(HypercallCode, u64, u64) -> i64 + Send + Sync + 'static) {
        *self.handler.lock() = Arc::new(f);
    }

    pub fn calls(&self) -> Vec<(HypercallCode, u64, u64)> {
        self.calls.lock().clone()
    }
}

impl Supervisor for FakeSupervisor {
    fn call(&self, code: HypercallCode, arg0: u64, arg1: u64) -> i64 {
        self.calls.lock().push((code, arg0, arg1));
        // Not called under the lock, so concurrent calls are observable.
        let handler = self.handler.lock().clone();
        handler(code, arg0, arg1)
    }
}

#[derive(Default)]
struct MemoryState {
    next: u64,
    allocations: BTreeMap<u64, Vec<u8>>,
    reserved: BTreeSet<u64>,
    allocs: usize,
    frees: usize,
    fail: bool,
}

impl MemoryState {
    fn locate(&mut self, addr: u64, len: usize) -> &mut [u8] {
        let (&base, data) = self
            .allocations
            .range_mut(..=addr)
            .next_back()
            .unwrap_or_else(|| panic!("{addr:#x} is not allocated"));
        let offset = (addr - base) as usize;
        data.get_mut(offset..offset + len)
            .unwrap_or_else(|| panic!("{addr:#x}+{len:#x} is outside the allocation at {base:#x}"))
    }
}

/// Page-granular physical memory.
pub struct FakeMemory {
    state: Mutex<MemoryState>,
}

impl FakeMemory {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                next: 0x8000_0000,
                ..Default::default()
            }),
        }
    }

    pub fn fail_allocs(&self, fail: bool) {
        self.state.lock().fail = fail;
    }

    pub fn allocs(&self) -> usize {
        self.state.lock().allocs
    }

    pub fn frees(&self) -> usize {
        self.state.lock().frees
    }

    /// The number of outstanding allocations.
    pub fn live(&self) -> usize {
        self.state.lock().allocations.len()
    }

    pub fn reserved_count(&self) -> usize {
        self.state.lock().reserved.len()
    }

    pub fn is_reserved(&self, addr: u64) -> bool {
        self.state.lock().reserved.contains(&addr)
    }

    /// The contents of the allocation starting at `addr`.
    pub fn contents(&self, addr: u64) -> Vec<u8> {
        self.state
            .lock()
            .allocations
            .get(&addr)
            .unwrap_or_else(|| panic!("no allocation at {addr:#x}"))
            .clone()
    }

    /// Writes as the supervisor would, bypassing the bridge.
    pub fn write_raw(&self, addr: u64, data: &[u8]) {
        self.state.lock().locate(addr, data.len()).copy_from_slice(data);
    }
}

impl PhysMemory for FakeMemory {
    fn alloc(&self, len: usize) -> Option<u64> {
        let mut state = self.state.lock();
        if state.fail {
            return None;
        }
        let addr = state.next;
        state.next += len.next_multiple_of(PAGE_SIZE) as u64;
        state.allocations.insert(addr, vec![0; len]);
        state.allocs += 1;
        Some(addr)
    }

    fn free(&self, addr: u64, len: usize) {
        let mut state = self.state.lock();
        let data = state
            .allocations
            .remove(&addr)
            .unwrap_or_else(|| panic!("double free at {addr:#x}"));
        assert_eq!(data.len(), len, "free length mismatch");
        assert!(!state.reserved.contains(&addr), "freed a reserved page");
        state.frees += 1;
    }

    fn set_reserved(&self, addr: u64, len: usize, reserved: bool) {
        let mut state = self.state.lock();
        assert_eq!(state.locate(addr, len).len(), len);
        if reserved {
            state.reserved.insert(addr);
        } else {
            state.reserved.remove(&addr);
        }
    }

    fn read(&self, addr: u64, data: &mut [u8]) {
        data.copy_from_slice(self.state.lock().locate(addr, data.len()));
    }

    fn write(&self, addr: u64, data: &[u8]) {
        self.write_raw(addr, data);
    }
}

/// A management-process task with a sparse address space.
pub struct FakeCaller {
    task: TaskId,
    buffers: Mutex<BTreeMap<u64, Vec<u8>>>,
    mappings: Mutex<Vec<(u64, u64, u64)>>,
    fail_remap: Mutex<bool>,
}

impl FakeCaller {
    pub fn new(pid: u32) -> Self {
        Self {
            task: TaskId::new(pid).unwrap(),
            buffers: Mutex::new(BTreeMap::new()),
            mappings: Mutex::new(Vec::new()),
            fail_remap: Mutex::new(false),
        }
    }

    /// Makes `data` accessible at `addr`.
    pub fn add_buffer(&self, addr: u64, data: Vec<u8>) {
        self.buffers.lock().insert(addr, data);
    }

    pub fn buffer(&self, addr: u64) -> Vec<u8> {
        self.buffers.lock()[&addr].clone()
    }

    /// Established mappings, as `(start, pfn, len)`.
    pub fn mappings(&self) -> Vec<(u64, u64, u64)> {
        self.mappings.lock().clone()
    }

    pub fn fail_remap(&self, fail: bool) {
        *self.fail_remap.lock() = fail;
    }

    fn with_range<R>(
        &self,
        addr: u64,
        len: usize,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Result<R, UserFault> {
        let mut buffers = self.buffers.lock();
        let (&base, data) = buffers.range_mut(..=addr).next_back().ok_or(UserFault)?;
        let offset = (addr - base) as usize;
        let range = data.get_mut(offset..offset + len).ok_or(UserFault)?;
        Ok(f(range))
    }
}

impl Caller for FakeCaller {
    fn task(&self) -> TaskId {
        self.task
    }

    fn read_user(&self, addr: u64, data: &mut [u8]) -> Result<(), UserFault> {
        self.with_range(addr, data.len(), |src| data.copy_from_slice(src))
    }

    fn write_user(&self, addr: u64, data: &[u8]) -> Result<(), UserFault> {
        self.with_range(addr, data.len(), |dest| dest.copy_from_slice(data))
    }

    fn remap_pfn_range(&self, start: u64, pfn: u64, len: u64) -> Result<(), Errno> {
        if *self.fail_remap.lock() {
            return Err(Errno(libc::EAGAIN));
        }
        self.mappings.lock().push((start, pfn, len));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeSignals {
    sent: Mutex<Vec<(TaskId, i32, i32)>>,
    fail: Mutex<Option<i32>>,
    attempts: Mutex<usize>,
}

impl FakeSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(TaskId, i32, i32)> {
        self.sent.lock().clone()
    }

    /// Fails subsequent deliveries with `errno`, or succeeds them with `None`.
    pub fn fail_with(&self, errno: Option<i32>) {
        *self.fail.lock() = errno;
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock()
    }
}

impl SignalSink for FakeSignals {
    fn queue(&self, task: TaskId, signal: i32, value: i32) -> Result<(), Errno> {
        *self.attempts.lock() += 1;
        if let Some(errno) = *self.fail.lock() {
            return Err(Errno(errno));
        }
        self.sent.lock().push((task, signal, value));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeIrq {
    bound: Mutex<Vec<u32>>,
    fail_bind: Mutex<bool>,
}

impl FakeIrq {
    pub fn bound(&self) -> Vec<u32> {
        self.bound.lock().clone()
    }

    pub fn fail_bind(&self, fail: bool) {
        *self.fail_bind.lock() = fail;
    }
}

impl IrqLines for FakeIrq {
    fn bind(&self, line: u32) -> Result<(), Errno> {
        if *self.fail_bind.lock() {
            return Err(Errno(libc::EBUSY));
        }
        self.bound.lock().push(line);
        Ok(())
    }

    fn unbind(&self, line: u32) {
        let mut bound = self.bound.lock();
        let index = bound
            .iter()
            .position(|&l| l == line)
            .unwrap_or_else(|| panic!("line {line} is not bound"));
        bound.remove(index);
    }
}

pub type ClockLog = Arc<Mutex<Vec<String>>>;

/// A clock recording enable and disable events in a shared log.
pub struct FakeClock {
    name: &'static str,
    log: ClockLog,
    fail: Mutex<bool>,
}

impl FakeClock {
    pub fn log() -> ClockLog {
        Arc::new(Mutex::new(Vec::new()))
    }

    pub fn new(name: &'static str, log: ClockLog) -> Self {
        Self {
            name,
            log,
            fail: Mutex::new(false),
        }
    }

    pub fn fail(&self, fail: bool) {
        *self.fail.lock() = fail;
    }
}

impl Clock for FakeClock {
    fn prepare_enable(&self) -> Result<(), Errno> {
        if *self.fail.lock() {
            return Err(Errno(libc::EIO));
        }
        self.log.lock().push(format!("enable {}", self.name));
        Ok(())
    }

    fn disable_unprepare(&self) {
        self.log.lock().push(format!("disable {}", self.name));
    }
}

/// A set of fakes sharing state with the bridges built from them.
pub struct TestBed {
    pub supervisor: Arc<FakeSupervisor>,
    pub memory: Arc<FakeMemory>,
    pub signals: Arc<FakeSignals>,
    pub irq: Arc<FakeIrq>,
}

impl TestBed {
    pub fn new() -> Self {
        Self {
            supervisor: Arc::new(FakeSupervisor::new()),
            memory: Arc::new(FakeMemory::new()),
            signals: Arc::new(FakeSignals::new()),
            irq: Arc::new(FakeIrq::default()),
        }
    }

    pub fn backends(&self) -> Backends {
        Backends {
            supervisor: self.supervisor.clone(),
            memory: self.memory.clone(),
            signals: self.signals.clone(),
            irq: self.irq.clone(),
        }
    }

    /// A bridge bound to [`LINE`] with no clocks.
    pub fn bridge(&self) -> Bridge {
        self.bridge_with_config(BridgeConfig::default())
    }

    pub fn bridge_with_config(&self, config: BridgeConfig) -> Bridge {
        self.bridge_with(
            PlatformNode {
                notification_line: Some(LINE),
                clocks: Vec::new(),
            },
            config,
        )
    }

    /// A bridge on a platform without a notification line.
    pub fn unbound_bridge(&self) -> Bridge {
        self.bridge_with(PlatformNode::default(), BridgeConfig::default())
    }

    pub fn bridge_with(&self, platform: PlatformNode, config: BridgeConfig) -> Bridge {
        Bridge::setup(self.backends(), platform, config).unwrap()
    }
}
