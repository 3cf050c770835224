//! Host-side simulation rig shared by the unit tests: a simulated register
//! file, a synthetic cache and a platform double that records every port
//! call the subsystem makes.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use xburst_hal::cache::{CacheController, CacheGeometry, CacheHierarchy, SyntheticCache};
use xburst_hal::regs::{xburst, xburst2, CpuKind, RegisterFile, SimRegisterFile};
use xburst_hal::regs::{CCU_CSSR, XBURST_CORE_STATUS};
use xburst_hal::MAX_CPUS;

use crate::context::{CpuMask, SmpConfig, SmpContext};
use crate::ports::{
    ClockGate, ClockError, CoreEnumerator, IpiTarget, IrqError, IrqRegistrar, KernelHooks,
    WaitGate,
};

/// Serialises tests that share the process-wide entry publication statics
/// or spawn cores as threads.
pub(crate) fn entry_test_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Clock double
// ============================================================================

pub(crate) struct SimClock {
    prepared: AtomicBool,
    enabled: AtomicBool,
    fail_enable: AtomicBool,
}

impl SimClock {
    const fn new() -> Self {
        Self {
            prepared: AtomicBool::new(false),
            enabled: AtomicBool::new(false),
            fail_enable: AtomicBool::new(false),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared.load(Ordering::SeqCst)
    }

    pub fn fail_enable(&self, fail: bool) {
        self.fail_enable.store(fail, Ordering::SeqCst);
    }
}

impl ClockGate for SimClock {
    fn prepare(&self) -> Result<(), ClockError> {
        self.prepared.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn enable(&self) -> Result<(), ClockError> {
        if self.fail_enable.load(Ordering::SeqCst) {
            return Err(ClockError::Enable);
        }
        self.enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disable_unprepare(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        self.prepared.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// Platform double
// ============================================================================

/// Implements every port the subsystem consumes and counts the calls.
pub(crate) struct SimPlatform {
    regs: &'static SimRegisterFile,
    kind: CpuKind,
    present: CpuMask,
    park_on_wait: AtomicBool,

    online: Mutex<u32>,
    clocks: [SimClock; MAX_CPUS],

    sched_ipis: AtomicU32,
    call_fn_ipis: AtomicU32,
    shared_irq_requests: AtomicU32,
    percpu_irq_requests: AtomicU32,
    percpu_irq_enables: AtomicU32,
    need_resched: AtomicBool,
    waits: AtomicU32,
    irq_enables: AtomicU32,
    foreign_map_calcs: AtomicU32,
    cleared_mm: Mutex<Vec<usize>>,
    tlb_flushes: AtomicU32,
    idle_exits: AtomicU32,
    tick_broadcasts: AtomicU32,
}

impl SimPlatform {
    pub fn new(regs: &'static SimRegisterFile, kind: CpuKind, present: CpuMask) -> Self {
        const CLOCK: SimClock = SimClock::new();
        Self {
            regs,
            kind,
            present,
            park_on_wait: AtomicBool::new(false),
            online: Mutex::new(0b1),
            clocks: [CLOCK; MAX_CPUS],
            sched_ipis: AtomicU32::new(0),
            call_fn_ipis: AtomicU32::new(0),
            shared_irq_requests: AtomicU32::new(0),
            percpu_irq_requests: AtomicU32::new(0),
            percpu_irq_enables: AtomicU32::new(0),
            need_resched: AtomicBool::new(false),
            waits: AtomicU32::new(0),
            irq_enables: AtomicU32::new(0),
            foreign_map_calcs: AtomicU32::new(0),
            cleared_mm: Mutex::new(Vec::new()),
            tlb_flushes: AtomicU32::new(0),
            idle_exits: AtomicU32::new(0),
            tick_broadcasts: AtomicU32::new(0),
        }
    }

    /// Make `wait_for_interrupt` park its thread forever after raising the
    /// sleep flag, like a core whose clock is about to be gated.
    pub fn park_on_wait(&self, park: bool) {
        self.park_on_wait.store(park, Ordering::SeqCst);
    }

    pub fn clock(&self, cpu: usize) -> &SimClock {
        &self.clocks[cpu]
    }

    pub fn is_online(&self, cpu: usize) -> bool {
        *self.online.lock().unwrap() & (1 << cpu) != 0
    }

    pub fn set_cpu_online(&self, cpu: usize, online: bool) {
        let mut mask = self.online.lock().unwrap();
        if online {
            *mask |= 1 << cpu;
        } else {
            *mask &= !(1 << cpu);
        }
    }

    pub fn set_need_resched(&self, val: bool) {
        self.need_resched.store(val, Ordering::SeqCst);
    }

    pub fn sched_ipis(&self) -> u32 {
        self.sched_ipis.load(Ordering::SeqCst)
    }

    pub fn call_fn_ipis(&self) -> u32 {
        self.call_fn_ipis.load(Ordering::SeqCst)
    }

    pub fn shared_irq_requests(&self) -> u32 {
        self.shared_irq_requests.load(Ordering::SeqCst)
    }

    pub fn percpu_irq_requests(&self) -> u32 {
        self.percpu_irq_requests.load(Ordering::SeqCst)
    }

    pub fn percpu_irq_enables(&self) -> u32 {
        self.percpu_irq_enables.load(Ordering::SeqCst)
    }

    pub fn waits(&self) -> u32 {
        self.waits.load(Ordering::SeqCst)
    }

    pub fn irq_enables(&self) -> u32 {
        self.irq_enables.load(Ordering::SeqCst)
    }

    pub fn tick_broadcasts(&self) -> u32 {
        self.tick_broadcasts.load(Ordering::SeqCst)
    }

    pub fn cleared_mm(&self) -> Vec<usize> {
        self.cleared_mm.lock().unwrap().clone()
    }

    pub fn foreign_map_calcs(&self) -> u32 {
        self.foreign_map_calcs.load(Ordering::SeqCst)
    }

    pub fn tlb_flushes(&self) -> u32 {
        self.tlb_flushes.load(Ordering::SeqCst)
    }

    pub fn idle_exits(&self) -> u32 {
        self.idle_exits.load(Ordering::SeqCst)
    }
}

impl CoreEnumerator for SimPlatform {
    fn present(&self) -> CpuMask {
        self.present
    }

    fn clock(&self, cpu: usize) -> Option<&dyn ClockGate> {
        Some(&self.clocks[cpu])
    }
}

impl IrqRegistrar for SimPlatform {
    fn request_irq(&self, _line: u32) -> Result<(), IrqError> {
        self.shared_irq_requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn request_percpu_irq(&self, _line: u32) -> Result<(), IrqError> {
        self.percpu_irq_requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn enable_percpu_irq(&self, _line: u32) {
        self.percpu_irq_enables.fetch_add(1, Ordering::SeqCst);
    }
}

impl IpiTarget for SimPlatform {
    fn scheduler_ipi(&self) {
        self.sched_ipis.fetch_add(1, Ordering::SeqCst);
    }

    fn call_function_interrupt(&self) {
        self.call_fn_ipis.fetch_add(1, Ordering::SeqCst);
    }
}

impl KernelHooks for SimPlatform {
    fn cpu_online(&self, cpu: usize) -> bool {
        self.is_online(cpu)
    }

    fn set_cpu_online(&self, cpu: usize, online: bool) {
        SimPlatform::set_cpu_online(self, cpu, online);
    }

    fn calculate_foreign_map(&self) {
        self.foreign_map_calcs.fetch_add(1, Ordering::SeqCst);
    }

    fn clear_tasks_mm(&self, cpu: usize) {
        self.cleared_mm.lock().unwrap().push(cpu);
    }

    fn flush_tlb_all(&self) {
        self.tlb_flushes.fetch_add(1, Ordering::SeqCst);
    }

    fn idle_task_exit(&self) {
        self.idle_exits.fetch_add(1, Ordering::SeqCst);
    }

    fn tick_broadcast_force(&self) {
        self.tick_broadcasts.fetch_add(1, Ordering::SeqCst);
    }

    fn need_resched(&self) -> bool {
        self.need_resched.load(Ordering::SeqCst)
    }

    fn local_irq_disable(&self) {}

    fn local_irq_enable(&self) {
        self.irq_enables.fetch_add(1, Ordering::SeqCst);
    }

    fn local_irq_save(&self) -> bool {
        false
    }

    fn local_irq_restore(&self, _was_enabled: bool) {}
}

impl WaitGate for SimPlatform {
    fn wait_for_interrupt(&self, cpu: usize) {
        self.waits.fetch_add(1, Ordering::SeqCst);

        // Raise the hardware sleep flag a reaping core polls for.
        match self.kind {
            CpuKind::XBurst2 => {
                self.regs.modify(CCU_CSSR, xburst2::cssr_ss(cpu), 0);
            }
            _ => {
                self.regs
                    .modify(XBURST_CORE_STATUS, xburst::corestatus_sleep(cpu), 0);
            }
        }

        if self.park_on_wait.load(Ordering::SeqCst) {
            loop {
                std::thread::park();
            }
        }
    }
}

// ============================================================================
// Rig
// ============================================================================

/// Everything a test needs, leaked to `'static` so contexts can cross
/// thread boundaries.
pub(crate) struct Rig {
    pub regs: &'static SimRegisterFile,
    pub lines: &'static SyntheticCache,
    pub cache: &'static CacheController<'static>,
    pub platform: &'static SimPlatform,
    pub kind: CpuKind,
}

impl Rig {
    pub fn new(kind: CpuKind) -> Self {
        Self::with_present(kind, CpuMask(0b11))
    }

    pub fn with_present(kind: CpuKind, present: CpuMask) -> Self {
        let regs: &'static SimRegisterFile = Box::leak(Box::new(SimRegisterFile::new()));
        let lines: &'static SyntheticCache = Box::leak(Box::new(SyntheticCache::new()));

        // A JZ4780-shaped hierarchy: 32 KiB 4-way L1s with 32-byte lines.
        let hierarchy = CacheHierarchy {
            icache: CacheGeometry::from_raw(32, 256, 4).unwrap(),
            dcache: CacheGeometry::from_raw(32, 256, 4).unwrap(),
            scache: None,
        };
        let cache: &'static CacheController<'static> =
            Box::leak(Box::new(CacheController::new(regs, lines, hierarchy, kind)));

        let platform: &'static SimPlatform =
            Box::leak(Box::new(SimPlatform::new(regs, kind, present)));

        Self {
            regs,
            lines,
            cache,
            platform,
            kind,
        }
    }

    pub fn default_config() -> SmpConfig {
        SmpConfig {
            entry_addr: 0x8ff0_0000,
            mailbox_irq_line: 3,
            die_spin_budget: None,
        }
    }

    pub fn context(&self) -> SmpContext<'static> {
        self.context_with(Self::default_config())
    }

    pub fn context_with(&self, config: SmpConfig) -> SmpContext<'static> {
        self.build(self.kind, config)
    }

    /// Build a context claiming a different generation than the rig's
    /// hardware doubles; used to exercise the construction-time check.
    pub fn context_as(&self, kind: CpuKind) -> SmpContext<'static> {
        self.build(kind, Self::default_config())
    }

    fn build(&self, kind: CpuKind, config: SmpConfig) -> SmpContext<'static> {
        SmpContext::new(
            kind,
            self.regs,
            self.cache,
            self.platform,
            self.platform,
            self.platform,
            self.platform,
            self.platform,
            config,
        )
    }

    pub fn leaked_context(&self) -> &'static SmpContext<'static> {
        Box::leak(Box::new(self.context()))
    }
}
