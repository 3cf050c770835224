//! # SMP Context
//!
//! The [`SmpContext`] bundles everything the subsystem's operations need:
//! the register file, the cache controller, the platform ports and the
//! shared mutable state (run mask, clock handles, mailbox descriptors).
//! Operations receive it by reference; nothing here lives in module-level
//! statics except the two secondary-entry publication slots, which must be
//! reachable from the bare-metal entry stub before it has a stack.

use core::sync::atomic::{AtomicU32, Ordering};

use spin::{Mutex, Once};
use xburst_hal::cache::CacheController;
use xburst_hal::regs::{CpuKind, Register, RegisterFile};
use xburst_hal::MAX_CPUS;

use crate::ports::{ClockGate, CoreEnumerator, IpiTarget, IrqRegistrar, KernelHooks, WaitGate};

// ============================================================================
// Secondary entry publication
// ============================================================================

/// Stack pointer for the next secondary to come out of reset.
///
/// Written by `boot_secondary` before the reset line is released; read by
/// the secondary entry stub before it has a stack of its own.
pub static CPU_ENTRY_SP: AtomicU32 = AtomicU32::new(0);

/// Global pointer for the next secondary to come out of reset.
pub static CPU_ENTRY_GP: AtomicU32 = AtomicU32::new(0);

// ============================================================================
// Cpu masks
// ============================================================================

/// A set of logical cpu numbers, one bit per cpu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuMask(pub u32);

impl CpuMask {
    pub const EMPTY: Self = Self(0);

    #[inline]
    pub const fn single(cpu: usize) -> Self {
        Self(1 << cpu)
    }

    #[inline]
    pub const fn contains(self, cpu: usize) -> bool {
        self.0 & (1 << cpu) != 0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Iterate the set cpu numbers, lowest first.
    pub fn iter(self) -> impl Iterator<Item = usize> {
        (0..u32::BITS as usize).filter(move |&cpu| self.contains(cpu))
    }
}

// Every logical cpu must have a mask bit, and the XBurst control registers
// pack two lanes per core into 32 bits, so 16 cores is the hardware ceiling.
static_assertions::const_assert!(MAX_CPUS <= u32::BITS as usize);
static_assertions::const_assert!(MAX_CPUS <= 16);

// ============================================================================
// Configuration
// ============================================================================

/// Embedder-chosen parameters, fixed at context construction.
#[derive(Debug, Clone, Copy)]
pub struct SmpConfig {
    /// Physical address of the secondary entry stub. On XBurst the top
    /// sixteen bits are programmed into the reset-entry lanes of REIM, so
    /// the low sixteen bits must be zero; on XBurst2 the full address goes
    /// into RER.
    pub entry_addr: u32,

    /// Interrupt line the mailbox hardware signals on.
    pub mailbox_irq_line: u32,

    /// Maximum spins `cpu_die` waits for the dying core to reach its sleep
    /// state before declaring the hotplug wedged and panicking. `None`
    /// waits forever.
    pub die_spin_budget: Option<u64>,
}

// ============================================================================
// Mailbox descriptors (XBurst2)
// ============================================================================

/// One core's CCU mailbox register and the lock serialising access to it.
pub(crate) struct MailboxDescriptor {
    pub(crate) reg: Register,
    pub(crate) lock: Mutex<()>,
}

// ============================================================================
// Context
// ============================================================================

/// Shared state for every SMP operation.
///
/// Constructed once during early boot on the boot core. Construction is the
/// single place the CPU generation is validated; every later operation may
/// assume `kind` is a known generation.
pub struct SmpContext<'a> {
    pub(crate) kind: CpuKind,
    pub(crate) regs: &'a dyn RegisterFile,
    pub(crate) cache: &'a CacheController<'a>,
    pub(crate) enumerator: &'a dyn CoreEnumerator,
    pub(crate) irq: &'a dyn IrqRegistrar,
    pub(crate) ipi_target: &'a dyn IpiTarget,
    pub(crate) hooks: &'a dyn KernelHooks,
    pub(crate) wait: &'a dyn WaitGate,
    pub(crate) config: SmpConfig,

    /// Serialises every multi-register hardware sequence (and, on XBurst,
    /// all mailbox traffic).
    pub(crate) smp_lock: Mutex<()>,

    /// One bit per core that has been released from reset and not yet torn
    /// down. Read lock-free by parked cores; written under `smp_lock`.
    pub(crate) running: AtomicU32,

    /// Cores present on this SoC, recorded at setup.
    pub(crate) present: Mutex<CpuMask>,

    /// Per-core clock handles, captured at prepare time.
    pub(crate) clock_gates: Mutex<[Option<&'a dyn ClockGate>; MAX_CPUS]>,

    /// XBurst2 per-core mailbox descriptors, built at prepare time.
    pub(crate) mailboxes: Once<heapless::Vec<MailboxDescriptor, MAX_CPUS>>,

    /// Physical core index for each logical cpu, recorded as secondaries
    /// come up. Equal to the logical number except under SMT.
    pub(crate) phys_core: [AtomicU32; MAX_CPUS],
}

impl<'a> SmpContext<'a> {
    /// Build the context for a recognised CPU generation.
    ///
    /// # Panics
    ///
    /// Panics if `kind` is [`CpuKind::Unknown`]. An unrecognised PRId means
    /// the register layout below is wrong for this silicon, and every
    /// operation in the subsystem would touch the wrong registers.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: CpuKind,
        regs: &'a dyn RegisterFile,
        cache: &'a CacheController<'a>,
        enumerator: &'a dyn CoreEnumerator,
        irq: &'a dyn IrqRegistrar,
        ipi_target: &'a dyn IpiTarget,
        hooks: &'a dyn KernelHooks,
        wait: &'a dyn WaitGate,
        config: SmpConfig,
    ) -> Self {
        if let CpuKind::Unknown(prid) = kind {
            panic!("Unknown Ingenic CPU type (PRId {:#010x}).", prid);
        }

        const NO_GATE: Option<&dyn ClockGate> = None;
        const CORE: AtomicU32 = AtomicU32::new(0);

        Self {
            kind,
            regs,
            cache,
            enumerator,
            irq,
            ipi_target,
            hooks,
            wait,
            config,
            smp_lock: Mutex::new(()),
            running: AtomicU32::new(0),
            present: Mutex::new(CpuMask::EMPTY),
            clock_gates: Mutex::new([NO_GATE; MAX_CPUS]),
            mailboxes: Once::new(),
            phys_core: [CORE; MAX_CPUS],
        }
    }

    #[inline]
    pub fn kind(&self) -> CpuKind {
        self.kind
    }

    /// Cores currently released from reset.
    #[inline]
    pub fn running_mask(&self) -> CpuMask {
        CpuMask(self.running.load(Ordering::Acquire))
    }

    /// Cores recorded present at setup.
    #[inline]
    pub fn present_mask(&self) -> CpuMask {
        *self.present.lock()
    }

    /// Physical core index for logical `cpu`, as recorded by
    /// `init_secondary`.
    #[inline]
    pub fn physical_core(&self, cpu: usize) -> u32 {
        self.phys_core[cpu].load(Ordering::Relaxed)
    }

    pub(crate) fn mark_running(&self, cpu: usize) {
        self.running.fetch_or(1 << cpu, Ordering::Release);
    }

    pub(crate) fn clear_running(&self, cpu: usize) {
        self.running.fetch_and(!(1 << cpu), Ordering::Release);
    }

    pub(crate) fn clock_gate(&self, cpu: usize) -> Option<&'a dyn ClockGate> {
        self.clock_gates.lock()[cpu]
    }
}

// ============================================================================
// Tests
// ============================================================================
