//! # Platform Ports
//!
//! Everything the SMP subsystem needs from its host environment, expressed
//! as traits. The subsystem never reaches into a scheduler, clock framework
//! or interrupt controller directly; the embedder supplies implementations
//! of these ports when it builds the [`SmpContext`].
//!
//! | Port             | Supplies                                          |
//! |------------------|---------------------------------------------------|
//! | [`CoreEnumerator`] | which cores exist, and their power clocks       |
//! | [`ClockGate`]    | prepare/enable/disable of one core's clock        |
//! | [`IrqRegistrar`] | hooking the mailbox interrupt line                |
//! | [`IpiTarget`]    | scheduler/call-function delivery on IPI receipt   |
//! | [`KernelHooks`]  | hotplug bookkeeping and local interrupt control   |
//! | [`WaitGate`]     | the low-power wait primitive for parked cores     |
//!
//! All ports are `Sync`: the subsystem calls them from whichever core is
//! executing the operation, concurrently with other cores.
//!
//! [`SmpContext`]: crate::context::SmpContext

use crate::context::CpuMask;

// ============================================================================
// Errors
// ============================================================================

/// Failure from the embedder's clock framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    /// The clock could not be prepared for use.
    Prepare,
    /// The clock was prepared but could not be gated on.
    Enable,
}

/// Failure to register or enable an interrupt line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqError;

// ============================================================================
// Core discovery and power
// ============================================================================

/// Enumerates the cores present on this SoC and hands out their clocks.
pub trait CoreEnumerator: Sync {
    /// Mask of cores physically present, boot core included.
    fn present(&self) -> CpuMask;

    /// The power clock for `cpu`, if the platform gates cores individually.
    ///
    /// `None` means the core has no dedicated gate; bring-up proceeds
    /// without clock management for it.
    fn clock(&self, cpu: usize) -> Option<&dyn ClockGate>;
}

/// One core's power clock.
///
/// `prepare` and `enable` are separate steps so embedders with a two-phase
/// clock framework can map them directly; simple platforms may implement
/// `prepare` as a no-op.
pub trait ClockGate: Sync {
    fn prepare(&self) -> Result<(), ClockError>;
    fn enable(&self) -> Result<(), ClockError>;
    fn disable_unprepare(&self);
}

// ============================================================================
// Interrupts
// ============================================================================

/// Hooks the mailbox interrupt line into the embedder's interrupt layer.
pub trait IrqRegistrar: Sync {
    /// Register a single shared handler for `line`, invoked on any core.
    fn request_irq(&self, line: u32) -> Result<(), IrqError>;

    /// Register a per-cpu handler for `line`.
    fn request_percpu_irq(&self, line: u32) -> Result<(), IrqError>;

    /// Enable a previously registered per-cpu `line` on the calling core.
    fn enable_percpu_irq(&self, line: u32);
}

/// Receives decoded IPI actions.
///
/// Called from interrupt context on the core the IPI targeted, after the
/// mailbox register has been read and cleared.
pub trait IpiTarget: Sync {
    fn scheduler_ipi(&self);
    fn call_function_interrupt(&self);
}

// ============================================================================
// Kernel bookkeeping
// ============================================================================

/// Scheduler and hotplug bookkeeping the lifecycle operations delegate to.
pub trait KernelHooks: Sync {
    /// Whether `cpu` is currently marked online.
    fn cpu_online(&self, cpu: usize) -> bool;

    /// Mark `cpu` online or offline in the embedder's cpu masks.
    fn set_cpu_online(&self, cpu: usize, online: bool);

    /// Recompute which cpus run foreign (non-cache-local) work after an
    /// online-mask change.
    fn calculate_foreign_map(&self);

    /// Detach any address spaces still referencing the now-offline `cpu`.
    fn clear_tasks_mm(&self, cpu: usize);

    fn flush_tlb_all(&self);

    /// Release the idle task's address-space reference on the dying core.
    fn idle_task_exit(&self);

    /// Force broadcast tick distribution after a secondary finishes boot.
    fn tick_broadcast_force(&self);

    /// Whether the current core has a reschedule pending.
    fn need_resched(&self) -> bool;

    fn local_irq_disable(&self);
    fn local_irq_enable(&self);

    /// Disable local interrupts, returning whether they were enabled.
    fn local_irq_save(&self) -> bool;
    fn local_irq_restore(&self, was_enabled: bool);
}

// ============================================================================
// Low-power wait
// ============================================================================

/// The low-power wait primitive a parked or idling core executes.
///
/// Hardware implementations issue the architectural wait instruction behind
/// a full barrier ([`xburst_hal::barrier::sync_and_wait`], from an uncached
/// alias when the caller has just invalidated its own caches). The call
/// returns when an interrupt arrives; for a core parked for power-down it
/// may never return at all, because the reset that follows destroys the
/// core's state.
pub trait WaitGate: Sync {
    fn wait_for_interrupt(&self, cpu: usize);
}
