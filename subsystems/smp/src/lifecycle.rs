//! # SMP Lifecycle
//!
//! Bring-up, shutdown and idle handling for secondary cores, expressed as a
//! generation-specific operation table selected once at boot:
//!
//! ```text
//!   boot core                      secondary core
//!   ---------                      --------------
//!   smp_setup
//!   prepare_cpus
//!   boot_secondary(cpu)  ------>   (reset released, entry stub runs)
//!                                  init_secondary(cpu)
//!                                  smp_finish(cpu)
//!   ...                            ...
//!   cpu_disable(cpu)               (going down)
//!   cpu_die(cpu)         <------   play_dead(cpu)
//! ```
//!
//! `cpu_die` runs on a surviving core and reaps the dying one: it waits for
//! the hardware sleep flag, then holds the core in reset and gates its
//! clock. `play_dead` is the other half, executed by the dying core itself.
//!
//! Everything that touches more than one control register is serialised by
//! the context's single SMP lock; see [`SmpContext`].

use core::sync::atomic::Ordering;

use xburst_hal::barrier;
use xburst_hal::regs::{
    ccu_mailbox, ip, xburst, xburst2, xburst_mailbox, CpuKind, RegisterFile, CCU_CSRR, CCU_CSSR,
    CCU_MIMR, CCU_OIMR, CCU_PIMR, CCU_RER, CP0_CAUSE, CP0_STATUS, XBURST_CORE_CTRL,
    XBURST_CORE_STATUS, XBURST_REIM,
};

use crate::context::{MailboxDescriptor, SmpContext, CPU_ENTRY_GP, CPU_ENTRY_SP};
use crate::ipi::{self, IpiAction, XBURST_MAILBOX_COUNT};
use crate::CpuMask;

// ============================================================================
// Errors
// ============================================================================

/// Failures the lifecycle operations report to the embedder's cpu framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmpError {
    /// The requested cpu was not recorded present at setup.
    NotPresent(usize),
}

impl core::fmt::Display for SmpError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotPresent(cpu) => write!(f, "CPU {} is not present", cpu),
        }
    }
}

// ============================================================================
// Operation table
// ============================================================================

/// The generation-specific SMP operation table.
///
/// Selected exactly once, from the probed [`CpuKind`]; after selection no
/// operation re-examines the generation on its hot path beyond a simple
/// register-layout match.
pub struct SmpOps {
    pub send_ipi_single: fn(&SmpContext<'_>, usize, IpiAction),
    pub send_ipi_mask: fn(&SmpContext<'_>, CpuMask, IpiAction),
    pub handle_mailbox_irq: fn(&SmpContext<'_>, usize),
    pub smp_setup: fn(&SmpContext<'_>),
    pub prepare_cpus: fn(&SmpContext<'_>, usize),
    pub boot_secondary: fn(&SmpContext<'_>, usize, u32, u32) -> Result<(), SmpError>,
    pub init_secondary: fn(&SmpContext<'_>, usize),
    pub smp_finish: fn(&SmpContext<'_>, usize),
    pub cpu_disable: fn(&SmpContext<'_>, usize) -> Result<(), SmpError>,
    pub cpu_die: fn(&SmpContext<'_>, usize),
    pub play_dead: fn(&SmpContext<'_>, usize) -> !,
}

static XBURST_SMP_OPS: SmpOps = SmpOps {
    send_ipi_single: ipi::xburst_send_ipi_single,
    send_ipi_mask: ipi::xburst_send_ipi_mask,
    handle_mailbox_irq: ipi::xburst_mailbox_irq,
    smp_setup,
    prepare_cpus: xburst_prepare_cpus,
    boot_secondary,
    init_secondary,
    smp_finish,
    cpu_disable,
    cpu_die,
    play_dead: xburst_play_dead,
};

static XBURST2_SMP_OPS: SmpOps = SmpOps {
    send_ipi_single: ipi::xburst2_send_ipi_single,
    send_ipi_mask: ipi::xburst2_send_ipi_mask,
    handle_mailbox_irq: ipi::xburst2_mailbox_irq,
    smp_setup,
    prepare_cpus: xburst2_prepare_cpus,
    boot_secondary,
    init_secondary,
    smp_finish,
    cpu_disable,
    cpu_die,
    play_dead: xburst2_play_dead,
};

impl SmpOps {
    /// Pick the operation table for the probed generation.
    ///
    /// # Panics
    ///
    /// Panics on [`CpuKind::Unknown`]: every operation in either table
    /// writes generation-specific registers, so there is nothing sensible
    /// to register for unrecognised silicon.
    pub fn select(kind: CpuKind) -> &'static SmpOps {
        match kind {
            CpuKind::XBurst => &XBURST_SMP_OPS,
            CpuKind::XBurst2 => &XBURST2_SMP_OPS,
            CpuKind::Unknown(prid) => {
                panic!("Unknown Ingenic CPU type (PRId {:#010x}).", prid)
            }
        }
    }
}

// ============================================================================
// Setup and prepare
// ============================================================================

/// Early boot-core setup: record the present cores, quiesce the mailbox
/// hardware and program the secondary reset entry point.
fn smp_setup(ctx: &SmpContext<'_>) {
    let present = ctx.enumerator.present();
    *ctx.present.lock() = present;

    let entry = ctx.config.entry_addr;

    match ctx.kind {
        CpuKind::XBurst => {
            // Mask the boot core's mailbox IRQ while the mailboxes are
            // cleared, so a stale pending bit cannot fire mid-setup.
            let mut val = ctx.regs.read(XBURST_REIM);
            val &= !xburst::reim_mboxirq_m(0);
            ctx.regs.write(XBURST_REIM, val);

            for cpu in 0..XBURST_MAILBOX_COUNT {
                ctx.regs.write(xburst_mailbox(cpu), 0);
            }
            ctx.regs.write(XBURST_CORE_STATUS, 0);

            // Only the top sixteen bits of the entry address fit in REIM.
            if entry & !xburst::REIM_ENTRY_MASK != 0 {
                log::warn!(
                    "secondary entry {:#010x} truncated to REIM lanes",
                    entry
                );
            }
            val &= !xburst::REIM_ENTRY_MASK;
            val |= entry & xburst::REIM_ENTRY_MASK;

            val |= xburst::reim_mboxirq_m(0);
            ctx.regs.write(XBURST_REIM, val);
        }
        CpuKind::XBurst2 => {
            let mut val = ctx.regs.read(CCU_MIMR);
            val &= !xburst2::im(0);
            ctx.regs.write(CCU_MIMR, val);

            for cpu in present.iter() {
                ctx.regs.write(ccu_mailbox(cpu), 0);
            }

            ctx.regs.write(CCU_RER, entry);

            val |= xburst2::im(0);
            ctx.regs.write(CCU_MIMR, val);
        }
        CpuKind::Unknown(_) => unreachable!(),
    }

    // Take the mailbox interrupt line on the boot core.
    ctx.regs.modify(CP0_STATUS, ip::ip(3), 0);

    ctx.mark_running(0);
}

fn xburst_prepare_cpus(ctx: &SmpContext<'_>, _max_cpus: usize) {
    if ctx.irq.request_irq(ctx.config.mailbox_irq_line).is_err() {
        log::error!("request_irq() on core mailbox failed");
    }

    let mut ctrl = ctx.regs.read(XBURST_CORE_CTRL);
    let mut gates = ctx.clock_gates.lock();

    for cpu in ctx.enumerator.present().iter() {
        // Fetch the reset PC from REIM instead of the architectural vector.
        ctrl |= xburst::corectrl_rpc(cpu);

        gates[cpu] = ctx.enumerator.clock(cpu);
    }
    drop(gates);

    ctx.regs.write(XBURST_CORE_CTRL, ctrl);
}

fn xburst2_prepare_cpus(ctx: &SmpContext<'_>, _max_cpus: usize) {
    let present = ctx.enumerator.present();

    // One descriptor per core, indexed by cpu number. Running out of slots
    // here means every later IPI would address the wrong mailbox, so this
    // is not survivable.
    ctx.mailboxes.call_once(|| {
        let mut table = heapless::Vec::new();
        let count = present.iter().last().map_or(0, |cpu| cpu + 1);
        for cpu in 0..count {
            let desc = MailboxDescriptor {
                reg: ccu_mailbox(cpu),
                lock: spin::Mutex::new(()),
            };
            if table.push(desc).is_err() {
                panic!("Failed to allocate mailbox descriptor for CPU {}", cpu);
            }
        }
        table
    });

    if ctx
        .irq
        .request_percpu_irq(ctx.config.mailbox_irq_line)
        .is_err()
    {
        log::error!("request_percpu_irq() on core mailbox failed");
    }

    let mut pimr = ctx.regs.read(CCU_PIMR);
    let mut oimr = ctx.regs.read(CCU_OIMR);
    let mut gates = ctx.clock_gates.lock();

    for cpu in present.iter() {
        pimr |= xburst2::im(cpu);
        oimr |= xburst2::im(cpu);

        ctx.irq.enable_percpu_irq(ctx.config.mailbox_irq_line);

        gates[cpu] = ctx.enumerator.clock(cpu);
    }
    drop(gates);

    ctx.regs.write(CCU_PIMR, pimr);
    ctx.regs.write(CCU_OIMR, oimr);
}

// ============================================================================
// Secondary bring-up
// ============================================================================

/// Release `cpu` from reset, runs on the boot core.
///
/// The entry stack and global pointers are published through
/// [`CPU_ENTRY_SP`]/[`CPU_ENTRY_GP`] with a write barrier before the reset
/// line drops, so the secondary observes them no matter how quickly it
/// starts fetching.
fn boot_secondary(ctx: &SmpContext<'_>, cpu: usize, sp: u32, gp: u32) -> Result<(), SmpError> {
    if !ctx.present_mask().contains(cpu) {
        return Err(SmpError::NotPresent(cpu));
    }

    let was_enabled = ctx.hooks.local_irq_save();
    let guard = ctx.smp_lock.lock();

    let (reset_reg, reset_bit) = match ctx.kind {
        CpuKind::XBurst => (XBURST_CORE_CTRL, xburst::corectrl_swrst(cpu)),
        CpuKind::XBurst2 => (CCU_CSRR, xburst2::csrr_sre(cpu)),
        CpuKind::Unknown(_) => unreachable!(),
    };

    // Hold the core in reset while its clock and entry state are staged.
    let mut val = ctx.regs.read(reset_reg);
    val |= reset_bit;
    ctx.regs.write(reset_reg, val);

    if let Some(clock) = ctx.clock_gate(cpu) {
        if clock.prepare().is_err() {
            log::error!("Failed to prepare CPU clock gate");
        }
        if clock.enable().is_err() {
            log::error!("Failed to ungate core clock");
        }
    }

    CPU_ENTRY_SP.store(sp, Ordering::Release);
    CPU_ENTRY_GP.store(gp, Ordering::Release);
    barrier::wmb();

    val &= !reset_bit;
    ctx.regs.write(reset_reg, val);

    ctx.mark_running(cpu);

    drop(guard);
    ctx.hooks.local_irq_restore(was_enabled);

    Ok(())
}

/// Early setup on the secondary itself, after its cache probe.
fn init_secondary(ctx: &SmpContext<'_>, cpu: usize) {
    match ctx.kind {
        CpuKind::XBurst => {}
        CpuKind::XBurst2 => {
            let core = (cpu / ctx.kind.threads_per_core()) as u32;
            ctx.phys_core[cpu].store(core, Ordering::Relaxed);
        }
        CpuKind::Unknown(_) => unreachable!(),
    }
}

/// Late setup on the secondary, just before it enters its idle loop.
fn smp_finish(ctx: &SmpContext<'_>, cpu: usize) {
    {
        let _guard = ctx.smp_lock.lock();
        match ctx.kind {
            CpuKind::XBurst => {
                ctx.regs.modify(XBURST_REIM, xburst::reim_mboxirq_m(cpu), 0);
            }
            CpuKind::XBurst2 => {
                ctx.regs.modify(CCU_MIMR, xburst2::im(cpu), 0);
            }
            CpuKind::Unknown(_) => unreachable!(),
        }
    }

    // Open the interrupt lanes this core services.
    let lanes = ip::ip(0) | ip::ip(1) | ip::ip(2) | ip::ip(3) | ip::ip(4);
    ctx.regs.modify(CP0_STATUS, lanes, ip::IP_MASK);

    ctx.hooks.tick_broadcast_force();
}

// ============================================================================
// Hotplug: the way down
// ============================================================================

/// Detach `cpu` from the online set and reroute its interrupts to the boot
/// core. Runs on the departing core with interrupts disabled.
fn cpu_disable(ctx: &SmpContext<'_>, cpu: usize) -> Result<(), SmpError> {
    ctx.hooks.local_irq_disable();

    ctx.hooks.set_cpu_online(cpu, false);
    ctx.hooks.calculate_foreign_map();

    {
        let _guard = ctx.smp_lock.lock();
        match ctx.kind {
            CpuKind::XBurst => {
                let val = ctx.regs.read(XBURST_REIM);
                if val & xburst::reim_irq_m(cpu) != 0 {
                    let val = (val & !xburst::reim_irq_m(cpu)) | xburst::reim_irq_m(0);
                    ctx.regs.write(XBURST_REIM, val);
                }
            }
            CpuKind::XBurst2 => {
                let val = ctx.regs.read(CCU_PIMR);
                if val & xburst2::im(cpu) != 0 {
                    let val = (val & !xburst2::im(cpu)) | xburst2::im(0);
                    ctx.regs.write(CCU_PIMR, val);
                }

                let val = ctx.regs.read(CCU_OIMR);
                if val & xburst2::im(cpu) != 0 {
                    let val = (val & !xburst2::im(cpu)) | xburst2::im(0);
                    ctx.regs.write(CCU_OIMR, val);
                }
            }
            CpuKind::Unknown(_) => unreachable!(),
        }
    }

    ctx.hooks.clear_tasks_mm(cpu);

    Ok(())
}

/// Reap a dying core. Runs on a surviving core after `cpu` was told to
/// park: waits for the hardware sleep flag, then holds the core in reset
/// and gates its clock.
///
/// # Panics
///
/// With a configured `die_spin_budget`, panics when the dying core never
/// reaches its sleep state; the hotplug is wedged and the reset that would
/// follow could kill a still-running core.
fn cpu_die(ctx: &SmpContext<'_>, cpu: usize) {
    let was_enabled = ctx.hooks.local_irq_save();

    ctx.clear_running(cpu);
    barrier::wmb();

    let (sleep_reg, sleep_bit, reset_reg, reset_bit) = match ctx.kind {
        CpuKind::XBurst => (
            XBURST_CORE_STATUS,
            xburst::corestatus_sleep(cpu),
            XBURST_CORE_CTRL,
            xburst::corectrl_swrst(cpu),
        ),
        CpuKind::XBurst2 => (
            CCU_CSSR,
            xburst2::cssr_ss(cpu),
            CCU_CSRR,
            xburst2::csrr_sre(cpu),
        ),
        CpuKind::Unknown(_) => unreachable!(),
    };

    let mut spins: u64 = 0;
    while ctx.regs.read(sleep_reg) & sleep_bit == 0 {
        spins += 1;
        if let Some(budget) = ctx.config.die_spin_budget {
            if spins >= budget {
                panic!("CPU {} failed to reach sleep state for power-down", cpu);
            }
        }
        core::hint::spin_loop();
    }

    ctx.regs.modify(reset_reg, reset_bit, 0);

    if let Some(clock) = ctx.clock_gate(cpu) {
        clock.disable_unprepare();
    }

    ctx.hooks.local_irq_restore(was_enabled);
}

fn xburst_play_dead(ctx: &SmpContext<'_>, cpu: usize) -> ! {
    ctx.hooks.local_irq_disable();

    // Drop anything still queued for us; nobody will service it again.
    if cpu < XBURST_MAILBOX_COUNT {
        ctx.regs.write(xburst_mailbox(cpu), 0);
    }
    ctx.regs
        .modify(XBURST_CORE_STATUS, 0, xburst::corestatus_mirq(cpu));

    loop {
        while ctx.running.load(Ordering::Acquire) & (1 << cpu) != 0 {
            core::hint::spin_loop();
        }

        // The reaper is about to gate our clock. Push every line we own
        // out to memory first; with the clock gated, a peer touching data
        // left in this cache would lock up.
        ctx.cache.blast_icache();
        ctx.cache.blast_dcache();

        ctx.wait.wait_for_interrupt(cpu);
    }
}

fn xburst2_play_dead(ctx: &SmpContext<'_>, cpu: usize) -> ! {
    ctx.regs.modify(CCU_MIMR, 0, xburst2::im(cpu));

    ctx.hooks.idle_task_exit();
    ctx.hooks.local_irq_disable();
    ctx.hooks.flush_tlb_all();

    // Writeback only when the SMT sibling is down too; a live sibling
    // shares this D-cache and keeps it coherent.
    let sibling = ((cpu + 1) & 1) | (cpu & !1usize);
    if !ctx.hooks.cpu_online(sibling) {
        ctx.cache.blast_dcache();
    }

    ctx.wait.wait_for_interrupt(cpu);

    // Reached only if an interrupt slipped through before the reset hit.
    log::error!("CPU {}: woke from power-down wait", cpu);
    loop {
        ctx.wait.wait_for_interrupt(cpu);
    }
}

// ============================================================================
// XBurst idle and IRQ steering
// ============================================================================

/// Idle-loop wait for JZ4780-class parts, entered with interrupts off.
///
/// The CPU and cache clocks gate during `wait`, so dirty lines must be
/// written back first; a peer reading data stuck in a gated cache locks
/// up. The writeback is the dirty-only walk, not a full blast, and is
/// skipped entirely when a reschedule or pending interrupt would wake the
/// core immediately anyway.
pub fn wait_irqoff(ctx: &SmpContext<'_>, cpu: usize) {
    let pending = ctx.regs.read(CP0_CAUSE) & ctx.regs.read(CP0_STATUS) & ip::IP_MASK;

    if !ctx.hooks.need_resched() && pending == 0 {
        ctx.cache.wback_dirty_dcache();
        ctx.wait.wait_for_interrupt(cpu);
    }

    ctx.hooks.local_irq_enable();
}

/// Steer peripheral interrupts away from `cpu` to its peer, JZ4780 only.
pub fn switch_irqcpu(ctx: &SmpContext<'_>, cpu: usize) {
    let _guard = ctx.smp_lock.lock();

    let peer = if cpu == 0 { 1 } else { 0 };
    if ctx.hooks.cpu_online(peer) {
        let mut val = ctx.regs.read(XBURST_REIM);
        val &= !(xburst::reim_irq_m(0) | xburst::reim_irq_m(1));
        val |= xburst::reim_irq_m(peer);
        ctx.regs.write(XBURST_REIM, val);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{entry_test_lock, Rig};
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    const ENTRY: u32 = 0x8ff0_0000;

    #[test]
    fn setup_programs_entry_and_boot_core_mailbox() {
        let rig = Rig::new(CpuKind::XBurst);
        let ctx = rig.context();
        let ops = SmpOps::select(CpuKind::XBurst);

        // Stale state a bootloader might leave behind.
        rig.regs.write(xburst_mailbox(1), 0xdead);
        rig.regs.write(XBURST_CORE_STATUS, 0xff);
        rig.regs.write(XBURST_REIM, 0x1234_0000);

        (ops.smp_setup)(&ctx);

        let reim = rig.regs.read(XBURST_REIM);
        assert_eq!(reim & xburst::REIM_ENTRY_MASK, ENTRY);
        assert_ne!(reim & xburst::reim_mboxirq_m(0), 0);
        assert_eq!(rig.regs.read(xburst_mailbox(1)), 0);
        assert_eq!(rig.regs.read(XBURST_CORE_STATUS), 0);
        assert_ne!(rig.regs.read(CP0_STATUS) & ip::ip(3), 0);
        assert_eq!(ctx.running_mask(), CpuMask(0b1));
        assert_eq!(ctx.present_mask(), CpuMask(0b11));
    }

    #[test]
    fn xburst2_setup_programs_rer() {
        let rig = Rig::new(CpuKind::XBurst2);
        let ctx = rig.context();
        let ops = SmpOps::select(CpuKind::XBurst2);

        (ops.smp_setup)(&ctx);

        assert_eq!(rig.regs.read(CCU_RER), ENTRY);
        assert_ne!(rig.regs.read(CCU_MIMR) & xburst2::im(0), 0);
    }

    #[test]
    fn xburst_prepare_selects_reim_reset_pc() {
        let rig = Rig::new(CpuKind::XBurst);
        let ctx = rig.context();
        let ops = SmpOps::select(CpuKind::XBurst);

        (ops.prepare_cpus)(&ctx, 2);

        let ctrl = rig.regs.read(XBURST_CORE_CTRL);
        assert_ne!(ctrl & xburst::corectrl_rpc(0), 0);
        assert_ne!(ctrl & xburst::corectrl_rpc(1), 0);
        assert_eq!(rig.platform.shared_irq_requests(), 1);
    }

    #[test]
    fn xburst2_prepare_builds_descriptors_and_unmasks() {
        let rig = Rig::with_present(CpuKind::XBurst2, CpuMask(0b1111));
        let ctx = rig.context();
        let ops = SmpOps::select(CpuKind::XBurst2);

        (ops.prepare_cpus)(&ctx, 4);

        assert_eq!(ctx.mailboxes.get().map(|t| t.len()), Some(4));
        let pimr = rig.regs.read(CCU_PIMR);
        let oimr = rig.regs.read(CCU_OIMR);
        for cpu in 0..4 {
            assert_ne!(pimr & xburst2::im(cpu), 0);
            assert_ne!(oimr & xburst2::im(cpu), 0);
        }
        assert_eq!(rig.platform.percpu_irq_requests(), 1);
        assert_eq!(rig.platform.percpu_irq_enables(), 4);
    }

    #[test]
    fn boot_publishes_entry_before_reset_release() {
        let _serial = entry_test_lock();

        let rig = Rig::new(CpuKind::XBurst);
        let ctx = rig.leaked_context();
        let ops = SmpOps::select(CpuKind::XBurst);
        (ops.smp_setup)(ctx);

        // Park core 1 in reset so the observer sees the release edge.
        rig.regs
            .write(XBURST_CORE_CTRL, xburst::corectrl_swrst(1));

        let sp = 0xa5a5_1000;
        let gp = 0x5a5a_2000;
        let stop = Arc::new(AtomicBool::new(false));

        let observer = {
            let stop = stop.clone();
            let regs = rig.regs;
            std::thread::spawn(move || {
                while regs.read(XBURST_CORE_CTRL) & xburst::corectrl_swrst(1) != 0 {
                    if stop.load(Ordering::Relaxed) {
                        return (0, 0);
                    }
                    std::hint::spin_loop();
                }
                // The moment reset drops, the entry values must already
                // be visible.
                (
                    CPU_ENTRY_SP.load(Ordering::Acquire),
                    CPU_ENTRY_GP.load(Ordering::Acquire),
                )
            })
        };

        let res = (ops.boot_secondary)(ctx, 1, sp, gp);
        assert_eq!(res, Ok(()));

        stop.store(true, Ordering::Relaxed);
        let (seen_sp, seen_gp) = observer.join().unwrap();
        assert_eq!(seen_sp, sp);
        assert_eq!(seen_gp, gp);
        assert!(ctx.running_mask().contains(1));
    }

    #[test]
    fn boot_survives_clock_failure() {
        let _serial = entry_test_lock();

        let rig = Rig::new(CpuKind::XBurst);
        rig.platform.clock(1).fail_enable(true);
        let ctx = rig.context();
        let ops = SmpOps::select(CpuKind::XBurst);
        (ops.smp_setup)(&ctx);

        // A clock that will not gate on is logged and ignored; the core
        // may be clocked by other means.
        assert_eq!((ops.boot_secondary)(&ctx, 1, 0, 0), Ok(()));
        assert!(ctx.running_mask().contains(1));
        assert!(!rig.platform.clock(1).is_enabled());
    }

    #[test]
    fn boot_rejects_absent_cpu() {
        let rig = Rig::new(CpuKind::XBurst);
        let ctx = rig.context();
        let ops = SmpOps::select(CpuKind::XBurst);
        (ops.smp_setup)(&ctx);

        assert_eq!(
            (ops.boot_secondary)(&ctx, 3, 0, 0),
            Err(SmpError::NotPresent(3))
        );
    }

    #[test]
    fn init_secondary_records_physical_core() {
        let rig = Rig::with_present(CpuKind::XBurst2, CpuMask(0b1111));
        let ctx = rig.context();
        let ops = SmpOps::select(CpuKind::XBurst2);

        (ops.init_secondary)(&ctx, 3);
        assert_eq!(ctx.physical_core(3), 1);

        (ops.init_secondary)(&ctx, 1);
        assert_eq!(ctx.physical_core(1), 0);
    }

    #[test]
    fn finish_unmasks_mailbox_and_irq_lanes() {
        let rig = Rig::new(CpuKind::XBurst);
        let ctx = rig.context();
        let ops = SmpOps::select(CpuKind::XBurst);

        rig.regs.write(CP0_STATUS, ip::IP_MASK);
        (ops.smp_finish)(&ctx, 1);

        assert_ne!(rig.regs.read(XBURST_REIM) & xburst::reim_mboxirq_m(1), 0);
        let status = rig.regs.read(CP0_STATUS);
        assert_eq!(
            status & ip::IP_MASK,
            ip::ip(0) | ip::ip(1) | ip::ip(2) | ip::ip(3) | ip::ip(4)
        );
        assert_eq!(rig.platform.tick_broadcasts(), 1);
    }

    #[test]
    fn disable_reroutes_peripheral_irqs_to_boot_core() {
        let rig = Rig::new(CpuKind::XBurst);
        let ctx = rig.context();
        let ops = SmpOps::select(CpuKind::XBurst);

        rig.regs.write(XBURST_REIM, xburst::reim_irq_m(1));
        assert_eq!((ops.cpu_disable)(&ctx, 1), Ok(()));

        let reim = rig.regs.read(XBURST_REIM);
        assert_eq!(reim & xburst::reim_irq_m(1), 0);
        assert_ne!(reim & xburst::reim_irq_m(0), 0);
        assert!(!rig.platform.is_online(1));
        assert_eq!(rig.platform.foreign_map_calcs(), 1);
        assert_eq!(rig.platform.cleared_mm(), vec![1]);
    }

    #[test]
    fn xburst2_disable_reroutes_both_mask_registers() {
        let rig = Rig::new(CpuKind::XBurst2);
        let ctx = rig.context();
        let ops = SmpOps::select(CpuKind::XBurst2);

        rig.regs.write(CCU_PIMR, xburst2::im(1));
        rig.regs.write(CCU_OIMR, xburst2::im(1));
        assert_eq!((ops.cpu_disable)(&ctx, 1), Ok(()));

        assert_eq!(rig.regs.read(CCU_PIMR), xburst2::im(0));
        assert_eq!(rig.regs.read(CCU_OIMR), xburst2::im(0));
    }

    #[test]
    #[should_panic(expected = "failed to reach sleep state")]
    fn die_panics_when_spin_budget_exhausted() {
        let rig = Rig::new(CpuKind::XBurst);
        let mut config = Rig::default_config();
        config.die_spin_budget = Some(1_000);
        let ctx = rig.context_with(config);
        let ops = SmpOps::select(CpuKind::XBurst);

        // Nobody ever sets the sleep flag.
        (ops.cpu_die)(&ctx, 1);
    }

    #[test]
    fn full_secondary_lifecycle_powers_core_down() {
        let _serial = entry_test_lock();

        let rig = Rig::new(CpuKind::XBurst);
        rig.platform.park_on_wait(true);
        let ctx = rig.leaked_context();
        let ops = SmpOps::select(CpuKind::XBurst);

        (ops.smp_setup)(ctx);
        (ops.prepare_cpus)(ctx, 2);
        (ops.boot_secondary)(ctx, 1, 0xa000_1000, 0xa000_2000).unwrap();
        (ops.init_secondary)(ctx, 1);
        (ops.smp_finish)(ctx, 1);

        assert_eq!(ctx.running_mask(), CpuMask(0b11));
        assert!(rig.platform.clock(1).is_enabled());

        // The dying core parks itself; the boot core reaps it.
        std::thread::spawn(move || {
            (ops.play_dead)(ctx, 1);
        });

        (ops.cpu_disable)(ctx, 1).unwrap();
        (ops.cpu_die)(ctx, 1);

        assert_eq!(ctx.running_mask(), CpuMask(0b01));
        assert_ne!(
            rig.regs.read(XBURST_CORE_CTRL) & xburst::corectrl_swrst(1),
            0
        );
        assert!(!rig.platform.clock(1).is_enabled());
        assert!(!rig.platform.clock(1).is_prepared());
        // The parked core pushed its caches out before the clock gate hit.
        assert!(rig.lines.stats().index_writeback_inv_d > 0);
        assert!(rig.lines.stats().index_inv_i > 0);
    }

    #[test]
    fn xburst2_secondary_powers_down_leaving_dcache_to_live_sibling() {
        let _serial = entry_test_lock();

        let rig = Rig::new(CpuKind::XBurst2);
        rig.platform.park_on_wait(true);
        let ctx = rig.leaked_context();
        let ops = SmpOps::select(CpuKind::XBurst2);

        (ops.smp_setup)(ctx);
        (ops.prepare_cpus)(ctx, 2);
        (ops.boot_secondary)(ctx, 1, 0xa000_1000, 0xa000_2000).unwrap();
        (ops.init_secondary)(ctx, 1);
        (ops.smp_finish)(ctx, 1);
        assert_ne!(rig.regs.read(CCU_MIMR) & xburst2::im(1), 0);

        std::thread::spawn(move || {
            (ops.play_dead)(ctx, 1);
        });

        (ops.cpu_disable)(ctx, 1).unwrap();
        (ops.cpu_die)(ctx, 1);

        assert_eq!(ctx.running_mask(), CpuMask(0b01));
        assert_eq!(rig.platform.idle_exits(), 1);
        assert_eq!(rig.platform.tlb_flushes(), 1);
        // The dying core muzzled its own mailbox lane on the way out.
        assert_eq!(rig.regs.read(CCU_MIMR) & xburst2::im(1), 0);
        assert_ne!(rig.regs.read(CCU_CSRR) & xburst2::csrr_sre(1), 0);
        assert!(!rig.platform.clock(1).is_enabled());
        // Core 0 is the live SMT sibling; its D-cache stays warm.
        assert_eq!(rig.lines.stats().index_writeback_inv_d, 0);
    }

    #[test]
    fn xburst2_play_dead_drops_dcache_when_sibling_is_down() {
        let rig = Rig::with_present(CpuKind::XBurst2, CpuMask(0b111));
        rig.platform.park_on_wait(true);
        let ctx = rig.leaked_context();
        let ops = SmpOps::select(CpuKind::XBurst2);

        (ops.smp_setup)(ctx);
        (ops.prepare_cpus)(ctx, 3);

        // Core 2's sibling (core 3) is down, so the dying core must push
        // its D-cache out before the clock gate closes on the pair.
        std::thread::spawn(move || {
            (ops.play_dead)(ctx, 2);
        });

        (ops.cpu_die)(ctx, 2);

        assert_eq!(rig.platform.tlb_flushes(), 1);
        assert!(rig.lines.stats().index_writeback_inv_d > 0);
    }

    #[test]
    fn idle_wait_writes_back_only_dirty_lines() {
        let rig = Rig::new(CpuKind::XBurst);
        let ctx = rig.context();

        rig.lines.mark_dirty(0x8000_0040);
        rig.lines.mark_dirty(0x8000_0080);

        wait_irqoff(&ctx, 0);

        assert!(rig.lines.was_written_back(0x8000_0040));
        assert!(rig.lines.was_written_back(0x8000_0080));
        assert_eq!(rig.platform.waits(), 1);
        assert_eq!(rig.platform.irq_enables(), 1);
    }

    #[test]
    fn idle_wait_skipped_when_interrupt_pending() {
        let rig = Rig::new(CpuKind::XBurst);
        let ctx = rig.context();

        rig.regs.write(CP0_CAUSE, ip::ip(3));
        rig.regs.write(CP0_STATUS, ip::ip(3));

        wait_irqoff(&ctx, 0);

        assert_eq!(rig.platform.waits(), 0);
        assert_eq!(rig.lines.stats().index_load_tag_d, 0);
        // Interrupts come back on either way.
        assert_eq!(rig.platform.irq_enables(), 1);
    }

    #[test]
    fn idle_wait_skipped_when_resched_pending() {
        let rig = Rig::new(CpuKind::XBurst);
        let ctx = rig.context();

        rig.platform.set_need_resched(true);
        wait_irqoff(&ctx, 0);

        assert_eq!(rig.platform.waits(), 0);
        assert_eq!(rig.platform.irq_enables(), 1);
    }

    #[test]
    fn switch_irqcpu_steers_to_online_peer() {
        let rig = Rig::new(CpuKind::XBurst);
        let ctx = rig.context();

        rig.platform.set_cpu_online(1, true);
        rig.regs
            .write(XBURST_REIM, xburst::reim_irq_m(0) | xburst::reim_irq_m(1));

        switch_irqcpu(&ctx, 0);

        let reim = rig.regs.read(XBURST_REIM);
        assert_eq!(reim & xburst::reim_irq_m(0), 0);
        assert_ne!(reim & xburst::reim_irq_m(1), 0);
    }

    #[test]
    #[should_panic(expected = "Unknown Ingenic CPU type")]
    fn unknown_generation_has_no_ops_table() {
        let _ = SmpOps::select(CpuKind::Unknown(0x00aa_1234));
    }

    #[test]
    #[should_panic(expected = "Unknown Ingenic CPU type")]
    fn unknown_generation_has_no_context() {
        let rig = Rig::new(CpuKind::XBurst);
        let _ = rig.context_as(CpuKind::Unknown(0x00aa_1234));
    }
}
