//! # IPI Mailboxes
//!
//! Cross-core kicks are delivered through per-core 32-bit mailbox
//! registers: the sender ORs an action bit into the target's mailbox, the
//! hardware raises the mailbox interrupt on the target, and the target's
//! handler reads the accumulated bits, clears the register, and dispatches
//! each action exactly once.
//!
//! The two generations differ only in where the mailboxes live and how they
//! are serialised:
//!
//! | Generation | Mailboxes             | Serialisation               |
//! |------------|-----------------------|-----------------------------|
//! | XBurst     | CP0 $20.0..$20.3      | the one global SMP lock     |
//! | XBurst2    | CCU MBR0..MBRn (MMIO) | one lock per mailbox        |

use xburst_hal::regs::{xburst, xburst_mailbox, RegisterFile, XBURST_CORE_STATUS};

use crate::context::{CpuMask, SmpContext};

/// Number of CP0 mailbox registers the original XBurst parts implement.
pub(crate) const XBURST_MAILBOX_COUNT: usize = 4;

bitflags::bitflags! {
    /// Actions a sender may OR into a mailbox. Multiple sends coalesce;
    /// each set bit is dispatched once per handler invocation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IpiAction: u32 {
        /// Ask the target's scheduler to reschedule.
        const RESCHEDULE = 1 << 0;
        /// Run the target's queued cross-call functions.
        const CALL_FUNCTION = 1 << 1;
    }
}

// ============================================================================
// Send paths
// ============================================================================

pub(crate) fn xburst_send_ipi_single(ctx: &SmpContext<'_>, cpu: usize, action: IpiAction) {
    assert!(
        cpu < XBURST_MAILBOX_COUNT,
        "No mailbox register for CPU {}",
        cpu
    );

    let _guard = ctx.smp_lock.lock();
    let reg = xburst_mailbox(cpu);
    let val = ctx.regs.read(reg);
    ctx.regs.write(reg, val | action.bits());
}

pub(crate) fn xburst_send_ipi_mask(ctx: &SmpContext<'_>, mask: CpuMask, action: IpiAction) {
    for cpu in mask.iter() {
        xburst_send_ipi_single(ctx, cpu, action);
    }
}

pub(crate) fn xburst2_send_ipi_single(ctx: &SmpContext<'_>, cpu: usize, action: IpiAction) {
    let mailboxes = ctx
        .mailboxes
        .get()
        .expect("IPI sent before SMP prepare built the mailbox descriptors");
    let desc = &mailboxes[cpu];

    let _guard = desc.lock.lock();
    let val = ctx.regs.read(desc.reg);
    ctx.regs.write(desc.reg, val | action.bits());
}

pub(crate) fn xburst2_send_ipi_mask(ctx: &SmpContext<'_>, mask: CpuMask, action: IpiAction) {
    for cpu in mask.iter() {
        xburst2_send_ipi_single(ctx, cpu, action);
    }
}

// ============================================================================
// Receive paths
// ============================================================================

/// Dispatch the accumulated action bits, outside any mailbox lock.
fn dispatch(ctx: &SmpContext<'_>, cpu: usize, action: u32) {
    if action == 0 {
        // An interrupt fired but the mailbox was already empty; either a
        // hardware glitch or a send/clear race worth knowing about.
        log::error!("CPU {}: spurious mailbox IRQ, no action pending", cpu);
        return;
    }

    if action & IpiAction::RESCHEDULE.bits() != 0 {
        ctx.ipi_target.scheduler_ipi();
    }
    if action & IpiAction::CALL_FUNCTION.bits() != 0 {
        ctx.ipi_target.call_function_interrupt();
    }
}

/// XBurst mailbox interrupt handler for `cpu`.
///
/// Reads and clears the mailbox and acknowledges the pending bit in
/// CoreStatus under the global lock, then dispatches with the lock
/// dropped so the scheduler callbacks may themselves send IPIs.
pub(crate) fn xburst_mailbox_irq(ctx: &SmpContext<'_>, cpu: usize) {
    assert!(
        cpu < XBURST_MAILBOX_COUNT,
        "No mailbox register for CPU {}",
        cpu
    );

    let action = {
        let _guard = ctx.smp_lock.lock();
        let reg = xburst_mailbox(cpu);
        let val = ctx.regs.read(reg);
        ctx.regs.write(reg, 0);
        // Acknowledge the pending flag, or the line stays asserted.
        ctx.regs
            .modify(XBURST_CORE_STATUS, 0, xburst::corestatus_mirq(cpu));
        val
    };

    dispatch(ctx, cpu, action);
}

/// XBurst2 mailbox interrupt handler for `cpu`.
pub(crate) fn xburst2_mailbox_irq(ctx: &SmpContext<'_>, cpu: usize) {
    let mailboxes = ctx
        .mailboxes
        .get()
        .expect("mailbox IRQ before SMP prepare built the descriptors");
    let desc = &mailboxes[cpu];

    let action = {
        let _guard = desc.lock.lock();
        let val = ctx.regs.read(desc.reg);
        ctx.regs.write(desc.reg, 0);
        val
    };

    dispatch(ctx, cpu, action);
}

// ============================================================================
// Tests
// ============================================================================
