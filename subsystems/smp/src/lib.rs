//! # XBurst SMP Subsystem
//!
//! Multi-core bring-up, hotplug and inter-processor interrupts for Ingenic
//! XBurst and XBurst2 SoCs, built on the register and cache layers of
//! `xburst-hal`.
//!
//! ## Layout
//!
//! | Module        | Contents                                             |
//! |---------------|------------------------------------------------------|
//! | [`context`]   | [`SmpContext`]: registers, ports and shared state    |
//! | [`ports`]     | traits the embedder implements (clocks, IRQs, ...)   |
//! | [`ipi`]       | mailbox send/receive paths                           |
//! | [`lifecycle`] | the [`SmpOps`] table: setup, boot, hotplug, idle     |
//!
//! ## Usage shape
//!
//! ```ignore
//! let kind = CpuKind::from_prid(regs.read(CP0_PRID));
//! let ops = SmpOps::select(kind);
//! let ctx = SmpContext::new(kind, &regs, &cache, &enumr, &irq, &ipi, &hooks, &wait, config);
//!
//! (ops.smp_setup)(&ctx);
//! (ops.prepare_cpus)(&ctx, max_cpus);
//! (ops.boot_secondary)(&ctx, 1, sp, gp)?;
//! ```
//!
//! The generation is validated twice, both fatally: once when the context
//! is built and once when the operation table is selected. Past those two
//! points the subsystem never falls into an "unknown CPU" path again.

#![cfg_attr(not(test), no_std)]

pub mod context;
pub mod ipi;
pub mod lifecycle;
pub mod ports;

#[cfg(test)]
mod testutil;

pub use context::{CpuMask, SmpConfig, SmpContext, CPU_ENTRY_GP, CPU_ENTRY_SP};
pub use ipi::IpiAction;
pub use lifecycle::{wait_irqoff, switch_irqcpu, SmpError, SmpOps};
