//! # XBurst Hardware Abstraction Layer
//!
//! Register access and cache control for Ingenic XBurst/XBurst2 MIPS SoCs.
//!
//! ## Components
//!
//! - **regs**: typed accessors over CP0 coprocessor registers (XBurst) and
//!   the memory-mapped Core Control Unit block (XBurst2)
//! - **cache**: cache-geometry probing, whole/range maintenance operations,
//!   DMA coherency and the dirty-line-only writeback engine
//! - **barrier**: memory barriers and the low-power `wait` primitive
//!
//! ## Hardware vs. simulation
//!
//! Everything that touches silicon sits behind a trait (`RegisterFile`,
//! `CacheLineOps`) with a real MIPS backend compiled only for
//! `target_arch = "mips"` and a simulated backend that is always available.
//! The simulated backends are what the test suites of this workspace drive.

#![cfg_attr(not(test), no_std)]
// Inline asm on MIPS is still gated; only the hardware backends need it.
#![cfg_attr(target_arch = "mips", feature(asm_experimental_arch))]

pub mod barrier;
pub mod cache;
pub mod regs;

// Re-export commonly used items
pub use cache::{CacheController, CacheGeometry, CacheLineOps, SocVariant};
pub use regs::{CpuKind, Register, RegisterFile, SimRegisterFile};

/// Maximum number of logical CPUs any supported SoC exposes.
///
/// The XBurst2 CCU register lanes (CSSR/CSRR/PIMR/MIMR/OIMR) are 16 bits
/// wide; the XBurst CP0 mailbox scheme supports fewer (see `xburst-smp`).
pub const MAX_CPUS: usize = 16;
