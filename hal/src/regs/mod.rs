//! # XBurst Control Registers
//!
//! Typed access to the SMP control registers of both XBurst generations.
//!
//! ## Two register spaces
//!
//! | Generation | Space                           | Examples                     |
//! |------------|---------------------------------|------------------------------|
//! | XBurst     | CP0 custom coprocessor regs     | CoreCtrl $12.2, Mailbox $20.n|
//! | XBurst2    | memory-mapped CCU block         | CSRR +0x40, MBR0 +0x1000     |
//!
//! A [`Register`] names a location in either space; a [`RegisterFile`]
//! performs the actual 32-bit access. Reads and writes are whole-register,
//! callers read-modify-write for partial updates. Accesses are infallible:
//! touching a register that does not exist on the running part is a
//! programming error, not a runtime error.

mod sim;

cfg_if::cfg_if! {
    if #[cfg(target_arch = "mips")] {
        mod mips;
        pub use mips::MipsRegisterFile;
    }
}

pub use sim::SimRegisterFile;

// ============================================================================
// CPU generations
// ============================================================================

/// The two supported XBurst core generations, plus the unrecognized case.
///
/// The generation decides the whole register layout, so an `Unknown` tag is
/// rejected fatally at strategy-construction time; there is no safe default
/// layout to fall back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuKind {
    /// Original XBurst cores (JZ47xx, X1000): CP0-based SMP control, up to
    /// four cores, no SMT.
    XBurst,
    /// XBurst2 cores (X2000 and later): CCU-based SMP control, two hardware
    /// threads per physical core.
    XBurst2,
    /// Anything else; carries the raw PRId value for diagnostics.
    Unknown(u32),
}

impl CpuKind {
    /// Company field of an Ingenic PRId (either ID Ingenic has shipped).
    const COMPANY_INGENIC_D0: u32 = 0xd0;
    const COMPANY_INGENIC_E1: u32 = 0xe1;

    /// Classify a raw CP0 PRId value.
    pub const fn from_prid(prid: u32) -> Self {
        let company = (prid >> 16) & 0xff;
        if company != Self::COMPANY_INGENIC_D0 && company != Self::COMPANY_INGENIC_E1 {
            return Self::Unknown(prid);
        }

        match prid & 0xff00 {
            0x0200 | 0x1200 => Self::XBurst,
            0x2000 => Self::XBurst2,
            _ => Self::Unknown(prid),
        }
    }

    /// Hardware threads per physical core.
    pub const fn threads_per_core(self) -> usize {
        match self {
            Self::XBurst2 => 2,
            _ => 1,
        }
    }
}

// ============================================================================
// Register naming
// ============================================================================

/// A 32-bit SMP control register in one of the two hardware spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    /// CP0 coprocessor register, addressed by number and select.
    Cp0 { reg: u8, sel: u8 },
    /// Memory-mapped register, addressed by byte offset from the CCU base.
    Mmio { offset: u32 },
}

// --- Architectural CP0 registers shared by both generations ---

/// CP0 Status ($12.0).
pub const CP0_STATUS: Register = Register::Cp0 { reg: 12, sel: 0 };
/// CP0 Cause ($13.0).
pub const CP0_CAUSE: Register = Register::Cp0 { reg: 13, sel: 0 };
/// CP0 PRId ($15.0).
pub const CP0_PRID: Register = Register::Cp0 { reg: 15, sel: 0 };
/// CP0 Config ($16.0).
pub const CP0_CONFIG: Register = Register::Cp0 { reg: 16, sel: 0 };
/// CP0 Config1 ($16.1) - L1 cache geometry.
pub const CP0_CONFIG1: Register = Register::Cp0 { reg: 16, sel: 1 };
/// CP0 Config2 ($16.2) - L2 cache geometry.
pub const CP0_CONFIG2: Register = Register::Cp0 { reg: 16, sel: 2 };
/// CP0 TagLo ($28.0) - tag read back by index-load-tag cache ops.
pub const CP0_TAGLO: Register = Register::Cp0 { reg: 28, sel: 0 };
/// CP0 ErrCtl ($26.0) - Ingenic write-strategy erratum control.
pub const CP0_ERRCTL: Register = Register::Cp0 { reg: 26, sel: 0 };

// --- XBurst SMP registers (CP0 custom space) ---

/// Core Control ($12.2): software resets, reset-PC selects, sleep masks.
pub const XBURST_CORE_CTRL: Register = Register::Cp0 { reg: 12, sel: 2 };
/// Core Status ($12.3): sleep states and pending mailbox/peripheral IRQs.
pub const XBURST_CORE_STATUS: Register = Register::Cp0 { reg: 12, sel: 3 };
/// Reset Entry & IRQ Mask ($12.4).
pub const XBURST_REIM: Register = Register::Cp0 { reg: 12, sel: 4 };

/// Per-core CP0 mailbox ($20.n). Only four exist in hardware.
pub const fn xburst_mailbox(cpu: usize) -> Register {
    Register::Cp0 {
        reg: 20,
        sel: cpu as u8,
    }
}

// --- XBurst2 SMP registers (CCU block, byte offsets) ---

/// Physical base address of the CCU register block.
pub const CCU_PHYS_BASE: u32 = 0x1220_0000;

/// Core Sleep Status register.
pub const CCU_CSSR: Register = Register::Mmio { offset: 0x20 };
/// Core Software Reset register.
pub const CCU_CSRR: Register = Register::Mmio { offset: 0x40 };
/// Memory Subsystem Control register.
pub const CCU_MSCR: Register = Register::Mmio { offset: 0x60 };
/// Peripheral IRQ Mask register.
pub const CCU_PIMR: Register = Register::Mmio { offset: 0x120 };
/// Mailbox IRQ Mask register.
pub const CCU_MIMR: Register = Register::Mmio { offset: 0x160 };
/// OST (timer) IRQ Mask register.
pub const CCU_OIMR: Register = Register::Mmio { offset: 0x1a0 };
/// Reset Entry Register: address secondary cores fetch from out of reset.
pub const CCU_RER: Register = Register::Mmio { offset: 0xf00 };

/// Byte offset of core `cpu`'s CCU mailbox register.
pub const CCU_MAILBOX_OFFSET: u32 = 0x1000;

/// Per-core CCU mailbox register.
pub const fn ccu_mailbox(cpu: usize) -> Register {
    Register::Mmio {
        offset: CCU_MAILBOX_OFFSET + (cpu as u32) * 4,
    }
}

// ============================================================================
// Bit lanes
// ============================================================================

/// XBurst CoreCtrl/CoreStatus/REIM bit lanes. Each lane packs one bit per
/// core, with a fixed lane base; e.g. SWRST occupies bits 0..=1, SLEEP
/// bits 16..=17.
pub mod xburst {
    /// CoreCtrl: software reset for `cpu`.
    pub const fn corectrl_swrst(cpu: usize) -> u32 {
        1 << cpu
    }

    /// CoreCtrl: take the reset PC from REIM for `cpu`.
    pub const fn corectrl_rpc(cpu: usize) -> u32 {
        0x100 << cpu
    }

    /// CoreCtrl: sleep mask for `cpu`.
    pub const fn corectrl_sleepm(cpu: usize) -> u32 {
        0x1_0000 << cpu
    }

    /// CoreStatus: mailbox IRQ pending for `cpu`.
    pub const fn corestatus_mirq(cpu: usize) -> u32 {
        1 << cpu
    }

    /// CoreStatus: peripheral IRQ pending for `cpu`.
    pub const fn corestatus_irq(cpu: usize) -> u32 {
        0x100 << cpu
    }

    /// CoreStatus: `cpu` has reached its sleep state.
    pub const fn corestatus_sleep(cpu: usize) -> u32 {
        0x1_0000 << cpu
    }

    /// REIM: mailbox IRQ unmask for `cpu`.
    pub const fn reim_mboxirq_m(cpu: usize) -> u32 {
        1 << cpu
    }

    /// REIM: peripheral IRQ routing to `cpu`.
    pub const fn reim_irq_m(cpu: usize) -> u32 {
        0x100 << cpu
    }

    /// REIM: reset entry point lane (top 16 bits of the entry address).
    pub const REIM_ENTRY_MASK: u32 = 0xffff << 16;

    /// Mask of the low CoreStatus byte holding the per-core MIRQ bits.
    pub const CORESTATUS_MIRQ_MASK: u32 = 0xff;
}

/// XBurst2 CCU bit lanes: one bit per core at bit 0 of each lane.
pub mod xburst2 {
    /// CSSR: core `cpu` is asleep.
    pub const fn cssr_ss(cpu: usize) -> u32 {
        1 << cpu
    }

    /// CSRR: software reset enable for core `cpu`.
    pub const fn csrr_sre(cpu: usize) -> u32 {
        1 << cpu
    }

    /// PIMR/MIMR/OIMR: interrupt unmask for core `cpu`.
    pub const fn im(cpu: usize) -> u32 {
        1 << cpu
    }

    bitflags::bitflags! {
        /// Memory Subsystem Control register bits.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Mscr: u32 {
            /// L2 cache disabled by firmware.
            const DISL2C = 1 << 0;
            /// L2 prefetch unit disable.
            const DISPFB2 = 1 << 1;
            /// L1 prefetch unit disable.
            const DISPFB1 = 1 << 2;
            /// QoS enable.
            const QOSE = 1 << 3;
            /// Run the L2 at half size.
            const L2SIZE_HALF = 1 << 8;
            /// Run the L2 at quarter size.
            const L2SIZE_QTR = 1 << 9;
            /// Prefetch source select.
            const PSEL = 1 << 24;
        }
    }
}

/// Architectural Status/Cause interrupt-pending lanes (IP0..IP7 at bit 8).
pub mod ip {
    /// Interrupt-pending/mask field in Status and Cause.
    pub const IP_MASK: u32 = 0xff00;

    /// Single IP bit `n` (0..=7).
    pub const fn ip(n: usize) -> u32 {
        0x100 << n
    }
}

/// Config/Config1/TagLo/ErrCtl fields used by the cache engine.
pub mod cache_fields {
    /// Config1 "Config2 exists" continuation bit.
    pub const CONFIG1_M: u32 = 1 << 31;

    /// Ingenic-specific dirty bits in TagLo after an index-load-tag-D.
    pub const TAGLO_DIRTY_MASK: u32 = 0xc;

    /// ErrCtl write-strategy bit. Set around hardware invalidate-only
    /// operations to keep them from corrupting unrelated dirty lines.
    pub const ERRCTL_WST: u32 = 1 << 29;

    /// ErrCtl value enabling the invalidate workaround.
    pub const ERRCTL_WST_EN: u32 = ERRCTL_WST;
    /// ErrCtl value disabling it.
    pub const ERRCTL_WST_DIS: u32 = 0;
}

static_assertions::const_assert_eq!(xburst::corectrl_sleepm(1), 0x2_0000);
static_assertions::const_assert_eq!(xburst::reim_irq_m(1), 0x200);
static_assertions::const_assert_eq!(ip::ip(3), 0x800);

// ============================================================================
// Register file
// ============================================================================

/// 32-bit access to the SMP control registers.
///
/// Implementations: the real MIPS backend (CP0 move instructions plus
/// volatile MMIO, `target_arch = "mips"` only) and [`SimRegisterFile`].
pub trait RegisterFile: Sync {
    /// Read the full register.
    fn read(&self, reg: Register) -> u32;

    /// Write the full register.
    fn write(&self, reg: Register, val: u32);

    /// Read-modify-write: clear `clear`, then set `set`.
    ///
    /// Not atomic; callers serialize access with the SMP lock.
    fn modify(&self, reg: Register, set: u32, clear: u32) {
        let val = self.read(reg);
        self.write(reg, (val & !clear) | set);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prid_classification() {
        // JZ4780-style PRId: Ingenic company, XBurst implementation.
        assert_eq!(CpuKind::from_prid(0x00d0_0201), CpuKind::XBurst);
        assert_eq!(CpuKind::from_prid(0x00e1_1200), CpuKind::XBurst);
        // X2000-style PRId.
        assert_eq!(CpuKind::from_prid(0x00d0_2000), CpuKind::XBurst2);
        // Non-Ingenic company is never recognized.
        assert_eq!(
            CpuKind::from_prid(0x0001_0200),
            CpuKind::Unknown(0x0001_0200)
        );
    }

    #[test]
    fn mailbox_addressing() {
        assert_eq!(xburst_mailbox(2), Register::Cp0 { reg: 20, sel: 2 });
        assert_eq!(ccu_mailbox(3), Register::Mmio { offset: 0x100c });
    }

    #[test]
    fn lane_layout_matches_hardware() {
        assert_eq!(xburst::corectrl_swrst(1), 0x2);
        assert_eq!(xburst::corestatus_sleep(0), 0x1_0000);
        assert_eq!(xburst::reim_mboxirq_m(1), 0x2);
        assert_eq!(xburst2::cssr_ss(15), 0x8000);
        assert_eq!(xburst2::Mscr::DISL2C.bits(), 1);
    }

    #[test]
    fn modify_is_read_modify_write() {
        let regs = SimRegisterFile::new();
        regs.write(XBURST_CORE_CTRL, 0x0f00);
        regs.modify(XBURST_CORE_CTRL, 0x1, 0x0100);
        assert_eq!(regs.read(XBURST_CORE_CTRL), 0x0e01);
    }
}
