//! Real MIPS register backend.
//!
//! CP0 moves need register number and select encoded in the instruction, so
//! the dynamic [`Register`] value dispatches over the known set. Reaching
//! the fallthrough arm means code asked for a register this layer never
//! defined, which is a programming error.

use core::arch::asm;

use super::{Register, RegisterFile};

macro_rules! read_c0 {
    ($reg:literal, $sel:literal) => {{
        let val: u32;
        unsafe {
            asm!(
                concat!("mfc0 {0}, $", $reg, ", ", $sel),
                out(reg) val,
                options(nomem, nostack, preserves_flags)
            );
        }
        val
    }};
}

macro_rules! write_c0 {
    ($reg:literal, $sel:literal, $val:expr) => {{
        unsafe {
            asm!(
                concat!("mtc0 {0}, $", $reg, ", ", $sel),
                in(reg) $val,
                options(nomem, nostack, preserves_flags)
            );
        }
    }};
}

/// Register file over the running core's CP0 space and the CCU MMIO block.
pub struct MipsRegisterFile {
    /// Virtual (uncached, KSEG1) base of the CCU block.
    ccu_base: *mut u32,
}

// The CCU block is shared hardware state; serialization is the caller's
// responsibility (the SMP lock).
unsafe impl Sync for MipsRegisterFile {}
unsafe impl Send for MipsRegisterFile {}

impl MipsRegisterFile {
    /// # Safety
    ///
    /// `ccu_base` must be the uncached mapping of the CCU register block
    /// and remain valid for the life of the register file.
    pub const unsafe fn new(ccu_base: *mut u32) -> Self {
        Self { ccu_base }
    }

    fn mmio_ptr(&self, offset: u32) -> *mut u32 {
        // Offsets are always word-aligned register offsets.
        self.ccu_base.wrapping_byte_add(offset as usize)
    }
}

impl RegisterFile for MipsRegisterFile {
    fn read(&self, reg: Register) -> u32 {
        match reg {
            Register::Cp0 { reg: 12, sel: 0 } => read_c0!(12, 0),
            Register::Cp0 { reg: 12, sel: 2 } => read_c0!(12, 2),
            Register::Cp0 { reg: 12, sel: 3 } => read_c0!(12, 3),
            Register::Cp0 { reg: 12, sel: 4 } => read_c0!(12, 4),
            Register::Cp0 { reg: 13, sel: 0 } => read_c0!(13, 0),
            Register::Cp0 { reg: 15, sel: 0 } => read_c0!(15, 0),
            Register::Cp0 { reg: 16, sel: 0 } => read_c0!(16, 0),
            Register::Cp0 { reg: 16, sel: 1 } => read_c0!(16, 1),
            Register::Cp0 { reg: 16, sel: 2 } => read_c0!(16, 2),
            Register::Cp0 { reg: 20, sel: 0 } => read_c0!(20, 0),
            Register::Cp0 { reg: 20, sel: 1 } => read_c0!(20, 1),
            Register::Cp0 { reg: 20, sel: 2 } => read_c0!(20, 2),
            Register::Cp0 { reg: 20, sel: 3 } => read_c0!(20, 3),
            Register::Cp0 { reg: 26, sel: 0 } => read_c0!(26, 0),
            Register::Cp0 { reg: 28, sel: 0 } => read_c0!(28, 0),
            Register::Cp0 { reg, sel } => {
                panic!("read of undefined CP0 register ${}.{}", reg, sel)
            }
            Register::Mmio { offset } => unsafe {
                core::ptr::read_volatile(self.mmio_ptr(offset))
            },
        }
    }

    fn write(&self, reg: Register, val: u32) {
        match reg {
            Register::Cp0 { reg: 12, sel: 0 } => write_c0!(12, 0, val),
            Register::Cp0 { reg: 12, sel: 2 } => write_c0!(12, 2, val),
            Register::Cp0 { reg: 12, sel: 3 } => write_c0!(12, 3, val),
            Register::Cp0 { reg: 12, sel: 4 } => write_c0!(12, 4, val),
            Register::Cp0 { reg: 13, sel: 0 } => write_c0!(13, 0, val),
            Register::Cp0 { reg: 16, sel: 0 } => write_c0!(16, 0, val),
            Register::Cp0 { reg: 20, sel: 0 } => write_c0!(20, 0, val),
            Register::Cp0 { reg: 20, sel: 1 } => write_c0!(20, 1, val),
            Register::Cp0 { reg: 20, sel: 2 } => write_c0!(20, 2, val),
            Register::Cp0 { reg: 20, sel: 3 } => write_c0!(20, 3, val),
            Register::Cp0 { reg: 26, sel: 0 } => write_c0!(26, 0, val),
            Register::Cp0 { reg: 28, sel: 0 } => write_c0!(28, 0, val),
            Register::Cp0 { reg, sel } => {
                panic!("write of undefined CP0 register ${}.{}", reg, sel)
            }
            Register::Mmio { offset } => unsafe {
                core::ptr::write_volatile(self.mmio_ptr(offset), val)
            },
        }
    }
}
