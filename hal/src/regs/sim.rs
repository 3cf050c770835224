//! Simulated register file.
//!
//! Backs the whole register space with a fixed-capacity map so unit tests
//! (and host-side bring-up rehearsal) can run the SMP and cache code without
//! silicon. Every register resets to zero; tests preset the values a probe
//! or lifecycle operation expects to find.

use heapless::FnvIndexMap;
use spin::Mutex;

use super::{Register, RegisterFile};

/// Upper bound on distinct registers a test can touch.
const SIM_CAPACITY: usize = 64;

/// A register file over plain memory instead of CP0/MMIO hardware.
pub struct SimRegisterFile {
    regs: Mutex<FnvIndexMap<Register, u32, SIM_CAPACITY>>,
}

impl SimRegisterFile {
    /// All registers in reset state (zero).
    pub fn new() -> Self {
        Self {
            regs: Mutex::new(FnvIndexMap::new()),
        }
    }
}

impl Default for SimRegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile for SimRegisterFile {
    fn read(&self, reg: Register) -> u32 {
        *self.regs.lock().get(&reg).unwrap_or(&0)
    }

    fn write(&self, reg: Register, val: u32) {
        if self.regs.lock().insert(reg, val).is_err() {
            // Capacity exhausted: a test is touching more registers than
            // any supported SoC exposes.
            panic!("SimRegisterFile capacity exceeded at {:?}", reg);
        }
    }
}
