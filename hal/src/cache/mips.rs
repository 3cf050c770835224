//! Real MIPS `cache` instruction backend.
//!
//! Op encodings follow the MIPS32 cache-instruction format: bits [1:0]
//! select the cache (I/D/SD), bits [4:2] the operation.

use core::arch::asm;

use super::CacheLineOps;

macro_rules! cache_op {
    ($op:literal, $addr:expr) => {
        unsafe {
            asm!(
                ".set push",
                ".set mips32r2",
                concat!("cache ", $op, ", 0({0})"),
                ".set pop",
                in(reg) $addr,
                options(nostack)
            );
        }
    };
}

/// Cache-line operations issued against the running core's caches.
pub struct MipsCacheOps;

impl CacheLineOps for MipsCacheOps {
    fn index_load_tag_d(&self, addr: usize) -> u32 {
        let tag: u32;
        // The mfc0 follows the cache op back-to-back so TagLo cannot be
        // clobbered by an intervening cache access.
        unsafe {
            asm!(
                ".set push",
                ".set noreorder",
                ".set mips32r2",
                "cache 0x05, 0({addr})",
                "mfc0 {tag}, $28, 0",
                ".set pop",
                addr = in(reg) addr,
                tag = out(reg) tag,
                options(nostack)
            );
        }
        tag
    }

    fn index_writeback_inv_d(&self, addr: usize) {
        cache_op!("0x01", addr);
    }

    fn index_inv_i(&self, addr: usize) {
        cache_op!("0x00", addr);
    }

    fn index_writeback_inv_s(&self, addr: usize) {
        cache_op!("0x03", addr);
    }

    fn hit_writeback_inv_d(&self, addr: usize) {
        cache_op!("0x15", addr);
    }

    fn hit_inv_d(&self, addr: usize) {
        cache_op!("0x11", addr);
    }

    fn hit_inv_i(&self, addr: usize) {
        cache_op!("0x10", addr);
    }

    fn hit_writeback_inv_s(&self, addr: usize) {
        cache_op!("0x17", addr);
    }

    fn hit_inv_s(&self, addr: usize) {
        cache_op!("0x13", addr);
    }

    // The protected variants rely on the embedder routing cache-op faults
    // past the instruction (exception-table fixup); the encodings are the
    // plain hit ops.

    fn protected_hit_writeback_inv_d(&self, addr: usize) {
        cache_op!("0x15", addr);
    }

    fn protected_hit_inv_i(&self, addr: usize) {
        cache_op!("0x10", addr);
    }
}
