//! Memory barriers and the low-power `wait` primitive.
//!
//! On MIPS these are `sync`/`wait` instructions; on the host build they
//! lower to atomic fences so the portable logic stays exercisable.

use core::sync::atomic::{fence, Ordering};

cfg_if::cfg_if! {
    if #[cfg(target_arch = "mips")] {
        /// Full hardware sync barrier.
        #[inline]
        pub fn sync() {
            unsafe {
                core::arch::asm!("sync", options(nostack, preserves_flags));
            }
        }

        /// Barrier-guarded low-power wait. The `sync` makes every prior
        /// store globally visible before the clock gates close.
        #[inline]
        pub fn sync_and_wait() {
            unsafe {
                core::arch::asm!(
                    ".set push",
                    ".set mips32r2",
                    "sync",
                    "wait",
                    ".set pop",
                    options(nostack, preserves_flags)
                );
            }
        }
    } else {
        /// Full hardware sync barrier (host: sequentially-consistent fence).
        #[inline]
        pub fn sync() {
            fence(Ordering::SeqCst);
        }

        /// Barrier-guarded low-power wait (host: fence plus a spin hint).
        #[inline]
        pub fn sync_and_wait() {
            fence(Ordering::SeqCst);
            core::hint::spin_loop();
        }
    }
}

/// Write memory barrier: all prior stores are globally visible before any
/// later store. This orders the entry SP/GP publication against the
/// reset-deassert write in `boot_secondary`.
#[inline]
pub fn wmb() {
    fence(Ordering::Release);
    #[cfg(target_arch = "mips")]
    sync();
}
