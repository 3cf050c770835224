//! Dirty-line-only D-cache writeback.
//!
//! Writing back the whole D-cache on every idle transition costs far more
//! than the cache is usually worth: most lines are clean. This engine loads
//! the tag at each (way, index) slot, checks the Ingenic-specific dirty bits
//! and only issues the writeback+invalidate for lines that are actually
//! dirty.
//!
//! Two constraints carry over from the hardware sequence:
//!
//! - nothing may touch the cache between a line's tag load and its
//!   conditional writeback (the line could be re-dirtied or migrate), so
//!   the per-line pair is issued back-to-back with no other cache-affecting
//!   operation in between;
//! - the caller runs with local interrupts disabled for the whole sweep.

use crate::regs::cache_fields::TAGLO_DIRTY_MASK;

use super::{CacheGeometry, CacheLineOps};

/// Write back and invalidate exactly the dirty lines of the D-cache.
pub fn wback_dirty_dcache(lines: &dyn CacheLineOps, geom: &CacheGeometry) {
    let start = geom.index_base;
    let end = start + geom.way_size;
    let ws_inc = 1usize << geom.way_bit;
    let ws_end = geom.ways << geom.way_bit;

    let mut ws = 0;
    while ws < ws_end {
        let mut addr = start;
        while addr < end {
            let slot = addr | ws;
            let tag = lines.index_load_tag_d(slot);
            if tag & TAGLO_DIRTY_MASK != 0 {
                lines.index_writeback_inv_d(slot);
            }
            addr += geom.line_size;
        }
        ws += ws_inc;
    }
}
