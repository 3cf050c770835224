//! Synthetic cache model.
//!
//! Implements [`CacheLineOps`] against an in-memory model of per-line dirty
//! state and records exactly which operations were issued. The writeback
//! and maintenance tests use it to assert instruction-issue counts; the SMP
//! lifecycle tests use it to observe the play-dead path dropping its caches.

use heapless::FnvIndexMap;
use spin::Mutex;

use crate::regs::cache_fields::TAGLO_DIRTY_MASK;

use super::CacheLineOps;

/// Enough slots for a 4-way x 32-set model plus slack.
const LINE_CAPACITY: usize = 256;

/// Issue counts per cache operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyntheticCacheStats {
    pub index_load_tag_d: usize,
    pub index_writeback_inv_d: usize,
    pub index_inv_i: usize,
    pub index_writeback_inv_s: usize,
    pub hit_writeback_inv_d: usize,
    pub hit_inv_d: usize,
    pub hit_inv_i: usize,
    pub hit_writeback_inv_s: usize,
    pub hit_inv_s: usize,
    pub protected_hit_writeback_inv_d: usize,
    pub protected_hit_inv_i: usize,
}

impl SyntheticCacheStats {
    /// Total operations issued.
    pub fn total(&self) -> usize {
        self.index_load_tag_d
            + self.index_writeback_inv_d
            + self.index_inv_i
            + self.index_writeback_inv_s
            + self.hit_writeback_inv_d
            + self.hit_inv_d
            + self.hit_inv_i
            + self.hit_writeback_inv_s
            + self.hit_inv_s
            + self.protected_hit_writeback_inv_d
            + self.protected_hit_inv_i
    }
}

struct Model {
    stats: SyntheticCacheStats,
    dirty: FnvIndexMap<usize, (), LINE_CAPACITY>,
    written_back: FnvIndexMap<usize, (), LINE_CAPACITY>,
}

/// A recording stand-in for the hardware `cache` instruction.
pub struct SyntheticCache {
    model: Mutex<Model>,
}

impl SyntheticCache {
    /// Empty model: every line clean, no operations recorded.
    pub fn new() -> Self {
        Self {
            model: Mutex::new(Model {
                stats: SyntheticCacheStats::default(),
                dirty: FnvIndexMap::new(),
                written_back: FnvIndexMap::new(),
            }),
        }
    }

    /// Mark the line at index-slot `addr` dirty.
    pub fn mark_dirty(&self, addr: usize) {
        self.model
            .lock()
            .dirty
            .insert(addr, ())
            .ok();
    }

    /// Number of lines still dirty in the model.
    pub fn dirty_lines(&self) -> usize {
        self.model.lock().dirty.len()
    }

    /// Whether an index-addressed writeback hit `addr`.
    pub fn was_written_back(&self, addr: usize) -> bool {
        self.model.lock().written_back.contains_key(&addr)
    }

    /// Snapshot the issue counters.
    pub fn stats(&self) -> SyntheticCacheStats {
        self.model.lock().stats
    }

    /// Reset counters, keep dirty state.
    pub fn reset_stats(&self) {
        self.model.lock().stats = SyntheticCacheStats::default();
    }
}

impl Default for SyntheticCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheLineOps for SyntheticCache {
    fn index_load_tag_d(&self, addr: usize) -> u32 {
        let mut m = self.model.lock();
        m.stats.index_load_tag_d += 1;
        if m.dirty.contains_key(&addr) {
            TAGLO_DIRTY_MASK
        } else {
            0
        }
    }

    fn index_writeback_inv_d(&self, addr: usize) {
        let mut m = self.model.lock();
        m.stats.index_writeback_inv_d += 1;
        m.dirty.remove(&addr);
        m.written_back.insert(addr, ()).ok();
    }

    fn index_inv_i(&self, _addr: usize) {
        self.model.lock().stats.index_inv_i += 1;
    }

    fn index_writeback_inv_s(&self, _addr: usize) {
        self.model.lock().stats.index_writeback_inv_s += 1;
    }

    fn hit_writeback_inv_d(&self, _addr: usize) {
        self.model.lock().stats.hit_writeback_inv_d += 1;
    }

    fn hit_inv_d(&self, _addr: usize) {
        self.model.lock().stats.hit_inv_d += 1;
    }

    fn hit_inv_i(&self, _addr: usize) {
        self.model.lock().stats.hit_inv_i += 1;
    }

    fn hit_writeback_inv_s(&self, _addr: usize) {
        self.model.lock().stats.hit_writeback_inv_s += 1;
    }

    fn hit_inv_s(&self, _addr: usize) {
        self.model.lock().stats.hit_inv_s += 1;
    }

    fn protected_hit_writeback_inv_d(&self, _addr: usize) {
        self.model.lock().stats.protected_hit_writeback_inv_d += 1;
    }

    fn protected_hit_inv_i(&self, _addr: usize) {
        self.model.lock().stats.protected_hit_inv_i += 1;
    }
}
