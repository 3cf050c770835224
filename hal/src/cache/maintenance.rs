//! Cache maintenance operations.
//!
//! [`CacheLineOps`] is the seam between the portable maintenance logic and
//! the `cache` instruction: the real backend issues index/hit cache ops
//! against silicon, the synthetic backend records them for tests.
//!
//! [`CacheController`] holds the probed geometry plus the generation-selected
//! DMA-invalidate behavior and implements the operations the kernel's cache
//! API surface dispatches to.

use crate::barrier;
use crate::regs::{cache_fields, CpuKind, RegisterFile, CP0_ERRCTL};

use super::{CacheGeometry, CacheHierarchy};

/// Page granularity used by the page-flush operations.
pub const PAGE_SIZE: usize = 4096;

// ============================================================================
// Line-level operations
// ============================================================================

/// Single-line cache operations, index- and hit-addressed.
///
/// The `protected_` variants tolerate faulting addresses (user-space
/// ranges); on hardware they are the fault-protected encodings of the same
/// cache ops.
pub trait CacheLineOps: Sync {
    /// Index-addressed: load the D-cache tag for `addr` and return TagLo.
    fn index_load_tag_d(&self, addr: usize) -> u32;
    /// Index-addressed D-cache writeback+invalidate.
    fn index_writeback_inv_d(&self, addr: usize);
    /// Index-addressed I-cache invalidate.
    fn index_inv_i(&self, addr: usize);
    /// Index-addressed secondary-cache writeback+invalidate.
    fn index_writeback_inv_s(&self, addr: usize);

    /// Hit-addressed D-cache writeback+invalidate.
    fn hit_writeback_inv_d(&self, addr: usize);
    /// Hit-addressed D-cache invalidate (no writeback).
    fn hit_inv_d(&self, addr: usize);
    /// Hit-addressed I-cache invalidate.
    fn hit_inv_i(&self, addr: usize);
    /// Hit-addressed secondary-cache writeback+invalidate.
    fn hit_writeback_inv_s(&self, addr: usize);
    /// Hit-addressed secondary-cache invalidate (no writeback).
    fn hit_inv_s(&self, addr: usize);

    /// Fault-protected hit-addressed D-cache writeback+invalidate.
    fn protected_hit_writeback_inv_d(&self, addr: usize);
    /// Fault-protected hit-addressed I-cache invalidate.
    fn protected_hit_inv_i(&self, addr: usize);
}

/// Iterate every (way, index) slot of `geom`, calling `op` with the
/// index-addressed target of each line.
fn for_each_index(geom: &CacheGeometry, mut op: impl FnMut(usize)) {
    let start = geom.index_base;
    let end = start + geom.way_size;
    let ws_inc = 1usize << geom.way_bit;
    let ws_end = geom.ways << geom.way_bit;

    let mut ws = 0;
    while ws < ws_end {
        let mut addr = start;
        while addr < end {
            op(addr | ws);
            addr += geom.line_size;
        }
        ws += ws_inc;
    }
}

/// Iterate the lines of `[start, end)` at `line_size` granularity.
fn for_each_line(line_size: usize, start: usize, end: usize, mut op: impl FnMut(usize)) {
    let mut addr = start & !(line_size - 1);
    while addr < end {
        op(addr);
        addr += line_size;
    }
}

// ============================================================================
// Controller
// ============================================================================

/// The variant-selected cache-operation surface.
///
/// Built once at boot after the probe; generation dispatch happens here, at
/// construction, not per call.
pub struct CacheController<'a> {
    regs: &'a dyn RegisterFile,
    lines: &'a dyn CacheLineOps,
    hierarchy: CacheHierarchy,
    kind: CpuKind,
}

impl<'a> CacheController<'a> {
    /// Wrap a probed hierarchy.
    ///
    /// # Panics
    ///
    /// Panics on an unrecognized CPU kind: there is no safe default DMA
    /// maintenance behavior to fall back to.
    pub fn new(
        regs: &'a dyn RegisterFile,
        lines: &'a dyn CacheLineOps,
        hierarchy: CacheHierarchy,
        kind: CpuKind,
    ) -> Self {
        if let CpuKind::Unknown(prid) = kind {
            panic!("Unknown Ingenic CPU type (PRId {:#010x}).", prid);
        }

        Self {
            regs,
            lines,
            hierarchy,
            kind,
        }
    }

    /// The probed geometry.
    pub fn hierarchy(&self) -> &CacheHierarchy {
        &self.hierarchy
    }

    // --- whole-cache blasts ---

    /// Writeback+invalidate the whole D-cache.
    pub fn blast_dcache(&self) {
        for_each_index(&self.hierarchy.dcache, |addr| {
            self.lines.index_writeback_inv_d(addr)
        });
    }

    /// Invalidate the whole I-cache.
    pub fn blast_icache(&self) {
        for_each_index(&self.hierarchy.icache, |addr| self.lines.index_inv_i(addr));
    }

    /// Writeback+invalidate the whole secondary cache, when present.
    pub fn blast_scache(&self) {
        if let Some(sc) = self.hierarchy.scache {
            for_each_index(&sc, |addr| self.lines.index_writeback_inv_s(addr));
        }
    }

    /// Whole local D+I flush: the `flush_cache_all` surface.
    pub fn flush_cache_all(&self) {
        self.blast_dcache();
        self.blast_icache();
    }

    // --- ranged flushes ---

    /// Make `[start, end)` coherent between D- and I-caches before it is
    /// executed. Ranges at least as large as the I-cache take the
    /// whole-cache path; user ranges use the fault-protected ops.
    pub fn flush_icache_range(&self, start: usize, end: usize, user: bool) {
        let d = &self.hierarchy.dcache;
        let i = &self.hierarchy.icache;

        if end - start >= i.total_size() {
            self.blast_dcache();
            self.blast_icache();
        } else if user {
            for_each_line(d.line_size, start, end, |a| {
                self.lines.protected_hit_writeback_inv_d(a)
            });
            for_each_line(i.line_size, start, end, |a| self.lines.protected_hit_inv_i(a));
        } else {
            for_each_line(d.line_size, start, end, |a| self.lines.hit_writeback_inv_d(a));
            for_each_line(i.line_size, start, end, |a| self.lines.hit_inv_i(a));
        }
    }

    /// Flush one executable page. `active` says whether the owning address
    /// space is live on this CPU: live mappings can use hit addressing,
    /// anything else must fall back to index addressing.
    pub fn flush_cache_page(&self, addr: usize, exec: bool, active: bool) {
        if !exec {
            return;
        }

        let addr = addr & !(PAGE_SIZE - 1);
        if active {
            self.blast_dcache_page(addr);
            self.blast_icache_page(addr);
        } else {
            self.blast_dcache_page_indexed(addr);
            self.blast_icache_page_indexed(addr);
        }
    }

    fn blast_dcache_page(&self, page: usize) {
        for_each_line(self.hierarchy.dcache.line_size, page, page + PAGE_SIZE, |a| {
            self.lines.hit_writeback_inv_d(a)
        });
    }

    fn blast_icache_page(&self, page: usize) {
        for_each_line(self.hierarchy.icache.line_size, page, page + PAGE_SIZE, |a| {
            self.lines.hit_inv_i(a)
        });
    }

    fn blast_dcache_page_indexed(&self, page: usize) {
        let geom = self.hierarchy.dcache;
        Self::page_indexed(&geom, page, |a| self.lines.index_writeback_inv_d(a));
    }

    fn blast_icache_page_indexed(&self, page: usize) {
        let geom = self.hierarchy.icache;
        Self::page_indexed(&geom, page, |a| self.lines.index_inv_i(a));
    }

    /// Index-addressed sweep of every way that could alias `page`.
    fn page_indexed(geom: &CacheGeometry, page: usize, mut op: impl FnMut(usize)) {
        let mut ws = 0;
        let ws_end = geom.ways << geom.way_bit;
        let ws_inc = 1usize << geom.way_bit;
        while ws < ws_end {
            let mut off = 0;
            while off < PAGE_SIZE {
                let idx = geom.index_base + ((page + off) & (geom.way_size - 1));
                op(idx | ws);
                off += geom.line_size;
            }
            ws += ws_inc;
        }
    }

    // --- DMA coherency ---

    /// Writeback+invalidate `[addr, addr+size)` ahead of bidirectional or
    /// device-read DMA. Whole-cache blast when the range reaches the cache
    /// size, per-line otherwise, for both D and S levels.
    pub fn dma_cache_wback_inv(&self, addr: usize, size: usize) {
        let d = &self.hierarchy.dcache;

        if size >= d.total_size() {
            self.blast_dcache();
        } else {
            for_each_line(d.line_size, addr, addr + size, |a| {
                self.lines.hit_writeback_inv_d(a)
            });
        }

        if let Some(sc) = self.hierarchy.scache {
            if size >= sc.total_size() {
                self.blast_scache();
            } else {
                for_each_line(sc.line_size, addr, addr + size, |a| {
                    self.lines.hit_writeback_inv_s(a)
                });
            }
        }

        barrier::sync();
    }

    /// Invalidate `[addr, addr+size)` after device-write DMA.
    ///
    /// XBurst parts must wrap the invalidate-only pass in the ErrCtl
    /// write-strategy workaround, otherwise the operation can corrupt
    /// unrelated dirty lines (documented silicon erratum). XBurst2 parts
    /// instead maintain the L2, whose line size differs from the L1's.
    pub fn dma_cache_inv(&self, addr: usize, size: usize) {
        match self.kind {
            CpuKind::XBurst => self.dma_cache_inv_xburst(addr, size),
            CpuKind::XBurst2 => self.dma_cache_inv_xburst2(addr, size),
            CpuKind::Unknown(_) => unreachable!("rejected at construction"),
        }
        barrier::sync();
    }

    fn dma_cache_inv_xburst(&self, addr: usize, size: usize) {
        let d = &self.hierarchy.dcache;

        self.regs.write(CP0_ERRCTL, cache_fields::ERRCTL_WST_EN);

        if size >= d.total_size() {
            self.blast_dcache();
        } else {
            for_each_line(d.line_size, addr, addr + size, |a| self.lines.hit_inv_d(a));
        }

        self.regs.write(CP0_ERRCTL, cache_fields::ERRCTL_WST_DIS);
    }

    fn dma_cache_inv_xburst2(&self, addr: usize, size: usize) {
        let d = &self.hierarchy.dcache;

        if size >= d.total_size() {
            self.blast_dcache();
        } else {
            for_each_line(d.line_size, addr, addr + size, |a| self.lines.hit_inv_d(a));
        }

        let Some(sc) = self.hierarchy.scache else {
            return;
        };

        if size >= sc.total_size() {
            self.blast_scache();
        } else {
            // The partial first and last lines may hold unrelated data;
            // write those back before the invalidate-only sweep.
            let almask = !(sc.line_size - 1);
            self.lines.hit_writeback_inv_s(addr & almask);
            self.lines.hit_writeback_inv_s((addr + size - 1) & almask);
            for_each_line(sc.line_size, addr, addr + size, |a| self.lines.hit_inv_s(a));
        }
    }

    /// Dirty-line-only D-cache writeback (idle-entry path). See
    /// [`super::wback_dirty_dcache`].
    pub fn wback_dirty_dcache(&self) {
        super::wback_dirty_dcache(self.lines, &self.hierarchy.dcache);
    }
}
