//! # XBurst Cache Probe & Maintenance
//!
//! Cache support for the Ingenic XBurst SoC line.
//!
//! ## Submodules
//!
//! - `maintenance`: whole-cache, range and DMA-coherency operations
//! - `writeback`: the dirty-line-only D-cache writeback engine
//! - `synthetic`: a recording cache model for tests
//!
//! ## Probing
//!
//! L1 geometry comes from Config1 and the unified L2 from Config2, with a
//! per-SoC override table for parts whose Config2 encoding is contradicted
//! by the vendor documentation. A zero-sized L1 is fatal: nothing can run
//! without a valid primary cache size.

mod maintenance;
mod synthetic;
mod writeback;

cfg_if::cfg_if! {
    if #[cfg(target_arch = "mips")] {
        mod mips;
        pub use mips::MipsCacheOps;
    }
}

pub use maintenance::{CacheController, CacheLineOps, PAGE_SIZE};
pub use synthetic::{SyntheticCache, SyntheticCacheStats};
pub use writeback::wback_dirty_dcache;

use crate::regs::{
    cache_fields, xburst2::Mscr, CpuKind, RegisterFile, CCU_MSCR, CP0_CONFIG1, CP0_CONFIG2,
    CP0_ERRCTL,
};

/// Base virtual address used by index-addressed cache operations (KSEG0).
pub const INDEX_BASE: usize = 0x8000_0000;

// ============================================================================
// SoC variants
// ============================================================================

/// The Ingenic SoC the kernel was booted on.
///
/// The variant drives the documentation-override table for the L2 probe and
/// the physically-indexed cache flags; it is ordered so that X2000-and-later
/// parts (the XBurst2 family) compare greater than every XBurst part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SocVariant {
    Jz4730,
    Jz4740,
    Jz4725b,
    Jz4755,
    Jz4760,
    Jz4770,
    Jz4775,
    Jz4780,
    X1000,
    X1000e,
    X2000,
    X2000e,
}

impl SocVariant {
    /// Instruction cache is physically indexed on this part.
    pub const fn icache_physically_indexed(self) -> bool {
        matches!(
            self,
            Self::Jz4730
                | Self::Jz4740
                | Self::Jz4725b
                | Self::Jz4755
                | Self::Jz4760
                | Self::X2000
                | Self::X2000e
        )
    }

    /// Data cache is physically indexed on this part.
    pub const fn dcache_physically_indexed(self) -> bool {
        matches!(
            self,
            Self::Jz4725b | Self::Jz4755 | Self::Jz4760 | Self::X2000 | Self::X2000e
        )
    }

    /// XBurst2-family part (X2000 and later).
    pub const fn is_x2000_or_later(self) -> bool {
        matches!(self, Self::X2000 | Self::X2000e)
    }

    /// Vendor-documentation override for the L2 probe, applied after the
    /// raw Config2 decode: `(sets, ways)`, `None` meaning "trust Config2".
    ///
    /// Several parts encode geometry in Config2 that every piece of vendor
    /// documentation contradicts.
    pub const fn scache_override(self) -> (Option<u32>, Option<u32>) {
        match self {
            // Config2 claims 5 ways; documentation says 4.
            Self::Jz4770 | Self::Jz4775 => (None, Some(4)),
            // Config2 claims 8 ways and 256 sets; documentation says 4/1024.
            Self::Jz4780 => (Some(1024), Some(4)),
            // Config2 claims 5 ways and 512 sets; documentation says 4/256.
            Self::X1000 | Self::X1000e => (Some(256), Some(4)),
            _ => (None, None),
        }
    }
}

// ============================================================================
// Geometry
// ============================================================================

/// Immutable-after-probe description of one cache level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheGeometry {
    /// Line size in bytes.
    pub line_size: usize,
    /// Number of sets per way.
    pub sets: usize,
    /// Associativity.
    pub ways: usize,
    /// Bytes covered by one way (`sets * line_size`).
    pub way_size: usize,
    /// log2 of the per-way stride used by index-addressed operations.
    pub way_bit: u32,
    /// Base virtual address for index-addressed operations.
    pub index_base: usize,
    /// Physically indexed (PIPT) rather than virtually indexed.
    pub physically_indexed: bool,
}

impl CacheGeometry {
    /// Derive the computed fields from raw line/sets/ways.
    ///
    /// Returns `None` when the raw values multiply out to a zero-sized
    /// cache; the caller decides whether that is fatal (L1) or merely
    /// "not present" (L2).
    pub fn from_raw(line_size: usize, sets: usize, ways: usize) -> Option<Self> {
        let total = line_size * sets * ways;
        if total == 0 {
            return None;
        }

        Some(Self {
            line_size,
            sets,
            ways,
            way_size: sets * line_size,
            way_bit: (total / ways).trailing_zeros(),
            index_base: INDEX_BASE,
            physically_indexed: false,
        })
    }

    /// Total cache size in bytes.
    pub const fn total_size(&self) -> usize {
        self.ways * self.sets * self.line_size
    }
}

/// Decoded Config1 L1 instruction-cache fields.
fn decode_l1_icache(config1: u32) -> (usize, usize, usize) {
    let line = 2 << ((config1 >> 19) & 7);
    let sets = 32 << (((config1 >> 22) + 1) & 7);
    let ways = 1 + ((config1 >> 16) & 7);
    (line as usize, sets as usize, ways as usize)
}

/// Decoded Config1 L1 data-cache fields.
fn decode_l1_dcache(config1: u32) -> (usize, usize, usize) {
    let line = 2 << ((config1 >> 10) & 7);
    let sets = 32 << (((config1 >> 13) + 1) & 7);
    let ways = 1 + ((config1 >> 7) & 7);
    (line as usize, sets as usize, ways as usize)
}

/// Decoded Config2 unified L2 fields.
fn decode_l2(config2: u32) -> (usize, usize, usize) {
    let line = 2 << ((config2 >> 4) & 0xf);
    let sets = 64 << ((config2 >> 8) & 0xf);
    let ways = 1 + (config2 & 0xf);
    (line as usize, sets as usize, ways as usize)
}

/// The probed cache levels of the running part.
#[derive(Debug, Clone, Copy)]
pub struct CacheHierarchy {
    /// Primary instruction cache.
    pub icache: CacheGeometry,
    /// Primary data cache.
    pub dcache: CacheGeometry,
    /// Unified secondary cache, when present and enabled.
    pub scache: Option<CacheGeometry>,
}

impl CacheHierarchy {
    /// Probe every cache level from the configuration registers.
    ///
    /// Mirrors the boot-time probe order: L1 first (fatal when zero-sized),
    /// then the L2 with the documentation-override table. Probing the L2
    /// also performs the part's coherency side effects: X2000-and-later
    /// enable the L2 prefetch unit, earlier parts park the ErrCtl
    /// write-strategy bit in its disabled state.
    ///
    /// # Panics
    ///
    /// Panics when Config1 decodes to a zero-sized instruction or data
    /// cache; the system cannot run without a valid L1.
    pub fn probe(regs: &dyn RegisterFile, kind: CpuKind, variant: SocVariant) -> Self {
        let config1 = regs.read(CP0_CONFIG1);

        let (line, sets, ways) = decode_l1_icache(config1);
        let mut icache = CacheGeometry::from_raw(line, sets, ways)
            .unwrap_or_else(|| panic!("Invalid primary instruction cache size."));
        icache.physically_indexed = variant.icache_physically_indexed();

        let (line, sets, ways) = decode_l1_dcache(config1);
        let mut dcache = CacheGeometry::from_raw(line, sets, ways)
            .unwrap_or_else(|| panic!("Invalid primary data cache size."));
        dcache.physically_indexed = variant.dcache_physically_indexed();

        log::info!(
            "Primary instruction cache {}kiB, {}, {}-way, {} sets, linesize {} bytes.",
            icache.total_size() >> 10,
            if icache.physically_indexed { "PIPT" } else { "VIPT" },
            icache.ways,
            icache.sets,
            icache.line_size
        );
        log::info!(
            "Primary data cache {}kiB, {}, {}-way, {} sets, linesize {} bytes.",
            dcache.total_size() >> 10,
            if dcache.physically_indexed { "PIPT" } else { "VIPT" },
            dcache.ways,
            dcache.sets,
            dcache.line_size
        );

        let scache = Self::probe_scache(regs, kind, variant, config1);

        Self {
            icache,
            dcache,
            scache,
        }
    }

    fn probe_scache(
        regs: &dyn RegisterFile,
        kind: CpuKind,
        variant: SocVariant,
        config1: u32,
    ) -> Option<CacheGeometry> {
        if kind == CpuKind::XBurst2 {
            // Firmware may have disabled the L2 outright.
            let mscr = Mscr::from_bits_retain(regs.read(CCU_MSCR));
            if mscr.contains(Mscr::DISL2C) {
                return None;
            }
        }

        // Does this part have a Config2 register at all?
        if config1 & cache_fields::CONFIG1_M == 0 {
            return None;
        }

        let config2 = regs.read(CP0_CONFIG2);
        let (line, mut sets, mut ways) = decode_l2(config2);

        let (sets_override, ways_override) = variant.scache_override();
        if let Some(s) = sets_override {
            sets = s as usize;
        }
        if let Some(w) = ways_override {
            ways = w as usize;
        }

        let mut scache = CacheGeometry::from_raw(line, sets, ways)?;

        if variant.is_x2000_or_later() {
            scache.physically_indexed = true;

            // Enable the L2 prefetch unit.
            regs.modify(CCU_MSCR, 0, Mscr::DISPFB2.bits());
        } else {
            regs.write(CP0_ERRCTL, cache_fields::ERRCTL_WST_DIS);
        }

        log::info!(
            "Unified secondary cache {}kiB, {}, {}-way, {} sets, linesize {} bytes.",
            scache.total_size() >> 10,
            if scache.physically_indexed { "PIPT" } else { "VIPT" },
            scache.ways,
            scache.sets,
            scache.line_size
        );

        Some(scache)
    }
}
