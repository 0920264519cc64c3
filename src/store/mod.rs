//! Counting table backends and their common contract.
//!
//! Four independent store types implement [`CountStore`]:
//! - [`BitStore`]  — presence-only Bloom filter (src/store/bit.rs)
//! - [`ByteStore`] — Count-Min sketch, 1-byte counters + exact overflow map
//! - [`NibbleStore`] — Count-Min sketch, 4-bit counters, per-table locking
//! - [`QfStore`]   — adapter over the counting quotient filter (src/qf)
//!
//! Keys are canonical 64-bit k-mer hashes produced elsewhere; the stores
//! treat them as opaque integers. Each store exclusively owns its tables —
//! no sharing or aliasing between instances.

mod bit;
mod byte;
mod nibble;
mod qf;

pub use bit::BitStore;
pub use byte::ByteStore;
pub use nibble::NibbleStore;
pub use qf::QfStore;

use std::path::Path;
use std::sync::atomic::AtomicU8;
use std::sync::{Mutex, MutexGuard};

use crate::errors::{Result, StoreError};

/// The storage contract consumed by graph/traversal/alignment code.
///
/// Concurrency: `add` and `get_count` are safe to call from many threads on
/// the same instance. `save` and `load` are NOT safe against concurrent
/// mutation — callers must quiesce writers first (documented contract, not
/// enforced internally).
pub trait CountStore {
    /// Count the key in every table. Returns `true` iff the key was novel,
    /// observed via the first-table occupancy proxy (see module docs of the
    /// concrete stores).
    fn add(&self, key: u64) -> bool;

    /// Bounded count for the key: the minimum across tables (Count-Min
    /// semantics), or 0/1 existence for the Bloom store.
    fn get_count(&self, key: u64) -> u16;

    fn table_sizes(&self) -> Vec<u64>;

    fn n_tables(&self) -> usize;

    /// Keys that flipped at least one bin from empty on first insertion.
    fn n_unique_kmers(&self) -> u64;

    /// Nonzero bins in table 0 only — a deliberate proxy, kept as-is
    /// because downstream saturation heuristics depend on its definition.
    fn n_occupied_bins(&self) -> u64;

    /// Enable exact overflow counting for saturated keys. Only the byte
    /// store supports this; everything else reports `Unsupported`.
    fn set_use_bigcount(&mut self, on: bool) -> Result<()> {
        let _ = on;
        Err(StoreError::Unsupported(
            "bigcount is only supported by the byte store",
        ))
    }

    fn get_use_bigcount(&self) -> bool {
        false
    }

    fn save(&self, path: &Path, ksize: u32) -> Result<()>;

    /// Restore full state from `path`, replacing the current tables
    /// wholesale on success. Returns the k-mer size recorded in the file.
    fn load(&mut self, path: &Path) -> Result<u32>;

    /// Read-only zero-copy view of the raw table bytes, for inspection
    /// (set-similarity and the like). Writing to the tables outside the
    /// defined methods is not possible through this view. Empty for the
    /// quotient-filter adapter.
    fn raw_tables(&self) -> Vec<&[AtomicU8]>;
}

// -------- shared helpers --------

pub(crate) fn alloc_table(nbytes: usize) -> Box<[AtomicU8]> {
    (0..nbytes).map(|_| AtomicU8::new(0)).collect()
}

pub(crate) fn table_from_bytes(bytes: Vec<u8>) -> Box<[AtomicU8]> {
    bytes.into_iter().map(AtomicU8::new).collect()
}

pub(crate) fn check_tablesizes(sizes: &[u64]) -> Result<()> {
    if sizes.is_empty() {
        return Err(StoreError::Config("at least one table is required".into()));
    }
    if sizes.iter().any(|&s| s == 0) {
        return Err(StoreError::Config("table sizes must be nonzero".into()));
    }
    Ok(())
}

/// Lock a mutex, recovering the guard if a previous holder panicked. The
/// protected state (plain counters, a HashMap mutated one entry at a time)
/// stays consistent across such a panic.
pub(crate) fn lock_unpoisoned<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}
