//! Quotient-filter store adapter.
//!
//! Thin pass-through over the counting quotient filter in src/qf. The
//! filter is one logical table with a power-of-two slot count; keys are
//! reduced into its addressable range before delegating. Serialization is
//! the filter's own schema (metadata fields plus the raw slot array,
//! verbatim), version-tagged in its own registry but sharing the common
//! signature and type tag.

use std::path::Path;
use std::sync::atomic::AtomicU8;
use std::sync::Mutex;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info, warn};

use crate::consts::{QF_FORMAT_VERSION, SAVED_QF};
use crate::errors::{Result, StoreError};
use crate::persist;
use crate::qf::{QuotientFilter, BITS_PER_SLOT};
use crate::store::{lock_unpoisoned, CountStore};

pub struct QfStore {
    // the filter mutates on insert (cluster shifting), so the whole thing
    // sits behind one mutex rather than per-bin atomics
    filter: Mutex<QuotientFilter>,
}

impl QfStore {
    /// `size` is the power of two for the slot count (`2^size` slots); the
    /// key width is `size + 8` bits, leaving an 8-bit remainder per slot.
    pub fn new(size: u32) -> Result<Self> {
        Ok(Self {
            filter: Mutex::new(QuotientFilter::new(size, 8)?),
        })
    }
}

impl CountStore for QfStore {
    fn add(&self, key: u64) -> bool {
        let mut f = lock_unpoisoned(&self.filter);
        let key = key & (f.range() - 1);
        let is_new = f.count(key) == 0;
        if !f.insert(key) {
            warn!(
                "quotient filter full ({} slots), dropping key",
                f.nslots()
            );
            return false;
        }
        is_new
    }

    fn get_count(&self, key: u64) -> u16 {
        let f = lock_unpoisoned(&self.filter);
        let key = key & (f.range() - 1);
        f.count(key).min(u64::from(u16::MAX)) as u16
    }

    fn table_sizes(&self) -> Vec<u64> {
        vec![lock_unpoisoned(&self.filter).nslots()]
    }

    fn n_tables(&self) -> usize {
        1
    }

    fn n_unique_kmers(&self) -> u64 {
        lock_unpoisoned(&self.filter).ndistinct_elts()
    }

    fn n_occupied_bins(&self) -> u64 {
        lock_unpoisoned(&self.filter).noccupied_slots()
    }

    fn save(&self, path: &Path, ksize: u32) -> Result<()> {
        let mut w = persist::create(path)?;
        let werr = |e| StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        };
        let f = lock_unpoisoned(&self.filter);

        persist::write_prefix(&mut w, QF_FORMAT_VERSION, SAVED_QF).map_err(werr)?;
        w.write_u32::<LittleEndian>(ksize).map_err(werr)?;
        w.write_u64::<LittleEndian>(f.nslots()).map_err(werr)?;
        // xnslots: kept equal to nslots (runs wrap instead of spilling
        // past the end)
        w.write_u64::<LittleEndian>(f.nslots()).map_err(werr)?;
        w.write_u32::<LittleEndian>(f.key_bits()).map_err(werr)?;
        w.write_u32::<LittleEndian>(0).map_err(werr)?; // value_bits, unused
        w.write_u32::<LittleEndian>(f.remainder_bits())
            .map_err(werr)?;
        w.write_u32::<LittleEndian>(BITS_PER_SLOT).map_err(werr)?;
        w.write_u64::<LittleEndian>(f.range()).map_err(werr)?;
        w.write_u64::<LittleEndian>(f.raw_slots().len() as u64)
            .map_err(werr)?;
        w.write_u64::<LittleEndian>(f.nelts()).map_err(werr)?;
        w.write_u64::<LittleEndian>(f.ndistinct_elts()).map_err(werr)?;
        w.write_u64::<LittleEndian>(f.noccupied_slots()).map_err(werr)?;

        use std::io::Write;
        w.write_all(f.raw_slots()).map_err(werr)?;
        w.flush().map_err(werr)?;
        debug!(
            "qf store saved to {} ({} slots, {} elements)",
            path.display(),
            f.nslots(),
            f.nelts()
        );
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<u32> {
        let mut r = persist::open(path)?;
        persist::read_prefix(&mut r, path, QF_FORMAT_VERSION, SAVED_QF)?;

        let rerr = |e| StoreError::io_at(path, e);
        let ksize = r.read_u32::<LittleEndian>().map_err(rerr)?;
        let nslots = r.read_u64::<LittleEndian>().map_err(rerr)?;
        let _xnslots = r.read_u64::<LittleEndian>().map_err(rerr)?;
        let key_bits = r.read_u32::<LittleEndian>().map_err(rerr)?;
        let _value_bits = r.read_u32::<LittleEndian>().map_err(rerr)?;
        let rbits = r.read_u32::<LittleEndian>().map_err(rerr)?;
        let bits_per_slot = r.read_u32::<LittleEndian>().map_err(rerr)?;
        let _range = r.read_u64::<LittleEndian>().map_err(rerr)?;
        let nblocks = r.read_u64::<LittleEndian>().map_err(rerr)?;
        let nelts = r.read_u64::<LittleEndian>().map_err(rerr)?;
        let ndistinct = r.read_u64::<LittleEndian>().map_err(rerr)?;
        let _noccupied = r.read_u64::<LittleEndian>().map_err(rerr)?;

        if bits_per_slot != BITS_PER_SLOT {
            return Err(StoreError::BadFormat {
                what: "bits per slot",
                expected: BITS_PER_SLOT.to_string(),
                actual: bits_per_slot.to_string(),
                path: path.to_path_buf(),
            });
        }
        if !nslots.is_power_of_two() || key_bits <= rbits {
            return Err(StoreError::BadFormat {
                what: "filter geometry",
                expected: "power-of-two slots, key_bits > remainder_bits".into(),
                actual: format!("nslots={} key_bits={} rbits={}", nslots, key_bits, rbits),
                path: path.to_path_buf(),
            });
        }
        let qbits = key_bits - rbits;
        if u64::from(qbits) != nslots.trailing_zeros() as u64 {
            return Err(StoreError::BadFormat {
                what: "filter geometry",
                expected: format!("2^{} slots", qbits),
                actual: nslots.to_string(),
                path: path.to_path_buf(),
            });
        }

        let mut slots = vec![0u8; nblocks as usize];
        persist::read_table_bytes(&mut r, path, &mut slots)?;

        let fresh = QuotientFilter::from_raw_parts(qbits, rbits, nelts, ndistinct, slots)
            .map_err(|e| match e {
                StoreError::Config(msg) => StoreError::BadFormat {
                    what: "filter geometry",
                    expected: "consistent metadata".into(),
                    actual: msg,
                    path: path.to_path_buf(),
                },
                other => other,
            })?;
        info!(
            "loaded qf store from {}: {} slots, {} elements",
            path.display(),
            nslots,
            nelts
        );
        *lock_unpoisoned(&self.filter) = fresh;
        Ok(ksize)
    }

    fn raw_tables(&self) -> Vec<&[AtomicU8]> {
        Vec::new()
    }
}
