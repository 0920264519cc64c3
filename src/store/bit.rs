//! Presence-only Bloom store.
//!
//! N bit-arrays sized by distinct primes; existence is the AND across
//! tables. No false negatives; the false-positive rate is set by the table
//! sizes and table count. Mutation is lock-free (`fetch_or` per bit).

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info};

use crate::consts::{FORMAT_VERSION, SAVED_BIT};
use crate::errors::{Result, StoreError};
use crate::persist;
use crate::primes::primes_near;
use crate::store::{alloc_table, check_tablesizes, table_from_bytes, CountStore};

pub struct BitStore {
    tablesizes: Vec<u64>,
    tables: Vec<Box<[AtomicU8]>>,
    occupied_bins: AtomicU64,
    unique_kmers: AtomicU64,
}

fn bit_tablebytes(tablesize: u64) -> usize {
    (tablesize / 8 + 1) as usize
}

impl BitStore {
    pub fn new(tablesizes: Vec<u64>) -> Result<Self> {
        check_tablesizes(&tablesizes)?;
        let tables = tablesizes
            .iter()
            .map(|&s| alloc_table(bit_tablebytes(s)))
            .collect();
        Ok(Self {
            tablesizes,
            tables,
            occupied_bins: AtomicU64::new(0),
            unique_kmers: AtomicU64::new(0),
        })
    }

    /// Size `n_tables` tables with distinct primes at or below
    /// `max_tablesize`. Fewer tables result if the prime range runs out.
    pub fn with_capacity(n_tables: usize, max_tablesize: u64) -> Result<Self> {
        Self::new(primes_near(n_tables, max_tablesize))
    }

    /// Union `other` into `self` (bitwise OR of every table). Both filters
    /// must have identical table-size vectors. Not safe against concurrent
    /// `add` on either instance.
    ///
    /// `n_occupied_bins` is corrected without rescanning every bit:
    /// the number of newly occupied bins in table 0 is the Hamming weight
    /// of `old ^ merged` per byte.
    pub fn update_from(&mut self, other: &BitStore) -> Result<()> {
        if self.tablesizes != other.tablesizes {
            return Err(StoreError::Config(
                "union requires identical table sizes".into(),
            ));
        }
        for (t_idx, (me, ot)) in self.tables.iter().zip(other.tables.iter()).enumerate() {
            for (m, o) in me.iter().zip(ot.iter()) {
                let old = m.load(Ordering::Relaxed);
                let merged = old | o.load(Ordering::Relaxed);
                if merged == old {
                    continue;
                }
                if t_idx == 0 {
                    self.occupied_bins
                        .fetch_add(u64::from((old ^ merged).count_ones()), Ordering::Relaxed);
                }
                m.store(merged, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Bitwise Jaccard similarity across all tables of two equally-shaped
    /// filters: |A and B| / |A or B|.
    pub fn similarity(&self, other: &BitStore) -> Result<f64> {
        let (inter, uni, _) = self.bit_overlap(other)?;
        Ok(if uni == 0 { 0.0 } else { inter as f64 / uni as f64 })
    }

    /// Containment of `self` in `other`: |A and B| / |A|.
    pub fn containment(&self, other: &BitStore) -> Result<f64> {
        let (inter, _, mine) = self.bit_overlap(other)?;
        Ok(if mine == 0 {
            0.0
        } else {
            inter as f64 / mine as f64
        })
    }

    fn bit_overlap(&self, other: &BitStore) -> Result<(u64, u64, u64)> {
        if self.tablesizes != other.tablesizes {
            return Err(StoreError::Config(
                "set comparisons require identical table sizes".into(),
            ));
        }
        let mut inter = 0u64;
        let mut uni = 0u64;
        let mut mine = 0u64;
        for (me, ot) in self.tables.iter().zip(other.tables.iter()) {
            for (m, o) in me.iter().zip(ot.iter()) {
                let a = m.load(Ordering::Relaxed);
                let b = o.load(Ordering::Relaxed);
                inter += u64::from((a & b).count_ones());
                uni += u64::from((a | b).count_ones());
                mine += u64::from(a.count_ones());
            }
        }
        Ok((inter, uni, mine))
    }

    fn load_fresh(path: &Path) -> Result<(Self, u32)> {
        let mut r = persist::open(path)?;
        persist::read_prefix(&mut r, path, FORMAT_VERSION, SAVED_BIT)?;

        let ksize = r
            .read_u32::<LittleEndian>()
            .map_err(|e| StoreError::io_at(path, e))?;
        let n_tables = r.read_u8().map_err(|e| StoreError::io_at(path, e))? as usize;
        if n_tables == 0 {
            return Err(StoreError::BadFormat {
                what: "table count",
                expected: "1..=255".into(),
                actual: "0".into(),
                path: path.to_path_buf(),
            });
        }
        let occupied = r
            .read_u64::<LittleEndian>()
            .map_err(|e| StoreError::io_at(path, e))?;

        let mut tablesizes = Vec::with_capacity(n_tables);
        let mut tables = Vec::with_capacity(n_tables);
        for _ in 0..n_tables {
            let size = r
                .read_u64::<LittleEndian>()
                .map_err(|e| StoreError::io_at(path, e))?;
            let mut buf = vec![0u8; bit_tablebytes(size)];
            persist::read_table_bytes(&mut r, path, &mut buf)?;
            tablesizes.push(size);
            tables.push(table_from_bytes(buf));
        }

        info!(
            "loaded bit store from {}: {} tables, {} occupied bins",
            path.display(),
            n_tables,
            occupied
        );
        Ok((
            Self {
                tablesizes,
                tables,
                occupied_bins: AtomicU64::new(occupied),
                // the format does not carry the unique-kmer counter; re-seed
                // it from the table-0 occupancy proxy
                unique_kmers: AtomicU64::new(occupied),
            },
            ksize,
        ))
    }
}

impl CountStore for BitStore {
    fn add(&self, key: u64) -> bool {
        let mut is_new = false;
        for (i, table) in self.tables.iter().enumerate() {
            let bin = key % self.tablesizes[i];
            let byte = (bin / 8) as usize;
            let bit = 1u8 << (bin % 8);
            let orig = table[byte].fetch_or(bit, Ordering::Relaxed);
            if orig & bit == 0 {
                if i == 0 {
                    self.occupied_bins.fetch_add(1, Ordering::Relaxed);
                }
                is_new = true;
            }
        }
        if is_new {
            self.unique_kmers.fetch_add(1, Ordering::Relaxed);
        }
        is_new
    }

    fn get_count(&self, key: u64) -> u16 {
        for (i, table) in self.tables.iter().enumerate() {
            let bin = key % self.tablesizes[i];
            let byte = (bin / 8) as usize;
            let bit = 1u8 << (bin % 8);
            if table[byte].load(Ordering::Relaxed) & bit == 0 {
                return 0;
            }
        }
        1
    }

    fn table_sizes(&self) -> Vec<u64> {
        self.tablesizes.clone()
    }

    fn n_tables(&self) -> usize {
        self.tables.len()
    }

    fn n_unique_kmers(&self) -> u64 {
        self.unique_kmers.load(Ordering::Relaxed)
    }

    fn n_occupied_bins(&self) -> u64 {
        self.occupied_bins.load(Ordering::Relaxed)
    }

    fn save(&self, path: &Path, ksize: u32) -> Result<()> {
        let mut w = persist::create(path)?;
        let werr = |e| StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        };

        persist::write_prefix(&mut w, FORMAT_VERSION, SAVED_BIT).map_err(werr)?;
        w.write_u32::<LittleEndian>(ksize).map_err(werr)?;
        w.write_u8(self.tables.len() as u8).map_err(werr)?;
        w.write_u64::<LittleEndian>(self.occupied_bins.load(Ordering::Relaxed))
            .map_err(werr)?;

        for (i, table) in self.tables.iter().enumerate() {
            w.write_u64::<LittleEndian>(self.tablesizes[i])
                .map_err(werr)?;
            let bytes: Vec<u8> = table.iter().map(|b| b.load(Ordering::Relaxed)).collect();
            w.write_all(&bytes).map_err(werr)?;
        }
        w.flush().map_err(werr)?;
        debug!(
            "bit store saved to {} ({} tables)",
            path.display(),
            self.tables.len()
        );
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<u32> {
        // parse fully into a fresh instance, then replace wholesale
        let (fresh, ksize) = Self::load_fresh(path)?;
        *self = fresh;
        Ok(ksize)
    }

    fn raw_tables(&self) -> Vec<&[AtomicU8]> {
        self.tables.iter().map(|t| &t[..]).collect()
    }
}
