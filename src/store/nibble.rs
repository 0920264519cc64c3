//! Count-Min nibble store: 4-bit counters, two per byte.
//!
//! Trades count resolution (saturates at 15) for roughly 8x the key-space
//! density of the byte store at equal memory. Sub-byte atomics do not
//! exist, so mutation of a table's bin is serialized by a dedicated mutex
//! per table index — never a global lock, and a thread holds at most one
//! table mutex at a time. The counter bytes themselves are `AtomicU8` so
//! that unlocked readers (`get_count`, `raw_tables`) stay well-defined.

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info};

use crate::consts::{FORMAT_VERSION, MAX_NIBBLE_COUNT, MAX_NIBBLE_TABLES, SAVED_NIBBLE};
use crate::errors::{Result, StoreError};
use crate::persist;
use crate::primes::primes_near;
use crate::store::{
    alloc_table, check_tablesizes, lock_unpoisoned, table_from_bytes, CountStore,
};

pub struct NibbleStore {
    tablesizes: Vec<u64>,
    tables: Vec<Box<[AtomicU8]>>,
    mutexes: Vec<Mutex<()>>,
    occupied_bins: AtomicU64,
    unique_kmers: AtomicU64,
}

fn nibble_tablebytes(tablesize: u64) -> usize {
    (tablesize / 2 + 1) as usize
}

// Even bins use the high nibble, odd bins the low one.
fn nibble_index(key: u64, tablesize: u64) -> usize {
    ((key % tablesize) / 2) as usize
}

fn nibble_shift(key: u64, tablesize: u64) -> u8 {
    if (key % tablesize) % 2 == 1 {
        0
    } else {
        4
    }
}

fn nibble_mask(key: u64, tablesize: u64) -> u8 {
    if (key % tablesize) % 2 == 1 {
        0x0f
    } else {
        0xf0
    }
}

impl NibbleStore {
    pub fn new(tablesizes: Vec<u64>) -> Result<Self> {
        check_tablesizes(&tablesizes)?;
        if tablesizes.len() > MAX_NIBBLE_TABLES {
            return Err(StoreError::Config(format!(
                "nibble store supports at most {} tables, got {}",
                MAX_NIBBLE_TABLES,
                tablesizes.len()
            )));
        }
        let tables: Vec<_> = tablesizes
            .iter()
            .map(|&s| alloc_table(nibble_tablebytes(s)))
            .collect();
        let mutexes = (0..tables.len()).map(|_| Mutex::new(())).collect();
        Ok(Self {
            tablesizes,
            tables,
            mutexes,
            occupied_bins: AtomicU64::new(0),
            unique_kmers: AtomicU64::new(0),
        })
    }

    pub fn with_capacity(n_tables: usize, max_tablesize: u64) -> Result<Self> {
        Self::new(primes_near(n_tables, max_tablesize))
    }

    fn load_fresh(path: &Path) -> Result<(Self, u32)> {
        let mut r = persist::open(path)?;
        persist::read_prefix(&mut r, path, FORMAT_VERSION, SAVED_NIBBLE)?;

        let rerr = |e| StoreError::io_at(path, e);
        let ksize = r.read_u32::<LittleEndian>().map_err(rerr)?;
        let n_tables = r.read_u8().map_err(rerr)? as usize;
        if n_tables == 0 || n_tables > MAX_NIBBLE_TABLES {
            return Err(StoreError::BadFormat {
                what: "table count",
                expected: format!("1..={}", MAX_NIBBLE_TABLES),
                actual: n_tables.to_string(),
                path: path.to_path_buf(),
            });
        }
        let occupied = r.read_u64::<LittleEndian>().map_err(rerr)?;

        let mut tablesizes = Vec::with_capacity(n_tables);
        let mut tables = Vec::with_capacity(n_tables);
        for _ in 0..n_tables {
            let size = r.read_u64::<LittleEndian>().map_err(rerr)?;
            let mut buf = vec![0u8; nibble_tablebytes(size)];
            persist::read_table_bytes(&mut r, path, &mut buf)?;
            tablesizes.push(size);
            tables.push(table_from_bytes(buf));
        }

        info!(
            "loaded nibble store from {}: {} tables, {} occupied bins",
            path.display(),
            n_tables,
            occupied
        );
        let mutexes = (0..n_tables).map(|_| Mutex::new(())).collect();
        Ok((
            Self {
                tablesizes,
                tables,
                mutexes,
                occupied_bins: AtomicU64::new(occupied),
                unique_kmers: AtomicU64::new(occupied),
            },
            ksize,
        ))
    }
}

impl CountStore for NibbleStore {
    fn add(&self, key: u64) -> bool {
        let mut is_new = false;

        for (i, table) in self.tables.iter().enumerate() {
            let _g = lock_unpoisoned(&self.mutexes[i]);
            let size = self.tablesizes[i];
            let idx = nibble_index(key, size);
            let mask = nibble_mask(key, size);
            let shift = nibble_shift(key, size);

            let byte = table[idx].load(Ordering::Relaxed);
            let current = (byte & mask) >> shift;

            if !is_new && current == 0 {
                is_new = true;
                if i == 0 {
                    self.occupied_bins.fetch_add(1, Ordering::Relaxed);
                }
            }
            // saturate instead of wrapping the nibble
            if current == MAX_NIBBLE_COUNT {
                continue;
            }
            let updated = (byte & !mask) | (((current + 1) << shift) & mask);
            table[idx].store(updated, Ordering::Relaxed);
        }

        if is_new {
            self.unique_kmers.fetch_add(1, Ordering::Relaxed);
        }
        is_new
    }

    fn get_count(&self, key: u64) -> u16 {
        let mut min_count = MAX_NIBBLE_COUNT;
        for (i, table) in self.tables.iter().enumerate() {
            let size = self.tablesizes[i];
            let byte = table[nibble_index(key, size)].load(Ordering::Relaxed);
            let count = (byte & nibble_mask(key, size)) >> nibble_shift(key, size);
            if count < min_count {
                min_count = count;
            }
        }
        u16::from(min_count)
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

        persist::write_prefix(&mut w, FORMAT_VERSION, SAVED_NIBBLE).map_err(werr)?;
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
            "nibble store saved to {} ({} tables)",
            path.display(),
            self.tables.len()
        );
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<u32> {
        let (fresh, ksize) = Self::load_fresh(path)?;
        *self = fresh;
        Ok(ksize)
    }

    fn raw_tables(&self) -> Vec<&[AtomicU8]> {
        self.tables.iter().map(|t| &t[..]).collect()
    }
}
