//! Count-Min byte store with exact overflow ("bigcount").
//!
//! One-byte saturating counters in N prime-sized tables; a key's count is
//! the minimum across tables. Counters stop at `MAX_KCOUNT` — with bigcount
//! enabled, keys saturated in every table fall through to an exact per-key
//! overflow map capped at `MAX_BIGCOUNT`. Hot keys then stay accurate at
//! the cost of a little exact-tracking memory.
//!
//! Files with a `.gz` suffix are transparently gzip-compressed (same byte
//! layout inside the stream).

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, info};

use crate::consts::{FORMAT_VERSION, MAX_BIGCOUNT, MAX_KCOUNT, SAVED_BYTE, SAVED_SIGNATURE};
use crate::errors::{Result, StoreError};
use crate::persist;
use crate::primes::primes_near;
use crate::store::{alloc_table, check_tablesizes, lock_unpoisoned, table_from_bytes, CountStore};

pub struct ByteStore {
    tablesizes: Vec<u64>,
    tables: Vec<Box<[AtomicU8]>>,
    occupied_bins: AtomicU64,
    unique_kmers: AtomicU64,
    use_bigcount: bool,
    // spin-lock granularity from the original design: one lock per
    // instance, held only for a single lookup-insert-or-increment
    bigcounts: Mutex<HashMap<u64, u16>>,
}

impl ByteStore {
    pub fn new(tablesizes: Vec<u64>) -> Result<Self> {
        check_tablesizes(&tablesizes)?;
        let tables = tablesizes
            .iter()
            .map(|&s| alloc_table(s as usize))
            .collect();
        Ok(Self {
            tablesizes,
            tables,
            occupied_bins: AtomicU64::new(0),
            unique_kmers: AtomicU64::new(0),
            use_bigcount: false,
            bigcounts: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_capacity(n_tables: usize, max_tablesize: u64) -> Result<Self> {
        Self::new(primes_near(n_tables, max_tablesize))
    }

    /// Number of keys currently tracked exactly in the overflow map.
    pub fn n_bigcounts(&self) -> usize {
        lock_unpoisoned(&self.bigcounts).len()
    }

    fn write_into<W: Write>(&self, w: &mut W, ksize: u32) -> io::Result<()> {
        w.write_all(SAVED_SIGNATURE)?;
        w.write_all(&[FORMAT_VERSION, SAVED_BYTE])?;
        w.write_u8(self.use_bigcount as u8)?;
        w.write_u32::<LittleEndian>(ksize)?;
        w.write_u8(self.tables.len() as u8)?;
        w.write_u64::<LittleEndian>(self.occupied_bins.load(Ordering::Relaxed))?;

        for (i, table) in self.tables.iter().enumerate() {
            w.write_u64::<LittleEndian>(self.tablesizes[i])?;
            let bytes: Vec<u8> = table.iter().map(|b| b.load(Ordering::Relaxed)).collect();
            w.write_all(&bytes)?;
        }

        let big = lock_unpoisoned(&self.bigcounts);
        w.write_u64::<LittleEndian>(big.len() as u64)?;
        for (&key, &count) in big.iter() {
            w.write_u64::<LittleEndian>(key)?;
            w.write_u16::<LittleEndian>(count)?;
        }
        Ok(())
    }

    fn read_from<R: Read>(r: &mut R, path: &Path) -> Result<(Self, u32)> {
        persist::read_prefix(r, path, FORMAT_VERSION, SAVED_BYTE)?;

        let rerr = |e| StoreError::io_at(path, e);
        let use_bigcount = r.read_u8().map_err(rerr)? != 0;
        let ksize = r.read_u32::<LittleEndian>().map_err(rerr)?;
        let n_tables = r.read_u8().map_err(rerr)? as usize;
        if n_tables == 0 {
            return Err(StoreError::BadFormat {
                what: "table count",
                expected: "1..=255".into(),
                actual: "0".into(),
                path: path.to_path_buf(),
            });
        }
        let occupied = r.read_u64::<LittleEndian>().map_err(rerr)?;

        let mut tablesizes = Vec::with_capacity(n_tables);
        let mut tables = Vec::with_capacity(n_tables);
        for _ in 0..n_tables {
            let size = r.read_u64::<LittleEndian>().map_err(rerr)?;
            let mut buf = vec![0u8; size as usize];
            persist::read_table_bytes(r, path, &mut buf)?;
            tablesizes.push(size);
            tables.push(table_from_bytes(buf));
        }

        let n_counts = r.read_u64::<LittleEndian>().map_err(rerr)?;
        let mut bigcounts = HashMap::with_capacity(n_counts as usize);
        for _ in 0..n_counts {
            let key = r.read_u64::<LittleEndian>().map_err(rerr)?;
            let count = r.read_u16::<LittleEndian>().map_err(rerr)?;
            bigcounts.insert(key, count);
        }

        info!(
            "loaded byte store from {}: {} tables, {} bigcount entries",
            path.display(),
            n_tables,
            n_counts
        );
        Ok((
            Self {
                tablesizes,
                tables,
                occupied_bins: AtomicU64::new(occupied),
                // re-seeded from the table-0 occupancy proxy (not persisted)
                unique_kmers: AtomicU64::new(occupied),
                use_bigcount,
                bigcounts: Mutex::new(bigcounts),
            },
            ksize,
        ))
    }
}

fn is_gz(path: &Path) -> bool {
    path.extension().map(|e| e == "gz").unwrap_or(false)
}

impl CountStore for ByteStore {
    fn add(&self, key: u64) -> bool {
        let mut is_new = false;
        let mut n_full = 0usize;

        for (i, table) in self.tables.iter().enumerate() {
            let bin = (key % self.tablesizes[i]) as usize;
            // saturating increment: the CAS loop can never wrap a counter
            // past MAX_KCOUNT, unlike a blind fetch_add
            match table[bin].fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| {
                if c == MAX_KCOUNT {
                    None
                } else {
                    Some(c + 1)
                }
            }) {
                Ok(prev) => {
                    if prev == 0 {
                        is_new = true;
                        // occupied bins tracked in the first table only, as
                        // proxy for all
                        if i == 0 {
                            self.occupied_bins.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
                Err(_) => n_full += 1,
            }
        }

        // all tables saturated for this key: fall through to exact counting
        if n_full == self.tables.len() && self.use_bigcount {
            let mut big = lock_unpoisoned(&self.bigcounts);
            match big.entry(key) {
                Entry::Occupied(mut e) => {
                    let v = e.get_mut();
                    if *v < MAX_BIGCOUNT {
                        *v += 1;
                    }
                }
                Entry::Vacant(v) => {
                    v.insert(u16::from(MAX_KCOUNT) + 1);
                }
            }
        }

        if is_new {
            self.unique_kmers.fetch_add(1, Ordering::Relaxed);
        }
        is_new
    }

    fn get_count(&self, key: u64) -> u16 {
        let mut min_count = MAX_KCOUNT;
        for (i, table) in self.tables.iter().enumerate() {
            let bin = (key % self.tablesizes[i]) as usize;
            let c = table[bin].load(Ordering::Relaxed);
            if c < min_count {
                min_count = c;
            }
        }
        // saturated minimum: the overflow map may know the exact count
        if min_count == MAX_KCOUNT && self.use_bigcount {
            let big = lock_unpoisoned(&self.bigcounts);
            if let Some(&c) = big.get(&key) {
                return c;
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

    fn set_use_bigcount(&mut self, on: bool) -> Result<()> {
        self.use_bigcount = on;
        Ok(())
    }

    fn get_use_bigcount(&self) -> bool {
        self.use_bigcount
    }

    fn save(&self, path: &Path, ksize: u32) -> Result<()> {
        let werr = |e| StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        };
        let file = File::create(path).map_err(werr)?;
        if is_gz(path) {
            let mut gz = GzEncoder::new(file, Compression::default());
            self.write_into(&mut gz, ksize).map_err(werr)?;
            gz.finish().map_err(werr)?;
        } else {
            let mut w = BufWriter::new(file);
            self.write_into(&mut w, ksize).map_err(werr)?;
            w.flush().map_err(werr)?;
        }
        debug!(
            "byte store saved to {} ({} tables, {} bigcounts)",
            path.display(),
            self.tables.len(),
            self.n_bigcounts()
        );
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<u32> {
        let file = File::open(path).map_err(|e| StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let (fresh, ksize) = if is_gz(path) {
            let mut r = BufReader::new(MultiGzDecoder::new(file));
            Self::read_from(&mut r, path)?
        } else {
            let mut r = BufReader::new(file);
            Self::read_from(&mut r, path)?
        };
        *self = fresh;
        Ok(ksize)
    }

    fn raw_tables(&self) -> Vec<&[AtomicU8]> {
        self.tables.iter().map(|t| &t[..]).collect()
    }
}
