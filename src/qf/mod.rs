//! Counting quotient filter.
//!
//! Cleary-style quotient filter with three metadata bits per slot
//! (occupied / continuation / shifted) and an 8-bit remainder. Duplicate
//! remainders are stored adjacently inside their canonical run, so an
//! item's count is the number of matching remainders in the run for its
//! quotient. Slots are kept as two raw bytes ([remainder][flags]) so the
//! whole array can be persisted verbatim.
//!
//! The filter is not internally thread-safe; the store adapter serializes
//! access (src/store/qf.rs).

use crate::errors::{Result, StoreError};

const OCCUPIED: u8 = 1; // a run exists for this canonical slot index
const CONTINUATION: u8 = 2; // this slot's remainder continues a run
const SHIFTED: u8 = 4; // this slot's remainder is not in its home slot

pub const BITS_PER_SLOT: u32 = 16;
const SLOT_BYTES: usize = 2;

pub struct QuotientFilter {
    qbits: u32,
    rbits: u32,
    nslots: u64,
    index_mask: u64,
    rmask: u64,
    range: u64,
    nelts: u64,
    ndistinct_elts: u64,
    slots: Vec<u8>,
}

impl QuotientFilter {
    /// `qbits` selects the slot count (`2^qbits`); `rbits` is the remainder
    /// width. Keys must be reduced into `range() = 2^(qbits + rbits)` by
    /// the caller.
    pub fn new(qbits: u32, rbits: u32) -> Result<Self> {
        if qbits == 0 || rbits == 0 || rbits > 8 {
            return Err(StoreError::Config(format!(
                "quotient filter needs qbits >= 1 and 1 <= rbits <= 8, got q={} r={}",
                qbits, rbits
            )));
        }
        if qbits + rbits > 63 {
            return Err(StoreError::Config(format!(
                "quotient filter key width {} exceeds 63 bits",
                qbits + rbits
            )));
        }
        let nslots = 1u64 << qbits;
        Ok(Self {
            qbits,
            rbits,
            nslots,
            index_mask: nslots - 1,
            rmask: (1u64 << rbits) - 1,
            range: 1u64 << (qbits + rbits),
            nelts: 0,
            ndistinct_elts: 0,
            slots: vec![0u8; nslots as usize * SLOT_BYTES],
        })
    }

    // -------- accessors (also used by the adapter's serializer) --------

    pub fn range(&self) -> u64 {
        self.range
    }

    pub fn nslots(&self) -> u64 {
        self.nslots
    }

    pub fn key_bits(&self) -> u32 {
        self.qbits + self.rbits
    }

    pub fn remainder_bits(&self) -> u32 {
        self.rbits
    }

    pub fn nelts(&self) -> u64 {
        self.nelts
    }

    /// Distinct (quotient, remainder) fingerprints stored.
    pub fn ndistinct_elts(&self) -> u64 {
        self.ndistinct_elts
    }

    /// Every stored element takes exactly one slot.
    pub fn noccupied_slots(&self) -> u64 {
        self.nelts
    }

    pub fn raw_slots(&self) -> &[u8] {
        &self.slots
    }

    /// Rebuild a filter from persisted metadata and the verbatim slot
    /// array. Validates the shape so a corrupt file cannot produce an
    /// inconsistent filter.
    pub fn from_raw_parts(
        qbits: u32,
        rbits: u32,
        nelts: u64,
        ndistinct_elts: u64,
        slots: Vec<u8>,
    ) -> Result<Self> {
        let mut qf = Self::new(qbits, rbits)?;
        if slots.len() != qf.slots.len() {
            return Err(StoreError::Config(format!(
                "slot array length {} does not match 2^{} slots ({} bytes)",
                slots.len(),
                qbits,
                qf.slots.len()
            )));
        }
        qf.slots = slots;
        qf.nelts = nelts;
        qf.ndistinct_elts = ndistinct_elts;
        Ok(qf)
    }

    // -------- slot primitives --------

    fn incr(&self, i: u64) -> u64 {
        (i + 1) & self.index_mask
    }

    fn decr(&self, i: u64) -> u64 {
        i.wrapping_sub(1) & self.index_mask
    }

    fn rem(&self, i: u64) -> u8 {
        self.slots[i as usize * SLOT_BYTES]
    }

    fn flags(&self, i: u64) -> u8 {
        self.slots[i as usize * SLOT_BYTES + 1]
    }

    fn set_slot(&mut self, i: u64, rem: u8, flags: u8) {
        self.slots[i as usize * SLOT_BYTES] = rem;
        self.slots[i as usize * SLOT_BYTES + 1] = flags;
    }

    fn set_flags(&mut self, i: u64, flags: u8) {
        self.slots[i as usize * SLOT_BYTES + 1] = flags;
    }

    fn split(&self, key: u64) -> (u64, u8) {
        let key = key & (self.range - 1);
        (key >> self.rbits, (key & self.rmask) as u8)
    }

    /// Index of the first element of the run for quotient `fq`. Walks back
    /// over shifted slots to the cluster start, then forward run by run.
    /// `fq`'s occupied bit must be set.
    fn find_run_start(&self, fq: u64) -> u64 {
        let mut b = fq;
        while self.flags(b) & SHIFTED != 0 {
            b = self.decr(b);
        }
        let mut s = b;
        while b != fq {
            // skip past the run starting at s
            loop {
                s = self.incr(s);
                if self.flags(s) & CONTINUATION == 0 {
                    break;
                }
            }
            // next canonical slot with a run
            loop {
                b = self.incr(b);
                if self.flags(b) & OCCUPIED != 0 {
                    break;
                }
            }
        }
        s
    }

    /// Place `(rem, flags)` at slot `s`, shifting the cluster right until
    /// an empty slot absorbs the displacement. Occupied bits stay pinned
    /// to their slot index.
    fn insert_into(&mut self, mut s: u64, mut rem: u8, mut flags: u8) {
        loop {
            let prev_rem = self.rem(s);
            let prev_flags = self.flags(s);
            let empty = prev_flags == 0;

            let mut curr_flags = flags;
            let mut next_flags = prev_flags;
            if !empty {
                next_flags |= SHIFTED;
                if next_flags & OCCUPIED != 0 {
                    curr_flags |= OCCUPIED;
                    next_flags &= !OCCUPIED;
                }
            }
            self.set_slot(s, rem, curr_flags);
            rem = prev_rem;
            flags = next_flags;
            s = self.incr(s);
            if empty {
                break;
            }
        }
    }

    // -------- public operations --------

    /// Insert one occurrence of `key` (already reduced into `range()`).
    /// Returns `false` without inserting when the filter is full (one slot
    /// is always kept empty so cluster scans terminate).
    pub fn insert(&mut self, key: u64) -> bool {
        if self.nelts + 1 >= self.nslots {
            return false;
        }
        let (fq, fr) = self.split(key);
        let was_absent = self.count_fingerprint(fq, fr) == 0;

        if self.flags(fq) == 0 {
            // empty home slot: the run starts (and ends) right here
            self.set_slot(fq, fr, OCCUPIED);
        } else {
            let was_occupied = self.flags(fq) & OCCUPIED != 0;
            if !was_occupied {
                self.set_flags(fq, self.flags(fq) | OCCUPIED);
            }
            let start = self.find_run_start(fq);
            let mut s = start;
            let mut entry_flags = 0u8;

            if was_occupied {
                // walk the sorted run; equal remainders group together
                loop {
                    let rem = self.rem(s);
                    if rem > fr {
                        break;
                    }
                    s = self.incr(s);
                    if self.flags(s) & CONTINUATION == 0 {
                        break;
                    }
                }
                if s == start {
                    // new smallest remainder becomes the run head
                    self.set_flags(start, self.flags(start) | CONTINUATION);
                } else {
                    entry_flags |= CONTINUATION;
                }
            }
            if s != fq {
                entry_flags |= SHIFTED;
            }
            self.insert_into(s, fr, entry_flags);
        }

        self.nelts += 1;
        if was_absent {
            self.ndistinct_elts += 1;
        }
        true
    }

    /// Occurrences of `key` (already reduced into `range()`). Zero means
    /// definitely absent; a nonzero count may be inflated by fingerprint
    /// collisions, never deflated.
    pub fn count(&self, key: u64) -> u64 {
        let (fq, fr) = self.split(key);
        self.count_fingerprint(fq, fr)
    }

    fn count_fingerprint(&self, fq: u64, fr: u8) -> u64 {
        if self.flags(fq) & OCCUPIED == 0 {
            return 0;
        }
        let mut s = self.find_run_start(fq);
        let mut n = 0u64;
        loop {
            let rem = self.rem(s);
            if rem == fr {
                n += 1;
            } else if rem > fr {
                break;
            }
            s = self.incr(s);
            if self.flags(s) & CONTINUATION == 0 {
                break;
            }
        }
        n
    }
}
