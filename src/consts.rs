//! Shared on-disk format constants (table stores + quotient filter).

// -------- Signature --------
pub const SAVED_SIGNATURE: &[u8; 4] = b"SKDB";

// -------- Format versions --------
// Two independent registries: one for the table stores (bit/byte/nibble),
// one for the quotient filter. The type tag keeps them distinguishable,
// and each loader validates its own schema.
pub const FORMAT_VERSION: u8 = 1;
pub const QF_FORMAT_VERSION: u8 = 1;

// -------- Store type tags --------
pub const SAVED_BIT: u8 = 1;
pub const SAVED_BYTE: u8 = 2;
pub const SAVED_NIBBLE: u8 = 3;
pub const SAVED_QF: u8 = 4;

// Common header (bit/byte/nibble), little-endian, no padding:
// [signature 4B][version u8][type u8]
// (byte store only: [use_bigcount u8])
// [ksize u32][n_tables u8][occupied_bins u64]
// Per table: [tablesize u64][raw table bytes]
// Byte store tail: [n_bigcounts u64] + n x ([key u64][count u16])
//
// Quotient filter after the 6-byte prefix:
// [ksize u32][nslots u64][xnslots u64][key_bits u32][value_bits u32]
// [key_remainder_bits u32][bits_per_slot u32][range u64][nblocks u64]
// [nelts u64][ndistinct_elts u64][noccupied_slots u64][raw slot bytes]

// -------- Counter limits --------
pub const MAX_KCOUNT: u8 = 255; // byte-store saturation ceiling
pub const MAX_BIGCOUNT: u16 = 65535; // overflow-map cap
pub const MAX_NIBBLE_COUNT: u8 = 15;

// To support more tables, grow the nibble mutex pool.
pub const MAX_NIBBLE_TABLES: usize = 32;
