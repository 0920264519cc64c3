#![allow(non_snake_case)]

//! SketchDB — the counting storage engine of a k-mer analysis toolkit.
//!
//! Fixed-size, concurrently-mutable approximate counting tables keyed by
//! 64-bit k-mer hashes. Bounded memory instead of an exact hash map, at
//! the cost of a small, quantifiable error rate.

// Core modules
pub mod consts;
pub mod errors;
pub mod primes;

// Persistence codec (shared prefix + validation, crate-internal)
mod persist;

// Counting quotient filter (wrapped by store::QfStore)
pub mod qf;

// Store backends + contract
pub mod store; // src/store/{mod,bit,byte,nibble,qf}.rs

// Convenient re-exports
pub use errors::{Result, StoreError};
pub use primes::primes_near;
pub use store::{BitStore, ByteStore, CountStore, NibbleStore, QfStore};
