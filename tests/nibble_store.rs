use anyhow::Result;
use std::fs;

use SketchDB::{CountStore, NibbleStore};

#[test]
fn counts_and_saturates_at_fifteen() -> Result<()> {
    let ns = NibbleStore::new(vec![11, 13])?;
    assert!(ns.add(5));
    assert!(!ns.add(5));
    assert_eq!(ns.get_count(5), 2);
    assert_eq!(ns.get_count(6), 0);

    for _ in 0..40 {
        ns.add(5);
    }
    assert_eq!(ns.get_count(5), 15);
    assert_eq!(ns.n_unique_kmers(), 1);
    assert_eq!(ns.n_occupied_bins(), 1);
    Ok(())
}

/// Adjacent bins share a byte; counting one must not disturb the other.
#[test]
fn paired_nibbles_are_independent() -> Result<()> {
    let ns = NibbleStore::new(vec![100])?;
    // keys 4 and 5 land in the same byte (bin pair 4/5)
    for _ in 0..3 {
        ns.add(4);
    }
    ns.add(5);
    assert_eq!(ns.get_count(4), 3);
    assert_eq!(ns.get_count(5), 1);
    Ok(())
}

#[test]
fn rejects_too_many_tables() {
    assert!(NibbleStore::with_capacity(32, 10_000).is_ok());
    assert!(NibbleStore::with_capacity(33, 10_000).is_err());
}

#[test]
fn bigcount_is_unsupported() -> Result<()> {
    let mut ns = NibbleStore::new(vec![11, 13])?;
    assert!(!ns.get_use_bigcount());
    assert!(ns.set_use_bigcount(true).is_err());
    Ok(())
}

#[test]
fn save_load_roundtrip() -> Result<()> {
    let root = unique_root("nibble-roundtrip");
    fs::create_dir_all(&root)?;
    let path = root.join("counts.sk");

    let ns = NibbleStore::with_capacity(3, 10_000)?;
    for k in 1..=400u64 {
        for _ in 0..(k % 4 + 1) {
            ns.add(k);
        }
    }
    ns.save(&path, 17)?;

    let mut fresh = NibbleStore::new(vec![3])?;
    let ksize = fresh.load(&path)?;
    assert_eq!(ksize, 17);
    assert_eq!(fresh.table_sizes(), ns.table_sizes());
    assert_eq!(fresh.n_tables(), ns.n_tables());
    assert_eq!(fresh.n_occupied_bins(), ns.n_occupied_bins());
    assert_eq!(fresh.n_unique_kmers(), ns.n_unique_kmers());
    for k in 1..=400u64 {
        assert_eq!(fresh.get_count(k), ns.get_count(k), "key {}", k);
    }
    Ok(())
}

// ---------- helpers ----------

fn unique_root(prefix: &str) -> std::path::PathBuf {
    let pid = std::process::id();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("skdb-{}-{}-{}", prefix, pid, t))
}
