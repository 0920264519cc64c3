use anyhow::Result;
use std::fs;

use SketchDB::{CountStore, QfStore};

#[test]
fn counts_exactly_within_range() -> Result<()> {
    let qs = QfStore::new(10)?; // 1024 slots, 18-bit keys
    assert!(qs.add(5));
    assert!(!qs.add(5));
    assert!(!qs.add(5));
    assert_eq!(qs.get_count(5), 3);
    assert_eq!(qs.get_count(6), 0);
    Ok(())
}

#[test]
fn stats_delegate_to_the_filter() -> Result<()> {
    let qs = QfStore::new(10)?;
    for k in [100u64, 100, 200, 300, 300, 300] {
        qs.add(k);
    }
    assert_eq!(qs.n_tables(), 1);
    assert_eq!(qs.table_sizes(), vec![1024]);
    assert_eq!(qs.n_unique_kmers(), 3);
    assert_eq!(qs.n_occupied_bins(), 6);
    assert!(qs.raw_tables().is_empty());
    Ok(())
}

/// Keys are reduced into the filter's range before insertion, so keys that
/// collide after reduction share a count.
#[test]
fn reduces_keys_into_range() -> Result<()> {
    let qs = QfStore::new(6)?; // 64 slots, 14-bit keys
    let range = 1u64 << 14;
    qs.add(3);
    qs.add(3 + range);
    assert_eq!(qs.get_count(3), 2);
    Ok(())
}

#[test]
fn refuses_adds_when_full() -> Result<()> {
    let qs = QfStore::new(3)?; // 8 slots, one kept empty
    let mut accepted = 0u32;
    for k in 0..100u64 {
        if qs.add(k * 257) {
            accepted += 1;
        } else if qs.get_count(k * 257) == 0 {
            break;
        }
    }
    assert!(accepted <= 7);
    // a full filter drops new keys instead of corrupting state
    assert!(!qs.add(999_999));
    Ok(())
}

#[test]
fn bigcount_is_unsupported() -> Result<()> {
    let mut qs = QfStore::new(8)?;
    assert!(qs.set_use_bigcount(true).is_err());
    Ok(())
}

#[test]
fn save_load_roundtrip() -> Result<()> {
    let root = unique_root("qf-roundtrip");
    fs::create_dir_all(&root)?;
    let path = root.join("filter.sk");

    let qs = QfStore::new(12)?;
    let mut rng = oorandom::Rand64::new(42);
    let keys: Vec<u64> = (0..500).map(|_| rng.rand_u64()).collect();
    for &k in &keys {
        qs.add(k);
        qs.add(k);
    }
    qs.save(&path, 19)?;

    let mut fresh = QfStore::new(4)?;
    let ksize = fresh.load(&path)?;
    assert_eq!(ksize, 19);
    assert_eq!(fresh.table_sizes(), qs.table_sizes());
    assert_eq!(fresh.n_unique_kmers(), qs.n_unique_kmers());
    assert_eq!(fresh.n_occupied_bins(), qs.n_occupied_bins());
    for &k in &keys {
        assert_eq!(fresh.get_count(k), qs.get_count(k));
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
