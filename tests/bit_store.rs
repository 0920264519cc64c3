use anyhow::Result;
use std::fs;

use SketchDB::{BitStore, CountStore};

/// Concrete scenario: k=4, tables [11, 13].
#[test]
fn presence_scenario() -> Result<()> {
    let bs = BitStore::new(vec![11, 13])?;

    assert!(bs.add(5), "first add must report novel");
    assert_eq!(bs.get_count(5), 1);
    // 6 lands in different bins mod 11 and mod 13, so no false positive here
    assert_eq!(bs.get_count(6), 0);
    assert_eq!(bs.n_unique_kmers(), 1);
    assert_eq!(bs.n_occupied_bins(), 1);
    assert_eq!(bs.table_sizes(), vec![11, 13]);
    assert_eq!(bs.n_tables(), 2);

    // re-adding is not novel
    assert!(!bs.add(5));
    assert_eq!(bs.n_unique_kmers(), 1);
    Ok(())
}

/// No false negatives: once added, a key tests present forever.
#[test]
fn no_false_negatives() -> Result<()> {
    let bs = BitStore::with_capacity(4, 100_000)?;
    let mut rng = oorandom::Rand64::new(0xC0FFEE);

    let keys: Vec<u64> = (0..500).map(|_| rng.rand_u64()).collect();
    for &k in &keys {
        bs.add(k);
    }
    for &k in &keys {
        assert_eq!(bs.get_count(k), 1, "key {} must stay present", k);
    }
    // still present after a pile of unrelated keys
    for _ in 0..2000 {
        bs.add(rng.rand_u64());
    }
    for &k in &keys {
        assert_eq!(bs.get_count(k), 1);
    }
    Ok(())
}

/// Union with popcount-based occupancy correction.
#[test]
fn union_merges_and_corrects_occupancy() -> Result<()> {
    let sizes = SketchDB::primes_near(2, 10_000);
    let mut a = BitStore::new(sizes.clone())?;
    let b = BitStore::new(sizes.clone())?;

    // keys below the smallest table size occupy distinct bins
    for k in 1..=200u64 {
        a.add(k);
    }
    for k in 101..=300u64 {
        b.add(k);
    }
    a.update_from(&b)?;

    for k in 1..=300u64 {
        assert_eq!(a.get_count(k), 1, "key {} must be present after union", k);
    }
    assert_eq!(a.n_occupied_bins(), 300);

    // shape mismatch is rejected
    let odd = BitStore::new(vec![11, 13])?;
    assert!(a.update_from(&odd).is_err());
    Ok(())
}

#[test]
fn similarity_and_containment() -> Result<()> {
    let sizes = SketchDB::primes_near(2, 10_000);
    let a = BitStore::new(sizes.clone())?;
    let b = BitStore::new(sizes.clone())?;

    for k in 1..=100u64 {
        a.add(k);
    }
    for k in 1..=100u64 {
        b.add(k);
    }
    // identical sets
    assert!((a.similarity(&b)? - 1.0).abs() < 1e-9);
    assert!((a.containment(&b)? - 1.0).abs() < 1e-9);

    // disjoint additions drop similarity below 1
    for k in 5_001..=5_100u64 {
        b.add(k);
    }
    let sim = a.similarity(&b)?;
    assert!(sim < 1.0 && sim > 0.0);
    // a is still fully contained in b
    assert!((a.containment(&b)? - 1.0).abs() < 1e-9);
    Ok(())
}

#[test]
fn save_load_roundtrip() -> Result<()> {
    let root = unique_root("bit-roundtrip");
    fs::create_dir_all(&root)?;
    let path = root.join("presence.sk");

    let bs = BitStore::with_capacity(3, 10_000)?;
    for k in 1..=500u64 {
        bs.add(k);
    }
    bs.save(&path, 21)?;

    let mut fresh = BitStore::new(vec![3])?;
    let ksize = fresh.load(&path)?;
    assert_eq!(ksize, 21);
    assert_eq!(fresh.table_sizes(), bs.table_sizes());
    assert_eq!(fresh.n_tables(), bs.n_tables());
    assert_eq!(fresh.n_occupied_bins(), bs.n_occupied_bins());
    assert_eq!(fresh.n_unique_kmers(), bs.n_unique_kmers());
    for k in 1..=500u64 {
        assert_eq!(fresh.get_count(k), 1);
    }
    Ok(())
}

#[test]
fn bigcount_is_unsupported() -> Result<()> {
    let mut bs = BitStore::new(vec![11, 13])?;
    assert!(!bs.get_use_bigcount());
    assert!(bs.set_use_bigcount(true).is_err());
    Ok(())
}

#[test]
fn rejects_empty_table_set() {
    assert!(BitStore::new(Vec::new()).is_err());
    assert!(BitStore::new(vec![11, 0]).is_err());
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
