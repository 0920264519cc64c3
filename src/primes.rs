//! Deterministic table sizing.
//!
//! Multi-table stores take the same 64-bit key modulo several distinct
//! primes; that behaves like several independent hash functions derived
//! from one hash value, which is what lets a Bloom / Count-Min table get
//! away with a single hash computation per k-mer.

/// Collect up to `n` distinct odd primes at or below `x`, scanning downward
/// from `x - 1` in steps of two with trial-division primality testing.
///
/// Returns `[1]` for the degenerate `x == 1`. May return fewer than `n`
/// primes when the range below `x` runs out; callers must tolerate a
/// shorter vector. Deterministic for a given `(n, x)`.
pub fn primes_near(n: usize, x: u64) -> Vec<u64> {
    let mut primes = Vec::with_capacity(n);
    if x == 1 {
        primes.push(1);
        return primes;
    }
    let mut i = x - 1;
    if i % 2 == 0 {
        i -= 1;
    }
    while primes.len() < n && i > 1 {
        if is_prime(i) {
            primes.push(i);
        }
        i -= 2;
    }
    primes
}

fn is_prime(v: u64) -> bool {
    if v < 2 {
        return false;
    }
    if v == 2 {
        return true;
    }
    if v % 2 == 0 {
        return false;
    }
    let mut d = 3u64;
    while d * d <= v {
        if v % d == 0 {
            return false;
        }
        d += 2;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_one() {
        assert_eq!(primes_near(3, 1), vec![1]);
    }

    #[test]
    fn deterministic_and_prime() {
        let a = primes_near(4, 1000);
        let b = primes_near(4, 1000);
        assert_eq!(a, b);
        assert_eq!(a.len(), 4);
        for &p in &a {
            assert!(p < 1000);
            assert!(is_prime(p), "{} must be prime", p);
        }
        // strictly decreasing, hence distinct
        for w in a.windows(2) {
            assert!(w[0] > w[1]);
        }
    }

    #[test]
    fn excludes_x_itself() {
        // 13 is prime but the scan starts at x - 1
        let p = primes_near(1, 13);
        assert_eq!(p, vec![11]);
    }

    #[test]
    fn short_range_returns_fewer() {
        // only 3 and 5 are odd primes below 7
        let p = primes_near(10, 7);
        assert_eq!(p, vec![5, 3]);
    }
}
