//! Prime delay-length selection for the FDN.
//!
//! Delay lengths must be pairwise coprime so the recirculating loops never
//! share a period; candidates are primes picked near target lengths.

use crate::error::{config_err, Result};

pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut d = 3;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 2;
    }
    true
}

/// Smallest prime strictly greater than `n`.
pub fn next_prime(n: u64) -> u64 {
    let mut p = n + 1;
    while !is_prime(p) {
        p += 1;
    }
    p
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

pub fn is_mutually_prime(values: &[usize]) -> bool {
    values.iter().enumerate().all(|(i, &a)| {
        values[i + 1..]
            .iter()
            .all(|&b| gcd(a as u64, b as u64) == 1)
    })
}

/// The next prime above each target, skipping primes already taken so the
/// result has no duplicates.
pub fn closest_primes(targets: &[usize]) -> Vec<usize> {
    let mut out: Vec<usize> = Vec::with_capacity(targets.len());
    for &t in targets {
        let mut p = next_prime(t as u64) as usize;
        while out.contains(&p) {
            p = next_prime(p as u64 + 1) as usize;
        }
        out.push(p);
    }
    out
}

/// `count` log-spaced primes within `±percent` of `center`.
///
/// The spread starts at `percent` and widens one percent at a time until the
/// set is pairwise coprime with `count` members.
pub fn log_mutual_primes(center: usize, count: usize, percent: u32) -> Result<Vec<usize>> {
    if count == 0 || center < 2 {
        return config_err(format!(
            "cannot place {count} prime delays around {center} samples"
        ));
    }
    for p in percent..99 {
        let offset = center as f64 * p as f64 / 100.0;
        let start = ((center as f64 - offset) as usize).max(1) as f64;
        let end = (center as f64 + offset) as usize as f64;
        let points: Vec<usize> = (0..count)
            .map(|i| {
                let t = if count == 1 { 0.0 } else { i as f64 / (count - 1) as f64 };
                10f64.powf(start.log10() + t * (end.log10() - start.log10())) as usize
            })
            .collect();
        let primes = closest_primes(&points);
        if primes.len() == count && is_mutually_prime(&primes) {
            return Ok(primes);
        }
    }
    config_err(format!(
        "no coprime set of {count} delays found around {center} samples"
    ))
}

/// Pick `order` values from `candidates` by sorted k-th element sampling.
pub fn select_order(candidates: &[usize], order: usize) -> Result<Vec<usize>> {
    if order == 0 {
        return config_err("FDN order must be at least 1");
    }
    if order > candidates.len() {
        return config_err(format!(
            "FDN order {order} exceeds the {} available delay candidates",
            candidates.len()
        ));
    }
    let mut sorted = candidates.to_vec();
    sorted.sort_unstable();
    let k = sorted.len() as f64 / order as f64;
    Ok((0..order).map(|i| sorted[(i as f64 * k) as usize]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_prime_is_strictly_greater() {
        assert_eq!(next_prime(7), 11);
        assert_eq!(next_prime(0), 2);
        assert_eq!(next_prime(808), 809);
    }

    #[test]
    fn closest_primes_are_unique() {
        let p = closest_primes(&[100, 100, 101]);
        assert_eq!(p, vec![101, 103, 107]);
        assert!(is_mutually_prime(&p));
    }

    #[test]
    fn coprime_check() {
        assert!(is_mutually_prime(&[809, 877, 937, 1049, 1151, 1249, 1373, 1499]));
        assert!(!is_mutually_prime(&[6, 35, 9]));
        assert!(is_mutually_prime(&[8, 9, 25]));
    }

    #[test]
    fn log_mutual_primes_around_center() {
        for n in [4, 6, 8, 16] {
            let p = log_mutual_primes(1000, n, 50).unwrap();
            assert_eq!(p.len(), n);
            assert!(is_mutually_prime(&p));
            assert!(p.iter().all(|&v| v > 400 && v < 1600), "{p:?}");
            assert!(p.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn select_order_samples_sorted_candidates() {
        let c = [11, 3, 7, 5, 13, 2, 17, 19];
        assert_eq!(select_order(&c, 4).unwrap(), vec![2, 5, 11, 17]);
        assert_eq!(select_order(&c, 8).unwrap().len(), 8);
        assert!(select_order(&c, 9).is_err());
        assert!(select_order(&c, 0).is_err());
    }
}
