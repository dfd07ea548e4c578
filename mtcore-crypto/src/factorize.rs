//! Splitting the handshake's 64-bit `pq` into its two prime factors.

use num_bigint::BigUint;

use crate::prime;

/// Iteration cap for the Fermat fallback.
const FERMAT_STEPS: u64 = 1 << 20;

/// Cycle length at which one Pollard-rho run gives up. A 32-bit factor
/// shows up after about 2^16 steps.
const RHO_LIMIT: u128 = 1 << 22;

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 { let t = b; b = a % b; a = t; }
    a
}

fn abs_sub(a: u128, b: u128) -> u128 { a.max(b) - a.min(b) }

fn step(y: u128, c: u128, n: u128) -> u128 { (y * y % n + c) % n }

/// One Pollard-rho run (Brent's cycle detection) with increment `c`.
/// Returns a non-trivial divisor, or `None` if this `c` degenerated.
fn pollard_brent(n: u128, c: u128) -> Option<u128> {
    if n % 2 == 0 {
        return Some(2);
    }

    let m = 128u128;
    let mut y = 3 * (n / 7) % n;
    let mut g = 1u128;
    let mut r = 1u128;
    let mut q = 1u128;
    let mut x = 0u128;
    let mut ys = 0u128;

    while g == 1 {
        x = y;
        for _ in 0..r { y = step(y, c, n); }
        let mut k = 0;
        while k < r && g == 1 {
            ys = y;
            for _ in 0..m.min(r - k) {
                y = step(y, c, n);
                q = q * abs_sub(x, y) % n;
            }
            g = gcd(q, n);
            k += m;
        }
        r *= 2;
        if r > RHO_LIMIT {
            return None;
        }
    }

    if g == n {
        // backtrack one step at a time from the last saved point
        loop {
            ys = step(ys, c, n);
            g = gcd(abs_sub(x, ys), n);
            if g > 1 { break; }
        }
    }

    (g != n && g != 1).then_some(g)
}

fn isqrt(n: u128) -> u128 {
    if n < 2 { return n; }
    let mut x = (n as f64).sqrt() as u128;
    while x * x > n { x -= 1; }
    while (x + 1) * (x + 1) <= n { x += 1; }
    x
}

/// Fermat's method: fast when the factors are close, which they are for
/// handshake challenges of two 32-bit primes.
fn fermat(n: u128) -> Option<u128> {
    if n % 2 == 0 {
        return Some(2);
    }
    let mut a = isqrt(n);
    if a * a < n { a += 1; }
    for _ in 0..FERMAT_STEPS {
        let b2 = a * a - n;
        let b = isqrt(b2);
        if b * b == b2 {
            let p = a - b;
            return (p > 1).then_some(p);
        }
        a += 1;
    }
    None
}

/// Factor `pq` into `(p, q)` with `1 < p <= q`.
///
/// Tries Pollard-rho with a few increments, then Fermat. Returns `None` for
/// primes and for inputs neither method splits.
pub fn factorize(pq: u64) -> Option<(u64, u64)> {
    if pq < 4 || prime::is_probable_prime(&BigUint::from(pq)) {
        return None;
    }
    let n = pq as u128;
    let divisor = [43u128, 47, 53, 59, 61]
        .into_iter()
        .find_map(|attempt| pollard_brent(n, attempt * (n / 103) % n + 1))
        .or_else(|| fermat(n))?;

    let p = divisor as u64;
    let q = (n / divisor) as u64;
    Some((p.min(q), p.max(q)))
}
