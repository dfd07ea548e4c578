//! Diffie-Hellman parameter validation.

use std::sync::OnceLock;

use num_bigint::BigUint;
use num_traits::{One, Zero};

/// Miller-Rabin rounds for each of `p` and `(p - 1) / 2`.
const MILLER_RABIN_ROUNDS: usize = 30;

/// Size of every prime the server may hand out.
const PRIME_BITS: u64 = 2048;

/// The prime production servers have used since the protocol's first layer.
const KNOWN_GOOD_PRIME: &str = "\
C71CAEB9C6B1C9048E6C522F70F13F73980D40238E3E21C14934D037563D930F\
48198A0AA7C14058229493D22530F4DBFA336F6E0AC925139543AED44CCE7C37\
20FD51F69458705AC68CD4FE6B6B13ABDC9746512969328454F18FAF8C595F64\
2477FE96BB2A941D5BCD1D4AC8CC49880708FA9B378E3C4F3A9060BEE67CF9A4\
A4A695811051907E162753B56B0F6B410DBA74D8A84B2A14B3144E0EF1284754\
FD17ED950D5965B4B9DD46582DB1178D169C6BC465B0D6FF9CA3928FEF5B9AE4\
E418FC15E83EBEA0F87FA9FF5EED70050DED2849F47BF959D956850CE929851F\
0D8115F635B105EE2E4E15D04B2454BF6F4FADF034B10403119CD8E3B92FCC5B";

/// The well-known server prime as a number.
pub fn known_good_prime() -> &'static BigUint {
    static PRIME: OnceLock<BigUint> = OnceLock::new();
    PRIME.get_or_init(|| {
        BigUint::parse_bytes(KNOWN_GOOD_PRIME.as_bytes(), 16).unwrap_or_default()
    })
}

const SMALL_PRIMES: [u32; MILLER_RABIN_ROUNDS] = [
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47,
    53, 59, 61, 67, 71, 73, 79, 83, 89, 97, 101, 103, 107, 109, 113,
];

/// Miller-Rabin with the first [`MILLER_RABIN_ROUNDS`] primes as witnesses.
pub fn is_probable_prime(n: &BigUint) -> bool {
    let one = BigUint::one();
    let two = BigUint::from(2u32);
    if *n < two {
        return false;
    }
    for &p in &SMALL_PRIMES {
        let p = BigUint::from(p);
        if *n == p {
            return true;
        }
        if (n % &p).is_zero() {
            return false;
        }
    }

    let n_minus_one = n - &one;
    let s = n_minus_one.trailing_zeros().unwrap_or(0);
    let d = &n_minus_one >> s;

    'witness: for &a in &SMALL_PRIMES {
        let mut x = BigUint::from(a).modpow(&d, n);
        if x == one || x == n_minus_one {
            continue;
        }
        for _ in 1..s {
            x = x.modpow(&two, n);
            if x == n_minus_one {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// `p mod m` for a small modulus.
fn residue(p: &BigUint, m: u32) -> u32 {
    let r = p % BigUint::from(m);
    r.iter_u32_digits().next().unwrap_or(0)
}

/// Checks that `g` generates a subgroup of order `(p - 1) / 2`.
fn generator_fits(p: &BigUint, g: i32) -> bool {
    match g {
        2 => residue(p, 8) == 7,
        3 => residue(p, 3) == 2,
        4 => true,
        5 => matches!(residue(p, 5), 1 | 4),
        6 => matches!(residue(p, 24), 19 | 23),
        7 => matches!(residue(p, 7), 3 | 5 | 6),
        _ => false,
    }
}

/// `p` and `(p - 1) / 2` are both prime.
fn is_safe_prime(p: &BigUint) -> bool {
    is_probable_prime(p) && is_probable_prime(&((p - BigUint::one()) >> 1))
}

/// Whether `(p, g)` are acceptable Diffie-Hellman parameters.
///
/// The well-known server prime is accepted for `g` in {3, 4, 5, 7} without
/// further work. Any other prime must be exactly 2048 bits, a safe prime,
/// and `g` must be in 2..=7 with the matching residue condition.
pub fn is_good_prime(p: &BigUint, g: i32) -> bool {
    if p == known_good_prime() && matches!(g, 3 | 4 | 5 | 7) {
        return true;
    }
    if p.bits() != PRIME_BITS || !generator_fits(p, g) {
        log::warn!("[prime] rejecting dh_prime: bad size or generator {g}");
        return false;
    }
    if !is_safe_prime(p) {
        log::warn!("[prime] rejecting dh_prime: not a safe prime");
        return false;
    }
    true
}

/// `2^(2048-64) < value < prime - 2^(2048-64)`.
///
/// Applied to `g_a`, `g_b` and the server-supplied `g` powers so neither side
/// can force a small subgroup.
pub fn is_good_modexp(value: &BigUint, prime: &BigUint) -> bool {
    let margin = BigUint::one() << (PRIME_BITS - 64);
    if *prime <= &margin << 1 {
        return false;
    }
    *value > margin && *value < prime - &margin
}
