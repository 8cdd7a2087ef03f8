//! Keyed affine permutation modulo 62^L.
//!
//! The compact code generation maps an identifier through `x ↦ a·x + b mod m`
//! with `m = 62^L`, which fills exactly L base-62 digits. The map is a
//! bijection whenever `gcd(a, m) = 1`; since m's prime factors are exactly
//! {2, 31}, it is enough for `a` to be odd and not divisible by 31.
//!
//! Coefficients are re-derived from the key at both encode and decode time,
//! never stored, so derivation must be deterministic.

use sha2::{Digest, Sha256};

/// Largest supported code length. 62^10 < 2^63, so every intermediate
/// product of two coefficients fits comfortably in u128.
pub const MAX_SUPPORTED_LENGTH: usize = 10;

/// Derived parameters for one code length: modulus, multiplier, offset, and
/// the multiplier's inverse, computed once and reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AffineParams {
    pub m: u128,
    pub a: u128,
    pub b: u128,
    pub a_inv: u128,
}

impl AffineParams {
    /// Derive the parameter set for length `length` from `key`.
    ///
    /// The role tags `"a"` and `"b"` keep the two coefficient derivations
    /// independent even though they share the key and length.
    pub fn derive(key: &str, length: usize) -> Self {
        debug_assert!((1..=MAX_SUPPORTED_LENGTH).contains(&length));
        let m = 62u128.pow(length as u32);
        let a = make_coprime(hash_to_residue(key, "a", length, m), m);
        let b = hash_to_residue(key, "b", length, m);
        let a_inv = mod_inverse(a, m);
        Self { m, a, b, a_inv }
    }

    /// `(a·x + b) mod m`. Caller guarantees `x < m`.
    pub fn permute(&self, x: u128) -> u128 {
        (self.a * x + self.b) % self.m
    }

    /// `a⁻¹·(y − b) mod m`, the exact inverse of [`permute`](Self::permute).
    pub fn invert(&self, y: u128) -> u128 {
        let shifted = (y + self.m - self.b % self.m) % self.m;
        (self.a_inv * shifted) % self.m
    }
}

/// Force a candidate multiplier coprime to `m = 62^L`: reduce, map zero to
/// one, force odd, and nudge past multiples of 31. The +2 preserves oddness.
fn make_coprime(candidate: u128, m: u128) -> u128 {
    let mut a = candidate % m;
    if a == 0 {
        a = 1;
    }
    if a % 2 == 0 {
        a += 1;
    }
    if a % 31 == 0 {
        a += 2;
    }
    a %= m;
    if a == 0 {
        a = 1;
    }
    a
}

/// SHA-256 of `key | role | length`, folded byte-by-byte into a residue
/// mod m. Equivalent to interpreting the digest as a 256-bit unsigned
/// integer and reducing it.
fn hash_to_residue(key: &str, role: &str, length: usize, m: u128) -> u128 {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(b"|");
    hasher.update(role.as_bytes());
    hasher.update(b"|");
    hasher.update(length.to_string().as_bytes());
    let digest = hasher.finalize();

    // acc stays below m < 2^63, so acc * 256 + byte stays below 2^71.
    digest
        .iter()
        .fold(0u128, |acc, &byte| (acc * 256 + byte as u128) % m)
}

/// Multiplicative inverse of `a` mod `m` via the extended Euclidean
/// algorithm. Defined because `make_coprime` guarantees `gcd(a, m) = 1`.
fn mod_inverse(a: u128, m: u128) -> u128 {
    let (mut old_r, mut r) = (a as i128, m as i128);
    let (mut old_s, mut s) = (1i128, 0i128);

    while r != 0 {
        let q = old_r / r;
        (old_r, r) = (r, old_r - q * r);
        (old_s, s) = (s, old_s - q * s);
    }
    debug_assert_eq!(old_r, 1, "multiplier must be coprime to the modulus");

    old_s.rem_euclid(m as i128) as u128
}
