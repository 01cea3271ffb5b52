//! Probable-prime generation for Paillier keys.
//!
//! Candidates of the requested bit length are screened by trial division
//! against a table of small primes, then put through 25 rounds of
//! Miller-Rabin. 25 rounds pushes the error probability below 2^-50, far
//! beyond what the surrounding protocol needs.

use num_bigint::{BigUint, RandBigInt};
use num_integer::Integer;
use num_traits::One;
use rand::Rng;

const MILLER_RABIN_ROUNDS: usize = 25;

const SMALL_PRIMES: [u32; 54] = [
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89,
    97, 101, 103, 107, 109, 113, 127, 131, 137, 139, 149, 151, 157, 163, 167, 173, 179, 181,
    191, 193, 197, 199, 211, 223, 227, 229, 233, 239, 241, 251,
];

/// Generate a random probable prime of exactly `bits` bits.
///
/// The top bit is forced so the product of two such primes lands within one
/// bit of the requested modulus size; the caller resamples when it misses.
pub(crate) fn generate_prime<R: Rng>(bits: u64, rng: &mut R) -> BigUint {
    assert!(bits >= 8, "prime size too small for a Paillier modulus");
    loop {
        let mut candidate = rng.gen_biguint(bits);
        candidate.set_bit(bits - 1, true);
        candidate.set_bit(0, true);
        if is_probable_prime(&candidate, rng) {
            return candidate;
        }
    }
}

/// Miller-Rabin primality test with a small-prime pre-screen.
pub(crate) fn is_probable_prime<R: Rng>(n: &BigUint, rng: &mut R) -> bool {
    let two = BigUint::from(2u32);
    if n < &two {
        return false;
    }
    for &p in SMALL_PRIMES.iter() {
        let p = BigUint::from(p);
        if n == &p {
            return true;
        }
        if n.is_multiple_of(&p) {
            return false;
        }
    }

    // Write n - 1 = 2^s * d with d odd.
    let n_minus_one = n - BigUint::one();
    let s = n_minus_one
        .trailing_zeros()
        .expect("n - 1 is nonzero for n > 2");
    let d = &n_minus_one >> s;

    'witness: for _ in 0..MILLER_RABIN_ROUNDS {
        let a = rng.gen_biguint_range(&two, &(n - &two));
        let mut x = a.modpow(&d, n);
        if x.is_one() || x == n_minus_one {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_small_numbers() {
        let mut rng = rand::thread_rng();
        let primes = [2u32, 3, 5, 97, 251, 257, 65537];
        for p in primes {
            assert!(is_probable_prime(&BigUint::from(p), &mut rng), "{p}");
        }
        let composites = [0u32, 1, 4, 15, 255, 561, 65535];
        for c in composites {
            assert!(!is_probable_prime(&BigUint::from(c), &mut rng), "{c}");
        }
    }

    #[test]
    fn generated_primes_have_exact_bit_length() {
        let mut rng = rand::thread_rng();
        let p = generate_prime(128, &mut rng);
        assert_eq!(p.bits(), 128);
        assert!(p.is_odd());
        assert!(is_probable_prime(&p, &mut rng));
    }
}
