//! Paillier homomorphic encryption for the second tally path.
//!
//! Textbook Paillier with the `g = n + 1` generator: encryption is
//! `(1 + m*n) * r^n mod n^2`, and multiplying ciphertexts adds plaintexts.
//! The wire formats stay compatible with the `phe` library the rest of the
//! deployment speaks: ciphertexts carry an `(integer, exponent)` pair and
//! travel as base64-wrapped JSON, keys as decimal-string dictionaries.

pub mod error;
mod primes;

pub use error::PaillierError;

use std::str::FromStr;
use std::thread;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use num_bigint::{BigInt, BigUint, RandBigInt};
use num_integer::Integer;
use num_traits::{One, ToPrimitive, Zero};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use primes::generate_prime;

const LOG_TARGET: &str = "ballot_engine::paillier";

/// Default modulus size in bits for production keys.
pub const DEFAULT_KEY_SIZE: u64 = 2048;

/// Modular inverse via the extended Euclidean algorithm.
fn mod_inverse(a: &BigUint, modulus: &BigUint) -> Option<BigUint> {
    let a = BigInt::from(a.clone());
    let modulus = BigInt::from(modulus.clone());
    let ext = a.extended_gcd(&modulus);
    if !ext.gcd.is_one() {
        return None;
    }
    ext.x.mod_floor(&modulus).to_biguint()
}

/// Paillier public key: the modulus `n`, with `n^2` precomputed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaillierPublicKey {
    n: BigUint,
    n_squared: BigUint,
}

impl PaillierPublicKey {
    pub fn new(n: BigUint) -> Self {
        let n_squared = &n * &n;
        Self { n, n_squared }
    }

    pub fn n(&self) -> &BigUint {
        &self.n
    }

    /// Sample a unit of Z*_n: uniform in [1, n) with gcd(r, n) = 1.
    fn sample_unit<R: Rng>(&self, rng: &mut R) -> BigUint {
        loop {
            let r = rng.gen_biguint_range(&BigUint::one(), &self.n);
            if r.gcd(&self.n).is_one() {
                return r;
            }
        }
    }

    /// Encrypt an integer with fresh randomness:
    /// `c = (1 + m*n) * r^n mod n^2`.
    pub fn encrypt<R: Rng>(&self, value: u64, rng: &mut R) -> EncryptedNumber {
        let m = BigUint::from(value);
        let nude = (BigUint::one() + &m * &self.n) % &self.n_squared;
        let r = self.sample_unit(rng);
        let obfuscator = r.modpow(&self.n, &self.n_squared);
        EncryptedNumber {
            ciphertext: (nude * obfuscator) % &self.n_squared,
            exponent: 0,
        }
    }

    /// Homomorphic addition of two ciphertexts (modular multiplication).
    pub fn add(
        &self,
        left: &EncryptedNumber,
        right: &EncryptedNumber,
    ) -> Result<EncryptedNumber, PaillierError> {
        if left.exponent != right.exponent {
            return Err(PaillierError::ExponentMismatch {
                left: left.exponent,
                right: right.exponent,
            });
        }
        Ok(EncryptedNumber {
            ciphertext: (&left.ciphertext * &right.ciphertext) % &self.n_squared,
            exponent: left.exponent,
        })
    }
}

/// Paillier private key `(p, q)` with the decryption exponents precomputed:
/// `lambda = lcm(p-1, q-1)` and `mu = L(g^lambda mod n^2)^-1 mod n`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaillierPrivateKey {
    p: BigUint,
    q: BigUint,
    lambda: BigUint,
    mu: BigUint,
}

impl PaillierPrivateKey {
    pub fn new(p: BigUint, q: BigUint) -> Result<Self, PaillierError> {
        if p == q {
            return Err(PaillierError::InvalidKey(
                "prime factors must be distinct".to_string(),
            ));
        }
        if p.is_one() || q.is_one() || p.is_zero() || q.is_zero() {
            return Err(PaillierError::InvalidKey(
                "prime factors must exceed 1".to_string(),
            ));
        }

        let n = &p * &q;
        let n_squared = &n * &n;
        let lambda = (&p - BigUint::one()).lcm(&(&q - BigUint::one()));

        // g = n + 1, so L(g^lambda mod n^2) has an inverse iff gcd(lambda, n) = 1.
        let g = &n + BigUint::one();
        let l_value = l_function(&g.modpow(&lambda, &n_squared), &n);
        let mu = mod_inverse(&l_value, &n).ok_or_else(|| {
            PaillierError::InvalidKey("decryption exponent is not invertible".to_string())
        })?;

        Ok(Self { p, q, lambda, mu })
    }

    pub fn p(&self) -> &BigUint {
        &self.p
    }

    pub fn q(&self) -> &BigUint {
        &self.q
    }
}

/// `L(u) = (u - 1) / n`.
fn l_function(u: &BigUint, n: &BigUint) -> BigUint {
    (u - BigUint::one()) / n
}

/// A Paillier ciphertext in the phe wire representation.
///
/// The exponent tags the fixed-point encoding; the integer encoding used for
/// ballots always carries exponent 0, and aggregation requires matching
/// exponents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedNumber {
    pub ciphertext: BigUint,
    pub exponent: i64,
}

#[derive(Serialize, Deserialize)]
struct CiphertextEnvelope {
    ciphertext: String,
    exponent: i64,
}

/// Public-key dictionary form: `{"n": "<decimal>"}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyDict {
    pub n: String,
}

/// Private-key dictionary form: `{"p": "<decimal>", "q": "<decimal>"}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateKeyDict {
    pub p: String,
    pub q: String,
}

/// The Paillier engine: always holds a public key, optionally the private
/// key. Reconstituting from a serialized public key yields an encrypt-only
/// engine; decryption and private-key serialization then fail with
/// [`PaillierError::MissingPrivateKey`].
#[derive(Clone, Debug)]
pub struct PaillierEngine {
    public_key: PaillierPublicKey,
    private_key: Option<PaillierPrivateKey>,
}

impl PaillierEngine {
    /// Generate a fresh keypair with a modulus of exactly `key_size` bits.
    #[instrument(target = LOG_TARGET, skip(rng))]
    pub fn generate<R: Rng>(key_size: u64, rng: &mut R) -> Result<Self, PaillierError> {
        if key_size < 16 {
            return Err(PaillierError::InvalidKey(format!(
                "modulus size {key_size} is too small"
            )));
        }
        loop {
            let p = generate_prime(key_size / 2, rng);
            let q = generate_prime(key_size / 2, rng);
            if p == q {
                continue;
            }
            let n = &p * &q;
            if n.bits() != key_size {
                continue;
            }
            debug!(target: LOG_TARGET, key_size, "generated Paillier modulus");
            return Ok(Self {
                public_key: PaillierPublicKey::new(n),
                private_key: Some(PaillierPrivateKey::new(p, q)?),
            });
        }
    }

    pub fn public_key(&self) -> &PaillierPublicKey {
        &self.public_key
    }

    fn private_key(&self) -> Result<&PaillierPrivateKey, PaillierError> {
        self.private_key
            .as_ref()
            .ok_or(PaillierError::MissingPrivateKey)
    }

    pub fn encrypt<R: Rng>(&self, value: u64, rng: &mut R) -> EncryptedNumber {
        self.public_key.encrypt(value, rng)
    }

    /// Decrypt to the integer plaintext: `m = L(c^lambda mod n^2) * mu mod n`.
    pub fn decrypt(&self, encrypted: &EncryptedNumber) -> Result<u64, PaillierError> {
        let key = self.private_key()?;
        if encrypted.exponent != 0 {
            return Err(PaillierError::UnsupportedExponent {
                exponent: encrypted.exponent,
            });
        }
        let n = &self.public_key.n;
        let n_squared = &self.public_key.n_squared;
        if encrypted.ciphertext >= *n_squared || encrypted.ciphertext.is_zero() {
            return Err(PaillierError::MalformedCiphertext(
                "ciphertext outside [1, n^2)".to_string(),
            ));
        }

        let u = encrypted.ciphertext.modpow(&key.lambda, n_squared);
        let m = (l_function(&u, n) * &key.mu) % n;
        m.to_u64().ok_or(PaillierError::PlaintextTooLarge)
    }

    /// Homomorphically fold a list of ciphertexts into the encryption of the
    /// sum of their plaintexts. Empty input fails.
    pub fn add_encrypted(
        &self,
        encrypted: &[EncryptedNumber],
    ) -> Result<EncryptedNumber, PaillierError> {
        let (first, rest) = encrypted
            .split_first()
            .ok_or(PaillierError::EmptyCiphertexts)?;
        let mut total = first.clone();
        for value in rest {
            total = self.public_key.add(&total, value)?;
        }
        Ok(total)
    }

    /// Encrypt a ballot as a one-hot vector over `num_candidates` positions.
    pub fn encrypt_vote_onehot<R: Rng>(
        &self,
        candidate: usize,
        num_candidates: usize,
        rng: &mut R,
    ) -> Result<Vec<EncryptedNumber>, PaillierError> {
        if num_candidates < 2 {
            return Err(PaillierError::TooFewCandidates { num_candidates });
        }
        if candidate >= num_candidates {
            return Err(PaillierError::CandidateOutOfRange {
                candidate,
                num_candidates,
            });
        }
        Ok((0..num_candidates)
            .map(|i| self.encrypt(u64::from(i == candidate), rng))
            .collect())
    }

    // ---- serialization ----

    pub fn serialize_public_key(&self) -> PublicKeyDict {
        PublicKeyDict {
            n: self.public_key.n.to_str_radix(10),
        }
    }

    /// Reconstitute an encrypt-only engine from a public-key dictionary.
    pub fn from_public_key_dict(data: &PublicKeyDict) -> Result<Self, PaillierError> {
        let n = parse_decimal(&data.n)
            .ok_or_else(|| PaillierError::InvalidKey(format!("bad modulus: {}", data.n)))?;
        Ok(Self {
            public_key: PaillierPublicKey::new(n),
            private_key: None,
        })
    }

    pub fn serialize_private_key(&self) -> Result<PrivateKeyDict, PaillierError> {
        let key = self.private_key()?;
        Ok(PrivateKeyDict {
            p: key.p.to_str_radix(10),
            q: key.q.to_str_radix(10),
        })
    }

    /// Reconstitute a full engine from private- and public-key dictionaries;
    /// the factors must multiply to the published modulus.
    pub fn from_private_key_dict(
        private_data: &PrivateKeyDict,
        public_data: &PublicKeyDict,
    ) -> Result<Self, PaillierError> {
        let n = parse_decimal(&public_data.n)
            .ok_or_else(|| PaillierError::InvalidKey(format!("bad modulus: {}", public_data.n)))?;
        let p = parse_decimal(&private_data.p)
            .ok_or_else(|| PaillierError::InvalidKey(format!("bad factor: {}", private_data.p)))?;
        let q = parse_decimal(&private_data.q)
            .ok_or_else(|| PaillierError::InvalidKey(format!("bad factor: {}", private_data.q)))?;
        if &p * &q != n {
            return Err(PaillierError::InvalidKey(
                "factors do not match the public modulus".to_string(),
            ));
        }
        Ok(Self {
            public_key: PaillierPublicKey::new(n),
            private_key: Some(PaillierPrivateKey::new(p, q)?),
        })
    }

    /// Serialize a ciphertext as base64 over the UTF-8 JSON envelope
    /// `{"ciphertext": "<decimal>", "exponent": <int>}`.
    pub fn serialize_encrypted(
        &self,
        encrypted: &EncryptedNumber,
    ) -> Result<String, PaillierError> {
        let envelope = CiphertextEnvelope {
            ciphertext: encrypted.ciphertext.to_str_radix(10),
            exponent: encrypted.exponent,
        };
        let json = serde_json::to_string(&envelope)
            .map_err(|e| PaillierError::Serialization(e.to_string()))?;
        Ok(BASE64.encode(json.as_bytes()))
    }

    /// Deserialize a ciphertext; the public key bounds the accepted range.
    pub fn deserialize_encrypted(&self, data: &str) -> Result<EncryptedNumber, PaillierError> {
        let json = BASE64
            .decode(data)
            .map_err(|e| PaillierError::MalformedCiphertext(e.to_string()))?;
        let envelope: CiphertextEnvelope = serde_json::from_slice(&json)
            .map_err(|e| PaillierError::MalformedCiphertext(e.to_string()))?;
        let ciphertext = parse_decimal(&envelope.ciphertext).ok_or_else(|| {
            PaillierError::MalformedCiphertext("non-decimal ciphertext".to_string())
        })?;
        if ciphertext >= self.public_key.n_squared {
            return Err(PaillierError::MalformedCiphertext(
                "ciphertext exceeds n^2".to_string(),
            ));
        }
        Ok(EncryptedNumber {
            ciphertext,
            exponent: envelope.exponent,
        })
    }

    pub fn serialize_vote(
        &self,
        ballot: &[EncryptedNumber],
    ) -> Result<Vec<String>, PaillierError> {
        ballot.iter().map(|e| self.serialize_encrypted(e)).collect()
    }

    pub fn deserialize_vote(
        &self,
        serialized: &[String],
    ) -> Result<Vec<EncryptedNumber>, PaillierError> {
        serialized
            .iter()
            .map(|s| self.deserialize_encrypted(s))
            .collect()
    }

    // ---- tallying ----

    /// Sequential tally: fold each candidate column, then decrypt.
    #[instrument(target = LOG_TARGET, skip_all, fields(votes = votes.len(), num_candidates))]
    pub fn homomorphic_tally(
        &self,
        votes: &[Vec<EncryptedNumber>],
        num_candidates: usize,
    ) -> Result<Vec<u64>, PaillierError> {
        self.private_key()?;
        self.check_ballots(votes, num_candidates)?;
        if votes.is_empty() {
            return Ok(vec![0; num_candidates]);
        }

        let mut results = Vec::with_capacity(num_candidates);
        for column in 0..num_candidates {
            let total = self.sum_column(votes, column)?;
            results.push(self.decrypt(&total)?);
        }
        Ok(results)
    }

    /// Parallel tally: one worker per candidate column, joined before any
    /// decryption. Output order is by candidate index, independent of
    /// completion order, and the counts are identical to the sequential path.
    #[instrument(target = LOG_TARGET, skip_all, fields(votes = votes.len(), num_candidates))]
    pub fn homomorphic_tally_parallel(
        &self,
        votes: &[Vec<EncryptedNumber>],
        num_candidates: usize,
    ) -> Result<Vec<u64>, PaillierError> {
        self.private_key()?;
        self.check_ballots(votes, num_candidates)?;
        if votes.is_empty() {
            return Ok(vec![0; num_candidates]);
        }

        let totals: Vec<Result<EncryptedNumber, PaillierError>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..num_candidates)
                .map(|column| scope.spawn(move || self.sum_column(votes, column)))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("column worker panicked"))
                .collect()
        });

        totals
            .into_iter()
            .map(|total| self.decrypt(&total?))
            .collect()
    }

    fn sum_column(
        &self,
        votes: &[Vec<EncryptedNumber>],
        column: usize,
    ) -> Result<EncryptedNumber, PaillierError> {
        let column_votes: Vec<EncryptedNumber> =
            votes.iter().map(|vote| vote[column].clone()).collect();
        self.add_encrypted(&column_votes)
    }

    fn check_ballots(
        &self,
        votes: &[Vec<EncryptedNumber>],
        num_candidates: usize,
    ) -> Result<(), PaillierError> {
        for vote in votes {
            if vote.len() != num_candidates {
                return Err(PaillierError::BallotLengthMismatch {
                    expected: num_candidates,
                    actual: vote.len(),
                });
            }
        }
        Ok(())
    }
}

fn parse_decimal(s: &str) -> Option<BigUint> {
    BigUint::from_str(s).ok()
}
