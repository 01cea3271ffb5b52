//! Exponential ElGamal over BabyJubJub.
//!
//! Messages are encoded as curve points `m*G`, which makes the scheme
//! additively homomorphic: ciphertexts sum component-wise and the aggregate
//! decrypts to the sum of the plaintexts. Decryption recovers the integer via
//! the baby-step/giant-step solver in [`dlog`], bounded by the expected
//! maximum tally.

pub mod dlog;
pub mod error;

pub use dlog::solve_dlog;
pub use error::ElGamalError;

use ark_std::rand::Rng;
use ark_std::{UniformRand, Zero};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::curve::{fq_from_decimal, fq_to_decimal, Fr, Point, GENERATOR};

const LOG_TARGET: &str = "ballot_engine::elgamal";

/// Default search bound for discrete-log recovery on decryption.
pub const DEFAULT_DLOG_BOUND: u64 = 10_000;

/// Sample a uniformly random scalar in `[1, n-1]`.
fn random_nonzero_scalar<R: Rng>(rng: &mut R) -> Fr {
    loop {
        let scalar = Fr::rand(rng);
        if !scalar.is_zero() {
            return scalar;
        }
    }
}

/// An ElGamal key pair `(sk, pk)` with `pk = sk * G`.
///
/// Serializes as `{"sk": "<decimal>", "pk": ["<decimal>", "<decimal>"]}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElGamalKeypair {
    #[serde(with = "crate::crypto_serde::fr_decimal")]
    pub sk: Fr,
    pub pk: Point,
}

impl ElGamalKeypair {
    /// Generate a fresh key pair; the secret key is uniform in `[1, n-1]`.
    #[instrument(target = LOG_TARGET, skip_all)]
    pub fn generate<R: Rng>(rng: &mut R) -> Result<Self, ElGamalError> {
        Self::from_sk(random_nonzero_scalar(rng))
    }

    /// Derive the key pair for a known secret key.
    pub fn from_sk(sk: Fr) -> Result<Self, ElGamalError> {
        let pk = GENERATOR.mul_scalar(&sk)?;
        Ok(Self { sk, pk })
    }
}

/// An ElGamal ciphertext `(C1, C2) = (r*G, m*G + r*pk)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElGamalCiphertext {
    pub c1: Point,
    pub c2: Point,
}

impl ElGamalCiphertext {
    pub fn new(c1: Point, c2: Point) -> Self {
        Self { c1, c2 }
    }

    /// Encrypt an integer message with fresh randomness.
    pub fn encrypt<R: Rng>(
        message: u64,
        pk: &Point,
        rng: &mut R,
    ) -> Result<Self, ElGamalError> {
        Self::encrypt_with_randomness(message, pk, &random_nonzero_scalar(rng))
    }

    /// Encrypt with caller-supplied randomness.
    ///
    /// Deterministic; used by tests and circuit-witness generation. Voter
    /// paths always sample fresh randomness instead.
    pub fn encrypt_with_randomness(
        message: u64,
        pk: &Point,
        randomness: &Fr,
    ) -> Result<Self, ElGamalError> {
        let c1 = GENERATOR.mul_scalar(randomness)?;
        let message_point = GENERATOR.mul_scalar(&Fr::from(message))?;
        let c2 = message_point.add(&pk.mul_scalar(randomness)?)?;
        Ok(Self { c1, c2 })
    }

    /// Strip the encryption layer, leaving the message point `m*G = C2 - sk*C1`.
    pub fn decrypt_to_point(&self, sk: &Fr) -> Result<Point, ElGamalError> {
        Ok(self.c2.sub(&self.c1.mul_scalar(sk)?)?)
    }

    /// Decrypt to the integer message, searching discrete logs up to
    /// `max_value`.
    pub fn decrypt(&self, sk: &Fr, max_value: u64) -> Result<u64, ElGamalError> {
        let message_point = self.decrypt_to_point(sk)?;
        solve_dlog(&message_point, max_value)
    }

    /// Flatten to the canonical wire form `[c1.x, c1.y, c2.x, c2.y]` as
    /// decimal strings.
    pub fn to_flat(&self) -> [String; 4] {
        [
            fq_to_decimal(&self.c1.x),
            fq_to_decimal(&self.c1.y),
            fq_to_decimal(&self.c2.x),
            fq_to_decimal(&self.c2.y),
        ]
    }

    /// Parse the flat wire form, enforcing curve membership of both
    /// components.
    pub fn from_flat(flat: &[String; 4]) -> Result<Self, ElGamalError> {
        let parse = |s: &String| {
            fq_from_decimal(s)
                .map_err(|e| ElGamalError::MalformedCiphertext(e.to_string()))
        };
        let c1 = Point::new(parse(&flat[0])?, parse(&flat[1])?);
        let c2 = Point::new(parse(&flat[2])?, parse(&flat[3])?);
        if !c1.is_on_curve() || !c2.is_on_curve() {
            return Err(ElGamalError::MalformedCiphertext(
                "component point is not on the curve".to_string(),
            ));
        }
        Ok(Self { c1, c2 })
    }
}

/// Fold a list of ciphertexts into the encryption of the sum of their
/// plaintexts: `(Σ C1_i, Σ C2_i)`.
pub fn homomorphic_add(
    ciphertexts: &[ElGamalCiphertext],
) -> Result<ElGamalCiphertext, ElGamalError> {
    let (first, rest) = ciphertexts
        .split_first()
        .ok_or(ElGamalError::EmptyCiphertexts)?;

    let mut c1 = first.c1;
    let mut c2 = first.c2;
    for ct in rest {
        c1 = c1.add(&ct.c1)?;
        c2 = c2.add(&ct.c2)?;
    }
    Ok(ElGamalCiphertext { c1, c2 })
}

/// Encrypt a ballot as a one-hot vector: position `candidate` encrypts 1,
/// every other position encrypts 0, each under fresh randomness.
pub fn encrypt_vote_onehot<R: Rng>(
    candidate: usize,
    num_candidates: usize,
    pk: &Point,
    rng: &mut R,
) -> Result<Vec<ElGamalCiphertext>, ElGamalError> {
    let randomness: Vec<Fr> = (0..num_candidates)
        .map(|_| random_nonzero_scalar(rng))
        .collect();
    encrypt_vote_onehot_with_randomness(candidate, num_candidates, pk, &randomness)
}

/// Deterministic one-hot encryption; `randomness` must hold one scalar per
/// candidate position.
pub fn encrypt_vote_onehot_with_randomness(
    candidate: usize,
    num_candidates: usize,
    pk: &Point,
    randomness: &[Fr],
) -> Result<Vec<ElGamalCiphertext>, ElGamalError> {
    if candidate >= num_candidates {
        return Err(ElGamalError::CandidateOutOfRange {
            candidate,
            num_candidates,
        });
    }
    if randomness.len() != num_candidates {
        return Err(ElGamalError::RandomnessLengthMismatch {
            expected: num_candidates,
            actual: randomness.len(),
        });
    }

    (0..num_candidates)
        .map(|i| {
            let message = u64::from(i == candidate);
            ElGamalCiphertext::encrypt_with_randomness(message, pk, &randomness[i])
        })
        .collect()
}

/// Tally one-hot ballots: aggregate each candidate column homomorphically,
/// then decrypt the column sums with `max_votes` bounding the dlog search.
///
/// An empty ballot set yields an all-zero tally.
#[instrument(target = LOG_TARGET, skip_all, fields(votes = votes.len(), num_candidates, max_votes))]
pub fn homomorphic_tally(
    votes: &[Vec<ElGamalCiphertext>],
    num_candidates: usize,
    sk: &Fr,
    max_votes: u64,
) -> Result<Vec<u64>, ElGamalError> {
    if votes.is_empty() {
        return Ok(vec![0; num_candidates]);
    }
    for vote in votes {
        if vote.len() != num_candidates {
            return Err(ElGamalError::BallotLengthMismatch {
                expected: num_candidates,
                actual: vote.len(),
            });
        }
    }

    let mut results = Vec::with_capacity(num_candidates);
    for column in 0..num_candidates {
        let column_votes: Vec<ElGamalCiphertext> =
            votes.iter().map(|vote| vote[column]).collect();
        let aggregated = homomorphic_add(&column_votes)?;
        let count = aggregated.decrypt(sk, max_votes)?;
        results.push(count);
    }

    debug!(target: LOG_TARGET, ?results, "tally complete");
    Ok(results)
}
