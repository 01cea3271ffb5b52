use crate::curve::CurveError;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ElGamalError {
    #[error("Curve error: {0}")]
    Curve(#[from] CurveError),

    #[error("Cannot aggregate an empty list of ciphertexts")]
    EmptyCiphertexts,

    #[error("Candidate index {candidate} out of range [0, {num_candidates})")]
    CandidateOutOfRange {
        candidate: usize,
        num_candidates: usize,
    },

    #[error("Randomness list length mismatch: expected {expected}, got {actual}")]
    RandomnessLengthMismatch { expected: usize, actual: usize },

    #[error("Ballot length mismatch: expected {expected} ciphertexts, got {actual}")]
    BallotLengthMismatch { expected: usize, actual: usize },

    #[error("Discrete log not found in range [0, {max_value}]")]
    DlogOutOfRange { max_value: u64 },

    #[error("Malformed ciphertext: {0}")]
    MalformedCiphertext(String),
}
