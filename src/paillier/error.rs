use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PaillierError {
    #[error("Private key not set")]
    MissingPrivateKey,

    #[error("Cannot aggregate an empty list of ciphertexts")]
    EmptyCiphertexts,

    #[error("Candidate index {candidate} out of range [0, {num_candidates})")]
    CandidateOutOfRange {
        candidate: usize,
        num_candidates: usize,
    },

    #[error("An election needs at least 2 candidates, got {num_candidates}")]
    TooFewCandidates { num_candidates: usize },

    #[error("Ballot length mismatch: expected {expected} ciphertexts, got {actual}")]
    BallotLengthMismatch { expected: usize, actual: usize },

    #[error("Ciphertext exponents differ: {left} vs {right}")]
    ExponentMismatch { left: i64, right: i64 },

    #[error("Unsupported ciphertext exponent {exponent}; only the integer encoding (exponent 0) is handled")]
    UnsupportedExponent { exponent: i64 },

    #[error("Malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Decrypted value exceeds the integer range of a tally")]
    PlaintextTooLarge,
}
