//! Salted SHA-256 vote commitments.
//!
//! A commitment binds a ballot integer before the reveal phase:
//! `c = SHA-256(vote_be4 || salt)`. It is binding under collision resistance
//! of SHA-256 and hiding as long as the salt is drawn uniformly from a
//! cryptographic source. The vote-proof helpers derive the two auxiliary
//! digests the on-chain verifier consumes.

use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Default salt length in bytes.
pub const SALT_LEN: usize = 32;

/// A 32-byte commitment digest.
pub type Commitment = [u8; 32];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommitmentError {
    #[error("Invalid hex digest: {0}")]
    InvalidHex(String),

    #[error("Digest must be 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// Draw a fresh random salt.
pub fn generate_salt<R: RngCore>(rng: &mut R) -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rng.fill_bytes(&mut salt);
    salt
}

/// Commit to a vote under a caller-supplied salt.
pub fn commit_with_salt(vote: u32, salt: &[u8]) -> Commitment {
    let mut hasher = Sha256::new();
    hasher.update(vote.to_be_bytes());
    hasher.update(salt);
    hasher.finalize().into()
}

/// Commit to a vote under a fresh salt; returns the commitment and the salt
/// the voter must retain for the reveal.
pub fn create_commitment<R: RngCore>(vote: u32, rng: &mut R) -> (Commitment, [u8; SALT_LEN]) {
    let salt = generate_salt(rng);
    (commit_with_salt(vote, &salt), salt)
}

/// Check a revealed (vote, salt) pair against a commitment.
pub fn verify_commitment(vote: u32, salt: &[u8], commitment: &Commitment) -> bool {
    commit_with_salt(vote, salt) == *commitment
}

/// Derive the vote-proof pair for an anchored ballot:
///
/// - proof = `SHA-256(address || election_id_be4 || commitment)`
/// - verification key = `SHA-256(salt || address)`
///
/// The verification key lets a voter demonstrate that their ballot exists
/// without revealing the vote itself.
pub fn generate_vote_proof(
    voter_address: &str,
    vote: u32,
    salt: &[u8],
    election_id: u32,
) -> (Commitment, Commitment) {
    let commitment = commit_with_salt(vote, salt);

    let mut hasher = Sha256::new();
    hasher.update(voter_address.as_bytes());
    hasher.update(election_id.to_be_bytes());
    hasher.update(commitment);
    let proof = hasher.finalize().into();

    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(voter_address.as_bytes());
    let verify_key = hasher.finalize().into();

    (proof, verify_key)
}

/// Recompute and compare the proof digest for a published commitment.
pub fn verify_vote_proof(
    voter_address: &str,
    election_id: u32,
    commitment: &Commitment,
    expected_proof: &Commitment,
) -> bool {
    let mut hasher = Sha256::new();
    hasher.update(voter_address.as_bytes());
    hasher.update(election_id.to_be_bytes());
    hasher.update(commitment);
    let computed: Commitment = hasher.finalize().into();
    computed == *expected_proof
}

/// Lowercase hex rendering of a commitment.
pub fn commitment_to_hex(commitment: &Commitment) -> String {
    hex::encode(commitment)
}

/// Parse a commitment from hex, accepting an optional `0x` prefix.
pub fn commitment_from_hex(s: &str) -> Result<Commitment, CommitmentError> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let bytes =
        hex::decode(stripped).map_err(|_| CommitmentError::InvalidHex(s.to_string()))?;
    bytes
        .try_into()
        .map_err(|rejected: Vec<u8>| CommitmentError::InvalidLength(rejected.len()))
}
