//! The ballot box: ordered commitments, encrypted ballots, and the
//! Accepting → Sealed → Tallied lifecycle.
//!
//! While accepting, ballots and their commitments are appended at monotonic
//! indices. Sealing builds the Merkle tree over the commitments and freezes
//! the box; tallying decrypts the column sums exactly once. Every transition
//! is an explicit request, and out-of-phase requests fail instead of being
//! reordered.

use ark_std::rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::curve::{Fr, Point};
use crate::elgamal::{
    encrypt_vote_onehot, homomorphic_tally, ElGamalCiphertext, ElGamalError,
};
use crate::merkle::{MerkleError, MerkleTree, Node, ProofStep};

const LOG_TARGET: &str = "ballot_engine::ballot_box";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BallotBoxError {
    #[error("ElGamal error: {0}")]
    ElGamal(#[from] ElGamalError),

    #[error("Merkle error: {0}")]
    Merkle(#[from] MerkleError),

    #[error("Ballot box is sealed; no further ballots are accepted")]
    Sealed,

    #[error("Ballot box must be sealed first")]
    NotSealed,

    #[error("Ballot box has already been tallied")]
    AlreadyTallied,

    #[error("Cannot seal an empty ballot box")]
    Empty,

    #[error("An election needs at least one candidate")]
    NoCandidates,

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

/// Lifecycle phase of a ballot box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Accepting,
    Sealed,
    Tallied,
}

/// What a voter takes home: their assigned index, the serialized ballot, and
/// the commitment digest anchored in the tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotReceipt {
    pub index: usize,
    pub serialized_ballot: Vec<[String; 4]>,
    #[serde(with = "crate::crypto_serde::hex_digest")]
    pub commitment: Node,
}

/// Canonical wire form of a ballot: each ciphertext flattened to its four
/// decimal coordinate strings.
pub fn serialize_ballot(ballot: &[ElGamalCiphertext]) -> Vec<[String; 4]> {
    ballot.iter().map(ElGamalCiphertext::to_flat).collect()
}

/// Parse a serialized ballot, enforcing curve membership per component.
pub fn deserialize_ballot(
    serialized: &[[String; 4]],
) -> Result<Vec<ElGamalCiphertext>, ElGamalError> {
    serialized.iter().map(ElGamalCiphertext::from_flat).collect()
}

/// The commitment digest of a serialized ballot: SHA-256 over its canonical
/// JSON encoding.
pub fn ballot_commitment(serialized: &[[String; 4]]) -> Result<Node, BallotBoxError> {
    let bytes = serde_json::to_vec(serialized)
        .map_err(|e| BallotBoxError::Serialization(e.to_string()))?;
    Ok(Sha256::digest(&bytes).into())
}

/// Tally a collection of serialized ballots directly, without going through
/// a ballot box. This is the service-layer tally entry point.
pub fn tally_serialized_ballots(
    serialized: &[Vec<[String; 4]>],
    num_candidates: usize,
    sk: &Fr,
    max_votes: u64,
) -> Result<Vec<u64>, BallotBoxError> {
    let ballots = serialized
        .iter()
        .map(|ballot| deserialize_ballot(ballot))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(homomorphic_tally(&ballots, num_candidates, sk, max_votes)?)
}

#[derive(Debug)]
pub struct BallotBox {
    num_candidates: usize,
    phase: Phase,
    commitments: Vec<Node>,
    ballots: Vec<Vec<ElGamalCiphertext>>,
    tree: Option<MerkleTree>,
    results: Option<Vec<u64>>,
}

impl BallotBox {
    pub fn new(num_candidates: usize) -> Result<Self, BallotBoxError> {
        if num_candidates == 0 {
            return Err(BallotBoxError::NoCandidates);
        }
        Ok(Self {
            num_candidates,
            phase: Phase::Accepting,
            commitments: Vec::new(),
            ballots: Vec::new(),
            tree: None,
            results: None,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn num_candidates(&self) -> usize {
        self.num_candidates
    }

    pub fn ballot_count(&self) -> usize {
        self.ballots.len()
    }

    pub fn commitments(&self) -> &[Node] {
        &self.commitments
    }

    /// Encrypt a one-hot ballot for `candidate`, commit to its serialization,
    /// and append both. Returns the voter's receipt.
    #[instrument(target = LOG_TARGET, skip(self, pk, rng))]
    pub fn submit_vote<R: Rng>(
        &mut self,
        candidate: usize,
        pk: &Point,
        rng: &mut R,
    ) -> Result<BallotReceipt, BallotBoxError> {
        if self.phase != Phase::Accepting {
            return Err(BallotBoxError::Sealed);
        }

        let ballot = encrypt_vote_onehot(candidate, self.num_candidates, pk, rng)?;
        let serialized_ballot = serialize_ballot(&ballot);
        let commitment = ballot_commitment(&serialized_ballot)?;

        let index = self.ballots.len();
        self.commitments.push(commitment);
        self.ballots.push(ballot);
        debug!(target: LOG_TARGET, index, "ballot accepted");

        Ok(BallotReceipt {
            index,
            serialized_ballot,
            commitment,
        })
    }

    /// Append an externally encrypted ballot in its serialized form (the
    /// service-layer submission path). The ballot is validated and committed
    /// exactly like a locally encrypted one.
    pub fn append_ballot(
        &mut self,
        serialized_ballot: &[[String; 4]],
    ) -> Result<BallotReceipt, BallotBoxError> {
        if self.phase != Phase::Accepting {
            return Err(BallotBoxError::Sealed);
        }

        let ballot = deserialize_ballot(serialized_ballot)?;
        if ballot.len() != self.num_candidates {
            return Err(BallotBoxError::ElGamal(
                ElGamalError::BallotLengthMismatch {
                    expected: self.num_candidates,
                    actual: ballot.len(),
                },
            ));
        }
        let commitment = ballot_commitment(serialized_ballot)?;

        let index = self.ballots.len();
        self.commitments.push(commitment);
        self.ballots.push(ballot);

        Ok(BallotReceipt {
            index,
            serialized_ballot: serialized_ballot.to_vec(),
            commitment,
        })
    }

    /// Close the ballot window: build the Merkle tree over the commitments
    /// and return its root.
    #[instrument(target = LOG_TARGET, skip(self))]
    pub fn seal(&mut self) -> Result<Node, BallotBoxError> {
        if self.phase != Phase::Accepting {
            return Err(BallotBoxError::Sealed);
        }
        if self.commitments.is_empty() {
            return Err(BallotBoxError::Empty);
        }

        let tree = MerkleTree::build(&self.commitments)?;
        let root = tree.root();
        self.tree = Some(tree);
        self.phase = Phase::Sealed;
        debug!(target: LOG_TARGET, root = %hex::encode(root), "ballot box sealed");
        Ok(root)
    }

    /// The published root, once sealed.
    pub fn root(&self) -> Result<Node, BallotBoxError> {
        self.tree
            .as_ref()
            .map(MerkleTree::root)
            .ok_or(BallotBoxError::NotSealed)
    }

    /// Inclusion proof for the ballot at `index`; requires a sealed box.
    pub fn inclusion_proof(&self, index: usize) -> Result<Vec<ProofStep>, BallotBoxError> {
        let tree = self.tree.as_ref().ok_or(BallotBoxError::NotSealed)?;
        Ok(tree.proof(index)?)
    }

    /// Decrypt the column-wise tally. Allowed exactly once, after sealing;
    /// the counts are immutable afterwards and available via
    /// [`BallotBox::results`].
    #[instrument(target = LOG_TARGET, skip(self, sk))]
    pub fn tally(&mut self, sk: &Fr, max_votes: u64) -> Result<Vec<u64>, BallotBoxError> {
        match self.phase {
            Phase::Accepting => return Err(BallotBoxError::NotSealed),
            Phase::Tallied => return Err(BallotBoxError::AlreadyTallied),
            Phase::Sealed => {}
        }

        let results = homomorphic_tally(&self.ballots, self.num_candidates, sk, max_votes)?;
        self.results = Some(results.clone());
        self.phase = Phase::Tallied;
        debug!(target: LOG_TARGET, ?results, "ballot box tallied");
        Ok(results)
    }

    /// The tallied counts, if the box has been tallied.
    pub fn results(&self) -> Option<&[u64]> {
        self.results.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elgamal::ElGamalKeypair;
    use crate::merkle::MerkleTree;

    fn keypair() -> ElGamalKeypair {
        ElGamalKeypair::from_sk(Fr::from(12345u64)).unwrap()
    }

    #[test]
    fn full_lifecycle_votes_to_tally() {
        let mut rng = ark_std::rand::thread_rng();
        let keys = keypair();
        let mut ballot_box = BallotBox::new(3).unwrap();

        let choices = [0usize, 1, 0, 2, 0, 1, 0, 2, 1, 0];
        for (i, &candidate) in choices.iter().enumerate() {
            let receipt = ballot_box.submit_vote(candidate, &keys.pk, &mut rng).unwrap();
            assert_eq!(receipt.index, i);
            assert_eq!(receipt.serialized_ballot.len(), 3);
        }
        assert_eq!(ballot_box.phase(), Phase::Accepting);

        let root = ballot_box.seal().unwrap();
        assert_eq!(ballot_box.phase(), Phase::Sealed);
        assert_eq!(ballot_box.root().unwrap(), root);

        let results = ballot_box.tally(&keys.sk, 100).unwrap();
        assert_eq!(results, vec![5, 3, 2]);
        assert_eq!(ballot_box.phase(), Phase::Tallied);
        assert_eq!(ballot_box.results(), Some(&[5u64, 3, 2][..]));
    }

    #[test]
    fn receipt_commitment_verifies_against_the_tree() {
        let mut rng = ark_std::rand::thread_rng();
        let keys = keypair();
        let mut ballot_box = BallotBox::new(2).unwrap();

        let receipts: Vec<_> = (0..4)
            .map(|i| ballot_box.submit_vote(i % 2, &keys.pk, &mut rng).unwrap())
            .collect();
        let root = ballot_box.seal().unwrap();

        for receipt in &receipts {
            // The leaf is the raw commitment bytes; recompute it from the
            // serialized ballot the voter kept.
            let recomputed = ballot_commitment(&receipt.serialized_ballot).unwrap();
            assert_eq!(recomputed, receipt.commitment);

            let proof = ballot_box.inclusion_proof(receipt.index).unwrap();
            assert!(MerkleTree::verify_proof(&receipt.commitment, &proof, &root));
        }
    }

    #[test]
    fn append_ballot_round_trips_the_wire_form() {
        let mut rng = ark_std::rand::thread_rng();
        let keys = keypair();
        let ballot = encrypt_vote_onehot(1, 3, &keys.pk, &mut rng).unwrap();
        let serialized = serialize_ballot(&ballot);

        let mut ballot_box = BallotBox::new(3).unwrap();
        let receipt = ballot_box.append_ballot(&serialized).unwrap();
        assert_eq!(receipt.index, 0);
        assert_eq!(receipt.commitment, ballot_commitment(&serialized).unwrap());

        ballot_box.seal().unwrap();
        assert_eq!(ballot_box.tally(&keys.sk, 10).unwrap(), vec![0, 1, 0]);
    }

    #[test]
    fn serialized_ballots_tally_directly() {
        let mut rng = ark_std::rand::thread_rng();
        let keys = keypair();
        let serialized: Vec<_> = [1usize, 0, 1]
            .iter()
            .map(|&c| {
                serialize_ballot(&encrypt_vote_onehot(c, 2, &keys.pk, &mut rng).unwrap())
            })
            .collect();
        let results = tally_serialized_ballots(&serialized, 2, &keys.sk, 10).unwrap();
        assert_eq!(results, vec![1, 2]);
    }

    #[test]
    fn append_ballot_rejects_wrong_width() {
        let mut rng = ark_std::rand::thread_rng();
        let keys = keypair();
        let ballot = encrypt_vote_onehot(0, 2, &keys.pk, &mut rng).unwrap();
        let serialized = serialize_ballot(&ballot);

        let mut ballot_box = BallotBox::new(3).unwrap();
        let err = ballot_box.append_ballot(&serialized).unwrap_err();
        assert!(matches!(
            err,
            BallotBoxError::ElGamal(ElGamalError::BallotLengthMismatch { .. })
        ));
    }

    #[test]
    fn sealed_box_rejects_ballots() {
        let mut rng = ark_std::rand::thread_rng();
        let keys = keypair();
        let mut ballot_box = BallotBox::new(2).unwrap();
        ballot_box.submit_vote(0, &keys.pk, &mut rng).unwrap();
        ballot_box.seal().unwrap();

        let err = ballot_box.submit_vote(1, &keys.pk, &mut rng).unwrap_err();
        assert_eq!(err, BallotBoxError::Sealed);
        assert_eq!(ballot_box.seal().unwrap_err(), BallotBoxError::Sealed);
    }

    #[test]
    fn tally_requires_seal_and_happens_once() {
        let mut rng = ark_std::rand::thread_rng();
        let keys = keypair();
        let mut ballot_box = BallotBox::new(2).unwrap();
        ballot_box.submit_vote(1, &keys.pk, &mut rng).unwrap();

        assert_eq!(
            ballot_box.tally(&keys.sk, 10).unwrap_err(),
            BallotBoxError::NotSealed
        );

        ballot_box.seal().unwrap();
        assert_eq!(ballot_box.tally(&keys.sk, 10).unwrap(), vec![0, 1]);
        assert_eq!(
            ballot_box.tally(&keys.sk, 10).unwrap_err(),
            BallotBoxError::AlreadyTallied
        );
        assert_eq!(ballot_box.results(), Some(&[0u64, 1][..]));
    }

    #[test]
    fn empty_box_cannot_be_sealed() {
        let mut ballot_box = BallotBox::new(2).unwrap();
        assert_eq!(ballot_box.seal().unwrap_err(), BallotBoxError::Empty);
    }

    #[test]
    fn proofs_require_a_sealed_box() {
        let mut rng = ark_std::rand::thread_rng();
        let keys = keypair();
        let mut ballot_box = BallotBox::new(2).unwrap();
        ballot_box.submit_vote(0, &keys.pk, &mut rng).unwrap();

        assert_eq!(
            ballot_box.inclusion_proof(0).unwrap_err(),
            BallotBoxError::NotSealed
        );
        assert_eq!(ballot_box.root().unwrap_err(), BallotBoxError::NotSealed);

        ballot_box.seal().unwrap();
        assert!(ballot_box.inclusion_proof(0).is_ok());
        assert!(matches!(
            ballot_box.inclusion_proof(5).unwrap_err(),
            BallotBoxError::Merkle(MerkleError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn zero_candidate_box_is_rejected() {
        assert_eq!(
            BallotBox::new(0).unwrap_err(),
            BallotBoxError::NoCandidates
        );
    }

    #[test]
    fn receipt_serde_round_trip() {
        let mut rng = ark_std::rand::thread_rng();
        let keys = keypair();
        let mut ballot_box = BallotBox::new(2).unwrap();
        let receipt = ballot_box.submit_vote(1, &keys.pk, &mut rng).unwrap();
        crate::test_utils::assert_round_trip_json(&receipt);
    }
}
