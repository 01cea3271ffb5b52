//! SHA-256 binary Merkle tree over ballot commitments.
//!
//! The root gets anchored on-chain; voters check inclusion of their own
//! commitment with a path of (sibling digest, direction) pairs. Layers with
//! an odd node count duplicate their last node, and proofs skip the
//! duplicated tail entirely so a verifier never hashes against the
//! duplicate. That layout must not change: the published roots depend on it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::instrument;

const LOG_TARGET: &str = "ballot_engine::merkle";

/// A 32-byte tree node digest.
pub type Node = [u8; 32];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MerkleError {
    #[error("Cannot build a Merkle tree over an empty leaf list")]
    EmptyLeaves,

    #[error("Leaf index {index} out of range [0, {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Which side of the current node the sibling digest sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "L")]
    Left,
    #[serde(rename = "R")]
    Right,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Left => "L",
            Direction::Right => "R",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "L" => Some(Direction::Left),
            "R" => Some(Direction::Right),
            _ => None,
        }
    }
}

/// One level of an inclusion proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    #[serde(with = "crate::crypto_serde::hex_digest")]
    pub sibling: Node,
    pub direction: Direction,
}

fn hash_leaf(data: &[u8]) -> Node {
    Sha256::digest(data).into()
}

fn hash_pair(left: &Node, right: &Node) -> Node {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// A built Merkle tree. Immutable once constructed; rebuild when the leaf
/// set changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleTree {
    layers: Vec<Vec<Node>>,
}

impl MerkleTree {
    /// Hash every leaf and build the tree bottom-up.
    #[instrument(target = LOG_TARGET, skip(data), fields(leaves = data.len()))]
    pub fn build<T: AsRef<[u8]>>(data: &[T]) -> Result<Self, MerkleError> {
        if data.is_empty() {
            return Err(MerkleError::EmptyLeaves);
        }

        let leaves: Vec<Node> = data.iter().map(|d| hash_leaf(d.as_ref())).collect();
        let mut layers = vec![leaves];

        loop {
            let level = &layers[layers.len() - 1];
            if level.len() == 1 {
                break;
            }
            let mut padded = level.clone();
            if padded.len() % 2 == 1 {
                let tail = padded[padded.len() - 1];
                padded.push(tail);
            }
            let next: Vec<Node> = padded
                .chunks_exact(2)
                .map(|pair| hash_pair(&pair[0], &pair[1]))
                .collect();
            layers.push(next);
        }

        Ok(Self { layers })
    }

    /// Number of leaves the tree was built over.
    pub fn leaf_count(&self) -> usize {
        self.layers[0].len()
    }

    /// The root digest.
    pub fn root(&self) -> Node {
        self.layers[self.layers.len() - 1][0]
    }

    /// The root digest as lowercase hex.
    pub fn root_hex(&self) -> String {
        hex::encode(self.root())
    }

    /// The inclusion proof for the leaf at `index`, leaf layer upward.
    ///
    /// A node that is the duplicated odd tail of its layer pairs with itself,
    /// so no sibling is recorded for that level.
    pub fn proof(&self, index: usize) -> Result<Vec<ProofStep>, MerkleError> {
        let len = self.leaf_count();
        if index >= len {
            return Err(MerkleError::IndexOutOfRange { index, len });
        }

        let mut proof = Vec::new();
        let mut current_index = index;

        for level in &self.layers[..self.layers.len() - 1] {
            if level.len() % 2 == 1 && current_index == level.len() - 1 {
                current_index /= 2;
                continue;
            }

            let (sibling_index, direction) = if current_index % 2 == 0 {
                (current_index + 1, Direction::Right)
            } else {
                (current_index - 1, Direction::Left)
            };
            proof.push(ProofStep {
                sibling: level[sibling_index],
                direction,
            });
            current_index /= 2;
        }

        Ok(proof)
    }

    /// Inclusion proof rendered as `(lowercase hex, "L"|"R")` pairs.
    pub fn proof_hex(&self, index: usize) -> Result<Vec<(String, String)>, MerkleError> {
        Ok(self
            .proof(index)?
            .into_iter()
            .map(|step| (hex::encode(step.sibling), step.direction.as_str().to_string()))
            .collect())
    }

    /// Recompute the root from raw leaf data and a proof; true iff it matches.
    pub fn verify_proof(leaf_data: &[u8], proof: &[ProofStep], root: &Node) -> bool {
        let mut current = hash_leaf(leaf_data);
        for step in proof {
            current = match step.direction {
                Direction::Left => hash_pair(&step.sibling, &current),
                Direction::Right => hash_pair(&current, &step.sibling),
            };
        }
        current == *root
    }

    /// Hex-form counterpart of [`MerkleTree::verify_proof`]; malformed hex
    /// fails verification rather than erroring.
    pub fn verify_proof_hex(
        leaf_data: &[u8],
        proof: &[(String, String)],
        root_hex: &str,
    ) -> bool {
        let Ok(root_bytes) = hex::decode(root_hex) else {
            return false;
        };
        let Ok(root) = Node::try_from(root_bytes.as_slice()) else {
            return false;
        };

        let mut steps = Vec::with_capacity(proof.len());
        for (sibling_hex, direction) in proof {
            let Ok(bytes) = hex::decode(sibling_hex) else {
                return false;
            };
            let Ok(sibling) = Node::try_from(bytes.as_slice()) else {
                return false;
            };
            let Some(direction) = Direction::from_str(direction) else {
                return false;
            };
            steps.push(ProofStep { sibling, direction });
        }
        Self::verify_proof(leaf_data, &steps, &root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: usize) -> Vec<Vec<u8>> {
        (1..=n).map(|i| format!("vote{i}").into_bytes()).collect()
    }

    #[test]
    fn build_rejects_empty_input() {
        let empty: Vec<Vec<u8>> = Vec::new();
        assert_eq!(
            MerkleTree::build(&empty).unwrap_err(),
            MerkleError::EmptyLeaves
        );
    }

    #[test]
    fn single_leaf_root_is_leaf_hash() {
        let tree = MerkleTree::build(&[b"vote1"]).unwrap();
        assert_eq!(tree.root(), hash_leaf(b"vote1"));
        assert!(tree.proof(0).unwrap().is_empty());
        assert!(MerkleTree::verify_proof(b"vote1", &[], &tree.root()));
    }

    #[test]
    fn two_leaf_root_is_pair_hash() {
        let tree = MerkleTree::build(&[b"vote1", b"vote2"]).unwrap();
        let expected = hash_pair(&hash_leaf(b"vote1"), &hash_leaf(b"vote2"));
        assert_eq!(tree.root(), expected);
    }

    #[test]
    fn proofs_verify_for_every_index() {
        for n in 1..=9 {
            let data = leaves(n);
            let tree = MerkleTree::build(&data).unwrap();
            for (i, leaf) in data.iter().enumerate() {
                let proof = tree.proof(i).unwrap();
                assert!(
                    MerkleTree::verify_proof(leaf, &proof, &tree.root()),
                    "n={n} i={i}"
                );
            }
        }
    }

    #[test]
    fn wrong_leaf_fails_verification() {
        let data = leaves(4);
        let tree = MerkleTree::build(&data).unwrap();
        let proof = tree.proof(1).unwrap();
        assert!(MerkleTree::verify_proof(&data[1], &proof, &tree.root()));
        assert!(!MerkleTree::verify_proof(b"fake", &proof, &tree.root()));
    }

    #[test]
    fn corrupted_proof_fails_verification() {
        let data = leaves(5);
        let tree = MerkleTree::build(&data).unwrap();
        let mut proof = tree.proof(2).unwrap();
        proof[0].sibling[0] ^= 1;
        assert!(!MerkleTree::verify_proof(&data[2], &proof, &tree.root()));

        let mut proof = tree.proof(2).unwrap();
        proof[1].direction = match proof[1].direction {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        };
        assert!(!MerkleTree::verify_proof(&data[2], &proof, &tree.root()));
    }

    #[test]
    fn odd_leaf_count_duplicates_the_tail() {
        // Explicitly duplicating the last leaf at the first layer must
        // reproduce the root of the odd-count tree.
        let odd = leaves(3);
        let tree = MerkleTree::build(&odd).unwrap();

        let l1 = hash_leaf(&odd[0]);
        let l2 = hash_leaf(&odd[1]);
        let l3 = hash_leaf(&odd[2]);
        let expected = hash_pair(&hash_pair(&l1, &l2), &hash_pair(&l3, &l3));
        assert_eq!(tree.root(), expected);

        // The duplicated tail records no sibling at its level.
        let proof = tree.proof(2).unwrap();
        assert_eq!(proof.len(), 1);
        assert_eq!(proof[0].direction, Direction::Left);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let tree = MerkleTree::build(&leaves(3)).unwrap();
        assert_eq!(
            tree.proof(3).unwrap_err(),
            MerkleError::IndexOutOfRange { index: 3, len: 3 }
        );
    }

    #[test]
    fn hex_variants_match_byte_forms() {
        let data = leaves(4);
        let tree = MerkleTree::build(&data).unwrap();
        assert_eq!(tree.root_hex(), hex::encode(tree.root()));

        let proof_hex = tree.proof_hex(1).unwrap();
        let proof = tree.proof(1).unwrap();
        assert_eq!(proof_hex.len(), proof.len());
        for (step, (sibling_hex, direction)) in proof.iter().zip(&proof_hex) {
            assert_eq!(*sibling_hex, hex::encode(step.sibling));
            assert_eq!(*direction, step.direction.as_str());
        }

        assert!(MerkleTree::verify_proof_hex(
            &data[1],
            &proof_hex,
            &tree.root_hex()
        ));
        assert!(!MerkleTree::verify_proof_hex(
            b"fake",
            &proof_hex,
            &tree.root_hex()
        ));
        assert!(!MerkleTree::verify_proof_hex(&data[1], &proof_hex, "zz"));
    }

    #[test]
    fn proof_step_serde_uses_letter_tags() {
        let step = ProofStep {
            sibling: [0xab; 32],
            direction: Direction::Right,
        };
        let json = serde_json::to_string(&step).unwrap();
        assert!(json.contains("\"R\""));
        assert!(json.contains(&"ab".repeat(32)));
        let back: ProofStep = serde_json::from_str(&json).unwrap();
        assert_eq!(back, step);
    }
}
