pub mod ballot_box;
pub mod commitment;
pub mod crypto_serde;
pub mod curve;
pub mod elgamal;
pub mod merkle;
pub mod paillier;

#[cfg(test)]
pub mod test_utils;

pub use ballot_box::{BallotBox, BallotReceipt, Phase};
pub use curve::{Fq, Fr, Point, GENERATOR, IDENTITY};
pub use elgamal::{ElGamalCiphertext, ElGamalKeypair};
pub use merkle::MerkleTree;
pub use paillier::PaillierEngine;
