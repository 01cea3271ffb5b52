//! Serde helpers for the decimal-string wire encodings.
//!
//! Field elements and curve coordinates cross the service boundary as decimal
//! strings, so every helper here renders through the canonical integer
//! representative.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serializer};

use crate::curve::{fq_from_decimal, fq_to_decimal, fr_from_decimal, fr_to_decimal, Fq, Fr};

/// Serde helpers for scalars encoded as decimal strings.
pub mod fr_decimal {
    use super::*;

    pub fn serialize<S>(value: &Fr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&fr_to_decimal(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        fr_from_decimal(&s).map_err(DeError::custom)
    }
}

/// Serde helpers for 32-byte digests encoded as lowercase hex strings.
pub mod hex_digest {
    use serde::de::Error as DeError;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(digest: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(digest))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(DeError::custom)?;
        bytes
            .try_into()
            .map_err(|_| DeError::custom("digest must be 32 bytes"))
    }
}

/// Serde helpers for base-field elements encoded as decimal strings.
pub mod fq_decimal {
    use super::*;

    pub fn serialize<S>(value: &Fq, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&fq_to_decimal(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fq, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        fq_from_decimal(&s).map_err(DeError::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Wrapper {
        #[serde(with = "fr_decimal")]
        scalar: Fr,
        #[serde(with = "fq_decimal")]
        coordinate: Fq,
    }

    #[test]
    fn decimal_fields_round_trip() {
        let wrapper = Wrapper {
            scalar: Fr::from(123456789u64),
            coordinate: Fq::from(987654321u64),
        };
        let json = serde_json::to_string(&wrapper).unwrap();
        assert_eq!(json, r#"{"scalar":"123456789","coordinate":"987654321"}"#);
        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back, wrapper);
    }
}
