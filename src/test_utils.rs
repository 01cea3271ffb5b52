//! Shared helpers for the unit tests.

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Assert that a value survives a JSON round trip unchanged.
pub fn assert_round_trip_json<T>(value: &T)
where
    T: Serialize + DeserializeOwned + PartialEq + Debug,
{
    let json = serde_json::to_string(value).expect("serialize");
    let back: T = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(&back, value, "JSON round trip changed the value");
}
