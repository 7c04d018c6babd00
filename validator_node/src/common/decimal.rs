//! Serde adapters that store big integers as base-10 strings.

use num_bigint::{BigInt, BigUint};
use serde::{de::Error, Deserialize, Deserializer, Serializer};

pub mod bigint {
    use super::*;

    pub fn serialize<S: Serializer>(value: &BigInt, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_str_radix(10))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigInt, D::Error> {
        let s = String::deserialize(deserializer)?;
        BigInt::parse_bytes(s.as_bytes(), 10)
            .ok_or_else(|| D::Error::custom(format!("failed to convert {} to BigInt", s)))
    }
}

pub mod biguint {
    use super::*;

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_str_radix(10))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let s = String::deserialize(deserializer)?;
        BigUint::parse_bytes(s.as_bytes(), 10)
            .ok_or_else(|| D::Error::custom(format!("failed to convert {} to BigUint", s)))
    }
}
