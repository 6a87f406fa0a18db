//! Serde helpers for the on-disk and wire record conventions.
//!
//! Binary fields travel as standard base64 strings and timestamps as epoch seconds
//! (`chrono::serde::ts_seconds`). Query filters and sorts are sent to remote services as
//! base64-encoded JSON.

use crate::{StorageError, StorageResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// `#[serde(with = "pantry_storage::codec::base64_bytes")]` for `Vec<u8>` fields.
pub mod base64_bytes {
    use super::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// JSON-encode `value` and wrap it in base64.
pub fn encode_json_base64<T: Serialize + ?Sized>(value: &T) -> StorageResult<String> {
    let json =
        serde_json::to_vec(value).map_err(|err| StorageError::EncodeFailed(err.to_string()))?;
    Ok(STANDARD.encode(json))
}

/// Inverse of [`encode_json_base64`].
pub fn decode_json_base64<T: DeserializeOwned>(encoded: &str) -> StorageResult<T> {
    let json = STANDARD
        .decode(encoded)
        .map_err(|err| StorageError::DecodeFailed(err.to_string()))?;
    serde_json::from_slice(&json).map_err(|err| StorageError::DecodeFailed(err.to_string()))
}
