use serde::Serialize;
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `data`.
#[must_use]
pub fn fingerprint(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Hash of the canonical JSON form of `value`.
///
/// The value passes through `serde_json::Value` first so object keys are
/// emitted in sorted order regardless of how `value` stores them.
///
/// # Errors
///
/// Returns an error when `value` cannot be represented as JSON.
pub fn fingerprint_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_value(value)?;
    let bytes = serde_json::to_vec(&canonical)?;
    Ok(fingerprint(&bytes))
}
