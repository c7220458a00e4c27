use bytes::Bytes;
use serde::Serialize;

use crate::error::Result;

/// Serialize `value` as a single JSON document with no whitespace between tokens.
pub fn to_compact_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(value)?))
}
