//! Artifact codecs
//!
//! A codec turns a place value into bytes on disk and back. The codec's
//! extension completes the artifact file name.

use canopy_table::Value;
use std::fmt;

/// Encoding or decoding failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct CodecError(pub String);

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        Self(e.to_string())
    }
}

/// Serializes place values for the persist cache
pub trait ArtifactCodec: Send + Sync + fmt::Debug {
    /// File extension, without the dot
    fn extension(&self) -> &str;

    /// Encode a value
    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError>;

    /// Decode a value
    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError>;
}

/// JSON codec, for stores that want human-readable artifacts
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl ArtifactCodec for JsonCodec {
    fn extension(&self) -> &str {
        "json"
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_table::{row, Bag, Table};
    use serde_json::json;

    #[test]
    fn json_codec_keeps_column_order() {
        let table = Table::from_rows(vec![
            row([("z", json!(1)), ("a", json!("x"))]),
            row([("a", json!("y")), ("m", json!(null))]),
        ]);
        let value = Value::Bag(Bag::partition(&table, 2).unwrap());

        let bytes = JsonCodec.encode(&value).unwrap();
        assert_eq!(JsonCodec.decode(&bytes).unwrap(), value);
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(JsonCodec.decode(b"{not json").is_err());
    }
}
