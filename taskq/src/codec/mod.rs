//! Codecs for task input/output payloads.
//!
//! A codec is a pair of pure total functions, `encode: T -> bytes` and
//! `decode: bytes -> T`, fallible via [`CodecError`]. Rather than a runtime registry
//! keyed on `TypeId` (the dynamic-language original's approach), codecs here are
//! trait implementations: [`Decode`]/[`Encode`] are implemented for exactly the four
//! supported type shapes, and a handler's declared input/output types (its
//! signature) are the codec selection, checked by the compiler at registration time.
//! A type that supports neither trait simply fails to compile as a handler
//! input/output, which is the static form of "raises `CodecError` at registration
//! time, never at dispatch time".

mod record;

pub use record::Record;

use serde_json::Map;
use thiserror::Error as ThisError;

/// A JSON object, used for the JSON-object codec (`mapping<string, any>` in the
/// original data model).
pub type JsonObject = Map<String, serde_json::Value>;

/// Errors produced while encoding or decoding a task payload.
#[derive(Debug, ThisError)]
pub enum CodecError {
    /// The payload was not valid UTF-8 where UTF-8 text was expected.
    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// The payload was not valid JSON where JSON was expected.
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The payload was valid JSON but did not conform to the record's schema.
    #[error("payload does not conform to the record's schema: {0}")]
    SchemaViolation(String),
}

/// A type that can be decoded from task payload bytes.
pub trait Decode: Sized {
    /// Decodes `bytes` into `Self`.
    fn decode(bytes: &[u8]) -> Result<Self, CodecError>;
}

/// A type that can be encoded into task payload bytes.
pub trait Encode {
    /// Encodes `self` into bytes.
    fn encode(&self) -> Result<Vec<u8>, CodecError>;
}

/// Passthrough bytes codec: identity encoding.
impl Decode for Vec<u8> {
    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(bytes.to_vec())
    }
}

impl Encode for Vec<u8> {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(self.clone())
    }
}

/// UTF-8 string codec.
impl Decode for String {
    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(std::str::from_utf8(bytes)?.to_string())
    }
}

impl Encode for String {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(self.clone().into_bytes())
    }
}

/// JSON-object codec.
impl Decode for JsonObject {
    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl Encode for JsonObject {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Named construction points for codecs, mirroring the `create_encoder(T)` /
/// `create_decoder(T)` operations of the component design. In idiomatic Rust these
/// are no-ops over the trait bounds already enforced by the type system, but they
/// give callers outside of handler registration (e.g. the publisher) an explicit
/// place to encode/decode a value without reaching for the trait methods directly.
pub struct CodecRegistry;

impl CodecRegistry {
    /// Decodes `bytes` as `T`, using whichever of the four supported codecs `T`
    /// implements.
    pub fn decode<T: Decode>(bytes: &[u8]) -> Result<T, CodecError> {
        T::decode(bytes)
    }

    /// Encodes `value` as bytes, using whichever of the four supported codecs `T`
    /// implements.
    pub fn encode<T: Encode>(value: &T) -> Result<Vec<u8>, CodecError> {
        value.encode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_codec_round_trips() {
        let original = vec![1u8, 2, 3, 255];
        let encoded = CodecRegistry::encode(&original).unwrap();
        let decoded: Vec<u8> = CodecRegistry::decode(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn string_codec_round_trips() {
        let original = "hello, world".to_string();
        let encoded = CodecRegistry::encode(&original).unwrap();
        let decoded: String = CodecRegistry::decode(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn string_codec_rejects_invalid_utf8() {
        let invalid = vec![0xff, 0xfe, 0xfd];
        let result = String::decode(&invalid);
        assert!(matches!(result, Err(CodecError::InvalidUtf8(_))));
    }

    #[test]
    fn json_object_codec_round_trips() {
        let mut original = JsonObject::new();
        original.insert("value".to_string(), serde_json::json!(5));

        let encoded = CodecRegistry::encode(&original).unwrap();
        let decoded: JsonObject = CodecRegistry::decode(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn json_object_codec_rejects_malformed_json() {
        let result = JsonObject::decode(b"not json");
        assert!(matches!(result, Err(CodecError::InvalidJson(_))));
    }
}
