//! Resource codecs: turn raw response bodies into typed resource state.
//!
//! A codec also decides whether two decoded states are the same, which is
//! what lets a watch skip notifications when the agent bumps the index
//! without changing the resource.

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::types::KeyValue;

/// A response body could not be decoded.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct DecodeError(pub String);

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        DecodeError(err.to_string())
    }
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        Error::Decode(err.0)
    }
}

/// Decodes one kind of resource and compares decoded states.
pub trait ResourceCodec: Send + Sync + 'static {
    /// The decoded resource state.
    type Item: Clone + Send + Sync + 'static;

    /// Decode a response body. An empty body means "resource absent".
    fn decode(&self, bytes: &[u8]) -> Result<Self::Item, DecodeError>;

    /// Whether two decoded states are the same resource content.
    fn equals(&self, a: &Self::Item, b: &Self::Item) -> bool;
}

/// JSON codec with structural equality.
///
/// An empty body decodes to `T::default()`: an empty list, an empty map or
/// `None`, depending on the resource.
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JsonCodec<{}>", std::any::type_name::<T>())
    }
}

impl<T> ResourceCodec for JsonCodec<T>
where
    T: DeserializeOwned + PartialEq + Default + Clone + Send + Sync + 'static,
{
    type Item = T;

    fn decode(&self, bytes: &[u8]) -> Result<T, DecodeError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(T::default());
        }
        Ok(serde_json::from_slice(bytes)?)
    }

    fn equals(&self, a: &T, b: &T) -> bool {
        a == b
    }
}

/// Every entry under a key prefix (`?recurse`).
pub type KeyValueListCodec = JsonCodec<Vec<KeyValue>>;

/// Key names only (`?keys`).
pub type KeysCodec = JsonCodec<Vec<String>>;

/// A single key: the agent answers with a one-element array, or 404.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyValueCodec;

impl ResourceCodec for KeyValueCodec {
    type Item = Option<KeyValue>;

    fn decode(&self, bytes: &[u8]) -> Result<Option<KeyValue>, DecodeError> {
        let entries = KeyValueListCodec::new().decode(bytes)?;
        Ok(entries.into_iter().next())
    }

    fn equals(&self, a: &Option<KeyValue>, b: &Option<KeyValue>) -> bool {
        a == b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_key_value_codec_decodes_base64_value() {
        let body = br#"[{"LockIndex":0,"Key":"foo","Flags":0,"Value":"YmFy","CreateIndex":5,"ModifyIndex":7}]"#;
        let kv = KeyValueCodec.decode(body).unwrap().unwrap();
        assert_eq!(kv.key, "foo");
        assert_eq!(kv.value_str(), Some("bar"));
        assert_eq!(kv.modify_index, 7);
    }

    #[test]
    fn test_key_value_codec_empty_body_is_absent() {
        assert_eq!(KeyValueCodec.decode(b"").unwrap(), None);
        assert_eq!(KeyValueCodec.decode(b"[]").unwrap(), None);
    }

    #[test]
    fn test_json_codec_rejects_garbage() {
        let codec = JsonCodec::<Vec<String>>::new();
        assert!(codec.decode(b"{not json").is_err());
    }

    #[test]
    fn test_json_codec_structural_equality() {
        let codec = JsonCodec::<BTreeMap<String, Vec<String>>>::new();
        let a = codec.decode(br#"{"web":["v1"],"db":[]}"#).unwrap();
        let b = codec.decode(br#"{"db":[],"web":["v1"]}"#).unwrap();
        let c = codec.decode(br#"{"db":[],"web":["v2"]}"#).unwrap();
        assert!(codec.equals(&a, &b));
        assert!(!codec.equals(&a, &c));
    }

    #[test]
    fn test_modify_index_counts_as_content() {
        let codec = KeyValueCodec;
        let a = codec
            .decode(br#"[{"Key":"k","Value":"YQ==","ModifyIndex":1}]"#)
            .unwrap();
        let b = codec
            .decode(br#"[{"Key":"k","Value":"YQ==","ModifyIndex":2}]"#)
            .unwrap();
        // A rewrite of the same value is still a change to the entry.
        assert!(!codec.equals(&a, &b));
    }
}
