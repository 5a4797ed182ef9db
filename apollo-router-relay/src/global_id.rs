//! Opaque global object identifiers.
//!
//! A global ID is the base64 encoding of `{typename}:{id}`. Clients must treat it as an
//! opaque string; only this layer interprets it.

use std::fmt;
use std::str::FromStr;

use base64::Engine as _;
use base64::alphabet;
use base64::engine::DecodePaddingMode;
use base64::engine::general_purpose::GeneralPurpose;
use base64::engine::general_purpose::GeneralPurposeConfig;

use serde::Deserialize;
use serde::Serialize;

use crate::error::RelayError;

/// Separates the type name from the local id in the decoded payload.
pub const DELIMITER: char = ':';

/// Standard base64, padded on encode. Decoding accepts ids whose padding was stripped.
pub(crate) const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A decoded global identifier.
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GlobalId {
    /// The schema type owning the object.
    pub typename: String,
    /// The identifier of the object within its type.
    pub id: String,
}

impl GlobalId {
    pub fn new(typename: impl Into<String>, id: impl fmt::Display) -> Self {
        Self {
            typename: typename.into(),
            id: id.to_string(),
        }
    }

    /// The key of this object in the node request cache.
    pub(crate) fn cache_key(&self) -> String {
        cache_key(&self.typename, &self.id)
    }
}

pub(crate) fn cache_key(typename: &str, id: &str) -> String {
    format!("{typename}{DELIMITER}{id}")
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode_global_id(&self.typename, &self.id))
    }
}

impl FromStr for GlobalId {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_global_id(s)
    }
}

/// Encodes and decodes global identifiers.
///
/// Implementations must round-trip: `decode(&encode(t, id))` yields `(t, id)` for every
/// type name `t` free of [`DELIMITER`] and every non-empty `id`.
pub trait GlobalIdCodec: Send + Sync + fmt::Debug {
    fn encode(&self, typename: &str, id: &str) -> String;

    fn decode(&self, global_id: &str) -> Result<GlobalId, RelayError>;
}

/// The default codec: standard base64 over `{typename}:{id}`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Base64GlobalIdCodec;

impl GlobalIdCodec for Base64GlobalIdCodec {
    fn encode(&self, typename: &str, id: &str) -> String {
        BASE64.encode(cache_key(typename, id))
    }

    fn decode(&self, global_id: &str) -> Result<GlobalId, RelayError> {
        let invalid = || RelayError::InvalidIdentifier {
            id: global_id.to_string(),
        };
        let bytes = BASE64.decode(global_id).map_err(|_| invalid())?;
        let decoded = String::from_utf8(bytes).map_err(|_| invalid())?;

        // Only the first delimiter splits, so local ids may themselves contain it.
        match decoded.split_once(DELIMITER) {
            Some((typename, id)) if !typename.is_empty() && !id.is_empty() => Ok(GlobalId {
                typename: typename.to_string(),
                id: id.to_string(),
            }),
            _ => Err(invalid()),
        }
    }
}

/// Encodes a global ID with the default codec.
pub fn encode_global_id(typename: &str, id: impl fmt::Display) -> String {
    Base64GlobalIdCodec.encode(typename, &id.to_string())
}

/// Decodes a global ID with the default codec.
pub fn decode_global_id(global_id: &str) -> Result<GlobalId, RelayError> {
    Base64GlobalIdCodec.decode(global_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_typename_and_id() {
        assert_eq!(encode_global_id("User", 1), "VXNlcjox");
        assert_eq!(encode_global_id("User", "1"), "VXNlcjox");
        assert_eq!(GlobalId::new("User", 1u64).to_string(), "VXNlcjox");
    }

    #[test]
    fn round_trips() {
        for (typename, id) in [
            ("User", "1"),
            ("Post", "a:b"),
            ("Comment", "ünïcødé id"),
            ("T", "  spaces  "),
            ("Big", "18446744073709551615"),
        ] {
            let encoded = encode_global_id(typename, id);
            assert_eq!(
                decode_global_id(&encoded).unwrap(),
                GlobalId::new(typename, id),
                "{typename}:{id}"
            );
        }
    }

    #[test]
    fn ids_containing_the_delimiter_keep_everything_after_the_first_one() {
        assert_eq!(
            decode_global_id("UG9zdDphOmI=").unwrap(),
            GlobalId::new("Post", "a:b")
        );
    }

    #[test]
    fn accepts_identifiers_without_padding() {
        assert_eq!(encode_global_id("Post", "hello"), "UG9zdDpoZWxsbw==");
        assert_eq!(
            decode_global_id("UG9zdDpoZWxsbw").unwrap(),
            GlobalId::new("Post", "hello")
        );
        assert_eq!(
            decode_global_id("UG9zdDphOmI").unwrap(),
            GlobalId::new("Post", "a:b")
        );
    }

    #[test]
    fn rejects_malformed_identifiers() {
        for raw in [
            "",
            "not base64!",
            // "User"
            "VXNlcg==",
            "VXNlcg",
            // ":1"
            "OjE=",
            // "User:"
            "VXNlcjo=",
            // invalid utf-8 followed by ":1"
            "//46MQ==",
        ] {
            assert_eq!(
                decode_global_id(raw),
                Err(RelayError::InvalidIdentifier {
                    id: raw.to_string()
                }),
                "{raw:?}"
            );
        }
    }

    #[test]
    fn parses_with_from_str() {
        let id: GlobalId = "VXNlcjox".parse().unwrap();
        assert_eq!(id.typename, "User");
        assert_eq!(id.id, "1");
        assert_eq!(id.cache_key(), "User:1");
    }
}
