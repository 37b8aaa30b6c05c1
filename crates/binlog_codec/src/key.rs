//! Order-preserving index key encodings.
//!
//! Index tables sort keys bytewise, so every kind maps its values to
//! bytes whose lexicographic order matches the natural value order:
//!
//! - [`KeyKind::Text`]: the UTF-8 bytes (bytewise order is code point order)
//! - [`KeyKind::Numeric`]: non-negative integers as 8 big-endian bytes
//! - [`KeyKind::Datetime`]: timestamps as 8 big-endian bytes with the sign bit flipped

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

const SIGN_BIT: u64 = 1 << 63;

/// Kind of an index key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    /// UTF-8 text.
    Text,
    /// Non-negative integer.
    Numeric,
    /// Timestamp.
    Datetime,
}

impl KeyKind {
    /// Name of the kind, as used in messages and the CLI.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Numeric => "numeric",
            Self::Datetime => "datetime",
        }
    }

    /// Encodes `value` as a key of this kind.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::KeyType`] if the value has the wrong type, or
    /// is a negative integer for a numeric key.
    pub fn encode(self, value: &Value) -> CodecResult<Vec<u8>> {
        match (self, value) {
            (Self::Text, Value::Text(s)) => Ok(s.as_bytes().to_vec()),
            (Self::Numeric, Value::Integer(n)) => u64::try_from(*n)
                .map(|n| n.to_be_bytes().to_vec())
                .map_err(|_| CodecError::KeyType {
                    expected: "non-negative integer",
                    found: "negative integer",
                }),
            (Self::Datetime, Value::Timestamp(t)) => {
                Ok(((*t as u64) ^ SIGN_BIT).to_be_bytes().to_vec())
            }
            (kind, other) => Err(CodecError::KeyType {
                expected: kind.name(),
                found: other.type_name(),
            }),
        }
    }

    /// Decodes a key of this kind back into a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid key of this kind.
    pub fn decode(self, bytes: &[u8]) -> CodecResult<Value> {
        match self {
            Self::Text => String::from_utf8(bytes.to_vec())
                .map(Value::Text)
                .map_err(|_| CodecError::decoding_failed("index key is not UTF-8")),
            Self::Numeric => {
                let n = u64::from_be_bytes(fixed(bytes)?);
                i64::try_from(n)
                    .map(Value::Integer)
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            Self::Datetime => {
                let raw = u64::from_be_bytes(fixed(bytes)?) ^ SIGN_BIT;
                Ok(Value::Timestamp(raw as i64))
            }
        }
    }
}

impl std::str::FromStr for KeyKind {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "numeric" => Ok(Self::Numeric),
            "datetime" => Ok(Self::Datetime),
            other => Err(CodecError::unsupported_type(other)),
        }
    }
}

fn fixed(bytes: &[u8]) -> CodecResult<[u8; 8]> {
    bytes
        .try_into()
        .map_err(|_| CodecError::decoding_failed("index key must be 8 bytes"))
}
