//! # binlog codec
//!
//! Record values and their byte encodings for binlog.
//!
//! - [`Value`]: the dynamic field value of a record
//! - [`encode_record`] / [`decode_record`]: records as CBOR maps of text keys
//! - [`KeyKind`]: order-preserving encodings for secondary index keys
//!
//! ## Usage
//!
//! ```
//! use binlog_codec::{decode_record, encode_record, Fields, KeyKind, Value};
//!
//! let mut fields = Fields::new();
//! fields.insert("kind".to_string(), Value::from("click"));
//! let bytes = encode_record(&fields).unwrap();
//! assert_eq!(decode_record(&bytes).unwrap(), fields);
//!
//! let a = KeyKind::Numeric.encode(&Value::Integer(9)).unwrap();
//! let b = KeyKind::Numeric.encode(&Value::Integer(10)).unwrap();
//! assert!(a < b);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod error;
mod key;
mod value;

pub use cbor::{decode_record, decode_value, encode_record, encode_value, Fields};
pub use error::{CodecError, CodecResult};
pub use key::KeyKind;
pub use value::Value;
