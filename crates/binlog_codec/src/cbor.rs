//! CBOR encoding of values and records.
//!
//! Records are stored as a CBOR map with text keys. Timestamps use the
//! extended time tag (1001) with whole seconds under key `1` and the
//! microsecond fraction under key `-6`; plain epoch-seconds (tag 1) are
//! accepted on decode.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use ciborium::value::{Integer, Value as Cbor};
use std::collections::BTreeMap;

/// A record: field name to value, ordered by name.
pub type Fields = BTreeMap<String, Value>;

const EPOCH_SECONDS_TAG: u64 = 1;
const EXTENDED_TIME_TAG: u64 = 1001;
const SECONDS_KEY: i64 = 1;
const MICROS_KEY: i64 = -6;
const MICROS_PER_SECOND: i64 = 1_000_000;

/// Encode a single value to CBOR bytes.
///
/// # Errors
///
/// Returns an error if the CBOR writer fails.
pub fn encode_value(value: &Value) -> CodecResult<Vec<u8>> {
    write(&to_cbor(value))
}

/// Decode a single value from CBOR bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid CBOR or hold constructs
/// outside the value model (floats, out-of-range integers).
pub fn decode_value(bytes: &[u8]) -> CodecResult<Value> {
    from_cbor(read(bytes)?)
}

/// Encode a record to CBOR bytes.
///
/// # Errors
///
/// Returns an error if the CBOR writer fails.
pub fn encode_record(fields: &Fields) -> CodecResult<Vec<u8>> {
    let map = fields
        .iter()
        .map(|(k, v)| (Cbor::Text(k.clone()), to_cbor(v)))
        .collect();
    write(&Cbor::Map(map))
}

/// Decode a record from CBOR bytes.
///
/// # Errors
///
/// Returns [`CodecError::NotARecord`] if the top-level item is not a map
/// with text keys, or any decoding error of its values.
pub fn decode_record(bytes: &[u8]) -> CodecResult<Fields> {
    let Cbor::Map(pairs) = read(bytes)? else {
        return Err(CodecError::NotARecord);
    };

    let mut fields = Fields::new();
    for (key, value) in pairs {
        let Cbor::Text(key) = key else {
            return Err(CodecError::NotARecord);
        };
        fields.insert(key, from_cbor(value)?);
    }
    Ok(fields)
}

fn write(cbor: &Cbor) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(cbor, &mut buf).map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(buf)
}

fn read(bytes: &[u8]) -> CodecResult<Cbor> {
    ciborium::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
}

fn to_cbor(value: &Value) -> Cbor {
    match value {
        Value::Null => Cbor::Null,
        Value::Bool(b) => Cbor::Bool(*b),
        Value::Integer(n) => Cbor::Integer(Integer::from(*n)),
        Value::Bytes(b) => Cbor::Bytes(b.clone()),
        Value::Text(s) => Cbor::Text(s.clone()),
        Value::Timestamp(micros) => {
            let seconds = micros.div_euclid(MICROS_PER_SECOND);
            let fraction = micros.rem_euclid(MICROS_PER_SECOND);
            Cbor::Tag(
                EXTENDED_TIME_TAG,
                Box::new(Cbor::Map(vec![
                    (Cbor::Integer(SECONDS_KEY.into()), Cbor::Integer(seconds.into())),
                    (Cbor::Integer(MICROS_KEY.into()), Cbor::Integer(fraction.into())),
                ])),
            )
        }
        Value::Array(items) => Cbor::Array(items.iter().map(to_cbor).collect()),
        Value::Map(pairs) => Cbor::Map(
            pairs
                .iter()
                .map(|(k, v)| (to_cbor(k), to_cbor(v)))
                .collect(),
        ),
    }
}

fn from_cbor(cbor: Cbor) -> CodecResult<Value> {
    match cbor {
        Cbor::Null => Ok(Value::Null),
        Cbor::Bool(b) => Ok(Value::Bool(b)),
        Cbor::Integer(n) => integer(n).map(Value::Integer),
        Cbor::Bytes(b) => Ok(Value::Bytes(b)),
        Cbor::Text(s) => Ok(Value::Text(s)),
        Cbor::Float(_) => Err(CodecError::FloatForbidden),
        Cbor::Array(items) => items
            .into_iter()
            .map(from_cbor)
            .collect::<CodecResult<Vec<_>>>()
            .map(Value::Array),
        Cbor::Map(pairs) => pairs
            .into_iter()
            .map(|(k, v)| Ok((from_cbor(k)?, from_cbor(v)?)))
            .collect::<CodecResult<Vec<_>>>()
            .map(Value::Map),
        Cbor::Tag(EXTENDED_TIME_TAG, inner) => extended_time(*inner).map(Value::Timestamp),
        Cbor::Tag(EPOCH_SECONDS_TAG, inner) => match *inner {
            Cbor::Integer(n) => integer(n)?
                .checked_mul(MICROS_PER_SECOND)
                .map(Value::Timestamp)
                .ok_or(CodecError::IntegerOverflow),
            Cbor::Float(_) => Err(CodecError::FloatForbidden),
            _ => Err(CodecError::unsupported_type("epoch time")),
        },
        // Unknown tags are transparent.
        Cbor::Tag(_, inner) => from_cbor(*inner),
        _ => Err(CodecError::unsupported_type("simple value")),
    }
}

fn integer(n: Integer) -> CodecResult<i64> {
    i64::try_from(n).map_err(|_| CodecError::IntegerOverflow)
}

fn extended_time(inner: Cbor) -> CodecResult<i64> {
    let Cbor::Map(pairs) = inner else {
        return Err(CodecError::unsupported_type("extended time"));
    };

    let mut seconds = None;
    let mut fraction = 0;
    for (key, value) in pairs {
        let (Cbor::Integer(key), Cbor::Integer(value)) = (key, value) else {
            return Err(CodecError::unsupported_type("extended time"));
        };
        match integer(key)? {
            SECONDS_KEY => seconds = Some(integer(value)?),
            MICROS_KEY => fraction = integer(value)?,
            _ => return Err(CodecError::unsupported_type("extended time")),
        }
    }

    let seconds = seconds.ok_or_else(|| CodecError::decoding_failed("extended time without seconds"))?;
    let micros = i128::from(seconds) * i128::from(MICROS_PER_SECOND) + i128::from(fraction);
    i64::try_from(micros).map_err(|_| CodecError::IntegerOverflow)
}
