//! Schema-driven binary codec
//!
//! ## Wire format
//!
//! Fields are concatenated in schema order with no separators, envelope, or
//! embedded schema:
//!
//! | type      | layout                                     |
//! |-----------|--------------------------------------------|
//! | `int`     | zig-zag varint                             |
//! | `long`    | zig-zag varint                             |
//! | `string`  | u32 little-endian byte length + UTF-8      |
//! | `boolean` | one byte, `0` or `1`                       |
//! | `double`  | 8 bytes IEEE-754 little-endian             |
//! | `null`    | nothing                                    |
//!
//! The schema version travels out-of-band (see [`EncodedMessage`]); a decoder
//! needs the exact writer schema to find field boundaries.

use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, EncodeError};
use crate::schema::Schema;
use crate::value::{FieldType, Record, Value};
use crate::version::SchemaVersion;

/// Longest zig-zag varint for a 64-bit value
const MAX_VARINT_LEN: usize = 10;

/// What `decode` does with bytes left after the last field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrailingData {
    /// Fail with [`DecodeError::TrailingData`]
    #[default]
    Reject,
    /// Drop the leftover bytes
    Ignore,
}

/// Encoded bytes plus the version id of the schema that wrote them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedMessage {
    pub version: SchemaVersion,
    pub bytes: Vec<u8>,
}

impl EncodedMessage {
    pub fn new(version: SchemaVersion, bytes: Vec<u8>) -> Self {
        Self { version, bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Encoder/decoder parameterized by the trailing-data policy
#[derive(Debug, Clone, Copy, Default)]
pub struct Codec {
    trailing: TrailingData,
}

impl Codec {
    pub fn new(trailing: TrailingData) -> Self {
        Self { trailing }
    }

    pub fn trailing_data(&self) -> TrailingData {
        self.trailing
    }

    /// Encode `record` under `schema`, walking the schema's fields in order.
    ///
    /// Record fields unknown to the schema are ignored.
    pub fn encode(&self, schema: &Schema, record: &Record) -> Result<Vec<u8>, EncodeError> {
        let mut out = Vec::with_capacity(schema.fields().len() * 8);

        for field in schema.fields() {
            let value = match (record.get(&field.name), &field.default) {
                (Some(value), _) => value,
                (None, Some(default)) => default,
                (None, None) => {
                    return Err(EncodeError::MissingField {
                        field: field.name.clone(),
                    })
                }
            };

            if !field.field_type.accepts(value) {
                return Err(EncodeError::TypeMismatch {
                    field: field.name.clone(),
                    expected: field.field_type.to_string(),
                    found: value.type_name().to_string(),
                });
            }

            write_value(&mut out, value, &field.name)?;
        }

        Ok(out)
    }

    /// Encode and tag the bytes with the schema's version
    pub fn encode_message(&self, schema: &Schema, record: &Record) -> Result<EncodedMessage, EncodeError> {
        let bytes = self.encode(schema, record)?;
        Ok(EncodedMessage::new(schema.version().clone(), bytes))
    }

    /// Decode bytes written with exactly `schema`
    pub fn decode(&self, schema: &Schema, bytes: &[u8]) -> Result<Record, DecodeError> {
        let mut reader = Reader::new(bytes);
        let mut record = Record::new();

        for field in schema.fields() {
            let value = reader.read_value(field.field_type, &field.name)?;
            record.insert(field.name.clone(), value);
        }

        self.finish(&reader)?;
        Ok(record)
    }

    /// Apply the trailing-data policy once every field has been read
    pub(crate) fn finish(&self, reader: &Reader<'_>) -> Result<(), DecodeError> {
        match (self.trailing, reader.remaining()) {
            (_, 0) | (TrailingData::Ignore, _) => Ok(()),
            (TrailingData::Reject, remaining) => Err(DecodeError::TrailingData { remaining }),
        }
    }
}

/// Encode with the default codec
pub fn encode(schema: &Schema, record: &Record) -> Result<Vec<u8>, EncodeError> {
    Codec::default().encode(schema, record)
}

/// Decode with the default codec (trailing bytes rejected)
pub fn decode(schema: &Schema, bytes: &[u8]) -> Result<Record, DecodeError> {
    Codec::default().decode(schema, bytes)
}

fn write_value(out: &mut Vec<u8>, value: &Value, field: &str) -> Result<(), EncodeError> {
    match value {
        Value::Int(v) => write_varint(out, *v),
        Value::String(s) => {
            out.extend_from_slice(&length_prefix(s.len(), field)?);
            out.extend_from_slice(s.as_bytes());
        }
        Value::Boolean(b) => out.push(u8::from(*b)),
        Value::Double(d) => out.extend_from_slice(&d.to_le_bytes()),
        Value::Null => {}
    }
    Ok(())
}

/// u32 little-endian string length
fn length_prefix(len: usize, field: &str) -> Result<[u8; 4], EncodeError> {
    u32::try_from(len)
        .map(u32::to_le_bytes)
        .map_err(|_| EncodeError::TooLarge {
            field: field.to_string(),
            len,
        })
}

/// Zig-zag then LEB128
pub(crate) fn write_varint(out: &mut Vec<u8>, value: i64) {
    let mut n = ((value << 1) ^ (value >> 63)) as u64;
    while n >= 0x80 {
        out.push((n as u8 & 0x7f) | 0x80);
        n >>= 7;
    }
    out.push(n as u8);
}

/// Cursor over an encoded buffer
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, needed: usize, field: &str) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < needed {
            return Err(DecodeError::Truncated {
                field: field.to_string(),
                needed,
                remaining: self.remaining(),
            });
        }
        let buf = self.buf;
        let slice = &buf[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(slice)
    }

    fn read_varint(&mut self, field: &str) -> Result<i64, DecodeError> {
        let mut n: u64 = 0;
        for i in 0..MAX_VARINT_LEN {
            let byte = self.take(1, field)?[0];
            // The tenth byte may only carry the top bit of a u64.
            if i == MAX_VARINT_LEN - 1 && byte > 0x01 {
                return Err(DecodeError::VarintOverflow {
                    field: field.to_string(),
                });
            }
            n |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(((n >> 1) as i64) ^ -((n & 1) as i64));
            }
        }
        Err(DecodeError::VarintOverflow {
            field: field.to_string(),
        })
    }

    fn read_len(&mut self, field: &str) -> Result<usize, DecodeError> {
        let raw = self.take(4, field)?;
        let len = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        Ok(len as usize)
    }

    pub(crate) fn read_value(&mut self, ty: FieldType, field: &str) -> Result<Value, DecodeError> {
        match ty {
            FieldType::Int32 => {
                let v = self.read_varint(field)?;
                if i32::try_from(v).is_err() {
                    return Err(DecodeError::OutOfRange {
                        field: field.to_string(),
                    });
                }
                Ok(Value::Int(v))
            }
            FieldType::Int64 => Ok(Value::Int(self.read_varint(field)?)),
            FieldType::String => {
                let len = self.read_len(field)?;
                let raw = self.take(len, field)?;
                let s = std::str::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8 {
                    field: field.to_string(),
                })?;
                Ok(Value::String(s.to_string()))
            }
            FieldType::Boolean => match self.take(1, field)?[0] {
                0 => Ok(Value::Boolean(false)),
                1 => Ok(Value::Boolean(true)),
                byte => Err(DecodeError::InvalidBoolean {
                    field: field.to_string(),
                    byte,
                }),
            },
            FieldType::Double => {
                let raw = self.take(8, field)?;
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(raw);
                Ok(Value::Double(f64::from_le_bytes(bytes)))
            }
            FieldType::Null => Ok(Value::Null),
        }
    }

    /// Advance past a value without materializing it
    pub(crate) fn skip_value(&mut self, ty: FieldType, field: &str) -> Result<(), DecodeError> {
        match ty {
            FieldType::Int32 | FieldType::Int64 => self.read_varint(field).map(|_| ()),
            FieldType::String => {
                let len = self.read_len(field)?;
                self.take(len, field).map(|_| ())
            }
            FieldType::Boolean => self.take(1, field).map(|_| ()),
            FieldType::Double => self.take(8, field).map(|_| ()),
            FieldType::Null => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Field;

    fn user_v1() -> Schema {
        Schema::new(
            "User",
            SchemaVersion::new(1, 0, 0),
            vec![
                Field::required("id", FieldType::Int64),
                Field::required("name", FieldType::String),
                Field::optional("age", FieldType::Int32, 0),
            ],
        )
        .unwrap()
    }

    fn varint(v: i64) -> Vec<u8> {
        let mut out = Vec::new();
        write_varint(&mut out, v);
        out
    }

    #[test]
    fn test_zigzag_layout() {
        assert_eq!(varint(0), vec![0x00]);
        assert_eq!(varint(-1), vec![0x01]);
        assert_eq!(varint(1), vec![0x02]);
        assert_eq!(varint(-2), vec![0x03]);
        assert_eq!(varint(63), vec![0x7e]);
        assert_eq!(varint(64), vec![0x80, 0x01]);
        assert_eq!(varint(i64::MAX).len(), MAX_VARINT_LEN);
        assert_eq!(varint(i64::MIN).len(), MAX_VARINT_LEN);
    }

    #[test]
    fn test_varint_extremes_decode() {
        for v in [0, 1, -1, 300, -300, i32::MAX as i64, i32::MIN as i64, i64::MAX, i64::MIN] {
            let bytes = varint(v);
            let mut reader = Reader::new(&bytes);
            assert_eq!(reader.read_varint("x").unwrap(), v);
            assert_eq!(reader.remaining(), 0);
        }
    }

    #[test]
    fn test_varint_overflow() {
        let bytes = [0xff; 11];
        let mut reader = Reader::new(&bytes);
        assert!(matches!(
            reader.read_varint("x"),
            Err(DecodeError::VarintOverflow { .. })
        ));
    }

    #[test]
    fn test_concrete_user_layout() {
        let schema = user_v1();
        let record = Record::new().with("id", 1i64).with("name", "Alice");

        let bytes = encode(&schema, &record).unwrap();
        let expected_len = varint(1).len() + (4 + "Alice".len()) + varint(0).len();
        assert_eq!(bytes.len(), expected_len);
        assert_eq!(
            bytes,
            vec![0x02, 5, 0, 0, 0, b'A', b'l', b'i', b'c', b'e', 0x00]
        );

        let decoded = decode(&schema, &bytes).unwrap();
        assert_eq!(decoded, record.with("age", 0));
    }

    #[test]
    fn test_all_types_round_trip() {
        let schema = Schema::new(
            "Everything",
            SchemaVersion::new(1, 0, 0),
            vec![
                Field::required("small", FieldType::Int32),
                Field::required("big", FieldType::Int64),
                Field::required("text", FieldType::String),
                Field::required("flag", FieldType::Boolean),
                Field::required("ratio", FieldType::Double),
                Field::required("nothing", FieldType::Null),
            ],
        )
        .unwrap();

        let record = Record::new()
            .with("small", -42)
            .with("big", i64::MIN)
            .with("text", "héllo wörld")
            .with("flag", true)
            .with("ratio", -0.125)
            .with("nothing", Value::Null);

        let bytes = encode(&schema, &record).unwrap();
        assert_eq!(decode(&schema, &bytes).unwrap(), record);
    }

    #[test]
    fn test_encode_is_deterministic_and_ignores_unknown_fields() {
        let schema = user_v1();
        let a = Record::new().with("id", 9i64).with("name", "Zed").with("age", 40);
        let b = a.clone().with("nickname", "z");
        assert_eq!(encode(&schema, &a).unwrap(), encode(&schema, &a).unwrap());
        assert_eq!(encode(&schema, &a).unwrap(), encode(&schema, &b).unwrap());
    }

    #[test]
    fn test_missing_required_field() {
        let err = encode(&user_v1(), &Record::new().with("id", 1i64)).unwrap_err();
        assert_eq!(
            err,
            EncodeError::MissingField {
                field: "name".to_string()
            }
        );
    }

    #[test]
    fn test_length_prefix_limit() {
        assert_eq!(length_prefix(5, "name").unwrap(), [5, 0, 0, 0]);
        assert_eq!(length_prefix(u32::MAX as usize, "name").unwrap(), [0xff; 4]);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_length_prefix_rejects_oversized_string() {
        let len = u32::MAX as usize + 1;
        assert_eq!(
            length_prefix(len, "name").unwrap_err(),
            EncodeError::TooLarge {
                field: "name".to_string(),
                len
            }
        );
    }

    #[test]
    fn test_type_mismatch() {
        let err = encode(
            &user_v1(),
            &Record::new().with("id", "one").with("name", "Alice"),
        )
        .unwrap_err();
        assert!(matches!(err, EncodeError::TypeMismatch { field, .. } if field == "id"));

        let err = encode(
            &user_v1(),
            &Record::new()
                .with("id", 1i64)
                .with("name", "Alice")
                .with("age", i64::from(i32::MAX) + 1),
        )
        .unwrap_err();
        assert!(matches!(err, EncodeError::TypeMismatch { field, .. } if field == "age"));
    }

    #[test]
    fn test_truncated_data() {
        let schema = user_v1();
        let bytes = encode(&schema, &Record::new().with("id", 1i64).with("name", "Alice")).unwrap();

        let err = decode(&schema, &bytes[..4]).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { field, .. } if field == "name"));

        let err = decode(&schema, &bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { field, .. } if field == "age"));

        assert!(matches!(
            decode(&schema, &[]),
            Err(DecodeError::Truncated { needed: 1, remaining: 0, .. })
        ));
    }

    #[test]
    fn test_trailing_data_policy() {
        let schema = user_v1();
        let mut bytes = encode(&schema, &Record::new().with("id", 1i64).with("name", "A")).unwrap();
        bytes.extend_from_slice(&[0xde, 0xad]);

        assert_eq!(
            decode(&schema, &bytes).unwrap_err(),
            DecodeError::TrailingData { remaining: 2 }
        );

        let lenient = Codec::new(TrailingData::Ignore);
        let record = lenient.decode(&schema, &bytes).unwrap();
        assert_eq!(record.get("name"), Some(&Value::from("A")));
    }

    #[test]
    fn test_invalid_boolean_and_utf8() {
        let flags = Schema::new(
            "Flags",
            SchemaVersion::new(1, 0, 0),
            vec![Field::required("on", FieldType::Boolean)],
        )
        .unwrap();
        assert_eq!(
            decode(&flags, &[2]).unwrap_err(),
            DecodeError::InvalidBoolean {
                field: "on".to_string(),
                byte: 2
            }
        );

        let text = Schema::new(
            "Text",
            SchemaVersion::new(1, 0, 0),
            vec![Field::required("s", FieldType::String)],
        )
        .unwrap();
        assert!(matches!(
            decode(&text, &[2, 0, 0, 0, 0xc3, 0x28]),
            Err(DecodeError::InvalidUtf8 { .. })
        ));
    }

    #[test]
    fn test_int32_out_of_range_on_decode() {
        let wide = varint(i64::from(i32::MAX) + 1);
        let schema = Schema::new(
            "Narrow",
            SchemaVersion::new(1, 0, 0),
            vec![Field::required("n", FieldType::Int32)],
        )
        .unwrap();
        assert!(matches!(
            decode(&schema, &wide),
            Err(DecodeError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_encode_message_carries_version() {
        let schema = user_v1();
        let message = Codec::default()
            .encode_message(&schema, &Record::new().with("id", 3i64).with("name", "C"))
            .unwrap();
        assert_eq!(message.version, SchemaVersion::new(1, 0, 0));
        assert!(!message.is_empty());
    }
}
