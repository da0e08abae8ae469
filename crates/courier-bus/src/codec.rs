//! # Envelope Codec
//!
//! Normalizes the four decodable body encodings into one structured
//! document (`serde_json::Value`), maps documents onto typed values, and
//! renders typed values back into Text envelopes.
//!
//! | Body | Decoding |
//! |------|----------|
//! | Text | parsed as a JSON document; blank text is `null` |
//! | Binary | `u16` big-endian length prefix, UTF-8 text, then as Text |
//! | Map | each field converted recursively into an object member |
//! | Object | tree-converted through its `Serialize` impl |
//! | anything else | `CodecError::UnsupportedEncoding` with the type tag |
//!
//! The codec is stateless and has no side effects.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number, Value};

use courier_types::{Body, CodecError, Envelope, FieldValue};

/// Decode an envelope into a structured document.
pub fn decode(envelope: &Envelope) -> Result<Value, CodecError> {
    match &envelope.body {
        Body::Text(text) => parse_document(text),
        Body::Binary(bytes) => parse_document(&read_utf(bytes)?),
        Body::Map(fields) => {
            let object: Map<String, Value> = fields
                .iter()
                .map(|(name, value)| (name.clone(), field_to_document(value)))
                .collect();
            Ok(Value::Object(object))
        }
        Body::Object(object) => Ok(object.to_tree()?),
        Body::Stream(_) | Body::Empty => Err(CodecError::UnsupportedEncoding {
            type_tag: envelope.describe_type(),
        }),
    }
}

/// Map a document onto `T`. A `null` document yields `None`.
pub fn deserialize<T: DeserializeOwned>(document: Value) -> Result<Option<T>, CodecError> {
    if document.is_null() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_value(document)?))
}

/// Decode an envelope and map the result onto `T`.
pub fn read<T: DeserializeOwned>(envelope: &Envelope) -> Result<Option<T>, CodecError> {
    deserialize(decode(envelope)?)
}

/// Serialize a value into a Text envelope.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Envelope, CodecError> {
    let document = serde_json::to_value(value)?;
    Ok(text(document.to_string()))
}

/// Wrap raw text as a Text envelope.
pub fn text(text: impl Into<String>) -> Envelope {
    Envelope::text(text)
}

/// Write `text` as a length-prefixed UTF-8 payload.
pub fn write_utf(text: &str) -> Result<Bytes, CodecError> {
    let length = u16::try_from(text.len()).map_err(|_| CodecError::Oversized {
        length: text.len(),
    })?;

    let mut buffer = BytesMut::with_capacity(text.len() + 2);
    buffer.put_u16(length);
    buffer.put_slice(text.as_bytes());
    Ok(buffer.freeze())
}

/// Read a length-prefixed UTF-8 payload.
pub fn read_utf(bytes: &Bytes) -> Result<String, CodecError> {
    let mut buffer = bytes.clone();
    if buffer.remaining() < 2 {
        return Err(CodecError::Truncated {
            expected: 2,
            available: buffer.remaining(),
        });
    }

    let length = usize::from(buffer.get_u16());
    if buffer.remaining() < length {
        return Err(CodecError::Truncated {
            expected: length,
            available: buffer.remaining(),
        });
    }

    let text = std::str::from_utf8(&buffer[..length]).map_err(|_| CodecError::InvalidUtf8)?;
    Ok(text.to_string())
}

fn parse_document(text: &str) -> Result<Value, CodecError> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(text)?)
}

fn field_to_document(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Bool(flag) => Value::Bool(*flag),
        FieldValue::Int(number) => Value::Number(Number::from(*number)),
        // Non-finite floats have no JSON form
        FieldValue::Float(number) => Number::from_f64(*number).map_or(Value::Null, Value::Number),
        FieldValue::Text(text) => Value::String(text.clone()),
        FieldValue::Bytes(bytes) => Value::Array(
            bytes
                .iter()
                .map(|byte| Value::Number(Number::from(*byte)))
                .collect(),
        ),
        FieldValue::List(items) => Value::Array(items.iter().map(field_to_document).collect()),
        FieldValue::Map(fields) => Value::Object(
            fields
                .iter()
                .map(|(name, value)| (name.clone(), field_to_document(value)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct OrderPlaced {
        order_id: u64,
        customer: String,
        lines: Vec<String>,
    }

    fn sample() -> OrderPlaced {
        OrderPlaced {
            order_id: 42,
            customer: "ada".to_string(),
            lines: vec!["widget".to_string(), "gizmo".to_string()],
        }
    }

    #[test]
    fn test_map_body_becomes_object() {
        let mut fields = BTreeMap::new();
        fields.insert("a".to_string(), FieldValue::Int(1));
        fields.insert("b".to_string(), FieldValue::from("x"));

        let document = decode(&Envelope::map(fields)).unwrap();
        assert_eq!(document, json!({"a": 1, "b": "x"}));
    }

    #[test]
    fn test_nested_map_fields() {
        let mut inner = BTreeMap::new();
        inner.insert("ok".to_string(), FieldValue::Bool(true));

        let mut fields = BTreeMap::new();
        fields.insert("meta".to_string(), FieldValue::Map(inner));
        fields.insert(
            "tags".to_string(),
            FieldValue::List(vec![FieldValue::from("a"), FieldValue::Null]),
        );
        fields.insert("raw".to_string(), FieldValue::Bytes(vec![1, 255]));
        fields.insert("nan".to_string(), FieldValue::Float(f64::NAN));

        let document = decode(&Envelope::map(fields)).unwrap();
        assert_eq!(
            document,
            json!({"meta": {"ok": true}, "tags": ["a", null], "raw": [1, 255], "nan": null})
        );
    }

    #[test]
    fn test_round_trip_through_every_encoding() {
        let value = sample();
        let document = serde_json::to_string(&value).unwrap();

        let mut fields = BTreeMap::new();
        fields.insert("order_id".to_string(), FieldValue::Int(42));
        fields.insert("customer".to_string(), FieldValue::from("ada"));
        fields.insert(
            "lines".to_string(),
            FieldValue::List(vec![FieldValue::from("widget"), FieldValue::from("gizmo")]),
        );

        let envelopes = [
            encode(&value).unwrap(),
            Envelope::binary(write_utf(&document).unwrap()),
            Envelope::map(fields),
            Envelope::object(value.clone()),
        ];

        for envelope in &envelopes {
            let decoded: Option<OrderPlaced> = read(envelope).unwrap();
            assert_eq!(decoded.as_ref(), Some(&value), "encoding {}", envelope.body.encoding());
        }
    }

    #[test]
    fn test_unsupported_encoding_carries_type_tag() {
        let envelope = Envelope::new(Body::Stream(vec![FieldValue::Int(1)])).with_type_tag("ledger.v1");
        assert_eq!(
            decode(&envelope),
            Err(CodecError::UnsupportedEncoding {
                type_tag: "ledger.v1".to_string()
            })
        );

        assert_eq!(
            decode(&Envelope::new(Body::Empty)),
            Err(CodecError::UnsupportedEncoding {
                type_tag: "empty".to_string()
            })
        );
    }

    #[test]
    fn test_null_document_is_absent() {
        let decoded: Option<OrderPlaced> = read(&text("null")).unwrap();
        assert!(decoded.is_none());

        let decoded: Option<OrderPlaced> = read(&text("   ")).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn test_invalid_text_is_document_error() {
        let result: Result<Option<OrderPlaced>, _> = read(&text("{not json"));
        assert!(matches!(result, Err(CodecError::Document(_))));
    }

    #[test]
    fn test_wrong_shape_is_document_error() {
        let result: Result<Option<OrderPlaced>, _> = read(&text(r#"{"order_id": "x"}"#));
        assert!(matches!(result, Err(CodecError::Document(_))));
    }

    #[test]
    fn test_truncated_binary() {
        assert_eq!(
            read_utf(&Bytes::from_static(&[0])),
            Err(CodecError::Truncated {
                expected: 2,
                available: 1
            })
        );
        assert_eq!(
            read_utf(&Bytes::from_static(&[0, 5, b'a'])),
            Err(CodecError::Truncated {
                expected: 5,
                available: 1
            })
        );
    }

    #[test]
    fn test_binary_rejects_invalid_utf8() {
        assert_eq!(
            read_utf(&Bytes::from_static(&[0, 2, 0xff, 0xfe])),
            Err(CodecError::InvalidUtf8)
        );
    }

    #[test]
    fn test_oversized_text() {
        let text = "x".repeat(usize::from(u16::MAX) + 1);
        assert!(matches!(write_utf(&text), Err(CodecError::Oversized { .. })));
    }

    #[test]
    fn test_encode_produces_text() {
        let envelope = encode(&sample()).unwrap();
        let Body::Text(text) = &envelope.body else {
            panic!("expected text body");
        };
        let document: Value = serde_json::from_str(text).unwrap();
        assert_eq!(document["customer"], json!("ada"));
    }

    proptest! {
        #[test]
        fn prop_length_prefixed_text(text in ".{0,512}") {
            let bytes = write_utf(&text).unwrap();
            prop_assert_eq!(read_utf(&bytes).unwrap(), text);
        }
    }
}
