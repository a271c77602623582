//! Helpers over [`bson::Bson`] values.

use crate::datetime::DateTimeExt;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bson::spec::BinarySubtype;
use bson::{Binary, Bson, Document};
use serde_json::Value as JsonValue;

/// Wraps raw bytes as a generic binary value.
pub fn binary(bytes: Vec<u8>) -> Bson {
    Bson::Binary(Binary {
        subtype: BinarySubtype::Generic,
        bytes,
    })
}

/// Extra accessors and rendering for stored values.
pub trait ValueExt {
    /// Short name of this value's type, used in diagnostics.
    fn type_name(&self) -> &'static str;

    /// Whether this value is a 32-bit integer, a 64-bit integer or a double.
    fn is_number(&self) -> bool;

    /// Integer value of either width.
    fn as_integer(&self) -> Option<i64>;

    /// Numeric value widened to a float.
    fn as_number(&self) -> Option<f64>;

    /// Raw bytes of a binary value.
    fn as_bytes(&self) -> Option<&[u8]>;

    /// Renders this value as JSON.
    ///
    /// Identifiers become hex strings, timestamps RFC 3339 strings (null when
    /// out of range) and binary blobs base64 strings. Other BSON types use
    /// relaxed extended JSON.
    fn to_json(&self) -> JsonValue;
}

impl ValueExt for Bson {
    fn type_name(&self) -> &'static str {
        match self {
            Bson::Null => "null",
            Bson::Boolean(_) => "bool",
            Bson::Int32(_) => "int",
            Bson::Int64(_) => "long",
            Bson::Double(_) => "double",
            Bson::Decimal128(_) => "decimal",
            Bson::String(_) => "string",
            Bson::ObjectId(_) => "objectId",
            Bson::DateTime(_) => "date",
            Bson::Timestamp(_) => "timestamp",
            Bson::Binary(_) => "binData",
            Bson::Array(_) => "array",
            Bson::Document(_) => "object",
            Bson::RegularExpression(_) => "regex",
            _ => "other",
        }
    }

    fn is_number(&self) -> bool {
        matches!(self, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))
    }

    fn as_integer(&self) -> Option<i64> {
        match self {
            Bson::Int32(n) => Some(i64::from(*n)),
            Bson::Int64(n) => Some(*n),
            _ => None,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Bson::Int32(n) => Some(f64::from(*n)),
            Bson::Int64(n) => Some(*n as f64),
            Bson::Double(f) => Some(*f),
            _ => None,
        }
    }

    fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Bson::Binary(b) => Some(&b.bytes),
            _ => None,
        }
    }

    fn to_json(&self) -> JsonValue {
        match self {
            Bson::Null => JsonValue::Null,
            Bson::Boolean(b) => JsonValue::Bool(*b),
            Bson::Int32(n) => JsonValue::Number((*n).into()),
            Bson::Int64(n) => JsonValue::Number((*n).into()),
            Bson::Double(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Bson::String(s) => JsonValue::String(s.clone()),
            Bson::ObjectId(id) => JsonValue::String(id.to_hex()),
            Bson::DateTime(dt) => dt
                .to_rfc3339_millis()
                .map(JsonValue::String)
                .unwrap_or(JsonValue::Null),
            Bson::Binary(b) => JsonValue::String(STANDARD.encode(&b.bytes)),
            Bson::Array(items) => JsonValue::Array(items.iter().map(ValueExt::to_json).collect()),
            Bson::Document(doc) => doc.to_json(),
            other => other.clone().into_relaxed_extjson(),
        }
    }
}

/// JSON rendering for whole documents.
pub trait DocumentExt {
    /// Renders the document as a JSON object.
    fn to_json(&self) -> JsonValue;
}

impl DocumentExt for Document {
    fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{date_from_ymd, doc, parse_object_id};

    #[test]
    fn numbers_widen() {
        assert_eq!(Bson::Int32(42).as_integer(), Some(42));
        assert_eq!(Bson::Int64(42).as_number(), Some(42.0));
        assert_eq!(Bson::Double(0.5).as_integer(), None);
        assert!(Bson::Double(1.5).is_number());
        assert!(!Bson::from("1").is_number());
    }

    #[test]
    fn binary_bytes() {
        assert_eq!(binary(vec![1, 2, 3]).as_bytes(), Some(&[1, 2, 3][..]));
        assert_eq!(binary(vec![]).type_name(), "binData");
    }

    #[test]
    fn json_rendering() {
        let id = parse_object_id("58f0c0ac235ea70d83e6c672").unwrap();
        let value = Bson::Document(doc! {
            "_id": id,
            "born": date_from_ymd(2000, 1, 1).unwrap(),
            "blob": binary(vec![1, 2, 3]),
            "tags": [ "a", Bson::Null ],
        });

        let json = value.to_json();
        assert_eq!(json["_id"], "58f0c0ac235ea70d83e6c672");
        assert_eq!(json["born"], "2000-01-01T00:00:00.000Z");
        assert_eq!(json["blob"], "AQID");
        assert_eq!(json["tags"][1], JsonValue::Null);
    }

    #[test]
    fn documents_render_as_objects() {
        let json = doc! { "z": 1, "a": { "b": true } }.to_json();
        assert_eq!(json["z"], 1);
        assert_eq!(json["a"]["b"], true);
    }
}
