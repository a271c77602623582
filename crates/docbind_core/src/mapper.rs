//! Record <-> document mapping.
//!
//! Two directions:
//! - [`to_document`] walks a record and produces a stored or external
//!   document, filtering internal, ignored and hidden properties.
//! - [`elevate`] merges a document into a record, keeping the datatypes the
//!   record already declares and coercing identifier-shaped text.
//!
//! Internal properties start with `_`; with `populated` views only `__`
//! properties are internal. `_id` always survives.

use crate::entity::{Populated, Property, Record, RelationState, ID_FIELD};
use crate::error::{CoreError, CoreResult};
use crate::schema::Schema;
use docbind_codec::{
    binary, is_object_id_hex, parse_object_id, Document, DocumentExt, ObjectId, Value, ValueExt,
};
use serde_json::Value as JsonValue;
use tracing::trace;

/// Serializes a record.
///
/// - `populated`: only `__` properties are internal, and resolved relations
///   are emitted under `_<relation>` keys
/// - `hidden`: keep properties the schema marks hidden
/// - `ignored`: keep properties the schema marks ignored
pub fn to_document(record: &Record, populated: bool, hidden: bool, ignored: bool) -> Document {
    let schema = record.schema();
    let marker = if populated { "__" } else { "_" };
    let mut doc = Document::new();

    for (name, prop) in record.iter() {
        if name.starts_with(marker) {
            if name == ID_FIELD {
                doc.insert(ID_FIELD, to_value(prop, populated, hidden, ignored));
            }
            continue;
        }
        if !ignored && schema.is_ignored(name) {
            continue;
        }
        if !hidden && schema.is_hidden(name) {
            continue;
        }
        doc.insert(name, to_value(prop, populated, hidden, ignored));
    }

    if populated {
        for relation in schema.relations() {
            let value = match record.relations().state(relation.name()) {
                RelationState::Unresolved => continue,
                RelationState::Resolved(Populated::One(None)) => Value::Null,
                RelationState::Resolved(Populated::One(Some(target))) => {
                    Value::Document(to_document(target, populated, hidden, ignored))
                }
                RelationState::Resolved(Populated::Many(targets)) => Value::Array(
                    targets
                        .iter()
                        .map(|t| Value::Document(to_document(t, populated, hidden, ignored)))
                        .collect(),
                ),
            };
            doc.insert(format!("_{}", relation.name()), value);
        }
    }

    doc
}

/// Serializes a single property with the same flags as [`to_document`].
///
/// Terminal values are returned unchanged.
pub fn to_value(prop: &Property, populated: bool, hidden: bool, ignored: bool) -> Value {
    match prop {
        Property::Null => Value::Null,
        Property::Bool(b) => Value::Boolean(*b),
        Property::Int(n) => Value::Int64(*n),
        Property::Double(f) => Value::Double(*f),
        Property::Text(s) => Value::String(s.clone()),
        Property::ObjectId(id) => Value::ObjectId(*id),
        Property::DateTime(dt) => Value::DateTime(*dt),
        Property::Binary(b) => binary(b.clone()),
        Property::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| to_value(item, populated, hidden, ignored))
                .collect(),
        ),
        Property::Map(record) | Property::Entity(record) => {
            Value::Document(to_document(record, populated, hidden, ignored))
        }
        Property::Custom(custom) => Value::String(custom.to_string()),
        Property::Raw(value) => value.clone(),
    }
}

/// The form written to the store: hidden kept, ignored dropped.
pub fn storage_document(record: &Record) -> Document {
    to_document(record, false, true, false)
}

/// A property in its stored form.
pub fn storage_value(prop: &Property) -> Value {
    to_value(prop, false, true, false)
}

/// The external view: hidden dropped, ignored kept.
pub fn to_object(record: &Record, populated: bool) -> Document {
    to_document(record, populated, false, true)
}

/// The external view as JSON.
pub fn to_json(record: &Record, populated: bool) -> JsonValue {
    to_object(record, populated).to_json()
}

/// Merges `update` into `target`.
///
/// Keys starting with `_` are skipped, except `_id`. For each remaining key:
///
/// | target property | update value | result |
/// |---|---|---|
/// | identifier | identifier or hex text | identifier (else [`CoreError::InvalidIdentifier`]) |
/// | text | anything | replaced verbatim |
/// | array | array | rebuilt element by element |
/// | any | 24-hex text | identifier |
/// | any | other text | custom decoder output, or text |
/// | map or entity | document | merged recursively |
/// | any | anything else | assigned as-is |
///
/// Arrays under an embedded field always become embedded entities, each
/// with an identifier.
pub fn elevate(target: &mut Record, update: &Document) -> CoreResult<()> {
    let schema = target.schema();

    for (key, value) in update.iter() {
        if key.starts_with('_') && key != ID_FIELD {
            continue;
        }

        if let (Some(blank), Value::Array(items)) = (embedded_blank(schema, key), value) {
            let elements = items
                .iter()
                .map(|item| embed_element(blank, item))
                .collect::<CoreResult<Vec<_>>>()?;
            target.set(key, Property::Array(elements));
            continue;
        }

        let merged = match (target.get_mut(key), value) {
            (Some(Property::ObjectId(_)), Value::Null) => Property::Null,
            (Some(Property::ObjectId(_)), value) => {
                Property::ObjectId(coerce_identifier(key, value)?)
            }
            (Some(Property::Text(_)), value) => Property::from_value(value.clone()),
            (Some(Property::Array(_)), Value::Array(items)) => Property::Array(
                items
                    .iter()
                    .map(rebuild_element)
                    .collect::<CoreResult<Vec<_>>>()?,
            ),
            (_, Value::String(text)) => merge_text(schema, key, text)?,
            (_, Value::DateTime(dt)) => Property::DateTime(*dt),
            (Some(Property::Map(nested) | Property::Entity(nested)), Value::Document(doc)) => {
                elevate(nested, doc)?;
                continue;
            }
            (_, value) => Property::from_value(value.clone()),
        };
        target.set(key, merged);
    }

    trace!(collection = schema.collection(), keys = update.len(), "elevated document");
    Ok(())
}

fn coerce_identifier(key: &str, value: &Value) -> CoreResult<ObjectId> {
    match value {
        Value::ObjectId(id) => Ok(*id),
        Value::String(text) => {
            parse_object_id(text).map_err(|_| CoreError::invalid_identifier(key, text.as_str()))
        }
        other => Err(CoreError::invalid_identifier(key, other.type_name())),
    }
}

fn merge_text(schema: &Schema, key: &str, text: &str) -> CoreResult<Property> {
    if is_object_id_hex(text) {
        return Ok(Property::ObjectId(parse_object_id(text)?));
    }
    match schema.custom_decoder(key) {
        Some(decode) => decode(text)
            .map(Property::Custom)
            .map_err(|message| CoreError::custom_decode(key, message)),
        None => Ok(Property::Text(text.to_string())),
    }
}

fn rebuild_element(item: &Value) -> CoreResult<Property> {
    match item {
        Value::Document(doc) => {
            let mut fresh = Record::untyped();
            elevate(&mut fresh, doc)?;
            Ok(Property::Map(fresh))
        }
        other => Ok(Property::from_value(other.clone())),
    }
}

fn embedded_blank(schema: &Schema, key: &str) -> Option<fn() -> Record> {
    schema
        .embedded_fields()
        .find(|(name, _)| *name == key)
        .map(|(_, blank)| blank)
}

fn embed_element(blank: fn() -> Record, item: &Value) -> CoreResult<Property> {
    match item {
        Value::Document(doc) => {
            let mut element = blank();
            if !element.has_id() {
                element.set_id(ObjectId::new());
            }
            elevate(&mut element, doc)?;
            Ok(Property::Entity(element))
        }
        other => Ok(Property::from_value(other.clone())),
    }
}
