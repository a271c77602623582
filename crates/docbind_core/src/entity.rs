//! Entity instance model.
//!
//! An entity is a thin typed wrapper around a [`Record`]: an ordered
//! `name -> Property` map bound to the type's [`Schema`], plus a cache of
//! resolved relations. The mapper walks records, never concrete structs, so
//! every entity shares one recursive serialize/elevate path.

use crate::error::CoreResult;
use crate::mapper;
use crate::schema::Schema;
use docbind_codec::{DateTime, Document, ObjectId, Value};
use serde_json::Value as JsonValue;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Name of the identifier property.
pub const ID_FIELD: &str = "_id";

/// A value with its own text form, decoded by a schema-registered decoder.
///
/// Custom values are stored as their [`Display`](fmt::Display) output and
/// turned back into values by the field's
/// [`CustomDecoder`](crate::schema::CustomDecoder) when read.
pub trait CustomType: fmt::Display + fmt::Debug + Send + Sync + 'static {
    /// Upcast for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;
}

/// An instance-side value.
#[derive(Debug, Clone, Default)]
pub enum Property {
    /// Null.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Double.
    Double(f64),
    /// Text.
    Text(String),
    /// Identifier.
    ObjectId(ObjectId),
    /// Timestamp.
    DateTime(DateTime),
    /// Binary blob.
    Binary(Vec<u8>),
    /// Sequence.
    Array(Vec<Property>),
    /// Plain nested map.
    Map(Record),
    /// Nested entity with its own schema.
    Entity(Record),
    /// Custom-typed value.
    Custom(Arc<dyn CustomType>),
    /// Any other BSON value (decimal, regex, timestamp, ...), kept verbatim.
    Raw(Value),
}

impl Property {
    /// Converts a stored value without any schema interpretation.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null | Value::Undefined => Property::Null,
            Value::Boolean(b) => Property::Bool(b),
            Value::Int32(n) => Property::Int(i64::from(n)),
            Value::Int64(n) => Property::Int(n),
            Value::Double(f) => Property::Double(f),
            Value::String(s) => Property::Text(s),
            Value::ObjectId(id) => Property::ObjectId(id),
            Value::DateTime(dt) => Property::DateTime(dt),
            Value::Binary(b) => Property::Binary(b.bytes),
            Value::Array(items) => {
                Property::Array(items.into_iter().map(Property::from_value).collect())
            }
            Value::Document(doc) => Property::Map(Record::from_document(doc)),
            other => Property::Raw(other),
        }
    }

    /// Whether this is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Property::Null)
    }

    /// Text value, if this is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Property::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value, if this is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Property::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric value; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Property::Int(n) => Some(*n as f64),
            Property::Double(f) => Some(*f),
            _ => None,
        }
    }

    /// Boolean value, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Property::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Identifier value, if this is an identifier.
    pub fn as_object_id(&self) -> Option<ObjectId> {
        match self {
            Property::ObjectId(id) => Some(*id),
            _ => None,
        }
    }

    /// Timestamp value, if this is a timestamp.
    pub fn as_datetime(&self) -> Option<DateTime> {
        match self {
            Property::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Elements, if this is an array.
    pub fn as_array(&self) -> Option<&[Property]> {
        match self {
            Property::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Nested record, if this is a map or an entity.
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Property::Map(r) | Property::Entity(r) => Some(r),
            _ => None,
        }
    }

    /// Custom value downcast to `C`.
    pub fn as_custom<C: CustomType>(&self) -> Option<&C> {
        match self {
            Property::Custom(c) => c.as_any().downcast_ref::<C>(),
            _ => None,
        }
    }
}

impl PartialEq for Property {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Property::Null, Property::Null) => true,
            (Property::Bool(a), Property::Bool(b)) => a == b,
            (Property::Int(a), Property::Int(b)) => a == b,
            (Property::Double(a), Property::Double(b)) => a == b,
            (Property::Text(a), Property::Text(b)) => a == b,
            (Property::ObjectId(a), Property::ObjectId(b)) => a == b,
            (Property::DateTime(a), Property::DateTime(b)) => a == b,
            (Property::Binary(a), Property::Binary(b)) => a == b,
            (Property::Array(a), Property::Array(b)) => a == b,
            (Property::Map(a), Property::Map(b)) | (Property::Entity(a), Property::Entity(b)) => {
                a == b
            }
            (Property::Custom(a), Property::Custom(b)) => a.to_string() == b.to_string(),
            (Property::Raw(a), Property::Raw(b)) => a == b,
            _ => false,
        }
    }
}

macro_rules! property_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Property {
                fn from(value: $ty) -> Self {
                    Property::$variant(value.into())
                }
            }
        )*
    };
}

property_from! {
    bool => Bool,
    i64 => Int,
    i32 => Int,
    f64 => Double,
    String => Text,
    &str => Text,
    ObjectId => ObjectId,
    DateTime => DateTime,
    Vec<Property> => Array,
}

impl<T: Into<Property>> From<Option<T>> for Property {
    fn from(value: Option<T>) -> Self {
        value.map_or(Property::Null, Into::into)
    }
}

impl From<Arc<dyn CustomType>> for Property {
    fn from(value: Arc<dyn CustomType>) -> Self {
        Property::Custom(value)
    }
}

/// Resolved value of a relation.
#[derive(Debug, Clone, PartialEq)]
pub enum Populated {
    /// Single relation; `None` when the referenced document does not exist.
    One(Option<Record>),
    /// Many relation.
    Many(Vec<Record>),
}

/// Resolution state of one relation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RelationState<'a> {
    /// Not fetched yet.
    Unresolved,
    /// Fetched and cached.
    Resolved(&'a Populated),
}

/// Cache of resolved relations, keyed by relation name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Relations {
    entries: HashMap<String, Populated>,
}

impl Relations {
    /// State of a relation.
    pub fn state(&self, name: &str) -> RelationState<'_> {
        match self.entries.get(name) {
            Some(populated) => RelationState::Resolved(populated),
            None => RelationState::Unresolved,
        }
    }

    /// Whether a relation has been resolved.
    pub fn is_resolved(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Caches a resolved relation.
    pub fn resolve(&mut self, name: impl Into<String>, populated: Populated) {
        self.entries.insert(name.into(), populated);
    }

    /// Forgets every resolved relation.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Resolved relations in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Populated)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether nothing is resolved.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An ordered property map bound to a schema.
#[derive(Clone)]
pub struct Record {
    schema: &'static Schema,
    props: Vec<(String, Property)>,
    relations: Relations,
}

impl Record {
    /// An empty record of `schema`.
    pub fn new(schema: &'static Schema) -> Self {
        Self {
            schema,
            props: Vec::new(),
            relations: Relations::default(),
        }
    }

    /// An empty plain map.
    pub fn untyped() -> Self {
        Self::new(Schema::untyped())
    }

    /// A plain map holding a stored document verbatim.
    pub fn from_document(doc: Document) -> Self {
        let mut record = Self::untyped();
        for (key, value) in doc {
            record.props.push((key, Property::from_value(value)));
        }
        record
    }

    /// Schema this record is bound to.
    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    /// Rebinds the record to another schema.
    #[must_use]
    pub fn with_schema(mut self, schema: &'static Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.props.len()
    }

    /// Whether the record has no properties.
    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    /// Whether `name` is set (null counts as set).
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Looks up a property.
    pub fn get(&self, name: &str) -> Option<&Property> {
        self.position(name).map(|i| &self.props[i].1)
    }

    /// Looks up a property for mutation.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.position(name).map(move |i| &mut self.props[i].1)
    }

    /// Sets a property, keeping its position if it already exists.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Property>) -> Option<Property> {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(i) => Some(std::mem::replace(&mut self.props[i].1, value)),
            None => {
                self.props.push((name, value));
                None
            }
        }
    }

    /// Removes a property.
    pub fn remove(&mut self, name: &str) -> Option<Property> {
        self.position(name).map(|i| self.props.remove(i).1)
    }

    /// Properties in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Property)> {
        self.props.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Properties in order, with mutable values.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Property)> {
        self.props.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    /// Text property.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Property::as_str)
    }

    /// Integer property.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Property::as_i64)
    }

    /// Numeric property.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Property::as_f64)
    }

    /// Boolean property.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Property::as_bool)
    }

    /// Identifier property.
    pub fn get_object_id(&self, name: &str) -> Option<ObjectId> {
        self.get(name).and_then(Property::as_object_id)
    }

    /// Timestamp property.
    pub fn get_datetime(&self, name: &str) -> Option<DateTime> {
        self.get(name).and_then(Property::as_datetime)
    }

    /// The identifier, when it is an [`ObjectId`].
    pub fn id(&self) -> Option<ObjectId> {
        self.get_object_id(ID_FIELD)
    }

    /// Whether a non-null identifier is set.
    pub fn has_id(&self) -> bool {
        self.get(ID_FIELD).is_some_and(|p| !p.is_null())
    }

    /// Sets the identifier.
    pub fn set_id(&mut self, id: ObjectId) {
        self.set(ID_FIELD, id);
    }

    /// Resolved relation cache.
    pub fn relations(&self) -> &Relations {
        &self.relations
    }

    /// Resolved relation cache, mutable.
    pub fn relations_mut(&mut self) -> &mut Relations {
        &mut self.relations
    }

    /// A resolved single relation as a typed entity.
    ///
    /// `None` when unresolved, resolved to nothing, or a many relation.
    pub fn related<U: Entity>(&self, relation: &str) -> Option<U> {
        match self.relations.state(relation) {
            RelationState::Resolved(Populated::One(Some(record))) => {
                Some(U::from_record(record.clone()))
            }
            _ => None,
        }
    }

    /// A resolved many relation as typed entities.
    ///
    /// Empty when unresolved or a single relation.
    pub fn related_many<U: Entity>(&self, relation: &str) -> Vec<U> {
        match self.relations.state(relation) {
            RelationState::Resolved(Populated::Many(records)) => records
                .iter()
                .cloned()
                .map(U::from_record)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Embedded array elements as typed entities.
    pub fn embedded<U: Entity>(&self, name: &str) -> Vec<U> {
        self.get(name)
            .and_then(Property::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Property::as_record)
                    .cloned()
                    .map(U::from_record)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.props.iter().position(|(k, _)| k == name)
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::untyped()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.props == other.props
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in &self.props {
            map.entry(k, v);
        }
        map.finish()
    }
}

/// A typed entity backed by a [`Record`].
///
/// `Default` must produce a fresh instance bound to [`schema`](Self::schema),
/// with whatever initial properties the type wants (for example an empty
/// embedded array). Reads start from `Default` and merge the stored document
/// into it.
///
/// Most types implement this through [`entity!`](crate::entity!).
pub trait Entity: Default + Send + Sync + 'static {
    /// Schema of this type.
    fn schema() -> &'static Schema;

    /// Underlying record.
    fn record(&self) -> &Record;

    /// Underlying record, mutable.
    fn record_mut(&mut self) -> &mut Record;

    /// Wraps a record.
    fn from_record(record: Record) -> Self;

    /// Unwraps the record.
    fn into_record(self) -> Record;

    /// Identifier, once assigned.
    fn id(&self) -> Option<ObjectId> {
        self.record().id()
    }

    /// Merges a stored or partial document into this instance.
    fn elevate(&mut self, update: &Document) -> CoreResult<()> {
        mapper::elevate(self.record_mut(), update)
    }

    /// Storage form of this instance.
    fn to_document(&self) -> Document {
        mapper::storage_document(self.record())
    }

    /// External view; `populated` includes resolved relations.
    fn to_object(&self, populated: bool) -> Document {
        mapper::to_object(self.record(), populated)
    }

    /// External view rendered as JSON.
    fn to_json(&self, populated: bool) -> JsonValue {
        mapper::to_json(self.record(), populated)
    }
}

/// Declares a record-backed entity type.
///
/// ```rust,ignore
/// static CUSTOMER: Lazy<Schema> = Lazy::new(|| Schema::builder("customers").build());
///
/// docbind_core::entity! {
///     /// A customer.
///     pub struct Customer => CUSTOMER;
/// }
/// ```
///
/// The generated type derives `Clone`, `Debug` and `PartialEq`, implements
/// [`Entity`] and `Default` (an empty record), and exposes
/// `Customer::new()`. Use the `custom_default` form to write `Default` by
/// hand.
#[macro_export]
macro_rules! entity {
    ($(#[$meta:meta])* $vis:vis struct $name:ident => $schema:expr;) => {
        $crate::entity!(@decl $(#[$meta])* $vis struct $name => $schema;);

        impl ::std::default::Default for $name {
            fn default() -> Self {
                Self($crate::Record::new(<Self as $crate::Entity>::schema()))
            }
        }
    };
    ($(#[$meta:meta])* $vis:vis struct $name:ident => $schema:expr; custom_default) => {
        $crate::entity!(@decl $(#[$meta])* $vis struct $name => $schema;);
    };
    (@decl $(#[$meta:meta])* $vis:vis struct $name:ident => $schema:expr;) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        $vis struct $name($crate::Record);

        impl $name {
            /// Creates an empty instance.
            #[allow(dead_code)]
            pub fn new() -> Self {
                <Self as ::std::default::Default>::default()
            }
        }

        impl $crate::Entity for $name {
            fn schema() -> &'static $crate::Schema {
                &$schema
            }

            fn record(&self) -> &$crate::Record {
                &self.0
            }

            fn record_mut(&mut self) -> &mut $crate::Record {
                &mut self.0
            }

            fn from_record(record: $crate::Record) -> Self {
                Self(record)
            }

            fn into_record(self) -> $crate::Record {
                self.0
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbind_codec::bson::Regex;
    use docbind_codec::doc;

    #[test]
    fn set_keeps_position() {
        let mut record = Record::untyped();
        record.set("a", 1i64);
        record.set("b", "two");
        record.set("a", 3i64);

        let names: Vec<&str> = record.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(record.get_i64("a"), Some(3));
    }

    #[test]
    fn identifier_helpers() {
        let mut record = Record::untyped();
        assert!(!record.has_id());

        record.set(ID_FIELD, Property::Null);
        assert!(!record.has_id());

        let id = ObjectId::new();
        record.set_id(id);
        assert!(record.has_id());
        assert_eq!(record.id(), Some(id));
    }

    #[test]
    fn from_document_keeps_everything() {
        let record = Record::from_document(doc! {
            "_meta": 1,
            "nested": { "x": true },
            "pattern": Value::RegularExpression(Regex {
                pattern: "^a".into(),
                options: "i".into(),
            }),
        });
        assert_eq!(record.get_i64("_meta"), Some(1));
        assert!(matches!(record.get("pattern"), Some(Property::Raw(_))));
        let nested = record.get("nested").and_then(Property::as_record).unwrap();
        assert_eq!(nested.get_bool("x"), Some(true));
    }

    #[test]
    fn relation_states() {
        let mut relations = Relations::default();
        assert_eq!(relations.state("customer"), RelationState::Unresolved);

        relations.resolve("customer", Populated::One(None));
        assert!(relations.is_resolved("customer"));
        assert_eq!(
            relations.state("customer"),
            RelationState::Resolved(&Populated::One(None))
        );

        relations.clear();
        assert!(relations.is_empty());
    }

    #[test]
    fn option_into_property() {
        assert_eq!(Property::from(None::<&str>), Property::Null);
        assert_eq!(Property::from(Some(5i64)), Property::Int(5));
    }
}
