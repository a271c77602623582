//! Schema registry.
//!
//! Each entity type describes its fields once, through [`SchemaBuilder`], and
//! keeps the result in a `static`. The mapper, validator and crypto layer read
//! the schema; nothing mutates it after construction.
//!
//! ```rust,ignore
//! static ARTICLE: Lazy<Schema> = Lazy::new(|| {
//!     Schema::builder("articles")
//!         .required("name")
//!         .text("name", TextRule::new().pattern(Regex::new("^[^0-9]+$").unwrap()))
//!         .number("price", NumberRule::new().min(10.0).max(100.0))
//!         .encrypted("encryptedProperty")
//!         .boolean("active")
//!         .build()
//! });
//! ```

use crate::entity::{CustomType, Entity, Record};
use docbind_codec::{DateTime, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// Decodes the text form of a custom-typed field.
pub type CustomDecoder = fn(&str) -> Result<Arc<dyn CustomType>, String>;

/// Bounds and default of a number field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumberRule {
    /// Inclusive minimum.
    pub min: Option<f64>,
    /// Inclusive maximum.
    pub max: Option<f64>,
    /// Injected on save when the key is absent.
    pub default: Option<Value>,
}

impl NumberRule {
    /// A number field without bounds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the minimum.
    #[must_use]
    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Sets the maximum.
    #[must_use]
    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// Sets the default value (an integer or a double).
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Pattern and default of a text field.
#[derive(Debug, Clone, Default)]
pub struct TextRule {
    /// Pattern the value must match.
    pub pattern: Option<Regex>,
    /// Injected on save when the value is absent, null or empty.
    pub default: Option<String>,
}

impl TextRule {
    /// A text field without a pattern.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pattern.
    #[must_use]
    pub fn pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Bounds and default of a date field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRule {
    /// Inclusive minimum.
    pub min: Option<DateTime>,
    /// Inclusive maximum.
    pub max: Option<DateTime>,
    /// Injected on save when the key is absent.
    pub default: Option<DateTime>,
}

impl DateRule {
    /// A date field without bounds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the minimum.
    #[must_use]
    pub fn min(mut self, min: DateTime) -> Self {
        self.min = Some(min);
        self
    }

    /// Sets the maximum.
    #[must_use]
    pub fn max(mut self, max: DateTime) -> Self {
        self.max = Some(max);
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default_value(mut self, value: DateTime) -> Self {
        self.default = Some(value);
        self
    }
}

/// The role a descriptor gives its field.
#[derive(Clone)]
pub enum FieldKind {
    /// Must be a key of the storage document.
    Required,
    /// Integer or double, optionally bounded.
    Number(NumberRule),
    /// Text, optionally matching a pattern.
    Text(TextRule),
    /// Boolean.
    Boolean,
    /// Identifier, or its 24-character hex form.
    Identifier,
    /// E-mail address.
    Email,
    /// Calendar-valid timestamp, optionally bounded.
    Date(DateRule),
    /// Encrypted at rest.
    Encrypted,
    /// Decoded from text through a custom decoder.
    CustomType(CustomDecoder),
    /// Array of embedded entities of the given schema.
    EmbeddedRef(fn() -> Record),
}

impl fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Required => f.write_str("Required"),
            FieldKind::Number(rule) => f.debug_tuple("Number").field(rule).finish(),
            FieldKind::Text(rule) => f.debug_tuple("Text").field(rule).finish(),
            FieldKind::Boolean => f.write_str("Boolean"),
            FieldKind::Identifier => f.write_str("Identifier"),
            FieldKind::Email => f.write_str("Email"),
            FieldKind::Date(rule) => f.debug_tuple("Date").field(rule).finish(),
            FieldKind::Encrypted => f.write_str("Encrypted"),
            FieldKind::CustomType(_) => f.write_str("CustomType"),
            FieldKind::EmbeddedRef(_) => f.write_str("EmbeddedRef"),
        }
    }
}

/// A field name paired with one of its roles.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// Field name.
    pub name: String,
    /// Role of the field.
    pub kind: FieldKind,
}

/// Whether a relation resolves to one entity or many.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// The reference field holds one identifier.
    One,
    /// The reference field holds an array of identifiers.
    Many,
}

/// A reference from one entity type to another.
#[derive(Clone)]
pub struct Relation {
    name: String,
    collection: String,
    reference: String,
    cardinality: Cardinality,
    blank: fn() -> Record,
}

pub(crate) fn blank_record<T: Entity>() -> Record {
    T::default().into_record()
}

impl Relation {
    /// A relation resolving `reference` (one identifier) into a `T`.
    pub fn one<T: Entity>(
        name: impl Into<String>,
        collection: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            collection: collection.into(),
            reference: reference.into(),
            cardinality: Cardinality::One,
            blank: blank_record::<T>,
        }
    }

    /// A relation resolving `reference` (an identifier array) into `T`s.
    pub fn many<T: Entity>(
        name: impl Into<String>,
        collection: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            cardinality: Cardinality::Many,
            ..Self::one::<T>(name, collection, reference)
        }
    }

    /// Relation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Collection holding the target documents.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Field holding the identifier(s).
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// One or many.
    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// A fresh, empty instance of the target type.
    pub fn blank(&self) -> Record {
        (self.blank)()
    }

    pub(crate) fn blank_fn(&self) -> fn() -> Record {
        self.blank
    }
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("name", &self.name)
            .field("collection", &self.collection)
            .field("reference", &self.reference)
            .field("cardinality", &self.cardinality)
            .finish()
    }
}

/// Field metadata of one entity type.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    collection: String,
    fields: Vec<FieldDescriptor>,
    ignored: Vec<String>,
    hidden: Vec<String>,
    relations: Vec<Relation>,
    update_on_save: Option<String>,
    auto_populate: bool,
}

static UNTYPED: Lazy<Schema> = Lazy::new(Schema::default);

impl Schema {
    /// Starts a schema for documents stored in `collection`.
    pub fn builder(collection: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            schema: Schema {
                collection: collection.into(),
                ..Schema::default()
            },
        }
    }

    /// The empty schema of plain nested maps.
    pub fn untyped() -> &'static Schema {
        &UNTYPED
    }

    /// Collection name (empty for untyped and embedded schemas).
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// All descriptors, in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Names declared required.
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().filter_map(|d| match d.kind {
            FieldKind::Required => Some(d.name.as_str()),
            _ => None,
        })
    }

    /// Number descriptors.
    pub fn number_fields(&self) -> impl Iterator<Item = (&str, &NumberRule)> {
        self.fields.iter().filter_map(|d| match &d.kind {
            FieldKind::Number(rule) => Some((d.name.as_str(), rule)),
            _ => None,
        })
    }

    /// Text descriptors.
    pub fn text_fields(&self) -> impl Iterator<Item = (&str, &TextRule)> {
        self.fields.iter().filter_map(|d| match &d.kind {
            FieldKind::Text(rule) => Some((d.name.as_str(), rule)),
            _ => None,
        })
    }

    /// Date descriptors.
    pub fn date_fields(&self) -> impl Iterator<Item = (&str, &DateRule)> {
        self.fields.iter().filter_map(|d| match &d.kind {
            FieldKind::Date(rule) => Some((d.name.as_str(), rule)),
            _ => None,
        })
    }

    /// Names declared boolean.
    pub fn boolean_fields(&self) -> impl Iterator<Item = &str> {
        self.names_of(|k| matches!(k, FieldKind::Boolean))
    }

    /// Names declared identifiers.
    pub fn identifier_fields(&self) -> impl Iterator<Item = &str> {
        self.names_of(|k| matches!(k, FieldKind::Identifier))
    }

    /// Names declared e-mail addresses.
    pub fn email_fields(&self) -> impl Iterator<Item = &str> {
        self.names_of(|k| matches!(k, FieldKind::Email))
    }

    /// Names declared encrypted.
    pub fn encrypted_fields(&self) -> impl Iterator<Item = &str> {
        self.names_of(|k| matches!(k, FieldKind::Encrypted))
    }

    /// Embedded array fields and their element constructors.
    pub fn embedded_fields(&self) -> impl Iterator<Item = (&str, fn() -> Record)> {
        self.fields.iter().filter_map(|d| match d.kind {
            FieldKind::EmbeddedRef(blank) => Some((d.name.as_str(), blank)),
            _ => None,
        })
    }

    /// Custom decoder registered for `field`, if any.
    pub fn custom_decoder(&self, field: &str) -> Option<CustomDecoder> {
        self.fields.iter().find_map(|d| match d.kind {
            FieldKind::CustomType(decode) if d.name == field => Some(decode),
            _ => None,
        })
    }

    /// Whether `field` is excluded from storage documents.
    pub fn is_ignored(&self, field: &str) -> bool {
        self.ignored.iter().any(|name| name == field)
    }

    /// Whether `field` is excluded from external views.
    pub fn is_hidden(&self, field: &str) -> bool {
        self.hidden.iter().any(|name| name == field)
    }

    /// Declared relations.
    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    /// Relation by name.
    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Field stamped with the current time on every save.
    pub fn update_on_save(&self) -> Option<&str> {
        self.update_on_save.as_deref()
    }

    /// Whether reads populate every relation automatically.
    pub fn auto_populate(&self) -> bool {
        self.auto_populate
    }

    fn names_of(&self, pred: impl Fn(&FieldKind) -> bool) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(move |d| pred(&d.kind))
            .map(|d| d.name.as_str())
    }
}

/// Builder for [`Schema`].
#[derive(Debug)]
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.schema.fields.push(FieldDescriptor {
            name: name.into(),
            kind,
        });
        self
    }

    /// Declares a required field.
    #[must_use]
    pub fn required(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::Required)
    }

    /// Declares a number field.
    #[must_use]
    pub fn number(self, name: impl Into<String>, rule: NumberRule) -> Self {
        self.field(name, FieldKind::Number(rule))
    }

    /// Declares a text field.
    #[must_use]
    pub fn text(self, name: impl Into<String>, rule: TextRule) -> Self {
        self.field(name, FieldKind::Text(rule))
    }

    /// Declares a boolean field.
    #[must_use]
    pub fn boolean(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::Boolean)
    }

    /// Declares an identifier field.
    #[must_use]
    pub fn identifier(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::Identifier)
    }

    /// Declares an e-mail field.
    #[must_use]
    pub fn email(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::Email)
    }

    /// Declares a date field.
    #[must_use]
    pub fn date(self, name: impl Into<String>, rule: DateRule) -> Self {
        self.field(name, FieldKind::Date(rule))
    }

    /// Declares an encrypted field.
    #[must_use]
    pub fn encrypted(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::Encrypted)
    }

    /// Declares a custom-typed field.
    #[must_use]
    pub fn custom_type(self, name: impl Into<String>, decode: CustomDecoder) -> Self {
        self.field(name, FieldKind::CustomType(decode))
    }

    /// Declares an array of embedded `T` entities.
    #[must_use]
    pub fn embedded<T: Entity>(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::EmbeddedRef(blank_record::<T>))
    }

    /// Excludes a field from storage documents.
    #[must_use]
    pub fn ignored(mut self, name: impl Into<String>) -> Self {
        self.schema.ignored.push(name.into());
        self
    }

    /// Excludes a field from external views.
    #[must_use]
    pub fn hidden(mut self, name: impl Into<String>) -> Self {
        self.schema.hidden.push(name.into());
        self
    }

    /// Declares a relation.
    #[must_use]
    pub fn relation(mut self, relation: Relation) -> Self {
        self.schema.relations.push(relation);
        self
    }

    /// Stamps `name` with the current time on every save.
    #[must_use]
    pub fn update_on_save(mut self, name: impl Into<String>) -> Self {
        self.schema.update_on_save = Some(name.into());
        self
    }

    /// Populates every relation whenever an instance is read.
    ///
    /// Populated targets whose own schema auto-populates are populated too,
    /// up to [`MAX_POPULATION_DEPTH`](crate::populate::MAX_POPULATION_DEPTH)
    /// levels deep, so schemas may auto-populate each other.
    #[must_use]
    pub fn auto_populate(mut self, value: bool) -> Self {
        self.schema.auto_populate = value;
        self
    }

    /// Finishes the schema.
    pub fn build(self) -> Schema {
        self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors_by_kind() {
        let schema = Schema::builder("articles")
            .required("name")
            .text("name", TextRule::new().default_value("x"))
            .number("price", NumberRule::new().min(10.0).max(100.0))
            .number("price", NumberRule::new().min(10.0))
            .boolean("active")
            .encrypted("secret")
            .build();

        assert_eq!(schema.collection(), "articles");
        assert_eq!(schema.required_fields().collect::<Vec<_>>(), vec!["name"]);
        // duplicates are kept and applied redundantly
        assert_eq!(schema.number_fields().count(), 2);
        assert_eq!(schema.boolean_fields().collect::<Vec<_>>(), vec!["active"]);
        assert_eq!(schema.encrypted_fields().collect::<Vec<_>>(), vec!["secret"]);
        assert!(schema.email_fields().next().is_none());
    }

    #[test]
    fn visibility_sets() {
        let schema = Schema::builder("orders")
            .hidden("paymentDetails")
            .ignored("scratch")
            .build();

        assert!(schema.is_hidden("paymentDetails"));
        assert!(!schema.is_ignored("paymentDetails"));
        assert!(schema.is_ignored("scratch"));
    }

    #[test]
    fn untyped_is_empty() {
        let schema = Schema::untyped();
        assert_eq!(schema.collection(), "");
        assert!(schema.fields().is_empty());
        assert!(!schema.auto_populate());
        assert!(schema.update_on_save().is_none());
    }
}
