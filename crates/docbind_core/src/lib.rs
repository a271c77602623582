//! # docbind Core
//!
//! Object-document mapping for docbind.
//!
//! This crate provides:
//! - Static per-type schemas (required, typed, encrypted, hidden, ignored,
//!   custom-typed and embedded fields, relations)
//! - Record-backed entities and the recursive serialize / elevate mapper
//! - Validation of storage documents before every write
//! - AES-256-GCM field encryption
//! - The save lifecycle, the find family and fluent query cursors over an
//!   abstract [`DocumentStore`]
//! - Reference population and lifecycle events
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docbind_core::{entity, Connection, ConnectionConfig, Entity, Schema};
//! use once_cell::sync::Lazy;
//!
//! static CUSTOMER: Lazy<Schema> = Lazy::new(|| {
//!     Schema::builder("customers").required("email").email("email").build()
//! });
//!
//! entity! {
//!     pub struct Customer => CUSTOMER;
//! }
//!
//! let connection = Connection::open(&connector, ConnectionConfig::new(uri)).await?;
//! let customers = connection.collection::<Customer>();
//!
//! let mut customer = Customer::new();
//! customer.record_mut().set("email", "test@test.com");
//! customers.save(&mut customer).await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod collection;
pub mod config;
pub mod connection;
pub mod crypto;
pub mod cursor;
pub mod entity;
pub mod error;
pub mod events;
pub mod mapper;
pub mod populate;
pub mod schema;
pub mod store;
pub mod validation;

pub use collection::Collection;
pub use config::ConnectionConfig;
pub use connection::Connection;
pub use crypto::FieldCipher;
pub use cursor::QueryCursor;
pub use entity::{CustomType, Entity, Populated, Property, Record, RelationState, ID_FIELD};
pub use error::{CoreError, CoreResult, ValidationError, ValidationKind};
pub use events::{EventBus, EventKind, LifecycleEvent};
pub use schema::{
    Cardinality, CustomDecoder, DateRule, FieldKind, NumberRule, Relation, Schema, SchemaBuilder,
    TextRule,
};
pub use store::{
    AggregateOptions, BulkWriteResult, Collation, Connector, DeleteResult, DocumentStore,
    FindOptions, IndexModel, InsertOneResult, StoreCursor, StoreError, StoreResult, UpdateOptions,
    UpdateResult, WriteModel,
};

pub use populate::MAX_POPULATION_DEPTH;

pub use docbind_codec::{
    bson, date_from_ymd, doc, parse_object_id, DateTime, DateTimeExt, Document, DocumentExt,
    ObjectId, Value, ValueExt,
};
