//! Document store boundary.
//!
//! The mapper never talks to a database directly. Everything that touches
//! storage goes through [`DocumentStore`] (collection-level operations) and
//! [`StoreCursor`] (a lazily executed query handle). Filters, updates and
//! pipelines are opaque [`Document`]s and are forwarded unmodified.
//!
//! Implementations own connection management, sessions, transactions and
//! retries. A store error surfaces to callers as [`CoreError::Store`]
//! without wrapping.
//!
//! [`CoreError::Store`]: crate::CoreError::Store

use async_trait::async_trait;
use docbind_codec::{Document, Value};
use std::sync::Arc;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("connection failed: {0}")]
    Connection(String),

    /// A unique index rejected the write.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// The store rejected the operation.
    #[error("store operation failed: {0}")]
    Operation(String),

    /// The store has been closed.
    #[error("store is closed")]
    Closed,

    /// Error from the underlying driver.
    #[error(transparent)]
    Driver(Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Creates an operation error.
    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation(message.into())
    }
}

/// Outcome of an insert.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneResult {
    /// Identifier of the stored document (store-generated when absent).
    pub inserted_id: Value,
}

/// Outcome of an update or replace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateResult {
    /// Documents matched by the filter.
    pub matched_count: u64,
    /// Documents actually modified.
    pub modified_count: u64,
    /// Identifier of the upserted document, if an upsert inserted one.
    pub upserted_id: Option<Value>,
}

/// Outcome of a delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteResult {
    /// Documents removed.
    pub deleted_count: u64,
}

/// Outcome of a bulk write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkWriteResult {
    /// Documents inserted.
    pub inserted_count: u64,
    /// Documents matched by update and replace models.
    pub matched_count: u64,
    /// Documents modified by update and replace models.
    pub modified_count: u64,
    /// Documents removed.
    pub deleted_count: u64,
    /// Documents inserted through upserts.
    pub upserted_count: u64,
}

/// A single operation in a bulk write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteModel {
    /// Insert a document.
    InsertOne {
        /// Document to insert.
        document: Document,
    },
    /// Update the first matching document.
    UpdateOne {
        /// Selection filter.
        filter: Document,
        /// Update operators.
        update: Document,
        /// Insert when nothing matches.
        upsert: bool,
    },
    /// Update every matching document.
    UpdateMany {
        /// Selection filter.
        filter: Document,
        /// Update operators.
        update: Document,
        /// Insert when nothing matches.
        upsert: bool,
    },
    /// Replace the first matching document.
    ReplaceOne {
        /// Selection filter.
        filter: Document,
        /// Replacement document.
        replacement: Document,
        /// Insert when nothing matches.
        upsert: bool,
    },
    /// Delete the first matching document.
    DeleteOne {
        /// Selection filter.
        filter: Document,
    },
    /// Delete every matching document.
    DeleteMany {
        /// Selection filter.
        filter: Document,
    },
}

/// String comparison rules for a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collation {
    /// Locale, e.g. `en`.
    pub locale: String,
    /// Whether case is a separate comparison level.
    pub case_level: Option<bool>,
    /// `upper`, `lower` or `off`.
    pub case_first: Option<String>,
    /// Comparison strength (1 to 5).
    pub strength: Option<u32>,
    /// Compare digit runs numerically.
    pub numeric_ordering: Option<bool>,
    /// Whether whitespace and punctuation are base characters.
    pub alternate: Option<String>,
    /// Characters ignored when `alternate` is `shifted`.
    pub max_variable: Option<String>,
    /// Compare secondary differences from the back.
    pub backwards: Option<bool>,
}

impl Collation {
    /// Creates a collation for a locale.
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            ..Self::default()
        }
    }

    /// Sets the comparison strength.
    #[must_use]
    pub fn strength(mut self, strength: u32) -> Self {
        self.strength = Some(strength);
        self
    }

    /// Sets which case sorts first.
    #[must_use]
    pub fn case_first(mut self, case_first: impl Into<String>) -> Self {
        self.case_first = Some(case_first.into());
        self
    }

    /// Enables numeric ordering.
    #[must_use]
    pub fn numeric_ordering(mut self, value: bool) -> Self {
        self.numeric_ordering = Some(value);
        self
    }
}

/// Options for find operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Sort specification.
    pub sort: Option<Document>,
    /// Maximum number of documents.
    pub limit: Option<i64>,
    /// Documents to skip.
    pub skip: Option<u64>,
    /// Field projection.
    pub projection: Option<Document>,
    /// String comparison rules.
    pub collation: Option<Collation>,
}

/// Options for update and replace operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Insert when nothing matches.
    pub upsert: bool,
}

impl UpdateOptions {
    /// Options with upsert enabled.
    pub const fn upsert() -> Self {
        Self { upsert: true }
    }
}

/// Options for aggregation pipelines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateOptions {
    /// Cursor batch size.
    pub batch_size: Option<u32>,
    /// Allow stages to spill to disk.
    pub allow_disk_use: Option<bool>,
    /// String comparison rules.
    pub collation: Option<Collation>,
}

/// An index definition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexModel {
    /// Indexed keys and directions, e.g. `{ email: 1 }`.
    pub keys: Document,
    /// Explicit index name.
    pub name: Option<String>,
    /// Reject duplicate keys.
    pub unique: bool,
}

impl IndexModel {
    /// Creates an index over `keys`.
    pub fn new(keys: Document) -> Self {
        Self {
            keys,
            ..Self::default()
        }
    }

    /// Sets the index name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Marks the index unique.
    #[must_use]
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }
}

/// Collection-level operations of a document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts a document; the store assigns `_id` when it is absent.
    async fn insert_one(&self, collection: &str, document: Document)
        -> StoreResult<InsertOneResult>;

    /// Replaces the first document matching `filter`.
    async fn replace_one(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
        options: UpdateOptions,
    ) -> StoreResult<UpdateResult>;

    /// Applies update operators to the first matching document.
    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> StoreResult<UpdateResult>;

    /// Applies update operators to every matching document.
    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> StoreResult<UpdateResult>;

    /// Deletes the first matching document.
    async fn delete_one(&self, collection: &str, filter: Document) -> StoreResult<DeleteResult>;

    /// Deletes every matching document.
    async fn delete_many(&self, collection: &str, filter: Document) -> StoreResult<DeleteResult>;

    /// Executes several write models in order.
    async fn bulk_write(
        &self,
        collection: &str,
        models: Vec<WriteModel>,
    ) -> StoreResult<BulkWriteResult>;

    /// Returns the first matching document, if any.
    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> StoreResult<Option<Document>>;

    /// Opens a cursor over matching documents. Nothing runs until
    /// [`StoreCursor::to_vec`] is awaited.
    fn find(&self, collection: &str, filter: Document, options: FindOptions) -> Box<dyn StoreCursor>;

    /// Opens a cursor over a pipeline's output.
    fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
        options: AggregateOptions,
    ) -> Box<dyn StoreCursor>;

    /// Distinct values of `key` among matching documents.
    async fn distinct(&self, collection: &str, key: &str, filter: Document)
        -> StoreResult<Vec<Value>>;

    /// Number of matching documents.
    async fn count_documents(&self, collection: &str, filter: Document) -> StoreResult<u64>;

    /// Creates an index and returns its name.
    async fn create_index(&self, collection: &str, index: IndexModel) -> StoreResult<String>;

    /// Creates several indexes and returns their names.
    async fn create_indexes(
        &self,
        collection: &str,
        indexes: Vec<IndexModel>,
    ) -> StoreResult<Vec<String>>;

    /// Lists the indexes of a collection.
    async fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexModel>>;

    /// Releases the store's resources.
    async fn close(&self) -> StoreResult<()>;
}

/// A lazily executed query handle.
///
/// Modifiers mutate the handle in place; the query runs when
/// [`to_vec`](Self::to_vec) is awaited.
#[async_trait]
pub trait StoreCursor: Send {
    /// Collection the cursor reads from.
    fn collection(&self) -> &str;

    /// Sets the sort specification.
    fn sort(&mut self, sort: Document);

    /// Caps the number of results.
    fn limit(&mut self, limit: i64);

    /// Skips leading results.
    fn skip(&mut self, skip: u64);

    /// Sets string comparison rules.
    fn collation(&mut self, collation: Collation);

    /// Sets the field projection.
    fn project(&mut self, projection: Document);

    /// Executes the query. `None` means the store produced no result set.
    async fn to_vec(&mut self) -> StoreResult<Option<Vec<Document>>>;
}

/// Opens a store from a connection URI.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connects to the store at `uri`.
    async fn connect(&self, uri: &str) -> StoreResult<Arc<dyn DocumentStore>>;
}
