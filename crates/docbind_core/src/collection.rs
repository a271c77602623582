//! Typed collection API.
//!
//! `Collection<T>` runs the persistence pipeline for an entity type: the
//! save lifecycle (defaults, validation, timestamps, encryption, key checks,
//! insert or replace) and the read family, which decrypts and elevates every
//! fetched document into a fresh `T`.
//!
//! # Example
//!
//! ```rust,ignore
//! let customers = connection.collection::<Customer>();
//!
//! let mut customer = Customer::new();
//! customer.record_mut().set("email", "test@test.com");
//! customers.save(&mut customer).await?;
//!
//! let found = customers
//!     .find_one(doc! { "_id": customer.id() }, FindOptions::default())
//!     .await?;
//! ```

use crate::connection::Connection;
use crate::crypto;
use crate::cursor::{materialize, QueryCursor};
use crate::entity::{Entity, Property, ID_FIELD};
use crate::error::{CoreError, CoreResult};
use crate::events::EventKind;
use crate::mapper::storage_value;
use crate::populate::{populate, populate_all};
use crate::schema::blank_record;
use crate::store::{
    AggregateOptions, BulkWriteResult, DeleteResult, FindOptions, IndexModel, UpdateOptions,
    UpdateResult, WriteModel,
};
use crate::validation;
use docbind_codec::{doc, DateTime, Document, ObjectId, Value};
use std::marker::PhantomData;
use std::time::Instant;
use tracing::{debug, warn};

/// Key stamped into `$set` by [`Collection::update_one`] and
/// [`Collection::update_many`].
pub const UPDATED_FIELD: &str = "updated";

/// A typed collection of entities.
pub struct Collection<T: Entity> {
    /// Connection shared by every collection.
    connection: Connection,
    /// Type marker.
    _marker: PhantomData<T>,
}

impl<T: Entity> Collection<T> {
    /// Creates a collection over `connection`.
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            _marker: PhantomData,
        }
    }

    /// Collection name from `T`'s schema.
    pub fn name(&self) -> &'static str {
        T::schema().collection()
    }

    /// The connection this collection uses.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    // ========================================================================
    // Save lifecycle
    // ========================================================================

    /// Persists `entity`.
    ///
    /// With an identifier the stored document is replaced (upsert) and an
    /// [`EventKind::Update`] is emitted; without one the document is
    /// inserted, the store-assigned identifier is adopted and an
    /// [`EventKind::Insert`] is emitted. Validation and key errors are
    /// raised before any store call.
    pub async fn save(&self, entity: &mut T) -> CoreResult<()> {
        self.connection.ensure_open()?;
        let schema = T::schema();
        let started = Instant::now();

        let mut doc = entity.to_document();
        validation::apply_defaults(&mut doc, schema);

        if let Err(err) = validation::validate(&doc, schema) {
            warn!(collection = self.name(), error = %err, "rejected invalid document");
            return Err(err.into());
        }

        let update_key = schema.update_on_save();
        if let Some(key) = update_key {
            doc.insert(key, DateTime::now());
        }

        crypto::encrypt_fields(&mut doc, schema, self.connection.cipher())?;

        let mut doc: Document = doc
            .into_iter()
            .filter(|(key, _)| !key.starts_with("__") || Some(key.as_str()) == update_key)
            .collect();

        if let Err(err) = check_keys(&doc) {
            warn!(collection = self.name(), error = %err, "rejected document key");
            return Err(err);
        }

        let store = self.connection.store();
        let kind = if entity.record().has_id() {
            let id = entity
                .record()
                .get(ID_FIELD)
                .map(storage_value)
                .unwrap_or(Value::Null);
            store
                .replace_one(self.name(), doc! { ID_FIELD: id }, doc, UpdateOptions::upsert())
                .await?;
            EventKind::Update
        } else {
            doc.remove(ID_FIELD);
            let result = store.insert_one(self.name(), doc).await?;
            entity
                .record_mut()
                .set(ID_FIELD, Property::from_value(result.inserted_id));
            EventKind::Insert
        };

        self.connection.emit(kind, self.name(), started.elapsed());
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// First `T` matching `filter`.
    pub async fn find_one(&self, filter: Document, options: FindOptions) -> CoreResult<Option<T>> {
        self.find_one_with(self.name(), filter, options).await
    }

    /// First `U` matching `filter` in another collection.
    pub async fn find_one_in<U: Entity>(
        &self,
        filter: Document,
        collection: &str,
    ) -> CoreResult<Option<U>> {
        self.find_one_with(collection, filter, FindOptions::default())
            .await
    }

    async fn find_one_with<U: Entity>(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> CoreResult<Option<U>> {
        self.connection.ensure_open()?;
        let started = Instant::now();
        let found = self
            .connection
            .store()
            .find_one(collection, filter, options)
            .await?;
        self.connection
            .emit(EventKind::Query, collection, started.elapsed());

        let Some(found) = found else {
            return Ok(None);
        };
        let mut record = materialize(&self.connection, blank_record::<U>(), found)?;
        if record.schema().auto_populate() {
            populate_all(&self.connection, &mut record).await?;
        }
        Ok(Some(U::from_record(record)))
    }

    /// Cursor over `T`s matching `filter`.
    pub fn find(&self, filter: Document, options: FindOptions) -> QueryCursor<T> {
        self.find_in(self.name(), filter, options)
    }

    /// Cursor over documents of another collection, read as `T`.
    ///
    /// Use [`QueryCursor::to_vec_as`] to read them as another type.
    pub fn find_in(&self, collection: &str, filter: Document, options: FindOptions) -> QueryCursor<T> {
        let cursor = self.connection.store().find(collection, filter, options);
        QueryCursor::new(self.connection.clone(), cursor)
    }

    /// Cursor over a pipeline's output, read as `T`.
    pub fn aggregate(&self, pipeline: Vec<Document>, options: AggregateOptions) -> QueryCursor<T> {
        let cursor = self
            .connection
            .store()
            .aggregate(self.name(), pipeline, options);
        QueryCursor::new(self.connection.clone(), cursor)
    }

    /// Distinct values of `key` among matching documents.
    pub async fn distinct(&self, key: &str, filter: Document) -> CoreResult<Vec<Value>> {
        self.connection.ensure_open()?;
        let started = Instant::now();
        let values = self
            .connection
            .store()
            .distinct(self.name(), key, filter)
            .await?;
        self.connection
            .emit(EventKind::Query, self.name(), started.elapsed());
        Ok(values)
    }

    /// Number of matching documents.
    pub async fn count(&self, filter: Document) -> CoreResult<u64> {
        self.connection.ensure_open()?;
        let started = Instant::now();
        let count = self
            .connection
            .store()
            .count_documents(self.name(), filter)
            .await?;
        self.connection
            .emit(EventKind::Query, self.name(), started.elapsed());
        Ok(count)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Applies `update` to the first matching document.
    ///
    /// `$set.updated` is stamped with the current time unless the caller
    /// sets it.
    pub async fn update_one(
        &self,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> CoreResult<UpdateResult> {
        self.connection.ensure_open()?;
        let started = Instant::now();
        let result = self
            .connection
            .store()
            .update_one(self.name(), filter, stamp_updated(update), options)
            .await?;
        self.connection
            .emit(EventKind::Query, self.name(), started.elapsed());
        Ok(result)
    }

    /// Applies `update` to every matching document, stamping like
    /// [`update_one`](Self::update_one).
    pub async fn update_many(
        &self,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> CoreResult<UpdateResult> {
        self.connection.ensure_open()?;
        let started = Instant::now();
        let result = self
            .connection
            .store()
            .update_many(self.name(), filter, stamp_updated(update), options)
            .await?;
        self.connection
            .emit(EventKind::Query, self.name(), started.elapsed());
        Ok(result)
    }

    /// Executes several write models in order.
    pub async fn bulk_write(&self, models: Vec<WriteModel>) -> CoreResult<BulkWriteResult> {
        self.connection.ensure_open()?;
        let started = Instant::now();
        let result = self
            .connection
            .store()
            .bulk_write(self.name(), models)
            .await?;
        self.connection
            .emit(EventKind::Query, self.name(), started.elapsed());
        Ok(result)
    }

    /// Deletes the first matching document.
    pub async fn delete_one(&self, filter: Document) -> CoreResult<DeleteResult> {
        self.connection.ensure_open()?;
        let result = self
            .connection
            .store()
            .delete_one(self.name(), filter)
            .await?;
        debug!(collection = self.name(), deleted = result.deleted_count, "delete_one");
        Ok(result)
    }

    /// Deletes the document with identifier `id`.
    pub async fn delete_by_id(&self, id: ObjectId) -> CoreResult<DeleteResult> {
        self.delete_one(doc! { ID_FIELD: id }).await
    }

    /// Deletes every matching document.
    pub async fn delete_many(&self, filter: Document) -> CoreResult<DeleteResult> {
        self.connection.ensure_open()?;
        let result = self
            .connection
            .store()
            .delete_many(self.name(), filter)
            .await?;
        debug!(collection = self.name(), deleted = result.deleted_count, "delete_many");
        Ok(result)
    }

    // ========================================================================
    // Indexes
    // ========================================================================

    /// Creates an index and returns its name.
    pub async fn create_index(&self, index: IndexModel) -> CoreResult<String> {
        self.connection.ensure_open()?;
        Ok(self
            .connection
            .store()
            .create_index(self.name(), index)
            .await?)
    }

    /// Creates several indexes and returns their names.
    pub async fn create_indexes(&self, indexes: Vec<IndexModel>) -> CoreResult<Vec<String>> {
        self.connection.ensure_open()?;
        Ok(self
            .connection
            .store()
            .create_indexes(self.name(), indexes)
            .await?)
    }

    /// Lists the collection's indexes.
    pub async fn list_indexes(&self) -> CoreResult<Vec<IndexModel>> {
        self.connection.ensure_open()?;
        Ok(self.connection.store().list_indexes(self.name()).await?)
    }

    // ========================================================================
    // Relations
    // ========================================================================

    /// Resolves one relation of `entity`. Already resolved relations are
    /// kept.
    pub async fn populate(&self, entity: &mut T, relation: &str) -> CoreResult<()> {
        populate(&self.connection, entity.record_mut(), relation).await
    }

    /// Resolves every relation of `entity`.
    pub async fn populate_all(&self, entity: &mut T) -> CoreResult<()> {
        populate_all(&self.connection, entity.record_mut()).await
    }

    /// Drops cached relations and resolves them again.
    pub async fn refresh_relations(&self, entity: &mut T) -> CoreResult<()> {
        entity.record_mut().relations_mut().clear();
        self.populate_all(entity).await
    }
}

impl<T: Entity> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self::new(self.connection.clone())
    }
}

impl<T: Entity> std::fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name())
            .finish()
    }
}

/// Rejects keys containing `.` at any depth.
fn check_keys(doc: &Document) -> CoreResult<()> {
    for (key, value) in doc.iter() {
        if key.contains('.') {
            return Err(CoreError::invalid_document_key(key));
        }
        check_value(value)?;
    }
    Ok(())
}

fn check_value(value: &Value) -> CoreResult<()> {
    match value {
        Value::Document(nested) => check_keys(nested),
        Value::Array(items) => items.iter().try_for_each(check_value),
        _ => Ok(()),
    }
}

/// Puts `updated: now` first in `$set`; keys the caller set win.
fn stamp_updated(mut update: Document) -> Document {
    let caller = match update.remove("$set") {
        Some(Value::Document(set)) => set,
        Some(other) => {
            update.insert("$set", other);
            return update;
        }
        None => Document::new(),
    };

    let mut set = doc! { UPDATED_FIELD: DateTime::now() };
    for (key, value) in caller {
        set.insert(key, value);
    }
    update.insert("$set", set);
    update
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_keys_are_found_at_any_depth() {
        assert!(check_keys(&doc! { "a": 1i64 }).is_ok());

        let err = check_keys(&doc! { "a.b": 1i64 }).unwrap_err();
        assert!(matches!(err, CoreError::InvalidDocumentKey { ref key } if key == "a.b"));

        let nested = doc! { "attributes": doc! { "test.key": 123i64 } };
        assert!(check_keys(&nested).is_err());

        let in_array = doc! {
            "items": vec![Value::Document(doc! { "x.y": true })],
        };
        assert!(check_keys(&in_array).is_err());
    }

    #[test]
    fn stamp_is_added() {
        let update = stamp_updated(doc! {});
        let set = update.get_document("$set").unwrap();
        assert!(matches!(set.get(UPDATED_FIELD), Some(Value::DateTime(_))));
    }

    #[test]
    fn caller_keys_win_over_the_stamp() {
        let mine = DateTime::from_millis(0);
        let update = stamp_updated(doc! {
            "$set": doc! { "name": "x", UPDATED_FIELD: mine },
            "$inc": doc! { "n": 1i64 },
        });

        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get(UPDATED_FIELD), Some(&Value::DateTime(mine)));
        assert_eq!(set.get_str("name").ok(), Some("x"));
        assert!(update.contains_key("$inc"));
    }
}
