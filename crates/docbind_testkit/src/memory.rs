//! In-memory document store.
//!
//! Understands the subset of the query language the tests need:
//! - filters: equality, `$eq`, `$ne`, `$in`, `$exists`
//! - updates: `$set`, `$unset`
//! - cursors: sort, skip, limit, projection, collation
//! - pipelines: `$match`, `$sort`, `$skip`, `$limit`
//!
//! Every write call is recorded so tests can assert that rejected saves never
//! reached storage.

use async_trait::async_trait;
use docbind_codec::{doc, Document, ObjectId, Value, ValueExt};
use docbind_core::{
    AggregateOptions, BulkWriteResult, Collation, Connector, DeleteResult, DocumentStore,
    FindOptions, IndexModel, InsertOneResult, StoreCursor, StoreError, StoreResult,
    UpdateOptions, UpdateResult, WriteModel,
};
use parking_lot::{Mutex, RwLock};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use tracing::trace;

const ID: &str = "_id";

/// A recorded write call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCall {
    /// Store operation, e.g. `insert_one`.
    pub operation: &'static str,
    /// Target collection.
    pub collection: String,
}

#[derive(Default)]
struct State {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    indexes: RwLock<HashMap<String, Vec<IndexModel>>>,
    writes: Mutex<Vec<WriteCall>>,
    fail_writes: AtomicBool,
    fail_close: AtomicBool,
    closed: AtomicBool,
}

impl State {
    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(AtomicOrdering::SeqCst) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    fn record_write(&self, operation: &'static str, collection: &str) -> StoreResult<()> {
        self.ensure_open()?;
        self.writes.lock().push(WriteCall {
            operation,
            collection: collection.to_string(),
        });
        if self.fail_writes.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::operation("injected write failure"));
        }
        Ok(())
    }
}

/// An in-memory [`DocumentStore`]. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<State>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write call so far, oldest first.
    pub fn writes(&self) -> Vec<WriteCall> {
        self.state.writes.lock().clone()
    }

    /// Number of write calls so far.
    pub fn write_count(&self) -> usize {
        self.state.writes.lock().len()
    }

    /// Makes every following write fail after being recorded.
    pub fn fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, AtomicOrdering::SeqCst);
    }

    /// Makes every following [`close`](DocumentStore::close) fail, leaving
    /// the store open.
    pub fn fail_close(&self, fail: bool) {
        self.state.fail_close.store(fail, AtomicOrdering::SeqCst);
    }

    /// Raw stored documents of a collection.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.state
            .collections
            .read()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Raw stored document with identifier `id`.
    pub fn document(&self, collection: &str, id: ObjectId) -> Option<Document> {
        self.documents(collection)
            .into_iter()
            .find(|doc| doc.get_object_id(ID).ok() == Some(id))
    }

    /// Stores a document without recording a write.
    pub fn seed(&self, collection: &str, doc: Document) -> ObjectId {
        let (doc, id) = with_id(doc);
        self.state
            .collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .push(doc);
        id.as_object_id().unwrap_or_else(ObjectId::new)
    }

    /// Whether [`close`](DocumentStore::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(AtomicOrdering::SeqCst)
    }

    fn insert(&self, collection: &str, doc: Document) -> StoreResult<Value> {
        let (doc, id) = with_id(doc);
        let mut collections = self.state.collections.write();
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.iter().any(|d| d.get(ID) == Some(&id)) {
            return Err(StoreError::DuplicateKey(format!("{ID}: {id:?}")));
        }
        self.check_unique(collection, docs, &doc, None)?;
        docs.push(doc);
        Ok(id)
    }

    fn check_unique(
        &self,
        collection: &str,
        docs: &[Document],
        candidate: &Document,
        skip: Option<usize>,
    ) -> StoreResult<()> {
        let indexes = self.state.indexes.read();
        for index in indexes.get(collection).into_iter().flatten().filter(|i| i.unique) {
            let key: Vec<Option<&Value>> = index.keys.keys().map(|k| candidate.get(k)).collect();
            let clash = docs.iter().enumerate().any(|(i, other)| {
                Some(i) != skip
                    && index
                        .keys
                        .keys()
                        .map(|k| other.get(k))
                        .eq(key.iter().copied())
            });
            if clash {
                return Err(StoreError::DuplicateKey(index_name(index)));
            }
        }
        Ok(())
    }

    fn update(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
        upsert: bool,
        many: bool,
    ) -> StoreResult<UpdateResult> {
        let mut collections = self.state.collections.write();
        let docs = collections.entry(collection.to_string()).or_default();

        let mut result = UpdateResult::default();
        for doc in docs.iter_mut().filter(|d| matches(d, filter)) {
            result.matched_count += 1;
            if apply_update(doc, update)? {
                result.modified_count += 1;
            }
            if !many {
                break;
            }
        }

        if result.matched_count == 0 && upsert {
            let mut seeded = equality_fields(filter);
            apply_update(&mut seeded, update)?;
            let (seeded, id) = with_id(seeded);
            docs.push(seeded);
            result.upserted_id = Some(id);
        }
        Ok(result)
    }

    fn replace(
        &self,
        collection: &str,
        filter: &Document,
        replacement: Document,
        upsert: bool,
    ) -> StoreResult<UpdateResult> {
        let mut collections = self.state.collections.write();
        let docs = collections.entry(collection.to_string()).or_default();

        let Some(position) = docs.iter().position(|d| matches(d, filter)) else {
            if !upsert {
                return Ok(UpdateResult::default());
            }
            let mut seeded = equality_fields(filter);
            for (key, value) in replacement {
                seeded.insert(key, value);
            }
            let (seeded, id) = with_id(seeded);
            self.check_unique(collection, docs, &seeded, None)?;
            docs.push(seeded);
            return Ok(UpdateResult {
                upserted_id: Some(id),
                ..UpdateResult::default()
            });
        };

        let mut next = Document::new();
        if let Some(id) = docs[position].get(ID) {
            next.insert(ID, id.clone());
        }
        for (key, value) in replacement {
            if key != ID {
                next.insert(key, value);
            }
        }
        self.check_unique(collection, docs, &next, Some(position))?;

        let modified = docs[position] != next;
        docs[position] = next;
        Ok(UpdateResult {
            matched_count: 1,
            modified_count: u64::from(modified),
            upserted_id: None,
        })
    }

    fn delete(&self, collection: &str, filter: &Document, many: bool) -> DeleteResult {
        let mut collections = self.state.collections.write();
        let Some(docs) = collections.get_mut(collection) else {
            return DeleteResult::default();
        };

        let mut deleted = 0;
        docs.retain(|doc| {
            if (many || deleted == 0) && matches(doc, filter) {
                deleted += 1;
                false
            } else {
                true
            }
        });
        DeleteResult {
            deleted_count: deleted,
        }
    }

    fn cursor(&self, collection: &str, source: Source) -> MemoryCursor {
        MemoryCursor {
            state: Arc::clone(&self.state),
            collection: collection.to_string(),
            source,
            sort: None,
            skip: None,
            limit: None,
            projection: None,
            collation: None,
        }
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("collections", &self.state.collections.read().len())
            .field("writes", &self.write_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<InsertOneResult> {
        self.state.record_write("insert_one", collection)?;
        let inserted_id = self.insert(collection, document)?;
        Ok(InsertOneResult { inserted_id })
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
        options: UpdateOptions,
    ) -> StoreResult<UpdateResult> {
        self.state.record_write("replace_one", collection)?;
        self.replace(collection, &filter, replacement, options.upsert)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> StoreResult<UpdateResult> {
        self.state.record_write("update_one", collection)?;
        self.update(collection, &filter, &update, options.upsert, false)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> StoreResult<UpdateResult> {
        self.state.record_write("update_many", collection)?;
        self.update(collection, &filter, &update, options.upsert, true)
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> StoreResult<DeleteResult> {
        self.state.record_write("delete_one", collection)?;
        Ok(self.delete(collection, &filter, false))
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> StoreResult<DeleteResult> {
        self.state.record_write("delete_many", collection)?;
        Ok(self.delete(collection, &filter, true))
    }

    async fn bulk_write(
        &self,
        collection: &str,
        models: Vec<WriteModel>,
    ) -> StoreResult<BulkWriteResult> {
        self.state.record_write("bulk_write", collection)?;

        let mut result = BulkWriteResult::default();
        for model in models {
            let updated = match model {
                WriteModel::InsertOne { document } => {
                    self.insert(collection, document)?;
                    result.inserted_count += 1;
                    continue;
                }
                WriteModel::DeleteOne { filter } => {
                    result.deleted_count += self.delete(collection, &filter, false).deleted_count;
                    continue;
                }
                WriteModel::DeleteMany { filter } => {
                    result.deleted_count += self.delete(collection, &filter, true).deleted_count;
                    continue;
                }
                WriteModel::UpdateOne { filter, update, upsert } => {
                    self.update(collection, &filter, &update, upsert, false)?
                }
                WriteModel::UpdateMany { filter, update, upsert } => {
                    self.update(collection, &filter, &update, upsert, true)?
                }
                WriteModel::ReplaceOne { filter, replacement, upsert } => {
                    self.replace(collection, &filter, replacement, upsert)?
                }
            };
            result.matched_count += updated.matched_count;
            result.modified_count += updated.modified_count;
            result.upserted_count += u64::from(updated.upserted_id.is_some());
        }
        Ok(result)
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> StoreResult<Option<Document>> {
        let mut cursor = self.find(collection, filter, options);
        cursor.limit(1);
        Ok(cursor.to_vec().await?.and_then(|docs| docs.into_iter().next()))
    }

    fn find(&self, collection: &str, filter: Document, options: FindOptions) -> Box<dyn StoreCursor> {
        let mut cursor = self.cursor(collection, Source::Find(filter));
        cursor.sort = options.sort;
        cursor.skip = options.skip;
        cursor.limit = options.limit;
        cursor.projection = options.projection;
        cursor.collation = options.collation;
        Box::new(cursor)
    }

    fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
        options: AggregateOptions,
    ) -> Box<dyn StoreCursor> {
        let mut cursor = self.cursor(collection, Source::Pipeline(pipeline));
        cursor.collation = options.collation;
        Box::new(cursor)
    }

    async fn distinct(&self, collection: &str, key: &str, filter: Document) -> StoreResult<Vec<Value>> {
        self.state.ensure_open()?;
        let mut values: Vec<Value> = Vec::new();
        for doc in self.documents(collection).iter().filter(|d| matches(d, &filter)) {
            let found = match doc.get(key) {
                Some(Value::Array(items)) => items.clone(),
                Some(value) => vec![value.clone()],
                None => continue,
            };
            for value in found {
                if !values.contains(&value) {
                    values.push(value);
                }
            }
        }
        Ok(values)
    }

    async fn count_documents(&self, collection: &str, filter: Document) -> StoreResult<u64> {
        self.state.ensure_open()?;
        let count = self
            .documents(collection)
            .iter()
            .filter(|d| matches(d, &filter))
            .count();
        Ok(count as u64)
    }

    async fn create_index(&self, collection: &str, index: IndexModel) -> StoreResult<String> {
        self.state.ensure_open()?;
        let name = index_name(&index);
        let mut indexes = self.state.indexes.write();
        let existing = indexes.entry(collection.to_string()).or_default();
        if !existing.iter().any(|i| index_name(i) == name) {
            existing.push(index.name(name.clone()));
        }
        Ok(name)
    }

    async fn create_indexes(
        &self,
        collection: &str,
        indexes: Vec<IndexModel>,
    ) -> StoreResult<Vec<String>> {
        let mut names = Vec::with_capacity(indexes.len());
        for index in indexes {
            names.push(self.create_index(collection, index).await?);
        }
        Ok(names)
    }

    async fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexModel>> {
        self.state.ensure_open()?;
        let mut indexes = vec![IndexModel::new(doc! { ID: 1i64 }).name("_id_")];
        if let Some(created) = self.state.indexes.read().get(collection) {
            indexes.extend(created.iter().cloned());
        }
        Ok(indexes)
    }

    async fn close(&self) -> StoreResult<()> {
        if self.state.fail_close.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::operation("injected close failure"));
        }
        self.state.closed.store(true, AtomicOrdering::SeqCst);
        Ok(())
    }
}

/// Hands out a shared [`MemoryStore`] for `mongodb://` URIs.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    store: MemoryStore,
}

impl MemoryConnector {
    /// Creates a connector over `store`.
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, uri: &str) -> StoreResult<Arc<dyn DocumentStore>> {
        if !uri.starts_with("mongodb://") {
            return Err(StoreError::Connection(format!("unsupported uri: {uri}")));
        }
        self.store.state.closed.store(false, AtomicOrdering::SeqCst);
        trace!(uri, "memory store connected");
        Ok(Arc::new(self.store.clone()))
    }
}

enum Source {
    Find(Document),
    Pipeline(Vec<Document>),
}

/// Lazily evaluated cursor over a [`MemoryStore`].
pub struct MemoryCursor {
    state: Arc<State>,
    collection: String,
    source: Source,
    sort: Option<Document>,
    skip: Option<u64>,
    limit: Option<i64>,
    projection: Option<Document>,
    collation: Option<Collation>,
}

impl MemoryCursor {
    fn run_pipeline(&self, mut docs: Vec<Document>, pipeline: &[Document]) -> StoreResult<Vec<Document>> {
        for stage in pipeline {
            let Some((name, spec)) = stage.iter().next() else { continue };
            docs = match (name.as_str(), spec) {
                ("$match", Value::Document(filter)) => {
                    docs.into_iter().filter(|d| matches(d, filter)).collect()
                }
                ("$sort", Value::Document(sort)) => {
                    sort_documents(&mut docs, sort, self.collation.as_ref());
                    docs
                }
                ("$skip", value) => {
                    let n = value.as_integer().unwrap_or(0).max(0) as usize;
                    docs.into_iter().skip(n).collect()
                }
                ("$limit", value) => {
                    let n = value.as_integer().unwrap_or(0).max(0) as usize;
                    docs.into_iter().take(n).collect()
                }
                (other, _) => {
                    return Err(StoreError::operation(format!("unsupported stage {other}")))
                }
            };
        }
        Ok(docs)
    }
}

#[async_trait]
impl StoreCursor for MemoryCursor {
    fn collection(&self) -> &str {
        &self.collection
    }

    fn sort(&mut self, sort: Document) {
        self.sort = Some(sort);
    }

    fn limit(&mut self, limit: i64) {
        self.limit = Some(limit);
    }

    fn skip(&mut self, skip: u64) {
        self.skip = Some(skip);
    }

    fn collation(&mut self, collation: Collation) {
        self.collation = Some(collation);
    }

    fn project(&mut self, projection: Document) {
        self.projection = Some(projection);
    }

    async fn to_vec(&mut self) -> StoreResult<Option<Vec<Document>>> {
        self.state.ensure_open()?;
        let Some(stored) = self.state.collections.read().get(&self.collection).cloned() else {
            return Ok(None);
        };

        let mut docs: Vec<Document> = match &self.source {
            Source::Find(filter) => stored.into_iter().filter(|d| matches(d, filter)).collect(),
            Source::Pipeline(pipeline) => self.run_pipeline(stored, pipeline)?,
        };

        if let Some(sort) = &self.sort {
            sort_documents(&mut docs, sort, self.collation.as_ref());
        }
        let skip = self.skip.unwrap_or(0) as usize;
        let limit = match self.limit {
            Some(n) if n != 0 => n.unsigned_abs() as usize,
            _ => usize::MAX,
        };
        let docs = docs
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|d| match &self.projection {
                Some(projection) => project(d, projection),
                None => d,
            })
            .collect();
        Ok(Some(docs))
    }
}

/// Whether `doc` satisfies `filter`.
pub fn matches(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, condition)| {
        let actual = doc.get(key);
        match condition {
            Value::Document(ops) if is_operator_document(ops) => {
                ops.iter().all(|(op, arg)| match op.as_str() {
                    "$eq" => value_matches(actual, arg),
                    "$ne" => !value_matches(actual, arg),
                    "$in" => arg
                        .as_array()
                        .is_some_and(|options| options.iter().any(|o| value_matches(actual, o))),
                    "$exists" => arg.as_bool() == Some(actual.is_some()),
                    _ => false,
                })
            }
            expected => value_matches(actual, expected),
        }
    })
}

fn is_operator_document(doc: &Document) -> bool {
    doc.keys().next().is_some_and(|k| k.starts_with('$'))
}

fn value_matches(actual: Option<&Value>, expected: &Value) -> bool {
    match (actual, expected) {
        (None, Value::Null) => true,
        (None, _) => false,
        (Some(Value::Array(items)), expected) if !matches!(expected, Value::Array(_)) => {
            items.iter().any(|item| values_equal(item, expected))
        }
        (Some(actual), expected) => values_equal(actual, expected),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Equality conditions of a filter, used to seed upserted documents.
fn equality_fields(filter: &Document) -> Document {
    filter
        .iter()
        .filter(|(key, value)| {
            !key.starts_with('$')
                && !matches!(value, Value::Document(ops) if is_operator_document(ops))
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn apply_update(doc: &mut Document, update: &Document) -> StoreResult<bool> {
    let before = doc.clone();
    for (op, arg) in update.iter() {
        let Value::Document(fields) = arg else {
            return Err(StoreError::operation(format!("{op} expects a document")));
        };
        match op.as_str() {
            "$set" => {
                for (key, value) in fields.iter() {
                    doc.insert(key, value.clone());
                }
            }
            "$unset" => {
                for key in fields.keys() {
                    doc.remove(key);
                }
            }
            other => {
                return Err(StoreError::operation(format!(
                    "unsupported update operator {other}"
                )))
            }
        }
    }
    Ok(*doc != before)
}

/// Puts `_id` first, generating one when absent.
fn with_id(doc: Document) -> (Document, Value) {
    let id = doc
        .get(ID)
        .filter(|v| !matches!(v, Value::Null))
        .cloned()
        .unwrap_or_else(|| Value::ObjectId(ObjectId::new()));
    let mut out = Document::new();
    out.insert(ID, id.clone());
    for (key, value) in doc {
        if key != ID {
            out.insert(key, value);
        }
    }
    (out, id)
}

fn index_name(index: &IndexModel) -> String {
    index.name.clone().unwrap_or_else(|| {
        index
            .keys
            .iter()
            .map(|(key, direction)| format!("{key}_{}", direction.as_integer().unwrap_or(1)))
            .collect::<Vec<_>>()
            .join("_")
    })
}

fn project(doc: Document, projection: &Document) -> Document {
    let include = projection
        .iter()
        .filter(|(key, _)| *key != ID)
        .any(|(_, v)| truthy(v));
    let keep_id = projection.get(ID).map_or(true, truthy);

    doc.into_iter()
        .filter(|(key, _)| {
            if key == ID {
                return keep_id;
            }
            match projection.get(key) {
                Some(v) => truthy(v),
                None => !include,
            }
        })
        .collect()
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Boolean(b) => *b,
        other => other.as_number().is_some_and(|n| n != 0.0),
    }
}

fn sort_documents(docs: &mut [Document], sort: &Document, collation: Option<&Collation>) {
    docs.sort_by(|a, b| {
        for (key, direction) in sort.iter() {
            let ordering = compare(a.get(key), b.get(key), collation);
            let ordering = if direction.as_number().is_some_and(|d| d < 0.0) {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// Position of a value's type in the store's cross-type order.
fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        Some(Value::MinKey) => 0,
        None | Some(Value::Null | Value::Undefined) => 1,
        Some(Value::Int32(_) | Value::Int64(_) | Value::Double(_) | Value::Decimal128(_)) => 2,
        Some(Value::String(_) | Value::Symbol(_)) => 3,
        Some(Value::Document(_)) => 4,
        Some(Value::Array(_)) => 5,
        Some(Value::Binary(_)) => 6,
        Some(Value::ObjectId(_)) => 7,
        Some(Value::Boolean(_)) => 8,
        Some(Value::DateTime(_)) => 9,
        Some(Value::Timestamp(_)) => 10,
        Some(Value::RegularExpression(_)) => 11,
        Some(Value::MaxKey) => 13,
        Some(_) => 12,
    }
}

fn compare(a: Option<&Value>, b: Option<&Value>, collation: Option<&Collation>) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Some(Value::String(x)), Some(Value::String(y))) => compare_text(x, y, collation),
        (Some(x), Some(y)) if x.is_number() => x
            .as_number()
            .partial_cmp(&y.as_number())
            .unwrap_or(Ordering::Equal),
        (Some(Value::ObjectId(x)), Some(Value::ObjectId(y))) => x.cmp(y),
        (Some(Value::Boolean(x)), Some(Value::Boolean(y))) => x.cmp(y),
        (Some(Value::DateTime(x)), Some(Value::DateTime(y))) => x.cmp(y),
        (Some(Value::Binary(x)), Some(Value::Binary(y))) => x.bytes.cmp(&y.bytes),
        _ => Ordering::Equal,
    }
}

/// Binary order without a collation. With one, letters compare
/// case-insensitively first; ties go to lower case unless `case_first` is
/// `upper`, and strengths 1 and 2 ignore case entirely.
fn compare_text(x: &str, y: &str, collation: Option<&Collation>) -> Ordering {
    let Some(collation) = collation else {
        return x.cmp(y);
    };

    if collation.numeric_ordering == Some(true) {
        if let (Ok(a), Ok(b)) = (x.parse::<u128>(), y.parse::<u128>()) {
            return a.cmp(&b);
        }
    }

    let primary = x.to_lowercase().cmp(&y.to_lowercase());
    if primary != Ordering::Equal || matches!(collation.strength, Some(1 | 2)) {
        return primary;
    }
    match collation.case_first.as_deref() {
        Some("upper") => x.cmp(y),
        _ => y.cmp(x),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters() {
        let id = ObjectId::new();
        let doc = doc! { ID: id, "name": "Ada", "tags": vec![Value::from("a"), Value::from("b")], "n": 2i64 };

        assert!(matches(&doc, &doc! {}));
        assert!(matches(&doc, &doc! { ID: id }));
        assert!(matches(&doc, &doc! { "n": 2.0 }));
        assert!(matches(&doc, &doc! { "tags": "b" }));
        assert!(matches(&doc, &doc! { ID: doc! { "$in": vec![Value::from(id)] } }));
        assert!(matches(&doc, &doc! { "missing": doc! { "$exists": false } }));
        assert!(matches(&doc, &doc! { "name": doc! { "$ne": "Bob" } }));
        assert!(!matches(&doc, &doc! { "name": doc! { "$eq": "Bob" } }));
        assert!(!matches(&doc, &doc! { "missing": 1i64 }));
    }

    #[test]
    fn updates() {
        let mut doc = doc! { "a": 1i64, "b": 2i64 };
        let changed = apply_update(&mut doc, &doc! { "$set": doc! { "a": 5i64 }, "$unset": doc! { "b": "" } }).unwrap();
        assert!(changed);
        assert_eq!(doc, doc! { "a": 5i64 });

        assert!(!apply_update(&mut doc, &doc! { "$set": doc! { "a": 5i64 } }).unwrap());
        assert!(apply_update(&mut doc, &doc! { "$inc": doc! { "a": 1i64 } }).is_err());
    }

    #[test]
    fn projections() {
        let doc = doc! { ID: 1i64, "a": 1i64, "b": 2i64 };
        assert_eq!(project(doc.clone(), &doc! { "a": 1i64 }), doc! { ID: 1i64, "a": 1i64 });
        assert_eq!(project(doc.clone(), &doc! { "a": 0i64 }), doc! { ID: 1i64, "b": 2i64 });
        assert_eq!(project(doc, &doc! { ID: 0i64, "b": true }), doc! { "b": 2i64 });
    }

    #[test]
    fn text_order_with_collation() {
        let mut words = vec!["b", "B", "a", "A"];
        words.sort_by(|x, y| compare_text(x, y, None));
        assert_eq!(words, vec!["A", "B", "a", "b"]);

        let collation = Collation::new("en");
        words.sort_by(|x, y| compare_text(x, y, Some(&collation)));
        assert_eq!(words, vec!["a", "A", "b", "B"]);

        let upper = Collation::new("en").case_first("upper");
        words.sort_by(|x, y| compare_text(x, y, Some(&upper)));
        assert_eq!(words, vec!["A", "a", "B", "b"]);

        let numeric = Collation::new("en").numeric_ordering(true);
        let mut numbers = vec!["10", "9", "100"];
        numbers.sort_by(|x, y| compare_text(x, y, Some(&numeric)));
        assert_eq!(numbers, vec!["9", "10", "100"]);
    }

    #[test]
    fn mixed_types_sort_by_rank() {
        let mut docs = vec![
            doc! { "v": "text" },
            doc! { "v": 3i64 },
            doc! {},
            doc! { "v": true },
        ];
        sort_documents(&mut docs, &doc! { "v": 1i64 }, None);
        let ranks: Vec<u8> = docs.iter().map(|d| type_rank(d.get("v"))).collect();
        assert_eq!(ranks, vec![1, 2, 3, 8]);
    }

    #[test]
    fn generated_index_names() {
        let index = IndexModel::new(doc! { "email": 1i64, "created": -1i64 });
        assert_eq!(index_name(&index), "email_1_created_-1");
        assert_eq!(index_name(&index.name("custom")), "custom");
    }
}
