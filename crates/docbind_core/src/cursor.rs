//! Fluent query cursor.

use crate::connection::Connection;
use crate::crypto;
use crate::entity::{Entity, Record};
use crate::error::CoreResult;
use crate::events::EventKind;
use crate::mapper;
use crate::populate::populate_at;
use crate::schema::blank_record;
use crate::store::{Collation, StoreCursor};
use docbind_codec::Document;
use futures::future::try_join_all;
use std::marker::PhantomData;
use std::time::Instant;
use tracing::trace;

/// A query over `T` documents, executed by [`to_vec`](Self::to_vec).
///
/// Modifiers are forwarded to the store cursor and consume `self`:
///
/// ```rust,ignore
/// let cheapest = articles
///     .find(doc! {}, FindOptions::default())
///     .sort(doc! { "price": 1i64 })
///     .limit(3)
///     .to_vec()
///     .await?;
/// ```
pub struct QueryCursor<T: Entity> {
    connection: Connection,
    cursor: Box<dyn StoreCursor>,
    started: Instant,
    _marker: PhantomData<T>,
}

impl<T: Entity> QueryCursor<T> {
    pub(crate) fn new(connection: Connection, cursor: Box<dyn StoreCursor>) -> Self {
        Self {
            connection,
            cursor,
            started: Instant::now(),
            _marker: PhantomData,
        }
    }

    /// Collection the cursor reads from.
    pub fn collection(&self) -> &str {
        self.cursor.collection()
    }

    /// Sets the sort specification.
    #[must_use]
    pub fn sort(mut self, sort: Document) -> Self {
        self.cursor.sort(sort);
        self
    }

    /// Caps the number of results.
    #[must_use]
    pub fn limit(mut self, limit: i64) -> Self {
        self.cursor.limit(limit);
        self
    }

    /// Skips leading results.
    #[must_use]
    pub fn skip(mut self, skip: u64) -> Self {
        self.cursor.skip(skip);
        self
    }

    /// Sets string comparison rules.
    #[must_use]
    pub fn collation(mut self, collation: Collation) -> Self {
        self.cursor.collation(collation);
        self
    }

    /// Sets the field projection.
    #[must_use]
    pub fn projection(mut self, projection: Document) -> Self {
        self.cursor.project(projection);
        self
    }

    /// Executes the query and materializes `T` instances.
    pub async fn to_vec(self) -> CoreResult<Vec<T>> {
        self.to_vec_as::<T>().await
    }

    /// Executes the query and materializes instances of another type.
    pub async fn to_vec_as<U: Entity>(mut self) -> CoreResult<Vec<U>> {
        let records = drain(
            &self.connection,
            self.cursor.as_mut(),
            self.started,
            blank_record::<U>,
            0,
        )
        .await?;
        Ok(records.into_iter().map(U::from_record).collect())
    }
}

impl<T: Entity> std::fmt::Debug for QueryCursor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCursor")
            .field("collection", &self.collection())
            .finish()
    }
}

/// Decrypts a fetched document and merges it into `blank`.
pub(crate) fn materialize(
    connection: &Connection,
    blank: Record,
    mut doc: Document,
) -> CoreResult<Record> {
    let mut record = blank;
    crypto::decrypt_fields(&mut doc, record.schema(), connection.cipher())?;
    mapper::elevate(&mut record, &doc)?;
    Ok(record)
}

/// Executes a store cursor, emits its query event and materializes the
/// results. Auto-populating records are populated concurrently, `depth`
/// levels down a population chain.
pub(crate) async fn drain(
    connection: &Connection,
    cursor: &mut dyn StoreCursor,
    started: Instant,
    blank: fn() -> Record,
    depth: usize,
) -> CoreResult<Vec<Record>> {
    connection.ensure_open()?;
    let docs = cursor.to_vec().await?;
    connection.emit(EventKind::Query, cursor.collection(), started.elapsed());

    let Some(docs) = docs else {
        return Ok(Vec::new());
    };
    trace!(collection = cursor.collection(), count = docs.len(), "materializing");

    let mut records = docs
        .into_iter()
        .map(|doc| materialize(connection, blank(), doc))
        .collect::<CoreResult<Vec<_>>>()?;

    try_join_all(
        records
            .iter_mut()
            .filter(|record| record.schema().auto_populate())
            .map(|record| populate_at(connection, record, depth)),
    )
    .await?;

    Ok(records)
}
