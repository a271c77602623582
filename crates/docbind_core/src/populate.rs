//! Reference population.
//!
//! A relation names a reference field holding one identifier (or an array of
//! identifiers) and the collection the targets live in. Populating fetches
//! the targets and caches them on the record; a relation that is already
//! resolved is never refetched.
//!
//! Targets whose schema auto-populates are populated in turn, down to
//! [`MAX_POPULATION_DEPTH`] levels below the record the caller passed in.
//! Schemas that auto-populate each other therefore terminate; relations
//! past the limit stay unresolved.

use crate::connection::Connection;
use crate::cursor::{drain, materialize};
use crate::entity::{Populated, Property, Record, ID_FIELD};
use crate::error::{CoreError, CoreResult};
use crate::events::EventKind;
use crate::mapper::storage_value;
use crate::schema::{Cardinality, Relation};
use crate::store::FindOptions;
use docbind_codec::{doc, Value};
use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use std::time::Instant;
use tracing::trace;

/// How many levels of auto-populated targets are followed below the record
/// being populated.
pub const MAX_POPULATION_DEPTH: usize = 4;

/// Resolves one relation of `record` by name.
pub async fn populate(connection: &Connection, record: &mut Record, name: &str) -> CoreResult<()> {
    let relation = record
        .schema()
        .relation(name)
        .ok_or_else(|| CoreError::unknown_relation(name))?;
    if record.relations().is_resolved(name) {
        return Ok(());
    }
    let Some(reference) = reference_of(record, relation) else {
        return Ok(());
    };

    let populated = fetch(connection, relation, reference, 0).await?;
    record.relations_mut().resolve(name, populated);
    Ok(())
}

/// Resolves every unresolved relation of `record`, concurrently.
pub fn populate_all<'a>(
    connection: &'a Connection,
    record: &'a mut Record,
) -> BoxFuture<'a, CoreResult<()>> {
    populate_at(connection, record, 0)
}

/// [`populate_all`] for a record reached `depth` levels down a population
/// chain. Past [`MAX_POPULATION_DEPTH`] nothing is fetched.
pub(crate) fn populate_at<'a>(
    connection: &'a Connection,
    record: &'a mut Record,
    depth: usize,
) -> BoxFuture<'a, CoreResult<()>> {
    async move {
        if depth >= MAX_POPULATION_DEPTH {
            trace!(
                collection = record.schema().collection(),
                depth,
                "population depth reached"
            );
            return Ok(());
        }
        let pending: Vec<(&'static Relation, Value)> = record
            .schema()
            .relations()
            .iter()
            .filter(|relation| !record.relations().is_resolved(relation.name()))
            .filter_map(|relation| reference_of(record, relation).map(|r| (relation, r)))
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        let fetched = try_join_all(pending.into_iter().map(|(relation, reference)| async move {
            let populated = fetch(connection, relation, reference, depth).await?;
            Ok::<_, CoreError>((relation.name(), populated))
        }))
        .await?;

        for (name, populated) in fetched {
            record.relations_mut().resolve(name, populated);
        }
        Ok(())
    }
    .boxed()
}

/// Stored form of the reference, or `None` when there is nothing to resolve.
fn reference_of(record: &Record, relation: &Relation) -> Option<Value> {
    match record.get(relation.reference())? {
        Property::Null => None,
        Property::Text(text) if text.is_empty() => None,
        Property::Array(items) if items.is_empty() => None,
        other => Some(storage_value(other)),
    }
}

async fn fetch(
    connection: &Connection,
    relation: &Relation,
    reference: Value,
    depth: usize,
) -> CoreResult<Populated> {
    connection.ensure_open()?;
    trace!(
        relation = relation.name(),
        collection = relation.collection(),
        "populating"
    );

    match relation.cardinality() {
        Cardinality::One => {
            let started = Instant::now();
            let found = connection
                .store()
                .find_one(
                    relation.collection(),
                    doc! { ID_FIELD: reference },
                    FindOptions::default(),
                )
                .await?;
            connection.emit(EventKind::Query, relation.collection(), started.elapsed());

            let Some(found) = found else {
                return Ok(Populated::One(None));
            };
            let mut target = materialize(connection, relation.blank(), found)?;
            if target.schema().auto_populate() {
                populate_at(connection, &mut target, depth + 1).await?;
            }
            Ok(Populated::One(Some(target)))
        }
        Cardinality::Many => {
            let ids = match reference {
                Value::Array(ids) => ids,
                single => vec![single],
            };
            let started = Instant::now();
            let mut cursor = connection.store().find(
                relation.collection(),
                doc! { ID_FIELD: doc! { "$in": ids } },
                FindOptions::default(),
            );
            let targets = drain(
                connection,
                cursor.as_mut(),
                started,
                relation.blank_fn(),
                depth + 1,
            )
            .await?;
            Ok(Populated::Many(targets))
        }
    }
}
