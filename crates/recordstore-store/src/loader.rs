//! Batched relationship loading.
//!
//! One-to-many relationships are never loaded one parent at a time. The
//! result set hands a page of materialized parents to [`load_batch`], which
//! issues a single child query for the whole page (foreign key IN parent
//! keys, plus the inclusion filter) and merges the children back by foreign
//! key. The number of child queries per relationship is therefore the number
//! of pages, whatever the fan-out per parent.
//!
//! One-to-one relationships arrive through the root query's join and are
//! decoded by [`decode_joined`].

use std::collections::HashMap;

use recordstore_core::{Error, Record, Result, Value};
use recordstore_query::{BatchedRelation, Connection, Cursor, JoinedRelation};

/// Copy `values` into `record`, column by column.
pub(crate) fn decode_columns<'a>(
    record: &mut dyn Record,
    columns: impl IntoIterator<Item = &'a str>,
    values: &[Value],
) -> Result<()> {
    for (i, column) in columns.into_iter().enumerate() {
        let value = values.get(i).cloned().ok_or_else(|| {
            Error::Decode(format!("row is missing a value for column `{column}`"))
        })?;
        record.set(column, value)?;
    }
    Ok(())
}

/// Fill a one-to-one slot from the joined columns of a root row.
///
/// A NULL target primary key means the join found no related row; the slot
/// is then loaded and empty.
pub(crate) fn decode_joined(
    parent: &mut dyn Record,
    joined: &JoinedRelation,
    values: &[Value],
) -> Result<()> {
    let target = &joined.target;
    let width = target.columns().len();
    let columns = values
        .get(joined.offset..joined.offset + width)
        .ok_or_else(|| Error::Decode(format!("row is too short for relationship `{}`", joined.name)))?;
    let model = parent.model_name();
    let slot = parent
        .relation_mut(&joined.name)
        .ok_or_else(|| missing_slot(model, &joined.name))?;
    slot.clear_loaded();

    let present = target
        .column_index(&target.primary_key().column)
        .and_then(|i| columns.get(i))
        .is_some_and(|pk| !pk.is_null());
    if present {
        let child = slot.push_new();
        decode_columns(child, target.column_names(), columns)?;
        child.state_mut().set_persisted(true);
    }
    Ok(())
}

fn missing_slot(model: &str, relation: &str) -> Error {
    Error::schema(format!(
        "record of model `{model}` does not expose relationship slot `{relation}`"
    ))
}

/// Load one batched relationship for a page of parents.
///
/// Every parent's slot is reset to loaded-and-empty first, so parents without
/// children end up with an empty slot rather than an unloaded one. Children
/// are appended in the order the child query returns them; parent order is
/// untouched. Returns the number of children merged.
///
/// No query is issued when no parent has a primary key.
pub(crate) fn load_batch<C, M>(
    conn: &C,
    relation: &BatchedRelation,
    parents: &mut [M],
    log_statements: bool,
) -> Result<usize>
where
    C: Connection,
    M: Record,
{
    let mut by_key: HashMap<Value, Vec<usize>> = HashMap::new();
    let mut keys = Vec::new();
    for (index, parent) in parents.iter_mut().enumerate() {
        let model = parent.model_name();
        parent
            .relation_mut(&relation.name)
            .ok_or_else(|| missing_slot(model, &relation.name))?
            .clear_loaded();
        let key = parent.primary_key();
        if key.is_empty_key() {
            continue;
        }
        let entry = by_key.entry(key.clone()).or_default();
        if entry.is_empty() {
            keys.push(key);
        }
        entry.push(index);
    }
    if keys.is_empty() {
        return Ok(0);
    }

    let select = relation.select_for(keys);
    if log_statements {
        let (sql, params) = select.build();
        tracing::trace!(%sql, ?params, "batched relationship query");
    }
    let fk_position = relation.foreign_key_position();
    let mut cursor = conn.query(&select)?;
    let mut merged = 0;
    let outcome = (|| -> Result<()> {
        while let Some(row) = cursor.next_row()? {
            let values = row.values();
            let Some(fk) = values.get(fk_position) else {
                return Err(Error::Decode(format!(
                    "child row is missing foreign key `{}`",
                    relation.foreign_key
                )));
            };
            let Some(indices) = by_key.get(fk) else {
                continue;
            };
            for &index in indices {
                let parent = &mut parents[index];
                let model = parent.model_name();
                let slot = parent
                    .relation_mut(&relation.name)
                    .ok_or_else(|| missing_slot(model, &relation.name))?;
                let child = slot.push_new();
                decode_columns(child, relation.target.column_names(), values)?;
                child.state_mut().set_persisted(true);
                merged += 1;
            }
        }
        Ok(())
    })();
    cursor.close();
    outcome?;

    tracing::debug!(
        relation = %relation.name,
        parents = parents.len(),
        children = merged,
        "Batch loaded relationship"
    );
    Ok(merged)
}
