//! The in-memory connection.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;

use recordstore_core::{Error, Result, Row, Schema, Value};
use recordstore_query::{
    Connection, Count, Cursor, Delete, Expr, Insert, Join, Select, Statement, Update,
};

use crate::eval::{Scope, StoredRow, compare_rows, holds};
use crate::event::{Event, StatementKind};

// ============================================================================
// Tables
// ============================================================================

#[derive(Debug, Clone)]
struct Table {
    primary_key: String,
    auto_increment: bool,
    next_id: i64,
    rows: Vec<StoredRow>,
}

impl Table {
    fn new(primary_key: impl Into<String>, auto_increment: bool) -> Self {
        Self {
            primary_key: primary_key.into(),
            auto_increment,
            next_id: 1,
            rows: Vec::new(),
        }
    }

    fn has_key(&self, key: &Value, except: Option<usize>) -> bool {
        self.rows.iter().enumerate().any(|(i, row)| {
            Some(i) != except && row.get(&self.primary_key).is_some_and(|v| v == key)
        })
    }
}

#[derive(Debug, Default)]
struct Faults {
    commit: bool,
    rollback: bool,
    writes_to: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, Table>,
    snapshot: Option<BTreeMap<String, Table>>,
    events: Vec<Event>,
    faults: Faults,
}

impl State {
    fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::execution(format!("no such table: {name}")))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| Error::execution(format!("no such table: {name}")))
    }

    fn record(&mut self, kind: StatementKind, table: &str, sql: String) {
        tracing::trace!(%sql, "memory statement");
        self.events.push(Event::Statement {
            kind,
            table: table.to_string(),
            sql,
        });
    }

    fn check_fault(&self, table: &str) -> Result<()> {
        if self.faults.writes_to.as_deref() == Some(table) {
            return Err(Error::execution(format!("injected write failure on {table}")));
        }
        Ok(())
    }
}

// ============================================================================
// Connection
// ============================================================================

/// A connection to an in-memory store.
///
/// Tables are created from a [`Schema`] or one by one with
/// [`MemoryConnection::create_table`]. Every statement and transaction
/// boundary is recorded as an [`Event`], and commit, rollback and writes can
/// be made to fail on demand.
///
/// Single-threaded: the connection is not `Sync`.
#[derive(Debug, Default)]
pub struct MemoryConnection {
    state: RefCell<State>,
}

impl MemoryConnection {
    /// An empty store with no tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store with one table per model of `schema`.
    pub fn with_schema(schema: &Schema) -> Self {
        let conn = Self::new();
        for model in schema.models() {
            let pk = model.primary_key();
            conn.create_table(model.table(), &pk.column, pk.auto_increment);
        }
        conn
    }

    /// Create (or replace) an empty table.
    pub fn create_table(&self, name: &str, primary_key: &str, auto_increment: bool) {
        self.state
            .borrow_mut()
            .tables
            .insert(name.to_string(), Table::new(primary_key, auto_increment));
    }

    /// Number of rows currently stored in `table`.
    pub fn row_count(&self, table: &str) -> usize {
        self.state
            .borrow()
            .tables
            .get(table)
            .map_or(0, |t| t.rows.len())
    }

    /// Value of `column` in the row of `table` whose primary key is `key`.
    pub fn value(&self, table: &str, key: impl Into<Value>, column: &str) -> Option<Value> {
        let key = key.into();
        let state = self.state.borrow();
        let table = state.tables.get(table)?;
        table
            .rows
            .iter()
            .find(|row| row.get(&table.primary_key) == Some(&key))
            .map(|row| row.get(column).cloned().unwrap_or(Value::Null))
    }

    /// Whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.state.borrow().snapshot.is_some()
    }

    // ------------------------------------------------------------------------
    // Event log
    // ------------------------------------------------------------------------

    /// Everything recorded since creation or the last [`MemoryConnection::clear_events`].
    pub fn events(&self) -> Vec<Event> {
        self.state.borrow().events.clone()
    }

    /// Forget recorded events.
    pub fn clear_events(&self) {
        self.state.borrow_mut().events.clear();
    }

    /// Number of recorded statements of `kind`.
    pub fn statement_count(&self, kind: StatementKind) -> usize {
        self.state
            .borrow()
            .events
            .iter()
            .filter(|e| e.statement_kind() == Some(kind))
            .count()
    }

    /// Number of recorded statements of `kind` against `table`.
    pub fn statement_count_on(&self, kind: StatementKind, table: &str) -> usize {
        self.state
            .borrow()
            .events
            .iter()
            .filter(|e| e.statement_kind() == Some(kind) && e.table() == Some(table))
            .count()
    }

    /// Number of recorded `event`s (for transaction boundaries).
    pub fn event_count(&self, event: &Event) -> usize {
        self.state
            .borrow()
            .events
            .iter()
            .filter(|e| *e == event)
            .count()
    }

    // ------------------------------------------------------------------------
    // Fault injection
    // ------------------------------------------------------------------------

    /// Make every commit fail. The failed transaction is rolled back.
    pub fn fail_commit(&self, fail: bool) {
        self.state.borrow_mut().faults.commit = fail;
    }

    /// Make every rollback fail. The transaction's changes are kept.
    pub fn fail_rollback(&self, fail: bool) {
        self.state.borrow_mut().faults.rollback = fail;
    }

    /// Make every INSERT, UPDATE and DELETE against `table` fail.
    pub fn fail_writes_to(&self, table: Option<&str>) {
        self.state.borrow_mut().faults.writes_to = table.map(str::to_string);
    }

    // ------------------------------------------------------------------------
    // Statement execution
    // ------------------------------------------------------------------------

    /// Rows of `table` (as `alias`) left-joined with `joins`, filtered.
    fn matching<'s>(
        state: &'s State,
        table: &str,
        alias: &'s str,
        joins: &'s [Join],
        filter: Option<&Expr>,
    ) -> Result<Vec<Scope<'s>>> {
        let root = state.table(table)?;
        let mut joined: Vec<Scope<'s>> = root
            .rows
            .iter()
            .map(|row| Scope::root(alias, row))
            .collect();
        for join in joins {
            let table = state.table(&join.table)?;
            let mut next = Vec::with_capacity(joined.len());
            for scope in &joined {
                let mut matched = false;
                for candidate in &table.rows {
                    let extended = scope.with(&join.alias, Some(candidate));
                    if holds(Some(&join.on), &extended)? {
                        next.push(extended);
                        matched = true;
                    }
                }
                if !matched {
                    next.push(scope.with(&join.alias, None));
                }
            }
            joined = next;
        }

        let mut kept = Vec::with_capacity(joined.len());
        for scope in joined {
            if holds(filter, &scope)? {
                kept.push(scope);
            }
        }
        Ok(kept)
    }

    fn run_select(state: &State, select: &Select) -> Result<Vec<Row>> {
        let mut kept = Self::matching(
            state,
            &select.table,
            &select.alias,
            &select.joins,
            select.filter.as_ref(),
        )?;
        if !select.order_by.is_empty() {
            let mut failure = None;
            kept.sort_by(|a, b| {
                compare_rows(&select.order_by, a, b).unwrap_or_else(|e| {
                    failure.get_or_insert(e);
                    std::cmp::Ordering::Equal
                })
            });
            if let Some(e) = failure {
                return Err(e);
            }
        }

        let offset = usize::try_from(select.offset.unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = select
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        let names: Arc<[String]> = select.columns.iter().map(|c| c.name.clone()).collect();
        kept.iter()
            .skip(offset)
            .take(limit)
            .map(|scope| {
                let values = select
                    .columns
                    .iter()
                    .map(|c| scope.lookup(c))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Row::new(Arc::clone(&names), values))
            })
            .collect()
    }

    fn run_insert(state: &mut State, insert: &Insert) -> Result<Option<Value>> {
        state.check_fault(&insert.table)?;
        let table = state.table_mut(&insert.table)?;
        let mut row: StoredRow = insert
            .columns
            .iter()
            .cloned()
            .zip(insert.values.iter().cloned())
            .collect();

        let generated = match &insert.returning {
            Some(column) if column == &table.primary_key && table.auto_increment => {
                let id = table.next_id;
                row.insert(column.clone(), Value::BigInt(id));
                Some(Value::BigInt(id))
            }
            Some(column) => Some(row.get(column).cloned().unwrap_or(Value::Null)),
            None => None,
        };

        let key = row.get(&table.primary_key).cloned().unwrap_or(Value::Null);
        if key.is_null() {
            return Err(Error::execution(format!(
                "NOT NULL constraint failed: {}.{}",
                insert.table, table.primary_key
            )));
        }
        if table.has_key(&key, None) {
            return Err(Error::execution(format!(
                "duplicate key {key} in {}",
                insert.table
            )));
        }
        if let Some(id) = key.as_i64() {
            table.next_id = table.next_id.max(id + 1);
        }
        table.rows.push(row);
        Ok(generated)
    }

    fn run_update(state: &mut State, update: &Update) -> Result<u64> {
        state.check_fault(&update.table)?;
        let table = state.table_mut(&update.table)?;
        let mut matches = Vec::new();
        for (index, row) in table.rows.iter().enumerate() {
            if holds(Some(&update.filter), &Scope::root(&update.table, row))? {
                matches.push(index);
            }
        }
        for &index in &matches {
            if let Some((_, key)) = update
                .assignments
                .iter()
                .find(|(column, _)| *column == table.primary_key)
            {
                if table.has_key(key, Some(index)) {
                    return Err(Error::execution(format!(
                        "duplicate key {key} in {}",
                        update.table
                    )));
                }
            }
        }
        for &index in &matches {
            let row = &mut table.rows[index];
            for (column, value) in &update.assignments {
                row.insert(column.clone(), value.clone());
            }
        }
        Ok(matches.len() as u64)
    }

    fn run_delete(state: &mut State, delete: &Delete) -> Result<u64> {
        state.check_fault(&delete.table)?;
        let table = state.table_mut(&delete.table)?;
        let mut kept = Vec::with_capacity(table.rows.len());
        let mut removed = 0;
        for row in std::mem::take(&mut table.rows) {
            if holds(Some(&delete.filter), &Scope::root(&delete.table, &row))? {
                removed += 1;
            } else {
                kept.push(row);
            }
        }
        table.rows = kept;
        Ok(removed)
    }
}

impl Connection for MemoryConnection {
    type Cursor<'c>
        = MemoryCursor
    where
        Self: 'c;

    fn query(&self, select: &Select) -> Result<MemoryCursor> {
        let mut state = self.state.borrow_mut();
        state.record(StatementKind::Select, &select.table, select.build().0);
        let rows = Self::run_select(&state, select)?;
        Ok(MemoryCursor::new(rows))
    }

    fn count(&self, count: &Count) -> Result<u64> {
        let mut state = self.state.borrow_mut();
        state.record(StatementKind::Count, &count.table, count.build().0);
        let matched = Self::matching(
            &state,
            &count.table,
            &count.alias,
            &count.joins,
            count.filter.as_ref(),
        )?;
        Ok(matched.len() as u64)
    }

    fn insert(&self, insert: &Insert) -> Result<Option<Value>> {
        let mut state = self.state.borrow_mut();
        state.record(StatementKind::Insert, &insert.table, insert.build().0);
        Self::run_insert(&mut state, insert)
    }

    fn execute(&self, statement: &Statement) -> Result<u64> {
        let mut state = self.state.borrow_mut();
        let kind = match statement {
            Statement::Insert(_) => StatementKind::Insert,
            Statement::Update(_) => StatementKind::Update,
            Statement::Delete(_) => StatementKind::Delete,
        };
        state.record(kind, statement.table(), statement.build().0);
        match statement {
            Statement::Insert(insert) => Self::run_insert(&mut state, insert).map(|_| 1),
            Statement::Update(update) => Self::run_update(&mut state, update),
            Statement::Delete(delete) => Self::run_delete(&mut state, delete),
        }
    }

    fn begin(&self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.snapshot.is_some() {
            return Err(Error::execution("a transaction is already open"));
        }
        state.events.push(Event::Begin);
        state.snapshot = Some(state.tables.clone());
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let Some(snapshot) = state.snapshot.take() else {
            return Err(Error::execution("no transaction is open"));
        };
        state.events.push(Event::Commit);
        if state.faults.commit {
            state.tables = snapshot;
            return Err(Error::execution("injected commit failure"));
        }
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let Some(snapshot) = state.snapshot.take() else {
            return Err(Error::execution("no transaction is open"));
        };
        state.events.push(Event::Rollback);
        if state.faults.rollback {
            return Err(Error::execution("injected rollback failure"));
        }
        state.tables = snapshot;
        Ok(())
    }
}

// ============================================================================
// Cursor
// ============================================================================

/// Cursor over a materialized result.
#[derive(Debug)]
pub struct MemoryCursor {
    rows: std::vec::IntoIter<Row>,
    closed: bool,
}

impl MemoryCursor {
    fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: rows.into_iter(),
            closed: false,
        }
    }
}

impl Cursor for MemoryCursor {
    fn next_row(&mut self) -> Result<Option<Row>> {
        if self.closed {
            return Err(Error::Closed);
        }
        Ok(self.rows.next())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> MemoryConnection {
        let conn = MemoryConnection::new();
        conn.create_table("people", "id", true);
        conn.create_table("profiles", "id", true);
        for (name, age) in [("Ann", Value::from(31)), ("Bob", Value::Null), ("Cy", Value::from(17))] {
            conn.insert(
                &Insert::new("people")
                    .value("name", name)
                    .value("age", age)
                    .returning("id"),
            )
            .unwrap();
        }
        conn.insert(
            &Insert::new("profiles")
                .value("person_id", 1_i64)
                .value("bio", "hi")
                .returning("id"),
        )
        .unwrap();
        conn.clear_events();
        conn
    }

    fn names(conn: &MemoryConnection, select: &Select) -> Vec<Value> {
        let mut cursor = conn.query(select).unwrap();
        let mut out = Vec::new();
        while let Some(row) = cursor.next_row().unwrap() {
            out.push(row.values()[0].clone());
        }
        out
    }

    fn select_names() -> Select {
        let mut select = Select::new("people", "people");
        select.columns = vec![Expr::qualified("people", "name")];
        select
    }

    #[test]
    fn test_auto_increment_and_duplicate_keys() {
        let conn = people();
        assert_eq!(conn.value("people", 3_i64, "name"), Some(Value::from("Cy")));
        let generated = conn
            .insert(&Insert::new("people").value("name", "Di").returning("id"))
            .unwrap();
        assert_eq!(generated, Some(Value::BigInt(4)));

        let err = conn
            .insert(&Insert::new("people").value("id", 4_i64).value("name", "Ed"))
            .unwrap_err();
        assert!(err.to_string().contains("duplicate key"));
    }

    #[test]
    fn test_filter_order_limit() {
        let conn = people();
        let mut select = select_names();
        select.filter = Some(Expr::qualified("people", "age").is_not_null());
        select.order_by = vec![Expr::qualified("people", "age").desc()];
        assert_eq!(names(&conn, &select), [Value::from("Ann"), Value::from("Cy")]);

        let mut select = select_names();
        select.order_by = vec![Expr::qualified("people", "age").asc()];
        select.limit = Some(1);
        select.offset = Some(2);
        assert_eq!(names(&conn, &select), [Value::from("Bob")]);
    }

    #[test]
    fn test_left_join_keeps_unmatched_rows() {
        let conn = people();
        let mut select = select_names();
        select.columns.push(Expr::qualified("profile", "bio"));
        select.joins.push(Join::left(
            "profiles",
            "profile",
            Expr::qualified("profile", "person_id"),
            Expr::qualified("people", "id"),
        ));
        let mut cursor = conn.query(&select).unwrap();
        let mut bios = Vec::new();
        while let Some(row) = cursor.next_row().unwrap() {
            bios.push(row.values()[1].clone());
        }
        assert_eq!(bios, [Value::from("hi"), Value::Null, Value::Null]);
    }

    #[test]
    fn test_transactions_and_faults() {
        let conn = people();
        conn.begin().unwrap();
        conn.execute(&Statement::Delete(Delete {
            table: "people".into(),
            filter: Expr::Const(true),
        }))
        .unwrap();
        assert_eq!(conn.row_count("people"), 0);
        conn.rollback().unwrap();
        assert_eq!(conn.row_count("people"), 3);

        conn.fail_commit(true);
        conn.begin().unwrap();
        conn.execute(&Statement::Delete(Delete {
            table: "people".into(),
            filter: Expr::col("name").eq("Ann"),
        }))
        .unwrap();
        assert!(conn.commit().is_err());
        assert_eq!(conn.row_count("people"), 3);
        assert!(!conn.in_transaction());

        conn.fail_writes_to(Some("people"));
        let err = conn
            .execute(&Statement::Update(Update {
                table: "people".into(),
                assignments: vec![("age".into(), Value::from(1))],
                filter: Expr::Const(true),
            }))
            .unwrap_err();
        assert!(err.to_string().contains("injected"));
        assert_eq!(conn.event_count(&Event::Begin), 2);
        assert_eq!(conn.statement_count(StatementKind::Update), 1);
    }

    #[test]
    fn test_count_and_closed_cursor() {
        let conn = people();
        let count = Count {
            table: "people".into(),
            alias: "people".into(),
            joins: Vec::new(),
            filter: Some(Expr::col("age").lt(30)),
        };
        assert_eq!(conn.count(&count).unwrap(), 1);

        let mut cursor = conn.query(&select_names()).unwrap();
        cursor.close();
        assert!(matches!(cursor.next_row(), Err(Error::Closed)));
    }
}
