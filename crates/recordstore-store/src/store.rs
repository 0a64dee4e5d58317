//! The per-model store.
//!
//! A [`Store`] binds one model type to a connection and a schema. Reads
//! compile a [`Query`] and stream records through a [`ResultSet`]; writes run
//! the lifecycle hooks, walk relationship slots one level deep and decide
//! whether the operation must run inside a transaction.
//!
//! # Transaction promotion
//!
//! A write runs inside a transaction when the record implements any `After*`
//! hook or carries related records. Otherwise the single statement runs on
//! its own. Inside [`Store::transaction`] every write joins the open
//! transaction, and a nested `transaction` call reuses it. A write or nested
//! call that fails there marks the transaction rollback-only.
//!
//! # Example
//!
//! ```ignore
//! let store = Store::<Person, _>::new(&conn, Arc::clone(&schema))?;
//! let mut ann = Person::new("Ann");
//! ann.pets.push(Pet::new("Rex"));
//! store.insert(&mut ann)?;            // one transaction, two INSERTs
//!
//! let adults = store.find_all(Query::new().filter(Expr::col("age").ge(18)))?;
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use recordstore_core::{
    Direction, Error, Hook, Model, ModelDescriptor, Record, Result, Schema, Value, unknown_column,
};
use recordstore_query::{
    Connection, Cursor, Delete, Expr, Insert, Query, Select, Statement, Update,
};

use crate::config::StoreConfig;
use crate::loader::decode_columns;
use crate::result_set::ResultSet;
use crate::transaction::{TransactionScope, run_in_scope, run_in_transaction};

const INSERT_BEFORE: [Hook; 2] = [Hook::BeforeSave, Hook::BeforeInsert];
const INSERT_AFTER: [Hook; 2] = [Hook::AfterInsert, Hook::AfterSave];
const UPDATE_BEFORE: [Hook; 2] = [Hook::BeforeSave, Hook::BeforeUpdate];
const UPDATE_AFTER: [Hook; 2] = [Hook::AfterUpdate, Hook::AfterSave];

/// Which branch [`Store::save`] took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The record was inserted.
    Inserted,
    /// The record was updated.
    Updated,
}

#[derive(Debug, Clone)]
enum Write {
    Insert,
    Update(Option<Vec<String>>),
}

/// Store for model `M` over connection `C`.
pub struct Store<'c, M: Model, C: Connection> {
    conn: &'c C,
    schema: Arc<Schema>,
    model: Arc<ModelDescriptor>,
    config: Arc<StoreConfig>,
    transaction: Option<Arc<TransactionScope>>,
    _model: PhantomData<fn() -> M>,
}

impl<'c, M: Model, C: Connection> Store<'c, M, C> {
    /// Create a store for `M`. Fails when the schema does not describe `M`.
    pub fn new(conn: &'c C, schema: Arc<Schema>) -> Result<Self> {
        let model = Arc::clone(schema.model(M::NAME)?);
        Ok(Self {
            conn,
            schema,
            model,
            config: Arc::new(StoreConfig::default()),
            transaction: None,
            _model: PhantomData,
        })
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    /// The model descriptor.
    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.model
    }

    /// The schema.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Whether this store is bound to an open transaction.
    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// A store for another model sharing this store's connection,
    /// configuration and transaction scope.
    pub fn for_model<N: Model>(&self) -> Result<Store<'c, N, C>> {
        let model = Arc::clone(self.schema.model(N::NAME)?);
        Ok(Store {
            conn: self.conn,
            schema: Arc::clone(&self.schema),
            model,
            config: Arc::clone(&self.config),
            transaction: self.transaction.clone(),
            _model: PhantomData,
        })
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Execute `query` and return a lazy result set.
    #[tracing::instrument(level = "debug", skip(self, query), fields(model = M::NAME))]
    pub fn find(&self, query: Query<M>) -> Result<ResultSet<'c, M, C>> {
        let plan = query.compile(&self.schema)?;
        let batch_size = self.config.batch_size(plan.batch_size);
        self.log_select(&plan.select);
        let cursor = self.conn.query(&plan.select)?;
        Ok(ResultSet::new(
            self.conn,
            cursor,
            plan,
            batch_size,
            self.config.log_statements,
        ))
    }

    /// Execute `query` and collect every record.
    pub fn find_all(&self, query: Query<M>) -> Result<Vec<M>> {
        self.find(query)?.collect()
    }

    /// The first record `query` matches. Fails with [`Error::NoRows`] when
    /// there is none.
    pub fn find_one(&self, query: Query<M>) -> Result<M> {
        let mut results = self.find(query.limit(1))?;
        let found = if results.advance()? {
            results.current()
        } else {
            Err(Error::NoRows)
        };
        results.close();
        found
    }

    /// The record with primary key `key`.
    pub fn find_by_pk(&self, key: impl Into<Value>) -> Result<M> {
        let column = self.model.primary_key().column.clone();
        self.find_one(Query::new().filter(Expr::col(column).eq(key)))
    }

    /// Number of rows `query`'s filter matches. Projection, ordering and
    /// inclusions are ignored.
    #[tracing::instrument(level = "debug", skip(self, query), fields(model = M::NAME))]
    pub fn count(&self, query: &Query<M>) -> Result<u64> {
        let count = query.count_statement(&self.schema)?;
        if self.config.log_statements {
            let (sql, params) = count.build();
            tracing::trace!(%sql, ?params, "count");
        }
        self.conn.count(&count)
    }

    /// Re-read every mapped column of `record` from its row, discarding local
    /// changes. The record becomes writable. Relationship slots are left as
    /// they are.
    #[tracing::instrument(level = "debug", skip(self, record), fields(model = M::NAME))]
    pub fn reload(&self, record: &mut M) -> Result<()> {
        let key = self.require_key(record)?;
        let column = self.model.primary_key().column.clone();
        let plan = Query::<M>::new()
            .filter(Expr::col(column).eq(key))
            .limit(1)
            .compile(&self.schema)?;
        self.log_select(&plan.select);
        let mut cursor = self.conn.query(&plan.select)?;
        let row = cursor.next_row();
        cursor.close();
        let row = row?.ok_or(Error::NoRows)?;
        decode_columns(record, plan.columns.iter().map(String::as_str), row.values())?;
        record.state_mut().mark_writable();
        tracing::debug!(model = M::NAME, "Reloaded record");
        Ok(())
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Insert `record` and its related records.
    ///
    /// Fails with [`Error::Precondition`] when the primary key is not
    /// generated by the store and is unset.
    #[tracing::instrument(level = "debug", skip(self, record), fields(model = M::NAME))]
    pub fn insert(&self, record: &mut M) -> Result<()> {
        self.check_insertable(&self.model, record)?;
        self.write(record, Write::Insert)?;
        tracing::info!(model = M::NAME, pk = %record.primary_key(), "Inserted record");
        Ok(())
    }

    /// Update every mapped column of `record`. Returns the number of rows
    /// modified; 0 means no row has the record's primary key.
    #[tracing::instrument(level = "debug", skip(self, record), fields(model = M::NAME))]
    pub fn update(&self, record: &mut M) -> Result<u64> {
        self.check_updatable(&self.model, record)?;
        let affected = self.write(record, Write::Update(None))?;
        tracing::info!(model = M::NAME, affected, "Updated record");
        Ok(affected)
    }

    /// Update only the listed columns of `record`.
    #[tracing::instrument(level = "debug", skip(self, record), fields(model = M::NAME))]
    pub fn update_columns(&self, record: &mut M, columns: &[&str]) -> Result<u64> {
        self.check_updatable(&self.model, record)?;
        for column in columns {
            if self.model.column(column).is_none() {
                return Err(unknown_column(M::NAME, column));
            }
        }
        let columns = columns.iter().map(|c| (*c).to_string()).collect();
        let affected = self.write(record, Write::Update(Some(columns)))?;
        tracing::info!(model = M::NAME, affected, "Updated record columns");
        Ok(affected)
    }

    /// Insert `record` if it was never persisted, update it otherwise.
    pub fn save(&self, record: &mut M) -> Result<SaveOutcome> {
        if record.state().is_persisted() {
            self.update(record)?;
            Ok(SaveOutcome::Updated)
        } else {
            self.insert(record)?;
            Ok(SaveOutcome::Inserted)
        }
    }

    /// Delete `record`'s row. Relationships are not cascaded. The record
    /// keeps its values and is marked not persisted.
    #[tracing::instrument(level = "debug", skip(self, record), fields(model = M::NAME))]
    pub fn delete(&self, record: &mut M) -> Result<u64> {
        let key = self.require_key(record)?;
        let promote = record.hooks().has_after() || carries_related(record, &self.model);
        let affected = self.scope(promote, || {
            run_hooks(record, &[Hook::BeforeDelete])?;
            let delete = Delete {
                table: self.model.table().to_string(),
                filter: Expr::col(self.model.primary_key().column.as_str()).eq(key),
            };
            let affected = self.execute(Statement::Delete(delete))?;
            record.state_mut().set_persisted(false);
            run_hooks(record, &[Hook::AfterDelete])?;
            Ok(affected)
        });
        if affected.is_err() {
            record.state_mut().set_persisted(true);
        }
        let affected = affected?;
        tracing::info!(model = M::NAME, affected, "Deleted record");
        Ok(affected)
    }

    /// Delete related rows of `parent`.
    ///
    /// With an empty `records` list every row related to `parent` through
    /// `relation` is deleted; otherwise only the listed ones. For a forward
    /// relationship the parent's foreign key is cleared first when it points
    /// at a removed row. The parent's in-memory slot is updated to match.
    pub fn remove_related(
        &self,
        parent: &mut M,
        relation: &str,
        records: &[&dyn Record],
    ) -> Result<u64> {
        let keys = records.iter().map(|r| r.primary_key()).collect();
        self.remove_related_keys(parent, relation, keys)
    }

    /// Like [`Store::remove_related`], identifying related rows by primary key.
    #[tracing::instrument(level = "debug", skip(self, parent, keys), fields(model = M::NAME))]
    pub fn remove_related_keys(
        &self,
        parent: &mut M,
        relation: &str,
        keys: Vec<Value>,
    ) -> Result<u64> {
        let parent_key = self.require_key(parent)?;
        let rel = self.model.relationship(relation).ok_or_else(|| {
            Error::schema(format!("model `{}` has no relationship `{relation}`", M::NAME))
        })?;
        let target = Arc::clone(self.schema.target(rel)?);
        let target_pk = target.primary_key().column.clone();
        let fk = rel.foreign_key_column(M::NAME);
        let remove_all = keys.is_empty();

        let affected = match rel.direction {
            Direction::Inverse => {
                let by_parent = Expr::col(fk.as_str()).eq(parent_key);
                let filter = if remove_all {
                    by_parent
                } else {
                    by_parent.and(Expr::col(target_pk.as_str()).in_list(keys.clone()))
                };
                self.execute(Statement::Delete(Delete {
                    table: target.table().to_string(),
                    filter,
                }))?
            }
            Direction::Forward => {
                let current = self.forward_key(parent, &fk, &parent_key)?;
                let keys = if remove_all {
                    current.iter().cloned().collect()
                } else {
                    keys.clone()
                };
                if keys.is_empty() {
                    0
                } else {
                    let clears = current.is_some_and(|key| keys.contains(&key));
                    self.scope(clears, || {
                        if clears {
                            self.clear_forward_key(parent, &fk, &parent_key)?;
                        }
                        self.execute(Statement::Delete(Delete {
                            table: target.table().to_string(),
                            filter: Expr::col(target_pk.as_str()).in_list(keys.clone()),
                        }))
                    })?
                }
            }
        };

        if let Some(slot) = parent.relation_mut(relation) {
            if remove_all {
                slot.clear_loaded();
            } else {
                slot.remove_where(&mut |r| keys.contains(&r.primary_key()));
            }
        }
        tracing::info!(model = M::NAME, relation, affected, "Removed related records");
        Ok(affected)
    }

    /// The row a forward relationship of `parent` points at, read from the
    /// mapped foreign key or from the owner's row when the store manages it.
    fn forward_key(&self, parent: &M, fk: &str, parent_key: &Value) -> Result<Option<Value>> {
        let key = if self.model.column(fk).is_some() {
            parent.get(fk)?
        } else {
            let table = self.model.table();
            let mut select = Select::new(table, table);
            select.columns = vec![Expr::qualified(table, fk)];
            select.filter = Some(
                Expr::qualified(table, self.model.primary_key().column.as_str())
                    .eq(parent_key.clone()),
            );
            select.limit = Some(1);
            self.log_select(&select);
            let mut cursor = self.conn.query(&select)?;
            let row = cursor.next_row();
            cursor.close();
            row?.and_then(|row| row.values().first().cloned())
                .unwrap_or(Value::Null)
        };
        Ok((!key.is_null()).then_some(key))
    }

    /// Set the owner's foreign key to NULL in the row and, when mapped, in
    /// `parent`. Non-nullable mapped keys are left alone.
    fn clear_forward_key(&self, parent: &mut M, fk: &str, parent_key: &Value) -> Result<()> {
        if let Some(column) = self.model.column(fk) {
            if !column.nullable {
                return Ok(());
            }
            parent.set(fk, Value::Null)?;
        }
        self.execute(Statement::Update(Update {
            table: self.model.table().to_string(),
            assignments: vec![(fk.to_string(), Value::Null)],
            filter: Expr::col(self.model.primary_key().column.as_str()).eq(parent_key.clone()),
        }))?;
        Ok(())
    }

    /// Run `work` inside a transaction.
    ///
    /// `work` receives a store bound to the transaction; use
    /// [`Store::for_model`] on it to write other models in the same
    /// transaction. When this store is already inside a transaction the
    /// existing one is reused, so an inner failure rolls back the outer
    /// transaction even if the outer work carries on.
    pub fn transaction<T>(&self, work: impl FnOnce(&Store<'c, M, C>) -> Result<T>) -> Result<T> {
        if let Some(scope) = &self.transaction {
            tracing::debug!("Reusing open transaction");
            let result = work(self);
            if result.is_err() {
                scope.mark_rollback_only();
            }
            return result;
        }
        let scope = Arc::new(TransactionScope::default());
        let scoped = Store {
            conn: self.conn,
            schema: Arc::clone(&self.schema),
            model: Arc::clone(&self.model),
            config: Arc::clone(&self.config),
            transaction: Some(Arc::clone(&scope)),
            _model: PhantomData,
        };
        run_in_scope(self.conn, &scope, || work(&scoped))
    }

    // ========================================================================
    // Write protocol
    // ========================================================================

    fn write(&self, record: &mut M, write: Write) -> Result<u64> {
        let promote = record.hooks().has_after() || carries_related(record, &self.model);
        let snapshot = Snapshot::capture(record, &self.model, &self.schema);
        let result = self.scope(promote, || {
            self.persist(record, &self.model, write, Vec::new(), true)
        });
        if result.is_err() {
            snapshot.restore(record);
        }
        result
    }

    /// Run `work` in the transaction a write needs. A promoted write that
    /// fails inside an open transaction may have left rows behind, so the
    /// transaction is marked rollback-only.
    fn scope<T>(&self, promote: bool, work: impl FnOnce() -> Result<T>) -> Result<T> {
        match &self.transaction {
            Some(scope) => {
                let result = work();
                if promote && result.is_err() {
                    scope.mark_rollback_only();
                }
                result
            }
            None if promote => {
                tracing::debug!(model = M::NAME, "Promoting write to a transaction");
                run_in_transaction(self.conn, work)
            }
            None => work(),
        }
    }

    /// Hooks, statement and (when `cascade`) related records for one record.
    fn persist(
        &self,
        record: &mut dyn Record,
        model: &ModelDescriptor,
        write: Write,
        mut extras: Vec<(String, Value)>,
        cascade: bool,
    ) -> Result<u64> {
        let (before, after) = match write {
            Write::Insert => (INSERT_BEFORE, INSERT_AFTER),
            Write::Update(_) => (UPDATE_BEFORE, UPDATE_AFTER),
        };
        run_hooks(record, &before)?;
        if cascade {
            self.save_forward(record, model, &mut extras)?;
        }
        let affected = match &write {
            Write::Insert => self.execute_insert(record, model, extras)?,
            Write::Update(columns) => {
                self.execute_update(record, model, columns.as_deref(), extras)?
            }
        };
        if cascade {
            self.save_inverse(record, model)?;
        }
        run_hooks(record, &after)?;
        Ok(affected)
    }

    /// Save records of forward one-to-one relationships and point the
    /// owner's foreign key at them.
    fn save_forward(
        &self,
        record: &mut dyn Record,
        model: &ModelDescriptor,
        extras: &mut Vec<(String, Value)>,
    ) -> Result<()> {
        for rel in model.relationships() {
            if rel.direction != Direction::Forward {
                continue;
            }
            let target = Arc::clone(self.schema.target(rel)?);
            let Some(slot) = record.relation_mut(&rel.name) else {
                continue;
            };
            if !slot.is_loaded() {
                continue;
            }
            let mut key = Value::Null;
            for child in slot.records_mut() {
                self.save_child(&mut *child, &target, Vec::new())?;
                key = child.primary_key();
            }
            let fk = rel.foreign_key_column(model.name());
            if model.column(&fk).is_some() {
                record.set(&fk, key)?;
            } else {
                extras.push((fk, key));
            }
        }
        Ok(())
    }

    /// Save records of inverse relationships with their foreign key pointing
    /// at the owner.
    fn save_inverse(&self, record: &mut dyn Record, model: &ModelDescriptor) -> Result<()> {
        let owner_key = record.primary_key();
        for rel in model.relationships() {
            if rel.direction != Direction::Inverse {
                continue;
            }
            let target = Arc::clone(self.schema.target(rel)?);
            let fk = rel.foreign_key_column(model.name());
            let fk_mapped = target.column(&fk).is_some();
            let Some(slot) = record.relation_mut(&rel.name) else {
                continue;
            };
            for child in slot.records_mut() {
                let extras = if fk_mapped {
                    child.set(&fk, owner_key.clone())?;
                    Vec::new()
                } else {
                    vec![(fk.clone(), owner_key.clone())]
                };
                self.save_child(child, &target, extras)?;
            }
        }
        Ok(())
    }

    fn save_child(
        &self,
        child: &mut dyn Record,
        target: &ModelDescriptor,
        extras: Vec<(String, Value)>,
    ) -> Result<u64> {
        let write = if child.state().is_persisted() {
            self.check_updatable(target, child)?;
            Write::Update(None)
        } else {
            self.check_insertable(target, child)?;
            Write::Insert
        };
        self.persist(child, target, write, extras, false)
    }

    fn execute_insert(
        &self,
        record: &mut dyn Record,
        model: &ModelDescriptor,
        extras: Vec<(String, Value)>,
    ) -> Result<u64> {
        let pk = model.primary_key();
        let generate = pk.auto_increment && record.primary_key().is_empty_key();
        let mut insert = Insert::new(model.table());
        for column in model.columns() {
            if generate && column.name == pk.column {
                continue;
            }
            insert = insert.value(column.name.as_str(), record.get(&column.name)?);
        }
        for (column, value) in extras {
            insert = insert.value(column, value);
        }
        if generate {
            insert = insert.returning(pk.column.as_str());
        }
        if self.config.log_statements {
            let (sql, params) = insert.build();
            tracing::trace!(%sql, ?params, "insert");
        }

        let generated = self.conn.insert(&insert)?;
        if generate {
            let key = generated
                .filter(|v| !v.is_null())
                .ok_or_else(|| Error::execution("insert did not return a generated key"))?;
            record.set_primary_key(key)?;
        }
        record.state_mut().set_persisted(true);
        Ok(1)
    }

    fn execute_update(
        &self,
        record: &mut dyn Record,
        model: &ModelDescriptor,
        columns: Option<&[String]>,
        extras: Vec<(String, Value)>,
    ) -> Result<u64> {
        let pk = &model.primary_key().column;
        let key = record.primary_key();
        let names: Vec<&str> = match columns {
            Some(columns) => columns.iter().map(String::as_str).collect(),
            None => model.column_names().collect(),
        };
        let mut assignments = Vec::with_capacity(names.len() + extras.len());
        for name in names {
            if name != pk.as_str() {
                assignments.push((name.to_string(), record.get(name)?));
            }
        }
        assignments.extend(extras);
        if assignments.is_empty() {
            assignments.push((pk.clone(), key.clone()));
        }
        let update = Update {
            table: model.table().to_string(),
            assignments,
            filter: Expr::col(pk.as_str()).eq(key),
        };
        self.execute(Statement::Update(update))
    }

    fn execute(&self, statement: Statement) -> Result<u64> {
        if self.config.log_statements {
            let (sql, params) = statement.build();
            tracing::trace!(%sql, ?params, "execute");
        }
        self.conn.execute(&statement)
    }

    fn log_select(&self, select: &Select) {
        if self.config.log_statements {
            let (sql, params) = select.build();
            tracing::trace!(%sql, ?params, "select");
        }
    }

    // ========================================================================
    // Preconditions
    // ========================================================================

    fn check_writable(&self, record: &dyn Record) -> Result<()> {
        match record.state().not_writable_reason() {
            Some(reason) => Err(Error::NotWritable {
                model: record.model_name(),
                reason,
            }),
            None => Ok(()),
        }
    }

    fn check_insertable(&self, model: &ModelDescriptor, record: &dyn Record) -> Result<()> {
        self.check_writable(record)?;
        if !model.primary_key().auto_increment && record.primary_key().is_empty_key() {
            return Err(Error::Precondition(format!(
                "model `{}` needs a primary key before insert",
                model.name()
            )));
        }
        Ok(())
    }

    fn check_updatable(&self, model: &ModelDescriptor, record: &dyn Record) -> Result<()> {
        if !record.state().is_persisted() {
            return Err(Error::NotPersisted {
                model: record.model_name(),
            });
        }
        if record.primary_key().is_empty_key() {
            return Err(Error::Precondition(format!(
                "model `{}` needs a primary key before update",
                model.name()
            )));
        }
        self.check_writable(record)
    }

    fn require_key(&self, record: &dyn Record) -> Result<Value> {
        if !record.state().is_persisted() {
            return Err(Error::NotPersisted {
                model: record.model_name(),
            });
        }
        let key = record.primary_key();
        if key.is_empty_key() {
            return Err(Error::Precondition(format!(
                "record of model `{}` has no primary key",
                record.model_name()
            )));
        }
        Ok(key)
    }
}

impl<M: Model, C: Connection> Clone for Store<'_, M, C> {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn,
            schema: Arc::clone(&self.schema),
            model: Arc::clone(&self.model),
            config: Arc::clone(&self.config),
            transaction: self.transaction.clone(),
            _model: PhantomData,
        }
    }
}

impl<M: Model, C: Connection> std::fmt::Debug for Store<'_, M, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("model", &M::NAME)
            .field("in_transaction", &self.in_transaction())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn run_hooks(record: &mut dyn Record, hooks: &[Hook]) -> Result<()> {
    let declared = record.hooks();
    for &hook in hooks {
        if declared.contains(hook) {
            tracing::debug!(model = record.model_name(), %hook, "Running hook");
            record
                .run_hook(hook)
                .map_err(|source| Error::Hook { hook, source })?;
        }
    }
    Ok(())
}

fn carries_related(record: &dyn Record, model: &ModelDescriptor) -> bool {
    model
        .relationships()
        .iter()
        .filter_map(|rel| record.relation(&rel.name))
        .any(|slot| !slot.is_empty())
}

// ============================================================================
// Failure restore
// ============================================================================

/// In-memory state a write may change on the records it touches.
#[derive(Debug)]
struct RecordSnapshot {
    key: Value,
    persisted: bool,
    columns: Vec<(String, Value)>,
}

impl RecordSnapshot {
    fn capture(record: &dyn Record, columns: &[String]) -> Self {
        Self {
            key: record.primary_key(),
            persisted: record.state().is_persisted(),
            columns: columns
                .iter()
                .filter_map(|c| record.get(c).ok().map(|v| (c.clone(), v)))
                .collect(),
        }
    }

    fn restore(&self, record: &mut dyn Record) {
        let restored = record.set_primary_key(self.key.clone()).and_then(|()| {
            self.columns
                .iter()
                .try_for_each(|(column, value)| record.set(column, value.clone()))
        });
        if let Err(e) = restored {
            tracing::warn!(model = record.model_name(), error = %e, "Could not restore record after failed write");
        }
        record.state_mut().set_persisted(self.persisted);
    }
}

/// Snapshot of a record and the related records one level down.
#[derive(Debug)]
struct Snapshot {
    root: RecordSnapshot,
    related: Vec<(String, Vec<RecordSnapshot>)>,
}

impl Snapshot {
    fn capture(record: &dyn Record, model: &ModelDescriptor, schema: &Schema) -> Self {
        let mut root_columns = Vec::new();
        let mut related = Vec::new();
        for rel in model.relationships() {
            let fk = rel.foreign_key_column(model.name());
            let mut child_columns = Vec::new();
            match rel.direction {
                Direction::Forward if model.column(&fk).is_some() => root_columns.push(fk),
                Direction::Inverse
                    if schema
                        .target(rel)
                        .is_ok_and(|target| target.column(&fk).is_some()) =>
                {
                    child_columns.push(fk);
                }
                _ => {}
            }
            if let Some(slot) = record.relation(&rel.name) {
                let children = slot
                    .records()
                    .into_iter()
                    .map(|child| RecordSnapshot::capture(child, &child_columns))
                    .collect();
                related.push((rel.name.clone(), children));
            }
        }
        Self {
            root: RecordSnapshot::capture(record, &root_columns),
            related,
        }
    }

    fn restore(&self, record: &mut dyn Record) {
        self.root.restore(record);
        for (name, children) in &self.related {
            if let Some(slot) = record.relation_mut(name) {
                for (child, snapshot) in slot.records_mut().into_iter().zip(children) {
                    snapshot.restore(child);
                }
            }
        }
        tracing::debug!(model = record.model_name(), "Restored records after failed write");
    }
}
