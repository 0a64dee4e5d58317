//! Per-model query builder.
//!
//! A [`Query`] is a value: every builder method consumes it and returns the
//! updated query, and `Clone` (or [`Query::copy`]) produces a fully
//! independent deep copy. Nothing is executed here. [`Query::compile`]
//! resolves the query against a [`Schema`] into a [`SelectPlan`] that a store
//! can run.
//!
//! ```ignore
//! let query = Query::<Person>::new()
//!     .filter(Expr::col("age").ge(18))
//!     .order_by(OrderBy::asc("name"))
//!     .with_relation("pets", Some(Expr::col("species").eq("cat")))
//!     .batch_size(100);
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use recordstore_core::{
    ColumnSet, Direction, Error, Model, ModelDescriptor, NotWritableReason, Result, Schema, Value,
    unknown_column,
};

use crate::expr::{Column, Expr, OrderBy};
use crate::statement::{Count, Join, Select};

// ============================================================================
// Projection and inclusion directives
// ============================================================================

/// Which mapped columns a query loads.
///
/// The primary key is always loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
    /// Every mapped column.
    #[default]
    All,
    /// Only the listed columns.
    Only(Vec<String>),
    /// Every column except the listed ones.
    Except(Vec<String>),
}

impl Projection {
    /// Resolve to a set of column positions of `model`.
    pub fn resolve(&self, model: &ModelDescriptor) -> Result<ColumnSet> {
        let count = model.columns().len();
        let pk = model
            .column_index(&model.primary_key().column)
            .ok_or_else(|| unknown_column(model.name(), &model.primary_key().column))?;
        let position = |name: &str| {
            model
                .column_index(name)
                .ok_or_else(|| unknown_column(model.name(), name))
        };
        match self {
            Projection::All => Ok(ColumnSet::all(count)),
            Projection::Only(names) => {
                let mut set = ColumnSet::empty(count);
                set.insert(pk);
                for name in names {
                    set.insert(position(name)?);
                }
                Ok(set)
            }
            Projection::Except(names) => {
                let mut set = ColumnSet::all(count);
                for name in names {
                    let idx = position(name)?;
                    if idx != pk {
                        set.remove(idx);
                    }
                }
                Ok(set)
            }
        }
    }
}

/// Eager-loading directive for one relationship.
#[derive(Debug, Clone, PartialEq)]
pub struct Include {
    /// Relationship name.
    pub relation: String,
    /// Optional predicate on the related rows.
    pub filter: Option<Expr>,
    /// Ordering of related rows within each parent (one-to-many only).
    pub order_by: Vec<OrderBy>,
}

impl Include {
    /// Load `relation` without a filter.
    pub fn new(relation: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            filter: None,
            order_by: Vec::new(),
        }
    }

    /// Restrict the related rows. Repeated calls combine with AND.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = Some(match self.filter {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    /// Order related rows.
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }
}

// ============================================================================
// Query
// ============================================================================

/// A query against the table of model `M`.
pub struct Query<M> {
    filter: Option<Expr>,
    projection: Projection,
    order_by: Vec<OrderBy>,
    limit: Option<u64>,
    offset: Option<u64>,
    includes: Vec<Include>,
    batch_size: Option<usize>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Query<M> {
    /// An unfiltered query over every row.
    pub fn new() -> Self {
        Self {
            filter: None,
            projection: Projection::All,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            includes: Vec::new(),
            batch_size: None,
            _model: PhantomData,
        }
    }

    /// Add a WHERE condition. Repeated calls combine with AND.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = Some(match self.filter {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    /// Append an ORDER BY term.
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    /// Limit the number of rows.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip rows.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Load only the listed columns (plus the primary key).
    ///
    /// Replaces any earlier `select` or `select_not`. An empty list loads
    /// every column.
    pub fn select<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        self.projection = if columns.is_empty() {
            Projection::All
        } else {
            Projection::Only(columns)
        };
        self
    }

    /// Load every column except the listed ones.
    ///
    /// Replaces any earlier `select` or `select_not`. The primary key is
    /// never excluded.
    pub fn select_not<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        self.projection = if columns.is_empty() {
            Projection::All
        } else {
            Projection::Except(columns)
        };
        self
    }

    /// Eagerly load a relationship, optionally restricted by `filter`.
    ///
    /// A filter makes every returned parent non-writable.
    pub fn with_relation(self, relation: impl Into<String>, filter: Option<Expr>) -> Self {
        let mut include = Include::new(relation);
        include.filter = filter;
        self.include(include)
    }

    /// Add an inclusion directive, replacing an earlier one for the same
    /// relationship.
    pub fn include(mut self, include: Include) -> Self {
        self.includes.retain(|i| i.relation != include.relation);
        self.includes.push(include);
        self
    }

    /// Number of parents per batched one-to-many load.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    /// Independent deep copy of this query.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// The WHERE condition.
    pub fn predicate(&self) -> Option<&Expr> {
        self.filter.as_ref()
    }

    /// The projection.
    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// The ORDER BY terms.
    pub fn ordering(&self) -> &[OrderBy] {
        &self.order_by
    }

    /// The inclusion directives.
    pub fn includes(&self) -> &[Include] {
        &self.includes
    }

    /// The LIMIT, if any.
    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    /// The OFFSET, if any.
    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    /// The requested batch size, if any.
    pub fn batch_size_value(&self) -> Option<usize> {
        self.batch_size
    }

    /// Resolve this query against `schema`.
    pub fn compile(&self, schema: &Schema) -> Result<SelectPlan> {
        let model = Arc::clone(schema.model(M::NAME)?);
        let root = model.table().to_string();
        if self.batch_size == Some(0) {
            return Err(Error::Precondition("batch size must be positive".into()));
        }

        let projection = self.projection.resolve(&model)?;
        let columns: Vec<String> = projection
            .iter()
            .map(|i| model.columns()[i].name.clone())
            .collect();

        let mut select = Select::new(model.table(), root.as_str());
        select.columns = columns
            .iter()
            .map(|c| Column::qualified(root.as_str(), c.as_str()))
            .collect();

        let mut joined = Vec::new();
        let mut batched = Vec::new();
        let mut filtered = false;
        for include in &self.includes {
            let rel = model.relationship(&include.relation).ok_or_else(|| {
                Error::schema(format!(
                    "model `{}` has no relationship `{}`",
                    model.name(),
                    include.relation
                ))
            })?;
            let target = Arc::clone(schema.target(rel)?);
            let scope = [(None, target.as_ref())];
            if let Some(filter) = &include.filter {
                check_columns(filter.columns(), &scope)?;
                filtered = true;
            }
            check_columns(include.order_by.iter().map(|o| &o.column), &scope)?;
            let foreign_key = rel.foreign_key_column(model.name());

            if rel.is_joined() {
                let alias = rel.name.clone();
                if alias == root {
                    return Err(Error::schema(format!(
                        "relationship `{alias}` has the same name as table `{root}`"
                    )));
                }
                let (left, right) = match rel.direction {
                    Direction::Inverse => (
                        Column::qualified(alias.as_str(), foreign_key.as_str()),
                        Column::qualified(root.as_str(), model.primary_key().column.as_str()),
                    ),
                    Direction::Forward => (
                        Column::qualified(alias.as_str(), target.primary_key().column.as_str()),
                        Column::qualified(root.as_str(), foreign_key.as_str()),
                    ),
                };
                let mut join = Join::left(target.table(), alias.as_str(), left, right);
                if let Some(filter) = &include.filter {
                    join = join.and_on(filter.clone().qualify(&alias));
                }
                let offset = select.columns.len();
                select
                    .columns
                    .extend(target.column_names().map(|c| Column::qualified(alias.as_str(), c)));
                select.joins.push(join);
                joined.push(JoinedRelation {
                    name: rel.name.clone(),
                    target,
                    offset,
                });
            } else {
                batched.push(BatchedRelation {
                    name: rel.name.clone(),
                    target,
                    foreign_key,
                    filter: include.filter.clone(),
                    order_by: include.order_by.clone(),
                });
            }
        }

        let mut scope: Vec<(Option<&str>, &ModelDescriptor)> =
            vec![(None, model.as_ref()), (Some(root.as_str()), model.as_ref())];
        scope.extend(joined.iter().map(|j| (Some(j.name.as_str()), j.target.as_ref())));
        if let Some(filter) = &self.filter {
            check_columns(filter.columns(), &scope)?;
            select.filter = Some(filter.clone().qualify(&root));
        }
        check_columns(self.order_by.iter().map(|o| &o.column), &scope)?;
        select.order_by = self
            .order_by
            .iter()
            .map(|o| o.clone().qualify(&root))
            .collect();
        select.limit = self.limit;
        select.offset = self.offset;

        let mut not_writable = Vec::new();
        if !projection.is_full() {
            not_writable.push(NotWritableReason::Projection);
        }
        if filtered {
            not_writable.push(NotWritableReason::FilteredRelationship);
        }

        tracing::trace!(
            model = M::NAME,
            columns = columns.len(),
            joined = joined.len(),
            batched = batched.len(),
            "compiled query"
        );
        Ok(SelectPlan {
            model,
            select,
            columns,
            projection,
            joined,
            batched,
            batch_size: self.batch_size,
            not_writable,
        })
    }

    /// Build a `COUNT(*)` over the rows this query's filter matches.
    ///
    /// Projection, ordering and paging are dropped. One-to-one inclusions
    /// keep their joins so the filter may refer to their aliases; a left
    /// join on a one-to-one relationship never changes the row count.
    pub fn count_statement(&self, schema: &Schema) -> Result<Count> {
        let Select {
            table,
            alias,
            joins,
            filter,
            ..
        } = self.compile(schema)?.select;
        Ok(Count {
            table,
            alias,
            joins,
            filter,
        })
    }
}

/// Every column must belong to the model its qualifier names.
fn check_columns<'a>(
    columns: impl IntoIterator<Item = &'a Column>,
    scope: &[(Option<&str>, &ModelDescriptor)],
) -> Result<()> {
    for column in columns {
        let model = scope
            .iter()
            .find(|(alias, _)| *alias == column.table.as_deref())
            .map(|(_, model)| *model)
            .ok_or_else(|| {
                Error::schema(format!(
                    "unknown table alias `{}`",
                    column.table.as_deref().unwrap_or_default()
                ))
            })?;
        if !model.has_column(&column.name) {
            return Err(unknown_column(model.name(), &column.name));
        }
    }
    Ok(())
}

impl<M: Model> Default for Query<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for Query<M> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            projection: self.projection.clone(),
            order_by: self.order_by.clone(),
            limit: self.limit,
            offset: self.offset,
            includes: self.includes.clone(),
            batch_size: self.batch_size,
            _model: PhantomData,
        }
    }
}

impl<M> PartialEq for Query<M> {
    fn eq(&self, other: &Self) -> bool {
        self.filter == other.filter
            && self.projection == other.projection
            && self.order_by == other.order_by
            && self.limit == other.limit
            && self.offset == other.offset
            && self.includes == other.includes
            && self.batch_size == other.batch_size
    }
}

impl<M> fmt::Debug for Query<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("filter", &self.filter)
            .field("projection", &self.projection)
            .field("order_by", &self.order_by)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("includes", &self.includes)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

// ============================================================================
// Compiled plan
// ============================================================================

/// A one-to-one relationship fetched through a join of the root query.
#[derive(Debug, Clone)]
pub struct JoinedRelation {
    /// Relationship name (also the join alias).
    pub name: String,
    /// Target model.
    pub target: Arc<ModelDescriptor>,
    /// Position of the target's first column in each row. The target's
    /// mapped columns follow in declaration order.
    pub offset: usize,
}

/// A one-to-many relationship loaded in batches after the parents.
#[derive(Debug, Clone)]
pub struct BatchedRelation {
    /// Relationship name.
    pub name: String,
    /// Target model.
    pub target: Arc<ModelDescriptor>,
    /// Foreign key column on the target table.
    pub foreign_key: String,
    /// Optional predicate on the children.
    pub filter: Option<Expr>,
    /// Ordering of children.
    pub order_by: Vec<OrderBy>,
}

impl BatchedRelation {
    /// SELECT for every child whose foreign key is one of `keys`.
    ///
    /// Rows hold the target's mapped columns in declaration order; when the
    /// foreign key is not a mapped column it follows at
    /// [`BatchedRelation::foreign_key_position`].
    pub fn select_for(&self, keys: Vec<Value>) -> Select {
        let alias = self.target.table();
        let mut select = Select::new(alias, alias);
        select.columns = self
            .target
            .column_names()
            .map(|c| Column::qualified(alias, c))
            .collect();
        if self.target.column(&self.foreign_key).is_none() {
            select
                .columns
                .push(Column::qualified(alias, self.foreign_key.as_str()));
        }
        let by_parent = Expr::qualified(alias, self.foreign_key.as_str()).in_list(keys);
        select.filter = Some(match &self.filter {
            Some(filter) => by_parent.and(filter.clone().qualify(alias)),
            None => by_parent,
        });
        select.order_by = self.order_by.iter().map(|o| o.clone().qualify(alias)).collect();
        select
    }

    /// Position of the foreign key in rows of [`BatchedRelation::select_for`].
    pub fn foreign_key_position(&self) -> usize {
        self.target
            .column_index(&self.foreign_key)
            .unwrap_or(self.target.columns().len())
    }
}

/// A query resolved against a schema.
#[derive(Debug, Clone)]
pub struct SelectPlan {
    /// Root model.
    pub model: Arc<ModelDescriptor>,
    /// The root SELECT.
    pub select: Select,
    /// Root columns, at positions `0..columns.len()` of each row.
    pub columns: Vec<String>,
    /// Which of the model's columns are loaded.
    pub projection: ColumnSet,
    /// One-to-one relationships fetched by the root SELECT.
    pub joined: Vec<JoinedRelation>,
    /// One-to-many relationships loaded in batches.
    pub batched: Vec<BatchedRelation>,
    /// Requested batch size.
    pub batch_size: Option<usize>,
    /// Reasons every returned record is not writable.
    pub not_writable: Vec<NotWritableReason>,
}

impl SelectPlan {
    /// Whether records produced by this plan can be written back.
    pub fn is_writable(&self) -> bool {
        self.not_writable.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use recordstore_core::{
        FieldDescriptor, Record, RecordState, RelationshipDescriptor, SqlType,
    };

    #[derive(Debug, Default)]
    struct Person {
        state: RecordState,
    }

    impl Record for Person {
        fn model_name(&self) -> &'static str {
            "Person"
        }
        fn primary_key(&self) -> Value {
            Value::Null
        }
        fn set_primary_key(&mut self, _value: Value) -> Result<()> {
            Ok(())
        }
        fn get(&self, column: &str) -> Result<Value> {
            Err(unknown_column("Person", column))
        }
        fn set(&mut self, column: &str, _value: Value) -> Result<()> {
            Err(unknown_column("Person", column))
        }
        fn state(&self) -> &RecordState {
            &self.state
        }
        fn state_mut(&mut self) -> &mut RecordState {
            &mut self.state
        }
    }

    impl Model for Person {
        const NAME: &'static str = "Person";
    }

    fn schema() -> Schema {
        Schema::builder()
            .model(
                ModelDescriptor::builder("Person")
                    .field(FieldDescriptor::scalar("id", SqlType::BigInt).primary_key().auto_increment())
                    .field(FieldDescriptor::scalar("name", SqlType::Text))
                    .field(FieldDescriptor::scalar("age", SqlType::Int))
                    .relationship(RelationshipDescriptor::one_to_many("pets", "Pet"))
                    .relationship(RelationshipDescriptor::one_to_one("profile", "Profile")),
            )
            .model(
                ModelDescriptor::builder("Pet")
                    .field(FieldDescriptor::scalar("id", SqlType::BigInt).primary_key().auto_increment())
                    .field(FieldDescriptor::scalar("species", SqlType::Text)),
            )
            .model(
                ModelDescriptor::builder("Profile")
                    .field(FieldDescriptor::scalar("id", SqlType::BigInt).primary_key().auto_increment())
                    .field(FieldDescriptor::scalar("bio", SqlType::Text)),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_filter_combines_with_and() {
        let query = Query::<Person>::new()
            .filter(Expr::col("age").ge(18))
            .filter(Expr::col("name").like("A%"));
        assert!(matches!(query.predicate(), Some(Expr::And(children)) if children.len() == 2));
    }

    #[test]
    fn test_select_and_select_not_are_exclusive() {
        let query = Query::<Person>::new().select(["name"]).select_not(["age"]);
        assert_eq!(query.projection(), &Projection::Except(vec!["age".into()]));
        let query = query.select(Vec::<String>::new());
        assert_eq!(query.projection(), &Projection::All);
    }

    #[test]
    fn test_compile_subset_is_not_writable() {
        let plan = Query::<Person>::new().select(["name"]).compile(&schema()).unwrap();
        assert_eq!(plan.columns, ["id", "name"]);
        assert_eq!(plan.not_writable, vec![NotWritableReason::Projection]);

        let plan = Query::<Person>::new()
            .select(["name", "age"])
            .compile(&schema())
            .unwrap();
        assert!(plan.is_writable());
    }

    #[test]
    fn test_compile_joins_one_to_one() {
        let plan = Query::<Person>::new()
            .with_relation("profile", None)
            .compile(&schema())
            .unwrap();
        assert_eq!(plan.joined.len(), 1);
        assert_eq!(plan.joined[0].offset, 3);
        assert_eq!(plan.select.columns.len(), 5);
        let (sql, _) = plan.select.build();
        assert!(sql.contains(
            "LEFT JOIN \"profile\" AS \"profile\" ON \"profile\".\"person_id\" = \"person\".\"id\""
        ));
        assert!(plan.is_writable());
    }

    #[test]
    fn test_count_keeps_one_to_one_joins() {
        let count = Query::<Person>::new()
            .with_relation("profile", None)
            .with_relation("pets", None)
            .filter(Expr::qualified("profile", "bio").is_null())
            .order_by(OrderBy::asc("name"))
            .count_statement(&schema())
            .unwrap();
        assert_eq!(count.joins.len(), 1);
        let (sql, _) = count.build();
        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM \"person\" AS \"person\" LEFT JOIN \"profile\" AS \"profile\" \
             ON \"profile\".\"person_id\" = \"person\".\"id\" WHERE \"profile\".\"bio\" IS NULL"
        );
    }

    #[test]
    fn test_compile_batched_with_filter() {
        let plan = Query::<Person>::new()
            .with_relation("pets", Some(Expr::col("species").eq("cat")))
            .compile(&schema())
            .unwrap();
        assert_eq!(plan.batched.len(), 1);
        assert_eq!(plan.not_writable, vec![NotWritableReason::FilteredRelationship]);

        let pets = &plan.batched[0];
        assert_eq!(pets.foreign_key, "person_id");
        assert_eq!(pets.foreign_key_position(), 2);
        let (sql, params) = pets.select_for(vec![Value::BigInt(1), Value::BigInt(2)]).build();
        assert_eq!(
            sql,
            "SELECT \"pet\".\"id\", \"pet\".\"species\", \"pet\".\"person_id\" FROM \"pet\" AS \"pet\" \
             WHERE (\"pet\".\"person_id\" IN ($1, $2)) AND (\"pet\".\"species\" = $3)"
        );
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_compile_rejects_unknown_names() {
        let schema = schema();
        assert!(Query::<Person>::new().select(["nope"]).compile(&schema).is_err());
        assert!(
            Query::<Person>::new()
                .filter(Expr::col("nope").eq(1))
                .compile(&schema)
                .is_err()
        );
        assert!(
            Query::<Person>::new()
                .with_relation("friends", None)
                .compile(&schema)
                .is_err()
        );
        assert!(
            Query::<Person>::new()
                .with_relation("pets", Some(Expr::col("bio").eq("x")))
                .compile(&schema)
                .is_err()
        );
    }

    #[test]
    fn test_filter_on_joined_columns() {
        let plan = Query::<Person>::new()
            .with_relation("profile", None)
            .filter(Expr::qualified("profile", "bio").is_not_null())
            .compile(&schema())
            .unwrap();
        let (sql, _) = plan.select.build();
        assert!(sql.ends_with("WHERE \"profile\".\"bio\" IS NOT NULL"));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let err = Query::<Person>::new().batch_size(0).compile(&schema()).unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[derive(Debug, Clone)]
    enum Step {
        Filter(i64),
        Order(bool),
        Select(bool),
        Include(Option<i64>),
        Limit(u64),
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            any::<i64>().prop_map(Step::Filter),
            any::<bool>().prop_map(Step::Order),
            any::<bool>().prop_map(Step::Select),
            proptest::option::of(any::<i64>()).prop_map(Step::Include),
            (0u64..1000).prop_map(Step::Limit),
        ]
    }

    fn apply(query: Query<Person>, step: &Step) -> Query<Person> {
        match step {
            Step::Filter(v) => query.filter(Expr::col("age").gt(*v)),
            Step::Order(true) => query.order_by(OrderBy::asc("name")),
            Step::Order(false) => query.order_by(OrderBy::desc("age")),
            Step::Select(true) => query.select(["name"]),
            Step::Select(false) => query.select_not(["age"]),
            Step::Include(v) => query.with_relation("pets", v.map(|v| Expr::col("id").eq(v))),
            Step::Limit(n) => query.limit(*n),
        }
    }

    proptest! {
        #[test]
        fn prop_copy_is_independent(
            setup in proptest::collection::vec(step(), 0..8),
            edits in proptest::collection::vec(step(), 1..8),
        ) {
            let original = setup.iter().fold(Query::<Person>::new(), apply);
            let snapshot = format!("{original:?}");
            let copy = edits.iter().fold(original.copy(), apply);
            prop_assert_eq!(format!("{original:?}"), snapshot);
            drop(copy);
        }
    }
}
