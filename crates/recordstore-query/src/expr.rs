//! Predicate and ordering expressions.
//!
//! An [`Expr`] is an immutable tree: leaves compare one column with literal
//! values, combinators join children with AND, OR and NOT. The tree never
//! executes anything. Drivers either render it to SQL with [`Expr::build`] or
//! evaluate it directly.
//!
//! ```ignore
//! let adults = Expr::col("age").ge(18).and(Expr::col("name").like("A%"));
//! let tagged = Expr::col("tags").array_overlaps(vec!["red", "blue"]);
//! let typed = Expr::col("doc").json_has_any_key(["kind", "type"]);
//! ```

use recordstore_core::{Value, quote_ident};

/// A column reference, optionally qualified by a table alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Column {
    /// Table alias, filled in when the query is compiled.
    pub table: Option<String>,
    /// Column name.
    pub name: String,
}

impl Column {
    /// An unqualified column.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            table: None,
            name: name.into(),
        }
    }

    /// A column qualified by a table alias.
    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            name: name.into(),
        }
    }

    /// Qualify with `alias` unless already qualified.
    pub fn qualify(mut self, alias: &str) -> Self {
        if self.table.is_none() {
            self.table = Some(alias.to_string());
        }
        self
    }

    /// Render as a quoted SQL reference.
    pub fn to_sql(&self) -> String {
        match &self.table {
            Some(table) => format!("{}.{}", quote_ident(table), quote_ident(&self.name)),
            None => quote_ident(&self.name),
        }
    }

    fn leaf(&self) -> Box<Column> {
        Box::new(self.clone())
    }

    // ==================== Comparison ====================

    /// `column = value`
    pub fn eq(&self, value: impl Into<Value>) -> Expr {
        self.compare(CompareOp::Eq, value)
    }

    /// `column <> value`
    pub fn ne(&self, value: impl Into<Value>) -> Expr {
        self.compare(CompareOp::Ne, value)
    }

    /// `column < value`
    pub fn lt(&self, value: impl Into<Value>) -> Expr {
        self.compare(CompareOp::Lt, value)
    }

    /// `column <= value`
    pub fn le(&self, value: impl Into<Value>) -> Expr {
        self.compare(CompareOp::Le, value)
    }

    /// `column > value`
    pub fn gt(&self, value: impl Into<Value>) -> Expr {
        self.compare(CompareOp::Gt, value)
    }

    /// `column >= value`
    pub fn ge(&self, value: impl Into<Value>) -> Expr {
        self.compare(CompareOp::Ge, value)
    }

    fn compare(&self, op: CompareOp, value: impl Into<Value>) -> Expr {
        Expr::Compare {
            column: self.leaf(),
            op,
            value: value.into(),
        }
    }

    /// `column BETWEEN low AND high`
    pub fn between(&self, low: impl Into<Value>, high: impl Into<Value>) -> Expr {
        Expr::Between {
            column: self.leaf(),
            low: low.into(),
            high: high.into(),
        }
    }

    // ==================== Pattern matching ====================

    /// `column LIKE pattern`
    pub fn like(&self, pattern: impl Into<String>) -> Expr {
        self.pattern(pattern, false, false)
    }

    /// `column ILIKE pattern`
    pub fn ilike(&self, pattern: impl Into<String>) -> Expr {
        self.pattern(pattern, true, false)
    }

    /// `column NOT LIKE pattern`
    pub fn not_like(&self, pattern: impl Into<String>) -> Expr {
        self.pattern(pattern, false, true)
    }

    fn pattern(&self, pattern: impl Into<String>, case_insensitive: bool, negated: bool) -> Expr {
        Expr::Like {
            column: self.leaf(),
            pattern: pattern.into(),
            case_insensitive,
            negated,
        }
    }

    // ==================== Membership ====================

    /// `column IN (values...)`
    pub fn in_list<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Expr {
        Expr::InList {
            column: self.leaf(),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    /// `column NOT IN (values...)`
    pub fn not_in<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Expr {
        Expr::InList {
            column: self.leaf(),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    /// `column IS NULL`
    pub fn is_null(&self) -> Expr {
        Expr::IsNull {
            column: self.leaf(),
            negated: false,
        }
    }

    /// `column IS NOT NULL`
    pub fn is_not_null(&self) -> Expr {
        Expr::IsNull {
            column: self.leaf(),
            negated: true,
        }
    }

    // ==================== Arrays ====================

    /// The array column contains every given element (`@>`).
    pub fn array_contains<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Expr {
        self.array(ArrayOp::Contains, values)
    }

    /// Every element of the array column is among the given ones (`<@`).
    pub fn array_contained_by<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Expr {
        self.array(ArrayOp::ContainedBy, values)
    }

    /// The array column shares at least one element with the given ones (`&&`).
    pub fn array_overlaps<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Expr {
        self.array(ArrayOp::Overlaps, values)
    }

    fn array<V: Into<Value>>(&self, op: ArrayOp, values: impl IntoIterator<Item = V>) -> Expr {
        Expr::Array {
            column: self.leaf(),
            op,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    // ==================== JSON ====================

    /// The document has the top-level key (`?`).
    pub fn json_has_key(&self, key: impl Into<String>) -> Expr {
        self.json(JsonOp::HasKey(key.into()))
    }

    /// The document has at least one of the top-level keys (`?|`).
    pub fn json_has_any_key<K: Into<String>>(&self, keys: impl IntoIterator<Item = K>) -> Expr {
        self.json(JsonOp::HasAnyKey(keys.into_iter().map(Into::into).collect()))
    }

    /// The document has every one of the top-level keys (`?&`).
    pub fn json_has_all_keys<K: Into<String>>(&self, keys: impl IntoIterator<Item = K>) -> Expr {
        self.json(JsonOp::HasAllKeys(keys.into_iter().map(Into::into).collect()))
    }

    /// The document structurally contains `fragment` (`@>`).
    pub fn json_contains(&self, fragment: serde_json::Value) -> Expr {
        self.json(JsonOp::Contains(fragment))
    }

    /// A value exists at the key path (`#> path IS NOT NULL`).
    pub fn json_path_exists<K: Into<String>>(&self, path: impl IntoIterator<Item = K>) -> Expr {
        self.json(JsonOp::PathExists(path.into_iter().map(Into::into).collect()))
    }

    fn json(&self, op: JsonOp) -> Expr {
        Expr::Json {
            column: self.leaf(),
            op,
        }
    }

    // ==================== Ordering ====================

    /// Ascending order on this column.
    pub fn asc(&self) -> OrderBy {
        OrderBy {
            column: self.clone(),
            order: SortOrder::Asc,
        }
    }

    /// Descending order on this column.
    pub fn desc(&self) -> OrderBy {
        OrderBy {
            column: self.clone(),
            order: SortOrder::Desc,
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// Equal (=)
    Eq,
    /// Not equal (<>)
    Ne,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Le,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Ge,
}

impl CompareOp {
    /// SQL operator text.
    pub const fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Array operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayOp {
    /// `@>`
    Contains,
    /// `<@`
    ContainedBy,
    /// `&&`
    Overlaps,
}

impl ArrayOp {
    /// SQL operator text.
    pub const fn as_str(self) -> &'static str {
        match self {
            ArrayOp::Contains => "@>",
            ArrayOp::ContainedBy => "<@",
            ArrayOp::Overlaps => "&&",
        }
    }
}

/// JSON document operators.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonOp {
    /// Top-level key exists.
    HasKey(String),
    /// Any of the top-level keys exists.
    HasAnyKey(Vec<String>),
    /// All of the top-level keys exist.
    HasAllKeys(Vec<String>),
    /// Document contains the fragment.
    Contains(serde_json::Value),
    /// A value exists at the key path.
    PathExists(Vec<String>),
}

/// A boolean expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Constant TRUE or FALSE.
    Const(bool),
    /// `column <op> value`
    Compare {
        /// Left-hand column.
        column: Box<Column>,
        /// Operator.
        op: CompareOp,
        /// Literal operand.
        value: Value,
    },
    /// `left = right` between two columns, used for join conditions.
    ColumnEq {
        /// Left-hand column.
        left: Box<Column>,
        /// Right-hand column.
        right: Box<Column>,
    },
    /// `column BETWEEN low AND high`
    Between {
        /// Tested column.
        column: Box<Column>,
        /// Lower bound, inclusive.
        low: Value,
        /// Upper bound, inclusive.
        high: Value,
    },
    /// `column [NOT] [I]LIKE pattern`
    Like {
        /// Tested column.
        column: Box<Column>,
        /// SQL LIKE pattern (`%` and `_` wildcards).
        pattern: String,
        /// ILIKE instead of LIKE.
        case_insensitive: bool,
        /// NOT LIKE.
        negated: bool,
    },
    /// `column [NOT] IN (values...)`
    InList {
        /// Tested column.
        column: Box<Column>,
        /// Candidate values.
        values: Vec<Value>,
        /// NOT IN.
        negated: bool,
    },
    /// `column IS [NOT] NULL`
    IsNull {
        /// Tested column.
        column: Box<Column>,
        /// IS NOT NULL.
        negated: bool,
    },
    /// Array operator applied to an array column.
    Array {
        /// Array column.
        column: Box<Column>,
        /// Operator.
        op: ArrayOp,
        /// Right-hand array elements.
        values: Vec<Value>,
    },
    /// JSON operator applied to a document column.
    Json {
        /// Document column.
        column: Box<Column>,
        /// Operator and operands.
        op: JsonOp,
    },
    /// Conjunction of children.
    And(Vec<Expr>),
    /// Disjunction of children.
    Or(Vec<Expr>),
    /// Negation.
    Not(Box<Expr>),
}

impl Expr {
    /// Reference a column by name.
    pub fn col(name: impl Into<String>) -> Column {
        Column::new(name)
    }

    /// Reference a column of a specific table alias.
    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Column {
        Column::qualified(table, name)
    }

    /// Conjunction of all expressions; TRUE when empty.
    pub fn all(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        let children: Vec<Expr> = exprs.into_iter().collect();
        match children.len() {
            0 => Expr::Const(true),
            1 => children.into_iter().next().unwrap_or(Expr::Const(true)),
            _ => Expr::And(children),
        }
    }

    /// Disjunction of all expressions; FALSE when empty.
    pub fn any(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        let children: Vec<Expr> = exprs.into_iter().collect();
        match children.len() {
            0 => Expr::Const(false),
            1 => children.into_iter().next().unwrap_or(Expr::Const(false)),
            _ => Expr::Or(children),
        }
    }

    /// `self AND other`, flattening nested conjunctions.
    pub fn and(self, other: Expr) -> Expr {
        match (self, other) {
            (Expr::And(mut left), Expr::And(right)) => {
                left.extend(right);
                Expr::And(left)
            }
            (Expr::And(mut left), right) => {
                left.push(right);
                Expr::And(left)
            }
            (left, Expr::And(right)) => {
                let mut children = vec![left];
                children.extend(right);
                Expr::And(children)
            }
            (left, right) => Expr::And(vec![left, right]),
        }
    }

    /// `self OR other`, flattening nested disjunctions.
    pub fn or(self, other: Expr) -> Expr {
        match (self, other) {
            (Expr::Or(mut left), Expr::Or(right)) => {
                left.extend(right);
                Expr::Or(left)
            }
            (Expr::Or(mut left), right) => {
                left.push(right);
                Expr::Or(left)
            }
            (left, Expr::Or(right)) => {
                let mut children = vec![left];
                children.extend(right);
                Expr::Or(children)
            }
            (left, right) => Expr::Or(vec![left, right]),
        }
    }

    /// `NOT self`
    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    /// Every column referenced by this tree.
    pub fn columns(&self) -> Vec<&Column> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a Column>) {
        match self {
            Expr::Const(_) => {}
            Expr::Compare { column, .. }
            | Expr::Between { column, .. }
            | Expr::Like { column, .. }
            | Expr::InList { column, .. }
            | Expr::IsNull { column, .. }
            | Expr::Array { column, .. }
            | Expr::Json { column, .. } => out.push(column),
            Expr::ColumnEq { left, right } => {
                out.push(left);
                out.push(right);
            }
            Expr::And(children) | Expr::Or(children) => {
                for child in children {
                    child.collect_columns(out);
                }
            }
            Expr::Not(inner) => inner.collect_columns(out),
        }
    }

    /// Qualify every unqualified column with `alias`.
    pub fn qualify(self, alias: &str) -> Expr {
        self.map_columns(&mut |c| c.qualify(alias))
    }

    fn map_columns(self, f: &mut impl FnMut(Column) -> Column) -> Expr {
        let mut leaf = |column: Box<Column>| Box::new(f(*column));
        match self {
            Expr::Const(b) => Expr::Const(b),
            Expr::Compare { column, op, value } => Expr::Compare {
                column: leaf(column),
                op,
                value,
            },
            Expr::ColumnEq { left, right } => Expr::ColumnEq {
                left: leaf(left),
                right: leaf(right),
            },
            Expr::Between { column, low, high } => Expr::Between {
                column: leaf(column),
                low,
                high,
            },
            Expr::Like {
                column,
                pattern,
                case_insensitive,
                negated,
            } => Expr::Like {
                column: leaf(column),
                pattern,
                case_insensitive,
                negated,
            },
            Expr::InList {
                column,
                values,
                negated,
            } => Expr::InList {
                column: leaf(column),
                values,
                negated,
            },
            Expr::IsNull { column, negated } => Expr::IsNull {
                column: leaf(column),
                negated,
            },
            Expr::Array { column, op, values } => Expr::Array {
                column: leaf(column),
                op,
                values,
            },
            Expr::Json { column, op } => Expr::Json {
                column: leaf(column),
                op,
            },
            Expr::And(children) => {
                Expr::And(children.into_iter().map(|c| c.map_columns(f)).collect())
            }
            Expr::Or(children) => Expr::Or(children.into_iter().map(|c| c.map_columns(f)).collect()),
            Expr::Not(inner) => Expr::Not(Box::new(inner.map_columns(f))),
        }
    }

    /// Render to PostgreSQL text, appending literals to `params` and
    /// referencing them as `$n`.
    pub fn build(&self, params: &mut Vec<Value>) -> String {
        match self {
            Expr::Const(true) => "TRUE".to_string(),
            Expr::Const(false) => "FALSE".to_string(),
            Expr::Compare { column, op, value } => {
                format!("{} {} {}", column.to_sql(), op.as_str(), bind(params, value.clone()))
            }
            Expr::ColumnEq { left, right } => format!("{} = {}", left.to_sql(), right.to_sql()),
            Expr::Between { column, low, high } => format!(
                "{} BETWEEN {} AND {}",
                column.to_sql(),
                bind(params, low.clone()),
                bind(params, high.clone())
            ),
            Expr::Like {
                column,
                pattern,
                case_insensitive,
                negated,
            } => {
                let op = match (*negated, *case_insensitive) {
                    (false, false) => "LIKE",
                    (false, true) => "ILIKE",
                    (true, false) => "NOT LIKE",
                    (true, true) => "NOT ILIKE",
                };
                format!(
                    "{} {op} {}",
                    column.to_sql(),
                    bind(params, Value::Text(pattern.clone()))
                )
            }
            Expr::InList {
                column,
                values,
                negated,
            } => {
                if values.is_empty() {
                    return if *negated { "TRUE" } else { "FALSE" }.to_string();
                }
                let placeholders: Vec<String> =
                    values.iter().map(|v| bind(params, v.clone())).collect();
                let op = if *negated { "NOT IN" } else { "IN" };
                format!("{} {op} ({})", column.to_sql(), placeholders.join(", "))
            }
            Expr::IsNull { column, negated } => {
                let op = if *negated { "IS NOT NULL" } else { "IS NULL" };
                format!("{} {op}", column.to_sql())
            }
            Expr::Array { column, op, values } => format!(
                "{} {} {}",
                column.to_sql(),
                op.as_str(),
                bind(params, Value::Array(values.clone()))
            ),
            Expr::Json { column, op } => {
                let col = column.to_sql();
                match op {
                    JsonOp::HasKey(key) => {
                        format!("{col} ? {}", bind(params, Value::Text(key.clone())))
                    }
                    JsonOp::HasAnyKey(keys) => {
                        format!("{col} ?| {}", bind(params, text_array(keys)))
                    }
                    JsonOp::HasAllKeys(keys) => {
                        format!("{col} ?& {}", bind(params, text_array(keys)))
                    }
                    JsonOp::Contains(fragment) => format!(
                        "{col} @> {}::jsonb",
                        bind(params, Value::Json(fragment.clone()))
                    ),
                    JsonOp::PathExists(path) => {
                        format!("{col} #> {} IS NOT NULL", bind(params, text_array(path)))
                    }
                }
            }
            Expr::And(children) => join(children, " AND ", "TRUE", params),
            Expr::Or(children) => join(children, " OR ", "FALSE", params),
            Expr::Not(inner) => format!("NOT ({})", inner.build(params)),
        }
    }
}

fn bind(params: &mut Vec<Value>, value: Value) -> String {
    params.push(value);
    format!("${}", params.len())
}

fn text_array(items: &[String]) -> Value {
    Value::Array(items.iter().map(|s| Value::Text(s.clone())).collect())
}

fn join(children: &[Expr], separator: &str, empty: &str, params: &mut Vec<Value>) -> String {
    if children.is_empty() {
        return empty.to_string();
    }
    let parts: Vec<String> = children
        .iter()
        .map(|c| format!("({})", c.build(params)))
        .collect();
    parts.join(separator)
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

/// One ORDER BY term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Sorted column.
    pub column: Column,
    /// Direction.
    pub order: SortOrder,
}

impl OrderBy {
    /// Ascending order on a column.
    pub fn asc(column: impl Into<String>) -> Self {
        Column::new(column).asc()
    }

    /// Descending order on a column.
    pub fn desc(column: impl Into<String>) -> Self {
        Column::new(column).desc()
    }

    /// Qualify the column with `alias` unless already qualified.
    pub fn qualify(self, alias: &str) -> Self {
        Self {
            column: self.column.qualify(alias),
            order: self.order,
        }
    }

    /// Render as SQL. NULLs sort last in both directions.
    pub fn to_sql(&self) -> String {
        let dir = match self.order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        format!("{} {dir} NULLS LAST", self.column.to_sql())
    }
}
