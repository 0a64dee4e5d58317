//! Statement IR handed to the execution capability.
//!
//! Each statement carries its operator tree and literal parameters. Drivers
//! for SQL servers call `build()` to get PostgreSQL text with `$n`
//! placeholders; other drivers may interpret the IR directly.
//!
//! Column lists on [`Select`] are positional: row `i` of a cursor holds the
//! value of `columns[i]` at index `i`.

use recordstore_core::{Value, quote_ident};

use crate::expr::{Column, Expr, OrderBy};

/// A `LEFT JOIN` of another table.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// Joined table.
    pub table: String,
    /// Alias of the joined table.
    pub alias: String,
    /// Join condition.
    pub on: Expr,
}

impl Join {
    /// `LEFT JOIN table AS alias ON left = right`, with `extra` ANDed in.
    pub fn left(
        table: impl Into<String>,
        alias: impl Into<String>,
        left: Column,
        right: Column,
    ) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
            on: Expr::ColumnEq {
                left: Box::new(left),
                right: Box::new(right),
            },
        }
    }

    /// AND an additional condition into the join.
    pub fn and_on(mut self, extra: Expr) -> Self {
        self.on = self.on.and(extra);
        self
    }
}

/// SELECT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    /// Root table.
    pub table: String,
    /// Alias of the root table.
    pub alias: String,
    /// Selected columns, in result order.
    pub columns: Vec<Column>,
    /// Left joins.
    pub joins: Vec<Join>,
    /// WHERE condition.
    pub filter: Option<Expr>,
    /// ORDER BY terms.
    pub order_by: Vec<OrderBy>,
    /// LIMIT.
    pub limit: Option<u64>,
    /// OFFSET.
    pub offset: Option<u64>,
}

impl Select {
    /// Select from `table` aliased as `alias`.
    pub fn new(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
            columns: Vec::new(),
            joins: Vec::new(),
            filter: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Build the SQL text and parameters.
    pub fn build(&self) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let columns: Vec<String> = self.columns.iter().map(Column::to_sql).collect();
        let mut sql = format!(
            "SELECT {} FROM {} AS {}",
            if columns.is_empty() {
                "*".to_string()
            } else {
                columns.join(", ")
            },
            quote_ident(&self.table),
            quote_ident(&self.alias)
        );
        push_joins(&mut sql, &self.joins, &mut params);
        if let Some(filter) = &self.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&filter.build(&mut params));
        }
        if !self.order_by.is_empty() {
            let terms: Vec<String> = self.order_by.iter().map(OrderBy::to_sql).collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
        (sql, params)
    }
}

fn push_joins(sql: &mut String, joins: &[Join], params: &mut Vec<Value>) {
    for join in joins {
        sql.push_str(&format!(
            " LEFT JOIN {} AS {} ON {}",
            quote_ident(&join.table),
            quote_ident(&join.alias),
            join.on.build(params)
        ));
    }
}

/// `SELECT COUNT(*)` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Count {
    /// Counted table.
    pub table: String,
    /// Alias of the table.
    pub alias: String,
    /// Left joins the filter may refer to.
    pub joins: Vec<Join>,
    /// WHERE condition.
    pub filter: Option<Expr>,
}

impl Count {
    /// Build the SQL text and parameters.
    pub fn build(&self) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let mut sql = format!(
            "SELECT COUNT(*) FROM {} AS {}",
            quote_ident(&self.table),
            quote_ident(&self.alias)
        );
        push_joins(&mut sql, &self.joins, &mut params);
        if let Some(filter) = &self.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&filter.build(&mut params));
        }
        (sql, params)
    }
}

/// INSERT statement for one row.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    /// Target table.
    pub table: String,
    /// Column names.
    pub columns: Vec<String>,
    /// Values, aligned with `columns`.
    pub values: Vec<Value>,
    /// Column whose generated value is returned.
    pub returning: Option<String>,
}

impl Insert {
    /// Insert into `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            values: Vec::new(),
            returning: None,
        }
    }

    /// Add a column value.
    pub fn value(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.push(column.into());
        self.values.push(value.into());
        self
    }

    /// Return the generated value of `column`.
    pub fn returning(mut self, column: impl Into<String>) -> Self {
        self.returning = Some(column.into());
        self
    }

    /// Build the SQL text and parameters.
    pub fn build(&self) -> (String, Vec<Value>) {
        let mut sql = if self.columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote_ident(&self.table))
        } else {
            let columns: Vec<String> = self.columns.iter().map(|c| quote_ident(c)).collect();
            let placeholders: Vec<String> =
                (1..=self.values.len()).map(|i| format!("${i}")).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(&self.table),
                columns.join(", "),
                placeholders.join(", ")
            )
        };
        if let Some(column) = &self.returning {
            sql.push_str(" RETURNING ");
            sql.push_str(&quote_ident(column));
        }
        (sql, self.values.clone())
    }
}

/// UPDATE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    /// Target table.
    pub table: String,
    /// `SET column = value` pairs.
    pub assignments: Vec<(String, Value)>,
    /// WHERE condition.
    pub filter: Expr,
}

impl Update {
    /// Build the SQL text and parameters.
    pub fn build(&self) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let sets: Vec<String> = self
            .assignments
            .iter()
            .map(|(column, value)| {
                params.push(value.clone());
                format!("{} = ${}", quote_ident(column), params.len())
            })
            .collect();
        let filter = self.filter.build(&mut params);
        (
            format!(
                "UPDATE {} SET {} WHERE {filter}",
                quote_ident(&self.table),
                sets.join(", ")
            ),
            params,
        )
    }
}

/// DELETE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    /// Target table.
    pub table: String,
    /// WHERE condition.
    pub filter: Expr,
}

impl Delete {
    /// Build the SQL text and parameters.
    pub fn build(&self) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let filter = self.filter.build(&mut params);
        (
            format!("DELETE FROM {} WHERE {filter}", quote_ident(&self.table)),
            params,
        )
    }
}

/// A write statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// INSERT.
    Insert(Insert),
    /// UPDATE.
    Update(Update),
    /// DELETE.
    Delete(Delete),
}

impl Statement {
    /// Target table.
    pub fn table(&self) -> &str {
        match self {
            Statement::Insert(s) => &s.table,
            Statement::Update(s) => &s.table,
            Statement::Delete(s) => &s.table,
        }
    }

    /// Build the SQL text and parameters.
    pub fn build(&self) -> (String, Vec<Value>) {
        match self {
            Statement::Insert(s) => s.build(),
            Statement::Update(s) => s.build(),
            Statement::Delete(s) => s.build(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_with_join() {
        let mut select = Select::new("person", "t0");
        select.columns = vec![
            Column::qualified("t0", "id"),
            Column::qualified("r0", "bio"),
        ];
        select.joins.push(
            Join::left(
                "profile",
                "r0",
                Column::qualified("r0", "person_id"),
                Column::qualified("t0", "id"),
            )
            .and_on(Expr::qualified("r0", "public").eq(true)),
        );
        select.filter = Some(Expr::qualified("t0", "age").ge(18));
        select.order_by.push(OrderBy::asc("name").qualify("t0"));
        select.limit = Some(10);
        select.offset = Some(20);

        let (sql, params) = select.build();
        assert_eq!(
            sql,
            "SELECT \"t0\".\"id\", \"r0\".\"bio\" FROM \"person\" AS \"t0\" \
             LEFT JOIN \"profile\" AS \"r0\" ON (\"r0\".\"person_id\" = \"t0\".\"id\") AND (\"r0\".\"public\" = $1) \
             WHERE \"t0\".\"age\" >= $2 ORDER BY \"t0\".\"name\" ASC NULLS LAST LIMIT 10 OFFSET 20"
        );
        assert_eq!(params, vec![Value::Bool(true), Value::Int(18)]);
    }

    #[test]
    fn test_insert_returning() {
        let insert = Insert::new("person")
            .value("name", Value::from("Ann"))
            .value("age", Value::Int(30))
            .returning("id");
        let (sql, params) = insert.build();
        assert_eq!(
            sql,
            "INSERT INTO \"person\" (\"name\", \"age\") VALUES ($1, $2) RETURNING \"id\""
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_update_and_delete() {
        let update = Update {
            table: "person".into(),
            assignments: vec![("name".into(), Value::from("Bo"))],
            filter: Expr::col("id").eq(7i64),
        };
        let (sql, params) = update.build();
        assert_eq!(sql, "UPDATE \"person\" SET \"name\" = $1 WHERE \"id\" = $2");
        assert_eq!(params, vec![Value::from("Bo"), Value::BigInt(7)]);

        let delete = Statement::Delete(Delete {
            table: "pet".into(),
            filter: Expr::col("person_id").eq(7i64),
        });
        assert_eq!(delete.table(), "pet");
        assert_eq!(
            delete.build().0,
            "DELETE FROM \"pet\" WHERE \"person_id\" = $1"
        );
    }

    #[test]
    fn test_count() {
        let count = Count {
            table: "person".into(),
            alias: "t0".into(),
            joins: Vec::new(),
            filter: None,
        };
        assert_eq!(count.build().0, "SELECT COUNT(*) FROM \"person\" AS \"t0\"");
    }
}
