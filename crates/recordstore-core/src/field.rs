//! Field and column definitions.
//!
//! A [`FieldDescriptor`] describes one field of a mapped type. Field kinds are
//! a closed classification resolved when the schema is built, so the runtime
//! dispatches on [`FieldKind`] instead of inspecting Rust types. Inline fields
//! embed another group of fields and are flattened into their parent's
//! columns.

use crate::identifiers::default_column_name;

/// SQL scalar types understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    /// BOOLEAN
    Bool,
    /// INTEGER
    Int,
    /// BIGINT
    BigInt,
    /// DOUBLE PRECISION
    Double,
    /// TEXT
    Text,
    /// BYTEA
    Bytes,
    /// UUID
    Uuid,
    /// TIMESTAMPTZ
    Timestamp,
}

impl SqlType {
    /// PostgreSQL type name.
    pub const fn sql_name(&self) -> &'static str {
        match self {
            SqlType::Bool => "boolean",
            SqlType::Int => "integer",
            SqlType::BigInt => "bigint",
            SqlType::Double => "double precision",
            SqlType::Text => "text",
            SqlType::Bytes => "bytea",
            SqlType::Uuid => "uuid",
            SqlType::Timestamp => "timestamptz",
        }
    }
}

/// Semantic kind of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// A single scalar column.
    Scalar(SqlType),
    /// A native array column of scalars.
    Array(SqlType),
    /// A JSON document column.
    Json,
    /// An embedded group of fields stored as columns of the owning table.
    Inline(Vec<FieldDescriptor>),
}

/// Metadata about a model field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Field name on the application type.
    pub name: String,
    /// Explicit column name; `None` means the snake_case field name.
    pub column_override: Option<String>,
    /// Semantic kind.
    pub kind: FieldKind,
    /// Whether the column accepts NULL.
    pub nullable: bool,
    /// Whether this field is the primary key.
    pub primary_key: bool,
    /// Whether the store generates the key on insert.
    pub auto_increment: bool,
}

impl FieldDescriptor {
    /// Create a field of the given kind.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            column_override: None,
            kind,
            nullable: false,
            primary_key: false,
            auto_increment: false,
        }
    }

    /// A scalar field.
    pub fn scalar(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self::new(name, FieldKind::Scalar(sql_type))
    }

    /// An array-of-scalar field.
    pub fn array(name: impl Into<String>, element: SqlType) -> Self {
        Self::new(name, FieldKind::Array(element))
    }

    /// A JSON document field.
    pub fn json(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Json)
    }

    /// An inline-embedded group of fields.
    pub fn inline(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self::new(name, FieldKind::Inline(fields))
    }

    /// Override the column name.
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.column_override = Some(name.into());
        self
    }

    /// Set the nullable flag.
    pub fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    /// Mark as the primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Mark the primary key as generated by the store.
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Effective column name.
    pub fn column_name(&self) -> String {
        self.column_override
            .clone()
            .unwrap_or_else(|| default_column_name(&self.name))
    }

    /// Flatten this field into the columns it occupies.
    ///
    /// Inline children are prefixed with the inline field's column name.
    pub fn flatten(&self) -> Vec<ColumnDescriptor> {
        let column = self.column_name();
        match &self.kind {
            FieldKind::Scalar(t) => vec![ColumnDescriptor::new(column, ColumnKind::Scalar(*t), self)],
            FieldKind::Array(t) => vec![ColumnDescriptor::new(column, ColumnKind::Array(*t), self)],
            FieldKind::Json => vec![ColumnDescriptor::new(column, ColumnKind::Json, self)],
            FieldKind::Inline(children) => children
                .iter()
                .flat_map(FieldDescriptor::flatten)
                .map(|mut c| {
                    c.name = format!("{column}_{}", c.name);
                    c.nullable |= self.nullable;
                    c
                })
                .collect(),
        }
    }
}

/// Storage kind of a flattened column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Scalar column.
    Scalar(SqlType),
    /// Native array column.
    Array(SqlType),
    /// JSON document column.
    Json,
}

/// A physical column of a model's table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,
    /// Storage kind.
    pub kind: ColumnKind,
    /// Whether the column accepts NULL.
    pub nullable: bool,
}

impl ColumnDescriptor {
    fn new(name: String, kind: ColumnKind, field: &FieldDescriptor) -> Self {
        Self {
            name,
            kind,
            nullable: field.nullable,
        }
    }

    /// SQL type name for DDL and casts.
    pub fn sql_type_name(&self) -> String {
        match self.kind {
            ColumnKind::Scalar(t) => t.sql_name().to_string(),
            ColumnKind::Array(t) => format!("{}[]", t.sql_name()),
            ColumnKind::Json => "jsonb".to_string(),
        }
    }
}
