//! Schema metadata: model descriptors and the validated schema that holds them.
//!
//! A [`Schema`] is built once through [`SchemaBuilder`], validated, and then
//! shared read-only (usually as `Arc<Schema>`) by every store and query. It is
//! the stable contract between whatever produced the metadata (a generator or
//! hand-written code) and the runtime engine.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::field::{ColumnDescriptor, FieldDescriptor, FieldKind};
use crate::identifiers::{default_table_name, is_valid_identifier};
use crate::relationship::{Direction, RelationshipDescriptor, RelationshipKind};

/// The primary key of a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKeyDescriptor {
    /// Field name.
    pub field: String,
    /// Column name.
    pub column: String,
    /// Whether the store generates the key on insert.
    pub auto_increment: bool,
}

/// Immutable description of one mapped type.
#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    name: String,
    table: String,
    fields: Vec<FieldDescriptor>,
    columns: Vec<ColumnDescriptor>,
    primary_key: PrimaryKeyDescriptor,
    relationships: Vec<RelationshipDescriptor>,
    managed_columns: Vec<String>,
}

impl ModelDescriptor {
    /// Start describing a model.
    pub fn builder(name: impl Into<String>) -> ModelBuilder {
        ModelBuilder {
            name: name.into(),
            table: None,
            fields: Vec::new(),
            relationships: Vec::new(),
        }
    }

    /// Model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Declared fields, in order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Flattened mapped columns, in declaration order.
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Names of the mapped columns.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Look up a mapped column.
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Position of a mapped column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// The primary key.
    pub fn primary_key(&self) -> &PrimaryKeyDescriptor {
        &self.primary_key
    }

    /// Declared relationships.
    pub fn relationships(&self) -> &[RelationshipDescriptor] {
        &self.relationships
    }

    /// Look up a relationship by name.
    pub fn relationship(&self, name: &str) -> Option<&RelationshipDescriptor> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// Foreign key columns on this table that the engine writes on behalf of
    /// relationships and that are not mapped columns.
    pub fn managed_columns(&self) -> &[String] {
        &self.managed_columns
    }

    /// Whether `column` exists on this table, mapped or managed.
    pub fn has_column(&self, column: &str) -> bool {
        self.column(column).is_some() || self.managed_columns.iter().any(|c| c == column)
    }
}

/// Builder for a [`ModelDescriptor`].
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    name: String,
    table: Option<String>,
    fields: Vec<FieldDescriptor>,
    relationships: Vec<RelationshipDescriptor>,
}

impl ModelBuilder {
    /// Override the table name (defaults to the snake_case model name).
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Add a field.
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Add a relationship.
    pub fn relationship(mut self, relationship: RelationshipDescriptor) -> Self {
        self.relationships.push(relationship);
        self
    }

    fn resolve(self) -> Result<ModelDescriptor> {
        let table = self
            .table
            .unwrap_or_else(|| default_table_name(&self.name));
        ensure_identifier(&table, &self.name)?;

        let keys: Vec<&FieldDescriptor> = self.fields.iter().filter(|f| f.primary_key).collect();
        let key = match keys.as_slice() {
            [key] => *key,
            [] => {
                return Err(Error::schema(format!(
                    "model `{}` has no primary key",
                    self.name
                )));
            }
            _ => {
                return Err(Error::schema(format!(
                    "model `{}` declares {} primary keys; exactly one is required",
                    self.name,
                    keys.len()
                )));
            }
        };
        if !matches!(key.kind, FieldKind::Scalar(_)) {
            return Err(Error::schema(format!(
                "primary key `{}` of model `{}` must be a scalar field",
                key.name, self.name
            )));
        }
        let primary_key = PrimaryKeyDescriptor {
            field: key.name.clone(),
            column: key.column_name(),
            auto_increment: key.auto_increment,
        };

        let columns: Vec<ColumnDescriptor> =
            self.fields.iter().flat_map(FieldDescriptor::flatten).collect();
        let mut seen = HashSet::new();
        for column in &columns {
            ensure_identifier(&column.name, &self.name)?;
            if !seen.insert(column.name.as_str()) {
                return Err(Error::schema(format!(
                    "model `{}` maps column `{}` twice",
                    self.name, column.name
                )));
            }
        }

        let mut relationships = self.relationships;
        let mut names = HashSet::new();
        for rel in &mut relationships {
            if !names.insert(rel.name.clone()) {
                return Err(Error::schema(format!(
                    "model `{}` declares relationship `{}` twice",
                    self.name, rel.name
                )));
            }
            if rel.kind == RelationshipKind::OneToMany && rel.direction == Direction::Forward {
                return Err(Error::schema(format!(
                    "one-to-many relationship `{}.{}` cannot store its foreign key on the owner",
                    self.name, rel.name
                )));
            }
            let fk = rel.foreign_key_column(&self.name);
            ensure_identifier(&fk, &self.name)?;
            rel.foreign_key_override = Some(fk);
        }

        Ok(ModelDescriptor {
            name: self.name,
            table,
            fields: self.fields,
            columns,
            primary_key,
            relationships,
            managed_columns: Vec::new(),
        })
    }
}

fn ensure_identifier(name: &str, model: &str) -> Result<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(Error::schema(format!(
            "`{name}` in model `{model}` is not a valid SQL identifier"
        )))
    }
}

/// A validated, read-only collection of model descriptors.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    models: HashMap<String, Arc<ModelDescriptor>>,
    order: Vec<String>,
}

impl Schema {
    /// Start building a schema.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Look up a model by name.
    pub fn model(&self, name: &str) -> Result<&Arc<ModelDescriptor>> {
        self.models
            .get(name)
            .ok_or_else(|| Error::schema(format!("unknown model `{name}`")))
    }

    /// The target model of a relationship.
    pub fn target(&self, relationship: &RelationshipDescriptor) -> Result<&Arc<ModelDescriptor>> {
        self.model(&relationship.target)
    }

    /// All models, in registration order.
    pub fn models(&self) -> impl Iterator<Item = &Arc<ModelDescriptor>> {
        self.order.iter().filter_map(|name| self.models.get(name))
    }
}

/// Builder for a [`Schema`].
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    models: Vec<ModelBuilder>,
}

impl SchemaBuilder {
    /// Register a model.
    pub fn model(mut self, model: ModelBuilder) -> Self {
        self.models.push(model);
        self
    }

    /// Validate every model and relationship and freeze the schema.
    pub fn build(self) -> Result<Schema> {
        let mut resolved = Vec::with_capacity(self.models.len());
        let mut tables = HashSet::new();
        for model in self.models {
            let model = model.resolve()?;
            if resolved.iter().any(|m: &ModelDescriptor| m.name == model.name) {
                return Err(Error::schema(format!("model `{}` declared twice", model.name)));
            }
            if !tables.insert(model.table.clone()) {
                return Err(Error::schema(format!(
                    "table `{}` is mapped by more than one model",
                    model.table
                )));
            }
            resolved.push(model);
        }

        // Foreign keys per table: table -> (column -> relationship that owns it).
        let mut foreign_keys: HashMap<String, HashMap<String, String>> = HashMap::new();
        for owner in &resolved {
            for rel in &owner.relationships {
                let target = resolved
                    .iter()
                    .find(|m| m.name == rel.target)
                    .ok_or_else(|| {
                        Error::schema(format!(
                            "relationship `{}.{}` targets unknown model `{}`",
                            owner.name, rel.name, rel.target
                        ))
                    })?;
                let fk_table = match rel.direction {
                    Direction::Inverse => &target.table,
                    Direction::Forward => &owner.table,
                };
                let fk = rel.foreign_key_override.clone().unwrap_or_default();
                let label = format!("{}.{}", owner.name, rel.name);
                if let Some(previous) = foreign_keys
                    .entry(fk_table.clone())
                    .or_default()
                    .insert(fk.clone(), label.clone())
                {
                    return Err(Error::schema(format!(
                        "foreign key `{fk_table}.{fk}` is used by both `{previous}` and `{label}`"
                    )));
                }
            }
        }

        for model in &mut resolved {
            if let Some(fks) = foreign_keys.get(&model.table) {
                let mut managed: Vec<String> = fks
                    .keys()
                    .filter(|fk| model.column(fk).is_none())
                    .cloned()
                    .collect();
                managed.sort();
                model.managed_columns = managed;
            }
        }

        let order = resolved.iter().map(|m| m.name.clone()).collect();
        let models = resolved
            .into_iter()
            .map(|m| (m.name.clone(), Arc::new(m)))
            .collect();
        tracing::debug!(target: "recordstore::schema", ?order, "schema built");
        Ok(Schema { models, order })
    }
}
