//! Relationship metadata.
//!
//! Relationships are declared on the owning model and resolved when the
//! schema is built. Foreign keys always live in plain columns of one of the two
//! tables; there are no join tables for the kinds covered here.
//!
//! - [`Direction::Inverse`]: the related (target) table stores the foreign key,
//!   pointing at the owner's primary key. `Team -> players` is inverse: the
//!   `player` table has a `team_id` column.
//! - [`Direction::Forward`]: the owner's table stores the foreign key, pointing
//!   at the target's primary key. Only valid for one-to-one relationships.
//!
//! In both cases the engine writes the foreign key itself; the record type does
//! not need a field for it.

use crate::identifiers::default_foreign_key;

/// The type of relationship between two models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RelationshipKind {
    /// One owner has at most one related record.
    OneToOne,
    /// One owner has many related records.
    #[default]
    OneToMany,
}

/// Which side stores the foreign key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    /// The owner's table stores the foreign key.
    Forward,
    /// The related table stores the foreign key.
    #[default]
    Inverse,
}

/// Metadata about a relationship between models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipDescriptor {
    /// Name of the relationship slot on the owner.
    pub name: String,
    /// Kind of relationship.
    pub kind: RelationshipKind,
    /// Which side stores the foreign key.
    pub direction: Direction,
    /// Name of the target model.
    pub target: String,
    /// Explicit foreign key column; resolved to a default at schema build.
    pub foreign_key_override: Option<String>,
}

impl RelationshipDescriptor {
    /// Create a relationship with explicit kind and direction.
    pub fn new(
        name: impl Into<String>,
        kind: RelationshipKind,
        direction: Direction,
        target: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            direction,
            target: target.into(),
            foreign_key_override: None,
        }
    }

    /// One-to-one relationship whose foreign key lives on the target table.
    pub fn one_to_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationshipKind::OneToOne, Direction::Inverse, target)
    }

    /// One-to-many relationship; the foreign key lives on the target table.
    pub fn one_to_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationshipKind::OneToMany, Direction::Inverse, target)
    }

    /// Store the foreign key on the owner's table instead.
    pub fn forward(mut self) -> Self {
        self.direction = Direction::Forward;
        self
    }

    /// Override the foreign key column name.
    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key_override = Some(column.into());
        self
    }

    /// Effective foreign key column for a relationship declared on `owner`.
    ///
    /// Inverse relationships default to `<owner>_id` on the target table,
    /// forward ones to `<target>_id` on the owner's table.
    pub fn foreign_key_column(&self, owner: &str) -> String {
        if let Some(fk) = &self.foreign_key_override {
            return fk.clone();
        }
        match self.direction {
            Direction::Inverse => default_foreign_key(owner),
            Direction::Forward => default_foreign_key(&self.target),
        }
    }

    /// Whether related rows are fetched by a join with the owner's query.
    pub const fn is_joined(&self) -> bool {
        matches!(self.kind, RelationshipKind::OneToOne)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_kind_default() {
        assert_eq!(RelationshipKind::default(), RelationshipKind::OneToMany);
        assert_eq!(Direction::default(), Direction::Inverse);
    }

    #[test]
    fn test_foreign_key_defaults() {
        let pets = RelationshipDescriptor::one_to_many("pets", "Pet");
        assert_eq!(pets.foreign_key_column("Person"), "person_id");

        let owner = RelationshipDescriptor::one_to_one("owner", "Person").forward();
        assert_eq!(owner.foreign_key_column("Pet"), "person_id");

        let custom = RelationshipDescriptor::one_to_many("pets", "Pet").foreign_key("keeper_id");
        assert_eq!(custom.foreign_key_column("Person"), "keeper_id");
    }

    #[test]
    fn test_builder_chain() {
        let rel = RelationshipDescriptor::one_to_one("profile", "Profile");
        assert_eq!(rel.kind, RelationshipKind::OneToOne);
        assert_eq!(rel.direction, Direction::Inverse);
        assert!(rel.is_joined());
        assert!(!RelationshipDescriptor::one_to_many("pets", "Pet").is_joined());
    }
}
