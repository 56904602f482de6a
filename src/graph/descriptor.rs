//! Relationship descriptors - metadata for a single relationship
//!
//! Descriptors are created once while the graph is built and never mutated
//! afterwards; the compiler only reads them.

use serde::{Deserialize, Serialize};

/// Cardinality and mechanism of a relationship, as a closed set of variants
/// so the strategy selector can match exhaustively
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipKind {
    /// Many-to-one or one-to-one; always loaded with a plain join
    ToOne,
    /// One-to-many or many-to-many
    ToMany { via: Via },
}

/// Mechanism connecting the two sides of a to-many relationship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Via {
    /// Foreign key on the target table referencing the source primary key
    Direct,
    /// Association table mediating a many-to-many relationship
    Association(AssociationRef),
}

/// Association-table reference for many-to-many relationships
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationRef {
    /// The association table name
    pub table: String,
    /// Column in the association table referencing the source primary key
    pub source_column: String,
    /// Column in the association table referencing the target primary key
    pub target_column: String,
}

impl AssociationRef {
    pub fn new(
        table: impl Into<String>,
        source_column: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            source_column: source_column.into(),
            target_column: target_column.into(),
        }
    }
}

/// One resolved relationship between two entity types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDescriptor {
    /// The name used in a load path
    pub key: String,
    /// Source entity type
    pub source: String,
    /// Target entity type
    pub target: String,
    /// Target entity's table
    pub target_table: String,
    /// Target entity's primary-key column
    pub target_primary_key: String,
    /// Cardinality and mechanism
    pub kind: RelationshipKind,
    /// Foreign-key column: on the target table for direct to-many, on the
    /// source table for to-one. `None` only for self-referential
    /// relationships whose column is resolved at compile time (hint or
    /// auto-detection).
    pub foreign_key: Option<String>,
    /// Source entity type equals target entity type
    pub self_referential: bool,
}

impl RelationshipDescriptor {
    /// Returns true if this relationship produces a collection
    pub fn is_collection(&self) -> bool {
        matches!(self.kind, RelationshipKind::ToMany { .. })
    }

    /// The association-table reference, if this is a many-to-many
    pub fn association(&self) -> Option<&AssociationRef> {
        match &self.kind {
            RelationshipKind::ToMany {
                via: Via::Association(assoc),
            } => Some(assoc),
            _ => None,
        }
    }
}

/// Relationship declaration supplied by the schema-metadata provider
///
/// Resolved into a [`RelationshipDescriptor`] when the graph is built
/// (target table and primary key are filled in from the target entity).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDef {
    pub key: String,
    pub target: String,
    pub to_many: bool,
    pub foreign_key: Option<String>,
    pub association: Option<AssociationRef>,
}

impl RelationshipDef {
    /// Declare a to-one relationship (many-to-one or one-to-one); the
    /// foreign key lives on the source table
    pub fn to_one(
        key: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            target: target.into(),
            to_many: false,
            foreign_key: Some(foreign_key.into()),
            association: None,
        }
    }

    /// Declare a direct one-to-many relationship; the foreign key lives on
    /// the target table
    pub fn to_many(
        key: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            target: target.into(),
            to_many: true,
            foreign_key: Some(foreign_key.into()),
            association: None,
        }
    }

    /// Declare a self-referential to-many with no explicit foreign key;
    /// the column is resolved at compile time
    pub fn to_many_self(key: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            target: target.into(),
            to_many: true,
            foreign_key: None,
            association: None,
        }
    }

    /// Declare a many-to-many relationship through an association table
    pub fn many_to_many(
        key: impl Into<String>,
        target: impl Into<String>,
        association: AssociationRef,
    ) -> Self {
        Self {
            key: key.into(),
            target: target.into(),
            to_many: true,
            foreign_key: None,
            association: Some(association),
        }
    }
}

/// Foreign-key declaration on an entity's table, used for self-reference
/// candidate detection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDef {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
}

impl ForeignKeyDef {
    pub fn new(
        column: impl Into<String>,
        references_table: impl Into<String>,
        references_column: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            references_table: references_table.into(),
            references_column: references_column.into(),
        }
    }
}

/// Full metadata for one entity type, supplied once at graph build time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub entity: String,
    pub table: String,
    pub primary_key: String,
    pub relationships: Vec<RelationshipDef>,
    pub foreign_keys: Vec<ForeignKeyDef>,
}

impl EntityMetadata {
    pub fn new(entity: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            table: table.into(),
            primary_key: "id".to_string(),
            relationships: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Override the primary-key column (defaults to `id`)
    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    /// Add a relationship declaration
    pub fn with_relationship(mut self, def: RelationshipDef) -> Self {
        self.relationships.push(def);
        self
    }

    /// Add a foreign-key declaration
    pub fn with_foreign_key(mut self, def: ForeignKeyDef) -> Self {
        self.foreign_keys.push(def);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_predicates() {
        let many = RelationshipDescriptor {
            key: "posts".to_string(),
            source: "User".to_string(),
            target: "Post".to_string(),
            target_table: "posts".to_string(),
            target_primary_key: "id".to_string(),
            kind: RelationshipKind::ToMany { via: Via::Direct },
            foreign_key: Some("user_id".to_string()),
            self_referential: false,
        };
        assert!(many.is_collection());
        assert!(many.association().is_none());

        let m2m = RelationshipDescriptor {
            kind: RelationshipKind::ToMany {
                via: Via::Association(AssociationRef::new("user_roles", "user_id", "role_id")),
            },
            ..many.clone()
        };
        assert_eq!(m2m.association().unwrap().table, "user_roles");

        let one = RelationshipDescriptor {
            kind: RelationshipKind::ToOne,
            ..many
        };
        assert!(!one.is_collection());
    }

    #[test]
    fn test_entity_metadata_builder() {
        let entity = EntityMetadata::new("User", "users")
            .with_primary_key("uuid")
            .with_relationship(RelationshipDef::to_many("posts", "Post", "user_id"))
            .with_foreign_key(ForeignKeyDef::new("company_id", "companies", "id"));

        assert_eq!(entity.primary_key, "uuid");
        assert_eq!(entity.relationships.len(), 1);
        assert_eq!(entity.foreign_keys.len(), 1);
    }
}
