//! Relationship graph - immutable entity-to-relationships metadata
//!
//! Built exactly once from schema metadata, then read concurrently without
//! locking. The graph owns every [`RelationshipDescriptor`] and is the single
//! source of truth the path resolver walks.

pub mod descriptor;

pub use descriptor::{
    AssociationRef, EntityMetadata, ForeignKeyDef, RelationshipDef, RelationshipDescriptor,
    RelationshipKind, Via,
};

use std::collections::HashMap;

use crate::error::{AutoloadError, AutoloadResult};

/// One entity type's node in the graph
#[derive(Debug, Clone)]
pub struct EntityNode {
    pub entity: String,
    pub table: String,
    pub primary_key: String,
    /// Descriptors in declaration order; relationship keys are unique
    pub relationships: Vec<RelationshipDescriptor>,
    by_key: HashMap<String, usize>,
    /// Foreign-key columns on this table that reference its own primary key
    pub self_fk_candidates: Vec<String>,
}

impl EntityNode {
    /// Look up a relationship by key
    pub fn relationship(&self, key: &str) -> Option<&RelationshipDescriptor> {
        self.by_key.get(key).map(|&idx| &self.relationships[idx])
    }
}

/// Immutable mapping from entity type to its relationship descriptors
#[derive(Debug, Clone)]
pub struct RelationshipGraph {
    entities: HashMap<String, EntityNode>,
}

impl RelationshipGraph {
    /// Build the graph from schema metadata
    ///
    /// Fails with [`AutoloadError::Schema`] when two relationships on the
    /// same entity share a key, when a relationship targets an unknown
    /// entity, when a non-self-referential declaration is missing its
    /// foreign key, or when a self-referential relationship exists but the
    /// entity's table carries no candidate self foreign key at all.
    pub fn build(metadata: Vec<EntityMetadata>) -> AutoloadResult<Self> {
        let tables: HashMap<String, (String, String)> = metadata
            .iter()
            .map(|entity| {
                (
                    entity.entity.clone(),
                    (entity.table.clone(), entity.primary_key.clone()),
                )
            })
            .collect();

        let mut entities = HashMap::new();
        for entity in metadata {
            let self_fk_candidates: Vec<String> = entity
                .foreign_keys
                .iter()
                .filter(|fk| {
                    fk.references_table == entity.table && fk.references_column == entity.primary_key
                })
                .map(|fk| fk.column.clone())
                .collect();

            let mut relationships = Vec::with_capacity(entity.relationships.len());
            let mut by_key = HashMap::new();
            for def in entity.relationships {
                if by_key.contains_key(&def.key) {
                    return Err(AutoloadError::Schema(format!(
                        "duplicate relationship key '{}' on entity '{}'",
                        def.key, entity.entity
                    )));
                }

                let (target_table, target_primary_key) =
                    tables.get(&def.target).cloned().ok_or_else(|| {
                        AutoloadError::Schema(format!(
                            "relationship '{}' on entity '{}' targets unknown entity '{}'",
                            def.key, entity.entity, def.target
                        ))
                    })?;

                let self_referential = def.target == entity.entity;
                let kind = match (def.to_many, def.association) {
                    (false, None) => RelationshipKind::ToOne,
                    (true, None) => RelationshipKind::ToMany { via: Via::Direct },
                    (true, Some(assoc)) => RelationshipKind::ToMany {
                        via: Via::Association(assoc),
                    },
                    (false, Some(_)) => {
                        return Err(AutoloadError::Schema(format!(
                            "relationship '{}' on entity '{}' is to-one but declares \
                             an association table",
                            def.key, entity.entity
                        )));
                    }
                };

                let needs_explicit_fk = !self_referential
                    && !matches!(
                        kind,
                        RelationshipKind::ToMany {
                            via: Via::Association(_)
                        }
                    );
                if needs_explicit_fk && def.foreign_key.is_none() {
                    return Err(AutoloadError::Schema(format!(
                        "relationship '{}' on entity '{}' is missing its foreign key",
                        def.key, entity.entity
                    )));
                }
                if self_referential && def.foreign_key.is_none() && self_fk_candidates.is_empty() {
                    return Err(AutoloadError::Schema(format!(
                        "self-referential relationship '{}' on entity '{}' but table '{}' \
                         has no foreign key onto itself",
                        def.key, entity.entity, entity.table
                    )));
                }

                by_key.insert(def.key.clone(), relationships.len());
                relationships.push(RelationshipDescriptor {
                    key: def.key,
                    source: entity.entity.clone(),
                    target: def.target,
                    target_table,
                    target_primary_key,
                    kind,
                    foreign_key: def.foreign_key,
                    self_referential,
                });
            }

            entities.insert(
                entity.entity.clone(),
                EntityNode {
                    entity: entity.entity,
                    table: entity.table,
                    primary_key: entity.primary_key,
                    relationships,
                    by_key,
                    self_fk_candidates,
                },
            );
        }

        Ok(Self { entities })
    }

    /// Look up an entity node
    pub fn entity(&self, entity: &str) -> AutoloadResult<&EntityNode> {
        self.entities
            .get(entity)
            .ok_or_else(|| AutoloadError::UnknownEntity(entity.to_string()))
    }

    /// Look up a relationship descriptor by entity and key
    pub fn lookup(&self, entity: &str, key: &str) -> AutoloadResult<&RelationshipDescriptor> {
        self.entity(entity)?
            .relationship(key)
            .ok_or_else(|| AutoloadError::UnknownRelationship {
                entity: entity.to_string(),
                key: key.to_string(),
            })
    }

    /// Resolve the foreign-key column used by a self-referential relationship
    ///
    /// An explicit hint wins (and is validated against the candidates); with
    /// no hint, exactly one candidate is auto-detected; more than one fails
    /// with [`AutoloadError::AmbiguousSelfReference`].
    pub fn self_reference_column(
        &self,
        entity: &str,
        hint: Option<&str>,
    ) -> AutoloadResult<String> {
        let node = self.entity(entity)?;
        if let Some(hint) = hint {
            if !node.self_fk_candidates.iter().any(|c| c == hint) {
                return Err(AutoloadError::Configuration(format!(
                    "self_reference_hint '{}' is not a self foreign key of entity '{}' \
                     (candidates: {:?})",
                    hint, entity, node.self_fk_candidates
                )));
            }
            return Ok(hint.to_string());
        }

        match node.self_fk_candidates.as_slice() {
            [single] => Ok(single.clone()),
            [] => Err(AutoloadError::Schema(format!(
                "entity '{}' has no self foreign key",
                entity
            ))),
            candidates => Err(AutoloadError::AmbiguousSelfReference {
                entity: entity.to_string(),
                candidates: candidates.to_vec(),
            }),
        }
    }

    /// Number of entity types in the graph
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if the graph holds no entities
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
