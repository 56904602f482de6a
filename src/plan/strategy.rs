//! Strategy selection - loading technique per plan node
//!
//! Rule-based, not cost-based: the cardinality and the row cap fully
//! determine the technique. Shared-subquery detection runs as a second pass
//! over sibling groups once aliases are known.

use crate::config::UnboundedStrategy;
use crate::graph::{RelationshipDescriptor, RelationshipKind, Via};

use super::node::PlanNode;

/// Loading technique chosen for one plan node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Plain outer join; always used for to-one relationships
    Join,
    /// Correlated lateral subquery capped at the row limit
    BoundedSubquery,
    /// Bounded subquery that correlates against a sibling's lateral over the
    /// same association table instead of joining that table again
    SharedSubquery {
        /// Alias of the sibling lateral providing the association rows
        via_alias: String,
    },
    /// Follow-up fetch keyed by parent identifiers (no row cap)
    BatchLoad(UnboundedStrategy),
}

impl Strategy {
    /// Returns true for techniques backed by a correlated lateral subquery
    pub fn is_lateral(&self) -> bool {
        matches!(self, Strategy::BoundedSubquery | Strategy::SharedSubquery { .. })
    }
}

/// Select the base strategy for a relationship
///
/// To-one relationships always use a plain join regardless of the cap;
/// to-many relationships use a bounded subquery when a cap applies and a
/// batch load otherwise.
pub fn select_strategy(
    descriptor: &RelationshipDescriptor,
    row_cap: Option<u32>,
    unbounded: UnboundedStrategy,
) -> Strategy {
    match &descriptor.kind {
        RelationshipKind::ToOne => Strategy::Join,
        RelationshipKind::ToMany { .. } => match row_cap {
            Some(_) => Strategy::BoundedSubquery,
            None => Strategy::BatchLoad(unbounded),
        },
    }
}

/// Detect shared-subquery pairs within every sibling group of the forest
///
/// Two siblings collide when one is a direct to-many onto table `S` and the
/// other a many-to-many using `S` as its association table: their underlying
/// table and correlation predicate are identical, so one physical lateral
/// over `S` serves both. The many-to-many node is rewritten to correlate
/// against the direct node's alias.
pub fn detect_shared(forest: &mut [PlanNode]) {
    detect_shared_in_siblings(forest);
    for node in forest.iter_mut() {
        detect_shared(&mut node.children);
    }
}

fn detect_shared_in_siblings(siblings: &mut [PlanNode]) {
    for i in 0..siblings.len() {
        if siblings[i].strategy != Strategy::BoundedSubquery {
            continue;
        }
        let Some(association) = siblings[i].descriptor.association().cloned() else {
            continue;
        };

        let provider = siblings.iter().find(|node| {
            node.strategy == Strategy::BoundedSubquery
                && node.descriptor.association().is_none()
                && matches!(
                    node.descriptor.kind,
                    RelationshipKind::ToMany { via: Via::Direct }
                )
                && node.descriptor.target_table == association.table
        });

        if let Some(provider) = provider {
            let via_alias = provider.alias.clone();
            siblings[i].strategy = Strategy::SharedSubquery { via_alias };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AssociationRef;

    fn descriptor(kind: RelationshipKind) -> RelationshipDescriptor {
        RelationshipDescriptor {
            key: "roles".to_string(),
            source: "User".to_string(),
            target: "Role".to_string(),
            target_table: "roles".to_string(),
            target_primary_key: "id".to_string(),
            kind,
            foreign_key: None,
            self_referential: false,
        }
    }

    #[test]
    fn test_to_one_is_always_a_join() {
        let one = descriptor(RelationshipKind::ToOne);
        assert_eq!(
            select_strategy(&one, Some(50), UnboundedStrategy::BatchedByIds),
            Strategy::Join
        );
        assert_eq!(
            select_strategy(&one, None, UnboundedStrategy::BatchedByIds),
            Strategy::Join
        );
    }

    #[test]
    fn test_to_many_follows_the_cap() {
        let many = descriptor(RelationshipKind::ToMany { via: Via::Direct });
        assert_eq!(
            select_strategy(&many, Some(10), UnboundedStrategy::BatchedByIds),
            Strategy::BoundedSubquery
        );
        assert_eq!(
            select_strategy(&many, None, UnboundedStrategy::PerParent),
            Strategy::BatchLoad(UnboundedStrategy::PerParent)
        );
    }

    #[test]
    fn test_shared_detection_rewrites_the_association_node() {
        let assoc = AssociationRef::new("user_roles", "user_id", "role_id");
        let m2m = PlanNode::new(
            descriptor(RelationshipKind::ToMany {
                via: Via::Association(assoc),
            }),
            "roles".to_string(),
            1,
            "roles".to_string(),
            Strategy::BoundedSubquery,
            Some(50),
        );
        let mut direct_descriptor = descriptor(RelationshipKind::ToMany { via: Via::Direct });
        direct_descriptor.key = "user_roles".to_string();
        direct_descriptor.target_table = "user_roles".to_string();
        direct_descriptor.foreign_key = Some("user_id".to_string());
        let direct = PlanNode::new(
            direct_descriptor,
            "user_roles".to_string(),
            1,
            "user_roles".to_string(),
            Strategy::BoundedSubquery,
            Some(50),
        );

        let mut forest = vec![m2m, direct];
        detect_shared(&mut forest);
        assert_eq!(
            forest[0].strategy,
            Strategy::SharedSubquery {
                via_alias: "user_roles".to_string()
            }
        );
        assert_eq!(forest[1].strategy, Strategy::BoundedSubquery);
    }
}
