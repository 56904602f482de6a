//! Plan nodes - one resolved relationship hop

use crate::graph::RelationshipDescriptor;

use super::strategy::Strategy;

/// One resolved hop of a load path
///
/// Owned by a single compilation and discarded once the plan is assembled;
/// nodes are never shared across compilations.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanNode {
    /// The relationship this hop loads. For self-referential relationships
    /// the `foreign_key` is already resolved (hint or auto-detection).
    pub descriptor: RelationshipDescriptor,
    /// Cumulative dotted path from the root (`"posts.comments"`)
    pub path: String,
    /// 1-based hop index; direct children of the root are depth 1
    pub depth: usize,
    /// Name assigned to this node's subquery by the alias allocator
    pub alias: String,
    /// Loading technique for this hop
    pub strategy: Strategy,
    /// Effective row cap before condition transforms
    pub cap: Option<u32>,
    /// Deeper hops sharing this prefix
    pub children: Vec<PlanNode>,
}

impl PlanNode {
    pub fn new(
        descriptor: RelationshipDescriptor,
        path: String,
        depth: usize,
        alias: String,
        strategy: Strategy,
        cap: Option<u32>,
    ) -> Self {
        Self {
            descriptor,
            path,
            depth,
            alias,
            strategy,
            cap,
            children: Vec::new(),
        }
    }

    /// Total number of nodes in this subtree, including `self`
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(PlanNode::size).sum::<usize>()
    }
}

/// Total number of nodes in a forest
pub fn forest_size(forest: &[PlanNode]) -> usize {
    forest.iter().map(PlanNode::size).sum()
}
