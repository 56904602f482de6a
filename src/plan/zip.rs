//! ZIP row alignment - packing sibling bounded subqueries side by side
//!
//! Without alignment, joining two capped laterals of K rows each produces
//! K x K parent-row combinations. ZIP numbers the rows of every sibling
//! lateral with ROW_NUMBER() and joins them all to one shared ordinal
//! series, so row i of one sibling lands next to row i of another and the
//! result stays at max(K) rows per parent.

use std::collections::{BTreeMap, HashSet};

use crate::conditions::ConditionMap;
use crate::config::LoadOptions;
use crate::query::SelectQuery;

use super::node::PlanNode;
use super::strategy::Strategy;

/// Name of the shared recursive ordinal CTE
pub const SERIES_CTE: &str = "_rn_cte";

/// Base alias for the per-depth derived series
const SERIES_ALIAS: &str = "_rn_seq";

/// Row-alignment decisions for one compilation
///
/// Produced only when the optimization is on, a row cap applies, and at
/// least one depth level holds two or more eligible laterals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipPlan {
    /// Upper bound of the ordinal series; the row cap, raised to the
    /// largest per-member cap a condition transform installs
    pub bound: u32,
    /// Derived-series alias per participating depth, in depth order
    pub series_by_depth: BTreeMap<usize, String>,
    /// Aliases of the laterals joined on the ordinal
    pub members: HashSet<String>,
}

impl ZipPlan {
    /// Whether the lateral under `alias` participates in row alignment
    pub fn contains(&self, alias: &str) -> bool {
        self.members.contains(alias)
    }
}

/// Decide row alignment for the forest
///
/// Eligible members are non-self-referential bounded laterals, grouped by
/// depth across the whole forest: two capped collections at the same depth
/// cross-join even when they hang off different parents, so parentage does
/// not matter here. A depth contributes only when it holds at least two
/// eligible laterals. Shared subqueries are never members; they yield one
/// row per provider row and ride the provider's alignment, joining ON TRUE.
///
/// Each member's effective cap is probed by applying its condition
/// transform to a capped probe query, so an override that raises the limit
/// raises the series bound for everyone (the bound never drops below the
/// configured cap).
pub fn plan_zip(
    forest: &[PlanNode],
    options: &LoadOptions,
    conditions: &ConditionMap,
) -> Option<ZipPlan> {
    if !options.optimization {
        return None;
    }
    let cap = options.row_cap?;

    let mut by_depth: BTreeMap<usize, Vec<&PlanNode>> = BTreeMap::new();
    collect_eligible(forest, &mut by_depth);

    let mut members = HashSet::new();
    let mut series_by_depth = BTreeMap::new();
    let mut bound = cap;
    for (depth, nodes) in &by_depth {
        if nodes.len() < 2 {
            continue;
        }
        let alias = if series_by_depth.is_empty() {
            SERIES_ALIAS.to_string()
        } else {
            format!("{}_{}", SERIES_ALIAS, series_by_depth.len())
        };
        series_by_depth.insert(*depth, alias);
        for node in nodes {
            members.insert(node.alias.clone());
            bound = bound.max(probe_member_cap(node, cap, conditions));
        }
    }

    if members.is_empty() {
        return None;
    }

    Some(ZipPlan {
        bound,
        series_by_depth,
        members,
    })
}

fn collect_eligible<'a>(
    siblings: &'a [PlanNode],
    by_depth: &mut BTreeMap<usize, Vec<&'a PlanNode>>,
) {
    for node in siblings {
        if node.strategy == Strategy::BoundedSubquery && !node.descriptor.self_referential {
            by_depth.entry(node.depth).or_default().push(node);
        }
        collect_eligible(&node.children, by_depth);
    }
}

/// Effective row cap of one member after its condition transform
///
/// The transform runs against a throwaway probe query; only the resulting
/// LIMIT is read back. A transform that clears the limit without setting a
/// new one leaves the member at the configured cap.
fn probe_member_cap(node: &PlanNode, cap: u32, conditions: &ConditionMap) -> u32 {
    let Some(condition) = conditions.get(&node.path) else {
        return cap;
    };
    let probe = SelectQuery::from_table(&node.descriptor.target_table).limit(cap);
    condition.apply(probe).limit_count().unwrap_or(cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{RelationshipDescriptor, RelationshipKind, Via};
    use crate::plan::strategy::Strategy;
    use std::sync::Arc;

    fn bounded_node(key: &str, table: &str, depth: usize) -> PlanNode {
        PlanNode::new(
            RelationshipDescriptor {
                key: key.to_string(),
                source: "User".to_string(),
                target: "Post".to_string(),
                target_table: table.to_string(),
                target_primary_key: "id".to_string(),
                kind: RelationshipKind::ToMany { via: Via::Direct },
                foreign_key: Some("user_id".to_string()),
                self_referential: false,
            },
            key.to_string(),
            depth,
            key.to_string(),
            Strategy::BoundedSubquery,
            Some(50),
        )
    }

    #[test]
    fn test_lone_lateral_is_not_zipped() {
        let forest = vec![bounded_node("posts", "posts", 1)];
        assert_eq!(
            plan_zip(&forest, &LoadOptions::default(), &ConditionMap::new()),
            None
        );
    }

    #[test]
    fn test_sibling_pair_is_zipped() {
        let forest = vec![
            bounded_node("posts", "posts", 1),
            bounded_node("comments", "comments", 1),
        ];
        let zip = plan_zip(&forest, &LoadOptions::default(), &ConditionMap::new()).unwrap();
        assert_eq!(zip.bound, 50);
        assert!(zip.contains("posts"));
        assert!(zip.contains("comments"));
        assert_eq!(zip.series_by_depth.get(&1).map(String::as_str), Some("_rn_seq"));
    }

    #[test]
    fn test_optimization_off_disables_zip() {
        let forest = vec![
            bounded_node("posts", "posts", 1),
            bounded_node("comments", "comments", 1),
        ];
        let options = LoadOptions::default().with_optimization(false);
        assert_eq!(plan_zip(&forest, &options, &ConditionMap::new()), None);
    }

    #[test]
    fn test_condition_raising_the_limit_raises_the_bound() {
        let forest = vec![
            bounded_node("posts", "posts", 1),
            bounded_node("comments", "comments", 1),
        ];
        let mut conditions = ConditionMap::new();
        conditions.insert(
            "posts".to_string(),
            Arc::new(|query: SelectQuery| query.clear_limit().limit(120)),
        );
        let zip = plan_zip(&forest, &LoadOptions::default(), &conditions).unwrap();
        assert_eq!(zip.bound, 120);
    }

    #[test]
    fn test_condition_lowering_the_limit_keeps_the_cap() {
        let forest = vec![
            bounded_node("posts", "posts", 1),
            bounded_node("comments", "comments", 1),
        ];
        let mut conditions = ConditionMap::new();
        conditions.insert(
            "posts".to_string(),
            Arc::new(|query: SelectQuery| query.clear_limit().limit(5)),
        );
        let zip = plan_zip(&forest, &LoadOptions::default(), &conditions).unwrap();
        assert_eq!(zip.bound, 50);
    }

    #[test]
    fn test_same_depth_laterals_under_different_parents_are_grouped() {
        let mut posts = bounded_node("posts", "posts", 1);
        posts.children = vec![bounded_node("comments", "comments", 2)];
        let mut teams = bounded_node("teams", "teams", 1);
        teams.children = vec![bounded_node("members", "members", 2)];
        let forest = vec![posts, teams];

        let zip = plan_zip(&forest, &LoadOptions::default(), &ConditionMap::new()).unwrap();
        assert!(zip.contains("comments"));
        assert!(zip.contains("members"));
        assert_eq!(
            zip.series_by_depth.get(&2).map(String::as_str),
            Some("_rn_seq_1")
        );
    }

    #[test]
    fn test_shared_subqueries_are_never_members() {
        let mut roles = bounded_node("roles", "roles", 1);
        roles.strategy = Strategy::SharedSubquery {
            via_alias: "user_roles".to_string(),
        };
        let forest = vec![
            roles,
            bounded_node("user_roles", "user_roles", 1),
            bounded_node("posts", "posts", 1),
        ];

        let zip = plan_zip(&forest, &LoadOptions::default(), &ConditionMap::new()).unwrap();
        assert!(!zip.contains("roles"));
        assert!(zip.contains("user_roles"));
        assert!(zip.contains("posts"));
    }

    #[test]
    fn test_nested_pairs_get_one_series_per_depth() {
        let mut posts = bounded_node("posts", "posts", 1);
        posts.children = vec![
            bounded_node("comments", "comments", 2),
            bounded_node("reactions", "reactions", 2),
        ];
        let forest = vec![posts, bounded_node("messages", "messages", 1)];
        let zip = plan_zip(&forest, &LoadOptions::default(), &ConditionMap::new()).unwrap();
        assert_eq!(zip.series_by_depth.get(&1).map(String::as_str), Some("_rn_seq"));
        assert_eq!(
            zip.series_by_depth.get(&2).map(String::as_str),
            Some("_rn_seq_1")
        );
        assert!(zip.contains("posts"));
        assert!(zip.contains("messages"));
        assert!(zip.contains("comments"));
        assert!(zip.contains("reactions"));
    }
}
