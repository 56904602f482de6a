//! Plan assembly - composing the forest onto the base query
//!
//! The assembler walks the forest parent-before-child and attaches one join
//! per node to the caller's base query. Every lateral can reference the
//! aliases attached before it, which is what lets children correlate against
//! their parent's lateral and shared subqueries correlate against their
//! provider.
//!
//! Per node the clause order is fixed: defaults (ordering, row cap), then
//! the caller's condition transform, then the correlation predicate, then
//! ordinal wrapping when the node participates in ZIP. Applying the
//! transform before the correlation means a transform can reset ordering or
//! the cap but can never detach the subquery from its parent.

use std::collections::{BTreeMap, HashSet};

use crate::conditions::ConditionMap;
use crate::config::{LoadOptions, UnboundedStrategy};
use crate::error::AutoloadResult;
use crate::graph::AssociationRef;
use crate::query::{OrderDirection, RecursiveCte, SelectQuery, ORDINAL_COLUMN};

use super::compiled::{AliasEntry, BatchFetch};
use super::node::PlanNode;
use super::strategy::Strategy;
use super::zip::{ZipPlan, SERIES_CTE};

/// Output of plan assembly: the composed query plus alias metadata and
/// follow-up fetches
#[derive(Debug)]
pub struct AssembledQuery {
    pub query: SelectQuery,
    pub aliases: BTreeMap<String, AliasEntry>,
    pub batch_fetches: Vec<BatchFetch>,
}

/// The FROM item a node correlates against: the root table for depth-1
/// nodes, the parent's lateral alias below that
struct ParentRef<'a> {
    reference: &'a str,
    primary_key: &'a str,
}

/// Compose the forest onto the base query
#[allow(clippy::too_many_arguments)]
pub fn assemble(
    base: SelectQuery,
    root_table: &str,
    root_primary_key: &str,
    forest: &[PlanNode],
    options: &LoadOptions,
    conditions: &ConditionMap,
    zip: Option<&ZipPlan>,
    base_tables: &HashSet<String>,
) -> AutoloadResult<AssembledQuery> {
    let root_reference = base
        .from_alias
        .clone()
        .unwrap_or_else(|| root_table.to_string());

    let mut query = base;
    if let Some(zip) = zip {
        query = query.with_recursive_cte(RecursiveCte {
            name: SERIES_CTE.to_string(),
            column: ORDINAL_COLUMN.to_string(),
            bound: zip.bound,
        });
        for series in zip.series_by_depth.values() {
            let select = SelectQuery::from_table(SERIES_CTE).select([ORDINAL_COLUMN]);
            query = query.left_join_derived(series.clone(), select, "TRUE");
        }
    }

    let mut assembly = Assembly {
        query,
        aliases: BTreeMap::new(),
        batch_fetches: Vec::new(),
        options,
        conditions,
        zip,
        base_tables,
    };

    let parent = ParentRef {
        reference: &root_reference,
        primary_key: root_primary_key,
    };
    assembly.attach_siblings(forest, &parent)?;

    if options.distinct {
        assembly.query = assembly.query.distinct(true);
    }

    Ok(AssembledQuery {
        query: assembly.query,
        aliases: assembly.aliases,
        batch_fetches: assembly.batch_fetches,
    })
}

struct Assembly<'a> {
    query: SelectQuery,
    aliases: BTreeMap<String, AliasEntry>,
    batch_fetches: Vec<BatchFetch>,
    options: &'a LoadOptions,
    conditions: &'a ConditionMap,
    zip: Option<&'a ZipPlan>,
    base_tables: &'a HashSet<String>,
}

impl Assembly<'_> {
    /// Attach a sibling group, providers before the shared subqueries that
    /// reference them, then recurse into children
    fn attach_siblings(&mut self, siblings: &[PlanNode], parent: &ParentRef<'_>) -> AutoloadResult<()> {
        let (plain, shared): (Vec<&PlanNode>, Vec<&PlanNode>) = siblings
            .iter()
            .partition(|node| !matches!(node.strategy, Strategy::SharedSubquery { .. }));

        for node in plain.into_iter().chain(shared) {
            self.attach_node(node, parent)?;
            let child_parent = ParentRef {
                reference: &node.alias,
                primary_key: &node.descriptor.target_primary_key,
            };
            self.attach_siblings(&node.children, &child_parent)?;
        }
        Ok(())
    }

    fn attach_node(&mut self, node: &PlanNode, parent: &ParentRef<'_>) -> AutoloadResult<()> {
        match &node.strategy {
            Strategy::Join => self.attach_join(node, parent),
            Strategy::BoundedSubquery => self.attach_bounded(node, parent),
            Strategy::SharedSubquery { via_alias } => self.attach_shared(node, via_alias),
            Strategy::BatchLoad(unbounded) => self.push_batch_fetch(node, *unbounded),
        }
        Ok(())
    }

    /// To-one: plain outer join, transform predicates folded into ON
    fn attach_join(&mut self, node: &PlanNode, parent: &ParentRef<'_>) {
        let descriptor = &node.descriptor;
        let foreign_key = descriptor.foreign_key.as_deref().unwrap_or("id");
        let mut on = format!(
            "{}.{} = {}.{}",
            parent.reference, foreign_key, node.alias, descriptor.target_primary_key
        );

        if let Some(condition) = self.conditions.get(&node.path) {
            let probe = condition.apply(SelectQuery::from_table(&node.alias));
            for predicate in probe.predicates() {
                on.push_str(" AND ");
                on.push_str(predicate);
            }
        }

        let alias = (node.alias != descriptor.target_table).then(|| node.alias.clone());
        self.query = self
            .query
            .clone()
            .left_join_table(&descriptor.target_table, alias, on);
        self.record_alias(node, None);
    }

    /// Direct or many-to-many bounded lateral
    fn attach_bounded(&mut self, node: &PlanNode, parent: &ParentRef<'_>) {
        match node.descriptor.association().cloned() {
            Some(association) => self.attach_association(node, parent, &association),
            None => self.attach_direct(node, parent),
        }
    }

    fn attach_direct(&mut self, node: &PlanNode, parent: &ParentRef<'_>) {
        let descriptor = &node.descriptor;
        // Self-referential laterals must alias their FROM table, or the
        // correlation would be ambiguous against the parent occurrence.
        let mut subquery = SelectQuery::from_table(&descriptor.target_table);
        let inner = if descriptor.self_referential {
            subquery = subquery.with_from_alias(&node.alias);
            node.alias.as_str()
        } else {
            descriptor.target_table.as_str()
        };

        subquery = self.apply_defaults(subquery, inner, &descriptor.target_primary_key, node.cap);
        subquery = self.apply_condition(subquery, &node.path);

        let foreign_key = descriptor.foreign_key.as_deref().unwrap_or("id");
        subquery = subquery.filter(format!(
            "{}.{} = {}.{}",
            inner, foreign_key, parent.reference, parent.primary_key
        ));

        self.attach_lateral(node, subquery);
    }

    /// Many-to-many through an association table
    ///
    /// Under ZIP the lateral is self-contained (association inner-joined to
    /// the target inside the subquery). Without ZIP the association table is
    /// outer-joined once on the composed query and the lateral correlates
    /// against it; when collision checking found the association table in
    /// the base query already, that join is reused instead of added.
    fn attach_association(
        &mut self,
        node: &PlanNode,
        parent: &ParentRef<'_>,
        association: &AssociationRef,
    ) {
        let descriptor = &node.descriptor;
        let target = descriptor.target_table.as_str();

        if self.is_zip_member(&node.alias) {
            let mut subquery = SelectQuery::from_table(&association.table)
                .select([format!("{}.*", target)])
                .inner_join_table(
                    target,
                    None,
                    format!(
                        "{}.{} = {}.{}",
                        target, descriptor.target_primary_key, association.table,
                        association.target_column
                    ),
                );
            subquery = self.apply_defaults(subquery, target, &descriptor.target_primary_key, node.cap);
            subquery = self.apply_condition(subquery, &node.path);
            subquery = subquery.filter(format!(
                "{}.{} = {}.{}",
                association.table, association.source_column, parent.reference, parent.primary_key
            ));
            self.attach_lateral(node, subquery);
            return;
        }

        let association_present =
            self.options.check_tables && self.base_tables.contains(&association.table);
        if !association_present {
            self.query = self.query.clone().left_join_table(
                &association.table,
                None,
                format!(
                    "{}.{} = {}.{}",
                    association.table, association.source_column, parent.reference,
                    parent.primary_key
                ),
            );
        }

        let mut subquery = SelectQuery::from_table(target);
        subquery = self.apply_defaults(subquery, target, &descriptor.target_primary_key, node.cap);
        subquery = self.apply_condition(subquery, &node.path);
        subquery = subquery.filter(format!(
            "{}.{} = {}.{}",
            target, descriptor.target_primary_key, association.table, association.target_column
        ));
        self.attach_lateral(node, subquery);
    }

    /// Many-to-many reusing a sibling's lateral over the association table
    fn attach_shared(&mut self, node: &PlanNode, via_alias: &str) {
        let descriptor = &node.descriptor;
        let target = descriptor.target_table.as_str();
        let target_column = descriptor
            .association()
            .map(|association| association.target_column.clone())
            .unwrap_or_else(|| format!("{}_id", target));

        let mut subquery = SelectQuery::from_table(target);
        subquery = self.apply_defaults(subquery, target, &descriptor.target_primary_key, node.cap);
        subquery = self.apply_condition(subquery, &node.path);
        subquery = subquery.filter(format!(
            "{}.{} = {}.{}",
            target, descriptor.target_primary_key, via_alias, target_column
        ));
        self.attach_lateral(node, subquery);
    }

    /// Unbounded to-many: emit a follow-up fetch instead of a join. To-one
    /// children ride along as joins on the fetch itself; to-many children
    /// become further fetches keyed by the intermediate rows.
    fn push_batch_fetch(&mut self, node: &PlanNode, unbounded: UnboundedStrategy) {
        let descriptor = &node.descriptor;
        let target = descriptor.target_table.as_str();

        let mut fetch = match descriptor.association() {
            Some(association) => SelectQuery::from_table(&association.table)
                .select([
                    format!("{}.*", target),
                    format!(
                        "{}.{} AS _parent_id",
                        association.table, association.source_column
                    ),
                ])
                .inner_join_table(
                    target,
                    None,
                    format!(
                        "{}.{} = {}.{}",
                        target, descriptor.target_primary_key, association.table,
                        association.target_column
                    ),
                ),
            None => SelectQuery::from_table(target),
        };

        let key_column = match descriptor.association() {
            Some(association) => format!("{}.{}", association.table, association.source_column),
            None => format!(
                "{}.{}",
                target,
                descriptor.foreign_key.as_deref().unwrap_or("id")
            ),
        };

        fetch = self.apply_order(fetch, target, &descriptor.target_primary_key);
        fetch = self.apply_condition(fetch, &node.path);

        let batched = unbounded == UnboundedStrategy::BatchedByIds;
        fetch = if batched {
            fetch.filter(format!("{} IN (:parent_ids)", key_column))
        } else {
            fetch.filter(format!("{} = :parent_id", key_column))
        };

        for child in &node.children {
            if child.descriptor.is_collection() {
                self.push_batch_fetch(child, unbounded);
            } else {
                let child_fk = child.descriptor.foreign_key.as_deref().unwrap_or("id");
                fetch = fetch
                    .add_select(format!("{}.*", child.descriptor.target_table))
                    .left_join_table(
                        &child.descriptor.target_table,
                        None,
                        format!(
                            "{}.{} = {}.{}",
                            target, child_fk, child.descriptor.target_table,
                            child.descriptor.target_primary_key
                        ),
                    );
            }
        }

        self.batch_fetches.push(BatchFetch {
            path: node.path.clone(),
            table: target.to_string(),
            key_column,
            sql: fetch.to_sql(),
            batched,
        });
    }

    fn attach_lateral(&mut self, node: &PlanNode, subquery: SelectQuery) {
        self.record_alias(node, Some(subquery.to_sql()));
        let (ordinal, on) = match self.series_for(node) {
            Some(series) => (
                true,
                format!(
                    "{}.{} = {}.{}",
                    node.alias, ORDINAL_COLUMN, series, ORDINAL_COLUMN
                ),
            ),
            None => (false, "TRUE".to_string()),
        };
        self.query = self
            .query
            .clone()
            .left_join_lateral(&node.alias, subquery, ordinal, on);
    }

    fn apply_defaults(
        &self,
        subquery: SelectQuery,
        qualifier: &str,
        primary_key: &str,
        cap: Option<u32>,
    ) -> SelectQuery {
        let mut subquery = self.apply_order(subquery, qualifier, primary_key);
        if let Some(cap) = cap {
            subquery = subquery.limit(cap);
        }
        subquery
    }

    /// Default ordering: the configured columns descending, or the target
    /// primary key descending
    fn apply_order(&self, mut subquery: SelectQuery, qualifier: &str, primary_key: &str) -> SelectQuery {
        if self.options.order_by.is_empty() {
            subquery = subquery.order_by(
                format!("{}.{}", qualifier, primary_key),
                OrderDirection::Desc,
            );
        } else {
            for column in &self.options.order_by {
                subquery =
                    subquery.order_by(format!("{}.{}", qualifier, column), OrderDirection::Desc);
            }
        }
        subquery
    }

    fn apply_condition(&self, subquery: SelectQuery, path: &str) -> SelectQuery {
        match self.conditions.get(path) {
            Some(condition) => condition.apply(subquery),
            None => subquery,
        }
    }

    fn is_zip_member(&self, alias: &str) -> bool {
        self.zip.is_some_and(|zip| zip.contains(alias))
    }

    fn series_for(&self, node: &PlanNode) -> Option<&str> {
        let zip = self.zip?;
        if !zip.contains(&node.alias) {
            return None;
        }
        zip.series_by_depth.get(&node.depth).map(String::as_str)
    }

    fn record_alias(&mut self, node: &PlanNode, subquery_sql: Option<String>) {
        self.aliases.insert(
            node.alias.clone(),
            AliasEntry {
                path: node.path.clone(),
                table: node.descriptor.target_table.clone(),
                subquery_sql,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{RelationshipDescriptor, RelationshipKind, Via};
    use crate::plan::zip::plan_zip;
    use std::sync::Arc;

    fn to_many(key: &str, target: &str, table: &str, fk: &str) -> PlanNode {
        PlanNode::new(
            RelationshipDescriptor {
                key: key.to_string(),
                source: "User".to_string(),
                target: target.to_string(),
                target_table: table.to_string(),
                target_primary_key: "id".to_string(),
                kind: RelationshipKind::ToMany { via: Via::Direct },
                foreign_key: Some(fk.to_string()),
                self_referential: false,
            },
            key.to_string(),
            1,
            table.to_string(),
            Strategy::BoundedSubquery,
            Some(50),
        )
    }

    fn assemble_simple(
        forest: &[PlanNode],
        options: &LoadOptions,
        conditions: &ConditionMap,
        zip: Option<&ZipPlan>,
    ) -> AssembledQuery {
        assemble(
            SelectQuery::from_table("users"),
            "users",
            "id",
            forest,
            options,
            conditions,
            zip,
            &HashSet::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_single_bounded_lateral() {
        let forest = vec![to_many("posts", "Post", "posts", "user_id")];
        let assembled = assemble_simple(
            &forest,
            &LoadOptions::default(),
            &ConditionMap::new(),
            None,
        );
        assert_eq!(
            assembled.query.to_sql(),
            "SELECT users.* FROM users LEFT JOIN LATERAL \
             (SELECT posts.* FROM posts WHERE posts.user_id = users.id \
             ORDER BY posts.id DESC LIMIT 50) AS posts ON TRUE"
        );
        assert_eq!(
            assembled.aliases.get("posts").unwrap().subquery_sql.as_deref(),
            Some(
                "SELECT posts.* FROM posts WHERE posts.user_id = users.id \
                 ORDER BY posts.id DESC LIMIT 50"
            )
        );
    }

    #[test]
    fn test_to_one_join_with_condition_in_on() {
        let mut node = to_many("profile", "Profile", "profiles", "profile_id");
        node.descriptor.kind = RelationshipKind::ToOne;
        node.alias = "profiles".to_string();
        node.strategy = Strategy::Join;

        let mut conditions = ConditionMap::new();
        conditions.insert(
            "profile".to_string(),
            Arc::new(|query: SelectQuery| query.filter("profiles.active = true")),
        );

        let assembled = assemble_simple(
            &[node],
            &LoadOptions::default(),
            &conditions,
            None,
        );
        assert_eq!(
            assembled.query.to_sql(),
            "SELECT users.* FROM users LEFT JOIN profiles \
             ON users.profile_id = profiles.id AND profiles.active = true"
        );
        assert!(assembled.aliases.get("profiles").unwrap().subquery_sql.is_none());
    }

    #[test]
    fn test_zip_pair_shares_one_series() {
        let forest = vec![
            to_many("posts", "Post", "posts", "user_id"),
            to_many("comments", "Comment", "comments", "user_id"),
        ];
        let options = LoadOptions::default();
        let conditions = ConditionMap::new();
        let zip = plan_zip(&forest, &options, &conditions).unwrap();
        let assembled = assemble_simple(&forest, &options, &conditions, Some(&zip));
        let sql = assembled.query.to_sql();

        assert!(sql.starts_with(
            "WITH RECURSIVE _rn_cte AS (SELECT 1 AS _rn UNION ALL \
             SELECT _rn + 1 FROM _rn_cte WHERE _rn < 50)"
        ));
        assert!(sql.contains("LEFT JOIN (SELECT _rn FROM _rn_cte) AS _rn_seq ON TRUE"));
        assert!(sql.contains("ON posts._rn = _rn_seq._rn"));
        assert!(sql.contains("ON comments._rn = _rn_seq._rn"));
        assert_eq!(sql.matches("ROW_NUMBER() OVER ()").count(), 2);
    }

    #[test]
    fn test_self_reference_aliases_the_inner_table() {
        let mut node = to_many("children", "Category", "categories", "parent_id");
        node.alias = "categories_children".to_string();
        node.descriptor.self_referential = true;

        let assembled = assemble(
            SelectQuery::from_table("categories"),
            "categories",
            "id",
            &[node],
            &LoadOptions::default(),
            &ConditionMap::new(),
            None,
            &HashSet::new(),
        )
        .unwrap();
        assert_eq!(
            assembled.query.to_sql(),
            "SELECT categories.* FROM categories LEFT JOIN LATERAL \
             (SELECT categories_children.* FROM categories AS categories_children \
             WHERE categories_children.parent_id = categories.id \
             ORDER BY categories_children.id DESC LIMIT 50) \
             AS categories_children ON TRUE"
        );
    }

    #[test]
    fn test_association_without_zip_joins_the_association_table() {
        let mut node = to_many("roles", "Role", "roles", "user_id");
        node.descriptor.kind = RelationshipKind::ToMany {
            via: Via::Association(AssociationRef::new("user_roles", "user_id", "role_id")),
        };
        node.descriptor.foreign_key = None;
        node.alias = "roles".to_string();

        let assembled = assemble_simple(
            &[node],
            &LoadOptions::default(),
            &ConditionMap::new(),
            None,
        );
        let sql = assembled.query.to_sql();
        assert!(sql.contains("LEFT JOIN user_roles ON user_roles.user_id = users.id"));
        assert!(sql.contains("roles.id = user_roles.role_id"));
    }

    #[test]
    fn test_zipped_association_is_self_contained() {
        let mut roles = to_many("roles", "Role", "roles", "user_id");
        roles.descriptor.kind = RelationshipKind::ToMany {
            via: Via::Association(AssociationRef::new("user_roles", "user_id", "role_id")),
        };
        roles.descriptor.foreign_key = None;
        let forest = vec![roles, to_many("posts", "Post", "posts", "user_id")];

        let options = LoadOptions::default();
        let conditions = ConditionMap::new();
        let zip = plan_zip(&forest, &options, &conditions).unwrap();
        let assembled = assemble_simple(&forest, &options, &conditions, Some(&zip));
        let sql = assembled.query.to_sql();

        assert!(!sql.contains("LEFT JOIN user_roles"));
        assert!(sql.contains(
            "SELECT roles.* FROM user_roles INNER JOIN roles \
             ON roles.id = user_roles.role_id"
        ));
        assert!(sql.contains("user_roles.user_id = users.id"));
    }

    #[test]
    fn test_shared_subquery_correlates_against_the_provider() {
        let mut roles = to_many("roles", "Role", "roles", "user_id");
        roles.descriptor.kind = RelationshipKind::ToMany {
            via: Via::Association(AssociationRef::new("user_roles", "user_id", "role_id")),
        };
        roles.descriptor.foreign_key = None;
        roles.strategy = Strategy::SharedSubquery {
            via_alias: "user_roles".to_string(),
        };
        let provider = to_many("user_roles", "UserRole", "user_roles", "user_id");

        let assembled = assemble_simple(
            &[roles, provider],
            &LoadOptions::default().with_optimization(false),
            &ConditionMap::new(),
            None,
        );
        let sql = assembled.query.to_sql();

        // Provider lateral renders before the consumer that references it
        let provider_at = sql.find("AS user_roles ON").unwrap();
        let consumer_at = sql.find("roles.id = user_roles.role_id").unwrap();
        assert!(provider_at < consumer_at);
    }

    #[test]
    fn test_unbounded_relationship_becomes_a_batch_fetch() {
        let mut node = to_many("posts", "Post", "posts", "user_id");
        node.strategy = Strategy::BatchLoad(UnboundedStrategy::BatchedByIds);
        node.cap = None;

        let assembled = assemble_simple(
            &[node],
            &LoadOptions::default().without_row_cap(),
            &ConditionMap::new(),
            None,
        );
        assert!(assembled.query.to_sql().ends_with("FROM users"));
        assert_eq!(assembled.batch_fetches.len(), 1);
        let fetch = &assembled.batch_fetches[0];
        assert_eq!(
            fetch.sql,
            "SELECT posts.* FROM posts \
             WHERE posts.user_id IN (:parent_ids) ORDER BY posts.id DESC"
        );
        assert!(fetch.batched);
    }

    #[test]
    fn test_batch_fetch_joins_to_one_children() {
        let mut posts = to_many("posts", "Post", "posts", "user_id");
        posts.strategy = Strategy::BatchLoad(UnboundedStrategy::BatchedByIds);
        posts.cap = None;
        let mut author = to_many("author", "User", "users", "author_id");
        author.descriptor.kind = RelationshipKind::ToOne;
        author.path = "posts.author".to_string();
        author.depth = 2;
        author.strategy = Strategy::Join;
        posts.children.push(author);

        let assembled = assemble_simple(
            &[posts],
            &LoadOptions::default().without_row_cap(),
            &ConditionMap::new(),
            None,
        );
        let fetch = &assembled.batch_fetches[0];
        assert!(fetch
            .sql
            .contains("LEFT JOIN users ON posts.author_id = users.id"));
    }

    #[test]
    fn test_condition_overrides_defaults() {
        let forest = vec![to_many("posts", "Post", "posts", "user_id")];
        let mut conditions = ConditionMap::new();
        conditions.insert(
            "posts".to_string(),
            Arc::new(|query: SelectQuery| {
                query
                    .reset_order_by()
                    .order_by("posts.created_at", OrderDirection::Asc)
                    .clear_limit()
                    .limit(5)
            }),
        );
        let assembled = assemble_simple(
            &forest,
            &LoadOptions::default(),
            &conditions,
            None,
        );
        assert!(assembled.query.to_sql().contains(
            "ORDER BY posts.created_at ASC LIMIT 5"
        ));
    }

    #[test]
    fn test_distinct_applies_to_the_composed_query() {
        let forest = vec![to_many("posts", "Post", "posts", "user_id")];
        let assembled = assemble_simple(
            &forest,
            &LoadOptions::default().with_distinct(true),
            &ConditionMap::new(),
            None,
        );
        assert!(assembled.query.to_sql().starts_with("SELECT DISTINCT users.*"));
    }
}
