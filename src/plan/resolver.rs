//! Path resolution - dotted load paths to a depth-ordered plan forest
//!
//! Paths sharing a prefix merge into one parent node with several children;
//! the ZIP optimizer depends on that merge to see true siblings. Nodes are
//! created (and their aliases allocated) in caller order, paths left to
//! right and hops root to leaf.

use std::collections::{HashSet, VecDeque};

use crate::config::LoadOptions;
use crate::error::{AutoloadError, AutoloadResult};
use crate::graph::RelationshipGraph;

use super::alias::AliasAllocator;
use super::node::PlanNode;
use super::path::{join_path, LoadPath};
use super::strategy::select_strategy;

/// Resolve the requested load paths into a plan forest
///
/// Fails with [`AutoloadError::InvalidPath`] when a segment does not name a
/// relationship at its position, and propagates alias and self-reference
/// resolution failures.
pub fn resolve_forest(
    graph: &RelationshipGraph,
    root_entity: &str,
    loads: &[String],
    options: &LoadOptions,
    base_tables: HashSet<String>,
) -> AutoloadResult<Vec<PlanNode>> {
    let root = graph.entity(root_entity)?;
    let mut allocator = AliasAllocator::new(&root.table, base_tables, options.check_tables);

    let mut forest = Vec::new();
    for raw in loads {
        let path = LoadPath::parse(raw)?;
        let segments = expand_segments(graph, root_entity, &path)?;
        insert_segments(
            graph,
            &mut forest,
            root_entity,
            &segments,
            0,
            "",
            &mut allocator,
            options,
            root_entity,
            path.raw(),
        )?;
    }

    Ok(forest)
}

/// Expand a bare relationship key that is not direct on the root into the
/// shortest chain reaching it
///
/// Loading `"comments"` on a user resolves to the `posts.comments` chain
/// when users have no `comments` relationship of their own. Only
/// single-segment paths get this search; dotted paths keep the strict
/// hop-by-hop contract.
fn expand_segments(
    graph: &RelationshipGraph,
    root_entity: &str,
    path: &LoadPath,
) -> AutoloadResult<Vec<String>> {
    let [key] = path.segments() else {
        return Ok(path.segments().to_vec());
    };
    if graph.entity(root_entity)?.relationship(key).is_some() {
        return Ok(vec![key.clone()]);
    }

    search_chain(graph, root_entity, key).ok_or_else(|| AutoloadError::InvalidPath {
        path: path.raw().to_string(),
        segment: key.clone(),
        entity: root_entity.to_string(),
        root: root_entity.to_string(),
    })
}

/// Breadth-first search for the shortest relationship chain from the root
/// entity to a relationship named `key`
///
/// Entities are visited once, relationships in declaration order, so the
/// chain found is deterministic.
fn search_chain(graph: &RelationshipGraph, root_entity: &str, key: &str) -> Option<Vec<String>> {
    let mut visited: HashSet<String> = HashSet::from([root_entity.to_string()]);
    let mut queue: VecDeque<(String, Vec<String>)> =
        VecDeque::from([(root_entity.to_string(), Vec::new())]);

    while let Some((entity, trail)) = queue.pop_front() {
        let node = graph.entity(&entity).ok()?;
        if node.relationship(key).is_some() {
            let mut chain = trail;
            chain.push(key.to_string());
            return Some(chain);
        }
        for descriptor in &node.relationships {
            if visited.insert(descriptor.target.clone()) {
                let mut next = trail.clone();
                next.push(descriptor.key.clone());
                queue.push_back((descriptor.target.clone(), next));
            }
        }
    }

    None
}

#[allow(clippy::too_many_arguments)]
fn insert_segments(
    graph: &RelationshipGraph,
    children: &mut Vec<PlanNode>,
    entity: &str,
    segments: &[String],
    depth: usize,
    prefix: &str,
    allocator: &mut AliasAllocator,
    options: &LoadOptions,
    root_entity: &str,
    full_path: &str,
) -> AutoloadResult<()> {
    let Some((segment, rest)) = segments.split_first() else {
        return Ok(());
    };

    let idx = match children
        .iter()
        .position(|node| node.descriptor.key == *segment)
    {
        Some(idx) => idx,
        None => {
            let mut descriptor = graph
                .lookup(entity, segment)
                .map_err(|err| match err {
                    AutoloadError::UnknownRelationship { .. } | AutoloadError::UnknownEntity(_) => {
                        AutoloadError::InvalidPath {
                            path: full_path.to_string(),
                            segment: segment.clone(),
                            entity: entity.to_string(),
                            root: root_entity.to_string(),
                        }
                    }
                    other => other,
                })?
                .clone();

            if descriptor.self_referential && descriptor.foreign_key.is_none() {
                descriptor.foreign_key = Some(graph.self_reference_column(
                    entity,
                    options.self_reference_hint.as_deref(),
                )?);
            }

            let alias = allocator.allocate(
                &descriptor.target_table,
                &descriptor.key,
                descriptor.self_referential,
            )?;
            let strategy = select_strategy(&descriptor, options.row_cap, options.unbounded_strategy);
            let path = join_path(prefix, segment);
            children.push(PlanNode::new(
                descriptor,
                path,
                depth + 1,
                alias,
                strategy,
                options.row_cap,
            ));
            children.len() - 1
        }
    };

    let next_entity = children[idx].descriptor.target.clone();
    let next_prefix = children[idx].path.clone();
    insert_segments(
        graph,
        &mut children[idx].children,
        &next_entity,
        rest,
        depth + 1,
        &next_prefix,
        allocator,
        options,
        root_entity,
        full_path,
    )
}
