//! Compilation front end - graph handle, request surface, and pipeline
//!
//! The compiler owns the relationship graph (set exactly once), the default
//! compile options, and the plan cache. Compilation itself is a pure
//! pipeline: resolve the load paths into a forest, detect shared
//! subqueries, decide row alignment, check backend capabilities, assemble.

use std::collections::HashSet;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::cache::{CacheStats, PlanCache, PlanCacheKey};
use crate::conditions::{Condition, ConditionMap};
use crate::config::LoadOptions;
use crate::error::{AutoloadError, AutoloadResult};
use crate::graph::{EntityMetadata, RelationshipGraph};
use crate::plan::assembler::assemble;
use crate::plan::node::forest_size;
use crate::plan::resolver::resolve_forest;
use crate::plan::strategy::detect_shared;
use crate::plan::zip::plan_zip;
use crate::plan::{CompiledPlan, PlanNode};
use crate::query::{table_names, SelectQuery};

/// One compilation request: a root entity, its load paths, and per-request
/// overrides
#[derive(Clone, Default)]
pub struct CompileRequest {
    root: String,
    loads: Vec<String>,
    conditions: ConditionMap,
    base_query: Option<SelectQuery>,
    options: Option<LoadOptions>,
}

impl CompileRequest {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Append one load path
    pub fn load(mut self, path: impl Into<String>) -> Self {
        self.loads.push(path.into());
        self
    }

    /// Append several load paths
    pub fn loads<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.loads.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Attach a condition transform to a load path
    pub fn condition(mut self, path: impl Into<String>, condition: Arc<dyn Condition>) -> Self {
        self.conditions.insert(path.into(), condition);
        self
    }

    /// Start from a caller-supplied base query instead of `SELECT table.*`
    pub fn with_base_query(mut self, query: SelectQuery) -> Self {
        self.base_query = Some(query);
        self
    }

    /// Override the compiler's default options for this request
    pub fn with_options(mut self, options: LoadOptions) -> Self {
        self.options = Some(options);
        self
    }
}

/// Eager-load plan compiler
///
/// Holds the relationship graph behind a set-once cell so compilations can
/// run concurrently without locking the graph itself.
pub struct AutoloadCompiler {
    graph: OnceCell<Arc<RelationshipGraph>>,
    options: LoadOptions,
    cache: PlanCache,
}

impl Default for AutoloadCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl AutoloadCompiler {
    pub fn new() -> Self {
        Self::with_options(LoadOptions::default())
    }

    pub fn with_options(options: LoadOptions) -> Self {
        Self {
            graph: OnceCell::new(),
            options,
            cache: PlanCache::default(),
        }
    }

    /// Build the relationship graph from schema metadata
    ///
    /// May be called exactly once; a second call fails rather than silently
    /// replacing the graph other threads may be reading.
    pub fn initialize(&self, metadata: Vec<EntityMetadata>) -> AutoloadResult<()> {
        let graph = Arc::new(RelationshipGraph::build(metadata)?);
        debug!(entities = graph.len(), "relationship graph initialized");
        self.graph
            .set(graph)
            .map_err(|_| AutoloadError::Configuration(
                "relationship graph is already initialized".to_string(),
            ))
    }

    /// The initialized graph, shared
    pub fn graph(&self) -> AutoloadResult<Arc<RelationshipGraph>> {
        self.graph
            .get()
            .cloned()
            .ok_or(AutoloadError::GraphNotInitialized)
    }

    /// Compile a request into a shareable plan
    pub fn compile(&self, request: &CompileRequest) -> AutoloadResult<Arc<CompiledPlan>> {
        let graph = self.graph()?;
        let options = request.options.as_ref().unwrap_or(&self.options);
        let root = graph.entity(&request.root)?;

        let base = match &request.base_query {
            Some(query) => query.clone(),
            None => SelectQuery::from_table(&root.table),
        };
        let base_sql = base.to_sql();
        let base_tables: HashSet<String> = if options.check_tables {
            table_names(&base_sql)?.into_iter().collect()
        } else {
            HashSet::new()
        };

        let key = PlanCacheKey {
            root: request.root.clone(),
            loads: request.loads.clone(),
            options: options.clone(),
            base_sql,
            condition_ids: condition_ids(&request.conditions),
        };
        if let Some(plan) = self.cache.get(&key) {
            debug!(root = %request.root, loads = ?request.loads, "plan cache hit");
            return Ok(plan);
        }

        let mut forest = resolve_forest(
            &graph,
            &request.root,
            &request.loads,
            options,
            base_tables.clone(),
        )?;
        detect_shared(&mut forest);
        let zip = plan_zip(&forest, options, &request.conditions);

        if has_lateral(&forest) && !options.capabilities.lateral {
            return Err(AutoloadError::UnsupportedBackend(
                "bounded relationship loads require LATERAL subqueries".to_string(),
            ));
        }
        if zip.is_some()
            && !(options.capabilities.window_functions && options.capabilities.recursive_cte)
        {
            return Err(AutoloadError::UnsupportedBackend(
                "row alignment requires window functions and recursive CTEs; \
                 disable the optimization for this backend"
                    .to_string(),
            ));
        }

        let assembled = assemble(
            base,
            &root.table,
            &root.primary_key,
            &forest,
            options,
            &request.conditions,
            zip.as_ref(),
            &base_tables,
        )?;

        let plan = Arc::new(CompiledPlan {
            root: request.root.clone(),
            sql: assembled.query.to_sql(),
            aliases: assembled.aliases,
            batch_fetches: assembled.batch_fetches,
        });
        debug!(
            root = %request.root,
            nodes = forest_size(&forest),
            zipped = zip.is_some(),
            batch_fetches = plan.batch_fetches.len(),
            "plan compiled"
        );
        self.cache.store(key, Arc::clone(&plan));
        Ok(plan)
    }

    /// Plan cache counters
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop every cached plan
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

/// Condition transforms keyed by path and pointer identity, path-sorted so
/// insertion order does not affect the cache key
fn condition_ids(conditions: &ConditionMap) -> Vec<(String, usize)> {
    let mut ids: Vec<(String, usize)> = conditions
        .iter()
        .map(|(path, condition)| {
            (
                path.clone(),
                Arc::as_ptr(condition) as *const () as usize,
            )
        })
        .collect();
    ids.sort();
    ids
}

fn has_lateral(forest: &[PlanNode]) -> bool {
    forest
        .iter()
        .any(|node| node.strategy.is_lateral() || has_lateral(&node.children))
}
