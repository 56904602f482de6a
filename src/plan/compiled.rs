//! Compiled plans - the executable artifact a compilation produces
//!
//! A compiled plan is inert data: SQL text plus enough metadata for the
//! caller to address related columns and run follow-up fetches. It holds no
//! connections and no graph references, so plans are freely shareable and
//! cacheable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AutoloadError, AutoloadResult};

/// Metadata for one aliased relationship subquery in a compiled plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasEntry {
    /// Dotted load path that produced this alias
    pub path: String,
    /// Underlying target table
    pub table: String,
    /// SQL of the lateral subquery behind this alias, when one exists
    /// (join-loaded to-one relationships have none)
    pub subquery_sql: Option<String>,
}

/// A follow-up query for an unbounded to-many relationship
///
/// The SQL carries a `:parent_ids` placeholder (batched) or `:parent_id`
/// (per parent); the caller binds identifiers collected from the main
/// query's rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFetch {
    /// Dotted load path this fetch hydrates
    pub path: String,
    /// Target table of the fetch
    pub table: String,
    /// Column the placeholder binds against
    pub key_column: String,
    /// Parameterized SQL text
    pub sql: String,
    /// True when the fetch runs once with an identifier list, false when it
    /// runs once per parent row
    pub batched: bool,
}

/// The result of compiling a root entity plus load paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledPlan {
    /// Root entity the plan was compiled for
    pub root: String,
    /// The composed main query
    pub sql: String,
    /// Alias metadata keyed by alias name, iteration in name order
    pub aliases: BTreeMap<String, AliasEntry>,
    /// Follow-up fetches for unbounded relationships, in load-path order
    pub batch_fetches: Vec<BatchFetch>,
}

impl CompiledPlan {
    /// Qualified column reference through a plan alias
    ///
    /// Validates the alias half of `"alias.column"` against the plan, so a
    /// typo surfaces here rather than as a backend error.
    pub fn column(&self, reference: &str) -> AutoloadResult<String> {
        let (alias, column) = reference.split_once('.').ok_or_else(|| {
            AutoloadError::Configuration(format!(
                "column reference '{}' is not of the form alias.column",
                reference
            ))
        })?;
        if !self.aliases.contains_key(alias) {
            return Err(AutoloadError::Configuration(format!(
                "unknown plan alias '{}' in column reference '{}'",
                alias, reference
            )));
        }
        Ok(format!("{}.{}", alias, column))
    }

    /// SQL of the lateral subquery behind `alias`, when one exists
    pub fn subquery_sql(&self, alias: &str) -> Option<&str> {
        self.aliases
            .get(alias)
            .and_then(|entry| entry.subquery_sql.as_deref())
    }

    /// Alias entry for a dotted load path
    pub fn alias_for_path(&self, path: &str) -> Option<(&str, &AliasEntry)> {
        self.aliases
            .iter()
            .find(|(_, entry)| entry.path == path)
            .map(|(alias, entry)| (alias.as_str(), entry))
    }
}
