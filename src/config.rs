//! Compile options - configuration surface for plan compilation

use serde::{Deserialize, Serialize};

/// Default per-relationship row cap applied to to-many loads
pub const DEFAULT_ROW_CAP: u32 = 50;

/// Sub-strategy for loading an unbounded to-many relationship
///
/// Both produce equivalent results; they trade round-trips against memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnboundedStrategy {
    /// One follow-up query per relationship, keyed by an identifier list
    BatchedByIds,
    /// One follow-up query per parent row
    PerParent,
}

/// Feature flags of the target relational backend
///
/// Checked before query construction so that a missing capability surfaces
/// as [`AutoloadError::UnsupportedBackend`](crate::error::AutoloadError)
/// instead of an execution-time failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackendCapabilities {
    /// Per-row-bounded correlated subqueries (LATERAL or equivalent)
    pub lateral: bool,
    /// Window functions (ROW_NUMBER)
    pub window_functions: bool,
    /// Recursive common table expressions
    pub recursive_cte: bool,
}

impl Default for BackendCapabilities {
    fn default() -> Self {
        Self {
            lateral: true,
            window_functions: true,
            recursive_cte: true,
        }
    }
}

/// Options controlling how relationship loads are compiled
///
/// The defaults match the documented configuration surface: a row cap of 50,
/// primary-key-descending ordering, ZIP optimization enabled, collision
/// checking and DISTINCT disabled.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadOptions {
    /// Per-relationship row cap; `None` disables the cap and switches
    /// to-many loads to the unbounded batch strategy
    pub row_cap: Option<u32>,
    /// Ordering override for related rows (column names, descending);
    /// empty means "target primary key descending"
    pub order_by: Vec<String>,
    /// Strategy for to-many loads when the row cap is disabled
    pub unbounded_strategy: UnboundedStrategy,
    /// Row-alignment (ZIP) optimization for sibling bounded subqueries
    pub optimization: bool,
    /// Check aliases against table names already present in the base query
    pub check_tables: bool,
    /// Apply SQL-level DISTINCT to the composed query
    pub distinct: bool,
    /// Foreign-key column for self-referential relationships; `None`
    /// auto-detects when exactly one candidate exists
    pub self_reference_hint: Option<String>,
    /// Capabilities of the target backend
    pub capabilities: BackendCapabilities,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            row_cap: Some(DEFAULT_ROW_CAP),
            order_by: Vec::new(),
            unbounded_strategy: UnboundedStrategy::BatchedByIds,
            optimization: true,
            check_tables: false,
            distinct: false,
            self_reference_hint: None,
            capabilities: BackendCapabilities::default(),
        }
    }
}

impl LoadOptions {
    /// Create options with all defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-relationship row cap
    pub fn with_row_cap(mut self, cap: u32) -> Self {
        self.row_cap = Some(cap);
        self
    }

    /// Disable the row cap; to-many relationships use the unbounded strategy
    pub fn without_row_cap(mut self) -> Self {
        self.row_cap = None;
        self
    }

    /// Override the default ordering for related rows
    pub fn with_order_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order_by = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Choose the unbounded loading sub-strategy
    pub fn with_unbounded_strategy(mut self, strategy: UnboundedStrategy) -> Self {
        self.unbounded_strategy = strategy;
        self
    }

    /// Toggle ZIP row alignment
    pub fn with_optimization(mut self, enabled: bool) -> Self {
        self.optimization = enabled;
        self
    }

    /// Enable alias-collision checking against the base query
    pub fn with_check_tables(mut self, enabled: bool) -> Self {
        self.check_tables = enabled;
        self
    }

    /// Apply DISTINCT to the composed query
    pub fn with_distinct(mut self, enabled: bool) -> Self {
        self.distinct = enabled;
        self
    }

    /// Set the foreign-key column used for self-referential relationships
    pub fn with_self_reference_hint(mut self, column: impl Into<String>) -> Self {
        self.self_reference_hint = Some(column.into());
        self
    }

    /// Set the backend capability flags
    pub fn with_capabilities(mut self, capabilities: BackendCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = LoadOptions::default();
        assert_eq!(options.row_cap, Some(DEFAULT_ROW_CAP));
        assert!(options.optimization);
        assert!(!options.check_tables);
        assert!(!options.distinct);
        assert_eq!(options.unbounded_strategy, UnboundedStrategy::BatchedByIds);
        assert!(options.capabilities.lateral);
    }

    #[test]
    fn test_builder_pattern() {
        let options = LoadOptions::new()
            .with_row_cap(10)
            .with_order_by(["created_at"])
            .with_check_tables(true)
            .with_self_reference_hint("parent_id");

        assert_eq!(options.row_cap, Some(10));
        assert_eq!(options.order_by, vec!["created_at".to_string()]);
        assert!(options.check_tables);
        assert_eq!(options.self_reference_hint.as_deref(), Some("parent_id"));
    }

    #[test]
    fn test_without_row_cap() {
        let options = LoadOptions::new().without_row_cap();
        assert_eq!(options.row_cap, None);
    }
}
