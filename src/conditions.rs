//! Condition transforms - caller-supplied per-path query reshaping
//!
//! A condition is a pure function from "query so far" to "query": it may add
//! filters, reset or override ordering, reset or override the row cap. The
//! compiler applies each transform at most once per compilation, strictly
//! after the defaults, so a transform that clears and reapplies ordering or
//! limit legitimately overrides them.

use std::collections::HashMap;
use std::sync::Arc;

use crate::query::SelectQuery;

/// Capability interface for a per-path query transform
///
/// Implementations must be side-effect free; this is a documented contract,
/// not enforced by the type system.
pub trait Condition: Send + Sync {
    fn apply(&self, query: SelectQuery) -> SelectQuery;
}

impl<F> Condition for F
where
    F: Fn(SelectQuery) -> SelectQuery + Send + Sync,
{
    fn apply(&self, query: SelectQuery) -> SelectQuery {
        self(query)
    }
}

/// Map from dotted load path to its condition transform
pub type ConditionMap = HashMap<String, Arc<dyn Condition>>;

/// Build a condition that appends raw WHERE predicates
///
/// Convenience for the common "just filter" case:
///
/// ```
/// use autoloads::conditions::with_filters;
/// let active_roles = with_filters(["roles.active = true"]);
/// ```
pub fn with_filters<I, S>(predicates: I) -> Arc<dyn Condition>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let predicates: Vec<String> = predicates.into_iter().map(Into::into).collect();
    Arc::new(move |mut query: SelectQuery| {
        for predicate in &predicates {
            query = query.filter(predicate.clone());
        }
        query
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_filters_appends_predicates() {
        let condition = with_filters(["roles.active = true", "roles.level > 3"]);
        let query = condition.apply(SelectQuery::from_table("roles"));
        assert_eq!(
            query.predicates(),
            &["roles.active = true", "roles.level > 3"]
        );
    }

    #[test]
    fn test_closure_is_a_condition() {
        let condition: Arc<dyn Condition> =
            Arc::new(|query: SelectQuery| query.clear_limit().limit(5));
        let query = condition.apply(SelectQuery::from_table("posts").limit(50));
        assert_eq!(query.limit_count(), Some(5));
    }
}
