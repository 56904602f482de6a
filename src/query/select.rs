//! SELECT builder - the query object the compiler composes and transforms

use serde_json::Value;

use super::types::{JoinClause, JoinTarget, JoinType, OrderDirection, RecursiveCte};

/// Builder for a single SELECT statement
///
/// Used for the caller's base query, for every bounded subquery, and for the
/// probe queries handed to condition transforms. Transforms receive a
/// `SelectQuery` by value and return the reshaped query; the mutators below
/// are the surface they work against.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectQuery {
    pub(crate) select_fields: Vec<String>,
    pub(crate) from_table: String,
    pub(crate) from_alias: Option<String>,
    pub(crate) joins: Vec<JoinClause>,
    pub(crate) where_predicates: Vec<String>,
    pub(crate) order_by: Vec<(String, OrderDirection)>,
    pub(crate) limit_count: Option<u32>,
    pub(crate) distinct: bool,
    pub(crate) ctes: Vec<RecursiveCte>,
}

impl SelectQuery {
    /// Create a query selecting all columns of `table`
    pub fn from_table(table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            select_fields: vec![format!("{}.*", table)],
            from_table: table,
            ..Self::default()
        }
    }

    /// Alias the FROM table; the select list follows the alias
    pub fn with_from_alias(mut self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        self.select_fields = vec![format!("{}.*", alias)];
        self.from_alias = Some(alias);
        self
    }

    /// Replace the select list
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Append an extra select expression
    pub fn add_select(mut self, field: impl Into<String>) -> Self {
        self.select_fields.push(field.into());
        self
    }

    /// Append a raw WHERE predicate (AND-combined)
    pub fn filter(mut self, predicate: impl Into<String>) -> Self {
        self.where_predicates.push(predicate.into());
        self
    }

    /// Append an equality predicate with an escaped literal value
    pub fn filter_eq(self, column: impl Into<String>, value: Value) -> Self {
        let predicate = format!("{} = {}", column.into(), format_value(&value));
        self.filter(predicate)
    }

    /// Append an ORDER BY column
    pub fn order_by(mut self, column: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by.push((column.into(), direction));
        self
    }

    /// Drop all ORDER BY columns (used by transforms that reset defaults)
    pub fn reset_order_by(mut self) -> Self {
        self.order_by.clear();
        self
    }

    /// Set the LIMIT
    pub fn limit(mut self, count: u32) -> Self {
        self.limit_count = Some(count);
        self
    }

    /// Drop the LIMIT (used by transforms that reset defaults)
    pub fn clear_limit(mut self) -> Self {
        self.limit_count = None;
        self
    }

    /// Current LIMIT, if any
    pub fn limit_count(&self) -> Option<u32> {
        self.limit_count
    }

    /// Current WHERE predicates
    pub fn predicates(&self) -> &[String] {
        &self.where_predicates
    }

    /// Current ORDER BY columns
    pub fn order_columns(&self) -> &[(String, OrderDirection)] {
        &self.order_by
    }

    /// Toggle SELECT DISTINCT
    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    /// Attach a plain table via LEFT JOIN
    pub fn left_join_table(
        mut self,
        name: impl Into<String>,
        alias: Option<String>,
        on: impl Into<String>,
    ) -> Self {
        self.joins.push(JoinClause {
            join_type: JoinType::Left,
            target: JoinTarget::Table {
                name: name.into(),
                alias,
            },
            on: on.into(),
        });
        self
    }

    /// Attach a plain table via INNER JOIN
    pub fn inner_join_table(
        mut self,
        name: impl Into<String>,
        alias: Option<String>,
        on: impl Into<String>,
    ) -> Self {
        self.joins.push(JoinClause {
            join_type: JoinType::Inner,
            target: JoinTarget::Table {
                name: name.into(),
                alias,
            },
            on: on.into(),
        });
        self
    }

    /// Attach a lateral subquery via LEFT JOIN
    pub fn left_join_lateral(
        mut self,
        alias: impl Into<String>,
        query: SelectQuery,
        ordinal: bool,
        on: impl Into<String>,
    ) -> Self {
        self.joins.push(JoinClause {
            join_type: JoinType::Left,
            target: JoinTarget::Lateral {
                alias: alias.into(),
                query: Box::new(query),
                ordinal,
            },
            on: on.into(),
        });
        self
    }

    /// Attach an uncorrelated derived table via LEFT JOIN
    pub fn left_join_derived(
        mut self,
        alias: impl Into<String>,
        query: SelectQuery,
        on: impl Into<String>,
    ) -> Self {
        self.joins.push(JoinClause {
            join_type: JoinType::Left,
            target: JoinTarget::Derived {
                alias: alias.into(),
                query: Box::new(query),
            },
            on: on.into(),
        });
        self
    }

    /// Register a recursive integer-sequence CTE on this query
    pub fn with_recursive_cte(mut self, cte: RecursiveCte) -> Self {
        self.ctes.push(cte);
        self
    }
}

/// Format a JSON value as a SQL literal, escaping single quotes
pub(crate) fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "NULL".to_string(),
        _ => "NULL".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_table_selects_all_columns() {
        let query = SelectQuery::from_table("users");
        assert_eq!(query.select_fields, vec!["users.*".to_string()]);
        assert_eq!(query.from_table, "users");
    }

    #[test]
    fn test_from_alias_rewrites_select_list() {
        let query = SelectQuery::from_table("categories").with_from_alias("categories_children");
        assert_eq!(
            query.select_fields,
            vec!["categories_children.*".to_string()]
        );
        assert_eq!(query.from_alias.as_deref(), Some("categories_children"));
    }

    #[test]
    fn test_filter_eq_escapes_strings() {
        let query = SelectQuery::from_table("users").filter_eq("users.name", json!("O'Brien"));
        assert_eq!(query.where_predicates, vec!["users.name = 'O''Brien'"]);
    }

    #[test]
    fn test_reset_order_and_limit() {
        let query = SelectQuery::from_table("posts")
            .order_by("posts.id", OrderDirection::Desc)
            .limit(50)
            .reset_order_by()
            .clear_limit()
            .order_by("posts.created_at", OrderDirection::Asc)
            .limit(5);

        assert_eq!(query.limit_count(), Some(5));
        assert_eq!(
            query.order_columns(),
            &[("posts.created_at".to_string(), OrderDirection::Asc)]
        );
    }
}
