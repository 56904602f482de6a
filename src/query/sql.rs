//! SQL generation for [`SelectQuery`]
//!
//! Rendering is purely a function of the builder's contents, so identical
//! plans render byte-identical SQL (the cache idempotence guarantee relies
//! on this).

use super::select::SelectQuery;
use super::types::{JoinTarget, RecursiveCte};

/// Column name projected by ordinal-wrapped lateral subqueries and by the
/// recursive ordinal sequence
pub const ORDINAL_COLUMN: &str = "_rn";

impl SelectQuery {
    /// Render the query as SQL
    pub fn to_sql(&self) -> String {
        let mut sql = String::new();

        if !self.ctes.is_empty() {
            sql.push_str("WITH RECURSIVE ");
            let rendered: Vec<String> = self.ctes.iter().map(render_cte).collect();
            sql.push_str(&rendered.join(", "));
            sql.push(' ');
        }

        if self.distinct {
            sql.push_str("SELECT DISTINCT ");
        } else {
            sql.push_str("SELECT ");
        }

        if self.select_fields.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.select_fields.join(", "));
        }

        sql.push_str(" FROM ");
        sql.push_str(&self.from_table);
        if let Some(alias) = &self.from_alias {
            sql.push_str(" AS ");
            sql.push_str(alias);
        }

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.join_type.to_string());
            match &join.target {
                JoinTarget::Table { name, alias } => {
                    sql.push(' ');
                    sql.push_str(name);
                    if let Some(alias) = alias {
                        sql.push_str(" AS ");
                        sql.push_str(alias);
                    }
                }
                JoinTarget::Lateral {
                    alias,
                    query,
                    ordinal,
                } => {
                    sql.push_str(" LATERAL (");
                    if *ordinal {
                        sql.push_str(&format!(
                            "SELECT _q.*, ROW_NUMBER() OVER () AS {} FROM ({}) AS _q",
                            ORDINAL_COLUMN,
                            query.to_sql()
                        ));
                    } else {
                        sql.push_str(&query.to_sql());
                    }
                    sql.push_str(") AS ");
                    sql.push_str(alias);
                }
                JoinTarget::Derived { alias, query } => {
                    sql.push_str(" (");
                    sql.push_str(&query.to_sql());
                    sql.push_str(") AS ");
                    sql.push_str(alias);
                }
            }
            sql.push_str(" ON ");
            sql.push_str(&join.on);
        }

        if !self.where_predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.where_predicates.join(" AND "));
        }

        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            let clauses: Vec<String> = self
                .order_by
                .iter()
                .map(|(column, direction)| format!("{} {}", column, direction))
                .collect();
            sql.push_str(&clauses.join(", "));
        }

        if let Some(limit) = self.limit_count {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        sql
    }
}

fn render_cte(cte: &RecursiveCte) -> String {
    format!(
        "{name} AS (SELECT 1 AS {col} UNION ALL SELECT {col} + 1 FROM {name} WHERE {col} < {bound})",
        name = cte.name,
        col = cte.column,
        bound = cte.bound,
    )
}
