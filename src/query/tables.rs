//! Table-name enumeration for alias collision checking
//!
//! When `check_tables` is enabled, the compiler must know which table names
//! (and aliases) the caller's base query already references. The rendered
//! SQL is parsed and its FROM/JOIN tree walked, including derived tables and
//! CTE bodies.

use sqlparser::ast::{Query, SetExpr, Statement, TableFactor, TableWithJoins};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::error::{AutoloadError, AutoloadResult};

/// Collect every table name and alias referenced by `sql`, in first-seen order
pub fn table_names(sql: &str) -> AutoloadResult<Vec<String>> {
    let dialect = GenericDialect {};
    let statements = Parser::parse_sql(&dialect, sql)
        .map_err(|e| AutoloadError::Configuration(format!("unparsable base query: {}", e)))?;

    let mut collector = Collector::default();
    for statement in &statements {
        if let Statement::Query(query) = statement {
            collector.visit_query(query);
        }
    }

    Ok(collector.names)
}

#[derive(Default)]
struct Collector {
    names: Vec<String>,
}

impl Collector {
    fn add(&mut self, name: &str) {
        if !self.names.iter().any(|existing| existing == name) {
            self.names.push(name.to_string());
        }
    }

    fn visit_query(&mut self, query: &Query) {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.add(&cte.alias.name.value);
                self.visit_query(&cte.query);
            }
        }
        self.visit_set_expr(&query.body);
    }

    fn visit_set_expr(&mut self, body: &SetExpr) {
        match body {
            SetExpr::Select(select) => {
                for twj in &select.from {
                    self.visit_table_with_joins(twj);
                }
            }
            SetExpr::Query(query) => self.visit_query(query),
            SetExpr::SetOperation { left, right, .. } => {
                self.visit_set_expr(left);
                self.visit_set_expr(right);
            }
            _ => {}
        }
    }

    fn visit_table_with_joins(&mut self, twj: &TableWithJoins) {
        self.visit_table_factor(&twj.relation);
        for join in &twj.joins {
            self.visit_table_factor(&join.relation);
        }
    }

    fn visit_table_factor(&mut self, factor: &TableFactor) {
        match factor {
            TableFactor::Table { name, alias, .. } => {
                if let Some(ident) = name.0.last() {
                    self.add(&ident.value);
                }
                if let Some(alias) = alias {
                    self.add(&alias.name.value);
                }
            }
            TableFactor::Derived {
                subquery, alias, ..
            } => {
                if let Some(alias) = alias {
                    self.add(&alias.name.value);
                }
                self.visit_query(subquery);
            }
            TableFactor::NestedJoin {
                table_with_joins,
                alias,
            } => {
                self.visit_table_with_joins(table_with_joins);
                if let Some(alias) = alias {
                    self.add(&alias.name.value);
                }
            }
            _ => {}
        }
    }
}
