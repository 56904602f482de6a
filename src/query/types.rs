//! Query builder types - clause enums and join targets

use std::fmt;

/// Order by direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// Join types used by the composed query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER JOIN"),
            JoinType::Left => write!(f, "LEFT JOIN"),
        }
    }
}

/// What a join attaches: a plain table, a correlated lateral subquery,
/// or a derived table (used for ordinal series)
#[derive(Debug, Clone, PartialEq)]
pub enum JoinTarget {
    /// Plain table reference, optionally aliased
    Table {
        name: String,
        alias: Option<String>,
    },
    /// Correlated lateral subquery named `alias`; when `ordinal` is set the
    /// subquery is wrapped to project a `ROW_NUMBER() OVER ()` ordinal column
    Lateral {
        alias: String,
        query: Box<super::SelectQuery>,
        ordinal: bool,
    },
    /// Uncorrelated derived table named `alias`
    Derived {
        alias: String,
        query: Box<super::SelectQuery>,
    },
}

/// A single join clause of the composed query
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub target: JoinTarget,
    /// Raw ON predicate; `TRUE` for unconditional lateral joins
    pub on: String,
}

/// A recursive integer-sequence CTE: `1, 2, .. bound`
///
/// Rendered as `name AS (SELECT 1 AS column UNION ALL
/// SELECT column + 1 FROM name WHERE column < bound)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecursiveCte {
    pub name: String,
    pub column: String,
    pub bound: u32,
}
