//! Query representation - composable SELECT builder and SQL generation
//!
//! The compiler composes plans out of [`SelectQuery`] values: the caller's
//! base query, one bounded subquery per to-many relationship, and the
//! ordinal series used for row alignment. Rendering is deterministic so a
//! cached plan reproduces byte-identical SQL.

pub mod select;
pub mod sql;
pub mod tables;
pub mod types;

pub use select::SelectQuery;
pub use sql::ORDINAL_COLUMN;
pub use tables::table_names;
pub use types::{JoinClause, JoinTarget, JoinType, OrderDirection, RecursiveCte};
