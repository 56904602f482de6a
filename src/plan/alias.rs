//! Alias allocation - deterministic naming for bounded subqueries
//!
//! Aliases are a pure function of the caller-supplied load-path order
//! (paths left to right, hops root to leaf). Callers are entitled to predict
//! them; this is documented behavior, not an implementation accident.

use std::collections::HashSet;

use crate::error::{AutoloadError, AutoloadResult};

/// Suffix appended when an alias collides with the base query
const COLLISION_SUFFIX: &str = "_alias";

/// Allocates one alias per plan node, in traversal order
#[derive(Debug)]
pub struct AliasAllocator {
    /// Target tables already named in this compilation (the root table
    /// counts from the start)
    used_tables: HashSet<String>,
    /// Table names present in the caller's base query; empty unless
    /// collision checking is enabled
    base_tables: HashSet<String>,
    check_tables: bool,
}

impl AliasAllocator {
    pub fn new(root_table: &str, base_tables: HashSet<String>, check_tables: bool) -> Self {
        let mut used_tables = HashSet::new();
        used_tables.insert(root_table.to_string());
        Self {
            used_tables,
            base_tables,
            check_tables,
        }
    }

    /// Allocate the alias for a node targeting `table` via relationship
    /// `key`
    ///
    /// Policy, in order: the bare table name on its first occurrence;
    /// `{table}_{key}` otherwise (self-referential relationships always take
    /// this form, their table is the root's own); with collision checking,
    /// a name already present in the base query gets `_alias` appended once,
    /// and a second collision is a hard [`AutoloadError::AliasExhausted`].
    pub fn allocate(
        &mut self,
        table: &str,
        key: &str,
        self_referential: bool,
    ) -> AutoloadResult<String> {
        let first_use = self.used_tables.insert(table.to_string());

        let mut alias = if first_use && !self_referential {
            table.to_string()
        } else {
            format!("{}_{}", table, key)
        };

        if self.check_tables && self.base_tables.contains(&alias) {
            alias = format!("{}{}", alias, COLLISION_SUFFIX);
            if self.base_tables.contains(&alias) {
                return Err(AutoloadError::AliasExhausted(alias));
            }
        }

        Ok(alias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator() -> AliasAllocator {
        AliasAllocator::new("users", HashSet::new(), false)
    }

    #[test]
    fn test_first_occurrence_gets_the_bare_table_name() {
        let mut allocator = allocator();
        assert_eq!(
            allocator.allocate("messages", "messages_out", false).unwrap(),
            "messages"
        );
        assert_eq!(
            allocator.allocate("messages", "messages_in", false).unwrap(),
            "messages_messages_in"
        );
    }

    #[test]
    fn test_self_reference_always_suffixes() {
        let mut allocator = AliasAllocator::new("categories", HashSet::new(), false);
        assert_eq!(
            allocator.allocate("categories", "children", true).unwrap(),
            "categories_children"
        );
    }

    #[test]
    fn test_root_table_counts_as_used() {
        let mut allocator = allocator();
        assert_eq!(
            allocator.allocate("users", "friends", false).unwrap(),
            "users_friends"
        );
    }

    #[test]
    fn test_base_query_collision_appends_suffix() {
        let base: HashSet<String> = ["users".to_string(), "posts".to_string()].into();
        let mut allocator = AliasAllocator::new("users", base, true);
        assert_eq!(
            allocator.allocate("posts", "posts", false).unwrap(),
            "posts_alias"
        );
    }

    #[test]
    fn test_collision_after_suffix_is_exhausted() {
        let base: HashSet<String> = [
            "users".to_string(),
            "posts".to_string(),
            "posts_alias".to_string(),
        ]
        .into();
        let mut allocator = AliasAllocator::new("users", base, true);
        assert_eq!(
            allocator.allocate("posts", "posts", false),
            Err(AutoloadError::AliasExhausted("posts_alias".to_string()))
        );
    }

    #[test]
    fn test_collision_checking_disabled_ignores_base_tables() {
        let base: HashSet<String> = ["posts".to_string()].into();
        let mut allocator = AliasAllocator::new("users", base, false);
        assert_eq!(allocator.allocate("posts", "posts", false).unwrap(), "posts");
    }
}
