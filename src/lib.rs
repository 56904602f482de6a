//! autoloads - eager-loading query compiler
//!
//! Compiles a root entity plus dotted relationship paths into a single SQL
//! query with one bounded LATERAL subquery per to-many relationship, plus
//! follow-up batch fetches for unbounded relationships. Sibling bounded
//! subqueries are row-aligned through a shared ordinal series so joining
//! several capped collections never multiplies parent rows.
//!
//! ```
//! use autoloads::{AutoloadCompiler, CompileRequest, EntityMetadata, RelationshipDef};
//!
//! let compiler = AutoloadCompiler::new();
//! compiler
//!     .initialize(vec![
//!         EntityMetadata::new("User", "users")
//!             .with_relationship(RelationshipDef::to_many("posts", "Post", "user_id")),
//!         EntityMetadata::new("Post", "posts"),
//!     ])
//!     .unwrap();
//!
//! let plan = compiler
//!     .compile(&CompileRequest::new("User").load("posts"))
//!     .unwrap();
//! assert!(plan.sql.contains("LEFT JOIN LATERAL"));
//! ```

pub mod cache;
pub mod compiler;
pub mod conditions;
pub mod config;
pub mod error;
pub mod graph;
pub mod plan;
pub mod query;

pub use cache::{CacheStats, PlanCache};
pub use compiler::{AutoloadCompiler, CompileRequest};
pub use conditions::{with_filters, Condition, ConditionMap};
pub use config::{BackendCapabilities, LoadOptions, UnboundedStrategy, DEFAULT_ROW_CAP};
pub use error::{AutoloadError, AutoloadResult};
pub use graph::{
    AssociationRef, EntityMetadata, ForeignKeyDef, RelationshipDef, RelationshipDescriptor,
    RelationshipGraph, RelationshipKind, Via,
};
pub use plan::{AliasEntry, BatchFetch, CompiledPlan};
pub use query::{OrderDirection, SelectQuery};
