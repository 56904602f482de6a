//! Plan construction pipeline
//!
//! A compilation builds a depth-ordered forest of [`PlanNode`]s from the
//! requested load paths (resolver), names each node's subquery (alias
//! allocator), picks a loading technique per node (strategy selector),
//! aligns sibling bounded subqueries (ZIP optimizer), and finally composes
//! everything onto the base query (assembler). The pipeline is sequential by
//! design: alias assignment order is an externally visible contract.

pub mod alias;
pub mod assembler;
pub mod compiled;
pub mod node;
pub mod path;
pub mod resolver;
pub mod strategy;
pub mod zip;

pub use compiled::{AliasEntry, BatchFetch, CompiledPlan};
pub use node::PlanNode;
pub use path::LoadPath;
pub use strategy::Strategy;
pub use zip::ZipPlan;
