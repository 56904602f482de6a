//! Load paths - dotted relationship key sequences

use crate::error::{AutoloadError, AutoloadResult};

/// Separator between relationship keys in a load path
pub const PATH_SEPARATOR: char = '.';

/// An ordered sequence of relationship keys, split from a dotted string
///
/// Each successive key must name a relationship on the entity type reached
/// by the previous hop; the resolver enforces that while walking the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadPath {
    raw: String,
    segments: Vec<String>,
}

impl LoadPath {
    /// Parse a dotted load path; empty paths and empty segments are invalid
    pub fn parse(raw: &str) -> AutoloadResult<Self> {
        if raw.is_empty() {
            return Err(AutoloadError::Configuration(
                "empty load path".to_string(),
            ));
        }

        let segments: Vec<String> = raw.split(PATH_SEPARATOR).map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(AutoloadError::Configuration(format!(
                "load path '{}' contains an empty segment",
                raw
            )));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The original dotted string
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The relationship keys, in hop order
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of hops
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Join a cumulative path with the next relationship key
pub(crate) fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}{}{}", prefix, PATH_SEPARATOR, key)
    }
}
