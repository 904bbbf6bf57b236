//! Hierarchical route table.
//!
//! Targets are registered per method into a trie of [`layer::RouteLayer`]
//! nodes: one node per path segment, with literal children in a map and a
//! single wildcard child for `{param}` segments. Matching walks the trie
//! segment by segment, preferring literal children, capturing wildcard
//! segments in order, and stopping early at exclusive (prefix) routes.

mod layer;
mod path;
mod table;

#[cfg(test)]
mod tests;

pub use table::{ParamValues, RouteResult, RouteTable, MAX_INLINE_PARAMS};
