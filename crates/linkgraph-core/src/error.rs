//! Error types for linkgraph-core.

use thiserror::Error;

/// Errors raised while building graphs, splitting edges or creating loaders.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Raw key was not part of the identifier map's build input.
    #[error("Unknown key {key} for node type {node_type}")]
    UnknownKey {
        /// Node type the map indexes.
        node_type: String,
        /// Debug rendering of the raw key.
        key: String,
    },

    /// A row references an endpoint missing from its identifier map.
    #[error("Unresolved {side} endpoint {key} in row {row} of relation {edge_type}")]
    UnresolvedEndpoint {
        /// Relation being built.
        edge_type: String,
        /// Zero-based row position in the source.
        row: usize,
        /// `"source"` or `"target"`.
        side: &'static str,
        /// Debug rendering of the raw key.
        key: String,
    },

    /// A categorical field contains an empty segment.
    #[error("Malformed category field {field:?} in row {row}")]
    MalformedCategory {
        /// Zero-based row position in the source.
        row: usize,
        /// The offending field.
        field: String,
    },

    /// A row carries a different number of attribute values than declared.
    #[error("Row {row} of relation {edge_type} has {found} attribute values, expected {expected}")]
    AttributeMismatch {
        /// Relation being built.
        edge_type: String,
        /// Zero-based row position in the source.
        row: usize,
        /// Declared attribute count.
        expected: usize,
        /// Values found on the row.
        found: usize,
    },

    /// Node type registered twice with different counts, or similar schema conflict.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Relation is not part of the graph.
    #[error("Relation not found: {0}")]
    RelationNotFound(String),

    /// Split ratios out of range or leaving no training edges.
    #[error("Invalid split configuration: {0}")]
    InvalidSplitConfig(String),

    /// Other configuration value out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Not enough non-edges exist to synthesize the requested negatives.
    #[error("Negative sampling exhausted for {edge_type}: requested {requested}, only {available} candidates")]
    NegativeSamplingExhausted {
        /// Target relation.
        edge_type: String,
        /// Negatives requested.
        requested: usize,
        /// Candidate non-edges left.
        available: usize,
    },

    /// Batching was requested over zero supervision edges.
    #[error("Empty seed set for relation {0}")]
    EmptySeedSet(String),

    /// A supplied index is outside its node type's dense range.
    #[error("Index {index} out of range for node type {node_type} with {num_nodes} nodes")]
    NodeIndexOutOfRange {
        /// Node type of the index.
        node_type: String,
        /// The index.
        index: usize,
        /// Node count of the type.
        num_nodes: usize,
    },
}

/// Result type alias for linkgraph-core.
pub type Result<T> = std::result::Result<T, Error>;
