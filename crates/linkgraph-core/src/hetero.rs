//! Typed graph store.
//!
//! A heterogeneous graph holds a node count per node type and, per directed
//! relation, a COO edge list with optional per-edge attributes, similar to
//! PyTorch Geometric's `HeteroData`.
//!
//! Construction is two-phase: edges accumulate in growable [`EdgeBuffer`]s and
//! are frozen into boxed slices once node counts are known. A frozen
//! [`EdgeStore`] also carries an incoming-edge index (CSC) so the neighbor
//! sampler can look up the sources sending messages to a node in O(degree).
//!
//! # Example
//!
//! ```rust
//! use linkgraph_core::hetero::{EdgeBuffer, EdgeType, HeteroGraph, NodeType};
//! use std::collections::BTreeMap;
//!
//! let rates = EdgeType::new("user", "rates", "movie");
//! let mut buffer = EdgeBuffer::new();
//! buffer.add_edge(0, 1);
//! buffer.add_edge(1, 1);
//!
//! let nodes = BTreeMap::from([(NodeType::new("user"), 2), (NodeType::new("movie"), 2)]);
//! let relations = BTreeMap::from([(rates.clone(), buffer)]);
//! let graph = HeteroGraph::from_parts(nodes, relations).unwrap();
//!
//! assert_eq!(graph.num_edges(&rates), 2);
//! assert_eq!(graph.incoming_neighbors(&rates, 1), vec![0, 1]);
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A node type identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeType(pub String);

impl NodeType {
    /// Create a new node type.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the type name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<S: Into<String>> From<S> for NodeType {
    fn from(s: S) -> Self {
        Self(s.into())
    }
}

/// An edge type identifier, represented as (src_type, relation, dst_type).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeType {
    /// Source node type.
    pub src_type: NodeType,
    /// Relation name.
    pub relation: String,
    /// Destination node type.
    pub dst_type: NodeType,
}

impl EdgeType {
    /// Create a new edge type.
    pub fn new(
        src_type: impl Into<NodeType>,
        relation: impl Into<String>,
        dst_type: impl Into<NodeType>,
    ) -> Self {
        Self {
            src_type: src_type.into(),
            relation: relation.into(),
            dst_type: dst_type.into(),
        }
    }

    /// Get the reverse edge type, named `rev_<relation>`.
    pub fn reverse(&self) -> Self {
        Self {
            src_type: self.dst_type.clone(),
            relation: format!("rev_{}", self.relation),
            dst_type: self.src_type.clone(),
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.src_type, self.relation, self.dst_type)
    }
}

/// Node index within a specific node type.
pub type TypedNodeIndex = usize;

/// Position of an edge within its relation's edge list.
pub type EdgeId = usize;

/// Growable edge storage used while a graph is under construction.
#[derive(Debug, Clone, Default)]
pub struct EdgeBuffer {
    /// Source node indices (local to src_type).
    pub src: Vec<TypedNodeIndex>,
    /// Target node indices (local to dst_type).
    pub dst: Vec<TypedNodeIndex>,
    /// Attribute columns, aligned with `src`/`dst`.
    pub attributes: BTreeMap<String, Vec<f32>>,
}

impl EdgeBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with reserved space.
    pub fn with_capacity(edges: usize) -> Self {
        Self {
            src: Vec::with_capacity(edges),
            dst: Vec::with_capacity(edges),
            attributes: BTreeMap::new(),
        }
    }

    /// Number of edges.
    pub fn num_edges(&self) -> usize {
        self.src.len()
    }

    /// Add an edge without attributes.
    pub fn add_edge(&mut self, src: TypedNodeIndex, dst: TypedNodeIndex) {
        self.src.push(src);
        self.dst.push(dst);
    }

    /// Move every edge and attribute value of `other` to the end of this buffer.
    pub fn append(&mut self, mut other: EdgeBuffer) {
        self.src.append(&mut other.src);
        self.dst.append(&mut other.dst);
        for (name, mut column) in other.attributes {
            self.attributes.entry(name).or_default().append(&mut column);
        }
    }

    /// Append a value to an attribute column.
    pub fn push_attribute(&mut self, name: &str, value: f32) {
        match self.attributes.get_mut(name) {
            Some(column) => column.push(value),
            None => {
                self.attributes.insert(name.to_string(), vec![value]);
            }
        }
    }
}

/// Frozen edge storage for one relation.
///
/// Edges are kept in COO form in insertion order; [`EdgeStore::incoming`]
/// returns the ids of the edges pointing at a destination node, in edge-id
/// order.
#[derive(Debug, Clone)]
pub struct EdgeStore {
    src: Box<[TypedNodeIndex]>,
    dst: Box<[TypedNodeIndex]>,
    attributes: BTreeMap<String, Box<[f32]>>,
    in_ptr: Box<[usize]>,
    in_edges: Box<[EdgeId]>,
}

impl EdgeStore {
    /// Freeze a buffer, validating it against the endpoint node counts.
    pub fn freeze(
        edge_type: &EdgeType,
        buffer: EdgeBuffer,
        num_src: usize,
        num_dst: usize,
    ) -> Result<Self> {
        let EdgeBuffer {
            src,
            dst,
            attributes,
        } = buffer;

        if src.len() != dst.len() {
            return Err(Error::SchemaMismatch(format!(
                "{edge_type} has {} sources but {} targets",
                src.len(),
                dst.len()
            )));
        }
        check_range(&edge_type.src_type, &src, num_src)?;
        check_range(&edge_type.dst_type, &dst, num_dst)?;
        for (name, column) in &attributes {
            if column.len() != src.len() {
                return Err(Error::SchemaMismatch(format!(
                    "attribute {name} of {edge_type} has {} values for {} edges",
                    column.len(),
                    src.len()
                )));
            }
        }

        // Counting sort by destination, stable in edge id.
        let mut in_ptr = vec![0usize; num_dst + 1];
        for &d in &dst {
            in_ptr[d + 1] += 1;
        }
        for i in 0..num_dst {
            in_ptr[i + 1] += in_ptr[i];
        }
        let mut fill = in_ptr.clone();
        let mut in_edges = vec![0usize; dst.len()];
        for (edge_id, &d) in dst.iter().enumerate() {
            in_edges[fill[d]] = edge_id;
            fill[d] += 1;
        }

        Ok(Self {
            src: src.into_boxed_slice(),
            dst: dst.into_boxed_slice(),
            attributes: attributes
                .into_iter()
                .map(|(name, column)| (name, column.into_boxed_slice()))
                .collect(),
            in_ptr: in_ptr.into_boxed_slice(),
            in_edges: in_edges.into_boxed_slice(),
        })
    }

    /// Number of edges.
    pub fn num_edges(&self) -> usize {
        self.src.len()
    }

    /// Whether the relation has no edges.
    pub fn is_empty(&self) -> bool {
        self.src.is_empty()
    }

    /// Source indices, one per edge.
    pub fn src(&self) -> &[TypedNodeIndex] {
        &self.src
    }

    /// Destination indices, one per edge.
    pub fn dst(&self) -> &[TypedNodeIndex] {
        &self.dst
    }

    /// The `(src, dst)` pair of an edge.
    pub fn edge(&self, edge_id: EdgeId) -> (TypedNodeIndex, TypedNodeIndex) {
        (self.src[edge_id], self.dst[edge_id])
    }

    /// Iterate over (src, dst) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (TypedNodeIndex, TypedNodeIndex)> + '_ {
        self.src.iter().copied().zip(self.dst.iter().copied())
    }

    /// An attribute column by name.
    pub fn attribute(&self, name: &str) -> Option<&[f32]> {
        self.attributes.get(name).map(|column| &column[..])
    }

    /// Attribute names in sorted order.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    /// Ids of the edges whose destination is `dst`.
    ///
    /// Returns an empty slice for indices outside the destination range.
    pub fn incoming(&self, dst: TypedNodeIndex) -> &[EdgeId] {
        match (self.in_ptr.get(dst), self.in_ptr.get(dst + 1)) {
            (Some(&start), Some(&end)) => &self.in_edges[start..end],
            _ => &[],
        }
    }

    /// Copy the selected edges (and their attributes) into a new buffer.
    ///
    /// With `reversed` the endpoints are swapped.
    pub fn select(&self, edge_ids: &[EdgeId], reversed: bool) -> EdgeBuffer {
        let mut buffer = EdgeBuffer::with_capacity(edge_ids.len());
        for &e in edge_ids {
            let (s, d) = self.edge(e);
            if reversed {
                buffer.add_edge(d, s);
            } else {
                buffer.add_edge(s, d);
            }
        }
        for (name, column) in &self.attributes {
            buffer
                .attributes
                .insert(name.clone(), edge_ids.iter().map(|&e| column[e]).collect());
        }
        buffer
    }
}

fn check_range(node_type: &NodeType, indices: &[TypedNodeIndex], num_nodes: usize) -> Result<()> {
    match indices.iter().find(|&&i| i >= num_nodes) {
        Some(&index) => Err(Error::NodeIndexOutOfRange {
            node_type: node_type.to_string(),
            index,
            num_nodes,
        }),
        None => Ok(()),
    }
}

/// Node type counts and relation signatures, used to size model parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Node count per node type.
    pub node_types: BTreeMap<NodeType, usize>,
    /// Every relation's `(src_type, relation, dst_type)` signature.
    pub edge_types: Vec<EdgeType>,
}

/// A frozen heterogeneous graph.
///
/// Relations are reference counted so graphs derived by the split engine
/// share the relations they do not modify.
#[derive(Debug, Clone, Default)]
pub struct HeteroGraph {
    node_counts: BTreeMap<NodeType, usize>,
    edge_stores: BTreeMap<EdgeType, Arc<EdgeStore>>,
}

impl HeteroGraph {
    /// Create an empty heterogeneous graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Freeze node counts and edge buffers into a graph.
    ///
    /// Fails if a relation references an unregistered node type or an index
    /// outside its type's range.
    pub fn from_parts(
        node_counts: BTreeMap<NodeType, usize>,
        relations: BTreeMap<EdgeType, EdgeBuffer>,
    ) -> Result<Self> {
        let mut graph = Self {
            node_counts,
            edge_stores: BTreeMap::new(),
        };
        for (edge_type, buffer) in relations {
            graph.insert_relation(edge_type, buffer)?;
        }
        Ok(graph)
    }

    fn insert_relation(&mut self, edge_type: EdgeType, buffer: EdgeBuffer) -> Result<()> {
        let num_src = self.node_count(&edge_type.src_type)?;
        let num_dst = self.node_count(&edge_type.dst_type)?;
        let store = EdgeStore::freeze(&edge_type, buffer, num_src, num_dst)?;
        self.edge_stores.insert(edge_type, Arc::new(store));
        Ok(())
    }

    fn node_count(&self, node_type: &NodeType) -> Result<usize> {
        self.node_counts.get(node_type).copied().ok_or_else(|| {
            Error::SchemaMismatch(format!("node type {node_type} is not registered"))
        })
    }

    /// A copy of this graph with one relation replaced (or added).
    pub fn with_relation(&self, edge_type: &EdgeType, buffer: EdgeBuffer) -> Result<Self> {
        let mut graph = self.clone();
        graph.insert_relation(edge_type.clone(), buffer)?;
        Ok(graph)
    }

    /// Number of node types.
    pub fn num_node_types(&self) -> usize {
        self.node_counts.len()
    }

    /// Number of edge types.
    pub fn num_edge_types(&self) -> usize {
        self.edge_stores.len()
    }

    /// Node types with their counts, in sorted order.
    pub fn node_types(&self) -> impl Iterator<Item = (&NodeType, usize)> {
        self.node_counts.iter().map(|(t, &n)| (t, n))
    }

    /// Edge types in sorted order.
    pub fn edge_types(&self) -> impl Iterator<Item = &EdgeType> {
        self.edge_stores.keys()
    }

    /// Relations with their stores, in sorted order.
    pub fn relations(&self) -> impl Iterator<Item = (&EdgeType, &EdgeStore)> {
        self.edge_stores.iter().map(|(t, s)| (t, s.as_ref()))
    }

    /// Whether the graph contains a relation.
    pub fn contains_relation(&self, edge_type: &EdgeType) -> bool {
        self.edge_stores.contains_key(edge_type)
    }

    /// Get edge store for a type.
    pub fn edge_store(&self, edge_type: &EdgeType) -> Option<&EdgeStore> {
        self.edge_stores.get(edge_type).map(Arc::as_ref)
    }

    /// Get edge store for a type, failing with [`Error::RelationNotFound`].
    pub fn relation(&self, edge_type: &EdgeType) -> Result<&EdgeStore> {
        self.edge_store(edge_type)
            .ok_or_else(|| Error::RelationNotFound(edge_type.to_string()))
    }

    /// Number of nodes of a given type.
    pub fn num_nodes(&self, node_type: &NodeType) -> usize {
        self.node_counts.get(node_type).copied().unwrap_or(0)
    }

    /// Number of edges of a given type.
    pub fn num_edges(&self, edge_type: &EdgeType) -> usize {
        self.edge_store(edge_type).map_or(0, EdgeStore::num_edges)
    }

    /// Total number of nodes across all types.
    pub fn total_nodes(&self) -> usize {
        self.node_counts.values().sum()
    }

    /// Total number of edges across all types.
    pub fn total_edges(&self) -> usize {
        self.edge_stores.values().map(|s| s.num_edges()).sum()
    }

    /// Sources of the edges pointing at `dst_idx` via a specific edge type.
    pub fn incoming_neighbors(
        &self,
        edge_type: &EdgeType,
        dst_idx: TypedNodeIndex,
    ) -> Vec<TypedNodeIndex> {
        self.edge_store(edge_type)
            .map(|store| {
                store
                    .incoming(dst_idx)
                    .iter()
                    .map(|&e| store.src()[e])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Node type counts and relation signatures.
    pub fn metadata(&self) -> Metadata {
        Metadata {
            node_types: self.node_counts.clone(),
            edge_types: self.edge_stores.keys().cloned().collect(),
        }
    }

    /// Add a `rev_<relation>` relation for every relation connecting two
    /// different node types.
    ///
    /// Edges and attributes are mirrored. Relations that already have their
    /// reverse present, and relations that are themselves the reverse of
    /// another relation, are left alone, so a second call is a no-op.
    pub fn to_undirected(&self) -> Result<Self> {
        let mut graph = self.clone();
        for (edge_type, store) in &self.edge_stores {
            let reverse = edge_type.reverse();
            let is_reverse = self.edge_stores.keys().any(|other| other.reverse() == *edge_type);
            if edge_type.src_type == edge_type.dst_type
                || is_reverse
                || self.contains_relation(&reverse)
            {
                continue;
            }
            let ids: Vec<EdgeId> = (0..store.num_edges()).collect();
            graph.insert_relation(reverse, store.select(&ids, true))?;
        }
        Ok(graph)
    }
}

/// Statistics for a heterogeneous graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeteroGraphStats {
    /// Number of node types.
    pub num_node_types: usize,
    /// Number of edge types.
    pub num_edge_types: usize,
    /// Total nodes.
    pub total_nodes: usize,
    /// Total edges.
    pub total_edges: usize,
    /// Nodes per type.
    pub nodes_by_type: BTreeMap<String, usize>,
    /// Edges per type.
    pub edges_by_type: BTreeMap<String, usize>,
}

impl HeteroGraph {
    /// Get statistics about the graph.
    pub fn stats(&self) -> HeteroGraphStats {
        HeteroGraphStats {
            num_node_types: self.num_node_types(),
            num_edge_types: self.num_edge_types(),
            total_nodes: self.total_nodes(),
            total_edges: self.total_edges(),
            nodes_by_type: self
                .node_counts
                .iter()
                .map(|(t, &n)| (t.0.clone(), n))
                .collect(),
            edges_by_type: self
                .edge_stores
                .iter()
                .map(|(t, s)| (t.to_string(), s.num_edges()))
                .collect(),
        }
    }
}
