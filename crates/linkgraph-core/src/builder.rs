//! Relational edge builder.
//!
//! Turns row-oriented records into a frozen [`HeteroGraph`]. Two kinds of
//! relation are supported:
//!
//! - [`SimpleRelation`]: one row yields one edge, plus any declared numeric
//!   attributes (e.g. a rating).
//! - [`CategoricalRelation`]: one row carries a delimited list of category
//!   labels and yields one `(label, entity)` edge per label. Category labels
//!   get their own [`IdentifierMap`], built over every label in the source.
//!
//! Row sources are taken by value and dropped once their edges are emitted.
//!
//! # Example
//!
//! ```rust
//! use linkgraph_core::builder::{CategoricalRelation, CategoryRow, EdgeRow, RelationalEdgeBuilder, SimpleRelation};
//! use linkgraph_core::hetero::EdgeType;
//! use linkgraph_core::remap::IdentifierMap;
//!
//! let users = IdentifierMap::build("user", ["alice", "bob"]);
//! let movies = IdentifierMap::build("movie", ["heat", "up"]);
//!
//! let mut builder = RelationalEdgeBuilder::new();
//! let rates = SimpleRelation::new(EdgeType::new("user", "rates", "movie")).with_attribute("rating");
//! builder
//!     .add_relation(&rates, &users, &movies, vec![
//!         EdgeRow::new("alice", "heat").with_values(vec![4.5]),
//!         EdgeRow::new("bob", "up").with_values(vec![3.0]),
//!     ])
//!     .unwrap();
//!
//! let genres = CategoricalRelation::new(EdgeType::new("genre", "of", "movie"), '|');
//! let genre_map = builder
//!     .explode_categorical(&genres, &movies, vec![
//!         CategoryRow::new("heat", "Action|Crime"),
//!         CategoryRow::new("up", "Animation"),
//!     ])
//!     .unwrap();
//!
//! let graph = builder.finish().unwrap();
//! assert_eq!(genre_map.len(), 3);
//! assert_eq!(graph.total_edges(), 5);
//! ```

use crate::error::{Error, Result};
use crate::hetero::{EdgeBuffer, EdgeType, HeteroGraph, NodeType, TypedNodeIndex};
use crate::remap::IdentifierMap;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::hash::Hash;
use tracing::{debug, info};

/// One interaction record: two endpoint keys and the declared attribute values.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRow<S, D> {
    /// Raw key of the source entity.
    pub src: S,
    /// Raw key of the target entity.
    pub dst: D,
    /// Attribute values, in the relation's declared order.
    pub values: Vec<f32>,
}

impl<S, D> EdgeRow<S, D> {
    pub fn new(src: S, dst: D) -> Self {
        Self {
            src,
            dst,
            values: Vec::new(),
        }
    }

    pub fn with_values(mut self, values: Vec<f32>) -> Self {
        self.values = values;
        self
    }
}

/// One entity metadata record with a delimited categorical field.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryRow<K> {
    /// Raw key of the entity.
    pub key: K,
    /// Delimited category labels, e.g. `"Action|Crime"`.
    pub field: String,
}

impl<K> CategoryRow<K> {
    pub fn new(key: K, field: impl Into<String>) -> Self {
        Self {
            key,
            field: field.into(),
        }
    }
}

/// A one-row-one-edge relation with named attribute columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleRelation {
    pub edge_type: EdgeType,
    pub attributes: Vec<String>,
}

impl SimpleRelation {
    pub fn new(edge_type: EdgeType) -> Self {
        Self {
            edge_type,
            attributes: Vec::new(),
        }
    }

    /// Declare an attribute column; row values follow declaration order.
    pub fn with_attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.push(name.into());
        self
    }
}

/// Edge-generation rule exploding a delimited field into `(label, entity)` edges.
///
/// `edge_type.src_type` is the category node type and `edge_type.dst_type`
/// the entity node type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoricalRelation {
    pub edge_type: EdgeType,
    pub delimiter: char,
}

impl CategoricalRelation {
    pub fn new(edge_type: EdgeType, delimiter: char) -> Self {
        Self {
            edge_type,
            delimiter,
        }
    }
}

/// Accumulates relations in growable buffers until [`finish`](Self::finish).
#[derive(Debug, Default)]
pub struct RelationalEdgeBuilder {
    node_counts: BTreeMap<NodeType, usize>,
    relations: BTreeMap<EdgeType, EdgeBuffer>,
}

impl RelationalEdgeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node type with its final count.
    ///
    /// Registering the same type again with a different count fails with
    /// [`Error::SchemaMismatch`].
    pub fn register_count(&mut self, node_type: &NodeType, count: usize) -> Result<()> {
        match self.node_counts.get(node_type) {
            Some(&existing) if existing != count => Err(Error::SchemaMismatch(format!(
                "node type {node_type} registered with {existing} nodes, then {count}"
            ))),
            Some(_) => Ok(()),
            None => {
                self.node_counts.insert(node_type.clone(), count);
                Ok(())
            }
        }
    }

    /// Register the node type indexed by `map`, sized by its key count.
    pub fn register_nodes<K>(&mut self, map: &IdentifierMap<K>) -> Result<()> {
        self.register_count(map.node_type(), map.len())
    }

    /// Append one edge per row to a simple relation.
    ///
    /// Returns the number of edges added. Both endpoint maps are registered
    /// as node types; their node types must match the relation's.
    pub fn add_relation<S, D, I>(
        &mut self,
        relation: &SimpleRelation,
        src_map: &IdentifierMap<S>,
        dst_map: &IdentifierMap<D>,
        rows: I,
    ) -> Result<usize>
    where
        S: Eq + Hash + Clone + Debug,
        D: Eq + Hash + Clone + Debug,
        I: IntoIterator<Item = EdgeRow<S, D>>,
    {
        let edge_type = &relation.edge_type;
        check_map_type(edge_type, &edge_type.src_type, src_map.node_type())?;
        check_map_type(edge_type, &edge_type.dst_type, dst_map.node_type())?;
        self.register_nodes(src_map)?;
        self.register_nodes(dst_map)?;

        // Rows are staged so a failing row leaves the relation untouched.
        let mut staged = EdgeBuffer::new();
        for (row, record) in rows.into_iter().enumerate() {
            let src = resolve(src_map, &record.src, edge_type, row, "source")?;
            let dst = resolve(dst_map, &record.dst, edge_type, row, "target")?;
            if record.values.len() != relation.attributes.len() {
                return Err(Error::AttributeMismatch {
                    edge_type: edge_type.to_string(),
                    row,
                    expected: relation.attributes.len(),
                    found: record.values.len(),
                });
            }
            staged.add_edge(src, dst);
            for (name, &value) in relation.attributes.iter().zip(&record.values) {
                staged.push_attribute(name, value);
            }
        }

        let added = staged.num_edges();
        self.relations.entry(edge_type.clone()).or_default().append(staged);
        debug!(relation = %edge_type, edges = added, "added simple relation");
        Ok(added)
    }

    /// Explode a delimited categorical field into `(label, entity)` edges.
    ///
    /// The label map is built over every label in `rows` (first-seen order)
    /// before any edge is emitted; edges follow row order, then label order
    /// within the field. Returns the label map.
    pub fn explode_categorical<K, I>(
        &mut self,
        relation: &CategoricalRelation,
        entity_map: &IdentifierMap<K>,
        rows: I,
    ) -> Result<IdentifierMap<String>>
    where
        K: Eq + Hash + Clone + Debug,
        I: IntoIterator<Item = CategoryRow<K>>,
    {
        let edge_type = &relation.edge_type;
        check_map_type(edge_type, &edge_type.dst_type, entity_map.node_type())?;

        let mut parsed: Vec<(TypedNodeIndex, Vec<String>)> = Vec::new();
        for (row, record) in rows.into_iter().enumerate() {
            let entity = resolve(entity_map, &record.key, edge_type, row, "target")?;
            let labels = split_categories(&record.field, relation.delimiter, row)?;
            parsed.push((entity, labels));
        }

        let label_map = IdentifierMap::build(
            edge_type.src_type.clone(),
            parsed.iter().flat_map(|(_, labels)| labels.iter().cloned()),
        );
        self.register_nodes(&label_map)?;
        self.register_nodes(entity_map)?;

        let buffer = self.relations.entry(edge_type.clone()).or_default();
        let before = buffer.num_edges();
        for (entity, labels) in &parsed {
            for label in labels {
                buffer.add_edge(label_map.lookup(label.as_str())?, *entity);
            }
        }

        debug!(
            relation = %edge_type,
            edges = buffer.num_edges() - before,
            categories = label_map.len(),
            "exploded categorical relation"
        );
        Ok(label_map)
    }

    /// Freeze every relation into an immutable graph.
    pub fn finish(self) -> Result<HeteroGraph> {
        let graph = HeteroGraph::from_parts(self.node_counts, self.relations)?;
        info!(
            node_types = graph.num_node_types(),
            edge_types = graph.num_edge_types(),
            nodes = graph.total_nodes(),
            edges = graph.total_edges(),
            "built heterogeneous graph"
        );
        Ok(graph)
    }
}

fn check_map_type(edge_type: &EdgeType, expected: &NodeType, found: &NodeType) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(Error::SchemaMismatch(format!(
            "relation {edge_type} expects node type {expected}, identifier map indexes {found}"
        )))
    }
}

fn resolve<K>(
    map: &IdentifierMap<K>,
    key: &K,
    edge_type: &EdgeType,
    row: usize,
    side: &'static str,
) -> Result<TypedNodeIndex>
where
    K: Eq + Hash + Clone + Debug,
{
    map.lookup(key).map_err(|_| Error::UnresolvedEndpoint {
        edge_type: edge_type.to_string(),
        row,
        side,
        key: format!("{key:?}"),
    })
}

/// Split a categorical field on `delimiter`, rejecting empty segments.
fn split_categories(field: &str, delimiter: char, row: usize) -> Result<Vec<String>> {
    field
        .split(delimiter)
        .map(|label| {
            if label.is_empty() {
                Err(Error::MalformedCategory {
                    row,
                    field: field.to_string(),
                })
            } else {
                Ok(label.to_string())
            }
        })
        .collect()
}
