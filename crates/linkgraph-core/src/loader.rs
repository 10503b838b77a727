//! Neighbor-sampled minibatches for link prediction.
//!
//! A [`LinkNeighborLoader`] walks a set of supervision edges in batches. For
//! every batch it expands the seed edges' endpoints over the message graph,
//! hop by hop, sampling at most `num_neighbors[h]` incoming edges per node and
//! relation, and emits a [`Minibatch`]: a locally renumbered subgraph plus the
//! batch's supervision edges in local indices.
//!
//! The loader samples from whatever graph it is handed. Keeping supervision
//! edges out of the message graph is the job of [`crate::split`].
//!
//! # Example
//!
//! ```rust
//! use linkgraph_core::hetero::{EdgeBuffer, EdgeType, HeteroGraph, NodeType};
//! use linkgraph_core::loader::{LinkNeighborLoader, LoaderOptions};
//! use rand::SeedableRng;
//! use rand_xorshift::XorShiftRng;
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//!
//! let rates = EdgeType::new("user", "rates", "movie");
//! let mut buffer = EdgeBuffer::new();
//! for (u, m) in [(0, 0), (1, 0), (1, 1), (2, 1)] {
//!     buffer.add_edge(u, m);
//! }
//! let nodes = BTreeMap::from([(NodeType::new("user"), 3), (NodeType::new("movie"), 2)]);
//! let graph = HeteroGraph::from_parts(nodes, BTreeMap::from([(rates.clone(), buffer)])).unwrap();
//!
//! let mut loader = LinkNeighborLoader::new(
//!     Arc::new(graph),
//!     rates,
//!     vec![(0, 1), (2, 0)],
//!     vec![1.0, 0.0],
//!     LoaderOptions::new(1, vec![2]),
//!     XorShiftRng::seed_from_u64(0),
//! )
//! .unwrap();
//!
//! let batches: Vec<_> = loader.epoch().collect();
//! assert_eq!(batches.len(), 2);
//! assert_eq!(batches[1].edge_label, vec![0.0]);
//! ```

use crate::config::{validate_batching, LoaderConfig};
use crate::error::{Error, Result};
use crate::hetero::{EdgeId, EdgeStore, EdgeType, HeteroGraph, NodeType, TypedNodeIndex};
use crate::split::LinkSplit;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_xorshift::XorShiftRng;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, trace};

/// Batching options for one loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderOptions {
    /// Supervision edges per batch.
    pub batch_size: usize,
    /// Fanout per hop; the number of entries is the number of hops.
    pub num_neighbors: Vec<usize>,
    /// Re-shuffle supervision edges at the start of every epoch.
    pub shuffle: bool,
}

impl LoaderOptions {
    pub fn new(batch_size: usize, num_neighbors: Vec<usize>) -> Self {
        Self {
            batch_size,
            num_neighbors,
            shuffle: false,
        }
    }

    /// Batch size and fanout from a loader configuration.
    pub fn from_config(config: &LoaderConfig, shuffle: bool) -> Self {
        Self {
            batch_size: config.batch_size,
            num_neighbors: config.num_neighbors.clone(),
            shuffle,
        }
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }
}

/// Sampled edges of one relation, in local indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampledEdges {
    /// Local source indices.
    pub src: Vec<usize>,
    /// Local destination indices.
    pub dst: Vec<usize>,
    /// Edge ids in the message graph's relation.
    pub edge_ids: Vec<EdgeId>,
    /// Attribute values of the sampled edges.
    pub attributes: BTreeMap<String, Vec<f32>>,
}

impl SampledEdges {
    fn with_attributes(store: &EdgeStore) -> Self {
        Self {
            attributes: store
                .attribute_names()
                .map(|name| (name.to_string(), Vec::new()))
                .collect(),
            ..Self::default()
        }
    }

    fn push(&mut self, src: usize, dst: usize, edge_id: EdgeId, store: &EdgeStore) {
        self.src.push(src);
        self.dst.push(dst);
        self.edge_ids.push(edge_id);
        for (name, column) in &mut self.attributes {
            if let Some(values) = store.attribute(name) {
                column.push(values[edge_id]);
            }
        }
    }

    pub fn num_edges(&self) -> usize {
        self.src.len()
    }

    /// Iterate over local (src, dst) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.src.iter().copied().zip(self.dst.iter().copied())
    }
}

/// One locally indexed training or evaluation step.
#[derive(Debug, Clone, PartialEq)]
pub struct Minibatch {
    /// Local to global node index lookup, per node type.
    pub node_ids: BTreeMap<NodeType, Vec<TypedNodeIndex>>,
    /// Nodes added per hop and type; entry 0 counts the seed nodes.
    pub num_sampled_nodes: BTreeMap<NodeType, Vec<usize>>,
    /// Sampled message edges, per relation.
    pub edges: BTreeMap<EdgeType, SampledEdges>,
    /// Relation the supervision edges belong to.
    pub edge_type: EdgeType,
    /// Supervision edges in local indices.
    pub edge_label_index: Vec<(usize, usize)>,
    /// Labels aligned with `edge_label_index`.
    pub edge_label: Vec<f32>,
    /// Positions of this batch's supervision edges in the loader's label set.
    pub input_ids: Vec<usize>,
}

impl Minibatch {
    /// Number of supervision edges.
    pub fn batch_size(&self) -> usize {
        self.edge_label.len()
    }

    /// Number of local nodes of a type.
    pub fn num_nodes(&self, node_type: &NodeType) -> usize {
        self.node_ids.get(node_type).map_or(0, Vec::len)
    }

    /// Global index of a local node.
    pub fn global_index(&self, node_type: &NodeType, local: usize) -> Option<TypedNodeIndex> {
        self.node_ids.get(node_type)?.get(local).copied()
    }

    /// Supervision edges mapped back to global indices.
    pub fn global_edge_label_index(&self) -> Option<Vec<(TypedNodeIndex, TypedNodeIndex)>> {
        let src_type = &self.edge_type.src_type;
        let dst_type = &self.edge_type.dst_type;
        self.edge_label_index
            .iter()
            .map(|&(s, d)| Some((self.global_index(src_type, s)?, self.global_index(dst_type, d)?)))
            .collect()
    }
}

#[derive(Debug, Clone)]
struct RelationSlots {
    edge_type: EdgeType,
    src: usize,
    dst: usize,
}

/// Local node set of one type: local index is the position in `global`.
#[derive(Debug, Default)]
struct LocalNodes {
    global: Vec<TypedNodeIndex>,
    local: HashMap<TypedNodeIndex, usize>,
}

impl LocalNodes {
    /// Local index of `node`, and whether it was just added.
    fn insert(&mut self, node: TypedNodeIndex) -> (usize, bool) {
        if let Some(&idx) = self.local.get(&node) {
            return (idx, false);
        }
        let idx = self.global.len();
        self.local.insert(node, idx);
        self.global.push(node);
        (idx, true)
    }
}

/// Lazy, restartable minibatch source over a set of supervision edges.
///
/// Not reentrant: advancing an epoch needs `&mut self`.
#[derive(Debug)]
pub struct LinkNeighborLoader<R = XorShiftRng> {
    graph: Arc<HeteroGraph>,
    edge_type: EdgeType,
    edge_label_index: Vec<(TypedNodeIndex, TypedNodeIndex)>,
    edge_label: Vec<f32>,
    options: LoaderOptions,
    rng: R,
    node_types: Vec<NodeType>,
    relations: Vec<RelationSlots>,
    label_slots: (usize, usize),
}

impl<R: Rng> LinkNeighborLoader<R> {
    /// Create a loader; every error condition of iteration is checked here.
    pub fn new(
        graph: Arc<HeteroGraph>,
        edge_type: EdgeType,
        edge_label_index: Vec<(TypedNodeIndex, TypedNodeIndex)>,
        edge_label: Vec<f32>,
        options: LoaderOptions,
        rng: R,
    ) -> Result<Self> {
        if edge_label_index.is_empty() {
            return Err(Error::EmptySeedSet(edge_type.to_string()));
        }
        if edge_label_index.len() != edge_label.len() {
            return Err(Error::InvalidConfig(format!(
                "{} supervision edges but {} labels",
                edge_label_index.len(),
                edge_label.len()
            )));
        }
        validate_batching(options.batch_size, &options.num_neighbors)?;
        graph.relation(&edge_type)?;

        let num_src = graph.num_nodes(&edge_type.src_type);
        let num_dst = graph.num_nodes(&edge_type.dst_type);
        for &(s, d) in &edge_label_index {
            for (node_type, index, num_nodes) in [
                (&edge_type.src_type, s, num_src),
                (&edge_type.dst_type, d, num_dst),
            ] {
                if index >= num_nodes {
                    return Err(Error::NodeIndexOutOfRange {
                        node_type: node_type.to_string(),
                        index,
                        num_nodes,
                    });
                }
            }
        }

        let node_types: Vec<NodeType> = graph.node_types().map(|(t, _)| t.clone()).collect();
        let slot = |node_type: &NodeType| -> Result<usize> {
            node_types
                .binary_search(node_type)
                .map_err(|_| Error::SchemaMismatch(format!("node type {node_type} is not registered")))
        };
        let relations = graph
            .edge_types()
            .map(|et| {
                Ok(RelationSlots {
                    edge_type: et.clone(),
                    src: slot(&et.src_type)?,
                    dst: slot(&et.dst_type)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let label_slots = (slot(&edge_type.src_type)?, slot(&edge_type.dst_type)?);

        debug!(
            relation = %edge_type,
            labels = edge_label.len(),
            batch_size = options.batch_size,
            hops = options.num_neighbors.len(),
            shuffle = options.shuffle,
            "created link neighbor loader"
        );

        Ok(Self {
            graph,
            edge_type,
            edge_label_index,
            edge_label,
            options,
            rng,
            node_types,
            relations,
            label_slots,
        })
    }

    /// Loader over a split's supervision edges and message graph.
    pub fn from_split(split: LinkSplit, options: LoaderOptions, rng: R) -> Result<Self> {
        Self::new(
            split.graph,
            split.edge_type,
            split.edge_label_index,
            split.edge_label,
            options,
            rng,
        )
    }

    /// Start a fresh pass over the supervision edges.
    ///
    /// Shuffles the visiting order when the loader was created with
    /// `shuffle`, otherwise keeps the original order.
    pub fn epoch(&mut self) -> Epoch<'_, R> {
        let mut order: Vec<usize> = (0..self.edge_label.len()).collect();
        if self.options.shuffle {
            order.shuffle(&mut self.rng);
        }
        Epoch {
            loader: self,
            order,
            cursor: 0,
        }
    }

    /// Number of supervision edges.
    pub fn num_labels(&self) -> usize {
        self.edge_label.len()
    }

    /// Number of batches per epoch.
    pub fn num_batches(&self) -> usize {
        self.edge_label.len().div_ceil(self.options.batch_size)
    }

    pub fn graph(&self) -> &Arc<HeteroGraph> {
        &self.graph
    }

    pub fn edge_type(&self) -> &EdgeType {
        &self.edge_type
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Sample the subgraph around the supervision edges at `positions`.
    fn sample(&mut self, positions: &[usize]) -> Minibatch {
        let graph = Arc::clone(&self.graph);
        let mut nodes: Vec<LocalNodes> = self.node_types.iter().map(|_| LocalNodes::default()).collect();
        let mut frontier: Vec<Vec<(TypedNodeIndex, usize)>> = vec![Vec::new(); nodes.len()];

        let (src_slot, dst_slot) = self.label_slots;
        let mut edge_label_index = Vec::with_capacity(positions.len());
        for &p in positions {
            let (s, d) = self.edge_label_index[p];
            let (s_local, s_new) = nodes[src_slot].insert(s);
            if s_new {
                frontier[src_slot].push((s, s_local));
            }
            let (d_local, d_new) = nodes[dst_slot].insert(d);
            if d_new {
                frontier[dst_slot].push((d, d_local));
            }
            edge_label_index.push((s_local, d_local));
        }

        let mut num_sampled_nodes: Vec<Vec<usize>> = nodes.iter().map(|n| vec![n.global.len()]).collect();
        let mut edges: Vec<SampledEdges> = self
            .relations
            .iter()
            .map(|rel| graph.edge_store(&rel.edge_type).map_or_else(SampledEdges::default, SampledEdges::with_attributes))
            .collect();

        for &fanout in &self.options.num_neighbors {
            let mut next: Vec<Vec<(TypedNodeIndex, usize)>> = vec![Vec::new(); nodes.len()];

            for (rel, sampled) in self.relations.iter().zip(edges.iter_mut()) {
                let Some(store) = graph.edge_store(&rel.edge_type) else {
                    continue;
                };
                for &(v, v_local) in &frontier[rel.dst] {
                    let incoming = store.incoming(v);
                    let chosen: Vec<EdgeId> = if incoming.len() <= fanout {
                        incoming.to_vec()
                    } else {
                        incoming.choose_multiple(&mut self.rng, fanout).copied().collect()
                    };
                    for e in chosen {
                        let u = store.src()[e];
                        let (u_local, is_new) = nodes[rel.src].insert(u);
                        if is_new {
                            next[rel.src].push((u, u_local));
                        }
                        sampled.push(u_local, v_local, e, store);
                    }
                }
            }

            for (counts, added) in num_sampled_nodes.iter_mut().zip(&next) {
                counts.push(added.len());
            }
            frontier = next;
        }

        let batch = Minibatch {
            node_ids: self
                .node_types
                .iter()
                .cloned()
                .zip(nodes.into_iter().map(|n| n.global))
                .collect(),
            num_sampled_nodes: self.node_types.iter().cloned().zip(num_sampled_nodes).collect(),
            edges: self
                .relations
                .iter()
                .map(|rel| rel.edge_type.clone())
                .zip(edges)
                .collect(),
            edge_type: self.edge_type.clone(),
            edge_label_index,
            edge_label: positions.iter().map(|&p| self.edge_label[p]).collect(),
            input_ids: positions.to_vec(),
        };
        trace!(
            labels = batch.batch_size(),
            edges = batch.edges.values().map(SampledEdges::num_edges).sum::<usize>(),
            "sampled minibatch"
        );
        batch
    }
}

/// One pass over a loader's supervision edges.
///
/// Yields `ceil(labels / batch_size)` minibatches; only the last may be short.
#[derive(Debug)]
pub struct Epoch<'a, R> {
    loader: &'a mut LinkNeighborLoader<R>,
    order: Vec<usize>,
    cursor: usize,
}

impl<R: Rng> Iterator for Epoch<'_, R> {
    type Item = Minibatch;

    fn next(&mut self) -> Option<Minibatch> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.loader.options.batch_size).min(self.order.len());
        let batch = self.loader.sample(&self.order[self.cursor..end]);
        self.cursor = end;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.order.len() - self.cursor).div_ceil(self.loader.options.batch_size);
        (remaining, Some(remaining))
    }
}

impl<R: Rng> ExactSizeIterator for Epoch<'_, R> {}

impl<'a, R: Rng> IntoIterator for &'a mut LinkNeighborLoader<R> {
    type Item = Minibatch;
    type IntoIter = Epoch<'a, R>;

    fn into_iter(self) -> Epoch<'a, R> {
        self.epoch()
    }
}
