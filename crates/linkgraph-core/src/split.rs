//! Random link split for link prediction.
//!
//! Partitions one target relation into train, validation and test edges:
//!
//! 1. Shuffle the relation's edge ids with the caller's RNG.
//! 2. Take `floor(num_test * E)` edges for test, `floor(num_val * E)` for
//!    validation and keep the rest for training.
//! 3. Within train, with `disjoint_train_ratio > 0`, the first
//!    `floor(ratio * |train|)` edges become supervision-only edges and the
//!    remainder message-passing edges. With a ratio of 0 the train
//!    supervision edges are the message edges.
//! 4. Validation and test propagate over the train message graph and
//!    supervise on their held-out positives plus uniformly drawn non-edges.
//!
//! Unlike PyTorch Geometric's `RandomLinkSplit`, which lets validation pass
//! messages over all train edges and test over train plus validation edges,
//! all three splits here share the train message graph. Train supervision
//! edges and validation positives never carry messages in any split.
//!
//! Train negatives are not generated; the consumer is expected to sample them.

use crate::config::{validate_ratios, LoaderConfig};
use crate::error::{Error, Result};
use crate::hetero::{EdgeId, EdgeStore, EdgeType, HeteroGraph, TypedNodeIndex};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Rejection-sampling attempts allowed per requested negative.
const ATTEMPTS_PER_NEGATIVE: usize = 32;

/// Candidate spaces up to this size are enumerated when rejection sampling stalls.
const ENUMERATION_LIMIT: u128 = 1 << 22;

/// One side of a link split: a message graph plus supervision edges.
#[derive(Debug, Clone)]
pub struct LinkSplit {
    /// Graph used for message passing.
    pub graph: Arc<HeteroGraph>,
    /// Target relation.
    pub edge_type: EdgeType,
    /// Supervision pairs, indices global to their node types.
    pub edge_label_index: Vec<(TypedNodeIndex, TypedNodeIndex)>,
    /// 1.0 for observed edges, 0.0 for synthesized negatives.
    pub edge_label: Vec<f32>,
    /// Original edge ids of the positive supervision edges.
    pub positive_edge_ids: Vec<EdgeId>,
    /// Original edge ids of the target relation's message edges.
    pub message_edge_ids: Arc<[EdgeId]>,
}

impl LinkSplit {
    /// Number of supervision pairs.
    pub fn num_labels(&self) -> usize {
        self.edge_label.len()
    }

    /// Number of positive supervision pairs.
    pub fn num_positives(&self) -> usize {
        self.positive_edge_ids.len()
    }

    /// Number of target-relation edges available for message passing.
    pub fn num_message_edges(&self) -> usize {
        self.message_edge_ids.len()
    }
}

/// Train/validation/test split of one relation.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomLinkSplit {
    /// Relation to split.
    pub edge_type: EdgeType,
    /// Reverse relation rebuilt from the train message edges, if any.
    pub rev_edge_type: Option<EdgeType>,
    /// Validation fraction of the relation's edges (default: 0.1).
    pub num_val: f64,
    /// Test fraction of the relation's edges (default: 0.1).
    pub num_test: f64,
    /// Fraction of train edges used only for supervision (default: 0.0).
    pub disjoint_train_ratio: f64,
    /// Negatives per val/test positive (default: 1.0).
    pub neg_sampling_ratio: f64,
}

impl RandomLinkSplit {
    pub fn new(edge_type: EdgeType) -> Self {
        Self {
            edge_type,
            rev_edge_type: None,
            num_val: 0.1,
            num_test: 0.1,
            disjoint_train_ratio: 0.0,
            neg_sampling_ratio: 1.0,
        }
    }

    /// Take ratios from a loader configuration.
    pub fn from_config(edge_type: EdgeType, config: &LoaderConfig) -> Self {
        Self::new(edge_type)
            .with_ratios(
                config.val_ratio,
                config.test_ratio,
                config.disjoint_train_ratio,
            )
            .with_neg_sampling_ratio(config.neg_sampling_ratio)
    }

    pub fn with_ratios(mut self, val: f64, test: f64, disjoint_train: f64) -> Self {
        self.num_val = val;
        self.num_test = test;
        self.disjoint_train_ratio = disjoint_train;
        self
    }

    pub fn with_neg_sampling_ratio(mut self, ratio: f64) -> Self {
        self.neg_sampling_ratio = ratio;
        self
    }

    /// Keep a reverse relation consistent with the split.
    ///
    /// In every split graph the reverse relation is replaced by the mirrored
    /// train message edges, so held-out edges cannot leak through it.
    pub fn with_reverse_edge_type(mut self, rev_edge_type: EdgeType) -> Self {
        self.rev_edge_type = Some(rev_edge_type);
        self
    }

    /// Split `graph` into `(train, val, test)`.
    pub fn split<R: Rng + ?Sized>(
        &self,
        graph: &HeteroGraph,
        rng: &mut R,
    ) -> Result<(LinkSplit, LinkSplit, LinkSplit)> {
        validate_ratios(self.num_val, self.num_test, self.disjoint_train_ratio)?;
        if !self.neg_sampling_ratio.is_finite() || self.neg_sampling_ratio < 0.0 {
            return Err(Error::InvalidSplitConfig(format!(
                "neg_sampling_ratio must be non-negative, got {}",
                self.neg_sampling_ratio
            )));
        }

        let store = graph.relation(&self.edge_type)?;
        if let Some(rev) = &self.rev_edge_type {
            if rev.src_type != self.edge_type.dst_type || rev.dst_type != self.edge_type.src_type {
                return Err(Error::SchemaMismatch(format!(
                    "{rev} is not a reverse of {}",
                    self.edge_type
                )));
            }
        }

        let num_edges = store.num_edges();
        let num_test = (self.num_test * num_edges as f64).floor() as usize;
        let num_val = (self.num_val * num_edges as f64).floor() as usize;
        let num_train = num_edges - num_test - num_val;
        if num_train == 0 {
            return Err(Error::InvalidSplitConfig(format!(
                "no training edges left for {} ({num_edges} edges, {num_val} val, {num_test} test)",
                self.edge_type
            )));
        }

        let mut perm: Vec<EdgeId> = (0..num_edges).collect();
        perm.shuffle(rng);
        let (test_ids, rest) = perm.split_at(num_test);
        let (val_ids, train_ids) = rest.split_at(num_val);

        let (label_ids, message_ids) = if self.disjoint_train_ratio > 0.0 {
            let num_disjoint = (self.disjoint_train_ratio * num_train as f64).floor() as usize;
            if num_disjoint == num_train {
                return Err(Error::InvalidSplitConfig(format!(
                    "disjoint_train_ratio {} leaves no message edges for {}",
                    self.disjoint_train_ratio, self.edge_type
                )));
            }
            train_ids.split_at(num_disjoint)
        } else {
            (train_ids, train_ids)
        };

        let mut message_ids = message_ids.to_vec();
        message_ids.sort_unstable();
        let message_ids: Arc<[EdgeId]> = message_ids.into();

        let mut message_graph = graph.with_relation(&self.edge_type, store.select(&message_ids, false))?;
        if let Some(rev) = &self.rev_edge_type {
            message_graph = message_graph.with_relation(rev, store.select(&message_ids, true))?;
        }
        let message_graph = Arc::new(message_graph);

        let train = LinkSplit {
            graph: Arc::clone(&message_graph),
            edge_type: self.edge_type.clone(),
            edge_label_index: label_ids.iter().map(|&e| store.edge(e)).collect(),
            edge_label: vec![1.0; label_ids.len()],
            positive_edge_ids: label_ids.to_vec(),
            message_edge_ids: Arc::clone(&message_ids),
        };

        let positives: HashSet<(TypedNodeIndex, TypedNodeIndex)> = store.iter().collect();
        let num_src = graph.num_nodes(&self.edge_type.src_type);
        let num_dst = graph.num_nodes(&self.edge_type.dst_type);

        let held_out = |ids: &[EdgeId], rng: &mut R| -> Result<LinkSplit> {
            let count = (self.neg_sampling_ratio * ids.len() as f64).round() as usize;
            let negatives = sample_negatives(&self.edge_type, num_src, num_dst, &positives, count, rng)?;
            let (edge_label_index, edge_label) = mix_labels(store, ids, negatives, rng);
            Ok(LinkSplit {
                graph: Arc::clone(&message_graph),
                edge_type: self.edge_type.clone(),
                edge_label_index,
                edge_label,
                positive_edge_ids: ids.to_vec(),
                message_edge_ids: Arc::clone(&message_ids),
            })
        };
        let val = held_out(val_ids, &mut *rng)?;
        let test = held_out(test_ids, &mut *rng)?;

        info!(
            relation = %self.edge_type,
            train_message = train.num_message_edges(),
            train_label = train.num_labels(),
            val_label = val.num_labels(),
            test_label = test.num_labels(),
            "split link relation"
        );
        Ok((train, val, test))
    }
}

/// Concatenate positives (label 1.0) and negatives (label 0.0), then shuffle together.
fn mix_labels<R: Rng + ?Sized>(
    store: &EdgeStore,
    positive_ids: &[EdgeId],
    negatives: Vec<(TypedNodeIndex, TypedNodeIndex)>,
    rng: &mut R,
) -> (Vec<(TypedNodeIndex, TypedNodeIndex)>, Vec<f32>) {
    let mut labelled: Vec<((TypedNodeIndex, TypedNodeIndex), f32)> = positive_ids
        .iter()
        .map(|&e| (store.edge(e), 1.0))
        .chain(negatives.into_iter().map(|pair| (pair, 0.0)))
        .collect();
    labelled.shuffle(rng);
    labelled.into_iter().unzip()
}

/// Draw `count` distinct pairs from `[0, num_src) x [0, num_dst)` absent from `positives`.
///
/// Rejection sampling is bounded. When it stalls, the remaining negatives are
/// drawn from enumerated candidates: the whole space when it is small,
/// otherwise the non-edges of sources visited in random order until enough
/// candidates are found. Fails with [`Error::NegativeSamplingExhausted`] only
/// when fewer than `count` non-edges exist.
pub fn sample_negatives<R: Rng + ?Sized>(
    edge_type: &EdgeType,
    num_src: usize,
    num_dst: usize,
    positives: &HashSet<(TypedNodeIndex, TypedNodeIndex)>,
    count: usize,
    rng: &mut R,
) -> Result<Vec<(TypedNodeIndex, TypedNodeIndex)>> {
    if count == 0 {
        return Ok(Vec::new());
    }

    let total = num_src as u128 * num_dst as u128;
    let available = total.saturating_sub(positives.len() as u128);
    if (count as u128) > available {
        return Err(Error::NegativeSamplingExhausted {
            edge_type: edge_type.to_string(),
            requested: count,
            available: usize::try_from(available).unwrap_or(usize::MAX),
        });
    }

    let mut chosen = HashSet::with_capacity(count);
    let mut negatives = Vec::with_capacity(count);
    let max_attempts = count.saturating_mul(ATTEMPTS_PER_NEGATIVE).max(1024);
    let mut attempts = 0;
    while negatives.len() < count && attempts < max_attempts {
        attempts += 1;
        let pair = (rng.gen_range(0..num_src), rng.gen_range(0..num_dst));
        if !positives.contains(&pair) && chosen.insert(pair) {
            negatives.push(pair);
        }
    }

    if negatives.len() < count {
        let missing = count - negatives.len();
        let exhaustive = total <= ENUMERATION_LIMIT;
        debug!(
            relation = %edge_type,
            found = negatives.len(),
            requested = count,
            exhaustive,
            "rejection sampling stalled, enumerating candidates"
        );

        let mut sources: Vec<TypedNodeIndex> = (0..num_src).collect();
        if !exhaustive {
            sources.shuffle(rng);
        }
        let mut candidates = Vec::new();
        for s in sources {
            candidates.extend(
                (0..num_dst)
                    .map(|d| (s, d))
                    .filter(|pair| !positives.contains(pair) && !chosen.contains(pair)),
            );
            if !exhaustive && candidates.len() >= missing {
                break;
            }
        }
        negatives.extend(candidates.choose_multiple(rng, missing).copied());
    }

    Ok(negatives)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hetero::{EdgeBuffer, NodeType};
    use rand::rngs::mock::StepRng;
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;
    use std::collections::BTreeMap;

    fn ratedby() -> EdgeType {
        EdgeType::new("movie", "ratedby", "user")
    }

    fn graph_from(edges: &[(usize, usize)], num_movies: usize, num_users: usize) -> HeteroGraph {
        let mut buffer = EdgeBuffer::new();
        for (i, &(s, d)) in edges.iter().enumerate() {
            buffer.add_edge(s, d);
            buffer.push_attribute("rating", i as f32);
        }
        let nodes = BTreeMap::from([
            (NodeType::new("movie"), num_movies),
            (NodeType::new("user"), num_users),
        ]);
        HeteroGraph::from_parts(nodes, BTreeMap::from([(ratedby(), buffer)])).unwrap()
    }

    /// 3 users, 2 movies, 4 ratings.
    fn scenario() -> HeteroGraph {
        graph_from(&[(0, 0), (1, 0), (0, 1), (1, 2)], 2, 3)
    }

    fn dense_graph(num_movies: usize, num_users: usize) -> HeteroGraph {
        let edges: Vec<_> = (0..num_movies)
            .flat_map(|m| (0..num_users).map(move |u| (m, u)))
            .filter(|(m, u)| (m + u) % 3 != 0)
            .collect();
        graph_from(&edges, num_movies, num_users)
    }

    #[test]
    fn test_scenario_counts() {
        let graph = scenario();
        let mut rng = XorShiftRng::seed_from_u64(7);
        let (train, val, test) = RandomLinkSplit::new(ratedby())
            .with_ratios(0.25, 0.25, 0.0)
            .split(&graph, &mut rng)
            .unwrap();

        assert_eq!(test.num_positives(), 1);
        assert_eq!(val.num_positives(), 1);
        assert_eq!(train.num_message_edges(), 2);
        assert_eq!(train.num_labels(), 2);
        assert_eq!(train.graph.num_edges(&ratedby()), 2);

        // Ratio 0: supervision edges are the message edges.
        let mut label_ids = train.positive_edge_ids.clone();
        label_ids.sort_unstable();
        assert_eq!(label_ids, train.message_edge_ids.to_vec());
        assert!(train.edge_label.iter().all(|&l| l == 1.0));

        for split in [&train, &val, &test] {
            for &(m, u) in &split.edge_label_index {
                assert!(m < 2 && u < 3);
            }
        }
    }

    #[test]
    fn test_disjoint_partition_is_complete() {
        let graph = dense_graph(6, 9);
        let num_edges = graph.num_edges(&ratedby());
        let mut rng = XorShiftRng::seed_from_u64(1);
        let (train, val, test) = RandomLinkSplit::new(ratedby())
            .with_ratios(0.2, 0.1, 0.3)
            .split(&graph, &mut rng)
            .unwrap();

        let message: HashSet<EdgeId> = train.message_edge_ids.iter().copied().collect();
        let label: HashSet<EdgeId> = train.positive_edge_ids.iter().copied().collect();
        assert!(message.is_disjoint(&label));
        assert_eq!(
            message.len() + label.len() + val.num_positives() + test.num_positives(),
            num_edges
        );

        let mut all: Vec<EdgeId> = message
            .iter()
            .chain(&label)
            .chain(&val.positive_edge_ids)
            .chain(&test.positive_edge_ids)
            .copied()
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..num_edges).collect::<Vec<_>>());
    }

    #[test]
    fn test_held_out_splits_share_train_message_graph() {
        let graph = dense_graph(5, 5);
        let mut rng = XorShiftRng::seed_from_u64(3);
        let (train, val, test) = RandomLinkSplit::new(ratedby())
            .with_ratios(0.2, 0.2, 0.25)
            .split(&graph, &mut rng)
            .unwrap();

        assert!(Arc::ptr_eq(&train.graph, &val.graph));
        assert!(Arc::ptr_eq(&train.graph, &test.graph));

        // Message edge attributes follow their edges.
        let store = train.graph.edge_store(&ratedby()).unwrap();
        let ratings = store.attribute("rating").unwrap();
        for (i, &e) in train.message_edge_ids.iter().enumerate() {
            assert_eq!(ratings[i], e as f32);
        }
    }

    #[test]
    fn test_held_out_graphs_carry_train_messages_only() {
        let graph = dense_graph(6, 6);
        let store = graph.edge_store(&ratedby()).unwrap();
        let mut rng = XorShiftRng::seed_from_u64(8);
        let (train, val, test) = RandomLinkSplit::new(ratedby())
            .with_ratios(0.2, 0.2, 0.3)
            .split(&graph, &mut rng)
            .unwrap();
        assert!(train.num_labels() > 0 && val.num_positives() > 0);

        for split in [&val, &test] {
            let message: HashSet<_> = split.graph.edge_store(&ratedby()).unwrap().iter().collect();
            assert_eq!(message.len(), train.num_message_edges());
            for &e in train.positive_edge_ids.iter().chain(&val.positive_edge_ids) {
                assert!(!message.contains(&store.edge(e)));
            }
        }
    }

    #[test]
    fn test_negatives_are_balanced_and_absent() {
        let graph = dense_graph(8, 8);
        let original: HashSet<_> = graph.edge_store(&ratedby()).unwrap().iter().collect();
        let mut rng = XorShiftRng::seed_from_u64(11);
        let (_, val, test) = RandomLinkSplit::new(ratedby())
            .with_ratios(0.15, 0.15, 0.0)
            .split(&graph, &mut rng)
            .unwrap();

        for split in [&val, &test] {
            let positives = split.edge_label.iter().filter(|&&l| l == 1.0).count();
            let negatives = split.edge_label.iter().filter(|&&l| l == 0.0).count();
            assert_eq!(positives, split.num_positives());
            assert_eq!(negatives, positives);

            for (pair, &label) in split.edge_label_index.iter().zip(&split.edge_label) {
                assert_eq!(original.contains(pair), label == 1.0);
            }
        }
    }

    #[test]
    fn test_negative_sampling_exhausted() {
        // Complete bipartite graph: no non-edges exist.
        let graph = graph_from(&[(0, 0), (0, 1), (1, 0), (1, 1)], 2, 2);
        let mut rng = XorShiftRng::seed_from_u64(0);
        let err = RandomLinkSplit::new(ratedby())
            .with_ratios(0.25, 0.25, 0.0)
            .split(&graph, &mut rng)
            .unwrap_err();

        assert_eq!(
            err,
            Error::NegativeSamplingExhausted {
                edge_type: ratedby().to_string(),
                requested: 1,
                available: 0,
            }
        );
    }

    #[test]
    fn test_enumeration_finds_last_candidates() {
        let positives: HashSet<_> = (0..20)
            .flat_map(|s| (0..20).map(move |d| (s, d)))
            .filter(|&(s, d)| (s, d) != (3, 4) && (s, d) != (17, 0))
            .collect();
        let mut rng = XorShiftRng::seed_from_u64(5);
        let mut negatives = sample_negatives(&ratedby(), 20, 20, &positives, 2, &mut rng).unwrap();
        negatives.sort_unstable();
        assert_eq!(negatives, vec![(3, 4), (17, 0)]);
    }

    #[test]
    fn test_large_space_falls_back_to_source_walk() {
        // 3000 x 3000 pairs is too many to enumerate. A constant generator
        // keeps drawing (0, 0), a positive, so rejection sampling stalls.
        let positives: HashSet<_> = (0..3000).map(|d| (0, d)).collect();
        let mut rng = StepRng::new(0, 0);
        let negatives = sample_negatives(&ratedby(), 3000, 3000, &positives, 10, &mut rng).unwrap();

        assert_eq!(negatives.len(), 10);
        let unique: HashSet<_> = negatives.iter().copied().collect();
        assert_eq!(unique.len(), 10);
        for pair in &negatives {
            assert!(!positives.contains(pair));
            assert!(pair.0 < 3000 && pair.1 < 3000);
        }
    }

    #[test]
    fn test_exhausted_only_when_candidates_run_out() {
        let positives: HashSet<_> = (0..4).flat_map(|s| (0..3).map(move |d| (s, d))).collect();
        let mut rng = StepRng::new(0, 0);
        let err = sample_negatives(&ratedby(), 4, 4, &positives, 5, &mut rng).unwrap_err();
        assert_eq!(
            err,
            Error::NegativeSamplingExhausted {
                edge_type: ratedby().to_string(),
                requested: 5,
                available: 4,
            }
        );

        let mut negatives = sample_negatives(&ratedby(), 4, 4, &positives, 4, &mut rng).unwrap();
        negatives.sort_unstable();
        assert_eq!(negatives, vec![(0, 3), (1, 3), (2, 3), (3, 3)]);
    }

    #[test]
    fn test_invalid_configs() {
        let graph = scenario();
        let mut rng = XorShiftRng::seed_from_u64(0);
        let cases = [
            RandomLinkSplit::new(ratedby()).with_ratios(0.5, 0.5, 0.0),
            RandomLinkSplit::new(ratedby()).with_ratios(-0.1, 0.1, 0.0),
            RandomLinkSplit::new(ratedby()).with_ratios(0.1, 0.1, 1.0),
            RandomLinkSplit::new(ratedby()).with_neg_sampling_ratio(-0.5),
        ];
        for split in cases {
            assert!(matches!(
                split.split(&graph, &mut rng),
                Err(Error::InvalidSplitConfig(_))
            ));
        }
    }

    #[test]
    fn test_empty_relation_has_no_training_edges() {
        let graph = graph_from(&[], 2, 2);
        let mut rng = XorShiftRng::seed_from_u64(0);
        assert!(matches!(
            RandomLinkSplit::new(ratedby()).split(&graph, &mut rng),
            Err(Error::InvalidSplitConfig(_))
        ));
    }

    #[test]
    fn test_unknown_relation() {
        let graph = scenario();
        let mut rng = XorShiftRng::seed_from_u64(0);
        let err = RandomLinkSplit::new(EdgeType::new("user", "rates", "movie"))
            .split(&graph, &mut rng)
            .unwrap_err();
        assert!(matches!(err, Error::RelationNotFound(_)));
    }

    #[test]
    fn test_same_seed_same_split() {
        let graph = dense_graph(6, 6);
        let splitter = RandomLinkSplit::new(ratedby()).with_ratios(0.2, 0.2, 0.2);
        let (a, b) = (
            splitter.split(&graph, &mut XorShiftRng::seed_from_u64(9)).unwrap(),
            splitter.split(&graph, &mut XorShiftRng::seed_from_u64(9)).unwrap(),
        );
        assert_eq!(a.0.positive_edge_ids, b.0.positive_edge_ids);
        assert_eq!(a.1.edge_label_index, b.1.edge_label_index);
        assert_eq!(a.2.edge_label, b.2.edge_label);
    }

    #[test]
    fn test_reverse_relation_rebuilt_from_train() {
        let graph = dense_graph(5, 6).to_undirected().unwrap();
        let rev = ratedby().reverse();
        let mut rng = XorShiftRng::seed_from_u64(2);
        let (train, val, _) = RandomLinkSplit::new(ratedby())
            .with_ratios(0.2, 0.2, 0.0)
            .with_reverse_edge_type(rev.clone())
            .split(&graph, &mut rng)
            .unwrap();

        let forward = train.graph.edge_store(&ratedby()).unwrap();
        let backward = train.graph.edge_store(&rev).unwrap();
        assert_eq!(forward.num_edges(), backward.num_edges());
        for ((s, d), (rs, rd)) in forward.iter().zip(backward.iter()) {
            assert_eq!((s, d), (rd, rs));
        }

        // Held-out positives are not reachable through the reverse relation.
        let reverse_pairs: HashSet<_> = backward.iter().map(|(u, m)| (m, u)).collect();
        for (pair, &label) in val.edge_label_index.iter().zip(&val.edge_label) {
            if label == 1.0 {
                assert!(!reverse_pairs.contains(pair));
            }
        }
    }

    #[test]
    fn test_reverse_relation_must_mirror_target() {
        let graph = scenario();
        let mut rng = XorShiftRng::seed_from_u64(0);
        let err = RandomLinkSplit::new(ratedby())
            .with_reverse_edge_type(EdgeType::new("movie", "rev_ratedby", "user"))
            .split(&graph, &mut rng)
            .unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch(_)));
    }
}
