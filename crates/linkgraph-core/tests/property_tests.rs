//! Property-based tests for graph construction, link splits and minibatches.
//!
//! These tests verify invariants that should hold for any input:
//! - Identifier maps are bijections onto a dense range
//! - Edges stay within their node types' ranges
//! - Splits partition the target relation
//! - Synthesized negatives are never observed edges
//! - Minibatches only reference local nodes
//! - An unshuffled epoch visits every supervision edge once, in order

use linkgraph_core::hetero::{EdgeBuffer, EdgeType, HeteroGraph, NodeType};
use linkgraph_core::loader::{LinkNeighborLoader, LoaderOptions};
use linkgraph_core::remap::IdentifierMap;
use linkgraph_core::split::RandomLinkSplit;
use linkgraph_core::{EdgeRow, RelationalEdgeBuilder, SimpleRelation};
use proptest::prelude::*;
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

fn ratedby() -> EdgeType {
    EdgeType::new("movie", "ratedby", "user")
}

fn graph_from(num_movies: usize, num_users: usize, edges: &[(usize, usize)]) -> HeteroGraph {
    let mut buffer = EdgeBuffer::new();
    for &(m, u) in edges {
        buffer.add_edge(m, u);
    }
    let nodes = BTreeMap::from([
        (NodeType::new("movie"), num_movies),
        (NodeType::new("user"), num_users),
    ]);
    HeteroGraph::from_parts(nodes, BTreeMap::from([(ratedby(), buffer)])).unwrap()
}

prop_compose! {
    /// A bipartite graph using at most half of the possible pairs.
    fn arb_graph()(num_movies in 2usize..8, num_users in 2usize..8)(
        edges in prop::collection::btree_set(
            (0..num_movies, 0..num_users),
            1..=(num_movies * num_users / 2),
        ),
        num_movies in Just(num_movies),
        num_users in Just(num_users),
    ) -> (usize, usize, Vec<(usize, usize)>) {
        (num_movies, num_users, edges.into_iter().collect())
    }
}

mod remap_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn identifier_map_is_dense_bijection(keys in prop::collection::vec(any::<u16>(), 0..100)) {
            let map = IdentifierMap::build("user", keys.iter().copied());
            let distinct: HashSet<u16> = keys.iter().copied().collect();
            prop_assert_eq!(map.len(), distinct.len());

            let indices: HashSet<usize> = distinct
                .iter()
                .map(|k| map.lookup(k).unwrap())
                .collect();
            prop_assert_eq!(indices.len(), distinct.len());
            prop_assert_eq!(indices, (0..distinct.len()).collect::<HashSet<_>>());

            for (idx, key) in map.keys().iter().enumerate() {
                prop_assert_eq!(map.lookup(key).unwrap(), idx);
            }
        }

        #[test]
        fn unseen_keys_are_rejected(keys in prop::collection::vec(0u16..100, 1..50), probe in 100u16..200) {
            let map = IdentifierMap::build("movie", keys);
            prop_assert!(map.lookup(&probe).is_err());
        }
    }
}

mod builder_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn built_edges_stay_in_range(
            rows in prop::collection::vec((0u8..20, 0u8..30, 0.0f32..5.0), 1..60),
        ) {
            let movies = IdentifierMap::build("movie", rows.iter().map(|r| r.0));
            let users = IdentifierMap::build("user", rows.iter().map(|r| r.1));
            let rule = SimpleRelation::new(ratedby()).with_attribute("rating");

            let mut builder = RelationalEdgeBuilder::new();
            let added = builder
                .add_relation(
                    &rule,
                    &movies,
                    &users,
                    rows.iter().map(|&(m, u, r)| EdgeRow::new(m, u).with_values(vec![r])),
                )
                .unwrap();
            prop_assert_eq!(added, rows.len());

            let graph = builder.finish().unwrap();
            let store = graph.edge_store(&ratedby()).unwrap();
            prop_assert_eq!(store.attribute("rating").unwrap().len(), store.num_edges());
            for (m, u) in store.iter() {
                prop_assert!(m < movies.len());
                prop_assert!(u < users.len());
            }
            for (k, (m, u)) in store.iter().enumerate() {
                prop_assert_eq!(movies.key(m), Some(&rows[k].0));
                prop_assert_eq!(users.key(u), Some(&rows[k].1));
            }
        }
    }
}

mod split_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn disjoint_split_partitions_relation(
            (num_movies, num_users, edges) in arb_graph(),
            val in 0.0f64..0.3,
            test in 0.0f64..0.3,
            disjoint in 0.05f64..0.6,
            seed in any::<u64>(),
        ) {
            let graph = graph_from(num_movies, num_users, &edges);
            let mut rng = XorShiftRng::seed_from_u64(seed);
            let (train, val_split, test_split) = RandomLinkSplit::new(ratedby())
                .with_ratios(val, test, disjoint)
                .split(&graph, &mut rng)
                .unwrap();

            let message: HashSet<usize> = train.message_edge_ids.iter().copied().collect();
            let label: HashSet<usize> = train.positive_edge_ids.iter().copied().collect();
            prop_assert!(message.is_disjoint(&label));
            prop_assert_eq!(
                message.len() + label.len() + val_split.num_positives() + test_split.num_positives(),
                edges.len()
            );
            prop_assert_eq!(train.graph.num_edges(&ratedby()), message.len());
        }

        #[test]
        fn negatives_are_never_observed_edges(
            (num_movies, num_users, edges) in arb_graph(),
            seed in any::<u64>(),
        ) {
            let graph = graph_from(num_movies, num_users, &edges);
            let observed: HashSet<(usize, usize)> = edges.iter().copied().collect();
            let mut rng = XorShiftRng::seed_from_u64(seed);
            let (_, val, test) = RandomLinkSplit::new(ratedby())
                .with_ratios(0.2, 0.2, 0.0)
                .split(&graph, &mut rng)
                .unwrap();

            for split in [&val, &test] {
                let negatives = split.edge_label.iter().filter(|&&l| l == 0.0).count();
                prop_assert_eq!(negatives, split.num_positives());
                for (pair, &label) in split.edge_label_index.iter().zip(&split.edge_label) {
                    prop_assert!(pair.0 < num_movies && pair.1 < num_users);
                    if label == 0.0 {
                        prop_assert!(!observed.contains(pair));
                    }
                }
            }
        }
    }
}

mod loader_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn minibatches_are_local(
            (num_movies, num_users, edges) in arb_graph(),
            batch_size in 1usize..5,
            fanout in prop::collection::vec(1usize..4, 0..3),
            seed in any::<u64>(),
        ) {
            let graph = Arc::new(graph_from(num_movies, num_users, &edges).to_undirected().unwrap());
            let labels = vec![1.0; edges.len()];
            let mut loader = LinkNeighborLoader::new(
                Arc::clone(&graph),
                ratedby(),
                edges.clone(),
                labels,
                LoaderOptions::new(batch_size, fanout).with_shuffle(true),
                XorShiftRng::seed_from_u64(seed),
            )
            .unwrap();

            for batch in loader.epoch() {
                for (node_type, ids) in &batch.node_ids {
                    let unique: HashSet<_> = ids.iter().collect();
                    prop_assert_eq!(unique.len(), ids.len());
                    prop_assert!(ids.iter().all(|&g| g < graph.num_nodes(node_type)));
                }
                for (edge_type, sampled) in &batch.edges {
                    let num_src = batch.num_nodes(&edge_type.src_type);
                    let num_dst = batch.num_nodes(&edge_type.dst_type);
                    prop_assert!(sampled.iter().all(|(s, d)| s < num_src && d < num_dst));
                }
                let global = batch.global_edge_label_index();
                prop_assert!(global.is_some());
                for (k, pair) in global.unwrap_or_default().into_iter().enumerate() {
                    prop_assert_eq!(pair, edges[batch.input_ids[k]]);
                }
            }
        }

        #[test]
        fn unshuffled_epoch_covers_labels_in_order(
            (num_movies, num_users, edges) in arb_graph(),
            batch_size in 1usize..6,
        ) {
            let graph = Arc::new(graph_from(num_movies, num_users, &edges));
            let labels: Vec<f32> = (0..edges.len()).map(|i| i as f32).collect();
            let mut loader = LinkNeighborLoader::new(
                graph,
                ratedby(),
                edges.clone(),
                labels.clone(),
                LoaderOptions::new(batch_size, vec![2]),
                XorShiftRng::seed_from_u64(0),
            )
            .unwrap();

            let batches: Vec<_> = loader.epoch().collect();
            let sizes: Vec<usize> = batches.iter().map(|b| b.batch_size()).collect();
            prop_assert_eq!(sizes.iter().sum::<usize>(), edges.len());
            if let Some((last, full)) = sizes.split_last() {
                prop_assert!(full.iter().all(|&n| n == batch_size));
                prop_assert!(*last >= 1 && *last <= batch_size);
            }

            let visited: Vec<f32> = batches.iter().flat_map(|b| b.edge_label.clone()).collect();
            prop_assert_eq!(visited, labels);
        }
    }
}
