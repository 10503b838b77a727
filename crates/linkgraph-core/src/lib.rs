// Allow minor clippy style warnings at crate level
// These are mostly style preferences, not bugs
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]

//! Heterogeneous interaction graphs and neighbor-sampled link prediction batches.
//!
//! The crate turns tabular interaction records into a typed graph and feeds a
//! link prediction model with locally indexed minibatches:
//!
//! ```text
//! rows -> IdentifierMap -> RelationalEdgeBuilder -> HeteroGraph
//!      -> RandomLinkSplit -> {train, val, test} -> LinkNeighborLoader -> Minibatch
//! ```
//!
//! - [`remap`] - raw identifiers to dense indices, per node type
//! - [`hetero`] - frozen typed graph store ([`HeteroGraph`], [`EdgeStore`])
//! - [`builder`] - row-to-edge rules, including categorical field explosion
//! - [`split`] - train/val/test link split with disjoint supervision edges and
//!   negative sampling for evaluation
//! - [`loader`] - multi-hop, relation-aware neighbor sampling per minibatch
//! - [`dataset`] - the user/item/category layout wired end to end
//!
//! # Label leakage
//!
//! During training, an edge the model is asked to predict must not also be
//! available for message passing. This is guaranteed by the split (supervision
//! and message edges are a partition of the train edges when
//! `disjoint_train_ratio > 0`), not by the sampler, which samples from whatever
//! graph it is given.
//!
//! # Example
//!
//! ```rust
//! use linkgraph_core::dataset::{DatasetSchema, InteractionDataset, InteractionRow, ItemRow};
//! use linkgraph_core::LoaderConfig;
//!
//! let ratings = vec![
//!     InteractionRow::new(1, 10, 5.0),
//!     InteractionRow::new(1, 20, 3.0),
//!     InteractionRow::new(2, 10, 4.0),
//!     InteractionRow::new(3, 20, 2.0),
//! ];
//! let movies = vec![ItemRow::new(10, "Action|Thriller"), ItemRow::new(20, "Comedy")];
//!
//! let dataset = InteractionDataset::build(ratings, movies, DatasetSchema::default()).unwrap();
//! let config = LoaderConfig::default()
//!     .with_ratios(0.25, 0.25, 0.0)
//!     .with_batch_size(2)
//!     .with_seed(42);
//!
//! let mut loaders = dataset.loaders(&config).unwrap();
//! for batch in loaders.train.epoch() {
//!     assert!(batch.batch_size() <= 2);
//! }
//! ```

pub mod builder;
mod config;
pub mod dataset;
mod error;
pub mod hetero;
pub mod loader;
pub mod remap;
pub mod split;

pub use builder::{CategoricalRelation, CategoryRow, EdgeRow, RelationalEdgeBuilder, SimpleRelation};
pub use config::LoaderConfig;
pub use error::{Error, Result};
pub use hetero::{EdgeBuffer, EdgeStore, EdgeType, HeteroGraph, HeteroGraphStats, Metadata, NodeType};
pub use loader::{LinkNeighborLoader, LoaderOptions, Minibatch, SampledEdges};
pub use remap::IdentifierMap;
pub use split::{LinkSplit, RandomLinkSplit};
