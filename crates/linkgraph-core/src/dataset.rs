//! User-item interaction datasets.
//!
//! Wires the pieces together for the common recommender layout: interaction
//! records (user, item, rating) and item metadata with a delimited category
//! field. Reading the records is left to the caller.
//!
//! The resulting graph has three node types and two relations:
//!
//! ```text
//! (item, ratedby, user)   one edge per interaction, with a rating attribute
//! (category, of, item)    one edge per category label of an item
//! ```
//!
//! Users are indexed from the interaction records, items from the metadata
//! records; an interaction naming an item without metadata is an error.

use crate::builder::{CategoricalRelation, CategoryRow, EdgeRow, RelationalEdgeBuilder, SimpleRelation};
use crate::config::LoaderConfig;
use crate::error::Result;
use crate::hetero::{EdgeType, HeteroGraph, Metadata};
use crate::loader::{LinkNeighborLoader, LoaderOptions};
use crate::remap::IdentifierMap;
use crate::split::{LinkSplit, RandomLinkSplit};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

/// One interaction record.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionRow<U, I> {
    pub user: U,
    pub item: I,
    pub rating: f32,
}

impl<U, I> InteractionRow<U, I> {
    pub fn new(user: U, item: I, rating: f32) -> Self {
        Self { user, item, rating }
    }
}

/// One item metadata record.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRow<I> {
    pub item: I,
    /// Delimited category labels.
    pub categories: String,
}

impl<I> ItemRow<I> {
    pub fn new(item: I, categories: impl Into<String>) -> Self {
        Self {
            item,
            categories: categories.into(),
        }
    }
}

/// Node type and relation names of an interaction dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetSchema {
    pub user_type: String,
    pub item_type: String,
    pub category_type: String,
    /// Relation from items to the users who rated them.
    pub interaction_relation: String,
    /// Relation from categories to their items.
    pub category_relation: String,
    /// Name of the interaction attribute holding the rating.
    pub rating_attribute: String,
    pub delimiter: char,
    /// Add `rev_*` relations so messages also flow user -> item and item -> category.
    pub add_reverse_edges: bool,
}

impl Default for DatasetSchema {
    fn default() -> Self {
        Self {
            user_type: "user".into(),
            item_type: "movie".into(),
            category_type: "genre".into(),
            interaction_relation: "ratedby".into(),
            category_relation: "of".into(),
            rating_attribute: "rating".into(),
            delimiter: '|',
            add_reverse_edges: false,
        }
    }
}

impl DatasetSchema {
    /// `(item, ratedby, user)`: the relation links are predicted on.
    pub fn interaction_edge_type(&self) -> EdgeType {
        EdgeType::new(
            self.item_type.as_str(),
            self.interaction_relation.as_str(),
            self.user_type.as_str(),
        )
    }

    /// `(category, of, item)`.
    pub fn category_edge_type(&self) -> EdgeType {
        EdgeType::new(
            self.category_type.as_str(),
            self.category_relation.as_str(),
            self.item_type.as_str(),
        )
    }
}

/// A frozen interaction graph with the identifier maps used to build it.
#[derive(Debug, Clone)]
pub struct InteractionDataset<U, I> {
    graph: Arc<HeteroGraph>,
    schema: DatasetSchema,
    users: IdentifierMap<U>,
    items: IdentifierMap<I>,
    categories: IdentifierMap<String>,
}

impl<U, I> InteractionDataset<U, I>
where
    U: Eq + Hash + Clone + Debug,
    I: Eq + Hash + Clone + Debug,
{
    /// Index users, items and categories, then build and freeze the graph.
    ///
    /// Both row sources are consumed.
    pub fn build(
        interactions: impl IntoIterator<Item = InteractionRow<U, I>>,
        items: impl IntoIterator<Item = ItemRow<I>>,
        schema: DatasetSchema,
    ) -> Result<Self> {
        let interactions: Vec<InteractionRow<U, I>> = interactions.into_iter().collect();
        let items: Vec<ItemRow<I>> = items.into_iter().collect();

        let user_map = IdentifierMap::build(
            schema.user_type.as_str(),
            interactions.iter().map(|row| row.user.clone()),
        );
        let item_map = IdentifierMap::build(
            schema.item_type.as_str(),
            items.iter().map(|row| row.item.clone()),
        );

        let mut builder = RelationalEdgeBuilder::new();
        let ratings = SimpleRelation::new(schema.interaction_edge_type())
            .with_attribute(schema.rating_attribute.as_str());
        builder.add_relation(
            &ratings,
            &item_map,
            &user_map,
            interactions
                .into_iter()
                .map(|row| EdgeRow::new(row.item, row.user).with_values(vec![row.rating])),
        )?;

        let genres = CategoricalRelation::new(schema.category_edge_type(), schema.delimiter);
        let category_map = builder.explode_categorical(
            &genres,
            &item_map,
            items
                .into_iter()
                .map(|row| CategoryRow::new(row.item, row.categories)),
        )?;

        let mut graph = builder.finish()?;
        if schema.add_reverse_edges {
            graph = graph.to_undirected()?;
        }

        Ok(Self {
            graph: Arc::new(graph),
            schema,
            users: user_map,
            items: item_map,
            categories: category_map,
        })
    }

    /// Split the interaction relation into train/val/test.
    pub fn split<R: Rng + ?Sized>(&self, config: &LoaderConfig, rng: &mut R) -> Result<LinkSplits> {
        config.validate()?;
        let edge_type = self.schema.interaction_edge_type();
        let mut splitter = RandomLinkSplit::from_config(edge_type.clone(), config);
        if self.schema.add_reverse_edges {
            splitter = splitter.with_reverse_edge_type(edge_type.reverse());
        }
        let (train, val, test) = splitter.split(&self.graph, rng)?;
        Ok(LinkSplits { train, val, test })
    }

    /// Split with the configured seed and create the three loaders.
    pub fn loaders(&self, config: &LoaderConfig) -> Result<Loaders> {
        let mut rng = config.rng();
        self.split(config, &mut rng)?.into_loaders(config)
    }

    pub fn graph(&self) -> &Arc<HeteroGraph> {
        &self.graph
    }

    pub fn schema(&self) -> &DatasetSchema {
        &self.schema
    }

    pub fn users(&self) -> &IdentifierMap<U> {
        &self.users
    }

    pub fn items(&self) -> &IdentifierMap<I> {
        &self.items
    }

    pub fn categories(&self) -> &IdentifierMap<String> {
        &self.categories
    }

    /// Node counts and relation signatures of the full graph.
    pub fn metadata(&self) -> Metadata {
        self.graph.metadata()
    }
}

/// Train, validation and test sides of a link split.
#[derive(Debug, Clone)]
pub struct LinkSplits {
    pub train: LinkSplit,
    pub val: LinkSplit,
    pub test: LinkSplit,
}

impl LinkSplits {
    /// Loaders over the three splits: train shuffled, val and test in order.
    ///
    /// Each loader gets its own generator derived from the configured seed.
    pub fn into_loaders(self, config: &LoaderConfig) -> Result<Loaders> {
        Ok(Loaders {
            train: LinkNeighborLoader::from_split(
                self.train,
                LoaderOptions::from_config(config, true),
                config.rng_for(1),
            )?,
            val: LinkNeighborLoader::from_split(
                self.val,
                LoaderOptions::from_config(config, false),
                config.rng_for(2),
            )?,
            test: LinkNeighborLoader::from_split(
                self.test,
                LoaderOptions::from_config(config, false),
                config.rng_for(3),
            )?,
        })
    }
}

/// Train, validation and test loaders.
#[derive(Debug)]
pub struct Loaders {
    pub train: LinkNeighborLoader,
    pub val: LinkNeighborLoader,
    pub test: LinkNeighborLoader,
}
