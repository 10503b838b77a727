//! Raw identifier to dense index mapping.
//!
//! Source records identify entities by sparse raw keys (integer ids, strings).
//! An [`IdentifierMap`] assigns each distinct key of one node type a dense
//! index in `[0, len)`, in first-seen order.

use crate::error::{Error, Result};
use crate::hetero::{NodeType, TypedNodeIndex};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// Immutable bijection between the raw keys of one node type and `[0, len)`.
#[derive(Debug, Clone)]
pub struct IdentifierMap<K> {
    node_type: NodeType,
    keys: Vec<K>,
    key_to_idx: HashMap<K, TypedNodeIndex>,
}

impl<K> IdentifierMap<K>
where
    K: Eq + Hash + Clone + Debug,
{
    /// Build a map from raw keys; duplicates collapse onto one index.
    pub fn build(node_type: impl Into<NodeType>, raw_keys: impl IntoIterator<Item = K>) -> Self {
        let mut keys = Vec::new();
        let mut key_to_idx = HashMap::new();
        for key in raw_keys {
            if !key_to_idx.contains_key(&key) {
                key_to_idx.insert(key.clone(), keys.len());
                keys.push(key);
            }
        }
        Self {
            node_type: node_type.into(),
            keys,
            key_to_idx,
        }
    }

    /// Dense index of a raw key.
    pub fn lookup<Q>(&self, key: &Q) -> Result<TypedNodeIndex>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + Debug + ?Sized,
    {
        self.key_to_idx
            .get(key)
            .copied()
            .ok_or_else(|| Error::UnknownKey {
                node_type: self.node_type.to_string(),
                key: format!("{key:?}"),
            })
    }

    /// Raw key stored at a dense index.
    pub fn key(&self, idx: TypedNodeIndex) -> Option<&K> {
        self.keys.get(idx)
    }

    /// Whether the key was part of the build input.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.key_to_idx.contains_key(key)
    }

    /// Raw keys in index order.
    pub fn keys(&self) -> &[K] {
        &self.keys
    }
}

impl<K> IdentifierMap<K> {
    /// Node type this map indexes.
    pub fn node_type(&self) -> &NodeType {
        &self.node_type
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no key was indexed.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
