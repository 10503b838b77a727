//! Loader configuration.
//!
//! ```rust
//! use linkgraph_core::LoaderConfig;
//!
//! let config = LoaderConfig::default()
//!     .with_ratios(0.1, 0.1, 0.3)
//!     .with_batch_size(256)
//!     .with_num_neighbors(vec![10, 5])
//!     .with_seed(7);
//! assert!(config.validate().is_ok());
//! ```

use crate::error::{Error, Result};
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;
use serde::{Deserialize, Serialize};

/// Split and batching options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Fraction of target edges held out for validation (default: 0.1).
    #[serde(alias = "valRatio")]
    pub val_ratio: f64,
    /// Fraction of target edges held out for testing (default: 0.1).
    #[serde(alias = "testRatio")]
    pub test_ratio: f64,
    /// Fraction of training edges used only as supervision (default: 0.2).
    #[serde(alias = "disjointTrainRatio")]
    pub disjoint_train_ratio: f64,
    /// Negatives per held-out positive for val/test (default: 1.0).
    #[serde(alias = "negSamplingRatio")]
    pub neg_sampling_ratio: f64,
    /// Supervision edges per minibatch (default: 128).
    #[serde(alias = "batchSize")]
    pub batch_size: usize,
    /// Fanout per hop (default: [20, 10]).
    #[serde(alias = "numNeighbors")]
    pub num_neighbors: Vec<usize>,
    /// Seed for shuffling and sampling (None = entropy).
    #[serde(alias = "randomSeed")]
    pub random_seed: Option<u64>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            val_ratio: 0.1,
            test_ratio: 0.1,
            disjoint_train_ratio: 0.2,
            neg_sampling_ratio: 1.0,
            batch_size: 128,
            num_neighbors: vec![20, 10],
            random_seed: None,
        }
    }
}

impl LoaderConfig {
    pub fn with_ratios(mut self, val: f64, test: f64, disjoint_train: f64) -> Self {
        self.val_ratio = val;
        self.test_ratio = test;
        self.disjoint_train_ratio = disjoint_train;
        self
    }

    pub fn with_neg_sampling_ratio(mut self, ratio: f64) -> Self {
        self.neg_sampling_ratio = ratio;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_num_neighbors(mut self, num_neighbors: Vec<usize>) -> Self {
        self.num_neighbors = num_neighbors;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    /// Check ratio ranges and batching options.
    pub fn validate(&self) -> Result<()> {
        validate_ratios(self.val_ratio, self.test_ratio, self.disjoint_train_ratio)?;
        if !self.neg_sampling_ratio.is_finite() || self.neg_sampling_ratio < 0.0 {
            return Err(Error::InvalidSplitConfig(format!(
                "neg_sampling_ratio must be non-negative, got {}",
                self.neg_sampling_ratio
            )));
        }
        validate_batching(self.batch_size, &self.num_neighbors)
    }

    /// Seeded generator, or an entropy-seeded one when no seed is set.
    pub fn rng(&self) -> XorShiftRng {
        match self.random_seed {
            Some(seed) => XorShiftRng::seed_from_u64(seed),
            None => XorShiftRng::from_entropy(),
        }
    }

    /// Generator for a derived stream (e.g. one loader of several).
    ///
    /// Streams with different `offset`s are independent but reproducible.
    pub fn rng_for(&self, offset: u64) -> XorShiftRng {
        match self.random_seed {
            Some(seed) => XorShiftRng::seed_from_u64(seed.wrapping_add(offset)),
            None => XorShiftRng::from_entropy(),
        }
    }
}

/// Ratio preconditions shared with [`crate::split::RandomLinkSplit`].
pub(crate) fn validate_ratios(val: f64, test: f64, disjoint_train: f64) -> Result<()> {
    for (name, value) in [
        ("val_ratio", val),
        ("test_ratio", test),
        ("disjoint_train_ratio", disjoint_train),
    ] {
        if !(0.0..1.0).contains(&value) {
            return Err(Error::InvalidSplitConfig(format!(
                "{name} must be in [0, 1), got {value}"
            )));
        }
    }
    if val + test >= 1.0 {
        return Err(Error::InvalidSplitConfig(format!(
            "val_ratio + test_ratio must be < 1, got {}",
            val + test
        )));
    }
    Ok(())
}

pub(crate) fn validate_batching(batch_size: usize, num_neighbors: &[usize]) -> Result<()> {
    if batch_size == 0 {
        return Err(Error::InvalidConfig("batch_size must be positive".into()));
    }
    if num_neighbors.iter().any(|&k| k == 0) {
        return Err(Error::InvalidConfig(format!(
            "num_neighbors entries must be positive, got {num_neighbors:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_default_is_valid() {
        assert!(LoaderConfig::default().validate().is_ok());
    }

    #[test]
    fn test_ratio_preconditions() {
        let bad = [(0.5, 0.5, 0.0), (-0.1, 0.1, 0.0), (0.1, 0.1, 1.0), (1.0, 0.0, 0.0)];
        for (val, test, disjoint) in bad {
            let config = LoaderConfig::default().with_ratios(val, test, disjoint);
            assert!(
                matches!(config.validate(), Err(Error::InvalidSplitConfig(_))),
                "{val} {test} {disjoint} should be rejected"
            );
        }
    }

    #[test]
    fn test_batching_preconditions() {
        let config = LoaderConfig::default().with_batch_size(0);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = LoaderConfig::default().with_num_neighbors(vec![5, 0]);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = LoaderConfig::default().with_neg_sampling_ratio(-1.0);
        assert!(matches!(config.validate(), Err(Error::InvalidSplitConfig(_))));
    }

    #[test]
    fn test_deserialize_snake_and_camel_case() {
        let snake: LoaderConfig = serde_json::from_str(
            r#"{"val_ratio": 0.2, "test_ratio": 0.1, "batch_size": 64, "num_neighbors": [5]}"#,
        )
        .unwrap();
        assert_eq!(snake.val_ratio, 0.2);
        assert_eq!(snake.batch_size, 64);
        assert_eq!(snake.num_neighbors, vec![5]);
        assert_eq!(snake.disjoint_train_ratio, 0.2);
        assert_eq!(snake.random_seed, None);

        let camel: LoaderConfig = serde_json::from_str(
            r#"{"valRatio": 0.25, "testRatio": 0.25, "disjointTrainRatio": 0.0, "randomSeed": 3}"#,
        )
        .unwrap();
        assert_eq!(camel.val_ratio, 0.25);
        assert_eq!(camel.disjoint_train_ratio, 0.0);
        assert_eq!(camel.random_seed, Some(3));
    }

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let config = LoaderConfig::default().with_seed(42);
        let (mut ra, mut rb) = (config.rng(), config.rng());
        let a: Vec<u32> = (0..4).map(|_| ra.gen()).collect();
        let b: Vec<u32> = (0..4).map(|_| rb.gen()).collect();
        assert_eq!(a, b);

        let mut r0 = config.rng_for(0);
        let mut r1 = config.rng_for(1);
        assert_ne!(r0.gen::<u64>(), r1.gen::<u64>());
    }
}
