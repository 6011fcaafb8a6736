//! Isolation Forest implementation
//!
//! Anomaly detection using isolation trees. Anomalies are easier to isolate
//! and thus have shorter path lengths in the trees.
//!
//! Every tree draws from its own ChaCha stream derived from the forest seed,
//! so a forest built in parallel is bit-identical to one built sequentially.

use rand::prelude::*;
use rand::seq::index;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::{validate_matrix, AnomalyModel, ModelConfig};
use crate::error::{LookOutError, Result};

const EULER_GAMMA: f64 = 0.5772156649;

/// Isolation Forest model for anomaly detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    /// Individual isolation trees
    trees: Vec<IsolationTree>,
    /// Number of trees
    num_trees: usize,
    /// Requested sample size for each tree
    sample_size: usize,
    /// Sample size actually used (capped by the number of entities)
    subsample: usize,
    /// Feature width seen at training time
    num_features: usize,
    seed: u64,
    parallel: bool,
    /// c(subsample), the normalization factor
    avg_path_length: f64,
    trained: bool,
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self::new(&ModelConfig::default())
    }
}

impl IsolationForest {
    /// Create a new Isolation Forest
    pub fn new(config: &ModelConfig) -> Self {
        Self::with_params(config.num_trees, config.sample_size, config.seed).parallel(config.parallel)
    }

    /// Create with custom parameters
    pub fn with_params(num_trees: usize, sample_size: usize, seed: u64) -> Self {
        Self {
            trees: Vec::new(),
            num_trees,
            sample_size,
            subsample: 0,
            num_features: 0,
            seed,
            parallel: false,
            avg_path_length: 0.0,
            trained: false,
        }
    }

    /// Toggle parallel tree construction
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Expected path length of an unsuccessful search in a random binary
    /// tree of `n` nodes (c(n) function)
    pub fn average_path_length(n: usize) -> f64 {
        match n {
            0 | 1 => 0.0,
            2 => 1.0,
            _ => {
                let n = n as f64;
                2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
            }
        }
    }

    /// Number of trained trees
    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Score every row of a matrix
    pub fn score_all(&self, data: &[Vec<f64>]) -> Result<Vec<f64>> {
        data.iter().map(|row| self.score(row)).collect()
    }

    /// Reject samples the trained trees cannot route
    fn check_sample(&self, sample: &[f64]) -> Result<()> {
        if self.trained && sample.len() != self.num_features {
            return Err(LookOutError::InvalidFeatureMatrix(format!(
                "sample has {} features, model was trained on {}",
                sample.len(),
                self.num_features
            )));
        }
        if sample.iter().any(|v| !v.is_finite()) {
            return Err(LookOutError::InvalidFeatureMatrix(
                "sample has a non-finite feature value".to_string(),
            ));
        }
        Ok(())
    }

    /// Score a single sample of the training width
    fn score_sample(&self, sample: &[f64]) -> f64 {
        if self.trees.is_empty() || self.avg_path_length == 0.0 {
            return 1.0;
        }

        // Summed in tree order so the result does not depend on build order
        let total_path_length: f64 = self
            .trees
            .iter()
            .map(|tree| tree.path_length(sample))
            .sum();

        let avg_path = total_path_length / self.trees.len() as f64;

        // Anomaly score: 2^(-avg_path / c(sample_size))
        2.0_f64.powf(-avg_path / self.avg_path_length)
    }

    fn build_tree(&self, data: &[Vec<f64>], tree_idx: usize, max_depth: usize) -> IsolationTree {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(tree_idx as u64);

        // Sample without replacement
        let indices: Vec<usize> = index::sample(&mut rng, data.len(), self.subsample).into_vec();

        IsolationTree::build(data, indices, max_depth, &mut rng)
    }

    #[cfg(feature = "parallel")]
    fn build_trees(&self, data: &[Vec<f64>], max_depth: usize) -> Vec<IsolationTree> {
        if self.parallel {
            (0..self.num_trees)
                .into_par_iter()
                .map(|t| self.build_tree(data, t, max_depth))
                .collect()
        } else {
            (0..self.num_trees)
                .map(|t| self.build_tree(data, t, max_depth))
                .collect()
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn build_trees(&self, data: &[Vec<f64>], max_depth: usize) -> Vec<IsolationTree> {
        (0..self.num_trees)
            .map(|t| self.build_tree(data, t, max_depth))
            .collect()
    }
}

impl AnomalyModel for IsolationForest {
    fn fit(&mut self, data: &[Vec<f64>]) -> Result<()> {
        let width = data.first().map(|row| row.len()).unwrap_or(0);
        validate_matrix(data, width)?;

        self.num_features = width;
        self.subsample = self.sample_size.min(data.len());
        self.avg_path_length = Self::average_path_length(self.subsample);

        let max_depth = (self.subsample as f64).log2().ceil() as usize;
        self.trees = self.build_trees(data, max_depth);
        self.trained = true;

        debug!(
            "Isolation forest trained: {} trees, subsample {}, max depth {}",
            self.trees.len(),
            self.subsample,
            max_depth
        );
        Ok(())
    }

    fn score(&self, sample: &[f64]) -> Result<f64> {
        self.check_sample(sample)?;
        Ok(self.score_sample(sample))
    }

    fn name(&self) -> &str {
        "IsolationForest"
    }

    fn is_trained(&self) -> bool {
        self.trained
    }
}

/// A single isolation tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationTree {
    root: IsolationNode,
}

impl IsolationTree {
    /// Build an isolation tree over the rows selected by `indices`
    fn build<R: Rng>(data: &[Vec<f64>], indices: Vec<usize>, max_depth: usize, rng: &mut R) -> Self {
        let root = Self::build_node(data, indices, 0, max_depth, rng);
        Self { root }
    }

    /// Recursively build tree nodes
    fn build_node<R: Rng>(
        data: &[Vec<f64>],
        indices: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut R,
    ) -> IsolationNode {
        // Terminal conditions
        if depth >= max_depth || indices.len() <= 1 {
            return IsolationNode::Leaf {
                size: indices.len(),
            };
        }

        // Features that can still separate the node's entities
        let n_features = data[indices[0]].len();
        let splittable: Vec<(usize, f64, f64)> = (0..n_features)
            .filter_map(|f| {
                let (min_val, max_val) = indices.iter().fold(
                    (f64::INFINITY, f64::NEG_INFINITY),
                    |(lo, hi), &i| (lo.min(data[i][f]), hi.max(data[i][f])),
                );
                (max_val > min_val).then_some((f, min_val, max_val))
            })
            .collect();

        if splittable.is_empty() {
            return IsolationNode::Leaf {
                size: indices.len(),
            };
        }

        // Randomly select feature and split point
        let (feature_idx, min_val, max_val) = splittable[rng.random_range(0..splittable.len())];
        let split_value = rng.random_range(min_val..max_val);

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| data[i][feature_idx] < split_value);

        let left = Self::build_node(data, left, depth + 1, max_depth, rng);
        let right = Self::build_node(data, right, depth + 1, max_depth, rng);

        IsolationNode::Internal {
            feature_idx,
            split_value,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Path length for a sample, with the c(size) correction at the leaf.
    /// `sample` must have the training width.
    fn path_length(&self, sample: &[f64]) -> f64 {
        let mut node = &self.root;
        let mut depth = 0usize;

        loop {
            match node {
                IsolationNode::Leaf { size } => {
                    return depth as f64 + IsolationForest::average_path_length(*size);
                }
                IsolationNode::Internal {
                    feature_idx,
                    split_value,
                    left,
                    right,
                } => {
                    node = if sample[*feature_idx] < *split_value {
                        left
                    } else {
                        right
                    };
                    depth += 1;
                }
            }
        }
    }
}

/// Node in an isolation tree
#[derive(Debug, Clone, Serialize, Deserialize)]
enum IsolationNode {
    /// Internal node with split
    Internal {
        feature_idx: usize,
        split_value: f64,
        left: Box<IsolationNode>,
        right: Box<IsolationNode>,
    },
    /// Leaf node
    Leaf { size: usize },
}
