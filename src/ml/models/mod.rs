//! Anomaly scoring models

pub mod isolation_forest;

pub use isolation_forest::IsolationForest;

use serde::{Deserialize, Serialize};

use crate::error::{LookOutError, Result};

/// Trait for entity anomaly scorers
pub trait AnomalyModel: Send + Sync {
    /// Train the model on the entity-by-feature matrix
    fn fit(&mut self, data: &[Vec<f64>]) -> Result<()>;

    /// Score a sample (higher = more anomalous); a sample whose width
    /// differs from the training data is an `InvalidFeatureMatrix` error
    fn score(&self, sample: &[f64]) -> Result<f64>;

    /// Get model name
    fn name(&self) -> &str;

    /// Check if model is trained
    fn is_trained(&self) -> bool;
}

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Number of trees in the ensemble
    pub num_trees: usize,
    /// Sub-sample size for each tree
    pub sample_size: usize,
    /// Random seed for reproducibility
    pub seed: u64,
    /// Build trees on the rayon pool when the `parallel` feature is enabled
    pub parallel: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            num_trees: 100,
            sample_size: 256,
            seed: 42,
            parallel: true,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_trees == 0 {
            return Err(LookOutError::InvalidConfig(
                "scoring.num_trees must be at least 1".to_string(),
            ));
        }
        if self.sample_size < 2 {
            return Err(LookOutError::InvalidConfig(
                "scoring.sample_size must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}

/// Check that a feature matrix is rectangular with the expected width,
/// finite, and not made of one repeated vector.
pub fn validate_matrix(data: &[Vec<f64>], width: usize) -> Result<()> {
    let first = data
        .first()
        .ok_or_else(|| LookOutError::InvalidFeatureMatrix("no entities".to_string()))?;

    if width == 0 {
        return Err(LookOutError::InvalidFeatureMatrix("no features".to_string()));
    }

    for (i, row) in data.iter().enumerate() {
        if row.len() != width {
            return Err(LookOutError::InvalidFeatureMatrix(format!(
                "entity {} has {} features, expected {}",
                i,
                row.len(),
                width
            )));
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(LookOutError::InvalidFeatureMatrix(format!(
                "entity {} has a non-finite feature value",
                i
            )));
        }
    }

    if data.iter().all(|row| row == first) {
        return Err(LookOutError::InvalidFeatureMatrix(
            "all entities share an identical feature vector".to_string(),
        ));
    }

    Ok(())
}
