//! Entity features and anomaly scoring
//!
//! # Features
//! - Typed feature catalog and per-entity feature table
//! - Zero-value substitution so ratio/log features stay well-defined
//! - Seeded isolation forest scoring
//!
//! # Example
//! ```ignore
//! use lookout::ml::{score_table, FeatureCatalog, FeatureTable, ModelConfig};
//!
//! let table = FeatureTable::from_aggregates(FeatureCatalog::default(), &aggregates)?;
//! let scores = score_table(&table, &ModelConfig::default())?;
//! ```

pub mod features;
pub mod models;

use tracing::info;

pub use features::{fix_zero_error, Direction, Feature, FeatureCatalog, FeatureKind, FeatureTable};
pub use models::{validate_matrix, AnomalyModel, IsolationForest, ModelConfig};

use crate::error::Result;

/// Score every entity of a feature table, one score per entity in table order
pub fn score_table(table: &FeatureTable, config: &ModelConfig) -> Result<Vec<f64>> {
    let rows = table.rows();
    validate_matrix(&rows, table.catalog().len())?;

    let mut forest = IsolationForest::new(config);
    score_with(&mut forest, &rows)
}

/// Fit any anomaly model on `rows` and score the same rows
pub fn score_with<M: AnomalyModel + ?Sized>(model: &mut M, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
    model.fit(rows)?;
    let scores = rows
        .iter()
        .map(|row| model.score(row))
        .collect::<Result<Vec<f64>>>()?;

    info!(
        "{} scored {} entities (max score {:.3})",
        model.name(),
        scores.len(),
        scores.iter().copied().fold(0.0, f64::max)
    );
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> FeatureTable {
        let catalog = FeatureCatalog::new(vec![Feature::Life], vec![Feature::EdgesOut]).unwrap();
        let ids = (0..50).map(|i| format!("h{}", i)).collect();
        let mut life: Vec<f64> = (0..50).map(|i| 100.0 + (i % 5) as f64).collect();
        let mut edges: Vec<f64> = (0..50).map(|i| 10.0 + (i % 3) as f64).collect();
        life[49] = 1.0;
        edges[49] = 900.0;
        FeatureTable::new(catalog, ids, vec![life, edges]).unwrap()
    }

    #[test]
    fn test_score_table() {
        let config = ModelConfig {
            num_trees: 50,
            sample_size: 32,
            seed: 3,
            parallel: false,
        };
        let scores = score_table(&table(), &config).unwrap();

        assert_eq!(scores.len(), 50);
        let top = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(top, Some(49));
    }

    #[test]
    fn test_score_table_reproducible() {
        let config = ModelConfig::default();
        let a = score_table(&table(), &config).unwrap();
        let b = score_table(&table(), &config).unwrap();
        assert_eq!(a, b);
    }
}
