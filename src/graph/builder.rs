//! Coverage graph construction from plot rank lists
//!
//! An outlier ranked `r` in a plot gets raw weight `1 / r^p`. The scaled
//! matrix divides each plot's row by its maximum so every plot's best
//! explained outlier weighs 1; the normal matrix keeps raw weights and only
//! serves as the coverage ceiling.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Graph, WeightMatrix};
use crate::error::{LookOutError, Result};
use crate::outliers::OutlierSet;
use crate::plots::RankList;

/// Scaled and normal matrices over one outlier set
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawCoverageGraph")]
pub struct CoverageGraph {
    scaled: WeightMatrix,
    normal: WeightMatrix,
    outliers: Vec<String>,
}

#[derive(Deserialize)]
struct RawCoverageGraph {
    scaled: WeightMatrix,
    normal: WeightMatrix,
    outliers: Vec<String>,
}

impl TryFrom<RawCoverageGraph> for CoverageGraph {
    type Error = LookOutError;

    fn try_from(raw: RawCoverageGraph) -> Result<Self> {
        let shape = |m: &WeightMatrix| (m.num_rows(), m.num_cols());
        if shape(&raw.scaled) != shape(&raw.normal) || raw.normal.num_cols() != raw.outliers.len() {
            return Err(LookOutError::EntityAlignment(format!(
                "scaled {:?} and normal {:?} matrices over {} outliers",
                shape(&raw.scaled),
                shape(&raw.normal),
                raw.outliers.len()
            )));
        }
        Ok(Self {
            scaled: raw.scaled,
            normal: raw.normal,
            outliers: raw.outliers,
        })
    }
}

impl CoverageGraph {
    pub fn scaled(&self) -> &WeightMatrix {
        &self.scaled
    }

    pub fn normal(&self) -> &WeightMatrix {
        &self.normal
    }

    /// Outlier ids in column order
    pub fn outliers(&self) -> &[String] {
        &self.outliers
    }

    /// Immutable selection graph: scaled weights, TopK keyed on normal row sums
    pub fn graph(&self) -> Graph {
        Graph {
            weights: self.scaled.clone(),
            row_totals: self.normal.row_sums(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoverageGraphBuilder {
    p_val: f64,
}

impl Default for CoverageGraphBuilder {
    fn default() -> Self {
        Self { p_val: 1.0 }
    }
}

impl CoverageGraphBuilder {
    /// `p_val` must be a positive finite exponent
    pub fn new(p_val: f64) -> Result<Self> {
        if !(p_val.is_finite() && p_val > 0.0) {
            return Err(LookOutError::InvalidConfig(format!(
                "p_val must be a positive number, got {}",
                p_val
            )));
        }
        Ok(Self { p_val })
    }

    pub fn p_val(&self) -> f64 {
        self.p_val
    }

    /// Build both matrices; one row per rank list, one column per outlier
    pub fn build(&self, rank_lists: &[RankList], outliers: &OutlierSet) -> Result<CoverageGraph> {
        let ids = outliers.ids();
        let mut normal_rows = Vec::with_capacity(rank_lists.len());

        for (plot, ranks) in rank_lists.iter().enumerate() {
            let row = ids
                .iter()
                .map(|id| match ranks.rank(id) {
                    Some(0) => Err(LookOutError::EntityAlignment(format!(
                        "entity {} has rank 0 in plot {}",
                        id, plot
                    ))),
                    Some(rank) => Ok(1.0 / (rank as f64).powf(self.p_val)),
                    None => Err(LookOutError::EntityAlignment(format!(
                        "outlier {} missing from rank list of plot {}",
                        id, plot
                    ))),
                })
                .collect::<Result<Vec<f64>>>()?;
            normal_rows.push(row);
        }

        let scaled_rows: Vec<Vec<f64>> = normal_rows
            .iter()
            .map(|row| {
                let max = row.iter().copied().fold(0.0, f64::max);
                if max > 0.0 {
                    row.iter().map(|w| w / max).collect()
                } else {
                    row.clone()
                }
            })
            .collect();

        debug!(
            "Coverage graph: {} plots x {} outliers (p = {})",
            rank_lists.len(),
            ids.len(),
            self.p_val
        );

        Ok(CoverageGraph {
            scaled: WeightMatrix::from_rows(scaled_rows)?,
            normal: WeightMatrix::from_rows(normal_rows)?,
            outliers: ids.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outliers(names: &[&str]) -> OutlierSet {
        let ids: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        let scores: Vec<f64> = (0..ids.len()).map(|i| (ids.len() - i) as f64).collect();
        OutlierSet::top_n(&ids, &scores, ids.len()).unwrap()
    }

    #[test]
    fn test_build_weights() {
        let lists = vec![
            RankList::from_ranks([("a", 2), ("b", 4), ("c", 1)]),
            RankList::from_ranks([("a", 1), ("b", 2), ("c", 3)]),
        ];
        let graph = CoverageGraphBuilder::default()
            .build(&lists, &outliers(&["a", "b"]))
            .unwrap();

        assert_eq!(graph.outliers(), &["a", "b"]);
        assert_eq!(graph.normal().row(0), &[0.5, 0.25]);
        assert_eq!(graph.scaled().row(0), &[1.0, 0.5]);
        assert_eq!(graph.normal().row(1), &[1.0, 0.5]);
        assert_eq!(graph.scaled().row(1), &[1.0, 0.5]);
    }

    #[test]
    fn test_build_p_val_sharpens() {
        let lists = vec![RankList::from_ranks([("a", 1), ("b", 2)])];
        let graph = CoverageGraphBuilder::new(2.0)
            .unwrap()
            .build(&lists, &outliers(&["a", "b"]))
            .unwrap();
        assert_eq!(graph.normal().row(0), &[1.0, 0.25]);
    }

    #[test]
    fn test_scaled_row_max_is_one() {
        let lists = vec![RankList::from_ranks([("a", 5), ("b", 10)])];
        let graph = CoverageGraphBuilder::default()
            .build(&lists, &outliers(&["a", "b"]))
            .unwrap();
        assert_eq!(graph.scaled().row(0), &[1.0, 0.5]);
    }

    #[test]
    fn test_missing_outlier_is_alignment_error() {
        let lists = vec![RankList::from_ranks([("a", 1)])];
        let result = CoverageGraphBuilder::default().build(&lists, &outliers(&["a", "b"]));
        assert!(matches!(result, Err(LookOutError::EntityAlignment(_))));
    }

    #[test]
    fn test_rank_zero_is_alignment_error() {
        let lists = vec![
            RankList::from_ranks([("a", 1), ("b", 2)]),
            RankList::from_ranks([("a", 0), ("b", 1)]),
        ];
        let result = CoverageGraphBuilder::default().build(&lists, &outliers(&["a", "b"]));
        assert!(matches!(result, Err(LookOutError::EntityAlignment(_))));
    }

    #[test]
    fn test_deserialize_checks_outlier_columns() {
        let lists = vec![RankList::from_ranks([("a", 1), ("b", 2)])];
        let graph = CoverageGraphBuilder::default()
            .build(&lists, &outliers(&["a", "b"]))
            .unwrap();
        let json = serde_json::to_string(&graph).unwrap();
        let back: CoverageGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(back.normal(), graph.normal());

        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["outliers"] = serde_json::json!(["a"]);
        assert!(serde_json::from_value::<CoverageGraph>(value).is_err());
    }

    #[test]
    fn test_invalid_p_val() {
        assert!(CoverageGraphBuilder::new(0.0).is_err());
        assert!(CoverageGraphBuilder::new(f64::NAN).is_err());
    }

    #[test]
    fn test_graph_uses_normal_row_totals() {
        let lists = vec![RankList::from_ranks([("a", 2), ("b", 4)])];
        let graph = CoverageGraphBuilder::default()
            .build(&lists, &outliers(&["a", "b"]))
            .unwrap()
            .graph();
        assert_eq!(graph.row_totals(), &[0.75]);
        assert_eq!(graph.weights().row(0), &[1.0, 0.5]);
    }
}
