//! Plot/outlier coverage graph
//!
//! A weighted bipartite graph between candidate plots (rows) and outlier
//! entities (columns). The coverage of a set of plots is the sum, over
//! outliers, of the best weight any plot in the set gives that outlier.
//! This max-coverage objective is monotone and submodular.
//!
//! [`Graph`] is immutable and can be shared by any number of selections;
//! each selection keeps its own best-so-far vector in a [`CoverageTracker`].

pub mod builder;

pub use builder::{CoverageGraph, CoverageGraphBuilder};

use serde::{Deserialize, Serialize};

use crate::error::{LookOutError, Result};

/// Dense row-major matrix of coverage weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWeightMatrix")]
pub struct WeightMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

/// Unchecked wire form of [`WeightMatrix`]
#[derive(Deserialize)]
struct RawWeightMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl TryFrom<RawWeightMatrix> for WeightMatrix {
    type Error = LookOutError;

    fn try_from(raw: RawWeightMatrix) -> Result<Self> {
        if raw.rows.checked_mul(raw.cols) != Some(raw.data.len()) {
            return Err(LookOutError::EntityAlignment(format!(
                "{} weights for a {} x {} matrix",
                raw.data.len(),
                raw.rows,
                raw.cols
            )));
        }
        Ok(Self {
            rows: raw.rows,
            cols: raw.cols,
            data: raw.data,
        })
    }
}

impl WeightMatrix {
    /// Build from rows; every row must have the same length
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != cols) {
            return Err(LookOutError::EntityAlignment(format!(
                "plot row {} has {} outlier columns, expected {}",
                i,
                row.len(),
                cols
            )));
        }

        Ok(Self {
            rows: rows.len(),
            cols,
            data: rows.into_iter().flatten().collect(),
        })
    }

    pub fn num_rows(&self) -> usize {
        self.rows
    }

    pub fn num_cols(&self) -> usize {
        self.cols
    }

    /// Weights of one plot across all outliers
    #[inline]
    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        (0..self.rows).map(move |r| self.row(r))
    }

    /// Per-column maximum over all rows (0 for a matrix with no rows)
    pub fn column_max(&self) -> Vec<f64> {
        let mut max = vec![0.0f64; self.cols];
        for row in self.iter_rows() {
            for (m, w) in max.iter_mut().zip(row) {
                *m = m.max(*w);
            }
        }
        max
    }

    pub fn row_sums(&self) -> Vec<f64> {
        self.iter_rows().map(|r| r.iter().sum()).collect()
    }
}

/// Immutable coverage view used by the selectors
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawGraph")]
pub struct Graph {
    weights: WeightMatrix,
    /// Unnormalized row totals, the TopK ranking key
    row_totals: Vec<f64>,
}

#[derive(Deserialize)]
struct RawGraph {
    weights: WeightMatrix,
    row_totals: Vec<f64>,
}

impl TryFrom<RawGraph> for Graph {
    type Error = LookOutError;

    fn try_from(raw: RawGraph) -> Result<Self> {
        Self::with_row_totals(raw.weights, raw.row_totals)
    }
}

impl Graph {
    /// Graph whose TopK key is the row sum of `weights` itself
    pub fn new(weights: WeightMatrix) -> Self {
        let row_totals = weights.row_sums();
        Self {
            weights,
            row_totals,
        }
    }

    /// Graph with explicit unnormalized row totals
    pub fn with_row_totals(weights: WeightMatrix, row_totals: Vec<f64>) -> Result<Self> {
        if row_totals.len() != weights.num_rows() {
            return Err(LookOutError::EntityAlignment(format!(
                "{} row totals for {} plots",
                row_totals.len(),
                weights.num_rows()
            )));
        }
        Ok(Self {
            weights,
            row_totals,
        })
    }

    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        WeightMatrix::from_rows(rows).map(Self::new)
    }

    pub fn num_plots(&self) -> usize {
        self.weights.num_rows()
    }

    pub fn num_outliers(&self) -> usize {
        self.weights.num_cols()
    }

    pub fn weights(&self) -> &WeightMatrix {
        &self.weights
    }

    pub fn row_totals(&self) -> &[f64] {
        &self.row_totals
    }

    /// Coverage of a set of plots. Panics if an index is out of range.
    pub fn coverage_of(&self, subset: &[usize]) -> f64 {
        let mut tracker = self.tracker();
        for &plot in subset {
            tracker.absorb(plot);
        }
        tracker.coverage()
    }

    /// Coverage increase from adding `candidate` to `subset`
    pub fn marginal_gain(&self, subset: &[usize], candidate: usize) -> f64 {
        let mut tracker = self.tracker();
        for &plot in subset {
            tracker.absorb(plot);
        }
        tracker.gain(candidate)
    }

    /// Fresh accumulator for one selection
    pub fn tracker(&self) -> CoverageTracker<'_> {
        CoverageTracker {
            graph: self,
            best: vec![0.0; self.num_outliers()],
            selected: Vec::new(),
        }
    }
}

/// Best-so-far weight per outlier for a growing set of plots
#[derive(Debug, Clone)]
pub struct CoverageTracker<'g> {
    graph: &'g Graph,
    best: Vec<f64>,
    selected: Vec<usize>,
}

impl<'g> CoverageTracker<'g> {
    /// Marginal gain of `candidate`, O(outliers)
    #[inline]
    pub fn gain(&self, candidate: usize) -> f64 {
        self.graph
            .weights
            .row(candidate)
            .iter()
            .zip(&self.best)
            .map(|(w, b)| (w - b).max(0.0))
            .sum()
    }

    /// Add a plot; adding one already present changes nothing
    pub fn absorb(&mut self, plot: usize) {
        if self.selected.contains(&plot) {
            return;
        }
        for (b, w) in self.best.iter_mut().zip(self.graph.weights.row(plot)) {
            *b = b.max(*w);
        }
        self.selected.push(plot);
    }

    pub fn coverage(&self) -> f64 {
        self.best.iter().sum()
    }

    pub fn best(&self) -> &[f64] {
        &self.best
    }

    pub fn selected(&self) -> &[usize] {
        &self.selected
    }

    pub fn contains(&self, plot: usize) -> bool {
        self.selected.contains(&plot)
    }

    pub fn into_selection(self) -> Vec<usize> {
        self.selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example() -> Graph {
        Graph::from_rows(vec![
            vec![1.0, 0.5, 0.0, 0.2],
            vec![0.2, 1.0, 0.5, 0.0],
            vec![0.0, 0.3, 1.0, 1.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_weight_matrix_shape() {
        let m = WeightMatrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 0.0]]).unwrap();
        assert_eq!(m.num_rows(), 3);
        assert_eq!(m.num_cols(), 2);
        assert_eq!(m.row(1), &[3.0, 4.0]);
        assert_eq!(m.column_max(), vec![5.0, 4.0]);
        assert_eq!(m.row_sums(), vec![3.0, 7.0, 5.0]);
    }

    #[test]
    fn test_weight_matrix_ragged() {
        let result = WeightMatrix::from_rows(vec![vec![1.0, 2.0], vec![3.0]]);
        assert!(matches!(result, Err(LookOutError::EntityAlignment(_))));
    }

    #[test]
    fn test_coverage_of() {
        let g = example();
        assert_eq!(g.coverage_of(&[]), 0.0);
        assert_eq!(g.coverage_of(&[0, 1, 2]), 4.0);
        assert_eq!(g.coverage_of(&[0, 2]), 3.5);
    }

    #[test]
    fn test_marginal_gain_matches_difference() {
        let g = example();
        let gain = g.marginal_gain(&[2], 0);
        let diff = g.coverage_of(&[2, 0]) - g.coverage_of(&[2]);
        assert!((gain - diff).abs() < 1e-12);
        assert!((gain - 1.2).abs() < 1e-12);
    }

    #[test]
    fn test_tracker_absorb_is_idempotent() {
        let g = example();
        let mut t = g.tracker();
        t.absorb(1);
        t.absorb(1);
        assert_eq!(t.selected(), &[1]);
        assert_eq!(t.best(), &[0.2, 1.0, 0.5, 0.0]);
        assert_eq!(t.gain(1), 0.0);
    }

    #[test]
    fn test_with_row_totals_length_checked() {
        let m = WeightMatrix::from_rows(vec![vec![1.0]]).unwrap();
        assert!(Graph::with_row_totals(m, vec![1.0, 2.0]).is_err());
    }

    #[test]
    fn test_deserialize_checks_shape() {
        let bad = serde_json::from_str::<WeightMatrix>(r#"{"rows":2,"cols":3,"data":[1.0]}"#);
        assert!(bad.is_err());

        let good: WeightMatrix =
            serde_json::from_str(r#"{"rows":1,"cols":2,"data":[1.0,0.5]}"#).unwrap();
        assert_eq!(good.row(0), &[1.0, 0.5]);
    }

    #[test]
    fn test_deserialize_graph_checks_row_totals() {
        let bad = serde_json::from_str::<Graph>(
            r#"{"weights":{"rows":2,"cols":1,"data":[1.0,0.5]},"row_totals":[1.0]}"#,
        );
        assert!(bad.is_err());

        let g = example();
        let json = serde_json::to_string(&g).unwrap();
        let back: Graph = serde_json::from_str(&json).unwrap();
        assert_eq!(back.coverage_of(&[0, 2]), 3.5);
        assert_eq!(back.row_totals(), g.row_totals());
    }
}
