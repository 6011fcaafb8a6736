//! Coverage accounting for a selection
//!
//! `coverage` measures the selection on the normal (unscaled) matrix so it is
//! directly comparable to `max_coverage`, the ceiling reached when every plot
//! is selected. `scaled_coverage` is the selector's own objective value.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::{CoverageGraph, Graph, WeightMatrix};

/// Coverage numbers for one selection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub coverage: f64,
    pub max_coverage: f64,
    pub scaled_coverage: f64,
}

impl CoverageReport {
    /// Compute the report for `selection` over a built coverage graph
    pub fn compute(selection: &[usize], graph: &CoverageGraph) -> Self {
        Self {
            coverage: selection_coverage(selection, graph.normal()),
            max_coverage: max_coverage(graph.normal()),
            scaled_coverage: selection_coverage(selection, graph.scaled()),
        }
    }

    /// Share of the ceiling achieved, in percent
    pub fn percentage(&self) -> f64 {
        if self.max_coverage > 0.0 {
            100.0 * self.coverage / self.max_coverage
        } else {
            0.0
        }
    }
}

impl fmt::Display for CoverageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.3} / {:.3} ({:.3}%)",
            self.coverage,
            self.max_coverage,
            self.percentage()
        )
    }
}

/// Sum over outliers of the best weight any selected plot gives them
pub fn selection_coverage(selection: &[usize], matrix: &WeightMatrix) -> f64 {
    let mut best = vec![0.0f64; matrix.num_cols()];
    for &plot in selection {
        for (b, w) in best.iter_mut().zip(matrix.row(plot)) {
            *b = b.max(*w);
        }
    }
    best.iter().sum()
}

/// Sum over outliers of their best weight across all plots
pub fn max_coverage(matrix: &WeightMatrix) -> f64 {
    matrix.column_max().iter().sum()
}

/// Per-outlier count of selected plots that explain it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyList {
    counts: Vec<usize>,
}

impl FrequencyList {
    /// Count, per outlier column, selected plots with weight above `threshold`
    pub fn compute(selection: &[usize], graph: &Graph, threshold: f64) -> Self {
        let weights = graph.weights();
        let mut counts = vec![0usize; weights.num_cols()];
        for &plot in selection {
            for (count, w) in counts.iter_mut().zip(weights.row(plot)) {
                if *w > threshold {
                    *count += 1;
                }
            }
        }
        Self { counts }
    }

    /// Frequency of the outlier in column `outlier`
    pub fn get(&self, outlier: usize) -> usize {
        self.counts.get(outlier).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outliers::OutlierSet;
    use crate::plots::RankList;
    use crate::graph::CoverageGraphBuilder;

    fn example() -> Graph {
        Graph::from_rows(vec![
            vec![1.0, 0.5, 0.0, 0.2],
            vec![0.2, 1.0, 0.5, 0.0],
            vec![0.0, 0.3, 1.0, 1.0],
        ])
        .unwrap()
    }

    fn built() -> CoverageGraph {
        let ids: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let outliers = OutlierSet::top_n(&ids, &[3.0, 2.0, 1.0], 3).unwrap();
        let lists = vec![
            RankList::from_ranks([("a", 2), ("b", 4), ("c", 8)]),
            RankList::from_ranks([("a", 4), ("b", 1), ("c", 2)]),
        ];
        CoverageGraphBuilder::default().build(&lists, &outliers).unwrap()
    }

    #[test]
    fn test_selection_coverage() {
        let g = example();
        assert_eq!(selection_coverage(&[0, 2], g.weights()), 3.5);
        assert_eq!(max_coverage(g.weights()), 4.0);
    }

    #[test]
    fn test_report_bounded_by_ceiling() {
        let graph = built();
        // normal: [0.5, 0.25, 0.125], [0.25, 1.0, 0.5]
        let one = CoverageReport::compute(&[0], &graph);
        assert_eq!(one.coverage, 0.875);
        assert_eq!(one.max_coverage, 2.0);
        assert_eq!(one.scaled_coverage, 1.75);
        assert!(one.coverage <= one.max_coverage);

        let all = CoverageReport::compute(&[0, 1], &graph);
        assert_eq!(all.coverage, all.max_coverage);
        assert_eq!(all.percentage(), 100.0);
    }

    #[test]
    fn test_report_display() {
        let report = CoverageReport {
            coverage: 1.0,
            max_coverage: 4.0,
            scaled_coverage: 2.0,
        };
        assert_eq!(report.to_string(), "1.000 / 4.000 (25.000%)");
    }

    #[test]
    fn test_frequency_list() {
        let g = example();
        let freq = FrequencyList::compute(&[0, 2], &g, 0.0);
        assert_eq!(freq.counts(), &[1, 2, 1, 2]);

        let strict = FrequencyList::compute(&[0, 2], &g, 0.4);
        assert_eq!(strict.counts(), &[1, 1, 1, 1]);
        assert_eq!(strict.get(99), 0);
    }
}
