//! Budgeted plot selection
//!
//! `LookOut` is greedy forward selection over the max-coverage objective:
//! each round adds the plot with the largest marginal gain given the plots
//! already chosen. Because the objective is monotone submodular, the result
//! is within (1 - 1/e) of the best budget-sized set. `TopK` ranks plots in
//! isolation by total weight and serves as a baseline.
//!
//! Order of the returned selection is meaningful: element `i` is the best
//! addition given elements `0..i`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{LookOutError, Result};
use crate::graph::Graph;

/// Selection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Greedy marginal-gain selection
    #[value(name = "lookout")]
    LookOut,
    /// Highest individual row totals
    #[value(name = "topk")]
    TopK,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::LookOut => "LookOut",
            Algorithm::TopK => "TopK",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = LookOutError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lookout" => Ok(Algorithm::LookOut),
            "topk" => Ok(Algorithm::TopK),
            other => Err(LookOutError::InvalidConfig(format!("unknown algorithm: {}", other))),
        }
    }
}

/// Selection trial settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Outlier set sizes to try
    pub num_outliers: Vec<usize>,
    /// Budgets to try for every outlier set size
    pub budgets: Vec<usize>,
    /// Rank weight exponent
    pub p_val: f64,
    pub algorithms: Vec<Algorithm>,
    /// Also run the TopK baseline
    pub baselines: bool,
    /// Weight a plot must exceed to count towards an outlier's frequency
    pub frequency_threshold: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            num_outliers: vec![10],
            budgets: vec![3],
            p_val: 1.0,
            algorithms: vec![Algorithm::LookOut],
            baselines: false,
            frequency_threshold: 0.0,
        }
    }
}

impl SelectionConfig {
    /// Algorithms to run, baseline appended when requested
    pub fn algorithms(&self) -> Vec<Algorithm> {
        let mut algorithms = Vec::with_capacity(self.algorithms.len() + 1);
        for algo in &self.algorithms {
            if !algorithms.contains(algo) {
                algorithms.push(*algo);
            }
        }
        if self.baselines && !algorithms.contains(&Algorithm::TopK) {
            algorithms.push(Algorithm::TopK);
        }
        algorithms
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_outliers.is_empty() || self.num_outliers.contains(&0) {
            return Err(LookOutError::InvalidConfig(
                "selection.num_outliers must list positive sizes".to_string(),
            ));
        }
        if self.budgets.is_empty() {
            return Err(LookOutError::InvalidConfig(
                "selection.budgets must not be empty".to_string(),
            ));
        }
        if let Some(&b) = self.budgets.iter().find(|&&b| b == 0) {
            return Err(LookOutError::InvalidBudget(b));
        }
        if !(self.p_val.is_finite() && self.p_val > 0.0) {
            return Err(LookOutError::InvalidConfig(format!(
                "selection.p_val must be positive, got {}",
                self.p_val
            )));
        }
        if self.algorithms().is_empty() {
            return Err(LookOutError::InvalidConfig(
                "selection.algorithms must not be empty".to_string(),
            ));
        }
        if !(self.frequency_threshold.is_finite() && self.frequency_threshold >= 0.0) {
            return Err(LookOutError::InvalidConfig(
                "selection.frequency_threshold must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }
}

/// Select at most `budget` distinct plots from `graph`
pub fn select(graph: &Graph, budget: usize, algorithm: Algorithm) -> Result<Vec<usize>> {
    if graph.num_plots() == 0 {
        return Err(LookOutError::EmptyCandidateSet);
    }
    if budget == 0 {
        return Err(LookOutError::InvalidBudget(budget));
    }

    let selection = match algorithm {
        Algorithm::LookOut => lookout(graph, budget),
        Algorithm::TopK => top_k(graph, budget),
    };

    debug!(
        "{} selected {} of {} plots (budget {})",
        algorithm,
        selection.len(),
        graph.num_plots(),
        budget
    );
    Ok(selection)
}

fn lookout(graph: &Graph, budget: usize) -> Vec<usize> {
    let mut tracker = graph.tracker();

    for round in 0..budget.min(graph.num_plots()) {
        let mut best: Option<(usize, f64)> = None;

        for candidate in 0..graph.num_plots() {
            if tracker.contains(candidate) {
                continue;
            }
            let gain = tracker.gain(candidate);
            // Strictly greater keeps the lowest index on ties
            if best.map_or(true, |(_, g)| gain > g) {
                best = Some((candidate, gain));
            }
        }

        match best {
            Some((plot, gain)) if gain > 0.0 => {
                trace!("round {}: plot {} gain {:.6}", round, plot, gain);
                tracker.absorb(plot);
            }
            _ => {
                debug!("No remaining plot adds coverage, stopping after {} rounds", round);
                break;
            }
        }
    }

    tracker.into_selection()
}

fn top_k(graph: &Graph, budget: usize) -> Vec<usize> {
    let totals = graph.row_totals();
    let mut order: Vec<usize> = (0..graph.num_plots()).collect();
    // Stable sort keeps the lowest index first on ties
    order.sort_by(|&a, &b| totals[b].total_cmp(&totals[a]));
    order.truncate(budget);
    order
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
    fn test_lookout_example() {
        let g = example();
        let selection = select(&g, 2, Algorithm::LookOut).unwrap();

        assert_eq!(selection, vec![2, 0]);
        assert_eq!(g.coverage_of(&selection), 3.5);
    }

    #[test]
    fn test_lookout_full_budget_reaches_ceiling() {
        let g = example();
        let selection = select(&g, 3, Algorithm::LookOut).unwrap();

        assert_eq!(selection.len(), 3);
        assert_eq!(g.coverage_of(&selection), 4.0);
    }

    #[test]
    fn test_lookout_tie_breaks_to_lowest_index() {
        let g = Graph::from_rows(vec![vec![0.1, 0.1], vec![1.0, 0.5], vec![1.0, 0.5]]).unwrap();
        let selection = select(&g, 1, Algorithm::LookOut).unwrap();
        assert_eq!(selection, vec![1]);
    }

    #[test]
    fn test_lookout_stops_early() {
        let g = Graph::from_rows(vec![vec![1.0, 1.0], vec![1.0, 0.0], vec![0.0, 0.0]]).unwrap();
        let selection = select(&g, 3, Algorithm::LookOut).unwrap();
        assert_eq!(selection, vec![0]);
    }

    #[test]
    fn test_lookout_deterministic() {
        let g = example();
        assert_eq!(
            select(&g, 2, Algorithm::LookOut).unwrap(),
            select(&g, 2, Algorithm::LookOut).unwrap()
        );
    }

    #[test]
    fn test_top_k() {
        let g = example();
        // totals: 1.7, 1.7, 2.3
        assert_eq!(select(&g, 2, Algorithm::TopK).unwrap(), vec![2, 0]);
        assert_eq!(select(&g, 10, Algorithm::TopK).unwrap(), vec![2, 0, 1]);
    }

    #[test]
    fn test_invalid_budget() {
        let result = select(&example(), 0, Algorithm::LookOut);
        assert!(matches!(result, Err(LookOutError::InvalidBudget(0))));
    }

    #[test]
    fn test_empty_candidate_set() {
        let g = Graph::from_rows(Vec::new()).unwrap();
        let result = select(&g, 3, Algorithm::TopK);
        assert!(matches!(result, Err(LookOutError::EmptyCandidateSet)));
    }

    #[test]
    fn test_selection_config_algorithms() {
        let mut config = SelectionConfig::default();
        assert_eq!(config.algorithms(), vec![Algorithm::LookOut]);

        config.baselines = true;
        assert_eq!(config.algorithms(), vec![Algorithm::LookOut, Algorithm::TopK]);
    }

    #[test]
    fn test_selection_config_validate() {
        assert!(SelectionConfig::default().validate().is_ok());

        let config = SelectionConfig {
            budgets: vec![3, 0],
            ..SelectionConfig::default()
        };
        assert!(matches!(config.validate(), Err(LookOutError::InvalidBudget(0))));

        let config = SelectionConfig {
            p_val: -1.0,
            ..SelectionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_algorithm_parse() {
        assert_eq!("LookOut".parse::<Algorithm>().unwrap(), Algorithm::LookOut);
        assert_eq!("topk".parse::<Algorithm>().unwrap(), Algorithm::TopK);
        assert!("greedy".parse::<Algorithm>().is_err());
    }
}
