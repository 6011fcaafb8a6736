pub mod config;
pub mod coverage;
pub mod error;
pub mod flow;
pub mod graph;
pub mod ml;
pub mod outliers;
pub mod plots;
pub mod report;
pub mod select;

use std::path::Path;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use config::Config;
use coverage::{CoverageReport, FrequencyList};
use error::Result;
use flow::{aggregate::EntityAggregates, FlowRecord};
use graph::{CoverageGraph, CoverageGraphBuilder, Graph};
use ml::FeatureTable;
use outliers::{OutlierSet, OutlierSource};
use plots::{generate_pairs, CandidatePlot, PlotRanker, RankList};
use report::{TrialRecord, TrialReport};
use select::{select, Algorithm};

pub use error::LookOutError;

/// Everything derived from the input data once per run
#[derive(Debug, Clone)]
pub struct Workspace {
    pub table: FeatureTable,
    pub plots: Vec<CandidatePlot>,
    pub rank_lists: Vec<RankList>,
    /// Isolation forest scores, present when the outlier source needs them
    pub scores: Option<Vec<f64>>,
}

/// Result of a full run over every configured trial
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub entities: usize,
    pub plots: usize,
    pub trials: Vec<TrialReport>,
    /// Trials that failed with a non-fatal error
    pub failed: usize,
}

/// Core LookOut instance
pub struct LookOut {
    config: Config,
}

impl LookOut {
    /// Create a new instance; the configuration is validated up front
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Read flow records using the configured input layout
    pub fn load_flows<P: AsRef<Path>>(&self, path: P) -> Result<Vec<FlowRecord>> {
        flow::read_flows(path, &self.config.data)
    }

    /// Aggregate records, build the feature table, and rank every candidate plot
    pub fn prepare(&self, records: &[FlowRecord]) -> Result<Workspace> {
        let aggregates = EntityAggregates::from_records(records);
        let table = FeatureTable::from_aggregates(self.config.catalog.clone(), &aggregates)?;
        info!(
            "Feature table: {} entities x {} features",
            table.len(),
            table.catalog().len()
        );

        let scores = match self.config.outliers.source {
            OutlierSource::Iforest => Some(ml::score_table(&table, &self.config.scoring)?),
            OutlierSource::Merge | OutlierSource::Dictated => None,
        };

        let plots = generate_pairs(table.catalog());
        let rank_lists = PlotRanker::new(&table).rank_all(&plots)?;
        info!("Ranked entities in {} candidate plots", plots.len());

        Ok(Workspace {
            table,
            plots,
            rank_lists,
            scores,
        })
    }

    /// Outlier set of size `n` from the configured source
    pub fn outlier_set(&self, workspace: &Workspace, n: usize) -> Result<OutlierSet> {
        let ids = workspace.table.ids();
        match self.config.outliers.source {
            OutlierSource::Iforest => match &workspace.scores {
                Some(scores) => OutlierSet::top_n(ids, scores, n),
                None => {
                    let scores = ml::score_table(&workspace.table, &self.config.scoring)?;
                    OutlierSet::top_n(ids, &scores, n)
                }
            },
            OutlierSource::Merge => OutlierSet::merged(ids, &workspace.rank_lists, n),
            OutlierSource::Dictated => OutlierSet::dictated(&self.config.outliers.dictated, ids),
        }
    }

    /// Outlier set sizes to try; a dictated list has exactly one
    fn outlier_sizes(&self) -> Vec<usize> {
        match self.config.outliers.source {
            OutlierSource::Dictated => vec![self.config.outliers.dictated.len()],
            _ => self.config.selection.num_outliers.clone(),
        }
    }

    /// Run every (N, budget, algorithm) trial over a prepared workspace.
    ///
    /// A failing trial is logged and skipped; alignment and configuration
    /// errors abort the run.
    pub fn run_trials(&self, workspace: &Workspace) -> Result<RunSummary> {
        let selection = &self.config.selection;
        let builder = CoverageGraphBuilder::new(selection.p_val)?;
        let algorithms = selection.algorithms();

        let mut summary = RunSummary {
            entities: workspace.table.len(),
            plots: workspace.plots.len(),
            ..RunSummary::default()
        };

        for n in self.outlier_sizes() {
            let outliers = self.outlier_set(workspace, n)?;
            let coverage_graph = builder.build(&workspace.rank_lists, &outliers)?;
            let graph = coverage_graph.graph();
            if outliers.len() != n {
                warn!(
                    "Requested N = {} but the outlier set has {} entities",
                    n,
                    outliers.len()
                );
            } else {
                debug!("N = {}: {} outliers selected", n, outliers.len());
            }

            for &algorithm in &algorithms {
                for &budget in &selection.budgets {
                    let trial = self.run_trial(
                        workspace,
                        &outliers,
                        &coverage_graph,
                        &graph,
                        budget,
                        algorithm,
                    );
                    match trial {
                        Ok(report) => summary.trials.push(report),
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => {
                            error!(
                                "Trial N_val {} Budget {} Algo {} failed: {}",
                                n, budget, algorithm, e
                            );
                            summary.failed += 1;
                        }
                    }
                }
            }
        }

        info!(
            "Completed {} trials ({} failed)",
            summary.trials.len(),
            summary.failed
        );
        Ok(summary)
    }

    fn run_trial(
        &self,
        workspace: &Workspace,
        outliers: &OutlierSet,
        coverage_graph: &CoverageGraph,
        graph: &Graph,
        budget: usize,
        algorithm: Algorithm,
    ) -> Result<TrialReport> {
        let start = Instant::now();
        let chosen = select(graph, budget, algorithm)?;
        let elapsed = start.elapsed();

        let record = TrialRecord {
            // Actual set size, which is below the requested N for small populations
            num_outliers: outliers.len(),
            budget,
            algorithm,
            elapsed,
            coverage: CoverageReport::compute(&chosen, coverage_graph),
            plots_chosen: chosen.len(),
        };
        info!("{}", record.log_line());

        let frequencies =
            FrequencyList::compute(&chosen, graph, self.config.selection.frequency_threshold);

        Ok(TrialReport::new(
            record,
            &chosen,
            &workspace.plots,
            outliers.ids(),
            outliers.scores(),
            &frequencies,
        ))
    }

    /// Ingest, prepare, and run all trials for one data file
    pub fn run<P: AsRef<Path>>(&self, path: P) -> Result<RunSummary> {
        let records = self.load_flows(path)?;
        let workspace = self.prepare(&records)?;
        self.run_trials(&workspace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Thirty regular hosts and one fast, wide-fanout scanner
    fn records() -> Vec<FlowRecord> {
        let mut records = Vec::new();
        for h in 0..30 {
            for k in 0..(3 + h % 4) {
                let dst = format!("h{}", (h + k + 1) % 30);
                let ts = (h * 7) as f64 + k as f64 * (50.0 + (h % 5) as f64 * 10.0);
                records.push(FlowRecord::new(format!("h{}", h), dst, ts));
            }
        }
        for k in 0..60 {
            records.push(FlowRecord::new("scanner", format!("h{}", k % 30), 1000.0 + k as f64 * 0.5));
        }
        records
    }

    fn small_config() -> Config {
        let mut config = Config::default();
        config.scoring.num_trees = 50;
        config.selection.num_outliers = vec![3, 5];
        config.selection.budgets = vec![1, 3];
        config
    }

    #[test]
    fn test_prepare() {
        let lookout = LookOut::new(small_config()).unwrap();
        let ws = lookout.prepare(&records()).unwrap();

        assert_eq!(ws.table.len(), 31);
        assert_eq!(ws.plots.len(), 22);
        assert_eq!(ws.rank_lists.len(), 22);
        assert_eq!(ws.scores.as_ref().map(|s| s.len()), Some(31));
    }

    #[test]
    fn test_run_trials() {
        let lookout = LookOut::new(small_config()).unwrap();
        let ws = lookout.prepare(&records()).unwrap();
        let summary = lookout.run_trials(&ws).unwrap();

        assert_eq!(summary.trials.len(), 4);
        assert_eq!(summary.failed, 0);
        for trial in &summary.trials {
            let record = &trial.record;
            assert!(trial.plots.len() <= record.budget);
            assert!(record.coverage.coverage <= record.coverage.max_coverage + 1e-9);
            assert_eq!(trial.outliers.len(), record.num_outliers);
        }
    }

    #[test]
    fn test_scanner_is_an_outlier() {
        let lookout = LookOut::new(small_config()).unwrap();
        let ws = lookout.prepare(&records()).unwrap();
        let set = lookout.outlier_set(&ws, 3).unwrap();
        assert!(set.ids().iter().any(|id| id == "scanner"));
    }

    #[test]
    fn test_oversized_n_records_actual_set_size() {
        let mut config = small_config();
        config.selection.num_outliers = vec![100];
        config.selection.budgets = vec![2];

        let lookout = LookOut::new(config).unwrap();
        let ws = lookout.prepare(&records()).unwrap();
        let summary = lookout.run_trials(&ws).unwrap();

        let trial = &summary.trials[0];
        assert_eq!(trial.record.num_outliers, 31);
        assert_eq!(trial.outliers.len(), 31);
        assert!(trial.record.log_line().starts_with("N_val 31\t"));
        assert_eq!(trial.file_name(), "selectedplots_31_2_LookOut.json");
    }

    #[test]
    fn test_baselines_and_merge_source() {
        let mut config = small_config();
        config.selection.baselines = true;
        config.outliers.source = OutlierSource::Merge;

        let lookout = LookOut::new(config).unwrap();
        let ws = lookout.prepare(&records()).unwrap();
        assert!(ws.scores.is_none());

        let summary = lookout.run_trials(&ws).unwrap();
        assert_eq!(summary.trials.len(), 8);
        assert!(summary
            .trials
            .iter()
            .any(|t| t.record.algorithm == Algorithm::TopK));
    }

    #[test]
    fn test_unknown_dictated_outlier_is_fatal() {
        let mut config = small_config();
        config.outliers.source = OutlierSource::Dictated;
        config.outliers.dictated = vec!["nobody".to_string()];

        let lookout = LookOut::new(config).unwrap();
        let ws = lookout.prepare(&records()).unwrap();
        let result = lookout.run_trials(&ws);
        assert!(matches!(result, Err(LookOutError::EntityAlignment(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.selection.p_val = 0.0;
        assert!(LookOut::new(config).is_err());
    }
}
