//! Trial records and selection reports
//!
//! Every (N, budget, algorithm) trial produces one tab-separated log line and
//! one JSON report listing the selected plots in order, ready for an external
//! renderer.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coverage::{CoverageReport, FrequencyList};
use crate::error::Result;
use crate::ml::features::Feature;
use crate::plots::CandidatePlot;
use crate::select::Algorithm;

/// Summary of one trial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialRecord {
    pub num_outliers: usize,
    pub budget: usize,
    pub algorithm: Algorithm,
    pub elapsed: Duration,
    pub coverage: CoverageReport,
    /// Plots actually chosen (may be below budget)
    pub plots_chosen: usize,
}

impl TrialRecord {
    pub fn log_line(&self) -> String {
        format!(
            "N_val {}\tBudget {}\tAlgo {}\tTime Taken = {:.6}\tCoverage = {}",
            self.num_outliers,
            self.budget,
            self.algorithm,
            self.elapsed.as_secs_f64(),
            self.coverage
        )
    }
}

/// A selected plot, in selection order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedPlot {
    /// Position in the selection, starting at 1
    pub order: usize,
    pub index: usize,
    pub y: Feature,
    pub x: Feature,
    pub title: String,
}

/// An outlier with the number of selected plots that explain it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierFrequency {
    pub id: String,
    pub score: f64,
    pub frequency: usize,
}

/// Full JSON report of one trial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialReport {
    pub generated_at: DateTime<Utc>,
    pub record: TrialRecord,
    pub plots: Vec<SelectedPlot>,
    pub outliers: Vec<OutlierFrequency>,
}

impl TrialReport {
    pub fn new(
        record: TrialRecord,
        selection: &[usize],
        candidates: &[CandidatePlot],
        outlier_ids: &[String],
        outlier_scores: &[f64],
        frequencies: &FrequencyList,
    ) -> Self {
        let plots = selection
            .iter()
            .enumerate()
            .filter_map(|(i, &idx)| {
                candidates.get(idx).map(|p| SelectedPlot {
                    order: i + 1,
                    index: p.index,
                    y: p.y,
                    x: p.x,
                    title: p.title(),
                })
            })
            .collect();

        let outliers = outlier_ids
            .iter()
            .enumerate()
            .map(|(col, id)| OutlierFrequency {
                id: id.clone(),
                score: outlier_scores.get(col).copied().unwrap_or(0.0),
                frequency: frequencies.get(col),
            })
            .collect();

        Self {
            generated_at: Utc::now(),
            record,
            plots,
            outliers,
        }
    }

    /// Default file name, e.g. `selectedplots_10_3_LookOut.json`
    pub fn file_name(&self) -> String {
        format!(
            "selectedplots_{}_{}_{}.json",
            self.record.num_outliers, self.record.budget, self.record.algorithm
        )
    }

    /// Write the report into `dir`, returning the file path
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Append-only trial log
pub struct TrialLog {
    writer: BufWriter<File>,
}

impl TrialLog {
    /// Create (truncate) the log file, creating parent folders as needed
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
        })
    }

    pub fn append(&mut self, record: &TrialRecord) -> Result<()> {
        writeln!(self.writer, "{}", record.log_line())?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::ml::features::Direction;

    fn record() -> TrialRecord {
        TrialRecord {
            num_outliers: 4,
            budget: 2,
            algorithm: Algorithm::LookOut,
            elapsed: Duration::from_millis(1500),
            coverage: CoverageReport {
                coverage: 3.5,
                max_coverage: 4.0,
                scaled_coverage: 3.5,
            },
            plots_chosen: 2,
        }
    }

    #[test]
    fn test_log_line() {
        assert_eq!(
            record().log_line(),
            "N_val 4\tBudget 2\tAlgo LookOut\tTime Taken = 1.500000\tCoverage = 3.500 / 4.000 (87.500%)"
        );
    }

    #[test]
    fn test_report_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let candidates = vec![
            CandidatePlot {
                index: 0,
                y: Feature::Life,
                x: Feature::EdgesOut,
                compare: Direction::High,
            },
            CandidatePlot {
                index: 1,
                y: Feature::MeanIat,
                x: Feature::Src,
                compare: Direction::High,
            },
        ];
        let graph = Graph::from_rows(vec![vec![1.0, 0.0], vec![0.5, 1.0]]).unwrap();
        let freq = FrequencyList::compute(&[1, 0], &graph, 0.0);
        let ids = vec!["h1".to_string(), "h2".to_string()];

        let report = TrialReport::new(record(), &[1, 0], &candidates, &ids, &[0.9, 0.8], &freq);
        let path = report.save(dir.path()).unwrap();
        assert!(path.ends_with("selectedplots_4_2_LookOut.json"));

        let loaded = TrialReport::load(&path).unwrap();
        assert_eq!(loaded.plots.len(), 2);
        assert_eq!(loaded.plots[0].index, 1);
        assert_eq!(loaded.plots[0].order, 1);
        assert_eq!(loaded.outliers[0].frequency, 2);
        assert_eq!(loaded.outliers[1].frequency, 1);
    }

    #[test]
    fn test_trial_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/log.txt");

        let mut log = TrialLog::create(&path).unwrap();
        log.append(&record()).unwrap();
        log.append(&record()).unwrap();
        log.finish().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.starts_with("N_val 4\tBudget 2"));
    }
}
