//! Per-plot outlier ranking
//!
//! Each axis is taken in log space, centred on its median and scaled by its
//! median absolute deviation. The axis' compare direction keeps only
//! deviations towards the suspicious tail. Entities are ranked by the length
//! of the resulting 2-D deviation, rank 1 being the most anomalous; ties keep
//! table order.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::CandidatePlot;
use crate::error::{LookOutError, Result};
use crate::ml::features::{Direction, Feature, FeatureTable};

/// Entity key → 1-based rank in one plot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankList {
    ranks: HashMap<String, usize>,
}

impl RankList {
    /// Rank entities by descending outlierness; equal values keep input order
    pub fn from_scores(ids: &[String], outlierness: &[f64]) -> Self {
        let mut order: Vec<usize> = (0..ids.len().min(outlierness.len())).collect();
        order.sort_by(|&a, &b| outlierness[b].total_cmp(&outlierness[a]));

        let ranks = order
            .into_iter()
            .enumerate()
            .map(|(pos, i)| (ids[i].clone(), pos + 1))
            .collect();
        Self { ranks }
    }

    pub fn from_ranks<I, K>(ranks: I) -> Self
    where
        I: IntoIterator<Item = (K, usize)>,
        K: Into<String>,
    {
        Self {
            ranks: ranks.into_iter().map(|(k, r)| (k.into(), r)).collect(),
        }
    }

    pub fn rank(&self, id: &str) -> Option<usize> {
        self.ranks.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }
}

/// Produces rank lists for candidate plots over one feature table
pub struct PlotRanker<'a> {
    table: &'a FeatureTable,
}

impl<'a> PlotRanker<'a> {
    pub fn new(table: &'a FeatureTable) -> Self {
        Self { table }
    }

    /// Rank list for one plot
    pub fn rank(&self, plot: &CandidatePlot) -> Result<RankList> {
        let missing = |f: Feature| LookOutError::InvalidConfig(format!("feature {} not in table", f));
        let xs = self.table.column(plot.x).ok_or_else(|| missing(plot.x))?;
        let ys = self.table.column(plot.y).ok_or_else(|| missing(plot.y))?;

        let dx = axis_deviation(xs, plot.compare);
        let dy = axis_deviation(ys, plot.y.compare_value());

        let outlierness: Vec<f64> = dx
            .iter()
            .zip(&dy)
            .map(|(a, b)| (a * a + b * b).sqrt())
            .collect();

        Ok(RankList::from_scores(self.table.ids(), &outlierness))
    }

    /// Rank lists for all plots, in plot order
    pub fn rank_all(&self, plots: &[CandidatePlot]) -> Result<Vec<RankList>> {
        plots.iter().map(|p| self.rank(p)).collect()
    }
}

fn axis_deviation(values: &[f64], direction: Direction) -> Vec<f64> {
    let logs: Vec<f64> = values.iter().map(|v| v.max(f64::MIN_POSITIVE).ln()).collect();
    let center = median(&logs);

    let abs_dev: Vec<f64> = logs.iter().map(|v| (v - center).abs()).collect();
    let mut scale = median(&abs_dev);
    if scale <= 0.0 {
        scale = abs_dev.iter().sum::<f64>() / abs_dev.len().max(1) as f64;
    }
    if scale <= 0.0 {
        scale = 1.0;
    }

    logs.iter()
        .map(|v| direction.gate((v - center) / scale))
        .collect()
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
