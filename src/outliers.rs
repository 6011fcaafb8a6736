//! Outlier set selection
//!
//! The outlier set is the fixed list of entities the selected plots must
//! explain. It is chosen once per run, in descending score order.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{LookOutError, Result};
use crate::plots::RankList;

/// Where the outlier set comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutlierSource {
    /// Top-N isolation forest scores
    #[default]
    Iforest,
    /// Top-N by summed reciprocal rank over all plots
    Merge,
    /// An explicit list of entity ids
    Dictated,
}

/// Outlier set configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierConfig {
    pub source: OutlierSource,
    /// Entity ids used with [`OutlierSource::Dictated`]
    pub dictated: Vec<String>,
}

impl OutlierConfig {
    pub fn validate(&self) -> Result<()> {
        if self.source == OutlierSource::Dictated && self.dictated.is_empty() {
            return Err(LookOutError::InvalidConfig(
                "outliers.dictated must list entities when source = \"dictated\"".to_string(),
            ));
        }
        Ok(())
    }
}

/// Ordered outlier entities with the score that selected them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierSet {
    ids: Vec<String>,
    scores: Vec<f64>,
}

impl OutlierSet {
    /// The `n` highest-scoring entities; equal scores keep entity order.
    ///
    /// `n` larger than the population selects everyone.
    pub fn top_n(ids: &[String], scores: &[f64], n: usize) -> Result<Self> {
        if ids.len() != scores.len() {
            return Err(LookOutError::EntityAlignment(format!(
                "{} entities but {} scores",
                ids.len(),
                scores.len()
            )));
        }
        if n > ids.len() {
            warn!(
                "Requested {} outliers but only {} entities exist",
                n,
                ids.len()
            );
        }

        let mut order: Vec<usize> = (0..ids.len()).collect();
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
        order.truncate(n);

        Ok(Self {
            ids: order.iter().map(|&i| ids[i].clone()).collect(),
            scores: order.iter().map(|&i| scores[i]).collect(),
        })
    }

    /// Merge plot rank lists: each entity scores the sum of its reciprocal
    /// ranks across plots
    pub fn merged(ids: &[String], rank_lists: &[RankList], n: usize) -> Result<Self> {
        let mut scores = Vec::with_capacity(ids.len());
        for id in ids {
            let mut total = 0.0;
            for (plot, ranks) in rank_lists.iter().enumerate() {
                let rank = ranks.rank(id).ok_or_else(|| {
                    LookOutError::EntityAlignment(format!(
                        "entity {} missing from rank list of plot {}",
                        id, plot
                    ))
                })?;
                total += 1.0 / rank.max(1) as f64;
            }
            scores.push(total);
        }
        Self::top_n(ids, &scores, n)
    }

    /// Use a fixed list; every id must be a known entity
    pub fn dictated(list: &[String], known: &[String]) -> Result<Self> {
        let known: HashSet<&str> = known.iter().map(String::as_str).collect();
        let mut seen = HashSet::new();
        let mut ids = Vec::with_capacity(list.len());

        for id in list {
            if !known.contains(id.as_str()) {
                return Err(LookOutError::EntityAlignment(format!(
                    "dictated outlier {} is not a known entity",
                    id
                )));
            }
            if seen.insert(id.as_str()) {
                ids.push(id.clone());
            } else {
                debug!("Ignoring repeated dictated outlier {}", id);
            }
        }

        let n = ids.len();
        Ok(Self {
            ids,
            // Listed order is the ranking
            scores: (0..n).map(|i| (n - i) as f64).collect(),
        })
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
