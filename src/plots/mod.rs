//! Candidate plots
//!
//! A candidate plot is a 2-D projection of the feature table onto a pair of
//! distinct features. Each plot carries a rank list ordering every entity by
//! how anomalous it looks in that projection.

pub mod rank;

pub use rank::{PlotRanker, RankList};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ml::features::{Direction, Feature, FeatureCatalog};

/// One feature pair; `y` is always a continuous feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidatePlot {
    /// Position in the candidate list, also the row of the coverage matrix
    pub index: usize,
    pub y: Feature,
    pub x: Feature,
    /// Compare direction of the x axis
    pub compare: Direction,
}

impl CandidatePlot {
    pub fn title(&self) -> String {
        format!("{} vs {}", self.y.description(), self.x.description())
    }
}

impl fmt::Display for CandidatePlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} vs {}", self.index, self.y, self.x)
    }
}

/// Every continuous feature against every other catalog feature, each
/// unordered pair once.
pub fn generate_pairs(catalog: &FeatureCatalog) -> Vec<CandidatePlot> {
    let mut plots: Vec<CandidatePlot> = Vec::new();

    for &y in catalog.continuous() {
        for x in catalog.features() {
            if x == y {
                continue;
            }
            let duplicate = plots
                .iter()
                .any(|p| (p.x == x && p.y == y) || (p.x == y && p.y == x));
            if duplicate {
                continue;
            }
            plots.push(CandidatePlot {
                index: plots.len(),
                y,
                x,
                compare: x.compare_value(),
            });
        }
    }

    plots
}
