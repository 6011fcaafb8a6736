//! Per-entity feature vectors
//!
//! The feature catalog is an explicit, immutable value handed to every
//! component that needs feature names, descriptions or compare directions.
//! Feature columns are fetched through the typed [`Feature`] enum, so a
//! missing feature is a construction-time error rather than a lookup miss.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LookOutError, Result};
use crate::flow::aggregate::EntityAggregates;

/// Features derived from grouped flow records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Feature {
    /// Unique sources talking to the entity
    Src,
    /// Unique destinations the entity talks to
    Dest,
    /// Records addressed to the entity
    EdgesIn,
    /// Records sent by the entity
    EdgesOut,
    /// Last seen minus first seen
    Life,
    MedianIat,
    MeanIat,
    /// Inter-arrival-time variance over mean
    IatVarMean,
}

impl Feature {
    pub const ALL: [Feature; 8] = [
        Feature::Src,
        Feature::Dest,
        Feature::EdgesIn,
        Feature::EdgesOut,
        Feature::Life,
        Feature::MedianIat,
        Feature::MeanIat,
        Feature::IatVarMean,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Src => "SRC",
            Feature::Dest => "DEST",
            Feature::EdgesIn => "EDGES_IN",
            Feature::EdgesOut => "EDGES_OUT",
            Feature::Life => "LIFE",
            Feature::MedianIat => "MEDIAN_IAT",
            Feature::MeanIat => "MEAN_IAT",
            Feature::IatVarMean => "IAT_VAR_MEAN",
        }
    }

    /// Axis label used by renderers
    pub fn description(&self) -> &'static str {
        match self {
            Feature::Src => "# Unique Sources",
            Feature::Dest => "# Unique Destinations",
            Feature::EdgesIn => "# Incoming Edges",
            Feature::EdgesOut => "# Outgoing Edges",
            Feature::Life => "Lifetime",
            Feature::MedianIat => "Median IAT",
            Feature::MeanIat => "Mean IAT",
            Feature::IatVarMean => "IAT Variance / Mean",
        }
    }

    pub fn kind(&self) -> FeatureKind {
        match self {
            Feature::Src | Feature::Dest | Feature::EdgesIn | Feature::EdgesOut => {
                FeatureKind::Discrete
            }
            Feature::Life | Feature::MedianIat | Feature::MeanIat | Feature::IatVarMean => {
                FeatureKind::Continuous
            }
        }
    }

    /// Which tail of the feature is considered suspicious
    pub fn compare_value(&self) -> Direction {
        match self {
            Feature::Src | Feature::Dest | Feature::EdgesIn | Feature::EdgesOut => {
                Direction::High
            }
            Feature::Life => Direction::Low,
            Feature::MedianIat | Feature::MeanIat | Feature::IatVarMean => Direction::Both,
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = LookOutError;

    fn from_str(s: &str) -> Result<Self> {
        Feature::ALL
            .iter()
            .copied()
            .find(|f| f.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| LookOutError::InvalidConfig(format!("unknown feature: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Continuous,
    Discrete,
}

/// Compare direction of a feature axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Unusually large values are anomalous
    High,
    /// Unusually small values are anomalous
    Low,
    /// Deviation either way is anomalous
    Both,
}

impl Direction {
    /// Keep only the part of a signed deviation that points to the suspicious tail
    #[inline]
    pub fn gate(&self, deviation: f64) -> f64 {
        match self {
            Direction::High => deviation.max(0.0),
            Direction::Low => (-deviation).max(0.0),
            Direction::Both => deviation.abs(),
        }
    }
}

/// Immutable list of features used for scoring and plotting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureCatalog {
    continuous: Vec<Feature>,
    discrete: Vec<Feature>,
}

impl Default for FeatureCatalog {
    fn default() -> Self {
        Self {
            continuous: vec![
                Feature::Life,
                Feature::MedianIat,
                Feature::MeanIat,
                Feature::IatVarMean,
            ],
            discrete: vec![
                Feature::Src,
                Feature::Dest,
                Feature::EdgesIn,
                Feature::EdgesOut,
            ],
        }
    }
}

impl FeatureCatalog {
    /// Build a catalog from explicit continuous and discrete lists
    pub fn new(continuous: Vec<Feature>, discrete: Vec<Feature>) -> Result<Self> {
        let mut seen = Vec::with_capacity(continuous.len() + discrete.len());
        for f in continuous.iter().chain(discrete.iter()) {
            if seen.contains(f) {
                return Err(LookOutError::InvalidConfig(format!(
                    "feature {} listed twice in catalog",
                    f
                )));
            }
            seen.push(*f);
        }
        if continuous.is_empty() {
            return Err(LookOutError::InvalidConfig(
                "catalog needs at least one continuous feature".to_string(),
            ));
        }
        Ok(Self {
            continuous,
            discrete,
        })
    }

    pub fn continuous(&self) -> &[Feature] {
        &self.continuous
    }

    pub fn discrete(&self) -> &[Feature] {
        &self.discrete
    }

    /// All features, continuous first
    pub fn features(&self) -> impl Iterator<Item = Feature> + '_ {
        self.continuous.iter().chain(self.discrete.iter()).copied()
    }

    pub fn len(&self) -> usize {
        self.continuous.len() + self.discrete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Column position of a feature
    pub fn position(&self, feature: Feature) -> Option<usize> {
        self.features().position(|f| f == feature)
    }
}

/// Replace zeros with the smallest positive value of the column.
///
/// Columns with no positive value are left untouched. Applying the fix twice
/// is a no-op.
pub fn fix_zero_error(values: &mut [f64]) {
    let min_positive = values
        .iter()
        .copied()
        .filter(|v| *v > 0.0)
        .fold(f64::INFINITY, f64::min);

    if !min_positive.is_finite() {
        return;
    }

    for v in values.iter_mut() {
        if *v == 0.0 {
            *v = min_positive;
        }
    }
}

/// Column-major feature values, one column per catalog feature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureTable {
    catalog: FeatureCatalog,
    ids: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl FeatureTable {
    /// Build a table from explicit columns in catalog order.
    ///
    /// Zero values in every column are replaced before the table is returned.
    pub fn new(catalog: FeatureCatalog, ids: Vec<String>, mut columns: Vec<Vec<f64>>) -> Result<Self> {
        if columns.len() != catalog.len() {
            return Err(LookOutError::InvalidFeatureMatrix(format!(
                "expected {} feature columns, got {}",
                catalog.len(),
                columns.len()
            )));
        }
        for (feature, column) in catalog.features().zip(columns.iter()) {
            if column.len() != ids.len() {
                return Err(LookOutError::InvalidFeatureMatrix(format!(
                    "column {} has {} values for {} entities",
                    feature,
                    column.len(),
                    ids.len()
                )));
            }
        }

        for column in &mut columns {
            fix_zero_error(column);
        }

        Ok(Self {
            catalog,
            ids,
            columns,
        })
    }

    /// Build a table from grouped flow aggregates
    pub fn from_aggregates(catalog: FeatureCatalog, aggregates: &EntityAggregates) -> Result<Self> {
        let columns = catalog
            .features()
            .map(|f| aggregates.column(f).to_vec())
            .collect();
        Self::new(catalog, aggregates.ids().to_vec(), columns)
    }

    pub fn catalog(&self) -> &FeatureCatalog {
        &self.catalog
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Values of one feature, aligned with [`ids`](Self::ids)
    pub fn column(&self, feature: Feature) -> Option<&[f64]> {
        self.catalog
            .position(feature)
            .map(|idx| self.columns[idx].as_slice())
    }

    /// Row-major copy of the table, one feature vector per entity
    pub fn rows(&self) -> Vec<Vec<f64>> {
        (0..self.ids.len())
            .map(|i| self.columns.iter().map(|c| c[i]).collect())
            .collect()
    }
}
