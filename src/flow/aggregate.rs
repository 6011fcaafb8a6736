//! Grouping of flow records into per-entity aggregates
//!
//! Records are grouped twice: by source (outbound behaviour, lifetime and
//! timing) and by destination (inbound behaviour). Entities are the sources;
//! destination-grouped values are realigned onto the source key order.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::FlowRecord;
use crate::ml::features::Feature;

/// Raw per-entity scalars keyed by source id (sorted)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityAggregates {
    ids: Vec<String>,
    unique_sources: Vec<f64>,
    unique_destinations: Vec<f64>,
    edges_in: Vec<f64>,
    edges_out: Vec<f64>,
    lifetime: Vec<f64>,
    median_iat: Vec<f64>,
    mean_iat: Vec<f64>,
    iat_var_mean: Vec<f64>,
}

#[derive(Default)]
struct SourceGroup<'a> {
    destinations: BTreeSet<&'a str>,
    timestamps: Vec<f64>,
}

#[derive(Default)]
struct DestinationGroup<'a> {
    sources: BTreeSet<&'a str>,
    count: usize,
}

impl EntityAggregates {
    /// Group flow records by source and destination
    pub fn from_records(records: &[FlowRecord]) -> Self {
        let mut by_source: BTreeMap<&str, SourceGroup<'_>> = BTreeMap::new();
        let mut by_destination: BTreeMap<&str, DestinationGroup<'_>> = BTreeMap::new();

        for record in records {
            let src = by_source.entry(record.source.as_str()).or_default();
            src.destinations.insert(record.destination.as_str());
            src.timestamps.push(record.timestamp);

            let dst = by_destination.entry(record.destination.as_str()).or_default();
            dst.sources.insert(record.source.as_str());
            dst.count += 1;
        }

        let mut agg = Self::default();

        for (id, group) in &mut by_source {
            group.timestamps.sort_by(f64::total_cmp);
            let timing = TimingStats::from_sorted(&group.timestamps);

            agg.ids.push((*id).to_string());
            agg.unique_destinations.push(group.destinations.len() as f64);
            agg.edges_out.push(group.timestamps.len() as f64);
            agg.lifetime.push(timing.lifetime);
            agg.median_iat.push(timing.median_iat);
            agg.mean_iat.push(timing.mean_iat);
            agg.iat_var_mean.push(timing.var_over_mean);
        }

        let dest_ids: Vec<String> = by_destination.keys().map(|k| k.to_string()).collect();
        let dest_sources: Vec<f64> = by_destination
            .values()
            .map(|g| g.sources.len() as f64)
            .collect();
        let dest_edges: Vec<f64> = by_destination.values().map(|g| g.count as f64).collect();

        let destination_only = dest_ids
            .iter()
            .filter(|id| !by_source.contains_key(id.as_str()))
            .count();
        if destination_only > 0 {
            debug!(
                "{} destination-only keys have no outbound records and are not scored",
                destination_only
            );
        }

        agg.unique_sources = realign(&dest_sources, &agg.ids, &dest_ids);
        agg.edges_in = realign(&dest_edges, &agg.ids, &dest_ids);

        agg
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

    /// Raw (not zero-fixed) values of a feature, aligned with [`ids`](Self::ids)
    pub fn column(&self, feature: Feature) -> &[f64] {
        match feature {
            Feature::Src => &self.unique_sources,
            Feature::Dest => &self.unique_destinations,
            Feature::EdgesIn => &self.edges_in,
            Feature::EdgesOut => &self.edges_out,
            Feature::Life => &self.lifetime,
            Feature::MedianIat => &self.median_iat,
            Feature::MeanIat => &self.mean_iat,
            Feature::IatVarMean => &self.iat_var_mean,
        }
    }
}

/// Reorder `values` (keyed by `from_ids`) onto `to_ids`.
///
/// Keys of `to_ids` absent from `from_ids` get 0, which the zero fix later
/// replaces with the column minimum.
pub fn realign(values: &[f64], to_ids: &[String], from_ids: &[String]) -> Vec<f64> {
    let index: HashMap<&str, usize> = from_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    to_ids
        .iter()
        .map(|id| {
            index
                .get(id.as_str())
                .and_then(|&i| values.get(i).copied())
                .unwrap_or(0.0)
        })
        .collect()
}

struct TimingStats {
    lifetime: f64,
    median_iat: f64,
    mean_iat: f64,
    var_over_mean: f64,
}

impl TimingStats {
    fn from_sorted(timestamps: &[f64]) -> Self {
        let (first, last) = match (timestamps.first(), timestamps.last()) {
            (Some(f), Some(l)) => (*f, *l),
            _ => {
                return Self {
                    lifetime: 0.0,
                    median_iat: 0.0,
                    mean_iat: 0.0,
                    var_over_mean: 0.0,
                }
            }
        };

        let iats: Vec<f64> = timestamps.windows(2).map(|w| w[1] - w[0]).collect();
        let mean_iat = if iats.is_empty() {
            0.0
        } else {
            iats.iter().sum::<f64>() / iats.len() as f64
        };

        // Sample variance; undefined below two gaps
        let var_over_mean = if iats.len() < 2 || mean_iat == 0.0 {
            0.0
        } else {
            let var = iats.iter().map(|v| (v - mean_iat).powi(2)).sum::<f64>()
                / (iats.len() - 1) as f64;
            var / mean_iat
        };

        Self {
            lifetime: last - first,
            median_iat: median_of_sorted_gaps(iats),
            mean_iat,
            var_over_mean,
        }
    }
}

fn median_of_sorted_gaps(mut gaps: Vec<f64>) -> f64 {
    if gaps.is_empty() {
        return 0.0;
    }
    gaps.sort_by(f64::total_cmp);
    let mid = gaps.len() / 2;
    if gaps.len() % 2 == 0 {
        (gaps[mid - 1] + gaps[mid]) / 2.0
    } else {
        gaps[mid]
    }
}
