//! Min-max feature scaling.
//!
//! A statistics snapshot is taken over a batch of raw feature vectors, then every
//! value is scaled into `[0, 1]` against that snapshot. A feature with no spread
//! in the batch normalizes to exactly 0, which downstream causes the solver to
//! assign it a zero coefficient instead of failing.

use std::collections::BTreeMap;

use crate::stats;
use crate::types::{FeatureMap, FeatureStats};

/// Per-feature distribution snapshot over a batch. Missing values count as 0.
pub fn compute_feature_stats(rows: &[FeatureMap]) -> BTreeMap<String, FeatureStats> {
    let mut names: Vec<&String> = rows.iter().flat_map(|row| row.keys()).collect();
    names.sort();
    names.dedup();

    let mut out = BTreeMap::new();
    for name in names {
        let values: Vec<f64> = rows
            .iter()
            .map(|row| row.get(name).copied().unwrap_or(0.0))
            .collect();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = stats::mean(&values);
        let std_dev = stats::standard_deviation(&values, Some(mean));
        out.insert(name.clone(), FeatureStats { min, max, mean, std_dev });
    }
    out
}

/// Scale one value into `[0, 1]` against its feature's snapshot.
pub fn normalize_value(value: f64, stats: &FeatureStats) -> f64 {
    let range = stats.max - stats.min;
    if range == 0.0 {
        return 0.0;
    }
    ((value - stats.min) / range).clamp(0.0, 1.0)
}

/// Normalize a vector against a snapshot. The snapshot defines the schema:
/// features it does not cover are dropped, features it covers but the vector
/// lacks are treated as 0 before scaling.
pub fn normalize_features(
    features: &FeatureMap,
    snapshot: &BTreeMap<String, FeatureStats>,
) -> FeatureMap {
    snapshot
        .iter()
        .map(|(name, stats)| {
            let raw = features.get(name).copied().unwrap_or(0.0);
            (name.clone(), normalize_value(raw, stats))
        })
        .collect()
}
