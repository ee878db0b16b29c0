//! # Cross-Layer Correlation and the Attention Migration Index
//!
//! Attention tends to cascade down the funnel: cultural noise precedes search
//! interest, search precedes buying, buying precedes media pickup. This module
//! measures that cascade per keyword: Pearson correlation between adjacent
//! layers at the best time offset, and a weighted composite (AMI) that places
//! the keyword at a funnel stage.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::stats;
use crate::types::{AmiScore, AttentionLayer, CrossLayerPattern, MigrationStage, PatternStatus};

/// Composite weights for the four scored layers.
pub const AMI_WEIGHT_CULTURAL: f64 = 0.2;
pub const AMI_WEIGHT_SEARCH: f64 = 0.3;
pub const AMI_WEIGHT_MARKETPLACE: f64 = 0.25;
pub const AMI_WEIGHT_MEDIA: f64 = 0.25;

/// Maximum distance, in seconds, between a shifted source observation and its
/// target match.
pub const ALIGNMENT_TOLERANCE_SECONDS: i64 = 86_400;
/// Aligned pairs required before a correlation is worth reporting.
pub const MIN_ALIGNED_PAIRS: usize = 2;

/// One observation in a per-layer time series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub at: DateTime<Utc>,
    pub value: f64,
}

/// Best lead/lag fit between two series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LagResult {
    pub lag_days: i64,
    pub correlation: f64,
    pub sample_size: usize,
}

/// Pearson correlation coefficient between two equal-length series, clamped to
/// `[-1, 1]`. Mismatched lengths, fewer than two points, or zero variance on
/// either side all report 0 rather than failing.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.len() < 2 {
        return 0.0;
    }

    let mean_x = stats::mean(x);
    let mean_y = stats::mean(y);

    let numerator: f64 = x
        .iter()
        .zip(y.iter())
        .map(|(&xi, &yi)| (xi - mean_x) * (yi - mean_y))
        .sum();

    let sum_sq_x: f64 = x.iter().map(|&xi| (xi - mean_x).powi(2)).sum();
    let sum_sq_y: f64 = y.iter().map(|&yi| (yi - mean_y).powi(2)).sum();

    let denominator = (sum_sq_x * sum_sq_y).sqrt();

    if denominator == 0.0 {
        0.0
    } else {
        (numerator / denominator).clamp(-1.0, 1.0)
    }
}

/// Scan integer day offsets from 0 to `max_lag_days`, shifting the source series
/// forward and pairing each shifted point with the nearest target observation
/// within [`ALIGNMENT_TOLERANCE_SECONDS`]. The offset with the strongest absolute
/// correlation wins; earlier offsets win ties. Returns `None` when no offset
/// produces at least [`MIN_ALIGNED_PAIRS`] aligned pairs.
pub fn detect_lag(
    source: &[SeriesPoint],
    target: &[SeriesPoint],
    max_lag_days: i64,
) -> Option<LagResult> {
    let mut best: Option<LagResult> = None;

    for lag_days in 0..=max_lag_days {
        let shift = Duration::days(lag_days);
        let mut source_values = Vec::new();
        let mut target_values = Vec::new();

        for point in source {
            let shifted = point.at + shift;
            let nearest = target
                .iter()
                .map(|t| (t, (t.at - shifted).num_seconds().abs()))
                .min_by_key(|(_, distance)| *distance);
            if let Some((matched, distance)) = nearest {
                if distance <= ALIGNMENT_TOLERANCE_SECONDS {
                    source_values.push(point.value);
                    target_values.push(matched.value);
                }
            }
        }

        if source_values.len() < MIN_ALIGNED_PAIRS {
            continue;
        }

        let correlation = pearson(&source_values, &target_values);
        let stronger = match best {
            Some(current) => correlation.abs() > current.correlation.abs(),
            None => true,
        };
        if stronger {
            best = Some(LagResult {
                lag_days,
                correlation,
                sample_size: source_values.len(),
            });
        }
    }

    best
}

/// Detect lead/lag patterns between every pair of adjacent layers that both
/// have data. Confidence scales with correlation strength and saturates once
/// the aligned sample count reaches `full_confidence_samples`.
pub fn cross_layer_patterns(
    keyword: &str,
    series_by_layer: &BTreeMap<AttentionLayer, Vec<SeriesPoint>>,
    max_lag_days: i64,
    full_confidence_samples: usize,
    detected_at: DateTime<Utc>,
) -> Vec<CrossLayerPattern> {
    let mut patterns = Vec::new();

    for (layer, source_series) in series_by_layer {
        let Some(next_layer) = layer.successor() else {
            continue;
        };
        let Some(target_series) = series_by_layer.get(&next_layer) else {
            continue;
        };
        let Some(lag) = detect_lag(source_series, target_series, max_lag_days) else {
            continue;
        };

        let coverage = (lag.sample_size as f64 / full_confidence_samples.max(1) as f64).min(1.0);
        let confidence = (lag.correlation.abs() * coverage).sqrt();
        patterns.push(CrossLayerPattern {
            id: Uuid::new_v4(),
            keyword: keyword.to_string(),
            source_layer: *layer,
            target_layer: next_layer,
            correlation_strength: lag.correlation,
            lag_days: lag.lag_days,
            sample_size: lag.sample_size,
            confidence,
            status: PatternStatus::Active,
            detected_at,
        });
    }

    patterns
}

/// Composite AMI: weighted blend of the four scored layers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmiComputation {
    pub score: f64,
    pub stage: MigrationStage,
    pub confidence: f64,
}

/// Blend per-layer scores into the composite index and classify the funnel
/// stage. Missing layers contribute zero. Confidence reflects layer coverage:
/// it starts at 0.2 and reaches 1.0 only with all four scored layers reporting.
pub fn compute_ami(layer_scores: &BTreeMap<AttentionLayer, f64>) -> AmiComputation {
    let cultural = layer_scores.get(&AttentionLayer::CulturalNoise).copied().unwrap_or(0.0);
    let search = layer_scores.get(&AttentionLayer::SearchIntent).copied().unwrap_or(0.0);
    let marketplace = layer_scores.get(&AttentionLayer::Marketplace).copied().unwrap_or(0.0);
    let media = layer_scores
        .get(&AttentionLayer::MediaAmplification)
        .copied()
        .unwrap_or(0.0);

    let score = (AMI_WEIGHT_CULTURAL * cultural
        + AMI_WEIGHT_SEARCH * search
        + AMI_WEIGHT_MARKETPLACE * marketplace
        + AMI_WEIGHT_MEDIA * media)
        .clamp(0.0, 1.0);

    // Rule order matters: high cultural chatter with little search intent is
    // the defining shape of early noise, whatever the other layers say.
    let stage = if cultural > 0.6 && search < 0.3 {
        MigrationStage::EarlyNoise
    } else if search > 0.5 {
        MigrationStage::SearchGrowth
    } else if marketplace > 0.5 {
        MigrationStage::BuyerInterest
    } else if media > 0.6 {
        MigrationStage::MediaAmplification
    } else {
        MigrationStage::EarlyNoise
    };

    let reporting = [cultural, search, marketplace, media]
        .iter()
        .filter(|v| **v != 0.0)
        .count();
    let confidence = (reporting as f64 / 4.0 * 0.8 + 0.2).min(1.0);

    AmiComputation { score, stage, confidence }
}

/// Assemble the persisted AMI record for a keyword.
pub fn build_ami_score(
    keyword: &str,
    layer_scores: BTreeMap<AttentionLayer, f64>,
    computed_at: DateTime<Utc>,
) -> AmiScore {
    let computation = compute_ami(&layer_scores);
    AmiScore {
        keyword: keyword.to_string(),
        score: computation.score,
        stage: computation.stage,
        confidence: computation.confidence,
        layer_scores,
        computed_at,
    }
}
