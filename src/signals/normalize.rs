//! Signal feature derivation.
//!
//! Whatever shape a source's raw numbers have, every stored observation carries
//! the same derived metrics: velocity, acceleration, deviation from history, an
//! anomaly z-score, and a bounded attention density composite. Sources differ in
//! how their raw value is produced; the derivations here are uniform.

use chrono::{DateTime, Utc};

use crate::stats;
use crate::types::SignalFeatures;

/// Change per second between the two most recent observations. Zero with fewer
/// than two points or a non-positive time gap.
pub fn velocity(points: &[(DateTime<Utc>, f64)]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let (earlier_at, earlier_value) = points[points.len() - 2];
    let (latest_at, latest_value) = points[points.len() - 1];
    let dt = (latest_at - earlier_at).num_seconds();
    if dt <= 0 {
        return 0.0;
    }
    (latest_value - earlier_value) / dt as f64
}

/// Change in velocity per second across the three most recent observations.
/// Zero with fewer than three points.
pub fn acceleration(points: &[(DateTime<Utc>, f64)]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let latest_velocity = velocity(points);
    let earlier_velocity = velocity(&points[..points.len() - 1]);
    let dt = (points[points.len() - 1].0 - points[points.len() - 2].0).num_seconds();
    if dt <= 0 {
        return 0.0;
    }
    (latest_velocity - earlier_velocity) / dt as f64
}

/// Derive the uniform feature block for the newest observation. `points` is the
/// full ascending history including the new observation as its last element.
pub fn derive_features(points: &[(DateTime<Utc>, f64)]) -> SignalFeatures {
    let Some(&(_, latest)) = points.last() else {
        return SignalFeatures::default();
    };

    let values: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
    let mean = stats::mean(&values);
    let std_dev = stats::standard_deviation(&values, Some(mean));
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let relative_deviation = if mean == 0.0 { 0.0 } else { (latest - mean) / mean };
    let anomaly_z_score = if std_dev == 0.0 { 0.0 } else { (latest - mean) / std_dev };

    // Density blends absolute level against the historical peak with a squashed
    // momentum term, keeping the composite inside [0, 1].
    let level = if max > 0.0 { (latest / max).clamp(0.0, 1.0) } else { 0.0 };
    let momentum = ((anomaly_z_score / 3.0).clamp(-1.0, 1.0) + 1.0) / 2.0;
    let attention_density_score = (0.6 * level + 0.4 * momentum).clamp(0.0, 1.0);

    SignalFeatures {
        velocity: velocity(points),
        acceleration: acceleration(points),
        relative_deviation,
        anomaly_z_score,
        attention_density_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn points(values: &[f64]) -> Vec<(DateTime<Utc>, f64)> {
        let base = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (base + Duration::hours(i as i64), *v))
            .collect()
    }

    #[test]
    fn velocity_needs_two_points() {
        assert_eq!(velocity(&[]), 0.0);
        assert_eq!(velocity(&points(&[5.0])), 0.0);
        // +36 over one hour.
        let v = velocity(&points(&[10.0, 46.0]));
        assert!((v - 36.0 / 3600.0).abs() < 1e-12);
    }

    #[test]
    fn acceleration_needs_three_points() {
        assert_eq!(acceleration(&points(&[1.0, 2.0])), 0.0);
        // Velocities: 10/h then 30/h; the change happens over one hour.
        let a = acceleration(&points(&[0.0, 10.0, 40.0]));
        let expected = (30.0 / 3600.0 - 10.0 / 3600.0) / 3600.0;
        assert!((a - expected).abs() < 1e-15);
    }

    #[test]
    fn simultaneous_observations_produce_zero_velocity() {
        let at = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        assert_eq!(velocity(&[(at, 1.0), (at, 9.0)]), 0.0);
    }

    #[test]
    fn flat_history_zeroes_deviation_and_anomaly() {
        let features = derive_features(&points(&[5.0, 5.0, 5.0, 5.0]));
        assert_eq!(features.relative_deviation, 0.0);
        assert_eq!(features.anomaly_z_score, 0.0);
        assert_eq!(features.velocity, 0.0);
    }

    #[test]
    fn spike_raises_every_momentum_metric() {
        let features = derive_features(&points(&[10.0, 11.0, 9.0, 10.0, 40.0]));
        assert!(features.velocity > 0.0);
        assert!(features.relative_deviation > 0.0);
        assert!(features.anomaly_z_score > 1.0);
        assert!(features.attention_density_score > 0.8);
    }

    #[test]
    fn density_stays_bounded() {
        for history in [
            points(&[0.0]),
            points(&[0.0, 0.0, 0.0]),
            points(&[1000.0, 0.1]),
            points(&[0.1, 1000.0]),
            Vec::new(),
        ] {
            let density = derive_features(&history).attention_density_score;
            assert!((0.0..=1.0).contains(&density), "density {density} out of range");
        }
    }

    #[test]
    fn first_observation_reports_neutral_features() {
        let features = derive_features(&points(&[42.0]));
        assert_eq!(features.velocity, 0.0);
        assert_eq!(features.acceleration, 0.0);
        assert_eq!(features.relative_deviation, 0.0);
        assert_eq!(features.anomaly_z_score, 0.0);
        // Sole observation is its own peak: 0.6 level + 0.2 neutral momentum.
        assert!((features.attention_density_score - 0.8).abs() < 1e-12);
    }
}
