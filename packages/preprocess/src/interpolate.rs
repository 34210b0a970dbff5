//! Gap filling by linear interpolation.

use chrono::Duration;
use gps_deform_models::DisplacementPoint;

/// Fills gaps longer than `gap_factor × median interval`.
///
/// For a gap of `Δt`, `k = floor(Δt / median) − 1` points (capped at
/// `max_per_gap`) are inserted at `t1 + median·i`, linearly interpolated
/// with ratio `i / (k + 1)`. Inserted points carry
/// `confidence_factor × min(neighbour confidences)` and
/// `interpolated = true`. Returns the new series and the number of inserted
/// points.
#[must_use]
pub fn fill_gaps(
    points: Vec<DisplacementPoint>,
    gap_factor: f64,
    max_per_gap: usize,
    confidence_factor: f64,
) -> (Vec<DisplacementPoint>, usize) {
    if points.len() < 2 {
        return (points, 0);
    }

    let mut intervals: Vec<i64> = points
        .windows(2)
        .map(|pair| (pair[1].timestamp - pair[0].timestamp).num_milliseconds())
        .collect();
    intervals.sort_unstable();
    let median_ms = intervals[intervals.len() / 2];
    if median_ms <= 0 {
        return (points, 0);
    }

    #[allow(clippy::cast_precision_loss)]
    let median = median_ms as f64;
    let mut out = Vec::with_capacity(points.len());
    let mut inserted = 0;

    for pair in points.windows(2) {
        let (left, right) = (&pair[0], &pair[1]);
        out.push(left.clone());

        #[allow(clippy::cast_precision_loss)]
        let gap = (right.timestamp - left.timestamp).num_milliseconds() as f64;
        if gap <= gap_factor * median {
            continue;
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let k = ((gap / median).floor() as usize)
            .saturating_sub(1)
            .min(max_per_gap);
        let confidence = confidence_factor * left.confidence.min(right.confidence);

        for i in 1..=k {
            #[allow(clippy::cast_precision_loss)]
            let ratio = i as f64 / (k + 1) as f64;
            let lerp = |a: f64, b: f64| (b - a).mul_add(ratio, a);
            let step = i64::try_from(i).unwrap_or(i64::MAX);
            out.push(DisplacementPoint {
                timestamp: left.timestamp
                    + Duration::milliseconds(median_ms.saturating_mul(step)),
                latitude: lerp(left.latitude, right.latitude),
                longitude: lerp(left.longitude, right.longitude),
                horizontal: lerp(left.horizontal, right.horizontal),
                vertical: lerp(left.vertical, right.vertical),
                distance_3d: lerp(left.distance_3d, right.distance_3d),
                bearing: left.bearing,
                confidence,
                measurement_error: lerp(left.measurement_error, right.measurement_error),
                interpolated: true,
            });
        }
        inserted += k;
    }

    if let Some(last) = points.last() {
        out.push(last.clone());
    }

    (out, inserted)
}
