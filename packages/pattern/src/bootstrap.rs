//! Built-in seed patterns used while a device has no library entries.

use gps_deform_models::{DeformationPattern, PatternKind, PatternSource, RiskLevel};
use gps_deform_signal::SeededRng;

/// Length of every bootstrap sequence.
pub const BOOTSTRAP_LEN: usize = 50;

const BOOTSTRAP_SEED: u32 = 12_345;
const STEP_INDEX: usize = 25;

fn seed_pattern(
    id: &str,
    kind: PatternKind,
    risk_level: RiskLevel,
    sequence: Vec<f64>,
) -> DeformationPattern {
    DeformationPattern {
        id: id.to_string(),
        device_id: None,
        sequence,
        risk_level,
        features: None,
        kind,
        quality: 1.0,
        source: PatternSource::Bootstrap,
        update_count: 0,
        created_at: None,
        updated_at: None,
    }
}

/// Returns the three deterministic bootstrap patterns: a flat series, a
/// steady linear rise and a step change at index 25.
#[must_use]
pub fn bootstrap_patterns() -> Vec<DeformationPattern> {
    let mut rng = SeededRng::stream(BOOTSTRAP_SEED, 0);
    let stable = (0..BOOTSTRAP_LEN).map(|_| rng.next_f64() * 0.0005).collect();

    let mut rng = SeededRng::stream(BOOTSTRAP_SEED, 1);
    let linear = (0..BOOTSTRAP_LEN)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let step = i as f64;
            0.001f64.mul_add(step, rng.next_f64() * 0.0002)
        })
        .collect();

    let mut rng = SeededRng::stream(BOOTSTRAP_SEED, 2);
    let sudden = (0..BOOTSTRAP_LEN)
        .map(|i| {
            if i < STEP_INDEX {
                0.0001
            } else {
                rng.next_f64().mul_add(0.0005, 0.002)
            }
        })
        .collect();

    vec![
        seed_pattern("stable_pattern", PatternKind::Stable, RiskLevel::Normal, stable),
        seed_pattern(
            "linear_increase",
            PatternKind::LinearTrend,
            RiskLevel::Orange,
            linear,
        ),
        seed_pattern(
            "sudden_change",
            PatternKind::SuddenChange,
            RiskLevel::Blue,
            sudden,
        ),
    ]
}
