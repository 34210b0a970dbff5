//! Extrema detection and envelope construction.

use gps_deform_signal::{mean, std_dev};

/// Number of leading/trailing samples compared when forcing a boundary
/// extremum.
const BOUNDARY_SPAN: usize = 5;

/// A local extremum: sample index and value.
pub type Extremum = (usize, f64);

/// Maxima and minima of a signal, each sorted by index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extrema {
    /// Local maxima.
    pub maxima: Vec<Extremum>,
    /// Local minima.
    pub minima: Vec<Extremum>,
}

impl Extrema {
    /// Returns `true` if both lists hold at least `min` entries.
    #[must_use]
    pub fn has_at_least(&self, min: usize) -> bool {
        self.maxima.len() >= min && self.minima.len() >= min
    }
}

/// Finds the extrema of a GPS displacement signal.
///
/// A sample in `[w, n − w)` with `w = clamp(n / 20, 3, 7)` is a maximum if
/// it exceeds every neighbour within `w` by the dynamic threshold
/// `max(base_threshold, 0.1·std)` and lies above `mean + threshold`; minima
/// mirror that. The first and last samples are forced in when they dominate
/// the nearest five samples. If either list ends up shorter than
/// `min_extrema`, detection is retried with half the threshold and a plain
/// three-point test.
#[must_use]
pub fn find_extrema(signal: &[f64], base_threshold: f64, min_extrema: usize) -> Extrema {
    let n = signal.len();
    if n == 0 {
        return Extrema::default();
    }

    let m = mean(signal);
    let threshold = base_threshold.max(std_dev(signal) * 0.1);
    let window = (n / 20).clamp(3, 7);

    let mut extrema = Extrema::default();

    if n > 2 * window {
        for i in window..n - window {
            let x = signal[i];
            let neighbours = (i - window..=i + window).filter(|j| *j != i);
            let mut is_max = true;
            let mut is_min = true;
            for j in neighbours {
                if x <= signal[j] + threshold {
                    is_max = false;
                }
                if x >= signal[j] - threshold {
                    is_min = false;
                }
            }
            if is_max && x > m + threshold {
                extrema.maxima.push((i, x));
            } else if is_min && x < m - threshold {
                extrema.minima.push((i, x));
            }
        }
    }

    if n > 2 {
        let first = signal[0];
        let head = &signal[..BOUNDARY_SPAN.min(n)];
        if head.iter().all(|v| first >= v - threshold) && first > m {
            extrema.maxima.insert(0, (0, first));
        } else if head.iter().all(|v| first <= v + threshold) && first < m {
            extrema.minima.insert(0, (0, first));
        }

        let last_index = n - 1;
        let last = signal[last_index];
        let tail = &signal[n.saturating_sub(BOUNDARY_SPAN)..];
        if tail.iter().all(|v| last >= v - threshold) && last > m {
            extrema.maxima.push((last_index, last));
        } else if tail.iter().all(|v| last <= v + threshold) && last < m {
            extrema.minima.push((last_index, last));
        }
    }

    if extrema.has_at_least(min_extrema) {
        extrema
    } else {
        find_extrema_relaxed(signal, threshold * 0.5)
    }
}

/// Three-point extrema test with an explicit threshold. An empty list is
/// replaced by the two endpoints.
fn find_extrema_relaxed(signal: &[f64], threshold: f64) -> Extrema {
    let n = signal.len();
    let mut extrema = Extrema::default();

    for i in 1..n.saturating_sub(1) {
        let (prev, x, next) = (signal[i - 1], signal[i], signal[i + 1]);
        if x > prev + threshold && x > next + threshold {
            extrema.maxima.push((i, x));
        } else if x < prev - threshold && x < next - threshold {
            extrema.minima.push((i, x));
        }
    }

    let endpoints = [(0, signal[0]), (n - 1, signal[n - 1])];
    if extrema.maxima.is_empty() {
        extrema.maxima.extend(endpoints);
    }
    if extrema.minima.is_empty() {
        extrema.minima.extend(endpoints);
    }
    extrema
}

/// Piecewise-linear envelope through `points`, held constant before the
/// first and after the last point.
///
/// A single point yields a constant envelope; no points yields zeros.
#[must_use]
pub fn envelope(points: &[Extremum], len: usize) -> Vec<f64> {
    let (Some(&(first_index, first_value)), Some(&(last_index, last_value))) =
        (points.first(), points.last())
    else {
        return vec![0.0; len];
    };

    let mut out = Vec::with_capacity(len);
    let mut segment = 0;
    for i in 0..len {
        if i <= first_index {
            out.push(first_value);
            continue;
        }
        if i >= last_index {
            out.push(last_value);
            continue;
        }
        while segment + 1 < points.len() && points[segment + 1].0 < i {
            segment += 1;
        }
        let (i0, v0) = points[segment];
        let (i1, v1) = points[(segment + 1).min(points.len() - 1)];
        if i1 == i0 {
            out.push(v0);
        } else {
            #[allow(clippy::cast_precision_loss)]
            let ratio = (i - i0) as f64 / (i1 - i0) as f64;
            out.push((v1 - v0).mul_add(ratio, v0));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use super::*;

    fn sine(period: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let t = i as f64;
                (2.0 * PI * t / period).sin()
            })
            .collect()
    }

    #[test]
    fn smooth_sine_falls_back_to_three_point_test() {
        // Neighbouring samples differ by less than the dynamic threshold,
        // so the windowed pass finds nothing and the relaxed pass runs.
        let extrema = find_extrema(&sine(20.0, 120), 0.001, 3);
        let maxima: Vec<usize> = extrema.maxima.iter().map(|(i, _)| *i).collect();
        let minima: Vec<usize> = extrema.minima.iter().map(|(i, _)| *i).collect();
        assert_eq!(maxima, vec![5, 25, 45, 65, 85, 105]);
        assert_eq!(minima, vec![15, 35, 55, 75, 95, 115]);
    }

    #[test]
    fn sharp_spikes_found_by_windowed_pass() {
        let mut signal = vec![0.0; 100];
        for i in [20, 50, 80] {
            signal[i] = 1.0;
        }
        for i in [30, 60, 90] {
            signal[i] = -1.0;
        }
        let extrema = find_extrema(&signal, 0.001, 3);
        let maxima: Vec<usize> = extrema.maxima.iter().map(|(i, _)| *i).collect();
        let minima: Vec<usize> = extrema.minima.iter().map(|(i, _)| *i).collect();
        assert_eq!(maxima, vec![20, 50, 80]);
        assert_eq!(minima, vec![30, 60, 90]);
    }

    #[test]
    fn monotonic_signal_uses_endpoints() {
        let ramp: Vec<f64> = (0..30).map(f64::from).collect();
        let extrema = find_extrema(&ramp, 0.001, 3);
        assert_eq!(extrema.maxima.len(), 2);
        assert_eq!(extrema.minima.len(), 2);
        assert!(!extrema.has_at_least(3));
    }

    #[test]
    fn envelope_is_linear_between_points_and_flat_outside() {
        let env = envelope(&[(2, 1.0), (6, 5.0)], 9);
        assert_eq!(env, vec![1.0, 1.0, 1.0, 2.0, 3.0, 4.0, 5.0, 5.0, 5.0]);
    }

    #[test]
    fn single_point_envelope_is_constant() {
        assert_eq!(envelope(&[(3, 2.5)], 4), vec![2.5; 4]);
        assert_eq!(envelope(&[], 2), vec![0.0; 2]);
    }
}
