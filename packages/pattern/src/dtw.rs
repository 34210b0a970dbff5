//! Dynamic time warping.
//!
//! [`exact_dtw`] fills the full cost matrix. [`fast_dtw`] coarsens both
//! sequences by pair averaging, aligns the coarse versions exactly and then
//! refines the projected path level by level inside a band of `radius`
//! cells. Both share the same windowed dynamic program, so the FastDTW
//! distance is never below the exact one.

/// Distance reported for empty or non-finite input.
pub const INVALID_DISTANCE: f64 = 1000.0;
/// Default refinement radius for [`fast_dtw`].
pub const DEFAULT_RADIUS: usize = 10;
/// Sequences longer than this are aligned with [`fast_dtw`].
pub const FAST_DTW_THRESHOLD: usize = 100;

/// Both sequences are coarsened until neither is longer than this.
const COARSE_LEN: usize = 20;

/// Warping path as `(index in a, index in b)` pairs from `(0, 0)` to the
/// last cell.
pub type WarpPath = Vec<(usize, usize)>;

/// Result of aligning two sequences.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    /// Accumulated absolute-difference cost along the path.
    pub distance: f64,
    /// Optimal path inside the searched window.
    pub path: WarpPath,
}

impl Alignment {
    const fn invalid() -> Self {
        Self {
            distance: INVALID_DISTANCE,
            path: Vec::new(),
        }
    }
}

fn is_valid(sequence: &[f64]) -> bool {
    !sequence.is_empty() && sequence.iter().all(|v| v.is_finite())
}

/// DTW distance, switching to [`fast_dtw`] when either sequence is longer
/// than [`FAST_DTW_THRESHOLD`].
#[must_use]
pub fn dtw_distance(a: &[f64], b: &[f64]) -> f64 {
    if a.len() > FAST_DTW_THRESHOLD || b.len() > FAST_DTW_THRESHOLD {
        fast_dtw(a, b, DEFAULT_RADIUS).distance
    } else {
        exact_dtw(a, b).distance
    }
}

/// Maps a DTW distance onto `(0, 1]`, normalizing by the longer sequence.
#[must_use]
pub fn similarity(distance: f64, len_a: usize, len_b: usize) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let scale = len_a.max(len_b).max(1) as f64;
    (-distance / scale).exp()
}

/// Full-matrix DTW with path recovery.
#[must_use]
pub fn exact_dtw(a: &[f64], b: &[f64]) -> Alignment {
    if !is_valid(a) || !is_valid(b) {
        return Alignment::invalid();
    }
    let window = vec![(0, b.len() - 1); a.len()];
    windowed_dtw(a, b, &window)
}

/// Approximate DTW in linear time and space.
#[must_use]
pub fn fast_dtw(a: &[f64], b: &[f64], radius: usize) -> Alignment {
    if !is_valid(a) || !is_valid(b) {
        return Alignment::invalid();
    }
    if a.len() <= COARSE_LEN && b.len() <= COARSE_LEN {
        return exact_dtw(a, b);
    }

    let coarse = fast_dtw(&shrink(a), &shrink(b), radius);
    let window = project(&coarse.path, a.len(), b.len(), radius);
    let refined = windowed_dtw(a, b, &window);
    if refined.distance.is_finite() {
        refined
    } else {
        exact_dtw(a, b)
    }
}

fn shrink(sequence: &[f64]) -> Vec<f64> {
    sequence
        .chunks(2)
        .map(|pair| match pair {
            [x, y] => f64::midpoint(*x, *y),
            [x] => *x,
            _ => 0.0,
        })
        .collect()
}

/// Expands a coarse path to the next finer level: every coarse cell covers
/// a 2×2 block, widened by `radius` in both directions. Returns an inclusive
/// column range per row.
fn project(path: &[(usize, usize)], n: usize, m: usize, radius: usize) -> Vec<(usize, usize)> {
    let mut window = vec![(usize::MAX, 0); n];
    for &(i, j) in path {
        let row_lo = (2 * i).saturating_sub(radius);
        let row_hi = (2 * i + 1 + radius).min(n - 1);
        let col_lo = (2 * j).saturating_sub(radius);
        let col_hi = (2 * j + 1 + radius).min(m - 1);
        for row in window.iter_mut().take(row_hi + 1).skip(row_lo) {
            row.0 = row.0.min(col_lo);
            row.1 = row.1.max(col_hi);
        }
    }
    for row in &mut window {
        if row.0 == usize::MAX {
            *row = (0, m - 1);
        }
    }
    window
}

struct CostRow {
    lo: usize,
    costs: Vec<f64>,
}

impl CostRow {
    fn get(&self, j: usize) -> f64 {
        j.checked_sub(self.lo)
            .and_then(|offset| self.costs.get(offset))
            .copied()
            .unwrap_or(f64::INFINITY)
    }
}

/// DTW restricted to `window[i] = (lo, hi)` columns for each row `i`.
fn windowed_dtw(a: &[f64], b: &[f64], window: &[(usize, usize)]) -> Alignment {
    let mut rows: Vec<CostRow> = Vec::with_capacity(a.len());

    for (i, (&x, &(lo, hi))) in a.iter().zip(window).enumerate() {
        let mut costs = Vec::with_capacity(hi + 1 - lo);
        for j in lo..=hi {
            let best = if i == 0 && j == 0 {
                0.0
            } else {
                let left = costs.last().copied().unwrap_or(f64::INFINITY);
                let (up, diag) = match (i.checked_sub(1).map(|p| &rows[p]), j.checked_sub(1)) {
                    (Some(prev), Some(pj)) => (prev.get(j), prev.get(pj)),
                    (Some(prev), None) => (prev.get(j), f64::INFINITY),
                    (None, _) => (f64::INFINITY, f64::INFINITY),
                };
                up.min(left).min(diag)
            };
            costs.push((x - b[j]).abs() + best);
        }
        rows.push(CostRow { lo, costs });
    }

    let (n, m) = (a.len(), b.len());
    let distance = rows[n - 1].get(m - 1);
    if !distance.is_finite() {
        return Alignment {
            distance,
            path: Vec::new(),
        };
    }

    let mut path = vec![(n - 1, m - 1)];
    let (mut i, mut j) = (n - 1, m - 1);
    while i > 0 || j > 0 {
        if i == 0 {
            j -= 1;
        } else if j == 0 {
            i -= 1;
        } else {
            let diag = rows[i - 1].get(j - 1);
            let up = rows[i - 1].get(j);
            let left = rows[i].get(j - 1);
            if diag <= up && diag <= left {
                i -= 1;
                j -= 1;
            } else if up <= left {
                i -= 1;
            } else {
                j -= 1;
            }
        }
        path.push((i, j));
    }
    path.reverse();

    Alignment { distance, path }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drifting(len: usize, rate: f64, wobble: f64, phase: fn(f64) -> f64) -> Vec<f64> {
        (0..len)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let t = i as f64;
                rate.mul_add(t, wobble * phase(t))
            })
            .collect()
    }

    #[test]
    fn exact_distance_of_small_sequences() {
        assert!(exact_dtw(&[0.0, 1.0, 2.0], &[0.0, 1.0, 2.0]).distance.abs() < f64::EPSILON);
        // Repeated samples warp onto each other for free.
        assert!(exact_dtw(&[0.0, 0.0, 1.0], &[0.0, 1.0]).distance.abs() < f64::EPSILON);
        assert!((exact_dtw(&[1.0, 2.0, 3.0], &[2.0]).distance - 2.0).abs() < 1e-12);
    }

    #[test]
    fn path_runs_corner_to_corner() {
        let alignment = exact_dtw(&[0.0, 1.0, 1.0, 2.0], &[0.0, 1.0, 2.0]);
        assert_eq!(alignment.path.first(), Some(&(0, 0)));
        assert_eq!(alignment.path.last(), Some(&(3, 2)));
        for step in alignment.path.windows(2) {
            let (di, dj) = (step[1].0 - step[0].0, step[1].1 - step[0].1);
            assert!(di <= 1 && dj <= 1 && di + dj > 0);
        }
    }

    #[test]
    fn invalid_input_returns_sentinel() {
        assert!((dtw_distance(&[], &[1.0]) - INVALID_DISTANCE).abs() < f64::EPSILON);
        assert!((dtw_distance(&[f64::NAN, 1.0], &[1.0]) - INVALID_DISTANCE).abs() < f64::EPSILON);
        assert!(
            (fast_dtw(&[1.0], &[f64::INFINITY], DEFAULT_RADIUS).distance - INVALID_DISTANCE).abs()
                < f64::EPSILON
        );
    }

    #[test]
    fn fast_dtw_agrees_with_exact_on_drift_series() {
        let a = drifting(80, 0.001, 0.0003, f64::sin);
        let b = drifting(100, 0.0011, 0.0002, |t| (0.7 * t).cos());
        let exact = exact_dtw(&a, &b).distance;
        let fast = fast_dtw(&a, &b, DEFAULT_RADIUS).distance;
        assert!(fast >= exact - 1e-12);
        assert!((fast - exact) / exact <= 0.05, "exact {exact}, fast {fast}");
    }

    #[test]
    fn fast_dtw_agrees_with_exact_on_step_series() {
        let a: Vec<f64> = (0..90)
            .map(|i| {
                if i < 40 {
                    0.0001
                } else {
                    0.0001f64.mul_add(f64::from(i).sin(), 0.002)
                }
            })
            .collect();
        let b: Vec<f64> = (0..95).map(|i| if i < 55 { 0.0001 } else { 0.0021 }).collect();
        let exact = exact_dtw(&a, &b).distance;
        let fast = fast_dtw(&a, &b, DEFAULT_RADIUS).distance;
        assert!(fast >= exact - 1e-12);
        assert!((fast - exact) / exact <= 0.05, "exact {exact}, fast {fast}");
    }

    #[test]
    fn long_sequences_use_fast_path() {
        let a = drifting(300, 0.001, 0.0003, f64::sin);
        let b = drifting(250, 0.0011, 0.0002, |t| (0.7 * t).cos());
        let auto = dtw_distance(&a, &b);
        let fast = fast_dtw(&a, &b, DEFAULT_RADIUS).distance;
        assert!((auto - fast).abs() < f64::EPSILON);
        assert!((auto - exact_dtw(&a, &b).distance).abs() / auto <= 0.05);
    }

    #[test]
    fn similarity_decays_with_distance() {
        assert!((similarity(0.0, 10, 5) - 1.0).abs() < f64::EPSILON);
        assert!((similarity(10.0, 10, 5) - (-1.0f64).exp()).abs() < 1e-12);
        assert!(similarity(INVALID_DISTANCE, 50, 50) < 1e-8);
    }

    #[test]
    fn shrink_averages_pairs_and_keeps_odd_tail() {
        assert_eq!(shrink(&[1.0, 3.0, 5.0, 7.0, 9.0]), vec![2.0, 6.0, 9.0]);
    }
}
