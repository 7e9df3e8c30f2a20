//! Epipolar outlier rejection.
//!
//! Correspondences between the previous and the current frame of a rigid scene must satisfy
//! `x₂ᵀ F x₁ = 0` for some fundamental matrix `F`. A RANSAC loop over the normalized 8-point
//! algorithm finds the dominant `F` and flags correspondences that do not conform, which catches
//! the drifted tracks that survive the photometric checks.
//!
//! The caller is expected to feed pixel coordinates on a *virtual pinhole* image (all lens models
//! reduced to a common focal length) so that the inlier threshold has the same meaning regardless
//! of the actual camera.

use nalgebra::{DMatrix, Matrix3, Point2, Vector3};

/// Minimum number of correspondences for an 8-point fit.
pub const MIN_MATCHES: usize = 8;

/// RANSAC estimator for the fundamental matrix between two frames.
pub struct FundamentalRansac {
    threshold: f64,
    confidence: f64,
    max_iterations: u32,
    rng: fastrand::Rng,
}

impl FundamentalRansac {
    /// Creates an estimator with the given inlier threshold in (virtual) pixels.
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            confidence: 0.99,
            max_iterations: 200,
            rng: fastrand::Rng::new(),
        }
    }

    /// Like [`FundamentalRansac::new`], with a fixed RNG seed for reproducible runs.
    pub fn with_seed(threshold: f64, seed: u64) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
            ..Self::new(threshold)
        }
    }

    /// Labels each correspondence `prev[i] <-> cur[i]` as inlier (`true`) or outlier.
    ///
    /// Returns `None` when fewer than [`MIN_MATCHES`] correspondences are supplied, in which case
    /// no rejection should take place.
    pub fn inliers(&mut self, prev: &[Point2<f64>], cur: &[Point2<f64>]) -> Option<Vec<bool>> {
        assert_eq!(prev.len(), cur.len(), "correspondence sets must be parallel");
        let n = prev.len();
        if n < MIN_MATCHES {
            return None;
        }

        let mut best_mask = vec![true; n];
        let mut best_count = 0usize;
        let mut sample = [0usize; MIN_MATCHES];
        let mut iterations = self.max_iterations;

        let mut i = 0;
        while i < iterations {
            self.sample_indices(n, &mut sample);
            let f = match fit_eight_point(
                sample.iter().map(|&k| (prev[k], cur[k])),
                MIN_MATCHES,
            ) {
                Some(f) => f,
                None => {
                    i += 1;
                    continue;
                }
            };

            let mask = self.classify(&f, prev, cur);
            let count = mask.iter().filter(|&&ok| ok).count();
            if count > best_count {
                best_count = count;
                best_mask = mask;

                // Adapt the iteration count to the observed inlier ratio.
                let w = count as f64 / n as f64;
                let p_outlier_free = w.powi(MIN_MATCHES as i32);
                if p_outlier_free > 1e-12 {
                    let needed =
                        ((1.0 - self.confidence).ln() / (1.0 - p_outlier_free).ln()).ceil();
                    if needed.is_finite() && needed >= 0.0 {
                        iterations = iterations.min(needed as u32 + 1);
                    }
                }
            }
            i += 1;
        }

        if best_count < MIN_MATCHES {
            // No consensus; refuse to reject anything rather than dropping good tracks.
            return Some(vec![true; n]);
        }

        // Refit on the consensus set for a tighter final labelling.
        let refit = fit_eight_point(
            best_mask
                .iter()
                .enumerate()
                .filter(|(_, &ok)| ok)
                .map(|(k, _)| (prev[k], cur[k])),
            best_count,
        );
        if let Some(f) = refit {
            let mask = self.classify(&f, prev, cur);
            if mask.iter().filter(|&&ok| ok).count() >= best_count {
                best_mask = mask;
            }
        }

        Some(best_mask)
    }

    fn sample_indices(&mut self, n: usize, out: &mut [usize; MIN_MATCHES]) {
        for i in 0..MIN_MATCHES {
            loop {
                let candidate = self.rng.usize(0..n);
                if !out[..i].contains(&candidate) {
                    out[i] = candidate;
                    break;
                }
            }
        }
    }

    fn classify(&self, f: &Matrix3<f64>, prev: &[Point2<f64>], cur: &[Point2<f64>]) -> Vec<bool> {
        let thresh2 = self.threshold * self.threshold;
        prev.iter()
            .zip(cur)
            .map(|(p, c)| sampson_distance_sq(f, p, c) <= thresh2)
            .collect()
    }
}

/// Fits `F` to the given correspondences with the Hartley-normalized 8-point algorithm.
///
/// Returns `None` for degenerate configurations.
fn fit_eight_point(
    pairs: impl Iterator<Item = (Point2<f64>, Point2<f64>)> + Clone,
    count: usize,
) -> Option<Matrix3<f64>> {
    if count < MIN_MATCHES {
        return None;
    }

    let t1 = normalizing_transform(pairs.clone().map(|(p, _)| p), count)?;
    let t2 = normalizing_transform(pairs.clone().map(|(_, c)| c), count)?;

    let mut a = DMatrix::zeros(count, 9);
    for (row, (p, c)) in pairs.enumerate() {
        let p = t1.transform_point(&p);
        let c = t2.transform_point(&c);
        let coeffs = [
            c.x * p.x,
            c.x * p.y,
            c.x,
            c.y * p.x,
            c.y * p.y,
            c.y,
            p.x,
            p.y,
            1.0,
        ];
        for (col, coeff) in coeffs.into_iter().enumerate() {
            a[(row, col)] = coeff;
        }
    }

    // Null space of A via the eigenvector of AᵀA for the smallest singular value.
    let ata = a.transpose() * &a;
    let svd = ata.svd(true, true);
    let v_t = svd.v_t.as_ref()?;
    let f_vec: Vec<f64> = v_t.row(v_t.nrows() - 1).iter().copied().collect();
    let f_hat = Matrix3::from_row_slice(&f_vec);

    // Enforce rank 2.
    let mut svd_f = f_hat.svd(true, true);
    svd_f.singular_values[2] = 0.0;
    let f_hat = svd_f.recompose().ok()?;

    // Denormalize.
    Some(t2.to_homogeneous().transpose() * f_hat * t1.to_homogeneous())
}

/// Hartley normalization: translate the centroid to the origin, scale the mean distance to √2.
fn normalizing_transform(
    points: impl Iterator<Item = Point2<f64>>,
    count: usize,
) -> Option<nalgebra::Affine2<f64>> {
    let mut cx = 0.0;
    let mut cy = 0.0;
    let collected: Vec<Point2<f64>> = points.collect();
    for p in &collected {
        cx += p.x;
        cy += p.y;
    }
    cx /= count as f64;
    cy /= count as f64;

    let mut mean_dist = 0.0;
    for p in &collected {
        mean_dist += ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt();
    }
    mean_dist /= count as f64;
    if mean_dist < 1e-9 {
        return None;
    }

    let scale = std::f64::consts::SQRT_2 / mean_dist;
    let m = Matrix3::new(scale, 0.0, -scale * cx, 0.0, scale, -scale * cy, 0.0, 0.0, 1.0);
    Some(nalgebra::Affine2::from_matrix_unchecked(m))
}

/// First-order (Sampson) approximation of the squared geometric distance to the epipolar
/// constraint, in squared pixels.
fn sampson_distance_sq(f: &Matrix3<f64>, prev: &Point2<f64>, cur: &Point2<f64>) -> f64 {
    let x1 = Vector3::new(prev.x, prev.y, 1.0);
    let x2 = Vector3::new(cur.x, cur.y, 1.0);

    let fx1 = f * x1;
    let ftx2 = f.transpose() * x2;
    let err = x2.dot(&fx1);

    let denom = fx1.x * fx1.x + fx1.y * fx1.y + ftx2.x * ftx2.x + ftx2.y * ftx2.y;
    if denom < 1e-18 {
        return f64::INFINITY;
    }
    err * err / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Correspondences of a pure horizontal translation: epipolar lines are horizontal, so any
    /// vertical displacement is an outlier.
    fn translating_pairs() -> (Vec<Point2<f64>>, Vec<Point2<f64>>) {
        let mut prev = Vec::new();
        let mut cur = Vec::new();
        // Deterministic pseudo-random spread with depth-dependent disparity.
        let mut state = 1u64;
        let mut next = move || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 33) as f64 / (1u64 << 31) as f64
        };
        for _ in 0..60 {
            let x = 100.0 + next() * 400.0;
            let y = 80.0 + next() * 300.0;
            let disparity = 4.0 + next() * 12.0;
            prev.push(Point2::new(x, y));
            cur.push(Point2::new(x + disparity, y));
        }
        (prev, cur)
    }

    #[test]
    fn keeps_consistent_motion() {
        let (prev, cur) = translating_pairs();
        let mut ransac = FundamentalRansac::with_seed(1.0, 7);
        let mask = ransac.inliers(&prev, &cur).unwrap();
        let inliers = mask.iter().filter(|&&ok| ok).count();
        assert!(inliers >= prev.len() - 2, "only {inliers} inliers");
    }

    #[test]
    fn flags_inconsistent_matches() {
        let (mut prev, mut cur) = translating_pairs();
        // Corrupt a few correspondences with vertical drift, which violates the horizontal
        // epipolar geometry.
        let bad = [3usize, 17, 31, 44];
        for &i in &bad {
            cur[i].y += 25.0;
        }
        prev.truncate(50);
        cur.truncate(50);

        let mut ransac = FundamentalRansac::with_seed(1.0, 7);
        let mask = ransac.inliers(&prev, &cur).unwrap();
        for &i in &bad {
            assert!(!mask[i], "corrupted match {i} survived");
        }
        let inliers = mask.iter().filter(|&&ok| ok).count();
        assert!(inliers >= 40);
    }

    #[test]
    fn too_few_matches_skips_rejection() {
        let prev = vec![Point2::new(0.0, 0.0); 7];
        let cur = vec![Point2::new(1.0, 0.0); 7];
        let mut ransac = FundamentalRansac::new(1.0);
        assert!(ransac.inliers(&prev, &cur).is_none());
    }
}
