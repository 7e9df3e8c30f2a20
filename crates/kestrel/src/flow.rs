//! Sparse pyramidal Lucas-Kanade optical flow.
//!
//! This is the classic iterative gradient-descent tracker: for each point, the local 21×21
//! window of the previous image is matched against the current image by Newton iterations on the
//! sum-of-squared-differences, coarse-to-fine over an image pyramid. A supplied initial guess
//! replaces the coarse pyramid levels (the caller then tracks on a single level), which is how
//! motion-prediction warm-starting and reverse-consistency checks run.

use kestrel_image::Pyramid;
use nalgebra::{Point2, Vector2};

/// Sparse Lucas-Kanade tracker.
pub struct PyramidalLk {
    window: i32,
    max_iterations: u32,
    epsilon: f32,
}

impl Default for PyramidalLk {
    fn default() -> Self {
        Self::new()
    }
}

impl PyramidalLk {
    /// Number of pyramid levels used when tracking without an initial guess.
    pub const COLD_LEVELS: usize = 3;

    /// Number of pyramid levels used when an initial guess is available.
    pub const WARM_LEVELS: usize = 1;

    pub fn new() -> Self {
        Self {
            window: 21,
            max_iterations: 30,
            epsilon: 0.01,
        }
    }

    /// Tracks `points` from `prev` into `cur`.
    ///
    /// `initial` optionally supplies a per-point starting estimate of the tracked position in
    /// `cur` (it must be parallel to `points`); without it, tracking starts at the original
    /// positions. `levels` limits the number of pyramid levels used, counted from full
    /// resolution.
    ///
    /// Returns the tracked positions and a parallel success mask. Failed points keep their last
    /// iteration estimate but must not be used.
    pub fn track(
        &self,
        prev: &Pyramid,
        cur: &Pyramid,
        points: &[Point2<f32>],
        initial: Option<&[Point2<f32>]>,
        levels: usize,
    ) -> (Vec<Point2<f32>>, Vec<bool>) {
        if let Some(initial) = initial {
            assert_eq!(
                initial.len(),
                points.len(),
                "initial flow estimates must be parallel to the input points",
            );
        }

        let levels = levels.min(prev.num_levels()).min(cur.num_levels()).max(1);

        let mut tracked = Vec::with_capacity(points.len());
        let mut status = Vec::with_capacity(points.len());
        for (i, &point) in points.iter().enumerate() {
            let init_flow = match initial {
                Some(initial) => initial[i] - point,
                None => Vector2::zeros(),
            };
            match self.track_point(prev, cur, point, init_flow, levels) {
                Some(new) => {
                    tracked.push(new);
                    status.push(true);
                }
                None => {
                    tracked.push(point + init_flow);
                    status.push(false);
                }
            }
        }
        (tracked, status)
    }

    fn track_point(
        &self,
        prev: &Pyramid,
        cur: &Pyramid,
        from: Point2<f32>,
        init_flow: Vector2<f32>,
        levels: usize,
    ) -> Option<Point2<f32>> {
        if !from.x.is_finite() || !from.y.is_finite() {
            return None;
        }

        let half = self.window / 2;
        let mut flow = init_flow / (1 << (levels - 1)) as f32;

        for level in (0..levels).rev() {
            let prev_img = prev.level(level);
            let cur_img = cur.level(level);
            let scale = 1.0 / (1u32 << level) as f32;
            let px = from.x * scale;
            let py = from.y * scale;

            if px < 0.0
                || py < 0.0
                || px > (prev_img.width() - 1) as f32
                || py > (prev_img.height() - 1) as f32
            {
                return None;
            }

            // Template values and gradients, sampled once per level.
            let samples = (self.window * self.window) as usize;
            let mut template = Vec::with_capacity(samples);
            let mut grad = Vec::with_capacity(samples);
            let (mut g11, mut g12, mut g22) = (0.0f32, 0.0f32, 0.0f32);
            for wy in -half..=half {
                for wx in -half..=half {
                    let sx = px + wx as f32;
                    let sy = py + wy as f32;
                    let ix = (prev_img.sample(sx + 1.0, sy) - prev_img.sample(sx - 1.0, sy)) * 0.5;
                    let iy = (prev_img.sample(sx, sy + 1.0) - prev_img.sample(sx, sy - 1.0)) * 0.5;
                    template.push(prev_img.sample(sx, sy));
                    grad.push((ix, iy));
                    g11 += ix * ix;
                    g12 += ix * iy;
                    g22 += iy * iy;
                }
            }

            let det = g11 * g22 - g12 * g12;
            if det < 1.0 {
                // Texture-free window; the system is unsolvable.
                return None;
            }

            for _ in 0..self.max_iterations {
                let (mut b1, mut b2) = (0.0f32, 0.0f32);
                let mut k = 0;
                for wy in -half..=half {
                    for wx in -half..=half {
                        let diff = template[k]
                            - cur_img.sample(px + flow.x + wx as f32, py + flow.y + wy as f32);
                        let (ix, iy) = grad[k];
                        b1 += diff * ix;
                        b2 += diff * iy;
                        k += 1;
                    }
                }

                let dx = (g22 * b1 - g12 * b2) / det;
                let dy = (g11 * b2 - g12 * b1) / det;
                flow.x += dx;
                flow.y += dy;
                if dx * dx + dy * dy < self.epsilon * self.epsilon {
                    break;
                }
            }

            if !flow.x.is_finite() || !flow.y.is_finite() {
                return None;
            }

            if level > 0 {
                flow *= 2.0;
            }
        }

        let new = from + flow;
        let base = cur.base();
        if new.x < 0.0
            || new.y < 0.0
            || new.x > (base.width() - 1) as f32
            || new.y > (base.height() - 1) as f32
        {
            return None;
        }
        Some(new)
    }
}

/// Keeps only forward-tracked points whose backward track lands within `max_error` pixels of the
/// original position.
///
/// `status` is updated in place; `prev_pts`, `tracked`, and `status` must be parallel.
pub fn reverse_check(
    lk: &PyramidalLk,
    prev: &Pyramid,
    cur: &Pyramid,
    prev_pts: &[Point2<f32>],
    tracked: &[Point2<f32>],
    status: &mut [bool],
    max_error: f32,
) {
    // The backward pass is warm-started from the known previous positions on a single level,
    // mirroring the forward warm-start path.
    let (back, back_status) = lk.track(cur, prev, tracked, Some(prev_pts), PyramidalLk::WARM_LEVELS);

    for i in 0..status.len() {
        let round_trip = (back[i] - prev_pts[i]).norm();
        status[i] = status[i] && back_status[i] && round_trip <= max_error;
    }
}
