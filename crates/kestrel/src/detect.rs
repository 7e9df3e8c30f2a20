//! Shi-Tomasi corner detection.
//!
//! Scores every pixel by the smaller eigenvalue of the local gradient structure tensor, then
//! greedily picks the strongest corners that respect an occupancy mask and a minimum spacing.
//! This is the replenishment source for the tracker: it only ever runs where the mask left room.

use kestrel_image::Image;
use kestrel_utils::num::TotalF32;
use nalgebra::Point2;

use crate::mask::OccupancyMask;

/// Margin in which no corners are detected. Keeps the tracking windows of fresh corners inside
/// the image.
const EDGE_MARGIN: u32 = 3;

/// Detects up to `max_corners` corners in `image`, strongest first.
///
/// `quality_level` discards corners scoring below that fraction of the best corner's score.
/// Corners are only reported where `mask` is free, and each accepted corner claims a disk of
/// `min_distance` pixels, so the result also keeps that distance from the mask's existing
/// occupants and among itself.
pub fn good_features_to_track(
    image: &Image,
    max_corners: usize,
    quality_level: f32,
    min_distance: f32,
    mask: &OccupancyMask,
) -> Vec<Point2<f32>> {
    if max_corners == 0 {
        return Vec::new();
    }

    let (width, height) = (image.width(), image.height());
    if width <= 2 * EDGE_MARGIN || height <= 2 * EDGE_MARGIN {
        return Vec::new();
    }

    let response = corner_response(image);

    // Highest response over the image, for the relative quality cutoff.
    let max_response = response
        .iter()
        .copied()
        .max_by_key(|&r| TotalF32(r))
        .unwrap_or(0.0);
    if max_response <= 0.0 {
        return Vec::new();
    }
    let threshold = max_response * quality_level;

    // Local maxima above the quality threshold, sorted by descending score.
    let mut candidates = Vec::new();
    let w = width as usize;
    for y in EDGE_MARGIN..height - EDGE_MARGIN {
        for x in EDGE_MARGIN..width - EDGE_MARGIN {
            let r = response[y as usize * w + x as usize];
            if r < threshold {
                continue;
            }
            let is_peak = (-1..=1).all(|dy: i32| {
                (-1..=1).all(|dx: i32| {
                    r >= response[(y as i32 + dy) as usize * w + (x as i32 + dx) as usize]
                })
            });
            if is_peak {
                candidates.push((TotalF32(r), x, y));
            }
        }
    }
    candidates.sort_unstable_by(|a, b| b.0.cmp(&a.0));

    // Greedy spacing-aware selection on a scratch copy of the mask.
    let mut scratch = mask.clone();
    let mut corners = Vec::new();
    for (_, x, y) in candidates {
        let point = Point2::new(x as f32, y as f32);
        if !scratch.is_free(point) {
            continue;
        }
        scratch.occupy_disk(point, min_distance);
        corners.push(point);
        if corners.len() == max_corners {
            break;
        }
    }

    corners
}

/// Minimum-eigenvalue corner response over 3×3 Sobel gradients and a 3×3 aggregation window.
fn corner_response(image: &Image) -> Vec<f32> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let mut gx = vec![0.0f32; width * height];
    let mut gy = vec![0.0f32; width * height];

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let p = |dx: i32, dy: i32| image.get_clamped(x as i32 + dx, y as i32 + dy) as f32;
            gx[y * width + x] = (p(1, -1) + 2.0 * p(1, 0) + p(1, 1))
                - (p(-1, -1) + 2.0 * p(-1, 0) + p(-1, 1));
            gy[y * width + x] = (p(-1, 1) + 2.0 * p(0, 1) + p(1, 1))
                - (p(-1, -1) + 2.0 * p(0, -1) + p(1, -1));
        }
    }

    let mut response = vec![0.0f32; width * height];
    for y in 2..height - 2 {
        for x in 2..width - 2 {
            let (mut sxx, mut sxy, mut syy) = (0.0f32, 0.0f32, 0.0f32);
            for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    let idx = (y as i32 + dy) as usize * width + (x as i32 + dx) as usize;
                    sxx += gx[idx] * gx[idx];
                    sxy += gx[idx] * gy[idx];
                    syy += gy[idx] * gy[idx];
                }
            }
            // Smaller eigenvalue of [[sxx, sxy], [sxy, syy]].
            let trace = sxx + syy;
            let diff = sxx - syy;
            response[y * width + x] = (trace - (diff * diff + 4.0 * sxy * sxy).sqrt()) * 0.5;
        }
    }

    response
}
