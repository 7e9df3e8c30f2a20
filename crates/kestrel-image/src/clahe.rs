//! Contrast-limited adaptive histogram equalization.

use crate::Image;

/// Applies CLAHE to `image` in place.
///
/// The image is divided into a `tiles_x` × `tiles_y` grid; each tile gets a clipped-histogram
/// equalization lookup table, and every pixel is remapped by bilinearly interpolating between the
/// tables of the 4 surrounding tile centers. `clip_limit` is the contrast limit relative to a
/// uniform histogram (OpenCV convention); the typical value for camera preprocessing is 3.0.
pub fn clahe(image: &mut Image, clip_limit: f32, tiles_x: u32, tiles_y: u32) {
    let (width, height) = (image.width(), image.height());
    if width < tiles_x || height < tiles_y {
        log::warn!("image too small for {tiles_x}x{tiles_y} CLAHE tiles, skipping equalization");
        return;
    }

    let tile_w = (width + tiles_x - 1) / tiles_x;
    let tile_h = (height + tiles_y - 1) / tiles_y;

    let luts = build_tile_luts(image, clip_limit, tiles_x, tiles_y, tile_w, tile_h);

    for y in 0..height {
        for x in 0..width {
            // Position of the pixel in "tile center" coordinates.
            let tx = (x as f32 - tile_w as f32 / 2.0) / tile_w as f32;
            let ty = (y as f32 - tile_h as f32 / 2.0) / tile_h as f32;

            let tx0 = tx.floor().max(0.0) as u32;
            let ty0 = ty.floor().max(0.0) as u32;
            let tx0 = tx0.min(tiles_x - 1);
            let ty0 = ty0.min(tiles_y - 1);
            let tx1 = (tx0 + 1).min(tiles_x - 1);
            let ty1 = (ty0 + 1).min(tiles_y - 1);
            let fx = (tx - tx0 as f32).clamp(0.0, 1.0);
            let fy = (ty - ty0 as f32).clamp(0.0, 1.0);

            let v = image.get(x, y) as usize;
            let p00 = luts[(ty0 * tiles_x + tx0) as usize][v] as f32;
            let p10 = luts[(ty0 * tiles_x + tx1) as usize][v] as f32;
            let p01 = luts[(ty1 * tiles_x + tx0) as usize][v] as f32;
            let p11 = luts[(ty1 * tiles_x + tx1) as usize][v] as f32;

            let top = p00 + (p10 - p00) * fx;
            let bottom = p01 + (p11 - p01) * fx;
            let value = top + (bottom - top) * fy;
            image.set(x, y, value.round().clamp(0.0, 255.0) as u8);
        }
    }
}

fn build_tile_luts(
    image: &Image,
    clip_limit: f32,
    tiles_x: u32,
    tiles_y: u32,
    tile_w: u32,
    tile_h: u32,
) -> Vec<[u8; 256]> {
    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);

    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(image.width());
            let y1 = (y0 + tile_h).min(image.height());
            let area = ((x1 - x0) * (y1 - y0)) as u32;

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[image.get(x, y) as usize] += 1;
                }
            }

            clip_histogram(&mut hist, clip_limit, area);

            // Cumulative distribution, scaled so the brightest bin maps to 255.
            let mut lut = [0u8; 256];
            let mut cum = 0u32;
            for (bin, entry) in lut.iter_mut().enumerate() {
                cum += hist[bin];
                *entry = ((cum as f32 * 255.0 / area as f32).round()).clamp(0.0, 255.0) as u8;
            }
            luts.push(lut);
        }
    }

    luts
}

fn clip_histogram(hist: &mut [u32; 256], clip_limit: f32, area: u32) {
    let limit = ((clip_limit * area as f32 / 256.0).max(1.0)) as u32;

    let mut excess = 0u32;
    for count in hist.iter_mut() {
        if *count > limit {
            excess += *count - limit;
            *count = limit;
        }
    }

    // Redistribute the clipped mass uniformly.
    let bump = excess / 256;
    let mut remainder = excess % 256;
    for count in hist.iter_mut() {
        *count += bump;
        if remainder > 0 {
            *count += 1;
            remainder -= 1;
        }
    }
}
