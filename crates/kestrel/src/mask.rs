//! Spatial occupancy mask.
//!
//! The mask keeps the landmark set spread out: every accepted landmark claims a disk of the
//! minimum feature distance, and both the keep-culling of existing tracks and the detection of
//! new corners only happen where the mask is still free.

use nalgebra::Point2;

#[derive(Clone)]
pub struct OccupancyMask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl OccupancyMask {
    const FREE: u8 = 255;
    const OCCUPIED: u8 = 0;

    /// Creates an all-free mask of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![Self::FREE; (width * height) as usize],
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether the pixel under `point` (rounded) is still free. Out-of-image points are not
    /// free.
    pub fn is_free(&self, point: Point2<f32>) -> bool {
        let x = point.x.round() as i64;
        let y = point.y.round() as i64;
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return false;
        }
        self.data[(y as u32 * self.width + x as u32) as usize] == Self::FREE
    }

    /// Claims a filled disk of `radius` pixels around `center` (rounded), clipped to the mask.
    pub fn occupy_disk(&mut self, center: Point2<f32>, radius: f32) {
        let cx = center.x.round() as i64;
        let cy = center.y.round() as i64;
        let r = radius.ceil() as i64;
        let r2 = radius * radius;

        for y in (cy - r).max(0)..=(cy + r).min(self.height as i64 - 1) {
            let dy = (y - cy) as f32;
            for x in (cx - r).max(0)..=(cx + r).min(self.width as i64 - 1) {
                let dx = (x - cx) as f32;
                if dx * dx + dy * dy <= r2 {
                    self.data[(y as u32 * self.width + x as u32) as usize] = Self::OCCUPIED;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_free() {
        let mask = OccupancyMask::new(100, 50);
        assert!(mask.is_free(Point2::new(0.0, 0.0)));
        assert!(mask.is_free(Point2::new(99.4, 49.4)));
        assert!(!mask.is_free(Point2::new(100.0, 25.0)));
        assert!(!mask.is_free(Point2::new(-1.0, 25.0)));
    }

    #[test]
    fn disk_occupies_radius() {
        let mut mask = OccupancyMask::new(100, 100);
        mask.occupy_disk(Point2::new(50.0, 50.0), 10.0);

        assert!(!mask.is_free(Point2::new(50.0, 50.0)));
        assert!(!mask.is_free(Point2::new(59.0, 50.0)));
        assert!(!mask.is_free(Point2::new(50.0, 41.0)));
        assert!(mask.is_free(Point2::new(61.0, 50.0)));
        assert!(mask.is_free(Point2::new(58.0, 58.0)));
    }

    #[test]
    fn disk_clips_at_borders() {
        let mut mask = OccupancyMask::new(30, 30);
        mask.occupy_disk(Point2::new(1.0, 1.0), 10.0);
        assert!(!mask.is_free(Point2::new(0.0, 0.0)));
        assert!(mask.is_free(Point2::new(15.0, 15.0)));
    }
}
