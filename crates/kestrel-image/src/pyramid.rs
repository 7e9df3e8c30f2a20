//! Image pyramids for coarse-to-fine optical flow.

use crate::Image;

/// Minimum side length of the coarsest pyramid level. Levels smaller than this are not built.
const MIN_LEVEL_SIZE: u32 = 16;

/// A multi-resolution pyramid over a grayscale image.
///
/// Level 0 is the full-resolution base image (taken by ownership, not copied); each further level
/// halves the resolution by 2×2 averaging.
pub struct Pyramid {
    levels: Vec<Image>,
}

impl Pyramid {
    /// Builds a pyramid with up to `levels` levels.
    ///
    /// Fewer levels are built if the image is too small to halve further.
    pub fn new(base: Image, levels: u32) -> Self {
        assert!(levels >= 1, "pyramid needs at least the base level");

        let mut pyramid = Vec::with_capacity(levels as usize);
        pyramid.push(base);
        for _ in 1..levels {
            let prev = pyramid.last().unwrap();
            let (w, h) = (prev.width() / 2, prev.height() / 2);
            if w < MIN_LEVEL_SIZE || h < MIN_LEVEL_SIZE {
                break;
            }
            pyramid.push(downsample(prev, w, h));
        }

        Self { levels: pyramid }
    }

    #[inline]
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Returns pyramid level `level`, where level 0 is the base image.
    #[inline]
    pub fn level(&self, level: usize) -> &Image {
        &self.levels[level]
    }

    /// The full-resolution base image.
    #[inline]
    pub fn base(&self) -> &Image {
        &self.levels[0]
    }
}

fn downsample(src: &Image, w: u32, h: u32) -> Image {
    Image::from_fn(w, h, |x, y| {
        let sum = src.get(x * 2, y * 2) as u16
            + src.get(x * 2 + 1, y * 2) as u16
            + src.get(x * 2, y * 2 + 1) as u16
            + src.get(x * 2 + 1, y * 2 + 1) as u16;
        (sum / 4) as u8
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_requested_levels() {
        let pyr = Pyramid::new(Image::new(128, 128), 3);
        assert_eq!(pyr.num_levels(), 3);
        assert_eq!(pyr.level(0).width(), 128);
        assert_eq!(pyr.level(1).width(), 64);
        assert_eq!(pyr.level(2).width(), 32);
    }

    #[test]
    fn stops_at_minimum_size(){
        let pyr = Pyramid::new(Image::new(40, 40), 3);
        assert_eq!(pyr.num_levels(), 2);
    }

    #[test]
    fn downsampling_averages() {
        let img = Image::from_fn(32, 32, |x, _| if x % 2 == 0 { 0 } else { 100 });
        let pyr = Pyramid::new(img, 2);
        assert_eq!(pyr.level(1).get(5, 5), 50);
    }
}
