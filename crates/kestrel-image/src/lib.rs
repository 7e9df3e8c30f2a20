//! Grayscale image handling for sparse visual tracking.
//!
//! Camera frames in this pipeline are single-channel 8-bit images; everything that needs color
//! (the debug overlay) goes through [`Canvas`] instead. The [`Image`] type is a thin wrapper
//! around [`image::GrayImage`] that adds the sampling and preprocessing operations the tracker
//! needs: clamped and bilinear pixel access, CLAHE, and pyramid construction.

mod clahe;
mod draw;
mod pyramid;

use std::{fmt, path::Path};

use image::{GrayImage, ImageBuffer};

pub use clahe::clahe;
pub use draw::{draw_arrow, draw_circle, draw_line, Canvas, Color};
pub use pyramid::Pyramid;

pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// An 8-bit single-channel image.
#[derive(Clone)]
pub struct Image {
    buf: GrayImage,
}

impl Image {
    /// Creates a black image of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: ImageBuffer::new(width, height),
        }
    }

    /// Creates an image by evaluating `f` at every pixel coordinate.
    pub fn from_fn(width: u32, height: u32, f: impl FnMut(u32, u32) -> u8) -> Self {
        let mut f = f;
        Self {
            buf: ImageBuffer::from_fn(width, height, |x, y| image::Luma([f(x, y)])),
        }
    }

    /// Wraps an existing buffer.
    pub fn from_gray(buf: GrayImage) -> Self {
        Self { buf }
    }

    /// Loads an image from the filesystem, converting it to grayscale if needed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let buf = image::open(path.as_ref())?.to_luma8();
        Ok(Self { buf })
    }

    /// Saves the image to the file system.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        Ok(self.buf.save(path)?)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Gets the pixel value at integer coordinates.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is outside the image.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.buf[(x, y)].0[0]
    }

    /// Sets the pixel value at integer coordinates.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is outside the image.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: u8) {
        self.buf[(x, y)] = image::Luma([value]);
    }

    /// Gets the pixel value at signed coordinates, clamping to the image edge.
    #[inline]
    pub fn get_clamped(&self, x: i32, y: i32) -> u8 {
        let x = x.clamp(0, self.width() as i32 - 1) as u32;
        let y = y.clamp(0, self.height() as i32 - 1) as u32;
        self.get(x, y)
    }

    /// Samples the image at fractional coordinates with bilinear interpolation.
    ///
    /// Coordinates outside the image are clamped to the edge.
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        let x = x.clamp(0.0, (self.width() - 1) as f32);
        let y = y.clamp(0.0, (self.height() - 1) as f32);
        let x0 = x.floor() as u32;
        let y0 = y.floor() as u32;
        let x1 = (x0 + 1).min(self.width() - 1);
        let y1 = (y0 + 1).min(self.height() - 1);
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;

        let p00 = self.get(x0, y0) as f32;
        let p10 = self.get(x1, y0) as f32;
        let p01 = self.get(x0, y1) as f32;
        let p11 = self.get(x1, y1) as f32;

        let top = p00 + (p10 - p00) * fx;
        let bottom = p01 + (p11 - p01) * fx;
        top + (bottom - top) * fy
    }

    #[inline]
    pub fn as_raw(&self) -> &[u8] {
        self.buf.as_raw()
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} Image", self.width(), self.height())
    }
}
