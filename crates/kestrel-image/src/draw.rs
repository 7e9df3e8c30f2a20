//! Debug-overlay drawing on an RGB canvas.
//!
//! The tracker itself only ever touches grayscale data; the overlay it optionally produces is
//! rendered here through [`embedded-graphics`] primitives.

use std::{convert::Infallible, fmt, path::Path};

use embedded_graphics::{
    pixelcolor::{raw::RawU24, PixelColor},
    prelude::*,
    primitives::{Circle, Line, PrimitiveStyle},
};
use image::{Rgb, RgbImage};

use crate::Image;

/// An 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub [u8; 3]);

impl Color {
    pub const RED: Self = Self([255, 0, 0]);
    pub const GREEN: Self = Self([0, 255, 0]);
    pub const BLUE: Self = Self([0, 0, 255]);
    pub const YELLOW: Self = Self([255, 255, 0]);

    #[inline]
    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b])
    }
}

impl PixelColor for Color {
    type Raw = RawU24;
}

/// An RGB image used as a drawing surface for track overlays.
pub struct Canvas {
    buf: RgbImage,
}

impl Canvas {
    /// Creates a canvas from a grayscale image by replicating the luma channel.
    pub fn from_gray(image: &Image) -> Self {
        let buf = RgbImage::from_fn(image.width(), image.height(), |x, y| {
            let v = image.get(x, y);
            Rgb([v, v, v])
        });
        Self { buf }
    }

    /// Creates a canvas holding `left` and `right` side by side.
    ///
    /// Both images must have the same height.
    pub fn hconcat(left: &Image, right: &Image) -> Self {
        assert_eq!(left.height(), right.height(), "hconcat height mismatch");
        let buf = RgbImage::from_fn(left.width() + right.width(), left.height(), |x, y| {
            let v = if x < left.width() {
                left.get(x, y)
            } else {
                right.get(x - left.width(), y)
            };
            Rgb([v, v, v])
        });
        Self { buf }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    /// Gets the color at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is outside the canvas.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Color {
        Color(self.buf[(x, y)].0)
    }

    /// Saves the canvas to the file system.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), crate::Error> {
        Ok(self.buf.save(path)?)
    }

    #[inline]
    pub fn as_raw(&self) -> &[u8] {
        self.buf.as_raw()
    }
}

impl fmt::Debug for Canvas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} Canvas", self.width(), self.height())
    }
}

impl OriginDimensions for Canvas {
    fn size(&self) -> Size {
        Size::new(self.width(), self.height())
    }
}

impl DrawTarget for Canvas {
    type Color = Color;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x >= 0
                && point.y >= 0
                && (point.x as u32) < self.width()
                && (point.y as u32) < self.height()
            {
                self.buf.put_pixel(point.x as u32, point.y as u32, Rgb(color.0));
            }
        }
        Ok(())
    }
}

/// Draws a filled circle of the given radius centered on `(x, y)`.
///
/// Pixels outside the canvas are clipped.
pub fn draw_circle(canvas: &mut Canvas, x: i32, y: i32, radius: u32, color: Color) {
    Circle::with_center(Point::new(x, y), radius * 2 + 1)
        .into_styled(PrimitiveStyle::with_fill(color))
        .draw(canvas)
        .unwrap(); // drawing on `Canvas` is infallible
}

/// Draws a 1-pixel line between two points.
pub fn draw_line(canvas: &mut Canvas, from: (i32, i32), to: (i32, i32), color: Color) {
    Line::new(Point::new(from.0, from.1), Point::new(to.0, to.1))
        .into_styled(PrimitiveStyle::with_stroke(color, 1))
        .draw(canvas)
        .unwrap(); // drawing on `Canvas` is infallible
}

/// Draws an arrowed line from `from` to `to`, with the tip at `to`.
pub fn draw_arrow(canvas: &mut Canvas, from: (f32, f32), to: (f32, f32), color: Color) {
    let start = (from.0.round() as i32, from.1.round() as i32);
    let end = (to.0.round() as i32, to.1.round() as i32);
    draw_line(canvas, start, end, color);

    let dx = to.0 - from.0;
    let dy = to.1 - from.1;
    let len = (dx * dx + dy * dy).sqrt();
    if len < 1.0 {
        return;
    }

    let tip_len = (len * 0.2).max(2.0);
    let angle = dy.atan2(dx);
    for offset in [std::f32::consts::FRAC_PI_6, -std::f32::consts::FRAC_PI_6] {
        let a = angle + std::f32::consts::PI + offset;
        let wing = (
            (to.0 + tip_len * a.cos()).round() as i32,
            (to.1 + tip_len * a.sin()).round() as i32,
        );
        draw_line(canvas, end, wing, color);
    }
}
