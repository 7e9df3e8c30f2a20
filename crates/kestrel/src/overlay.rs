//! Debug overlay rendering.

use std::collections::HashMap;

use kestrel_image::{draw_arrow, draw_circle, Canvas, Color, Image};
use nalgebra::Point2;

use crate::store::Landmark;

const MARKER_RADIUS: u32 = 2;

/// Age at which a track is rendered fully "old" (blue).
const MATURE_AGE: f32 = 20.0;

/// Renders the active tracks onto an RGB copy of the input frame(s).
///
/// Left-eye landmarks are colored by age from red (new) to blue (old); right-eye matches are
/// drawn in yellow, offset by the left image width. Where a landmark's previous position is
/// known, a green arrow points from the current to the previous position.
pub(crate) fn render(
    left: &Image,
    right: Option<&Image>,
    landmarks: &[Landmark],
    right_points: &[Point2<f32>],
    prev_positions: &HashMap<u64, Point2<f32>>,
) -> Canvas {
    let mut canvas = match right {
        Some(right) => Canvas::hconcat(left, right),
        None => Canvas::from_gray(left),
    };

    for lm in landmarks {
        let len = (lm.age as f32 / MATURE_AGE).min(1.0);
        let color = Color::from_rgb8((255.0 * (1.0 - len)) as u8, 0, (255.0 * len) as u8);
        draw_circle(
            &mut canvas,
            lm.px.x.round() as i32,
            lm.px.y.round() as i32,
            MARKER_RADIUS,
            color,
        );
    }

    let offset = left.width() as f32;
    for point in right_points {
        draw_circle(
            &mut canvas,
            (point.x + offset).round() as i32,
            point.y.round() as i32,
            MARKER_RADIUS,
            Color::YELLOW,
        );
    }

    for lm in landmarks {
        if let Some(prev) = prev_positions.get(&lm.id) {
            draw_arrow(
                &mut canvas,
                (lm.px.x, lm.px.y),
                (prev.x, prev.y),
                Color::GREEN,
            );
        }
    }

    canvas
}

#[cfg(test)]
mod tests {
    use super::*;

    fn landmark(id: u64, x: f32, y: f32, age: u32) -> Landmark {
        Landmark {
            id,
            px: Point2::new(x, y),
            prev_px: Point2::new(x, y),
            ray: Point2::origin(),
            age,
        }
    }

    #[test]
    fn new_tracks_are_red_old_tracks_blue() {
        let left = Image::new(64, 64);
        let landmarks = vec![landmark(0, 10.0, 10.0, 1), landmark(1, 40.0, 40.0, 50)];
        let canvas = render(&left, None, &landmarks, &[], &HashMap::new());

        let young = canvas.get(10, 10);
        assert!(young.0[0] > 200 && young.0[2] < 50, "young: {young:?}");
        let old = canvas.get(40, 40);
        assert!(old.0[2] > 200 && old.0[0] < 50, "old: {old:?}");
    }

    #[test]
    fn stereo_canvas_is_twice_as_wide() {
        let left = Image::new(64, 64);
        let right = Image::new(64, 64);
        let canvas = render(
            &left,
            Some(&right),
            &[],
            &[Point2::new(20.0, 20.0)],
            &HashMap::new(),
        );
        assert_eq!(canvas.width(), 128);
        assert_eq!(canvas.get(84, 20), Color::YELLOW);
    }
}
