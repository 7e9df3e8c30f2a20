use nalgebra::{Point2, Vector2, Vector3};

use super::{CameraModel, RadTan};

/// Perspective projection with radial-tangential distortion.
#[derive(Debug, Clone)]
pub struct Pinhole {
    width: u32,
    height: u32,
    fx: f64,
    fy: f64,
    cx: f64,
    cy: f64,
    distortion: RadTan,
}

impl Pinhole {
    /// Creates a distortion-free pinhole camera.
    pub fn new(size: (u32, u32), focal: (f64, f64), principal: (f64, f64)) -> Self {
        Self {
            width: size.0,
            height: size.1,
            fx: focal.0,
            fy: focal.1,
            cx: principal.0,
            cy: principal.1,
            distortion: RadTan::default(),
        }
    }

    /// Adds radial-tangential distortion coefficients.
    pub fn with_distortion(mut self, k1: f64, k2: f64, p1: f64, p2: f64) -> Self {
        self.distortion = RadTan { k1, k2, p1, p2 };
        self
    }
}

impl CameraModel for Pinhole {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn lift(&self, pixel: Point2<f64>) -> Vector3<f64> {
        let distorted = Vector2::new(
            (pixel.x - self.cx) / self.fx,
            (pixel.y - self.cy) / self.fy,
        );
        let p = self.distortion.undistort(distorted);
        Vector3::new(p.x, p.y, 1.0)
    }

    fn project(&self, point: &Vector3<f64>) -> Point2<f64> {
        let p = Vector2::new(point.x / point.z, point.y / point.z);
        let d = p + self.distortion.delta(p);
        Point2::new(self.fx * d.x + self.cx, self.fy * d.y + self.cy)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn camera() -> Pinhole {
        Pinhole::new((752, 480), (458.654, 457.296), (367.215, 248.375)).with_distortion(
            -0.28340811,
            0.07395907,
            0.00019359,
            1.76187114e-05,
        )
    }

    #[test]
    fn project_lift_round_trip() {
        let cam = camera();
        for (u, v) in [(100.0, 100.0), (367.2, 248.4), (650.0, 400.0), (80.0, 400.0)] {
            let pixel = Point2::new(u, v);
            let ray = cam.lift(pixel);
            let back = cam.project(&ray);
            // The fixed-point distortion inverse is approximate, so allow a small fraction of a
            // pixel.
            assert_relative_eq!(back.x, pixel.x, epsilon = 0.05);
            assert_relative_eq!(back.y, pixel.y, epsilon = 0.05);
        }
    }

    #[test]
    fn projection_scales_with_depth() {
        let cam = camera();
        let near = cam.project(&Vector3::new(0.1, -0.2, 1.0));
        let far = cam.project(&Vector3::new(0.2, -0.4, 2.0));
        assert_relative_eq!(near.x, far.x, epsilon = 1e-9);
        assert_relative_eq!(near.y, far.y, epsilon = 1e-9);
    }

    #[test]
    fn undistorted_center_is_linear() {
        let cam = Pinhole::new((640, 480), (460.0, 460.0), (320.0, 240.0));
        let ray = cam.lift(Point2::new(320.0 + 46.0, 240.0));
        assert_relative_eq!(ray.x / ray.z, 0.1, epsilon = 1e-12);
        assert_relative_eq!(ray.y / ray.z, 0.0, epsilon = 1e-12);
    }
}
