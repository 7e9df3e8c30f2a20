use nalgebra::{Point2, Vector2, Vector3};

use super::{CameraModel, RadTan};

/// The unified omnidirectional (MEI) model: projection onto the unit sphere, a mirror offset
/// `xi` along the optical axis, then radial-tangential distortion and an affine mapping to
/// pixels.
#[derive(Debug, Clone)]
pub struct Mei {
    width: u32,
    height: u32,
    xi: f64,
    gamma1: f64,
    gamma2: f64,
    u0: f64,
    v0: f64,
    distortion: RadTan,
}

impl Mei {
    pub fn new(size: (u32, u32), xi: f64, gamma: (f64, f64), principal: (f64, f64)) -> Self {
        Self {
            width: size.0,
            height: size.1,
            xi,
            gamma1: gamma.0,
            gamma2: gamma.1,
            u0: principal.0,
            v0: principal.1,
            distortion: RadTan::default(),
        }
    }

    pub fn with_distortion(mut self, k1: f64, k2: f64, p1: f64, p2: f64) -> Self {
        self.distortion = RadTan { k1, k2, p1, p2 };
        self
    }
}

impl CameraModel for Mei {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn lift(&self, pixel: Point2<f64>) -> Vector3<f64> {
        let distorted = Vector2::new(
            (pixel.x - self.u0) / self.gamma1,
            (pixel.y - self.v0) / self.gamma2,
        );
        let m = self.distortion.undistort(distorted);

        // Back-projection from the unit sphere.
        let rho2 = m.x * m.x + m.y * m.y;
        let xi = self.xi;
        let z = 1.0 - xi * (rho2 + 1.0) / (xi + (1.0 + (1.0 - xi * xi) * rho2).sqrt());
        Vector3::new(m.x, m.y, z)
    }

    fn project(&self, point: &Vector3<f64>) -> Point2<f64> {
        let on_sphere = point / point.norm();
        let denom = on_sphere.z + self.xi;
        let m = Vector2::new(on_sphere.x / denom, on_sphere.y / denom);
        let d = m + self.distortion.delta(m);
        Point2::new(self.gamma1 * d.x + self.u0, self.gamma2 * d.y + self.v0)
    }
}
