use nalgebra::{Point2, Vector3};

use super::CameraModel;

/// The Kannala-Brandt equidistant fisheye model.
///
/// Projection maps the incidence angle θ through the odd polynomial
/// `θ_d = θ + k2·θ³ + k3·θ⁵ + k4·θ⁷ + k5·θ⁹`; lifting inverts the polynomial with Newton
/// iterations.
#[derive(Debug, Clone)]
pub struct Fisheye {
    width: u32,
    height: u32,
    k: [f64; 4],
    mu: f64,
    mv: f64,
    u0: f64,
    v0: f64,
}

impl Fisheye {
    pub fn new(size: (u32, u32), k: [f64; 4], focal: (f64, f64), principal: (f64, f64)) -> Self {
        Self {
            width: size.0,
            height: size.1,
            k,
            mu: focal.0,
            mv: focal.1,
            u0: principal.0,
            v0: principal.1,
        }
    }

    fn theta_distorted(&self, theta: f64) -> f64 {
        let t2 = theta * theta;
        theta * (1.0 + t2 * (self.k[0] + t2 * (self.k[1] + t2 * (self.k[2] + t2 * self.k[3]))))
    }

    /// d(θ_d)/dθ, used by the Newton solver in `lift`.
    fn theta_distorted_derivative(&self, theta: f64) -> f64 {
        let t2 = theta * theta;
        1.0 + t2
            * (3.0 * self.k[0]
                + t2 * (5.0 * self.k[1] + t2 * (7.0 * self.k[2] + t2 * 9.0 * self.k[3])))
    }
}

impl CameraModel for Fisheye {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn lift(&self, pixel: Point2<f64>) -> Vector3<f64> {
        let mx = (pixel.x - self.u0) / self.mu;
        let my = (pixel.y - self.v0) / self.mv;
        let theta_d = (mx * mx + my * my).sqrt();

        if theta_d < 1e-10 {
            return Vector3::new(0.0, 0.0, 1.0);
        }

        let phi = my.atan2(mx);
        let mut theta = theta_d;
        for _ in 0..10 {
            let f = self.theta_distorted(theta) - theta_d;
            theta -= f / self.theta_distorted_derivative(theta);
        }

        Vector3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos())
    }

    fn project(&self, point: &Vector3<f64>) -> Point2<f64> {
        let r = (point.x * point.x + point.y * point.y).sqrt();
        if r < 1e-10 {
            return Point2::new(self.u0, self.v0);
        }

        let theta = r.atan2(point.z);
        let theta_d = self.theta_distorted(theta);
        Point2::new(
            self.mu * theta_d * point.x / r + self.u0,
            self.mv * theta_d * point.y / r + self.v0,
        )
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn camera() -> Fisheye {
        // EuRoC-like equidistant calibration.
        Fisheye::new(
            (752, 480),
            [-0.0027, 0.0231, -0.0341, 0.0155],
            (460.0, 459.0),
            (366.8, 248.2),
        )
    }

    #[test]
    fn project_lift_round_trip() {
        let cam = camera();
        for (u, v) in [(366.8, 248.2), (120.0, 80.0), (700.0, 430.0), (366.8, 20.0)] {
            let pixel = Point2::new(u, v);
            let back = cam.project(&cam.lift(pixel));
            assert_relative_eq!(back.x, pixel.x, epsilon = 1e-6);
            assert_relative_eq!(back.y, pixel.y, epsilon = 1e-6);
        }
    }

    #[test]
    fn lifted_rays_are_unit_length(){
        let cam = camera();
        let ray = cam.lift(Point2::new(100.0, 333.0));
        assert_relative_eq!(ray.norm(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn principal_point_lifts_to_axis() {
        let cam = camera();
        let ray = cam.lift(Point2::new(366.8, 248.2));
        assert_relative_eq!(ray.z, 1.0, epsilon = 1e-9);
    }
}
