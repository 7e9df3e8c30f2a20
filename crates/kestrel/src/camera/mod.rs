//! Camera intrinsic models.
//!
//! The tracker is agnostic to the actual lens: everything it needs is the pair of mappings
//! `pixel -> ray` ([`CameraModel::lift`]) and `camera-frame point -> pixel`
//! ([`CameraModel::project`]). Three concrete models are provided, selected by the `model_type`
//! field of the calibration file:
//!
//! - `PINHOLE`: perspective projection with radial-tangential distortion,
//! - `KANNALA_BRANDT`: the equidistant fisheye model,
//! - `MEI`: the unified omnidirectional model (mirror parameter plus radial-tangential
//!   distortion).

mod fisheye;
mod mei;
mod pinhole;

use std::{fs, path::Path};

use anyhow::Context;
use nalgebra::{Point2, Vector2, Vector3};
use serde::Deserialize;

pub use fisheye::Fisheye;
pub use mei::Mei;
pub use pinhole::Pinhole;

/// A calibrated intrinsic camera model.
pub trait CameraModel: Send + Sync + std::fmt::Debug {
    /// The image size the model was calibrated for, as `(width, height)`.
    fn resolution(&self) -> (u32, u32);

    /// Lifts a distorted pixel coordinate to a ray through that pixel, in the camera frame.
    ///
    /// The returned vector is not normalized; callers interested in the normalized image plane
    /// use [`CameraModel::lift_normalized`].
    fn lift(&self, pixel: Point2<f64>) -> Vector3<f64>;

    /// Projects a 3D point in the camera frame to distorted pixel coordinates.
    fn project(&self, point: &Vector3<f64>) -> Point2<f64>;

    /// Lifts a distorted pixel onto the normalized image plane (`z = 1`).
    fn lift_normalized(&self, pixel: Point2<f64>) -> Point2<f64> {
        let ray = self.lift(pixel);
        Point2::new(ray.x / ray.z, ray.y / ray.z)
    }
}

/// The set of cameras the tracker runs on: one for monocular operation, two for stereo.
pub struct CameraRig {
    cameras: Vec<Box<dyn CameraModel>>,
}

impl CameraRig {
    /// Loads calibration files; one path means monocular operation, two paths enable stereo.
    ///
    /// Unlike everything else in this crate, calibration problems are fatal: an unreadable or
    /// unparseable file returns an error and the tracker must not be started.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> anyhow::Result<Self> {
        anyhow::ensure!(
            (1..=2).contains(&paths.len()),
            "expected 1 (monocular) or 2 (stereo) calibration files, got {}",
            paths.len(),
        );

        let cameras = paths
            .iter()
            .map(|path| {
                let path = path.as_ref();
                let text = fs::read_to_string(path)
                    .with_context(|| format!("failed to read calibration file `{}`", path.display()))?;
                parse_calibration(&text)
                    .with_context(|| format!("failed to parse calibration file `{}`", path.display()))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self { cameras })
    }

    /// Builds a rig from already-constructed camera models.
    pub fn from_models(cameras: Vec<Box<dyn CameraModel>>) -> Self {
        assert!(
            (1..=2).contains(&cameras.len()),
            "a rig consists of 1 or 2 cameras",
        );
        Self { cameras }
    }

    #[inline]
    pub fn is_stereo(&self) -> bool {
        self.cameras.len() == 2
    }

    /// Returns camera `index` (0 = left, 1 = right).
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range for this rig.
    #[inline]
    pub fn camera(&self, index: usize) -> &dyn CameraModel {
        &*self.cameras[index]
    }
}

/// Radial-tangential lens distortion, shared by the pinhole and MEI models.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub(crate) struct RadTan {
    #[serde(default)]
    pub k1: f64,
    #[serde(default)]
    pub k2: f64,
    #[serde(default)]
    pub p1: f64,
    #[serde(default)]
    pub p2: f64,
}

impl RadTan {
    /// The additive distortion displacement at normalized image coordinates `p`.
    pub fn delta(&self, p: Vector2<f64>) -> Vector2<f64> {
        let x2 = p.x * p.x;
        let y2 = p.y * p.y;
        let xy = p.x * p.y;
        let r2 = x2 + y2;
        let radial = self.k1 * r2 + self.k2 * r2 * r2;
        Vector2::new(
            p.x * radial + 2.0 * self.p1 * xy + self.p2 * (r2 + 2.0 * x2),
            p.y * radial + self.p1 * (r2 + 2.0 * y2) + 2.0 * self.p2 * xy,
        )
    }

    /// Inverts the distortion by fixed-point iteration: finds `u` with `u + delta(u) = d`.
    pub fn undistort(&self, d: Vector2<f64>) -> Vector2<f64> {
        let mut u = d;
        for _ in 0..8 {
            u = d - self.delta(u);
        }
        u
    }
}

#[derive(Deserialize)]
struct CalibrationFile {
    model_type: String,
    #[allow(dead_code)]
    #[serde(default)]
    camera_name: String,
    image_width: u32,
    image_height: u32,
    #[serde(default)]
    mirror_parameters: Option<MirrorParameters>,
    #[serde(default)]
    distortion_parameters: Option<RadTan>,
    projection_parameters: serde_yaml::Value,
}

#[derive(Deserialize)]
struct MirrorParameters {
    xi: f64,
}

#[derive(Deserialize)]
struct PinholeProjection {
    fx: f64,
    fy: f64,
    cx: f64,
    cy: f64,
}

#[derive(Deserialize)]
struct FisheyeProjection {
    k2: f64,
    k3: f64,
    k4: f64,
    k5: f64,
    mu: f64,
    mv: f64,
    u0: f64,
    v0: f64,
}

#[derive(Deserialize)]
struct MeiProjection {
    gamma1: f64,
    gamma2: f64,
    u0: f64,
    v0: f64,
}

fn parse_calibration(text: &str) -> anyhow::Result<Box<dyn CameraModel>> {
    let file: CalibrationFile = serde_yaml::from_str(text)?;
    let size = (file.image_width, file.image_height);
    let distortion = file.distortion_parameters.unwrap_or_default();

    match file.model_type.as_str() {
        "PINHOLE" => {
            let proj: PinholeProjection = serde_yaml::from_value(file.projection_parameters)?;
            Ok(Box::new(
                Pinhole::new(size, (proj.fx, proj.fy), (proj.cx, proj.cy))
                    .with_distortion(distortion.k1, distortion.k2, distortion.p1, distortion.p2),
            ))
        }
        "KANNALA_BRANDT" => {
            let proj: FisheyeProjection = serde_yaml::from_value(file.projection_parameters)?;
            Ok(Box::new(Fisheye::new(
                size,
                [proj.k2, proj.k3, proj.k4, proj.k5],
                (proj.mu, proj.mv),
                (proj.u0, proj.v0),
            )))
        }
        "MEI" => {
            let mirror = file
                .mirror_parameters
                .ok_or_else(|| anyhow::anyhow!("MEI calibration is missing `mirror_parameters`"))?;
            let proj: MeiProjection = serde_yaml::from_value(file.projection_parameters)?;
            Ok(Box::new(
                Mei::new(size, mirror.xi, (proj.gamma1, proj.gamma2), (proj.u0, proj.v0))
                    .with_distortion(distortion.k1, distortion.k2, distortion.p1, distortion.p2),
            ))
        }
        other => anyhow::bail!("unknown camera model type `{other}`"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PINHOLE_YAML: &str = "
model_type: PINHOLE
camera_name: cam0
image_width: 752
image_height: 480
distortion_parameters:
   k1: -0.28340811
   k2: 0.07395907
   p1: 0.00019359
   p2: 1.76187114e-05
projection_parameters:
   fx: 458.654
   fy: 457.296
   cx: 367.215
   cy: 248.375
";

    const MEI_YAML: &str = "
model_type: MEI
camera_name: cam0
image_width: 752
image_height: 480
mirror_parameters:
   xi: 1.9926618269451453
distortion_parameters:
   k1: -0.0399258932468764
   k2: 0.15160905181622027
   p1: 0.00017756967825777937
   p2: -0.0011531239076798612
projection_parameters:
   gamma1: 669.8940458885896
   gamma2: 669.1450614220616
   u0: 377.9459252967363
   v0: 279.63655686
";

    #[test]
    fn parses_pinhole_calibration() {
        let camera = parse_calibration(PINHOLE_YAML).unwrap();
        assert_eq!(camera.resolution(), (752, 480));

        let ray = camera.lift(Point2::new(367.215, 248.375));
        // The principal point lifts onto the optical axis.
        assert!(ray.x.abs() < 1e-9 && ray.y.abs() < 1e-9);
    }

    #[test]
    fn rejects_unknown_model() {
        let text = PINHOLE_YAML.replace("PINHOLE", "SCARAMUZZA");
        let err = parse_calibration(&text).unwrap_err();
        assert!(err.to_string().contains("SCARAMUZZA"));
    }

    #[test]
    fn rejects_mei_without_mirror() {
        let text = MEI_YAML.replace("xi:", "unrelated:");
        assert!(parse_calibration(&text).is_err());
    }

    #[test]
    fn rig_wants_one_or_two_cameras() {
        let paths: [&str; 0] = [];
        assert!(CameraRig::load(&paths).is_err());
        assert!(CameraRig::load(&["/nonexistent/cam0.yaml"]).is_err());
    }
}
