//! The per-frame tracking pipeline.

use std::collections::{HashMap, HashSet};

use itertools::izip;
use kestrel_image::{clahe, Canvas, Image, Pyramid};
use kestrel_utils::{iter::zip_exact, timer::Timer};
use nalgebra::{Point2, Vector2, Vector3};

use crate::{
    camera::CameraRig,
    config::TrackerConfig,
    detect::good_features_to_track,
    flow::{reverse_check, PyramidalLk},
    frame::{FeatureFrame, Observation},
    fundamental::{FundamentalRansac, MIN_MATCHES},
    mask::OccupancyMask,
    overlay,
    store::LandmarkStore,
};

/// Landmarks are culled when they come within this many pixels of the image edge.
const BORDER: i32 = 1;

/// Maximum forward/backward round-trip error for a track to survive, in pixels.
const FLOW_BACK_ERROR: f32 = 0.5;

/// Minimum number of successfully warm-started tracks; below this the frame transparently falls
/// back to cold tracking.
const MIN_WARM_TRACKS: usize = 10;

/// Relative quality floor of newly detected corners.
const DETECT_QUALITY: f32 = 0.01;

const CLAHE_CLIP: f32 = 3.0;
const CLAHE_TILES: u32 = 8;

/// A stereo match produced for a landmark in the current frame.
struct RightMatch {
    id: u64,
    px: Point2<f32>,
    ray: Point2<f64>,
    velocity: Vector2<f64>,
}

/// The visual feature tracker.
///
/// Feed frames in strictly increasing timestamp order via [`Tracker::track`]; each call returns
/// the [`FeatureFrame`] of landmarks observed in that frame. The tracker never fails in steady
/// state: degraded inputs only shrink (possibly empty) the output.
pub struct Tracker {
    config: TrackerConfig,
    rig: CameraRig,
    lk: PyramidalLk,
    ransac: FundamentalRansac,

    store: LandmarkStore,
    prev_pyramid: Option<Pyramid>,
    prev_time: f64,

    /// Normalized-plane positions by id, from the previous frame (left camera).
    prev_un: HashMap<u64, Point2<f64>>,
    /// Normalized-plane positions by id, from the previous frame's stereo matches.
    prev_right_un: HashMap<u64, Point2<f64>>,
    /// Pixel positions by id from the previous frame, for the overlay's motion arrows.
    prev_px: HashMap<u64, Point2<f32>>,

    /// Warm-start pixel positions by id, valid for the next frame when `has_prediction`.
    predictions: HashMap<u64, Point2<f32>>,
    has_prediction: bool,

    overlay: Option<Canvas>,

    t_flow: Timer,
    t_reject: Timer,
    t_mask: Timer,
    t_detect: Timer,
}

impl Tracker {
    pub fn new(rig: CameraRig, config: TrackerConfig) -> Self {
        Self {
            ransac: FundamentalRansac::new(config.epipolar_threshold as f64),
            config,
            rig,
            lk: PyramidalLk::new(),
            store: LandmarkStore::new(),
            prev_pyramid: None,
            prev_time: 0.0,
            prev_un: HashMap::new(),
            prev_right_un: HashMap::new(),
            prev_px: HashMap::new(),
            predictions: HashMap::new(),
            has_prediction: false,
            overlay: None,
            t_flow: Timer::new("flow"),
            t_reject: Timer::new("reject"),
            t_mask: Timer::new("mask"),
            t_detect: Timer::new("detect"),
        }
    }

    #[inline]
    pub fn is_stereo(&self) -> bool {
        self.rig.is_stereo()
    }

    #[inline]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: TrackerConfig) {
        self.ransac = FundamentalRansac::new(config.epipolar_threshold as f64);
        self.config = config;
    }

    /// The debug overlay of the most recent frame, if `show_track` is enabled.
    pub fn track_image(&self) -> Option<&Canvas> {
        self.overlay.as_ref()
    }

    /// Per-stage profiling timers.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_flow, &self.t_reject, &self.t_mask, &self.t_detect].into_iter()
    }

    /// Processes one frame and returns the landmarks observed in it.
    ///
    /// `time` is in seconds and must be strictly greater than the previous frame's time. The
    /// right image is only used when the rig was calibrated for stereo.
    pub fn track(&mut self, time: f64, left: Image, right: Option<Image>) -> FeatureFrame {
        if left.is_empty() {
            log::warn!("dropping degenerate frame at t={time}: empty left image");
            return FeatureFrame::new();
        }
        if let Some(right) = &right {
            if (right.width(), right.height()) != (left.width(), left.height()) {
                log::warn!(
                    "dropping degenerate frame at t={time}: {:?} right eye does not match {:?} left eye",
                    right, left,
                );
                return FeatureFrame::new();
            }
        }

        let mut left = left;
        let mut right = right;
        if self.config.equalize {
            clahe(&mut left, CLAHE_CLIP, CLAHE_TILES, CLAHE_TILES);
            if let Some(right) = &mut right {
                clahe(right, CLAHE_CLIP, CLAHE_TILES, CLAHE_TILES);
            }
        }

        // The previous frame's image lives on inside `prev_pyramid`; the current one is owned by
        // `cur` from here on and becomes `prev_pyramid` at the end of the frame.
        let cur = Pyramid::new(left, PyramidalLk::COLD_LEVELS as u32);
        let (width, height) = (cur.base().width(), cur.base().height());
        let dt = time - self.prev_time;
        let had_previous = self.prev_pyramid.is_some();

        // 1. Propagate existing landmarks with optical flow.
        if let Some(prev) = &self.prev_pyramid {
            if !self.store.is_empty() {
                let prev_pts: Vec<Point2<f32>> =
                    self.store.landmarks().iter().map(|lm| lm.px).collect();

                let (tracked, mut status) =
                    self.t_flow.time(|| self.propagate(prev, &cur, &prev_pts));

                if self.config.flow_back {
                    self.t_flow.time(|| {
                        reverse_check(
                            &self.lk,
                            prev,
                            &cur,
                            &prev_pts,
                            &tracked,
                            &mut status,
                            FLOW_BACK_ERROR,
                        )
                    });
                }

                for (ok, new) in zip_exact(status.iter_mut(), &tracked) {
                    *ok = *ok && in_border(*new, width, height);
                }

                for (lm, new) in zip_exact(self.store.iter_mut(), &tracked) {
                    lm.prev_px = lm.px;
                    lm.px = *new;
                }
                let survivors = status.iter().filter(|&&ok| ok).count();
                log::trace!("{survivors}/{} tracks survived optical flow", status.len());
                self.store.retain_mask(&status);
            }
        }

        // 2. Epipolar outlier rejection over the surviving correspondences.
        if had_previous && self.store.len() >= MIN_MATCHES {
            let keep = self.t_reject.time(|| {
                let cam = self.rig.camera(0);
                let focal = self.config.virtual_focal_length as f64;
                let center = (width as f64 / 2.0, height as f64 / 2.0);
                let to_virtual = |px: Point2<f32>| {
                    let ray = cam.lift(Point2::new(px.x as f64, px.y as f64));
                    Point2::new(
                        focal * ray.x / ray.z + center.0,
                        focal * ray.y / ray.z + center.1,
                    )
                };
                let prev_virtual: Vec<Point2<f64>> = self
                    .store
                    .landmarks()
                    .iter()
                    .map(|lm| to_virtual(lm.prev_px))
                    .collect();
                let cur_virtual: Vec<Point2<f64>> = self
                    .store
                    .landmarks()
                    .iter()
                    .map(|lm| to_virtual(lm.px))
                    .collect();
                self.ransac.inliers(&prev_virtual, &cur_virtual)
            });
            if let Some(keep) = keep {
                let inliers = keep.iter().filter(|&&ok| ok).count();
                log::trace!("epipolar rejection kept {inliers}/{}", keep.len());
                self.store.retain_mask(&keep);
            }
        }

        // 3. Occupancy mask: cull crowded tracks age-first, then reserve space around the
        // keepers. The store comes out reordered by descending age, mirroring the cull order.
        let mask = self.t_mask.time(|| {
            let mut mask = OccupancyMask::new(width, height);
            let mut landmarks = self.store.take_landmarks();
            // Stable sort: older tracks win, insertion order breaks ties.
            landmarks.sort_by(|a, b| b.age.cmp(&a.age));
            let mut kept = Vec::with_capacity(landmarks.len());
            for lm in landmarks {
                if mask.is_free(lm.px) {
                    mask.occupy_disk(lm.px, self.config.min_distance);
                    kept.push(lm);
                }
            }
            self.store.set_landmarks(kept);
            mask
        });

        // Survivors get older only after the mask cull, so a landmark born below keeps age 1 in
        // this frame's output.
        self.store.ages_increment();

        // 4. Replenish with fresh corners where the mask has room.
        let need = (self.config.max_features as usize).saturating_sub(self.store.len());
        if need > 0 {
            let corners = self.t_detect.time(|| {
                if (mask.width(), mask.height()) != (width, height) {
                    log::warn!("occupancy mask does not match the frame, skipping detection");
                    return Vec::new();
                }
                good_features_to_track(
                    cur.base(),
                    need,
                    DETECT_QUALITY,
                    self.config.min_distance,
                    &mask,
                )
            });
            for corner in corners {
                self.store.append(corner);
            }
        }

        // 5. Lift to the normalized plane and differentiate against the previous frame.
        let cam0 = self.rig.camera(0);
        for lm in self.store.iter_mut() {
            lm.ray = cam0.lift_normalized(Point2::new(lm.px.x as f64, lm.px.y as f64));
        }
        let (velocities, cur_un) = pts_velocity(
            dt,
            self.store.landmarks().iter().map(|lm| (lm.id, lm.ray)),
            &self.prev_un,
        );

        // 6. Stereo augmentation: match the current left landmarks into the right eye.
        let mut right_matches: Vec<RightMatch> = Vec::new();
        let mut right_pyramid = None;
        if self.rig.is_stereo() {
            if let Some(right_img) = right {
                let right_pyr = Pyramid::new(right_img, PyramidalLk::COLD_LEVELS as u32);
                if self.store.is_empty() {
                    self.prev_right_un.clear();
                } else {
                    right_matches = self.match_right(&cur, &right_pyr, width, height, dt);
                }
                right_pyramid = Some(right_pyr);
            }
        }

        if self.config.show_track {
            let right_pts: Vec<Point2<f32>> = right_matches.iter().map(|m| m.px).collect();
            self.overlay = Some(overlay::render(
                cur.base(),
                right_pyramid.as_ref().map(|p| p.base()),
                self.store.landmarks(),
                &right_pts,
                &self.prev_px,
            ));
        }

        // 7. Roll the frame state over.
        self.prev_pyramid = Some(cur);
        self.prev_time = time;
        self.prev_un = cur_un;
        self.prev_px = self
            .store
            .landmarks()
            .iter()
            .map(|lm| (lm.id, lm.px))
            .collect();
        self.has_prediction = false;
        self.predictions.clear();

        // 8. Emit.
        let mut frame = FeatureFrame::new();
        for (lm, velocity) in zip_exact(self.store.landmarks(), &velocities) {
            frame.push(
                lm.id,
                Observation {
                    camera_id: 0,
                    x: lm.ray.x,
                    y: lm.ray.y,
                    z: 1.0,
                    u: lm.px.x as f64,
                    v: lm.px.y as f64,
                    vx: velocity.x,
                    vy: velocity.y,
                    depth: 0.0,
                },
            );
        }
        for m in &right_matches {
            frame.push(
                m.id,
                Observation {
                    camera_id: 1,
                    x: m.ray.x,
                    y: m.ray.y,
                    z: 1.0,
                    u: m.px.x as f64,
                    v: m.px.y as f64,
                    vx: m.velocity.x,
                    vy: m.velocity.y,
                    depth: 0.0,
                },
            );
        }
        frame
    }

    /// Tracks the store's landmarks from `prev` into `cur`, warm-starting from the prediction
    /// when one is pending.
    fn propagate(
        &self,
        prev: &Pyramid,
        cur: &Pyramid,
        prev_pts: &[Point2<f32>],
    ) -> (Vec<Point2<f32>>, Vec<bool>) {
        if self.has_prediction {
            let seeds: Vec<Point2<f32>> = self
                .store
                .landmarks()
                .iter()
                .map(|lm| self.predictions.get(&lm.id).copied().unwrap_or(lm.px))
                .collect();
            let (tracked, status) =
                self.lk
                    .track(prev, cur, prev_pts, Some(&seeds), PyramidalLk::WARM_LEVELS);
            let successes = status.iter().filter(|&&ok| ok).count();
            if successes >= MIN_WARM_TRACKS {
                return (tracked, status);
            }
            log::debug!("warm start only tracked {successes} landmarks, retrying cold");
        }

        self.lk
            .track(prev, cur, prev_pts, None, PyramidalLk::COLD_LEVELS)
    }

    /// Bidirectional left-right matching for the stereo eye. Updates `prev_right_un`.
    fn match_right(
        &mut self,
        cur: &Pyramid,
        right: &Pyramid,
        width: u32,
        height: u32,
        dt: f64,
    ) -> Vec<RightMatch> {
        let left_pts: Vec<Point2<f32>> = self.store.landmarks().iter().map(|lm| lm.px).collect();

        let (right_pts, mut status) = self.t_flow.time(|| {
            self.lk
                .track(cur, right, &left_pts, None, PyramidalLk::COLD_LEVELS)
        });
        if self.config.flow_back {
            let (back, back_status) = self.t_flow.time(|| {
                self.lk
                    .track(right, cur, &right_pts, None, PyramidalLk::COLD_LEVELS)
            });
            for (ok, back_ok, back_px, left_px) in
                izip!(status.iter_mut(), &back_status, &back, &left_pts)
            {
                *ok = *ok && *back_ok && (back_px - left_px).norm() <= FLOW_BACK_ERROR;
            }
        }
        for (ok, px) in zip_exact(status.iter_mut(), &right_pts) {
            *ok = *ok && in_border(*px, width, height);
        }

        let cam1 = self.rig.camera(1);
        let matched: Vec<(u64, Point2<f32>, Point2<f64>)> = self
            .store
            .landmarks()
            .iter()
            .enumerate()
            .filter(|&(i, _)| status[i])
            .map(|(i, lm)| {
                let px = right_pts[i];
                let ray = cam1.lift_normalized(Point2::new(px.x as f64, px.y as f64));
                (lm.id, px, ray)
            })
            .collect();

        let (velocities, cur_right_un) = pts_velocity(
            dt,
            matched.iter().map(|&(id, _, ray)| (id, ray)),
            &self.prev_right_un,
        );
        self.prev_right_un = cur_right_un;

        zip_exact(matched, velocities)
            .map(|((id, px, ray), velocity)| RightMatch {
                id,
                px,
                ray,
                velocity,
            })
            .collect()
    }

    /// Supplies predicted 3D positions (camera-0 frame) for the next frame's warm start.
    ///
    /// Landmarks without a prediction fall back to their last observed pixel. The prediction is
    /// consumed by the next [`Tracker::track`] call.
    pub fn set_prediction(&mut self, predicted: &HashMap<u64, Vector3<f64>>) {
        self.predictions.clear();
        let cam = self.rig.camera(0);
        for lm in self.store.landmarks() {
            if let Some(point) = predicted.get(&lm.id) {
                let px = cam.project(point);
                self.predictions
                    .insert(lm.id, Point2::new(px.x as f32, px.y as f32));
            }
        }
        self.has_prediction = true;
    }

    /// Drops the landmarks whose ids the estimator flagged as outliers.
    pub fn remove_outliers(&mut self, ids: &HashSet<u64>) {
        if ids.is_empty() {
            return;
        }
        let keep: Vec<bool> = self
            .store
            .landmarks()
            .iter()
            .map(|lm| !ids.contains(&lm.id))
            .collect();
        self.store.retain_mask(&keep);
    }

    /// Flushes all per-frame state. Landmark ids keep counting from where they were, so ids stay
    /// unique across restarts.
    pub fn restart(&mut self) {
        self.store.clear();
        self.prev_pyramid = None;
        self.prev_un.clear();
        self.prev_right_un.clear();
        self.prev_px.clear();
        self.predictions.clear();
        self.has_prediction = false;
        self.overlay = None;
        log::info!("tracker state flushed");
    }
}

fn in_border(px: Point2<f32>, width: u32, height: u32) -> bool {
    let x = px.x.round() as i32;
    let y = px.y.round() as i32;
    x >= BORDER && x < width as i32 - BORDER && y >= BORDER && y < height as i32 - BORDER
}

/// Per-landmark velocity on the normalized plane, differentiated against the previous frame's
/// positions. Newborn landmarks (and every landmark of the first frame) get zero velocity.
///
/// Also returns the id-keyed position map to roll over for the next frame.
fn pts_velocity(
    dt: f64,
    points: impl Iterator<Item = (u64, Point2<f64>)>,
    prev: &HashMap<u64, Point2<f64>>,
) -> (Vec<Vector2<f64>>, HashMap<u64, Point2<f64>>) {
    let mut cur = HashMap::new();
    let mut velocities = Vec::new();
    for (id, ray) in points {
        cur.insert(id, ray);
        let velocity = if prev.is_empty() || dt <= 0.0 {
            Vector2::zeros()
        } else {
            match prev.get(&id) {
                Some(p) => (ray - p) / dt,
                None => Vector2::zeros(),
            }
        };
        velocities.push(velocity);
    }
    (velocities, cur)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use once_cell::sync::Lazy;

    use crate::camera::{CameraRig, Pinhole};

    use super::*;

    const FOCAL: f64 = 460.0;

    /// The unshifted base frame, shared across tests (building it repeatedly adds up).
    static BASE: Lazy<Image> = Lazy::new(|| textured(320, 240, 0.0));

    fn rig(stereo: bool) -> CameraRig {
        let cam = || {
            Box::new(Pinhole::new(
                (320, 240),
                (FOCAL, FOCAL),
                (160.0, 120.0),
            )) as Box<dyn crate::camera::CameraModel>
        };
        if stereo {
            CameraRig::from_models(vec![cam(), cam()])
        } else {
            CameraRig::from_models(vec![cam()])
        }
    }

    fn config() -> TrackerConfig {
        TrackerConfig {
            max_features: 50,
            min_distance: 25.0,
            ..TrackerConfig::default()
        }
    }

    /// Texture with a broad low-frequency structure (so coarse pyramid levels can absorb large
    /// motion) plus finer detail for sub-pixel accuracy.
    fn textured(width: u32, height: u32, shift: f32) -> Image {
        Image::from_fn(width, height, |x, y| {
            let x = x as f32 - shift;
            let y = y as f32;
            let v = 128.0
                + 70.0 * (x * 0.05).sin() * (y * 0.045).cos()
                + 35.0 * (x * 0.21).sin() * (y * 0.19).cos();
            v.clamp(0.0, 255.0) as u8
        })
    }

    fn checkerboard(width: u32, height: u32, cell: u32) -> Image {
        Image::from_fn(width, height, |x, y| {
            if ((x / cell) + (y / cell)) % 2 == 0 {
                235
            } else {
                20
            }
        })
    }

    #[test]
    fn cold_start_fills_with_fresh_landmarks() {
        let mut tracker = Tracker::new(
            CameraRig::from_models(vec![Box::new(Pinhole::new(
                (640, 480),
                (FOCAL, FOCAL),
                (320.0, 240.0),
            ))]),
            TrackerConfig::default(),
        );
        let frame = tracker.track(0.0, checkerboard(640, 480, 40), None);

        assert!(!frame.is_empty());
        assert!(frame.len() <= 150);
        let max_id = frame.ids().max().unwrap();
        assert!(max_id < frame.len() as u64);
        for (_, obs) in frame.iter() {
            let obs = &obs[0];
            assert_eq!(obs.camera_id, 0);
            assert_eq!((obs.vx, obs.vy), (0.0, 0.0));
            assert!(obs.u >= 1.0 && obs.u < 639.0);
            assert!(obs.v >= 1.0 && obs.v < 479.0);
        }
    }

    #[test]
    fn static_scene_ages_without_motion() {
        let mut tracker = Tracker::new(rig(false), config());
        let first = tracker.track(0.0, BASE.clone(), None);
        let second = tracker.track(0.1, BASE.clone(), None);

        let first_ids: Vec<u64> = first.ids().collect();
        let survivors = first_ids
            .iter()
            .filter(|id| second.get(**id).is_some())
            .count();
        assert!(survivors * 10 >= first_ids.len() * 9, "{survivors}/{}", first_ids.len());

        for (_, obs) in second.iter() {
            assert_relative_eq!(obs[0].vx, 0.0, epsilon = 1e-6);
            assert_relative_eq!(obs[0].vy, 0.0, epsilon = 1e-6);
        }

        // Surviving landmarks aged by exactly one frame; replacements start over at 1.
        for lm in tracker.store.landmarks() {
            if first_ids.contains(&lm.id) {
                assert_eq!(lm.age, 2);
            } else {
                assert_eq!(lm.age, 1);
            }
        }
    }

    #[test]
    fn rigid_translation_preserves_ids_and_measures_velocity() {
        let mut tracker = Tracker::new(rig(false), config());
        let first = tracker.track(0.0, BASE.clone(), None);
        let second = tracker.track(0.1, textured(320, 240, 5.0), None);

        let first_ids: Vec<u64> = first.ids().collect();
        let mut survivors = 0;
        for id in &first_ids {
            let (Some(before), Some(after)) = (first.get(*id), second.get(*id)) else {
                continue;
            };
            survivors += 1;
            let dx = after[0].u - before[0].u;
            assert!((dx - 5.0).abs() < 0.5, "pixel shift {dx}");

            // Velocity on the normalized plane: 5 px rightward over 0.1 s.
            assert_relative_eq!(after[0].vx, 5.0 / FOCAL / 0.1, epsilon = 0.01);
            assert_relative_eq!(after[0].vy, 0.0, epsilon = 0.01);
        }
        assert!(survivors * 10 >= first_ids.len() * 9, "{survivors}/{}", first_ids.len());
    }

    #[test]
    fn velocity_matches_position_difference() {
        let mut tracker = Tracker::new(rig(false), config());
        let first = tracker.track(0.0, BASE.clone(), None);
        let second = tracker.track(0.25, textured(320, 240, 3.0), None);

        for id in first.ids() {
            let (Some(before), Some(after)) = (first.get(id), second.get(id)) else {
                continue;
            };
            let vx = (after[0].x - before[0].x) / 0.25;
            let vy = (after[0].y - before[0].y) / 0.25;
            assert_relative_eq!(after[0].vx, vx, epsilon = 1e-9);
            assert_relative_eq!(after[0].vy, vy, epsilon = 1e-9);
        }
    }

    #[test]
    fn emitted_landmarks_keep_their_distance() {
        let mut tracker = Tracker::new(rig(false), config());
        tracker.track(0.0, BASE.clone(), None);
        let frame = tracker.track(0.1, textured(320, 240, 2.0), None);

        let positions: Vec<(f64, f64)> = frame.iter().map(|(_, obs)| (obs[0].u, obs[0].v)).collect();
        for (i, a) in positions.iter().enumerate() {
            for b in &positions[i + 1..] {
                let dist = ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt();
                assert!(dist >= 25.0 - 2.0, "{a:?} and {b:?} are {dist} px apart");
            }
        }
    }

    #[test]
    fn occlusion_drops_covered_tracks_and_replenishes() {
        let mut tracker = Tracker::new(rig(false), config());
        let first = tracker.track(0.0, BASE.clone(), None);

        let mut occluded = BASE.clone();
        for y in 70..170 {
            for x in 110..210 {
                occluded.set(x, y, 0);
            }
        }
        let second = tracker.track(0.1, occluded, None);

        for (id, obs) in first.iter() {
            let (u, v) = (obs[0].u, obs[0].v);
            let inside = (120.0..200.0).contains(&u) && (80.0..160.0).contains(&v);
            if inside {
                assert!(second.get(id).is_none(), "occluded landmark {id} survived");
            }
        }
        // Replenishment keeps the population up.
        assert!(second.len() >= first.len() / 2);
    }

    #[test]
    fn stereo_matches_report_disparity() {
        let mut tracker = Tracker::new(rig(true), config());
        let disparity = 50.0_f64;
        let left = BASE.clone();
        let right = textured(320, 240, -disparity as f32);
        let frame = tracker.track(0.0, left, Some(right));

        let mut matched = 0;
        for (_, obs) in frame.iter() {
            assert_eq!(obs[0].camera_id, 0);
            if let Some(right_obs) = obs.iter().find(|o| o.camera_id == 1) {
                matched += 1;
                let measured = obs[0].u - right_obs.u;
                assert!(
                    (measured - disparity).abs() < 1.0,
                    "disparity {measured} instead of {disparity}",
                );
            }
        }
        assert!(matched >= frame.len() / 4, "only {matched} stereo matches");
    }

    #[test]
    fn every_left_landmark_is_emitted_without_stereo_match() {
        let mut tracker = Tracker::new(rig(true), config());
        // A right eye with no correspondence at all: left landmarks must still be emitted.
        let frame = tracker.track(0.0, BASE.clone(), Some(Image::new(320, 240)));
        assert!(!frame.is_empty());
        for (_, obs) in frame.iter() {
            assert_eq!(obs[0].camera_id, 0);
        }
    }

    #[test]
    fn prediction_warm_start_tracks_large_motion() {
        let mut tracker = Tracker::new(rig(false), config());
        let first = tracker.track(0.0, BASE.clone(), None);

        // Predict the actual 60 px shift by supplying 3D points that project to the shifted
        // positions.
        let shift = 60.0;
        let mut predicted = HashMap::new();
        for (id, obs) in first.iter() {
            let target_u = obs[0].u + shift;
            predicted.insert(
                id,
                Vector3::new((target_u - 160.0) / FOCAL, (obs[0].v - 120.0) / FOCAL, 1.0),
            );
        }
        tracker.set_prediction(&predicted);
        let second = tracker.track(0.1, textured(320, 240, shift as f32), None);

        let mut survivors = 0;
        for id in first.ids() {
            let (Some(before), Some(after)) = (first.get(id), second.get(id)) else {
                continue;
            };
            // Only count landmarks that stayed within the image after the shift.
            if before[0].u + shift >= 319.0 {
                continue;
            }
            survivors += 1;
            let dx = after[0].u - before[0].u;
            assert!((dx - shift).abs() < 0.5, "pixel shift {dx}");
        }
        assert!(survivors >= 10, "only {survivors} warm-started tracks");
    }

    #[test]
    fn outlier_ids_never_come_back() {
        let mut tracker = Tracker::new(rig(false), config());
        let mut last = FeatureFrame::new();
        for i in 0..3 {
            last = tracker.track(i as f64 * 0.1, textured(320, 240, i as f32), None);
        }
        let victim = last.ids().next().unwrap();
        tracker.remove_outliers(&HashSet::from([victim]));

        for i in 3..6 {
            let frame = tracker.track(i as f64 * 0.1, textured(320, 240, i as f32), None);
            assert!(frame.get(victim).is_none(), "outlier {victim} re-emitted");
        }
    }

    #[test]
    fn restart_flushes_state_but_not_ids() {
        let mut tracker = Tracker::new(rig(false), config());
        let first = tracker.track(0.0, BASE.clone(), None);
        let max_id = first.ids().max().unwrap();

        tracker.restart();
        let fresh = tracker.track(10.0, BASE.clone(), None);
        assert!(!fresh.is_empty());
        for (id, obs) in fresh.iter() {
            assert!(id > max_id, "id {id} was re-minted after restart");
            assert_eq!((obs[0].vx, obs[0].vy), (0.0, 0.0));
        }
    }

    #[test]
    fn degenerate_frames_are_skipped() {
        let mut tracker = Tracker::new(rig(true), config());
        assert!(tracker.track(0.0, Image::new(0, 0), None).is_empty());
        assert!(tracker
            .track(0.1, BASE.clone(), Some(Image::new(100, 100)))
            .is_empty());

        // The tracker still works afterwards.
        let frame = tracker.track(0.2, BASE.clone(), None);
        assert!(!frame.is_empty());
    }

    #[test]
    fn overlay_is_rendered_on_demand() {
        let mut tracker = Tracker::new(
            rig(false),
            TrackerConfig {
                show_track: true,
                ..config()
            },
        );
        assert!(tracker.track_image().is_none());
        tracker.track(0.0, BASE.clone(), None);
        let overlay = tracker.track_image().unwrap();
        assert_eq!((overlay.width(), overlay.height()), (320, 240));
    }
}
