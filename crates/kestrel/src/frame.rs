//! The tracker's per-frame output.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single observation of a landmark by one camera.
///
/// `(x, y, z)` is the position on the normalized image plane (`z` is always 1), `(u, v)` the
/// distorted pixel position, `(vx, vy)` the velocity on the normalized plane.
///
/// `depth` is carried for the consuming estimator, which loops depth priors back through this
/// channel; the tracker itself always writes 0 here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// 0 = left camera, 1 = right camera.
    pub camera_id: u8,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub u: f64,
    pub v: f64,
    pub vx: f64,
    pub vy: f64,
    pub depth: f64,
}

/// All landmarks observed in one frame, keyed by their persistent id.
///
/// Each landmark appears with its left-camera observation first, followed by the right-camera
/// observation when the stereo match succeeded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureFrame {
    observations: BTreeMap<u64, Vec<Observation>>,
}

impl FeatureFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an observation of landmark `id`.
    pub(crate) fn push(&mut self, id: u64, observation: Observation) {
        self.observations.entry(id).or_default().push(observation);
    }

    /// Number of distinct landmarks in this frame.
    #[inline]
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Looks up the observations of a landmark.
    pub fn get(&self, id: u64) -> Option<&[Observation]> {
        self.observations.get(&id).map(Vec::as_slice)
    }

    /// Iterates over all landmarks in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &[Observation])> {
        self.observations.iter().map(|(&id, obs)| (id, obs.as_slice()))
    }

    /// Iterates over the landmark ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.observations.keys().copied()
    }
}
