use serde::{Deserialize, Serialize};

/// Tunable parameters of the [`Tracker`](crate::Tracker).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Upper bound on the number of simultaneously tracked landmarks.
    pub max_features: u32,

    /// Minimum pixel distance enforced between landmarks.
    pub min_distance: f32,

    /// Verify optical flow results by tracking backwards and comparing round-trip error.
    pub flow_back: bool,

    /// Apply CLAHE to the input images before tracking.
    pub equalize: bool,

    /// Render a debug overlay of the active tracks each frame.
    pub show_track: bool,

    /// Inlier threshold of the epipolar outlier rejection, in pixels on the virtual pinhole
    /// image.
    pub epipolar_threshold: f32,

    /// Focal length of the virtual pinhole camera that all lens models are reduced to for
    /// epipolar rejection. This makes a single pixel threshold meaningful regardless of the
    /// actual lens.
    pub virtual_focal_length: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_features: 150,
            min_distance: 30.0,
            flow_back: true,
            equalize: false,
            show_track: false,
            epipolar_threshold: 1.0,
            virtual_focal_length: 460.0,
        }
    }
}
