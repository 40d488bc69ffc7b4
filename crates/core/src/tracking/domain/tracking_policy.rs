use serde::{Deserialize, Serialize};

use crate::shared::detection::Detection;

/// Knobs for one tracking run. Registration and attendance use different
/// presets; a config file may override either as a whole.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackingPolicy {
    /// Only frames whose index is a multiple of this are looked at.
    pub frame_stride: usize,
    /// Tracks with fewer matched frames than this are discarded as noise.
    pub min_track_frames: usize,
    /// Sampled frames a track may go unmatched before it is closed.
    pub max_stale_frames: usize,
    pub min_aspect_ratio: f64,
    pub max_aspect_ratio: f64,
    /// Association radius as a multiple of the candidate box width.
    pub association_radius_factor: f64,
    /// When set, crops below `min_sharpness` are rejected outright.
    pub strict_quality: bool,
    pub min_sharpness: f64,
}

impl TrackingPolicy {
    /// Fewer, cleaner tracks: strict sharpness gate, at least 3 frames.
    pub fn registration() -> Self {
        Self {
            frame_stride: 5,
            min_track_frames: 3,
            max_stale_frames: 10,
            min_aspect_ratio: 0.5,
            max_aspect_ratio: 2.0,
            association_radius_factor: 0.8,
            strict_quality: true,
            min_sharpness: 40.0,
        }
    }

    /// Maximum recall: a person seen once still counts.
    pub fn attendance() -> Self {
        Self {
            min_track_frames: 1,
            strict_quality: false,
            min_sharpness: 0.0,
            ..Self::registration()
        }
    }

    pub fn is_sampled(&self, frame_index: usize) -> bool {
        frame_index % self.frame_stride.max(1) == 0
    }

    pub fn plausible_shape(&self, detection: &Detection) -> bool {
        let ratio = detection.aspect_ratio();
        ratio >= self.min_aspect_ratio && ratio <= self.max_aspect_ratio
    }

    pub fn sharp_enough(&self, sharpness: f64) -> bool {
        !self.strict_quality || sharpness >= self.min_sharpness
    }

    pub fn association_radius(&self, detection: &Detection) -> f64 {
        self.association_radius_factor * detection.width
    }
}
