use serde::{Deserialize, Serialize};

use crate::shared::constants::{BLAZEFACE_MODEL_NAME, YOLO_MODEL_NAME, YOLO_MODEL_URL};
use crate::shared::detection::Detection;

pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;
pub const STRICT_MIN_CONFIDENCE: f64 = 0.6;
pub const DEFAULT_MIN_FACE_SIZE: f64 = 20.0;
pub const STRICT_MIN_FACE_SIZE: f64 = 40.0;

/// Which detector backend an extraction run uses. Chosen once per run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorStrategy {
    /// Small anchor-based model; fast, lower recall.
    Lightweight,
    /// YOLO face model; higher recall, heavier.
    DeepLearning,
}

impl DetectorStrategy {
    pub fn model_name(&self) -> &'static str {
        match self {
            Self::Lightweight => BLAZEFACE_MODEL_NAME,
            Self::DeepLearning => YOLO_MODEL_NAME,
        }
    }

    pub fn model_url(&self) -> Option<&'static str> {
        match self {
            Self::Lightweight => None,
            Self::DeepLearning => Some(YOLO_MODEL_URL),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    pub strategy: DetectorStrategy,
    pub min_confidence: f64,
    /// Smallest accepted box side, in pixels.
    pub min_face_size: f64,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self::select(false, false)
    }
}

impl DetectorSettings {
    /// Resource-constrained deployments always get the lightweight backend.
    /// Strict quality raises both the confidence and the size floor.
    pub fn select(resource_constrained: bool, strict_quality: bool) -> Self {
        let strategy = if resource_constrained {
            DetectorStrategy::Lightweight
        } else {
            DetectorStrategy::DeepLearning
        };
        let (min_confidence, min_face_size) = if strict_quality {
            (STRICT_MIN_CONFIDENCE, STRICT_MIN_FACE_SIZE)
        } else {
            (DEFAULT_MIN_CONFIDENCE, DEFAULT_MIN_FACE_SIZE)
        };
        Self {
            strategy,
            min_confidence,
            min_face_size,
        }
    }

    /// Raises the floors to at least the strict values when `strict_quality`
    /// is set. Never lowers them.
    pub fn with_strict_quality(mut self, strict_quality: bool) -> Self {
        if strict_quality {
            self.min_confidence = self.min_confidence.max(STRICT_MIN_CONFIDENCE);
            self.min_face_size = self.min_face_size.max(STRICT_MIN_FACE_SIZE);
        }
        self
    }

    /// Applies the size floor and, for scored detections, the confidence floor.
    pub fn accepts(&self, detection: &Detection) -> bool {
        if detection.width < self.min_face_size || detection.height < self.min_face_size {
            return false;
        }
        detection
            .confidence
            .map_or(true, |c| c >= self.min_confidence)
    }
}
