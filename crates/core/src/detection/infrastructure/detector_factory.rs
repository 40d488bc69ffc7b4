use std::path::Path;

use crate::detection::domain::detector_settings::{DetectorSettings, DetectorStrategy};
use crate::detection::domain::face_detector::FaceDetector;

use super::onnx_blazeface_detector::OnnxBlazefaceDetector;
use super::onnx_yolo_detector::OnnxYoloDetector;

/// Builds the detector backend named by `settings.strategy`.
///
/// `model_path` must point at the model for that strategy
/// (see [`DetectorStrategy::model_name`]).
pub fn create_detector(
    settings: &DetectorSettings,
    model_path: &Path,
) -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error>> {
    log::info!(
        "Using {:?} face detector (min_confidence={}, min_face_size={}px)",
        settings.strategy,
        settings.min_confidence,
        settings.min_face_size
    );
    match settings.strategy {
        DetectorStrategy::Lightweight => Ok(Box::new(OnnxBlazefaceDetector::new(
            model_path,
            settings.clone(),
        )?)),
        DetectorStrategy::DeepLearning => {
            Ok(Box::new(OnnxYoloDetector::new(model_path, settings.clone())?))
        }
    }
}
