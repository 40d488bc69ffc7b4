use crate::shared::detection::Detection;
use crate::shared::frame::Frame;

/// Domain interface for face detection.
///
/// One call covers one frame. `&mut self` because ONNX sessions need
/// exclusive access to run. An `Err` is a per-frame failure: callers log it
/// and treat the frame as having no faces.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>>;
}
