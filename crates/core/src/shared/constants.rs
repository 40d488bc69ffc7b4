pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

/// Short-range BlazeFace export. No canonical download location, so it is
/// resolved from the model cache or a bundled directory only.
pub const BLAZEFACE_MODEL_NAME: &str = "blazeface_short_range.onnx";

/// Embeddings from different models are not comparable; stored rosters are
/// only meaningful against the model named here.
pub const EMBEDDING_MODEL_NAME: &str = "w600k_r50.onnx";
pub const EMBEDDING_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/w600k_r50.onnx";

/// Hard cap on face tracks created in a single run.
pub const MAX_FACES: usize = 2000;

/// Edge length of the square crops written to scratch storage.
pub const CROP_SIZE: u32 = 160;

/// Maximum reference embeddings kept per registered identity.
pub const MAX_REFERENCE_EMBEDDINGS: usize = 5;

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mkv", "mov", "webm"];
