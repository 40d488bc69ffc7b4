use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Container-reported frame count; 0 when the container doesn't know.
    pub total_frames: usize,
    pub codec: String,
    pub source_path: Option<PathBuf>,
}

impl VideoMetadata {
    /// Number of frames the tracker will see at the given sampling stride.
    pub fn sampled_frames(&self, stride: usize) -> usize {
        let stride = stride.max(1);
        self.total_frames.div_ceil(stride)
    }

    pub fn duration_secs(&self) -> Option<f64> {
        (self.fps > 0.0).then(|| self.total_frames as f64 / self.fps)
    }
}
