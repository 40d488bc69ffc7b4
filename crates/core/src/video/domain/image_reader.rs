use std::path::Path;

use crate::shared::frame::Frame;

/// Loads a face crop back from scratch storage.
pub trait ImageReader: Send {
    fn read(&self, path: &Path) -> Result<Frame, Box<dyn std::error::Error>>;
}
