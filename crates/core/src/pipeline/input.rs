use std::path::Path;

use crate::shared::constants::VIDEO_EXTENSIONS;

use super::error::PipelineError;

/// Rejects missing files and extensions outside [`VIDEO_EXTENSIONS`] before
/// any decoding is attempted.
pub fn validate_video_path(path: &Path) -> Result<(), PipelineError> {
    if !path.is_file() {
        return Err(PipelineError::input(path, "file not found"));
    }
    let supported = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            VIDEO_EXTENSIONS
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext))
        });
    if !supported {
        return Err(PipelineError::UnsupportedFormat {
            path: path.to_path_buf(),
            expected: VIDEO_EXTENSIONS.join(", "),
        });
    }
    Ok(())
}
