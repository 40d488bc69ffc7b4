use std::path::Path;

use crate::shared::frame::Frame;
use crate::video::domain::image_reader::ImageReader;

/// Loads a crop from disk with the `image` crate, always as packed RGB.
pub struct ImageFileReader;

impl ImageFileReader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageFileReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageReader for ImageFileReader {
    fn read(&self, path: &Path) -> Result<Frame, Box<dyn std::error::Error>> {
        let img = image::open(path)?.to_rgb8();
        let (width, height) = img.dimensions();
        Ok(Frame::new(img.into_raw(), width, height, 3, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_png_as_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("face.png");
        let img = image::RgbImage::from_pixel(6, 4, image::Rgb([10, 20, 30]));
        img.save(&path).unwrap();

        let frame = ImageFileReader::new().read(&path).unwrap();
        assert_eq!(frame.width(), 6);
        assert_eq!(frame.height(), 4);
        assert_eq!(frame.channels(), 3);
        assert_eq!(&frame.data()[..3], &[10, 20, 30]);
    }

    #[test]
    fn test_grayscale_image_is_expanded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gray.png");
        image::GrayImage::from_pixel(3, 3, image::Luma([77])).save(&path).unwrap();

        let frame = ImageFileReader::new().read(&path).unwrap();
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.data().len(), 27);
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(ImageFileReader::new()
            .read(Path::new("/nonexistent/face.jpg"))
            .is_err());
    }
}
