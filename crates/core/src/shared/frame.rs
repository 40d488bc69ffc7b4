use ndarray::{Array2, ArrayView3};

use super::detection::Detection;

/// A single decoded video frame: contiguous RGB bytes in row-major order.
///
/// `index` is the frame's position in the source stream, counting frames
/// whose packets failed to decode, which the tracker uses to reason about
/// sampling. Frames are never persisted as-is; only
/// crops derived from them are written to scratch storage.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Crops the detection box, clamped to the frame bounds.
    ///
    /// The crop keeps the parent frame's index so it can be traced back to
    /// the sampled frame it came from.
    pub fn crop(&self, detection: &Detection) -> Frame {
        let (x1, y1, x2, y2) = detection.clamp_to(self.width, self.height);
        self.copy_rect(x1, y1, x2, y2)
    }

    /// Extracts a square crop centered on the detection, clamped to frame
    /// bounds. Embedding models expect square inputs, so this avoids
    /// distorting the face when it is resized.
    pub fn square_crop(&self, detection: &Detection) -> Frame {
        let fw = self.width as i64;
        let fh = self.height as i64;
        let (cx, cy) = detection.center();
        let half = (detection.width.max(detection.height) / 2.0).round() as i64;

        let x1 = (cx.round() as i64 - half).clamp(0, fw) as usize;
        let y1 = (cy.round() as i64 - half).clamp(0, fh) as usize;
        let x2 = (cx.round() as i64 + half).clamp(0, fw) as usize;
        let y2 = (cy.round() as i64 + half).clamp(0, fh) as usize;

        self.copy_rect(x1, y1, x2, y2)
    }

    /// Luma conversion (BT.601 weights). Single-channel frames are copied
    /// through unchanged.
    pub fn to_gray(&self) -> Array2<f64> {
        let h = self.height as usize;
        let w = self.width as usize;
        if self.channels == 1 {
            return Array2::from_shape_fn((h, w), |(y, x)| self.data[y * w + x] as f64);
        }
        let src = self.as_ndarray();
        Array2::from_shape_fn((h, w), |(y, x)| {
            0.299 * src[[y, x, 0]] as f64
                + 0.587 * src[[y, x, 1]] as f64
                + 0.114 * src[[y, x, 2]] as f64
        })
    }

    fn copy_rect(&self, x1: usize, y1: usize, x2: usize, y2: usize) -> Frame {
        let crop_w = x2.saturating_sub(x1);
        let crop_h = y2.saturating_sub(y1);
        let channels = self.channels as usize;
        let src = self.as_ndarray();

        let mut data = Vec::with_capacity(crop_w * crop_h * channels);
        for row in y1..y1 + crop_h {
            for col in x1..x1 + crop_w {
                for c in 0..channels {
                    data.push(src[[row, col, c]]);
                }
            }
        }

        Frame::new(data, crop_w as u32, crop_h as u32, self.channels, self.index)
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
