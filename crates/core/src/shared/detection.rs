use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum InvalidDetection {
    #[error("detection box must have positive size, got {width}x{height}")]
    EmptyBox { width: f64, height: f64 },
    #[error("detection confidence must be within [0, 1], got {0}")]
    Confidence(f64),
}

/// A face bounding box in frame pixel coordinates.
///
/// `x`/`y` are the top-left corner. Detectors that do not score their
/// output (or scores that are not probabilities) leave `confidence` empty.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub confidence: Option<f64>,
}

impl Detection {
    pub fn new(
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        confidence: Option<f64>,
    ) -> Result<Self, InvalidDetection> {
        if !(width > 0.0 && height > 0.0) {
            return Err(InvalidDetection::EmptyBox { width, height });
        }
        if let Some(c) = confidence {
            if !(0.0..=1.0).contains(&c) {
                return Err(InvalidDetection::Confidence(c));
            }
        }
        Ok(Self {
            x,
            y,
            width,
            height,
            confidence,
        })
    }

    /// Builds a detection from corner coordinates `[x1, y1, x2, y2]`.
    pub fn from_corners(bbox: [f64; 4], confidence: Option<f64>) -> Result<Self, InvalidDetection> {
        Self::new(bbox[0], bbox[1], bbox[2] - bbox[0], bbox[3] - bbox[1], confidence)
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width / self.height
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn corners(&self) -> [f64; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }

    /// Integer pixel rectangle `(x1, y1, x2, y2)` clipped to a frame of the
    /// given size. May be empty when the box lies outside the frame.
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> (usize, usize, usize, usize) {
        let fw = frame_width as f64;
        let fh = frame_height as f64;
        let x1 = self.x.floor().clamp(0.0, fw) as usize;
        let y1 = self.y.floor().clamp(0.0, fh) as usize;
        let x2 = (self.x + self.width).ceil().clamp(0.0, fw) as usize;
        let y2 = (self.y + self.height).ceil().clamp(0.0, fh) as usize;
        (x1, y1, x2.max(x1), y2.max(y1))
    }
}
