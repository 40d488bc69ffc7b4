/// BlazeFace face detector using ONNX Runtime via `ort`.
///
/// The lightweight strategy: a 128×128 short-range model that needs no
/// letterboxing and runs comfortably on CPU-only hosts.
use std::path::Path;

use crate::detection::domain::detector_settings::DetectorSettings;
use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::detection::Detection;
use crate::shared::frame::Frame;

use super::execution_provider::build_session;
use super::math::{nms, ScoredBox};

/// BlazeFace model input resolution.
const INPUT_SIZE: u32 = 128;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.3;

/// Number of BlazeFace anchors (short-range model).
const NUM_ANCHORS: usize = 896;

/// Values per anchor in the regressor output (box + 6 keypoints).
const REGRESSOR_STRIDE: usize = 16;

pub struct OnnxBlazefaceDetector {
    session: ort::session::Session,
    settings: DetectorSettings,
    anchors: Vec<[f32; 2]>,
}

impl OnnxBlazefaceDetector {
    pub fn new(
        model_path: &Path,
        settings: DetectorSettings,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let session = build_session(model_path)?;
        Ok(Self {
            session,
            settings,
            anchors: generate_anchors(),
        })
    }
}

impl FaceDetector for OnnxBlazefaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }

        let input_tensor = preprocess(frame, INPUT_SIZE);
        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;

        // regressors: [1, 896, 16], classificators: [1, 896, 1]
        if outputs.len() < 2 {
            return Err(
                format!("BlazeFace model expected 2 outputs, got {}", outputs.len()).into(),
            );
        }

        let regressors = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let reg_data = regressors.as_slice().ok_or("Cannot get regressor slice")?;
        let score_data = scores.as_slice().ok_or("Cannot get score slice")?;

        let raw = decode(
            reg_data,
            score_data,
            &self.anchors,
            frame.width(),
            frame.height(),
            self.settings.min_confidence,
        );

        Ok(nms(raw, NMS_IOU_THRESH)
            .into_iter()
            .filter_map(|b| Detection::from_corners(b.bbox, Some(b.score.clamp(0.0, 1.0))).ok())
            .filter(|d| self.settings.accepts(d))
            .collect())
    }
}

/// Resize frame to `size × size` and normalize to [0,1] NCHW float32.
fn preprocess(frame: &Frame, size: u32) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;
    let s = size as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));

    for y in 0..s {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / s as f64) as usize).min(src_h - 1);
        for x in 0..s {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / s as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    tensor
}

/// Turns raw anchor outputs into frame-space boxes above `min_confidence`.
fn decode(
    reg_data: &[f32],
    score_data: &[f32],
    anchors: &[[f32; 2]],
    frame_width: u32,
    frame_height: u32,
    min_confidence: f64,
) -> Vec<ScoredBox> {
    let fw = frame_width as f32;
    let fh = frame_height as f32;
    let input = INPUT_SIZE as f32;

    let mut boxes = Vec::new();
    for (i, (&raw_score, anchor)) in score_data.iter().zip(anchors).enumerate() {
        let score = sigmoid(raw_score);
        if (score as f64) < min_confidence {
            continue;
        }

        let offset = i * REGRESSOR_STRIDE;
        let Some(reg) = reg_data.get(offset..offset + 4) else {
            break;
        };

        let cx = anchor[0] + reg[0] / input;
        let cy = anchor[1] + reg[1] / input;
        let w = reg[2] / input;
        let h = reg[3] / input;

        let x1 = ((cx - w / 2.0) * fw).max(0.0);
        let y1 = ((cy - h / 2.0) * fh).max(0.0);
        let x2 = ((cx + w / 2.0) * fw).min(fw);
        let y2 = ((cy + h / 2.0) * fh).min(fh);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        boxes.push(ScoredBox {
            bbox: [x1 as f64, y1 as f64, x2 as f64, y2 as f64],
            score: score as f64,
        });
    }
    boxes
}

/// Short-range anchors: a 16×16 grid with 2 anchors per cell followed by an
/// 8×8 grid with 6 per cell.
fn generate_anchors() -> Vec<[f32; 2]> {
    let strides = [(8, 2), (16, 6)]; // (stride, anchors_per_cell)
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);

    for &(stride, num) in &strides {
        let grid_size = INPUT_SIZE as usize / stride;
        for y in 0..grid_size {
            for x in 0..grid_size {
                let cx = (x as f32 + 0.5) / grid_size as f32;
                let cy = (y as f32 + 0.5) / grid_size as f32;
                for _ in 0..num {
                    anchors.push([cx, cy]);
                }
            }
        }
    }

    anchors
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_shape() {
        let frame = Frame::new(vec![128u8; 200 * 100 * 3], 200, 100, 3, 0);
        let tensor = preprocess(&frame, 128);
        assert_eq!(tensor.shape(), &[1, 3, 128, 128]);
    }

    #[test]
    fn test_preprocess_normalized() {
        let frame = Frame::new(vec![255u8; 50 * 50 * 3], 50, 50, 3, 0);
        let tensor = preprocess(&frame, 128);
        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_generate_anchors_count_and_range() {
        let anchors = generate_anchors();
        assert_eq!(anchors.len(), NUM_ANCHORS);
        assert!(anchors
            .iter()
            .all(|a| a[0] > 0.0 && a[0] < 1.0 && a[1] > 0.0 && a[1] < 1.0));
    }

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!((sigmoid(10.0) - 1.0).abs() < 0.001);
        assert!(sigmoid(-10.0) < 0.001);
    }

    #[test]
    fn test_decode_maps_anchor_to_frame() {
        // Single anchor at the image center, box 32x32 in model space.
        let anchors = vec![[0.5, 0.5]];
        let mut reg = vec![0.0f32; REGRESSOR_STRIDE];
        reg[2] = 32.0;
        reg[3] = 32.0;
        let scores = vec![5.0f32];

        let boxes = decode(&reg, &scores, &anchors, 256, 256, 0.5);

        assert_eq!(boxes.len(), 1);
        let b = &boxes[0].bbox;
        assert!((b[0] - 96.0).abs() < 1e-3);
        assert!((b[2] - 160.0).abs() < 1e-3);
        assert!(boxes[0].score > 0.99);
    }

    #[test]
    fn test_decode_drops_low_scores() {
        let anchors = vec![[0.5, 0.5]];
        let mut reg = vec![0.0f32; REGRESSOR_STRIDE];
        reg[2] = 32.0;
        reg[3] = 32.0;
        let boxes = decode(&reg, &[-3.0], &anchors, 256, 256, 0.5);
        assert!(boxes.is_empty());
    }

    #[test]
    fn test_decode_skips_degenerate_boxes() {
        let anchors = vec![[0.5, 0.5]];
        let reg = vec![0.0f32; REGRESSOR_STRIDE];
        let boxes = decode(&reg, &[5.0], &anchors, 256, 256, 0.5);
        assert!(boxes.is_empty());
    }
}
