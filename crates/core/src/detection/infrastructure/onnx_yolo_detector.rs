/// YOLO face detector using ONNX Runtime via `ort`.
///
/// The deep-learning strategy: letterbox preprocessing, a single inference
/// pass, confidence filtering and NMS. Keypoint columns in pose-style
/// exports are ignored.
use std::path::Path;

use crate::detection::domain::detector_settings::DetectorSettings;
use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::detection::Detection;
use crate::shared::frame::Frame;

use super::execution_provider::build_session;
use super::math::{nms, ScoredBox};

/// Fallback YOLO model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

pub struct OnnxYoloDetector {
    session: ort::session::Session,
    settings: DetectorSettings,
    input_size: u32,
}

/// Where the original frame sits inside the letterboxed model input.
#[derive(Clone, Copy, Debug)]
struct Letterbox {
    scale: f64,
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    fn to_frame(self, v: f64, pad: u32) -> f64 {
        (v - pad as f64) / self.scale
    }
}

impl OnnxYoloDetector {
    /// The input resolution is read from the model's input shape (expecting
    /// NCHW). Falls back to 640 if the shape is dynamic or unreadable.
    pub fn new(
        model_path: &Path,
        settings: DetectorSettings,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let session = build_session(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                    (shape.len() >= 4 && shape[2] > 0).then(|| shape[2] as u32)
                } else {
                    None
                }
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        log::debug!("YOLO input size {input_size}");

        Ok(Self {
            session,
            settings,
            input_size,
        })
    }
}

impl FaceDetector for OnnxYoloDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }

        let (input_tensor, lb) = letterbox(frame, self.input_size);

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape().to_vec();
        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;

        let raw = parse_output(
            data,
            &shape,
            lb,
            frame.width(),
            frame.height(),
            self.settings.min_confidence,
        )?;

        Ok(nms(raw, NMS_IOU_THRESH)
            .into_iter()
            .filter_map(|b| Detection::from_corners(b.bbox, Some(b.score.clamp(0.0, 1.0))).ok())
            .filter(|d| self.settings.accepts(d))
            .collect())
    }
}

/// Letterbox-resize a frame to `target_size` × `target_size` NCHW float32,
/// padding with YOLO's 114 gray.
fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, Letterbox) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (tensor, Letterbox { scale, pad_x, pad_y })
}

/// Parses `[1, features, detections]` or `[1, detections, features]` output,
/// where each detection starts with `cx, cy, w, h, conf` in letterbox space.
/// Boxes are mapped back to the frame and clipped to it.
fn parse_output(
    data: &[f32],
    shape: &[usize],
    lb: Letterbox,
    frame_width: u32,
    frame_height: u32,
    min_confidence: f64,
) -> Result<Vec<ScoredBox>, Box<dyn std::error::Error>> {
    if shape.len() != 3 {
        return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
    }
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if num_feats < 5 || data.len() < num_dets * num_feats {
        return Err(format!("YOLO output too small for shape {shape:?}").into());
    }

    let at = |det: usize, feat: usize| -> f64 {
        let idx = if transposed {
            feat * num_dets + det
        } else {
            det * num_feats + feat
        };
        data[idx] as f64
    };

    let fw = frame_width as f64;
    let fh = frame_height as f64;
    let mut boxes = Vec::new();
    for i in 0..num_dets {
        let conf = at(i, 4);
        if conf < min_confidence {
            continue;
        }

        let (cx, cy, w, h) = (at(i, 0), at(i, 1), at(i, 2), at(i, 3));
        let x1 = lb.to_frame(cx - w / 2.0, lb.pad_x).clamp(0.0, fw);
        let y1 = lb.to_frame(cy - h / 2.0, lb.pad_y).clamp(0.0, fh);
        let x2 = lb.to_frame(cx + w / 2.0, lb.pad_x).clamp(0.0, fw);
        let y2 = lb.to_frame(cy + h / 2.0, lb.pad_y).clamp(0.0, fh);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        boxes.push(ScoredBox {
            bbox: [x1, y1, x2, y2],
            score: conf,
        });
    }
    Ok(boxes)
}
