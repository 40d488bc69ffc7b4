use std::path::Path;
use std::sync::Mutex;

use crate::detection::infrastructure::execution_provider::build_session;
use crate::recognition::domain::embedding::Embedding;
use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::shared::frame::Frame;

const INPUT_SIZE: usize = 112;
const NORM_MEAN: f32 = 127.5;
const NORM_STD: f32 = 127.5;

/// Crops smaller than this on either side carry too little signal to embed.
const MIN_CROP_SIDE: u32 = 8;

/// ArcFace face embedder using ONNX Runtime.
///
/// Crops are resized to 112×112, normalized with `(x − 127.5) / 127.5` and
/// fed as NCHW. The output vector is L2-normalized.
pub struct OnnxArcfaceEmbedder {
    session: Mutex<ort::session::Session>,
    model_name: String,
}

impl OnnxArcfaceEmbedder {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let session = build_session(model_path)?;
        let model_name = model_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "arcface".to_string());
        Ok(Self {
            session: Mutex::new(session),
            model_name,
        })
    }

    fn run(&self, crop: &Frame) -> Result<Embedding, Box<dyn std::error::Error>> {
        let tensor = preprocess(crop);
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let mut session = self
            .session
            .lock()
            .map_err(|e| format!("Lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs![input_value])?;
        let embedding_array = outputs[0].try_extract_array::<f32>()?;
        let embedding_slice = embedding_array
            .as_slice()
            .ok_or("Cannot get embedding slice")?;

        let mut embedding = Embedding::new(embedding_slice.to_vec());
        embedding.l2_normalize();
        Ok(embedding)
    }
}

impl FaceEmbedder for OnnxArcfaceEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn embed(&self, crop: &Frame) -> Option<Embedding> {
        if crop.channels() != 3 || crop.width() < MIN_CROP_SIDE || crop.height() < MIN_CROP_SIDE {
            log::debug!("Skipping degenerate {}x{} crop", crop.width(), crop.height());
            return None;
        }
        match self.run(crop) {
            Ok(embedding) if embedding.is_usable() => Some(embedding),
            Ok(_) => {
                log::warn!("{} produced an unusable embedding", self.model_name);
                None
            }
            Err(e) => {
                log::warn!("{} failed on crop: {e}", self.model_name);
                None
            }
        }
    }
}

/// Resize crop to 112x112, normalize, NCHW layout.
fn preprocess(crop: &Frame) -> ndarray::Array4<f32> {
    let src = crop.as_ndarray();
    let src_w = crop.width() as usize;
    let src_h = crop.height() as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));

    for y in 0..INPUT_SIZE {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / INPUT_SIZE as f64) as usize).min(src_h - 1);
        for x in 0..INPUT_SIZE {
            let src_x =
                (((x as f64 + 0.5) * src_w as f64 / INPUT_SIZE as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = (src[[src_y, src_x, c]] as f32 - NORM_MEAN) / NORM_STD;
            }
        }
    }

    tensor
}
