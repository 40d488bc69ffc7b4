use crate::shared::frame::Frame;

use super::embedding::Embedding;

/// Maps a face crop to an identity vector.
///
/// Never fails past this boundary: model errors and degenerate crops come
/// back as `None` so callers can drop the crop and carry on.
pub trait FaceEmbedder: Send + Sync {
    /// Name of the model behind this embedder. Stored embeddings are only
    /// comparable when this matches.
    fn model_name(&self) -> &str;

    fn embed(&self, crop: &Frame) -> Option<Embedding>;
}
