use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;

use crate::recognition::domain::cluster_engine::{ClusterEngine, ClusterSample, IdentityCluster};
use crate::recognition::domain::embedding::Embedding;
use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::tracking::domain::face_tracker::FinalizedTrack;
use crate::video::domain::image_reader::ImageReader;

use super::error::PipelineError;
use super::extract_faces_use_case::ExtractFacesUseCase;

pub const MSG_NO_FACES: &str = "No faces detected";
pub const MSG_NO_EMBEDDER: &str = "Embedding model unavailable";
pub const MSG_NO_EMBEDDINGS: &str = "No usable embeddings";

/// One candidate identity offered to the caller for registration.
#[derive(Clone, Debug, Serialize)]
pub struct ClusterReport {
    pub cluster_id: usize,
    pub count: usize,
    /// Representative crop as base64 JPEG; absent if the file could not be read.
    pub face_base64: Option<String>,
    /// Centroid of the member embeddings.
    pub embedding: Embedding,
    pub embeddings_list: Vec<Embedding>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RegistrationReport {
    pub faces_detected: usize,
    pub unique_faces_registered: usize,
    pub clusters: Vec<ClusterReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub embeddings_available: bool,
}

impl RegistrationReport {
    fn degenerate(faces_detected: usize, message: &str, embeddings_available: bool) -> Self {
        Self {
            faces_detected,
            unique_faces_registered: 0,
            clusters: Vec::new(),
            message: Some(message.to_string()),
            embeddings_available,
        }
    }
}

/// Finds the distinct people in a registration video.
///
/// Each finalized track is embedded once; the embeddings are clustered and
/// every cluster (including singletons promoted from noise) is reported
/// with its temporal-median crop so a human can confirm who it is.
pub struct RegisterFacesUseCase {
    extractor: ExtractFacesUseCase,
    embedder: Option<Box<dyn FaceEmbedder>>,
    image_reader: Box<dyn ImageReader>,
    engine: ClusterEngine,
}

impl RegisterFacesUseCase {
    pub fn new(
        extractor: ExtractFacesUseCase,
        embedder: Option<Box<dyn FaceEmbedder>>,
        image_reader: Box<dyn ImageReader>,
        engine: ClusterEngine,
    ) -> Self {
        Self {
            extractor,
            embedder,
            image_reader,
            engine,
        }
    }

    pub fn execute(&mut self, path: &Path) -> Result<RegistrationReport, PipelineError> {
        let extraction = self.extractor.execute(path)?;
        let faces_detected = extraction.tracks.len();

        if faces_detected == 0 {
            log::info!("No faces detected in {}", path.display());
            return Ok(RegistrationReport::degenerate(0, MSG_NO_FACES, self.embedder.is_some()));
        }

        let Some(embedder) = self.embedder.as_deref() else {
            log::warn!("Embedding model unavailable; {faces_detected} faces left unclustered");
            return Ok(RegistrationReport::degenerate(faces_detected, MSG_NO_EMBEDDER, false));
        };

        let samples = embed_tracks(&extraction.tracks, self.image_reader.as_ref(), embedder);
        if samples.is_empty() {
            log::warn!("None of {faces_detected} face crops produced an embedding");
            return Ok(RegistrationReport::degenerate(faces_detected, MSG_NO_EMBEDDINGS, true));
        }

        let clusters: Vec<ClusterReport> = self
            .engine
            .cluster(samples)
            .into_iter()
            .map(|c| cluster_report(&c))
            .collect();
        log::info!(
            "Registered {} unique faces from {faces_detected} tracks",
            clusters.len()
        );

        Ok(RegistrationReport {
            faces_detected,
            unique_faces_registered: clusters.len(),
            clusters,
            message: None,
            embeddings_available: true,
        })
    }
}

fn embed_tracks(
    tracks: &[FinalizedTrack],
    reader: &dyn ImageReader,
    embedder: &dyn FaceEmbedder,
) -> Vec<ClusterSample> {
    tracks
        .iter()
        .filter_map(|track| {
            let crop = match reader.read(&track.crop_path) {
                Ok(crop) => crop,
                Err(e) => {
                    log::warn!("Cannot read {}: {e}", track.crop_path.display());
                    return None;
                }
            };
            let embedding = embedder.embed(&crop).filter(Embedding::is_usable)?;
            Some(ClusterSample {
                track_id: track.id,
                crop_path: track.crop_path.clone(),
                embedding,
            })
        })
        .collect()
}

fn cluster_report(cluster: &IdentityCluster) -> ClusterReport {
    let crop_path = &cluster.representative().crop_path;
    let face_base64 = match std::fs::read(crop_path) {
        Ok(bytes) => Some(STANDARD.encode(bytes)),
        Err(e) => {
            log::warn!("Cannot encode {}: {e}", crop_path.display());
            None
        }
    };
    ClusterReport {
        cluster_id: cluster.cluster_id,
        count: cluster.count(),
        face_base64,
        embedding: cluster.centroid.clone(),
        embeddings_list: cluster.references.clone(),
    }
}
