use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::attendance::domain::voter::{AttendanceVoter, Verdict, VoteTally};
use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::recognition::domain::matcher::Matcher;
use crate::recognition::domain::roster::RosterIdentity;
use crate::video::domain::image_reader::ImageReader;

use super::error::PipelineError;
use super::extract_faces_use_case::ExtractFacesUseCase;
use super::register_faces_use_case::{MSG_NO_EMBEDDER, MSG_NO_FACES};

/// Outcome for one face seen in the session video.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FaceLog {
    /// Crop file name within the run's faces directory.
    pub face: String,
    /// Accepted identity, or `null` when the nearest one was too far.
    #[serde(rename = "match")]
    pub matched: Option<String>,
    /// Distance to the nearest identity, whether accepted or not.
    pub dist: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AttendanceReport {
    pub present_student_ids: Vec<String>,
    pub total_faces_processed: usize,
    pub vote_counts: BTreeMap<String, usize>,
    pub logs: Vec<FaceLog>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AttendanceReport {
    fn empty(message: &str) -> Self {
        Self {
            present_student_ids: Vec::new(),
            total_faces_processed: 0,
            vote_counts: BTreeMap::new(),
            logs: Vec::new(),
            message: Some(message.to_string()),
        }
    }
}

/// Decides which roster identities appear in a session video.
///
/// Tracks whose best crop is blurrier than `min_sharpness` are never
/// embedded. Every other crop is matched against the roster and votes for
/// its nearest identity when close enough.
pub struct TakeAttendanceUseCase {
    extractor: ExtractFacesUseCase,
    embedder: Option<Box<dyn FaceEmbedder>>,
    image_reader: Box<dyn ImageReader>,
    voter: AttendanceVoter,
    min_sharpness: f64,
}

impl TakeAttendanceUseCase {
    pub fn new(
        extractor: ExtractFacesUseCase,
        embedder: Option<Box<dyn FaceEmbedder>>,
        image_reader: Box<dyn ImageReader>,
        voter: AttendanceVoter,
        min_sharpness: f64,
    ) -> Self {
        Self {
            extractor,
            embedder,
            image_reader,
            voter,
            min_sharpness,
        }
    }

    pub fn execute(
        &mut self,
        path: &Path,
        roster: &[RosterIdentity],
    ) -> Result<AttendanceReport, PipelineError> {
        let extraction = self.extractor.execute(path)?;
        if extraction.tracks.is_empty() {
            return Ok(AttendanceReport::empty(MSG_NO_FACES));
        }
        let Some(embedder) = self.embedder.as_deref() else {
            log::warn!("Embedding model unavailable; nobody can be marked present");
            return Ok(AttendanceReport::empty(MSG_NO_EMBEDDER));
        };

        let matcher = Matcher::new(roster);
        if matcher.matchable_count() == 0 {
            log::warn!("Roster has no usable embeddings; every face will go unmatched");
        }

        let mut tally = VoteTally::default();
        let mut logs = Vec::new();
        let mut gated = 0;
        for track in &extraction.tracks {
            if track.best_sharpness < self.min_sharpness {
                gated += 1;
                log::debug!(
                    "track {}: too blurry to match (sharpness {:.1})",
                    track.id,
                    track.best_sharpness
                );
                continue;
            }
            let crop = match self.image_reader.read(&track.crop_path) {
                Ok(crop) => crop,
                Err(e) => {
                    log::warn!("Cannot read {}: {e}", track.crop_path.display());
                    continue;
                }
            };
            let Some(query) = embedder.embed(&crop) else {
                continue;
            };

            let verdict = self.voter.cast(&mut tally, &query, &matcher);
            let accepted = match &verdict {
                Verdict::Accepted(m) => Some(m.identity_id.clone()),
                Verdict::Rejected(_) => None,
            };
            logs.push(FaceLog {
                face: face_name(&track.crop_path),
                matched: accepted,
                dist: verdict.nearest().map(|m| m.distance),
            });
        }

        let present_student_ids = self.voter.present(&tally, roster);
        log::info!(
            "{} of {} roster identities present ({} faces matched, {gated} too blurry)",
            present_student_ids.len(),
            roster.len(),
            logs.len()
        );

        Ok(AttendanceReport {
            present_student_ids,
            total_faces_processed: logs.len(),
            vote_counts: tally.vote_counts(),
            logs,
            message: None,
        })
    }
}

fn face_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::domain::voter::VotingPolicy;
    use crate::pipeline::extract_faces_use_case::tests::{
        writer, FaceSpec, StubDetector, StubReader,
    };
    use crate::recognition::domain::embedding::Embedding;
    use crate::shared::frame::Frame;
    use crate::tracking::domain::face_tracker::FaceTracker;
    use crate::tracking::domain::tracking_policy::TrackingPolicy;
    use crate::video::infrastructure::image_file_reader::ImageFileReader;
    use approx::assert_relative_eq;

    struct FixedEmbedder(Vec<f32>);

    impl FaceEmbedder for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed-stub"
        }

        fn embed(&self, _crop: &Frame) -> Option<Embedding> {
            Some(Embedding::new(self.0.clone()))
        }
    }

    fn identity(id: &str, embedding: Vec<f32>) -> RosterIdentity {
        RosterIdentity {
            id: id.to_string(),
            name: id.to_uppercase(),
            embedding: Some(Embedding::new(embedding)),
            embeddings_list: Vec::new(),
            class_id: None,
        }
    }

    /// Unit vector at cosine distance 0.1 from `[1, 0]`.
    fn query_near_e() -> Vec<f32> {
        vec![0.9, (1.0f32 - 0.81).sqrt()]
    }

    const FACE: FaceSpec = (100, 60, 64, 0);

    fn attend(
        faces: Vec<FaceSpec>,
        embedder: Option<Box<dyn FaceEmbedder>>,
        min_sharpness: f64,
        roster: &[RosterIdentity],
        dir: &Path,
    ) -> AttendanceReport {
        let extractor = ExtractFacesUseCase::new(
            Box::new(StubReader::new(30, faces.clone())),
            Box::new(StubDetector::new(faces)),
            FaceTracker::new(TrackingPolicy::attendance(), writer(), dir),
            None,
        );
        let mut uc = TakeAttendanceUseCase::new(
            extractor,
            embedder,
            Box::new(ImageFileReader::new()),
            AttendanceVoter::new(VotingPolicy::default()),
            min_sharpness,
        );
        uc.execute(Path::new("session.mp4"), roster).unwrap()
    }

    #[test]
    fn test_close_query_marks_identity_present() {
        let dir = tempfile::tempdir().unwrap();
        let roster = vec![identity("s1", vec![1.0, 0.0])];
        let report = attend(
            vec![FACE],
            Some(Box::new(FixedEmbedder(query_near_e()))),
            15.0,
            &roster,
            dir.path(),
        );

        assert_eq!(report.present_student_ids, vec!["s1".to_string()]);
        assert_eq!(report.vote_counts, BTreeMap::from([("s1".to_string(), 1)]));
        assert_eq!(report.total_faces_processed, 1);
        assert_eq!(report.logs[0].face, "0.jpg");
        assert_eq!(report.logs[0].matched.as_deref(), Some("s1"));
        assert_relative_eq!(report.logs[0].dist.unwrap(), 0.1, epsilon = 1e-5);
    }

    #[test]
    fn test_far_query_is_logged_but_not_counted() {
        let dir = tempfile::tempdir().unwrap();
        let roster = vec![identity("s1", vec![1.0, 0.0])];
        let report = attend(
            vec![FACE],
            Some(Box::new(FixedEmbedder(vec![0.0, 1.0]))),
            15.0,
            &roster,
            dir.path(),
        );

        assert!(report.present_student_ids.is_empty());
        assert!(report.vote_counts.is_empty());
        assert_eq!(report.logs.len(), 1);
        assert_eq!(report.logs[0].matched, None);
        assert_relative_eq!(report.logs[0].dist.unwrap(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_empty_roster_matches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let report = attend(
            vec![FACE],
            Some(Box::new(FixedEmbedder(query_near_e()))),
            15.0,
            &[],
            dir.path(),
        );

        assert!(report.present_student_ids.is_empty());
        assert_eq!(report.logs[0].matched, None);
        assert_eq!(report.logs[0].dist, None);
    }

    #[test]
    fn test_blurry_crops_are_not_embedded() {
        let dir = tempfile::tempdir().unwrap();
        let roster = vec![identity("s1", vec![1.0, 0.0])];
        let report = attend(
            vec![FACE],
            Some(Box::new(FixedEmbedder(query_near_e()))),
            f64::INFINITY,
            &roster,
            dir.path(),
        );

        assert_eq!(report.total_faces_processed, 0);
        assert!(report.present_student_ids.is_empty());
    }

    #[test]
    fn test_missing_embedder_reports_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let roster = vec![identity("s1", vec![1.0, 0.0])];
        let report = attend(vec![FACE], None, 15.0, &roster, dir.path());

        assert!(report.present_student_ids.is_empty());
        assert_eq!(report.message.as_deref(), Some(MSG_NO_EMBEDDER));
    }

    #[test]
    fn test_no_faces_reports_message() {
        let dir = tempfile::tempdir().unwrap();
        let report = attend(
            vec![],
            Some(Box::new(FixedEmbedder(query_near_e()))),
            15.0,
            &[identity("s1", vec![1.0, 0.0])],
            dir.path(),
        );

        assert_eq!(report.total_faces_processed, 0);
        assert_eq!(report.message.as_deref(), Some(MSG_NO_FACES));
    }

    #[test]
    fn test_log_serializes_match_key() {
        let log = FaceLog {
            face: "3.jpg".to_string(),
            matched: None,
            dist: Some(0.7),
        };
        let json = serde_json::to_value(&log).unwrap();
        assert!(json["match"].is_null());
        assert_eq!(json["face"], "3.jpg");
        assert_eq!(json["dist"], 0.7);
    }
}
