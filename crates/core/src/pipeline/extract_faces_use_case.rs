use std::path::Path;

use crate::detection::domain::face_detector::FaceDetector;
use crate::tracking::domain::face_tracker::{FaceTracker, FinalizedTrack};
use crate::video::domain::video_reader::VideoReader;

use super::error::PipelineError;

/// Progress callback: `(current_frame, total_frames)`. Returning `false`
/// cancels the run.
pub type ProgressFn = Box<dyn Fn(usize, usize) -> bool + Send>;

/// What one pass over a video produced.
#[derive(Debug)]
pub struct Extraction {
    pub tracks: Vec<FinalizedTrack>,
    pub frames_read: usize,
    pub frames_sampled: usize,
    pub detector_failures: usize,
    pub hit_face_limit: bool,
}

/// Runs detector and tracker over every sampled frame of one video.
///
/// Frames off the tracker's sampling grid never reach the detector. A
/// detector error on one frame counts as an empty frame; only an unreadable
/// video fails the run.
pub struct ExtractFacesUseCase {
    reader: Box<dyn VideoReader>,
    detector: Box<dyn FaceDetector>,
    tracker: FaceTracker,
    on_progress: Option<ProgressFn>,
}

impl ExtractFacesUseCase {
    pub fn new(
        reader: Box<dyn VideoReader>,
        detector: Box<dyn FaceDetector>,
        tracker: FaceTracker,
        on_progress: Option<ProgressFn>,
    ) -> Self {
        Self {
            reader,
            detector,
            tracker,
            on_progress,
        }
    }

    pub fn execute(&mut self, path: &Path) -> Result<Extraction, PipelineError> {
        let metadata = self
            .reader
            .open(path)
            .map_err(|e| PipelineError::input(path, e))?;
        log::info!(
            "Extracting faces from {} ({}x{}, {:.1}s, ~{} of {} frames sampled)",
            path.display(),
            metadata.width,
            metadata.height,
            metadata.duration_secs().unwrap_or(0.0),
            metadata.sampled_frames(self.tracker.policy().frame_stride),
            metadata.total_frames
        );

        let mut frames_read = 0;
        let mut frames_sampled = 0;
        let mut decode_failures = 0;
        let mut detector_failures = 0;
        let mut cancelled = false;

        for item in self.reader.frames() {
            let frame = match item {
                Ok(frame) => frame,
                Err(e) => {
                    decode_failures += 1;
                    log::warn!("Skipping undecodable frame: {e}");
                    continue;
                }
            };
            frames_read += 1;

            if self.tracker.policy().is_sampled(frame.index()) {
                frames_sampled += 1;
                let detections = match self.detector.detect(&frame) {
                    Ok(detections) => detections,
                    Err(e) => {
                        detector_failures += 1;
                        log::warn!("Detector failed on frame {}: {e}", frame.index());
                        Vec::new()
                    }
                };
                self.tracker.observe(&frame, &detections);
            }

            if let Some(ref callback) = self.on_progress {
                if !callback(frame.index() + 1, metadata.total_frames) {
                    cancelled = true;
                    break;
                }
            }
        }
        self.reader.close();

        if cancelled {
            self.tracker.finish();
            log::info!("Extraction cancelled after {frames_read} frames");
            return Err(PipelineError::Cancelled);
        }

        if frames_read == 0 {
            let reason = if decode_failures > 0 {
                format!("none of {decode_failures} frames could be decoded")
            } else {
                "no video frames".to_string()
            };
            return Err(PipelineError::input(path, reason));
        }

        let hit_face_limit = self.tracker.at_track_limit();
        let tracks = self.tracker.finish();
        log::info!(
            "Read {frames_read} frames, sampled {frames_sampled}, kept {} of {} tracks",
            tracks.len(),
            self.tracker.tracks_created()
        );

        Ok(Extraction {
            tracks,
            frames_read,
            frames_sampled,
            detector_failures,
            hit_face_limit,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::shared::detection::Detection;
    use crate::shared::frame::Frame;
    use crate::shared::video_metadata::VideoMetadata;
    use crate::tracking::domain::tracking_policy::TrackingPolicy;
    use crate::video::domain::image_writer::ImageWriter;
    use crate::video::infrastructure::image_file_writer::ImageFileWriter;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    pub const W: u32 = 320;
    pub const H: u32 = 240;

    /// A face as `(x, y, size, shade)`; `shade` tints the checkerboard so
    /// different faces produce different crops.
    pub type FaceSpec = (u32, u32, u32, u8);

    pub fn paint(index: usize, faces: &[FaceSpec]) -> Frame {
        let mut data = vec![128u8; (W * H * 3) as usize];
        for &(fx, fy, size, shade) in faces {
            for y in fy..(fy + size).min(H) {
                for x in fx..(fx + size).min(W) {
                    let px = if (x + y) % 2 == 0 { [255, shade, 0] } else { [0, 0, shade] };
                    let off = ((y * W + x) * 3) as usize;
                    data[off..off + 3].copy_from_slice(&px);
                }
            }
        }
        Frame::new(data, W, H, 3, index)
    }

    /// Yields `total` frames on demand, painting the same faces in each.
    pub struct StubReader {
        pub total: usize,
        pub faces: Vec<FaceSpec>,
        pub fail_open: bool,
        pub corrupt: bool,
    }

    impl StubReader {
        pub fn new(total: usize, faces: Vec<FaceSpec>) -> Self {
            Self {
                total,
                faces,
                fail_open: false,
                corrupt: false,
            }
        }
    }

    impl VideoReader for StubReader {
        fn open(&mut self, _path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
            if self.fail_open {
                return Err("moov atom not found".into());
            }
            Ok(VideoMetadata {
                width: W,
                height: H,
                fps: 30.0,
                total_frames: self.total,
                codec: "h264".to_string(),
                source_path: None,
            })
        }

        fn frames(
            &mut self,
        ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_> {
            let faces = self.faces.clone();
            let corrupt = self.corrupt;
            Box::new((0..self.total).map(move |i| {
                if corrupt {
                    Err("corrupt packet".into())
                } else {
                    Ok(paint(i, &faces))
                }
            }))
        }

        fn close(&mut self) {}
    }

    /// Reports every painted face as a detection.
    pub struct StubDetector {
        pub faces: Vec<FaceSpec>,
        pub calls: Arc<AtomicUsize>,
        pub fail_every: Option<usize>,
    }

    impl StubDetector {
        pub fn new(faces: Vec<FaceSpec>) -> Self {
            Self {
                faces,
                calls: Arc::new(AtomicUsize::new(0)),
                fail_every: None,
            }
        }
    }

    impl FaceDetector for StubDetector {
        fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_every.is_some_and(|k| n % k == 0) {
                return Err(format!("inference failed on frame {}", frame.index()).into());
            }
            Ok(self
                .faces
                .iter()
                .map(|&(x, y, s, _)| {
                    Detection::new(x as f64, y as f64, s as f64, s as f64, Some(0.9)).unwrap()
                })
                .collect())
        }
    }

    pub fn writer() -> Box<dyn ImageWriter> {
        Box::new(ImageFileWriter::new())
    }

    fn use_case(
        reader: StubReader,
        detector: StubDetector,
        policy: TrackingPolicy,
        dir: &Path,
        on_progress: Option<ProgressFn>,
    ) -> ExtractFacesUseCase {
        ExtractFacesUseCase::new(
            Box::new(reader),
            Box::new(detector),
            FaceTracker::new(policy, writer(), dir),
            on_progress,
        )
    }

    const FACE: FaceSpec = (100, 60, 64, 0);

    #[test]
    fn test_ten_second_video_with_one_face_yields_one_track() {
        let dir = tempfile::tempdir().unwrap();
        let detector = StubDetector::new(vec![FACE]);
        let calls = detector.calls.clone();
        let mut uc = use_case(
            StubReader::new(300, vec![FACE]),
            detector,
            TrackingPolicy::registration(),
            dir.path(),
            None,
        );

        let extraction = uc.execute(Path::new("class.mp4")).unwrap();

        assert_eq!(extraction.frames_read, 300);
        assert_eq!(extraction.frames_sampled, 60);
        assert_eq!(calls.load(Ordering::SeqCst), 60);
        assert_eq!(extraction.tracks.len(), 1);
        assert_eq!(extraction.tracks[0].frames_matched, 60);
        assert!(extraction.tracks[0].crop_path.exists());
        assert!(!extraction.hit_face_limit);
    }

    #[test]
    fn test_empty_video_frames_yield_no_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let mut uc = use_case(
            StubReader::new(30, vec![]),
            StubDetector::new(vec![]),
            TrackingPolicy::registration(),
            dir.path(),
            None,
        );

        let extraction = uc.execute(Path::new("empty.mp4")).unwrap();

        assert!(extraction.tracks.is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_open_failure_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut reader = StubReader::new(10, vec![]);
        reader.fail_open = true;
        let mut uc = use_case(
            reader,
            StubDetector::new(vec![]),
            TrackingPolicy::attendance(),
            dir.path(),
            None,
        );

        match uc.execute(Path::new("broken.mp4")) {
            Err(PipelineError::Input { path, reason }) => {
                assert_eq!(path, Path::new("broken.mp4"));
                assert!(reason.contains("moov"));
            }
            other => panic!("expected Input error, got {other:?}"),
        }
    }

    #[test]
    fn test_undecodable_stream_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut reader = StubReader::new(10, vec![FACE]);
        reader.corrupt = true;
        let mut uc = use_case(
            reader,
            StubDetector::new(vec![FACE]),
            TrackingPolicy::attendance(),
            dir.path(),
            None,
        );

        assert!(matches!(
            uc.execute(Path::new("corrupt.mp4")),
            Err(PipelineError::Input { .. })
        ));
    }

    #[test]
    fn test_detector_failures_are_absorbed() {
        let dir = tempfile::tempdir().unwrap();
        let mut detector = StubDetector::new(vec![FACE]);
        detector.fail_every = Some(3);
        let mut uc = use_case(
            StubReader::new(60, vec![FACE]),
            detector,
            TrackingPolicy::attendance(),
            dir.path(),
            None,
        );

        let extraction = uc.execute(Path::new("class.mp4")).unwrap();

        assert_eq!(extraction.frames_sampled, 12);
        assert_eq!(extraction.detector_failures, 4);
        assert_eq!(extraction.tracks.len(), 1);
        assert_eq!(extraction.tracks[0].frames_matched, 8);
    }

    #[test]
    fn test_progress_reports_frame_positions() {
        let dir = tempfile::tempdir().unwrap();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_cb = seen.clone();
        let mut uc = use_case(
            StubReader::new(20, vec![]),
            StubDetector::new(vec![]),
            TrackingPolicy::attendance(),
            dir.path(),
            Some(Box::new(move |current, total| {
                assert_eq!(total, 20);
                seen_cb.store(current, Ordering::SeqCst);
                true
            })),
        );

        uc.execute(Path::new("class.mp4")).unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn test_progress_returning_false_cancels() {
        let dir = tempfile::tempdir().unwrap();
        let mut uc = use_case(
            StubReader::new(100, vec![FACE]),
            StubDetector::new(vec![FACE]),
            TrackingPolicy::attendance(),
            dir.path(),
            Some(Box::new(|current, _| current < 10)),
        );

        assert!(matches!(
            uc.execute(Path::new("class.mp4")),
            Err(PipelineError::Cancelled)
        ));
    }

    #[test]
    fn test_face_limit_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let faces = vec![(10, 10, 40, 0), (120, 10, 40, 60), (230, 10, 40, 120)];
        let mut uc = ExtractFacesUseCase::new(
            Box::new(StubReader::new(10, faces.clone())),
            Box::new(StubDetector::new(faces)),
            FaceTracker::new(TrackingPolicy::attendance(), writer(), dir.path()).with_track_limit(2),
            None,
        );

        let extraction = uc.execute(Path::new("crowd.mp4")).unwrap();

        assert!(extraction.hit_face_limit);
        assert_eq!(extraction.tracks.len(), 2);
    }
}
