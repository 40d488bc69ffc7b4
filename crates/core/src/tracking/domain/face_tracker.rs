use std::path::{Path, PathBuf};

use crate::shared::constants::CROP_SIZE;
use crate::shared::detection::Detection;
use crate::shared::frame::Frame;
use crate::video::domain::image_writer::ImageWriter;

use super::sharpness::laplacian_variance;
use super::tracking_policy::TrackingPolicy;

/// A track that survived to the end of its life with enough matched frames.
#[derive(Clone, Debug, PartialEq)]
pub struct FinalizedTrack {
    pub id: u32,
    /// Best crop seen for this track; the only file kept for it.
    pub crop_path: PathBuf,
    pub best_sharpness: f64,
    pub frames_matched: usize,
    pub first_frame: usize,
    pub last_frame: usize,
}

#[derive(Debug)]
struct Track {
    id: u32,
    center: (f64, f64),
    best_sharpness: f64,
    crop_path: PathBuf,
    frames_matched: usize,
    first_frame: usize,
    last_frame: usize,
    /// Ordinal of the sampled frame that last matched this track.
    last_sample: usize,
}

/// Greedy nearest-center tracker.
///
/// Turns per-frame detections into a few long-lived tracks so a person
/// seen across many frames yields one crop rather than hundreds. Each
/// track keeps only its sharpest crop, stored as `<faces_dir>/<id>.jpg`.
pub struct FaceTracker {
    policy: TrackingPolicy,
    writer: Box<dyn ImageWriter>,
    faces_dir: PathBuf,
    active: Vec<Track>,
    finished: Vec<FinalizedTrack>,
    finalized: usize,
    next_id: u32,
    samples_seen: usize,
    track_limit: Option<usize>,
    limit_reported: bool,
}

impl FaceTracker {
    pub fn new(policy: TrackingPolicy, writer: Box<dyn ImageWriter>, faces_dir: &Path) -> Self {
        Self {
            policy,
            writer,
            faces_dir: faces_dir.to_path_buf(),
            active: Vec::new(),
            finished: Vec::new(),
            finalized: 0,
            next_id: 0,
            samples_seen: 0,
            track_limit: None,
            limit_reported: false,
        }
    }

    /// Stops creating new tracks once `limit` tracks exist. Existing tracks
    /// keep being updated.
    pub fn with_track_limit(mut self, limit: usize) -> Self {
        self.track_limit = Some(limit);
        self
    }

    pub fn policy(&self) -> &TrackingPolicy {
        &self.policy
    }

    pub fn tracks_created(&self) -> usize {
        self.next_id as usize
    }

    pub fn finalized_count(&self) -> usize {
        self.finalized
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn at_track_limit(&self) -> bool {
        self.track_limit
            .is_some_and(|limit| self.tracks_created() >= limit)
    }

    /// Feeds one frame's detections. Frames off the sampling grid are ignored.
    pub fn observe(&mut self, frame: &Frame, detections: &[Detection]) {
        if !self.policy.is_sampled(frame.index()) {
            return;
        }
        self.samples_seen += 1;

        let mut matched = vec![false; self.active.len()];
        for detection in detections {
            if !self.policy.plausible_shape(detection) {
                log::debug!(
                    "frame {}: dropping box with aspect ratio {:.2}",
                    frame.index(),
                    detection.aspect_ratio()
                );
                continue;
            }

            let crop = frame.crop(detection);
            if crop.is_empty() {
                continue;
            }
            let sharpness = laplacian_variance(&crop.to_gray());
            if !self.policy.sharp_enough(sharpness) {
                log::debug!(
                    "frame {}: dropping blurry crop (sharpness {sharpness:.1})",
                    frame.index()
                );
                continue;
            }

            let center = detection.center();
            let radius = self.policy.association_radius(detection);
            match self.nearest_unmatched(center, radius, &matched) {
                Some(i) => {
                    matched[i] = true;
                    self.update(i, frame, detection, center, sharpness);
                }
                None => {
                    if let Some(track) = self.spawn(frame, detection, center, sharpness) {
                        self.active.push(track);
                        matched.push(true);
                    }
                }
            }
        }

        self.sweep(matched);
    }

    /// Closes every remaining track and returns all finalized tracks in id
    /// order. The tracker is empty afterwards.
    pub fn finish(&mut self) -> Vec<FinalizedTrack> {
        for track in std::mem::take(&mut self.active) {
            self.close(track);
        }
        let mut tracks = std::mem::take(&mut self.finished);
        tracks.sort_by_key(|t| t.id);
        tracks
    }

    fn nearest_unmatched(&self, center: (f64, f64), radius: f64, matched: &[bool]) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, track) in self.active.iter().enumerate() {
            if matched[i] {
                continue;
            }
            let dist = (track.center.0 - center.0).hypot(track.center.1 - center.1);
            if dist > radius {
                continue;
            }
            if best.map_or(true, |(_, d)| dist < d) {
                best = Some((i, dist));
            }
        }
        best.map(|(i, _)| i)
    }

    fn update(
        &mut self,
        index: usize,
        frame: &Frame,
        detection: &Detection,
        center: (f64, f64),
        sharpness: f64,
    ) {
        let track = &mut self.active[index];
        track.center = center;
        track.frames_matched += 1;
        track.last_frame = frame.index();
        track.last_sample = self.samples_seen;

        if sharpness > track.best_sharpness {
            match write_crop(self.writer.as_ref(), &track.crop_path, frame, detection) {
                Ok(()) => track.best_sharpness = sharpness,
                Err(e) => log::warn!("track {}: failed to replace crop: {e}", track.id),
            }
        }
    }

    fn spawn(
        &mut self,
        frame: &Frame,
        detection: &Detection,
        center: (f64, f64),
        sharpness: f64,
    ) -> Option<Track> {
        if self.at_track_limit() {
            if !self.limit_reported {
                log::warn!(
                    "Face limit of {} reached at frame {}; no new tracks will be created",
                    self.tracks_created(),
                    frame.index()
                );
                self.limit_reported = true;
            }
            return None;
        }

        let id = self.next_id;
        let crop_path = self.faces_dir.join(format!("{id}.jpg"));
        if let Err(e) = write_crop(self.writer.as_ref(), &crop_path, frame, detection) {
            log::warn!("frame {}: failed to store new face crop: {e}", frame.index());
            return None;
        }
        self.next_id += 1;

        Some(Track {
            id,
            center,
            best_sharpness: sharpness,
            crop_path,
            frames_matched: 1,
            first_frame: frame.index(),
            last_frame: frame.index(),
            last_sample: self.samples_seen,
        })
    }

    fn sweep(&mut self, matched: Vec<bool>) {
        let mut kept = Vec::with_capacity(self.active.len());
        for (track, was_matched) in std::mem::take(&mut self.active).into_iter().zip(matched) {
            let stale = self.samples_seen - track.last_sample > self.policy.max_stale_frames;
            if !was_matched && stale {
                self.close(track);
            } else {
                kept.push(track);
            }
        }
        self.active = kept;
    }

    fn close(&mut self, track: Track) {
        if track.frames_matched >= self.policy.min_track_frames {
            log::debug!(
                "track {} finalized after {} frames",
                track.id,
                track.frames_matched
            );
            self.finalized += 1;
            self.finished.push(FinalizedTrack {
                id: track.id,
                crop_path: track.crop_path,
                best_sharpness: track.best_sharpness,
                frames_matched: track.frames_matched,
                first_frame: track.first_frame,
                last_frame: track.last_frame,
            });
            return;
        }

        log::debug!(
            "track {} dropped as noise ({} frames)",
            track.id,
            track.frames_matched
        );
        if let Err(e) = std::fs::remove_file(&track.crop_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("failed to remove {}: {e}", track.crop_path.display());
            }
        }
    }
}

fn write_crop(
    writer: &dyn ImageWriter,
    path: &Path,
    frame: &Frame,
    detection: &Detection,
) -> Result<(), Box<dyn std::error::Error>> {
    let crop = frame.square_crop(detection);
    if crop.is_empty() {
        return Err("empty crop".into());
    }
    writer.write(path, &crop, Some((CROP_SIZE, CROP_SIZE)))
}
