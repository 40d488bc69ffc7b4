use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::attendance::domain::voter::VotingPolicy;
use crate::detection::domain::detector_settings::DetectorSettings;
use crate::recognition::domain::cluster_engine::ClusteringConfig;
use crate::shared::constants::MAX_FACES;
use crate::tracking::domain::tracking_policy::TrackingPolicy;

use super::error::PipelineError;

pub const DEFAULT_ATTENDANCE_MIN_SHARPNESS: f64 = 15.0;

/// Everything a run needs to know, passed explicitly to each component.
///
/// Every field has a default, so a config file only needs the keys it
/// changes. Tracking policies are replaced whole when present.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub detector: DetectorSettings,
    pub registration_tracking: TrackingPolicy,
    pub attendance_tracking: TrackingPolicy,
    pub clustering: ClusteringConfig,
    pub voting: VotingPolicy,
    /// Attendance crops below this sharpness are not embedded.
    pub attendance_min_sharpness: f64,
    pub max_faces: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detector: DetectorSettings::default(),
            registration_tracking: TrackingPolicy::registration(),
            attendance_tracking: TrackingPolicy::attendance(),
            clustering: ClusteringConfig::default(),
            voting: VotingPolicy::default(),
            attendance_min_sharpness: DEFAULT_ATTENDANCE_MIN_SHARPNESS,
            max_faces: MAX_FACES,
        }
    }
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Detector settings for a run tracked with `policy`. Strict-quality runs
    /// (registration by default) get the strict confidence and size floors.
    pub fn detector_for(&self, policy: &TrackingPolicy) -> DetectorSettings {
        self.detector.clone().with_strict_quality(policy.strict_quality)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let fail = |msg: &str| Err(PipelineError::Config(msg.to_string()));

        for (name, policy) in [
            ("registration_tracking", &self.registration_tracking),
            ("attendance_tracking", &self.attendance_tracking),
        ] {
            if policy.frame_stride == 0 {
                return fail(&format!("{name}.frame_stride must be at least 1"));
            }
            if policy.min_track_frames == 0 {
                return fail(&format!("{name}.min_track_frames must be at least 1"));
            }
            if !(policy.min_aspect_ratio > 0.0 && policy.min_aspect_ratio <= policy.max_aspect_ratio) {
                return fail(&format!("{name}: aspect ratio band is empty"));
            }
            if policy.association_radius_factor <= 0.0 {
                return fail(&format!("{name}.association_radius_factor must be positive"));
            }
        }
        if !(self.clustering.eps > 0.0 && self.clustering.eps <= 2.0) {
            return fail("clustering.eps must be within (0, 2]");
        }
        if self.clustering.min_samples == 0 {
            return fail("clustering.min_samples must be at least 1");
        }
        if !(self.voting.accept_threshold > 0.0 && self.voting.accept_threshold <= 2.0) {
            return fail("voting.accept_threshold must be within (0, 2]");
        }
        if self.voting.min_votes == 0 {
            return fail("voting.min_votes must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.detector.min_confidence) {
            return fail("detector.min_confidence must be within [0, 1]");
        }
        if self.max_faces == 0 {
            return fail("max_faces must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detector_settings::DetectorStrategy;
    use std::io::Write;

    fn write_config(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.clustering.eps, 0.40);
        assert_eq!(config.clustering.min_samples, 2);
        assert_eq!(config.voting.accept_threshold, 0.40);
        assert_eq!(config.voting.min_votes, 1);
        assert_eq!(config.registration_tracking.min_track_frames, 3);
        assert_eq!(config.attendance_tracking.min_track_frames, 1);
        assert_eq!(config.max_faces, 2000);
    }

    #[test]
    fn test_registration_detector_is_stricter_than_attendance() {
        use crate::shared::detection::Detection;

        let config = PipelineConfig::default();
        let registration = config.detector_for(&config.registration_tracking);
        let attendance = config.detector_for(&config.attendance_tracking);

        let small = Detection::new(10.0, 10.0, 30.0, 30.0, Some(0.9)).unwrap();
        let weak = Detection::new(10.0, 10.0, 60.0, 60.0, Some(0.55)).unwrap();
        for detection in [&small, &weak] {
            assert!(!registration.accepts(detection));
            assert!(attendance.accepts(detection));
        }
        assert_eq!(registration.strategy, attendance.strategy);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let file = write_config(
            r#"{"voting": {"min_votes": 3}, "detector": {"strategy": "lightweight"}}"#,
        );
        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.voting.min_votes, 3);
        assert_eq!(config.voting.accept_threshold, 0.40);
        assert_eq!(config.detector.strategy, DetectorStrategy::Lightweight);
        assert_eq!(config.detector.min_face_size, 20.0);
        assert_eq!(config.clustering, ClusteringConfig::default());
    }

    #[test]
    fn test_round_trips_through_json() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let file = write_config(&json);
        assert_eq!(PipelineConfig::from_file(file.path()).unwrap(), config);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let file = write_config(r#"{"clustering": {"eps": 0.0}}"#);
        assert!(matches!(
            PipelineConfig::from_file(file.path()),
            Err(PipelineError::Config(_))
        ));

        let mut config = PipelineConfig::default();
        config.attendance_tracking.frame_stride = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let file = write_config("{ not json");
        assert!(matches!(
            PipelineConfig::from_file(file.path()),
            Err(PipelineError::Config(_))
        ));
    }
}
