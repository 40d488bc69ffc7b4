pub mod detector_settings;
pub mod face_detector;
