pub mod face_tracker;
pub mod sharpness;
pub mod tracking_policy;
