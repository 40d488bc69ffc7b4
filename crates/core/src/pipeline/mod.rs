pub mod config;
pub mod error;
pub mod extract_faces_use_case;
pub mod input;
pub mod register_faces_use_case;
pub mod scratch_space;
pub mod take_attendance_use_case;
