pub mod cluster_engine;
pub mod embedding;
pub mod face_embedder;
pub mod matcher;
pub mod roster;
