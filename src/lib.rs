pub mod config;
pub mod mapper;
pub mod tracker;
pub mod ui;

// Re-export vision types for convenience
pub use moodmirror_vision::{
    draw, expression, face, model, pipeline, video, Analyzer, Camera, Expression, FaceAnalysis,
};
