pub mod draw;
pub mod error;
pub mod expression;
pub mod face;
pub mod model;
pub mod pipeline;
pub mod video;

// Re-export commonly used types
pub use error::{Error, Result};
pub use expression::{Expression, ExpressionScores};
pub use face::{Detection, DetectorOptions, Dimensions, FaceAnalysis, FaceBox, Point};
pub use model::ModelSet;
pub use pipeline::Analyzer;
pub use video::Camera;
