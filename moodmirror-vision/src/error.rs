use std::path::PathBuf;

/// Error taxonomy of the vision layer.
///
/// The three variants map to three different recovery policies in the
/// application: `CameraAccess` and `ModelLoad` leave the feature unusable
/// and must be shown to the user, `Detection` is transient and handled
/// per cycle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("camera access failed: {0}")]
    CameraAccess(#[source] anyhow::Error),

    #[error("failed to load model {}", path.display())]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("detection failed: {0}")]
    Detection(#[source] anyhow::Error),
}

impl Error {
    /// Transient errors are retried by the caller on the next cycle;
    /// everything else is fatal to the feature.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Detection(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_is_transient() {
        assert!(Error::Detection(anyhow::anyhow!("frame read")).is_transient());
        assert!(!Error::CameraAccess(anyhow::anyhow!("denied")).is_transient());
        assert!(!Error::ModelLoad {
            path: PathBuf::from("models/face_detector.onnx"),
            source: anyhow::anyhow!("missing"),
        }
        .is_transient());
    }
}
