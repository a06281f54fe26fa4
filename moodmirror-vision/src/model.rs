//! ONNX session construction and model artifact loading.
//!
//! Three pretrained artifacts live under one base directory. They are
//! loaded together: readiness means all three sessions exist, and a failure
//! on any one fails the whole set.

use std::path::Path;

use anyhow::Context;
use ort::{
    ep::{self, ExecutionProvider},
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session,
    },
};

use crate::error::{Error, Result};

/// Artifact file names expected under the model directory.
pub const DETECTOR_FILE: &str = "face_detector.onnx";
pub const LANDMARKS_FILE: &str = "face_landmarks_68.onnx";
pub const EXPRESSION_FILE: &str = "face_expression.onnx";

pub fn session_builder() -> anyhow::Result<SessionBuilder> {
    let mut builder =
        Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;

    #[cfg(feature = "openvino")]
    {
        let ep = ep::OpenVINO::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("openvino feature is enabled, onnx runtime not compiled with openvino")
        }
    }

    #[cfg(feature = "cuda")]
    {
        let ep = ep::CUDA::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("cuda feature is enabled, onnx runtime not compiled with cuda")
        }
    }

    Ok(builder)
}

fn load_session(path: &Path) -> Result<Session> {
    let commit = || -> anyhow::Result<Session> {
        anyhow::ensure!(path.is_file(), "no such file");
        let session = session_builder()?
            .commit_from_file(path)
            .context("parsing model graph")?;
        Ok(session)
    };
    commit().map_err(|source| Error::ModelLoad {
        path: path.to_path_buf(),
        source,
    })
}

/// The detector, landmark and expression sessions, loaded as one unit.
#[derive(Debug)]
pub struct ModelSet {
    pub detector: Session,
    pub landmarks: Session,
    pub expression: Session,
}

impl ModelSet {
    /// Load all three artifacts from `dir`.
    ///
    /// This is the readiness signal the rest of the system waits on: no
    /// detection request can be issued until a `ModelSet` exists, and a
    /// `ModelSet` only exists once every artifact loaded.
    pub fn load(dir: &Path) -> Result<Self> {
        log::info!("loading models from {}", dir.display());
        let set = Self {
            detector: load_session(&dir.join(DETECTOR_FILE))?,
            landmarks: load_session(&dir.join(LANDMARKS_FILE))?,
            expression: load_session(&dir.join(EXPRESSION_FILE))?,
        };
        log::info!("all models loaded");
        Ok(set)
    }
}
