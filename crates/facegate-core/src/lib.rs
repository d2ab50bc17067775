//! facegate-core: face detection, embedding and matching.
//!
//! Decodes uploaded images, finds the primary face with SCRFD, aligns it and
//! extracts an ArcFace embedding, both via ONNX Runtime on the CPU. The
//! [`Matcher`] decides whether a probe embedding matches stored records.

pub mod alignment;
pub mod detector;
pub mod frame;
pub mod matcher;
pub mod recognizer;
pub mod types;

use std::path::PathBuf;

pub use detector::{primary_face, DetectorError, FaceDetector};
pub use frame::{ImageError, RgbFrame};
pub use matcher::{latest_per_identity, FirstMatchMatcher, MatchOutcome, Matcher, DEFAULT_SIMILARITY_THRESHOLD};
pub use recognizer::{FaceRecognizer, RecognizerError, EMBEDDING_MODEL_VERSION};
pub use types::{BoundingBox, Embedding, EmbeddingParseError, FaceRecord};

/// File name of the SCRFD detection model inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// File name of the ArcFace recognition model inside the model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

/// Default model directory: `$XDG_DATA_HOME/facegate/models`, falling back to
/// `~/.local/share/facegate/models`.
pub fn default_model_dir() -> PathBuf {
    default_data_dir().join("models")
}

/// Default data directory for facegate state.
pub fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facegate")
}
