//! Register and recognize operations over the encoder and the store.

use crate::engine::{EngineError, FaceEncoder};
use crate::store::{EmbeddingStore, StoreError};
use facegate_core::{latest_per_identity, FirstMatchMatcher, ImageError, MatchOutcome, Matcher};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("invalid image: {0}")]
    InvalidImage(ImageError),
    #[error("no face detected")]
    NoFaceDetected,
    #[error("identity not registered")]
    NotRegistered,
    #[error("{0}")]
    Storage(#[from] StoreError),
    #[error("{0}")]
    Inference(EngineError),
}

impl From<EngineError> for ServiceError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Image(e) => ServiceError::InvalidImage(e),
            EngineError::NoFaceDetected => ServiceError::NoFaceDetected,
            other => ServiceError::Inference(other),
        }
    }
}

/// Normalized identity key: a trimmed, lower-cased email address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(String);

impl Identity {
    /// Returns `None` when nothing is left after trimming.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub struct FaceService {
    encoder: Arc<dyn FaceEncoder>,
    store: Arc<dyn EmbeddingStore>,
    threshold: f32,
}

impl FaceService {
    pub fn new(encoder: Arc<dyn FaceEncoder>, store: Arc<dyn EmbeddingStore>, threshold: f32) -> Self {
        Self {
            encoder,
            store,
            threshold,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn model_version(&self) -> &str {
        self.encoder.model_version()
    }

    pub fn store_backend(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Embed the face in `image` and store it under `identity`.
    ///
    /// Nothing is written unless a face was found and embedded.
    pub async fn register(&self, identity: &Identity, image: Vec<u8>) -> Result<(), ServiceError> {
        let embedding = self.encoder.encode(image).await?;
        self.store.insert(identity.as_str(), &embedding).await?;

        tracing::info!(identity = identity.as_str(), dim = embedding.len(), "face registered");
        Ok(())
    }

    /// Compare the face in `image` against the face stored for `identity`.
    ///
    /// Only the claimed identity is a candidate, so this verifies a claim
    /// rather than searching every registered face. When the identity was
    /// registered more than once, its most recent row is the reference. An
    /// identity with no rows fails before any inference runs.
    pub async fn recognize(&self, identity: &Identity, image: Vec<u8>) -> Result<MatchOutcome, ServiceError> {
        let rows = self.store.find_by_identity(identity.as_str()).await?;
        if rows.is_empty() {
            return Err(ServiceError::NotRegistered);
        }
        let stored = rows.len();
        let gallery = latest_per_identity(rows);

        let probe = self.encoder.encode(image).await?;
        let outcome = FirstMatchMatcher.compare(&probe, &gallery, self.threshold);

        match &outcome {
            MatchOutcome::Match { similarity, .. } => tracing::info!(
                identity = identity.as_str(),
                candidates = gallery.len(),
                stored,
                similarity,
                "face recognized"
            ),
            MatchOutcome::Unknown => tracing::info!(
                identity = identity.as_str(),
                candidates = gallery.len(),
                stored,
                "face not recognized"
            ),
        }

        Ok(outcome)
    }
}
