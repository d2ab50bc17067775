//! Stub collaborators for service and API tests.

use crate::engine::{EngineError, FaceEncoder};
use crate::store::{EmbeddingStore, StoreError};
use async_trait::async_trait;
use facegate_core::{Embedding, FaceRecord, ImageError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn face_a() -> Vec<u8> {
    b"face-a".to_vec()
}

/// Another photo of the person in [`face_a`].
pub fn face_a_again() -> Vec<u8> {
    b"face-a-again".to_vec()
}

pub fn face_b() -> Vec<u8> {
    b"face-b".to_vec()
}

/// Encoder that maps known image bytes to fixed embeddings.
///
/// `b"garbage"` is an undecodable image; any other unknown bytes contain no face.
pub struct StubEncoder {
    faces: HashMap<Vec<u8>, Vec<f32>>,
    calls: AtomicUsize,
}

impl StubEncoder {
    pub fn new() -> Self {
        let faces = HashMap::from([
            (face_a(), vec![0.9, 0.1, 0.0, 0.4]),
            (face_a_again(), vec![0.85, 0.15, 0.05, 0.45]),
            (face_b(), vec![0.0, 0.8, 0.6, 0.0]),
        ]);
        Self {
            faces,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FaceEncoder for StubEncoder {
    async fn encode(&self, image: Vec<u8>) -> Result<Embedding, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if image == b"garbage" {
            return Err(EngineError::Image(ImageError::Empty));
        }
        self.faces
            .get(&image)
            .map(|values| Embedding::new(values.clone()))
            .ok_or(EngineError::NoFaceDetected)
    }

    fn model_version(&self) -> &str {
        "stub"
    }
}

/// In-memory store that counts inserts and can be made to fail.
pub struct MemoryStore {
    rows: Mutex<Vec<FaceRecord>>,
    inserts: AtomicUsize,
    failing: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            inserts: AtomicUsize::new(0),
            failing: false,
        }
    }

    /// Every call fails with a 503 rejection.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new()
        }
    }

    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    fn unavailable() -> StoreError {
        StoreError::Rejected {
            status: 503,
            body: "service unavailable".into(),
        }
    }
}

#[async_trait]
impl EmbeddingStore for MemoryStore {
    async fn insert(&self, identity: &str, embedding: &Embedding) -> Result<(), StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(Self::unavailable());
        }
        self.rows.lock().unwrap().push(FaceRecord {
            id: None,
            identity: identity.to_string(),
            embedding: embedding.clone(),
            created_at: None,
        });
        Ok(())
    }

    async fn find_by_identity(&self, identity: &str) -> Result<Vec<FaceRecord>, StoreError> {
        if self.failing {
            return Err(Self::unavailable());
        }
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.identity == identity)
            .cloned()
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
