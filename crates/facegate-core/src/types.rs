use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum EmbeddingParseError {
    #[error("embedding literal must be enclosed in [] or {{}}: {0:?}")]
    Unbracketed(String),
    #[error("embedding literal is empty")]
    Empty,
    #[error("invalid embedding component {index}: {value:?}")]
    InvalidComponent { index: usize, value: String },
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Cosine similarity between two embeddings, in [-1, 1].
    ///
    /// Zero-norm inputs and mismatched lengths yield 0.0. Use [`Embedding::cosine`]
    /// to tell those pairs apart from a genuine 0.0.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        self.cosine(other).unwrap_or(0.0)
    }

    /// Cosine similarity, or `None` when the pair has no defined direction to
    /// compare (a zero-norm side or mismatched lengths).
    pub fn cosine(&self, other: &Embedding) -> Option<f32> {
        if self.values.len() != other.values.len() {
            return None;
        }

        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        (denom > 0.0).then(|| (dot / denom).clamp(-1.0, 1.0))
    }

    /// Parse a string-encoded array literal such as `"[0.1, -0.2, 0.3]"`.
    ///
    /// Postgres array text (`"{0.1,-0.2,0.3}"`) is accepted as well. Every
    /// component must be a finite number.
    pub fn from_literal(literal: &str) -> Result<Self, EmbeddingParseError> {
        let trimmed = literal.trim();
        let inner = trimmed
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .or_else(|| trimmed.strip_prefix('{').and_then(|s| s.strip_suffix('}')))
            .ok_or_else(|| EmbeddingParseError::Unbracketed(truncate(trimmed)))?;

        if inner.trim().is_empty() {
            return Err(EmbeddingParseError::Empty);
        }

        let values = inner
            .split(',')
            .enumerate()
            .map(|(index, part)| {
                let part = part.trim();
                part.parse::<f32>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| EmbeddingParseError::InvalidComponent {
                        index,
                        value: truncate(part),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(values))
    }
}

fn truncate(s: &str) -> String {
    s.chars().take(32).collect()
}

/// A stored (identity, embedding) row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceRecord {
    /// Store-assigned row id, if the backend reports one.
    pub id: Option<String>,
    /// Identity key (a normalized email address).
    pub identity: String,
    pub embedding: Embedding,
    pub created_at: Option<String>,
}
