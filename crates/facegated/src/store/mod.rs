//! Persistence of (identity, embedding) rows.
//!
//! Two backends share the [`EmbeddingStore`] trait: a hosted PostgREST table
//! (Supabase) reached over HTTPS, and a local SQLite file.

mod rest;
mod sqlite;

pub use rest::RestStore;
pub use sqlite::SqliteStore;

use crate::config::{StoreBackend, StoreConfig};
use async_trait::async_trait;
use facegate_core::{Embedding, EmbeddingParseError, FaceRecord};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("store rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("sqlite: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
    #[error("malformed row {row}: {reason}")]
    Malformed { row: usize, reason: String },
    #[error("unexpected response shape: {0}")]
    UnexpectedResponse(String),
    #[error("embedding encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to create database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

/// Append-only table of face embeddings keyed by identity.
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Append one row. Earlier rows for the same identity are kept.
    async fn insert(&self, identity: &str, embedding: &Embedding) -> Result<(), StoreError>;

    /// All rows stored under `identity`, in the order the backend returns them.
    async fn find_by_identity(&self, identity: &str) -> Result<Vec<FaceRecord>, StoreError>;

    /// Short backend name for status reporting.
    fn backend_name(&self) -> &'static str;
}

/// Open the backend selected in the configuration.
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn EmbeddingStore>, StoreError> {
    match config.backend {
        StoreBackend::Rest => {
            let url = config.url.as_deref().ok_or(StoreError::NotConfigured("store url"))?;
            let key = config
                .api_key
                .as_deref()
                .ok_or(StoreError::NotConfigured("store api key"))?;
            let store = RestStore::new(url, key, &config.table, Duration::from_secs(config.timeout_secs))?;
            tracing::info!(endpoint = %store.endpoint(), "using hosted embedding table");
            Ok(Arc::new(store))
        }
        StoreBackend::Sqlite => {
            let store = SqliteStore::open(&config.db_path).await?;
            tracing::info!(path = %config.db_path.display(), "using sqlite embedding table");
            Ok(Arc::new(store))
        }
    }
}

/// The embedding column as it arrives from a backend: a native array, or a
/// string holding an array literal.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EmbeddingColumn {
    Array(Vec<f32>),
    Literal(String),
}

impl EmbeddingColumn {
    fn into_embedding(self) -> Result<Embedding, EmbeddingParseError> {
        match self {
            EmbeddingColumn::Array(values) if values.is_empty() => Err(EmbeddingParseError::Empty),
            EmbeddingColumn::Array(values) => match values.iter().position(|v| !v.is_finite()) {
                Some(index) => Err(EmbeddingParseError::InvalidComponent {
                    index,
                    value: values[index].to_string(),
                }),
                None => Ok(Embedding::new(values)),
            },
            EmbeddingColumn::Literal(text) => Embedding::from_literal(&text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<Embedding, EmbeddingParseError> {
        serde_json::from_str::<EmbeddingColumn>(json).unwrap().into_embedding()
    }

    #[test]
    fn test_column_native_array() {
        assert_eq!(parse("[0.5, -1, 2.25]").unwrap().values, vec![0.5, -1.0, 2.25]);
    }

    #[test]
    fn test_column_string_literal() {
        assert_eq!(parse(r#""[0.5, -1.0, 2.25]""#).unwrap().values, vec![0.5, -1.0, 2.25]);
    }

    #[test]
    fn test_column_rejects_out_of_range_array() {
        assert!(matches!(
            parse("[0.5, 1e300]"),
            Err(EmbeddingParseError::InvalidComponent { index: 1, .. })
        ));
    }

    #[test]
    fn test_column_rejects_empty_and_garbage() {
        assert_eq!(parse("[]"), Err(EmbeddingParseError::Empty));
        assert!(parse(r#""not an array""#).is_err());
        assert!(serde_json::from_str::<EmbeddingColumn>(r#"{"a": 1}"#).is_err());
        assert!(serde_json::from_str::<EmbeddingColumn>(r#"[1.0, null]"#).is_err());
    }
}
