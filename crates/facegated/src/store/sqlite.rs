use super::{EmbeddingStore, StoreError};
use async_trait::async_trait;
use facegate_core::{Embedding, FaceRecord};
use std::path::Path;
use tokio_rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS face_embeddings (
    id          TEXT PRIMARY KEY,
    email       TEXT NOT NULL,
    embedding   TEXT NOT NULL,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_face_embeddings_email ON face_embeddings(email);
";

/// Embedding table in a local SQLite file. Embeddings are stored as text
/// array literals, the same shape the hosted table may return.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path).await?).await
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory().await?).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|c| {
            c.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl EmbeddingStore for SqliteStore {
    async fn insert(&self, identity: &str, embedding: &Embedding) -> Result<(), StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = chrono::Utc::now().to_rfc3339();
        let literal = serde_json::to_string(&embedding.values)?;
        let email = identity.to_string();

        self.conn
            .call(move |c| {
                c.execute(
                    "INSERT INTO face_embeddings (id, email, embedding, created_at) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![id, email, literal, created_at],
                )?;
                Ok(())
            })
            .await?;

        tracing::debug!(identity, dim = embedding.len(), "row inserted");
        Ok(())
    }

    async fn find_by_identity(&self, identity: &str) -> Result<Vec<FaceRecord>, StoreError> {
        let email = identity.to_string();
        let rows = self
            .conn
            .call(move |c| {
                let mut stmt = c.prepare(
                    "SELECT id, email, embedding, created_at FROM face_embeddings
                     WHERE email = ?1 ORDER BY rowid",
                )?;
                let rows = stmt
                    .query_map([email], |r| {
                        Ok((
                            r.get::<_, String>(0)?,
                            r.get::<_, String>(1)?,
                            r.get::<_, String>(2)?,
                            r.get::<_, String>(3)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .enumerate()
            .map(|(row, (id, email, literal, created_at))| {
                let embedding = Embedding::from_literal(&literal).map_err(|e| StoreError::Malformed {
                    row,
                    reason: e.to_string(),
                })?;
                Ok(FaceRecord {
                    id: Some(id),
                    identity: email,
                    embedding,
                    created_at: Some(created_at),
                })
            })
            .collect()
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
