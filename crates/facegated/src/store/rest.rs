use super::{EmbeddingColumn, EmbeddingStore, StoreError};
use async_trait::async_trait;
use facegate_core::{Embedding, FaceRecord};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Column holding the identity key.
const IDENTITY_COLUMN: &str = "email";

/// Hosted PostgREST table (the Supabase REST interface).
pub struct RestStore {
    client: Client,
    endpoint: String,
    api_key: String,
}

#[derive(Serialize)]
struct NewRow<'a> {
    email: &'a str,
    embedding: &'a [f32],
}

#[derive(Debug, Deserialize)]
struct RestRow {
    #[serde(default)]
    id: Option<serde_json::Value>,
    email: String,
    embedding: EmbeddingColumn,
    #[serde(default)]
    created_at: Option<String>,
}

impl RestStore {
    pub fn new(base_url: &str, api_key: &str, table: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/rest/v1/{}", base_url.trim_end_matches('/'), table),
            api_key: api_key.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }
}

/// Turn a non-2xx response into [`StoreError::Rejected`] with its body.
async fn check_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Rejected {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl EmbeddingStore for RestStore {
    async fn insert(&self, identity: &str, embedding: &Embedding) -> Result<(), StoreError> {
        let body = NewRow {
            email: identity,
            embedding: &embedding.values,
        };

        let response = self
            .authorized(self.client.post(&self.endpoint))
            .header("Prefer", "return=minimal")
            .json(&body)
            .send()
            .await?;
        check_status(response).await?;

        tracing::debug!(identity, dim = embedding.len(), "row inserted");
        Ok(())
    }

    async fn find_by_identity(&self, identity: &str) -> Result<Vec<FaceRecord>, StoreError> {
        let filter = format!("eq.{identity}");
        let response = self
            .authorized(self.client.get(&self.endpoint))
            .query(&[("select", "*"), (IDENTITY_COLUMN, filter.as_str())])
            .send()
            .await?;
        let text = check_status(response).await?.text().await?;

        let rows: Vec<RestRow> =
            serde_json::from_str(&text).map_err(|e| StoreError::UnexpectedResponse(e.to_string()))?;

        let records = rows
            .into_iter()
            .enumerate()
            .map(|(row, r)| {
                let embedding = r.embedding.into_embedding().map_err(|e| StoreError::Malformed {
                    row,
                    reason: e.to_string(),
                })?;
                Ok(FaceRecord {
                    id: r.id.map(|v| match v {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    }),
                    identity: r.email,
                    embedding,
                    created_at: r.created_at,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        tracing::debug!(identity, rows = records.len(), "rows fetched");
        Ok(records)
    }

    fn backend_name(&self) -> &'static str {
        "rest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    const KEY: &str = "test-key";
    const PATH: &str = "/rest/v1/face_embeddings";

    fn store(server: &mockito::ServerGuard) -> RestStore {
        RestStore::new(&server.url(), KEY, "face_embeddings", Duration::from_secs(5)).unwrap()
    }

    fn identity_query() -> Matcher {
        Matcher::AllOf(vec![
            Matcher::UrlEncoded("select".into(), "*".into()),
            Matcher::UrlEncoded("email".into(), "eq.a@x.com".into()),
        ])
    }

    #[tokio::test]
    async fn test_insert_sends_row_with_credentials() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", PATH)
            .match_header("apikey", KEY)
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::Json(json!({
                "email": "a@x.com",
                "embedding": [0.5, -0.25],
            })))
            .with_status(201)
            .create_async()
            .await;

        store(&server)
            .insert("a@x.com", &Embedding::new(vec![0.5, -0.25]))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_insert_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", PATH)
            .with_status(401)
            .with_body(r#"{"message":"Invalid API key"}"#)
            .create_async()
            .await;

        let err = store(&server)
            .insert("a@x.com", &Embedding::new(vec![1.0]))
            .await
            .unwrap_err();
        match err {
            StoreError::Rejected { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("Invalid API key"));
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_find_accepts_array_and_string_columns() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", PATH)
            .match_query(identity_query())
            .match_header("apikey", KEY)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!([
                    {"id": 7, "email": "a@x.com", "embedding": [1.0, 0.0], "created_at": "2025-04-25T10:00:00Z"},
                    {"id": "b2", "email": "a@x.com", "embedding": "[0.0, 1.0]"},
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let records = store(&server).find_by_identity("a@x.com").await.unwrap();
        mock.assert_async().await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id.as_deref(), Some("7"));
        assert_eq!(records[0].embedding.values, vec![1.0, 0.0]);
        assert_eq!(records[0].created_at.as_deref(), Some("2025-04-25T10:00:00Z"));
        assert_eq!(records[1].id.as_deref(), Some("b2"));
        assert_eq!(records[1].embedding.values, vec![0.0, 1.0]);
        assert!(records.iter().all(|r| r.identity == "a@x.com"));
    }

    #[tokio::test]
    async fn test_find_empty() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", PATH)
            .match_query(identity_query())
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        assert!(store(&server).find_by_identity("a@x.com").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_malformed_embedding() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", PATH)
            .match_query(identity_query())
            .with_status(200)
            .with_body(
                json!([
                    {"email": "a@x.com", "embedding": [1.0]},
                    {"email": "a@x.com", "embedding": "oops"},
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let err = store(&server).find_by_identity("a@x.com").await.unwrap_err();
        assert!(matches!(err, StoreError::Malformed { row: 1, .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_find_server_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", PATH)
            .match_query(identity_query())
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let err = store(&server).find_by_identity("a@x.com").await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected { status: 500, .. }));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let store = RestStore::new("https://xyz.supabase.co/", KEY, "faces", Duration::from_secs(1)).unwrap();
        assert_eq!(store.endpoint(), "https://xyz.supabase.co/rest/v1/faces");
    }

    #[tokio::test]
    async fn test_find_wrong_response_shape() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", PATH)
            .match_query(identity_query())
            .with_status(200)
            .with_body(
                json!([
                    {"email": "a@x.com", "embedding": [1.0]},
                    {"email": "a@x.com", "embedding": [1.0]},
                    {"email": null, "embedding": [1.0]},
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let err = store(&server).find_by_identity("a@x.com").await.unwrap_err();
        assert!(matches!(err, StoreError::UnexpectedResponse(_)), "got {err:?}");
    }
}
