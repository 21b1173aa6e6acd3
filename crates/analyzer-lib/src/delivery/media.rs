//! Annotated media upload

use super::MediaStore;
use crate::error::{AnalysisError, Result};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Body returned by the storage service
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub secure_url: String,
}

/// Uploads files as raw request bodies to a storage endpoint
#[derive(Debug, Clone)]
pub struct HttpMediaStore {
    client: Client,
    upload_url: Url,
    folder: String,
}

impl HttpMediaStore {
    pub fn new(upload_url: &str, folder: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        let upload_url = Url::parse(upload_url).context("Invalid media upload URL")?;

        Ok(Self {
            client,
            upload_url,
            folder: folder.into(),
        })
    }
}

#[async_trait]
impl MediaStore for HttpMediaStore {
    async fn upload(&self, path: &Path, session_id: &str) -> Result<String> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AnalysisError::DeliveryFailure(format!("{}: {}", path.display(), e)))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("out_{}", session_id));

        let response = self
            .client
            .post(self.upload_url.clone())
            .query(&[
                ("folder", self.folder.as_str()),
                ("public_id", file_name.as_str()),
            ])
            .header("content-type", "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| AnalysisError::DeliveryFailure(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AnalysisError::DeliveryFailure(format!(
                "media store returned {}",
                response.status()
            )));
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::DeliveryFailure(format!("bad upload response: {}", e)))?;

        debug!(session_id = %session_id, url = %body.secure_url, "Annotated media uploaded");
        Ok(body.secure_url)
    }
}

/// Media store used when no upload endpoint is configured
#[derive(Debug, Clone, Default)]
pub struct DisabledMediaStore;

#[async_trait]
impl MediaStore for DisabledMediaStore {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn upload(&self, _path: &Path, _session_id: &str) -> Result<String> {
        Err(AnalysisError::DeliveryFailure(
            "media upload is not configured".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_upload_returns_secure_url() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/upload")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("folder".into(), "mma_sessions/annotated".into()),
                Matcher::UrlEncoded("public_id".into(), "out_s1.jsonl".into()),
            ]))
            .match_body("{\"timestampMs\":100}\n")
            .with_status(200)
            .with_body(r#"{"secure_url": "https://cdn.example/out_s1.jsonl"}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out_s1.jsonl");
        std::fs::write(&path, "{\"timestampMs\":100}\n").unwrap();

        let store = HttpMediaStore::new(
            &format!("{}/upload", server.url()),
            "mma_sessions/annotated",
            Duration::from_secs(5),
        )
        .unwrap();
        let url = store.upload(&path, "s1").await.unwrap();

        assert_eq!(url, "https://cdn.example/out_s1.jsonl");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", Matcher::Any)
            .with_status(401)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out_s2.jsonl");
        std::fs::write(&path, "{}\n").unwrap();

        let store = HttpMediaStore::new(&server.url(), "annotated", Duration::from_secs(5)).unwrap();
        let err = store.upload(&path, "s2").await.unwrap_err();
        assert!(matches!(err, AnalysisError::DeliveryFailure(_)));
    }

    #[tokio::test]
    async fn test_missing_file_fails_before_request() {
        let store = HttpMediaStore::new("http://127.0.0.1:9/upload", "annotated", Duration::from_secs(1))
            .unwrap();
        let err = store
            .upload(Path::new("/nonexistent/out.jsonl"), "s3")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/out.jsonl"));
    }

    #[tokio::test]
    async fn test_disabled_store() {
        assert!(!DisabledMediaStore.is_enabled());
        assert!(DisabledMediaStore.upload(Path::new("x"), "s").await.is_err());
    }
}
