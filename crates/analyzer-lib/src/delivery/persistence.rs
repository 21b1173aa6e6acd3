//! Persistence service client

use super::PersistenceClient;
use crate::error::{AnalysisError, Result};
use crate::models::AnalysisResult;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// PATCHes results to `<base_url>/<session_id>/results`
#[derive(Debug, Clone)]
pub struct HttpPersistenceClient {
    client: Client,
    base_url: Url,
}

impl HttpPersistenceClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid persistence URL")?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Invalid persistence URL: {} has no path", base_url);
        }

        Ok(Self { client, base_url })
    }

    /// Endpoint for one session's results.
    ///
    /// The session ID is appended as a single percent-encoded path segment,
    /// so it can never change the host or leave the base path.
    pub fn results_url(&self, session_id: &str) -> Result<Url> {
        if matches!(session_id, "" | "." | "..") {
            return Err(AnalysisError::DeliveryFailure(format!(
                "invalid session ID {:?}",
                session_id
            )));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| AnalysisError::DeliveryFailure(format!("{} has no path", self.base_url)))?
            .pop_if_empty()
            .push(session_id)
            .push("results");
        Ok(url)
    }
}

#[async_trait]
impl PersistenceClient for HttpPersistenceClient {
    async fn deliver(&self, session_id: &str, result: &AnalysisResult) -> Result<()> {
        let url = self.results_url(session_id)?;

        let response = self
            .client
            .patch(url.clone())
            .json(result)
            .send()
            .await
            .map_err(|e| AnalysisError::DeliveryFailure(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::DeliveryFailure(format!(
                "persistence service returned {}: {}",
                status, body
            )));
        }

        debug!(session_id = %session_id, url = %url, "Results delivered");
        Ok(())
    }
}

/// Accepts and drops results; for callers that consume them directly
#[derive(Debug, Clone, Default)]
pub struct DiscardingPersistence;

#[async_trait]
impl PersistenceClient for DiscardingPersistence {
    async fn deliver(&self, session_id: &str, _result: &AnalysisResult) -> Result<()> {
        debug!(session_id = %session_id, "Discarding results");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalysisSummary, SessionMetrics};
    use mockito::Matcher;

    fn client(base: &str) -> HttpPersistenceClient {
        HttpPersistenceClient::new(base, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_results_url_keeps_base_path() {
        let c = client("http://127.0.0.1:5000/api/sessions");
        assert_eq!(
            c.results_url("abc123").unwrap().as_str(),
            "http://127.0.0.1:5000/api/sessions/abc123/results"
        );
    }

    #[test]
    fn test_results_url_with_trailing_slash() {
        let c = client("http://127.0.0.1:5000/api/sessions/");
        assert_eq!(
            c.results_url("abc123").unwrap().as_str(),
            "http://127.0.0.1:5000/api/sessions/abc123/results"
        );
    }

    #[test]
    fn test_session_id_cannot_escape_base_path() {
        let c = client("http://127.0.0.1:5000/api/sessions");

        for id in ["http://evil.example/steal", "../../admin", "abc?x=1#", "a/b"] {
            let url = c.results_url(id).unwrap();
            assert_eq!(url.host_str(), Some("127.0.0.1"), "{}", id);
            assert_eq!(url.port(), Some(5000));
            assert!(url.query().is_none(), "{}", id);
            assert!(url.fragment().is_none(), "{}", id);

            let segments: Vec<&str> = url.path_segments().unwrap().collect();
            assert_eq!(segments.len(), 4, "{}", url);
            assert_eq!(&segments[..2], ["api", "sessions"]);
            assert_eq!(segments[3], "results");
        }

        assert_eq!(
            c.results_url("../../admin").unwrap().path(),
            "/api/sessions/..%2F..%2Fadmin/results"
        );
    }

    #[test]
    fn test_dot_segments_rejected() {
        let c = client("http://127.0.0.1:5000/api/sessions");
        for id in ["", ".", ".."] {
            assert!(matches!(
                c.results_url(id),
                Err(AnalysisError::DeliveryFailure(_))
            ));
        }
    }

    #[test]
    fn test_base_without_path_rejected() {
        assert!(HttpPersistenceClient::new("mailto:ops@example.com", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_patches_failed_status() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PATCH", "/api/sessions/s-1/results")
            .match_body(Matcher::Json(serde_json::json!({ "status": "failed" })))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let c = client(&format!("{}/api/sessions", server.url()));
        c.deliver("s-1", &AnalysisResult::failed()).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_patches_completed_result() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PATCH", "/api/sessions/s-2/results")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "status": "completed",
                "metrics": { "guardStability": 90, "accuracyScore": 85 },
                "annotatedVideoUrl": ""
            })))
            .with_status(204)
            .create_async()
            .await;

        let result = AnalysisResult::completed(
            SessionMetrics {
                guard_stability: 90,
                takedown_speed: 10,
                strike_volume: 150,
                accuracy_score: 85,
            },
            Vec::new(),
            AnalysisSummary::default(),
            String::new(),
        );

        let c = client(&format!("{}/api/sessions", server.url()));
        c.deliver("s-2", &result).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_is_delivery_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("PATCH", "/api/sessions/s-3/results")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let c = client(&format!("{}/api/sessions", server.url()));
        let err = c.deliver("s-3", &AnalysisResult::failed()).await.unwrap_err();

        assert!(matches!(err, AnalysisError::DeliveryFailure(_)));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_delivery_failure() {
        // Port 9 (discard) is not expected to accept HTTP
        let c = HttpPersistenceClient::new("http://127.0.0.1:9/api", Duration::from_millis(500))
            .unwrap();
        let err = c.deliver("s-4", &AnalysisResult::failed()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::DeliveryFailure(_)));
    }
}
