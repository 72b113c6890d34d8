use crate::errors::AppError;
use crate::models::SourceDocument;
use failsafe::{backoff, failure_policy, StateMachine};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

type SearchBreaker = StateMachine<failure_policy::ConsecutiveFailures<backoff::Exponential>, ()>;

/// Client for the semantic-adapter search endpoint.
///
/// Retrieval is best-effort and untrusted: the call carries a bounded
/// timeout, sits behind a circuit breaker, and degrades to an empty result
/// set on any fault. It can never fail a chat turn.
pub struct SemanticSearchClient {
    client: reqwest::Client,
    base_url: String,
    top_k: usize,
    breaker: SearchBreaker,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SourceDocument>,
}

impl SemanticSearchClient {
    /// Creates a new `SemanticSearchClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the semantic adapter.
    /// * `top_k` - Number of snippets requested per query.
    /// * `timeout_secs` - Hard timeout on the search request.
    pub fn new(base_url: String, top_k: usize, timeout_secs: u64) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create search client: {}", e))
            })?;

        // Open after 5 consecutive failures, retry with 10s-60s backoff
        let breaker = failsafe::Config::new()
            .failure_policy(failure_policy::consecutive_failures(
                5,
                backoff::exponential(Duration::from_secs(10), Duration::from_secs(60)),
            ))
            .build();

        Ok(Self {
            client,
            base_url,
            top_k,
            breaker,
        })
    }

    /// Raw search call. Errors here are the caller's problem; the turn
    /// pipeline goes through `search_or_empty` instead.
    pub async fn search(
        &self,
        query_text: &str,
        client_id: &str,
    ) -> Result<Vec<SourceDocument>, AppError> {
        let url = format!("{}/api/v1/search", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "query_text": query_text,
                "client_id": client_id,
                "top_k": self.top_k,
            }))
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Search request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Semantic adapter returned {}: {}",
                status, error_text
            )));
        }

        let data: SearchResponse = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse search response: {}", e))
        })?;

        Ok(data.results)
    }

    /// Best-effort retrieval: any error, timeout, or open circuit yields an
    /// empty context set.
    pub async fn search_or_empty(&self, query_text: &str, client_id: &str) -> Vec<SourceDocument> {
        use failsafe::futures::CircuitBreaker;

        match self.breaker.call(self.search(query_text, client_id)).await {
            Ok(results) => results,
            Err(failsafe::Error::Inner(e)) => {
                tracing::error!("Error calling semantic adapter: {}", e);
                Vec::new()
            }
            Err(failsafe::Error::Rejected) => {
                tracing::warn!("Semantic adapter circuit open, skipping retrieval");
                Vec::new()
            }
        }
    }
}
