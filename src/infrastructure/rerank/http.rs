//! Cross-encoder reranker served over HTTP

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::rerank::{sort_by_score, RankedCandidate, Reranker};
use crate::domain::DomainError;
use crate::infrastructure::http::HttpClientTrait;

const DEFAULT_RERANKER_BASE_URL: &str = "http://localhost:8765";

/// Reranker service exposing `POST /rerank`.
///
/// The service returns one sigmoid probability per candidate, in request
/// order.
#[derive(Debug)]
pub struct HttpReranker<C: HttpClientTrait> {
    client: C,
    base_url: String,
}

impl<C: HttpClientTrait> HttpReranker<C> {
    pub fn new(client: C) -> Self {
        Self::with_base_url(client, DEFAULT_RERANKER_BASE_URL)
    }

    pub fn with_base_url(client: C, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn rerank_url(&self) -> String {
        format!("{}/rerank", self.base_url)
    }

    fn parse_response(
        &self,
        json: serde_json::Value,
        candidates: &[String],
    ) -> Result<Vec<RankedCandidate>, DomainError> {
        let response: RerankResponse = serde_json::from_value(json).map_err(|e| {
            DomainError::provider("reranker", format!("Failed to parse rerank response: {}", e))
        })?;

        if response.scores.len() != candidates.len() {
            return Err(DomainError::provider(
                "reranker",
                format!(
                    "Expected {} scores, got {}",
                    candidates.len(),
                    response.scores.len()
                ),
            ));
        }

        let mut ranked: Vec<RankedCandidate> = response
            .scores
            .into_iter()
            .zip(candidates)
            .enumerate()
            .map(|(index, (score, text))| RankedCandidate::new(index, text.clone(), score))
            .collect();

        sort_by_score(&mut ranked);

        Ok(ranked)
    }
}

#[async_trait]
impl<C: HttpClientTrait> Reranker for HttpReranker<C> {
    async fn rerank(
        &self,
        query: &str,
        candidates: &[String],
    ) -> Result<Vec<RankedCandidate>, DomainError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::to_value(RerankRequest { query, candidates }).map_err(|e| {
            DomainError::internal(format!("Failed to serialize rerank request: {}", e))
        })?;

        let response = self
            .client
            .post_json(
                &self.rerank_url(),
                vec![("Content-Type", "application/json")],
                &body,
            )
            .await
            .map_err(|e| match e {
                DomainError::Provider { message, .. } => DomainError::provider("reranker", message),
                other => other,
            })?;

        self.parse_response(response, candidates)
    }

    fn provider_name(&self) -> &'static str {
        "reranker"
    }
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    candidates: &'a [String],
}

// best_index / best_score are also sent but derived locally
#[derive(Debug, Deserialize)]
struct RerankResponse {
    scores: Vec<f32>,
}
