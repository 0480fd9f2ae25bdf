//! Reranker provider trait definition

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::domain::DomainError;

/// A candidate phrase scored against the query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    /// Position of the candidate in the request's candidate list
    pub index: usize,
    /// The candidate text
    pub text: String,
    /// Relevance score, higher is better
    pub score: f32,
}

impl RankedCandidate {
    pub fn new(index: usize, text: impl Into<String>, score: f32) -> Self {
        Self {
            index,
            text: text.into(),
            score,
        }
    }
}

/// Sort ranked candidates by descending score
pub fn sort_by_score(ranked: &mut [RankedCandidate]) {
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Trait for cross-encoder style rerankers
#[async_trait]
pub trait Reranker: Send + Sync + Debug {
    /// Score every candidate against the query.
    ///
    /// The result is ordered by descending score.
    async fn rerank(
        &self,
        query: &str,
        candidates: &[String],
    ) -> Result<Vec<RankedCandidate>, DomainError>;

    /// Get the provider name
    fn provider_name(&self) -> &'static str;
}
