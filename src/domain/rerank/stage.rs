//! Precision gate applied after the embedding search

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::Reranker;
use crate::domain::DomainError;

/// Why the rerank stage could not decide
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// No reranker configured
    Disabled,
    /// Reranker errored, timed out or returned an unusable answer
    Unavailable,
}

/// Outcome of judging the embedding candidates
#[derive(Debug, Clone, PartialEq)]
pub enum RerankVerdict {
    /// Candidate at `index` cleared its threshold
    Accepted { index: usize, score: f32 },
    /// Best candidate scored below its threshold
    Rejected {
        index: usize,
        score: f32,
        threshold: f32,
    },
    /// Caller should fall back to embedding-only acceptance
    Fallback(FallbackReason),
}

/// Second retrieval stage, selected once at construction time
#[derive(Debug, Clone)]
pub enum RerankStage {
    Enabled(Arc<dyn Reranker>),
    Disabled,
}

impl RerankStage {
    pub fn enabled(reranker: Arc<dyn Reranker>) -> Self {
        Self::Enabled(reranker)
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }

    /// Ask the reranker which candidate (if any) really matches the query.
    ///
    /// `threshold_for` yields the acceptance threshold for the candidate at a
    /// given index. The call is bounded by `timeout`; a timeout counts as an
    /// unavailable reranker.
    pub async fn judge<F>(
        &self,
        query: &str,
        candidates: &[String],
        timeout: Duration,
        threshold_for: F,
    ) -> RerankVerdict
    where
        F: Fn(usize) -> f32,
    {
        let reranker = match self {
            Self::Enabled(reranker) => reranker,
            Self::Disabled => return RerankVerdict::Fallback(FallbackReason::Disabled),
        };

        if candidates.is_empty() {
            return RerankVerdict::Fallback(FallbackReason::Unavailable);
        }

        let result = match tokio::time::timeout(timeout, reranker.rerank(query, candidates)).await
        {
            Ok(result) => result,
            Err(_) => Err(DomainError::timeout(
                reranker.provider_name(),
                timeout.as_millis() as u64,
            )),
        };

        let ranked = match result {
            Ok(ranked) => ranked,
            Err(e) => {
                warn!("Reranker failed, falling back to embedding match: {}", e);
                return RerankVerdict::Fallback(FallbackReason::Unavailable);
            }
        };

        // Providers are expected to sort, but don't rely on it
        let best = ranked
            .iter()
            .filter(|r| r.index < candidates.len())
            .max_by(|a, b| {
                a.score
                    .partial_cmp(&b.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

        let Some(best) = best else {
            warn!("Reranker returned no usable scores, falling back to embedding match");
            return RerankVerdict::Fallback(FallbackReason::Unavailable);
        };

        let threshold = threshold_for(best.index);

        debug!(
            "Reranker best candidate {} scored {:.4} (threshold {:.2}): '{}'",
            best.index, best.score, threshold, best.text
        );

        if best.score >= threshold {
            RerankVerdict::Accepted {
                index: best.index,
                score: best.score,
            }
        } else {
            RerankVerdict::Rejected {
                index: best.index,
                score: best.score,
                threshold,
            }
        }
    }
}
