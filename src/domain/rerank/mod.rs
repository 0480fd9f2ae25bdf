//! Reranker domain models and traits
//!
//! A reranker rescores the handful of candidates the embedding search
//! produced, rejecting near misses such as "Licht an" vs "Licht aus".

mod provider;
mod stage;

pub use provider::{sort_by_score, RankedCandidate, Reranker};
pub use stage::{FallbackReason, RerankStage, RerankVerdict};

#[cfg(test)]
pub use provider::mock::MockReranker;
