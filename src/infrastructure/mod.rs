//! Infrastructure layer - External service implementations

pub mod embedding;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod persistence;
pub mod rerank;
pub mod services;
