//! Reranker implementations

mod http;

pub use http::HttpReranker;
