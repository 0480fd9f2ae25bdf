//! Infrastructure services

mod command_cache_service;

pub use command_cache_service::{CommandCacheService, CommandCacheServiceBuilder, StoreOutcome};
