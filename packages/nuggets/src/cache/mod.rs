//! Bounded in-process caches.

pub mod embedding;

pub use embedding::{CacheStats, EmbeddingCache, EmbeddingKey};
