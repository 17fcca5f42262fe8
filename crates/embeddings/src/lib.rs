pub mod config;
pub mod engine;

pub use config::EmbeddingConfig;
pub use engine::EmbeddingEngine;
