// src/models/mod.rs

//! Domain models for the harvester.
//!
//! Persisted records (posts, analysis results), board API shapes and
//! configuration.

mod analysis;
mod board;
mod config;
mod post;

// Re-export all public types
pub use analysis::{
    AnalysisRecord, AttributeScores, ModerationResponse, ModerationVerdict, PerspectiveVerdict,
    Score, SpanScore,
};
pub use board::{CatalogPage, RawPost, ThreadPage, ThreadSummary, thread_ids};
pub use config::{
    AnalysisConfig, Config, CrawlConfig, Credentials, LoggingConfig, ModerationConfig,
    PathsConfig, PerspectiveConfig, PipelineConfig, PipelineMode, RetryConfig, SourceConfig,
};
pub use post::{PostRecord, SourceMetadata};
