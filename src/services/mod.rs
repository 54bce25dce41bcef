//! Service layer for the harvester.
//!
//! This module contains the business logic for:
//! - Board access (`BoardSource`, `HttpBoardSource`)
//! - Content classification (`Classifier`, `Classifiers`)
//! - Post collection (`PostCrawler`)
//! - Batched annotation (`Annotator`)

mod annotator;
mod crawler;
mod moderation;
mod source;

pub use annotator::{AnalysisOutcome, Annotator, analyzed_ids};
pub use crawler::{CrawlOutcome, PostCrawler, SeenSet, StopReason};
pub use moderation::{
    Classifier, Classifiers, ModerationClassifier, OpenAiModerator, PerspectiveClassifier,
    ToxicityClassifier,
};
pub use source::{BoardSource, HttpBoardSource};
