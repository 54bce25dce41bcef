// src/pipeline/crawl.rs

//! Post collection pipeline.

use std::sync::Arc;

use chrono::Utc;

use crate::error::Result;
use crate::models::Config;
use crate::services::{BoardSource, CrawlOutcome, PostCrawler, SeenSet};
use crate::utils::log;

use super::Runtime;

/// Build a crawler whose seen-set is rebuilt from disk or empty, per config.
pub async fn build_crawler(
    config: &Config,
    source: Arc<dyn BoardSource>,
    runtime: &Runtime,
) -> PostCrawler {
    let seen = if config.crawl.rebuild_seen_set {
        let seen = SeenSet::rebuild(&runtime.store).await;
        log::sub_item(&format!("{} posts already collected", seen.len()));
        seen
    } else {
        SeenSet::new()
    };

    PostCrawler::new(
        source,
        Arc::clone(&runtime.store),
        Arc::clone(&runtime.sleeper),
        runtime.stop.clone(),
        config.crawl.clone(),
        seen,
    )
}

/// Run the crawler until `target` new posts are collected or a stop is requested.
pub async fn run_crawler(
    config: &Config,
    source: Arc<dyn BoardSource>,
    runtime: &Runtime,
    target: usize,
) -> Result<CrawlOutcome> {
    let start_time = Utc::now();
    log::header(&format!("Collecting {} posts from /{}/", target, source.board()));

    let mut crawler = build_crawler(config, source, runtime).await;
    let outcome = crawler.collect(target).await?;

    report_crawl(&outcome, start_time);
    Ok(outcome)
}

pub(crate) fn report_crawl(outcome: &CrawlOutcome, start_time: chrono::DateTime<Utc>) {
    let elapsed = Utc::now() - start_time;
    log::summary(
        "Crawl",
        &[
            ("collected", outcome.collected().to_string()),
            ("duplicates skipped", outcome.duplicates_skipped.to_string()),
            (
                "catalog fetches",
                format!(
                    "{} ({} failed, {} empty)",
                    outcome.catalog_fetches, outcome.catalog_failures, outcome.empty_catalogs
                ),
            ),
            (
                "thread fetches",
                format!(
                    "{} ok, {} failed",
                    outcome.thread_fetches, outcome.thread_failures
                ),
            ),
            ("stopped by", format!("{:?}", outcome.stop_reason)),
            ("elapsed", format!("{}s", elapsed.num_seconds())),
        ],
    );
}
