// src/services/crawler.rs

//! Catalog/thread crawler service.
//!
//! Walks the board catalog thread by thread and appends every post it has
//! not seen before to the raw stream, until a target number of new posts is
//! reached or a stop is requested.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use serde::Deserialize;

use crate::error::Result;
use crate::models::{CrawlConfig, PostRecord, RawPost, SourceMetadata, thread_ids};
use crate::services::BoardSource;
use crate::storage::{LocalStore, RecordStream};
use crate::utils::clock::{Sleeper, StopFlag};
use crate::utils::text::normalize;

/// Post ids already persisted to the raw stream.
#[derive(Debug, Clone, Default)]
pub struct SeenSet {
    ids: HashSet<u64>,
}

impl SeenSet {
    /// Start with nothing seen.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from every post already in the raw stream.
    pub async fn rebuild(store: &LocalStore) -> Self {
        #[derive(Deserialize)]
        struct PostKey {
            post_id: u64,
        }

        let ids = store
            .read_all::<PostKey>(RecordStream::Posts)
            .map(|key| key.post_id)
            .collect::<HashSet<_>>()
            .await;
        Self { ids }
    }

    pub fn contains(&self, post_id: u64) -> bool {
        self.ids.contains(&post_id)
    }

    /// Returns `false` if the id was already present.
    pub fn insert(&mut self, post_id: u64) -> bool {
        self.ids.insert(post_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<u64> for SeenSet {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Why a crawl returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    Cancelled,
}

/// Summary of a crawl run.
#[derive(Debug)]
pub struct CrawlOutcome {
    /// Ids of the records appended in this run, in write order
    pub post_ids: Vec<u64>,
    /// Catalog fetches that listed no threads
    pub empty_catalogs: usize,
    pub catalog_fetches: usize,
    pub catalog_failures: usize,
    pub thread_fetches: usize,
    pub thread_failures: usize,
    pub duplicates_skipped: usize,
    pub stop_reason: StopReason,
}

impl CrawlOutcome {
    fn new() -> Self {
        Self {
            post_ids: Vec::new(),
            empty_catalogs: 0,
            catalog_fetches: 0,
            catalog_failures: 0,
            thread_fetches: 0,
            thread_failures: 0,
            duplicates_skipped: 0,
            stop_reason: StopReason::TargetReached,
        }
    }

    fn finish(mut self, reason: StopReason) -> Self {
        self.stop_reason = reason;
        self
    }

    pub fn collected(&self) -> usize {
        self.post_ids.len()
    }
}

/// Service that collects new posts into the raw stream.
pub struct PostCrawler {
    source: Arc<dyn BoardSource>,
    store: Arc<LocalStore>,
    sleeper: Arc<dyn Sleeper>,
    stop: StopFlag,
    config: CrawlConfig,
    seen: SeenSet,
}

impl PostCrawler {
    /// Create a crawler that owns `seen` for the duration of its runs.
    pub fn new(
        source: Arc<dyn BoardSource>,
        store: Arc<LocalStore>,
        sleeper: Arc<dyn Sleeper>,
        stop: StopFlag,
        config: CrawlConfig,
        seen: SeenSet,
    ) -> Self {
        Self {
            source,
            store,
            sleeper,
            stop,
            config,
            seen,
        }
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    /// Hand the seen-set back, e.g. to seed a later crawler.
    pub fn into_seen_set(self) -> SeenSet {
        self.seen
    }

    /// Collect `target` new posts.
    ///
    /// Catalog and thread failures are logged and retried after a cooldown;
    /// the loop only ends on reaching the target or on a stop request.
    /// Record store failures are returned.
    pub async fn collect(&mut self, target: usize) -> Result<CrawlOutcome> {
        let mut outcome = CrawlOutcome::new();
        if target == 0 {
            return Ok(outcome);
        }

        loop {
            if self.stop.is_stopped() {
                return Ok(outcome.finish(StopReason::Cancelled));
            }

            outcome.catalog_fetches += 1;
            let pages = match self.source.fetch_catalog().await {
                Ok(pages) => pages,
                Err(error) => {
                    outcome.catalog_failures += 1;
                    log::warn!("Catalog fetch failed for /{}/: {}", self.source.board(), error);
                    self.sleeper
                        .sleep(self.config.catalog_failure_cooldown())
                        .await;
                    continue;
                }
            };

            let threads = thread_ids(&pages);
            if threads.is_empty() {
                outcome.empty_catalogs += 1;
                log::warn!(
                    "Catalog for /{}/ lists no threads, retrying after cooldown",
                    self.source.board()
                );
                self.sleeper
                    .sleep(self.config.catalog_failure_cooldown())
                    .await;
                continue;
            }
            log::info!(
                "Catalog for /{}/ lists {} threads ({}/{} collected)",
                self.source.board(),
                threads.len(),
                outcome.collected(),
                target
            );

            for thread_id in threads {
                if self.stop.is_stopped() {
                    return Ok(outcome.finish(StopReason::Cancelled));
                }

                match self.source.fetch_thread(thread_id).await {
                    Ok(posts) => {
                        outcome.thread_fetches += 1;
                        let before = outcome.collected();

                        for post in posts {
                            if self.seen.contains(post.no) {
                                outcome.duplicates_skipped += 1;
                                continue;
                            }

                            let record = self.build_record(thread_id, post);
                            self.store.append(RecordStream::Posts, &record).await?;
                            self.seen.insert(record.post_id);
                            outcome.post_ids.push(record.post_id);

                            if outcome.collected() >= target {
                                log::info!("Reached target of {} new posts", target);
                                return Ok(outcome.finish(StopReason::TargetReached));
                            }
                            if self.stop.is_stopped() {
                                return Ok(outcome.finish(StopReason::Cancelled));
                            }
                        }

                        log::debug!(
                            "Thread {}: {} new posts ({}/{})",
                            thread_id,
                            outcome.collected() - before,
                            outcome.collected(),
                            target
                        );
                    }
                    Err(error) => {
                        outcome.thread_failures += 1;
                        log::warn!("Thread {} fetch failed: {}", thread_id, error);
                        self.sleeper
                            .sleep(self.config.thread_failure_cooldown())
                            .await;
                    }
                }

                self.sleeper.sleep(self.config.inter_thread_delay()).await;
            }
        }
    }

    fn build_record(&self, thread_id: u64, post: RawPost) -> PostRecord {
        PostRecord {
            thread_id,
            post_id: post.no,
            timestamp: post.time,
            comment: normalize(post.com.as_deref()),
            metadata: SourceMetadata {
                board: self.source.board().to_string(),
                scraped_at: Utc::now(),
            },
        }
    }
}
