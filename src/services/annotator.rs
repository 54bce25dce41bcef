// src/services/annotator.rs

//! Batched annotation service.
//!
//! Reads raw posts, sends each non-empty one to both classifiers and appends
//! an [`AnalysisRecord`] per post to the results stream. Cooldowns are applied
//! after every post and between batches.

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use serde::Deserialize;

use crate::error::Result;
use crate::models::{AnalysisConfig, AnalysisRecord, PostRecord};
use crate::services::Classifiers;
use crate::storage::{LocalStore, RecordStream};
use crate::utils::clock::{Sleeper, StopFlag};

/// Summary of one annotation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AnalysisOutcome {
    /// Valid raw records examined (at most the limit)
    pub considered: usize,
    /// Result records written
    pub analyzed: usize,
    pub skipped_empty: usize,
    pub skipped_analyzed: usize,
    pub openai_failures: usize,
    pub perspective_failures: usize,
    pub batches: usize,
    pub cancelled: bool,
}

impl AnalysisOutcome {
    /// Fold a later pass over the same input into this one.
    ///
    /// Every pass rereads the input from the start, so `considered` and
    /// `skipped_empty` come from the later pass, while work counters add up.
    /// Posts analyzed by earlier passes are not counted as skipped.
    pub fn absorb(&mut self, later: &AnalysisOutcome) {
        self.considered = later.considered;
        self.skipped_empty = later.skipped_empty;
        self.skipped_analyzed = later.skipped_analyzed.saturating_sub(self.analyzed);
        self.analyzed += later.analyzed;
        self.openai_failures += later.openai_failures;
        self.perspective_failures += later.perspective_failures;
        self.batches += later.batches;
        self.cancelled |= later.cancelled;
    }
}

/// Post ids that already have a result record.
pub async fn analyzed_ids(store: &LocalStore, stream: RecordStream) -> HashSet<u64> {
    #[derive(Deserialize)]
    struct ResultKey {
        post_id: u64,
    }

    store
        .read_all::<ResultKey>(stream)
        .map(|key| key.post_id)
        .collect()
        .await
}

/// Service that turns raw posts into analysis records.
pub struct Annotator {
    classifiers: Classifiers,
    store: Arc<LocalStore>,
    sleeper: Arc<dyn Sleeper>,
    stop: StopFlag,
    config: AnalysisConfig,
}

impl Annotator {
    pub fn new(
        classifiers: Classifiers,
        store: Arc<LocalStore>,
        sleeper: Arc<dyn Sleeper>,
        stop: StopFlag,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            classifiers,
            store,
            sleeper,
            stop,
            config,
        }
    }

    /// Annotate up to `limit` raw records from `input` into `output`.
    ///
    /// `limit` counts raw records considered, including ones skipped for empty
    /// text or because they already have a result. Classifier failures yield
    /// `None` verdicts; only store failures are returned as errors.
    pub async fn analyze(
        &self,
        input: RecordStream,
        output: RecordStream,
        limit: usize,
        batch_size: usize,
    ) -> Result<AnalysisOutcome> {
        let mut outcome = AnalysisOutcome::default();
        let batch_size = batch_size.max(1);

        let done = if self.config.skip_analyzed {
            analyzed_ids(&self.store, output).await
        } else {
            HashSet::new()
        };

        let mut pending = Vec::new();
        let mut records = Box::pin(self.store.read_all::<PostRecord>(input).take(limit));
        while let Some(post) = records.next().await {
            outcome.considered += 1;
            if !post.has_text() {
                outcome.skipped_empty += 1;
            } else if done.contains(&post.post_id) {
                outcome.skipped_analyzed += 1;
            } else {
                pending.push(post);
            }
        }

        log::info!(
            "Analyzing {} of {} posts in batches of {}",
            pending.len(),
            outcome.considered,
            batch_size
        );

        let batch_count = pending.len().div_ceil(batch_size);
        'batches: for (index, batch) in pending.chunks(batch_size).enumerate() {
            if self.stop.is_stopped() {
                outcome.cancelled = true;
                break;
            }
            outcome.batches += 1;
            log::info!("Batch {}/{} ({} posts)", index + 1, batch_count, batch.len());

            let mut results = futures::stream::iter(batch)
                .map(|post| self.annotate(post))
                .buffered(self.config.max_concurrent.max(1));

            while let Some(record) = results.next().await {
                if record.openai.is_none() {
                    outcome.openai_failures += 1;
                }
                if record.perspective.is_none() {
                    outcome.perspective_failures += 1;
                }
                self.store.append(output, &record).await?;
                outcome.analyzed += 1;

                self.sleeper.sleep(self.config.post_cooldown()).await;
                if self.stop.is_stopped() {
                    outcome.cancelled = true;
                    break 'batches;
                }
            }

            if index + 1 < batch_count {
                self.sleeper.sleep(self.config.batch_cooldown()).await;
            }
        }

        Ok(outcome)
    }

    /// Call both classifiers; a failure of one does not affect the other.
    async fn annotate(&self, post: &PostRecord) -> AnalysisRecord {
        let text = post.text();

        let openai = match self.classifiers.moderation.classify(text).await {
            Ok(verdict) => Some(verdict),
            Err(error) => {
                log::warn!(
                    "{} failed for post {}: {}",
                    self.classifiers.moderation.name(),
                    post.post_id,
                    error
                );
                None
            }
        };

        let perspective = match self.classifiers.perspective.classify(text).await {
            Ok(verdict) => Some(verdict),
            Err(error) => {
                log::warn!(
                    "{} failed for post {}: {}",
                    self.classifiers.perspective.name(),
                    post.post_id,
                    error
                );
                None
            }
        };

        AnalysisRecord::new(post, openai, perspective)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use tempfile::TempDir;

    use super::*;
    use crate::error::CallError;
    use crate::models::{ModerationVerdict, PerspectiveVerdict, SourceMetadata};
    use crate::services::Classifier;
    use crate::utils::clock::VirtualClock;

    /// Classifier that fails for configured texts and records every call.
    struct Scripted<V> {
        name: &'static str,
        fail_on: Vec<String>,
        calls: Mutex<Vec<String>>,
        verdict: fn() -> V,
        stop_on: Option<(String, StopFlag)>,
    }

    impl<V> Scripted<V> {
        fn new(name: &'static str, verdict: fn() -> V) -> Self {
            Self {
                name,
                fail_on: Vec::new(),
                calls: Mutex::new(Vec::new()),
                verdict,
                stop_on: None,
            }
        }

        fn failing(mut self, text: &str) -> Self {
            self.fail_on.push(text.to_string());
            self
        }

        /// Request a stop while classifying `text`.
        fn stopping_on(mut self, text: &str, stop: StopFlag) -> Self {
            self.stop_on = Some((text.to_string(), stop));
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl<V: Send + Sync + 'static> Classifier for Scripted<V> {
        type Verdict = V;

        fn name(&self) -> &str {
            self.name
        }

        async fn classify(&self, text: &str) -> std::result::Result<V, CallError> {
            self.calls.lock().unwrap().push(text.to_string());
            if let Some((trigger, stop)) = &self.stop_on {
                if trigger == text {
                    stop.request_stop();
                }
            }
            if self.fail_on.iter().any(|t| *t == text) {
                return Err(CallError::RateLimited {
                    endpoint: self.name.to_string(),
                    attempts: 5,
                });
            }
            Ok((self.verdict)())
        }
    }

    fn moderation_verdict() -> ModerationVerdict {
        serde_json::from_value(serde_json::json!({
            "flagged": false,
            "categories": {"hate": false},
            "category_scores": {"hate": 0.01}
        }))
        .unwrap()
    }

    fn toxicity_verdict() -> PerspectiveVerdict {
        serde_json::from_value(serde_json::json!({
            "attributeScores": {
                "TOXICITY": {"summaryScore": {"value": 0.2, "type": "PROBABILITY"}}
            },
            "languages": ["en"]
        }))
        .unwrap()
    }

    fn post(post_id: u64, comment: &str) -> PostRecord {
        PostRecord {
            thread_id: 1,
            post_id,
            timestamp: 1_700_000_000,
            comment: comment.to_string(),
            metadata: SourceMetadata {
                board: "test".into(),
                scraped_at: Utc::now(),
            },
        }
    }

    struct Fixture {
        _tmp: TempDir,
        store: Arc<LocalStore>,
        clock: Arc<VirtualClock>,
        moderation: Arc<Scripted<ModerationVerdict>>,
        perspective: Arc<Scripted<PerspectiveVerdict>>,
    }

    impl Fixture {
        async fn new(posts: &[PostRecord]) -> Self {
            Self::with(
                posts,
                Scripted::new("openai", moderation_verdict),
                Scripted::new("perspective", toxicity_verdict),
            )
            .await
        }

        async fn with(
            posts: &[PostRecord],
            moderation: Scripted<ModerationVerdict>,
            perspective: Scripted<PerspectiveVerdict>,
        ) -> Self {
            let tmp = TempDir::new().unwrap();
            let store = Arc::new(LocalStore::in_dir(tmp.path()).await.unwrap());
            for p in posts {
                store.append(RecordStream::Posts, p).await.unwrap();
            }
            Self {
                _tmp: tmp,
                store,
                clock: Arc::new(VirtualClock::new()),
                moderation: Arc::new(moderation),
                perspective: Arc::new(perspective),
            }
        }

        fn annotator(&self, stop: StopFlag) -> Annotator {
            let classifiers = Classifiers {
                moderation: self.moderation.clone(),
                perspective: self.perspective.clone(),
            };
            let config = AnalysisConfig {
                post_cooldown_ms: 1000,
                batch_cooldown_ms: 5000,
                ..AnalysisConfig::default()
            };
            Annotator::new(
                classifiers,
                Arc::clone(&self.store),
                self.clock.clone(),
                stop,
                config,
            )
        }

        async fn results(&self) -> Vec<AnalysisRecord> {
            self.store
                .read_all::<AnalysisRecord>(RecordStream::Results)
                .collect()
                .await
        }
    }

    #[tokio::test]
    async fn test_batches_and_cooldowns() {
        let posts: Vec<_> = (1..=7).map(|i| post(i, &format!("text {i}"))).collect();
        let fx = Fixture::new(&posts).await;

        let outcome = fx
            .annotator(StopFlag::new())
            .analyze(RecordStream::Posts, RecordStream::Results, 100, 3)
            .await
            .unwrap();

        assert_eq!(outcome.analyzed, 7);
        assert_eq!(outcome.batches, 3);

        let s = Duration::from_secs;
        assert_eq!(
            fx.clock.sleeps(),
            vec![
                s(1), s(1), s(1), s(5),
                s(1), s(1), s(1), s(5),
                s(1),
            ]
        );

        let ids: Vec<u64> = fx.results().await.iter().map(|r| r.post_id).collect();
        assert_eq!(ids, (1..=7).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_limit_counts_skipped_records() {
        let posts = vec![post(1, "a"), post(2, "   "), post(3, ""), post(4, "b"), post(5, "c")];
        let fx = Fixture::new(&posts).await;

        let outcome = fx
            .annotator(StopFlag::new())
            .analyze(RecordStream::Posts, RecordStream::Results, 4, 5)
            .await
            .unwrap();

        assert_eq!(outcome.considered, 4);
        assert_eq!(outcome.skipped_empty, 2);
        assert_eq!(outcome.analyzed, 2);
        assert_eq!(fx.moderation.calls(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_classifier_failures_are_independent() {
        let posts = vec![post(1, "fine"), post(2, "boom")];
        let fx = Fixture::with(
            &posts,
            Scripted::new("openai", moderation_verdict).failing("boom"),
            Scripted::new("perspective", toxicity_verdict).failing("fine"),
        )
        .await;

        let outcome = fx
            .annotator(StopFlag::new())
            .analyze(RecordStream::Posts, RecordStream::Results, 10, 5)
            .await
            .unwrap();

        assert_eq!(outcome.openai_failures, 1);
        assert_eq!(outcome.perspective_failures, 1);

        let results = fx.results().await;
        assert_eq!(results.len(), 2);
        assert!(results[0].openai.is_some());
        assert!(results[0].perspective.is_none());
        assert!(results[1].openai.is_none());
        assert!(results[1].perspective.is_some());
        assert_eq!(results[1].text, "boom");
    }

    #[tokio::test]
    async fn test_rerun_skips_analyzed_posts() {
        let posts = vec![post(1, "a"), post(2, "b"), post(3, "c")];
        let fx = Fixture::new(&posts).await;

        fx.annotator(StopFlag::new())
            .analyze(RecordStream::Posts, RecordStream::Results, 2, 5)
            .await
            .unwrap();
        let outcome = fx
            .annotator(StopFlag::new())
            .analyze(RecordStream::Posts, RecordStream::Results, 10, 5)
            .await
            .unwrap();

        assert_eq!(outcome.skipped_analyzed, 2);
        assert_eq!(outcome.analyzed, 1);
        let ids: Vec<u64> = fx.results().await.iter().map(|r| r.post_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_stop_ends_after_current_post() {
        let posts = vec![post(1, "a"), post(2, "b"), post(3, "c")];
        let fx = Fixture::new(&posts).await;
        let stop = StopFlag::new();
        let annotator = fx.annotator(stop.clone());
        stop.request_stop();

        let outcome = annotator
            .analyze(RecordStream::Posts, RecordStream::Results, 10, 1)
            .await
            .unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.analyzed, 0);
        assert!(fx.moderation.calls().is_empty());
    }

    #[tokio::test]
    async fn test_stop_mid_batch_keeps_current_record() {
        let posts = vec![post(1, "a"), post(2, "b"), post(3, "c")];
        let stop = StopFlag::new();
        let fx = Fixture::with(
            &posts,
            Scripted::new("openai", moderation_verdict).stopping_on("b", stop.clone()),
            Scripted::new("perspective", toxicity_verdict),
        )
        .await;

        let outcome = fx
            .annotator(stop)
            .analyze(RecordStream::Posts, RecordStream::Results, 10, 5)
            .await
            .unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.analyzed, 2);
        assert_eq!(outcome.batches, 1);
        assert_eq!(fx.perspective.calls(), vec!["a", "b"]);

        let ids: Vec<u64> = fx.results().await.iter().map(|r| r.post_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let fx = Fixture::new(&[]).await;

        let outcome = fx
            .annotator(StopFlag::new())
            .analyze(RecordStream::Posts, RecordStream::Results, 10, 5)
            .await
            .unwrap();

        assert_eq!(outcome, AnalysisOutcome::default());
        assert!(fx.clock.sleeps().is_empty());
    }

    #[test]
    fn test_absorb_later_pass() {
        let mut total = AnalysisOutcome::default();
        total.absorb(&AnalysisOutcome {
            considered: 3,
            analyzed: 2,
            skipped_empty: 1,
            batches: 1,
            ..AnalysisOutcome::default()
        });
        // Second pass rereads the same three posts plus two new ones.
        total.absorb(&AnalysisOutcome {
            considered: 5,
            analyzed: 2,
            skipped_empty: 1,
            skipped_analyzed: 2,
            batches: 1,
            cancelled: true,
            ..AnalysisOutcome::default()
        });

        assert_eq!(total.considered, 5);
        assert_eq!(total.analyzed, 4);
        assert_eq!(total.skipped_empty, 1);
        assert_eq!(total.skipped_analyzed, 0);
        assert_eq!(total.batches, 2);
        assert!(total.cancelled);
    }
}
