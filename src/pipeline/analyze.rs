// src/pipeline/analyze.rs

//! Annotation pipeline.

use chrono::Utc;

use crate::error::Result;
use crate::models::{AnalysisConfig, Config};
use crate::services::{AnalysisOutcome, Annotator, Classifiers};
use crate::storage::RecordStream;
use crate::utils::log;

use super::Runtime;

pub(crate) fn build_annotator(
    config: AnalysisConfig,
    classifiers: Classifiers,
    runtime: &Runtime,
) -> Annotator {
    Annotator::new(
        classifiers,
        runtime.store.clone(),
        runtime.sleeper.clone(),
        runtime.stop.clone(),
        config,
    )
}

/// Annotate up to `limit` raw posts in batches of `batch_size`.
pub async fn run_analysis(
    config: &Config,
    classifiers: Classifiers,
    runtime: &Runtime,
    limit: usize,
    batch_size: usize,
) -> Result<AnalysisOutcome> {
    let start_time = Utc::now();
    log::header(&format!(
        "Analyzing up to {} posts from {}",
        limit,
        runtime.store.path(RecordStream::Posts).display()
    ));

    let annotator = build_annotator(config.analysis.clone(), classifiers, runtime);
    let outcome = annotator
        .analyze(RecordStream::Posts, RecordStream::Results, limit, batch_size)
        .await?;

    report_analysis(&outcome, start_time);
    Ok(outcome)
}

pub(crate) fn report_analysis(outcome: &AnalysisOutcome, start_time: chrono::DateTime<Utc>) {
    let elapsed = Utc::now() - start_time;
    log::summary(
        "Analysis",
        &[
            ("considered", outcome.considered.to_string()),
            ("analyzed", outcome.analyzed.to_string()),
            ("skipped (empty)", outcome.skipped_empty.to_string()),
            ("skipped (done)", outcome.skipped_analyzed.to_string()),
            ("openai failures", outcome.openai_failures.to_string()),
            ("perspective failures", outcome.perspective_failures.to_string()),
            ("batches", outcome.batches.to_string()),
            ("cancelled", outcome.cancelled.to_string()),
            ("elapsed", format!("{}s", elapsed.num_seconds())),
        ],
    );
}
