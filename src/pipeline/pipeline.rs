// src/pipeline/pipeline.rs

use std::sync::Arc;

use chrono::Utc;

use crate::error::Result;
use crate::models::{Config, PipelineMode};
use crate::services::{AnalysisOutcome, BoardSource, Classifiers, CrawlOutcome, StopReason};
use crate::storage::RecordStream;
use crate::utils::log;

use super::Runtime;
use super::analyze::{build_annotator, report_analysis, run_analysis};
use super::crawl::{build_crawler, report_crawl, run_crawler};

/// Targets and sizing for one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub target: usize,
    pub limit: usize,
    pub batch_size: usize,
    pub mode: PipelineMode,
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            target: config.crawl.target_posts,
            limit: config.analysis.limit,
            batch_size: config.analysis.batch_size,
            mode: config.pipeline.mode,
        }
    }
}

/// Outcome of both phases.
#[derive(Debug)]
pub struct PipelineSummary {
    pub crawl: CrawlOutcome,
    pub analysis: AnalysisOutcome,
    /// Annotator passes over the raw stream (1 when sequential)
    pub passes: usize,
}

/// Run the full pipeline: crawl, then annotate.
pub async fn run_pipeline(
    config: &Config,
    source: Arc<dyn BoardSource>,
    classifiers: Classifiers,
    runtime: &Runtime,
    options: &PipelineOptions,
) -> Result<PipelineSummary> {
    match options.mode {
        PipelineMode::Sequential => {
            run_sequential(config, source, classifiers, runtime, options).await
        }
        PipelineMode::Concurrent => {
            run_concurrent(config, source, classifiers, runtime, options).await
        }
    }
}

async fn run_sequential(
    config: &Config,
    source: Arc<dyn BoardSource>,
    classifiers: Classifiers,
    runtime: &Runtime,
    options: &PipelineOptions,
) -> Result<PipelineSummary> {
    log::step(1, 2, "Crawl - Collecting posts");
    let crawl = run_crawler(config, source, runtime, options.target).await?;

    if crawl.stop_reason == StopReason::Cancelled {
        log::sub_item("Stop requested, skipping analysis");
        return Ok(PipelineSummary {
            crawl,
            analysis: AnalysisOutcome {
                cancelled: true,
                ..AnalysisOutcome::default()
            },
            passes: 0,
        });
    }

    log::step(2, 2, "Analyze - Classifying posts");
    let analysis = run_analysis(
        config,
        classifiers,
        runtime,
        options.limit,
        options.batch_size,
    )
    .await?;

    Ok(PipelineSummary {
        crawl,
        analysis,
        passes: 1,
    })
}

/// Crawl in a background task while annotating in repeated passes.
///
/// Each pass reads only complete records, skips posts that already have a
/// result, and stops once the crawler has finished or the first `limit` raw
/// records have all been considered.
async fn run_concurrent(
    config: &Config,
    source: Arc<dyn BoardSource>,
    classifiers: Classifiers,
    runtime: &Runtime,
    options: &PipelineOptions,
) -> Result<PipelineSummary> {
    let start_time = Utc::now();
    log::header(&format!(
        "Collecting {} and analyzing {} posts from /{}/ concurrently",
        options.target,
        options.limit,
        source.board()
    ));

    let mut crawler = build_crawler(config, source, runtime).await;
    let target = options.target;
    let crawl_task = tokio::spawn(async move { crawler.collect(target).await });

    // Passes only make progress if earlier results are skipped.
    let mut analysis_config = config.analysis.clone();
    analysis_config.skip_analyzed = true;
    let annotator = build_annotator(analysis_config, classifiers, runtime);

    let mut analysis = AnalysisOutcome::default();
    let mut passes = 0;
    loop {
        let crawler_done = crawl_task.is_finished();
        let pass = match annotator
            .analyze(
                RecordStream::Posts,
                RecordStream::Results,
                options.limit,
                options.batch_size,
            )
            .await
        {
            Ok(pass) => pass,
            Err(error) => {
                crawl_task.abort();
                return Err(error);
            }
        };
        passes += 1;
        analysis.absorb(&pass);

        if crawler_done || pass.considered >= options.limit || pass.cancelled {
            break;
        }
        if runtime.stop.is_stopped() {
            analysis.cancelled = true;
            break;
        }
        runtime.sleeper.sleep(config.pipeline.poll_interval()).await;
    }

    let crawl = crawl_task.await??;

    report_crawl(&crawl, start_time);
    report_analysis(&analysis, start_time);
    log::sub_item(&format!("{} annotator passes", passes));

    Ok(PipelineSummary {
        crawl,
        analysis,
        passes,
    })
}
