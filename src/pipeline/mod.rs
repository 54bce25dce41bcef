//! Pipeline entry points for harvester operations.
//!
//! - `run_crawler`: Collect new posts into the raw stream
//! - `run_analysis`: Annotate collected posts into the result stream
//! - `run_pipeline`: Crawl then annotate, sequentially or side by side
//! - `run_validate`: Check configuration and credentials

pub mod analyze;
pub mod crawl;
pub mod pipeline;
pub mod validate;

use std::sync::Arc;

use crate::error::Result;
use crate::models::Config;
use crate::storage::LocalStore;
use crate::utils::clock::{Sleeper, StopFlag, TokioSleeper};

pub use analyze::run_analysis;
pub use crawl::run_crawler;
pub use pipeline::{PipelineOptions, PipelineSummary, run_pipeline};
pub use validate::run_validate;

/// Shared handles every pipeline stage runs against.
#[derive(Clone)]
pub struct Runtime {
    pub store: Arc<LocalStore>,
    pub sleeper: Arc<dyn Sleeper>,
    pub stop: StopFlag,
}

impl Runtime {
    pub fn new(store: Arc<LocalStore>, sleeper: Arc<dyn Sleeper>, stop: StopFlag) -> Self {
        Self {
            store,
            sleeper,
            stop,
        }
    }

    /// Open the configured store with real sleeps.
    pub async fn open(config: &Config, stop: StopFlag) -> Result<Self> {
        let store = LocalStore::open(&config.paths).await?;
        Ok(Self::new(Arc::new(store), Arc::new(TokioSleeper), stop))
    }
}
