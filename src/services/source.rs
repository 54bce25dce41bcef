// src/services/source.rs

//! Board API client.
//!
//! Read-only JSON API with a catalog endpoint listing active threads and a
//! thread endpoint returning every post of one thread.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{CallError, Result};
use crate::models::{CatalogPage, RawPost, SourceConfig, ThreadPage};
use crate::utils::clock::Sleeper;
use crate::utils::http::{RateLimitedClient, RetryPolicy, create_async_client};

/// Where posts come from.
#[async_trait]
pub trait BoardSource: Send + Sync {
    /// Board short name recorded in post metadata.
    fn board(&self) -> &str;

    /// Fetch the catalog of active threads.
    async fn fetch_catalog(&self) -> std::result::Result<Vec<CatalogPage>, CallError>;

    /// Fetch every post of a thread.
    async fn fetch_thread(&self, thread_id: u64) -> std::result::Result<Vec<RawPost>, CallError>;
}

/// [`BoardSource`] backed by the public board JSON API.
pub struct HttpBoardSource {
    client: RateLimitedClient,
    base_url: String,
    board: String,
}

impl HttpBoardSource {
    pub fn new(config: &SourceConfig, retry: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Result<Self> {
        let client = create_async_client(&config.user_agent, config.timeout())?;
        Ok(Self {
            client: RateLimitedClient::new(client, retry, sleeper),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            board: config.board.clone(),
        })
    }

    pub fn catalog_url(&self) -> String {
        format!("{}/{}/catalog.json", self.base_url, self.board)
    }

    pub fn thread_url(&self, thread_id: u64) -> String {
        format!("{}/{}/thread/{}.json", self.base_url, self.board, thread_id)
    }
}

#[async_trait]
impl BoardSource for HttpBoardSource {
    fn board(&self) -> &str {
        &self.board
    }

    async fn fetch_catalog(&self) -> std::result::Result<Vec<CatalogPage>, CallError> {
        let url = self.catalog_url();
        self.client.call(&url, |client| client.get(&url)).await
    }

    async fn fetch_thread(&self, thread_id: u64) -> std::result::Result<Vec<RawPost>, CallError> {
        let url = self.thread_url(thread_id);
        let page: ThreadPage = self.client.call(&url, |client| client.get(&url)).await?;
        Ok(page.posts)
    }
}
