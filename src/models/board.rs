//! Board API response shapes (only the consumed fields).

use serde::Deserialize;

/// One page of the board catalog.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CatalogPage {
    #[serde(default)]
    pub threads: Vec<ThreadSummary>,
}

/// A thread listed in the catalog.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct ThreadSummary {
    pub no: u64,
}

/// Full post list of a thread.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ThreadPage {
    #[serde(default)]
    pub posts: Vec<RawPost>,
}

/// A post as served by the board API.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RawPost {
    /// Post number
    pub no: u64,

    /// Unix seconds
    pub time: i64,

    /// Raw HTML comment; absent for image-only posts
    #[serde(default)]
    pub com: Option<String>,
}

/// Flatten catalog pages into thread ids in catalog order.
pub fn thread_ids(pages: &[CatalogPage]) -> Vec<u64> {
    pages
        .iter()
        .flat_map(|page| page.threads.iter().map(|thread| thread.no))
        .collect()
}
