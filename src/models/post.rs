//! Raw post record data structure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A normalized post as persisted to the raw stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostRecord {
    /// Thread the post was found in
    pub thread_id: u64,

    /// Post number, unique within the board; the dedup key
    pub post_id: u64,

    /// Post time as unix seconds
    pub timestamp: i64,

    /// Normalized comment text (may be empty for image-only posts)
    pub comment: String,

    /// Where and when the post was collected
    pub metadata: SourceMetadata,
}

/// Collection provenance for a post.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceMetadata {
    /// Board short name, e.g. `pol`
    pub board: String,

    /// UTC time the post was scraped
    pub scraped_at: DateTime<Utc>,
}

impl PostRecord {
    /// Comment text with surrounding whitespace removed.
    pub fn text(&self) -> &str {
        self.comment.trim()
    }

    /// Whether there is anything worth sending to a classifier.
    pub fn has_text(&self) -> bool {
        !self.text().is_empty()
    }
}
