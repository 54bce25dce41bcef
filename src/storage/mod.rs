//! Storage abstractions for record persistence.
//!
//! Two independent append-only streams:
//! - Posts: raw, normalized posts written by the crawler
//! - Results: classifier verdicts written by the annotator
//!
//! The crawler and the annotator only ever talk to each other through these
//! streams, which is what lets either phase stop and resume on its own.

pub mod local;

use std::fmt;

// Re-export for convenience
pub use local::LocalStore;

/// Identifies one persisted record stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordStream {
    /// Raw post records
    Posts,
    /// Analysis result records
    Results,
}

impl RecordStream {
    pub const ALL: [RecordStream; 2] = [RecordStream::Posts, RecordStream::Results];

    pub fn name(&self) -> &'static str {
        match self {
            RecordStream::Posts => "posts",
            RecordStream::Results => "results",
        }
    }
}

impl fmt::Display for RecordStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
