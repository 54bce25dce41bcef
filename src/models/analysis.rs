//! Analysis result record and classifier verdicts.
//!
//! Verdicts are always `Option<...>` on the record: `None` means the provider
//! call failed or was skipped, which is not the same thing as a verdict with
//! zero scores.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::PostRecord;

/// One annotated post as persisted to the result stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisRecord {
    pub post_id: u64,
    pub thread_id: u64,
    pub timestamp: i64,

    /// Trimmed text that was sent to both classifiers
    pub text: String,

    /// Classifier A verdict
    pub openai: Option<ModerationVerdict>,

    /// Classifier B verdict
    pub perspective: Option<PerspectiveVerdict>,

    pub analyzed_at: DateTime<Utc>,
}

impl AnalysisRecord {
    /// Merge both verdicts for a post.
    pub fn new(
        post: &PostRecord,
        openai: Option<ModerationVerdict>,
        perspective: Option<PerspectiveVerdict>,
    ) -> Self {
        Self {
            post_id: post.post_id,
            thread_id: post.thread_id,
            timestamp: post.timestamp,
            text: post.text().to_string(),
            openai,
            perspective,
            analyzed_at: Utc::now(),
        }
    }
}

/// Moderation endpoint verdict for a single input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ModerationVerdict {
    pub flagged: bool,

    #[serde(default)]
    pub categories: BTreeMap<String, bool>,

    #[serde(default)]
    pub category_scores: BTreeMap<String, f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_applied_input_types: Option<BTreeMap<String, Vec<String>>>,
}

impl ModerationVerdict {
    /// Highest scoring category, if any scores were returned.
    pub fn top_category(&self) -> Option<(&str, f64)> {
        self.category_scores
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(name, score)| (name.as_str(), *score))
    }
}

/// Envelope returned by the moderation endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ModerationResponse {
    pub results: Vec<ModerationVerdict>,
}

/// Comment analyzer verdict: attribute name to scores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PerspectiveVerdict {
    #[serde(default)]
    pub attribute_scores: BTreeMap<String, AttributeScores>,

    #[serde(default)]
    pub languages: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_languages: Option<Vec<String>>,
}

impl PerspectiveVerdict {
    /// Summary score for an attribute such as `TOXICITY`.
    pub fn summary(&self, attribute: &str) -> Option<f64> {
        self.attribute_scores
            .get(attribute)
            .map(|scores| scores.summary_score.value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttributeScores {
    pub summary_score: Score,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub span_scores: Vec<SpanScore>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Score {
    pub value: f64,

    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpanScore {
    #[serde(default)]
    pub begin: u32,
    #[serde(default)]
    pub end: u32,
    pub score: Score,
}
