// src/services/moderation.rs

//! Content classifier clients.
//!
//! - [`OpenAiModerator`]: moderation endpoint, bearer auth, retries 429s
//! - [`PerspectiveClassifier`]: comment analyzer, API key in the query string,
//!   single attempt by default
//!
//! Both are opaque to the rest of the crate: they take text and return a
//! structured verdict or a [`CallError`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{CallError, Result};
use crate::models::{
    Config, Credentials, ModerationConfig, ModerationResponse, ModerationVerdict,
    PerspectiveConfig, PerspectiveVerdict,
};
use crate::utils::clock::Sleeper;
use crate::utils::http::{RateLimitedClient, RetryPolicy, create_async_client};

/// A text classifier producing a structured verdict.
#[async_trait]
pub trait Classifier: Send + Sync {
    type Verdict: Send + 'static;

    /// Short provider name for logs.
    fn name(&self) -> &str;

    async fn classify(&self, text: &str) -> std::result::Result<Self::Verdict, CallError>;
}

pub type ModerationClassifier = dyn Classifier<Verdict = ModerationVerdict>;
pub type ToxicityClassifier = dyn Classifier<Verdict = PerspectiveVerdict>;

/// The two providers every post is sent to.
#[derive(Clone)]
pub struct Classifiers {
    pub moderation: Arc<ModerationClassifier>,
    pub perspective: Arc<ToxicityClassifier>,
}

impl Classifiers {
    /// Build both HTTP clients from configuration.
    pub fn from_config(
        config: &Config,
        credentials: &Credentials,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self> {
        let moderation = OpenAiModerator::new(
            &config.moderation,
            &config.source.user_agent,
            &credentials.openai_api_key,
            RetryPolicy::from(&config.retry),
            Arc::clone(&sleeper),
        )?;
        let perspective = PerspectiveClassifier::new(
            &config.perspective,
            &config.source.user_agent,
            &credentials.perspective_api_key,
            RetryPolicy::new(config.perspective.max_attempts, config.retry.backoff_base),
            sleeper,
        )?;

        Ok(Self {
            moderation: Arc::new(moderation),
            perspective: Arc::new(perspective),
        })
    }
}

/// Moderation endpoint client.
pub struct OpenAiModerator {
    client: RateLimitedClient,
    endpoint: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct ModerationRequest<'a> {
    model: &'a str,
    input: &'a str,
}

impl OpenAiModerator {
    pub fn new(
        config: &ModerationConfig,
        user_agent: &str,
        api_key: &str,
        retry: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self> {
        let client = create_async_client(user_agent, Duration::from_secs(config.timeout_secs))?;
        Ok(Self {
            client: RateLimitedClient::new(client, retry, sleeper),
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: api_key.to_string(),
        })
    }

    fn request_body<'a>(&'a self, text: &'a str) -> ModerationRequest<'a> {
        ModerationRequest {
            model: &self.model,
            input: text,
        }
    }
}

#[async_trait]
impl Classifier for OpenAiModerator {
    type Verdict = ModerationVerdict;

    fn name(&self) -> &str {
        "openai"
    }

    async fn classify(&self, text: &str) -> std::result::Result<ModerationVerdict, CallError> {
        let body = self.request_body(text);
        let response: ModerationResponse = self
            .client
            .call(&self.endpoint, |client| {
                client
                    .post(&self.endpoint)
                    .bearer_auth(&self.api_key)
                    .json(&body)
            })
            .await?;

        response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| CallError::invalid_response(&self.endpoint, "empty results array"))
    }
}

/// Comment analyzer client.
pub struct PerspectiveClassifier {
    client: RateLimitedClient,
    endpoint: String,
    api_key: String,
    languages: Vec<String>,
    attributes: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeRequest<'a> {
    comment: CommentText<'a>,
    languages: &'a [String],
    requested_attributes: BTreeMap<&'a str, AttributeOptions>,
}

#[derive(Debug, Serialize)]
struct CommentText<'a> {
    text: &'a str,
}

/// Per-attribute options; an empty object requests defaults.
#[derive(Debug, Serialize, Default)]
struct AttributeOptions {}

impl PerspectiveClassifier {
    pub fn new(
        config: &PerspectiveConfig,
        user_agent: &str,
        api_key: &str,
        retry: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self> {
        let client = create_async_client(user_agent, Duration::from_secs(config.timeout_secs))?;
        Ok(Self {
            client: RateLimitedClient::new(client, retry, sleeper),
            endpoint: config.endpoint.clone(),
            api_key: api_key.to_string(),
            languages: config.languages.clone(),
            attributes: config.attributes.clone(),
        })
    }

    fn request_body<'a>(&'a self, text: &'a str) -> AnalyzeRequest<'a> {
        AnalyzeRequest {
            comment: CommentText { text },
            languages: &self.languages,
            requested_attributes: self
                .attributes
                .iter()
                .map(|name| (name.as_str(), AttributeOptions::default()))
                .collect(),
        }
    }
}

#[async_trait]
impl Classifier for PerspectiveClassifier {
    type Verdict = PerspectiveVerdict;

    fn name(&self) -> &str {
        "perspective"
    }

    async fn classify(&self, text: &str) -> std::result::Result<PerspectiveVerdict, CallError> {
        let body = self.request_body(text);
        self.client
            .call(&self.endpoint, |client| {
                client
                    .post(&self.endpoint)
                    .query(&[("key", self.api_key.as_str())])
                    .json(&body)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::TokioSleeper;

    #[test]
    fn test_moderation_request_shape() {
        let moderator = OpenAiModerator::new(
            &ModerationConfig::default(),
            "test-agent",
            "sk-test",
            RetryPolicy::default(),
            Arc::new(TokioSleeper),
        )
        .unwrap();

        let json = serde_json::to_value(moderator.request_body(">>1 hello")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"model": "omni-moderation-latest", "input": ">>1 hello"})
        );
    }

    #[test]
    fn test_perspective_request_shape() {
        let config = PerspectiveConfig {
            attributes: vec!["TOXICITY".into(), "INSULT".into()],
            ..PerspectiveConfig::default()
        };
        let classifier = PerspectiveClassifier::new(
            &config,
            "test-agent",
            "key",
            RetryPolicy::no_retry(),
            Arc::new(TokioSleeper),
        )
        .unwrap();

        let json = serde_json::to_value(classifier.request_body("hello")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "comment": {"text": "hello"},
                "languages": ["en"],
                "requestedAttributes": {"INSULT": {}, "TOXICITY": {}}
            })
        );
    }

    #[test]
    fn test_classifiers_from_config() {
        let credentials = Credentials::from_lookup(|_| Some("key".into())).unwrap();
        let classifiers =
            Classifiers::from_config(&Config::default(), &credentials, Arc::new(TokioSleeper))
                .unwrap();

        assert_eq!(classifiers.moderation.name(), "openai");
        assert_eq!(classifiers.perspective.name(), "perspective");
    }
}
