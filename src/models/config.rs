//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Board API settings
    #[serde(default)]
    pub source: SourceConfig,

    /// Collection phase settings
    #[serde(default)]
    pub crawl: CrawlConfig,

    /// Annotation phase settings
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Throttling retry policy shared by the source and classifier A
    #[serde(default)]
    pub retry: RetryConfig,

    /// Classifier A (moderation endpoint)
    #[serde(default)]
    pub moderation: ModerationConfig,

    /// Classifier B (comment analyzer)
    #[serde(default)]
    pub perspective: PerspectiveConfig,

    /// Record stream locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Phase sequencing
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.source.user_agent.trim().is_empty() {
            return Err(AppError::validation("source.user_agent is empty"));
        }
        if self.source.board.trim().is_empty() {
            return Err(AppError::validation("source.board is empty"));
        }
        if self.source.timeout_secs == 0 {
            return Err(AppError::validation("source.timeout_secs must be > 0"));
        }
        url::Url::parse(&self.source.base_url)?;
        url::Url::parse(&self.moderation.endpoint)?;
        url::Url::parse(&self.perspective.endpoint)?;

        if self.moderation.timeout_secs == 0 || self.perspective.timeout_secs == 0 {
            return Err(AppError::validation("classifier timeouts must be > 0"));
        }
        if self.moderation.model.trim().is_empty() {
            return Err(AppError::validation("moderation.model is empty"));
        }
        if self.perspective.attributes.is_empty() {
            return Err(AppError::validation(
                "perspective.attributes must name at least one attribute",
            ));
        }
        for attempts in [self.retry.max_attempts, self.perspective.max_attempts] {
            if attempts == 0 || attempts > RetryConfig::MAX_ATTEMPTS {
                return Err(AppError::validation(format!(
                    "max_attempts must be between 1 and {}",
                    RetryConfig::MAX_ATTEMPTS
                )));
            }
        }
        let base = self.retry.backoff_base;
        if !base.is_finite() || !(1.0..=RetryConfig::MAX_BACKOFF_BASE).contains(&base) {
            return Err(AppError::validation(format!(
                "retry.backoff_base must be between 1.0 and {}",
                RetryConfig::MAX_BACKOFF_BASE
            )));
        }
        if self.analysis.batch_size == 0 {
            return Err(AppError::validation("analysis.batch_size must be > 0"));
        }
        if self.analysis.max_concurrent == 0 {
            return Err(AppError::validation("analysis.max_concurrent must be > 0"));
        }
        if self.paths.posts_file == self.paths.results_file {
            return Err(AppError::validation(
                "paths.posts_file and paths.results_file must differ",
            ));
        }
        Ok(())
    }
}

/// Board API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// API root, e.g. `https://a.4cdn.org`
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Board short name
    #[serde(default = "defaults::board")]
    pub board: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::source_timeout")]
    pub timeout_secs: u64,
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            board: defaults::board(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::source_timeout(),
        }
    }
}

/// Collection phase settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Number of new posts to collect per run
    #[serde(default = "defaults::target_posts")]
    pub target_posts: usize,

    /// Delay after every thread fetch
    #[serde(default = "defaults::inter_thread_delay")]
    pub inter_thread_delay_ms: u64,

    /// Extra pause after a failed thread fetch
    #[serde(default = "defaults::thread_failure_cooldown")]
    pub thread_failure_cooldown_ms: u64,

    /// Pause before refetching a failed or empty catalog
    #[serde(default = "defaults::catalog_failure_cooldown")]
    pub catalog_failure_cooldown_ms: u64,

    /// Rebuild the seen-set from the posts file at startup
    #[serde(default = "defaults::enabled")]
    pub rebuild_seen_set: bool,
}

impl CrawlConfig {
    pub fn inter_thread_delay(&self) -> Duration {
        Duration::from_millis(self.inter_thread_delay_ms)
    }

    pub fn thread_failure_cooldown(&self) -> Duration {
        Duration::from_millis(self.thread_failure_cooldown_ms)
    }

    pub fn catalog_failure_cooldown(&self) -> Duration {
        Duration::from_millis(self.catalog_failure_cooldown_ms)
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            target_posts: defaults::target_posts(),
            inter_thread_delay_ms: defaults::inter_thread_delay(),
            thread_failure_cooldown_ms: defaults::thread_failure_cooldown(),
            catalog_failure_cooldown_ms: defaults::catalog_failure_cooldown(),
            rebuild_seen_set: defaults::enabled(),
        }
    }
}

/// Annotation phase settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Number of leading raw records considered per run
    #[serde(default = "defaults::analysis_limit")]
    pub limit: usize,

    /// Posts per batch
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,

    /// Pause after each post's classifier calls
    #[serde(default = "defaults::post_cooldown")]
    pub post_cooldown_ms: u64,

    /// Pause after each batch
    #[serde(default = "defaults::batch_cooldown")]
    pub batch_cooldown_ms: u64,

    /// Posts in flight at once within a batch (1 = sequential)
    #[serde(default = "defaults::analysis_concurrency")]
    pub max_concurrent: usize,

    /// Skip posts that already have a result record
    #[serde(default = "defaults::enabled")]
    pub skip_analyzed: bool,
}

impl AnalysisConfig {
    pub fn post_cooldown(&self) -> Duration {
        Duration::from_millis(self.post_cooldown_ms)
    }

    pub fn batch_cooldown(&self) -> Duration {
        Duration::from_millis(self.batch_cooldown_ms)
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            limit: defaults::analysis_limit(),
            batch_size: defaults::batch_size(),
            post_cooldown_ms: defaults::post_cooldown(),
            batch_cooldown_ms: defaults::batch_cooldown(),
            max_concurrent: defaults::analysis_concurrency(),
            skip_analyzed: defaults::enabled(),
        }
    }
}

/// Exponential backoff settings for throttled calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "defaults::backoff_base")]
    pub backoff_base: f64,
}

impl RetryConfig {
    pub const MAX_ATTEMPTS: u32 = 20;
    pub const MAX_BACKOFF_BASE: f64 = 60.0;
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            backoff_base: defaults::backoff_base(),
        }
    }
}

/// Classifier A settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    #[serde(default = "defaults::moderation_endpoint")]
    pub endpoint: String,

    #[serde(default = "defaults::moderation_model")]
    pub model: String,

    #[serde(default = "defaults::classifier_timeout")]
    pub timeout_secs: u64,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::moderation_endpoint(),
            model: defaults::moderation_model(),
            timeout_secs: defaults::classifier_timeout(),
        }
    }
}

/// Classifier B settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerspectiveConfig {
    #[serde(default = "defaults::perspective_endpoint")]
    pub endpoint: String,

    #[serde(default = "defaults::languages")]
    pub languages: Vec<String>,

    /// Requested attributes, e.g. `TOXICITY`
    #[serde(default = "defaults::attributes")]
    pub attributes: Vec<String>,

    #[serde(default = "defaults::classifier_timeout")]
    pub timeout_secs: u64,

    /// Any non-200 is terminal by default
    #[serde(default = "defaults::single_attempt")]
    pub max_attempts: u32,
}

impl Default for PerspectiveConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::perspective_endpoint(),
            languages: defaults::languages(),
            attributes: defaults::attributes(),
            timeout_secs: defaults::classifier_timeout(),
            max_attempts: defaults::single_attempt(),
        }
    }
}

/// Record stream file locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "defaults::posts_file")]
    pub posts_file: PathBuf,

    #[serde(default = "defaults::results_file")]
    pub results_file: PathBuf,

    /// `sync_data` after every append
    #[serde(default = "defaults::enabled")]
    pub durable_writes: bool,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            posts_file: defaults::posts_file(),
            results_file: defaults::results_file(),
            durable_writes: defaults::enabled(),
        }
    }
}

/// How the two phases are sequenced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    /// Crawl to target, then annotate
    #[default]
    Sequential,
    /// Annotate while the crawler is still collecting
    Concurrent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub mode: PipelineMode,

    /// How often the annotator re-reads the posts file in concurrent mode
    #[serde(default = "defaults::poll_interval")]
    pub poll_interval_ms: u64,
}

impl PipelineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: PipelineMode::default(),
            poll_interval_ms: defaults::poll_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

/// API keys for the two classifiers.
#[derive(Clone)]
pub struct Credentials {
    pub openai_api_key: String,
    pub perspective_api_key: String,
}

impl Credentials {
    pub const OPENAI_VAR: &'static str = "OPENAI_API_KEY";
    pub const PERSPECTIVE_VAR: &'static str = "PERSPECTIVE_API_KEY";

    /// Read both keys from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read both keys through `lookup`, failing on the first missing one.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let require = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| {
                    AppError::config(format!("Please set the {name} environment variable"))
                })
        };

        Ok(Self {
            openai_api_key: require(Self::OPENAI_VAR)?,
            perspective_api_key: require(Self::PERSPECTIVE_VAR)?,
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("openai_api_key", &"<redacted>")
            .field("perspective_api_key", &"<redacted>")
            .finish()
    }
}

mod defaults {
    use std::path::PathBuf;

    pub fn enabled() -> bool {
        true
    }

    // Source defaults
    pub fn base_url() -> String {
        "https://a.4cdn.org".into()
    }
    pub fn board() -> String {
        "pol".into()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; board-harvester/0.1)".into()
    }
    pub fn source_timeout() -> u64 {
        10
    }

    // Crawl defaults
    pub fn target_posts() -> usize {
        5000
    }
    pub fn inter_thread_delay() -> u64 {
        1000
    }
    pub fn thread_failure_cooldown() -> u64 {
        2000
    }
    pub fn catalog_failure_cooldown() -> u64 {
        5000
    }

    // Analysis defaults
    pub fn analysis_limit() -> usize {
        1000
    }
    pub fn batch_size() -> usize {
        5
    }
    pub fn post_cooldown() -> u64 {
        1000
    }
    pub fn batch_cooldown() -> u64 {
        5000
    }
    pub fn analysis_concurrency() -> usize {
        1
    }

    // Retry defaults
    pub fn max_attempts() -> u32 {
        5
    }
    pub fn backoff_base() -> f64 {
        2.0
    }
    pub fn single_attempt() -> u32 {
        1
    }

    // Classifier defaults
    pub fn moderation_endpoint() -> String {
        "https://api.openai.com/v1/moderations".into()
    }
    pub fn moderation_model() -> String {
        "omni-moderation-latest".into()
    }
    pub fn perspective_endpoint() -> String {
        "https://commentanalyzer.googleapis.com/v1alpha1/comments:analyze".into()
    }
    pub fn languages() -> Vec<String> {
        vec!["en".into()]
    }
    pub fn attributes() -> Vec<String> {
        vec!["TOXICITY".into()]
    }
    pub fn classifier_timeout() -> u64 {
        30
    }

    // Paths
    pub fn posts_file() -> PathBuf {
        PathBuf::from("data/posts.jsonl")
    }
    pub fn results_file() -> PathBuf {
        PathBuf::from("data/results.jsonl")
    }

    pub fn poll_interval() -> u64 {
        2000
    }
    pub fn log_level() -> String {
        "info".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn defaults_keep_collect_and_analyze_limits_independent() {
        let config = Config::default();
        assert_eq!(config.crawl.target_posts, 5000);
        assert_eq!(config.analysis.limit, 1000);
        assert_eq!(config.analysis.batch_size, 5);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.perspective.max_attempts, 1);
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.source.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_batch_size() {
        let mut config = Config::default();
        config.analysis.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_url() {
        let mut config = Config::default();
        config.source.base_url = "not a url".to_string();
        assert!(matches!(config.validate(), Err(AppError::Url(_))));
    }

    #[test]
    fn validate_rejects_shared_stream_file() {
        let mut config = Config::default();
        config.paths.results_file = config.paths.posts_file.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unusable_backoff() {
        for base in ["nan", "inf", "1e7", "0.5"] {
            let config: Config =
                toml::from_str(&format!("[retry]\nbackoff_base = {base}\n")).unwrap();
            assert!(
                matches!(config.validate(), Err(AppError::Validation(_))),
                "backoff_base = {base} accepted"
            );
        }

        let mut config = Config::default();
        config.retry.backoff_base = RetryConfig::MAX_BACKOFF_BASE;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_bounds_max_attempts() {
        let mut config = Config::default();
        config.retry.max_attempts = RetryConfig::MAX_ATTEMPTS + 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.perspective.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [crawl]
            target_posts = 10

            [pipeline]
            mode = "concurrent"
            "#,
        )
        .unwrap();

        assert_eq!(config.crawl.target_posts, 10);
        assert_eq!(config.crawl.inter_thread_delay_ms, 1000);
        assert_eq!(config.pipeline.mode, PipelineMode::Concurrent);
        assert_eq!(config.source.board, "pol");
    }

    #[test]
    fn load_reads_file_and_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[analysis]\nlimit = 7\n").unwrap();

        assert_eq!(Config::load(&path).unwrap().analysis.limit, 7);

        let missing = Config::load_or_default(dir.path().join("missing.toml"));
        assert_eq!(missing.analysis.limit, 1000);
    }

    #[test]
    fn credentials_require_both_keys() {
        let err = Credentials::from_lookup(|name| {
            (name == Credentials::OPENAI_VAR).then(|| "sk-test".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("PERSPECTIVE_API_KEY"));

        let err = Credentials::from_lookup(|_| Some("   ".to_string())).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));

        let creds = Credentials::from_lookup(|_| Some("key".to_string())).unwrap();
        assert_eq!(creds.openai_api_key, "key");
        assert!(!format!("{creds:?}").contains("\"key\""));
    }
}
