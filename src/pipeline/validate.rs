// src/pipeline/validate.rs

use crate::error::Result;
use crate::models::{Config, Credentials};
use crate::utils::log;

/// Validate configuration values and report whether credentials are present.
///
/// Missing credentials are reported but not fatal here; only commands that
/// annotate require them.
pub fn run_validate(config: &Config, credentials: Result<Credentials>) -> Result<()> {
    log::header("Validating configuration");

    if let Err(e) = config.validate() {
        ::log::error!("Config validation failed: {}", e);
        return Err(e);
    }

    log::sub_item(&format!(
        "Source: {}/{}/ (timeout {}s)",
        config.source.base_url, config.source.board, config.source.timeout_secs
    ));
    log::sub_item(&format!("User-Agent: {}", config.source.user_agent));
    log::sub_item(&format!(
        "Crawl target: {} posts, Analysis limit: {} posts in batches of {}",
        config.crawl.target_posts, config.analysis.limit, config.analysis.batch_size
    ));
    log::sub_item(&format!(
        "Retry: {} attempts, base {}",
        config.retry.max_attempts, config.retry.backoff_base
    ));
    log::sub_item(&format!(
        "Files: {} / {}",
        config.paths.posts_file.display(),
        config.paths.results_file.display()
    ));
    log::sub_item(&format!("Mode: {:?}", config.pipeline.mode));

    match credentials {
        Ok(_) => log::sub_item("Credentials: present"),
        Err(e) => ::log::warn!("{}", e),
    }

    ::log::info!("✓ Config OK");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn test_validate_accepts_defaults_without_credentials() {
        let missing = Credentials::from_lookup(|_| None);
        assert!(run_validate(&Config::default(), missing).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        let mut config = Config::default();
        config.analysis.batch_size = 0;

        let result = run_validate(&config, Credentials::from_lookup(|_| Some("k".into())));
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
