use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::kernel::jobs::RetryPolicy;
use crate::kernel::IngestSettings;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Remote extraction is disabled when unset
    pub firecrawl_api_key: Option<String>,
    pub firecrawl_base_url: Option<String>,
    /// JSON source registry; the embedded registry is used when unset
    pub source_registry_path: Option<PathBuf>,
    pub job_max_attempts: u32,
    pub job_backoff_base: Duration,
    pub job_retention: chrono::Duration,
    pub purge_schedule: String,
    /// Periodic enqueue-all; disabled when unset
    pub scrape_schedule: Option<String>,
    pub worker_concurrency: usize,
    pub rate_limit_window: Duration,
    pub rate_limit_max_requests: u32,
    pub remote_batch_size: usize,
    pub remote_batch_delay: Duration,
}

/// Parse an optional variable, falling back to `default` when unset.
fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match non_empty(name) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{} must be a valid number", name)),
        None => Ok(default),
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            firecrawl_api_key: non_empty("FIRECRAWL_API_KEY"),
            firecrawl_base_url: non_empty("FIRECRAWL_BASE_URL"),
            source_registry_path: non_empty("SOURCE_REGISTRY_PATH").map(PathBuf::from),
            job_max_attempts: parse_var("JOB_MAX_ATTEMPTS", 3)?,
            job_backoff_base: Duration::from_millis(parse_var("JOB_BACKOFF_BASE_MS", 5_000)?),
            job_retention: chrono::Duration::hours(parse_var("JOB_RETENTION_HOURS", 24)?),
            purge_schedule: non_empty("PURGE_SCHEDULE")
                .unwrap_or_else(|| "0 0 * * * *".to_string()),
            scrape_schedule: non_empty("SCRAPE_SCHEDULE"),
            worker_concurrency: parse_var("WORKER_CONCURRENCY", 2)?,
            rate_limit_window: Duration::from_secs(parse_var("RATE_LIMIT_WINDOW_SECS", 900)?),
            rate_limit_max_requests: parse_var("RATE_LIMIT_MAX_REQUESTS", 100)?,
            remote_batch_size: parse_var("REMOTE_BATCH_SIZE", 5)?,
            remote_batch_delay: Duration::from_millis(parse_var("REMOTE_BATCH_DELAY_MS", 1_000)?),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.job_max_attempts, self.job_backoff_base)
    }

    pub fn ingest_settings(&self) -> IngestSettings {
        IngestSettings {
            remote_batch_size: self.remote_batch_size,
            remote_batch_delay: self.remote_batch_delay,
            job_retention: self.job_retention,
            ..IngestSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_var_falls_back_when_unset_or_blank() {
        env::remove_var("BILLS_TEST_UNSET_VAR");
        assert_eq!(parse_var("BILLS_TEST_UNSET_VAR", 7u32).unwrap(), 7);

        env::set_var("BILLS_TEST_BLANK_VAR", "   ");
        assert_eq!(parse_var("BILLS_TEST_BLANK_VAR", 7u32).unwrap(), 7);
    }

    #[test]
    fn parse_var_rejects_garbage() {
        env::set_var("BILLS_TEST_BAD_VAR", "three");
        let err = parse_var("BILLS_TEST_BAD_VAR", 3u32).unwrap_err();
        assert!(err.to_string().contains("BILLS_TEST_BAD_VAR"));
    }

    #[test]
    fn retry_policy_uses_configured_budget() {
        let config = Config {
            database_url: "postgres://localhost/bills".to_string(),
            firecrawl_api_key: None,
            firecrawl_base_url: None,
            source_registry_path: None,
            job_max_attempts: 4,
            job_backoff_base: Duration::from_millis(250),
            job_retention: chrono::Duration::hours(24),
            purge_schedule: "0 0 * * * *".to_string(),
            scrape_schedule: None,
            worker_concurrency: 2,
            rate_limit_window: Duration::from_secs(900),
            rate_limit_max_requests: 100,
            remote_batch_size: 3,
            remote_batch_delay: Duration::from_millis(10),
        };

        let retry = config.retry_policy();
        assert_eq!(retry.max_attempts, 4);
        assert_eq!(retry.base_delay, Duration::from_millis(250));

        let settings = config.ingest_settings();
        assert_eq!(settings.remote_batch_size, 3);
        assert_eq!(settings.remote_batch_delay, Duration::from_millis(10));
    }
}
