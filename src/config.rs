//! Crawl configuration.
//!
//! Defaults mirror what the hot-search crawler has always used. A YAML file
//! can override any subset of fields:
//!
//! ```yaml
//! max_attempts: 5
//! jitter_min_ms: 2000
//! jitter_max_ms: 5000
//! endpoints_json:
//!   - https://weibo.com/ajax/side/hotSearch
//! ```

use crate::error::ConfigError;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, instrument};

const DEFAULT_USER_AGENTS: [&str; 6] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:120.0) Gecko/20100101 Firefox/120.0",
];

/// Settings for fetching and extracting one hot-search list.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Candidate pages for the HTML hot-search list.
    pub endpoints_html: Vec<String>,
    /// Candidate endpoints for the JSON hot-search API.
    pub endpoints_json: Vec<String>,
    /// Origin used to resolve relative links.
    pub site_origin: String,
    pub max_attempts: u32,
    pub timeout_secs: u64,
    /// Lower bound of the random pause before every attempt.
    pub jitter_min_ms: u64,
    /// Upper bound of the random pause before every attempt.
    pub jitter_max_ms: u64,
    /// Cap for the extra exponential backoff added after failed attempts.
    pub max_backoff_ms: u64,
    /// Bodies shorter than this are treated as anti-bot interstitials.
    pub min_body_bytes: usize,
    pub max_items: usize,
    pub user_agents: Vec<String>,
    pub webdriver_url: String,
    pub browser_headless: bool,
    pub browser_settle_min_ms: u64,
    pub browser_settle_max_ms: u64,
    /// Topics analysed at the same time.
    pub concurrency: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            endpoints_html: vec![
                "https://s.weibo.com/top/summary".to_string(),
                "https://s.weibo.com/top/summary?cate=realtimehot".to_string(),
            ],
            endpoints_json: vec![
                "https://weibo.com/ajax/side/hotSearch".to_string(),
                "https://weibo.com/ajax/statuses/hot_band".to_string(),
                "https://m.weibo.cn/api/container/getIndex?containerid=106003type%3D25%26t%3D3%26disable_hot%3D1%26filter_type%3Drealtimehot".to_string(),
            ],
            site_origin: "https://s.weibo.com".to_string(),
            max_attempts: 3,
            timeout_secs: 10,
            jitter_min_ms: 1_000,
            jitter_max_ms: 3_000,
            max_backoff_ms: 5_000,
            min_body_bytes: 500,
            max_items: 50,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            webdriver_url: "http://localhost:9515".to_string(),
            browser_headless: true,
            browser_settle_min_ms: 3_000,
            browser_settle_max_ms: 6_000,
            concurrency: 4,
        }
    }
}

impl CrawlConfig {
    /// Load a YAML override file on top of the defaults.
    #[instrument(level = "info", skip_all, fields(path = %path))]
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        let config = Self::from_yaml(&raw)?;
        info!(max_attempts = config.max_attempts, "Loaded crawl configuration");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let config: CrawlConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the fetcher cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        if self.jitter_min_ms == 0 {
            return Err(ConfigError::Invalid("jitter_min_ms must be positive".into()));
        }
        if self.jitter_min_ms > self.jitter_max_ms {
            return Err(ConfigError::Invalid(format!(
                "jitter window {}..{} ms is empty",
                self.jitter_min_ms, self.jitter_max_ms
            )));
        }
        if self.browser_settle_min_ms > self.browser_settle_max_ms {
            return Err(ConfigError::Invalid("browser settle window is empty".into()));
        }
        if self.user_agents.is_empty() {
            return Err(ConfigError::Invalid("user_agents must not be empty".into()));
        }
        if self.max_items == 0 {
            return Err(ConfigError::Invalid("max_items must be at least 1".into()));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
