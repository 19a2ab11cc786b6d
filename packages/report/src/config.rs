//! Report pipeline configuration (TOML).
//!
//! Every field has a default, so an empty file (or no file) is valid.
//!
//! ```toml
//! api_version = "v19.0"
//! chunk_size = 40
//! concurrency = 15
//! max_retries = 3
//! base_delay_ms = 1000
//! display_limit = 5000
//! metrics = ["earnings", "views", "reach", "likes", "comments"]
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use wildlife_watch_report_models::Metric;

use crate::ReportError;
use crate::retry::RetryPolicy;

/// Default API host.
pub const DEFAULT_API_BASE_URL: &str = "https://graph.facebook.com";

/// Default API version path segment.
pub const DEFAULT_API_VERSION: &str = "v19.0";

/// IDs per batched request. The API rejects larger batches.
pub const DEFAULT_CHUNK_SIZE: usize = 40;

/// Concurrent chunk workers.
pub const DEFAULT_CONCURRENCY: usize = 15;

/// Retries per request unit before isolation kicks in.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Backoff base delay.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// Results kept in the live view.
pub const DEFAULT_DISPLAY_LIMIT: usize = 5000;

/// Pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    /// API host, without version.
    pub api_base_url: String,
    /// API version path segment.
    pub api_version: String,
    /// IDs per batched request.
    pub chunk_size: usize,
    /// Concurrent chunk workers.
    pub concurrency: usize,
    /// Retries per request unit.
    pub max_retries: u32,
    /// Backoff base delay in milliseconds.
    pub base_delay_ms: u64,
    /// Results kept in the live view.
    pub display_limit: usize,
    /// Metrics to fetch.
    pub metrics: Vec<Metric>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            display_limit: DEFAULT_DISPLAY_LIMIT,
            metrics: Metric::ALL.to_vec(),
        }
    }
}

impl ReportConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError`] if the TOML is malformed or a value is out
    /// of range.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ReportError> {
        let config: Self = toml::de::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the config at `path`, or the defaults when `path` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError`] if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ReportError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        log::info!("Loading report config from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// The retry policy for request units.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
        }
    }

    /// Versioned API root, e.g. `https://graph.facebook.com/v19.0`.
    #[must_use]
    pub fn api_root(&self) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            self.api_version.trim_matches('/')
        )
    }

    fn validate(&self) -> Result<(), ReportError> {
        let invalid = |message: &str| {
            Err(ReportError::Config {
                message: message.to_string(),
            })
        };
        if self.chunk_size == 0 {
            return invalid("chunk_size must be at least 1");
        }
        if self.concurrency == 0 {
            return invalid("concurrency must be at least 1");
        }
        if self.metrics.is_empty() {
            return invalid("metrics must name at least one metric");
        }
        Ok(())
    }
}
