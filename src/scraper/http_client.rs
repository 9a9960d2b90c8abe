use crate::config::ScraperConfig;
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::FixedInterval;
use tracing::{debug, warn};
use url::Url;

use super::error::{DriverError, Result};

/// reqwest client with a bounded per-request timeout and fixed-interval retries.
pub struct HttpClient {
    inner: reqwest::Client,
    max_retries: usize,
    retry_delay: Duration,
}

impl HttpClient {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .cookie_store(true)
            .build()
            .map_err(|e| DriverError::Setup(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            inner,
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    /// Fetch a URL as text. Transient failures are retried `max_retries` times.
    pub async fn get_text(&self, url: &Url) -> Result<String> {
        let strategy = FixedInterval::new(self.retry_delay).take(self.max_retries);

        let mut attempt = 0u32;
        RetryIf::start(
            strategy,
            || {
                attempt += 1;
                self.try_get(url, attempt)
            },
            |e: &DriverError| {
                let retry = e.is_transient();
                if retry {
                    warn!("Request failed, retrying: {}", e);
                }
                retry
            },
        )
        .await
    }

    async fn try_get(&self, url: &Url, attempt: u32) -> Result<String> {
        debug!("GET {} (attempt {})", url, attempt);

        let resp = self
            .inner
            .get(url.clone())
            .header("X-Requested-With", "XMLHttpRequest")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DriverError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(resp.text().await?)
    }
}
