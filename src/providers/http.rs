use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use crate::config::HttpConfig;

const EXPONENTIAL_BACKOFF_BASE: u32 = 2;
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Blocking JSON client with retry on transport errors, rate limits and server errors
#[derive(Debug, Clone)]
pub struct HttpClient {
    agent: ureq::Agent,
    retry_attempts: u32,
    initial_backoff: Duration,
}

impl HttpClient {
    #[inline]
    pub fn new(config: &HttpConfig) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout()))
            .build()
            .into();

        Self {
            agent,
            retry_attempts: config.retry_attempts.max(1),
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
        }
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    #[inline]
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// POST a JSON body and decode the JSON response
    pub fn post_json<B, R>(&self, url: &str, headers: &[(&str, &str)], body: &B) -> Result<R>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let request_json = serde_json::to_string(body).context("Failed to serialize request")?;
        debug!("POST {} ({} bytes)", url, request_json.len());

        let response_text = self.make_request_with_retry(url, || {
            let mut request = self
                .agent
                .post(url)
                .header("Content-Type", "application/json");
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
            request
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        serde_json::from_str(&response_text)
            .with_context(|| format!("Failed to parse response from {}", url))
    }

    fn make_request_with_retry<F>(&self, url: &str, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    match &error {
                        ureq::Error::StatusCode(status) if *status == 429 || *status >= 500 => {
                            warn!(
                                "Server returned {}, attempt {}/{}",
                                status, attempt, self.retry_attempts
                            );
                        }
                        ureq::Error::StatusCode(status @ (401 | 403)) => {
                            warn!("Authentication rejected (status {}), not retrying", status);
                            return Err(anyhow::anyhow!(
                                "Authentication failed: HTTP {} (check the API key)",
                                status
                            ));
                        }
                        ureq::Error::StatusCode(status) => {
                            warn!("Client error (status {}), not retrying", status);
                            return Err(anyhow::anyhow!("Client error: HTTP {}", status));
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            return Err(anyhow::anyhow!("Non-retryable error: {}", error));
                        }
                    }

                    last_error = Some(anyhow::anyhow!("Request error: {}", error));

                    if attempt < self.retry_attempts {
                        let delay = self.initial_backoff * EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", url);

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}

/// Run a blocking HTTP exchange off the async runtime
pub(crate) async fn run_blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .context("Blocking HTTP task failed to complete")?
}
