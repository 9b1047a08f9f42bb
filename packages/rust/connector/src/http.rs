//! Rate-limited HTTP GET with a single backoff retry on HTTP 429.

use std::time::Duration;

use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use reconcile_shared::{ReconcileError, Result};

use crate::rate_limit::RateLimiter;

/// User-Agent string for authority-source requests.
const USER_AGENT: &str = concat!("reconcile-works/", env!("CARGO_PKG_VERSION"));

/// A completed HTTP exchange, whatever its status.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub status: StatusCode,
    pub body: String,
}

impl Fetched {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Outcome of a single attempt before retry handling.
enum Attempt {
    Response(Fetched),
    TooManyRequests(Option<Duration>),
    /// Connection refused, timeout, or an unreadable body.
    Broken(String),
}

/// HTTP client bound to one authority source and its request budget.
pub struct HttpFetcher {
    client: Client,
    limiter: RateLimiter,
    retry_backoff: Duration,
    source_name: &'static str,
}

impl HttpFetcher {
    pub fn new(
        source_name: &'static str,
        requests_per_minute: u32,
        timeout: Duration,
        retry_backoff: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()
            .map_err(|e| ReconcileError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            limiter: RateLimiter::per_minute(requests_per_minute),
            retry_backoff,
            source_name,
        })
    }

    pub fn source_name(&self) -> &'static str {
        self.source_name
    }

    /// GET `url`, waiting on the rate limiter first.
    ///
    /// Any status other than 429 is returned to the caller. A 429 is retried
    /// once after `Retry-After` (or the configured backoff); a second 429 is
    /// [`ReconcileError::RateLimited`]. Transport failures are
    /// [`ReconcileError::Network`].
    pub async fn get(&self, url: &str, accept: &str) -> Result<Fetched> {
        match self.attempt(url, accept).await {
            Attempt::Response(fetched) => Ok(fetched),
            Attempt::Broken(reason) => Err(self.broken(url, reason)),
            Attempt::TooManyRequests(retry_after) => {
                let wait = retry_after.unwrap_or(self.retry_backoff);
                warn!(
                    source = self.source_name,
                    %url,
                    wait_secs = wait.as_secs(),
                    "HTTP 429, backing off before retry"
                );
                tokio::time::sleep(wait).await;

                match self.attempt(url, accept).await {
                    Attempt::Response(fetched) => Ok(fetched),
                    Attempt::Broken(reason) => Err(self.broken(url, reason)),
                    Attempt::TooManyRequests(_) => Err(ReconcileError::RateLimited {
                        source_name: self.source_name.to_string(),
                    }),
                }
            }
        }
    }

    /// GET `url` and require a 2xx status.
    pub async fn get_ok(&self, url: &str, accept: &str) -> Result<String> {
        let fetched = self.get(url, accept).await?;
        if !fetched.is_success() {
            return Err(ReconcileError::Network(format!(
                "HTTP {} from {url}",
                fetched.status.as_u16()
            )));
        }
        Ok(fetched.body)
    }

    async fn attempt(&self, url: &str, accept: &str) -> Attempt {
        self.limiter.acquire().await;
        debug!(source = self.source_name, %url, "GET");

        let resp = match self.client.get(url).header(ACCEPT, accept).send().await {
            Ok(resp) => resp,
            Err(e) => return Attempt::Broken(e.to_string()),
        };

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Attempt::TooManyRequests(retry_after);
        }

        match resp.text().await {
            Ok(body) => Attempt::Response(Fetched { status, body }),
            Err(e) => Attempt::Broken(e.to_string()),
        }
    }

    fn broken(&self, url: &str, reason: String) -> ReconcileError {
        warn!(source = self.source_name, %url, %reason, "request failed");
        ReconcileError::Network(format!("{url}: {reason}"))
    }
}
