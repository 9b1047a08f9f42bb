//! Fixed-window request limiter shared by every request a connector makes.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

struct Window {
    started: Instant,
    used: u32,
}

/// Allows at most `limit` acquisitions per `window`.
///
/// A caller that finds the window exhausted sleeps until it rolls over. The
/// lock is held while sleeping, so waiting callers are served in turn.
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    state: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            state: Mutex::new(Window {
                started: Instant::now(),
                used: 0,
            }),
        }
    }

    /// Limiter for a requests-per-minute budget.
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Wait until a request slot is available and claim it.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;

        if state.started.elapsed() >= self.window {
            state.started = Instant::now();
            state.used = 0;
        }

        if state.used >= self.limit {
            let wait = self.window.saturating_sub(state.started.elapsed());
            tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limit reached, waiting");
            tokio::time::sleep(wait).await;
            state.started = Instant::now();
            state.used = 0;
        }

        state.used += 1;
    }
}
