//! Fixed-interval dispatch throttle.
//!
//! Destinations are grouped into classes by host, so several webhooks on
//! the same chat service share one budget. Before a dispatch the limiter
//! sleeps until the interval since the last successful dispatch to that
//! class has passed. No queue, no adaptation.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::utils::get_domain;

#[derive(Debug, Clone)]
pub struct RateLimiter {
    interval: Duration,
    last_dispatch: HashMap<String, Instant>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_dispatch: HashMap::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Rate limit class of a destination: its host, or the whole string.
    pub fn class_of(destination: &str) -> String {
        get_domain(destination)
            .map(|host| host.to_ascii_lowercase())
            .unwrap_or_else(|| destination.to_string())
    }

    /// Wait until a dispatch to `destination` is allowed.
    pub async fn wait(&self, destination: &str) {
        if self.interval.is_zero() {
            return;
        }
        if let Some(last) = self.last_dispatch.get(&Self::class_of(destination)) {
            let ready_at = *last + self.interval;
            if ready_at > Instant::now() {
                log::debug!("Rate limit: waiting before next dispatch");
                tokio::time::sleep_until(ready_at).await;
            }
        }
    }

    /// Record a successful dispatch to `destination`.
    pub fn record(&mut self, destination: &str) {
        self.last_dispatch
            .insert(Self::class_of(destination), Instant::now());
    }
}
