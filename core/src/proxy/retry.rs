//! Bounded retry schedule for cold-start tolerant flows.

use axum::http::StatusCode;
use tokio::time::Duration;

use crate::config::RegistrationConfig;

#[derive(Debug, Clone)]
pub struct RetrySchedule {
    delays: Vec<Duration>,
    statuses: Vec<u16>,
}

impl RetrySchedule {
    pub fn new(delays: Vec<Duration>, statuses: Vec<u16>) -> Self {
        Self { delays, statuses }
    }

    pub fn from_config(config: &RegistrationConfig) -> Self {
        Self::new(
            config.retry_delays_ms.iter().copied().map(Duration::from_millis).collect(),
            config.retry_statuses.clone(),
        )
    }

    pub fn should_retry(&self, status: StatusCode) -> bool {
        self.statuses.contains(&status.as_u16())
    }

    /// Delay before retry number `retry` (0-based), `None` once exhausted.
    pub fn delay_for(&self, retry: usize) -> Option<Duration> {
        self.delays.get(retry).copied()
    }

    pub fn max_retries(&self) -> usize {
        self.delays.len()
    }
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self::from_config(&RegistrationConfig::default())
    }
}
