//! Deadline tiers for backend calls

use axum::http::Method;
use tokio::time::Duration;

use crate::config::TimeoutsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Read deadline for GET/HEAD, write deadline otherwise.
    Standard,
    /// Uploads, imports, report generation.
    LongRunning,
    /// Flows that must survive a backend cold start.
    ColdStart,
}

#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    read: Duration,
    write: Duration,
    long_running: Duration,
    cold_start: Duration,
}

impl TimeoutPolicy {
    pub fn from_config(config: &TimeoutsConfig) -> Self {
        Self {
            read: Duration::from_millis(config.read_ms),
            write: Duration::from_millis(config.write_ms),
            long_running: Duration::from_millis(config.long_running_ms),
            cold_start: Duration::from_millis(config.cold_start_ms),
        }
    }

    pub fn deadline(&self, method: &Method, class: RouteClass) -> Duration {
        match class {
            RouteClass::ColdStart => self.cold_start,
            RouteClass::LongRunning => self.long_running,
            RouteClass::Standard if matches!(*method, Method::GET | Method::HEAD) => self.read,
            RouteClass::Standard => self.write,
        }
    }

    pub fn write(&self) -> Duration {
        self.write
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::from_config(&TimeoutsConfig::default())
    }
}
