//! MarketingKreis edge core library
//! Forwards browser API calls to the backend with cookie, CSRF and timeout handling

pub mod config;
pub mod error;
pub mod proxy;

pub use error::{ConfigError, ForwardError};
