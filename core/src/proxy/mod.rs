//! Proxy module - edge forwarding layer between browser and backend API

pub mod cookies;
pub mod csrf;
pub mod forward;
pub mod handlers;
pub mod retry;
pub mod routes;
pub mod server;
pub mod timeouts;
pub mod upstream;

pub use forward::{ForwardedRequest, ForwardedResponse, Forwarder};
pub use server::{AppState, ProxyServer};
pub use timeouts::{RouteClass, TimeoutPolicy};
