//! Backend client for calling the MarketingKreis API

use reqwest::{redirect, Client};
use tokio::time::{Duration, Instant};

use crate::config::BackendBase;
use crate::error::ForwardError;
use crate::proxy::forward::{ForwardedRequest, ForwardedResponse};

/// Budget for establishing a backend connection, inside the call deadline.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct BackendClient {
    http_client: Client,
    base_url: BackendBase,
    trace_calls: bool,
}

impl BackendClient {
    pub fn new(base_url: BackendBase, trace_calls: bool) -> Result<Self, ForwardError> {
        // No client-wide timeout: every call carries its own deadline.
        // Redirects and cookies belong to the browser, so neither is handled here.
        let http_client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(redirect::Policy::none())
            .user_agent(concat!("marketingkreis-edge/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http_client,
            base_url,
            trace_calls,
        })
    }

    pub fn base_url(&self) -> &BackendBase {
        &self.base_url
    }

    /// Send `request` and read the whole response within `deadline`.
    ///
    /// When the deadline fires the in-flight exchange is dropped, which
    /// aborts the connection.
    pub async fn send(
        &self,
        request: &ForwardedRequest,
        deadline: Duration,
    ) -> Result<ForwardedResponse, ForwardError> {
        let url = self.base_url.join(&request.path, request.query.as_deref());

        let mut builder = self
            .http_client
            .request(request.method.clone(), &url)
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let started = Instant::now();
        let exchange = async {
            let response = builder.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, headers, body))
        };

        let outcome = tokio::time::timeout(deadline, exchange).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Err(_) => {
                tracing::warn!(
                    method = %request.method,
                    path = %request.path,
                    elapsed_ms,
                    "Backend call timed out after {:?}",
                    deadline
                );
                Err(ForwardError::Timeout(deadline))
            }
            // No client-wide timeout is set, so only the connect budget can fire here.
            Ok(Err(e)) if e.is_timeout() => {
                tracing::warn!(method = %request.method, path = %request.path, elapsed_ms, "Backend connect timed out");
                Err(ForwardError::ConnectTimeout(CONNECT_TIMEOUT))
            }
            Ok(Err(e)) => {
                tracing::warn!(method = %request.method, path = %request.path, elapsed_ms, "Backend call failed: {}", e);
                Err(e.into())
            }
            Ok(Ok((status, headers, body))) => {
                if self.trace_calls {
                    tracing::info!(method = %request.method, path = %request.path, status = status.as_u16(), elapsed_ms, "backend call");
                } else {
                    tracing::debug!(method = %request.method, path = %request.path, status = status.as_u16(), elapsed_ms, "backend call");
                }
                Ok(ForwardedResponse::from_backend(status, &headers, body))
            }
        }
    }
}
