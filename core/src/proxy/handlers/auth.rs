//! Auth handlers with behaviour beyond plain forwarding
//! Handles /api/auth/logout and /api/auth/register

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
};
use bytes::Bytes;
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{info, warn, Instrument};

use crate::config::RegistrationConfig;
use crate::error::ForwardError;
use crate::proxy::cookies::clear_session_cookies;
use crate::proxy::forward::{ForwardedRequest, ForwardedResponse, Forwarder};
use crate::proxy::handlers::request_id;
use crate::proxy::retry::RetrySchedule;
use crate::proxy::routes::{LOGOUT, REGISTER};
use crate::proxy::server::AppState;

/// Body fields the backend may use to hand out an email verification token.
const VERIFICATION_TOKEN_KEYS: [&str; 3] = ["verification_token", "verificationToken", "verify_token"];

/// Handle POST /api/auth/logout
///
/// A backend that is down or slow must not leave the browser logged in, so
/// transport failures end in a 200 that expires the session cookies locally.
pub async fn handle_logout(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let span = tracing::info_span!("logout", request_id = %request_id(&headers));

    async move {
        let request = match state.forwarder.prepare(&LOGOUT, method, &uri, &headers, body) {
            Ok(request) => request,
            Err(e) => return e.into_envelope(LOGOUT.envelope),
        };
        match state.forwarder.send(&LOGOUT, &request).await {
            Ok(response) => response.into_response(),
            Err(e) => {
                warn!("Logout did not reach backend ({}), clearing session cookies locally", e);
                degraded_logout(&e)
            }
        }
    }
    .instrument(span)
    .await
}

/// 200 with `degraded: true` and an expiry directive for every session cookie.
pub fn degraded_logout(cause: &ForwardError) -> Response {
    let mut response = (
        StatusCode::OK,
        Json(json!({
            "ok": true,
            "degraded": true,
            "detail": format!("Logged out locally: {}", cause),
        })),
    )
        .into_response();

    let headers = response.headers_mut();
    for cookie in clear_session_cookies() {
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            headers.append(header::SET_COOKIE, value);
        }
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// Registration settings: cold-start retries and server-side verification.
#[derive(Debug, Clone)]
pub struct RegistrationPolicy {
    pub retry: RetrySchedule,
    pub auto_verify: bool,
    pub verify_path: String,
}

impl RegistrationPolicy {
    pub fn from_config(config: &RegistrationConfig) -> Self {
        Self {
            retry: RetrySchedule::from_config(config),
            auto_verify: config.auto_verify,
            verify_path: config.verify_path.clone(),
        }
    }

    /// Keep the verification token away from the browser and, when enabled,
    /// redeem it against the backend. Verification failures are not fatal:
    /// the emailed link still works.
    async fn finish(&self, forwarder: &Forwarder, response: &mut ForwardedResponse) {
        let Some(mut body) = response.json_body() else {
            return;
        };
        if !has_verification_token(&body) {
            return;
        }

        let token = strip_verification_token(&mut body);
        if let (true, Some(token)) = (self.auto_verify, token) {
            if self.verify(forwarder, &token).await {
                body["autoVerified"] = Value::Bool(true);
            }
        }
        response.set_json_body(&body);
    }

    async fn verify(&self, forwarder: &Forwarder, token: &str) -> bool {
        let request = ForwardedRequest::json_post(&self.verify_path, &json!({ "token": token }));
        match forwarder.backend().send(&request, forwarder.timeouts().write()).await {
            Ok(r) if r.status.is_success() => {
                info!("Registration auto-verified");
                true
            }
            Ok(r) => {
                warn!("Auto-verification rejected by backend: {}", r.status);
                false
            }
            Err(e) => {
                warn!("Auto-verification failed: {}", e);
                false
            }
        }
    }
}

impl Default for RegistrationPolicy {
    fn default() -> Self {
        Self::from_config(&RegistrationConfig::default())
    }
}

fn has_verification_token(body: &Value) -> bool {
    body.as_object()
        .map_or(false, |obj| VERIFICATION_TOKEN_KEYS.iter().any(|k| obj.contains_key(*k)))
}

/// Remove every verification token field; returns the first string token.
fn strip_verification_token(body: &mut Value) -> Option<String> {
    let obj = body.as_object_mut()?;
    let mut token = None;
    for key in VERIFICATION_TOKEN_KEYS {
        if let Some(Value::String(value)) = obj.remove(key) {
            if token.is_none() && !value.is_empty() {
                token = Some(value);
            }
        }
    }
    token
}

/// Handle POST /api/auth/register
///
/// Retries only on the configured gateway statuses, following the delay
/// schedule; every attempt gets the cold-start deadline.
pub async fn handle_register(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let span = tracing::info_span!("register", request_id = %request_id(&headers));

    async move {
        let forwarder = &state.forwarder;
        let policy = &state.registration;
        let request = match forwarder.prepare(&REGISTER, method, &uri, &headers, body) {
            Ok(request) => request,
            Err(e) => return e.into_envelope(REGISTER.envelope),
        };

        let mut retries = 0;
        let mut response = loop {
            let response = match forwarder.send(&REGISTER, &request).await {
                Ok(r) => r,
                Err(e) => {
                    warn!("Registration failed after {} retries: {}", retries, e);
                    return e.into_envelope(REGISTER.envelope);
                }
            };

            if policy.retry.should_retry(response.status) {
                if let Some(delay) = policy.retry.delay_for(retries) {
                    retries += 1;
                    warn!(
                        "Registration got {}, retrying in {:?} ({}/{})",
                        response.status,
                        delay,
                        retries,
                        policy.retry.max_retries()
                    );
                    sleep(delay).await;
                    continue;
                }
            }
            break response;
        };

        if response.status.is_success() {
            policy.finish(forwarder, &mut response).await;
        }
        response.into_response()
    }
    .instrument(span)
    .await
}
