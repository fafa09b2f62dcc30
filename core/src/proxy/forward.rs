//! Request forwarding: build the outbound request from an inbound one and
//! relay the backend's answer.

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::Response,
};
use bytes::Bytes;
use serde_json::Value;
use tokio::time::Duration;

use crate::error::ForwardError;
use crate::proxy::csrf::{csrf_token_for, current_origin, CSRF_HEADER};
use crate::proxy::routes::ResourceRoute;
use crate::proxy::timeouts::{RouteClass, TimeoutPolicy};
use crate::proxy::upstream::client::BackendClient;

/// Marker the backend sets when a login needs a second factor.
pub const TWO_FACTOR_HEADER: &str = "x-2fa-required";

/// Backend response headers relayed to the browser. `set-cookie` is handled
/// separately because it may repeat.
const RELAYED_RESPONSE_HEADERS: [&str; 5] = [
    "content-type",
    "content-disposition",
    "cache-control",
    "location",
    TWO_FACTOR_HEADER,
];

#[derive(Debug, Clone)]
pub struct ForwardedRequest {
    pub method: Method,
    /// Backend path with leading slash.
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    /// `None` for GET/HEAD and empty bodies.
    pub body: Option<Bytes>,
}

impl ForwardedRequest {
    /// Copy the forwardable parts of an inbound request.
    ///
    /// Outbound headers are cookie, content-type, the CSRF token and the
    /// route's extra headers. Nothing else crosses. Paths that leave the
    /// route's prefix are refused.
    pub fn from_inbound(
        route: &ResourceRoute,
        method: Method,
        uri: &Uri,
        inbound: &HeaderMap,
        body: Bytes,
        origin: Option<&str>,
    ) -> Result<Self, ForwardError> {
        let path = route
            .backend_path(uri.path())
            .ok_or_else(|| ForwardError::Unroutable(uri.path().to_string()))?;

        let mut headers = HeaderMap::new();
        for value in inbound.get_all(header::COOKIE) {
            headers.append(header::COOKIE, value.clone());
        }
        if let Some(ct) = inbound.get(header::CONTENT_TYPE) {
            headers.insert(header::CONTENT_TYPE, ct.clone());
        }
        if let Some(token) = csrf_token_for(&method, inbound, origin) {
            if let Ok(value) = HeaderValue::from_str(&token) {
                headers.insert(HeaderName::from_static(CSRF_HEADER), value);
            }
        }
        for &name in route.extra_headers {
            if let Some(value) = inbound.get(name) {
                headers.insert(HeaderName::from_static(name), value.clone());
            }
        }

        let body = match method {
            Method::GET | Method::HEAD => None,
            _ if body.is_empty() => None,
            _ => Some(body),
        };

        Ok(Self {
            method,
            path,
            query: uri.query().map(str::to_string),
            headers,
            body,
        })
    }

    /// A JSON POST issued by the layer itself, carrying no browser state.
    pub fn json_post(path: &str, payload: &Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            method: Method::POST,
            path: path.to_string(),
            query: None,
            headers,
            body: Some(Bytes::from(payload.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ForwardedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ForwardedResponse {
    /// Keep the relayable subset of a backend response.
    pub fn from_backend(status: StatusCode, backend: &HeaderMap, body: Bytes) -> Self {
        let mut headers = HeaderMap::new();
        for name in RELAYED_RESPONSE_HEADERS {
            if let Some(value) = backend.get(name) {
                headers.insert(HeaderName::from_static(name), value.clone());
            }
        }
        for cookie in backend.get_all(header::SET_COOKIE) {
            headers.append(header::SET_COOKIE, cookie.clone());
        }
        Self { status, headers, body }
    }

    pub fn json_body(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }

    pub fn set_json_body(&mut self, value: &Value) {
        self.body = Bytes::from(value.to_string());
        self.headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }

    /// Relay to the browser: JSON content-type by default, never cacheable.
    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;

        let headers = response.headers_mut();
        if !headers.contains_key(header::CONTENT_TYPE) {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response
    }
}

/// Shared, immutable forwarding machinery.
pub struct Forwarder {
    backend: BackendClient,
    timeouts: TimeoutPolicy,
    public_origin: Option<String>,
}

impl Forwarder {
    pub fn new(backend: BackendClient, timeouts: TimeoutPolicy, public_origin: Option<String>) -> Self {
        Self {
            backend,
            timeouts,
            public_origin,
        }
    }

    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }

    pub fn timeouts(&self) -> &TimeoutPolicy {
        &self.timeouts
    }

    pub fn deadline(&self, method: &Method, class: RouteClass) -> Duration {
        self.timeouts.deadline(method, class)
    }

    pub fn prepare(
        &self,
        route: &ResourceRoute,
        method: Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<ForwardedRequest, ForwardError> {
        let origin = current_origin(headers, self.public_origin.as_deref());
        ForwardedRequest::from_inbound(route, method, uri, headers, body, origin.as_deref())
    }

    /// Send under the route's deadline.
    pub async fn send(
        &self,
        route: &ResourceRoute,
        request: &ForwardedRequest,
    ) -> Result<ForwardedResponse, ForwardError> {
        let deadline = self.deadline(&request.method, route.class);
        self.backend.send(request, deadline).await
    }

    /// Forward and relay, turning transport failures into the route's
    /// error envelope.
    pub async fn forward(
        &self,
        route: &ResourceRoute,
        method: Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Response {
        let request = match self.prepare(route, method, uri, headers, body) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("Refusing {}: {}", uri.path(), e);
                return e.into_envelope(route.envelope);
            }
        };
        match self.send(route, &request).await {
            Ok(response) => response.into_response(),
            Err(e) => {
                tracing::warn!("Forwarding {} {} failed: {}", request.method, request.path, e);
                e.into_envelope(route.envelope)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::routes::{ADMIN, ADMIN_BOOTSTRAP_HEADER, AUTH};

    fn inbound(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn forwards_only_allowlisted_headers() {
        let uri: Uri = "/api/auth/me?full=1".parse().unwrap();
        let headers = inbound(&[
            ("cookie", "access_token=a"),
            ("cookie", "csrf_token=c"),
            ("content-type", "application/json"),
            ("authorization", "Bearer leak"),
            ("x-admin-bootstrap-token", "secret"),
            ("accept-encoding", "gzip"),
        ]);
        let request = ForwardedRequest::from_inbound(&AUTH, Method::GET, &uri, &headers, Bytes::new(), None).unwrap();

        assert_eq!(request.path, "/auth/me");
        assert_eq!(request.query.as_deref(), Some("full=1"));
        assert_eq!(request.headers.get_all(header::COOKIE).iter().count(), 2);
        assert!(request.headers.contains_key(header::CONTENT_TYPE));
        assert!(!request.headers.contains_key(header::AUTHORIZATION));
        assert!(!request.headers.contains_key(ADMIN_BOOTSTRAP_HEADER));
        assert!(!request.headers.contains_key(header::ACCEPT_ENCODING));
        assert!(request.body.is_none());
    }

    #[test]
    fn admin_routes_forward_bootstrap_token() {
        let uri: Uri = "/api/admin/bootstrap".parse().unwrap();
        let headers = inbound(&[("x-admin-bootstrap-token", "secret")]);
        let request = ForwardedRequest::from_inbound(
            &ADMIN,
            Method::POST,
            &uri,
            &headers,
            Bytes::from_static(b"{}"),
            None,
        )
        .unwrap();
        assert_eq!(request.headers[ADMIN_BOOTSTRAP_HEADER], "secret");
        assert_eq!(request.body.as_deref(), Some(&b"{}"[..]));
    }

    #[test]
    fn empty_mutation_body_is_absent() {
        let uri: Uri = "/api/auth/sessions/1".parse().unwrap();
        let request =
            ForwardedRequest::from_inbound(&AUTH, Method::DELETE, &uri, &HeaderMap::new(), Bytes::new(), None)
                .unwrap();
        assert!(request.body.is_none());
    }

    #[test]
    fn refuses_paths_escaping_the_route() {
        let uri: Uri = "/api/auth/../admin/bootstrap".parse().unwrap();
        let err = ForwardedRequest::from_inbound(&AUTH, Method::POST, &uri, &HeaderMap::new(), Bytes::new(), None)
            .unwrap_err();
        assert!(matches!(err, ForwardError::Unroutable(ref p) if p == "/api/auth/../admin/bootstrap"));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn relays_every_set_cookie_and_drops_transport_headers() {
        let backend = inbound(&[
            ("set-cookie", "access_token=a; Path=/"),
            ("set-cookie", "refresh_token=r; Path=/auth"),
            ("set-cookie", "csrf_token=c; Path=/"),
            ("content-type", "text/csv"),
            ("content-disposition", "attachment; filename=\"report.csv\""),
            ("transfer-encoding", "chunked"),
            ("connection", "keep-alive"),
            ("cache-control", "public, max-age=3600"),
        ]);
        let response =
            ForwardedResponse::from_backend(StatusCode::OK, &backend, Bytes::from_static(b"a,b")).into_response();

        let cookies: Vec<_> = response.headers().get_all(header::SET_COOKIE).iter().collect();
        assert_eq!(cookies.len(), 3);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
        assert!(response.headers().contains_key(header::CONTENT_DISPOSITION));
        assert!(!response.headers().contains_key(header::TRANSFER_ENCODING));
        assert!(!response.headers().contains_key(header::CONNECTION));
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    }

    #[test]
    fn defaults_content_type_to_json() {
        let response =
            ForwardedResponse::from_backend(StatusCode::CREATED, &HeaderMap::new(), Bytes::from_static(b"{}"))
                .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    }
}
