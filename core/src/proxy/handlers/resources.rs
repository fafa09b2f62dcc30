//! Generic resource forwarding
//! Serves every entry of the resource table (crm, calendar, uploads, ...)

use axum::{
    http::{HeaderMap, Method, Uri},
    response::Response,
};
use bytes::Bytes;
use tracing::Instrument;

use crate::proxy::handlers::request_id;
use crate::proxy::routes::ResourceRoute;
use crate::proxy::server::AppState;

pub async fn forward_resource(
    state: AppState,
    route: &'static ResourceRoute,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let span = tracing::info_span!("forward", request_id = %request_id(&headers), route = route.prefix);

    async move {
        tracing::debug!("{} {}", method, uri.path());
        state.forwarder.forward(route, method, &uri, &headers, body).await
    }
    .instrument(span)
    .await
}
