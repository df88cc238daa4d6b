//! Inbound HTTP surface.
//!
//! Routes:
//! * `/gateway/{app_id}/{*path}`: GET, HEAD, POST, PUT, DELETE, PATCH go to the
//!   gateway controller; OPTIONS answers the CORS preflight without auth.
//! * `/gateway/{app_id}` and `/gateway/{app_id}/`: same methods, empty slug.
//! * `/health`: liveness probe.
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, Request, State},
    http::HeaderMap,
    middleware,
    response::{IntoResponse, Response},
    routing::{MethodRouter, get, options},
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{
    adapters::middleware::{
        RequestId, preflight_response, request_id_middleware, request_timing_middleware,
    },
    core::{
        gateway::GatewayService,
        types::{ProxyRequest, RequestContext},
    },
};

/// Path parameters of a gateway route.
#[derive(Debug, Deserialize)]
struct GatewayPath {
    app_id: String,
    #[serde(default)]
    path: String,
}

/// Adapts axum requests to [`GatewayService`] calls.
#[derive(Clone)]
pub struct HttpHandler {
    gateway: Arc<GatewayService>,
    max_upload_bytes: usize,
}

impl HttpHandler {
    pub fn new(gateway: Arc<GatewayService>, max_upload_bytes: usize) -> Self {
        Self {
            gateway,
            max_upload_bytes,
        }
    }

    /// Build the application router with all layers applied.
    pub fn router(self) -> Router {
        let max_upload_bytes = self.max_upload_bytes;
        let gateway_methods = || -> MethodRouter<HttpHandler> {
            options(preflight)
                .get(gateway_entry)
                .post(gateway_entry)
                .put(gateway_entry)
                .delete(gateway_entry)
                .patch(gateway_entry)
        };

        Router::new()
            .route("/gateway/{app_id}/{*path}", gateway_methods())
            .route("/gateway/{app_id}/", gateway_methods())
            .route("/gateway/{app_id}", gateway_methods())
            .route("/health", get(health))
            .with_state(self)
            .layer(DefaultBodyLimit::max(max_upload_bytes))
            .layer(middleware::from_fn(request_timing_middleware))
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(request_id_middleware))
    }
}

async fn gateway_entry(
    State(handler): State<HttpHandler>,
    Path(params): Path<GatewayPath>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();

    let mut context = RequestContext::new(parts.method, parts.headers);
    if let Some(RequestId(request_id)) = parts.extensions.get::<RequestId>() {
        context = context.with_request_id(request_id.clone());
    }
    let context = context.with_extensions(parts.extensions);

    let request = ProxyRequest {
        app_id: params.app_id,
        path_segments: ProxyRequest::split_slug(&params.path),
        query: parts.uri.query().map(str::to_string),
        context,
        body,
    };

    handler.gateway.handle(request).await
}

async fn preflight(headers: HeaderMap) -> Response {
    preflight_response(&headers)
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
