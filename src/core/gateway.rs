//! Gateway controller.
//!
//! `GatewayService` runs one inbound call through the whole pipeline:
//! authenticate, validate the slug, peek for an override, resolve credentials,
//! rewrite the path, materialize the outbound request, call the upstream once
//! and relay the answer. Every failure is converted into a JSON error response
//! here, so [`GatewayService::handle`] never fails.
use std::{sync::Arc, time::Instant};

use axum::response::{IntoResponse, Response};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    core::{
        credentials::CredentialResolver,
        error::GatewayError,
        materializer::{Peeked, extract_override, materialize, peek_body, should_peek},
        path_rewrite::{rewrite, upstream_url},
        relay::{ProxyResponse, relay},
        types::{InboundBody, ProxyRequest},
    },
    metrics,
    ports::{
        app_config_store::AppConfigStore,
        identity::IdentityProvider,
        upstream_client::{UpstreamClient, UpstreamRequest},
    },
};

/// Tunables for the request pipeline.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Largest JSON body buffered while looking for an override field
    pub max_json_peek_bytes: usize,
    /// Chunks queued between the upstream and a slow event stream client
    pub event_stream_buffer: usize,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            max_json_peek_bytes: 1024 * 1024,
            event_stream_buffer: 32,
        }
    }
}

/// Authenticated reverse proxy from `/gateway/{app_id}/...` to per-app upstreams.
///
/// Cheap to share behind an `Arc`; holds no per-request state.
pub struct GatewayService {
    identity: Arc<dyn IdentityProvider>,
    credentials: CredentialResolver,
    upstream: Arc<dyn UpstreamClient>,
    settings: GatewaySettings,
    shutdown: CancellationToken,
}

impl GatewayService {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn AppConfigStore>,
        upstream: Arc<dyn UpstreamClient>,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            identity,
            credentials: CredentialResolver::new(store),
            upstream,
            settings,
            shutdown: CancellationToken::new(),
        }
    }

    /// Tie in-flight relays to a server-wide shutdown token.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Handle one gateway call. Always produces exactly one response.
    pub async fn handle(&self, request: ProxyRequest) -> Response {
        let started = Instant::now();
        let method = request.context.method.clone();
        let span = tracing::info_span!(
            "gateway_request",
            request_id = %request.context.request_id,
            app_id = %request.app_id,
            method = %method,
        );

        let (kind, response) = match self.proxy(request).instrument(span.clone()).await {
            Ok(proxied) => (proxied.kind().as_str(), proxied.into_response()),
            Err(e) => {
                span.in_scope(|| {
                    if e.status().is_server_error() {
                        tracing::error!(error = %e, kind = e.kind(), "Gateway call failed");
                    } else {
                        tracing::warn!(error = %e, kind = e.kind(), "Gateway call rejected");
                    }
                });
                (e.kind(), e.into_response())
            }
        };

        metrics::increment_request_total(method.as_str(), response.status().as_u16(), kind);
        span.in_scope(|| {
            tracing::info!(
                status = response.status().as_u16(),
                kind,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Gateway call finished"
            );
        });
        response
    }

    async fn proxy(&self, request: ProxyRequest) -> Result<ProxyResponse, GatewayError> {
        let ProxyRequest {
            app_id,
            path_segments,
            query,
            context,
            body,
        } = request;
        let context = context.with_cancel(self.shutdown.child_token());

        let user = self
            .identity
            .authenticate(&context.headers)
            .await
            .ok_or(GatewayError::Unauthorized)?;
        tracing::debug!(user_id = %user.id, "Caller authenticated");

        if path_segments.is_empty() {
            return Err(GatewayError::BadRequest("slug path is missing".to_string()));
        }

        let (inbound, override_cred) = if should_peek(&context.method, context.content_type()) {
            let peeked = peek_body(body, self.settings.max_json_peek_bytes)
                .await
                .map_err(|e| GatewayError::BadRequest(format!("Failed to read request body: {e}")))?;
            match peeked {
                Peeked::Complete(bytes) => extract_override(bytes),
                Peeked::Oversized(body) => {
                    tracing::debug!(
                        limit = self.settings.max_json_peek_bytes,
                        "Body too large to inspect, streaming through"
                    );
                    (InboundBody::Stream(body), None)
                }
            }
        } else {
            (InboundBody::Stream(body), None)
        };

        let target = self.credentials.resolve(&app_id, override_cred).await?;
        let rewritten = rewrite(&path_segments, target.app_type());
        let url = upstream_url(target.base_url(), &rewritten, query.as_deref());
        tracing::debug!(
            app_type = %target.app_type(),
            path = %rewritten,
            is_override = target.is_override(),
            "Resolved upstream target"
        );

        let outbound = materialize(&context, &target, &rewritten, inbound).await?;
        tracing::debug!(
            method = %outbound.method,
            url = %url,
            body = outbound.body.kind(),
            "Calling upstream"
        );

        let started = Instant::now();
        let result = self
            .upstream
            .send(UpstreamRequest {
                method: outbound.method,
                url,
                headers: outbound.headers,
                body: outbound.body,
            })
            .await;
        metrics::record_upstream_duration(started.elapsed(), result.is_ok());

        let upstream = result.map_err(|e| GatewayError::UpstreamUnreachable {
            app_id: app_id.clone(),
            method: context.method.to_string(),
            details: e.to_string(),
        })?;

        relay(upstream, &context.cancel, self.settings.event_stream_buffer).await
    }
}
