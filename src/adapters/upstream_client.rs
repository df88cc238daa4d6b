//! reqwest-backed upstream client.
use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use http::{Method, StatusCode};
use reqwest::{
    Body, Client,
    multipart::{Form, Part},
    redirect::Policy,
};

use crate::{
    config::models::UpstreamConfig,
    ports::upstream_client::{
        ForwardBody, FormPart, UpstreamClient, UpstreamClientError, UpstreamClientResult,
        UpstreamReader, UpstreamRequest, UpstreamResponse,
    },
};

/// Upstream client that never follows redirects and never decompresses.
#[derive(Clone)]
pub struct ReqwestUpstreamClient {
    client: Client,
}

impl ReqwestUpstreamClient {
    pub fn new(config: &UpstreamConfig) -> UpstreamClientResult<Self> {
        let mut builder = Client::builder()
            .redirect(Policy::none())
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs));
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder
            .build()
            .map_err(|e| UpstreamClientError::InvalidRequest(format!("Failed to build client: {e}")))?;
        Ok(Self { client })
    }

    fn build_form(parts: Vec<FormPart>) -> UpstreamClientResult<Form> {
        let mut form = Form::new();
        for part in parts {
            let length = part.data.len() as u64;
            let mut field = Part::stream_with_length(Body::from(part.data), length);
            if let Some(file_name) = part.file_name {
                field = field.file_name(file_name);
            }
            if let Some(content_type) = part.content_type {
                field = field.mime_str(&content_type).map_err(|e| {
                    UpstreamClientError::InvalidRequest(format!(
                        "Invalid content type '{content_type}' for field '{}': {e}",
                        part.name
                    ))
                })?;
            }
            form = form.part(part.name, field);
        }
        Ok(form)
    }

    fn has_body(method: &Method, status: StatusCode) -> bool {
        *method != Method::HEAD
            && status != StatusCode::NO_CONTENT
            && status != StatusCode::NOT_MODIFIED
    }
}

#[async_trait]
impl UpstreamClient for ReqwestUpstreamClient {
    async fn send(&self, req: UpstreamRequest) -> UpstreamClientResult<UpstreamResponse> {
        let method = req.method.clone();
        let mut builder = self
            .client
            .request(req.method, &req.url)
            .headers(req.headers);

        builder = match req.body {
            ForwardBody::Empty => builder,
            ForwardBody::Json(bytes) | ForwardBody::Buffered(bytes) => builder.body(bytes),
            ForwardBody::Multipart(parts) => builder.multipart(Self::build_form(parts)?),
            ForwardBody::Raw(body) => builder.body(Body::wrap_stream(body.into_data_stream())),
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_builder() {
                UpstreamClientError::InvalidRequest(e.to_string())
            } else {
                UpstreamClientError::ConnectionError(e.to_string())
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        tracing::debug!(%status, url = %response.url(), "Upstream responded");

        let body = Self::has_body(&method, status).then(|| {
            UpstreamReader::new(
                response
                    .bytes_stream()
                    .map_err(|e| UpstreamClientError::BodyError(e.to_string())),
            )
        });

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}
