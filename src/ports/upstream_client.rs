use std::fmt;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt, stream::BoxStream};
use http::{HeaderMap, Method, StatusCode};
use thiserror::Error;

/// Custom error type for upstream calls
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum UpstreamClientError {
    /// Error when the connection to the upstream fails
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error when the outbound request cannot be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Error while reading the upstream response body
    #[error("Body read error: {0}")]
    BodyError(String),
}

/// Result type alias for upstream calls
pub type UpstreamClientResult<T> = Result<T, UpstreamClientError>;

/// One field of a re-encoded multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormPart {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Body sent to the upstream.
pub enum ForwardBody {
    Empty,
    /// Re-serialized JSON document
    Json(Bytes),
    /// Inbound body that was read in full and is sent unmodified
    Buffered(Bytes),
    /// Form fields; the client computes the boundary and `Content-Type`
    Multipart(Vec<FormPart>),
    /// Untouched byte stream
    Raw(AxumBody),
}

impl ForwardBody {
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardBody::Empty => "empty",
            ForwardBody::Json(_) => "json",
            ForwardBody::Buffered(_) => "buffered",
            ForwardBody::Multipart(_) => "multipart",
            ForwardBody::Raw(_) => "raw",
        }
    }
}

impl fmt::Debug for ForwardBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardBody::Empty => f.write_str("Empty"),
            ForwardBody::Json(b) => write!(f, "Json({} bytes)", b.len()),
            ForwardBody::Buffered(b) => write!(f, "Buffered({} bytes)", b.len()),
            ForwardBody::Multipart(parts) => write!(f, "Multipart({} parts)", parts.len()),
            ForwardBody::Raw(_) => f.write_str("Raw"),
        }
    }
}

/// Fully materialized outbound call.
#[derive(Debug)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: ForwardBody,
}

/// Chunk reader over an upstream response body.
///
/// Dropping the reader releases the underlying connection; [`UpstreamReader::cancel`]
/// does the same but records why.
pub struct UpstreamReader {
    stream: BoxStream<'static, UpstreamClientResult<Bytes>>,
}

impl UpstreamReader {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = UpstreamClientResult<Bytes>> + Send + 'static,
    {
        Self {
            stream: stream.boxed(),
        }
    }

    /// Read the next chunk; `None` signals end of stream.
    pub async fn read(&mut self) -> Option<UpstreamClientResult<Bytes>> {
        self.stream.next().await
    }

    /// Abandon the body and release its resources.
    pub fn cancel(self, reason: &str) {
        tracing::debug!(reason, "Cancelling upstream body reader");
        drop(self.stream);
    }

    /// Buffer the remaining body.
    pub async fn read_to_end(mut self) -> UpstreamClientResult<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.read().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Expose the reader as a stream of chunks, unread.
    pub fn into_stream(self) -> BoxStream<'static, UpstreamClientResult<Bytes>> {
        self.stream
    }
}

impl fmt::Debug for UpstreamReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UpstreamReader")
    }
}

/// Upstream answer before relay classification.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// `None` when the upstream sent no body at all
    pub body: Option<UpstreamReader>,
}

impl UpstreamResponse {
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}

/// UpstreamClient defines the port for the single outbound call per request.
///
/// Implementations must not follow redirects, must not cache, and must not
/// retry; any of those would change what the caller observes.
#[async_trait]
pub trait UpstreamClient: Send + Sync + 'static {
    /// Perform the outbound call and return the response head with a lazy body.
    async fn send(&self, req: UpstreamRequest) -> UpstreamClientResult<UpstreamResponse>;
}
