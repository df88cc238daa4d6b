//! Upstream response relay.
//!
//! [`classify`] picks exactly one [`ResponseKind`] from the upstream status and
//! content type, and [`relay`] dispatches on it. Every [`ProxyResponse`] variant
//! builds its own small header set; the upstream header map is never forwarded
//! as a whole.
//!
//! Event streams are relayed by a spawned producer task that moves chunks from
//! the upstream reader into a bounded channel backing the outgoing body. The
//! outgoing body owns a cancellation drop guard, so a client disconnect (the
//! body being dropped) cancels the producer, which then cancels the upstream
//! reader and closes its sink.
use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use axum::{
    Json,
    body::Body as AxumBody,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures_util::Stream;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use serde_json::Value;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::{
    core::{
        error::GatewayError,
        sink::{RelaySink, SinkClosed},
    },
    metrics,
    ports::upstream_client::{UpstreamClientError, UpstreamReader, UpstreamResponse},
};

/// How an upstream response is relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    NoContent,
    EventStream,
    Audio,
    Buffered,
    Error,
}

impl ResponseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseKind::NoContent => "no_content",
            ResponseKind::EventStream => "event_stream",
            ResponseKind::Audio => "audio",
            ResponseKind::Buffered => "buffered",
            ResponseKind::Error => "error",
        }
    }
}

/// Pure branch selection for an upstream response.
pub fn classify(status: StatusCode, content_type: Option<&str>, has_body: bool) -> ResponseKind {
    if status == StatusCode::NO_CONTENT {
        return ResponseKind::NoContent;
    }
    if !status.is_success() || !has_body {
        return ResponseKind::Error;
    }

    let content_type = content_type.unwrap_or_default().to_ascii_lowercase();
    if content_type.contains("text/event-stream") {
        ResponseKind::EventStream
    } else if content_type.starts_with("audio/") {
        ResponseKind::Audio
    } else {
        ResponseKind::Buffered
    }
}

/// Fully read upstream body, classified as JSON or text.
#[derive(Debug, Clone, PartialEq)]
pub enum BufferedBody {
    Json(Value),
    Text { text: String, content_type: HeaderValue },
}

impl BufferedBody {
    fn into_response_with(self, status: StatusCode) -> Response {
        match self {
            BufferedBody::Json(payload) => (status, Json(payload)).into_response(),
            BufferedBody::Text { text, content_type } => {
                (status, [(header::CONTENT_TYPE, content_type)], text).into_response()
            }
        }
    }
}

/// The single response produced for a gateway call.
pub enum ProxyResponse {
    NoContent {
        headers: HeaderMap,
    },
    Json {
        status: StatusCode,
        payload: Value,
    },
    Text {
        status: StatusCode,
        text: String,
        content_type: HeaderValue,
    },
    EventStream {
        status: StatusCode,
        headers: HeaderMap,
        body: AxumBody,
    },
    BinaryStream {
        status: StatusCode,
        headers: HeaderMap,
        body: AxumBody,
    },
    UpstreamError {
        status: StatusCode,
        body: BufferedBody,
    },
}

impl ProxyResponse {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyResponse::NoContent { .. } => StatusCode::NO_CONTENT,
            ProxyResponse::Json { status, .. }
            | ProxyResponse::Text { status, .. }
            | ProxyResponse::EventStream { status, .. }
            | ProxyResponse::BinaryStream { status, .. }
            | ProxyResponse::UpstreamError { status, .. } => *status,
        }
    }

    pub fn kind(&self) -> ResponseKind {
        match self {
            ProxyResponse::NoContent { .. } => ResponseKind::NoContent,
            ProxyResponse::Json { .. } | ProxyResponse::Text { .. } => ResponseKind::Buffered,
            ProxyResponse::EventStream { .. } => ResponseKind::EventStream,
            ProxyResponse::BinaryStream { .. } => ResponseKind::Audio,
            ProxyResponse::UpstreamError { .. } => ResponseKind::Error,
        }
    }
}

fn streaming_response(status: StatusCode, headers: HeaderMap, body: AxumBody) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        match self {
            ProxyResponse::NoContent { headers } => {
                streaming_response(StatusCode::NO_CONTENT, headers, AxumBody::empty())
            }
            ProxyResponse::Json { status, payload } => BufferedBody::Json(payload).into_response_with(status),
            ProxyResponse::Text {
                status,
                text,
                content_type,
            } => BufferedBody::Text { text, content_type }.into_response_with(status),
            ProxyResponse::EventStream {
                status,
                headers,
                body,
            }
            | ProxyResponse::BinaryStream {
                status,
                headers,
                body,
            } => streaming_response(status, headers, body),
            ProxyResponse::UpstreamError { status, body } => body.into_response_with(status),
        }
    }
}

const HOP_BY_HOP: [&str; 7] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "upgrade",
];

/// Upstream headers minus entity framing and hop-by-hop headers.
pub fn no_content_headers(upstream: &HeaderMap) -> HeaderMap {
    upstream
        .iter()
        .filter(|(name, _)| {
            **name != header::CONTENT_LENGTH
                && **name != header::CONTENT_TYPE
                && **name != header::TRANSFER_ENCODING
                && !HOP_BY_HOP.contains(&name.as_str())
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn copy_headers(from: &HeaderMap, to: &mut HeaderMap, names: &[HeaderName]) {
    for name in names {
        if let Some(value) = from.get(name) {
            to.insert(name.clone(), value.clone());
        }
    }
}

/// Minimal SSE header set, overridden by the upstream's own values where present.
pub fn event_stream_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    copy_headers(
        upstream,
        &mut headers,
        &[header::CONTENT_TYPE, header::CACHE_CONTROL, header::CONNECTION],
    );
    headers
}

/// `content-*`, `accept-ranges` and `vary` from the upstream; nothing else.
pub fn audio_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers: HeaderMap = upstream
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("content-"))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    copy_headers(upstream, &mut headers, &[header::ACCEPT_RANGES, header::VARY]);
    headers
}

async fn read_buffered(
    reader: Option<UpstreamReader>,
    content_type: Option<&HeaderValue>,
) -> Result<BufferedBody, UpstreamClientError> {
    let bytes = match reader {
        Some(reader) => reader.read_to_end().await?,
        None => Bytes::new(),
    };
    let text = String::from_utf8_lossy(&bytes).into_owned();

    Ok(match serde_json::from_str::<Value>(&text) {
        Ok(payload) => BufferedBody::Json(payload),
        Err(_) => BufferedBody::Text {
            text,
            content_type: content_type
                .cloned()
                .unwrap_or_else(|| HeaderValue::from_static("text/plain")),
        },
    })
}

/// Final state of an event stream relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Upstream reached end of stream
    Completed,
    /// Client went away or the server is shutting down
    Cancelled,
    /// Upstream read failed; the error was forwarded to the client
    Failed,
}

/// Outgoing body stream that cancels the relay when dropped.
struct GuardedReceiver {
    inner: ReceiverStream<io::Result<Bytes>>,
    _guard: DropGuard,
}

impl Stream for GuardedReceiver {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

/// Byte-for-byte SSE relay. Frames are never parsed.
pub struct EventStreamRelay;

impl EventStreamRelay {
    /// Start relaying `reader` into a new response body.
    ///
    /// `cancel` fires on server shutdown; dropping the returned body cancels it too.
    pub fn spawn(
        reader: UpstreamReader,
        cancel: CancellationToken,
        buffer: usize,
    ) -> (AxumBody, JoinHandle<RelayOutcome>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let outgoing = GuardedReceiver {
            inner: ReceiverStream::new(rx),
            _guard: cancel.clone().drop_guard(),
        };
        let handle = tokio::spawn(Self::pump(reader, RelaySink::new(tx), cancel));
        (AxumBody::from_stream(outgoing), handle)
    }

    async fn pump(
        mut reader: UpstreamReader,
        mut sink: RelaySink,
        cancel: CancellationToken,
    ) -> RelayOutcome {
        metrics::event_stream_opened();
        let mut chunks = 0u64;
        let mut bytes = 0usize;

        let outcome = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                next = reader.read() => Some(next),
            };

            match next {
                None => {
                    reader.cancel("client disconnected");
                    sink.close();
                    break RelayOutcome::Cancelled;
                }
                Some(Some(Ok(chunk))) => {
                    chunks += 1;
                    bytes += chunk.len();
                    let sent = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Err(SinkClosed),
                        sent = sink.send(chunk) => sent,
                    };
                    if sent.is_err() {
                        reader.cancel("client disconnected");
                        sink.close();
                        break RelayOutcome::Cancelled;
                    }
                }
                Some(Some(Err(e))) => {
                    tracing::warn!(error = %e, "Upstream event stream read failed");
                    sink.fail(io::Error::other(e.to_string())).await;
                    break RelayOutcome::Failed;
                }
                Some(None) => {
                    sink.close();
                    break RelayOutcome::Completed;
                }
            }
        };

        metrics::event_stream_closed();
        tracing::debug!(?outcome, chunks, bytes, "Event stream relay finished");
        outcome
    }
}

/// Turn the upstream response into exactly one [`ProxyResponse`].
pub async fn relay(
    upstream: UpstreamResponse,
    cancel: &CancellationToken,
    event_stream_buffer: usize,
) -> Result<ProxyResponse, GatewayError> {
    let kind = classify(
        upstream.status,
        upstream.content_type(),
        upstream.body.is_some(),
    );
    let UpstreamResponse {
        status,
        headers,
        body,
    } = upstream;
    tracing::debug!(%status, kind = kind.as_str(), "Relaying upstream response");

    let unreadable = |e: UpstreamClientError| GatewayError::UpstreamBodyUnreadable {
        upstream_status: status,
        details: e.to_string(),
    };

    match (kind, body) {
        (ResponseKind::NoContent, _) => Ok(ProxyResponse::NoContent {
            headers: no_content_headers(&headers),
        }),
        (ResponseKind::EventStream, Some(reader)) => {
            let (body, _handle) =
                EventStreamRelay::spawn(reader, cancel.child_token(), event_stream_buffer);
            Ok(ProxyResponse::EventStream {
                status,
                headers: event_stream_headers(&headers),
                body,
            })
        }
        (ResponseKind::Audio, Some(reader)) => Ok(ProxyResponse::BinaryStream {
            status,
            headers: audio_headers(&headers),
            body: AxumBody::from_stream(reader.into_stream()),
        }),
        (ResponseKind::Buffered, Some(reader)) => {
            match read_buffered(Some(reader), headers.get(header::CONTENT_TYPE))
                .await
                .map_err(unreadable)?
            {
                BufferedBody::Json(payload) => Ok(ProxyResponse::Json { status, payload }),
                BufferedBody::Text { text, content_type } => Ok(ProxyResponse::Text {
                    status,
                    text,
                    content_type,
                }),
            }
        }
        (_, body) => {
            let body = read_buffered(body, headers.get(header::CONTENT_TYPE))
                .await
                .map_err(unreadable)?;
            tracing::warn!(%status, "Upstream responded with an error");
            Ok(ProxyResponse::UpstreamError { status, body })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use futures_util::{StreamExt, stream};
    use http_body_util::BodyExt;
    use serde_json::json;

    use super::*;

    type Chunk = Result<Bytes, UpstreamClientError>;

    /// Upstream body fed by the test, counting how often it is released.
    struct TrackedStream {
        inner: ReceiverStream<Chunk>,
        drops: Arc<AtomicUsize>,
    }

    impl Stream for TrackedStream {
        type Item = Chunk;

        fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            Pin::new(&mut self.get_mut().inner).poll_next(cx)
        }
    }

    impl Drop for TrackedStream {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn tracked_reader() -> (mpsc::Sender<Chunk>, UpstreamReader, Arc<AtomicUsize>) {
        let (tx, rx) = mpsc::channel(8);
        let drops = Arc::new(AtomicUsize::new(0));
        let reader = UpstreamReader::new(TrackedStream {
            inner: ReceiverStream::new(rx),
            drops: drops.clone(),
        });
        (tx, reader, drops)
    }

    fn reader_of(chunks: Vec<&'static [u8]>) -> UpstreamReader {
        UpstreamReader::new(stream::iter(
            chunks.into_iter().map(|c| Ok(Bytes::from_static(c))),
        ))
    }

    fn upstream(status: u16, content_type: Option<&str>, body: Option<UpstreamReader>) -> UpstreamResponse {
        let mut headers = HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_str(ct).unwrap());
        }
        UpstreamResponse {
            status: StatusCode::from_u16(status).unwrap(),
            headers,
            body,
        }
    }

    async fn body_bytes(response: Response) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[test]
    fn test_classify() {
        let ok = StatusCode::OK;
        assert_eq!(classify(StatusCode::NO_CONTENT, None, false), ResponseKind::NoContent);
        assert_eq!(
            classify(StatusCode::NO_CONTENT, Some("text/event-stream"), true),
            ResponseKind::NoContent
        );
        assert_eq!(
            classify(ok, Some("text/event-stream; charset=utf-8"), true),
            ResponseKind::EventStream
        );
        assert_eq!(classify(ok, Some("audio/mpeg"), true), ResponseKind::Audio);
        assert_eq!(classify(ok, Some("application/json"), true), ResponseKind::Buffered);
        assert_eq!(classify(ok, None, true), ResponseKind::Buffered);
        assert_eq!(classify(ok, Some("application/json"), false), ResponseKind::Error);
        assert_eq!(
            classify(StatusCode::BAD_REQUEST, Some("text/event-stream"), true),
            ResponseKind::Error
        );
        assert_eq!(
            classify(StatusCode::INTERNAL_SERVER_ERROR, Some("audio/wav"), true),
            ResponseKind::Error
        );
    }

    #[test]
    fn test_no_content_headers_drop_entity_headers() {
        let mut upstream = HeaderMap::new();
        upstream.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
        upstream.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        upstream.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        upstream.insert("x-request-id", HeaderValue::from_static("abc"));

        let headers = no_content_headers(&upstream);
        assert!(headers.get(header::CONTENT_LENGTH).is_none());
        assert!(headers.get(header::CONTENT_TYPE).is_none());
        assert!(headers.get(header::TRANSFER_ENCODING).is_none());
        assert_eq!(headers.get("x-request-id").unwrap(), "abc");
    }

    #[test]
    fn test_event_stream_headers_whitelist() {
        let mut upstream = HeaderMap::new();
        upstream.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream; charset=utf-8"));
        upstream.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        upstream.insert(header::SET_COOKIE, HeaderValue::from_static("a=b"));
        upstream.insert("x-upstream-secret", HeaderValue::from_static("s"));

        let headers = event_stream_headers(&upstream);
        assert_eq!(headers.len(), 3);
        assert_eq!(
            headers.get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream; charset=utf-8"
        );
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-cache");
        assert_eq!(headers.get(header::CONNECTION).unwrap(), "keep-alive");
    }

    #[test]
    fn test_audio_headers_whitelist() {
        let mut upstream = HeaderMap::new();
        upstream.insert(header::CONTENT_TYPE, HeaderValue::from_static("audio/mpeg"));
        upstream.insert(header::CONTENT_LENGTH, HeaderValue::from_static("1024"));
        upstream.insert(header::CONTENT_DISPOSITION, HeaderValue::from_static("inline"));
        upstream.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        upstream.insert(header::VARY, HeaderValue::from_static("Accept"));
        upstream.insert(header::SET_COOKIE, HeaderValue::from_static("a=b"));
        upstream.insert(header::SERVER, HeaderValue::from_static("upstream"));

        let headers = audio_headers(&upstream);
        assert_eq!(headers.len(), 5);
        assert!(headers.get(header::SET_COOKIE).is_none());
        assert!(headers.get(header::SERVER).is_none());
    }

    #[tokio::test]
    async fn test_relay_no_content() {
        let mut response = upstream(204, Some("application/json"), None);
        response
            .headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
        response
            .headers
            .insert("x-ratelimit-remaining", HeaderValue::from_static("9"));

        let relayed = relay(response, &CancellationToken::new(), 4).await.unwrap();
        let response = relayed.into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
        assert!(response.headers().get(header::CONTENT_LENGTH).is_none());
        assert_eq!(response.headers().get("x-ratelimit-remaining").unwrap(), "9");
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_relay_buffered_json() {
        let body = reader_of(vec![br#"{"answer":"#, br#""hi"}"#]);
        let mut response = upstream(201, Some("application/json; charset=utf-8"), Some(body));
        response
            .headers
            .insert(header::SET_COOKIE, HeaderValue::from_static("leak=1"));

        let relayed = relay(response, &CancellationToken::new(), 4).await.unwrap();
        assert!(matches!(relayed, ProxyResponse::Json { .. }));
        let response = relayed.into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        let value: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(value, json!({"answer": "hi"}));
    }

    #[tokio::test]
    async fn test_relay_buffered_text_keeps_content_type() {
        let body = reader_of(vec![b"<html>ok</html>"]);
        let relayed = relay(
            upstream(200, Some("text/html"), Some(body)),
            &CancellationToken::new(),
            4,
        )
        .await
        .unwrap();
        let response = relayed.into_response();
        assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "text/html");
        assert_eq!(body_bytes(response).await.as_ref(), b"<html>ok</html>");

        let relayed = relay(
            upstream(200, None, Some(reader_of(vec![b"plain"]))),
            &CancellationToken::new(),
            4,
        )
        .await
        .unwrap();
        assert_eq!(
            relayed.into_response().headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain"
        );
    }

    #[tokio::test]
    async fn test_relay_upstream_error_preserves_status() {
        let body = reader_of(vec![br#"{"code":"invalid_param","message":"bad"}"#]);
        let relayed = relay(
            upstream(422, Some("application/json"), Some(body)),
            &CancellationToken::new(),
            4,
        )
        .await
        .unwrap();
        assert!(matches!(relayed, ProxyResponse::UpstreamError { .. }));
        let response = relayed.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let value: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(value["code"], "invalid_param");

        let relayed = relay(
            upstream(503, Some("text/html"), Some(reader_of(vec![b"down"]))),
            &CancellationToken::new(),
            4,
        )
        .await
        .unwrap();
        let response = relayed.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_bytes(response).await.as_ref(), b"down");
    }

    #[tokio::test]
    async fn test_relay_unreadable_error_body_is_bad_gateway() {
        let body = UpstreamReader::new(stream::iter(vec![Err(UpstreamClientError::BodyError(
            "reset".into(),
        ))]));
        let err = relay(
            upstream(500, Some("application/json"), Some(body)),
            &CancellationToken::new(),
            4,
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert!(matches!(
            err,
            GatewayError::UpstreamBodyUnreadable { upstream_status, .. } if upstream_status == StatusCode::INTERNAL_SERVER_ERROR
        ));
    }

    #[tokio::test]
    async fn test_relay_audio_passthrough() {
        let body = reader_of(vec![b"ID3", b"\x00\x01\x02"]);
        let relayed = relay(
            upstream(200, Some("audio/mpeg"), Some(body)),
            &CancellationToken::new(),
            4,
        )
        .await
        .unwrap();
        assert!(matches!(relayed, ProxyResponse::BinaryStream { .. }));
        let response = relayed.into_response();
        assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "audio/mpeg");
        assert_eq!(body_bytes(response).await.as_ref(), b"ID3\x00\x01\x02");
    }

    #[tokio::test]
    async fn test_event_stream_relays_bytes_in_order() {
        let frames: Vec<&'static [u8]> = vec![
            b"event: message\ndata: {\"answer\":\"He",
            b"llo\"}\n\n",
            b"data: [DONE]\n\n",
        ];
        let (body, handle) =
            EventStreamRelay::spawn(reader_of(frames), CancellationToken::new(), 2);

        let bytes = body.collect().await.unwrap().to_bytes();
        assert_eq!(
            bytes.as_ref(),
            b"event: message\ndata: {\"answer\":\"Hello\"}\n\ndata: [DONE]\n\n"
        );
        assert_eq!(handle.await.unwrap(), RelayOutcome::Completed);
    }

    #[tokio::test]
    async fn test_event_stream_client_abort_cancels_upstream_once() {
        let (upstream_tx, reader, drops) = tracked_reader();
        let cancel = CancellationToken::new();
        let (body, handle) = EventStreamRelay::spawn(reader, cancel.clone(), 4);

        upstream_tx
            .send(Ok(Bytes::from_static(b"data: 1\n\n")))
            .await
            .unwrap();

        let mut data = body.into_data_stream();
        let first = data.next().await.unwrap().unwrap();
        assert_eq!(first.as_ref(), b"data: 1\n\n");

        // Client disconnects while the upstream is still open.
        drop(data);

        assert_eq!(handle.await.unwrap(), RelayOutcome::Cancelled);
        assert!(cancel.is_cancelled());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(upstream_tx.send(Ok(Bytes::from_static(b"late"))).await.is_err());
    }

    #[tokio::test]
    async fn test_event_stream_shutdown_cancels_relay() {
        let (_upstream_tx, reader, drops) = tracked_reader();
        let cancel = CancellationToken::new();
        let (body, handle) = EventStreamRelay::spawn(reader, cancel.clone(), 4);

        cancel.cancel();
        assert_eq!(handle.await.unwrap(), RelayOutcome::Cancelled);
        assert_eq!(drops.load(Ordering::SeqCst), 1);

        // The outgoing body ends cleanly.
        let bytes = body.collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_event_stream_upstream_error_propagates() {
        let (upstream_tx, reader, _drops) = tracked_reader();
        let (body, handle) = EventStreamRelay::spawn(reader, CancellationToken::new(), 4);

        upstream_tx
            .send(Ok(Bytes::from_static(b"data: 1\n\n")))
            .await
            .unwrap();
        upstream_tx
            .send(Err(UpstreamClientError::BodyError("connection reset".into())))
            .await
            .unwrap();

        assert!(body.collect().await.is_err());
        assert_eq!(handle.await.unwrap(), RelayOutcome::Failed);
    }

    #[tokio::test]
    async fn test_relay_event_stream_response_headers() {
        let mut response = upstream(200, Some("text/event-stream"), Some(reader_of(vec![b"data: x\n\n"])));
        response
            .headers
            .insert("x-upstream-trace", HeaderValue::from_static("t"));

        let relayed = relay(response, &CancellationToken::new(), 4).await.unwrap();
        assert!(matches!(relayed, ProxyResponse::EventStream { .. }));
        let response = relayed.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-upstream-trace").is_none());
        assert_eq!(body_bytes(response).await.as_ref(), b"data: x\n\n");
    }
}
