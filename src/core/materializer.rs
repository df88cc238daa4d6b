//! Builds the outbound request head and body from the inbound call.
//!
//! Header policy is an allow-list: only `Content-Type` and `Accept` are copied
//! and `Authorization` is always replaced by the upstream key. Bodies are only
//! read into memory when they have to be inspected (override peek, multipart
//! re-encoding); everything else is streamed through.
use axum::{
    body::Body as AxumBody,
    extract::{FromRequest, Multipart, Request},
};
use bytes::{Bytes, BytesMut};
use futures_util::{StreamExt, stream};
use http::{HeaderMap, HeaderValue, Method, header};
use serde_json::Value;

use crate::{
    core::{
        error::GatewayError,
        path_rewrite::is_upload_path,
        types::{AppBehaviorType, InboundBody, OverrideCredential, RequestContext, ResolvedTarget},
    },
    ports::upstream_client::{ForwardBody, FormPart},
};

/// JSON body field carrying a caller-supplied credential.
pub const OVERRIDE_FIELD: &str = "_temp_config";

/// Outbound method, headers and body.
#[derive(Debug)]
pub struct MaterializedRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: ForwardBody,
}

/// Result of reading at most `limit` bytes of a body.
pub enum Peeked {
    /// The whole body fit under the limit.
    Complete(Bytes),
    /// Over the limit; the already-read prefix is chained back in front of the rest.
    Oversized(AxumBody),
}

fn is_bodyless(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

/// Whether the inbound body is worth parsing as JSON for an override field.
/// Multipart and binary uploads are never buffered.
pub fn should_peek(method: &Method, content_type: Option<&str>) -> bool {
    if is_bodyless(method) {
        return false;
    }
    match content_type.map(str::to_ascii_lowercase) {
        None => true,
        Some(ct) => ct.contains("json") || ct.starts_with("text/plain"),
    }
}

/// Read up to `limit` bytes from `body`.
pub async fn peek_body(body: AxumBody, limit: usize) -> Result<Peeked, axum::Error> {
    let mut data = body.into_data_stream();
    let mut buf = BytesMut::new();

    while let Some(chunk) = data.next().await {
        buf.extend_from_slice(&chunk?);
        if buf.len() > limit {
            let prefix = buf.freeze();
            let rest = stream::once(async move { Ok::<_, axum::Error>(prefix) }).chain(data);
            return Ok(Peeked::Oversized(AxumBody::from_stream(rest)));
        }
    }

    Ok(Peeked::Complete(buf.freeze()))
}

fn parse_override(value: &Value) -> Option<OverrideCredential> {
    let obj = value.as_object()?;
    let upstream_base_url = obj.get("apiUrl")?.as_str()?.to_string();
    let upstream_key = obj.get("apiKey")?.as_str()?.to_string();
    let app_type = obj
        .get("appType")
        .and_then(Value::as_str)
        .map(AppBehaviorType::from);

    Some(OverrideCredential {
        upstream_base_url,
        upstream_key,
        app_type,
    })
}

/// Look for a well-formed override object in a buffered body.
///
/// Anything that is not a JSON object with a well-formed override field is
/// returned untouched for raw forwarding; a parse error is not a failure.
pub fn extract_override(bytes: Bytes) -> (InboundBody, Option<OverrideCredential>) {
    if bytes.is_empty() {
        return (InboundBody::Empty, None);
    }

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(mut map)) => match map.get(OVERRIDE_FIELD).and_then(parse_override) {
            Some(cred) => {
                map.remove(OVERRIDE_FIELD);
                (InboundBody::CleanedJson(Value::Object(map)), Some(cred))
            }
            None => (InboundBody::Buffered(bytes), None),
        },
        Ok(_) => (InboundBody::Buffered(bytes), None),
        Err(e) => {
            tracing::debug!(error = %e, "Inbound body is not JSON, forwarding raw");
            (InboundBody::Buffered(bytes), None)
        }
    }
}

/// Copy `Content-Type` and `Accept`, inject the bearer key. Nothing else passes.
pub fn forward_headers(inbound: &HeaderMap, target: &ResolvedTarget) -> Result<HeaderMap, GatewayError> {
    let mut headers = HeaderMap::new();
    for name in [header::CONTENT_TYPE, header::ACCEPT] {
        if let Some(value) = inbound.get(&name) {
            headers.insert(name, value.clone());
        }
    }

    let bearer = HeaderValue::from_str(&format!("Bearer {}", target.key())).map_err(|_| {
        let message = "Upstream key contains characters not allowed in a header".to_string();
        if target.is_override() {
            GatewayError::BadRequest(message)
        } else {
            GatewayError::ServerConfig(message)
        }
    })?;
    headers.insert(header::AUTHORIZATION, bearer);

    Ok(headers)
}

fn into_axum_body(body: InboundBody) -> Result<AxumBody, GatewayError> {
    Ok(match body {
        InboundBody::Empty => AxumBody::empty(),
        InboundBody::Buffered(bytes) => AxumBody::from(bytes),
        InboundBody::Stream(body) => body,
        InboundBody::CleanedJson(value) => AxumBody::from(serialize_json(&value)?),
    })
}

fn serialize_json(value: &Value) -> Result<Bytes, GatewayError> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| GatewayError::ServerConfig(format!("Failed to re-serialize request body: {e}")))
}

async fn parse_multipart(
    ctx: &RequestContext,
    content_type: &str,
    body: AxumBody,
) -> Result<Vec<FormPart>, GatewayError> {
    let mut request = Request::new(body);
    *request.extensions_mut() = ctx.extensions.clone();
    if let Ok(value) = HeaderValue::from_str(content_type) {
        request.headers_mut().insert(header::CONTENT_TYPE, value);
    }

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| GatewayError::MultipartParse {
            details: e.body_text(),
        })?;

    let mut parts = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::MultipartParse {
            details: e.body_text(),
        })?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(|e| GatewayError::MultipartParse {
            details: e.body_text(),
        })?;
        tracing::trace!(field = %name, bytes = data.len(), "Parsed multipart field");
        parts.push(FormPart {
            name,
            file_name,
            content_type,
            data,
        });
    }

    Ok(parts)
}

/// Decide the outbound method, headers and body.
pub async fn materialize(
    ctx: &RequestContext,
    target: &ResolvedTarget,
    rewritten_path: &str,
    body: InboundBody,
) -> Result<MaterializedRequest, GatewayError> {
    let mut headers = forward_headers(&ctx.headers, target)?;

    if is_bodyless(&ctx.method) {
        return Ok(MaterializedRequest {
            method: ctx.method.clone(),
            headers,
            body: ForwardBody::Empty,
        });
    }

    if target.is_override() {
        tracing::debug!(inbound_method = %ctx.method, "Override probe forced to GET without body");
        return Ok(MaterializedRequest {
            method: Method::GET,
            headers,
            body: ForwardBody::Empty,
        });
    }

    let multipart_ct = ctx
        .content_type()
        .filter(|ct| ct.to_ascii_lowercase().contains("multipart/form-data"))
        .map(str::to_string);

    let body = match (multipart_ct, body) {
        (Some(ct), body) if is_upload_path(rewritten_path) => {
            let parts = parse_multipart(ctx, &ct, into_axum_body(body)?).await?;
            headers.remove(header::CONTENT_TYPE);
            ForwardBody::Multipart(parts)
        }
        (_, InboundBody::CleanedJson(value)) => ForwardBody::Json(serialize_json(&value)?),
        (_, InboundBody::Empty) => ForwardBody::Empty,
        (_, InboundBody::Buffered(bytes)) => ForwardBody::Buffered(bytes),
        (_, InboundBody::Stream(body)) => ForwardBody::Raw(body),
    };

    Ok(MaterializedRequest {
        method: ctx.method.clone(),
        headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;
    use serde_json::json;

    use super::*;
    use crate::core::types::AppConfig;

    fn stored_target() -> ResolvedTarget {
        ResolvedTarget::Stored(AppConfig::new(
            "app",
            "https://api.example.com/v1",
            "secret",
            AppBehaviorType::Chat,
        ))
    }

    fn override_target() -> ResolvedTarget {
        ResolvedTarget::Override(OverrideCredential {
            upstream_base_url: "https://probe.example.com/v1".into(),
            upstream_key: "probe".into(),
            app_type: None,
        })
    }

    fn ctx(method: Method, content_type: Option<&str>) -> RequestContext {
        let mut headers = HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_str(ct).unwrap());
        }
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(header::COOKIE, HeaderValue::from_static("session=abc"));
        headers.insert(header::HOST, HeaderValue::from_static("dashboard.local"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer user-token"));
        RequestContext::new(method, headers)
    }

    async fn raw_bytes(body: ForwardBody) -> Bytes {
        match body {
            ForwardBody::Raw(body) => body.collect().await.unwrap().to_bytes(),
            ForwardBody::Json(bytes) | ForwardBody::Buffered(bytes) => bytes,
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn test_should_peek() {
        assert!(!should_peek(&Method::GET, Some("application/json")));
        assert!(should_peek(&Method::POST, Some("application/json; charset=utf-8")));
        assert!(should_peek(&Method::POST, None));
        assert!(should_peek(&Method::PATCH, Some("text/plain")));
        assert!(!should_peek(&Method::POST, Some("multipart/form-data; boundary=x")));
        assert!(!should_peek(&Method::POST, Some("audio/mpeg")));
    }

    #[test]
    fn test_extract_override_strips_field() {
        let body = json!({
            "inputs": {},
            "_temp_config": { "apiUrl": "https://probe.example.com/v1", "apiKey": "k" }
        });
        let (inbound, cred) = extract_override(Bytes::from(body.to_string()));
        let cred = cred.unwrap();
        assert_eq!(cred.upstream_base_url, "https://probe.example.com/v1");
        match inbound {
            InboundBody::CleanedJson(value) => {
                assert!(value.get(OVERRIDE_FIELD).is_none());
                assert!(value.get("inputs").is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_extract_override_ignores_malformed() {
        let (inbound, cred) = extract_override(Bytes::from_static(b"{not json"));
        assert!(cred.is_none());
        assert!(matches!(inbound, InboundBody::Buffered(b) if b.as_ref() == b"{not json"));

        let (inbound, cred) =
            extract_override(Bytes::from(json!({"_temp_config": "nope"}).to_string()));
        assert!(cred.is_none());
        assert!(matches!(inbound, InboundBody::Buffered(_)));

        let (inbound, cred) = extract_override(Bytes::new());
        assert!(cred.is_none());
        assert!(matches!(inbound, InboundBody::Empty));
    }

    #[tokio::test]
    async fn test_peek_body_complete_and_oversized() {
        match peek_body(AxumBody::from("small"), 16).await.unwrap() {
            Peeked::Complete(bytes) => assert_eq!(bytes.as_ref(), b"small"),
            Peeked::Oversized(_) => panic!("expected complete"),
        }

        let chunks = vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"0123456789")),
            Ok(Bytes::from_static(b"abcdefghij")),
            Ok(Bytes::from_static(b"KLMNOPQRST")),
        ];
        let body = AxumBody::from_stream(stream::iter(chunks));
        match peek_body(body, 12).await.unwrap() {
            Peeked::Oversized(rest) => {
                let bytes = rest.collect().await.unwrap().to_bytes();
                assert_eq!(bytes.as_ref(), b"0123456789abcdefghijKLMNOPQRST");
            }
            Peeked::Complete(_) => panic!("expected oversized"),
        }
    }

    #[test]
    fn test_forward_headers_allow_list() {
        let ctx = ctx(Method::POST, Some("application/json"));
        let headers = forward_headers(&ctx.headers, &stored_target()).unwrap();
        assert_eq!(headers.len(), 3);
        assert_eq!(headers.get(header::AUTHORIZATION).unwrap(), "Bearer secret");
        assert_eq!(headers.get(header::ACCEPT).unwrap(), "text/event-stream");
        assert!(headers.get(header::COOKIE).is_none());
        assert!(headers.get(header::HOST).is_none());
    }

    #[tokio::test]
    async fn test_override_forces_get_without_body() {
        let ctx = ctx(Method::POST, Some("application/json"));
        let body = InboundBody::CleanedJson(json!({"user": "u"}));
        let req = materialize(&ctx, &override_target(), "parameters", body)
            .await
            .unwrap();
        assert_eq!(req.method, Method::GET);
        assert!(matches!(req.body, ForwardBody::Empty));
        assert_eq!(req.headers.get(header::AUTHORIZATION).unwrap(), "Bearer probe");
    }

    #[tokio::test]
    async fn test_get_never_forwards_body() {
        let ctx = ctx(Method::GET, None);
        let req = materialize(&ctx, &stored_target(), "messages", InboundBody::Empty)
            .await
            .unwrap();
        assert_eq!(req.method, Method::GET);
        assert!(matches!(req.body, ForwardBody::Empty));
    }

    #[tokio::test]
    async fn test_cleaned_json_is_reserialized() {
        let ctx = ctx(Method::POST, Some("application/json"));
        let body = InboundBody::CleanedJson(json!({"query": "hi"}));
        let req = materialize(&ctx, &stored_target(), "chat-messages", body)
            .await
            .unwrap();
        let bytes = raw_bytes(req.body).await;
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!({"query": "hi"}));
    }

    #[tokio::test]
    async fn test_malformed_json_forwarded_raw() {
        let ctx = ctx(Method::POST, Some("application/json"));
        let (inbound, _) = extract_override(Bytes::from_static(b"{\"query\": "));
        let req = materialize(&ctx, &stored_target(), "chat-messages", inbound)
            .await
            .unwrap();
        assert_eq!(req.method, Method::POST);
        assert_eq!(raw_bytes(req.body).await.as_ref(), b"{\"query\": ");
    }

    #[tokio::test]
    async fn test_multipart_upload_is_reencoded() {
        let boundary = "XBOUNDARYX";
        let payload = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"user\"\r\n\r\nu1\r\n\
             --{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\
             Content-Type: text/plain\r\n\r\nhello\r\n--{boundary}--\r\n"
        );
        let ctx = ctx(
            Method::POST,
            Some(format!("multipart/form-data; boundary={boundary}").as_str()),
        );
        let req = materialize(
            &ctx,
            &stored_target(),
            "files/upload",
            InboundBody::Stream(AxumBody::from(payload)),
        )
        .await
        .unwrap();

        assert!(req.headers.get(header::CONTENT_TYPE).is_none());
        match req.body {
            ForwardBody::Multipart(parts) => {
                assert_eq!(parts.len(), 2);
                assert_eq!(parts[0].name, "user");
                assert_eq!(parts[0].data.as_ref(), b"u1");
                assert_eq!(parts[1].file_name.as_deref(), Some("a.txt"));
                assert_eq!(parts[1].content_type.as_deref(), Some("text/plain"));
                assert_eq!(parts[1].data.as_ref(), b"hello");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_multipart_parse_failure_is_bad_request() {
        let ctx = ctx(Method::POST, Some("multipart/form-data"));
        let err = materialize(
            &ctx,
            &stored_target(),
            "audio-to-text",
            InboundBody::Stream(AxumBody::from("garbage")),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), http::StatusCode::BAD_REQUEST);
        assert!(matches!(err, GatewayError::MultipartParse { .. }));
    }

    #[tokio::test]
    async fn test_multipart_outside_upload_paths_streams_raw() {
        let ctx = ctx(Method::POST, Some("multipart/form-data; boundary=b"));
        let req = materialize(
            &ctx,
            &stored_target(),
            "chat-messages",
            InboundBody::Stream(AxumBody::from("opaque")),
        )
        .await
        .unwrap();
        assert!(req.headers.get(header::CONTENT_TYPE).is_some());
        assert_eq!(raw_bytes(req.body).await.as_ref(), b"opaque");
    }
}
