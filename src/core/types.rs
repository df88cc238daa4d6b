//! Request-scoped data model shared by every gateway stage.
//!
//! Values here are constructed once per inbound call and then passed by value
//! or reference down the pipeline; nothing is shared across requests.
use std::fmt;

use axum::body::Body as AxumBody;
use bytes::Bytes;
use http::{Extensions, HeaderMap, Method};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Behavioral classification of an upstream application. Decides how request
/// paths are rewritten before forwarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", from = "String")]
pub enum AppBehaviorType {
    Chat,
    Agent,
    Chatflow,
    Workflow,
    TextGeneration,
    #[default]
    Unknown,
}

impl AppBehaviorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppBehaviorType::Chat => "chat",
            AppBehaviorType::Agent => "agent",
            AppBehaviorType::Chatflow => "chatflow",
            AppBehaviorType::Workflow => "workflow",
            AppBehaviorType::TextGeneration => "text-generation",
            AppBehaviorType::Unknown => "unknown",
        }
    }
}

impl From<&str> for AppBehaviorType {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "chat" => AppBehaviorType::Chat,
            "agent" | "agent-chat" => AppBehaviorType::Agent,
            "chatflow" | "advanced-chat" => AppBehaviorType::Chatflow,
            "workflow" => AppBehaviorType::Workflow,
            "text-generation" | "completion" => AppBehaviorType::TextGeneration,
            _ => AppBehaviorType::Unknown,
        }
    }
}

impl From<String> for AppBehaviorType {
    fn from(value: String) -> Self {
        AppBehaviorType::from(value.as_str())
    }
}

impl fmt::Display for AppBehaviorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upstream settings for one application, as held by the config store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub upstream_base_url: String,
    #[serde(default)]
    pub upstream_key: String,
    #[serde(default)]
    pub app_type: AppBehaviorType,
}

impl AppConfig {
    pub fn new(
        app_id: impl Into<String>,
        upstream_base_url: impl Into<String>,
        upstream_key: impl Into<String>,
        app_type: AppBehaviorType,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            upstream_base_url: upstream_base_url.into(),
            upstream_key: upstream_key.into(),
            app_type,
        }
    }
}

/// Caller-supplied upstream credential carried in the `_temp_config` body field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideCredential {
    pub upstream_base_url: String,
    pub upstream_key: String,
    pub app_type: Option<AppBehaviorType>,
}

impl OverrideCredential {
    /// Both fields must be non-empty for the override to replace the stored config.
    pub fn is_complete(&self) -> bool {
        !self.upstream_base_url.is_empty() && !self.upstream_key.is_empty()
    }
}

/// Upstream target the request is forwarded to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedTarget {
    Stored(AppConfig),
    Override(OverrideCredential),
}

impl ResolvedTarget {
    pub fn base_url(&self) -> &str {
        match self {
            ResolvedTarget::Stored(config) => &config.upstream_base_url,
            ResolvedTarget::Override(cred) => &cred.upstream_base_url,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            ResolvedTarget::Stored(config) => &config.upstream_key,
            ResolvedTarget::Override(cred) => &cred.upstream_key,
        }
    }

    pub fn app_type(&self) -> AppBehaviorType {
        match self {
            ResolvedTarget::Stored(config) => config.app_type,
            ResolvedTarget::Override(cred) => cred.app_type.unwrap_or_default(),
        }
    }

    pub fn is_override(&self) -> bool {
        matches!(self, ResolvedTarget::Override(_))
    }
}

/// Authenticated caller as reported by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
}

/// Per-request context threaded explicitly through every stage.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub method: Method,
    pub headers: HeaderMap,
    /// Inbound request extensions (carries the router's body limit).
    pub extensions: Extensions,
    /// Fires when the inbound client goes away or the server shuts down.
    pub cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(method: Method, headers: HeaderMap) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            method,
            headers,
            extensions: Extensions::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_extensions(mut self, extensions: Extensions) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}

/// Inbound body after the override peek.
pub enum InboundBody {
    /// No body (GET/HEAD or nothing sent).
    Empty,
    /// Syntactically valid JSON that carried an override field; the field is removed.
    CleanedJson(serde_json::Value),
    /// Fully read bytes that are forwarded unmodified.
    Buffered(Bytes),
    /// Untouched inbound stream.
    Stream(AxumBody),
}

impl fmt::Debug for InboundBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InboundBody::Empty => f.write_str("Empty"),
            InboundBody::CleanedJson(v) => f.debug_tuple("CleanedJson").field(v).finish(),
            InboundBody::Buffered(b) => write!(f, "Buffered({} bytes)", b.len()),
            InboundBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Inbound gateway call, constructed once at the router boundary.
pub struct ProxyRequest {
    pub app_id: String,
    pub path_segments: Vec<String>,
    pub query: Option<String>,
    pub context: RequestContext,
    pub body: AxumBody,
}

impl ProxyRequest {
    /// Split a raw slug (`a/b/c`) into non-empty segments.
    pub fn split_slug(slug: &str) -> Vec<String> {
        slug.split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}
