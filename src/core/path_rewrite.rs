//! Upstream path rewriting by application behavior type.
//!
//! Workflow apps expose their run endpoints under `workflows/`, and
//! text-generation apps answer on `completion-messages` where chat apps use
//! `chat-messages`. Callers always speak the chat dialect; this module maps it.
use crate::core::types::AppBehaviorType;

const WORKFLOW_PREFIX: &str = "workflows/";
const CHAT_MESSAGES: &str = "chat-messages";
const COMPLETION_MESSAGES: &str = "completion-messages";

/// Paths shared by every app type; never rewritten for workflows.
pub const SHARED_UPLOAD_PATHS: [&str; 2] = ["files/upload", "audio-to-text"];

/// Rewrite the inbound path segments for the given app type. First match wins.
pub fn rewrite(segments: &[String], app_type: AppBehaviorType) -> String {
    let joined = segments.join("/");

    match app_type {
        AppBehaviorType::Workflow => {
            if SHARED_UPLOAD_PATHS.contains(&joined.as_str()) || joined.starts_with(WORKFLOW_PREFIX)
            {
                joined
            } else {
                format!("{WORKFLOW_PREFIX}{joined}")
            }
        }
        AppBehaviorType::TextGeneration => {
            if joined == "messages" || joined == CHAT_MESSAGES {
                COMPLETION_MESSAGES.to_string()
            } else if segments.first().map(String::as_str) == Some(CHAT_MESSAGES) {
                let mut rewritten = segments.to_vec();
                rewritten[0] = COMPLETION_MESSAGES.to_string();
                rewritten.join("/")
            } else {
                joined
            }
        }
        _ => joined,
    }
}

/// True when the rewritten path is one of the multipart upload endpoints.
pub fn is_upload_path(rewritten: &str) -> bool {
    SHARED_UPLOAD_PATHS.contains(&rewritten)
}

/// Build `base/path?query`, percent-encoding each path segment.
pub fn upstream_url(base: &str, rewritten: &str, query: Option<&str>) -> String {
    let encoded = rewritten
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");

    let mut url = format!("{}/{}", base.trim_end_matches('/'), encoded);
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(query);
    }
    url
}
