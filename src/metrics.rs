//! Metrics helpers for the gateway.
//!
//! Thin wrappers over the `metrics` crate macros. No exporter is installed
//! here; the binary (or an embedding application) may install any compatible
//! recorder, and without one every call is a no-op.
//!
//! Provided metrics:
//! * `appgate_requests_total` (counter; labels `method`, `status`, `kind`)
//! * `appgate_upstream_request_duration_seconds` (histogram; label `outcome`)
//! * `appgate_active_event_streams` (gauge)
//! * `appgate_config_reloads_total` (counter; label `result`)
use std::time::Duration;

use metrics::{
    Unit, counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};
use once_cell::sync::Lazy;

pub const APPGATE_REQUESTS_TOTAL: &str = "appgate_requests_total";
pub const APPGATE_UPSTREAM_REQUEST_DURATION_SECONDS: &str =
    "appgate_upstream_request_duration_seconds";
pub const APPGATE_ACTIVE_EVENT_STREAMS: &str = "appgate_active_event_streams";
pub const APPGATE_CONFIG_RELOADS_TOTAL: &str = "appgate_config_reloads_total";

static DESCRIBED: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        APPGATE_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of gateway calls answered, by method, status and response kind."
    );
    describe_histogram!(
        APPGATE_UPSTREAM_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Time until the upstream response head arrived."
    );
    describe_gauge!(
        APPGATE_ACTIVE_EVENT_STREAMS,
        "Number of event streams currently being relayed."
    );
    describe_counter!(
        APPGATE_CONFIG_RELOADS_TOTAL,
        Unit::Count,
        "App config reloads attempted, by result."
    );
});

/// Register metric descriptions with the installed recorder.
pub fn describe() {
    Lazy::force(&DESCRIBED);
}

/// Count one answered gateway call.
pub fn increment_request_total(method: &str, status: u16, kind: &'static str) {
    describe();
    counter!(
        APPGATE_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status.to_string(),
        "kind" => kind
    )
    .increment(1);
}

/// Record time-to-headers for one upstream call.
pub fn record_upstream_duration(duration: Duration, succeeded: bool) {
    let outcome = if succeeded { "response" } else { "error" };
    histogram!(APPGATE_UPSTREAM_REQUEST_DURATION_SECONDS, "outcome" => outcome)
        .record(duration.as_secs_f64());
}

pub fn event_stream_opened() {
    gauge!(APPGATE_ACTIVE_EVENT_STREAMS).increment(1.0);
}

pub fn event_stream_closed() {
    gauge!(APPGATE_ACTIVE_EVENT_STREAMS).decrement(1.0);
}

pub fn increment_config_reloads(succeeded: bool) {
    let result = if succeeded { "success" } else { "failure" };
    counter!(APPGATE_CONFIG_RELOADS_TOTAL, "result" => result).increment(1);
}
