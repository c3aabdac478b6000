//! HTTP handlers for the service endpoints.
//!
//! `/v1/propagate` is the CloudEvent intake: decode, classify, hand to
//! the propagator, and map the outcome onto a status code. Push
//! delivery interprets the status: 2xx acknowledges the message,
//! anything else redelivers it.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use firesync_propagator::{PropagationResult, Propagator};
use firesync_types::{ChangeEvent, Event};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub propagator: Arc<Propagator>,
    /// Answer accepted intakes with plain 200s; see
    /// [`Config::force_http200_ack`](crate::Config::force_http200_ack).
    pub force_http200_ack: bool,
}

impl AppState {
    fn ack(&self, status: StatusCode) -> Response {
        if self.force_http200_ack {
            StatusCode::OK.into_response()
        } else {
            status.into_response()
        }
    }
}

/// Builds the service router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/propagate", post(propagate))
        .route("/v1/replicate", post(replicate))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

async fn propagate(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    log_cloudevent_headers(&headers);

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .or_else(|| headers.get("ce-datacontenttype"))
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !is_json(content_type) {
        warn!(content_type, "unsupported media type");
        return StatusCode::UNSUPPORTED_MEDIA_TYPE.into_response();
    }

    let raw: ChangeEvent = match serde_json::from_slice(&body) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "failed to decode change payload");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let event = match Event::classify(raw, intake_event_time(&headers, Utc::now())) {
        Ok(event) => event.with_trace(trace_id_from_headers(&headers)),
        Err(e) => {
            warn!(error = %e, "failed to classify event");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match state.propagator.propagate(&event).await {
        Ok(PropagationResult::Success) => state.ack(StatusCode::ACCEPTED),
        Ok(PropagationResult::Skipped) => state.ack(StatusCode::NO_CONTENT),
        // The engine reports failures as `Err`, never as `Ok(Error)`.
        Ok(PropagationResult::Error) => unreachable!("propagate reports failures as Err"),
        Err(e) => {
            error!(error = %e, "propagation failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Reserved for inbound peer messages; acknowledges the push.
async fn replicate() -> StatusCode {
    StatusCode::OK
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics(State(state): State<AppState>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.propagator.metrics().to_prometheus(),
    )
        .into_response()
}

fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|media| media.trim() == "application/json")
}

/// Event time for deletions: the `ce-time` header when it parses and is
/// not in the future, else the intake wall clock. Skewed future
/// timestamps must not win LWW races they did not earn.
fn intake_event_time(headers: &HeaderMap, now: DateTime<Utc>) -> DateTime<Utc> {
    headers
        .get("ce-time")
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
        .filter(|parsed| *parsed < now)
        .unwrap_or(now)
}

/// Extracts the trace id from a W3C `traceparent` header when the trace
/// was sampled.
fn trace_id_from_headers(headers: &HeaderMap) -> Option<String> {
    let raw = headers
        .get("ce-traceparent")
        .or_else(|| headers.get("traceparent"))?
        .to_str()
        .ok()?;

    let mut parts = raw.split('-');
    let _version = parts.next()?;
    let trace_id = parts.next()?;
    let _parent_id = parts.next()?;
    let flags = parts.next()?;

    if trace_id.len() != 32 || trace_id.bytes().all(|b| b == b'0') {
        return None;
    }
    let sampled = u8::from_str_radix(flags, 16).ok()? & 1 == 1;
    sampled.then(|| trace_id.to_string())
}

/// One structured line per intake request carrying whichever CloudEvent
/// headers are present.
fn log_cloudevent_headers(headers: &HeaderMap) {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
    };

    debug!(
        ce_id = get("ce-id"),
        ce_source = get("ce-source"),
        ce_specversion = get("ce-specversion"),
        ce_type = get("ce-type"),
        ce_subject = get("ce-subject"),
        ce_time = get("ce-time"),
        ce_database = get("ce-database"),
        ce_document = get("ce-document"),
        "cloudevent intake"
    );
}
