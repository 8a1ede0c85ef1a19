//! Interceptor - transparent capture around a frame's network primitives.
//!
//! The page issues calls through its [`FrameWindow`](crate::page::FrameWindow);
//! once an interceptor is installed the window routes both primitives
//! (XHR-style and Fetch-style) through it. The interceptor forwards the call
//! to the underlying [`NetworkTransport`] unchanged, inspects a clone of the
//! result, and posts one tagged window message per completed or failed call.
//!
//! Capture problems never reach the caller: the page sees exactly the
//! response (or error) the transport produced.

pub mod timing;
pub mod transport;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde_json::Value;
use shared_types::{
    Header, TraceEvent, TraceKind, SENTINEL_ABORTED, SENTINEL_NETWORK_ERROR, TRACE_SOURCE_MARKER,
};
use tokio::sync::broadcast;
use url::Url;

use crate::page::WindowMessage;

pub use timing::{resolve_duration, PerformanceTimeline, ResourceTimingEntry};
pub use transport::ReqwestTransport;

/// Placeholder stored when a response body cannot be read as text
pub const BODY_UNAVAILABLE: &str = "body-unavailable";

// ============================================================================
// Transport boundary
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    /// As issued by the page; may be relative to the frame location
    pub url: String,
    pub headers: Vec<Header>,
    /// String bodies are sent verbatim, structured bodies as JSON
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self::new("POST", url).body(body)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Copy of the request with its URL made absolute against `base`.
    pub fn resolved_against(&self, base: &Url) -> Self {
        let url = match Url::parse(&self.url) {
            Ok(absolute) => absolute.to_string(),
            Err(_) => base
                .join(&self.url)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| self.url.clone()),
        };
        Self {
            url,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<Header>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request aborted")]
    Aborted,
}

impl TransportError {
    /// Response sentinel recorded for this failure
    pub fn sentinel(&self) -> &'static str {
        match self {
            TransportError::Network(_) => SENTINEL_NETWORK_ERROR,
            TransportError::Aborted => SENTINEL_ABORTED,
        }
    }
}

/// The page's network stack. Implementations append a
/// [`ResourceTimingEntry`] to `timeline` for every request they complete.
#[async_trait]
pub trait NetworkTransport: Send + Sync {
    async fn send(
        &self,
        request: HttpRequest,
        timeline: &PerformanceTimeline,
    ) -> Result<HttpResponse, TransportError>;
}

// ============================================================================
// Interceptor
// ============================================================================

pub struct Interceptor {
    inner: Arc<dyn NetworkTransport>,
    location: Url,
    timeline: PerformanceTimeline,
    window: broadcast::Sender<WindowMessage>,
    tolerance: Duration,
}

impl Interceptor {
    pub fn new(
        inner: Arc<dyn NetworkTransport>,
        location: Url,
        timeline: PerformanceTimeline,
        window: broadcast::Sender<WindowMessage>,
        tolerance: Duration,
    ) -> Self {
        Self {
            inner,
            location,
            timeline,
            window,
            tolerance,
        }
    }

    pub async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.intercept(TraceKind::Fetch, request).await
    }

    pub async fn xhr(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.intercept(TraceKind::Xhr, request).await
    }

    async fn intercept(
        &self,
        kind: TraceKind,
        request: HttpRequest,
    ) -> Result<HttpResponse, TransportError> {
        let wire = request.resolved_against(&self.location);
        let absolute_url = wire.url.clone();

        let started_at = Utc::now().timestamp_millis();
        let clock = Instant::now();
        let result = self.inner.send(wire, &self.timeline).await;
        let elapsed = clock.elapsed();

        let duration_ms = resolve_duration(
            &self.timeline,
            &absolute_url,
            started_at,
            elapsed,
            self.tolerance,
        );

        let (status, response) = match &result {
            Ok(resp) => (resp.status, captured_body(resp)),
            Err(e) => (0, Some(Value::String(e.sentinel().to_string()))),
        };

        self.emit(TraceEvent {
            source: TRACE_SOURCE_MARKER.to_string(),
            kind,
            method: request.method.to_ascii_uppercase(),
            url: request.url,
            status,
            payload: request.body,
            response,
            duration_ms,
            headers: request.headers,
            started_at,
        });

        result
    }

    /// Fire-and-forget post to the frame window.
    fn emit(&self, event: TraceEvent) {
        let data = match serde_json::to_value(&event) {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!(error = %e, url = %event.url, "Failed to encode trace event");
                return;
            }
        };
        // No subscribers just means the feed is disarmed.
        if self.window.send(WindowMessage { data }).is_err() {
            tracing::trace!(url = %event.url, "Trace event posted with no listener");
        }
    }
}

fn captured_body(response: &HttpResponse) -> Option<Value> {
    if response.body.is_empty() {
        return None;
    }
    Some(Value::String(
        response
            .text()
            .map(str::to_string)
            .unwrap_or_else(|| BODY_UNAVAILABLE.to_string()),
    ))
}
