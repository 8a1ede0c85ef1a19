//! FrameWindow - the page context of one frame.
//!
//! Holds what a frame's page code can reach: its location, its window
//! message channel, its resource timing buffer, and the two network entry
//! points. Frame agents subscribe to the window channel; the interceptor
//! posts to it.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::broadcast;
use ulid::Ulid;
use url::Url;

use crate::interceptor::{
    HttpRequest, HttpResponse, Interceptor, NetworkTransport, PerformanceTimeline, TransportError,
};

const WINDOW_CHANNEL_CAPACITY: usize = 256;

/// A message posted on a frame window, from any script on the page
#[derive(Debug, Clone, PartialEq)]
pub struct WindowMessage {
    pub data: serde_json::Value,
}

pub struct FrameWindow {
    window_id: Ulid,
    top_window_id: Ulid,
    location: Url,
    channel: broadcast::Sender<WindowMessage>,
    timeline: PerformanceTimeline,
    transport: Arc<dyn NetworkTransport>,
    interceptor: OnceLock<Arc<Interceptor>>,
    timing_tolerance: Duration,
}

impl FrameWindow {
    /// Open a window. Without a parent the window is its own top window.
    pub fn new(
        location: Url,
        transport: Arc<dyn NetworkTransport>,
        parent: Option<&FrameWindow>,
        timing_tolerance: Duration,
    ) -> Arc<Self> {
        let window_id = Ulid::new();
        let top_window_id = parent.map(|p| p.top_window_id).unwrap_or(window_id);
        let (channel, _) = broadcast::channel(WINDOW_CHANNEL_CAPACITY);

        Arc::new(Self {
            window_id,
            top_window_id,
            location,
            channel,
            timeline: PerformanceTimeline::new(),
            transport,
            interceptor: OnceLock::new(),
            timing_tolerance,
        })
    }

    pub fn is_top_level(&self) -> bool {
        self.window_id == self.top_window_id
    }

    pub fn location(&self) -> &Url {
        &self.location
    }

    pub fn timeline(&self) -> &PerformanceTimeline {
        &self.timeline
    }

    pub fn post_message(&self, data: serde_json::Value) {
        let _ = self.channel.send(WindowMessage { data });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WindowMessage> {
        self.channel.subscribe()
    }

    /// Wrap the network primitives. Later calls return the interceptor that
    /// is already installed.
    pub fn install_interceptor(&self) -> Arc<Interceptor> {
        self.interceptor
            .get_or_init(|| {
                tracing::debug!(location = %self.location, "Installing network interceptor");
                Arc::new(Interceptor::new(
                    self.transport.clone(),
                    self.location.clone(),
                    self.timeline.clone(),
                    self.channel.clone(),
                    self.timing_tolerance,
                ))
            })
            .clone()
    }

    pub fn interceptor(&self) -> Option<Arc<Interceptor>> {
        self.interceptor.get().cloned()
    }

    pub async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        match self.interceptor.get() {
            Some(interceptor) => interceptor.fetch(request).await,
            None => self.send_raw(request).await,
        }
    }

    pub async fn xhr(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        match self.interceptor.get() {
            Some(interceptor) => interceptor.xhr(request).await,
            None => self.send_raw(request).await,
        }
    }

    async fn send_raw(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let wire = request.resolved_against(&self.location);
        self.transport.send(wire, &self.timeline).await
    }
}

impl std::fmt::Debug for FrameWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameWindow")
            .field("window_id", &self.window_id)
            .field("top_level", &self.is_top_level())
            .field("location", &self.location.as_str())
            .field("intercepted", &self.interceptor.get().is_some())
            .finish()
    }
}
