use std::collections::HashMap;
use std::sync::Arc;

use ractor::{Actor, ActorRef};
use shared_types::{FrameId, TabId};
use tokio::sync::Mutex;
use url::Url;

use crate::actors::coordinator::CoordinatorMsg;
use crate::actors::frame_agent::{self, FrameAgentActor, FrameAgentArguments, FrameAgentMsg};
use crate::actors::tabs::NavigationPhase;
use crate::actors::tool_register::ToolHooks;
use crate::actors::trace_aggregator::{ReplayOutput, TraceAggregatorMsg};
use crate::config::PipelineConfig;
use crate::interceptor::NetworkTransport;
use crate::page::FrameWindow;
use crate::trace_log::{StoredTrace, TraceQuery};

#[derive(Debug, thiserror::Error)]
pub enum AppStateError {
    #[error("Invalid frame URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unknown frame {frame_id} in tab {tab_id}")]
    UnknownFrame { tab_id: TabId, frame_id: FrameId },

    #[error("Network monitor is not running in tab {0}")]
    MonitorInactive(TabId),

    #[error("Actor error: {0}")]
    Actor(String),
}

/// A live frame: its page window and the agent that runs in it
#[derive(Debug, Clone)]
pub struct FrameHandle {
    pub tab_id: TabId,
    pub frame_id: FrameId,
    pub window: Arc<FrameWindow>,
    pub agent: ActorRef<FrameAgentMsg>,
}

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    coordinator: ActorRef<CoordinatorMsg>,
    transport: Arc<dyn NetworkTransport>,
    hooks: Arc<dyn ToolHooks>,
    pipeline: PipelineConfig,
    frames: Mutex<HashMap<(TabId, FrameId), FrameHandle>>,
}

impl AppState {
    pub fn new(
        coordinator: ActorRef<CoordinatorMsg>,
        transport: Arc<dyn NetworkTransport>,
        hooks: Arc<dyn ToolHooks>,
        pipeline: PipelineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                coordinator,
                transport,
                hooks,
                pipeline,
                frames: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn coordinator(&self) -> ActorRef<CoordinatorMsg> {
        self.inner.coordinator.clone()
    }

    /// Load a frame into a tab. Sub-frames default to the tab's top frame as
    /// parent. Re-opening an existing frame replaces its agent.
    pub async fn open_frame(
        &self,
        tab_id: TabId,
        frame_id: FrameId,
        url: &str,
        parent: Option<FrameId>,
    ) -> Result<FrameHandle, AppStateError> {
        let location = Url::parse(url).map_err(|e| AppStateError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let mut frames = self.inner.frames.lock().await;

        let parent_window = if frame_id.is_host() {
            None
        } else {
            let parent_id = parent.unwrap_or(FrameId::HOST);
            let parent = frames
                .get(&(tab_id, parent_id))
                .ok_or(AppStateError::UnknownFrame {
                    tab_id,
                    frame_id: parent_id,
                })?;
            Some(parent.window.clone())
        };

        if let Some(previous) = frames.remove(&(tab_id, frame_id)) {
            previous.agent.stop(None);
        }

        let window = FrameWindow::new(
            location,
            self.inner.transport.clone(),
            parent_window.as_deref(),
            self.inner.pipeline.resource_timing_tolerance,
        );

        let (agent, _handle) = Actor::spawn(
            None,
            FrameAgentActor,
            FrameAgentArguments {
                tab_id,
                frame_id,
                window: window.clone(),
                coordinator: Some(self.inner.coordinator.clone()),
                pipeline: self.inner.pipeline.clone(),
                hooks: self.inner.hooks.clone(),
            },
        )
        .await
        .map_err(|e| AppStateError::Actor(e.to_string()))?;

        ractor::call!(self.inner.coordinator, |reply| CoordinatorMsg::AttachFrame {
            tab_id,
            frame_id,
            agent: agent.clone(),
            reply,
        })
        .map_err(|e| AppStateError::Actor(e.to_string()))?;

        let handle = FrameHandle {
            tab_id,
            frame_id,
            window,
            agent,
        };
        frames.insert((tab_id, frame_id), handle.clone());
        Ok(handle)
    }

    pub async fn frame(&self, tab_id: TabId, frame_id: FrameId) -> Option<FrameHandle> {
        self.inner
            .frames
            .lock()
            .await
            .get(&(tab_id, frame_id))
            .cloned()
    }

    /// Stop every frame of the tab and forget its coordinator state.
    pub async fn close_tab(&self, tab_id: TabId) -> bool {
        let closed = self.unload_frames(tab_id).await;
        let _ = self
            .inner
            .coordinator
            .cast(CoordinatorMsg::TabClosed { tab_id });
        closed > 0
    }

    /// Replace the tab's page with `url` and report the navigation the way
    /// the browser does: a start signal followed by a completion signal.
    pub async fn navigate(&self, tab_id: TabId, url: &str) -> Result<FrameHandle, AppStateError> {
        self.unload_frames(tab_id).await;
        let host = self.open_frame(tab_id, FrameId::HOST, url, None).await?;

        for phase in [NavigationPhase::Started, NavigationPhase::Completed] {
            let _ = self
                .inner
                .coordinator
                .cast(CoordinatorMsg::NavigationObserved {
                    tab_id,
                    url: url.to_string(),
                    phase,
                });
        }
        Ok(host)
    }

    async fn unload_frames(&self, tab_id: TabId) -> usize {
        let mut frames = self.inner.frames.lock().await;
        let keys: Vec<_> = frames.keys().filter(|(t, _)| *t == tab_id).copied().collect();
        for key in &keys {
            if let Some(handle) = frames.remove(key) {
                handle.agent.stop(None);
            }
        }
        keys.len()
    }

    async fn aggregator(
        &self,
        tab_id: TabId,
    ) -> Result<ActorRef<TraceAggregatorMsg>, AppStateError> {
        let host = self
            .frame(tab_id, FrameId::HOST)
            .await
            .ok_or(AppStateError::UnknownFrame {
                tab_id,
                frame_id: FrameId::HOST,
            })?;
        frame_agent::aggregator_of(&host.agent)
            .await
            .map_err(|e| AppStateError::Actor(e.to_string()))?
            .ok_or(AppStateError::MonitorInactive(tab_id))
    }

    pub async fn traces(
        &self,
        tab_id: TabId,
        query: TraceQuery,
        limit: Option<usize>,
    ) -> Result<Vec<StoredTrace>, AppStateError> {
        let aggregator = self.aggregator(tab_id).await?;
        ractor::call!(aggregator, |reply| TraceAggregatorMsg::Query {
            query,
            limit,
            reply
        })
        .map_err(|e| AppStateError::Actor(e.to_string()))
    }

    pub async fn clear_traces(&self, tab_id: TabId) -> Result<(), AppStateError> {
        let aggregator = self.aggregator(tab_id).await?;
        aggregator
            .cast(TraceAggregatorMsg::Clear)
            .map_err(|e| AppStateError::Actor(e.to_string()))
    }

    pub async fn replay(
        &self,
        tab_id: TabId,
        trace_id: String,
    ) -> Result<Option<ReplayOutput>, AppStateError> {
        let aggregator = self.aggregator(tab_id).await?;
        ractor::call!(aggregator, |reply| TraceAggregatorMsg::Replay {
            trace_id,
            reply
        })
        .map_err(|e| AppStateError::Actor(e.to_string()))
    }
}
