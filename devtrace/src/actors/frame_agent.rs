//! FrameAgentActor - per-frame content agent.
//!
//! Owns the frame's tool register and its end of the trace pipeline:
//! - Activation commands flip tools on/off and arm/disarm the capture feed
//! - Host frames (top-level window) keep records for the tab's aggregator
//! - Worker frames (sub-frames) forward records to the coordinator
//!
//! Role is fixed when the agent starts. Records produced before the host's
//! aggregator is ready are queued and flushed once, in arrival order.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use ractor::{Actor, ActorId, ActorProcessingErr, ActorRef, RpcReplyPort};
use serde::Serialize;
use shared_types::{
    ActivationCommand, FrameId, RelayEnvelope, StateReport, TabId, ToolKind, TraceEvent,
    TraceRecord,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::actors::coordinator::CoordinatorMsg;
use crate::actors::tool_register::{ToolHooks, ToolRegister, Transition};
use crate::actors::trace_aggregator::{
    TraceAggregatorActor, TraceAggregatorArguments, TraceAggregatorMsg,
};
use crate::config::PipelineConfig;
use crate::page::{FrameWindow, WindowMessage};
use crate::trace_log::resolve_url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameRole {
    Host,
    Worker,
}

#[derive(Clone)]
pub struct FrameAgentArguments {
    pub tab_id: TabId,
    pub frame_id: FrameId,
    pub window: Arc<FrameWindow>,
    pub coordinator: Option<ActorRef<CoordinatorMsg>>,
    pub pipeline: PipelineConfig,
    pub hooks: Arc<dyn ToolHooks>,
}

pub struct FrameAgentState {
    tab_id: TabId,
    frame_id: FrameId,
    role: FrameRole,
    window: Arc<FrameWindow>,
    coordinator: Option<ActorRef<CoordinatorMsg>>,
    pipeline: PipelineConfig,
    hooks: Arc<dyn ToolHooks>,
    register: ToolRegister,
    feed: Option<JoinHandle<()>>,
    aggregator: Option<ActorRef<TraceAggregatorMsg>>,
    aggregator_ready: bool,
    pending: VecDeque<TraceRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameStatus {
    pub tab_id: TabId,
    pub frame_id: FrameId,
    pub role: FrameRole,
    pub network_monitor: bool,
    pub exclusive_tool: Option<ToolKind>,
    pub aggregator_ready: bool,
    pub pending: usize,
}

#[derive(Debug)]
pub enum FrameAgentMsg {
    /// Apply an activation command from the coordinator
    Activate(ActivationCommand),
    /// Message seen on the frame window while the feed is armed
    WindowMessage(WindowMessage),
    /// Record forwarded by the coordinator from a worker frame
    RelayedTrace(RelayEnvelope),
    /// Sent by this frame's aggregator from its post_start
    AggregatorReady { aggregator_id: ActorId },
    GetStatus {
        reply: RpcReplyPort<FrameStatus>,
    },
    GetAggregator {
        reply: RpcReplyPort<Option<ActorRef<TraceAggregatorMsg>>>,
    },
}

#[derive(Debug, Default)]
pub struct FrameAgentActor;

#[async_trait]
impl Actor for FrameAgentActor {
    type Msg = FrameAgentMsg;
    type State = FrameAgentState;
    type Arguments = FrameAgentArguments;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let role = if args.window.is_top_level() {
            FrameRole::Host
        } else {
            FrameRole::Worker
        };

        tracing::info!(
            tab_id = %args.tab_id,
            frame_id = %args.frame_id,
            ?role,
            location = %args.window.location(),
            "FrameAgentActor starting"
        );

        Ok(FrameAgentState {
            tab_id: args.tab_id,
            frame_id: args.frame_id,
            role,
            window: args.window,
            coordinator: args.coordinator,
            pipeline: args.pipeline,
            hooks: args.hooks,
            register: ToolRegister::new(),
            feed: None,
            aggregator: None,
            aggregator_ready: false,
            pending: VecDeque::new(),
        })
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        self.disarm(state);
        if let Some(tool) = state.register.exclusive_tool() {
            state.hooks.detach(tool);
        }
        if let Some(coordinator) = &state.coordinator {
            let _ = coordinator.cast(CoordinatorMsg::FrameDetached {
                tab_id: state.tab_id,
                frame_id: state.frame_id,
                actor_id: myself.get_id(),
            });
        }
        tracing::info!(
            tab_id = %state.tab_id,
            frame_id = %state.frame_id,
            "FrameAgentActor stopped"
        );
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            FrameAgentMsg::Activate(command) => {
                self.handle_activate(&myself, command, state).await;
            }
            FrameAgentMsg::WindowMessage(message) => {
                self.handle_window_message(message, state);
            }
            FrameAgentMsg::RelayedTrace(envelope) => {
                self.handle_relayed(envelope, state);
            }
            FrameAgentMsg::AggregatorReady { aggregator_id } => {
                self.handle_aggregator_ready(aggregator_id, state);
            }
            FrameAgentMsg::GetStatus { reply } => {
                let _ = reply.send(FrameStatus {
                    tab_id: state.tab_id,
                    frame_id: state.frame_id,
                    role: state.role,
                    network_monitor: state.register.is_active(ToolKind::NetworkMonitor),
                    exclusive_tool: state.register.exclusive_tool(),
                    aggregator_ready: state.aggregator_ready,
                    pending: state.pending.len(),
                });
            }
            FrameAgentMsg::GetAggregator { reply } => {
                let _ = reply.send(state.aggregator.clone());
            }
        }
        Ok(())
    }
}

impl FrameAgentActor {
    async fn handle_activate(
        &self,
        myself: &ActorRef<FrameAgentMsg>,
        command: ActivationCommand,
        state: &mut FrameAgentState,
    ) {
        let transition = state
            .register
            .apply(command.tool, command.forced_state, command.args.clone());

        if transition.changed() {
            self.apply_transition(myself, &transition, state).await;
            if command.silent {
                tracing::debug!(
                    tab_id = %state.tab_id,
                    frame_id = %state.frame_id,
                    tool = %command.tool,
                    active = transition.now_active,
                    "Tool state changed (silent)"
                );
            } else {
                tracing::info!(
                    tab_id = %state.tab_id,
                    frame_id = %state.frame_id,
                    tool = %command.tool,
                    active = transition.now_active,
                    "Tool state changed"
                );
            }
        }

        // The host speaks for the tab; reported even when nothing changed.
        if state.role == FrameRole::Host {
            if let Some(coordinator) = &state.coordinator {
                let report = StateReport {
                    tool: command.tool,
                    active: transition.now_active,
                    args: state.register.args(command.tool).cloned(),
                };
                if let Err(e) = coordinator.cast(CoordinatorMsg::StateReport {
                    tab_id: state.tab_id,
                    report,
                }) {
                    tracing::warn!(
                        tab_id = %state.tab_id,
                        error = %e,
                        "State report not delivered"
                    );
                }
            }
        }
    }

    async fn apply_transition(
        &self,
        myself: &ActorRef<FrameAgentMsg>,
        transition: &Transition,
        state: &mut FrameAgentState,
    ) {
        if let Some(displaced) = transition.displaced {
            state.hooks.detach(displaced);
        }

        if transition.tool == ToolKind::NetworkMonitor {
            if transition.now_active {
                self.arm(myself, state).await;
            } else {
                self.disarm(state);
            }
            return;
        }

        if transition.reattach || !transition.now_active {
            state.hooks.detach(transition.tool);
        }
        if transition.now_active {
            state
                .hooks
                .attach(transition.tool, state.register.args(transition.tool));
        }
    }

    /// Install the interceptor (once per frame) and start listening to the
    /// window. Host frames also get a fresh aggregator.
    async fn arm(&self, myself: &ActorRef<FrameAgentMsg>, state: &mut FrameAgentState) {
        state.window.install_interceptor();

        let mut rx = state.window.subscribe();
        let feed_ref = myself.clone();
        state.feed = Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(message) => {
                        if feed_ref.cast(FrameAgentMsg::WindowMessage(message)).is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Frame feed lagged; window messages dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));

        if state.role != FrameRole::Host {
            return;
        }

        let args = TraceAggregatorArguments {
            base_url: Some(state.window.location().clone()),
            pipeline: state.pipeline.clone(),
            owner: Some(myself.clone()),
        };
        match Actor::spawn(None, TraceAggregatorActor, args).await {
            Ok((aggregator, _handle)) => {
                state.aggregator = Some(aggregator);
            }
            Err(e) => {
                tracing::warn!(
                    tab_id = %state.tab_id,
                    error = %e,
                    "Failed to start trace aggregator"
                );
            }
        }
    }

    fn disarm(&self, state: &mut FrameAgentState) {
        if let Some(feed) = state.feed.take() {
            feed.abort();
        }
        if let Some(aggregator) = state.aggregator.take() {
            aggregator.stop(None);
        }
        state.aggregator_ready = false;
        state.pending.clear();
    }

    fn handle_window_message(&self, message: WindowMessage, state: &mut FrameAgentState) {
        // Captures still in flight when the monitor went off are dropped here.
        if !state.register.is_active(ToolKind::NetworkMonitor) {
            return;
        }
        let Some(event) = TraceEvent::from_window_data(&message.data) else {
            return;
        };
        if state.pipeline.filters.is_denied(&event.url) {
            tracing::debug!(url = %event.url, "Denylisted call ignored");
            return;
        }

        let record = event.into_record(state.frame_id);
        self.on_trace_event(record, state);
    }

    fn handle_relayed(&self, envelope: RelayEnvelope, state: &mut FrameAgentState) {
        if state.role != FrameRole::Host || !state.register.is_active(ToolKind::NetworkMonitor) {
            tracing::debug!(
                tab_id = %envelope.tab_id,
                origin_frame_id = %envelope.origin_frame_id,
                "Relayed trace dropped; monitor not running on host"
            );
            return;
        }
        self.on_trace_event(envelope.record, state);
    }

    fn on_trace_event(&self, mut record: TraceRecord, state: &mut FrameAgentState) {
        match state.role {
            FrameRole::Host => match (&state.aggregator, state.aggregator_ready) {
                (Some(aggregator), true) => {
                    let _ = aggregator.cast(TraceAggregatorMsg::Ingest(record));
                }
                _ => state.pending.push_back(record),
            },
            FrameRole::Worker => {
                let Some(coordinator) = &state.coordinator else {
                    return;
                };
                // The host resolves against its own location, so send it absolute.
                record.url = resolve_url(Some(state.window.location()), &record.url);
                let envelope = RelayEnvelope {
                    tab_id: state.tab_id,
                    origin_frame_id: state.frame_id,
                    record,
                };
                if let Err(e) = coordinator.cast(CoordinatorMsg::RelayTrace(envelope)) {
                    tracing::debug!(
                        tab_id = %state.tab_id,
                        error = %e,
                        "Relay to coordinator failed"
                    );
                }
            }
        }
    }

    fn handle_aggregator_ready(&self, aggregator_id: ActorId, state: &mut FrameAgentState) {
        let Some(aggregator) = &state.aggregator else {
            return;
        };
        if aggregator.get_id() != aggregator_id || state.aggregator_ready {
            return;
        }

        state.aggregator_ready = true;
        let flushed = state.pending.len();
        for record in state.pending.drain(..) {
            let _ = aggregator.cast(TraceAggregatorMsg::Ingest(record));
        }
        tracing::debug!(tab_id = %state.tab_id, flushed, "Trace aggregator ready");
    }
}

// ============================================================================
// Convenience Functions
// ============================================================================

pub async fn frame_status(
    agent: &ActorRef<FrameAgentMsg>,
) -> Result<FrameStatus, ractor::RactorErr<FrameAgentMsg>> {
    ractor::call!(agent, |reply| FrameAgentMsg::GetStatus { reply })
}

pub async fn aggregator_of(
    agent: &ActorRef<FrameAgentMsg>,
) -> Result<Option<ActorRef<TraceAggregatorMsg>>, ractor::RactorErr<FrameAgentMsg>> {
    ractor::call!(agent, |reply| FrameAgentMsg::GetAggregator { reply })
}
