//! CoordinatorActor - the singleton background coordinator.
//!
//! Owns the authoritative per-tab [`ToolActivation`] map and the tab/frame
//! registry. Responsibilities:
//! - Record tool state reported by host frames and persist the global tool
//! - Relay worker-frame traces to the tab's host frame
//! - Re-activate tools after navigation when persistent mode is on
//! - Global kill switch and browsing-data clearing
//!
//! Delivery to frames is fire-and-forget. The only retry is the delayed
//! second activation after a navigation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use ractor::{Actor, ActorId, ActorProcessingErr, ActorRef, RpcReplyPort};
use shared_types::{
    ActivationCommand, ClearDataRequest, ClearDataResponse, FrameId, PersistedSettings,
    RelayEnvelope, StateReport, TabId, ToolActivation, ToolKind,
};

use crate::actors::frame_agent::FrameAgentMsg;
use crate::actors::tabs::{NavigationPhase, TabRegistry, TabSummary};
use crate::browsing_data::{BrowsingDataPlatform, PlatformError, RemovalSet};
use crate::settings_store::{SettingsError, SettingsStore};

/// URL prefixes of browser-internal pages that are never re-activated
pub const PRIVILEGED_URL_PREFIXES: [&str; 5] = [
    "chrome://",
    "chrome-extension://",
    "about:",
    "edge://",
    "devtools://",
];

pub fn is_privileged_url(url: &str) -> bool {
    let lower = url.trim().to_ascii_lowercase();
    PRIVILEGED_URL_PREFIXES
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("Unknown tab: {0}")]
    UnknownTab(TabId),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Browsing data platform error: {0}")]
    Platform(#[from] PlatformError),
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug)]
pub enum CoordinatorMsg {
    /// A frame agent came up
    AttachFrame {
        tab_id: TabId,
        frame_id: FrameId,
        agent: ActorRef<FrameAgentMsg>,
        reply: RpcReplyPort<()>,
    },
    /// Sent by a frame agent when it stops
    FrameDetached {
        tab_id: TabId,
        frame_id: FrameId,
        actor_id: ActorId,
    },
    TabClosed {
        tab_id: TabId,
    },
    /// Host frame reporting the resulting state of a tool
    StateReport {
        tab_id: TabId,
        report: StateReport,
    },
    /// Worker frame trace addressed to the tab's host frame
    RelayTrace(RelayEnvelope),
    NavigationObserved {
        tab_id: TabId,
        url: String,
        phase: NavigationPhase,
    },
    /// Delayed second send of a post-navigation activation
    ResendActivation {
        tab_id: TabId,
        command: ActivationCommand,
    },
    /// Send a command to every frame of a tab
    DispatchCommand {
        tab_id: TabId,
        command: ActivationCommand,
        reply: RpcReplyPort<Result<usize, CoordinatorError>>,
    },
    KillAll,
    ClearBrowsingData {
        request: ClearDataRequest,
        /// Epoch ms; 0 clears everything
        since: i64,
        reply: RpcReplyPort<Result<ClearDataResponse, CoordinatorError>>,
    },
    SetPersistentMode {
        enabled: bool,
        reply: RpcReplyPort<Result<PersistedSettings, CoordinatorError>>,
    },
    GetSettings {
        reply: RpcReplyPort<PersistedSettings>,
    },
    GetActivation {
        tab_id: TabId,
        reply: RpcReplyPort<Option<ToolActivation>>,
    },
    ListTabs {
        reply: RpcReplyPort<Vec<TabSummary>>,
    },
}

// ============================================================================
// Actor
// ============================================================================

#[derive(Clone)]
pub struct CoordinatorArguments {
    pub settings: SettingsStore,
    pub platform: Arc<dyn BrowsingDataPlatform>,
    pub reactivation_retry_delay: Duration,
}

pub struct CoordinatorState {
    store: SettingsStore,
    settings: PersistedSettings,
    platform: Arc<dyn BrowsingDataPlatform>,
    retry_delay: Duration,
    tabs: TabRegistry,
    activations: HashMap<TabId, ToolActivation>,
}

#[derive(Debug, Default)]
pub struct CoordinatorActor;

#[async_trait]
impl Actor for CoordinatorActor {
    type Msg = CoordinatorMsg;
    type State = CoordinatorState;
    type Arguments = CoordinatorArguments;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let settings = match args.settings.load().await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load settings; using defaults");
                PersistedSettings::default()
            }
        };

        tracing::info!(
            persistent_mode = settings.persistent_mode,
            active_tool = ?settings.active_tool,
            "CoordinatorActor starting"
        );

        Ok(CoordinatorState {
            store: args.settings,
            settings,
            platform: args.platform,
            retry_delay: args.reactivation_retry_delay,
            tabs: TabRegistry::new(),
            activations: HashMap::new(),
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            CoordinatorMsg::AttachFrame {
                tab_id,
                frame_id,
                agent,
                reply,
            } => {
                self.handle_attach(tab_id, frame_id, agent, state);
                let _ = reply.send(());
            }
            CoordinatorMsg::FrameDetached {
                tab_id,
                frame_id,
                actor_id,
            } => {
                if state.tabs.detach(tab_id, frame_id, actor_id) {
                    tracing::debug!(tab_id = %tab_id, frame_id = %frame_id, "Frame detached");
                }
            }
            CoordinatorMsg::TabClosed { tab_id } => {
                state.tabs.close(tab_id);
                state.activations.remove(&tab_id);
                tracing::info!(tab_id = %tab_id, "Tab closed");
            }
            CoordinatorMsg::StateReport { tab_id, report } => {
                self.record_activation(tab_id, report, state).await;
            }
            CoordinatorMsg::RelayTrace(envelope) => {
                self.relay_trace(envelope, state);
            }
            CoordinatorMsg::NavigationObserved { tab_id, url, phase } => {
                self.on_navigation_observed(&myself, tab_id, &url, phase, state);
            }
            CoordinatorMsg::ResendActivation { tab_id, command } => {
                self.send_to_tab(tab_id, &command, state);
            }
            CoordinatorMsg::DispatchCommand {
                tab_id,
                command,
                reply,
            } => {
                let frames = state.tabs.frames(tab_id);
                let result = if frames.is_empty() {
                    Err(CoordinatorError::UnknownTab(tab_id))
                } else {
                    Ok(self.send_to_tab(tab_id, &command, state))
                };
                let _ = reply.send(result);
            }
            CoordinatorMsg::KillAll => {
                self.kill_all(state);
            }
            CoordinatorMsg::ClearBrowsingData {
                request,
                since,
                reply,
            } => {
                self.clear_browsing_data(request, since, reply, state);
            }
            CoordinatorMsg::SetPersistentMode { enabled, reply } => {
                let result = match state.store.set_persistent_mode(enabled).await {
                    Ok(()) => {
                        state.settings.persistent_mode = enabled;
                        tracing::info!(persistent_mode = enabled, "Persistent mode updated");
                        Ok(state.settings.clone())
                    }
                    Err(e) => Err(CoordinatorError::from(e)),
                };
                let _ = reply.send(result);
            }
            CoordinatorMsg::GetSettings { reply } => {
                let _ = reply.send(state.settings.clone());
            }
            CoordinatorMsg::GetActivation { tab_id, reply } => {
                let _ = reply.send(state.activations.get(&tab_id).cloned());
            }
            CoordinatorMsg::ListTabs { reply } => {
                let _ = reply.send(state.tabs.summaries());
            }
        }
        Ok(())
    }
}

impl CoordinatorActor {
    fn handle_attach(
        &self,
        tab_id: TabId,
        frame_id: FrameId,
        agent: ActorRef<FrameAgentMsg>,
        state: &mut CoordinatorState,
    ) {
        state.tabs.attach(tab_id, frame_id, agent.clone());
        tracing::debug!(tab_id = %tab_id, frame_id = %frame_id, "Frame attached");

        // Sub-frames loading into a monitored tab join the running session.
        if !frame_id.is_host()
            && state
                .activations
                .get(&tab_id)
                .is_some_and(|a| a.network_monitor)
        {
            let command = ActivationCommand::force(ToolKind::NetworkMonitor, true).silent();
            let _ = agent.cast(FrameAgentMsg::Activate(command));
        }

        if let Some(command) = global_tool_restore(&state.settings) {
            let _ = agent.cast(FrameAgentMsg::Activate(command));
        }
    }

    /// Upsert the tab's activation from a host report and persist the global
    /// tool. Turning the network monitor off drops the tab's entry.
    async fn record_activation(
        &self,
        tab_id: TabId,
        report: StateReport,
        state: &mut CoordinatorState,
    ) {
        match (report.tool, report.active) {
            (ToolKind::NetworkMonitor, false) => {
                state.activations.remove(&tab_id);
            }
            (tool, true) => {
                let entry = state
                    .activations
                    .entry(tab_id)
                    .or_insert_with(|| ToolActivation::new(tab_id));
                if tool == ToolKind::NetworkMonitor {
                    entry.network_monitor = true;
                } else {
                    entry.exclusive_tool = Some(tool);
                    entry.args = report.args.clone();
                }
                entry.updated_at = Utc::now();
            }
            (tool, false) => {
                if let Some(entry) = state.activations.get_mut(&tab_id) {
                    if entry.exclusive_tool == Some(tool) {
                        entry.exclusive_tool = None;
                        entry.args = None;
                        entry.updated_at = Utc::now();
                    }
                }
            }
        }

        let active_tool = report.active.then_some(report.tool);
        let args = if report.active { report.args } else { None };
        state.settings.active_tool = active_tool;
        state.settings.active_tool_args = args.clone();
        if let Err(e) = state.store.set_active_tool(active_tool, args).await {
            tracing::warn!(tab_id = %tab_id, error = %e, "Failed to persist active tool");
        }
    }

    fn relay_trace(&self, envelope: RelayEnvelope, state: &CoordinatorState) {
        let Some(host) = state.tabs.host(envelope.tab_id) else {
            tracing::debug!(tab_id = %envelope.tab_id, "No host frame for relayed trace");
            return;
        };
        let tab_id = envelope.tab_id;
        if let Err(e) = host.cast(FrameAgentMsg::RelayedTrace(envelope)) {
            tracing::debug!(tab_id = %tab_id, error = %e, "Relay to host frame failed");
        }
    }

    fn on_navigation_observed(
        &self,
        myself: &ActorRef<CoordinatorMsg>,
        tab_id: TabId,
        url: &str,
        phase: NavigationPhase,
        state: &mut CoordinatorState,
    ) {
        if is_privileged_url(url) {
            tracing::debug!(tab_id = %tab_id, url = %url, "Privileged page; navigation ignored");
            return;
        }
        if state.tabs.frames(tab_id).is_empty() {
            tracing::debug!(tab_id = %tab_id, url = %url, "No frames in tab; navigation ignored");
            return;
        }
        if !state
            .tabs
            .begin_transition(tab_id, url, phase, state.retry_delay)
        {
            tracing::debug!(tab_id = %tab_id, url = %url, ?phase, "Navigation signal coalesced");
            return;
        }
        if !state.settings.persistent_mode {
            return;
        }

        if state
            .activations
            .get(&tab_id)
            .is_some_and(|a| a.network_monitor)
        {
            let command = ActivationCommand::force(ToolKind::NetworkMonitor, true).silent();
            self.send_to_tab(tab_id, &command, state);

            let delayed = command.clone();
            myself.send_after(state.retry_delay, move || CoordinatorMsg::ResendActivation {
                tab_id,
                command: delayed,
            });
            tracing::debug!(
                tab_id = %tab_id,
                url = %url,
                "Network monitor re-activated after navigation"
            );
        }

        if let Some(command) = global_tool_restore(&state.settings) {
            self.send_to_tab(tab_id, &command, state);
        }
    }

    /// Cast to every frame of the tab, returning how many sends succeeded.
    fn send_to_tab(
        &self,
        tab_id: TabId,
        command: &ActivationCommand,
        state: &CoordinatorState,
    ) -> usize {
        state
            .tabs
            .frames(tab_id)
            .into_iter()
            .filter(|agent| agent.cast(FrameAgentMsg::Activate(command.clone())).is_ok())
            .count()
    }

    fn kill_all(&self, state: &mut CoordinatorState) {
        state.activations.clear();
        let command = ActivationCommand::force(ToolKind::NetworkMonitor, false);
        let tabs = state.tabs.tab_ids();
        let mut delivered = 0;
        for tab_id in &tabs {
            delivered += self.send_to_tab(*tab_id, &command, state);
        }
        tracing::info!(tabs = tabs.len(), delivered, "Kill-all broadcast");
    }

    fn clear_browsing_data(
        &self,
        request: ClearDataRequest,
        since: i64,
        reply: RpcReplyPort<Result<ClearDataResponse, CoordinatorError>>,
        state: &CoordinatorState,
    ) {
        let set = RemovalSet::from_request(&request);
        let platform = Arc::clone(&state.platform);
        tracing::info!(categories = ?set.categories(), since, "Clearing browsing data");

        tokio::spawn(async move {
            let result = platform
                .remove(&set, since)
                .await
                .map(|()| ClearDataResponse::success())
                .map_err(|e| {
                    tracing::warn!(error = %e, "Browsing data removal failed");
                    CoordinatorError::from(e)
                });
            let _ = reply.send(result);
        });
    }
}

/// Forced activation restoring the stored global exclusive tool, if any.
fn global_tool_restore(settings: &PersistedSettings) -> Option<ActivationCommand> {
    if !settings.persistent_mode {
        return None;
    }
    let tool = settings.active_tool.filter(ToolKind::is_exclusive)?;
    Some(ActivationCommand::force(tool, true).with_args(settings.active_tool_args.clone()))
}

// ============================================================================
// Convenience Functions
// ============================================================================

pub async fn dispatch_command(
    coordinator: &ActorRef<CoordinatorMsg>,
    tab_id: TabId,
    command: ActivationCommand,
) -> Result<Result<usize, CoordinatorError>, ractor::RactorErr<CoordinatorMsg>> {
    ractor::call!(coordinator, |reply| CoordinatorMsg::DispatchCommand {
        tab_id,
        command,
        reply
    })
}

pub async fn get_activation(
    coordinator: &ActorRef<CoordinatorMsg>,
    tab_id: TabId,
) -> Result<Option<ToolActivation>, ractor::RactorErr<CoordinatorMsg>> {
    ractor::call!(coordinator, |reply| CoordinatorMsg::GetActivation {
        tab_id,
        reply
    })
}

pub async fn get_settings(
    coordinator: &ActorRef<CoordinatorMsg>,
) -> Result<PersistedSettings, ractor::RactorErr<CoordinatorMsg>> {
    ractor::call!(coordinator, |reply| CoordinatorMsg::GetSettings { reply })
}

pub async fn set_persistent_mode(
    coordinator: &ActorRef<CoordinatorMsg>,
    enabled: bool,
) -> Result<Result<PersistedSettings, CoordinatorError>, ractor::RactorErr<CoordinatorMsg>> {
    ractor::call!(coordinator, |reply| CoordinatorMsg::SetPersistentMode {
        enabled,
        reply
    })
}

pub async fn clear_browsing_data(
    coordinator: &ActorRef<CoordinatorMsg>,
    request: ClearDataRequest,
    since: i64,
) -> Result<Result<ClearDataResponse, CoordinatorError>, ractor::RactorErr<CoordinatorMsg>> {
    ractor::call!(coordinator, |reply| CoordinatorMsg::ClearBrowsingData {
        request,
        since,
        reply
    })
}
