//! Coordinator integration tests
//!
//! Frame agents are replaced by probe actors that forward everything the
//! coordinator sends them into an mpsc channel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use shared_types::{
    ActivationCommand, ClearDataRequest, FrameId, Header, RelayEnvelope, StateReport, TabId,
    ToolArgs, ToolKind, TraceKind, TraceRecord,
};
use tokio::sync::{mpsc, Mutex};

use devtrace::actors::coordinator::{
    self, CoordinatorActor, CoordinatorArguments, CoordinatorError, CoordinatorMsg,
};
use devtrace::actors::frame_agent::FrameAgentMsg;
use devtrace::actors::tabs::NavigationPhase;
use devtrace::browsing_data::{BrowsingDataPlatform, DataCategory, PlatformError, RemovalSet};
use devtrace::settings_store::SettingsStore;

// ============================================================================
// Probe frame agent
// ============================================================================

#[derive(Debug)]
enum Probed {
    Command(ActivationCommand),
    Relay(RelayEnvelope),
}

#[derive(Debug, Default)]
struct ProbeAgent;

#[async_trait]
impl Actor for ProbeAgent {
    type Msg = FrameAgentMsg;
    type State = mpsc::UnboundedSender<Probed>;
    type Arguments = mpsc::UnboundedSender<Probed>;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        Ok(args)
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            FrameAgentMsg::Activate(command) => {
                let _ = state.send(Probed::Command(command));
            }
            FrameAgentMsg::RelayedTrace(envelope) => {
                let _ = state.send(Probed::Relay(envelope));
            }
            _ => {}
        }
        Ok(())
    }
}

// ============================================================================
// Platforms
// ============================================================================

#[derive(Default)]
struct RecordingPlatform {
    calls: Mutex<Vec<(Vec<DataCategory>, i64)>>,
}

#[async_trait]
impl BrowsingDataPlatform for RecordingPlatform {
    async fn remove(&self, set: &RemovalSet, since: i64) -> Result<(), PlatformError> {
        self.calls
            .lock()
            .await
            .push((set.categories().to_vec(), since));
        Ok(())
    }
}

struct FailingPlatform;

#[async_trait]
impl BrowsingDataPlatform for FailingPlatform {
    async fn remove(&self, _set: &RemovalSet, _since: i64) -> Result<(), PlatformError> {
        Err(PlatformError::Rejected("profile locked".to_string()))
    }
}

// ============================================================================
// Helpers
// ============================================================================

async fn spawn_coordinator(
    settings: SettingsStore,
    platform: Arc<dyn BrowsingDataPlatform>,
) -> ActorRef<CoordinatorMsg> {
    let (coordinator, _handle) = Actor::spawn(
        None,
        CoordinatorActor,
        CoordinatorArguments {
            settings,
            platform,
            reactivation_retry_delay: Duration::from_millis(1000),
        },
    )
    .await
    .expect("failed to spawn coordinator");
    coordinator
}

async fn coordinator_with_store() -> (ActorRef<CoordinatorMsg>, SettingsStore) {
    let store = SettingsStore::in_memory().expect("settings store");
    let coordinator =
        spawn_coordinator(store.clone(), Arc::new(RecordingPlatform::default())).await;
    (coordinator, store)
}

async fn attach_probe(
    coordinator: &ActorRef<CoordinatorMsg>,
    tab_id: TabId,
    frame_id: FrameId,
) -> (ActorRef<FrameAgentMsg>, mpsc::UnboundedReceiver<Probed>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (agent, _handle) = Actor::spawn(None, ProbeAgent, tx)
        .await
        .expect("failed to spawn probe");
    ractor::call!(coordinator, |reply| CoordinatorMsg::AttachFrame {
        tab_id,
        frame_id,
        agent: agent.clone(),
        reply,
    })
    .expect("attach failed");
    (agent, rx)
}

fn report(coordinator: &ActorRef<CoordinatorMsg>, tab_id: TabId, tool: ToolKind, active: bool) {
    coordinator
        .cast(CoordinatorMsg::StateReport {
            tab_id,
            report: StateReport {
                tool,
                active,
                args: None,
            },
        })
        .expect("report failed");
}

fn navigate(
    coordinator: &ActorRef<CoordinatorMsg>,
    tab_id: TabId,
    url: &str,
    phase: NavigationPhase,
) {
    coordinator
        .cast(CoordinatorMsg::NavigationObserved {
            tab_id,
            url: url.to_string(),
            phase,
        })
        .expect("navigation cast failed");
}

/// Drain every command received within `window`.
async fn commands_within(
    rx: &mut mpsc::UnboundedReceiver<Probed>,
    window: Duration,
) -> Vec<ActivationCommand> {
    let deadline = tokio::time::Instant::now() + window;
    let mut commands = Vec::new();
    while let Ok(Some(probed)) = tokio::time::timeout_at(deadline, rx.recv()).await {
        if let Probed::Command(command) = probed {
            commands.push(command);
        }
    }
    commands
}

async fn enable_persistent_mode(coordinator: &ActorRef<CoordinatorMsg>) {
    coordinator::set_persistent_mode(coordinator, true)
        .await
        .expect("rpc failed")
        .expect("settings write failed");
}

fn sample_record(origin: FrameId) -> TraceRecord {
    TraceRecord {
        id: ulid::Ulid::new().to_string(),
        kind: TraceKind::Xhr,
        method: "GET".to_string(),
        url: "/widget/data".to_string(),
        status: 200,
        request_headers: vec![Header::new("Accept", "*/*")],
        payload: None,
        response: None,
        started_at: 1_700_000_000_000,
        duration_ms: 7,
        origin_frame_id: origin,
    }
}

// ============================================================================
// Navigation persistence
// ============================================================================

#[tokio::test]
async fn test_persistent_navigation_sends_one_to_two_commands_within_window() {
    let (coordinator, _store) = coordinator_with_store().await;
    enable_persistent_mode(&coordinator).await;

    let tab = TabId(1);
    let (_agent, mut rx) = attach_probe(&coordinator, tab, FrameId::HOST).await;
    report(&coordinator, tab, ToolKind::NetworkMonitor, true);

    let url = "https://app.example.com/orders";
    navigate(&coordinator, tab, url, NavigationPhase::Started);
    navigate(&coordinator, tab, url, NavigationPhase::Completed);
    navigate(&coordinator, tab, url, NavigationPhase::UrlChanged);

    let early = commands_within(&mut rx, Duration::from_millis(1100)).await;
    assert!(
        (1..=2).contains(&early.len()),
        "expected 1-2 commands within 1.1s, got {}",
        early.len()
    );

    let late = commands_within(&mut rx, Duration::from_millis(600)).await;
    let all: Vec<_> = early.into_iter().chain(late).collect();
    assert_eq!(all.len(), 2, "start/complete/url-change is one transition");

    let expected = ActivationCommand::force(ToolKind::NetworkMonitor, true).silent();
    assert!(all.iter().all(|c| *c == expected));
}

#[tokio::test]
async fn test_privileged_url_never_reactivates() {
    let (coordinator, _store) = coordinator_with_store().await;
    enable_persistent_mode(&coordinator).await;

    let tab = TabId(2);
    let (_agent, mut rx) = attach_probe(&coordinator, tab, FrameId::HOST).await;
    report(&coordinator, tab, ToolKind::NetworkMonitor, true);

    navigate(&coordinator, tab, "chrome://settings", NavigationPhase::Completed);
    navigate(&coordinator, tab, "about:blank", NavigationPhase::Started);

    assert!(commands_within(&mut rx, Duration::from_millis(1300)).await.is_empty());
}

#[tokio::test]
async fn test_navigation_without_persistent_mode_sends_nothing() {
    let (coordinator, _store) = coordinator_with_store().await;

    let tab = TabId(3);
    let (_agent, mut rx) = attach_probe(&coordinator, tab, FrameId::HOST).await;
    report(&coordinator, tab, ToolKind::NetworkMonitor, true);
    navigate(&coordinator, tab, "https://app.example.com/", NavigationPhase::Completed);

    assert!(commands_within(&mut rx, Duration::from_millis(1300)).await.is_empty());
}

#[tokio::test]
async fn test_navigation_restores_global_exclusive_tool_with_args() {
    let (coordinator, _store) = coordinator_with_store().await;
    enable_persistent_mode(&coordinator).await;

    let tab = TabId(4);
    let (_agent, mut rx) = attach_probe(&coordinator, tab, FrameId::HOST).await;
    let args = ToolArgs {
        font_size: Some("14px".to_string()),
    };
    coordinator
        .cast(CoordinatorMsg::StateReport {
            tab_id: tab,
            report: StateReport {
                tool: ToolKind::FontHighlighter,
                active: true,
                args: Some(args.clone()),
            },
        })
        .unwrap();

    navigate(&coordinator, tab, "https://docs.example.com/", NavigationPhase::Completed);

    let commands = commands_within(&mut rx, Duration::from_millis(300)).await;
    assert_eq!(
        commands,
        vec![ActivationCommand::force(ToolKind::FontHighlighter, true).with_args(Some(args))]
    );
}

// ============================================================================
// Activation map
// ============================================================================

#[tokio::test]
async fn test_state_reports_update_map_and_persist_global_tool() {
    let (coordinator, store) = coordinator_with_store().await;
    let tab = TabId(5);

    report(&coordinator, tab, ToolKind::NetworkMonitor, true);
    report(&coordinator, tab, ToolKind::ColorPicker, true);

    let activation = coordinator::get_activation(&coordinator, tab)
        .await
        .unwrap()
        .expect("activation recorded");
    assert!(activation.network_monitor);
    assert_eq!(activation.exclusive_tool, Some(ToolKind::ColorPicker));

    let persisted = store.load().await.unwrap();
    assert_eq!(persisted.active_tool, Some(ToolKind::ColorPicker));

    report(&coordinator, tab, ToolKind::NetworkMonitor, false);
    assert!(coordinator::get_activation(&coordinator, tab)
        .await
        .unwrap()
        .is_none());

    let settings = coordinator::get_settings(&coordinator).await.unwrap();
    assert_eq!(settings.active_tool, None);
    assert_eq!(store.load().await.unwrap().active_tool, None);
}

#[tokio::test]
async fn test_kill_all_clears_map_and_survives_dead_tab() {
    let (coordinator, _store) = coordinator_with_store().await;

    let (dead, _dead_rx) = attach_probe(&coordinator, TabId(10), FrameId::HOST).await;
    let (_live, mut live_rx) = attach_probe(&coordinator, TabId(11), FrameId::HOST).await;
    report(&coordinator, TabId(10), ToolKind::NetworkMonitor, true);
    report(&coordinator, TabId(11), ToolKind::NetworkMonitor, true);

    dead.stop(None);
    tokio::time::sleep(Duration::from_millis(50)).await;

    coordinator.cast(CoordinatorMsg::KillAll).unwrap();

    let commands = commands_within(&mut live_rx, Duration::from_millis(300)).await;
    assert_eq!(
        commands,
        vec![ActivationCommand::force(ToolKind::NetworkMonitor, false)]
    );
    for tab in [TabId(10), TabId(11)] {
        assert!(coordinator::get_activation(&coordinator, tab)
            .await
            .unwrap()
            .is_none());
    }
}

#[tokio::test]
async fn test_dispatch_reaches_every_frame_of_tab() {
    let (coordinator, _store) = coordinator_with_store().await;
    let tab = TabId(12);
    let (_host, mut host_rx) = attach_probe(&coordinator, tab, FrameId::HOST).await;
    let (_worker, mut worker_rx) = attach_probe(&coordinator, tab, FrameId(3)).await;

    let command = ActivationCommand::toggle(ToolKind::NetworkMonitor);
    let delivered = coordinator::dispatch_command(&coordinator, tab, command.clone())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivered, 2);

    for rx in [&mut host_rx, &mut worker_rx] {
        assert_eq!(
            commands_within(rx, Duration::from_millis(200)).await,
            vec![command.clone()]
        );
    }

    let missing = coordinator::dispatch_command(&coordinator, TabId(99), command)
        .await
        .unwrap();
    assert!(matches!(missing, Err(CoordinatorError::UnknownTab(TabId(99)))));
}

// ============================================================================
// Relay
// ============================================================================

#[tokio::test]
async fn test_relay_goes_to_host_frame_only() {
    let (coordinator, _store) = coordinator_with_store().await;
    let tab = TabId(20);
    let (_host, mut host_rx) = attach_probe(&coordinator, tab, FrameId::HOST).await;
    let (_worker, mut worker_rx) = attach_probe(&coordinator, tab, FrameId(1)).await;

    let envelope = RelayEnvelope {
        tab_id: tab,
        origin_frame_id: FrameId(1),
        record: sample_record(FrameId(1)),
    };
    coordinator
        .cast(CoordinatorMsg::RelayTrace(envelope.clone()))
        .unwrap();

    match tokio::time::timeout(Duration::from_millis(500), host_rx.recv()).await {
        Ok(Some(Probed::Relay(received))) => assert_eq!(received, envelope),
        other => panic!("host did not receive relay: {other:?}"),
    }
    assert!(
        tokio::time::timeout(Duration::from_millis(200), worker_rx.recv())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_stale_detach_keeps_replacement_agent() {
    let (coordinator, _store) = coordinator_with_store().await;
    let tab = TabId(21);
    let (old, _old_rx) = attach_probe(&coordinator, tab, FrameId::HOST).await;
    let (_new, mut new_rx) = attach_probe(&coordinator, tab, FrameId::HOST).await;

    coordinator
        .cast(CoordinatorMsg::FrameDetached {
            tab_id: tab,
            frame_id: FrameId::HOST,
            actor_id: old.get_id(),
        })
        .unwrap();

    coordinator
        .cast(CoordinatorMsg::RelayTrace(RelayEnvelope {
            tab_id: tab,
            origin_frame_id: FrameId(2),
            record: sample_record(FrameId(2)),
        }))
        .unwrap();

    let received = tokio::time::timeout(Duration::from_millis(500), new_rx.recv()).await;
    assert!(matches!(received, Ok(Some(Probed::Relay(_)))));
}

// ============================================================================
// Browsing data
// ============================================================================

#[tokio::test]
async fn test_clear_browsing_data_cache_only() {
    let platform = Arc::new(RecordingPlatform::default());
    let coordinator =
        spawn_coordinator(SettingsStore::in_memory().unwrap(), platform.clone()).await;

    let response = coordinator::clear_browsing_data(
        &coordinator,
        ClearDataRequest {
            cache: true,
            ..ClearDataRequest::none()
        },
        0,
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(response.status, "success");

    let calls = platform.calls.lock().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0],
        (
            vec![
                DataCategory::Cache,
                DataCategory::AppCache,
                DataCategory::CacheStorage,
                DataCategory::ServiceWorkers,
            ],
            0
        )
    );
}

#[tokio::test]
async fn test_clear_browsing_data_failure_reaches_caller() {
    let coordinator =
        spawn_coordinator(SettingsStore::in_memory().unwrap(), Arc::new(FailingPlatform)).await;

    let result = coordinator::clear_browsing_data(
        &coordinator,
        ClearDataRequest {
            cookies: true,
            ..ClearDataRequest::none()
        },
        0,
    )
    .await
    .unwrap();
    assert!(matches!(result, Err(CoordinatorError::Platform(_))));
}

#[tokio::test]
async fn test_navigation_in_unknown_tab_is_not_registered() {
    let (coordinator, _store) = coordinator_with_store().await;
    enable_persistent_mode(&coordinator).await;

    navigate(&coordinator, TabId(42), "https://app.example.com/", NavigationPhase::Started);

    let tabs = ractor::call!(coordinator, |reply| CoordinatorMsg::ListTabs { reply }).unwrap();
    assert!(tabs.is_empty());
}
