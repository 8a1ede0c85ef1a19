//! TabRegistry - the coordinator's view of open tabs and their frames.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use ractor::{ActorId, ActorRef};
use serde::Serialize;
use shared_types::{FrameId, TabId};

use crate::actors::frame_agent::FrameAgentMsg;

/// Which browser signal reported the navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NavigationPhase {
    Started,
    Completed,
    UrlChanged,
}

#[derive(Debug, Clone)]
struct NavigationMark {
    url: String,
    at: Instant,
}

#[derive(Debug, Default)]
struct TabEntry {
    frames: BTreeMap<FrameId, ActorRef<FrameAgentMsg>>,
    navigation: Option<NavigationMark>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabSummary {
    pub tab_id: TabId,
    pub frames: Vec<FrameId>,
    pub url: Option<String>,
}

#[derive(Debug, Default)]
pub struct TabRegistry {
    tabs: HashMap<TabId, TabEntry>,
}

impl TabRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `agent` as the frame's agent, replacing any previous one.
    pub fn attach(&mut self, tab_id: TabId, frame_id: FrameId, agent: ActorRef<FrameAgentMsg>) {
        self.tabs
            .entry(tab_id)
            .or_default()
            .frames
            .insert(frame_id, agent);
    }

    /// Remove the frame only if `actor_id` is still its registered agent.
    pub fn detach(&mut self, tab_id: TabId, frame_id: FrameId, actor_id: ActorId) -> bool {
        let Some(entry) = self.tabs.get_mut(&tab_id) else {
            return false;
        };
        let current = entry.frames.get(&frame_id).map(|agent| agent.get_id());
        if current != Some(actor_id) {
            return false;
        }
        entry.frames.remove(&frame_id);
        if entry.frames.is_empty() {
            self.tabs.remove(&tab_id);
        }
        true
    }

    pub fn close(&mut self, tab_id: TabId) -> bool {
        self.tabs.remove(&tab_id).is_some()
    }

    pub fn host(&self, tab_id: TabId) -> Option<&ActorRef<FrameAgentMsg>> {
        self.tabs.get(&tab_id)?.frames.get(&FrameId::HOST)
    }

    pub fn frames(&self, tab_id: TabId) -> Vec<ActorRef<FrameAgentMsg>> {
        self.tabs
            .get(&tab_id)
            .map(|entry| entry.frames.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn tab_ids(&self) -> Vec<TabId> {
        let mut ids: Vec<_> = self.tabs.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn summaries(&self) -> Vec<TabSummary> {
        self.tab_ids()
            .into_iter()
            .filter_map(|tab_id| {
                let entry = self.tabs.get(&tab_id)?;
                Some(TabSummary {
                    tab_id,
                    frames: entry.frames.keys().copied().collect(),
                    url: entry.navigation.as_ref().map(|n| n.url.clone()),
                })
            })
            .collect()
    }

    /// Record a navigation signal. Returns `false` when the signal belongs to
    /// a transition that was already handled.
    ///
    /// - `Started` opens a transition unless the same URL started within `window`
    /// - `Completed` closes the open transition for the same URL
    /// - `UrlChanged` opens a transition only when the URL differs
    ///
    /// Tabs without attached frames are not tracked and always return `false`.
    pub fn begin_transition(
        &mut self,
        tab_id: TabId,
        url: &str,
        phase: NavigationPhase,
        window: Duration,
    ) -> bool {
        let now = Instant::now();
        let Some(entry) = self.tabs.get_mut(&tab_id) else {
            return false;
        };

        let is_new = match (&entry.navigation, phase) {
            (None, _) => true,
            (Some(mark), NavigationPhase::Started) => {
                mark.url != url || now.duration_since(mark.at) > window
            }
            (Some(mark), NavigationPhase::Completed | NavigationPhase::UrlChanged) => {
                mark.url != url
            }
        };

        if is_new {
            entry.navigation = Some(NavigationMark {
                url: url.to_string(),
                at: now,
            });
        }
        is_new
    }
}
