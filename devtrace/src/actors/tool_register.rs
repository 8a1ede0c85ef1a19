//! ToolRegister - per-frame tool state.
//!
//! DOM-affecting tools share one exclusive slot; the network monitor flag
//! sits beside it and is never touched by exclusive transitions.

use shared_types::{ToolArgs, ToolKind};

/// Outcome of applying one activation to the register
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub tool: ToolKind,
    pub was_active: bool,
    pub now_active: bool,
    /// Exclusive tool that was switched off to make room
    pub displaced: Option<ToolKind>,
    /// Tool stays on but restarts with new args
    pub reattach: bool,
}

impl Transition {
    /// Whether listeners have to be attached or detached
    pub fn changed(&self) -> bool {
        self.was_active != self.now_active || self.reattach || self.displaced.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolRegister {
    exclusive: Option<(ToolKind, Option<ToolArgs>)>,
    network_monitor: bool,
}

impl ToolRegister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self, tool: ToolKind) -> bool {
        match tool {
            ToolKind::NetworkMonitor => self.network_monitor,
            other => self.exclusive_tool() == Some(other),
        }
    }

    pub fn exclusive_tool(&self) -> Option<ToolKind> {
        self.exclusive.as_ref().map(|(tool, _)| *tool)
    }

    pub fn args(&self, tool: ToolKind) -> Option<&ToolArgs> {
        match &self.exclusive {
            Some((active, args)) if *active == tool => args.as_ref(),
            _ => None,
        }
    }

    /// Force `tool` on/off, or toggle it when `forced` is `None`.
    pub fn apply(
        &mut self,
        tool: ToolKind,
        forced: Option<bool>,
        args: Option<ToolArgs>,
    ) -> Transition {
        let was_active = self.is_active(tool);
        let now_active = forced.unwrap_or(!was_active);
        let mut transition = Transition {
            tool,
            was_active,
            now_active,
            displaced: None,
            reattach: false,
        };

        if tool == ToolKind::NetworkMonitor {
            self.network_monitor = now_active;
            return transition;
        }

        match (was_active, now_active) {
            (false, true) => {
                transition.displaced = self.exclusive_tool();
                self.exclusive = Some((tool, args));
            }
            (true, false) => {
                self.exclusive = None;
            }
            (true, true) => {
                if args.is_some() && self.args(tool) != args.as_ref() {
                    transition.reattach = true;
                    self.exclusive = Some((tool, args));
                }
            }
            (false, false) => {}
        }

        transition
    }

    /// Switch everything off, returning the tools that were active.
    pub fn clear(&mut self) -> Vec<ToolKind> {
        let mut off = Vec::new();
        if self.network_monitor {
            off.push(ToolKind::NetworkMonitor);
        }
        if let Some((tool, _)) = self.exclusive.take() {
            off.push(tool);
        }
        self.network_monitor = false;
        off
    }
}

/// DOM-side behaviour of the exclusive tools. The frame agent calls these
/// on every state change; rendering lives behind this trait.
pub trait ToolHooks: Send + Sync {
    fn attach(&self, tool: ToolKind, args: Option<&ToolArgs>);
    fn detach(&self, tool: ToolKind);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopToolHooks;

impl ToolHooks for NoopToolHooks {
    fn attach(&self, tool: ToolKind, _args: Option<&ToolArgs>) {
        tracing::trace!(%tool, "attach");
    }

    fn detach(&self, tool: ToolKind) {
        tracing::trace!(%tool, "detach");
    }
}
