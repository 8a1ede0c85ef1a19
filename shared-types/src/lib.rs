//! Shared types between frame agents, the coordinator and display clients
//!
//! These types cross every context boundary in DevTrace:
//! - page interceptor → frame agent (window messages)
//! - frame agent ⇄ coordinator (commands, state reports, relay envelopes)
//! - coordinator/API → display layer (JSON over HTTP)
//!
//! Serializable with serde; TypeScript bindings are exported with ts-rs.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Fixed marker carried by every interceptor window message. Listeners ignore
/// window traffic that does not carry it.
pub const TRACE_SOURCE_MARKER: &str = "devtrace-network-monitor";

/// Response sentinel for a call that failed at the network level.
pub const SENTINEL_NETWORK_ERROR: &str = "network-error";

/// Response sentinel for a call that was aborted before completion.
pub const SENTINEL_ABORTED: &str = "aborted";

// ============================================================================
// Identifiers
// ============================================================================

/// Browser tab identifier
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, TS,
)]
#[ts(export, export_to = "generated.ts")]
pub struct TabId(pub u32);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Frame index within a tab. Index 0 is always the tab's top-level frame.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, TS,
)]
#[ts(export, export_to = "generated.ts")]
pub struct FrameId(pub u32);

impl FrameId {
    pub const HOST: FrameId = FrameId(0);

    pub fn is_host(&self) -> bool {
        *self == Self::HOST
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Trace Records
// ============================================================================

/// Which page primitive issued the call
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, TS)]
#[ts(export, export_to = "generated.ts")]
pub enum TraceKind {
    #[serde(rename = "XHR")]
    Xhr,
    Fetch,
}

impl fmt::Display for TraceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceKind::Xhr => write!(f, "XHR"),
            TraceKind::Fetch => write!(f, "Fetch"),
        }
    }
}

/// One request header, kept in the order the page set it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "generated.ts")]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One captured network call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "generated.ts")]
pub struct TraceRecord {
    /// Unique record identifier (ULID)
    pub id: String,
    pub kind: TraceKind,
    /// Uppercased HTTP method
    pub method: String,
    /// URL as the page issued it; may be relative
    pub url: String,
    /// Observed status, 0 when the call failed at the transport level
    pub status: u16,
    pub request_headers: Vec<Header>,
    #[ts(type = "unknown")]
    pub payload: Option<serde_json::Value>,
    #[ts(type = "unknown")]
    pub response: Option<serde_json::Value>,
    /// Epoch milliseconds captured before transmission
    #[ts(type = "number")]
    pub started_at: i64,
    #[ts(type = "number")]
    pub duration_ms: u64,
    pub origin_frame_id: FrameId,
}

impl TraceRecord {
    pub fn failed(&self) -> bool {
        self.status == 0
    }
}

/// Window message body posted by the interceptor for every completed call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "generated.ts")]
pub struct TraceEvent {
    /// Always [`TRACE_SOURCE_MARKER`] for interceptor traffic
    pub source: String,
    pub kind: TraceKind,
    pub method: String,
    pub url: String,
    pub status: u16,
    #[ts(type = "unknown")]
    pub payload: Option<serde_json::Value>,
    #[ts(type = "unknown")]
    pub response: Option<serde_json::Value>,
    #[ts(type = "number")]
    pub duration_ms: u64,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[ts(type = "number")]
    pub started_at: i64,
}

impl TraceEvent {
    /// Check the source marker of a raw window message without parsing the rest.
    pub fn is_tagged(data: &serde_json::Value) -> bool {
        data.get("source").and_then(|v| v.as_str()) == Some(TRACE_SOURCE_MARKER)
    }

    /// Parse a raw window message. Untagged or malformed data yields `None`.
    pub fn from_window_data(data: &serde_json::Value) -> Option<Self> {
        if !Self::is_tagged(data) {
            return None;
        }
        serde_json::from_value(data.clone()).ok()
    }

    /// Turn the event into a record owned by the frame that received it.
    pub fn into_record(self, origin_frame_id: FrameId) -> TraceRecord {
        TraceRecord {
            id: ulid::Ulid::new().to_string(),
            kind: self.kind,
            method: self.method.to_ascii_uppercase(),
            url: self.url,
            status: self.status,
            request_headers: self.headers,
            payload: self.payload,
            response: self.response,
            started_at: self.started_at,
            duration_ms: self.duration_ms,
            origin_frame_id,
        }
    }
}

/// Worker → coordinator → host frame wrapper for a trace record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "generated.ts")]
pub struct RelayEnvelope {
    pub tab_id: TabId,
    pub origin_frame_id: FrameId,
    pub record: TraceRecord,
}

// ============================================================================
// Tool Activation
// ============================================================================

/// Diagnostic capabilities a frame can switch on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "generated.ts")]
pub enum ToolKind {
    NetworkMonitor,
    ElementInspector,
    ColorPicker,
    FontHighlighter,
}

impl ToolKind {
    pub const ALL: [ToolKind; 4] = [
        ToolKind::NetworkMonitor,
        ToolKind::ElementInspector,
        ToolKind::ColorPicker,
        ToolKind::FontHighlighter,
    ];

    /// DOM-affecting tools share a single slot per frame; the network monitor
    /// does not take part in that exclusion.
    pub fn is_exclusive(&self) -> bool {
        !matches!(self, ToolKind::NetworkMonitor)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::NetworkMonitor => "networkMonitor",
            ToolKind::ElementInspector => "elementInspector",
            ToolKind::ColorPicker => "colorPicker",
            ToolKind::FontHighlighter => "fontHighlighter",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolKind::ALL
            .into_iter()
            .find(|tool| tool.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown tool '{s}'"))
    }
}

/// Extra arguments a tool may carry (only the font highlighter uses them)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "generated.ts")]
pub struct ToolArgs {
    pub font_size: Option<String>,
}

/// Command telling a frame to change a tool's state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "generated.ts")]
pub struct ActivationCommand {
    pub tool: ToolKind,
    /// `Some(state)` forces the state, `None` toggles it
    #[serde(default)]
    pub forced_state: Option<bool>,
    /// Suppress user-facing notifications for this change
    #[serde(default)]
    pub silent: bool,
    #[serde(default)]
    pub args: Option<ToolArgs>,
}

impl ActivationCommand {
    pub fn toggle(tool: ToolKind) -> Self {
        Self {
            tool,
            forced_state: None,
            silent: false,
            args: None,
        }
    }

    pub fn force(tool: ToolKind, state: bool) -> Self {
        Self {
            forced_state: Some(state),
            ..Self::toggle(tool)
        }
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn with_args(mut self, args: Option<ToolArgs>) -> Self {
        self.args = args;
        self
    }
}

/// Frame → coordinator report of a tool's resulting state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "generated.ts")]
pub struct StateReport {
    pub tool: ToolKind,
    pub active: bool,
    #[serde(default)]
    pub args: Option<ToolArgs>,
}

/// Authoritative per-tab activation record held by the coordinator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "generated.ts")]
pub struct ToolActivation {
    pub tab_id: TabId,
    pub network_monitor: bool,
    /// The single active DOM-affecting tool, if any
    pub exclusive_tool: Option<ToolKind>,
    pub args: Option<ToolArgs>,
    pub updated_at: DateTime<Utc>,
}

impl ToolActivation {
    pub fn new(tab_id: TabId) -> Self {
        Self {
            tab_id,
            network_monitor: false,
            exclusive_tool: None,
            args: None,
            updated_at: Utc::now(),
        }
    }

    pub fn is_active(&self, tool: ToolKind) -> bool {
        match tool {
            ToolKind::NetworkMonitor => self.network_monitor,
            other => self.exclusive_tool == Some(other),
        }
    }
}

/// Durable global settings (key/value layout)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "generated.ts")]
pub struct PersistedSettings {
    pub persistent_mode: bool,
    pub active_tool: Option<ToolKind>,
    pub active_tool_args: Option<ToolArgs>,
}

// ============================================================================
// Browsing Data
// ============================================================================

/// User-facing toggles for clearing browsing data.
///
/// Omitted toggles follow the popup's defaults: cache, cookies and local
/// storage are cleared unless explicitly disabled; history only on request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "generated.ts")]
pub struct ClearDataRequest {
    #[serde(default = "default_enabled")]
    pub cache: bool,
    #[serde(default = "default_enabled")]
    pub cookies: bool,
    #[serde(default = "default_enabled")]
    pub local_storage: bool,
    #[serde(default)]
    pub history: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for ClearDataRequest {
    fn default() -> Self {
        Self {
            cache: true,
            cookies: true,
            local_storage: true,
            history: false,
        }
    }
}

impl ClearDataRequest {
    /// Nothing selected; set the wanted toggles on top of this.
    pub fn none() -> Self {
        Self {
            cache: false,
            cookies: false,
            local_storage: false,
            history: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "generated.ts")]
pub struct ClearDataResponse {
    pub status: String,
}

impl ClearDataResponse {
    pub fn success() -> Self {
        Self {
            status: "success".to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
