//! TraceLog - bounded, queryable store of one tab's captured calls.
//!
//! Owned by the tab's trace aggregator actor; nothing else writes to it.
//! Records are filtered on the way in (denylist, image resources), annotated
//! with a repeat counter keyed by [`DedupKey`], and kept most-recent-last up
//! to a fixed capacity. Queries walk the store lazily, most-recent-first.

use std::collections::{HashMap, VecDeque};

use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use shared_types::{TraceKind, TraceRecord};
use url::Url;

/// Path suffixes treated as image resources
pub const IMAGE_EXTENSIONS: [&str; 9] = [
    ".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp", ".ico", ".tiff", ".bmp",
];

// ============================================================================
// Filters
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterReason {
    Denylisted,
    ImageResource,
}

/// Capture filters shared by frame agents and aggregators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFilters {
    /// Lowercased substrings; a URL containing any of them is dropped
    pub denylist: Vec<String>,
    pub image_extensions: Vec<String>,
}

impl TraceFilters {
    pub fn with_denylist(denylist: Vec<String>) -> Self {
        Self {
            denylist: denylist
                .into_iter()
                .map(|entry| entry.to_ascii_lowercase())
                .filter(|entry| !entry.is_empty())
                .collect(),
            image_extensions: IMAGE_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn is_denied(&self, url: &str) -> bool {
        let lower = url.to_ascii_lowercase();
        self.denylist.iter().any(|entry| lower.contains(entry.as_str()))
    }

    /// Image check runs on the path only: query string and fragment are cut first.
    pub fn is_image(&self, url: &str) -> bool {
        let lower = url.to_ascii_lowercase();
        let path = lower
            .split(['?', '#'])
            .next()
            .unwrap_or(lower.as_str());
        self.image_extensions
            .iter()
            .any(|ext| path.ends_with(ext.as_str()))
    }

    pub fn reject_reason(&self, url: &str) -> Option<FilterReason> {
        if self.is_denied(url) {
            Some(FilterReason::Denylisted)
        } else if self.is_image(url) {
            Some(FilterReason::ImageResource)
        } else {
            None
        }
    }
}

impl Default for TraceFilters {
    fn default() -> Self {
        Self::with_denylist(vec!["pvg".to_string()])
    }
}

// ============================================================================
// Stored traces
// ============================================================================

/// Key used to spot repeated identical calls within one display second
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub display_second: i64,
    pub method: String,
    pub url: String,
}

impl DedupKey {
    pub fn for_record(record: &TraceRecord) -> Self {
        Self {
            display_second: record.started_at.div_euclid(1000),
            method: record.method.clone(),
            url: record.url.clone(),
        }
    }
}

/// A record as the display layer sees it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredTrace {
    pub record: TraceRecord,
    /// The record's URL resolved against the page location
    pub absolute_url: String,
    /// Local wall-clock time of the call, `HH:MM:SS`
    pub display_time: String,
    /// Occurrences of this record's dedup key so far, including this one
    pub repeat_count: u32,
    pub duplicate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored { duplicate: bool, repeat_count: u32 },
    Dropped(FilterReason),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceLogStats {
    pub stored: usize,
    pub ingested: u64,
    pub dropped: u64,
    pub duplicates: u64,
    pub evicted: u64,
}

/// Resolve a possibly relative URL against the page location. Unresolvable
/// input comes back unchanged.
pub fn resolve_url(base: Option<&Url>, raw: &str) -> String {
    if let Ok(absolute) = Url::parse(raw) {
        return absolute.to_string();
    }
    base.and_then(|base| base.join(raw).ok())
        .map(|url| url.to_string())
        .unwrap_or_else(|| raw.to_string())
}

pub fn display_time(epoch_ms: i64) -> String {
    match Local.timestamp_millis_opt(epoch_ms).single() {
        Some(time) => time.format("%H:%M:%S").to_string(),
        None => "--:--:--".to_string(),
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Display-layer filter over stored traces
#[derive(Debug, Clone, Default)]
pub struct TraceQuery {
    /// Case-insensitive substring matched across every field
    pub text: Option<String>,
    pub method: Option<String>,
    pub status: Option<u16>,
    pub kind: Option<TraceKind>,
}

impl TraceQuery {
    pub fn text(needle: impl Into<String>) -> Self {
        Self {
            text: Some(needle.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, trace: &StoredTrace) -> bool {
        let record = &trace.record;
        if let Some(method) = &self.method {
            if !record.method.eq_ignore_ascii_case(method) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if record.kind != kind {
                return false;
            }
        }
        match self.text.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(needle) => matches_any_field(trace, &needle.to_lowercase()),
        }
    }
}

fn matches_any_field(trace: &StoredTrace, needle: &str) -> bool {
    let record = &trace.record;
    let contains = |haystack: &str| haystack.to_lowercase().contains(needle);

    contains(&record.method)
        || contains(&record.url)
        || contains(&trace.absolute_url)
        || contains(&record.status.to_string())
        || contains(&record.kind.to_string())
        || contains(&trace.display_time)
        || record
            .request_headers
            .iter()
            .any(|h| contains(&h.name) || contains(&h.value))
        || record.payload.as_ref().is_some_and(|v| contains(&value_text(v)))
        || record.response.as_ref().is_some_and(|v| contains(&value_text(v)))
}

fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// TraceLog
// ============================================================================

pub struct TraceLog {
    base_url: Option<Url>,
    filters: TraceFilters,
    capacity: usize,
    entries: VecDeque<StoredTrace>,
    seen: HashMap<DedupKey, u32>,
    stats: TraceLogStats,
}

impl TraceLog {
    pub fn new(base_url: Option<Url>, filters: TraceFilters, capacity: usize) -> Self {
        Self {
            base_url,
            filters,
            capacity: capacity.max(1),
            entries: VecDeque::new(),
            seen: HashMap::new(),
            stats: TraceLogStats::default(),
        }
    }

    pub fn ingest(&mut self, record: TraceRecord) -> IngestOutcome {
        self.stats.ingested += 1;
        if let Some(reason) = self.filters.reject_reason(&record.url) {
            self.stats.dropped += 1;
            return IngestOutcome::Dropped(reason);
        }

        let counter = self.seen.entry(DedupKey::for_record(&record)).or_insert(0);
        *counter += 1;
        let repeat_count = *counter;
        let duplicate = repeat_count > 1;
        if duplicate {
            self.stats.duplicates += 1;
        }

        let trace = StoredTrace {
            absolute_url: resolve_url(self.base_url.as_ref(), &record.url),
            display_time: display_time(record.started_at),
            repeat_count,
            duplicate,
            record,
        };

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.stats.evicted += 1;
        }
        self.entries.push_back(trace);

        IngestOutcome::Stored {
            duplicate,
            repeat_count,
        }
    }

    /// Drop every stored record and forget all repeat counters.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.seen.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn repeat_count(&self, key: &DedupKey) -> u32 {
        self.seen.get(key).copied().unwrap_or(0)
    }

    pub fn stats(&self) -> TraceLogStats {
        TraceLogStats {
            stored: self.entries.len(),
            ..self.stats
        }
    }

    pub fn get(&self, id: &str) -> Option<&StoredTrace> {
        self.entries.iter().find(|trace| trace.record.id == id)
    }

    /// Lazily walk stored traces, most recent first.
    pub fn query<'a, P>(&'a self, predicate: P) -> impl Iterator<Item = &'a StoredTrace> + 'a
    where
        P: Fn(&StoredTrace) -> bool + 'a,
    {
        self.entries.iter().rev().filter(move |trace| predicate(trace))
    }

    pub fn search<'a>(
        &'a self,
        query: &'a TraceQuery,
    ) -> impl Iterator<Item = &'a StoredTrace> + 'a {
        self.query(move |trace| query.matches(trace))
    }
}
