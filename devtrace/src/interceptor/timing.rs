//! Per-frame resource timing buffer.
//!
//! The network stack appends one entry per completed request; the
//! interceptor reads it back to refine the duration of a captured call.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Entries kept per frame before the oldest are dropped
pub const TIMELINE_BUFFER_SIZE: usize = 250;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceTimingEntry {
    /// Absolute URL of the resource
    pub name: String,
    /// Epoch milliseconds at which the request was started
    pub start_time_ms: i64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct PerformanceTimeline {
    entries: Arc<Mutex<VecDeque<ResourceTimingEntry>>>,
}

impl PerformanceTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: ResourceTimingEntry) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() == TIMELINE_BUFFER_SIZE {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn entries_by_name(&self, name: &str) -> Vec<ResourceTimingEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().filter(|e| e.name == name).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pick the duration for a captured call.
///
/// Among timeline entries for `absolute_url` whose start lies within
/// `tolerance` of `started_at`, the closest one wins. Without a match the
/// wall-clock measurement is used.
pub fn resolve_duration(
    timeline: &PerformanceTimeline,
    absolute_url: &str,
    started_at: i64,
    wall_clock: Duration,
    tolerance: Duration,
) -> u64 {
    let tolerance_ms = tolerance.as_millis() as i64;
    timeline
        .entries_by_name(absolute_url)
        .into_iter()
        .map(|entry| ((entry.start_time_ms - started_at).abs(), entry))
        .filter(|(distance, _)| *distance <= tolerance_ms)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, entry)| entry.duration_ms)
        .unwrap_or(wall_clock.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://api.example.com/users";

    fn entry(start: i64, duration: u64) -> ResourceTimingEntry {
        ResourceTimingEntry {
            name: URL.to_string(),
            start_time_ms: start,
            duration_ms: duration,
        }
    }

    #[test]
    fn test_closest_entry_within_tolerance_wins() {
        let timeline = PerformanceTimeline::new();
        timeline.record(entry(1_000, 80));
        timeline.record(entry(1_300, 40));
        timeline.record(entry(1_040, 55));

        let d = resolve_duration(
            &timeline,
            URL,
            1_050,
            Duration::from_millis(90),
            Duration::from_millis(500),
        );
        assert_eq!(d, 55);
    }

    #[test]
    fn test_falls_back_to_wall_clock() {
        let timeline = PerformanceTimeline::new();
        timeline.record(entry(10_000, 80));
        timeline.record(ResourceTimingEntry {
            name: "https://api.example.com/other".to_string(),
            start_time_ms: 1_000,
            duration_ms: 3,
        });

        let d = resolve_duration(
            &timeline,
            URL,
            1_000,
            Duration::from_millis(90),
            Duration::from_millis(500),
        );
        assert_eq!(d, 90);
    }

    #[test]
    fn test_buffer_is_bounded() {
        let timeline = PerformanceTimeline::new();
        for i in 0..(TIMELINE_BUFFER_SIZE + 10) {
            timeline.record(entry(i as i64, 1));
        }
        assert_eq!(timeline.len(), TIMELINE_BUFFER_SIZE);
    }
}
