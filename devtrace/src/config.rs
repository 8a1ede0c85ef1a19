use std::time::Duration;

use crate::trace_log::TraceFilters;

#[derive(Debug, Clone)]
pub struct Config {
    /// Port the control API listens on
    pub port: u16,
    /// Path to the settings SQLite database (`:memory:` for a throwaway store)
    pub settings_db_path: String,
    /// Profile directory cleared by the browsing-data platform
    pub profile_dir: String,
    /// Delay before the navigation reactivation is sent a second time.
    /// Also used as the window in which repeated navigation signals for the
    /// same URL are coalesced.
    pub reactivation_retry_delay: Duration,
    /// How far a resource-timing entry may start from the interceptor's own
    /// start time and still be matched to the call
    pub resource_timing_tolerance: Duration,
    /// Maximum number of records kept by a tab's trace log
    pub trace_log_capacity: usize,
    /// URL substrings that are never captured
    pub url_denylist: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        load_env_file();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from `DEVTRACE_*` variables resolved through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let env = EnvSource { lookup };

        Ok(Self {
            port: env.number("PORT", 8787)?,
            settings_db_path: env.text("SETTINGS_DB", "./data/devtrace.db"),
            profile_dir: env.text("PROFILE_DIR", "./data/profile"),
            reactivation_retry_delay: env.millis("REACTIVATION_RETRY_MS", 1000)?,
            resource_timing_tolerance: env.millis("RESOURCE_TIMING_TOLERANCE_MS", 500)?,
            trace_log_capacity: env.number("TRACE_LOG_CAPACITY", 500)?,
            url_denylist: env.list("URL_DENYLIST", &["pvg"]),
        })
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            filters: TraceFilters::with_denylist(self.url_denylist.clone()),
            trace_log_capacity: self.trace_log_capacity,
            resource_timing_tolerance: self.resource_timing_tolerance,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8787,
            settings_db_path: ":memory:".to_string(),
            profile_dir: "./data/profile".to_string(),
            reactivation_retry_delay: Duration::from_millis(1000),
            resource_timing_tolerance: Duration::from_millis(500),
            trace_log_capacity: 500,
            url_denylist: vec!["pvg".to_string()],
        }
    }
}

/// Settings each frame needs to run its part of the trace pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub filters: TraceFilters,
    pub trace_log_capacity: usize,
    pub resource_timing_tolerance: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Config::default().pipeline()
    }
}

/// Load the nearest `.env`, searching the working directory and its ancestors
/// so running from `devtrace/` still picks up the repo-root file.
fn load_env_file() {
    let cwd = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            tracing::warn!(error = %e, "Could not determine current directory for .env lookup");
            return;
        }
    };

    let mut current = cwd.clone();
    loop {
        let candidate = current.join(".env");
        if candidate.exists() {
            match dotenvy::from_path(&candidate) {
                Ok(_) => {
                    tracing::info!(path = %candidate.display(), "Loaded environment from .env");
                }
                Err(e) => {
                    tracing::warn!(
                        path = %candidate.display(),
                        error = %e,
                        "Failed to load .env file"
                    );
                }
            }
            return;
        }

        if !current.pop() {
            break;
        }
    }

    tracing::debug!(cwd = %cwd.display(), "No .env file found; using process environment only");
}

const ENV_PREFIX: &str = "DEVTRACE_";

struct EnvSource<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvSource<F> {
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(&format!("{ENV_PREFIX}{name}"))
    }

    fn text(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_string())
    }

    fn number<T>(&self, name: &str, default: T) -> anyhow::Result<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(raw) = self.get(name) else {
            return Ok(default);
        };
        raw.trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {ENV_PREFIX}{name}={raw}: {e}"))
    }

    fn millis(&self, name: &str, default_ms: u64) -> anyhow::Result<Duration> {
        self.number(name, default_ms).map(Duration::from_millis)
    }

    /// Comma-separated list; blank entries are skipped.
    fn list(&self, name: &str, default: &[&str]) -> Vec<String> {
        match self.get(name) {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect(),
            None => default.iter().map(|item| item.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_pipeline_carries_denylist_and_capacity() {
        let pipeline = Config::default().pipeline();
        assert_eq!(pipeline.trace_log_capacity, 500);
        assert_eq!(pipeline.resource_timing_tolerance, Duration::from_millis(500));
        assert!(pipeline.filters.is_denied("https://cdn.example.com/PVG/beacon"));
    }

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_unset_variables_use_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 8787);
        assert_eq!(config.settings_db_path, "./data/devtrace.db");
        assert_eq!(config.reactivation_retry_delay, Duration::from_millis(1000));
        assert_eq!(config.url_denylist, vec!["pvg".to_string()]);
    }

    #[test]
    fn test_prefixed_variables_override_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("DEVTRACE_PORT", "9100"),
            ("DEVTRACE_REACTIVATION_RETRY_MS", " 250 "),
            ("DEVTRACE_URL_DENYLIST", "pvg, analytics ,,beacon"),
            ("PORT", "1"),
        ]))
        .unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.reactivation_retry_delay, Duration::from_millis(250));
        assert_eq!(config.url_denylist, vec!["pvg", "analytics", "beacon"]);
    }

    #[test]
    fn test_unparseable_number_names_the_variable() {
        let err = Config::from_lookup(lookup(&[("DEVTRACE_TRACE_LOG_CAPACITY", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("DEVTRACE_TRACE_LOG_CAPACITY=lots"));
    }
}
