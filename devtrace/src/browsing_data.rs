//! Browsing-data clearing: toggle mapping and the platform boundary.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Serialize;
use shared_types::ClearDataRequest;

/// Storage categories understood by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DataCategory {
    Cache,
    AppCache,
    CacheStorage,
    ServiceWorkers,
    LocalStorage,
    IndexedDb,
    WebSql,
    Cookies,
    History,
}

impl DataCategory {
    /// Directory name of the category inside a profile directory
    pub fn dir_name(&self) -> &'static str {
        match self {
            DataCategory::Cache => "Cache",
            DataCategory::AppCache => "Application Cache",
            DataCategory::CacheStorage => "CacheStorage",
            DataCategory::ServiceWorkers => "Service Worker",
            DataCategory::LocalStorage => "Local Storage",
            DataCategory::IndexedDb => "IndexedDB",
            DataCategory::WebSql => "databases",
            DataCategory::Cookies => "Cookies",
            DataCategory::History => "History",
        }
    }
}

/// Categories selected by a clear-data request, in a fixed order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemovalSet(Vec<DataCategory>);

impl RemovalSet {
    pub fn from_request(request: &ClearDataRequest) -> Self {
        let mut set = Vec::new();
        if request.cache {
            set.extend([
                DataCategory::Cache,
                DataCategory::AppCache,
                DataCategory::CacheStorage,
                DataCategory::ServiceWorkers,
            ]);
        }
        if request.local_storage {
            set.extend([
                DataCategory::LocalStorage,
                DataCategory::IndexedDb,
                DataCategory::WebSql,
            ]);
        }
        if request.cookies {
            set.push(DataCategory::Cookies);
        }
        if request.history {
            set.push(DataCategory::History);
        }
        Self(set)
    }

    pub fn categories(&self) -> &[DataCategory] {
        &self.0
    }

    pub fn contains(&self, category: DataCategory) -> bool {
        self.0.contains(&category)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("Failed to remove {category:?}: {source}")]
    Io {
        category: DataCategory,
        #[source]
        source: std::io::Error,
    },

    #[error("Platform task failed: {0}")]
    Task(String),

    #[error("Platform rejected the request: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait BrowsingDataPlatform: Send + Sync {
    /// Remove data in `set` created at or after `since` (epoch ms; 0 means
    /// all time). Returns only once the removal is complete.
    async fn remove(&self, set: &RemovalSet, since: i64) -> Result<(), PlatformError>;
}

/// Clears category directories under a browser profile directory
#[derive(Debug, Clone)]
pub struct ProfileDirPlatform {
    root: PathBuf,
}

impl ProfileDirPlatform {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl BrowsingDataPlatform for ProfileDirPlatform {
    async fn remove(&self, set: &RemovalSet, since: i64) -> Result<(), PlatformError> {
        let root = self.root.clone();
        let categories = set.categories().to_vec();
        let cutoff = UNIX_EPOCH + Duration::from_millis(since.max(0) as u64);

        tokio::task::spawn_blocking(move || {
            for category in categories {
                let path = root.join(category.dir_name());
                remove_since(&path, since <= 0, cutoff)
                    .map_err(|source| PlatformError::Io { category, source })?;
                tracing::debug!(?category, path = %path.display(), "Cleared browsing data");
            }
            Ok(())
        })
        .await
        .map_err(|e| PlatformError::Task(e.to_string()))?
    }
}

fn remove_since(path: &Path, everything: bool, cutoff: SystemTime) -> std::io::Result<()> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    if meta.is_dir() {
        if everything {
            return std::fs::remove_dir_all(path);
        }
        for entry in std::fs::read_dir(path)? {
            remove_since(&entry?.path(), false, cutoff)?;
        }
        return Ok(());
    }

    let modified = meta.modified().unwrap_or(SystemTime::now());
    if everything || modified >= cutoff {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_only_maps_to_four_categories() {
        let set = RemovalSet::from_request(&ClearDataRequest {
            cache: true,
            ..ClearDataRequest::none()
        });
        assert_eq!(
            set.categories(),
            &[
                DataCategory::Cache,
                DataCategory::AppCache,
                DataCategory::CacheStorage,
                DataCategory::ServiceWorkers,
            ]
        );
        assert!(!set.contains(DataCategory::Cookies));
        assert!(!set.contains(DataCategory::LocalStorage));
        assert!(!set.contains(DataCategory::History));
    }

    #[test]
    fn test_local_storage_toggle_covers_all_site_storage() {
        let set = RemovalSet::from_request(&ClearDataRequest {
            local_storage: true,
            cookies: true,
            ..ClearDataRequest::none()
        });
        assert_eq!(
            set.categories(),
            &[
                DataCategory::LocalStorage,
                DataCategory::IndexedDb,
                DataCategory::WebSql,
                DataCategory::Cookies,
            ]
        );
        assert!(RemovalSet::from_request(&ClearDataRequest::none()).is_empty());
    }

    #[tokio::test]
    async fn test_profile_platform_removes_selected_dirs_only() {
        let dir = tempfile::tempdir().unwrap();
        for category in [DataCategory::Cache, DataCategory::Cookies] {
            let path = dir.path().join(category.dir_name());
            std::fs::create_dir_all(&path).unwrap();
            std::fs::write(path.join("entry"), b"x").unwrap();
        }

        let platform = ProfileDirPlatform::new(dir.path());
        let set = RemovalSet::from_request(&ClearDataRequest {
            cache: true,
            ..ClearDataRequest::none()
        });
        platform.remove(&set, 0).await.unwrap();

        assert!(!dir.path().join(DataCategory::Cache.dir_name()).exists());
        assert!(dir.path().join(DataCategory::Cookies.dir_name()).exists());
    }
}
