use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

use crate::error::Result;
use crate::models::Role;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct CachedProfile {
    role: Option<Role>,
    name: Option<String>,
}

/// The two locally persisted entries (role and display name) that spare a
/// profile read on startup.
pub struct ProfileCache {
    path: Option<PathBuf>,
    entries: Mutex<CachedProfile>,
}

impl ProfileCache {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(CachedProfile::default()),
        }
    }

    /// Loads the cache file; a missing or unreadable file starts empty.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!("Ignoring corrupt profile cache {}: {}", path.display(), e);
                CachedProfile::default()
            }),
            Err(_) => CachedProfile::default(),
        };
        Self {
            path: Some(path),
            entries: Mutex::new(entries),
        }
    }

    pub fn role(&self) -> Option<Role> {
        self.snapshot().role
    }

    pub fn name(&self) -> Option<String> {
        self.snapshot().name
    }

    pub async fn store(&self, role: Role, name: &str) -> Result<()> {
        let entries = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.role = Some(role);
            entries.name = Some(name.to_string());
            entries.clone()
        };
        self.persist(&entries).await
    }

    pub async fn clear(&self) -> Result<()> {
        let entries = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            *entries = CachedProfile::default();
            entries.clone()
        };
        self.persist(&entries).await
    }

    fn snapshot(&self) -> CachedProfile {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn persist(&self, entries: &CachedProfile) -> Result<()> {
        if let Some(path) = &self.path {
            let bytes = serde_json::to_vec_pretty(entries)?;
            tokio::fs::write(path, bytes).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_survives_reopen_and_clears() {
        let path = std::env::temp_dir().join(format!("profile-cache-{}.json", uuid::Uuid::new_v4()));

        let cache = ProfileCache::open(&path).await;
        assert!(cache.role().is_none());
        cache.store(Role::Driver, "Kwame").await.unwrap();

        let reopened = ProfileCache::open(&path).await;
        assert_eq!(reopened.role(), Some(Role::Driver));
        assert_eq!(reopened.name().as_deref(), Some("Kwame"));

        reopened.clear().await.unwrap();
        let cleared = ProfileCache::open(&path).await;
        assert!(cleared.role().is_none());
        assert!(cleared.name().is_none());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let path = std::env::temp_dir().join(format!("profile-cache-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"{ not json").unwrap();
        let cache = ProfileCache::open(&path).await;
        assert!(cache.name().is_none());
        let _ = std::fs::remove_file(&path);
    }
}
