use std::path::PathBuf;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Milliseconds-since-epoch clock. Injected so expiry is deterministic
/// under test.
pub type ClockMs = Arc<dyn Fn() -> i64 + Send + Sync>;

pub fn system_clock_ms() -> ClockMs {
    Arc::new(|| chrono::Utc::now().timestamp_millis())
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope<T> {
    expires_at: i64,
    value: T,
}

/// Content-addressed file cache with passive TTL expiry.
///
/// The cache is an optimization, never a source of truth: every read or
/// parse failure is reported as a miss. Entries are only checked for
/// expiry at read time; nothing deletes them.
pub struct FileCache {
    base_dir: PathBuf,
    now_ms: ClockMs,
}

impl FileCache {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self::with_clock(base_dir, system_clock_ms())
    }

    pub fn with_clock(base_dir: impl Into<PathBuf>, now_ms: ClockMs) -> Self {
        Self {
            base_dir: base_dir.into(),
            now_ms,
        }
    }

    fn entry_path(&self, namespace: &str, key: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.base_dir.join(namespace).join(format!("{digest}.json"))
    }

    pub async fn get<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Option<T> {
        let path = self.entry_path(namespace, key);
        let raw = tokio::fs::read_to_string(&path).await.ok()?;
        let envelope: CacheEnvelope<T> = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(namespace, path = %path.display(), error = %e, "cache entry unreadable, treating as miss");
                return None;
            }
        };
        if envelope.expires_at <= (self.now_ms)() {
            return None;
        }
        Some(envelope.value)
    }

    pub async fn set<T: Serialize>(
        &self,
        namespace: &str,
        key: &str,
        value: &T,
        ttl_seconds: u64,
    ) -> anyhow::Result<()> {
        let path = self.entry_path(namespace, key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let envelope = CacheEnvelope {
            expires_at: (self.now_ms)() + ttl_seconds.max(1) as i64 * 1000,
            value,
        };
        tokio::fs::write(&path, serde_json::to_vec(&envelope)?).await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn base_dir(&self) -> &std::path::Path {
        &self.base_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn stepped_clock(start: i64) -> (ClockMs, Arc<AtomicI64>) {
        let now = Arc::new(AtomicI64::new(start));
        let handle = now.clone();
        let clock: ClockMs = Arc::new(move || now.load(Ordering::SeqCst));
        (clock, handle)
    }

    #[tokio::test]
    async fn round_trips_before_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let (clock, _) = stepped_clock(1_000_000);
        let cache = FileCache::with_clock(dir.path(), clock);

        cache
            .set("search", "query-key", &vec!["a".to_string(), "b".to_string()], 900)
            .await
            .unwrap();
        let got: Option<Vec<String>> = cache.get("search", "query-key").await;
        assert_eq!(got, Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[tokio::test]
    async fn expires_when_clock_passes_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let (clock, now) = stepped_clock(1_000_000);
        let cache = FileCache::with_clock(dir.path(), clock);

        cache.set("pages", "https://a.example", &"body", 60).await.unwrap();
        now.store(1_000_000 + 60_000, Ordering::SeqCst);
        let got: Option<String> = cache.get("pages", "https://a.example").await;
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn zero_ttl_is_clamped_to_one_second() {
        let dir = tempfile::tempdir().unwrap();
        let (clock, now) = stepped_clock(0);
        let cache = FileCache::with_clock(dir.path(), clock);

        cache.set("pages", "k", &1u32, 0).await.unwrap();
        now.store(999, Ordering::SeqCst);
        assert_eq!(cache.get::<u32>("pages", "k").await, Some(1));
        now.store(1_000, Ordering::SeqCst);
        assert_eq!(cache.get::<u32>("pages", "k").await, None);
    }

    #[tokio::test]
    async fn corrupt_entries_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        let (clock, _) = stepped_clock(0);
        let cache = FileCache::with_clock(dir.path(), clock);

        cache.set("pages", "k", &"v", 60).await.unwrap();
        let path = cache.entry_path("pages", "k");
        tokio::fs::write(&path, b"{not json").await.unwrap();
        assert_eq!(cache.get::<String>("pages", "k").await, None);

        // Wrong shape (no expires_at) is a miss too.
        tokio::fs::write(&path, br#"{"value":"v"}"#).await.unwrap();
        assert_eq!(cache.get::<String>("pages", "k").await, None);
    }

    #[tokio::test]
    async fn namespaces_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let (clock, _) = stepped_clock(0);
        let cache = FileCache::with_clock(dir.path(), clock);

        cache.set("search", "k", &"from-search", 60).await.unwrap();
        assert_eq!(cache.get::<String>("pages", "k").await, None);
        assert!(cache.base_dir().join("search").exists());
    }
}
