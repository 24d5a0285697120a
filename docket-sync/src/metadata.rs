//! Board metadata cache
//!
//! Per-board column schema with a time-to-live. The refresh happens while the
//! cache lock is held, so concurrent lookups for an expired board wait for
//! and share a single provider call. State is per process and starts empty.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::BoardError;
use crate::ports::{BoardMetadataProvider, BoardSchema};

struct CachedSchema {
    schema: Arc<BoardSchema>,
    fetched_at: Instant,
}

pub struct MetadataCache {
    provider: Arc<dyn BoardMetadataProvider>,
    entries: Mutex<HashMap<String, CachedSchema>>,
}

impl MetadataCache {
    pub fn new(provider: Arc<dyn BoardMetadataProvider>) -> Self {
        Self {
            provider,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cached schema for `board_id`, refreshed if missing or older than `ttl`
    pub async fn get_or_refresh(
        &self,
        board_id: &str,
        ttl: Duration,
    ) -> Result<Arc<BoardSchema>, BoardError> {
        let mut entries = self.entries.lock().await;

        if let Some(cached) = entries.get(board_id) {
            if cached.fetched_at.elapsed() < ttl {
                return Ok(cached.schema.clone());
            }
        }

        debug!(board_id, "Refreshing board metadata");
        let schema = Arc::new(self.provider.fetch_board_schema(board_id).await?);
        entries.insert(
            board_id.to_string(),
            CachedSchema {
                schema: schema.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(schema)
    }

    /// Column id for a column label
    pub async fn column_id(
        &self,
        board_id: &str,
        label: &str,
        ttl: Duration,
    ) -> Result<Option<String>, BoardError> {
        let schema = self.get_or_refresh(board_id, ttl).await?;
        Ok(schema.column(label).map(|c| c.id.clone()))
    }

    /// Allowed labels of an enumerated column; empty if the column is free-form or absent
    pub async fn allowed_values(
        &self,
        board_id: &str,
        label: &str,
        ttl: Duration,
    ) -> Result<Vec<String>, BoardError> {
        let schema = self.get_or_refresh(board_id, ttl).await?;
        Ok(schema
            .column(label)
            .map(|c| c.allowed_values.clone())
            .unwrap_or_default())
    }

    /// Drop the cached schema so the next lookup refreshes
    pub async fn invalidate(&self, board_id: &str) {
        self.entries.lock().await.remove(board_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ColumnInfo;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BoardMetadataProvider for CountingProvider {
        async fn fetch_board_schema(&self, _board_id: &str) -> Result<BoardSchema, BoardError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            let mut schema = BoardSchema::default();
            schema.columns.insert(
                "Hearing Status".to_string(),
                ColumnInfo {
                    id: "status_7".to_string(),
                    allowed_values: vec!["active".into(), "cancelled".into()],
                },
            );
            Ok(schema)
        }
    }

    fn cache() -> (Arc<CountingProvider>, Arc<MetadataCache>) {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let cache = Arc::new(MetadataCache::new(provider.clone()));
        (provider, cache)
    }

    #[tokio::test]
    async fn test_lookups_within_ttl_share_one_fetch() {
        let (provider, cache) = cache();
        let ttl = Duration::from_secs(60);

        assert_eq!(
            cache.column_id("b1", "Hearing Status", ttl).await.unwrap().as_deref(),
            Some("status_7")
        );
        assert_eq!(
            cache.allowed_values("b1", "Hearing Status", ttl).await.unwrap(),
            vec!["active".to_string(), "cancelled".to_string()]
        );
        assert!(cache.column_id("b1", "Missing", ttl).await.unwrap().is_none());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_refresh_once() {
        let (provider, cache) = cache();
        let ttl = Duration::from_secs(60);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_or_refresh("b1", ttl).await.is_ok() })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expiry_and_invalidate_trigger_refresh() {
        let (provider, cache) = cache();

        cache.get_or_refresh("b1", Duration::ZERO).await.unwrap();
        cache.get_or_refresh("b1", Duration::ZERO).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        let ttl = Duration::from_secs(60);
        cache.invalidate("b1").await;
        cache.get_or_refresh("b1", ttl).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }
}
