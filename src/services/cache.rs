use std::time::Duration;

use crate::models::CorporationDetailData;

/// In-memory cache of registry detail records, keyed by registration index.
///
/// Only successful lookups are stored; a failed detail fetch is retried on
/// the next request for the same index.
#[derive(Clone)]
pub struct DetailCache {
    entries: moka::future::Cache<String, CorporationDetailData>,
}

impl DetailCache {
    pub fn new(max_entries: u64, ttl_secs: u64) -> Self {
        let entries = moka::future::CacheBuilder::new(max_entries)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self { entries }
    }

    pub async fn get(&self, registration_index: &str) -> Option<CorporationDetailData> {
        let key = CacheKey::detail(registration_index);
        let hit = self.entries.get(&key).await;
        if hit.is_some() {
            tracing::trace!("Detail cache hit: {}", key);
        }
        hit
    }

    pub async fn insert(&self, registration_index: &str, detail: CorporationDetailData) {
        let key = CacheKey::detail(registration_index);
        self.entries.insert(key.clone(), detail).await;
        tracing::trace!("Detail cache set: {}", key);
    }
}

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    /// Key for a corporation detail record
    pub fn detail(registration_index: &str) -> String {
        format!("detail:{}", registration_index.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::responses::CorporationDetail;

    #[tokio::test]
    async fn test_detail_cache_set_get() {
        let cache = DetailCache::new(10, 60);
        assert!(cache.get("1-1").await.is_none());

        let detail = CorporationDetailData {
            corporation: Some(CorporationDetail {
                corp_name: Some("CONDAL LLC".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        cache.insert("1-1", detail).await;

        let hit = cache.get(" 1-1 ").await.unwrap();
        assert_eq!(hit.corporation.unwrap().corp_name.as_deref(), Some("CONDAL LLC"));
    }

    #[test]
    fn test_cache_key_builder() {
        assert_eq!(CacheKey::detail("4411-111"), "detail:4411-111");
    }
}
