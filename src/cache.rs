//! Process-wide, key-addressed cache of asynchronous read results.
//!
//! Built on `moka`'s future cache: concurrent `get_or_load` calls for the
//! same key are coalesced into a single in-flight load whose result every
//! waiter shares, so for one key at most one request hits the store at a
//! time. The contract consumers rely on is that cache-key identity implies
//! value identity — two components reading the same key never diverge.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use uuid::Uuid;

use crate::error::{DataError, DataResult};
use crate::model::{LeaveRequestWithRequester, Profile, StatusFilter};

/// Composite cache key: entity kind plus discriminating parameters.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum QueryKey {
    /// The HR-wide profile listing.
    Profiles,
    /// One user's own profile.
    OwnProfile(Uuid),
    /// Leave requests under a status filter; the filter is part of the key
    /// so differently-filtered reads coexist without collision.
    LeaveRequests(StatusFilter),
}

/// Cached result, one variant per key kind.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Profiles(Arc<Vec<Profile>>),
    OwnProfile(Option<Arc<Profile>>),
    LeaveRequests(Arc<Vec<LeaveRequestWithRequester>>),
}

impl TryFrom<CacheValue> for Arc<Vec<Profile>> {
    type Error = DataError;
    fn try_from(value: CacheValue) -> DataResult<Self> {
        match value {
            CacheValue::Profiles(profiles) => Ok(profiles),
            other => Err(kind_mismatch("profiles", &other)),
        }
    }
}

impl TryFrom<CacheValue> for Option<Arc<Profile>> {
    type Error = DataError;
    fn try_from(value: CacheValue) -> DataResult<Self> {
        match value {
            CacheValue::OwnProfile(profile) => Ok(profile),
            other => Err(kind_mismatch("own profile", &other)),
        }
    }
}

impl TryFrom<CacheValue> for Arc<Vec<LeaveRequestWithRequester>> {
    type Error = DataError;
    fn try_from(value: CacheValue) -> DataResult<Self> {
        match value {
            CacheValue::LeaveRequests(requests) => Ok(requests),
            other => Err(kind_mismatch("leave requests", &other)),
        }
    }
}

fn kind_mismatch(expected: &str, got: &CacheValue) -> DataError {
    DataError::Internal(format!("cache kind mismatch: expected {expected}, got {got:?}"))
}

pub struct QueryCache {
    inner: Cache<QueryKey, CacheValue>,
}

impl QueryCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Returns the cached value for `key`, running `load` on a miss.
    ///
    /// Concurrent callers for the same key share one load. A caller that
    /// goes away stops observing the result, but a load still awaited by
    /// another live caller runs to completion.
    pub async fn get_or_load<F>(&self, key: QueryKey, load: F) -> DataResult<CacheValue>
    where
        F: Future<Output = DataResult<CacheValue>>,
    {
        self.inner
            .try_get_with(key, load)
            .await
            .map_err(DataError::from_shared)
    }

    pub async fn invalidate(&self, key: &QueryKey) {
        self.inner.invalidate(key).await;
    }

    /// Drops every leave-request entry, whatever its filter.
    pub async fn invalidate_leave_requests(&self) {
        let invalidations = StatusFilter::ALL
            .iter()
            .map(|filter| {
                let key = QueryKey::LeaveRequests(*filter);
                async move { self.inner.invalidate(&key).await }
            });
        futures::future::join_all(invalidations).await;
    }

    /// Clears the whole cache. Required on logout so no entry keyed to the
    /// old identity is readable by whoever signs in next.
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache() -> QueryCache {
        QueryCache::new(1_000, Duration::from_secs(60))
    }

    fn profiles_value(count: usize) -> CacheValue {
        let profiles = (0..count)
            .map(|i| {
                serde_json::from_value(serde_json::json!({
                    "id": Uuid::new_v4().to_string(),
                    "user_id": Uuid::new_v4().to_string(),
                    "full_name": format!("Person {i}"),
                    "email": format!("p{i}@company.com"),
                    "created_at": "2024-01-01T00:00:00Z",
                    "updated_at": "2024-01-01T00:00:00Z",
                }))
                .unwrap()
            })
            .collect::<Vec<Profile>>();
        CacheValue::Profiles(Arc::new(profiles))
    }

    #[tokio::test]
    async fn concurrent_reads_for_one_key_run_one_load() {
        let cache = Arc::new(cache());
        let loads = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let loads = Arc::clone(&loads);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_load(QueryKey::Profiles, async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(profiles_value(3))
                    })
                    .await
            }));
        }
        for handle in handles {
            let value: Arc<Vec<Profile>> = handle.await.unwrap().unwrap().try_into().unwrap();
            assert_eq!(value.len(), 3);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidation_forces_a_fresh_load() {
        let cache = cache();
        let loads = AtomicUsize::new(0);

        for _ in 0..2 {
            cache
                .get_or_load(QueryKey::Profiles, async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(profiles_value(1))
                })
                .await
                .unwrap();
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        cache.invalidate(&QueryKey::Profiles).await;
        cache
            .get_or_load(QueryKey::Profiles, async {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok(profiles_value(1))
            })
            .await
            .unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn differently_filtered_keys_do_not_collide() {
        let cache = cache();
        cache
            .get_or_load(QueryKey::LeaveRequests(StatusFilter::Pending), async {
                Ok(CacheValue::LeaveRequests(Arc::new(Vec::new())))
            })
            .await
            .unwrap();

        let loads = AtomicUsize::new(0);
        cache
            .get_or_load(QueryKey::LeaveRequests(StatusFilter::All), async {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok(CacheValue::LeaveRequests(Arc::new(Vec::new())))
            })
            .await
            .unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_loads_surface_the_error_and_are_not_cached() {
        let cache = cache();
        let err = cache
            .get_or_load(QueryKey::Profiles, async {
                Err(DataError::Network("store unreachable".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::Network(_)));

        // Next read retries instead of replaying the failure.
        let value = cache
            .get_or_load(QueryKey::Profiles, async { Ok(profiles_value(1)) })
            .await
            .unwrap();
        let profiles: Arc<Vec<Profile>> = value.try_into().unwrap();
        assert_eq!(profiles.len(), 1);
    }
}
