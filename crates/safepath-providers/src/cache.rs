use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use safepath_core::{Coordinate, IncidentRecord, IncidentSource, SafetyError};

pub trait CacheEntry {
    fn fetched_at(&self) -> Instant;
}

/// Drop entries older than `max_age`, then the oldest until at most
/// `max_entries` remain.
pub fn prune_cache<K, V>(cache: &DashMap<K, V>, max_entries: usize, max_age: Duration)
where
    K: Clone + Eq + Hash,
    V: CacheEntry,
{
    let now = Instant::now();
    let mut entries: Vec<(K, Instant)> = cache
        .iter()
        .map(|entry| (entry.key().clone(), entry.value().fetched_at()))
        .collect();

    entries.retain(|(key, fetched_at)| {
        if now.duration_since(*fetched_at) > max_age {
            cache.remove(key);
            false
        } else {
            true
        }
    });

    if cache.len() <= max_entries {
        return;
    }

    entries.sort_by_key(|(_, fetched_at)| *fetched_at);
    for (key, _) in entries {
        if cache.len() <= max_entries {
            break;
        }
        cache.remove(&key);
    }
}

/// Query identity at roughly metre resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct QueryKey {
    lat_e5: i64,
    lng_e5: i64,
    radius_e6: i64,
}

impl QueryKey {
    fn new(center: Coordinate, radius_deg: f64) -> Self {
        Self {
            lat_e5: (center.lat * 1e5).round() as i64,
            lng_e5: (center.lng * 1e5).round() as i64,
            radius_e6: (radius_deg * 1e6).round() as i64,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedIncidents {
    fetched_at: Instant,
    incidents: Vec<IncidentRecord>,
}

impl CacheEntry for CachedIncidents {
    fn fetched_at(&self) -> Instant {
        self.fetched_at
    }
}

/// Memoises successful incident queries for a TTL. Failures are not cached.
pub struct CachedIncidentSource<S> {
    inner: S,
    entries: DashMap<QueryKey, CachedIncidents>,
    ttl: Duration,
    max_entries: usize,
}

impl<S: IncidentSource + Sync> CachedIncidentSource<S> {
    pub fn new(inner: S, ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner,
            entries: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn fresh(&self, key: &QueryKey) -> Option<Vec<IncidentRecord>> {
        let entry = self.entries.get(key)?;
        if entry.fetched_at.elapsed() <= self.ttl {
            Some(entry.incidents.clone())
        } else {
            None
        }
    }
}

impl<S: IncidentSource + Sync> IncidentSource for CachedIncidentSource<S> {
    async fn query(
        &self,
        center: Coordinate,
        radius_deg: f64,
    ) -> Result<Vec<IncidentRecord>, SafetyError> {
        let key = QueryKey::new(center, radius_deg);
        if let Some(incidents) = self.fresh(&key) {
            tracing::trace!("Incident cache hit at {}", center);
            return Ok(incidents);
        }

        let incidents = self.inner.query(center, radius_deg).await?;
        self.entries.insert(
            key,
            CachedIncidents {
                fetched_at: Instant::now(),
                incidents: incidents.clone(),
            },
        );
        if self.entries.len() > self.max_entries {
            prune_cache(&self.entries, self.max_entries, self.ttl);
        }
        Ok(incidents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
        fail: bool,
    }

    impl IncidentSource for CountingSource {
        async fn query(
            &self,
            _center: Coordinate,
            _radius_deg: f64,
        ) -> Result<Vec<IncidentRecord>, SafetyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(SafetyError::IncidentQueryFailed("HTTP 502".to_string()))
            } else {
                Ok(Vec::new())
            }
        }
    }

    #[derive(Debug)]
    struct Stamp(Instant);

    impl CacheEntry for Stamp {
        fn fetched_at(&self) -> Instant {
            self.0
        }
    }

    #[tokio::test]
    async fn repeated_queries_hit_cache() {
        let cache = CachedIncidentSource::new(CountingSource::default(), Duration::from_secs(60), 16);
        let point = Coordinate::new(52.52, 13.405);

        cache.query(point, 0.005).await.unwrap();
        cache.query(point, 0.005).await.unwrap();
        cache.query(Coordinate::new(52.53, 13.405), 0.005).await.unwrap();

        assert_eq!(cache.inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let source = CountingSource {
            fail: true,
            ..CountingSource::default()
        };
        let cache = CachedIncidentSource::new(source, Duration::from_secs(60), 16);
        let point = Coordinate::new(52.52, 13.405);

        assert!(cache.query(point, 0.005).await.is_err());
        assert!(cache.query(point, 0.005).await.is_err());
        assert_eq!(cache.inner.calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn prune_drops_oldest_beyond_capacity() {
        let cache: DashMap<u32, Stamp> = DashMap::new();
        let now = Instant::now();
        cache.insert(1, Stamp(now));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert(2, Stamp(Instant::now()));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert(3, Stamp(Instant::now()));

        prune_cache(&cache, 2, Duration::from_secs(60));

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains_key(&1));
    }

    #[test]
    fn prune_drops_expired_entries() {
        let cache: DashMap<u32, Stamp> = DashMap::new();
        cache.insert(1, Stamp(Instant::now()));
        std::thread::sleep(Duration::from_millis(5));

        prune_cache(&cache, 10, Duration::from_millis(1));

        assert!(cache.is_empty());
    }
}
