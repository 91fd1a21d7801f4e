//! Shared query cache with stale-while-revalidate reads, in-flight
//! coalescing and idle-entry garbage collection.
//!
//! Values are stored type-erased under their [`QueryKey`]; callers get them
//! back as `Arc<T>`. Fetches run on spawned tasks and are registered before
//! the first suspension point, so concurrent reads of one key share a single
//! remote request and an abandoned caller still fills the cache.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::app::{LectioError, Result};
use crate::config::CacheConfig;
use crate::query::QueryKey;

type Erased = Arc<dyn Any + Send + Sync>;
type SharedFetch = Shared<BoxFuture<'static, Result<Erased>>>;

const EVENT_CAPACITY: usize = 256;

/// Freshness and retention windows for one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Age after which a hit triggers a background refetch.
    pub stale_time: Duration,
    /// Idle time after which the entry may be evicted.
    pub gc_time: Duration,
}

impl QueryOptions {
    pub const fn new(stale_time: Duration, gc_time: Duration) -> Self {
        Self {
            stale_time,
            gc_time,
        }
    }

    pub const fn minutes(stale: u64, gc: u64) -> Self {
        Self::new(Duration::from_secs(stale * 60), Duration::from_secs(gc * 60))
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self::minutes(5, 30)
    }
}

impl From<&CacheConfig> for QueryOptions {
    fn from(config: &CacheConfig) -> Self {
        Self::new(config.stale_time(), config.gc_time())
    }
}

#[derive(Debug, Clone)]
pub enum CacheEvent {
    Updated(QueryKey),
    Failed { key: QueryKey, error: LectioError },
    Invalidated(QueryKey),
    Evicted(QueryKey),
}

impl CacheEvent {
    pub fn key(&self) -> &QueryKey {
        match self {
            CacheEvent::Updated(key)
            | CacheEvent::Invalidated(key)
            | CacheEvent::Evicted(key)
            | CacheEvent::Failed { key, .. } => key,
        }
    }
}

struct Entry {
    value: Erased,
    fetched_at: Instant,
    last_used: Instant,
    gc_time: Duration,
    invalidated: bool,
}

impl Entry {
    fn is_stale(&self, now: Instant, stale_time: Duration) -> bool {
        self.invalidated || now.duration_since(self.fetched_at) >= stale_time
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<QueryKey, Entry>,
    in_flight: HashMap<QueryKey, SharedFetch>,
}

enum Lookup {
    Hit(Erased),
    Stale(Erased, SharedFetch),
    Wait(SharedFetch),
}

/// A background refetch started by a stale read.
pub struct Refresh<T> {
    key: QueryKey,
    pending: SharedFetch,
    _value: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Refresh<T> {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Wait for the refetched value. The entry is gone if this fails.
    pub async fn wait(self) -> Result<Arc<T>> {
        let value = self.pending.await?;
        downcast(&self.key, value)
    }
}

/// Cloneable handle; clones share the same entries.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Mutex<Inner>>,
    events: broadcast::Sender<CacheEvent>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Read through the cache.
    ///
    /// A fresh hit returns the cached value without calling `load`. A stale
    /// hit returns the cached value and starts a background refetch. A miss
    /// waits for the fetch, joining one already in flight for the key.
    pub async fn fetch<T, F, Fut>(
        &self,
        key: &QueryKey,
        options: QueryOptions,
        load: F,
    ) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        // the refetch runs on its own task and fills the cache when done
        let (value, _refresh) = self.fetch_revalidating(key, options, load).await?;
        Ok(value)
    }

    /// Like [`fetch`](Self::fetch), but also hands back the background
    /// refetch a stale hit started, so the caller can wait for it.
    pub async fn fetch_revalidating<T, F, Fut>(
        &self,
        key: &QueryKey,
        options: QueryOptions,
        load: F,
    ) -> Result<(Arc<T>, Option<Refresh<T>>)>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let now = Instant::now();
        let lookup = {
            let mut inner = self.lock();
            let hit = inner.entries.get_mut(key).map(|entry| {
                entry.last_used = now;
                entry.gc_time = entry.gc_time.max(options.gc_time);
                (entry.value.clone(), entry.is_stale(now, options.stale_time))
            });

            match hit {
                Some((value, false)) => {
                    tracing::debug!("Cache hit for {}", key);
                    Lookup::Hit(value)
                }
                Some((value, true)) => {
                    tracing::debug!("Serving stale {} while refetching", key);
                    let pending = self.start_fetch(&mut inner, key, options, load);
                    Lookup::Stale(value, pending)
                }
                None => {
                    tracing::debug!("Cache miss for {}", key);
                    Lookup::Wait(self.start_fetch(&mut inner, key, options, load))
                }
            }
        };

        match lookup {
            Lookup::Hit(value) => Ok((downcast(key, value)?, None)),
            Lookup::Stale(value, pending) => {
                let refresh = Refresh {
                    key: key.clone(),
                    pending,
                    _value: PhantomData,
                };
                Ok((downcast(key, value)?, Some(refresh)))
            }
            Lookup::Wait(pending) => Ok((downcast(key, pending.await?)?, None)),
        }
    }

    /// Fetch regardless of freshness and wait for the new value.
    pub async fn refresh<T, F, Fut>(
        &self,
        key: &QueryKey,
        options: QueryOptions,
        load: F,
    ) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let pending = {
            let mut inner = self.lock();
            self.start_fetch(&mut inner, key, options, load)
        };
        downcast(key, pending.await?)
    }

    fn start_fetch<T, F, Fut>(
        &self,
        inner: &mut Inner,
        key: &QueryKey,
        options: QueryOptions,
        load: F,
    ) -> SharedFetch
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        if let Some(pending) = inner.in_flight.get(key) {
            tracing::debug!("Joining in-flight fetch for {}", key);
            return pending.clone();
        }

        let request = load();
        let cache = self.clone();
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let result = request.await.map(|value| Arc::new(value) as Erased);
            cache.complete(&task_key, options, &result);
            result
        });

        let task_key = key.clone();
        let pending = async move {
            handle.await.unwrap_or_else(|e| {
                tracing::error!("Fetch task for {} failed: {}", task_key, e);
                Err(LectioError::Other(format!(
                    "fetch task for {} failed: {}",
                    task_key, e
                )))
            })
        }
        .boxed()
        .shared();

        inner.in_flight.insert(key.clone(), pending.clone());
        pending
    }

    fn complete(&self, key: &QueryKey, options: QueryOptions, result: &Result<Erased>) {
        let now = Instant::now();
        let event = {
            let mut inner = self.lock();
            inner.in_flight.remove(key);
            match result {
                Ok(value) => {
                    let gc_time = inner
                        .entries
                        .get(key)
                        .map(|e| e.gc_time.max(options.gc_time))
                        .unwrap_or(options.gc_time);
                    inner.entries.insert(
                        key.clone(),
                        Entry {
                            value: value.clone(),
                            fetched_at: now,
                            last_used: now,
                            gc_time,
                            invalidated: false,
                        },
                    );
                    CacheEvent::Updated(key.clone())
                }
                Err(error) => {
                    // a failed key keeps no data
                    inner.entries.remove(key);
                    tracing::debug!("Fetch for {} failed: {}", key, error);
                    CacheEvent::Failed {
                        key: key.clone(),
                        error: error.clone(),
                    }
                }
            }
        };
        let _ = self.events.send(event);
    }

    /// Cached value without touching its freshness or idle timer.
    pub fn get_query_data<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<Arc<T>> {
        let value = self.lock().entries.get(key)?.value.clone();
        value.downcast::<T>().ok()
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.lock().entries.contains_key(key)
    }

    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.lock().in_flight.contains_key(key)
    }

    /// Mark an entry stale so the next read refetches it.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        let found = match self.lock().entries.get_mut(key) {
            Some(entry) => {
                entry.invalidated = true;
                true
            }
            None => false,
        };
        if found {
            let _ = self.events.send(CacheEvent::Invalidated(key.clone()));
        }
        found
    }

    pub fn remove(&self, key: &QueryKey) -> bool {
        let removed = self.lock().entries.remove(key).is_some();
        if removed {
            let _ = self.events.send(CacheEvent::Evicted(key.clone()));
        }
        removed
    }

    /// Keys with a cached value, sorted.
    pub fn keys(&self) -> Vec<QueryKey> {
        let mut keys: Vec<QueryKey> = self.lock().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict entries idle for at least their GC window. Returns how many went.
    pub fn collect_garbage(&self) -> usize {
        let now = Instant::now();
        let evicted: Vec<QueryKey> = {
            let mut inner = self.lock();
            let Inner { entries, in_flight } = &mut *inner;
            let expired: Vec<QueryKey> = entries
                .iter()
                .filter(|(key, entry)| {
                    !in_flight.contains_key(*key)
                        && now.duration_since(entry.last_used) >= entry.gc_time
                })
                .map(|(key, _)| key.clone())
                .collect();
            for key in &expired {
                entries.remove(key);
            }
            expired
        };

        for key in &evicted {
            tracing::debug!("Evicting idle cache entry {}", key);
            let _ = self.events.send(CacheEvent::Evicted(key.clone()));
        }
        evicted.len()
    }

    /// Sweep idle entries every `every` until the handle is aborted.
    pub fn spawn_janitor(&self, every: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = cache.collect_garbage();
                if evicted > 0 {
                    tracing::debug!("Janitor evicted {} cache entries", evicted);
                }
            }
        })
    }
}

fn downcast<T: Send + Sync + 'static>(key: &QueryKey, value: Erased) -> Result<Arc<T>> {
    value
        .downcast::<T>()
        .map_err(|_| {
            LectioError::Other(format!("cached value for {} has an unexpected type", key))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const OPTIONS: QueryOptions = QueryOptions::minutes(5, 30);

    type Load = BoxFuture<'static, Result<usize>>;

    fn counting(calls: &Arc<AtomicUsize>) -> impl FnOnce() -> Load + Send {
        let calls = calls.clone();
        move || async move { Ok(calls.fetch_add(1, Ordering::SeqCst) + 1) }.boxed()
    }

    fn slow(calls: &Arc<AtomicUsize>, delay: Duration) -> impl FnOnce() -> Load + Send {
        let calls = calls.clone();
        move || {
            async move {
                tokio::time::sleep(delay).await;
                Ok(calls.fetch_add(1, Ordering::SeqCst) + 1)
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_hit_skips_load() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::testaments();

        let first = cache.fetch(&key, OPTIONS, counting(&calls)).await.unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;
        let second = cache.fetch(&key, OPTIONS, counting(&calls)).await.unwrap();

        assert_eq!(*first, 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_reads_coalesce() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::bible_versions();

        let (a, b) = tokio::join!(
            cache.fetch(&key, OPTIONS, slow(&calls, Duration::from_secs(2))),
            cache.fetch(&key, OPTIONS, slow(&calls, Duration::from_secs(2))),
        );

        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!cache.is_fetching(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_hit_returns_old_value_and_refreshes() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::book_detail("gen");
        cache.fetch(&key, OPTIONS, counting(&calls)).await.unwrap();

        tokio::time::advance(OPTIONS.stale_time + Duration::from_secs(1)).await;
        let mut events = cache.subscribe();
        let stale = cache.fetch(&key, OPTIONS, counting(&calls)).await.unwrap();
        assert_eq!(*stale, 1);

        let event = events.recv().await.unwrap();
        assert!(matches!(event, CacheEvent::Updated(ref k) if *k == key));
        assert_eq!(cache.get_query_data::<usize>(&key).as_deref(), Some(&2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_read_hands_back_its_refresh() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::bible_versions();
        let (first, refresh) = cache
            .fetch_revalidating(&key, OPTIONS, counting(&calls))
            .await
            .unwrap();
        assert_eq!(*first, 1);
        assert!(refresh.is_none());

        tokio::time::advance(OPTIONS.stale_time).await;
        let (stale, refresh) = cache
            .fetch_revalidating(&key, OPTIONS, slow(&calls, Duration::from_secs(3)))
            .await
            .unwrap();
        assert_eq!(*stale, 1);
        assert!(cache.is_fetching(&key));

        let refresh = refresh.unwrap();
        assert_eq!(refresh.key(), &key);
        assert_eq!(*refresh.wait().await.unwrap(), 2);
        assert!(!cache.is_fetching(&key));
    }

    #[tokio::test]
    async fn test_failure_drops_entry_and_spares_other_keys() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let good = QueryKey::testaments();
        let bad = QueryKey::book_detail("nope");
        cache.fetch(&good, OPTIONS, counting(&calls)).await.unwrap();

        let mut events = cache.subscribe();
        let err = cache
            .fetch::<usize, _, _>(&bad, OPTIONS, || async {
                Err(LectioError::NotFound("book with slug 'nope' not found".into()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, LectioError::NotFound(_)));
        assert!(!cache.contains(&bad));
        assert!(cache.contains(&good));
        assert!(matches!(
            events.recv().await.unwrap(),
            CacheEvent::Failed { ref key, .. } if *key == bad
        ));
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::testaments();
        cache.fetch(&key, OPTIONS, counting(&calls)).await.unwrap();

        assert!(cache.invalidate(&key));
        let fresh = cache.refresh(&key, OPTIONS, counting(&calls)).await.unwrap();
        assert_eq!(*fresh, 2);

        // a fresh entry is served from cache again
        let again = cache.fetch(&key, OPTIONS, counting(&calls)).await.unwrap();
        assert_eq!(*again, 2);
        assert!(!cache.invalidate(&QueryKey::bible_versions()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_garbage_collection_respects_gc_window() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::testaments();
        cache.fetch(&key, OPTIONS, counting(&calls)).await.unwrap();

        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        assert_eq!(cache.collect_garbage(), 0);

        // a fresh read resets the idle timer
        cache.fetch(&key, OPTIONS, counting(&calls)).await.unwrap();
        tokio::time::advance(Duration::from_secs(29 * 60)).await;
        assert_eq!(cache.collect_garbage(), 0);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(cache.collect_garbage(), 1);
        assert!(cache.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_janitor_evicts_idle_entries() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::testaments();
        cache
            .fetch(&key, QueryOptions::minutes(1, 2), counting(&calls))
            .await
            .unwrap();

        let janitor = cache.spawn_janitor(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(3 * 60 + 1)).await;

        assert!(!cache.contains(&key));
        janitor.abort();
    }

    #[tokio::test]
    async fn test_type_mismatch_is_reported() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::testaments();
        cache.fetch(&key, OPTIONS, counting(&calls)).await.unwrap();

        let err = cache
            .fetch::<String, _, _>(&key, OPTIONS, || async { Ok(String::new()) })
            .await
            .unwrap_err();
        assert!(matches!(err, LectioError::Other(_)));
    }

    #[tokio::test]
    async fn test_keys_are_sorted() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        cache
            .fetch(&QueryKey::testaments(), OPTIONS, counting(&calls))
            .await
            .unwrap();
        cache
            .fetch(&QueryKey::bible_versions(), OPTIONS, counting(&calls))
            .await
            .unwrap();

        let keys: Vec<String> = cache.keys().iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["bible_versions", "testaments"]);
        assert_eq!(cache.len(), 2);
    }
}
