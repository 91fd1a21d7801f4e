//! Reactive query handles.
//!
//! A [`Query`] binds a [`QueryDef`] to an input that may be absent or not
//! ready yet. While disabled it never fetches and reports the initial data.
//! When the input changes, the handle re-keys and fetches through the shared
//! [`QueryCache`]; results for keys that are no longer current are dropped.
//! State changes are published on a `watch` channel.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures::future::BoxFuture;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::app::{ErrorKind, LectioError, Result};
use crate::query::{CacheEvent, QueryCache, QueryKey, QueryOptions};

/// Inputs that can gate a query.
pub trait QueryInput: Clone + Send + Sync + 'static {
    /// Whether the input is complete enough to fetch with.
    fn is_ready(&self) -> bool;
}

impl QueryInput for () {
    fn is_ready(&self) -> bool {
        true
    }
}

impl QueryInput for String {
    fn is_ready(&self) -> bool {
        !self.trim().is_empty()
    }
}

impl QueryInput for i64 {
    fn is_ready(&self) -> bool {
        *self > 0
    }
}

impl QueryInput for u32 {
    fn is_ready(&self) -> bool {
        *self > 0
    }
}

impl QueryInput for Vec<i64> {
    fn is_ready(&self) -> bool {
        !self.is_empty()
    }
}

impl<A: QueryInput, B: QueryInput> QueryInput for (A, B) {
    fn is_ready(&self) -> bool {
        self.0.is_ready() && self.1.is_ready()
    }
}

impl<A: QueryInput, B: QueryInput, C: QueryInput> QueryInput for (A, B, C) {
    fn is_ready(&self) -> bool {
        self.0.is_ready() && self.1.is_ready() && self.2.is_ready()
    }
}

pub type Loader<I, T> = Arc<dyn Fn(I) -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// How to key, cache and load one kind of query.
pub struct QueryDef<I, T> {
    key: fn(&I) -> QueryKey,
    options: QueryOptions,
    load: Loader<I, T>,
}

impl<I, T> Clone for QueryDef<I, T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            options: self.options,
            load: self.load.clone(),
        }
    }
}

impl<I, T> QueryDef<I, T> {
    pub fn new<F>(key: fn(&I) -> QueryKey, options: QueryOptions, load: F) -> Self
    where
        F: Fn(I) -> BoxFuture<'static, Result<T>> + Send + Sync + 'static,
    {
        Self {
            key,
            options,
            load: Arc::new(load),
        }
    }

    pub fn key(&self, input: &I) -> QueryKey {
        (self.key)(input)
    }

    pub fn options(&self) -> QueryOptions {
        self.options
    }

    pub fn load(&self, input: I) -> BoxFuture<'static, Result<T>> {
        (self.load)(input)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Disabled, or stopped by invalid input.
    Idle,
    Pending,
    Success,
    NotFound,
    Error,
}

#[derive(Debug)]
pub struct QueryState<T> {
    pub data: Option<Arc<T>>,
    pub status: QueryStatus,
    /// Fetching with nothing to show yet.
    pub is_loading: bool,
    pub is_fetching: bool,
    pub is_error: bool,
    pub error: Option<LectioError>,
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            status: self.status,
            is_loading: self.is_loading,
            is_fetching: self.is_fetching,
            is_error: self.is_error,
            error: self.error.clone(),
        }
    }
}

impl<T> QueryState<T> {
    fn idle(initial: Option<Arc<T>>) -> Self {
        Self {
            data: initial,
            status: QueryStatus::Idle,
            is_loading: false,
            is_fetching: false,
            is_error: false,
            error: None,
        }
    }

    fn fetching(cached: Option<Arc<T>>, initial: Option<Arc<T>>) -> Self {
        let has_data = cached.is_some();
        Self {
            data: cached.or(initial),
            status: if has_data {
                QueryStatus::Success
            } else {
                QueryStatus::Pending
            },
            is_loading: !has_data,
            is_fetching: true,
            is_error: false,
            error: None,
        }
    }

    fn success(data: Arc<T>) -> Self {
        Self {
            data: Some(data),
            status: QueryStatus::Success,
            is_loading: false,
            is_fetching: false,
            is_error: false,
            error: None,
        }
    }

    /// Cached data on screen while a background refetch runs.
    fn refreshing(data: Arc<T>) -> Self {
        Self {
            is_fetching: true,
            ..Self::success(data)
        }
    }

    /// Invalid input leaves the query idle, with no error to show.
    fn failed(error: LectioError, initial: Option<Arc<T>>) -> Self {
        let status = match error.kind() {
            ErrorKind::Validation => return Self::idle(initial),
            ErrorKind::NotFound => QueryStatus::NotFound,
            ErrorKind::Query | ErrorKind::PartialPrefetch => QueryStatus::Error,
        };
        Self {
            data: initial,
            status,
            is_loading: false,
            is_fetching: false,
            is_error: true,
            error: Some(error),
        }
    }
}

struct Binding<I> {
    input: I,
    key: QueryKey,
}

struct Observer<I, T> {
    cache: QueryCache,
    def: QueryDef<I, T>,
    initial: Option<Arc<T>>,
    binding: Mutex<Option<Binding<I>>>,
    state: watch::Sender<QueryState<T>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl<I, T> Drop for Observer<I, T> {
    fn drop(&mut self) {
        let listener = self.listener.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = listener.take() {
            handle.abort();
        }
    }
}

impl<I: QueryInput, T: Send + Sync + 'static> Observer<I, T> {
    fn binding(&self) -> MutexGuard<'_, Option<Binding<I>>> {
        self.binding.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn current(&self) -> Option<(QueryKey, I)> {
        self.binding()
            .as_ref()
            .map(|b| (b.key.clone(), b.input.clone()))
    }

    fn is_current(&self, key: &QueryKey) -> bool {
        self.binding().as_ref().map(|b| &b.key == key).unwrap_or(false)
    }

    fn publish(&self, state: QueryState<T>) {
        self.state.send_replace(state);
    }

    fn start(self: &Arc<Self>, key: QueryKey, input: I, force: bool) {
        let cached = self.cache.get_query_data::<T>(&key);
        self.publish(QueryState::fetching(cached, self.initial.clone()));

        let observer = self.clone();
        tokio::spawn(async move { observer.run(key, input, force).await });
    }

    fn fail(&self, key: &QueryKey, error: LectioError) {
        if error.kind() == ErrorKind::Validation {
            tracing::debug!("Query {} stopped on invalid input: {}", key, error);
        }
        self.publish(QueryState::failed(error, self.initial.clone()));
    }

    fn discard(&self, key: &QueryKey) -> bool {
        if self.is_current(key) {
            return false;
        }
        tracing::debug!("Discarding result for {}, key is no longer current", key);
        true
    }

    async fn run(self: Arc<Self>, key: QueryKey, input: I, force: bool) {
        let def = self.def.clone();
        let load = move || def.load(input);
        let result = if force {
            self.cache
                .refresh(&key, self.def.options(), load)
                .await
                .map(|data| (data, None))
        } else {
            self.cache
                .fetch_revalidating(&key, self.def.options(), load)
                .await
        };

        if self.discard(&key) {
            return;
        }
        let refresh = match result {
            Ok((data, None)) => return self.publish(QueryState::success(data)),
            Ok((data, Some(refresh))) => {
                self.publish(QueryState::refreshing(data));
                refresh
            }
            Err(error) => return self.fail(&key, error),
        };

        let result = refresh.wait().await;
        if self.discard(&key) {
            return;
        }
        match result {
            Ok(data) => self.publish(QueryState::success(data)),
            Err(error) => self.fail(&key, error),
        }
    }

    fn on_event(self: &Arc<Self>, event: CacheEvent) {
        let Some((key, input)) = self.current() else {
            return;
        };
        // a fetch of our own will publish its result
        if event.key() != &key || self.state.borrow().is_fetching {
            return;
        }

        match event {
            CacheEvent::Updated(_) => {
                if let Some(data) = self.cache.get_query_data::<T>(&key) {
                    self.publish(QueryState::success(data));
                }
            }
            CacheEvent::Failed { error, .. } => self.fail(&key, error),
            CacheEvent::Invalidated(_) => self.start(key, input, false),
            CacheEvent::Evicted(_) => {}
        }
    }

    fn ensure_listener(self: &Arc<Self>) {
        let mut listener = self.listener.lock().unwrap_or_else(|e| e.into_inner());
        if listener.is_some() {
            return;
        }

        let mut events = self.cache.subscribe();
        let observer: Weak<Self> = Arc::downgrade(self);
        *listener = Some(tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("Query observer skipped {} cache events", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(observer) = observer.upgrade() else {
                    break;
                };
                observer.on_event(event);
            }
        }));
    }
}

/// A live view of one query whose input may change over time.
///
/// Must be driven from within a tokio runtime.
pub struct Query<I, T> {
    observer: Arc<Observer<I, T>>,
}

impl<I, T> Clone for Query<I, T> {
    fn clone(&self) -> Self {
        Self {
            observer: self.observer.clone(),
        }
    }
}

impl<I: QueryInput, T: Send + Sync + 'static> Query<I, T> {
    pub fn new(cache: QueryCache, def: QueryDef<I, T>) -> Self {
        Self::build(cache, def, None)
    }

    /// Data reported while disabled or after an error.
    pub fn with_initial_data(cache: QueryCache, def: QueryDef<I, T>, initial: T) -> Self {
        Self::build(cache, def, Some(Arc::new(initial)))
    }

    fn build(cache: QueryCache, def: QueryDef<I, T>, initial: Option<Arc<T>>) -> Self {
        let (state, _) = watch::channel(QueryState::idle(initial.clone()));
        Self {
            observer: Arc::new(Observer {
                cache,
                def,
                initial,
                binding: Mutex::new(None),
                state,
                listener: Mutex::new(None),
            }),
        }
    }

    /// Point the query at a new input.
    ///
    /// `None`, or an input that is not ready, disables it. A ready input with
    /// a different key starts a fetch; the same key is a no-op.
    pub fn set_input(&self, input: Option<I>) {
        let Some(input) = input.filter(|i| i.is_ready()) else {
            *self.observer.binding() = None;
            self.observer
                .publish(QueryState::idle(self.observer.initial.clone()));
            return;
        };

        let key = self.observer.def.key(&input);
        {
            let mut binding = self.observer.binding();
            if binding.as_ref().map(|b| b.key == key).unwrap_or(false) {
                return;
            }
            *binding = Some(Binding {
                input: input.clone(),
                key: key.clone(),
            });
        }

        self.observer.ensure_listener();
        self.observer.start(key, input, false);
    }

    /// Fetch again regardless of freshness. No-op while disabled.
    pub fn refetch(&self) {
        if let Some((key, input)) = self.observer.current() {
            self.observer.start(key, input, true);
        }
    }

    pub fn key(&self) -> Option<QueryKey> {
        self.observer.current().map(|(key, _)| key)
    }

    pub fn is_enabled(&self) -> bool {
        self.observer.current().is_some()
    }

    pub fn state(&self) -> QueryState<T> {
        self.observer.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<QueryState<T>> {
        self.observer.state.subscribe()
    }

    /// Wait until no fetch is running for this query, then return its state.
    pub async fn settled(&self) -> QueryState<T> {
        let mut changes = self.subscribe();
        let state = match changes.wait_for(|s| !s.is_fetching).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        };
        state
    }
}
