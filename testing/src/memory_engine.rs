//! In-memory cache engine.
//!
//! A small, deterministic stand-in for a stale-while-revalidate engine:
//! - a query with fresh cached data returns it without fetching,
//! - a query with no data (or stale data) fetches and stores the result,
//! - a failing fetch keeps the previous data and records the error,
//! - revalidation re-runs the last fetcher registered for each key,
//! - every fetch is counted per key for assertions.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

use api_swr_core::cache_key::CacheKey;
use api_swr_core::config::EngineConfig;
use api_swr_core::engine::{
    CacheEngine, EngineResponse, MutateOptions, MutateTarget, Mutation, PageFetcher, PageKeyFn,
    PagesResponse, QueryFetcher,
};
use api_swr_core::error::FetchError;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// One call to [`CacheEngine::mutate`], as observed by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    /// Keys the mutation applied to.
    pub matched: Vec<CacheKey>,
    /// The mutation.
    pub mutation: Mutation,
    /// The options.
    pub options: MutateOptions,
}

#[derive(Debug, Clone)]
struct Entry {
    key: CacheKey,
    data: Option<Value>,
    error: Option<FetchError>,
    stale: bool,
}

impl Entry {
    const fn new(key: CacheKey) -> Self {
        Self {
            key,
            data: None,
            error: None,
            stale: false,
        }
    }
}

#[derive(Default)]
struct EngineState {
    entries: HashMap<String, Entry>,
    fetchers: HashMap<String, QueryFetcher>,
    fetch_counts: HashMap<String, usize>,
    mutations: Vec<MutationRecord>,
}

/// In-memory [`CacheEngine`] for fast, deterministic tests.
///
/// Entries are indexed by [`CacheKey::serialized`]. Honors one engine config
/// entry: `revalidateOnMount: true` forces a fetch even when fresh data is
/// cached.
///
/// # Example
///
/// ```ignore
/// use api_swr_testing::InMemoryCacheEngine;
/// use std::sync::Arc;
///
/// let engine = Arc::new(InMemoryCacheEngine::new());
/// let factory = ControllerFactory::builder(engine.clone()).build();
/// // ... drive queries ...
/// assert_eq!(engine.fetch_count("users.getUser.42"), 1);
/// ```
#[derive(Clone, Default)]
pub struct InMemoryCacheEngine {
    state: Arc<Mutex<EngineState>>,
}

impl InMemoryCacheEngine {
    /// Create an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a cached value.
    pub fn seed(&self, key: impl Into<CacheKey>, data: Value) {
        let key = key.into();
        let mut state = self.state.lock().unwrap();
        let entry = state
            .entries
            .entry(key.serialized())
            .or_insert_with(|| Entry::new(key));
        entry.data = Some(data);
        entry.error = None;
    }

    /// Cached data for a serialized key.
    #[must_use]
    pub fn data(&self, key: &str) -> Option<Value> {
        self.state
            .lock()
            .unwrap()
            .entries
            .get(key)
            .and_then(|entry| entry.data.clone())
    }

    /// Recorded error for a serialized key.
    #[must_use]
    pub fn error(&self, key: &str) -> Option<FetchError> {
        self.state
            .lock()
            .unwrap()
            .entries
            .get(key)
            .and_then(|entry| entry.error.clone())
    }

    /// Number of fetches run for a serialized key.
    #[must_use]
    pub fn fetch_count(&self, key: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .fetch_counts
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Number of fetches run for all keys.
    #[must_use]
    pub fn total_fetches(&self) -> usize {
        self.state.lock().unwrap().fetch_counts.values().sum()
    }

    /// Every mutation applied so far.
    #[must_use]
    pub fn mutations(&self) -> Vec<MutationRecord> {
        self.state.lock().unwrap().mutations.clone()
    }

    /// Whether an entry exists for a serialized key.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.state.lock().unwrap().entries.contains_key(key)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    /// Whether the engine holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap().entries.is_empty()
    }

    /// Drop everything (for test isolation).
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        *state = EngineState::default();
    }

    /// Fresh cached data for `id`, registering `fetcher` for revalidation.
    fn register(&self, id: &str, fetcher: &QueryFetcher) -> Option<Value> {
        let mut state = self.state.lock().unwrap();
        state.fetchers.insert(id.to_string(), Arc::clone(fetcher));
        state
            .entries
            .get(id)
            .filter(|entry| !entry.stale)
            .and_then(|entry| entry.data.clone())
    }

    async fn run_fetch(&self, key: &CacheKey, fetcher: &QueryFetcher) -> EngineResponse {
        let id = key.serialized();
        *self
            .state
            .lock()
            .unwrap()
            .fetch_counts
            .entry(id.clone())
            .or_insert(0) += 1;

        let result = fetcher(key.clone()).await;

        let mut state = self.state.lock().unwrap();
        let entry = state
            .entries
            .entry(id)
            .or_insert_with(|| Entry::new(key.clone()));
        entry.stale = false;
        match result {
            Ok(data) => {
                entry.data = Some(data);
                entry.error = None;
            }
            Err(error) => {
                tracing::debug!(key = %key, %error, "fetch failed, keeping cached data");
                entry.error = Some(error);
            }
        }

        EngineResponse {
            data: entry.data.clone(),
            error: entry.error.clone(),
            is_loading: false,
            is_validating: false,
        }
    }
}

impl std::fmt::Debug for InMemoryCacheEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        let mut keys: Vec<&String> = state.entries.keys().collect();
        keys.sort();
        f.debug_struct("InMemoryCacheEngine")
            .field("keys", &keys)
            .finish_non_exhaustive()
    }
}

impl CacheEngine for InMemoryCacheEngine {
    fn query(
        &self,
        key: Option<CacheKey>,
        fetcher: QueryFetcher,
        config: EngineConfig,
    ) -> Pin<Box<dyn Future<Output = EngineResponse> + Send + '_>> {
        Box::pin(async move {
            let Some(key) = key else {
                return EngineResponse::default();
            };

            let cached = self.register(&key.serialized(), &fetcher);
            let revalidate_on_mount = config
                .get("revalidateOnMount")
                .and_then(Value::as_bool)
                .unwrap_or(false);

            match cached {
                Some(data) if !revalidate_on_mount => EngineResponse {
                    data: Some(data),
                    ..EngineResponse::default()
                },
                _ => self.run_fetch(&key, &fetcher).await,
            }
        })
    }

    fn query_pages(
        &self,
        key_fn: PageKeyFn,
        fetcher: PageFetcher,
        size: usize,
        _config: EngineConfig,
    ) -> Pin<Box<dyn Future<Output = PagesResponse> + Send + '_>> {
        Box::pin(async move {
            let mut pages: Vec<Value> = Vec::new();
            let mut error = None;

            for index in 0..size {
                let Some(page) = key_fn(index, pages.last()) else {
                    break;
                };
                let key = page.to_cache_key();
                let page_fetcher: QueryFetcher = {
                    let fetcher = Arc::clone(&fetcher);
                    Arc::new(move |_key: CacheKey| fetcher(page.clone()))
                };

                let response = match self.register(&key.serialized(), &page_fetcher) {
                    Some(data) => EngineResponse {
                        data: Some(data),
                        ..EngineResponse::default()
                    },
                    None => self.run_fetch(&key, &page_fetcher).await,
                };

                if let Some(data) = response.data {
                    pages.push(data);
                }
                if response.error.is_some() {
                    error = response.error;
                    break;
                }
            }

            PagesResponse {
                pages,
                size,
                error,
                is_loading: false,
                is_validating: false,
            }
        })
    }

    fn mutate(
        &self,
        target: MutateTarget,
        mutation: Mutation,
        options: MutateOptions,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let fetchers: Vec<(CacheKey, QueryFetcher)> = {
                let mut state = self.state.lock().unwrap();
                let matched: Vec<CacheKey> = match &target {
                    MutateTarget::Key(key) => vec![key.clone()],
                    MutateTarget::Matcher(_) => state
                        .entries
                        .values()
                        .map(|entry| entry.key.clone())
                        .filter(|key| target.matches(key))
                        .collect(),
                };

                for key in &matched {
                    let id = key.serialized();
                    match &mutation {
                        Mutation::Replace(data) => {
                            let entry = state
                                .entries
                                .entry(id)
                                .or_insert_with(|| Entry::new(key.clone()));
                            entry.data.clone_from(data);
                            entry.error = None;
                        }
                        Mutation::Revalidate => {
                            if let Some(entry) = state.entries.get_mut(&id) {
                                entry.stale = true;
                            }
                        }
                    }
                }

                let refetch = matches!(mutation, Mutation::Revalidate) || options.revalidate;
                let fetchers = if refetch {
                    matched
                        .iter()
                        .filter_map(|key| {
                            state
                                .fetchers
                                .get(&key.serialized())
                                .map(|fetcher| (key.clone(), Arc::clone(fetcher)))
                        })
                        .collect()
                } else {
                    Vec::new()
                };

                state.mutations.push(MutationRecord {
                    matched,
                    mutation,
                    options,
                });
                fetchers
            };

            for (key, fetcher) in fetchers {
                self.run_fetch(&key, &fetcher).await;
            }
        })
    }

    fn keys(&self) -> Vec<CacheKey> {
        let state = self.state.lock().unwrap();
        let mut keys: Vec<CacheKey> = state.entries.values().map(|entry| entry.key.clone()).collect();
        keys.sort_by_key(CacheKey::serialized);
        keys
    }
}
