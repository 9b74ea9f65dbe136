//! Infinite (paged) query binder.
//!
//! Each page gets its own key, derived from the page index and the previous
//! page's data through the configured page-params function. The key is paired
//! with the params that produced it, so the fetcher dispatches with exactly
//! those params. Pages come back as an ordered list; merging them into one
//! collection is left to the caller.

use crate::endpoint::EndpointContext;
use crate::orchestrator::{FetchOrchestrator, RequestState};
use api_swr_core::Params;
use api_swr_core::cache_key::{CacheKey, CacheKeySpec, KeyMatcher, resolve};
use api_swr_core::config::{CallSiteConfig, EngineConfig, FetchConfig, combine, merge_engine_config};
use api_swr_core::engine::{MutateOptions, MutateTarget, Mutation, PageFetcher, PageKey, PageKeyFn};
use api_swr_core::error::FetchError;
use api_swr_core::hooks::{FetchWrapper, RequestMode};
use api_swr_core::memo::{ContentMemo, Fingerprint};
use futures::FutureExt;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;

/// Engine config entry holding the initial page count.
pub const INITIAL_SIZE: &str = "initialSize";

/// Params of page `index`, given the previous page's data.
pub type PageParamsFn = Arc<dyn Fn(usize, Option<&Value>) -> Option<Params> + Send + Sync>;

/// Call-site configuration of an infinite query.
#[derive(Clone, Default)]
#[must_use]
pub struct InfiniteQueryConfig {
    /// How each page key is derived from that page's params.
    pub cache_key: Option<CacheKeySpec>,
    /// Params of each page.
    pub page_params: Option<PageParamsFn>,
    /// Call-site fetch config layer.
    pub fetch_config: Option<FetchConfig>,
    /// Call-site fetch wrapper.
    pub fetch_wrapper: Option<FetchWrapper>,
    /// Engine config layered over the global infinite one.
    pub swr_config: Option<EngineConfig>,
    /// Overrides the factory mocking switch.
    pub enable_mocking: Option<bool>,
    /// `Some(false)` suspends every page.
    pub wait_for: Option<bool>,
}

impl InfiniteQueryConfig {
    /// Empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache key spec.
    pub fn cache_key(mut self, spec: impl Into<CacheKeySpec>) -> Self {
        self.cache_key = Some(spec.into());
        self
    }

    /// Set the page params function.
    pub fn page_params<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, Option<&Value>) -> Option<Params> + Send + Sync + 'static,
    {
        self.page_params = Some(Arc::new(f));
        self
    }

    /// Set the fetch config.
    pub fn fetch_config(mut self, config: FetchConfig) -> Self {
        self.fetch_config = Some(config);
        self
    }

    /// Set the fetch wrapper.
    pub fn fetch_wrapper(mut self, wrapper: FetchWrapper) -> Self {
        self.fetch_wrapper = Some(wrapper);
        self
    }

    /// Set the engine config.
    pub fn swr_config(mut self, config: EngineConfig) -> Self {
        self.swr_config = Some(config);
        self
    }

    /// Override mocking for this query.
    pub const fn enable_mocking(mut self, enabled: bool) -> Self {
        self.enable_mocking = Some(enabled);
        self
    }

    /// Gate the query on `ready`.
    pub const fn wait_for(mut self, ready: bool) -> Self {
        self.wait_for = Some(ready);
        self
    }

    fn fingerprint(config: Option<&Self>) -> u64 {
        let Some(config) = config else {
            return Fingerprint::new().field(&0u8).finish();
        };
        Fingerprint::new()
            .field(&1u8)
            .field(&config.cache_key.as_ref().map(CacheKeySpec::content_id))
            .pointer(config.page_params.as_ref())
            .map(config.fetch_config.as_ref().map(FetchConfig::as_map))
            .pointer(config.fetch_wrapper.as_ref())
            .map(config.swr_config.as_ref().map(EngineConfig::as_map))
            .field(&config.enable_mocking)
            .field(&config.wait_for)
            .finish()
    }
}

impl CallSiteConfig for InfiniteQueryConfig {
    fn fetch_config(&self) -> Option<&FetchConfig> {
        self.fetch_config.as_ref()
    }

    fn set_fetch_config(&mut self, config: FetchConfig) {
        self.fetch_config = Some(config);
    }
}

impl fmt::Debug for InfiniteQueryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfiniteQueryConfig")
            .field("cache_key", &self.cache_key)
            .field("page_params", &self.page_params.is_some())
            .field("fetch_config", &self.fetch_config)
            .field("fetch_wrapper", &self.fetch_wrapper.is_some())
            .field("swr_config", &self.swr_config)
            .field("enable_mocking", &self.enable_mocking)
            .field("wait_for", &self.wait_for)
            .finish()
    }
}

/// Result of [`InfiniteQueryHandle::load`].
#[derive(Debug, Clone)]
pub struct InfiniteQueryResponse<R> {
    /// Loaded pages, in page order.
    pub pages: Vec<Value>,
    /// Requested page count.
    pub size: usize,
    /// The orchestrator's error. The engine's own error is not surfaced.
    pub error: Option<FetchError>,
    /// No pages yet and a fetch is running.
    pub is_loading: bool,
    /// A fetch is running.
    pub is_validating: bool,
    /// Return value of the processing hook after the last settlement.
    pub processing_response: Option<R>,
}

/// A bound infinite query.
pub struct InfiniteQueryHandle<R = ()> {
    context: Arc<EndpointContext<R>>,
    orchestrator: FetchOrchestrator<R>,
    key_fn: PageKeyFn,
    engine_config: EngineConfig,
    size: AtomicUsize,
    memo: ContentMemo,
}

impl<R> fmt::Debug for InfiniteQueryHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfiniteQueryHandle")
            .field("endpoint_id", &self.context.identity.endpoint_id())
            .field("size", &self.size.load(Ordering::SeqCst))
            .field("engine_config", &self.engine_config)
            .finish_non_exhaustive()
    }
}

impl<R: Clone + Send + Sync + 'static> InfiniteQueryHandle<R> {
    pub(crate) fn new(context: Arc<EndpointContext<R>>, config: Option<InfiniteQueryConfig>) -> Self {
        let orchestrator = FetchOrchestrator::new(
            context.identity.endpoint_id(),
            RequestMode::Query,
            context.processing(),
            context.bindings(None, None, None, None),
        );
        let mut handle = Self {
            context,
            orchestrator,
            key_fn: suspended(),
            engine_config: EngineConfig::new(),
            size: AtomicUsize::new(1),
            memo: ContentMemo::new(),
        };
        handle.rerender(config);
        handle.size.store(initial_size(&handle.engine_config), Ordering::SeqCst);
        handle
    }

    /// Apply the call site's latest configuration. Returns whether anything
    /// was re-derived. The page count survives either way.
    pub fn rerender(&mut self, config: Option<InfiniteQueryConfig>) -> bool {
        if !self.memo.update(InfiniteQueryConfig::fingerprint(config.as_ref())) {
            return false;
        }

        let combined = combine(config.as_ref(), &self.context.layers()).unwrap_or_default();
        self.key_fn = page_key_fn(
            self.context.identity.endpoint_id(),
            combined.cache_key,
            combined.page_params,
            combined.wait_for == Some(false),
        );
        self.engine_config =
            merge_engine_config(self.context.swr_infinite_config(), combined.swr_config.as_ref());
        self.orchestrator.rebind(self.context.bindings(
            combined.enable_mocking,
            None,
            combined.fetch_config,
            combined.fetch_wrapper,
        ));

        tracing::debug!(endpoint_id = %self.context.identity, "infinite query inputs changed");
        true
    }

    /// Key of page `index` given the previous page, or `None` if paging
    /// stops there.
    #[must_use]
    pub fn page_key(&self, index: usize, previous: Option<&Value>) -> Option<PageKey> {
        (self.key_fn)(index, previous)
    }

    /// Requested page count.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    /// Request `size` pages on the next load.
    pub fn set_size(&self, size: usize) {
        self.size.store(size, Ordering::SeqCst);
    }

    /// Load the requested pages through the engine.
    pub async fn load(&self) -> InfiniteQueryResponse<R> {
        let orchestrator = self.orchestrator.clone();
        let fetcher: PageFetcher = Arc::new(move |page: PageKey| {
            let orchestrator = orchestrator.clone();
            async move { orchestrator.run(page.params).await }.boxed()
        });

        let response = self
            .context
            .engine()
            .query_pages(Arc::clone(&self.key_fn), fetcher, self.size(), self.engine_config.clone())
            .await;
        let state = self.orchestrator.state();

        InfiniteQueryResponse {
            pages: response.pages,
            size: response.size,
            error: state.error,
            is_loading: response.is_loading,
            is_validating: response.is_validating,
            processing_response: state.processing_response,
        }
    }

    /// Re-run the fetchers of every loaded page of this endpoint.
    pub async fn revalidate(&self) {
        let matcher = KeyMatcher::new(self.context.identity.endpoint_id());
        let target = MutateTarget::Matcher(Arc::new(move |key: &CacheKey| match key {
            CacheKey::Composite(parts) => parts
                .first()
                .and_then(Value::as_str)
                .is_some_and(|head| matcher.matches_str(head)),
            CacheKey::Text(_) => false,
        }));
        self.context
            .engine()
            .mutate(target, Mutation::Revalidate, MutateOptions::default())
            .await;
    }

    /// Snapshot of the request state.
    #[must_use]
    pub fn state(&self) -> RequestState<R> {
        self.orchestrator.state()
    }

    /// Receiver notified on every request state transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RequestState<R>> {
        self.orchestrator.subscribe()
    }
}

fn initial_size(config: &EngineConfig) -> usize {
    config
        .get(INITIAL_SIZE)
        .and_then(Value::as_u64)
        .and_then(|size| usize::try_from(size).ok())
        .unwrap_or(1)
}

fn suspended() -> PageKeyFn {
    Arc::new(|_: usize, _: Option<&Value>| -> Option<PageKey> { None })
}

fn page_key_fn(
    endpoint_id: &str,
    spec: Option<CacheKeySpec>,
    page_params: Option<PageParamsFn>,
    wait: bool,
) -> PageKeyFn {
    if wait {
        return suspended();
    }
    let endpoint_id = endpoint_id.to_string();
    Arc::new(move |index: usize, previous: Option<&Value>| {
        let params = page_params.as_ref().and_then(|f| f(index, previous));
        resolve(&endpoint_id, spec.as_ref(), params.as_ref()).map(|key| PageKey { key, params })
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code: endpoint lookups on fixed fixtures
mod tests {
    use super::*;
    use crate::ControllerFactory;
    use crate::controller::Controller;
    use api_swr_core::client::ClientMap;
    use api_swr_testing::{CallRecorder, InMemoryCacheEngine};
    use serde_json::json;

    fn page(n: usize) -> Option<Params> {
        json!({ "page": n }).as_object().cloned()
    }

    fn setup(recorder: &CallRecorder, global: Option<EngineConfig>) -> (Arc<InMemoryCacheEngine>, Controller) {
        let engine = Arc::new(InMemoryCacheEngine::new());
        let mut builder = ControllerFactory::builder(engine.clone());
        if let Some(global) = global {
            builder = builder.swr_infinite_config(global);
        }
        let controller = builder
            .build()
            .create_controller("posts", ClientMap::new().with("list", recorder.remote_fn()), None);
        (engine, controller)
    }

    fn paged() -> InfiniteQueryConfig {
        InfiniteQueryConfig::new()
            .cache_key("page")
            .page_params(|index, _previous| page(index + 1))
    }

    #[tokio::test]
    async fn test_pages_load_in_order() {
        let recorder = CallRecorder::echoing();
        let (engine, controller) = setup(&recorder, None);
        let handle = controller.endpoint("list").map(|t| t.use_infinite_query(Some(paged()))).unwrap();

        assert_eq!(handle.size(), 1);
        handle.set_size(3);
        let response = handle.load().await;

        assert_eq!(response.pages, vec![json!({ "page": 1 }), json!({ "page": 2 }), json!({ "page": 3 })]);
        assert_eq!(response.size, 3);
        assert_eq!(engine.total_fetches(), 3);
        assert!(engine.contains_key(&CacheKey::Composite(vec![json!("posts.list.2"), json!({ "page": 2 })]).serialized()));
    }

    #[tokio::test]
    async fn test_unresolved_page_key_stops_paging() {
        let recorder = CallRecorder::echoing();
        let (_engine, controller) = setup(&recorder, None);
        let config = InfiniteQueryConfig::new()
            .cache_key("cursor")
            .page_params(|_index, previous| {
                let cursor = match previous {
                    None => json!("a"),
                    Some(prev) if prev.get("cursor") == Some(&json!("a")) => json!("b"),
                    Some(_) => json!(""),
                };
                json!({ "cursor": cursor }).as_object().cloned()
            });
        let handle = controller.endpoint("list").map(|t| t.use_infinite_query(Some(config))).unwrap();

        handle.set_size(5);
        let response = handle.load().await;

        assert_eq!(response.pages, vec![json!({ "cursor": "a" }), json!({ "cursor": "b" })]);
        assert_eq!(recorder.call_count(), 2);
    }

    #[tokio::test]
    async fn test_wait_for_false_suspends_pages() {
        let recorder = CallRecorder::echoing();
        let (engine, controller) = setup(&recorder, None);
        let handle = controller
            .endpoint("list")
            .map(|t| t.use_infinite_query(Some(paged().wait_for(false))))
            .unwrap();

        let response = handle.load().await;
        assert!(response.pages.is_empty());
        assert!(handle.page_key(0, None).is_none());
        assert_eq!(engine.total_fetches(), 0);
    }

    #[tokio::test]
    async fn test_initial_size_from_engine_config() {
        let recorder = CallRecorder::echoing();
        let (_engine, controller) = setup(&recorder, Some(EngineConfig::new().with(INITIAL_SIZE, 2)));
        let handle = controller.endpoint("list").map(|t| t.use_infinite_query(Some(paged()))).unwrap();

        assert_eq!(handle.size(), 2);
        assert_eq!(handle.load().await.pages.len(), 2);
    }

    #[tokio::test]
    async fn test_failing_page_surfaces_orchestrator_error() {
        let recorder = CallRecorder::failing("page failed");
        let (_engine, controller) = setup(&recorder, None);
        let handle = controller.endpoint("list").map(|t| t.use_infinite_query(Some(paged()))).unwrap();

        let response = handle.load().await;
        assert!(response.pages.is_empty());
        assert_eq!(response.error.map(|e| e.to_string()).as_deref(), Some("page failed"));
    }

    #[tokio::test]
    async fn test_revalidate_refetches_loaded_pages() {
        let recorder = CallRecorder::echoing();
        let (engine, controller) = setup(&recorder, None);
        let handle = controller.endpoint("list").map(|t| t.use_infinite_query(Some(paged()))).unwrap();

        handle.set_size(2);
        handle.load().await;
        handle.revalidate().await;

        assert_eq!(engine.total_fetches(), 4);
    }
}
