//! Query binder.
//!
//! A [`QueryHandle`] resolves a cache key from its configuration and hands it
//! to the cache engine together with a fetcher that drives the handle's
//! [`FetchOrchestrator`]. An unresolved key, or `wait_for(false)`, suspends
//! the query: the engine receives no key and never calls the fetcher.

use crate::endpoint::EndpointContext;
use crate::orchestrator::{FetchOrchestrator, RequestState};
use api_swr_core::Params;
use api_swr_core::cache_key::{CacheKey, CacheKeySpec, resolve};
use api_swr_core::config::{CallSiteConfig, EngineConfig, FetchConfig, combine, merge_engine_config};
use api_swr_core::engine::{MutateOptions, MutateTarget, Mutation, QueryFetcher};
use api_swr_core::error::FetchError;
use api_swr_core::hooks::{FetchWrapper, RequestMode};
use api_swr_core::memo::{ContentMemo, Fingerprint};
use futures::FutureExt;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Call-site configuration of a query.
#[derive(Clone, Default)]
#[must_use]
pub struct QueryConfig {
    /// How the cache key is derived from `params`.
    pub cache_key: Option<CacheKeySpec>,
    /// Params every fetch is made with.
    pub params: Option<Params>,
    /// Call-site fetch config layer.
    pub fetch_config: Option<FetchConfig>,
    /// Call-site fetch wrapper.
    pub fetch_wrapper: Option<FetchWrapper>,
    /// Engine config layered over the global one.
    pub swr_config: Option<EngineConfig>,
    /// Overrides the factory mocking switch.
    pub enable_mocking: Option<bool>,
    /// `Some(false)` suspends the query.
    pub wait_for: Option<bool>,
}

impl QueryConfig {
    /// Empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache key spec.
    pub fn cache_key(mut self, spec: impl Into<CacheKeySpec>) -> Self {
        self.cache_key = Some(spec.into());
        self
    }

    /// Set the params.
    pub fn params(mut self, params: Params) -> Self {
        self.params = Some(params);
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
            .map(config.params.as_ref())
            .map(config.fetch_config.as_ref().map(FetchConfig::as_map))
            .pointer(config.fetch_wrapper.as_ref())
            .map(config.swr_config.as_ref().map(EngineConfig::as_map))
            .field(&config.enable_mocking)
            .field(&config.wait_for)
            .finish()
    }
}

impl CallSiteConfig for QueryConfig {
    fn fetch_config(&self) -> Option<&FetchConfig> {
        self.fetch_config.as_ref()
    }

    fn set_fetch_config(&mut self, config: FetchConfig) {
        self.fetch_config = Some(config);
    }
}

impl fmt::Debug for QueryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryConfig")
            .field("cache_key", &self.cache_key)
            .field("params", &self.params)
            .field("fetch_config", &self.fetch_config)
            .field("fetch_wrapper", &self.fetch_wrapper.is_some())
            .field("swr_config", &self.swr_config)
            .field("enable_mocking", &self.enable_mocking)
            .field("wait_for", &self.wait_for)
            .finish()
    }
}

/// Result of [`QueryHandle::load`].
#[derive(Debug, Clone)]
pub struct QueryResponse<R> {
    /// Data held by the engine for the key.
    pub data: Option<Value>,
    /// The orchestrator's error. The engine's own error is not surfaced.
    pub error: Option<FetchError>,
    /// No data yet and a fetch is running.
    pub is_loading: bool,
    /// A fetch is running.
    pub is_validating: bool,
    /// Return value of the processing hook after the last settlement.
    pub processing_response: Option<R>,
}

/// A bound query.
///
/// Create one with [`EndpointTools::use_query`](crate::EndpointTools::use_query)
/// and call [`rerender`](Self::rerender) with the latest configuration
/// whenever the call site is re-evaluated.
pub struct QueryHandle<R = ()> {
    context: Arc<EndpointContext<R>>,
    orchestrator: FetchOrchestrator<R>,
    key: Option<String>,
    engine_config: EngineConfig,
    memo: ContentMemo,
}

impl<R> fmt::Debug for QueryHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryHandle")
            .field("endpoint_id", &self.context.identity.endpoint_id())
            .field("key", &self.key)
            .field("engine_config", &self.engine_config)
            .finish_non_exhaustive()
    }
}

impl<R: Clone + Send + Sync + 'static> QueryHandle<R> {
    pub(crate) fn new(context: Arc<EndpointContext<R>>, config: Option<QueryConfig>) -> Self {
        let orchestrator = FetchOrchestrator::new(
            context.identity.endpoint_id(),
            RequestMode::Query,
            context.processing(),
            context.bindings(None, None, None, None),
        );
        let mut handle = Self {
            context,
            orchestrator,
            key: None,
            engine_config: EngineConfig::new(),
            memo: ContentMemo::new(),
        };
        handle.rerender(config);
        handle
    }

    /// Apply the call site's latest configuration.
    ///
    /// Nothing is re-derived when the configuration has the same content as
    /// the previous one. Returns whether anything was re-derived. Request
    /// state survives either way.
    pub fn rerender(&mut self, config: Option<QueryConfig>) -> bool {
        if !self.memo.update(QueryConfig::fingerprint(config.as_ref())) {
            return false;
        }

        let combined = combine(config.as_ref(), &self.context.layers()).unwrap_or_default();
        let endpoint_id = self.context.identity.endpoint_id();

        self.key = match combined.wait_for {
            Some(false) => None,
            _ => resolve(endpoint_id, combined.cache_key.as_ref(), combined.params.as_ref()),
        };
        self.engine_config = merge_engine_config(self.context.swr_config(), combined.swr_config.as_ref());
        self.orchestrator.rebind(self.context.bindings(
            combined.enable_mocking,
            combined.params,
            combined.fetch_config,
            combined.fetch_wrapper,
        ));

        tracing::debug!(endpoint_id, key = ?self.key, "query inputs changed");
        true
    }

    /// The resolved cache key, or `None` while suspended.
    #[must_use]
    pub fn cache_key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Whether the engine is given no key.
    #[must_use]
    pub const fn is_suspended(&self) -> bool {
        self.key.is_none()
    }

    /// Read the query through the engine, fetching if the engine decides to.
    pub async fn load(&self) -> QueryResponse<R> {
        let orchestrator = self.orchestrator.clone();
        let fetcher: QueryFetcher = Arc::new(move |_key: CacheKey| {
            let orchestrator = orchestrator.clone();
            async move { orchestrator.run(None).await }.boxed()
        });

        let response = self
            .context
            .engine()
            .query(self.key.clone().map(CacheKey::Text), fetcher, self.engine_config.clone())
            .await;
        let state = self.orchestrator.state();

        QueryResponse {
            data: response.data,
            error: state.error,
            is_loading: response.is_loading,
            is_validating: response.is_validating,
            processing_response: state.processing_response,
        }
    }

    /// Apply `mutation` to this query's key. Returns `false` while
    /// suspended.
    pub async fn mutate(&self, mutation: Mutation, options: MutateOptions) -> bool {
        let Some(key) = &self.key else {
            return false;
        };
        self.context
            .engine()
            .mutate(MutateTarget::Key(CacheKey::Text(key.clone())), mutation, options)
            .await;
        true
    }

    /// Re-run the fetcher for this query's key. Returns `false` while
    /// suspended.
    pub async fn revalidate(&self) -> bool {
        self.mutate(Mutation::Revalidate, MutateOptions::default()).await
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
