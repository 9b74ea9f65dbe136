//! Per-endpoint tools.
//!
//! Every endpoint of a controller gets one [`EndpointTools`] record: its
//! identity, cache-key helpers, an imperative `fetch`, and the three binders
//! (`use_query`, `use_infinite_query`, `use_mutation`). All of them share one
//! dispatcher that routes to the registered mock when mocking is on and
//! unwraps response envelopes on every call.

use crate::controller::FactorySetup;
use crate::infinite::{InfiniteQueryConfig, InfiniteQueryHandle};
use crate::metrics;
use crate::mock::MockRegistry;
use crate::mutation::{MutationConfig, MutationHandle};
use crate::orchestrator::FetchBindings;
use crate::query::{QueryConfig, QueryHandle};
use api_swr_core::Params;
use api_swr_core::cache_key::{EndpointIdentity, KeyMatcher, KeySuffix};
use api_swr_core::client::{RemoteFn, RemoteResult, unwrap_envelope};
use api_swr_core::config::{EngineConfig, FetchConfig, FetchOptions, combine};
use api_swr_core::engine::CacheEngine;
use api_swr_core::hooks::{FetchWrapper, ProcessingHook};
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use std::fmt;
use std::sync::Arc;

/// Routes one endpoint's calls to the real function or its mock.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    identity: EndpointIdentity,
    real: RemoteFn,
    mocks: MockRegistry,
}

impl Dispatcher {
    pub(crate) const fn new(identity: EndpointIdentity, real: RemoteFn, mocks: MockRegistry) -> Self {
        Self {
            identity,
            real,
            mocks,
        }
    }

    /// Dispatch one call. The mock lookup happens before the returned
    /// future is polled, so a missing mock fails without touching the
    /// remote layer.
    pub(crate) fn dispatch(
        &self,
        mocking: bool,
        params: Option<Params>,
        config: Option<FetchConfig>,
    ) -> BoxFuture<'static, RemoteResult> {
        let target = if mocking {
            match self
                .mocks
                .resolve(self.identity.controller_key(), self.identity.endpoint_key())
            {
                Ok(mock) => {
                    metrics::record_mock_dispatch(self.identity.endpoint_id());
                    tracing::debug!(endpoint_id = %self.identity, "dispatching to mock");
                    mock
                }
                Err(error) => {
                    tracing::warn!(endpoint_id = %self.identity, "no mock registered");
                    return future::ready(Err(error)).boxed();
                }
            }
        } else {
            Arc::clone(&self.real)
        };

        unwrap_envelope(target(params, config)).boxed()
    }

    /// A remote function bound to one mocking mode.
    pub(crate) fn remote_fn(&self, mocking: bool) -> RemoteFn {
        let dispatcher = self.clone();
        Arc::new(move |params: Option<Params>, config: Option<FetchConfig>| {
            dispatcher.dispatch(mocking, params, config)
        })
    }
}

/// Everything a binder needs to know about its endpoint.
pub(crate) struct EndpointContext<R> {
    pub(crate) identity: EndpointIdentity,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) controller_config: Option<FetchConfig>,
    pub(crate) setup: Arc<FactorySetup<R>>,
}

impl<R> EndpointContext<R> {
    /// Global then controller fetch config.
    pub(crate) fn layers(&self) -> [Option<&FetchConfig>; 2] {
        [
            self.setup.global_fetch_config.as_ref(),
            self.controller_config.as_ref(),
        ]
    }

    pub(crate) fn engine(&self) -> &Arc<dyn CacheEngine> {
        &self.setup.engine
    }

    pub(crate) fn processing(&self) -> Option<ProcessingHook<R>> {
        self.setup.processing.clone()
    }

    pub(crate) fn swr_config(&self) -> Option<&EngineConfig> {
        self.setup.swr_config.as_ref()
    }

    pub(crate) fn swr_infinite_config(&self) -> Option<&EngineConfig> {
        self.setup.swr_infinite_config.as_ref()
    }

    /// Mocking is on when the factory or the call site turns it on.
    pub(crate) fn mocking(&self, call_site: Option<bool>) -> bool {
        self.setup.enable_mocking || call_site.unwrap_or(false)
    }

    /// Dispatch inputs for one binder. The global wrapper hook is evaluated
    /// here, once per (re)binding.
    pub(crate) fn bindings(
        &self,
        enable_mocking: Option<bool>,
        params: Option<Params>,
        fetch_config: Option<FetchConfig>,
        wrapper: Option<FetchWrapper>,
    ) -> FetchBindings {
        FetchBindings {
            fetcher: self.dispatcher.remote_fn(self.mocking(enable_mocking)),
            params,
            fetch_config,
            wrapper,
            global_wrapper: self.setup.global_wrapper.as_ref().map(|hook| hook()),
        }
    }
}

/// Tools for one endpoint of a controller.
pub struct EndpointTools<R = ()> {
    context: Arc<EndpointContext<R>>,
}

impl<R> Clone for EndpointTools<R> {
    fn clone(&self) -> Self {
        Self {
            context: Arc::clone(&self.context),
        }
    }
}

impl<R> fmt::Debug for EndpointTools<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointTools")
            .field("endpoint_id", &self.context.identity.endpoint_id())
            .field("controller_config", &self.context.controller_config)
            .finish_non_exhaustive()
    }
}

impl<R: Clone + Send + Sync + 'static> EndpointTools<R> {
    pub(crate) fn new(context: EndpointContext<R>) -> Self {
        Self {
            context: Arc::new(context),
        }
    }

    /// Controller and endpoint keys.
    #[must_use]
    pub fn identity(&self) -> &EndpointIdentity {
        &self.context.identity
    }

    /// Key of the owning controller.
    #[must_use]
    pub fn controller_key(&self) -> &str {
        self.context.identity.controller_key()
    }

    /// Key of this endpoint in its client map.
    #[must_use]
    pub fn endpoint_key(&self) -> &str {
        self.context.identity.endpoint_key()
    }

    /// `controller.endpoint`.
    #[must_use]
    pub fn endpoint_id(&self) -> &str {
        self.context.identity.endpoint_id()
    }

    /// The endpoint's base cache key.
    #[must_use]
    pub fn cache_key(&self) -> String {
        self.context.identity.cache_key(&KeySuffix::none())
    }

    /// `controller.endpoint.suffix...`.
    #[must_use]
    pub fn cache_key_with(&self, suffix: impl Into<KeySuffix>) -> String {
        self.context.identity.cache_key(&suffix.into())
    }

    /// Matcher for every key of this endpoint.
    #[must_use]
    pub fn starts_with_invalidator(&self) -> KeyMatcher {
        self.context.identity.matcher(&KeySuffix::none())
    }

    /// Matcher for every key under `controller.endpoint.suffix...`.
    #[must_use]
    pub fn starts_with_invalidator_with(&self, suffix: impl Into<KeySuffix>) -> KeyMatcher {
        self.context.identity.matcher(&suffix.into())
    }

    /// Call the endpoint directly.
    ///
    /// `config` is layered over the global and controller fetch config.
    ///
    /// # Errors
    ///
    /// Propagates every failure: remote errors, failing envelopes, and
    /// [`FetchError::MockNotRegistered`](api_swr_core::FetchError::MockNotRegistered)
    /// when mocking is on without a registered mock.
    #[tracing::instrument(skip(self, params, config), name = "endpoint_fetch", fields(endpoint_id = %self.context.identity))]
    pub async fn fetch(&self, params: Option<Params>, config: Option<FetchConfig>) -> RemoteResult {
        let fetch_config = combine(Some(&FetchOptions::new(config)), &self.context.layers())
            .and_then(|options| options.fetch_config);
        self.context
            .dispatcher
            .dispatch(self.context.mocking(None), params, fetch_config)
            .await
    }

    /// Bind a cached query.
    #[must_use]
    pub fn use_query(&self, config: Option<QueryConfig>) -> QueryHandle<R> {
        QueryHandle::new(Arc::clone(&self.context), config)
    }

    /// Bind a paginated query.
    #[must_use]
    pub fn use_infinite_query(&self, config: Option<InfiniteQueryConfig>) -> InfiniteQueryHandle<R> {
        InfiniteQueryHandle::new(Arc::clone(&self.context), config)
    }

    /// Bind a mutation.
    #[must_use]
    pub fn use_mutation(&self, config: Option<MutationConfig>) -> MutationHandle<R> {
        MutationHandle::new(Arc::clone(&self.context), config)
    }
}
