//! Mutation binder.
//!
//! A [`MutationHandle`] has no key and no engine subscription. Each
//! [`client_fetch`](MutationHandle::client_fetch) drives the orchestrator
//! exactly once with execution params merged over the bound ones. Related
//! queries are not invalidated automatically; callers do that through the
//! cache manager or the endpoint's invalidators.

use crate::endpoint::EndpointContext;
use crate::orchestrator::{FetchOrchestrator, RequestState};
use api_swr_core::Params;
use api_swr_core::config::{CallSiteConfig, FetchConfig, combine};
use api_swr_core::error::FetchError;
use api_swr_core::hooks::{FetchWrapper, RequestMode};
use api_swr_core::memo::{ContentMemo, Fingerprint};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Call-site configuration of a mutation.
#[derive(Clone, Default)]
#[must_use]
pub struct MutationConfig {
    /// Params every call starts from.
    pub params: Option<Params>,
    /// Call-site fetch config layer.
    pub fetch_config: Option<FetchConfig>,
    /// Call-site fetch wrapper.
    pub fetch_wrapper: Option<FetchWrapper>,
    /// Overrides the factory mocking switch.
    pub enable_mocking: Option<bool>,
}

impl MutationConfig {
    /// Empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bound params.
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

    /// Override mocking for this mutation.
    pub const fn enable_mocking(mut self, enabled: bool) -> Self {
        self.enable_mocking = Some(enabled);
        self
    }

    fn fingerprint(config: Option<&Self>) -> u64 {
        let Some(config) = config else {
            return Fingerprint::new().field(&0u8).finish();
        };
        Fingerprint::new()
            .field(&1u8)
            .map(config.params.as_ref())
            .map(config.fetch_config.as_ref().map(FetchConfig::as_map))
            .pointer(config.fetch_wrapper.as_ref())
            .field(&config.enable_mocking)
            .finish()
    }
}

impl CallSiteConfig for MutationConfig {
    fn fetch_config(&self) -> Option<&FetchConfig> {
        self.fetch_config.as_ref()
    }

    fn set_fetch_config(&mut self, config: FetchConfig) {
        self.fetch_config = Some(config);
    }
}

impl fmt::Debug for MutationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationConfig")
            .field("params", &self.params)
            .field("fetch_config", &self.fetch_config)
            .field("fetch_wrapper", &self.fetch_wrapper.is_some())
            .field("enable_mocking", &self.enable_mocking)
            .finish()
    }
}

/// A bound mutation.
pub struct MutationHandle<R = ()> {
    context: Arc<EndpointContext<R>>,
    orchestrator: FetchOrchestrator<R>,
    memo: ContentMemo,
}

impl<R> fmt::Debug for MutationHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationHandle")
            .field("endpoint_id", &self.context.identity.endpoint_id())
            .finish_non_exhaustive()
    }
}

impl<R: Clone + Send + Sync + 'static> MutationHandle<R> {
    pub(crate) fn new(context: Arc<EndpointContext<R>>, config: Option<MutationConfig>) -> Self {
        let orchestrator = FetchOrchestrator::new(
            context.identity.endpoint_id(),
            RequestMode::Mutation,
            context.processing(),
            context.bindings(None, None, None, None),
        );
        let mut handle = Self {
            context,
            orchestrator,
            memo: ContentMemo::new(),
        };
        handle.rerender(config);
        handle
    }

    /// Apply the call site's latest configuration. Returns whether anything
    /// was re-derived.
    pub fn rerender(&mut self, config: Option<MutationConfig>) -> bool {
        if !self.memo.update(MutationConfig::fingerprint(config.as_ref())) {
            return false;
        }
        let combined = combine(config.as_ref(), &self.context.layers()).unwrap_or_default();
        self.orchestrator.rebind(self.context.bindings(
            combined.enable_mocking,
            combined.params,
            combined.fetch_config,
            combined.fetch_wrapper,
        ));
        true
    }

    /// Call the endpoint once. `exec_params` are merged over the bound
    /// params.
    ///
    /// Returns the data, or `None` when the call failed; the failure is
    /// available through [`error`](Self::error).
    pub async fn client_fetch(&self, exec_params: Option<Params>) -> Option<Value> {
        self.orchestrator.client_fetch(exec_params).await
    }

    /// Data of the last successful call.
    #[must_use]
    pub fn data(&self) -> Option<Value> {
        self.orchestrator.state().data
    }

    /// Error of the last settled call.
    #[must_use]
    pub fn error(&self) -> Option<FetchError> {
        self.orchestrator.state().error
    }

    /// Whether a call is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.orchestrator.state().is_loading
    }

    /// Return value of the processing hook after the last settlement.
    #[must_use]
    pub fn processing_response(&self) -> Option<R> {
        self.orchestrator.state().processing_response
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

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code: endpoint lookups on fixed fixtures
mod tests {
    use super::*;
    use crate::ControllerFactory;
    use api_swr_core::client::ClientMap;
    use api_swr_core::hooks::ProcessingParams;
    use api_swr_testing::{CallRecorder, InMemoryCacheEngine};
    use serde_json::json;

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_exec_params_win_over_bound() {
        let recorder = CallRecorder::echoing();
        let controller = ControllerFactory::builder(Arc::new(InMemoryCacheEngine::new()))
            .build()
            .create_controller("users", ClientMap::new().with("updateUser", recorder.remote_fn()), None);
        let mutation = controller
            .endpoint("updateUser")
            .map(|t| t.use_mutation(Some(MutationConfig::new().params(params(json!({ "id": 1, "name": "Ada" }))))))
            .unwrap();

        let data = mutation.client_fetch(Some(params(json!({ "name": "Grace" })))).await;

        assert_eq!(data, Some(json!({ "id": 1, "name": "Grace" })));
        assert_eq!(mutation.data(), data);
        assert!(mutation.error().is_none());
        assert!(!mutation.is_loading());
        assert_eq!(recorder.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_captured_not_raised() {
        let recorder = CallRecorder::failing("Unexpected error");
        let controller = ControllerFactory::builder(Arc::new(InMemoryCacheEngine::new()))
            .use_api_processing(|p: &ProcessingParams| (p.mode, p.error.as_ref().map(ToString::to_string)))
            .build()
            .create_controller("users", ClientMap::new().with("deleteUser", recorder.remote_fn()), None);
        let mutation = controller.endpoint("deleteUser").map(|t| t.use_mutation(None)).unwrap();

        assert_eq!(mutation.client_fetch(None).await, None);
        assert_eq!(mutation.error().map(|e| e.to_string()).as_deref(), Some("Unexpected error"));
        assert_eq!(
            mutation.processing_response(),
            Some((RequestMode::Mutation, Some("Unexpected error".to_string())))
        );
    }

    #[tokio::test]
    async fn test_mutation_never_touches_engine() {
        let engine = Arc::new(InMemoryCacheEngine::new());
        let recorder = CallRecorder::returning(json!({ "ok": true }));
        let controller = ControllerFactory::builder(engine.clone())
            .build()
            .create_controller("users", ClientMap::new().with("updateUser", recorder.remote_fn()), None);
        let mutation = controller.endpoint("updateUser").map(|t| t.use_mutation(None)).unwrap();

        mutation.client_fetch(None).await;
        mutation.client_fetch(None).await;

        assert_eq!(recorder.call_count(), 2);
        assert!(engine.is_empty());
        assert!(engine.mutations().is_empty());
    }
}
