//! Per-call-site fetch orchestration.
//!
//! A [`FetchOrchestrator`] drives one call site's requests through the
//! lifecycle `Idle → Pending → {Success, Error}` and keeps the resulting
//! [`RequestState`] observable.
//!
//! # Lifecycle
//!
//! ```text
//! run(exec_params)
//!   │  clear error, in_flight += 1, is_loading = true
//!   │  params = bound ⊕ exec (exec wins)
//!   ▼
//! call-site wrapper │ global wrapper │ remote fn
//!   │
//!   ├─ Ok(data)  → data = Some(data), error = None
//!   └─ Err(e)    → error = Some(e), data kept
//!   │
//!   │  in_flight -= 1, is_loading = in_flight > 0
//!   ▼
//! processing hook → processing_response
//! ```
//!
//! Invocations may overlap. Each one settles independently and the last one
//! to settle determines the visible `data`/`error`; `is_loading` stays true
//! until every invocation has settled.

use crate::metrics;
use api_swr_core::Params;
use api_swr_core::client::{RemoteFn, RemoteResult};
use api_swr_core::config::FetchConfig;
use api_swr_core::error::FetchError;
use api_swr_core::hooks::{FetchWrapper, FetchWrapperParams, ProcessingHook, ProcessingParams, RequestMode};
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tokio::sync::watch;

/// Observable state of one call site.
#[derive(Debug, Clone)]
pub struct RequestState<R> {
    /// Data of the last successful settlement.
    pub data: Option<Value>,
    /// Error of the last settlement, cleared by the next invocation.
    pub error: Option<FetchError>,
    /// At least one invocation is unsettled.
    pub is_loading: bool,
    /// Effective params of the latest invocation.
    pub last_params: Option<Params>,
    /// Return value of the processing hook after the last settlement.
    pub processing_response: Option<R>,
    in_flight: usize,
}

impl<R> RequestState<R> {
    /// Number of unsettled invocations.
    #[must_use]
    pub const fn in_flight(&self) -> usize {
        self.in_flight
    }
}

impl<R> Default for RequestState<R> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            is_loading: false,
            last_params: None,
            processing_response: None,
            in_flight: 0,
        }
    }
}

/// Inputs an orchestrator dispatches with. Replaced wholesale by
/// [`FetchOrchestrator::rebind`] when the call site's configuration changes.
#[derive(Clone)]
pub struct FetchBindings {
    /// Remote function (already mock-aware and envelope-unwrapping).
    pub fetcher: RemoteFn,
    /// Bound params; exec params are merged over them.
    pub params: Option<Params>,
    /// Effective fetch config.
    pub fetch_config: Option<FetchConfig>,
    /// Call-site fetch wrapper.
    pub wrapper: Option<FetchWrapper>,
    /// Global fetch wrapper, used when no call-site wrapper is set.
    pub global_wrapper: Option<FetchWrapper>,
}

impl FetchBindings {
    /// Bindings that call `fetcher` directly.
    #[must_use]
    pub const fn new(fetcher: RemoteFn) -> Self {
        Self {
            fetcher,
            params: None,
            fetch_config: None,
            wrapper: None,
            global_wrapper: None,
        }
    }
}

impl fmt::Debug for FetchBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchBindings")
            .field("params", &self.params)
            .field("fetch_config", &self.fetch_config)
            .field("wrapper", &self.wrapper.is_some())
            .field("global_wrapper", &self.global_wrapper.is_some())
            .finish_non_exhaustive()
    }
}

struct Inner<R> {
    endpoint_id: String,
    mode: RequestMode,
    processing: Option<ProcessingHook<R>>,
    bindings: RwLock<FetchBindings>,
    state: watch::Sender<RequestState<R>>,
}

/// Drives one call site's requests.
///
/// Cloning is cheap and clones share state.
pub struct FetchOrchestrator<R> {
    inner: Arc<Inner<R>>,
}

impl<R> Clone for FetchOrchestrator<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> fmt::Debug for FetchOrchestrator<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOrchestrator")
            .field("endpoint_id", &self.inner.endpoint_id)
            .field("mode", &self.inner.mode)
            .finish_non_exhaustive()
    }
}

impl<R: Clone + Send + Sync + 'static> FetchOrchestrator<R> {
    /// Create an idle orchestrator.
    pub fn new(
        endpoint_id: impl Into<String>,
        mode: RequestMode,
        processing: Option<ProcessingHook<R>>,
        bindings: FetchBindings,
    ) -> Self {
        let (state, _) = watch::channel(RequestState::default());
        Self {
            inner: Arc::new(Inner {
                endpoint_id: endpoint_id.into(),
                mode,
                processing,
                bindings: RwLock::new(bindings),
                state,
            }),
        }
    }

    /// `controller.endpoint` this orchestrator dispatches to.
    #[must_use]
    pub fn endpoint_id(&self) -> &str {
        &self.inner.endpoint_id
    }

    /// Issuing binder kind.
    #[must_use]
    pub fn mode(&self) -> RequestMode {
        self.inner.mode
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> RequestState<R> {
        self.inner.state.borrow().clone()
    }

    /// Receiver notified on every state transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RequestState<R>> {
        self.inner.state.subscribe()
    }

    /// Replace the dispatch inputs. Unsettled invocations keep the inputs
    /// they started with; state is preserved.
    pub fn rebind(&self, bindings: FetchBindings) {
        *self
            .inner
            .bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner) = bindings;
    }

    fn bindings(&self) -> FetchBindings {
        self.inner
            .bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run one invocation and return its data, or `None` if it failed.
    ///
    /// Failures are recorded in the state, never propagated.
    pub async fn client_fetch(&self, exec_params: Option<Params>) -> Option<Value> {
        self.run(exec_params).await.ok()
    }

    /// Run one invocation and return its outcome.
    ///
    /// # Errors
    ///
    /// Returns the [`FetchError`] the invocation settled with. The error is
    /// also stored in the state.
    #[tracing::instrument(
        skip(self, exec_params),
        name = "orchestrator_run",
        fields(endpoint_id = %self.inner.endpoint_id, mode = %self.inner.mode)
    )]
    pub async fn run(&self, exec_params: Option<Params>) -> RemoteResult {
        let bindings = self.bindings();
        let params = merge_params(bindings.params.as_ref(), exec_params);

        self.inner.state.send_modify(|state| {
            state.error = None;
            state.in_flight += 1;
            state.is_loading = true;
            state.last_params = Some(params.clone());
        });
        tracing::debug!(?params, "dispatching");

        let started = Instant::now();
        let result = self.dispatch(&bindings, params.clone()).await;
        metrics::record_fetch(&self.inner.endpoint_id, self.inner.mode, started.elapsed(), result.is_err());

        let mut settled = (None, None);
        self.inner.state.send_modify(|state| {
            state.in_flight = state.in_flight.saturating_sub(1);
            state.is_loading = state.in_flight > 0;
            match &result {
                Ok(data) => {
                    state.data = Some(data.clone());
                    state.error = None;
                }
                Err(error) => state.error = Some(error.clone()),
            }
            settled = (state.data.clone(), state.error.clone());
        });

        match &result {
            Ok(_) => tracing::debug!("settled"),
            Err(error) => tracing::warn!(%error, "fetch failed"),
        }

        if let Some(processing) = &self.inner.processing {
            let (data, error) = settled;
            let response = processing(&ProcessingParams {
                endpoint_id: self.inner.endpoint_id.clone(),
                data,
                error,
                params: Some(params),
                is_loading: false,
                mode: self.inner.mode,
            });
            self.inner
                .state
                .send_modify(|state| state.processing_response = Some(response));
        }

        result
    }

    fn dispatch(&self, bindings: &FetchBindings, params: Params) -> BoxFuture<'static, RemoteResult> {
        match bindings.wrapper.as_ref().or(bindings.global_wrapper.as_ref()) {
            Some(wrapper) => wrapper(FetchWrapperParams {
                endpoint_id: self.inner.endpoint_id.clone(),
                root_fetcher: Arc::clone(&bindings.fetcher),
                params,
                mode: self.inner.mode,
                config: bindings.fetch_config.clone(),
            }),
            None => (bindings.fetcher)(Some(params), bindings.fetch_config.clone()),
        }
    }
}

/// `bound ⊕ exec`, shallow, exec wins.
fn merge_params(bound: Option<&Params>, exec: Option<Params>) -> Params {
    let mut merged = bound.cloned().unwrap_or_default();
    if let Some(exec) = exec {
        merged.extend(exec);
    }
    merged
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code: lock poisoning is a test failure
mod tests {
    use super::*;
    use api_swr_core::client::remote_fn;
    use api_swr_core::hooks::fetch_wrapper;
    use api_swr_testing::CallRecorder;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap_or_default()
    }

    fn orchestrator(fetcher: RemoteFn) -> FetchOrchestrator<()> {
        FetchOrchestrator::new("test.endpoint", RequestMode::Query, None, FetchBindings::new(fetcher))
    }

    #[tokio::test]
    async fn test_success_stores_data() {
        let recorder = CallRecorder::returning(json!({ "test": "OK" }));
        let orchestrator = orchestrator(recorder.remote_fn());

        let data = orchestrator.client_fetch(None).await;

        assert_eq!(data, Some(json!({ "test": "OK" })));
        let state = orchestrator.state();
        assert_eq!(state.data, Some(json!({ "test": "OK" })));
        assert!(state.error.is_none());
        assert!(!state.is_loading);
        assert_eq!(state.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failure_keeps_stale_data() {
        let fail = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&fail);
        let fetcher = remote_fn(move |_params, _config| {
            let failing = flag.load(std::sync::atomic::Ordering::SeqCst);
            async move {
                if failing {
                    Err(FetchError::remote("Unexpected error"))
                } else {
                    Ok(json!("fresh"))
                }
            }
        });
        let orchestrator = orchestrator(fetcher);

        assert_eq!(orchestrator.client_fetch(None).await, Some(json!("fresh")));
        fail.store(true, std::sync::atomic::Ordering::SeqCst);
        assert_eq!(orchestrator.client_fetch(None).await, None);

        let state = orchestrator.state();
        assert_eq!(state.data, Some(json!("fresh")));
        assert_eq!(state.error.map(|e| e.to_string()).as_deref(), Some("Unexpected error"));
    }

    #[tokio::test]
    async fn test_run_propagates_error() {
        let orchestrator = orchestrator(CallRecorder::failing("boom").remote_fn());
        let result = orchestrator.run(None).await;
        assert_eq!(result.err().map(|e| e.to_string()).as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_exec_params_merge_over_bound() {
        let recorder = CallRecorder::echoing();
        let mut bindings = FetchBindings::new(recorder.remote_fn());
        bindings.params = Some(params(json!({ "page": 1, "size": 10 })));
        bindings.fetch_config = Some(FetchConfig::new().with("testKey1", "testValue1"));
        let orchestrator: FetchOrchestrator<()> =
            FetchOrchestrator::new("test.endpoint", RequestMode::Mutation, None, bindings);

        let data = orchestrator.client_fetch(Some(params(json!({ "page": 2 })))).await;

        assert_eq!(data, Some(json!({ "page": 2, "size": 10 })));
        assert_eq!(orchestrator.state().last_params, Some(params(json!({ "page": 2, "size": 10 }))));
        let call = recorder.last_call();
        assert_eq!(
            call.and_then(|c| c.config_value("testKey1").cloned()),
            Some(json!("testValue1"))
        );
    }

    #[tokio::test]
    async fn test_processing_hook_sees_settled_state() {
        let seen: Arc<std::sync::Mutex<Vec<ProcessingParams>>> = Arc::default();
        let record = Arc::clone(&seen);
        let hook: ProcessingHook<String> = Arc::new(move |p: &ProcessingParams| {
            record.lock().unwrap().push(p.clone());
            format!(
                "{}:{}:{}:{}",
                p.endpoint_id,
                p.mode,
                p.data.is_some(),
                p.error.as_ref().map(ToString::to_string).unwrap_or_default()
            )
        });
        let mut bindings = FetchBindings::new(CallRecorder::failing("Not Found").remote_fn());
        bindings.params = Some(params(json!({ "id": 1, "page": 1 })));
        let orchestrator = FetchOrchestrator::new("test.endpoint", RequestMode::Query, Some(hook), bindings);

        orchestrator.client_fetch(Some(params(json!({ "page": 2 })))).await;

        assert_eq!(
            orchestrator.state().processing_response.as_deref(),
            Some("test.endpoint:query:false:Not Found")
        );
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].is_loading);
        assert_eq!(seen[0].params, Some(params(json!({ "id": 1, "page": 2 }))));
    }

    #[tokio::test]
    async fn test_call_site_wrapper_beats_global() {
        let recorder = CallRecorder::returning(json!("root"));
        let mut bindings = FetchBindings::new(recorder.remote_fn());
        bindings.global_wrapper = Some(fetch_wrapper(|_p: FetchWrapperParams| async { Ok(json!("global")) }));
        let orchestrator: FetchOrchestrator<()> =
            FetchOrchestrator::new("test.endpoint", RequestMode::Query, None, bindings.clone());
        assert_eq!(orchestrator.client_fetch(None).await, Some(json!("global")));
        assert_eq!(recorder.call_count(), 0);

        bindings.wrapper = Some(fetch_wrapper(|p: FetchWrapperParams| async move {
            let root = p.call_root().await?;
            Ok(json!({ "wrapped": root, "mode": p.mode.as_str() }))
        }));
        orchestrator.rebind(bindings);
        assert_eq!(
            orchestrator.client_fetch(None).await,
            Some(json!({ "wrapped": "root", "mode": "query" }))
        );
        assert_eq!(recorder.call_count(), 1);
    }

    #[tokio::test]
    async fn test_is_loading_while_in_flight() {
        let gate = Arc::new(Notify::new());
        let release = Arc::clone(&gate);
        let fetcher = remote_fn(move |_params, _config| {
            let gate = Arc::clone(&release);
            async move {
                gate.notified().await;
                Ok(json!("done"))
            }
        });
        let orchestrator = orchestrator(fetcher);
        let mut states = orchestrator.subscribe();

        let task = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.client_fetch(None).await }
        });

        states.wait_for(|state| state.is_loading).await.ok();
        assert_eq!(orchestrator.state().in_flight(), 1);

        gate.notify_one();
        assert_eq!(task.await.ok().flatten(), Some(json!("done")));
        assert!(!orchestrator.state().is_loading);
    }

    #[tokio::test]
    async fn test_overlapping_invocations_last_settlement_wins() {
        let fetcher = remote_fn(|params: Option<Params>, _config| async move {
            let slow = params
                .as_ref()
                .and_then(|p| p.get("slow"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if slow {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Err(FetchError::remote("slow failure"))
            } else {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(json!({ "payload": "fast" }))
            }
        });
        let orchestrator = orchestrator(fetcher);

        let (slow, fast) = tokio::join!(
            orchestrator.client_fetch(Some(params(json!({ "slow": true })))),
            orchestrator.client_fetch(Some(params(json!({ "slow": false })))),
        );

        assert_eq!(slow, None);
        assert_eq!(fast, Some(json!({ "payload": "fast" })));
        let state = orchestrator.state();
        assert_eq!(state.data, Some(json!({ "payload": "fast" })));
        assert_eq!(state.error.as_ref().map(|e| e.to_string()).as_deref(), Some("slow failure"));
        assert!(!state.is_loading);
        assert_eq!(state.in_flight(), 0);
    }

    #[test]
    fn test_merge_params() {
        let bound = params(json!({ "a": 1, "b": 2 }));
        assert_eq!(merge_params(Some(&bound), Some(params(json!({ "b": 3 })))), params(json!({ "a": 1, "b": 3 })));
        assert_eq!(merge_params(None, None), Params::new());
    }
}
