//! Cross-cutting hooks: response processing and fetch wrapping.

use crate::Params;
use crate::client::{RemoteFn, RemoteResult};
use crate::config::FetchConfig;
use crate::error::FetchError;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Whether a request was issued by a query or a mutation binder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestMode {
    /// Query or infinite query.
    Query,
    /// Mutation.
    Mutation,
}

impl RequestMode {
    /// Lowercase label, used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
        }
    }
}

impl fmt::Display for RequestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input of the processing hook, captured after a request settles.
#[derive(Debug, Clone)]
pub struct ProcessingParams {
    /// `controller.endpoint`.
    pub endpoint_id: String,
    /// Data held by the call site after settlement (may be stale).
    pub data: Option<Value>,
    /// Error of the settled request, if it failed.
    pub error: Option<FetchError>,
    /// Effective params of the settled request.
    pub params: Option<Params>,
    /// Always `false`: the hook runs after settlement.
    pub is_loading: bool,
    /// Issuing binder.
    pub mode: RequestMode,
}

/// Global response-processing hook; its return value is surfaced as the
/// call site's `processing_response`.
pub type ProcessingHook<R> = Arc<dyn Fn(&ProcessingParams) -> R + Send + Sync>;

/// Input of a fetch wrapper.
#[derive(Clone)]
pub struct FetchWrapperParams {
    /// `controller.endpoint`.
    pub endpoint_id: String,
    /// The wrapped fetch. The wrapper decides whether to call it.
    pub root_fetcher: RemoteFn,
    /// Effective params.
    pub params: Params,
    /// Issuing binder.
    pub mode: RequestMode,
    /// Effective fetch config.
    pub config: Option<FetchConfig>,
}

impl FetchWrapperParams {
    /// Call `root_fetcher` with the effective params and config.
    #[must_use]
    pub fn call_root(&self) -> BoxFuture<'static, RemoteResult> {
        (self.root_fetcher)(Some(self.params.clone()), self.config.clone())
    }
}

impl fmt::Debug for FetchWrapperParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchWrapperParams")
            .field("endpoint_id", &self.endpoint_id)
            .field("params", &self.params)
            .field("mode", &self.mode)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Decorates a fetch (authentication retry, logging, ...).
pub type FetchWrapper = Arc<dyn Fn(FetchWrapperParams) -> BoxFuture<'static, RemoteResult> + Send + Sync>;

/// Produces the global fetch wrapper each time a binder is built.
pub type GlobalFetchWrapperHook = Arc<dyn Fn() -> FetchWrapper + Send + Sync>;

/// Box an async closure into a [`FetchWrapper`].
pub fn fetch_wrapper<F, Fut>(f: F) -> FetchWrapper
where
    F: Fn(FetchWrapperParams) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RemoteResult> + Send + 'static,
{
    Arc::new(move |params: FetchWrapperParams| f(params).boxed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::remote_fn;
    use serde_json::json;
    use tokio_test::block_on;

    #[test]
    fn test_wrapper_controls_root_fetcher() {
        let root = remote_fn(|params, _config| async move { Ok(Value::Object(params.unwrap_or_default())) });
        let wrapper = fetch_wrapper(|wrapper_params: FetchWrapperParams| async move {
            if wrapper_params.mode == RequestMode::Mutation {
                return Ok(json!("skipped"));
            }
            wrapper_params.call_root().await
        });

        let mut params = Params::new();
        params.insert("id".to_string(), json!(1));
        let make = |mode| FetchWrapperParams {
            endpoint_id: "users.getUser".to_string(),
            root_fetcher: Arc::clone(&root),
            params: params.clone(),
            mode,
            config: None,
        };

        assert_eq!(block_on(wrapper(make(RequestMode::Query))).ok(), Some(json!({ "id": 1 })));
        assert_eq!(block_on(wrapper(make(RequestMode::Mutation))).ok(), Some(json!("skipped")));
    }

    #[test]
    fn test_request_mode_labels() {
        assert_eq!(RequestMode::Query.to_string(), "query");
        assert_eq!(RequestMode::Mutation.as_str(), "mutation");
    }
}
