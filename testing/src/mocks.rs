//! Recording remote functions.
//!
//! [`CallRecorder`] produces a [`RemoteFn`] that records every call it
//! receives and answers with a configured response, optionally after a
//! delay.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

use api_swr_core::Params;
use api_swr_core::client::{RemoteFn, RemoteResult};
use api_swr_core::config::FetchConfig;
use api_swr_core::error::FetchError;
use futures::FutureExt;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Arguments of one recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Params the function was called with.
    pub params: Option<Params>,
    /// Fetch config the function was called with.
    pub config: Option<FetchConfig>,
}

impl RecordedCall {
    /// Look up one param of the call.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.as_ref().and_then(|params| params.get(name))
    }

    /// Look up one config entry of the call.
    #[must_use]
    pub fn config_value(&self, name: &str) -> Option<&Value> {
        self.config.as_ref().and_then(|config| config.get(name))
    }
}

type Responder = Arc<dyn Fn(&RecordedCall) -> RemoteResult + Send + Sync>;

/// A remote function double that records its calls.
///
/// # Example
///
/// ```ignore
/// let recorder = CallRecorder::returning(json!({ "test": "OK" }));
/// let client = ClientMap::new().with("testGetSuccess", recorder.remote_fn());
/// // ...
/// assert_eq!(recorder.call_count(), 1);
/// ```
#[derive(Clone)]
pub struct CallRecorder {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    responder: Responder,
    delay: Option<Duration>,
}

impl CallRecorder {
    /// Answer every call with `value`.
    #[must_use]
    pub fn returning(value: Value) -> Self {
        Self::responding(move |_| Ok(value.clone()))
    }

    /// Fail every call with a remote error carrying `message`.
    #[must_use]
    pub fn failing(message: &str) -> Self {
        let message = message.to_string();
        Self::responding(move |_| Err(FetchError::remote(anyhow::anyhow!(message.clone()))))
    }

    /// Answer every call with its own params as an object.
    #[must_use]
    pub fn echoing() -> Self {
        Self::responding(|call| Ok(Value::Object(call.params.clone().unwrap_or_default())))
    }

    /// Answer calls through an arbitrary function.
    pub fn responding<F>(responder: F) -> Self
    where
        F: Fn(&RecordedCall) -> RemoteResult + Send + Sync + 'static,
    {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            responder: Arc::new(responder),
            delay: None,
        }
    }

    /// Sleep for `delay` before answering.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// A remote function that records into this recorder.
    #[must_use]
    pub fn remote_fn(&self) -> RemoteFn {
        let recorder = self.clone();
        Arc::new(move |params: Option<Params>, config: Option<FetchConfig>| {
            let call = RecordedCall { params, config };
            recorder.calls.lock().unwrap().push(call.clone());
            let result = (recorder.responder)(&call);
            let delay = recorder.delay;
            async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                result
            }
            .boxed()
        })
    }

    /// Every call so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// The most recent call.
    #[must_use]
    pub fn last_call(&self) -> Option<RecordedCall> {
        self.calls.lock().unwrap().last().cloned()
    }

    /// Number of calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl std::fmt::Debug for CallRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallRecorder")
            .field("calls", &self.call_count())
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_recorder_records_arguments() {
        let recorder = CallRecorder::returning(json!({ "test": "OK" }));
        let remote = recorder.remote_fn();

        let mut params = Params::new();
        params.insert("id".to_string(), json!(1));
        let config = FetchConfig::new().with("testKey1", "testValue1");

        let result = remote(Some(params), Some(config)).await;

        assert_eq!(result.ok(), Some(json!({ "test": "OK" })));
        assert_eq!(recorder.call_count(), 1);
        let call = recorder.last_call().unwrap();
        assert_eq!(call.param("id"), Some(&json!(1)));
        assert_eq!(call.config_value("testKey1"), Some(&json!("testValue1")));
    }

    #[tokio::test]
    async fn test_failing_recorder() {
        let recorder = CallRecorder::failing("Unexpected error");
        let result = recorder.remote_fn()(None, None).await;
        assert_eq!(result.err().map(|e| e.to_string()).as_deref(), Some("Unexpected error"));
    }

    #[tokio::test]
    async fn test_delayed_echo() {
        let recorder = CallRecorder::echoing().with_delay(Duration::from_millis(50));
        let mut params = Params::new();
        params.insert("page".to_string(), json!(2));

        let result = recorder.remote_fn()(Some(params), None).await;
        assert_eq!(result.ok(), Some(json!({ "page": 2 })));
    }
}
