//! Client adaptation.
//!
//! Remote clients come in many shapes: generated API classes, hand-written
//! structs, bags of closures. They are all normalized into a [`ClientMap`]:
//! an ordered map from endpoint key to [`RemoteFn`], a detachable async
//! function taking optional params and an optional fetch config.
//!
//! Responses may be bare values or response envelopes
//! (`{ data, status, statusText, headers, config }`). [`unwrap_envelope`]
//! normalizes both into the payload, turning failing envelopes into
//! [`FetchError::Transport`].

use crate::Params;
use crate::config::FetchConfig;
use crate::error::FetchError;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Outcome of one remote call.
pub type RemoteResult = Result<Value, FetchError>;

/// A detachable remote function.
pub type RemoteFn =
    Arc<dyn Fn(Option<Params>, Option<FetchConfig>) -> BoxFuture<'static, RemoteResult> + Send + Sync>;

/// Box an async closure into a [`RemoteFn`].
pub fn remote_fn<F, Fut>(f: F) -> RemoteFn
where
    F: Fn(Option<Params>, Option<FetchConfig>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RemoteResult> + Send + 'static,
{
    Arc::new(move |params: Option<Params>, config: Option<FetchConfig>| f(params, config).boxed())
}

/// A remote client that can describe its own endpoints.
///
/// Implemented by client structs so that [`ClientMap::normalize`] can turn an
/// instance into a function map.
pub trait RemoteClient: Send + Sync + 'static {
    /// Bind every endpoint of `self` into a function map.
    fn endpoints(self: Arc<Self>) -> ClientMap;
}

/// Ordered map of endpoint key to remote function.
#[derive(Clone, Default)]
pub struct ClientMap {
    endpoints: BTreeMap<String, RemoteFn>,
}

impl ClientMap {
    /// An empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize a client instance.
    pub fn normalize<T: RemoteClient>(client: T) -> Self {
        Arc::new(client).endpoints()
    }

    /// Start binding methods of a shared instance.
    ///
    /// Every method registered through [`BoundClient::method`] receives its
    /// own handle to `instance`, so the resulting functions stay valid
    /// independently of where they are called from.
    pub fn bind<T: Send + Sync + 'static>(instance: Arc<T>) -> BoundClient<T> {
        BoundClient {
            instance,
            map: Self::new(),
        }
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, f: RemoteFn) -> Self {
        self.endpoints.insert(key.into(), f);
        self
    }

    /// Insert one endpoint, returning the function it replaced.
    pub fn insert(&mut self, key: impl Into<String>, f: RemoteFn) -> Option<RemoteFn> {
        self.endpoints.insert(key.into(), f)
    }

    /// Look up one endpoint.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&RemoteFn> {
        self.endpoints.get(key)
    }

    /// Endpoint keys, in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }

    /// Iterate endpoints, in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RemoteFn)> {
        self.endpoints.iter().map(|(k, f)| (k.as_str(), f))
    }

    /// Number of endpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

impl fmt::Debug for ClientMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientMap")
            .field("endpoints", &self.endpoints.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<K: Into<String>> FromIterator<(K, RemoteFn)> for ClientMap {
    fn from_iter<T: IntoIterator<Item = (K, RemoteFn)>>(iter: T) -> Self {
        Self {
            endpoints: iter.into_iter().map(|(k, f)| (k.into(), f)).collect(),
        }
    }
}

impl IntoIterator for ClientMap {
    type Item = (String, RemoteFn);
    type IntoIter = std::collections::btree_map::IntoIter<String, RemoteFn>;

    fn into_iter(self) -> Self::IntoIter {
        self.endpoints.into_iter()
    }
}

/// Builder that rebinds methods of one shared instance.
pub struct BoundClient<T> {
    instance: Arc<T>,
    map: ClientMap,
}

impl<T: Send + Sync + 'static> BoundClient<T> {
    /// Register one method under `name`.
    #[must_use]
    pub fn method<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Arc<T>, Option<Params>, Option<FetchConfig>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RemoteResult> + Send + 'static,
    {
        let instance = Arc::clone(&self.instance);
        self.map.insert(
            name,
            remote_fn(move |params, config| f(Arc::clone(&instance), params, config)),
        );
        self
    }

    /// Finish binding.
    #[must_use]
    pub fn build(self) -> ClientMap {
        self.map
    }
}

/// A response envelope, as produced by HTTP-style clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    status: u16,
    status_text: String,
    raw: Map<String, Value>,
}

impl Envelope {
    /// Build an envelope with empty headers and config.
    pub fn new(data: Value, status: u16, status_text: impl Into<String>) -> Self {
        let status_text = status_text.into();
        let mut raw = Map::new();
        raw.insert("data".to_string(), data);
        raw.insert("status".to_string(), json!(status));
        raw.insert("statusText".to_string(), json!(status_text));
        raw.insert("headers".to_string(), json!({}));
        raw.insert("config".to_string(), json!({ "headers": {} }));
        Self {
            status,
            status_text,
            raw,
        }
    }

    /// `200 OK` envelope around `data`.
    #[must_use]
    pub fn success(data: Value) -> Self {
        Self::new(data, 200, "OK")
    }

    /// `500 Error` envelope with empty data.
    #[must_use]
    pub fn error() -> Self {
        Self::new(json!({}), 500, "Error")
    }

    /// Try to read an envelope out of a value.
    ///
    /// A value is an envelope when it is an object with a numeric-like
    /// `status` and a string `statusText`.
    #[must_use]
    pub fn detect(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let status = match object.get("status")? {
            Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok())?,
            Value::String(s) => s.trim().parse::<u16>().ok()?,
            _ => return None,
        };
        let status_text = object.get("statusText")?.as_str()?.to_string();
        Some(Self {
            status,
            status_text,
            raw: object.clone(),
        })
    }

    /// Status code.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Status text.
    #[must_use]
    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    /// Payload, `null` when missing.
    #[must_use]
    pub fn data(&self) -> &Value {
        static NULL: Value = Value::Null;
        self.raw.get("data").unwrap_or(&NULL)
    }

    /// Whether the status denotes a failure (>= 400).
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        self.status >= 400
    }

    /// The envelope as a JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.raw)
    }

    /// Unwrap into the payload, or a transport error for failing statuses.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Transport`] when the status is >= 400.
    pub fn into_result(mut self) -> RemoteResult {
        if self.is_failure() {
            return Err(FetchError::Transport {
                status: self.status,
                status_text: self.status_text,
                envelope: Box::new(Value::Object(self.raw)),
            });
        }
        Ok(self.raw.remove("data").unwrap_or(Value::Null))
    }
}

impl From<Envelope> for Value {
    fn from(envelope: Envelope) -> Self {
        envelope.into_value()
    }
}

/// A remote response: either an envelope or a bare payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteResponse {
    /// Envelope-shaped response.
    Envelope(Envelope),
    /// Anything else, used as the payload as-is.
    Bare(Value),
}

impl RemoteResponse {
    /// Classify a value structurally.
    #[must_use]
    pub fn detect(value: Value) -> Self {
        match Envelope::detect(&value) {
            Some(envelope) => Self::Envelope(envelope),
            None => Self::Bare(value),
        }
    }

    /// Normalize into the payload.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Transport`] for failing envelopes.
    pub fn into_result(self) -> RemoteResult {
        match self {
            Self::Envelope(envelope) => envelope.into_result(),
            Self::Bare(value) => Ok(value),
        }
    }
}

impl From<Value> for RemoteResponse {
    fn from(value: Value) -> Self {
        Self::detect(value)
    }
}

/// Await a remote call and normalize its response.
///
/// # Errors
///
/// Propagates the call's own error, or returns [`FetchError::Transport`] for
/// an envelope with status >= 400.
pub async fn unwrap_envelope<Fut>(call: Fut) -> RemoteResult
where
    Fut: Future<Output = RemoteResult>,
{
    let value = call.await?;
    RemoteResponse::detect(value).into_result()
}
