//! Mock registry for endpoint substitution.
//!
//! Each controller owns one registry. When mocking is enabled (factory-wide
//! or per call), dispatch looks the endpoint up here instead of calling the
//! real remote function.

use api_swr_core::client::RemoteFn;
use api_swr_core::error::FetchError;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Thread-safe map of endpoint key to substitute remote function.
///
/// Registration merges into the existing map; the last registration for a
/// key wins.
///
/// ## Example
///
/// ```ignore
/// let mocks = MockRegistry::new();
/// mocks.register([("getUser", remote_fn(|_, _| async { Ok(json!({ "name": "mock" })) }))]);
///
/// let getter = mocks.resolve("users", "getUser")?;
/// ```
#[derive(Clone, Default)]
pub struct MockRegistry {
    mocks: Arc<RwLock<HashMap<String, RemoteFn>>>,
}

impl MockRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `mocks` into the registry. Returns how many existing entries
    /// were replaced.
    pub fn register<I, K>(&self, mocks: I) -> usize
    where
        I: IntoIterator<Item = (K, RemoteFn)>,
        K: Into<String>,
    {
        let mut registry = self.mocks.write().unwrap_or_else(PoisonError::into_inner);
        let mut replaced = 0;
        for (key, mock) in mocks {
            if registry.insert(key.into(), mock).is_some() {
                replaced += 1;
            }
        }
        replaced
    }

    /// The mock registered for `endpoint_key`, if any.
    #[must_use]
    pub fn get(&self, endpoint_key: &str) -> Option<RemoteFn> {
        self.mocks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(endpoint_key)
            .cloned()
    }

    /// The mock for `endpoint_key`, or a [`FetchError::MockNotRegistered`]
    /// naming `controller_key.endpoint_key`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::MockNotRegistered`] if no mock is registered.
    pub fn resolve(&self, controller_key: &str, endpoint_key: &str) -> Result<RemoteFn, FetchError> {
        self.get(endpoint_key).ok_or_else(|| FetchError::MockNotRegistered {
            endpoint_id: format!("{controller_key}.{endpoint_key}"),
        })
    }

    /// Whether a mock is registered for `endpoint_key`.
    #[must_use]
    pub fn contains(&self, endpoint_key: &str) -> bool {
        self.mocks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(endpoint_key)
    }

    /// Registered endpoint keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .mocks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Number of registered mocks.
    #[must_use]
    pub fn count(&self) -> usize {
        self.mocks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Remove every mock.
    pub fn clear(&self) {
        self.mocks.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl fmt::Debug for MockRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockRegistry").field("keys", &self.keys()).finish()
    }
}
