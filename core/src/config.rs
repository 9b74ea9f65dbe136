//! Three-tier configuration layering.
//!
//! Fetch configuration is assembled from up to three layers: the global
//! layer set on the controller factory, the per-controller layer, and the
//! call-site layer. Later layers override earlier ones key by key; nested
//! values are replaced wholesale.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Flat key/value configuration.
///
/// Used both for the fetch configuration handed to remote functions and for
/// the opaque configuration passed through to the cache engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigMap(Map<String, Value>);

/// Configuration passed as the second argument of every remote call.
pub type FetchConfig = ConfigMap;

/// Configuration passed through, uninterpreted, to the cache engine.
pub type EngineConfig = ConfigMap;

impl ConfigMap {
    /// An empty map.
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert one entry, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Look up one entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Shallow merge: every entry of `other` overwrites the same key here.
    pub fn merge(&mut self, other: &Self) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// `self ⊕ other`, leaving both inputs untouched.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut out = self.clone();
        out.merge(other);
        out
    }

    /// Borrow the underlying JSON map.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Take the underlying JSON map.
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<Map<String, Value>> for ConfigMap {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<ConfigMap> for Value {
    fn from(config: ConfigMap) -> Self {
        Self::Object(config.0)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ConfigMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A per-call configuration that carries an optional fetch config.
///
/// Query, infinite-query and mutation configs implement this so that
/// [`combine`] can layer global and controller configuration underneath them
/// while keeping their other fields intact.
pub trait CallSiteConfig: Clone + Default {
    /// The call-site fetch config, if any.
    fn fetch_config(&self) -> Option<&FetchConfig>;

    /// Replace the fetch config.
    fn set_fetch_config(&mut self, config: FetchConfig);
}

/// Layer configuration under a call-site config.
///
/// `layers` are applied left to right (later entries win) and absent layers
/// are skipped. The call-site `fetch_config` is applied last.
///
/// - no call-site config and no present layer: `None`
/// - a call-site config without `fetch_config` and no present layer: the
///   call-site config, unchanged
/// - otherwise a copy of the call-site config (or `C::default()`) carrying
///   the merged fetch config
pub fn combine<C: CallSiteConfig>(
    call_site: Option<&C>,
    layers: &[Option<&FetchConfig>],
) -> Option<C> {
    let present: Vec<&FetchConfig> = layers.iter().flatten().copied().collect();

    if present.is_empty() {
        match call_site {
            None => return None,
            Some(config) if config.fetch_config().is_none() => return Some(config.clone()),
            Some(_) => {}
        }
    }

    let mut merged = present
        .into_iter()
        .fold(FetchConfig::new(), |mut acc, layer| {
            acc.merge(layer);
            acc
        });
    if let Some(own) = call_site.and_then(CallSiteConfig::fetch_config) {
        merged.merge(own);
    }

    let mut out = call_site.cloned().unwrap_or_default();
    out.set_fetch_config(merged);
    Some(out)
}

/// Merge the global engine config with a call-site one.
#[must_use]
pub fn merge_engine_config(
    global: Option<&EngineConfig>,
    call_site: Option<&EngineConfig>,
) -> EngineConfig {
    let mut out = global.cloned().unwrap_or_default();
    if let Some(call_site) = call_site {
        out.merge(call_site);
    }
    out
}

/// Call-site config of an imperative fetch: nothing but a fetch config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Call-site fetch config.
    pub fetch_config: Option<FetchConfig>,
}

impl FetchOptions {
    /// Wrap an optional fetch config.
    #[must_use]
    pub const fn new(fetch_config: Option<FetchConfig>) -> Self {
        Self { fetch_config }
    }
}

impl CallSiteConfig for FetchOptions {
    fn fetch_config(&self) -> Option<&FetchConfig> {
        self.fetch_config.as_ref()
    }

    fn set_fetch_config(&mut self, config: FetchConfig) {
        self.fetch_config = Some(config);
    }
}
