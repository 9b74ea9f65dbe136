//! Boundary to the stale-while-revalidate cache engine.
//!
//! The engine owns cached values, deduplication and revalidation scheduling.
//! This crate only supplies keys, fetchers and opaque configuration, and asks
//! the engine to mutate entries. Implementations live outside this crate; an
//! in-memory one is provided by `api-swr-testing`.
//!
//! # Key handoff
//!
//! A query hands the engine `Some(key)` when its cache key resolved, or
//! `None` when it is suspended. The engine must not call the fetcher for a
//! `None` key.
//!
//! # Failure handling
//!
//! Fetchers report failures as `Err`. The engine keeps any cached value for
//! the key and records the error next to it.

use crate::Params;
use crate::cache_key::{CacheKey, KeyMatcher};
use crate::client::RemoteResult;
use crate::config::EngineConfig;
use crate::error::FetchError;
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Fetcher for a single query key.
pub type QueryFetcher = Arc<dyn Fn(CacheKey) -> BoxFuture<'static, RemoteResult> + Send + Sync>;

/// Key of one page of an infinite query: the resolved key plus the params
/// that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageKey {
    /// Resolved dotted key.
    pub key: String,
    /// Params for this page.
    pub params: Option<Params>,
}

impl PageKey {
    /// Engine key for this page: `[key, params]`.
    #[must_use]
    pub fn to_cache_key(&self) -> CacheKey {
        CacheKey::Composite(vec![
            Value::String(self.key.clone()),
            self.params.clone().map_or(Value::Null, Value::Object),
        ])
    }
}

/// Computes the key of page `index` given the previous page's data.
///
/// Returning `None` stops page loading at that index.
pub type PageKeyFn = Arc<dyn Fn(usize, Option<&Value>) -> Option<PageKey> + Send + Sync>;

/// Fetcher for one page.
pub type PageFetcher = Arc<dyn Fn(PageKey) -> BoxFuture<'static, RemoteResult> + Send + Sync>;

/// Engine view of one query.
#[derive(Debug, Clone, Default)]
pub struct EngineResponse {
    /// Cached or freshly fetched data.
    pub data: Option<Value>,
    /// Error of the last fetch, if it failed.
    pub error: Option<FetchError>,
    /// No data yet and a fetch is running.
    pub is_loading: bool,
    /// A fetch is running.
    pub is_validating: bool,
}

/// Engine view of an infinite query.
#[derive(Debug, Clone, Default)]
pub struct PagesResponse {
    /// Loaded pages in order.
    pub pages: Vec<Value>,
    /// Requested page count.
    pub size: usize,
    /// Error of the first failing page fetch.
    pub error: Option<FetchError>,
    /// No pages yet and a fetch is running.
    pub is_loading: bool,
    /// A fetch is running.
    pub is_validating: bool,
}

/// Arbitrary predicate over engine keys.
pub type KeyPredicate = Arc<dyn Fn(&CacheKey) -> bool + Send + Sync>;

/// Which entries a mutation applies to.
#[derive(Clone)]
pub enum MutateTarget {
    /// One exact key.
    Key(CacheKey),
    /// Every key the predicate accepts.
    Matcher(KeyPredicate),
}

impl MutateTarget {
    /// Whether `key` is targeted.
    #[must_use]
    pub fn matches(&self, key: &CacheKey) -> bool {
        match self {
            Self::Key(target) => target == key,
            Self::Matcher(predicate) => predicate(key),
        }
    }
}

impl fmt::Debug for MutateTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.debug_tuple("Key").field(key).finish(),
            Self::Matcher(_) => f.debug_tuple("Matcher").field(&"<fn>").finish(),
        }
    }
}

impl From<CacheKey> for MutateTarget {
    fn from(key: CacheKey) -> Self {
        Self::Key(key)
    }
}

impl From<&str> for MutateTarget {
    fn from(key: &str) -> Self {
        Self::Key(CacheKey::from(key))
    }
}

impl From<String> for MutateTarget {
    fn from(key: String) -> Self {
        Self::Key(CacheKey::Text(key))
    }
}

impl From<KeyMatcher> for MutateTarget {
    fn from(matcher: KeyMatcher) -> Self {
        Self::Matcher(Arc::new(move |key| matcher.matches(key)))
    }
}

/// What to do with the targeted entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Re-run the fetchers of the targeted entries.
    Revalidate,
    /// Replace the cached value. `None` clears it.
    Replace(Option<Value>),
}

/// Options of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutateOptions {
    /// Revalidate after a replacement.
    pub revalidate: bool,
}

impl MutateOptions {
    /// Replace without revalidating.
    #[must_use]
    pub const fn without_revalidation() -> Self {
        Self { revalidate: false }
    }
}

impl Default for MutateOptions {
    fn default() -> Self {
        Self { revalidate: true }
    }
}

/// A stale-while-revalidate cache engine.
///
/// The trait is dyn-compatible: methods return boxed futures so that the
/// engine can be shared as `Arc<dyn CacheEngine>`.
pub trait CacheEngine: Send + Sync {
    /// Read (and, if needed, fetch) one query.
    ///
    /// A `None` key is a suspended query: the fetcher must not be called and
    /// the response carries no data.
    fn query(
        &self,
        key: Option<CacheKey>,
        fetcher: QueryFetcher,
        config: EngineConfig,
    ) -> Pin<Box<dyn Future<Output = EngineResponse> + Send + '_>>;

    /// Read (and, if needed, fetch) the first `size` pages of an infinite
    /// query.
    fn query_pages(
        &self,
        key_fn: PageKeyFn,
        fetcher: PageFetcher,
        size: usize,
        config: EngineConfig,
    ) -> Pin<Box<dyn Future<Output = PagesResponse> + Send + '_>>;

    /// Apply a mutation to every targeted entry.
    fn mutate(
        &self,
        target: MutateTarget,
        mutation: Mutation,
        options: MutateOptions,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    /// Every key currently known to the engine.
    fn keys(&self) -> Vec<CacheKey>;
}
