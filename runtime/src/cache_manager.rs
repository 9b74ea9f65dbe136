//! Bulk cache operations over the shared engine.

use crate::metrics;
use api_swr_core::cache_key::CacheKey;
use api_swr_core::engine::{CacheEngine, MutateOptions, MutateTarget, Mutation};
use futures::future::join_all;
use std::fmt;
use std::sync::Arc;

/// Invalidation and clearing over every key the engine knows.
///
/// Obtain one from [`ControllerFactory::cache_manager`](crate::ControllerFactory::cache_manager).
///
/// # Example
///
/// ```ignore
/// let cache = factory.cache_manager();
///
/// // One user.
/// cache.invalidate(get_user.cache_key_with("42")).await;
///
/// // Every page of an infinite query.
/// cache.invalidate_infinite(&list_posts.cache_key()).await;
///
/// // Everything, without refetching.
/// cache.clear_all().await;
/// ```
#[derive(Clone)]
pub struct CacheManager {
    engine: Arc<dyn CacheEngine>,
}

impl fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager").finish_non_exhaustive()
    }
}

impl CacheManager {
    /// Manager over `engine`.
    #[must_use]
    pub fn new(engine: Arc<dyn CacheEngine>) -> Self {
        Self { engine }
    }

    /// Pass a mutation straight to the engine.
    pub async fn mutate(&self, target: impl Into<MutateTarget>, mutation: Mutation, options: MutateOptions) {
        self.engine.mutate(target.into(), mutation, options).await;
    }

    /// Apply a mutation to every known key whose text form contains
    /// `prefix`, concurrently. Returns the number of keys mutated.
    pub async fn mutate_infinite(&self, prefix: &str, mutation: Mutation, options: MutateOptions) -> usize {
        let keys: Vec<CacheKey> = self
            .engine
            .keys()
            .into_iter()
            .filter(|key| key.contains(prefix))
            .collect();
        let count = keys.len();

        join_all(keys.into_iter().map(|key| {
            self.engine
                .mutate(MutateTarget::Key(key), mutation.clone(), options)
        }))
        .await;

        count
    }

    /// Revalidate one key, or every key a matcher accepts.
    pub async fn invalidate(&self, target: impl Into<MutateTarget>) {
        let target = target.into();
        tracing::debug!(?target, "invalidating");
        self.engine
            .mutate(target, Mutation::Revalidate, MutateOptions::default())
            .await;
        metrics::record_invalidations("invalidate", 1);
    }

    /// Revalidate every known key containing `prefix`. Infinite-query keys
    /// are composite, so the endpoint's base cache key is enough here.
    pub async fn invalidate_infinite(&self, prefix: &str) -> usize {
        let count = self
            .mutate_infinite(prefix, Mutation::Revalidate, MutateOptions::default())
            .await;
        tracing::info!(prefix, count, "invalidated infinite queries");
        metrics::record_invalidations("invalidate_infinite", count);
        count
    }

    /// Drop the data of every known key without refetching. Returns the
    /// number of keys cleared.
    pub async fn clear_all(&self) -> usize {
        let keys = self.engine.keys();
        let count = keys.len();

        join_all(keys.into_iter().map(|key| {
            self.engine.mutate(
                MutateTarget::Key(key),
                Mutation::Replace(None),
                MutateOptions::without_revalidation(),
            )
        }))
        .await;

        tracing::info!(count, "cache cleared");
        metrics::record_invalidations("clear_all", count);
        count
    }
}
