//! # api-swr Runtime
//!
//! Binds remote-call functions to a stale-while-revalidate cache engine.
//!
//! This crate provides the controller factory, the per-call-site fetch
//! orchestrator and the three binders built on it (query, infinite query,
//! mutation), plus bulk cache operations.
//!
//! ## Core Components
//!
//! - **`ControllerFactory`**: holds the global layer and creates controllers
//! - **`Controller`**: one `EndpointTools` record per endpoint, plus mocks
//! - **`FetchOrchestrator`**: request lifecycle of one call site
//! - **`QueryHandle` / `InfiniteQueryHandle` / `MutationHandle`**: binders
//! - **`CacheManager`**: prefix invalidation and clearing
//!
//! ## Example
//!
//! ```ignore
//! use api_swr_runtime::{ControllerFactory, QueryConfig};
//! use api_swr_core::client::ClientMap;
//!
//! let factory = ControllerFactory::builder(engine).build();
//! let users = factory.create_controller("users", ClientMap::normalize(api), None);
//!
//! let get_user = users.endpoint("getUser").ok_or("no such endpoint")?;
//! let query = get_user.use_query(Some(QueryConfig::new().cache_key("id").params(params)));
//! assert_eq!(query.cache_key(), Some("users.getUser.42"));
//!
//! let response = query.load().await;
//!
//! // After a mutation, refresh every key under this endpoint.
//! factory.cache_manager().invalidate(get_user.starts_with_invalidator()).await;
//! ```

/// Bulk cache operations
pub mod cache_manager;

/// Controller factory and controllers
pub mod controller;

/// Per-endpoint tools
pub mod endpoint;

/// Infinite (paged) query binder
pub mod infinite;

/// Metrics for dispatch and cache operations
pub mod metrics;

/// Mock registry
pub mod mock;

/// Mutation binder
pub mod mutation;

/// Request lifecycle of one call site
pub mod orchestrator;

/// Query binder
pub mod query;

pub use cache_manager::CacheManager;
pub use controller::{Controller, ControllerFactory, ControllerFactoryBuilder};
pub use endpoint::EndpointTools;
pub use infinite::{InfiniteQueryConfig, InfiniteQueryHandle, InfiniteQueryResponse, PageParamsFn};
pub use mock::MockRegistry;
pub use mutation::{MutationConfig, MutationHandle};
pub use orchestrator::{FetchBindings, FetchOrchestrator, RequestState};
pub use query::{QueryConfig, QueryHandle, QueryResponse};
