//! # api-swr Core
//!
//! Core types for binding remote-call functions to a stale-while-revalidate
//! cache engine.
//!
//! This crate is runtime-agnostic. It defines how cache keys are derived and
//! matched, how configuration is layered, how remote clients are normalized,
//! and the boundary trait of the cache engine. Orchestration lives in
//! `api-swr-runtime`.
//!
//! ## Core Concepts
//!
//! - **Endpoint**: one remote function of a controller, identified by
//!   `controller.endpoint`
//! - **Cache key**: endpoint id plus parameter-derived segments; `None` means
//!   "not ready"
//! - **Config layers**: global, controller and call-site fetch config, merged
//!   shallowly with later layers winning
//! - **Envelope**: `{ data, status, statusText, ... }` responses, unwrapped
//!   into their payload
//! - **Cache engine**: external store keyed by resolved cache keys
//!
//! ## Example
//!
//! ```ignore
//! use api_swr_core::cache_key::{resolve, CacheKeySpec};
//! use api_swr_core::client::{remote_fn, ClientMap};
//!
//! let client = ClientMap::new().with(
//!     "getUser",
//!     remote_fn(|params, _config| async move { Ok(serde_json::json!({ "params": params })) }),
//! );
//!
//! let params = serde_json::json!({ "id": 42 });
//! let key = resolve("users.getUser", Some(&CacheKeySpec::param("id")), params.as_object());
//! assert_eq!(key.as_deref(), Some("users.getUser.42"));
//! ```

pub mod cache_key;
pub mod client;
pub mod config;
pub mod endpoint_ids;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod memo;
pub mod settings;

/// Parameters of one endpoint invocation.
pub type Params = serde_json::Map<String, serde_json::Value>;

pub use cache_key::{CacheKey, CacheKeySpec, EndpointIdentity, KeyMatcher, KeySuffix};
pub use client::{ClientMap, Envelope, RemoteClient, RemoteFn, RemoteResponse, RemoteResult, remote_fn};
pub use config::{CallSiteConfig, ConfigMap, EngineConfig, FetchConfig, FetchOptions};
pub use endpoint_ids::EndpointIds;
pub use engine::{CacheEngine, MutateOptions, MutateTarget, Mutation};
pub use error::FetchError;
pub use hooks::{
    FetchWrapper, FetchWrapperParams, GlobalFetchWrapperHook, ProcessingHook, ProcessingParams,
    RequestMode, fetch_wrapper,
};
pub use settings::{Settings, SettingsError};
