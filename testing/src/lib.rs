//! # api-swr Testing
//!
//! Testing utilities for api-swr.
//!
//! This crate provides:
//! - [`InMemoryCacheEngine`]: a deterministic [`CacheEngine`] with fetch
//!   counters and mutation logging
//! - [`CallRecorder`]: a remote function double that records its calls
//! - [`init_tracing`]: tracing output for test runs, filtered by `RUST_LOG`
//!
//! ## Example
//!
//! ```ignore
//! use api_swr_testing::{CallRecorder, InMemoryCacheEngine};
//!
//! #[tokio::test]
//! async fn test_user_query() {
//!     let engine = Arc::new(InMemoryCacheEngine::new());
//!     let recorder = CallRecorder::returning(json!({ "name": "Ada" }));
//!     let factory = ControllerFactory::builder(engine.clone()).build();
//!     let users = factory.create_controller(
//!         "users",
//!         ClientMap::new().with("getUser", recorder.remote_fn()),
//!         None,
//!     );
//!     // ...
//! }
//! ```
//!
//! [`CacheEngine`]: api_swr_core::engine::CacheEngine

pub mod memory_engine;
pub mod mocks;

pub use memory_engine::{InMemoryCacheEngine, MutationRecord};
pub use mocks::{CallRecorder, RecordedCall};

/// Install a test-friendly tracing subscriber.
///
/// Output goes through the test writer so it is captured per test. The filter
/// comes from `RUST_LOG` and defaults to `debug` for the api-swr crates. Safe to call from
/// every test; only the first call installs the subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api_swr_core=debug,api_swr_runtime=debug".into()),
        )
        .with_test_writer()
        .try_init();
}
