//! Controller factory.
//!
//! A [`ControllerFactory`] holds the global layer: the cache engine, global
//! fetch config, mocking switch, processing hook, global fetch wrapper and
//! engine config. Each [`Controller`] it creates binds one normalized client
//! map under a controller key and exposes one [`EndpointTools`] record per
//! endpoint.
//!
//! # Example
//!
//! ```ignore
//! use api_swr_runtime::ControllerFactory;
//!
//! let factory = ControllerFactory::builder(engine)
//!     .global_fetch_config(FetchConfig::new().with("withCredentials", true))
//!     .use_api_processing(|p| p.error.as_ref().map(ToString::to_string))
//!     .build();
//!
//! let users = factory.create_controller("users", client, None);
//! let get_user = users.endpoint("getUser").ok_or("unknown endpoint")?;
//!
//! let query = get_user.use_query(Some(
//!     QueryConfig::new().cache_key("id").params(params),
//! ));
//! let response = query.load().await;
//! ```

use crate::cache_manager::CacheManager;
use crate::endpoint::{Dispatcher, EndpointContext, EndpointTools};
use crate::mock::MockRegistry;
use api_swr_core::cache_key::EndpointIdentity;
use api_swr_core::client::{ClientMap, RemoteFn};
use api_swr_core::config::{EngineConfig, FetchConfig};
use api_swr_core::engine::CacheEngine;
use api_swr_core::hooks::{FetchWrapper, GlobalFetchWrapperHook, ProcessingHook, ProcessingParams};
use api_swr_core::settings::Settings;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Global layer shared by every controller of a factory.
pub(crate) struct FactorySetup<R> {
    pub(crate) engine: Arc<dyn CacheEngine>,
    pub(crate) global_fetch_config: Option<FetchConfig>,
    pub(crate) base_path: Option<String>,
    pub(crate) enable_mocking: bool,
    pub(crate) processing: Option<ProcessingHook<R>>,
    pub(crate) global_wrapper: Option<GlobalFetchWrapperHook>,
    pub(crate) swr_config: Option<EngineConfig>,
    pub(crate) swr_infinite_config: Option<EngineConfig>,
}

/// Builder for [`ControllerFactory`].
///
/// `R` is the return type of the processing hook; it is `()` until
/// [`use_api_processing`](Self::use_api_processing) sets a hook.
#[must_use]
pub struct ControllerFactoryBuilder<R = ()> {
    setup: FactorySetup<R>,
}

impl<R> ControllerFactoryBuilder<R> {
    /// Global fetch config layer.
    pub fn global_fetch_config(mut self, config: FetchConfig) -> Self {
        self.setup.global_fetch_config = Some(config);
        self
    }

    /// Base path handed to client constructors.
    pub fn base_path(mut self, base_path: impl Into<String>) -> Self {
        self.setup.base_path = Some(base_path.into());
        self
    }

    /// Route every dispatch to registered mocks.
    pub const fn enable_mocking(mut self, enabled: bool) -> Self {
        self.setup.enable_mocking = enabled;
        self
    }

    /// Global fetch wrapper hook, evaluated each time a binder is built.
    pub fn use_global_fetch_wrapper<F>(mut self, hook: F) -> Self
    where
        F: Fn() -> FetchWrapper + Send + Sync + 'static,
    {
        self.setup.global_wrapper = Some(Arc::new(hook));
        self
    }

    /// Global engine config for queries.
    pub fn swr_config(mut self, config: EngineConfig) -> Self {
        self.setup.swr_config = Some(config);
        self
    }

    /// Global engine config for infinite queries.
    pub fn swr_infinite_config(mut self, config: EngineConfig) -> Self {
        self.setup.swr_infinite_config = Some(config);
        self
    }

    /// Apply loaded settings. Builder calls made afterwards override them.
    pub fn settings(mut self, settings: Settings) -> Self {
        let Settings {
            base_path,
            enable_mocking,
            fetch_config,
            swr_config,
            swr_infinite_config,
        } = settings;
        if base_path.is_some() {
            self.setup.base_path = base_path;
        }
        if fetch_config.is_some() {
            self.setup.global_fetch_config = fetch_config;
        }
        if swr_config.is_some() {
            self.setup.swr_config = swr_config;
        }
        if swr_infinite_config.is_some() {
            self.setup.swr_infinite_config = swr_infinite_config;
        }
        if let Some(enable_mocking) = enable_mocking {
            self.setup.enable_mocking = enable_mocking;
        }
        self
    }

    /// Global response-processing hook. Its return value is surfaced as
    /// `processing_response` by every binder.
    pub fn use_api_processing<R2, F>(self, hook: F) -> ControllerFactoryBuilder<R2>
    where
        F: Fn(&ProcessingParams) -> R2 + Send + Sync + 'static,
    {
        let FactorySetup {
            engine,
            global_fetch_config,
            base_path,
            enable_mocking,
            global_wrapper,
            swr_config,
            swr_infinite_config,
            processing: _,
        } = self.setup;
        ControllerFactoryBuilder {
            setup: FactorySetup {
                engine,
                global_fetch_config,
                base_path,
                enable_mocking,
                processing: Some(Arc::new(hook)),
                global_wrapper,
                swr_config,
                swr_infinite_config,
            },
        }
    }

    /// Finish building.
    pub fn build(self) -> ControllerFactory<R> {
        ControllerFactory {
            setup: Arc::new(self.setup),
        }
    }
}

/// Creates controllers that share one global layer.
pub struct ControllerFactory<R = ()> {
    setup: Arc<FactorySetup<R>>,
}

impl<R> Clone for ControllerFactory<R> {
    fn clone(&self) -> Self {
        Self {
            setup: Arc::clone(&self.setup),
        }
    }
}

impl<R> fmt::Debug for ControllerFactory<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerFactory")
            .field("base_path", &self.setup.base_path)
            .field("enable_mocking", &self.setup.enable_mocking)
            .field("global_fetch_config", &self.setup.global_fetch_config)
            .field("processing", &self.setup.processing.is_some())
            .field("global_wrapper", &self.setup.global_wrapper.is_some())
            .finish_non_exhaustive()
    }
}

impl ControllerFactory {
    /// Start building a factory over `engine`.
    pub fn builder(engine: Arc<dyn CacheEngine>) -> ControllerFactoryBuilder {
        ControllerFactoryBuilder {
            setup: FactorySetup {
                engine,
                global_fetch_config: None,
                base_path: None,
                enable_mocking: false,
                processing: None,
                global_wrapper: None,
                swr_config: None,
                swr_infinite_config: None,
            },
        }
    }
}

impl<R: Clone + Send + Sync + 'static> ControllerFactory<R> {
    /// Bind `client` under `controller_key`.
    ///
    /// `controller_config` is layered between the global and the call-site
    /// fetch config of every endpoint.
    #[must_use]
    #[tracing::instrument(skip(self, client, controller_config), name = "create_controller")]
    pub fn create_controller(
        &self,
        controller_key: &str,
        client: ClientMap,
        controller_config: Option<FetchConfig>,
    ) -> Controller<R> {
        let mocks = MockRegistry::new();
        let endpoints: BTreeMap<String, EndpointTools<R>> = client
            .into_iter()
            .map(|(endpoint_key, real)| {
                let tools = self.endpoint_tools(controller_key, &endpoint_key, real, &mocks, controller_config.clone());
                (endpoint_key, tools)
            })
            .collect();

        tracing::info!(
            controller_key,
            endpoints = endpoints.len(),
            mocking = self.setup.enable_mocking,
            "controller created"
        );

        Controller {
            controller_key: controller_key.to_string(),
            endpoints,
            mocks,
        }
    }

    /// Construct a client through `build` and bind it under `controller_key`.
    ///
    /// `build` receives the factory's base path and the controller config
    /// (or, when absent, the global fetch config).
    #[must_use]
    pub fn create_controller_with<F>(
        &self,
        controller_key: &str,
        build: F,
        controller_config: Option<FetchConfig>,
    ) -> Controller<R>
    where
        F: FnOnce(Option<&str>, Option<&FetchConfig>) -> ClientMap,
    {
        let client = build(
            self.setup.base_path.as_deref(),
            controller_config
                .as_ref()
                .or(self.setup.global_fetch_config.as_ref()),
        );
        self.create_controller(controller_key, client, controller_config)
    }

    fn endpoint_tools(
        &self,
        controller_key: &str,
        endpoint_key: &str,
        real: RemoteFn,
        mocks: &MockRegistry,
        controller_config: Option<FetchConfig>,
    ) -> EndpointTools<R> {
        let identity = EndpointIdentity::new(controller_key, endpoint_key);
        EndpointTools::new(EndpointContext {
            dispatcher: Dispatcher::new(identity.clone(), real, mocks.clone()),
            identity,
            controller_config,
            setup: Arc::clone(&self.setup),
        })
    }

    /// Cache manager over the factory's engine.
    #[must_use]
    pub fn cache_manager(&self) -> CacheManager {
        CacheManager::new(Arc::clone(&self.setup.engine))
    }

    /// The shared cache engine.
    #[must_use]
    pub fn engine(&self) -> Arc<dyn CacheEngine> {
        Arc::clone(&self.setup.engine)
    }

    /// Configured base path.
    #[must_use]
    pub fn base_path(&self) -> Option<&str> {
        self.setup.base_path.as_deref()
    }

    /// Whether mocking is on by default.
    #[must_use]
    pub fn is_mocking_enabled(&self) -> bool {
        self.setup.enable_mocking
    }
}

/// Endpoint tools of one client, under one controller key.
pub struct Controller<R = ()> {
    controller_key: String,
    endpoints: BTreeMap<String, EndpointTools<R>>,
    mocks: MockRegistry,
}

impl<R> Clone for Controller<R> {
    fn clone(&self) -> Self {
        Self {
            controller_key: self.controller_key.clone(),
            endpoints: self.endpoints.clone(),
            mocks: self.mocks.clone(),
        }
    }
}

impl<R> fmt::Debug for Controller<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("controller_key", &self.controller_key)
            .field("endpoints", &self.endpoints.keys().collect::<Vec<_>>())
            .field("mocks", &self.mocks)
            .finish()
    }
}

impl<R> Controller<R> {
    /// The controller key.
    #[must_use]
    pub fn controller_key(&self) -> &str {
        &self.controller_key
    }

    /// Tools of one endpoint.
    #[must_use]
    pub fn endpoint(&self, endpoint_key: &str) -> Option<&EndpointTools<R>> {
        self.endpoints.get(endpoint_key)
    }

    /// Endpoint keys, in order.
    pub fn endpoint_keys(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }

    /// All endpoints, in key order.
    pub fn endpoints(&self) -> impl Iterator<Item = (&str, &EndpointTools<R>)> {
        self.endpoints.iter().map(|(key, tools)| (key.as_str(), tools))
    }

    /// Merge mock functions into this controller's registry. The last
    /// registration per endpoint key wins.
    pub fn register_mock_endpoints<I, K>(&self, mocks: I)
    where
        I: IntoIterator<Item = (K, RemoteFn)>,
        K: Into<String>,
    {
        let replaced = self.mocks.register(mocks);
        tracing::info!(
            controller_key = %self.controller_key,
            registered = self.mocks.count(),
            replaced,
            "mock endpoints registered"
        );
    }

    /// This controller's mock registry.
    #[must_use]
    pub const fn mocks(&self) -> &MockRegistry {
        &self.mocks
    }
}
