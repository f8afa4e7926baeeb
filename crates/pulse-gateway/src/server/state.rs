//! Gateway state
//!
//! Shared dependencies for the gateway server. Everything here is cheap
//! to clone; the state is cloned into each connection task.

use crate::dispatch::Dispatcher;
use crate::ratelimit::RateLimiter;
use crate::resume::ResumeStore;
use crate::session::SessionRegistry;
use crate::store::StorageView;
use pulse_common::{GatewayConfig, TokenService};
use std::sync::Arc;
use std::time::Duration;

/// Gateway application state
#[derive(Clone)]
pub struct GatewayState {
    config: Arc<GatewayConfig>,
    storage: Arc<StorageView>,
    registry: Arc<SessionRegistry>,
    resume_store: Arc<ResumeStore>,
    dispatcher: Arc<Dispatcher>,
    rate_limiter: Arc<RateLimiter>,
    tokens: Arc<TokenService>,
}

impl GatewayState {
    /// Build the full dependency graph from a configuration and a storage
    /// view.
    #[must_use]
    pub fn new(config: GatewayConfig, storage: Arc<StorageView>) -> Self {
        let registry = SessionRegistry::new_shared();
        let resume_store = Arc::new(ResumeStore::new(
            Duration::from_secs(config.session.resume_ttl_secs),
            config.session.max_buffered_events,
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            resume_store.clone(),
            storage.clone(),
        ));
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        let tokens = Arc::new(TokenService::new(
            &config.auth.jwt_secret,
            config.auth.token_expiry_secs,
        ));

        Self {
            config: Arc::new(config),
            storage,
            registry,
            resume_store,
            dispatcher,
            rate_limiter,
            tokens,
        }
    }

    /// State with test configuration and empty storage
    #[must_use]
    pub fn for_tests() -> Self {
        Self::new(GatewayConfig::for_tests(), StorageView::new_shared())
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn storage(&self) -> &StorageView {
        &self.storage
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn resume_store(&self) -> &ResumeStore {
        &self.resume_store
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("registry", &self.registry)
            .field("resume_store", &self.resume_store)
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}
