//! kintai-session - client session lifecycle and cache synchronization for the
//! kintai attendance app
//!
//! This crate provides the stateful core behind the attendance client's pages:
//! - A single source of truth for the authentication state (login, logout,
//!   refresh, forced sign-out on 401)
//! - A timer-driven session timeout tracker with snoozable expiry warnings
//! - A key-addressed query cache with staleness windows and background GC
//! - Optimistic mutations with snapshot/rollback and cascaded invalidation
//! - Route guards that confirm authorization and prefetch page data

pub mod cache;
pub mod config;
pub mod guards;
pub mod ops;
pub mod session;
#[cfg(test)]
pub mod testutil;
pub mod transport;

use std::sync::Arc;

use cache::CacheStore;
use config::Config;
use session::coordinator::SessionCoordinator;
use transport::Transport;

/// Shared application context.
///
/// Constructed once at startup; everything downstream (guards, mutation
/// wrappers, the timeout watcher) borrows it. The coordinator it creates is
/// the single owner of the 401/403 redirect policy, so building the context
/// also installs that policy for every feature path.
pub struct AppContext<T: Transport> {
    pub cache: CacheStore,
    pub config: Config,
    pub session: SessionCoordinator<T>,
    pub transport: Arc<T>,
}

impl<T: Transport> AppContext<T> {
    pub fn new(transport: Arc<T>, config: Config) -> Self {
        let cache = CacheStore::new(config.cache.clone());
        let session = SessionCoordinator::new(
            Arc::clone(&transport),
            cache.clone(),
            config.session.clone(),
        );
        Self {
            cache,
            config,
            session,
            transport,
        }
    }
}
