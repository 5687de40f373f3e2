//! Optimistic mutation executor.
//!
//! Every mutating operation shares the same three-phase contract:
//! optimistic apply, remote call, reconcile. Cancellation of in-flight
//! fetches strictly precedes the optimistic apply, which strictly precedes
//! the remote call; the invalidation pass runs exactly once after the write
//! is either confirmed or rolled back.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::future::Future;
use tracing::{debug, warn};

use crate::transport::TransportError;

use super::keys::QueryKey;
use super::store::CacheStore;

/// Snapshot taken before an optimistic apply; consumed on settlement.
#[derive(Debug, Clone)]
pub struct PendingChange {
    pub applied_at: DateTime<Utc>,
    pub key: QueryKey,
    pub previous: Option<Value>,
}

/// Run a mutation with optimistic apply and rollback against the cache.
///
/// The updater receives the current cached value (`None` when the key has no
/// entry yet) and returns the optimistic replacement, or `None` to leave the
/// cache untouched. On failure the entry is restored to the snapshot
/// wholesale, including removing an entry the updater created. Whatever the
/// outcome, every key in `invalidate` is marked stale afterwards so derived
/// views reconcile with authoritative server state.
#[allow(clippy::too_many_arguments)]
pub async fn run_optimistic<V, T, U, F, Fut, S, R>(
    cache: &CacheStore,
    key: &QueryKey,
    variables: V,
    updater: U,
    mutation_fn: F,
    on_success: S,
    on_rollback: R,
    invalidate: &[QueryKey],
) -> Result<T, TransportError>
where
    U: FnOnce(Option<Value>, &V) -> Option<Value>,
    F: FnOnce(V) -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
    S: FnOnce(&T),
    R: FnOnce(&TransportError),
{
    // A late refetch result must never clobber the optimistic value.
    cache.cancel_queries(key).await;

    let previous = cache.snapshot(key).await;
    let pending = PendingChange {
        applied_at: Utc::now(),
        key: key.clone(),
        previous,
    };

    if let Some(next) = updater(pending.previous.clone(), &variables) {
        cache.set(key, next).await;
        debug!(key = %key, "optimistic value applied");
    }

    let result = mutation_fn(variables).await;

    match &result {
        Ok(value) => {
            on_success(value);
        }
        Err(err) => {
            match pending.previous {
                Some(prev) => cache.set(key, prev).await,
                None => {
                    cache.remove(key).await;
                }
            }
            warn!(key = %key, error = %err, "mutation failed; optimistic value rolled back");
            on_rollback(err);
        }
    }

    for family in invalidate {
        cache.invalidate_prefix(family).await;
    }

    result
}
