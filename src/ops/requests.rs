//! Correction-request approval workflow mutations.

use serde_json::{json, Value};
use std::sync::Arc;

use crate::cache::{keys, run_optimistic};
use crate::transport::{Transport, TransportError};
use crate::AppContext;

use super::{settle, MutationError};

/// Approve a pending correction request.
///
/// The pending-list entry flips to `approved` optimistically. A 409 means
/// another approver got there first: the flip is rolled back and
/// [`MutationError::Conflict`] carries the distinct user-facing message.
/// Stamp history is invalidated too, since an approved correction changes it.
pub async fn approve_request<T: Transport>(
    ctx: &AppContext<T>,
    id: i64,
    on_rollback: impl FnOnce(&TransportError),
) -> Result<Value, MutationError> {
    decide_request(ctx, id, "approve", "approved", on_rollback).await
}

/// Reject a pending correction request.
pub async fn reject_request<T: Transport>(
    ctx: &AppContext<T>,
    id: i64,
    on_rollback: impl FnOnce(&TransportError),
) -> Result<Value, MutationError> {
    decide_request(ctx, id, "reject", "rejected", on_rollback).await
}

async fn decide_request<T: Transport>(
    ctx: &AppContext<T>,
    id: i64,
    action: &str,
    next_status: &'static str,
    on_rollback: impl FnOnce(&TransportError),
) -> Result<Value, MutationError> {
    let key = keys::requests("pending");
    let transport = Arc::clone(&ctx.transport);
    let path = format!("/api/requests/{id}/{action}");

    let result = run_optimistic(
        &ctx.cache,
        &key,
        id,
        |snapshot, id| {
            let mut list = snapshot?;
            if let Some(items) = list.as_array_mut() {
                for item in items.iter_mut() {
                    if item["id"] == json!(id) {
                        item["status"] = json!(next_status);
                    }
                }
            }
            Some(list)
        },
        |_| async move { transport.patch(&path, None).await },
        |_| {},
        on_rollback,
        &[keys::requests_root(), keys::stamps_root(), keys::dashboard()],
    )
    .await;

    settle(ctx, result).await
}
