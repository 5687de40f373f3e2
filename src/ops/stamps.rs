//! Stamp history mutations (clock-in/out corrections).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::cache::{keys, run_optimistic};
use crate::transport::{Transport, TransportError};
use crate::AppContext;

use super::{settle, MutationError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StampEdit {
    pub id: i64,
    pub in_time: Option<String>,
    pub out_time: Option<String>,
}

/// Edit one stamp in the month's history.
///
/// The list entry is updated optimistically; on failure it reverts and
/// `on_rollback` fires. The stamp family and the dashboard are invalidated
/// either way, since both derive from the same underlying records.
pub async fn update_stamp<T: Transport>(
    ctx: &AppContext<T>,
    edit: StampEdit,
    year: i32,
    month: u32,
    on_rollback: impl FnOnce(&TransportError),
) -> Result<Value, MutationError> {
    let key = keys::stamp_history(year, month);
    let transport = Arc::clone(&ctx.transport);

    let result = run_optimistic(
        &ctx.cache,
        &key,
        edit,
        |snapshot, edit| {
            let mut list = snapshot?;
            if let Some(items) = list.as_array_mut() {
                for item in items.iter_mut() {
                    if item["id"] == json!(edit.id) {
                        if let Some(in_time) = &edit.in_time {
                            item["inTime"] = json!(in_time);
                        }
                        if let Some(out_time) = &edit.out_time {
                            item["outTime"] = json!(out_time);
                        }
                    }
                }
            }
            Some(list)
        },
        |edit| async move {
            let path = format!("/api/stamps/{}", edit.id);
            let body = serde_json::to_value(&edit).map_err(TransportError::from)?;
            transport.put(&path, Some(body)).await
        },
        |_| {},
        on_rollback,
        &[keys::stamps_root(), keys::dashboard()],
    )
    .await;

    settle(ctx, result).await
}

/// Delete one stamp from the month's history.
pub async fn delete_stamp<T: Transport>(
    ctx: &AppContext<T>,
    id: i64,
    year: i32,
    month: u32,
    on_rollback: impl FnOnce(&TransportError),
) -> Result<Value, MutationError> {
    let key = keys::stamp_history(year, month);
    let transport = Arc::clone(&ctx.transport);

    let result = run_optimistic(
        &ctx.cache,
        &key,
        id,
        |snapshot, id| {
            let mut list = snapshot?;
            if let Some(items) = list.as_array_mut() {
                items.retain(|item| item["id"] != json!(id));
            }
            Some(list)
        },
        |id| async move { transport.delete(&format!("/api/stamps/{id}")).await },
        |_| {},
        on_rollback,
        &[keys::stamps_root(), keys::dashboard()],
    )
    .await;

    settle(ctx, result).await
}
