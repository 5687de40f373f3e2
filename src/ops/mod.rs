//! Feature mutations.
//!
//! Thin, typed wrappers the attendance pages call. Each one flows through
//! the optimistic mutation executor with registry keys, then hands failures
//! to the coordinator's global 401/403 policy before surfacing them.

pub mod requests;
pub mod stamps;

use thiserror::Error;

use crate::session::signals::messages;
use crate::transport::{Transport, TransportError};
use crate::AppContext;

#[derive(Debug, Error)]
pub enum MutationError {
    /// Another actor already changed the resource; rolled back, not retried.
    #[error("{}", messages::CONFLICT)]
    Conflict,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Route a settled mutation result through the global failure policy.
///
/// The rollback has already happened by the time this runs; feature code
/// never re-implements redirect logic.
pub(crate) async fn settle<T: Transport, V>(
    ctx: &AppContext<T>,
    result: Result<V, TransportError>,
) -> Result<V, MutationError> {
    match result {
        Ok(value) => Ok(value),
        Err(err) => {
            ctx.session.handle_transport_error(&err).await;
            if err.is_conflict() {
                Err(MutationError::Conflict)
            } else {
                Err(MutationError::Transport(err))
            }
        }
    }
}
