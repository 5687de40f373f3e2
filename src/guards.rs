//! Route guards.
//!
//! Pre-navigation loaders that confirm the session (through the cache, so
//! repeated navigations don't always hit the network) and prefetch the
//! destination's primary data. Redirects are a typed outcome variant, not a
//! thrown exception, so the navigation intent is visible in signatures.

use tracing::debug;

use crate::cache::keys;
use crate::session::descriptor::SessionUser;
use crate::session::signals::{messages, AuthSignal, Route};
use crate::transport::{Transport, TransportError};
use crate::AppContext;

#[derive(Debug, Clone, PartialEq)]
pub enum GuardOutcome<T> {
    Allow(T),
    Redirect(Route),
}

impl<T> GuardOutcome<T> {
    pub fn is_redirect(&self) -> bool {
        matches!(self, GuardOutcome::Redirect(_))
    }
}

/// Guard for any authenticated route.
///
/// 401/403 from the session fetch go through the coordinator's global
/// policy (which signals and picks the redirect target); an unauthenticated
/// result redirects to sign-in.
pub async fn require_session<T: Transport>(
    ctx: &AppContext<T>,
) -> Result<GuardOutcome<SessionUser>, TransportError> {
    let resource = match ctx.session.fetch_session().await {
        Ok(resource) => resource,
        Err(err) => {
            if let Some(route) = ctx.session.handle_transport_error(&err).await {
                return Ok(GuardOutcome::Redirect(route));
            }
            return Err(err);
        }
    };

    match (resource.authenticated, resource.employee) {
        (true, Some(user)) => Ok(GuardOutcome::Allow(user)),
        _ => {
            ctx.session.signals().emit(AuthSignal::Unauthorized {
                message: messages::SESSION_EXPIRED.to_string(),
            });
            Ok(GuardOutcome::Redirect(Route::SignIn))
        }
    }
}

/// Loader for the admin news page.
///
/// Confirms the admin capability, then prefetches the news list into the
/// cache so the destination renders without its own loading state. Prefetch
/// failures map through the same 401→sign-in / 403→home policy.
pub async fn admin_loader<T: Transport>(
    ctx: &AppContext<T>,
) -> Result<GuardOutcome<SessionUser>, TransportError> {
    let resource = match ctx.session.fetch_session().await {
        Ok(resource) => resource,
        Err(err) => {
            if let Some(route) = ctx.session.handle_transport_error(&err).await {
                return Ok(GuardOutcome::Redirect(route));
            }
            return Err(err);
        }
    };

    let user = match (resource.authenticated, resource.employee) {
        (true, Some(user)) if user.admin => user,
        _ => {
            ctx.session.signals().emit(AuthSignal::Forbidden {
                message: messages::FORBIDDEN.to_string(),
            });
            return Ok(GuardOutcome::Redirect(Route::Home));
        }
    };

    let transport = std::sync::Arc::clone(&ctx.transport);
    if let Err(err) = ctx
        .cache
        .fetch_with(&keys::news_list(), || async move {
            transport.get("/api/news").await
        })
        .await
    {
        if let Some(route) = ctx.session.handle_transport_error(&err).await {
            return Ok(GuardOutcome::Redirect(route));
        }
        return Err(err);
    }

    debug!(employee_id = user.id, "admin route allowed; news prefetched");
    Ok(GuardOutcome::Allow(user))
}
