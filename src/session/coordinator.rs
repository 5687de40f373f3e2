//! Auth session coordinator.
//!
//! Single source of truth for "am I logged in, as whom, until when", and the
//! process-wide policy for what happens when the server says otherwise
//! (401 clears the session and redirects to sign-in; 403 redirects home).

use chrono::{Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::{keys, CacheStore};
use crate::config::SessionConfig;
use crate::transport::{Transport, TransportError};

use super::descriptor::{
    AuthState, DescriptorError, SessionDescriptor, SessionResource, SessionUser,
};
use super::signals::{messages, AuthSignal, Route, SignalBus};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{}", messages::LOGIN_FAILED)]
    InvalidCredentials,
    #[error("Invalid session window: {0}")]
    Descriptor(#[from] DescriptorError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

pub struct SessionCoordinator<T: Transport> {
    cache: CacheStore,
    config: SessionConfig,
    signals: SignalBus,
    state: RwLock<AuthState>,
    transport: Arc<T>,
}

impl<T: Transport> SessionCoordinator<T> {
    pub fn new(transport: Arc<T>, cache: CacheStore, config: SessionConfig) -> Self {
        Self {
            cache,
            config,
            signals: SignalBus::new(),
            state: RwLock::new(AuthState::Unauthenticated),
            transport,
        }
    }

    pub fn signals(&self) -> &SignalBus {
        &self.signals
    }

    pub async fn state(&self) -> AuthState {
        self.state.read().await.clone()
    }

    pub async fn descriptor(&self) -> Option<SessionDescriptor> {
        self.state.read().await.descriptor().cloned()
    }

    pub async fn is_session_expiring(&self) -> bool {
        self.descriptor()
            .await
            .is_some_and(|d| d.is_expiring(Utc::now()))
    }

    /// Log in with the given credentials.
    ///
    /// Every failure is flattened to [`SessionError::InvalidCredentials`]
    /// so the caller's messaging cannot reveal which credential was wrong.
    pub async fn login(&self, credentials: &Credentials) -> Result<SessionUser, SessionError> {
        *self.state.write().await = AuthState::Loading;

        let body = serde_json::json!({
            "email": credentials.email,
            "password": credentials.password,
        });

        match self.transport.post("/api/login", Some(body)).await {
            Ok(value) => {
                let user: SessionUser = match serde_json::from_value(value) {
                    Ok(user) => user,
                    Err(e) => {
                        warn!(error = %e, "login response failed to decode");
                        *self.state.write().await = AuthState::Unauthenticated;
                        return Err(SessionError::InvalidCredentials);
                    }
                };

                let descriptor = self.fresh_descriptor()?;
                self.prime_session_cache(&user).await;
                *self.state.write().await = AuthState::Authenticated {
                    descriptor,
                    user: user.clone(),
                };

                if self.transport.csrf_token().is_some() {
                    debug!("anti-forgery token refreshed");
                }
                info!(employee_id = user.id, "logged in");
                Ok(user)
            }
            Err(err) => {
                warn!(error = %err, "login failed");
                *self.state.write().await = AuthState::Unauthenticated;
                Err(SessionError::InvalidCredentials)
            }
        }
    }

    /// Log out: best-effort remote, guaranteed local.
    ///
    /// Local state is never left authenticated, whatever the server or the
    /// network does. Idempotent when already unauthenticated.
    pub async fn logout(&self) {
        if let Err(err) = self.transport.post("/api/logout", None).await {
            warn!(error = %err, "remote logout failed; clearing local session anyway");
        }

        *self.state.write().await = AuthState::Unauthenticated;
        self.cache.clear().await;
        info!("logged out");
    }

    /// Re-fetch the session from the transport, replacing the descriptor
    /// wholesale with a fresh activity window.
    pub async fn refresh_session(&self) -> Result<(), SessionError> {
        // A 401 here means the server already dropped the session; it goes
        // through the same global policy as every other transport path.
        let value = match self.transport.get("/api/session").await {
            Ok(value) => value,
            Err(err) => {
                self.handle_transport_error(&err).await;
                return Err(SessionError::Transport(err));
            }
        };
        let resource: SessionResource =
            serde_json::from_value(value.clone()).map_err(TransportError::from)?;
        self.cache.set(&keys::session(), value).await;

        match (resource.authenticated, resource.employee) {
            (true, Some(user)) => {
                let created_at = self
                    .descriptor()
                    .await
                    .map_or_else(Utc::now, |d| d.created_at);
                let now = Utc::now();
                let descriptor = SessionDescriptor::new(
                    created_at,
                    now + Duration::seconds(self.config.session_duration_seconds as i64),
                    now,
                    self.config.warning_threshold_minutes,
                )?;
                *self.state.write().await = AuthState::Authenticated { descriptor, user };
                debug!("session refreshed");
            }
            _ => {
                *self.state.write().await = AuthState::Unauthenticated;
                debug!("session refresh found no authenticated session");
            }
        }
        Ok(())
    }

    /// Extension callback for the timeout tracker's "stay signed in" path.
    pub async fn extend_session(&self) -> Result<(), SessionError> {
        self.refresh_session().await
    }

    /// Fetch the session resource through the cache (staleness respected),
    /// syncing the auth state with what resolved.
    pub async fn fetch_session(&self) -> Result<SessionResource, TransportError> {
        // Loading brackets the initial fetch; later fetches resolve from a
        // known state.
        {
            let mut state = self.state.write().await;
            if *state == AuthState::Unauthenticated {
                *state = AuthState::Loading;
            }
        }

        let transport = Arc::clone(&self.transport);
        let fetched = self
            .cache
            .fetch_with(&keys::session(), || async move {
                transport.get("/api/session").await
            })
            .await;

        let value = match fetched {
            Ok(value) => value,
            Err(err) => {
                let mut state = self.state.write().await;
                if *state == AuthState::Loading {
                    *state = AuthState::Unauthenticated;
                }
                return Err(err);
            }
        };
        let resource: SessionResource = serde_json::from_value(value)?;

        match (resource.authenticated, &resource.employee) {
            (true, Some(user)) => {
                let mut state = self.state.write().await;
                if !state.is_authenticated() {
                    // Session resolved server-side while we had no local
                    // descriptor (e.g. page reload); adopt a fresh window.
                    match self.fresh_descriptor() {
                        Ok(descriptor) => {
                            *state = AuthState::Authenticated {
                                descriptor,
                                user: user.clone(),
                            };
                        }
                        Err(e) => warn!(error = %e, "could not adopt session window"),
                    }
                }
            }
            _ => {
                *self.state.write().await = AuthState::Unauthenticated;
            }
        }
        Ok(resource)
    }

    /// Process-wide transport failure policy.
    ///
    /// 401: session is gone server-side; clear local state, signal, and
    /// redirect to sign-in. 403: signal and redirect home. Anything else is
    /// the caller's problem and propagates untouched.
    pub async fn handle_transport_error(&self, err: &TransportError) -> Option<Route> {
        if err.is_unauthorized() {
            *self.state.write().await = AuthState::Unauthenticated;
            self.cache.remove(&keys::session()).await;
            self.signals.emit(AuthSignal::Unauthorized {
                message: messages::SESSION_EXPIRED.to_string(),
            });
            Some(Route::SignIn)
        } else if err.is_forbidden() {
            self.signals.emit(AuthSignal::Forbidden {
                message: messages::FORBIDDEN.to_string(),
            });
            Some(Route::Home)
        } else {
            None
        }
    }

    /// Silent local sign-out on timer expiry; the signal consumer redirects.
    pub async fn expire(&self) {
        *self.state.write().await = AuthState::Unauthenticated;
        self.cache.clear().await;
        self.signals.emit(AuthSignal::Unauthorized {
            message: messages::SESSION_EXPIRED.to_string(),
        });
        info!("session expired; local state cleared");
    }

    fn fresh_descriptor(&self) -> Result<SessionDescriptor, DescriptorError> {
        let now = Utc::now();
        SessionDescriptor::new(
            now,
            now + Duration::seconds(self.config.session_duration_seconds as i64),
            now,
            self.config.warning_threshold_minutes,
        )
    }

    async fn prime_session_cache(&self, user: &SessionUser) {
        let resource = SessionResource {
            authenticated: true,
            employee: Some(user.clone()),
        };
        if let Ok(value) = serde_json::to_value(&resource) {
            self.cache.set(&keys::session(), value).await;
        }
    }
}
