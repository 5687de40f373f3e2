use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("Session cannot expire at or before its creation")]
    ExpiresBeforeCreation,
    #[error("Last activity cannot precede session creation")]
    ActivityBeforeCreation,
}

/// The client's record of one authenticated session window.
///
/// Owned exclusively by the session coordinator; the timeout tracker only
/// ever holds a clone for the duration of one timer cycle. Replaced
/// wholesale on refresh/extend, dropped on logout, expiry, or any 401.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescriptor {
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub warning_threshold_minutes: u32,
}

impl SessionDescriptor {
    pub fn new(
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        last_activity: DateTime<Utc>,
        warning_threshold_minutes: u32,
    ) -> Result<Self, DescriptorError> {
        if expires_at <= created_at {
            return Err(DescriptorError::ExpiresBeforeCreation);
        }
        if last_activity < created_at {
            return Err(DescriptorError::ActivityBeforeCreation);
        }
        Ok(Self {
            created_at,
            expires_at,
            last_activity,
            warning_threshold_minutes,
        })
    }

    /// Milliseconds until expiry; negative once expired.
    pub fn remaining_ms(&self, now: DateTime<Utc>) -> i64 {
        self.expires_at
            .signed_duration_since(now)
            .num_milliseconds()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.remaining_ms(now) <= 0
    }

    /// Within the warning window and not yet expired.
    pub fn is_expiring(&self, now: DateTime<Utc>) -> bool {
        let remaining = self.remaining_ms(now);
        remaining > 0 && remaining <= i64::from(self.warning_threshold_minutes) * 60_000
    }
}

/// Employee identity as returned by the session endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub admin: bool,
    pub email: String,
    pub first_name: String,
    pub id: i64,
    pub last_name: String,
}

/// Wire shape of the session resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResource {
    pub authenticated: bool,
    pub employee: Option<SessionUser>,
}

/// Exactly one variant holds at any instant; every event maps to exactly
/// one next state.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum AuthState {
    Authenticated {
        descriptor: SessionDescriptor,
        user: SessionUser,
    },
    Loading,
    #[default]
    Unauthenticated,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated { .. })
    }

    pub fn descriptor(&self) -> Option<&SessionDescriptor> {
        match self {
            AuthState::Authenticated { descriptor, .. } => Some(descriptor),
            _ => None,
        }
    }

    pub fn user(&self) -> Option<&SessionUser> {
        match self {
            AuthState::Authenticated { user, .. } => Some(user),
            _ => None,
        }
    }
}
