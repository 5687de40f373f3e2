//! Shared test helpers — available to all `#[cfg(test)]` modules in the crate.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use crate::config::Config;
use crate::session::descriptor::SessionDescriptor;
use crate::transport::{Transport, TransportError};
use crate::AppContext;

type MockResult = Result<Value, (u16, String)>;

/// Programmable in-memory transport.
///
/// Responses are queued per (method, path) and consumed in order; a request
/// with nothing queued panics, which doubles as a "no network call expected"
/// assertion.
pub struct MockTransport {
    calls: Mutex<Vec<(String, String)>>,
    responses: Mutex<VecDeque<(String, String, MockResult)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
        }
    }

    pub fn respond(&self, method: &str, path: &str, body: Value) {
        self.responses.lock().unwrap().push_back((
            method.to_string(),
            path.to_string(),
            Ok(body),
        ));
    }

    pub fn fail(&self, method: &str, path: &str, status: u16, message: &str) {
        self.responses.lock().unwrap().push_back((
            method.to_string(),
            path.to_string(),
            Err((status, message.to_string())),
        ));
    }

    /// Every request made, in order, as (method, path).
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    fn dispatch(&self, method: &str, path: &str) -> Result<Value, TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), path.to_string()));

        let mut responses = self.responses.lock().unwrap();
        let position = responses
            .iter()
            .position(|(m, p, _)| m == method && p == path)
            .unwrap_or_else(|| panic!("no mock response queued for {method} {path}"));

        match responses.remove(position).map(|(_, _, result)| result) {
            Some(Ok(body)) => Ok(body),
            Some(Err((status, message))) => Err(TransportError::Status { status, message }),
            None => unreachable!(),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, path: &str) -> Result<Value, TransportError> {
        self.dispatch("GET", path)
    }

    async fn post(&self, path: &str, _body: Option<Value>) -> Result<Value, TransportError> {
        self.dispatch("POST", path)
    }

    async fn put(&self, path: &str, _body: Option<Value>) -> Result<Value, TransportError> {
        self.dispatch("PUT", path)
    }

    async fn patch(&self, path: &str, _body: Option<Value>) -> Result<Value, TransportError> {
        self.dispatch("PATCH", path)
    }

    async fn delete(&self, path: &str) -> Result<Value, TransportError> {
        self.dispatch("DELETE", path)
    }

    fn csrf_token(&self) -> Option<String> {
        None
    }
}

/// Build an `AppContext` around a fresh mock transport, default config.
pub fn test_ctx() -> (Arc<AppContext<MockTransport>>, Arc<MockTransport>) {
    test_ctx_with_config(Config::default())
}

pub fn test_ctx_with_config(
    config: Config,
) -> (Arc<AppContext<MockTransport>>, Arc<MockTransport>) {
    let transport = Arc::new(MockTransport::new());
    let ctx = Arc::new(AppContext::new(Arc::clone(&transport), config));
    (ctx, transport)
}

/// Wire shape of the employee in session/login responses.
pub fn user_value(admin: bool) -> Value {
    json!({
        "admin": admin,
        "email": "tanaka@example.com",
        "firstName": "太郎",
        "id": 1,
        "lastName": "田中"
    })
}

/// Wire shape of the session resource.
pub fn session_value(authenticated: bool, admin: bool) -> Value {
    if authenticated {
        json!({ "authenticated": true, "employee": user_value(admin) })
    } else {
        json!({ "authenticated": false, "employee": null })
    }
}

/// A descriptor expiring `ttl` after `now`, created an hour in the past.
pub fn descriptor_expiring_in(
    now: DateTime<Utc>,
    ttl: Duration,
    warning_threshold_minutes: u32,
) -> SessionDescriptor {
    SessionDescriptor::new(
        now - Duration::hours(1),
        now + ttl,
        now,
        warning_threshold_minutes,
    )
    .unwrap()
}
