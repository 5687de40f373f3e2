//! Auth signal bus and redirect targets.
//!
//! Emitted by the global 401/403 policy and consumed by whatever owns
//! navigation and toasts; the subsystem itself never renders anything.

use tokio::sync::broadcast::{channel, Receiver, Sender};
use tracing::debug;

/// Fixed user-facing messages. Login failures are deliberately flattened to
/// one message so the response never reveals which credential was wrong.
pub mod messages {
    pub const CONFLICT: &str = "他のユーザーによって既に処理されています。";
    pub const FORBIDDEN: &str = "この操作を行う権限がありません。";
    pub const LOGIN_FAILED: &str = "メールアドレスまたはパスワードが正しくありません。";
    pub const SESSION_EXPIRED: &str = "セッションの有効期限が切れました。再度ログインしてください。";
}

/// Redirect targets signalled alongside auth failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Home,
    SignIn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthSignal {
    Forbidden { message: String },
    Unauthorized { message: String },
}

#[derive(Clone)]
pub struct SignalBus {
    sender: Sender<AuthSignal>,
}

impl SignalBus {
    pub fn new() -> Self {
        let (sender, _) = channel(16);
        Self { sender }
    }

    pub fn subscribe(&self) -> Receiver<AuthSignal> {
        self.sender.subscribe()
    }

    /// Fire a signal; a missing subscriber is not an error.
    pub fn emit(&self, signal: AuthSignal) {
        debug!(?signal, "auth signal emitted");
        let _ = self.sender.send(signal);
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}
