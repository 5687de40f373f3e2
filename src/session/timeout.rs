//! Session timeout tracker.
//!
//! Pure, timer-driven derivation of "how much time is left and should I show
//! a warning" from a session descriptor, decoupled from how the descriptor
//! was obtained. The `warning` and `expired` callbacks are one-shot per
//! descriptor instance: leaving the warning window re-arms the warning, and
//! replacing the descriptor (login, refresh, extend) re-arms both.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

use crate::transport::Transport;
use crate::AppContext;

use super::coordinator::SessionError;
use super::descriptor::SessionDescriptor;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerState {
    pub is_expiring: bool,
    pub show_warning: bool,
    pub snooze_until: Option<DateTime<Utc>>,
    pub time_remaining_ms: Option<i64>,
}

/// Result of one periodic check.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerTick {
    /// The expiry was crossed on this tick; fired once per descriptor.
    pub expired: bool,
    pub state: TrackerState,
    /// The warning window was entered on this tick; fired once per episode.
    pub warning_entered: bool,
}

#[derive(Debug, Default)]
pub struct TimeoutTracker {
    current: Option<SessionDescriptor>,
    has_expired: bool,
    has_warned: bool,
    snooze_until: Option<DateTime<Utc>>,
    state: TrackerState,
}

impl TimeoutTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    /// Run one periodic check against the given descriptor (or none).
    pub fn evaluate(
        &mut self,
        descriptor: Option<&SessionDescriptor>,
        now: DateTime<Utc>,
    ) -> TrackerTick {
        let Some(descriptor) = descriptor else {
            // No session: no timer work, no callbacks.
            self.current = None;
            self.reset();
            self.state = TrackerState::default();
            return TrackerTick {
                expired: false,
                state: self.state.clone(),
                warning_entered: false,
            };
        };

        // A replaced descriptor starts a fresh episode.
        if self.current.as_ref() != Some(descriptor) {
            self.current = Some(descriptor.clone());
            self.reset();
        }

        let remaining = descriptor.remaining_ms(now);
        let mut expired = false;
        let mut warning_entered = false;

        if remaining <= 0 {
            expired = !self.has_expired;
            self.has_expired = true;
            self.state = TrackerState {
                is_expiring: false,
                show_warning: false,
                snooze_until: self.snooze_until,
                time_remaining_ms: Some(0),
            };
        } else if descriptor.is_expiring(now) {
            warning_entered = !self.has_warned;
            self.has_warned = true;

            if self.snooze_until.is_some_and(|until| now >= until) {
                self.snooze_until = None;
            }
            self.state = TrackerState {
                is_expiring: true,
                show_warning: self.snooze_until.is_none(),
                snooze_until: self.snooze_until,
                time_remaining_ms: Some(remaining),
            };
        } else {
            // Back above the threshold: re-arm the warning for the next
            // episode.
            self.has_warned = false;
            self.snooze_until = None;
            self.state = TrackerState {
                is_expiring: false,
                show_warning: false,
                snooze_until: None,
                time_remaining_ms: Some(remaining),
            };
        }

        TrackerTick {
            expired,
            state: self.state.clone(),
            warning_entered,
        }
    }

    /// Suppress the warning until `now + minutes`; the warning window itself
    /// is unaffected.
    pub fn snooze(&mut self, minutes: u32, now: DateTime<Utc>) {
        self.snooze_until = Some(now + Duration::minutes(i64::from(minutes)));
        self.state.snooze_until = self.snooze_until;
        self.state.show_warning = false;
    }

    /// Clear the one-shot flags so a fresh descriptor is tracked again;
    /// used by the extend path.
    pub fn reset(&mut self) {
        self.has_expired = false;
        self.has_warned = false;
        self.snooze_until = None;
    }
}

/// Remaining time as `H時間M分S秒`: hours only when non-zero, minutes when
/// hours or minutes are non-zero, seconds always. Never empty.
pub fn format_remaining(ms: i64) -> String {
    let total_seconds = ms.max(0) / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}時間"));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{minutes}分"));
    }
    out.push_str(&format!("{seconds}秒"));
    out
}

pub type SharedTracker = Arc<Mutex<TimeoutTracker>>;

/// Start the periodic timeout watcher.
///
/// Each tick re-reads the coordinator's descriptor, evaluates the tracker,
/// fires `on_warning_enter` once per warning episode, and on expiry signs
/// out locally through the coordinator (the unauthorized signal drives the
/// redirect). Aborting the returned handle stops all callback work; an
/// aborted watcher never fires again.
pub fn start_timeout_watcher<T, W>(
    ctx: Arc<AppContext<T>>,
    tracker: SharedTracker,
    mut on_warning_enter: W,
) -> JoinHandle<()>
where
    T: Transport + 'static,
    W: FnMut(&TrackerState) + Send + 'static,
{
    let interval = std::time::Duration::from_millis(ctx.config.session.check_interval_ms);

    tokio::spawn(async move {
        let mut interval_timer = tokio::time::interval(interval);

        loop {
            interval_timer.tick().await;
            watcher_tick(&ctx, &tracker, Utc::now(), &mut on_warning_enter).await;
        }
    })
}

/// One watcher pass at `now`.
async fn watcher_tick<T, W>(
    ctx: &AppContext<T>,
    tracker: &SharedTracker,
    now: DateTime<Utc>,
    on_warning_enter: &mut W,
) where
    T: Transport,
    W: FnMut(&TrackerState),
{
    let descriptor = ctx.session.descriptor().await;
    let tick = {
        let mut tracker = tracker.lock().await;
        tracker.evaluate(descriptor.as_ref(), now)
    };

    if tick.warning_entered {
        on_warning_enter(&tick.state);
    }
    if tick.expired {
        info!("session expiry reached; signing out");
        ctx.session.expire().await;
    }
}

/// "Stay signed in": extend the session remotely and re-arm the tracker.
pub async fn extend_session<T: Transport>(
    ctx: &AppContext<T>,
    tracker: &SharedTracker,
) -> Result<(), SessionError> {
    ctx.session.extend_session().await?;
    tracker.lock().await.reset();
    Ok(())
}
