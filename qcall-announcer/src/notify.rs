//! Operator notices
//!
//! Short toast-style messages about the push connection. Which notices are
//! raised, and how many, is decided by the connection manager; notifiers
//! only deliver them.

use crate::state::SharedState;
use serde::{Serialize, Serializer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// Retry `attempt` of `max_attempts` will run after `delay`
    Retrying {
        attempt: u32,
        max_attempts: u32,
        #[serde(rename = "delay_ms", serialize_with = "as_millis")]
        delay: Duration,
    },
    /// Connection re-established after at least one failed attempt
    Reconnected,
    /// Retries exhausted
    ConnectionFailed { attempts: u32 },
    /// A full reload will happen after `grace`
    ReloadScheduled {
        #[serde(rename = "grace_ms", serialize_with = "as_millis")]
        grace: Duration,
    },
}

impl Notice {
    /// Human-readable text for the toast
    pub fn message(&self) -> String {
        match self {
            Notice::Retrying {
                attempt,
                max_attempts,
                delay,
            } => format!(
                "Connection lost, retrying ({}/{}) in {:.1}s",
                attempt,
                max_attempts,
                delay.as_secs_f64()
            ),
            Notice::Reconnected => "Reconnected to queue server".to_string(),
            Notice::ConnectionFailed { attempts } => {
                format!("Could not reach queue server after {} attempts", attempts)
            }
            Notice::ReloadScheduled { grace } => {
                format!("Reloading in {}s", grace.as_secs_f64().round() as u64)
            }
        }
    }
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

fn log_notice(notice: &Notice) {
    match notice {
        Notice::Retrying { attempt, max_attempts, delay } => warn!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            "{}",
            notice.message()
        ),
        Notice::Reconnected => info!("{}", notice.message()),
        Notice::ConnectionFailed { attempts } => error!(attempts, "{}", notice.message()),
        Notice::ReloadScheduled { .. } => warn!("{}", notice.message()),
    }
}

/// Logs notices through tracing
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        log_notice(&notice);
    }
}

/// Logs notices and forwards them to view-feed subscribers
pub struct FeedNotifier {
    state: Arc<SharedState>,
}

impl FeedNotifier {
    pub fn new(state: Arc<SharedState>) -> Self {
        Self { state }
    }
}

impl Notifier for FeedNotifier {
    fn notify(&self, notice: Notice) {
        log_notice(&notice);
        self.state.publish_notice(notice);
    }
}
