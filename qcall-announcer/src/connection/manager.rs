//! Push-channel lifecycle
//!
//! ```text
//! Idle -> Connecting -> Open -> Closing -> Idle        (teardown)
//!              |          |
//!              +----------+-> Reconnecting -> Connecting ...
//!                                  |
//!                                  +-> Failed -> reload (after grace)
//! ```
//!
//! A failed connect and an unexpected close are handled the same way.

use super::backoff::ReconnectPolicy;
use super::transport::{PushChannel, PushConnector};
use crate::notify::{Notice, Notifier};
use crate::playback::{DispatchInput, DispatchSender};
use qcall_common::events::{parse_push_message, PushPayload};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Reconnecting,
    Failed,
}

/// Why [`ConnectionManager::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionExit {
    /// Torn down by cancellation
    Stopped,
    /// Retries exhausted; the owner should rebuild the engine
    ReloadRequested,
}

enum PumpExit {
    Cancelled,
    Lost,
}

pub struct ConnectionManager {
    connector: Arc<dyn PushConnector>,
    policy: ReconnectPolicy,
    dispatch: DispatchSender,
    notifier: Arc<dyn Notifier>,
    state: watch::Sender<ConnectionState>,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn PushConnector>,
        policy: ReconnectPolicy,
        dispatch: DispatchSender,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            connector,
            policy,
            dispatch,
            notifier,
            state,
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = ?previous, to = ?next, "Connection state changed");
        }
    }

    /// Connect, pump messages and reconnect until cancelled or failed.
    pub async fn run(self, cancel: CancellationToken) -> ConnectionExit {
        // Retries used since the last successful open
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                self.set_state(ConnectionState::Idle);
                return ConnectionExit::Stopped;
            }

            self.set_state(ConnectionState::Connecting);
            let connected = tokio::select! {
                _ = cancel.cancelled() => {
                    self.set_state(ConnectionState::Idle);
                    return ConnectionExit::Stopped;
                }
                result = self.connector.connect() => result,
            };

            match connected {
                Ok(channel) => {
                    self.set_state(ConnectionState::Open);
                    info!(retries = attempt, "Push channel open");
                    if attempt > 0 {
                        self.notifier.notify(Notice::Reconnected);
                    }
                    attempt = 0;
                    let _ = self.dispatch.send(DispatchInput::SessionReset);

                    match self.pump(channel, &cancel).await {
                        PumpExit::Cancelled => return ConnectionExit::Stopped,
                        PumpExit::Lost => warn!("Push channel closed unexpectedly"),
                    }
                }
                Err(e) => warn!(error = %e, "Push channel connect failed"),
            }

            if self.policy.exhausted(attempt) {
                return self.fail(attempt, &cancel).await;
            }

            attempt += 1;
            let delay = self.policy.delay_for(attempt);
            self.set_state(ConnectionState::Reconnecting);
            self.notifier.notify(Notice::Retrying {
                attempt,
                max_attempts: self.policy.max_attempts,
                delay,
            });

            tokio::select! {
                _ = cancel.cancelled() => {
                    self.set_state(ConnectionState::Idle);
                    return ConnectionExit::Stopped;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn fail(&self, attempts: u32, cancel: &CancellationToken) -> ConnectionExit {
        self.set_state(ConnectionState::Failed);
        self.notifier.notify(Notice::ConnectionFailed { attempts });
        self.notifier.notify(Notice::ReloadScheduled {
            grace: self.policy.reload_grace,
        });

        tokio::select! {
            _ = cancel.cancelled() => ConnectionExit::Stopped,
            _ = tokio::time::sleep(self.policy.reload_grace) => {
                info!("Reload grace elapsed, requesting engine reload");
                ConnectionExit::ReloadRequested
            }
        }
    }

    async fn pump(&self, mut channel: Box<dyn PushChannel>, cancel: &CancellationToken) -> PumpExit {
        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                message = channel.recv() => message,
            };

            match message {
                Some(Ok(text)) => self.deliver(&text),
                Some(Err(e)) => {
                    warn!(error = %e, "Push channel read failed");
                    return PumpExit::Lost;
                }
                None => return PumpExit::Lost,
            }
        }

        // Reading has stopped, so the close below cannot look like a loss
        self.set_state(ConnectionState::Closing);
        channel.close().await;
        self.set_state(ConnectionState::Idle);
        debug!("Push channel closed");
        PumpExit::Cancelled
    }

    /// Parse one text message and forward it to the dispatcher
    fn deliver(&self, text: &str) {
        let update = match parse_push_message(text) {
            Ok(PushPayload::QueueUpdate(update)) => update,
            Ok(PushPayload::Ignored(kind)) => {
                trace!(kind = %kind, "Ignoring push message");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Dropping malformed push message");
                return;
            }
        };

        if update.dropped_entries > 0 {
            warn!(dropped = update.dropped_entries, "queue_update had unusable entries");
        }

        let _ = self.dispatch.send(DispatchInput::Board(update.board));
        let input = match update.currently_playing {
            Some(call) => DispatchInput::Call(call),
            None => DispatchInput::ClearDisplay,
        };
        let _ = self.dispatch.send(input);
    }
}
