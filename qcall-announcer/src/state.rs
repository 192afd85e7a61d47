//! Shared view state
//!
//! What the HTTP feed serves. Outlives engine reloads: the engine writes
//! into it, the API reads from it, and every change is broadcast to SSE
//! listeners.

use crate::connection::ConnectionState;
use crate::marquee::Marquee;
use crate::notify::Notice;
use crate::playback::DisplayedCall;
use chrono::{DateTime, Utc};
use qcall_common::time::now_millis;
use qcall_common::CallEvent;
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};

/// Events pushed to view-feed subscribers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    DisplayChanged {
        display: Option<DisplayedCall>,
        timestamp_ms: u64,
    },
    BoardChanged {
        board: Vec<CallEvent>,
        timestamp_ms: u64,
    },
    MarqueeChanged {
        marquee: Marquee,
        timestamp_ms: u64,
    },
    ConnectionChanged {
        state: ConnectionState,
        timestamp_ms: u64,
    },
    Notice {
        notice: Notice,
        message: String,
        timestamp_ms: u64,
    },
}

impl FeedEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            FeedEvent::DisplayChanged { .. } => "DisplayChanged",
            FeedEvent::BoardChanged { .. } => "BoardChanged",
            FeedEvent::MarqueeChanged { .. } => "MarqueeChanged",
            FeedEvent::ConnectionChanged { .. } => "ConnectionChanged",
            FeedEvent::Notice { .. } => "Notice",
        }
    }
}

pub struct SharedState {
    pub display: RwLock<Option<DisplayedCall>>,
    pub board: RwLock<Vec<CallEvent>>,
    pub marquee: RwLock<Option<Marquee>>,
    pub connection: RwLock<ConnectionState>,
    pub started_at: DateTime<Utc>,
    pub event_tx: broadcast::Sender<FeedEvent>,
}

impl SharedState {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            display: RwLock::new(None),
            board: RwLock::new(Vec::new()),
            marquee: RwLock::new(None),
            connection: RwLock::new(ConnectionState::Idle),
            started_at: qcall_common::time::now(),
            event_tx,
        }
    }

    /// Broadcast to all SSE listeners (no receivers is fine)
    pub fn broadcast_event(&self, event: FeedEvent) {
        let _ = self.event_tx.send(event);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<FeedEvent> {
        self.event_tx.subscribe()
    }

    pub async fn get_display(&self) -> Option<DisplayedCall> {
        self.display.read().await.clone()
    }

    pub async fn set_display(&self, display: Option<DisplayedCall>) {
        *self.display.write().await = display.clone();
        self.broadcast_event(FeedEvent::DisplayChanged {
            display,
            timestamp_ms: now_millis(),
        });
    }

    pub async fn get_board(&self) -> Vec<CallEvent> {
        self.board.read().await.clone()
    }

    pub async fn set_board(&self, board: Vec<CallEvent>) {
        *self.board.write().await = board.clone();
        self.broadcast_event(FeedEvent::BoardChanged {
            board,
            timestamp_ms: now_millis(),
        });
    }

    pub async fn get_marquee(&self) -> Option<Marquee> {
        self.marquee.read().await.clone()
    }

    /// Store a polled marquee; broadcasts only when it changed
    pub async fn set_marquee(&self, marquee: Marquee) {
        {
            let mut current = self.marquee.write().await;
            if current.as_ref() == Some(&marquee) {
                return;
            }
            *current = Some(marquee.clone());
        }
        self.broadcast_event(FeedEvent::MarqueeChanged {
            marquee,
            timestamp_ms: now_millis(),
        });
    }

    pub async fn get_connection(&self) -> ConnectionState {
        *self.connection.read().await
    }

    pub async fn set_connection(&self, state: ConnectionState) {
        *self.connection.write().await = state;
        self.broadcast_event(FeedEvent::ConnectionChanged {
            state,
            timestamp_ms: now_millis(),
        });
    }

    pub fn publish_notice(&self, notice: Notice) {
        let message = notice.message();
        self.broadcast_event(FeedEvent::Notice {
            notice,
            message,
            timestamp_ms: now_millis(),
        });
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
