//! "Currently displayed" projection
//!
//! What the view layer shows: the call being announced (or just called,
//! for silent calls) and the board of recently called tickets. Both are
//! published on watch channels; only the dispatcher writes them.

use chrono::{DateTime, Utc};
use qcall_common::CallEvent;
use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayedCall {
    pub call: CallEvent,
    pub shown_at: DateTime<Utc>,
    /// False for calls with `should_play_audio` off
    pub audible: bool,
}

pub struct DisplayProjection {
    current: watch::Sender<Option<DisplayedCall>>,
    board: watch::Sender<Vec<CallEvent>>,
}

impl DisplayProjection {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        let (board, _) = watch::channel(Vec::new());
        Self { current, board }
    }

    pub fn show(&self, call: CallEvent, audible: bool) {
        self.current.send_replace(Some(DisplayedCall {
            call,
            shown_at: qcall_common::time::now(),
            audible,
        }));
    }

    /// Returns whether anything was on display
    pub fn clear(&self) -> bool {
        self.current.send_replace(None).is_some()
    }

    pub fn set_board(&self, board: Vec<CallEvent>) {
        self.board.send_replace(board);
    }

    pub fn current(&self) -> Option<DisplayedCall> {
        self.current.borrow().clone()
    }

    pub fn board(&self) -> Vec<CallEvent> {
        self.board.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<DisplayedCall>> {
        self.current.subscribe()
    }

    pub fn subscribe_board(&self) -> watch::Receiver<Vec<CallEvent>> {
        self.board.subscribe()
    }
}

impl Default for DisplayProjection {
    fn default() -> Self {
        Self::new()
    }
}
