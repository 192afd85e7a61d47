//! Dispatcher inputs
//!
//! Everything that can change announcement state arrives as one of these,
//! on a single channel, so the dispatcher never needs a lock.

use super::scheduler::PlaybackOutcome;
use qcall_common::CallEvent;
use tokio::sync::mpsc;

/// Identifies one playback session; completions carrying an older id are stale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub enum DispatchInput {
    /// `currently_playing` of a queue update
    Call(CallEvent),

    /// `data` list of a queue update
    Board(Vec<CallEvent>),

    /// `currently_playing` absent or null
    ClearDisplay,

    /// A fresh connection session began
    SessionReset,

    /// The scheduler finished (or gave up on) a session
    PlaybackFinished {
        session: SessionId,
        outcome: PlaybackOutcome,
    },

    /// A display hold timer fired
    DisplayHoldExpired { generation: u64 },
}

pub type DispatchSender = mpsc::UnboundedSender<DispatchInput>;
pub type DispatchReceiver = mpsc::UnboundedReceiver<DispatchInput>;

pub fn dispatch_channel() -> (DispatchSender, DispatchReceiver) {
    mpsc::unbounded_channel()
}
