//! Audio engine seam
//!
//! The playback scheduler talks to audio output only through this trait.
//! Times are seconds on the engine's monotonic audio clock.

use super::types::AudioClip;
use crate::error::Result;
use std::sync::Arc;
use tokio::sync::oneshot;

pub type SourceId = u64;

/// A source accepted by the engine
#[derive(Debug)]
pub struct SourceHandle {
    pub id: SourceId,
    /// Actual start on the audio clock
    pub start_at: f64,
    pub end_at: f64,
    /// Resolves on the natural end of the source. Closed without a value
    /// when the source is stopped.
    pub ended: oneshot::Receiver<()>,
}

pub trait AudioEngine: Send + Sync {
    /// Output sample rate clips must be converted to
    fn sample_rate(&self) -> u32;

    /// Current audio clock
    fn current_time(&self) -> f64;

    /// Schedule `clip` to start at `when`
    fn start_source(&self, clip: Arc<AudioClip>, when: f64) -> Result<SourceHandle>;

    /// Hard-stop a scheduled or sounding source
    fn stop_source(&self, id: SourceId);
}
