//! Audio clip types shared by the cache, scheduler and engines

use std::sync::Arc;
use thiserror::Error;

/// Output channel count used throughout the audio path
pub const OUTPUT_CHANNELS: usize = 2;

/// Decoded PCM ready for the engine
///
/// Samples are interleaved stereo f32 at `sample_rate` (the engine's output
/// rate once the clip has been resampled).
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedClip {
    pub fn frames(&self) -> usize {
        self.samples.len() / OUTPUT_CHANNELS
    }
}

/// A fetched and decoded announcement clip
///
/// Immutable once built; the cache hands out `Arc<AudioClip>` and never
/// replaces an entry.
#[derive(Debug)]
pub struct AudioClip {
    /// Normalised cache key (relative clip path)
    pub key: String,
    /// Bytes exactly as fetched
    pub raw_bytes: Vec<u8>,
    pub buffer: DecodedClip,
    /// Source frames divided by source sample rate
    pub duration_secs: f64,
}

/// Why a clip could not be made ready
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClipFailure {
    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("decode failed: {0}")]
    Decode(String),
}

/// Lifecycle of a cache entry
#[derive(Debug, Clone)]
pub enum ClipState {
    /// Never requested
    Unloaded,
    /// Fetch or decode in flight
    Loading,
    Ready(Arc<AudioClip>),
    /// Terminal for the process lifetime
    Failed(ClipFailure),
}

impl ClipState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ClipState::Ready(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ClipState::Failed(_))
    }
}
