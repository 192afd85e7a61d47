//! Clock-only audio engine
//!
//! Runs the same [`Mixer`] timeline as the device engine but never produces
//! sound. Used on display nodes without an audio device (driven from the
//! tokio clock) and in tests (driven manually or from paused tokio time).

use super::engine::{AudioEngine, SourceHandle, SourceId};
use super::mixer::Mixer;
use super::types::AudioClip;
use crate::error::{Error, Result};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Driver tick for [`VirtualEngine::spawn_realtime`]
const REALTIME_TICK: Duration = Duration::from_millis(10);

/// One `start_source` call as seen by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledRecord {
    pub id: SourceId,
    pub key: String,
    pub requested_at: f64,
    pub start_at: f64,
    pub end_at: f64,
    pub stopped: bool,
}

pub struct VirtualEngine {
    mixer: Mutex<Mixer>,
    history: Mutex<Vec<ScheduledRecord>>,
    rejected_keys: Mutex<HashSet<String>>,
}

impl VirtualEngine {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            mixer: Mutex::new(Mixer::new(sample_rate, 1.0)),
            history: Mutex::new(Vec::new()),
            rejected_keys: Mutex::new(HashSet::new()),
        }
    }

    /// Advance the audio clock, firing the end of every source it passes.
    pub fn advance(&self, by: Duration) {
        let mut mixer = lock(&self.mixer);
        let frames = (by.as_secs_f64() * mixer.sample_rate() as f64).round() as u64;
        mixer.advance(frames);
    }

    /// Advance the audio clock to an absolute frame position.
    fn advance_to_frame(&self, target: u64) {
        let mut mixer = lock(&self.mixer);
        let current = mixer.position_frames();
        if target > current {
            mixer.advance(target - current);
        }
    }

    /// Make `start_source` fail for clips with this key.
    pub fn reject_key(&self, key: impl Into<String>) {
        lock(&self.rejected_keys).insert(key.into());
    }

    /// Every source ever scheduled, in call order
    pub fn history(&self) -> Vec<ScheduledRecord> {
        lock(&self.history).clone()
    }

    pub fn active_sources(&self) -> usize {
        lock(&self.mixer).active_sources()
    }

    /// Drive the clock from tokio time until `cancel` fires.
    ///
    /// Under a paused tokio runtime the audio clock follows virtual time.
    pub fn spawn_realtime(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let origin = Instant::now();
            let origin_frame = lock(&engine.mixer).position_frames();
            let rate = engine.sample_rate() as f64;
            let mut ticker = tokio::time::interval(REALTIME_TICK);

            debug!("Virtual audio clock started at {}Hz", engine.sample_rate());
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let elapsed = origin.elapsed().as_secs_f64();
                        engine.advance_to_frame(origin_frame + (elapsed * rate).round() as u64);
                    }
                }
            }
            debug!("Virtual audio clock stopped");
        })
    }
}

impl AudioEngine for VirtualEngine {
    fn sample_rate(&self) -> u32 {
        lock(&self.mixer).sample_rate()
    }

    fn current_time(&self) -> f64 {
        lock(&self.mixer).clock_secs()
    }

    fn start_source(&self, clip: Arc<AudioClip>, when: f64) -> Result<SourceHandle> {
        if lock(&self.rejected_keys).contains(&clip.key) {
            return Err(Error::Playback(format!("Source rejected: {}", clip.key)));
        }

        let key = clip.key.clone();
        let placed = lock(&self.mixer).schedule(clip, when);

        lock(&self.history).push(ScheduledRecord {
            id: placed.id,
            key,
            requested_at: when,
            start_at: placed.start_secs,
            end_at: placed.end_secs,
            stopped: false,
        });

        Ok(SourceHandle {
            id: placed.id,
            start_at: placed.start_secs,
            end_at: placed.end_secs,
            ended: placed.ended,
        })
    }

    fn stop_source(&self, id: SourceId) {
        if lock(&self.mixer).cancel(id) {
            if let Some(record) = lock(&self.history).iter_mut().find(|r| r.id == id) {
                record.stopped = true;
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
