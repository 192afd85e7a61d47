//! Gapless clip sequencing
//!
//! Places an ordered list of clips back to back on the engine's audio
//! clock. Clip *i+1* starts exactly where clip *i* ends; the completion
//! callback rides on the engine's end signal of the last clip.

use crate::audio::{AudioClipCache, AudioEngine, SourceId};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How a playback session ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PlaybackOutcome {
    /// The last scheduled clip reached its natural end
    Completed { clips: usize },
    /// No clip could be resolved; nothing was played
    Empty,
    /// The engine rejected a source
    Failed { reason: String },
}

/// One clip placed on the audio clock
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledClip {
    pub key: String,
    pub start_at: f64,
    pub end_at: f64,
}

struct ActivePlayback {
    sources: Vec<SourceId>,
    schedule: Vec<ScheduledClip>,
    watcher: JoinHandle<()>,
}

pub struct PlaybackScheduler {
    cache: Arc<AudioClipCache>,
    engine: Arc<dyn AudioEngine>,
    lead_time: Duration,
    active: Option<ActivePlayback>,
}

impl PlaybackScheduler {
    pub fn new(cache: Arc<AudioClipCache>, engine: Arc<dyn AudioEngine>, lead_time: Duration) -> Self {
        Self {
            cache,
            engine,
            lead_time,
            active: None,
        }
    }

    /// Play `keys` in order and call `done` exactly once.
    ///
    /// Clips that fail to resolve are skipped. With nothing left to play
    /// `done(Empty)` is called before returning. One session at a time is
    /// the caller's responsibility; a session still running is stopped.
    pub async fn play<F>(&mut self, keys: &[String], done: F)
    where
        F: FnOnce(PlaybackOutcome) + Send + 'static,
    {
        if self.is_active() {
            error!("play() called while a session is still active, stopping it");
            self.stop();
        } else {
            self.active = None;
        }

        let mut clips = Vec::with_capacity(keys.len());
        for (key, outcome) in self.cache.preload(keys).await {
            match outcome {
                Ok(clip) => clips.push(clip),
                Err(failure) => warn!(clip = %key, error = %failure, "Skipping clip"),
            }
        }

        if clips.is_empty() {
            debug!(requested = keys.len(), "No playable clips");
            done(PlaybackOutcome::Empty);
            return;
        }

        let mut when = self.engine.current_time() + self.lead_time.as_secs_f64();
        let mut sources = Vec::with_capacity(clips.len());
        let mut schedule = Vec::with_capacity(clips.len());
        let mut last_ended = None;

        for clip in clips {
            let key = clip.key.clone();
            match self.engine.start_source(clip, when) {
                Ok(handle) => {
                    schedule.push(ScheduledClip {
                        key,
                        start_at: handle.start_at,
                        end_at: handle.end_at,
                    });
                    sources.push(handle.id);
                    when = handle.end_at;
                    last_ended = Some(handle.ended);
                }
                Err(e) => {
                    warn!(clip = %key, error = %e, "Engine rejected source, aborting session");
                    for id in &sources {
                        self.engine.stop_source(*id);
                    }
                    done(PlaybackOutcome::Failed {
                        reason: e.to_string(),
                    });
                    return;
                }
            }
        }

        let Some(ended) = last_ended else {
            done(PlaybackOutcome::Empty);
            return;
        };

        let count = schedule.len();
        info!(
            clips = count,
            starts_at = schedule[0].start_at,
            ends_at = when,
            "Announcement scheduled"
        );

        let watcher = tokio::spawn(async move {
            // Closed without a value means the session was stopped
            if ended.await.is_ok() {
                done(PlaybackOutcome::Completed { clips: count });
            }
        });

        self.active = Some(ActivePlayback {
            sources,
            schedule,
            watcher,
        });
    }

    /// Halt every scheduled clip. `done` is not called.
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            debug!(sources = active.sources.len(), "Stopping playback session");
            for id in active.sources {
                self.engine.stop_source(id);
            }
            active.watcher.abort();
        }
    }

    /// A session is scheduled and its last clip has not ended
    pub fn is_active(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.watcher.is_finished())
    }

    /// Placement of the current (or most recent) session
    pub fn active_schedule(&self) -> Vec<ScheduledClip> {
        self.active
            .as_ref()
            .map(|active| active.schedule.clone())
            .unwrap_or_default()
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
