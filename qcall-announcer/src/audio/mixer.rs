//! Sample-accurate source mixer
//!
//! Holds every scheduled source with its start and end frame on a single
//! monotonic frame counter. The output callback (or the virtual engine)
//! drives the counter forward; a source's `ended` signal fires from the
//! render pass that crosses its end frame, never from a timer.

use super::engine::SourceId;
use super::types::{AudioClip, OUTPUT_CHANNELS};
use std::sync::Arc;
use tokio::sync::oneshot;

struct ScheduledSource {
    id: SourceId,
    clip: Arc<AudioClip>,
    start_frame: u64,
    end_frame: u64,
    ended: Option<oneshot::Sender<()>>,
}

/// A source accepted by [`Mixer::schedule`]
#[derive(Debug)]
pub struct ScheduledPlacement {
    pub id: SourceId,
    pub start_secs: f64,
    pub end_secs: f64,
    pub ended: oneshot::Receiver<()>,
}

pub struct Mixer {
    sample_rate: u32,
    volume: f32,
    /// Frames rendered since the mixer was created; the audio clock
    position: u64,
    next_id: SourceId,
    sources: Vec<ScheduledSource>,
}

impl Mixer {
    pub fn new(sample_rate: u32, volume: f32) -> Self {
        Self {
            sample_rate,
            volume: volume.clamp(0.0, 1.0),
            position: 0,
            next_id: 1,
            sources: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Audio clock in seconds
    pub fn clock_secs(&self) -> f64 {
        self.frames_to_secs(self.position)
    }

    pub fn position_frames(&self) -> u64 {
        self.position
    }

    pub fn active_sources(&self) -> usize {
        self.sources.len()
    }

    /// Place `clip` on the timeline at `when` seconds.
    ///
    /// A start in the past is clamped to the current position. The end frame
    /// is derived from the clip's duration so that back-to-back placements
    /// computed from `end_secs` line up exactly.
    pub fn schedule(&mut self, clip: Arc<AudioClip>, when: f64) -> ScheduledPlacement {
        let requested = self.secs_to_frames(when);
        let start_frame = requested.max(self.position);
        let length = self.secs_to_frames(clip.duration_secs).max(1);
        let end_frame = start_frame + length;

        let id = self.next_id;
        self.next_id += 1;

        let (tx, rx) = oneshot::channel();
        self.sources.push(ScheduledSource {
            id,
            clip,
            start_frame,
            end_frame,
            ended: Some(tx),
        });

        ScheduledPlacement {
            id,
            start_secs: self.frames_to_secs(start_frame),
            end_secs: self.frames_to_secs(end_frame),
            ended: rx,
        }
    }

    /// Remove a source without signalling its end.
    ///
    /// The `ended` receiver observes a closed channel instead.
    pub fn cancel(&mut self, id: SourceId) -> bool {
        let before = self.sources.len();
        self.sources.retain(|s| s.id != id);
        self.sources.len() != before
    }

    /// Fill `out` (interleaved, `channels` per frame) and advance the clock.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        out.fill(0.0);
        if channels == 0 {
            return;
        }

        let frames = (out.len() / channels) as u64;
        let window_start = self.position;
        let window_end = window_start + frames;

        for source in &self.sources {
            let from = source.start_frame.max(window_start);
            let to = source.end_frame.min(window_end);
            if from >= to {
                continue;
            }

            let buffer = &source.clip.buffer;
            let available = buffer.frames() as u64;
            for abs in from..to {
                let clip_frame = abs - source.start_frame;
                if clip_frame >= available {
                    break;
                }
                let src = clip_frame as usize * OUTPUT_CHANNELS;
                let dst = (abs - window_start) as usize * channels;
                let left = buffer.samples[src] * self.volume;
                let right = buffer.samples[src + 1] * self.volume;

                if channels == 1 {
                    out[dst] += (left + right) * 0.5;
                } else {
                    out[dst] += left;
                    out[dst + 1] += right;
                }
            }
        }

        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }

        self.finish_window(window_end);
    }

    /// Advance the clock by `frames` without producing samples.
    pub fn advance(&mut self, frames: u64) {
        let target = self.position + frames;
        self.finish_window(target);
    }

    fn finish_window(&mut self, new_position: u64) {
        self.position = new_position;

        let mut index = 0;
        while index < self.sources.len() {
            if self.sources[index].end_frame <= new_position {
                let mut source = self.sources.swap_remove(index);
                if let Some(tx) = source.ended.take() {
                    let _ = tx.send(());
                }
            } else {
                index += 1;
            }
        }
    }

    fn secs_to_frames(&self, secs: f64) -> u64 {
        if secs <= 0.0 {
            0
        } else {
            (secs * self.sample_rate as f64).round() as u64
        }
    }

    fn frames_to_secs(&self, frames: u64) -> f64 {
        frames as f64 / self.sample_rate as f64
    }
}
