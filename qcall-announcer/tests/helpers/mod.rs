//! Test helpers for qcall-announcer integration tests
//!
//! - WAV fixtures generated in memory with hound
//! - `MemoryClipSource`: in-memory clip source with fetch counting
//! - `RecordingNotifier`: captures notices
//! - `ScriptedConnector`: push connector driven by the test
//! - call builders and queue_update message builders

#![allow(dead_code)]

use async_trait::async_trait;
use qcall_announcer::connection::{PushChannel, PushConnector};
use qcall_announcer::notify::{Notice, Notifier};
use qcall_announcer::audio::ClipSource;
use qcall_announcer::{Error, Result};
use qcall_common::CallEvent;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Sample rate used for fixtures and virtual engines
pub const TEST_RATE: u32 = 8_000;

/// Mono 16-bit WAV of `secs` seconds at `rate`
pub fn wav_bytes(secs: f64, rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let frames = (secs * rate as f64).round() as usize;

    let mut bytes = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
        for n in 0..frames {
            // Quiet 440 Hz tone
            let t = n as f64 / rate as f64;
            let sample = ((t * 440.0 * std::f64::consts::TAU).sin() * 3000.0) as i16;
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }
    bytes
}

// ---------------------------------------------------------------------------
// Clip source
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryClipSource {
    clips: Mutex<HashMap<String, Vec<u8>>>,
    fetches: Mutex<HashMap<String, usize>>,
    delay: Mutex<Option<Duration>>,
}

impl MemoryClipSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a valid WAV clip of `secs` seconds
    pub fn with_clip(self, key: &str, secs: f64) -> Self {
        self.insert(key, wav_bytes(secs, TEST_RATE));
        self
    }

    /// Add bytes that fetch fine but do not decode
    pub fn with_garbage(self, key: &str) -> Self {
        self.insert(key, b"this is not audio".to_vec());
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn insert(&self, key: &str, bytes: Vec<u8>) {
        self.clips.lock().unwrap().insert(key.to_string(), bytes);
    }

    pub fn fetch_count(&self, key: &str) -> usize {
        self.fetches.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl ClipSource for MemoryClipSource {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        *self.fetches.lock().unwrap().entry(key.to_string()).or_default() += 1;

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.clips
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::Fetch(format!("{} returned 404 Not Found", key)))
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn retries(&self) -> Vec<(u32, Duration)> {
        self.notices()
            .into_iter()
            .filter_map(|n| match n {
                Notice::Retrying { attempt, delay, .. } => Some((attempt, delay)),
                _ => None,
            })
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

// ---------------------------------------------------------------------------
// Push connector
// ---------------------------------------------------------------------------

enum Step {
    Fail,
    Open(ScriptedChannel),
}

/// Control side of a scripted channel
pub struct ChannelHandle {
    tx: Option<mpsc::UnboundedSender<String>>,
    closed: Arc<AtomicBool>,
}

impl ChannelHandle {
    pub fn send(&self, text: impl Into<String>) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(text.into());
        }
    }

    /// Simulate the server going away
    pub fn drop_connection(&mut self) {
        self.tx = None;
    }

    /// Whether the client closed its side
    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct ScriptedChannel {
    rx: mpsc::UnboundedReceiver<String>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl PushChannel for ScriptedChannel {
    async fn recv(&mut self) -> Option<Result<String>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(self: Box<Self>) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Connector that follows a script; once the script runs out every
/// connect fails.
#[derive(Default)]
pub struct ScriptedConnector {
    steps: Mutex<VecDeque<Step>>,
    attempts: Mutex<Vec<Instant>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, times: usize) {
        let mut steps = self.steps.lock().unwrap();
        for _ in 0..times {
            steps.push_back(Step::Fail);
        }
    }

    pub fn open_next(&self) -> ChannelHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        self.steps.lock().unwrap().push_back(Step::Open(ScriptedChannel {
            rx,
            closed: Arc::clone(&closed),
        }));
        ChannelHandle {
            tx: Some(tx),
            closed,
        }
    }

    /// When each connect was attempted (tokio clock)
    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushConnector for ScriptedConnector {
    async fn connect(&self) -> Result<Box<dyn PushChannel>> {
        self.attempts.lock().unwrap().push(Instant::now());
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Open(channel)) => Ok(Box::new(channel)),
            Some(Step::Fail) | None => Err(Error::Connection("connection refused".to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Calls and messages
// ---------------------------------------------------------------------------

/// JSON entry as the server sends it
pub fn entry(ticket_id: i64, called_at: &str, clips: &[&str]) -> Value {
    json!({
        "ticket_id": ticket_id,
        "ticket_code": format!("A-{:03}", ticket_id),
        "unit_id": 1,
        "unit_name": "Poli Umum",
        "service_id": 10,
        "service_name": "Pendaftaran",
        "counter_label": "Loket 1",
        "last_called_at": called_at,
        "should_play_audio": true,
        "audio_paths": clips,
    })
}

pub fn call(ticket_id: i64, called_at: &str, clips: &[&str]) -> CallEvent {
    serde_json::from_value(entry(ticket_id, called_at, clips)).unwrap()
}

pub fn silent_call(ticket_id: i64, called_at: &str) -> CallEvent {
    let mut call = call(ticket_id, called_at, &["/static/audio/unused.wav"]);
    call.should_play_audio = false;
    call
}

pub fn call_for_unit(ticket_id: i64, unit_id: i64, clips: &[&str]) -> CallEvent {
    let mut value = entry(ticket_id, "2024-05-01T08:00:00Z", clips);
    value["unit_id"] = json!(unit_id);
    serde_json::from_value(value).unwrap()
}

pub fn queue_update(current: Option<Value>, board: Vec<Value>) -> String {
    json!({
        "type": "queue_update",
        "data": board,
        "currently_playing": current,
        "service_stats": {"waiting": 3},
    })
    .to_string()
}

pub fn clip_keys(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

/// Shared set of keys used in a test, for pre-warming caches
pub fn key_set(keys: &[&str]) -> HashSet<String> {
    keys.iter().map(|k| k.to_string()).collect()
}
