//! Announcement clip cache
//!
//! Fetches, decodes and keeps announcement clips by key for the process
//! lifetime. Each key gets one `OnceCell` slot: the first request runs the
//! fetch, concurrent requests await the same cell, and the settled outcome
//! (ready or failed) is never replaced.

use super::decoder::ClipDecoder;
use super::types::{AudioClip, ClipFailure, ClipState};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::future::join_all;
use qcall_common::clips::{clip_extension, normalize_clip_path};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Outcome of resolving one clip
pub type ClipResult = std::result::Result<Arc<AudioClip>, ClipFailure>;

/// Where clip bytes come from
#[async_trait]
pub trait ClipSource: Send + Sync {
    /// Fetch the raw bytes of a normalised clip key
    async fn fetch(&self, key: &str) -> Result<Vec<u8>>;
}

/// Fetches clips over HTTP relative to a base URL
pub struct HttpClipSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClipSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key.trim_start_matches('/'))
    }
}

#[async_trait]
impl ClipSource for HttpClipSource {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        let url = self.url_for(key);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!("GET {} returned {}", url, status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Fetch(format!("Reading {} failed: {}", url, e)))?;
        Ok(bytes.to_vec())
    }
}

pub struct AudioClipCache {
    source: Arc<dyn ClipSource>,
    sample_rate: u32,
    static_prefix: String,
    entries: Mutex<HashMap<String, Arc<OnceCell<ClipResult>>>>,
}

impl AudioClipCache {
    /// `sample_rate` is the engine rate clips are converted to.
    pub fn new(source: Arc<dyn ClipSource>, sample_rate: u32, static_prefix: impl Into<String>) -> Self {
        Self {
            source,
            sample_rate,
            static_prefix: static_prefix.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cache key for a clip path as sent by the server
    pub fn normalize(&self, raw: &str) -> String {
        normalize_clip_path(raw, &self.static_prefix)
    }

    /// Resolve one clip, fetching and decoding it on first use.
    pub async fn get(&self, raw: &str) -> ClipResult {
        let key = self.normalize(raw);
        if key.is_empty() {
            return Err(ClipFailure::Fetch(format!("empty clip path {:?}", raw)));
        }

        let cell = self.slot(&key);
        cell.get_or_init(|| self.load(key.clone())).await.clone()
    }

    /// Settle every key, in input order. Never fails as a batch.
    pub async fn preload(&self, keys: &[String]) -> Vec<(String, ClipResult)> {
        let outcomes = join_all(keys.iter().map(|key| self.get(key))).await;
        let ready = outcomes.iter().filter(|o| o.is_ok()).count();
        debug!(requested = keys.len(), ready, "Clip preload settled");

        keys.iter().cloned().zip(outcomes).collect()
    }

    /// Current lifecycle state of a clip
    pub fn state(&self, raw: &str) -> ClipState {
        let key = self.normalize(raw);
        let cell = match self.lock_entries().get(&key) {
            Some(cell) => Arc::clone(cell),
            None => return ClipState::Unloaded,
        };

        match cell.get() {
            None => ClipState::Loading,
            Some(Ok(clip)) => ClipState::Ready(Arc::clone(clip)),
            Some(Err(failure)) => ClipState::Failed(failure.clone()),
        }
    }

    /// Number of keys ever requested
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: &str) -> Arc<OnceCell<ClipResult>> {
        let mut entries = self.lock_entries();
        Arc::clone(
            entries
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        )
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<OnceCell<ClipResult>>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn load(&self, key: String) -> ClipResult {
        debug!(clip = %key, "Fetching clip");

        let bytes = match self.source.fetch(&key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(clip = %key, error = %e, "Clip fetch failed");
                return Err(ClipFailure::Fetch(e.to_string()));
            }
        };

        let rate = self.sample_rate;
        let decode_key = key.clone();
        let decoded = tokio::task::spawn_blocking(move || {
            let prepared = ClipDecoder::prepare(&bytes, clip_extension(&decode_key), rate);
            (bytes, prepared)
        })
        .await;

        let (raw_bytes, prepared) = match decoded {
            Ok((bytes, Ok(prepared))) => (bytes, prepared),
            Ok((_, Err(e))) => {
                warn!(clip = %key, error = %e, "Clip decode failed");
                return Err(ClipFailure::Decode(e.to_string()));
            }
            Err(e) => {
                warn!(clip = %key, error = %e, "Clip decode task failed");
                return Err(ClipFailure::Decode(e.to_string()));
            }
        };

        info!(
            clip = %key,
            duration_ms = (prepared.duration_secs * 1000.0).round() as u64,
            "Clip ready"
        );

        Ok(Arc::new(AudioClip {
            key,
            raw_bytes,
            buffer: prepared.buffer,
            duration_secs: prepared.duration_secs,
        }))
    }
}
