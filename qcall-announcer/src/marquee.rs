//! Marquee text polling
//!
//! The queue server exposes the scrolling marquee text at
//! `GET {api_base_url}/marquee`. It is polled on its own interval,
//! independently of the push channel. A failed poll keeps the last good
//! value.

use crate::error::{Error, Result};
use crate::state::SharedState;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marquee {
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

pub struct MarqueePoller {
    client: reqwest::Client,
    url: String,
    interval: Duration,
}

impl MarqueePoller {
    pub fn new(url: impl Into<String>, interval: Duration, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            interval,
        })
    }

    pub async fn fetch_once(&self) -> Result<Marquee> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http(format!("GET {} returned {}", self.url, status)));
        }
        Ok(response.json::<Marquee>().await?)
    }

    /// Poll immediately, then every interval, until cancelled.
    pub async fn run(self, state: Arc<SharedState>, cancel: CancellationToken) {
        info!(url = %self.url, interval_secs = self.interval.as_secs(), "Marquee polling started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.fetch_once().await {
                Ok(marquee) => {
                    debug!(enabled = marquee.enabled, "Marquee polled");
                    state.set_marquee(marquee).await;
                }
                Err(e) => warn!(error = %e, "Marquee poll failed, keeping last value"),
            }
        }

        debug!("Marquee polling stopped");
    }
}
