//! Configuration for the announcer
//!
//! Two tiers, like the other qcall services:
//! 1. **TOML bootstrap**: every section optional, missing values take the
//!    built-in defaults below
//! 2. **Command line / environment**: a handful of overrides applied on top
//!
//! The config file itself is located by `qcall_common::config::ConfigFileResolver`.

use crate::connection::ReconnectPolicy;
use crate::error::{Error, Result};
use qcall_common::clips::DEFAULT_STATIC_PREFIX;
use qcall_common::config::{read_toml_file, ConfigFileResolver};
use qcall_common::time::millis_to_duration;
use qcall_common::EntityId;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "QCALL_CONFIG";

/// Config file name under the qcall config directory
pub const CONFIG_FILE_NAME: &str = "announcer.toml";

/// Complete announcer configuration as read from TOML
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnnouncerConfig {
    pub push: PushConfig,
    pub clips: ClipConfig,
    pub api: ApiConfig,
    pub reconnect: ReconnectConfig,
    pub playback: PlaybackConfig,
    pub display: DisplayConfig,
    pub audio: AudioConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

/// Push channel settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// WebSocket URL of the queue server's push channel
    pub url: String,
    pub connect_timeout_ms: u64,
    /// Only announce calls for this unit (all units when unset)
    pub unit_id: Option<String>,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/ws/queue/".to_string(),
            connect_timeout_ms: 10_000,
            unit_id: None,
        }
    }
}

/// Announcement clip source
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClipConfig {
    /// Base URL clip keys are resolved under
    pub base_url: String,
    /// Prefix stripped from server-sent clip paths
    pub static_prefix: String,
    pub request_timeout_ms: u64,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/static/".to_string(),
            static_prefix: DEFAULT_STATIC_PREFIX.to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

/// Read-only REST collaborator
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the queue server REST API; marquee polling is off when unset
    pub base_url: Option<String>,
    pub marquee_poll_interval_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            marquee_poll_interval_secs: 30,
        }
    }
}

/// Reconnection backoff
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
    /// Grace period between the terminal failure notice and the full reset
    pub reload_grace_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            max_attempts: 5,
            reload_grace_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Offset of the first clip past "now" on the audio clock
    pub lead_time_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self { lead_time_ms: 50 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// How long a call stays on the display after its announcement ends
    pub hold_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { hold_ms: 5_000 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Drive an audio device; a silent virtual clock is used otherwise
    pub enabled: bool,
    /// Output device name (default device when unset)
    pub device: Option<String>,
    /// Output gain (0.0-1.0)
    pub volume: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device: None,
            volume: 1.0,
        }
    }
}

/// View feed HTTP server
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub bind_addr: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_addr: "0.0.0.0".to_string(),
            port: 5760,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Command-line configuration overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub push_url: Option<String>,
    pub clip_base_url: Option<String>,
    pub port: Option<u16>,
    pub unit_id: Option<String>,
    pub device: Option<String>,
    pub no_audio: bool,
}

impl AnnouncerConfig {
    /// Load configuration from the resolved TOML file (or defaults) and
    /// apply command-line overrides.
    ///
    /// Returns the config together with the file it was read from, so the
    /// caller can report it once logging is initialised.
    pub fn load(
        cli_path: Option<&Path>,
        overrides: ConfigOverrides,
    ) -> Result<(Self, Option<PathBuf>)> {
        let resolver = ConfigFileResolver::new(CONFIG_ENV_VAR, CONFIG_FILE_NAME);

        let (base, source) = match resolver.resolve(cli_path) {
            Some((path, _)) => (read_toml_file::<AnnouncerConfig>(&path)?, Some(path)),
            None => (AnnouncerConfig::default(), None),
        };

        let config = base.with_overrides(overrides);
        config.validate()?;
        Ok((config, source))
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AnnouncerConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply command-line overrides on top of file values
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(url) = overrides.push_url {
            self.push.url = url;
        }
        if let Some(url) = overrides.clip_base_url {
            self.clips.base_url = url;
        }
        if let Some(port) = overrides.port {
            self.http.port = port;
        }
        if let Some(unit) = overrides.unit_id {
            self.push.unit_id = Some(unit);
        }
        if let Some(device) = overrides.device {
            self.audio.device = Some(device);
        }
        if overrides.no_audio {
            self.audio.enabled = false;
        }
        self
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.push.url.trim().is_empty() {
            return Err(Error::Config("push.url must not be empty".to_string()));
        }
        if self.clips.base_url.trim().is_empty() {
            return Err(Error::Config("clips.base_url must not be empty".to_string()));
        }
        if self.reconnect.max_attempts == 0 {
            return Err(Error::Config("reconnect.max_attempts must be at least 1".to_string()));
        }
        if self.reconnect.base_delay_ms == 0 {
            return Err(Error::Config("reconnect.base_delay_ms must be positive".to_string()));
        }
        if self.reconnect.base_delay_ms > self.reconnect.max_delay_ms {
            return Err(Error::Config(format!(
                "reconnect.base_delay_ms ({}) exceeds reconnect.max_delay_ms ({})",
                self.reconnect.base_delay_ms, self.reconnect.max_delay_ms
            )));
        }
        if self.api.marquee_poll_interval_secs == 0 {
            return Err(Error::Config("api.marquee_poll_interval_secs must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.audio.volume) {
            return Err(Error::Config(format!(
                "audio.volume must be within 0.0-1.0, got {}",
                self.audio.volume
            )));
        }
        Ok(())
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: millis_to_duration(self.reconnect.base_delay_ms),
            max_delay: millis_to_duration(self.reconnect.max_delay_ms),
            max_attempts: self.reconnect.max_attempts,
            reload_grace: millis_to_duration(self.reconnect.reload_grace_ms),
        }
    }

    pub fn lead_time(&self) -> Duration {
        millis_to_duration(self.playback.lead_time_ms)
    }

    pub fn display_hold(&self) -> Duration {
        millis_to_duration(self.display.hold_ms)
    }

    pub fn unit_filter(&self) -> Option<EntityId> {
        self.push
            .unit_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(EntityId::from)
    }

    pub fn marquee_url(&self) -> Option<String> {
        self.api
            .base_url
            .as_deref()
            .map(|base| format!("{}/marquee", base.trim_end_matches('/')))
    }

    pub fn http_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.http.bind_addr, self.http.port)
            .parse()
            .map_err(|e| Error::Config(format!("Invalid http bind address: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AnnouncerConfig::default();
        config.validate().unwrap();

        let policy = config.reconnect_policy();
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.reload_grace, Duration::from_secs(5));
        assert_eq!(config.lead_time(), Duration::from_millis(50));
        assert_eq!(config.http.port, 5760);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AnnouncerConfig::from_toml_str(
            r#"
            [push]
            url = "wss://queue.example.org/ws/display/"
            unit_id = "4"

            [display]
            hold_ms = 3000
            "#,
        )
        .unwrap();

        assert_eq!(config.push.url, "wss://queue.example.org/ws/display/");
        assert_eq!(config.unit_filter(), Some(EntityId::new("4")));
        assert_eq!(config.display_hold(), Duration::from_secs(3));
        assert_eq!(config.push.connect_timeout_ms, 10_000);
        assert_eq!(config.reconnect.max_attempts, 5);
    }

    #[test]
    fn test_overrides_win_over_file() {
        let config = AnnouncerConfig::default().with_overrides(ConfigOverrides {
            push_url: Some("ws://10.0.0.5/ws/".to_string()),
            port: Some(9000),
            no_audio: true,
            ..Default::default()
        });

        assert_eq!(config.push.url, "ws://10.0.0.5/ws/");
        assert_eq!(config.http.port, 9000);
        assert!(!config.audio.enabled);
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let err = AnnouncerConfig::from_toml_str("[reconnect]\nmax_attempts = 0").unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn test_zero_base_delay_rejected() {
        let err = AnnouncerConfig::from_toml_str("[reconnect]\nbase_delay_ms = 0").unwrap_err();
        assert!(err.to_string().contains("base_delay_ms"));
    }

    #[test]
    fn test_base_delay_above_max_rejected() {
        let err = AnnouncerConfig::from_toml_str(
            "[reconnect]\nbase_delay_ms = 20000\nmax_delay_ms = 10000",
        )
        .unwrap_err();
        assert!(err.to_string().contains("base_delay_ms"));
    }

    #[test]
    fn test_empty_push_url_rejected() {
        assert!(AnnouncerConfig::from_toml_str("[push]\nurl = \" \"").is_err());
    }

    #[test]
    fn test_blank_unit_id_means_no_filter() {
        let config = AnnouncerConfig::from_toml_str("[push]\nunit_id = \"  \"").unwrap();
        assert_eq!(config.unit_filter(), None);
    }

    #[test]
    fn test_marquee_url_joins_base() {
        let config = AnnouncerConfig::from_toml_str(
            "[api]\nbase_url = \"http://queue.local/api/\"",
        )
        .unwrap();
        assert_eq!(config.marquee_url().as_deref(), Some("http://queue.local/api/marquee"));
        assert!(AnnouncerConfig::default().marquee_url().is_none());
    }

    #[test]
    fn test_load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("announcer.toml");
        std::fs::write(&path, "[http]\nport = 6001\n").unwrap();

        let (config, source) =
            AnnouncerConfig::load(Some(&path), ConfigOverrides::default()).unwrap();
        assert_eq!(config.http.port, 6001);
        assert_eq!(source, Some(path));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let result = AnnouncerConfig::load(
            Some(Path::new("/nonexistent/announcer.toml")),
            ConfigOverrides::default(),
        );
        assert!(result.is_err());
    }
}
