//! Startup configuration for voxlink
//!
//! All settings are resolved once at startup (defaults, then environment
//! overrides) and passed to each component at construction. There is no
//! runtime reconfiguration surface.

use serde::{Deserialize, Serialize};
use std::time::Duration;

const ENV_PREFIX: &str = "VOXLINK_";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the agent server, e.g. "http://192.168.1.100:4114".
    pub server_url: String,

    /// Path of the upload endpoint, appended to `server_url`.
    pub upload_path: String,

    /// Path of the status endpoint used by the connectivity probe.
    pub status_path: String,

    /// Agent name sent as the text form field alongside the audio.
    pub agent_name: String,

    /// Recording is auto-stopped once it reaches this length.
    pub max_record_secs: u64,

    /// Clips shorter than this are rejected before upload.
    pub min_record_ms: u64,

    /// Size of each chunk read from the scratch file while streaming.
    pub upload_chunk_size: usize,

    /// Wall-clock budget for a whole upload call.
    pub upload_timeout_secs: u64,

    /// Wall-clock budget for the connectivity probe.
    pub probe_timeout_secs: u64,

    /// File name of the single reusable scratch recording.
    pub scratch_file_name: String,

    /// How long a successful reply stays on screen before returning to idle.
    pub result_display_secs: u64,

    /// Maximum retry attempts for network operations. Present as
    /// configuration only; the upload path does not consult it. Callers
    /// wanting retries wrap `AgentClient::upload` themselves.
    pub max_retry_attempts: u32,

    /// Delay between retries, paired with `max_retry_attempts`.
    pub retry_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:4114".to_string(),
            upload_path: "/voice-to-agent".to_string(),
            status_path: "/api".to_string(),
            agent_name: "generalAgent".to_string(),
            max_record_secs: 5,
            min_record_ms: 1000,
            upload_chunk_size: 1024,
            upload_timeout_secs: 30,
            probe_timeout_secs: 5,
            scratch_file_name: "recording.wav".to_string(),
            result_display_secs: 3,
            max_retry_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Config {
    /// Build a config from defaults plus `VOXLINK_*` environment overrides.
    /// Unparseable values fall back to the default with a warning rather
    /// than aborting startup.
    pub fn from_env() -> Self {
        let mut cfg = Config::default();

        if let Some(v) = env_string("SERVER_URL") {
            cfg.server_url = v;
        }
        if let Some(v) = env_string("UPLOAD_PATH") {
            cfg.upload_path = v;
        }
        if let Some(v) = env_string("STATUS_PATH") {
            cfg.status_path = v;
        }
        if let Some(v) = env_string("AGENT") {
            cfg.agent_name = v;
        }
        if let Some(v) = env_parse("MAX_RECORD_SECS") {
            cfg.max_record_secs = v;
        }
        if let Some(v) = env_parse("MIN_RECORD_MS") {
            cfg.min_record_ms = v;
        }
        if let Some(v) = env_parse("UPLOAD_CHUNK_SIZE") {
            cfg.upload_chunk_size = v;
        }
        if let Some(v) = env_parse("UPLOAD_TIMEOUT_SECS") {
            cfg.upload_timeout_secs = v;
        }
        if let Some(v) = env_parse("PROBE_TIMEOUT_SECS") {
            cfg.probe_timeout_secs = v;
        }
        if let Some(v) = env_string("SCRATCH_FILE") {
            cfg.scratch_file_name = v;
        }

        cfg
    }

    pub fn upload_url(&self) -> String {
        format!("{}{}", self.server_url, self.upload_path)
    }

    pub fn status_url(&self) -> String {
        format!("{}{}", self.server_url, self.status_path)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn max_record_duration(&self) -> Duration {
        Duration::from_secs(self.max_record_secs)
    }

    pub fn result_display(&self) -> Duration {
        Duration::from_secs(self.result_display_secs)
    }
}

fn env_string(name: &str) -> Option<String> {
    match std::env::var(format!("{}{}", ENV_PREFIX, name)) {
        Ok(v) if !v.is_empty() => Some(v),
        _ => None,
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env_string(name)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!(
                "Config: ignoring unparseable {}{}={:?}",
                ENV_PREFIX,
                name,
                raw
            );
            None
        }
    }
}
