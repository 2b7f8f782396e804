/// Configuration structures that can be tested independently
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_APN: &str = "airtelgprs.com";
pub const DEFAULT_ARTIFACT_PATH: &str = "/bootcode.bin";
pub const DEFAULT_CHUNK_SIZE: usize = 4096;
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 51_200;

/// Bounds for every wait in the attach and download procedures (milliseconds unless noted)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Timeouts {
    pub echo_off_ms: u64,
    pub sim_ready_ms: u64,
    pub context_deactivate_ms: u64,
    pub apn_ms: u64,
    pub context_activate_ms: u64,
    pub http_config_ms: u64,
    pub url_connect_ms: u64,
    pub url_ack_ms: u64,
    pub size_discovery_ms: u64,
    pub stream_start_ms: u64,
    pub inactivity_ms: u64,
    /// Seconds handed to the modem in `AT+QHTTPGET`
    pub get_response_secs: u32,
    /// Seconds handed to the modem in `AT+QHTTPREAD`; the body may take minutes
    pub read_total_secs: u32,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            echo_off_ms: 1_000,
            sim_ready_ms: 2_000,
            context_deactivate_ms: 5_000,
            apn_ms: 2_000,
            context_activate_ms: 10_000,
            http_config_ms: 1_000,
            url_connect_ms: 5_000,
            url_ack_ms: 5_000,
            size_discovery_ms: 80_000,
            stream_start_ms: 10_000,
            inactivity_ms: 60_000,
            get_response_secs: 80,
            read_total_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    pub apn: String,
    pub base_url: String,
    pub artifact_path: String,
    pub chunk_size: usize,
    pub progress_interval: u64,
    pub attach_attempts: u32,
    pub timeouts: Timeouts,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            apn: DEFAULT_APN.to_string(),
            base_url: String::new(),
            artifact_path: DEFAULT_ARTIFACT_PATH.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            attach_attempts: 3,
            timeouts: Timeouts::default(),
        }
    }
}

impl FetchConfig {
    pub fn with_url(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), ..Self::default() }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.is_empty() {
            return Err(ConfigError::MissingUrl);
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::UnsupportedScheme(self.base_url.clone()));
        }
        if self.apn.is_empty() || self.apn.contains('"') {
            return Err(ConfigError::InvalidApn(self.apn.clone()));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.attach_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if !self.artifact_path.starts_with('/') {
            return Err(ConfigError::RelativeArtifactPath(self.artifact_path.clone()));
        }
        Ok(())
    }

    /// Base URL plus a `t=<ms>` query parameter to defeat caching
    pub fn target_url(&self, now_ms: u64) -> String {
        let separator = if self.base_url.contains('?') { '&' } else { '?' };
        format!("{}{}t={}", self.base_url, separator, now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "http://example.com/fw/bootcode.bin";

    #[test]
    fn test_config_serialization() {
        let config = FetchConfig::with_url(URL);
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: FetchConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: FetchConfig =
            serde_json::from_str(r#"{"base_url":"http://h/x","timeouts":{"inactivity_ms":5}}"#).unwrap();
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.timeouts.inactivity_ms, 5);
        assert_eq!(config.timeouts.size_discovery_ms, 80_000);
    }

    #[test]
    fn test_defaults_match_firmware_constants() {
        let config = FetchConfig::default();
        assert_eq!(config.artifact_path, "/bootcode.bin");
        assert_eq!(config.attach_attempts, 3);
        assert_eq!(config.timeouts.read_total_secs, 300);
        assert_eq!(config.timeouts.stream_start_ms, 10_000);
    }

    #[test]
    fn test_target_url_cache_buster() {
        let config = FetchConfig::with_url(URL);
        assert_eq!(config.target_url(1234), format!("{}?t=1234", URL));

        let config = FetchConfig::with_url("http://h/x?v=2");
        assert_eq!(config.target_url(9), "http://h/x?v=2&t=9");
    }

    #[test]
    fn test_validation() {
        assert!(FetchConfig::with_url(URL).validate().is_ok());
        assert_eq!(FetchConfig::default().validate(), Err(ConfigError::MissingUrl));

        let mut config = FetchConfig::with_url(URL);
        config.chunk_size = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroChunkSize));

        let mut config = FetchConfig::with_url(URL);
        config.apn = "bad\"apn".into();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidApn(_))));

        let config = FetchConfig::with_url("ftp://h/x");
        assert!(matches!(config.validate(), Err(ConfigError::UnsupportedScheme(_))));
    }
}
