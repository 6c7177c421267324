use crate::error::ConfigError;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ClientConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub audio: AudioConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Per-attempt deadline for text queries.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Deadline for a whole voice query, upload included.
    #[serde(default = "default_speech_timeout_secs")]
    pub speech_timeout_secs: u64,

    /// Extra attempts after the first, for transient failures only.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry; doubles on each further retry.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            request_timeout_secs: default_request_timeout_secs(),
            speech_timeout_secs: default_speech_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AudioConfig {
    #[serde(default = "default_device_name")]
    pub device_name: String,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_channels")]
    pub channels: u16,

    #[serde(default = "default_buffer_size")]
    pub buffer_size: u32,

    /// End the utterance automatically after trailing silence.
    #[serde(default = "default_true")]
    pub auto_end: bool,

    /// RMS level below which a chunk counts as silence.
    #[serde(default = "default_silence_threshold")]
    pub silence_threshold: f32,

    #[serde(default = "default_min_speech_ms")]
    pub min_speech_ms: u64,

    #[serde(default = "default_min_silence_ms")]
    pub min_silence_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            buffer_size: default_buffer_size(),
            auto_end: default_true(),
            silence_threshold: default_silence_threshold(),
            min_speech_ms: default_min_speech_ms(),
            min_silence_ms: default_min_silence_ms(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_endpoint() -> String {
    "https://api.hearsay.audio".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_speech_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    250
}

fn default_device_name() -> String {
    "default".to_string()
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_channels() -> u16 {
    1
}

fn default_buffer_size() -> u32 {
    1024
}

fn default_true() -> bool {
    true
}

fn default_silence_threshold() -> f32 {
    0.015
}

fn default_min_speech_ms() -> u64 {
    200
}

fn default_min_silence_ms() -> u64 {
    800
}

/// Interpolate `${VAR}` patterns with environment variable values.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{([^}]+)\}").unwrap();
    let mut result = input.to_string();

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(val) => {
                result = result.replace(&cap[0], &val);
            }
            Err(_) => {
                return Err(ConfigError::EnvVarNotFound(var_name.to_string()));
            }
        }
    }

    Ok(result)
}

impl ClientConfig {
    /// Load configuration from a TOML file, with environment variable interpolation.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let interpolated = interpolate_env_vars(&content)?;
        let config: ClientConfig = toml::from_str(&interpolated)?;
        Ok(config)
    }

    /// Parse configuration from a TOML string (for testing).
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let interpolated = interpolate_env_vars(s)?;
        let config: ClientConfig = toml::from_str(&interpolated)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_parse_valid_toml() {
        let toml_str = r#"
[general]
log_level = "debug"

[service]
endpoint = "https://recognizer.example.net"
request_timeout_secs = 5
max_retries = 4
retry_backoff_ms = 100

[audio]
device_name = "USB Microphone"
sample_rate = 44100
auto_end = false
"#;
        let config = ClientConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.service.endpoint, "https://recognizer.example.net");
        assert_eq!(config.service.request_timeout_secs, 5);
        assert_eq!(config.service.max_retries, 4);
        assert_eq!(config.service.retry_backoff_ms, 100);
        assert_eq!(config.audio.device_name, "USB Microphone");
        assert_eq!(config.audio.sample_rate, 44100);
        assert!(!config.audio.auto_end);
    }

    #[test]
    fn test_config_default_values() {
        let config = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.service.endpoint, "https://api.hearsay.audio");
        assert_eq!(config.service.request_timeout_secs, 10);
        assert_eq!(config.service.speech_timeout_secs, 60);
        assert_eq!(config.service.max_retries, 2);
        assert_eq!(config.service.retry_backoff_ms, 250);
        assert_eq!(config.audio.device_name, "default");
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.channels, 1);
        assert_eq!(config.audio.buffer_size, 1024);
        assert!(config.audio.auto_end);
        assert_eq!(config.audio.min_speech_ms, 200);
        assert_eq!(config.audio.min_silence_ms, 800);
    }

    #[test]
    fn test_config_matches_default_impl() {
        let parsed = ClientConfig::from_toml_str("").unwrap();
        let built = ClientConfig::default();
        assert_eq!(parsed.service.endpoint, built.service.endpoint);
        assert_eq!(parsed.service.max_retries, built.service.max_retries);
        assert_eq!(parsed.audio.sample_rate, built.audio.sample_rate);
        assert_eq!(parsed.general.log_level, built.general.log_level);
    }

    #[test]
    fn test_config_env_var_interpolation() {
        std::env::set_var("HEARSAY_TEST_ENDPOINT", "https://staging.example.net");
        let toml_str = r#"
[service]
endpoint = "${HEARSAY_TEST_ENDPOINT}"
"#;
        let config = ClientConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.service.endpoint, "https://staging.example.net");
        std::env::remove_var("HEARSAY_TEST_ENDPOINT");
    }

    #[test]
    fn test_config_missing_env_var_error() {
        let toml_str = r#"
[service]
endpoint = "${DEFINITELY_DOES_NOT_EXIST_12345}"
"#;
        let result = ClientConfig::from_toml_str(toml_str);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("DEFINITELY_DOES_NOT_EXIST_12345"),
        );
    }

    #[test]
    fn test_config_invalid_toml_error() {
        let toml_str = "this is not valid toml [[[";
        let result = ClientConfig::from_toml_str(toml_str);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = std::env::temp_dir().join("hearsay_test_config");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("test.toml");
        std::fs::write(
            &path,
            r#"
[general]
log_level = "warn"

[service]
max_retries = 0
"#,
        )
        .unwrap();

        let config = ClientConfig::load_from_file(&path).unwrap();
        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.service.max_retries, 0);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_config_load_from_file_not_found() {
        let result = ClientConfig::load_from_file(std::path::Path::new("/nonexistent/path.toml"));
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("failed to read config file"),
        );
    }
}
