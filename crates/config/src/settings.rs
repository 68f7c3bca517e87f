//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Dialogue backend configuration
    #[serde(default)]
    pub backend: BackendConfig,

    /// Speech output tuning
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Call timing configuration
    #[serde(default)]
    pub call: CallConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "backend.base_url".to_string(),
                message: "Backend address must not be empty".to_string(),
            });
        }

        if !self.backend.base_url.starts_with("http://")
            && !self.backend.base_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidValue {
                field: "backend.base_url".to_string(),
                message: format!("Expected an http(s) URL, got '{}'", self.backend.base_url),
            });
        }

        // A tiny window finalizes mid-word on every pause for breath
        if self.call.silence_timeout_ms < 250 {
            return Err(ConfigError::InvalidValue {
                field: "call.silence_timeout_ms".to_string(),
                message: "Silence window too small (minimum 250ms)".to_string(),
            });
        }

        if self.speech.rate <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "speech.rate".to_string(),
                message: "Speaking rate must be positive".to_string(),
            });
        }

        Ok(())
    }
}

/// Dialogue backend configuration
///
/// The backend address is a single configurable value; there is exactly one
/// backend per deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the dialogue backend
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Speech output tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Speaking rate (1.0 = normal)
    #[serde(default = "default_rate")]
    pub rate: f32,

    /// Pitch adjustment (1.0 = normal)
    #[serde(default = "default_pitch")]
    pub pitch: f32,

    /// Volume (0.0 - 1.0)
    #[serde(default = "default_volume")]
    pub volume: f32,

    /// Recognition language (BCP 47 tag)
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_rate() -> f32 {
    0.9
}
fn default_pitch() -> f32 {
    1.0
}
fn default_volume() -> f32 {
    1.0
}
fn default_language() -> String {
    "en-US".to_string()
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            pitch: default_pitch(),
            volume: default_volume(),
            language: default_language(),
        }
    }
}

/// Call timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConfig {
    /// Trailing-silence window before an interim transcript is finalized (ms)
    #[serde(default = "default_silence_timeout_ms")]
    pub silence_timeout_ms: u64,

    /// Delay before speaking the greeting after the session opens (ms)
    #[serde(default = "default_greeting_delay_ms")]
    pub greeting_delay_ms: u64,

    /// Delay before speaking an assistant reply (ms)
    #[serde(default = "default_reply_delay_ms")]
    pub reply_delay_ms: u64,

    /// Delay before listening resumes after the assistant finishes speaking (ms)
    #[serde(default = "default_auto_listen_delay_ms")]
    pub auto_listen_delay_ms: u64,

    /// Delay before capture restarts after a turn with no speech (ms)
    #[serde(default = "default_listen_restart_delay_ms")]
    pub listen_restart_delay_ms: u64,
}

fn default_silence_timeout_ms() -> u64 {
    2_000
}
fn default_greeting_delay_ms() -> u64 {
    1_000
}
fn default_reply_delay_ms() -> u64 {
    500
}
fn default_auto_listen_delay_ms() -> u64 {
    500
}
fn default_listen_restart_delay_ms() -> u64 {
    1_000
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            silence_timeout_ms: default_silence_timeout_ms(),
            greeting_delay_ms: default_greeting_delay_ms(),
            reply_delay_ms: default_reply_delay_ms(),
            auto_listen_delay_ms: default_auto_listen_delay_ms(),
            listen_restart_delay_ms: default_listen_restart_delay_ms(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (CALL_ASSISTANT_ prefix)
/// 2. config/{env}.toml (if env specified)
/// 3. config/default.toml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::with_name(&format!("config/{env_name}")).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("CALL_ASSISTANT")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.backend.base_url, "http://localhost:8000");
        assert_eq!(settings.call.silence_timeout_ms, 2_000);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::default();
        settings.call.silence_timeout_ms = 100; // Too small
        assert!(settings.validate().is_err());

        settings.call.silence_timeout_ms = 2_000;
        settings.backend.base_url = "localhost:8000".to_string(); // No scheme
        assert!(settings.validate().is_err());

        settings.backend.base_url = "http://127.0.0.1:8000".to_string();
        assert!(settings.validate().is_ok());
    }
}
