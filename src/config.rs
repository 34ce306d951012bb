use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration, loaded from `~/.vox-hotkey.toml`.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Hotkey chord that toggles recording
    pub hotkey: HotkeyConfig,
    /// Capture device and stop-condition knobs
    pub audio: AudioConfig,
    /// Speech API credentials and request parameters
    pub api: ApiConfig,
    /// Retry budget and per-kind cooldowns
    pub transcribe: TranscribeConfig,
    /// Clipboard / paste behavior
    pub output: OutputConfig,
    /// Log destination
    pub telemetry: TelemetryConfig,
}

/// Global hotkey chord.
#[derive(Debug, Deserialize, Clone)]
pub struct HotkeyConfig {
    /// Modifier names ("Control", "Option"/"Alt", "Command"/"Super", "Shift")
    pub modifiers: Vec<String>,
    /// Key name: a letter, "Space", or "F1".."F12"
    pub key: String,
}

/// Audio capture settings.
#[derive(Debug, Deserialize, Clone)]
pub struct AudioConfig {
    /// Input device name; empty selects the system default
    pub device: String,
    /// Capture sample rate in Hz
    pub sample_rate: u32,
    /// Full-scale fraction treated as level 1.0. Microphone gain varies
    /// enormously across hardware; tune this when the level bar pins at 0 or 1.
    pub gain_calibration: f32,
    /// Normalized level above which a block counts as sound, not background hiss
    pub silence_threshold: f32,
    /// Seconds of continuous silence after which recording auto-stops
    pub silence_timeout_secs: u64,
    /// Hard cap on recording length in seconds
    pub max_duration_secs: u64,
    /// Seconds of audio that must be captured before silence can auto-stop
    pub min_audio_secs: u64,
}

/// Speech API settings.
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    /// API key; empty falls back to the `GROQ_API_KEY` environment variable
    pub key: String,
    /// Transcription endpoint URL
    pub endpoint: String,
    /// Model identifier sent with each request
    pub model: String,
    /// Language hint (ISO 639-1); empty lets the model auto-detect
    pub language: String,
    /// Optional domain-vocabulary hint passed as the request prompt
    pub vocabulary_hint: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

/// Retry policy knobs.
#[derive(Debug, Deserialize, Clone)]
pub struct TranscribeConfig {
    /// Total attempts per recording, including the first
    pub max_attempts: u32,
    /// Cooldown after an HTTP 429 in seconds
    pub rate_limit_cooldown_secs: u64,
    /// Cooldown after a request timeout in seconds
    pub timeout_cooldown_secs: u64,
    /// Cooldown after any other failure (or a placeholder result) in seconds
    pub error_cooldown_secs: u64,
}

/// What happens with a finished transcript.
#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    /// Copy the transcript to the clipboard
    pub copy_to_clipboard: bool,
    /// Simulate the platform paste chord into the focused application
    pub auto_paste: bool,
}

/// Log destination settings.
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    /// Log to `log_path` instead of stdout
    pub log_to_file: bool,
    /// Log file path; `~` expands to the home directory
    pub log_path: String,
}

impl Config {
    /// Load config from `~/.vox-hotkey.toml`, creating it with defaults first
    /// if missing.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, created, or parsed.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default(&config_path).context("failed to create default config")?;
        }

        let contents = fs::read_to_string(&config_path).context("failed to read config file")?;

        let config: Self = toml::from_str(&contents).context("failed to parse config TOML")?;

        Ok(config)
    }

    fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        Ok(PathBuf::from(home).join(".vox-hotkey.toml"))
    }

    fn create_default(path: &PathBuf) -> Result<()> {
        fs::write(path, DEFAULT_CONFIG).context("failed to write default config")?;
        Ok(())
    }

    /// Expand `~` in paths to the home directory
    ///
    /// # Errors
    /// Returns error if HOME is not set.
    pub fn expand_path(path: &str) -> Result<PathBuf> {
        if let Some(stripped) = path.strip_prefix("~/") {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            Ok(PathBuf::from(home).join(stripped))
        } else {
            Ok(PathBuf::from(path))
        }
    }

    /// Resolve the API key from config or the `GROQ_API_KEY` environment
    /// variable. Empty means not configured.
    #[must_use]
    pub fn resolve_api_key(&self) -> String {
        if self.api.key.is_empty() {
            std::env::var("GROQ_API_KEY").unwrap_or_default()
        } else {
            self.api.key.clone()
        }
    }
}

impl AudioConfig {
    /// Silence timeout as a [`Duration`].
    #[must_use]
    pub const fn silence_timeout(&self) -> Duration {
        Duration::from_secs(self.silence_timeout_secs)
    }

    /// Max recording duration as a [`Duration`].
    #[must_use]
    pub const fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }

    /// Minimum captured samples before silence may auto-stop.
    #[must_use]
    pub const fn min_samples(&self) -> usize {
        (self.sample_rate as usize).saturating_mul(self.min_audio_secs as usize)
    }
}

const DEFAULT_CONFIG: &str = r#"[hotkey]
modifiers = []
key = "F9"

[audio]
# Empty device name selects the system default microphone.
device = ""
sample_rate = 16000
# Fraction of full scale treated as level 1.0. Raise if the level pins at
# maximum, lower if a normal speaking voice barely registers.
gain_calibration = 0.02
silence_threshold = 0.1
silence_timeout_secs = 20
max_duration_secs = 300
min_audio_secs = 2

[api]
# Leave empty to use the GROQ_API_KEY environment variable.
key = ""
endpoint = "https://api.groq.com/openai/v1/audio/transcriptions"
model = "whisper-large-v3"
language = "en"
vocabulary_hint = ""
request_timeout_secs = 60

[transcribe]
max_attempts = 3
rate_limit_cooldown_secs = 30
timeout_cooldown_secs = 5
error_cooldown_secs = 2

[output]
copy_to_clipboard = true
auto_paste = true

[telemetry]
log_to_file = false
log_path = "~/.vox-hotkey/app.log"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();

        assert_eq!(config.hotkey.key, "F9");
        assert!(config.hotkey.modifiers.is_empty());
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.silence_timeout(), Duration::from_secs(20));
        assert_eq!(config.audio.max_duration(), Duration::from_secs(300));
        assert_eq!(config.audio.min_samples(), 32000);
        assert_eq!(config.transcribe.max_attempts, 3);
        assert_eq!(config.transcribe.rate_limit_cooldown_secs, 30);
        assert!(config.output.copy_to_clipboard);
        assert!(config.output.auto_paste);
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let home = std::env::var("HOME").unwrap();
        let result = Config::expand_path("~/logs/app.log").unwrap();
        assert_eq!(result, PathBuf::from(home).join("logs/app.log"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let result = Config::expand_path("/var/log/app.log").unwrap();
        assert_eq!(result, PathBuf::from("/var/log/app.log"));
    }

    #[test]
    fn test_api_key_from_config_wins_over_env() {
        let mut config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        config.api.key = "gsk_config".to_owned();
        assert_eq!(config.resolve_api_key(), "gsk_config");
    }

    #[test]
    fn test_min_samples_scales_with_rate() {
        let mut config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        config.audio.sample_rate = 8000;
        config.audio.min_audio_secs = 3;
        assert_eq!(config.audio.min_samples(), 24000);
    }
}
