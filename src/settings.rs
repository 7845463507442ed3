//! Settings management for Vynx
//!
//! A flat configuration record persisted as JSON. Loaded once at startup
//! (env > file > default), replaced wholesale on save. A missing file is
//! created with defaults on first run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Vynx configuration record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Model identifier passed to the external model process
    pub model_name: String,

    /// Persona system prompt; empty selects the built-in persona
    pub system_prompt: String,

    /// TTS voice identifier; `None` uses the engine default
    pub tts_voice_id: Option<String>,

    /// TTS speaking rate in words per minute
    pub tts_rate: u32,

    /// TTS output volume (0.0 to 1.0)
    pub tts_volume: f32,

    /// Preferred microphone device name (substring match); `None` uses the default input
    pub mic_device: Option<String>,

    /// Optional wake word that must precede voice commands
    pub wake_word: Option<String>,

    /// Write a log file under the data directory
    pub logs_enabled: bool,

    /// Include the long-term memory log in prompts
    pub memory_enabled: bool,

    /// Reply word limit before sentence truncation kicks in (0 = unlimited)
    pub max_reply_words: usize,

    /// History turn-pairs retained for prompt construction
    pub max_history_turns: usize,

    /// Character budget for the assembled prompt
    pub max_prompt_chars: usize,

    /// Wall-clock bound on a single model invocation
    pub generation_timeout_secs: u64,

    /// Language hint sent to the recognition API
    pub stt_language: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model_name: "mistral".to_string(),
            system_prompt: String::new(),
            tts_voice_id: None,
            tts_rate: 180,
            tts_volume: 1.0,
            mic_device: None,
            wake_word: None,
            logs_enabled: true,
            memory_enabled: false,
            max_reply_words: 30,
            max_history_turns: 10,
            max_prompt_chars: 4000,
            generation_timeout_secs: 120,
            stt_language: "en".to_string(),
        }
    }
}

impl Settings {
    /// Default config file path: `~/.config/vynx/config.json`
    #[must_use]
    pub fn default_path() -> PathBuf {
        let config_dir = directories::BaseDirs::new().map_or_else(
            || PathBuf::from(".config/vynx"),
            |d| d.config_dir().join("vynx"),
        );
        config_dir.join("config.json")
    }

    /// Load settings from the given path, creating the file with defaults
    /// when absent. Environment variables override file values.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed, or if
    /// a missing file cannot be created.
    pub fn load(path: &Path) -> Result<Self> {
        let mut settings = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?
        } else {
            let defaults = Self::default();
            defaults.save(path)?;
            tracing::info!(path = %path.display(), "created default settings file");
            defaults
        };

        // Env overrides (env > file > default)
        if let Ok(model) = std::env::var("VYNX_MODEL") {
            settings.model_name = model;
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Save the full record, replacing the file contents
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::debug!(path = %path.display(), "settings saved");
        Ok(())
    }

    /// Check field ranges
    fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(Error::Config("model_name must not be empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.tts_volume) {
            return Err(Error::Config(format!(
                "tts_volume must be between 0.0 and 1.0, got {}",
                self.tts_volume
            )));
        }
        if self.generation_timeout_secs == 0 {
            return Err(Error::Config(
                "generation_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Data directory for memory log and log file: `~/.local/share/vynx`
    #[must_use]
    pub fn data_dir() -> PathBuf {
        directories::BaseDirs::new().map_or_else(
            || PathBuf::from(".local/share/vynx"),
            |d| d.data_dir().join("vynx"),
        )
    }
}
