//! Error types for Vynx

use thiserror::Error;

/// Result type alias for Vynx operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Vynx
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error (microphone or speaker unavailable/busy)
    #[error("device error: {0}")]
    Device(String),

    /// Speech recognition error (transient, retried with backoff)
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Text-to-speech synthesis error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Audio playback error
    #[error("playback error: {0}")]
    Playback(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
