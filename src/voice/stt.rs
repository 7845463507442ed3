//! Speech-to-text client
//!
//! Wraps an external Whisper-compatible transcription API. Runs on the
//! capture thread with a blocking client; the endpoint is configurable so a
//! local transcription server can stand in for the hosted API.

use std::time::Duration;

use crate::{Error, Result};

/// Default transcription endpoint (OpenAI-compatible)
const DEFAULT_STT_URL: &str = "https://api.openai.com/v1/audio/transcriptions";

/// Response from a Whisper-compatible transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Transcribes captured speech via an external recognition API
pub struct SpeechToText {
    client: reqwest::blocking::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    language: String,
}

impl SpeechToText {
    /// Create a new STT client
    ///
    /// The endpoint comes from `VYNX_STT_URL` (default: OpenAI), the API key
    /// from `OPENAI_API_KEY`. Local servers typically need no key.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(language: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: std::env::var("VYNX_STT_URL").unwrap_or_else(|_| DEFAULT_STT_URL.to_string()),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            model: "whisper-1".to_string(),
            language: language.to_string(),
        })
    }

    /// Transcribe WAV audio to text
    ///
    /// An empty transcript means nothing was understood; that is a valid
    /// outcome, not an error.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the service rejects it
    pub fn transcribe(&self, audio: Vec<u8>) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting transcription");

        let form = reqwest::blocking::multipart::Form::new()
            .part(
                "file",
                reqwest::blocking::multipart::Part::bytes(audio)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Recognition(e.to_string()))?,
            )
            .text("model", self.model.clone())
            .text("language", self.language.clone());

        let mut request = self.client.post(&self.url).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request
            .send()
            .map_err(|e| Error::Recognition(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "recognition API error");
            return Err(Error::Recognition(format!("API error {status}: {body}")));
        }

        let result: WhisperResponse = response
            .json()
            .map_err(|e| Error::Recognition(format!("failed to parse response: {e}")))?;

        let transcript = result.text.trim().to_string();
        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}
