//! Text-to-speech client
//!
//! Wraps an external OpenAI-compatible speech synthesis API: voice id,
//! speaking rate, and text in, MP3 audio out. Runs on the playback worker
//! thread with a blocking client.

use std::time::Duration;

use crate::{Error, Result};

/// Default synthesis endpoint (OpenAI-compatible)
const DEFAULT_TTS_URL: &str = "https://api.openai.com/v1/audio/speech";

/// Nominal conversational speaking rate used to map words/minute onto the
/// API's speed multiplier
const NOMINAL_WPM: f32 = 175.0;

/// Synthesizes speech from text
pub struct TextToSpeech {
    client: reqwest::blocking::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    voice: String,
    speed: f32,
}

impl TextToSpeech {
    /// Create a new TTS client
    ///
    /// The endpoint comes from `VYNX_TTS_URL` (default: OpenAI), the API key
    /// from `OPENAI_API_KEY`. `rate_wpm` is the configured speaking rate in
    /// words per minute.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(voice_id: Option<&str>, rate_wpm: u32) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: std::env::var("VYNX_TTS_URL").unwrap_or_else(|_| DEFAULT_TTS_URL.to_string()),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            model: "tts-1".to_string(),
            voice: voice_id.unwrap_or("alloy").to_string(),
            speed: wpm_to_speed(rate_wpm),
        })
    }

    /// Synthesize text to MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the service rejects it
    pub fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
        };

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder.send().map_err(|e| Error::Tts(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::Tts(format!("API error {status}: {body}")));
        }

        let audio = response.bytes().map_err(|e| Error::Tts(e.to_string()))?;
        Ok(audio.to_vec())
    }
}

/// Map a words/minute rate onto the API's speed multiplier (0.25 to 4.0)
#[allow(clippy::cast_precision_loss)]
fn wpm_to_speed(rate_wpm: u32) -> f32 {
    (rate_wpm as f32 / NOMINAL_WPM).clamp(0.25, 4.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nominal_rate_maps_to_unit_speed() {
        assert!((wpm_to_speed(175) - 1.0).abs() < 0.001);
    }

    #[test]
    fn rates_scale_proportionally() {
        assert!(wpm_to_speed(350) > 1.9);
        assert!(wpm_to_speed(90) < 0.6);
    }

    #[test]
    fn extreme_rates_are_clamped() {
        assert!((wpm_to_speed(1) - 0.25).abs() < 0.001);
        assert!((wpm_to_speed(10_000) - 4.0).abs() < 0.001);
    }
}
