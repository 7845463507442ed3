//! Speech capture adapter
//!
//! A dedicated thread owns the microphone stream (cpal streams are not
//! `Send`) and loops: accumulate a silence-terminated phrase, transcribe it,
//! apply the wake-word filter, and deliver the text to the coordinator's
//! channel. Stop and pause are cooperative flags checked between blocking
//! steps, so both take effect with bounded latency.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;

use super::{Microphone, PhraseDetector, SAMPLE_RATE, SpeechToText, samples_to_wav};

/// How often the capture loop drains the microphone buffer
const CHUNK_INTERVAL: Duration = Duration::from_millis(100);

/// Delay before retrying after a device or recognition failure
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Notifications from the capture thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// A transcript was recognized (wake word already stripped)
    Transcript(String),
    /// A transient problem worth surfacing as a status message
    Status(String),
}

/// Capture configuration snapshot taken at spawn time
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub mic_device: Option<String>,
    pub wake_word: Option<String>,
    pub language: String,
}

/// Handle to the capture thread
pub struct CaptureAdapter {
    running: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
}

impl CaptureAdapter {
    /// Spawn the capture thread, initially paused
    ///
    /// The thread opens the microphone lazily on first resume so that a
    /// missing device surfaces as a status message, not a startup failure.
    #[must_use]
    pub fn spawn(config: CaptureConfig, events: UnboundedSender<CaptureEvent>) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let paused = Arc::new(AtomicBool::new(true));

        let thread_running = Arc::clone(&running);
        let thread_paused = Arc::clone(&paused);
        std::thread::spawn(move || {
            capture_loop(&config, &thread_running, &thread_paused, &events);
        });

        Self { running, paused }
    }

    /// Suspend capture; takes effect at the next loop iteration
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Resume capture
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Whether capture is currently suspended
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Stop the capture thread; idempotent, cooperative
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// The capture thread body
fn capture_loop(
    config: &CaptureConfig,
    running: &AtomicBool,
    paused: &AtomicBool,
    events: &UnboundedSender<CaptureEvent>,
) {
    let stt = match SpeechToText::new(&config.language) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "recognition client unavailable");
            let _ = events.send(CaptureEvent::Status(format!("Voice error: {e}")));
            return;
        }
    };

    let mut mic: Option<Microphone> = None;
    let mut detector = PhraseDetector::new();
    let mut reported_device_error = false;

    while running.load(Ordering::SeqCst) {
        if paused.load(Ordering::SeqCst) {
            if let Some(m) = mic.as_mut() {
                m.stop();
            }
            detector.reset();
            std::thread::sleep(CHUNK_INTERVAL);
            continue;
        }

        // (Re)open and start the microphone on demand
        let mic_ref = match ensure_capturing(&mut mic, config) {
            Ok(m) => {
                reported_device_error = false;
                m
            }
            Err(e) => {
                tracing::warn!(error = %e, "microphone unavailable");
                if !reported_device_error {
                    let _ = events.send(CaptureEvent::Status(format!("Mic error: {e}")));
                    reported_device_error = true;
                }
                std::thread::sleep(RETRY_BACKOFF);
                continue;
            }
        };

        std::thread::sleep(CHUNK_INTERVAL);
        let samples = mic_ref.take_buffer();
        if samples.is_empty() {
            continue;
        }

        if !detector.process(&samples) {
            continue;
        }

        let phrase = detector.take_phrase();
        mic_ref.clear_buffer();

        let wav = match samples_to_wav(&phrase, SAMPLE_RATE) {
            Ok(wav) => wav,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode phrase");
                continue;
            }
        };

        match stt.transcribe(wav) {
            // Empty transcript: nothing understood, keep listening
            Ok(text) if text.trim().is_empty() => {}
            Ok(text) => match apply_wake_word(&text, config.wake_word.as_deref()) {
                Some(command) => {
                    tracing::info!(transcript = %command, "voice input recognized");
                    let _ = events.send(CaptureEvent::Transcript(command));
                }
                None => {
                    tracing::debug!(transcript = %text, "no wake word, dropped");
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "transcription failed");
                let _ = events.send(CaptureEvent::Status("Didn't catch that".to_string()));
                std::thread::sleep(RETRY_BACKOFF);
            }
        }
    }

    if let Some(m) = mic.as_mut() {
        m.stop();
    }
    tracing::debug!("capture loop exited");
}

/// Open the microphone if needed and make sure the stream is running
fn ensure_capturing<'a>(
    mic: &'a mut Option<Microphone>,
    config: &CaptureConfig,
) -> crate::Result<&'a mut Microphone> {
    let m = match mic {
        Some(m) => m,
        None => mic.insert(Microphone::open(config.mic_device.as_deref())?),
    };
    if !m.is_capturing() {
        m.start()?;
        m.clear_buffer();
    }
    Ok(m)
}

/// Apply the wake-word contract: without a wake word every transcript
/// passes; with one, the transcript must contain it and the command is
/// whatever follows. Returns `None` when the transcript should be dropped.
#[must_use]
pub fn apply_wake_word(transcript: &str, wake_word: Option<&str>) -> Option<String> {
    let Some(wake) = wake_word else {
        let trimmed = transcript.trim();
        return (!trimmed.is_empty()).then(|| trimmed.to_string());
    };

    let command = extract_command(transcript, wake)?;
    (!command.is_empty()).then_some(command)
}

/// Extract the command after the wake word (case-insensitive); `None` when
/// the wake word is absent
#[must_use]
pub fn extract_command(transcript: &str, wake_word: &str) -> Option<String> {
    let lower = transcript.to_lowercase();
    let wake_lower = wake_word.to_lowercase();

    lower.find(&wake_lower).map(|pos| {
        transcript[pos + wake_word.len()..]
            .trim_start_matches(|c: char| c.is_whitespace() || c == ',' || c == '.')
            .trim_end()
            .to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_follows_wake_word() {
        assert_eq!(
            extract_command("Hey Vynx, what's the weather?", "hey vynx").as_deref(),
            Some("what's the weather?")
        );
        assert_eq!(extract_command("Hey Vynx", "hey vynx").as_deref(), Some(""));
    }

    #[test]
    fn missing_wake_word_yields_none() {
        assert_eq!(extract_command("what's the weather?", "hey vynx"), None);
    }

    #[test]
    fn wake_word_filter_drops_unrelated_speech() {
        assert_eq!(apply_wake_word("random chatter", Some("vynx")), None);
        assert_eq!(
            apply_wake_word("vynx play some music", Some("vynx")).as_deref(),
            Some("play some music")
        );
        // Wake word alone is not a command
        assert_eq!(apply_wake_word("vynx", Some("vynx")), None);
    }

    #[test]
    fn no_wake_word_passes_everything_nonempty() {
        assert_eq!(
            apply_wake_word("  hello there  ", None).as_deref(),
            Some("hello there")
        );
        assert_eq!(apply_wake_word("   ", None), None);
    }
}
