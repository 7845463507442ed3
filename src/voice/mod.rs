//! Voice processing module
//!
//! Microphone capture, phrase segmentation, speech recognition, and spoken
//! playback. Recognition and synthesis are external HTTP services; the
//! adapters here wrap them behind cooperative start/stop contracts and
//! deliver results to the coordinator as channel messages.

mod capture;
mod mic;
mod phrase;
mod playback;
mod stt;
mod tts;

pub use capture::{CaptureAdapter, CaptureConfig, CaptureEvent, apply_wake_word, extract_command};
pub use mic::{Microphone, SAMPLE_RATE, samples_to_wav};
pub use phrase::PhraseDetector;
pub use playback::{PlaybackEvent, SpeechPlayback, strip_emojis};
pub use stt::SpeechToText;
pub use tts::TextToSpeech;
