//! Phrase segmentation
//!
//! Splits the incoming sample stream into silence-terminated phrases using
//! RMS energy. A phrase ends after a trailing silence window or when it hits
//! the phrase-length ceiling, whichever comes first.

use super::SAMPLE_RATE;

/// Minimum audio energy threshold to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech to form a phrase (in samples at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800; // 0.3 seconds

/// Silence duration that terminates a phrase (in samples)
const SILENCE_SAMPLES: usize = 8000; // 0.5 seconds

/// Ceiling on a single phrase; a longer utterance is cut here
const MAX_PHRASE_SAMPLES: usize = SAMPLE_RATE as usize * 8;

/// Segmentation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentState {
    /// Waiting for speech
    Idle,
    /// Accumulating a potential phrase
    Listening,
}

/// Detects silence-terminated phrases in an audio stream
pub struct PhraseDetector {
    state: SegmentState,
    speech_buffer: Vec<f32>,
    /// Samples that actually carried speech energy; silence padding in the
    /// buffer must not count toward the minimum-speech bar
    speech_samples: usize,
    silence_counter: usize,
}

impl Default for PhraseDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl PhraseDetector {
    /// Create a new detector in the idle state
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: SegmentState::Idle,
            speech_buffer: Vec::new(),
            speech_samples: 0,
            silence_counter: 0,
        }
    }

    /// Feed a chunk of samples. Returns `true` when a complete phrase is
    /// available via [`Self::take_phrase`].
    pub fn process(&mut self, samples: &[f32]) -> bool {
        let energy = calculate_energy(samples);
        let is_speech = energy > ENERGY_THRESHOLD;

        match self.state {
            SegmentState::Idle => {
                if is_speech {
                    self.state = SegmentState::Listening;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend_from_slice(samples);
                    self.speech_samples = samples.len();
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech detected, listening");
                }
                false
            }
            SegmentState::Listening => {
                self.speech_buffer.extend_from_slice(samples);

                if is_speech {
                    self.speech_samples += samples.len();
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                // Phrase ceiling: cut the utterance rather than grow without bound
                if self.speech_buffer.len() >= MAX_PHRASE_SAMPLES {
                    tracing::debug!(
                        samples = self.speech_buffer.len(),
                        "phrase ceiling reached"
                    );
                    return true;
                }

                // Enough speech followed by enough silence completes the phrase
                if self.silence_counter > SILENCE_SAMPLES
                    && self.speech_samples > MIN_SPEECH_SAMPLES
                {
                    tracing::debug!(samples = self.speech_buffer.len(), "phrase complete");
                    return true;
                }

                // Too much silence without enough speech: false start
                if self.silence_counter > SILENCE_SAMPLES * 2 {
                    tracing::trace!("false start, resetting");
                    self.reset();
                }

                false
            }
        }
    }

    /// Take the accumulated phrase, returning the detector to idle
    pub fn take_phrase(&mut self) -> Vec<f32> {
        let phrase = std::mem::take(&mut self.speech_buffer);
        self.reset();
        phrase
    }

    /// Discard any partial phrase and return to idle
    pub fn reset(&mut self) {
        self.state = SegmentState::Idle;
        self.speech_buffer.clear();
        self.speech_samples = 0;
        self.silence_counter = 0;
    }

    /// Whether a phrase is currently being accumulated
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.state == SegmentState::Listening
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(duration_secs: f32, amplitude: f32) -> Vec<f32> {
        let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
        (0..num_samples)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE as f32;
                amplitude * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
            })
            .collect()
    }

    fn silence(duration_secs: f32) -> Vec<f32> {
        vec![0.0; (SAMPLE_RATE as f32 * duration_secs) as usize]
    }

    #[test]
    fn energy_calculation() {
        assert!(calculate_energy(&silence(0.01)) < 0.001);
        assert!(calculate_energy(&vec![0.5f32; 100]) > 0.4);
        assert!(calculate_energy(&[]) < f32::EPSILON);
    }

    #[test]
    fn silence_alone_never_triggers() {
        let mut detector = PhraseDetector::new();
        assert!(!detector.process(&silence(1.0)));
        assert!(!detector.is_listening());
    }

    #[test]
    fn speech_then_silence_completes_a_phrase() {
        let mut detector = PhraseDetector::new();

        detector.process(&sine(0.5, 0.3));
        assert!(detector.is_listening());

        let complete = detector.process(&silence(0.6));
        assert!(complete);

        let phrase = detector.take_phrase();
        assert!(!phrase.is_empty());
        assert!(!detector.is_listening());
    }

    #[test]
    fn short_blip_is_a_false_start() {
        let mut detector = PhraseDetector::new();

        // Well under MIN_SPEECH_SAMPLES
        detector.process(&sine(0.05, 0.3));
        assert!(detector.is_listening());

        // Long silence discards it without completing
        let mut completed = false;
        for _ in 0..15 {
            completed |= detector.process(&silence(0.1));
        }
        assert!(!completed);
        assert!(!detector.is_listening());
    }

    #[test]
    fn phrase_ceiling_cuts_long_utterances() {
        let mut detector = PhraseDetector::new();

        let chunk = sine(0.5, 0.3);
        let mut completed = false;
        // 10 seconds of continuous speech must complete at the 8 second ceiling
        for _ in 0..20 {
            if detector.process(&chunk) {
                completed = true;
                break;
            }
        }
        assert!(completed);
        assert!(detector.take_phrase().len() >= MAX_PHRASE_SAMPLES);
    }

    #[test]
    fn take_phrase_resets_the_detector() {
        let mut detector = PhraseDetector::new();
        detector.process(&sine(0.5, 0.3));
        detector.process(&silence(0.6));

        let first = detector.take_phrase();
        assert!(!first.is_empty());
        assert!(detector.take_phrase().is_empty());
    }
}
