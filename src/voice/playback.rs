//! Spoken playback
//!
//! A dedicated worker thread owns the synthesis client and the output
//! device; callers never touch either directly. The pending-utterance queue
//! holds at most one item: submitting a new utterance interrupts the current
//! one and replaces anything queued (latest wins, never a backlog).
//!
//! Event contract: the worker reports `Started` when an utterance begins and
//! `Finished` when it ends or fails. An utterance superseded before its end
//! reports no `Finished` — the replacement's events take over, so the
//! coordinator is never left waiting.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;
use tokio::sync::mpsc::UnboundedSender;

use super::TextToSpeech;
use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Poll interval while waiting for an utterance to drain
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Notifications from the playback worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// An utterance began playing
    Started,
    /// The current utterance ended (or failed, which counts as an end)
    Finished,
}

/// Shared state between the handle and the worker thread
struct Shared {
    /// The single pending utterance slot
    slot: Mutex<Option<String>>,
    wake: Condvar,
    /// Interrupts the in-flight utterance; written under the slot lock
    cancel: AtomicBool,
    running: AtomicBool,
}

/// Handle to the playback worker
pub struct SpeechPlayback {
    shared: Arc<Shared>,
}

impl SpeechPlayback {
    /// Spawn the playback worker
    ///
    /// `events` receives the start/finish notifications; the coordinator
    /// drains them on its own schedule.
    #[must_use]
    pub fn spawn(
        voice_id: Option<String>,
        rate_wpm: u32,
        volume: f32,
        events: UnboundedSender<PlaybackEvent>,
    ) -> Self {
        let shared = Arc::new(Shared {
            slot: Mutex::new(None),
            wake: Condvar::new(),
            cancel: AtomicBool::new(false),
            running: AtomicBool::new(true),
        });

        let worker_shared = Arc::clone(&shared);
        std::thread::spawn(move || {
            worker_loop(&worker_shared, voice_id.as_deref(), rate_wpm, volume, &events);
        });

        Self { shared }
    }

    /// Queue an utterance, interrupting and replacing any current one
    pub fn speak(&self, text: &str) {
        let mut slot = self.shared.slot.lock().unwrap();
        *slot = Some(text.to_string());
        self.shared.cancel.store(true, Ordering::SeqCst);
        self.shared.wake.notify_one();
    }

    /// Stop the current utterance and drain the queue
    pub fn stop(&self) {
        let mut slot = self.shared.slot.lock().unwrap();
        *slot = None;
        self.shared.cancel.store(true, Ordering::SeqCst);
        self.shared.wake.notify_one();
    }

    /// Terminate the worker; idempotent
    pub fn shutdown(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.stop();
    }
}

/// Worker: wait for an utterance, synthesize, play, report
fn worker_loop(
    shared: &Shared,
    voice_id: Option<&str>,
    rate_wpm: u32,
    volume: f32,
    events: &UnboundedSender<PlaybackEvent>,
) {
    let tts = match TextToSpeech::new(voice_id, rate_wpm) {
        Ok(client) => Some(client),
        Err(e) => {
            tracing::error!(error = %e, "TTS client unavailable, playback disabled");
            None
        }
    };

    loop {
        // Block until there is work or shutdown
        let text = {
            let mut slot = shared.slot.lock().unwrap();
            loop {
                if !shared.running.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(text) = slot.take() {
                    // Clearing cancel under the lock pairs with speak()'s
                    // set-under-lock, so an interrupt for the next utterance
                    // cannot be lost.
                    shared.cancel.store(false, Ordering::SeqCst);
                    break text;
                }
                slot = shared.wake.wait(slot).unwrap();
            }
        };

        let _ = events.send(PlaybackEvent::Started);

        let spoken = strip_emojis(&text);
        let result = tts.as_ref().map_or_else(
            || Err(Error::Tts("no synthesis client".to_string())),
            |client| {
                client
                    .synthesize(&spoken)
                    .and_then(|mp3| play_mp3(&mp3, volume, &shared.cancel))
            },
        );

        if let Err(e) = result {
            // Playback errors are an immediate end-of-utterance, never fatal
            tracing::warn!(error = %e, "playback failed");
        }

        let superseded = shared.slot.lock().unwrap().is_some();
        if !superseded {
            let _ = events.send(PlaybackEvent::Finished);
        }

        if !shared.running.load(Ordering::SeqCst) {
            return;
        }
    }
}

/// Decode MP3 audio and play it on the default output device, scaling by
/// `volume`. Checks `cancel` while draining so an interrupt cuts playback.
fn play_mp3(mp3_data: &[u8], volume: f32, cancel: &AtomicBool) -> Result<()> {
    let mut samples = decode_mp3(mp3_data)?;
    if samples.is_empty() {
        return Ok(());
    }

    let volume = volume.clamp(0.0, 1.0);
    for sample in &mut samples {
        *sample *= volume;
    }

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Playback("no output device available".to_string()))?;

    let supported_config = device
        .supported_output_configs()
        .map_err(|e| Error::Playback(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
        })
        .or_else(|| {
            // Fallback: try stereo
            device.supported_output_configs().ok()?.find(|c| {
                c.channels() == 2
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
        })
        .ok_or_else(|| Error::Playback("no suitable output config found".to_string()))?;

    let config = supported_config
        .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
        .config();
    let channels = config.channels as usize;

    let sample_count = samples.len();
    let samples = Arc::new(samples);
    let position = Arc::new(Mutex::new(0usize));
    let finished = Arc::new(AtomicBool::new(false));

    let samples_cb = Arc::clone(&samples);
    let position_cb = Arc::clone(&position);
    let finished_cb = Arc::clone(&finished);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let Ok(mut pos) = position_cb.lock() else {
                    return;
                };

                for frame in data.chunks_mut(channels) {
                    let sample = if *pos < samples_cb.len() {
                        samples_cb[*pos]
                    } else {
                        finished_cb.store(true, Ordering::Relaxed);
                        0.0
                    };

                    for out in frame.iter_mut() {
                        *out = sample;
                    }

                    if *pos < samples_cb.len() {
                        *pos += 1;
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Playback(e.to_string()))?;

    stream.play().map_err(|e| Error::Playback(e.to_string()))?;

    // Wait for playback to drain, bounded by the audio duration plus slack
    let duration_ms = (sample_count as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);
    let deadline = std::time::Instant::now() + Duration::from_millis(duration_ms + 500);

    while !finished.load(Ordering::Relaxed) {
        if cancel.load(Ordering::SeqCst) {
            tracing::debug!("playback interrupted");
            break;
        }
        if std::time::Instant::now() > deadline {
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    drop(stream);
    tracing::debug!(samples = sample_count, "playback complete");

    Ok(())
}

/// Decode MP3 bytes to f32 samples
fn decode_mp3(mp3_data: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                // Convert i16 samples to f32 and mix stereo down to mono
                let frame_samples: Vec<f32> = if frame.channels == 2 {
                    frame
                        .data
                        .chunks(2)
                        .map(|chunk| {
                            let left = f32::from(chunk[0]) / 32768.0;
                            let right =
                                f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                            f32::midpoint(left, right)
                        })
                        .collect()
                } else {
                    frame.data.iter().map(|&s| f32::from(s) / 32768.0).collect()
                };

                samples.extend(frame_samples);
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Playback(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(samples)
}

/// Remove emoji before synthesis; most engines read them out literally
#[must_use]
pub fn strip_emojis(text: &str) -> String {
    text.chars().filter(|&c| !is_emoji(c)).collect()
}

const fn is_emoji(c: char) -> bool {
    matches!(c,
        '\u{1F300}'..='\u{1F5FF}'
        | '\u{1F600}'..='\u{1F64F}'
        | '\u{1F680}'..='\u{1F6FF}'
        | '\u{1F900}'..='\u{1F9FF}'
        | '\u{1F1E0}'..='\u{1F1FF}'
        | '\u{2600}'..='\u{27BF}'
        | '\u{FE0F}'
    )
}
