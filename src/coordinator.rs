//! Turn coordination
//!
//! The single source of truth for the conversation state. Capture,
//! generation, and playback are each blocking, long-latency operations that
//! must never overlap; the coordinator serializes them by owning one state
//! value and processing every input — typed text, voice transcripts,
//! generation results, playback notifications, toggles — as messages on one
//! channel, drained by one task. Workers never mutate shared state directly;
//! they send messages here and the UI observes ordered [`UiEvent`]s.
//!
//! State machine:
//!
//! ```text
//! Waiting --(user utterance)--> Thinking --(reply ready)--> Talking
//!    ^                                                         |
//!    +-----------------(playback finished)---------------------+
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::history::{History, Turn};
use crate::memory::MemoryStore;
use crate::response::{self, Responder};
use crate::settings::Settings;

/// Guard delay between the end of playback and re-arming the microphone, so
/// the tail of the TTS output is not captured
const REARM_GUARD: Duration = Duration::from_millis(300);

/// Trailing character window of the memory log included in prompts
const MEMORY_CONTEXT_CHARS: usize = 800;

/// The current conversation state; exactly one value is active at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    /// Idle, ready for input
    Waiting,
    /// A generation is in flight
    Thinking,
    /// The reply is being spoken
    Talking,
}

/// Where a submission came from; voice input is gated on the listening flag,
/// typed input is always accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Typed,
    Voice,
}

/// Inputs to the coordinator, from the UI, the adapters, and its own
/// spawned tasks
#[derive(Debug)]
pub enum Command {
    /// Typed user input
    SubmitText(String),
    /// Voice-originated user input (wake word already stripped)
    VoiceTranscript(String),
    /// A spawned generation task finished
    GenerationComplete(String),
    /// The playback worker started an utterance
    PlaybackStarted,
    /// The playback worker finished (or failed) an utterance
    PlaybackFinished,
    /// Internal: the post-playback guard delay elapsed
    ArmCapture,
    /// Flip the listening flag
    ToggleListening,
    /// Flip the voice-mode flag
    ToggleVoiceMode,
    /// A transient adapter status worth showing to the user
    Status(String),
    /// Terminate; safe to send more than once
    Quit,
}

/// Ordered notifications for the presentation shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// The conversation state changed
    State(ConversationState),
    /// A user turn was accepted (render before generation starts)
    UserTurn(String),
    /// An assistant turn is ready
    AssistantTurn(String),
    /// The listening flag changed
    Listening(bool),
    /// The voice-mode flag changed
    VoiceMode(bool),
    /// Transient status toast
    Status(String),
    /// The session ended; the shell should close
    Quit,
}

/// Control seam for the capture adapter, so turn sequencing is testable
/// without audio hardware
pub trait CaptureControl: Send {
    /// Suspend capture (cooperative)
    fn pause(&self);
    /// Resume capture
    fn resume(&self);
    /// Stop for good (cooperative)
    fn stop(&self);
}

/// Control seam for the playback adapter
pub trait PlaybackControl: Send {
    /// Queue an utterance, replacing any current one
    fn speak(&self, text: &str);
    /// Stop the current utterance and drain the queue
    fn stop(&self);
    /// Terminate the worker
    fn shutdown(&self);
}

impl CaptureControl for crate::voice::CaptureAdapter {
    fn pause(&self) {
        self.pause();
    }
    fn resume(&self) {
        self.resume();
    }
    fn stop(&self) {
        self.stop();
    }
}

impl PlaybackControl for crate::voice::SpeechPlayback {
    fn speak(&self, text: &str) {
        self.speak(text);
    }
    fn stop(&self) {
        self.stop();
    }
    fn shutdown(&self) {
        self.shutdown();
    }
}

/// Owns the conversation state and sequences each turn:
/// capture → generate → speak → back to listening
pub struct Coordinator {
    state: ConversationState,
    listening_enabled: bool,
    voice_mode: bool,
    history: History,
    max_history_turns: usize,
    memory: Option<MemoryStore>,
    responder: Arc<dyn Responder>,
    capture: Option<Box<dyn CaptureControl>>,
    playback: Box<dyn PlaybackControl>,
    ui_tx: UnboundedSender<UiEvent>,
    cmd_tx: UnboundedSender<Command>,
    cmd_rx: Option<UnboundedReceiver<Command>>,
    quitting: bool,
}

impl Coordinator {
    /// Create a coordinator with its command and event channels.
    ///
    /// Returns the coordinator, the sender for feeding it commands, and the
    /// receiver the presentation shell drains.
    #[must_use]
    pub fn new(
        settings: &Settings,
        responder: Arc<dyn Responder>,
        capture: Option<Box<dyn CaptureControl>>,
        playback: Box<dyn PlaybackControl>,
        memory: Option<MemoryStore>,
    ) -> (Self, UnboundedSender<Command>, UnboundedReceiver<UiEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (ui_tx, ui_rx) = mpsc::unbounded_channel();

        let coordinator = Self {
            state: ConversationState::Waiting,
            listening_enabled: true,
            voice_mode: false,
            history: History::new(),
            max_history_turns: settings.max_history_turns,
            memory,
            responder,
            capture,
            playback,
            ui_tx,
            cmd_tx: cmd_tx.clone(),
            cmd_rx: Some(cmd_rx),
            quitting: false,
        };

        (coordinator, cmd_tx, ui_rx)
    }

    /// Drain commands until quit
    pub async fn run(mut self) {
        let Some(mut rx) = self.cmd_rx.take() else {
            return;
        };

        // Initial snapshot so the shell renders consistent affordances
        self.emit(UiEvent::State(self.state));
        self.emit(UiEvent::Listening(self.listening_enabled));
        self.emit(UiEvent::VoiceMode(self.voice_mode));

        while let Some(cmd) = rx.recv().await {
            self.handle(cmd);
            if self.quitting {
                break;
            }
        }

        tracing::info!("coordinator stopped");
    }

    /// Process one command; all state mutation happens here
    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::SubmitText(text) => self.submit(&text, Origin::Typed),
            Command::VoiceTranscript(text) => self.submit(&text, Origin::Voice),
            Command::GenerationComplete(reply) => self.on_generation_complete(reply),
            Command::PlaybackStarted => {
                tracing::debug!("utterance started");
            }
            Command::PlaybackFinished => self.on_playback_finished(),
            Command::ArmCapture => self.arm_capture(),
            Command::ToggleListening => self.toggle_listening(),
            Command::ToggleVoiceMode => self.toggle_voice_mode(),
            Command::Status(message) => self.emit(UiEvent::Status(message)),
            Command::Quit => self.quit(),
        }
    }

    /// Accept a user utterance and start the turn
    fn submit(&mut self, text: &str, origin: Origin) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        // Voice input respects the listening toggle; typed input does not
        if origin == Origin::Voice && !self.listening_enabled {
            self.emit(UiEvent::Status("Listening is off".to_string()));
            return;
        }

        // One turn at a time: a submission mid-turn would overlap generations
        // and corrupt turn ordering
        if self.state != ConversationState::Waiting {
            if origin == Origin::Typed {
                self.emit(UiEvent::Status("Still on the last one, hold on".to_string()));
            } else {
                tracing::debug!(transcript = %text, "transcript dropped mid-turn");
            }
            return;
        }

        // Snapshot history before appending so the prompt does not carry the
        // new user line twice
        let recent: Vec<Turn> = self.history.recent(self.max_history_turns).to_vec();

        self.history.push_user(text);
        self.emit(UiEvent::UserTurn(text.to_string()));
        self.set_state(ConversationState::Thinking);

        // Keep the microphone closed while we think and talk
        if let Some(capture) = &self.capture {
            capture.pause();
        }

        if let Some(ack) = response::handle_reset(text, &mut self.history) {
            // Short-circuit: no generation, but the ack still flows through
            // the normal talking path
            let _ = self.cmd_tx.send(Command::GenerationComplete(ack));
            return;
        }

        let memory_context = self.memory_context();
        let responder = Arc::clone(&self.responder);
        let cmd_tx = self.cmd_tx.clone();
        let user_text = text.to_string();
        tokio::spawn(async move {
            let reply = responder.respond(user_text, recent, memory_context).await;
            let _ = cmd_tx.send(Command::GenerationComplete(reply));
        });
    }

    /// A reply is ready (generation errors arrive here as reply text too)
    fn on_generation_complete(&mut self, reply: String) {
        if self.quitting {
            return;
        }
        if self.state != ConversationState::Thinking {
            tracing::warn!(state = ?self.state, "stale generation result dropped");
            return;
        }

        self.history.push_assistant(reply.clone());
        self.emit(UiEvent::AssistantTurn(reply.clone()));
        self.set_state(ConversationState::Talking);
        self.playback.speak(&reply);
    }

    /// The spoken reply finished; the turn is over
    fn on_playback_finished(&mut self) {
        if self.quitting || self.state != ConversationState::Talking {
            return;
        }

        self.set_state(ConversationState::Waiting);

        if self.voice_mode && self.listening_enabled {
            // Re-arm after a short guard delay so the microphone does not
            // pick up the tail of our own speech
            let cmd_tx = self.cmd_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(REARM_GUARD).await;
                let _ = cmd_tx.send(Command::ArmCapture);
            });
        }
    }

    /// Guard delay elapsed; resume capture if still appropriate
    fn arm_capture(&mut self) {
        if self.quitting
            || self.state != ConversationState::Waiting
            || !self.voice_mode
            || !self.listening_enabled
        {
            return;
        }
        if let Some(capture) = &self.capture {
            capture.resume();
        }
    }

    fn toggle_listening(&mut self) {
        self.listening_enabled = !self.listening_enabled;
        tracing::info!(enabled = self.listening_enabled, "listening toggled");
        self.emit(UiEvent::Listening(self.listening_enabled));
        if !self.listening_enabled {
            if let Some(capture) = &self.capture {
                capture.pause();
            }
        } else if self.voice_mode && self.state == ConversationState::Waiting {
            if let Some(capture) = &self.capture {
                capture.resume();
            }
        }
    }

    fn toggle_voice_mode(&mut self) {
        self.voice_mode = !self.voice_mode;
        tracing::info!(enabled = self.voice_mode, "voice mode toggled");
        self.emit(UiEvent::VoiceMode(self.voice_mode));

        if let Some(capture) = &self.capture {
            if self.voice_mode {
                // A toggle mid-turn only changes what happens after the turn
                // returns to Waiting; it never interrupts the turn itself
                if self.state == ConversationState::Waiting && self.listening_enabled {
                    capture.resume();
                }
            } else {
                capture.pause();
            }
        } else if self.voice_mode {
            self.emit(UiEvent::Status("Voice is unavailable in this session".to_string()));
        }
    }

    /// Terminate the session; idempotent
    fn quit(&mut self) {
        if self.quitting {
            return;
        }
        self.quitting = true;
        tracing::info!("quitting");

        self.playback.stop();
        self.playback.shutdown();
        if let Some(capture) = &self.capture {
            capture.stop();
        }

        self.emit(UiEvent::Quit);
    }

    /// Transition states and notify the shell in the same step
    fn set_state(&mut self, next: ConversationState) {
        if self.state != next {
            tracing::debug!(from = ?self.state, to = ?next, "state transition");
            self.state = next;
            self.emit(UiEvent::State(next));
        }
    }

    /// Summarize the memory log for prompt inclusion, when enabled
    fn memory_context(&self) -> String {
        let Some(memory) = &self.memory else {
            return String::new();
        };
        match memory.summarize_context(MEMORY_CONTEXT_CHARS) {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read memory log");
                String::new()
            }
        }
    }

    fn emit(&self, event: UiEvent) {
        // The shell may already be gone during shutdown; that is fine
        let _ = self.ui_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records calls instead of touching hardware
    #[derive(Default)]
    struct MockCapture {
        paused: AtomicUsize,
        resumed: AtomicUsize,
        stopped: AtomicUsize,
    }

    impl CaptureControl for Arc<MockCapture> {
        fn pause(&self) {
            self.paused.fetch_add(1, Ordering::SeqCst);
        }
        fn resume(&self) {
            self.resumed.fetch_add(1, Ordering::SeqCst);
        }
        fn stop(&self) {
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct MockPlayback {
        spoken: Mutex<Vec<String>>,
        stopped: AtomicUsize,
        shutdowns: AtomicUsize,
    }

    impl PlaybackControl for Arc<MockPlayback> {
        fn speak(&self, text: &str) {
            self.spoken.lock().unwrap().push(text.to_string());
        }
        fn stop(&self) {
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
        fn shutdown(&self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct CannedResponder(String);

    #[async_trait]
    impl Responder for CannedResponder {
        async fn respond(&self, _user: String, _history: Vec<Turn>, _memory: String) -> String {
            self.0.clone()
        }
    }

    struct Harness {
        cmd_tx: UnboundedSender<Command>,
        ui_rx: UnboundedReceiver<UiEvent>,
        capture: Arc<MockCapture>,
        playback: Arc<MockPlayback>,
    }

    fn start(reply: &str) -> Harness {
        let capture = Arc::new(MockCapture::default());
        let playback = Arc::new(MockPlayback::default());
        let (coordinator, cmd_tx, ui_rx) = Coordinator::new(
            &Settings::default(),
            Arc::new(CannedResponder(reply.to_string())),
            Some(Box::new(Arc::clone(&capture))),
            Box::new(Arc::clone(&playback)),
            None,
        );
        tokio::spawn(coordinator.run());
        Harness {
            cmd_tx,
            ui_rx,
            capture,
            playback,
        }
    }

    /// Collect UI events until the predicate matches or a timeout hits
    async fn wait_for(h: &mut Harness, wanted: &UiEvent) -> Vec<UiEvent> {
        let mut seen = Vec::new();
        let deadline = tokio::time::Duration::from_secs(2);
        loop {
            let event = tokio::time::timeout(deadline, h.ui_rx.recv())
                .await
                .expect("timed out waiting for UI event")
                .expect("UI channel closed");
            let done = event == *wanted;
            seen.push(event);
            if done {
                return seen;
            }
        }
    }

    #[tokio::test]
    async fn full_turn_walks_thinking_talking_waiting() {
        let mut h = start("hello there");

        h.cmd_tx.send(Command::SubmitText("hi".to_string())).unwrap();
        let events = wait_for(&mut h, &UiEvent::State(ConversationState::Talking)).await;

        // Ordered: the user turn renders before thinking starts
        let user_pos = events
            .iter()
            .position(|e| *e == UiEvent::UserTurn("hi".to_string()))
            .expect("user turn");
        let thinking_pos = events
            .iter()
            .position(|e| *e == UiEvent::State(ConversationState::Thinking))
            .expect("thinking");
        let reply_pos = events
            .iter()
            .position(|e| *e == UiEvent::AssistantTurn("hello there".to_string()))
            .expect("assistant turn");
        assert!(user_pos < thinking_pos);
        assert!(thinking_pos < reply_pos);

        assert_eq!(h.playback.spoken.lock().unwrap().as_slice(), ["hello there"]);

        h.cmd_tx.send(Command::PlaybackFinished).unwrap();
        wait_for(&mut h, &UiEvent::State(ConversationState::Waiting)).await;
    }

    #[tokio::test]
    async fn voice_input_is_gated_on_listening_flag() {
        let mut h = start("should not appear");

        // Listening starts enabled; turn it off
        h.cmd_tx.send(Command::ToggleListening).unwrap();
        wait_for(&mut h, &UiEvent::Listening(false)).await;

        h.cmd_tx
            .send(Command::VoiceTranscript("voice input".to_string()))
            .unwrap();
        let events = wait_for(&mut h, &UiEvent::Status("Listening is off".to_string())).await;
        assert!(!events.iter().any(|e| matches!(e, UiEvent::UserTurn(_))));

        // Typed input is always accepted
        h.cmd_tx.send(Command::SubmitText("typed".to_string())).unwrap();
        wait_for(&mut h, &UiEvent::UserTurn("typed".to_string())).await;
    }

    #[tokio::test]
    async fn submissions_mid_turn_are_rejected() {
        let mut h = start("slow reply");

        h.cmd_tx.send(Command::SubmitText("first".to_string())).unwrap();
        wait_for(&mut h, &UiEvent::State(ConversationState::Talking)).await;

        // Still talking: a second submission must not start a new turn
        h.cmd_tx.send(Command::SubmitText("second".to_string())).unwrap();
        let events =
            wait_for(&mut h, &UiEvent::Status("Still on the last one, hold on".to_string())).await;
        assert!(!events.contains(&UiEvent::UserTurn("second".to_string())));
        assert_eq!(h.playback.spoken.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn generation_error_text_still_reaches_talking() {
        // The responder contract folds failures into the reply, so any text
        // must drive the state machine forward identically
        let mut h = start("Model timed out after 120 seconds.");

        h.cmd_tx.send(Command::SubmitText("hi".to_string())).unwrap();
        let events = wait_for(&mut h, &UiEvent::State(ConversationState::Talking)).await;
        assert!(events.contains(&UiEvent::AssistantTurn(
            "Model timed out after 120 seconds.".to_string()
        )));

        h.cmd_tx.send(Command::PlaybackFinished).unwrap();
        wait_for(&mut h, &UiEvent::State(ConversationState::Waiting)).await;
    }

    #[tokio::test]
    async fn reset_chat_short_circuits_generation() {
        let mut h = start("a real model reply");

        h.cmd_tx.send(Command::SubmitText("reset chat".to_string())).unwrap();
        let events = wait_for(&mut h, &UiEvent::State(ConversationState::Talking)).await;

        // The canned ack is spoken, not the responder's reply
        assert!(events.contains(&UiEvent::AssistantTurn(response::RESET_ACK.to_string())));
        assert_eq!(
            h.playback.spoken.lock().unwrap().as_slice(),
            [response::RESET_ACK]
        );
    }

    #[tokio::test]
    async fn voice_mode_rearms_capture_after_guard_delay() {
        let mut h = start("reply");

        h.cmd_tx.send(Command::ToggleVoiceMode).unwrap();
        wait_for(&mut h, &UiEvent::VoiceMode(true)).await;
        // The resume lands in the same handle() call as the event we just saw
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.capture.resumed.load(Ordering::SeqCst) >= 1);

        h.cmd_tx.send(Command::SubmitText("hi".to_string())).unwrap();
        wait_for(&mut h, &UiEvent::State(ConversationState::Talking)).await;
        // Capture was paused for the turn
        assert!(h.capture.paused.load(Ordering::SeqCst) >= 1);

        let resumes_before = h.capture.resumed.load(Ordering::SeqCst);
        h.cmd_tx.send(Command::PlaybackFinished).unwrap();
        wait_for(&mut h, &UiEvent::State(ConversationState::Waiting)).await;

        // The re-arm arrives after the guard delay
        tokio::time::sleep(REARM_GUARD + Duration::from_millis(200)).await;
        assert!(h.capture.resumed.load(Ordering::SeqCst) > resumes_before);
    }

    #[tokio::test]
    async fn toggling_voice_mode_mid_turn_does_not_disturb_the_turn() {
        let mut h = start("reply");

        h.cmd_tx.send(Command::SubmitText("hi".to_string())).unwrap();
        wait_for(&mut h, &UiEvent::State(ConversationState::Talking)).await;

        h.cmd_tx.send(Command::ToggleVoiceMode).unwrap();
        let events = wait_for(&mut h, &UiEvent::VoiceMode(true)).await;

        // No state change leaked from the toggle
        assert!(!events.contains(&UiEvent::State(ConversationState::Waiting)));
        // And capture must not resume while we are talking
        assert_eq!(h.capture.resumed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn quit_is_idempotent() {
        let mut h = start("reply");

        h.cmd_tx.send(Command::Quit).unwrap();
        let events = wait_for(&mut h, &UiEvent::Quit).await;
        assert_eq!(events.iter().filter(|e| **e == UiEvent::Quit).count(), 1);

        // A second quit (UI callback plus signal handler, say) is harmless
        let _ = h.cmd_tx.send(Command::Quit);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(h.playback.stopped.load(Ordering::SeqCst), 1);
        assert_eq!(h.playback.shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(h.capture.stopped.load(Ordering::SeqCst), 1);
        assert!(h.ui_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_and_whitespace_submissions_are_ignored() {
        let mut h = start("reply");

        h.cmd_tx.send(Command::SubmitText("   ".to_string())).unwrap();
        h.cmd_tx.send(Command::SubmitText(String::new())).unwrap();
        h.cmd_tx.send(Command::SubmitText("real".to_string())).unwrap();

        let events = wait_for(&mut h, &UiEvent::UserTurn("real".to_string())).await;
        let turns = events.iter().filter(|e| matches!(e, UiEvent::UserTurn(_))).count();
        assert_eq!(turns, 1);
    }
}
