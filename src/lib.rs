//! Vynx - desktop voice and text companion chatbot
//!
//! This library provides the core functionality for Vynx:
//! - Turn coordination (the listening / thinking / talking state machine)
//! - Response generation via a local model process
//! - Voice capture and spoken playback adapters
//! - Terminal presentation shell
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                Presentation Shell                    │
//! │        transcript │ input │ state indicator          │
//! └────────────────────┬────────────────────────────────┘
//!                      │ commands / events
//! ┌────────────────────▼────────────────────────────────┐
//! │                Turn Coordinator                      │
//! │      Waiting ──► Thinking ──► Talking ──► Waiting    │
//! └───────┬───────────────┬────────────────┬────────────┘
//!         │               │                │
//! ┌───────▼──────┐ ┌──────▼───────┐ ┌──────▼───────┐
//! │ Capture      │ │ Response     │ │ Playback     │
//! │ mic/STT      │ │ model proc   │ │ TTS/speaker  │
//! └──────────────┘ └──────────────┘ └──────────────┘
//! ```

pub mod coordinator;
pub mod error;
pub mod history;
pub mod memory;
pub mod persona;
pub mod response;
pub mod settings;
pub mod ui;
pub mod voice;

pub use coordinator::{
    CaptureControl, Command, ConversationState, Coordinator, PlaybackControl, UiEvent,
};
pub use error::{Error, Result};
pub use history::{History, Speaker, Turn};
pub use memory::MemoryStore;
pub use response::{Responder, ResponseGenerator};
pub use settings::Settings;
