//! Nuvem voice - voice interaction core for the Nuvem Treinamentos AI tutor
//!
//! This library provides:
//! - Speech capture with silence detection and a hard session cap
//! - Sequential sentence-by-sentence speech playback with pre-fetch
//! - The tutor chat service boundary (code, image and text replies)
//! - A voice session that runs question/answer turns
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                     VoiceSession                     │
//! │   SpeechCapture  →  ChatService  →  SpeechPlayback   │
//! └────────┬──────────────────┬──────────────────┬───────┘
//!          │                  │                  │
//! ┌────────▼───────┐ ┌────────▼───────┐ ┌────────▼───────┐
//! │   Recognizer   │ │   OpenAiTutor  │ │ Synthesizer +  │
//! │ (mic + Whisper)│ │ (chat + image) │ │  AudioOutput   │
//! └────────────────┘ └────────────────┘ └────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod session;
pub mod tutor;
pub mod voice;

pub use config::Config;
pub use error::{CaptureError, Error, Result};
pub use session::{Turn, VoiceSession};
pub use tutor::{ChatService, OpenAiTutor, ReplyKind, TutorReply};
