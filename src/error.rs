//! Error types for the Nuvem voice core

use thiserror::Error;

/// Result type alias for Nuvem operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice core
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device or decoding error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Tutor chat service error
    #[error("tutor error: {0}")]
    Tutor(String),

    /// Sequential playback error
    #[error("playback error: {0}")]
    Playback(String),

    /// Speech capture failure
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Terminal failures of a single speech capture session
///
/// Every variant ends the session; callers start a new one to retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// No speech recognition backend is available in this environment
    #[error("speech recognition is not supported")]
    UnsupportedCapability,

    /// A capture session is already running on this controller
    #[error("already listening")]
    AlreadyActive,

    /// The session ended without any committed transcript
    #[error("no speech detected, please try again")]
    NoSpeechDetected,

    /// The recognizer reported an error
    #[error("speech recognition error: {code}")]
    Recognition {
        /// Native error code (e.g. "network", "audio-capture")
        code: String,
    },
}
