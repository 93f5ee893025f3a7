//! Voice processing module
//!
//! Speech capture and sequential speech playback, plus the native
//! microphone, Whisper, TTS and speaker backends behind their traits.

pub mod capture;
mod microphone;
pub mod playback;
mod recognizer;
mod segment;
mod speaker;
mod stt;
mod tts;
mod vad;

pub use capture::{
    CaptureConfig, RecognitionEvent, RecognitionOptions, RecognitionResult, RecognitionSession,
    Recognizer, SpeechCapture, Termination,
};
pub use microphone::{Microphone, SAMPLE_RATE, utterance_to_wav};
pub use playback::{AudioClip, AudioOutput, Playing, SpeakOutcome, SpeechPlayback, Synthesizer};
pub use recognizer::MicRecognizer;
pub use segment::split_sentences;
pub use speaker::SpeakerOutput;
pub use stt::SpeechToText;
pub use tts::TextToSpeech;
pub use vad::SpeechDetector;
