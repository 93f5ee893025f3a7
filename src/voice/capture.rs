//! Speech capture controller
//!
//! Runs one recognition session at a time and turns the recognizer's event
//! stream into a single transcript. Four terminators race for the session
//! (silence timeout, hard cap, native end, native error); the first one wins
//! and the session resolves exactly once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, sleep_until};

use crate::error::CaptureError;

/// Native error code reported when the recognizer heard nothing
pub const NO_SPEECH_CODE: &str = "no-speech";

/// Silence after the last recognition event that ends a session
pub const DEFAULT_SILENCE_WINDOW: Duration = Duration::from_millis(2000);

/// Absolute session length, measured from `start()`
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(30);

/// One entry of the recognizer's cumulative result list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionResult {
    /// Best alternative for this result
    pub transcript: String,
    /// Whether the recognizer committed to this text
    pub is_final: bool,
}

impl RecognitionResult {
    /// A committed result
    #[must_use]
    pub fn committed(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: true,
        }
    }

    /// An unconfirmed guess
    #[must_use]
    pub fn interim(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: false,
        }
    }
}

/// Events emitted by a running recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// Incremental result; entries before `result_index` were already reported
    Result {
        result_index: usize,
        results: Vec<RecognitionResult>,
    },
    /// The recognizer failed and will not emit further results
    Error { code: String },
    /// The recognizer stopped
    End,
}

/// Options passed to the recognizer when a session opens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionOptions {
    /// BCP-47 language tag (e.g. "pt-BR")
    pub language: String,
    /// Keep recognizing across pauses
    pub continuous: bool,
    /// Report unconfirmed guesses
    pub interim_results: bool,
}

/// Speech recognition capability
///
/// `start` opens a stream whose events arrive on the returned channel.
/// `stop` asks the stream to wind down; the recognizer then reports `End`
/// (or closes the channel).
pub trait Recognizer: Send + Sync {
    /// Open a recognition stream
    ///
    /// # Errors
    ///
    /// Returns the capture failure when the stream cannot be opened
    fn start(
        &self,
        options: &RecognitionOptions,
    ) -> Result<mpsc::UnboundedReceiver<RecognitionEvent>, CaptureError>;

    /// Request the running stream to stop
    fn stop(&self);
}

/// Capture controller settings
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Recognition language tag
    pub language: String,
    /// Silence that ends the session
    pub silence_window: Duration,
    /// Hard cap on the session length
    pub max_duration: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            language: "pt-BR".to_string(),
            silence_window: DEFAULT_SILENCE_WINDOW,
            max_duration: DEFAULT_MAX_DURATION,
        }
    }
}

/// What ended a capture session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// No recognition event within the silence window
    SilenceTimeout,
    /// The hard cap elapsed
    HardCap,
    /// The recognizer ended (or its channel closed)
    Ended,
    /// The recognizer reported an error
    Errored(String),
}

impl Termination {
    /// Timer terminators leave the native stream running
    const fn stops_recognizer(&self) -> bool {
        matches!(self, Self::SilenceTimeout | Self::HardCap)
    }
}

/// Transcript state of one capture session
#[derive(Debug, Clone)]
pub struct RecognitionSession {
    final_transcript: String,
    interim_transcript: String,
    last_speech_time: Instant,
}

impl RecognitionSession {
    /// Begin a session at `now`
    #[must_use]
    pub const fn new(now: Instant) -> Self {
        Self {
            final_transcript: String::new(),
            interim_transcript: String::new(),
            last_speech_time: now,
        }
    }

    /// Apply one incremental result event received at `now`
    ///
    /// Final results from `result_index` on are appended to the committed
    /// transcript; the non-final ones replace the interim guess.
    pub fn apply(&mut self, result_index: usize, results: &[RecognitionResult], now: Instant) {
        self.last_speech_time = now;
        self.interim_transcript.clear();

        for result in results.iter().skip(result_index) {
            if result.is_final {
                self.final_transcript.push_str(&result.transcript);
            } else {
                self.interim_transcript.push_str(&result.transcript);
            }
        }
    }

    /// Committed transcript so far
    #[must_use]
    pub fn final_transcript(&self) -> &str {
        &self.final_transcript
    }

    /// Latest unconfirmed guess
    #[must_use]
    pub fn interim_transcript(&self) -> &str {
        &self.interim_transcript
    }

    /// Time of the last recognition event
    #[must_use]
    pub const fn last_speech_time(&self) -> Instant {
        self.last_speech_time
    }

    /// When the silence timer fires for the given window
    #[must_use]
    pub fn silence_deadline(&self, window: Duration) -> Instant {
        self.last_speech_time + window
    }

    /// Resolve the session outcome for the terminator that won
    ///
    /// The hard cap resolves even with an empty transcript; every other
    /// terminator needs committed text to succeed.
    ///
    /// # Errors
    ///
    /// `NoSpeechDetected` when nothing was committed (or the recognizer
    /// reported "no-speech"), `Recognition` for other native errors
    pub fn settle(self, termination: Termination) -> Result<String, CaptureError> {
        match termination {
            Termination::HardCap => Ok(self.final_transcript),
            _ if !self.final_transcript.is_empty() => Ok(self.final_transcript),
            Termination::Errored(code) if code != NO_SPEECH_CODE => {
                Err(CaptureError::Recognition { code })
            }
            _ => Err(CaptureError::NoSpeechDetected),
        }
    }
}

/// Produces one finalized transcript per `start()` call
pub struct SpeechCapture {
    recognizer: Option<Arc<dyn Recognizer>>,
    config: CaptureConfig,
    listening: AtomicBool,
}

impl SpeechCapture {
    /// Create a controller over a recognizer
    #[must_use]
    pub fn new(recognizer: Arc<dyn Recognizer>, config: CaptureConfig) -> Self {
        Self {
            recognizer: Some(recognizer),
            config,
            listening: AtomicBool::new(false),
        }
    }

    /// Create a controller for an environment without speech recognition
    ///
    /// Every `start()` fails with `UnsupportedCapability`.
    #[must_use]
    pub const fn unsupported(config: CaptureConfig) -> Self {
        Self {
            recognizer: None,
            config,
            listening: AtomicBool::new(false),
        }
    }

    /// Whether a recognizer is available
    #[must_use]
    pub const fn is_supported(&self) -> bool {
        self.recognizer.is_some()
    }

    /// Whether a session is running
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }

    /// Controller settings
    #[must_use]
    pub const fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Listen until the speaker falls silent and return the transcript
    ///
    /// # Errors
    ///
    /// `UnsupportedCapability` without a recognizer, `AlreadyActive` while
    /// another session runs, otherwise the session's terminal failure
    pub async fn start(&self) -> Result<String, CaptureError> {
        let recognizer = self
            .recognizer
            .as_deref()
            .ok_or(CaptureError::UnsupportedCapability)?;

        if self
            .listening
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CaptureError::AlreadyActive);
        }

        let mut guard = SessionGuard {
            listening: &self.listening,
            recognizer,
            stop_on_drop: false,
        };

        let options = RecognitionOptions {
            language: self.config.language.clone(),
            continuous: true,
            interim_results: true,
        };
        let mut events = recognizer.start(&options)?;
        guard.stop_on_drop = true;

        tracing::debug!(language = %options.language, "capture session started");

        let started = Instant::now();
        let hard_cap = sleep(self.config.max_duration);
        tokio::pin!(hard_cap);

        let mut session = RecognitionSession::new(started);
        let termination = loop {
            let silence = sleep_until(session.silence_deadline(self.config.silence_window));

            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Some(RecognitionEvent::Result { result_index, results }) => {
                        session.apply(result_index, &results, Instant::now());
                        tracing::trace!(
                            committed = %session.final_transcript(),
                            interim = %session.interim_transcript(),
                            "recognition result"
                        );
                    }
                    Some(RecognitionEvent::Error { code }) => break Termination::Errored(code),
                    Some(RecognitionEvent::End) | None => break Termination::Ended,
                },
                () = silence => break Termination::SilenceTimeout,
                () = &mut hard_cap => break Termination::HardCap,
            }
        };

        guard.stop_on_drop = termination.stops_recognizer();
        drop(guard);

        tracing::debug!(
            ?termination,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "capture session ended"
        );

        let outcome = session.settle(termination);
        match &outcome {
            Ok(transcript) => tracing::info!(transcript = %transcript, "transcript captured"),
            Err(e) => tracing::warn!(error = %e, "capture failed"),
        }
        outcome
    }

    /// Ask the running session to stop
    ///
    /// The recognizer's end event then resolves `start()`. No-op when idle.
    pub fn stop(&self) {
        if !self.is_listening() {
            return;
        }
        if let Some(recognizer) = &self.recognizer {
            tracing::debug!("stopping capture session");
            recognizer.stop();
        }
    }
}

/// Clears the listening flag however `start()` exits
struct SessionGuard<'a> {
    listening: &'a AtomicBool,
    recognizer: &'a dyn Recognizer,
    stop_on_drop: bool,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if self.stop_on_drop {
            self.recognizer.stop();
        }
        self.listening.store(false, Ordering::Release);
    }
}
