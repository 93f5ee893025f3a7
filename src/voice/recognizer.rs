//! Microphone-backed speech recognizer
//!
//! A capture thread feeds microphone audio through the speech detector;
//! completed segments are transcribed with Whisper on the tokio runtime and
//! reported as committed results. Ongoing speech and in-flight
//! transcriptions are reported as interim results so the capture
//! controller's silence timer keeps running only while the speaker is quiet.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use super::capture::{RecognitionEvent, RecognitionOptions, RecognitionResult, Recognizer};
use super::microphone::{Microphone, utterance_to_wav};
use super::stt::SpeechToText;
use super::vad::SpeechDetector;
use crate::error::CaptureError;

/// Error code for microphone failures
pub const AUDIO_CAPTURE_ERROR: &str = "audio-capture";

/// Error code for transcription failures
pub const NETWORK_ERROR: &str = "network";

/// Error code when the recognizer cannot run at all
pub const ABORTED_ERROR: &str = "aborted";

/// How often the capture thread drains the microphone buffer
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Interim heartbeat while a segment is being transcribed
const TRANSCRIBE_HEARTBEAT: Duration = Duration::from_millis(500);

/// Messages from the capture thread
enum MicSignal {
    /// Speech detector is accumulating a segment
    Activity,
    /// A finished speech segment
    Segment(Vec<f32>),
    /// The microphone could not be used
    Failed(&'static str),
}

/// Recognizer over the default input device and Whisper
pub struct MicRecognizer {
    stt: Arc<SpeechToText>,
    halt: Mutex<Option<Arc<AtomicBool>>>,
}

impl MicRecognizer {
    /// Create a recognizer
    ///
    /// # Errors
    ///
    /// `UnsupportedCapability` when the host has no input device
    pub fn new(stt: SpeechToText) -> Result<Self, CaptureError> {
        if !Microphone::is_available() {
            return Err(CaptureError::UnsupportedCapability);
        }

        Ok(Self {
            stt: Arc::new(stt),
            halt: Mutex::new(None),
        })
    }
}

impl Recognizer for MicRecognizer {
    fn start(
        &self,
        options: &RecognitionOptions,
    ) -> Result<mpsc::UnboundedReceiver<RecognitionEvent>, CaptureError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            CaptureError::Recognition {
                code: ABORTED_ERROR.to_string(),
            }
        })?;

        let halt = Arc::new(AtomicBool::new(false));
        if let Ok(mut slot) = self.halt.lock() {
            if let Some(previous) = slot.replace(Arc::clone(&halt)) {
                previous.store(true, Ordering::Release);
            }
        }

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let continuous = options.continuous;

        std::thread::Builder::new()
            .name("nuvem-mic".to_string())
            .spawn(move || capture_loop(&halt, &signal_tx, continuous))
            .map_err(|e| {
                tracing::error!(error = %e, "failed to spawn capture thread");
                CaptureError::Recognition {
                    code: AUDIO_CAPTURE_ERROR.to_string(),
                }
            })?;

        runtime.spawn(transcribe_loop(Arc::clone(&self.stt), signal_rx, events_tx));

        tracing::debug!(
            language = %options.language,
            continuous,
            interim_results = options.interim_results,
            "microphone recognizer started"
        );
        Ok(events_rx)
    }

    fn stop(&self) {
        if let Ok(slot) = self.halt.lock() {
            if let Some(halt) = slot.as_ref() {
                halt.store(true, Ordering::Release);
            }
        }
    }
}

/// Runs on the capture thread until halted or the transcriber goes away
fn capture_loop(halt: &AtomicBool, signals: &mpsc::UnboundedSender<MicSignal>, continuous: bool) {
    let mic = match Microphone::open() {
        Ok(mic) => mic,
        Err(e) => {
            tracing::error!(error = %e, "microphone unavailable");
            let _ = signals.send(MicSignal::Failed(AUDIO_CAPTURE_ERROR));
            return;
        }
    };

    let mut detector = SpeechDetector::new();

    while !halt.load(Ordering::Acquire) && !signals.is_closed() {
        std::thread::sleep(POLL_INTERVAL);

        let samples = mic.drain();
        if let Some(segment) = detector.push(&samples) {
            if signals.send(MicSignal::Segment(segment)).is_err() || !continuous {
                break;
            }
        } else if detector.is_active() && signals.send(MicSignal::Activity).is_err() {
            break;
        }
    }

    drop(mic);

    if let Some(segment) = detector.flush() {
        let _ = signals.send(MicSignal::Segment(segment));
    }
}

/// Turns capture signals into recognition events
async fn transcribe_loop(
    stt: Arc<SpeechToText>,
    mut signals: mpsc::UnboundedReceiver<MicSignal>,
    events: mpsc::UnboundedSender<RecognitionEvent>,
) {
    let mut results: Vec<RecognitionResult> = Vec::new();

    while let Some(signal) = signals.recv().await {
        match signal {
            MicSignal::Activity => {
                let _ = events.send(interim_event(&results));
            }
            MicSignal::Segment(samples) => {
                let transcript = match utterance_to_wav(&samples) {
                    Ok(wav) => transcribe_with_heartbeat(&stt, &wav, &events, &results).await,
                    Err(e) => Err(e),
                };

                match transcript {
                    Ok(text) => {
                        let text = text.trim();
                        if text.is_empty() {
                            continue;
                        }
                        let text = if results.is_empty() {
                            text.to_string()
                        } else {
                            format!(" {text}")
                        };
                        results.push(RecognitionResult::committed(text));
                        let _ = events.send(RecognitionEvent::Result {
                            result_index: results.len() - 1,
                            results: results.clone(),
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "segment transcription failed");
                        let _ = events.send(RecognitionEvent::Error {
                            code: NETWORK_ERROR.to_string(),
                        });
                        return;
                    }
                }
            }
            MicSignal::Failed(code) => {
                let _ = events.send(RecognitionEvent::Error {
                    code: code.to_string(),
                });
                return;
            }
        }
    }

    let _ = events.send(RecognitionEvent::End);
}

async fn transcribe_with_heartbeat(
    stt: &SpeechToText,
    wav: &[u8],
    events: &mpsc::UnboundedSender<RecognitionEvent>,
    results: &[RecognitionResult],
) -> crate::Result<String> {
    let transcription = stt.transcribe(wav);
    tokio::pin!(transcription);

    let mut heartbeat = tokio::time::interval(TRANSCRIBE_HEARTBEAT);
    loop {
        tokio::select! {
            result = &mut transcription => return result,
            _ = heartbeat.tick() => {
                let _ = events.send(interim_event(results));
            }
        }
    }
}

/// Cumulative results plus an empty interim guess
fn interim_event(results: &[RecognitionResult]) -> RecognitionEvent {
    let mut all = results.to_vec();
    all.push(RecognitionResult::interim(String::new()));
    RecognitionEvent::Result {
        result_index: results.len(),
        results: all,
    }
}
