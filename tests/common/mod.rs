//! Shared test utilities
//!
//! In-process stand-ins for the recognizer, synthesizer, audio output and
//! tutor, so the voice pipeline runs without hardware or network.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use nuvem_voice::voice::{
    AudioClip, AudioOutput, Playing, RecognitionEvent, RecognitionOptions, RecognitionResult,
    Recognizer, Synthesizer,
};
use nuvem_voice::{CaptureError, ChatService, Error, Result, TutorReply};

/// Recognizer driven by the test through `emit`
#[derive(Default)]
pub struct MockRecognizer {
    sender: Mutex<Option<mpsc::UnboundedSender<RecognitionEvent>>>,
    options: Mutex<Option<RecognitionOptions>>,
    stops: AtomicUsize,
    end_on_stop: bool,
    fail_start: Option<CaptureError>,
}

impl MockRecognizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Recognizer that reports `End` when asked to stop
    pub fn ending_on_stop() -> Arc<Self> {
        Arc::new(Self {
            end_on_stop: true,
            ..Self::default()
        })
    }

    /// Recognizer whose stream cannot be opened
    pub fn failing(error: CaptureError) -> Arc<Self> {
        Arc::new(Self {
            fail_start: Some(error),
            ..Self::default()
        })
    }

    /// Deliver an event; false once the session stopped listening
    pub fn emit(&self, event: RecognitionEvent) -> bool {
        self.sender
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|sender| sender.send(event).is_ok())
    }

    pub fn commit(&self, text: &str) -> bool {
        self.emit(RecognitionEvent::Result {
            result_index: 0,
            results: vec![RecognitionResult::committed(text)],
        })
    }

    pub fn guess(&self, text: &str) -> bool {
        self.emit(RecognitionEvent::Result {
            result_index: 0,
            results: vec![RecognitionResult::interim(text)],
        })
    }

    pub fn end(&self) -> bool {
        self.emit(RecognitionEvent::End)
    }

    pub fn fail(&self, code: &str) -> bool {
        self.emit(RecognitionEvent::Error {
            code: code.to_string(),
        })
    }

    /// Drop the event channel without an `End`
    pub fn close(&self) {
        self.sender.lock().unwrap().take();
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn last_options(&self) -> Option<RecognitionOptions> {
        self.options.lock().unwrap().clone()
    }
}

impl Recognizer for MockRecognizer {
    fn start(
        &self,
        options: &RecognitionOptions,
    ) -> std::result::Result<mpsc::UnboundedReceiver<RecognitionEvent>, CaptureError> {
        if let Some(error) = &self.fail_start {
            return Err(error.clone());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.sender.lock().unwrap() = Some(tx);
        *self.options.lock().unwrap() = Some(options.clone());
        Ok(rx)
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if self.end_on_stop {
            self.end();
        }
    }
}

/// Synthesizer that encodes the sentence text as the audio payload
#[derive(Default)]
pub struct MockSynth {
    calls: Mutex<Vec<String>>,
    fail_on: Option<String>,
    delay: Duration,
}

impl MockSynth {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    /// Synthesizer that fails for one sentence
    pub fn failing_on(sentence: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            fail_on: Some(sentence.to_string()),
            delay,
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for MockSynth {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        self.calls.lock().unwrap().push(text.to_string());
        tokio::time::sleep(self.delay).await;

        if self.fail_on.as_deref() == Some(text) {
            return Err(Error::Tts(format!("synthesis failed for {text}")));
        }
        Ok(text.as_bytes().to_vec())
    }
}

/// How one scripted clip misbehaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipFault {
    /// Decoding fails
    Load,
    /// Playback cannot start
    Play,
    /// Playback fails halfway through
    Ended,
    /// The output goes away halfway through without an ended event
    Lost,
    /// The clip ends halfway through its reported duration
    Early,
}

/// Output whose clips play for a fixed time and log their lifecycle
pub struct MockOutput {
    log: Arc<Mutex<Vec<String>>>,
    length: Duration,
    report_duration: bool,
    fault: Option<(String, ClipFault)>,
}

impl MockOutput {
    /// Clips that report their duration when they start
    pub fn new(length: Duration) -> Arc<Self> {
        Arc::new(Self {
            log: Arc::default(),
            length,
            report_duration: true,
            fault: None,
        })
    }

    /// Clips whose duration is unknown
    pub fn without_duration(length: Duration) -> Arc<Self> {
        Arc::new(Self {
            log: Arc::default(),
            length,
            report_duration: false,
            fault: None,
        })
    }

    /// Clips that behave except the one for `sentence`
    pub fn faulty(length: Duration, sentence: &str, fault: ClipFault) -> Arc<Self> {
        Arc::new(Self {
            log: Arc::default(),
            length,
            report_duration: true,
            fault: Some((sentence.to_string(), fault)),
        })
    }

    /// Entries of the form `load:X`, `start:X`, `end:X`
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioOutput for MockOutput {
    async fn load(&self, audio: Vec<u8>) -> Result<Box<dyn AudioClip>> {
        let label = String::from_utf8(audio).map_err(|e| Error::Audio(e.to_string()))?;
        let fault = self
            .fault
            .as_ref()
            .filter(|(sentence, _)| *sentence == label)
            .map(|(_, fault)| *fault);

        if fault == Some(ClipFault::Load) {
            return Err(Error::Audio(format!("cannot decode {label}")));
        }
        self.log.lock().unwrap().push(format!("load:{label}"));

        Ok(Box::new(MockClip {
            label,
            log: Arc::clone(&self.log),
            length: self.length,
            report_duration: self.report_duration,
            fault,
        }))
    }
}

struct MockClip {
    label: String,
    log: Arc<Mutex<Vec<String>>>,
    length: Duration,
    report_duration: bool,
    fault: Option<ClipFault>,
}

#[async_trait]
impl AudioClip for MockClip {
    async fn play(self: Box<Self>) -> Result<Playing> {
        if self.fault == Some(ClipFault::Play) {
            return Err(Error::Playback(format!("cannot play {}", self.label)));
        }
        self.log.lock().unwrap().push(format!("start:{}", self.label));

        let (ended_tx, ended_rx) = oneshot::channel();
        let halt = Arc::new(AtomicBool::new(false));
        let halted = Arc::clone(&halt);
        let duration = self.report_duration.then_some(self.length);
        let Self {
            label,
            log,
            length,
            fault,
            ..
        } = *self;

        tokio::spawn(async move {
            let played_for = if fault.is_some() { length / 2 } else { length };
            tokio::time::sleep(played_for).await;
            if halted.load(Ordering::SeqCst) {
                return;
            }
            match fault {
                Some(ClipFault::Ended) => {
                    log.lock().unwrap().push(format!("fail:{label}"));
                    let _ = ended_tx.send(Err(Error::Playback(format!("{label} broke off"))));
                }
                Some(ClipFault::Lost) => drop(ended_tx),
                _ => {
                    log.lock().unwrap().push(format!("end:{label}"));
                    let _ = ended_tx.send(Ok(()));
                }
            }
        });

        Ok(Playing::new(duration, ended_rx, halt))
    }
}

/// Tutor that answers every question with the same reply
pub struct MockTutor {
    reply: Option<TutorReply>,
    questions: Mutex<Vec<String>>,
    delay: Duration,
}

impl MockTutor {
    pub fn replying(reply: TutorReply) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply),
            questions: Mutex::default(),
            delay: Duration::ZERO,
        })
    }

    /// Tutor that takes `delay` to answer with a text reply
    pub fn slow(content: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(TutorReply::Text {
                content: content.to_string(),
            }),
            questions: Mutex::default(),
            delay,
        })
    }

    pub fn text(content: &str) -> Arc<Self> {
        Self::replying(TutorReply::Text {
            content: content.to_string(),
        })
    }

    /// Tutor whose service is down
    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            questions: Mutex::default(),
            delay: Duration::ZERO,
        })
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatService for MockTutor {
    async fn respond(&self, input: &str) -> Result<TutorReply> {
        self.questions.lock().unwrap().push(input.to_string());
        tokio::time::sleep(self.delay).await;
        self.reply
            .clone()
            .ok_or_else(|| Error::Tutor("service unavailable".to_string()))
    }
}
