//! Voice session
//!
//! Owns one capture controller, one playback engine and the tutor, and runs
//! conversation turns through them. `stop()` ends the running turn: listening
//! stops, and the reply is returned without being spoken (or is cut short).

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::tutor::{ChatService, TutorReply};
use crate::voice::{SpeakOutcome, SpeechCapture, SpeechPlayback};
use crate::{Error, Result};

/// One completed question/answer exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    /// What the learner said or typed
    pub transcript: String,
    /// The tutor's reply
    pub reply: TutorReply,
    /// How playback of the reply went
    pub playback: SpeakOutcome,
}

/// Drives the voice interface
pub struct VoiceSession {
    capture: SpeechCapture,
    playback: SpeechPlayback,
    tutor: Arc<dyn ChatService>,
    turn: Mutex<Option<CancellationToken>>,
}

impl VoiceSession {
    /// Create a session
    #[must_use]
    pub fn new(
        capture: SpeechCapture,
        playback: SpeechPlayback,
        tutor: Arc<dyn ChatService>,
    ) -> Self {
        Self {
            capture,
            playback,
            tutor,
            turn: Mutex::new(None),
        }
    }

    /// Capture controller
    #[must_use]
    pub const fn capture(&self) -> &SpeechCapture {
        &self.capture
    }

    /// Playback engine
    #[must_use]
    pub const fn playback(&self) -> &SpeechPlayback {
        &self.playback
    }

    /// Listen for a question, ask the tutor and speak the reply
    ///
    /// # Errors
    ///
    /// Returns the capture, tutor or playback failure that ended the turn
    pub async fn listen_and_respond(&self) -> Result<Turn> {
        let stop = self.begin_turn();
        let transcript = self.capture.start().await?;
        self.respond(transcript, stop).await
    }

    /// Ask a typed question and speak the reply
    ///
    /// # Errors
    ///
    /// Returns error for blank input or when the tutor or playback fails
    pub async fn ask(&self, question: &str) -> Result<Turn> {
        let question = checked_question(question)?;
        let stop = self.begin_turn();
        self.respond(question, stop).await
    }

    /// Stop the running turn
    ///
    /// Ends listening, and keeps the reply of a pending tutor request from
    /// being spoken. A reply already being spoken is halted.
    pub fn stop(&self) {
        self.capture.stop();
        if let Ok(slot) = self.turn.lock() {
            if let Some(stop) = slot.as_ref() {
                stop.cancel();
            }
        }
        self.playback.cancel();
    }

    /// Publish a fresh stop token for the turn that is starting
    fn begin_turn(&self) -> CancellationToken {
        let stop = CancellationToken::new();
        if let Ok(mut slot) = self.turn.lock() {
            *slot = Some(stop.clone());
        }
        stop
    }

    async fn respond(&self, transcript: String, stop: CancellationToken) -> Result<Turn> {
        tracing::info!(transcript = %transcript, "asking tutor");
        let reply = self.tutor.respond(&transcript).await?;

        let playback = if stop.is_cancelled() {
            tracing::info!("turn stopped before the reply, not speaking it");
            SpeakOutcome::Cancelled { played: 0 }
        } else {
            tracing::info!(kind = ?reply.kind(), "speaking reply");
            self.playback.speak_until(reply.spoken_text(), stop).await?
        };

        Ok(Turn {
            transcript,
            reply,
            playback,
        })
    }
}

fn checked_question(question: &str) -> Result<String> {
    let question = question.trim();
    if question.is_empty() {
        return Err(Error::Tutor("question is empty".to_string()));
    }
    Ok(question.to_string())
}
