//! Sequential speech playback
//!
//! Speaks a response sentence by sentence. While one sentence plays, the next
//! one is synthesized in the background and cued shortly before the current
//! one ends, so consecutive sentences play back-to-back.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::segment::split_sentences;
use crate::{Error, Result};

/// How long before the current sentence ends the next one is cued
pub const DEFAULT_OVERLAP: Duration = Duration::from_millis(500);

/// Remote text-to-speech call
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize one sentence into encoded audio
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// Audio device that turns encoded audio into playable clips
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Decode audio so it can start playing immediately
    ///
    /// # Errors
    ///
    /// Returns error if the audio cannot be decoded
    async fn load(&self, audio: Vec<u8>) -> Result<Box<dyn AudioClip>>;
}

/// A decoded clip, ready to play once
#[async_trait]
pub trait AudioClip: Send {
    /// Start playback; resolves once the clip has started
    ///
    /// # Errors
    ///
    /// Returns error if playback cannot start
    async fn play(self: Box<Self>) -> Result<Playing>;
}

/// Handle to a clip that is currently playing
///
/// Dropping the handle halts the clip.
pub struct Playing {
    duration: Option<Duration>,
    ended: Option<oneshot::Receiver<Result<()>>>,
    halt: Arc<AtomicBool>,
}

impl Playing {
    /// Wrap a started clip
    ///
    /// `ended` fires when playback finishes; `halt` is raised when the
    /// handle is dropped.
    #[must_use]
    pub const fn new(
        duration: Option<Duration>,
        ended: oneshot::Receiver<Result<()>>,
        halt: Arc<AtomicBool>,
    ) -> Self {
        Self {
            duration,
            ended: Some(ended),
            halt,
        }
    }

    /// Clip length, if the output knows it
    #[must_use]
    pub const fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Wait for the clip's ended event
    ///
    /// The outcome is reported once; later calls return `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns the playback failure, or an error if the output went away
    /// without reporting the end
    pub async fn finished(&mut self) -> Result<()> {
        let Some(ended) = self.ended.as_mut() else {
            return Ok(());
        };

        let outcome = ended.await.unwrap_or_else(|_| {
            Err(Error::Playback(
                "clip stopped without an ended event".to_string(),
            ))
        });
        self.ended = None;
        outcome
    }
}

impl Drop for Playing {
    fn drop(&mut self) {
        self.halt.store(true, Ordering::Release);
    }
}

/// Result of a `speak` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// Every sentence played
    Completed { sentences: usize },
    /// Another sequence was draining; nothing was played
    Dropped,
    /// `cancel()` halted the sequence after `played` sentences
    Cancelled { played: usize },
}

/// Plays text responses one sentence at a time
pub struct SpeechPlayback {
    synthesizer: Arc<dyn Synthesizer>,
    output: Arc<dyn AudioOutput>,
    overlap: Duration,
    draining: AtomicBool,
    cancel: Mutex<Option<CancellationToken>>,
}

impl SpeechPlayback {
    /// Create a playback engine
    #[must_use]
    pub fn new(synthesizer: Arc<dyn Synthesizer>, output: Arc<dyn AudioOutput>) -> Self {
        Self {
            synthesizer,
            output,
            overlap: DEFAULT_OVERLAP,
            draining: AtomicBool::new(false),
            cancel: Mutex::new(None),
        }
    }

    /// Set how early the next sentence is cued
    #[must_use]
    pub const fn with_overlap(mut self, overlap: Duration) -> Self {
        self.overlap = overlap;
        self
    }

    /// Whether a sequence is draining
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Speak `text` sentence by sentence
    ///
    /// A call made while another sequence drains is dropped. Text without
    /// sentences completes immediately.
    ///
    /// # Errors
    ///
    /// Returns the first synthesis, decoding or playback failure; the
    /// remaining sentences are not played
    pub async fn speak(&self, text: &str) -> Result<SpeakOutcome> {
        self.speak_until(text, CancellationToken::new()).await
    }

    /// Speak `text`, halting when `stop` is cancelled
    ///
    /// `cancel()` trips the same token. A token that is already cancelled
    /// plays nothing.
    ///
    /// # Errors
    ///
    /// Same as [`speak`](Self::speak)
    pub async fn speak_until(&self, text: &str, stop: CancellationToken) -> Result<SpeakOutcome> {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("already speaking, dropping text");
            return Ok(SpeakOutcome::Dropped);
        }

        let _guard = DrainGuard::new(self, stop.clone());

        let sentences = split_sentences(text);
        if sentences.is_empty() {
            return Ok(SpeakOutcome::Completed { sentences: 0 });
        }

        tracing::debug!(sentences = sentences.len(), "speaking");

        let played = AtomicUsize::new(0);
        tokio::select! {
            biased;
            () = stop.cancelled() => {
                let played = played.load(Ordering::Relaxed);
                tracing::info!(played, "playback cancelled");
                Ok(SpeakOutcome::Cancelled { played })
            }
            result = self.drain(&sentences, &played) => {
                if let Err(e) = &result {
                    tracing::error!(
                        error = %e,
                        played = played.load(Ordering::Relaxed),
                        "sequential playback aborted"
                    );
                }
                result.map(|()| SpeakOutcome::Completed { sentences: sentences.len() })
            }
        }
    }

    /// Halt the draining sequence, if any
    pub fn cancel(&self) {
        if let Ok(slot) = self.cancel.lock() {
            if let Some(token) = slot.as_ref() {
                token.cancel();
            }
        }
    }

    async fn drain(&self, sentences: &[String], played: &AtomicUsize) -> Result<()> {
        let mut cued: Option<Result<Box<dyn AudioClip>>> = None;

        for (index, sentence) in sentences.iter().enumerate() {
            let clip = match cued.take() {
                Some(clip) => clip?,
                None => self.prepare(sentence).await?,
            };

            let prefetch = sentences
                .get(index + 1)
                .map(|next| Prefetch::spawn(Arc::clone(&self.synthesizer), next.clone()));

            let mut playing = clip.play().await?;
            tracing::debug!(index, duration = ?playing.duration(), "sentence started");

            cued = match prefetch {
                None => {
                    playing.finished().await?;
                    None
                }
                Some(prefetch) => Some(self.play_through(&mut playing, prefetch).await?),
            };

            drop(playing);
            played.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(index, "sentence ended");
        }

        Ok(())
    }

    /// Delay after playback start at which the next sentence is cued
    ///
    /// `None` when the duration is unknown or too short, in which case the
    /// next sentence is cued after the current one ends.
    fn cue_lead(&self, duration: Option<Duration>) -> Option<Duration> {
        duration
            .and_then(|d| d.checked_sub(self.overlap))
            .filter(|lead| !lead.is_zero())
    }

    /// Wait for the current clip to end while cueing the next sentence
    ///
    /// The outer error is the current clip's failure and aborts at once. The
    /// inner result is the cued clip, surfaced when its turn comes.
    async fn play_through(
        &self,
        playing: &mut Playing,
        prefetch: Prefetch,
    ) -> Result<Result<Box<dyn AudioClip>>> {
        let Some(lead) = self.cue_lead(playing.duration()) else {
            playing.finished().await?;
            return Ok(self.cue(prefetch).await);
        };

        tokio::select! {
            biased;
            ended = playing.finished() => {
                // Ended before the overlap point
                ended?;
                return Ok(self.cue(prefetch).await);
            }
            () = sleep(lead) => {}
        }

        let cue = self.cue(prefetch);
        tokio::pin!(cue);

        tokio::select! {
            biased;
            ended = playing.finished() => {
                ended?;
                Ok(cue.await)
            }
            next = &mut cue => {
                playing.finished().await?;
                Ok(next)
            }
        }
    }

    async fn prepare(&self, sentence: &str) -> Result<Box<dyn AudioClip>> {
        let audio = self.synthesizer.synthesize(sentence).await?;
        self.output.load(audio).await
    }

    async fn cue(&self, prefetch: Prefetch) -> Result<Box<dyn AudioClip>> {
        let audio = prefetch.join().await?;
        self.output.load(audio).await
    }
}

/// Background synthesis of the next sentence
struct Prefetch(JoinHandle<Result<Vec<u8>>>);

impl Prefetch {
    fn spawn(synthesizer: Arc<dyn Synthesizer>, sentence: String) -> Self {
        Self(tokio::spawn(async move {
            synthesizer.synthesize(&sentence).await
        }))
    }

    async fn join(mut self) -> Result<Vec<u8>> {
        (&mut self.0)
            .await
            .map_err(|e| Error::Playback(format!("prefetch task failed: {e}")))?
    }
}

impl Drop for Prefetch {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Publishes the cancel token and releases the draining flag on exit
struct DrainGuard<'a> {
    playback: &'a SpeechPlayback,
}

impl<'a> DrainGuard<'a> {
    fn new(playback: &'a SpeechPlayback, token: CancellationToken) -> Self {
        if let Ok(mut slot) = playback.cancel.lock() {
            *slot = Some(token);
        }
        Self { playback }
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.playback.cancel.lock() {
            *slot = None;
        }
        self.playback.draining.store(false, Ordering::Release);
    }
}
