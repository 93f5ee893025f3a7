//! Speech segment detection
//!
//! Splits a live microphone feed into utterance-sized segments with a simple
//! RMS energy gate, so each segment can be transcribed on its own.

/// Minimum audio energy to count a chunk as speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum speech length of a segment (0.3s at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800;

/// Trailing silence that completes a segment (0.5s at 16kHz)
const END_SILENCE_SAMPLES: usize = 8000;

/// Detects speech segments in a sample stream
#[derive(Debug, Default)]
pub struct SpeechDetector {
    segment: Vec<f32>,
    speech_samples: usize,
    silence_samples: usize,
}

impl SpeechDetector {
    /// Create an idle detector
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of samples
    ///
    /// Returns the finished segment once enough speech has been followed by
    /// enough silence. A segment that stays too short through a long silence
    /// is discarded.
    pub fn push(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        if samples.is_empty() {
            return None;
        }

        let is_speech = rms(samples) > ENERGY_THRESHOLD;

        if !self.is_active() {
            if is_speech {
                tracing::trace!("speech started");
                self.segment.extend_from_slice(samples);
                self.speech_samples = samples.len();
            }
            return None;
        }

        self.segment.extend_from_slice(samples);
        if is_speech {
            self.speech_samples += samples.len();
            self.silence_samples = 0;
        } else {
            self.silence_samples += samples.len();
        }

        if self.silence_samples > END_SILENCE_SAMPLES {
            if self.speech_samples > MIN_SPEECH_SAMPLES {
                tracing::debug!(samples = self.segment.len(), "speech segment complete");
                return Some(self.reset());
            }
            if self.silence_samples > END_SILENCE_SAMPLES * 2 {
                tracing::trace!("discarding short segment");
                self.reset();
            }
        }

        None
    }

    /// Return the pending segment if it holds enough speech
    pub fn flush(&mut self) -> Option<Vec<f32>> {
        let enough = self.speech_samples > MIN_SPEECH_SAMPLES;
        let segment = self.reset();
        enough.then_some(segment)
    }

    /// Whether a segment is being accumulated
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.segment.is_empty()
    }

    fn reset(&mut self) -> Vec<f32> {
        self.speech_samples = 0;
        self.silence_samples = 0;
        std::mem::take(&mut self.segment)
    }
}

/// RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
