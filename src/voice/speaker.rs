//! Speaker output for synthesized speech

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use tokio::sync::oneshot;

use super::playback::{AudioClip, AudioOutput, Playing};
use crate::{Error, Result};

/// Sample rate for playback (matches `OpenAI` TTS output)
const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// How often the playback thread checks for end or halt
const END_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Plays decoded MP3 clips on the default output device
pub struct SpeakerOutput {
    config: StreamConfig,
}

impl SpeakerOutput {
    /// Open the default output device
    ///
    /// # Errors
    ///
    /// Returns error if no device supports 24kHz output
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
                })
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "speaker output initialized"
        );

        Ok(Self { config })
    }
}

#[async_trait]
impl AudioOutput for SpeakerOutput {
    async fn load(&self, audio: Vec<u8>) -> Result<Box<dyn AudioClip>> {
        let samples = tokio::task::spawn_blocking(move || decode_mp3(&audio))
            .await
            .map_err(|e| Error::Audio(format!("decode task failed: {e}")))??;

        Ok(Box::new(SpeakerClip {
            samples,
            config: self.config.clone(),
        }))
    }
}

/// Decoded mono samples waiting to be played
struct SpeakerClip {
    samples: Vec<f32>,
    config: StreamConfig,
}

#[async_trait]
impl AudioClip for SpeakerClip {
    async fn play(self: Box<Self>) -> Result<Playing> {
        let Self { samples, config } = *self;
        let duration = samples_duration(samples.len());

        let halt = Arc::new(AtomicBool::new(false));
        let thread_halt = Arc::clone(&halt);
        let (started_tx, started_rx) = oneshot::channel();
        let (ended_tx, ended_rx) = oneshot::channel();

        std::thread::Builder::new()
            .name("nuvem-speaker".to_string())
            .spawn(move || match open_stream(samples, &config) {
                Ok((stream, finished)) => {
                    let _ = started_tx.send(Ok(()));
                    let result = wait_for_end(stream, &finished, &thread_halt, duration);
                    let _ = ended_tx.send(result);
                }
                Err(e) => {
                    let _ = started_tx.send(Err(e));
                }
            })
            .map_err(|e| Error::Audio(e.to_string()))?;

        started_rx
            .await
            .map_err(|_| Error::Audio("speaker thread exited before playback".to_string()))??;

        Ok(Playing::new(Some(duration), ended_rx, halt))
    }
}

/// Build and start an output stream over `samples`
///
/// The returned flag is raised once every sample has been written.
fn open_stream(samples: Vec<f32>, config: &StreamConfig) -> Result<(Stream, Arc<AtomicBool>)> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device".to_string()))?;

    let channels = usize::from(config.channels);
    let finished = Arc::new(AtomicBool::new(samples.is_empty()));
    let finished_flag = Arc::clone(&finished);
    let mut position = 0usize;

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let sample = samples.get(position).copied().unwrap_or_else(|| {
                        finished_flag.store(true, Ordering::Release);
                        0.0
                    });

                    for out in frame.iter_mut() {
                        *out = sample;
                    }

                    if position < samples.len() {
                        position += 1;
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;
    Ok((stream, finished))
}

/// Block until the stream drains, the handle halts it, or it overruns
fn wait_for_end(
    stream: Stream,
    finished: &AtomicBool,
    halt: &AtomicBool,
    duration: Duration,
) -> Result<()> {
    let deadline = Instant::now() + duration + Duration::from_millis(500);

    while !finished.load(Ordering::Acquire) {
        if halt.load(Ordering::Acquire) {
            drop(stream);
            tracing::debug!("playback halted");
            return Ok(());
        }
        if Instant::now() > deadline {
            tracing::warn!(?duration, "playback overran clip duration");
            break;
        }
        std::thread::sleep(END_POLL_INTERVAL);
    }

    // Let the device drain its last buffer
    std::thread::sleep(Duration::from_millis(100));
    drop(stream);
    tracing::debug!(?duration, "clip played");

    Ok(())
}

fn samples_duration(sample_count: usize) -> Duration {
    let millis = (sample_count as u64).saturating_mul(1000) / u64::from(PLAYBACK_SAMPLE_RATE);
    Duration::from_millis(millis)
}

/// Decode MP3 bytes to mono f32 samples
fn decode_mp3(mp3_data: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(samples)
}
