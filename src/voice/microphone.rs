//! Microphone input for the native recognizer
//!
//! Opens the default input device at 16 kHz mono and collects samples for
//! the speech detector. The cpal stream is not `Send`, so a `Microphone`
//! stays on the capture thread that opened it and stops recording when
//! dropped.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};

use crate::{Error, Result};

/// Capture rate expected by the speech detector and Whisper
pub const SAMPLE_RATE: u32 = 16000;

/// A recording microphone
pub struct Microphone {
    pending: Arc<Mutex<Vec<f32>>>,
    _stream: Stream,
}

impl Microphone {
    /// Whether the host has a default input device to listen with
    #[must_use]
    pub fn is_available() -> bool {
        cpal::default_host().default_input_device().is_some()
    }

    /// Open the default input device and start recording
    ///
    /// # Errors
    ///
    /// Returns `Error::Audio` if there is no input device, none of its
    /// configs can record 16 kHz mono, or the stream does not start
    pub fn open() -> Result<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device to listen with".to_string()))?;
        let config = speech_config(&device)?;

        let pending = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&pending);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut pending) = sink.lock() {
                        pending.extend_from_slice(data);
                    }
                },
                |err| tracing::error!(error = %err, "microphone stream failed"),
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;
        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            "recording from microphone"
        );

        Ok(Self {
            pending,
            _stream: stream,
        })
    }

    /// Samples recorded since the previous call
    #[must_use]
    pub fn drain(&self) -> Vec<f32> {
        self.pending
            .lock()
            .map(|mut pending| std::mem::take(&mut *pending))
            .unwrap_or_default()
    }
}

impl Drop for Microphone {
    fn drop(&mut self) {
        tracing::debug!("microphone closed");
    }
}

fn speech_config(device: &Device) -> Result<StreamConfig> {
    let rate = SampleRate(SAMPLE_RATE);
    let supported = device
        .supported_input_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| c.channels() == 1 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
        .ok_or_else(|| Error::Audio("microphone cannot record 16 kHz mono".to_string()))?;

    Ok(supported.with_sample_rate(rate).config())
}

/// Encode one detected utterance as the 16-bit WAV upload Whisper takes
///
/// # Errors
///
/// Returns `Error::Audio` if WAV encoding fails
pub fn utterance_to_wav(samples: &[f32]) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    let mut writer =
        hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;
    for &sample in samples {
        #[allow(clippy::cast_possible_truncation)]
        let pcm = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
        writer
            .write_sample(pcm)
            .map_err(|e| Error::Audio(e.to_string()))?;
    }
    writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;

    Ok(cursor.into_inner())
}
