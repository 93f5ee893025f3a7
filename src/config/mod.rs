//! Configuration management for the Nuvem voice tutor
//!
//! Values resolve env > TOML file > default.

pub mod file;

use std::time::Duration;

use crate::voice::CaptureConfig;
use crate::{Error, Result};

use file::NuvemConfigFile;

/// Nuvem configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API keys
    pub api_keys: ApiKeys,

    /// Tutor chat configuration
    pub tutor: TutorConfig,

    /// Voice configuration
    pub voice: VoiceConfig,
}

/// API keys for external services
#[derive(Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (chat, images, Whisper and TTS)
    pub openai: Option<String>,
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeys")
            .field("openai", &self.openai.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Tutor chat configuration
#[derive(Debug, Clone)]
pub struct TutorConfig {
    /// Chat completions model
    pub chat_model: String,

    /// Image generation model
    pub image_model: String,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Recognition language tag
    pub language: String,

    /// STT model (e.g. "whisper-1")
    pub stt_model: String,

    /// TTS model (e.g. "tts-1")
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f64,

    /// Silence that ends a capture session
    pub silence_window: Duration,

    /// Hard cap on a capture session
    pub max_listen: Duration,

    /// How early the next sentence is cued before the current one ends
    pub overlap: Duration,
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if a resolved value is out of range
    pub fn load() -> Result<Self> {
        Self::resolve(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed file and an env lookup
    ///
    /// # Errors
    ///
    /// Returns error if a resolved value is out of range
    pub fn resolve(fc: NuvemConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_keys = ApiKeys {
            openai: env("OPENAI_API_KEY")
                .or(fc.api_keys.openai)
                .filter(|key| !key.is_empty()),
        };

        let tutor = TutorConfig {
            chat_model: env("NUVEM_CHAT_MODEL")
                .or(fc.tutor.chat_model)
                .unwrap_or_else(|| "gpt-4o".to_string()),
            image_model: env("NUVEM_IMAGE_MODEL")
                .or(fc.tutor.image_model)
                .unwrap_or_else(|| "dall-e-3".to_string()),
        };

        let tts_speed = fc.voice.tts_speed.unwrap_or(1.0);
        if !(0.25..=4.0).contains(&tts_speed) {
            return Err(Error::Config(format!(
                "tts_speed must be between 0.25 and 4.0, got {tts_speed}"
            )));
        }

        let silence_window_ms = fc.voice.silence_window_ms.unwrap_or(2000);
        if silence_window_ms == 0 {
            return Err(Error::Config(
                "silence_window_ms must be greater than zero".to_string(),
            ));
        }

        let max_listen_secs = fc.voice.max_listen_secs.unwrap_or(30);
        if max_listen_secs == 0 {
            return Err(Error::Config(
                "max_listen_secs must be greater than zero".to_string(),
            ));
        }

        let voice = VoiceConfig {
            language: env("NUVEM_LANGUAGE")
                .or(fc.voice.language)
                .unwrap_or_else(|| "pt-BR".to_string()),
            stt_model: env("NUVEM_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or_else(|| "whisper-1".to_string()),
            tts_model: env("NUVEM_TTS_MODEL")
                .or(fc.voice.tts_model)
                .unwrap_or_else(|| "tts-1".to_string()),
            tts_voice: env("NUVEM_TTS_VOICE")
                .or(fc.voice.tts_voice)
                .unwrap_or_else(|| "alloy".to_string()),
            tts_speed,
            silence_window: Duration::from_millis(silence_window_ms),
            max_listen: Duration::from_secs(max_listen_secs),
            overlap: Duration::from_millis(fc.voice.overlap_ms.unwrap_or(500)),
        };

        Ok(Self {
            api_keys,
            tutor,
            voice,
        })
    }

    /// The `OpenAI` API key
    ///
    /// # Errors
    ///
    /// Returns error if no key is configured
    pub fn openai_key(&self) -> Result<&str> {
        self.api_keys.openai.as_deref().ok_or_else(|| {
            Error::Config(
                "OPENAI_API_KEY is not set (env or [api_keys] in config.toml)".to_string(),
            )
        })
    }

    /// Settings for the speech capture controller
    #[must_use]
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            language: self.voice.language.clone(),
            silence_window: self.voice.silence_window,
            max_duration: self.voice.max_listen,
        }
    }
}
