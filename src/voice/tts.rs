//! Sentence synthesis for spoken tutor replies
//!
//! Each sentence is one `audio/speech` request; the engine pre-fetches the
//! next sentence while the current one plays.

use async_trait::async_trait;
use serde::Serialize;

use super::playback::Synthesizer;
use crate::config::VoiceConfig;
use crate::{Error, Result};

const SPEECH_URL: &str = "https://api.openai.com/v1/audio/speech";

/// `OpenAI` text-to-speech client that returns MP3 per sentence
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: String,
    model: String,
    voice: String,
    speed: f32,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
}

impl TextToSpeech {
    /// Build a client from the configured tutor voice
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the API key is empty
    pub fn from_config(api_key: String, voice: &VoiceConfig) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        #[allow(clippy::cast_possible_truncation)]
        let speed = voice.tts_speed as f32;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model: voice.tts_model.clone(),
            voice: voice.tts_voice.clone(),
            speed,
        })
    }

    fn request<'a>(&'a self, sentence: &'a str) -> SpeechRequest<'a> {
        SpeechRequest {
            model: &self.model,
            input: sentence,
            voice: &self.voice,
            speed: self.speed,
        }
    }
}

#[async_trait]
impl Synthesizer for TextToSpeech {
    async fn synthesize(&self, sentence: &str) -> Result<Vec<u8>> {
        tracing::debug!(
            chars = sentence.chars().count(),
            model = %self.model,
            voice = %self.voice,
            "synthesizing reply sentence"
        );

        let response = self
            .client
            .post(SPEECH_URL)
            .bearer_auth(&self.api_key)
            .json(&self.request(sentence))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("speech request failed with {status}: {body}")));
        }

        Ok(response.bytes().await?.to_vec())
    }
}
