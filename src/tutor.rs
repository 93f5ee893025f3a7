//! Tutor chat service
//!
//! The tutor answers with one of three reply kinds (code, image, text). The
//! voice session only speaks the textual part; the kind-specific payload is
//! for the caller to display.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const CHAT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const IMAGE_ENDPOINT: &str = "https://api.openai.com/v1/images/generations";

const SYSTEM_PROMPT: &str = r#"Você é um tutor de IA de programação e de inglês.
Responda sempre em português do Brasil, de forma concisa.
Quando o aluno pedir uma visualização, um diagrama ou perguntar sobre um conceito visual, gere uma imagem.

Responda apenas com um objeto JSON neste formato:
{
  "type": "code" | "image" | "text",
  "content": "sua resposta",
  "language": "linguagem de programação (somente para code)",
  "imagePrompt": "descrição detalhada da imagem (somente para image)"
}

- Perguntas de programação: type "code", o código em content e a linguagem em language.
- Conceitos visuais: type "image", a explicação em content e um imagePrompt detalhado, focado em diagramas didáticos.
- Demais perguntas: type "text", a explicação em content."#;

/// Discriminator of a tutor reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyKind {
    Code,
    Image,
    Text,
}

impl ReplyKind {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "code" => Some(Self::Code),
            "image" => Some(Self::Image),
            "text" => Some(Self::Text),
            _ => None,
        }
    }
}

/// A structured tutor reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TutorReply {
    /// Plain explanation
    Text { content: String },
    /// Code answer; `content` holds the snippet
    Code {
        content: String,
        language: Option<String>,
    },
    /// Explanation illustrated by a generated image
    Image {
        content: String,
        image_url: Option<String>,
    },
}

impl TutorReply {
    /// Reply discriminator
    #[must_use]
    pub const fn kind(&self) -> ReplyKind {
        match self {
            Self::Text { .. } => ReplyKind::Text,
            Self::Code { .. } => ReplyKind::Code,
            Self::Image { .. } => ReplyKind::Image,
        }
    }

    /// Text to hand to speech playback
    #[must_use]
    pub fn spoken_text(&self) -> &str {
        match self {
            Self::Text { content } | Self::Code { content, .. } | Self::Image { content, .. } => {
                content
            }
        }
    }
}

/// Answers a learner's question
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Produce a reply for the transcript or typed question
    ///
    /// # Errors
    ///
    /// Returns error if the service fails or answers malformed data
    async fn respond(&self, input: &str) -> Result<TutorReply>;
}

/// Validated JSON object produced by the chat model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    pub kind: ReplyKind,
    pub content: String,
    pub language: Option<String>,
    pub image_prompt: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReply {
    #[serde(rename = "type")]
    kind: Option<String>,
    content: Option<String>,
    language: Option<String>,
    image_prompt: Option<String>,
}

/// Parse and validate the chat model's JSON answer
///
/// # Errors
///
/// Returns error if the JSON is malformed, the type is unknown, or the
/// content is missing
pub fn parse_reply(json: &str) -> Result<ParsedReply> {
    let raw: RawReply = serde_json::from_str(json)?;

    let kind = raw
        .kind
        .as_deref()
        .and_then(ReplyKind::parse)
        .ok_or_else(|| Error::Tutor("invalid reply type from chat model".to_string()))?;

    let content = raw
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| Error::Tutor("reply without content from chat model".to_string()))?;

    Ok(ParsedReply {
        kind,
        content,
        language: raw.language.filter(|l| !l.trim().is_empty()),
        image_prompt: raw.image_prompt.filter(|p| !p.trim().is_empty()),
    })
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ImageGeneration {
    data: Vec<GeneratedImage>,
}

#[derive(Deserialize)]
struct GeneratedImage {
    url: Option<String>,
}

/// Tutor backed by `OpenAI` chat completions and image generation
pub struct OpenAiTutor {
    client: reqwest::Client,
    api_key: String,
    chat_model: String,
    image_model: String,
    image_size: String,
}

impl OpenAiTutor {
    /// Create a new tutor client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: String, chat_model: String, image_model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for the tutor".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            chat_model,
            image_model,
            image_size: "1024x1024".to_string(),
        })
    }

    async fn complete(&self, input: &str) -> Result<String> {
        let request = serde_json::json!({
            "model": self.chat_model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": input },
            ],
            "response_format": { "type": "json_object" },
        });

        let response = self
            .client
            .post(CHAT_ENDPOINT)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tutor(format!("OpenAI chat error {status}: {body}")));
        }

        let completion: ChatCompletion = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::Tutor("empty response from chat model".to_string()))
    }

    async fn generate_image(&self, prompt: &str) -> Result<String> {
        tracing::debug!(model = %self.image_model, "generating image");

        let request = serde_json::json!({
            "model": self.image_model,
            "prompt": prompt,
            "n": 1,
            "size": self.image_size,
        });

        let response = self
            .client
            .post(IMAGE_ENDPOINT)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tutor(format!("OpenAI image error {status}: {body}")));
        }

        let generation: ImageGeneration = response.json().await?;
        generation
            .data
            .into_iter()
            .next()
            .and_then(|image| image.url)
            .ok_or_else(|| Error::Tutor("image generation returned no URL".to_string()))
    }
}

#[async_trait]
impl ChatService for OpenAiTutor {
    async fn respond(&self, input: &str) -> Result<TutorReply> {
        let raw = self.complete(input).await?;
        let parsed = parse_reply(&raw)?;

        tracing::debug!(kind = ?parsed.kind, "tutor replied");

        Ok(match parsed.kind {
            ReplyKind::Text => TutorReply::Text {
                content: parsed.content,
            },
            ReplyKind::Code => TutorReply::Code {
                content: parsed.content,
                language: parsed.language,
            },
            ReplyKind::Image => {
                let image_url = match parsed.image_prompt {
                    Some(prompt) => Some(self.generate_image(&prompt).await?),
                    None => None,
                };
                TutorReply::Image {
                    content: parsed.content,
                    image_url,
                }
            }
        })
    }
}
