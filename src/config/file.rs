//! TOML configuration file loading
//!
//! Supports `~/.config/nuvem/config.toml` (or the path in `NUVEM_CONFIG`) as
//! a persistent config source. All fields are optional: the file is a
//! partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct NuvemConfigFile {
    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Tutor chat configuration
    #[serde(default)]
    pub tutor: TutorFileConfig,

    /// Voice capture and playback configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
}

/// Tutor chat configuration
#[derive(Debug, Default, Deserialize)]
pub struct TutorFileConfig {
    /// Chat model (e.g. "gpt-4o")
    pub chat_model: Option<String>,

    /// Image model (e.g. "dall-e-3")
    pub image_model: Option<String>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Recognition language tag (e.g. "pt-BR")
    pub language: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "alloy")
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f64>,

    /// Silence that ends a capture session, in milliseconds
    pub silence_window_ms: Option<u64>,

    /// Hard cap on a capture session, in seconds
    pub max_listen_secs: Option<u64>,

    /// How early the next sentence is cued, in milliseconds
    pub overlap_ms: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `NuvemConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> NuvemConfigFile {
    config_file_path().map_or_else(NuvemConfigFile::default, |path| {
        load_config_file_from(&path)
    })
}

/// Load a TOML config file from `path`
///
/// Returns `NuvemConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file_from(path: &Path) -> NuvemConfigFile {
    if !path.exists() {
        return NuvemConfigFile::default();
    }

    match read_config(path) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "loaded config file");
            config
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            NuvemConfigFile::default()
        }
    }
}

fn read_config(path: &Path) -> crate::Result<NuvemConfigFile> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Return the config file path: `NUVEM_CONFIG` or `~/.config/nuvem/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("NUVEM_CONFIG") {
        return Some(PathBuf::from(path));
    }

    directories::BaseDirs::new().map(|d| d.config_dir().join("nuvem").join("config.toml"))
}
