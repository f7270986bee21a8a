use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::audio_mixer::{ExportFormat, Mp3Bitrate};
use crate::error::{PodcastError, PodcastResult};
use crate::manuscript::WordTargetPolicy;
use crate::transcript_parser::UnknownSpeakerPolicy;
use crate::voice_registry::{default_voice_table, ProviderKind, VoiceTable};

/// Main configuration for podcast generation.
///
/// Built from defaults, an optional TOML file and `PODCAST_`-prefixed
/// environment variables (nested keys separated by `__`, e.g.
/// `PODCAST_TTS__PROVIDER=rest_speech`).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PodcastConfig {
    /// Directory receiving final podcasts and review manuscripts
    pub output_dir: PathBuf,
    /// Directory for per-run chunk directories
    pub work_dir: PathBuf,
    /// Keep per-line audio chunks after a successful run
    pub keep_chunks: bool,
    /// Target sample rate of every chunk and of the assembled track
    pub sample_rate: u32,
    pub export_format: ExportFormat,
    pub mp3_bitrate: Mp3Bitrate,
    /// Timeout for every outbound HTTP request
    pub request_timeout_secs: u64,
    pub text_generation: TextGenConfig,
    pub tts: TtsConfig,
    pub manuscript: ManuscriptConfig,
    pub background_music: BackgroundMusicConfig,
    /// identity -> provider -> voice handle
    pub voices: VoiceTable,
}

impl Default for PodcastConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("podcast"),
            work_dir: PathBuf::from("podcast/chunks"),
            keep_chunks: false,
            sample_rate: 24_000,
            export_format: ExportFormat::Mp3,
            mp3_bitrate: Mp3Bitrate::Kbps192,
            request_timeout_secs: 120,
            text_generation: TextGenConfig::default(),
            tts: TtsConfig::default(),
            manuscript: ManuscriptConfig::default(),
            background_music: BackgroundMusicConfig::default(),
            voices: default_voice_table(),
        }
    }
}

// ============================================================================
// TEXT GENERATION
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextBackend {
    Gemini,
    Openai,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TextGenConfig {
    pub backend: TextBackend,
    pub gemini: GeminiConfig,
    pub openai: OpenaiConfig,
}

impl Default for TextGenConfig {
    fn default() -> Self {
        Self {
            backend: TextBackend::Gemini,
            gemini: GeminiConfig::default(),
            openai: OpenaiConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub proxy: bool,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: "env:GOOGLE_API_KEY".to_string(),
            api_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.0-flash".to_string(),
            proxy: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenaiConfig {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub proxy: bool,
}

impl Default for OpenaiConfig {
    fn default() -> Self {
        Self {
            api_key: "env:OPENAI_API_KEY".to_string(),
            api_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            proxy: true,
        }
    }
}

// ============================================================================
// SPEECH SYNTHESIS
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Provider used when a request does not pick one
    pub provider: ProviderKind,
    pub cloud_neural: GoogleTtsConfig,
    pub commercial_voice: ElevenLabsConfig,
    pub offline_local: LocalEngineConfig,
    pub rest_speech: OpenaiSpeechConfig,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OfflineLocal,
            cloud_neural: GoogleTtsConfig::default(),
            commercial_voice: ElevenLabsConfig::default(),
            offline_local: LocalEngineConfig::default(),
            rest_speech: OpenaiSpeechConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleTtsConfig {
    pub api_key: String,
    pub api_url: String,
    /// Derived from the voice name (`en-US-Wavenet-C` -> `en-US`) when unset
    pub language_code: Option<String>,
    pub speaking_rate: f32,
}

impl Default for GoogleTtsConfig {
    fn default() -> Self {
        Self {
            api_key: "env:GOOGLE_API_KEY".to_string(),
            api_url: "https://texttospeech.googleapis.com/v1/text:synthesize".to_string(),
            language_code: None,
            speaking_rate: 1.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ElevenLabsConfig {
    pub api_key: String,
    pub api_url: String,
    pub model_id: String,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            api_key: "env:ELEVENLABS_API_KEY".to_string(),
            api_url: "https://api.elevenlabs.io/v1".to_string(),
            model_id: "eleven_multilingual_v2".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenaiSpeechConfig {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
}

impl Default for OpenaiSpeechConfig {
    fn default() -> Self {
        Self {
            api_key: "env:OPENAI_API_KEY".to_string(),
            api_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini-tts".to_string(),
        }
    }
}

/// Local command-line engine
///
/// `args` may contain `{voice}`, `{output}` and `{text}` placeholders.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalEngineConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for LocalEngineConfig {
    fn default() -> Self {
        Self {
            program: "espeak-ng".to_string(),
            args: ["-v", "{voice}", "-w", "{output}", "{text}"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

// ============================================================================
// MANUSCRIPT / MUSIC
// ============================================================================

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManuscriptConfig {
    pub word_target_policy: WordTargetPolicy,
    pub unknown_speaker_policy: UnknownSpeakerPolicy,
    /// Identity receiving remapped lines; first requested speaker when unset
    pub default_speaker: Option<String>,
    /// Where `draft` writes the manuscript for review (relative to `output_dir`)
    pub review_file: PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundMusicConfig {
    pub enabled: bool,
    /// Catalog tags tried in order
    pub tags: Vec<String>,
    pub gain_reduction_db: f32,
    pub client_id: String,
    pub api_url: String,
}

impl Default for BackgroundMusicConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tags: vec!["lofi".to_string(), "ambient".to_string(), "chill".to_string()],
            gain_reduction_db: 20.0,
            client_id: "env:JAMENDO_CLIENT_ID".to_string(),
            api_url: "https://api.jamendo.com/v3.0".to_string(),
        }
    }
}

// ============================================================================
// LOADING
// ============================================================================

impl PodcastConfig {
    /// Load configuration.
    ///
    /// File lookup order: `path`, then `PODCAST_CONFIG_PATH`, then
    /// `<config_dir>/mofa-studio/podcast.toml`. A missing default file is not an
    /// error; an explicitly named file must exist.
    pub fn load(path: Option<&Path>) -> PodcastResult<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("PODCAST_CONFIG_PATH").ok().map(PathBuf::from));

        let mut figment = Figment::from(Serialized::defaults(PodcastConfig::default()));

        match explicit {
            Some(file) => {
                if !file.exists() {
                    return Err(PodcastError::Config(format!(
                        "config file not found: {}",
                        file.display()
                    )));
                }
                ::log::info!("Loading config from {}", file.display());
                figment = figment.merge(Toml::file(file));
            }
            None => {
                if let Some(file) = Self::default_path().filter(|p| p.exists()) {
                    ::log::info!("Loading config from {}", file.display());
                    figment = figment.merge(Toml::file(file));
                }
            }
        }

        let config: PodcastConfig = figment
            .merge(Env::prefixed("PODCAST_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir()?;
        path.push("mofa-studio");
        path.push("podcast.toml");
        Some(path)
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> PodcastResult<()> {
        if !(8_000..=48_000).contains(&self.sample_rate) {
            return Err(PodcastError::Config(format!(
                "sample_rate {} outside 8000..=48000",
                self.sample_rate
            )));
        }
        if self.background_music.gain_reduction_db < 0.0 {
            return Err(PodcastError::Config(
                "background_music.gain_reduction_db must not be negative".into(),
            ));
        }
        if self.voices.is_empty() {
            return Err(PodcastError::Config("voice table is empty".into()));
        }
        Ok(())
    }

    /// Path of the review manuscript
    pub fn review_path(&self) -> PathBuf {
        if self.manuscript.review_file.as_os_str().is_empty() {
            self.output_dir.join("manual_edit.txt")
        } else {
            self.output_dir.join(&self.manuscript.review_file)
        }
    }
}

/// Resolve a secret from configuration.
///
/// `"env:NAME"` reads the environment variable `NAME`; anything else is taken
/// literally. Empty results are `None`.
pub fn resolve_secret(value: &str) -> Option<String> {
    let resolved = match value.strip_prefix("env:") {
        Some(var) => match std::env::var(var) {
            Ok(v) => v.trim().to_string(),
            Err(_) => {
                ::log::debug!("Environment variable {} not set", var);
                String::new()
            }
        },
        None => value.trim().to_string(),
    };

    if resolved.is_empty() {
        return None;
    }
    ::log::debug!("Resolved secret {}", mask_secret(&resolved));
    Some(resolved)
}

/// Mask a secret for logging
fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{} (len={})", head, tail, chars.len())
    } else {
        format!("**** (len={})", chars.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PodcastConfig::default();
        config.validate().unwrap();
        assert_eq!(config.sample_rate, 24_000);
        assert_eq!(config.tts.provider, ProviderKind::OfflineLocal);
        assert_eq!(config.background_music.tags[0], "lofi");
        assert_eq!(config.review_path(), PathBuf::from("podcast/manual_edit.txt"));
    }

    #[test]
    fn test_load_merges_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("podcast.toml");
        std::fs::write(
            &path,
            r#"
keep_chunks = true
export_format = "wav"

[tts]
provider = "rest_speech"

[manuscript]
unknown_speaker_policy = "strict"
word_target_policy = "proportional"

[background_music]
tags = ["jazz"]

[voices.Host]
rest_speech = "alloy"
"#,
        )
        .unwrap();

        let config = PodcastConfig::load(Some(&path)).unwrap();
        assert!(config.keep_chunks);
        assert_eq!(config.export_format, ExportFormat::Wav);
        assert_eq!(config.tts.provider, ProviderKind::RestSpeech);
        assert_eq!(config.manuscript.unknown_speaker_policy, UnknownSpeakerPolicy::Strict);
        assert_eq!(config.manuscript.word_target_policy, WordTargetPolicy::Proportional);
        assert_eq!(config.background_music.tags, vec!["jazz".to_string()]);
        // untouched sections keep their defaults
        assert_eq!(config.tts.rest_speech.model, "gpt-4o-mini-tts");
        assert_eq!(config.voices["Host"]["rest_speech"], "alloy");
        assert!(config.voices.contains_key("Bonnie"));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let err = PodcastConfig::load(Some(Path::new("/nonexistent/podcast.toml"))).unwrap_err();
        assert!(matches!(err, PodcastError::Config(_)));
    }

    #[test]
    fn test_invalid_sample_rate_rejected() {
        let config = PodcastConfig {
            sample_rate: 100,
            ..PodcastConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_secret() {
        assert_eq!(resolve_secret("sk-literal-value"), Some("sk-literal-value".to_string()));
        assert_eq!(resolve_secret("   "), None);
        assert_eq!(resolve_secret("env:MOFA_PODCAST_SURELY_UNSET"), None);
        assert_eq!(mask_secret("abcdefghijkl"), "abcd...ijkl (len=12)");
    }
}
