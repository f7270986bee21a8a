//! Speech Synthesizer - one capability, one implementation per provider
//!
//! Every provider answers `synthesize(text, voice) -> bytes` in its own native
//! encoding. [`SpeechSynthesizer`] picks the provider from a table built at
//! startup and conforms the bytes to the run's target PCM format.
//!
//! No retries happen here: a failed call surfaces immediately.

use base64::Engine as _;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::audio_mixer::{conform, AudioEncoding, PcmTrack};
use crate::config::{
    resolve_secret, ElevenLabsConfig, GoogleTtsConfig, LocalEngineConfig, OpenaiSpeechConfig,
    TtsConfig,
};
use crate::error::{PodcastError, PodcastResult};
use crate::llm_client::build_http_client;
use crate::voice_registry::ProviderKind;

// ============================================================================
// TRAIT DEFINITIONS
// ============================================================================

/// Speech synthesis backend
#[async_trait::async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Which provider variant this is
    fn kind(&self) -> ProviderKind;

    /// Encoding of the bytes returned by [`SpeechProvider::synthesize`]
    fn native_encoding(&self) -> AudioEncoding;

    /// Synthesize one utterance with the given provider voice handle
    async fn synthesize(&self, text: &str, voice: &str) -> PodcastResult<Vec<u8>>;
}

fn require_credential(value: &str, provider: ProviderKind) -> PodcastResult<String> {
    resolve_secret(value).ok_or_else(|| PodcastError::ProviderUnavailable {
        provider,
        reason: "API credential is not set".to_string(),
    })
}

fn request_error(provider: ProviderKind, e: reqwest::Error) -> PodcastError {
    PodcastError::SynthesisFailed {
        provider,
        status: e.status().map(|s| s.as_u16()).unwrap_or(0),
        detail: e.to_string(),
    }
}

/// Return the body bytes, or `SynthesisFailed` for a non-success status
async fn success_bytes(response: reqwest::Response, provider: ProviderKind) -> PodcastResult<Vec<u8>> {
    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        ::log::error!("[{}] Synthesis error {}: {}", provider, status, detail);
        return Err(PodcastError::SynthesisFailed {
            provider,
            status: status.as_u16(),
            detail,
        });
    }
    let bytes = response.bytes().await.map_err(|e| request_error(provider, e))?;
    Ok(bytes.to_vec())
}

// ============================================================================
// CLOUD NEURAL (Google Cloud Text-to-Speech)
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleSynthesizeResponse {
    audio_content: String,
}

/// Google Cloud Text-to-Speech over REST, LINEAR16 output
pub struct GoogleTtsProvider {
    config: GoogleTtsConfig,
    api_key: String,
    sample_rate: u32,
    client: HttpClient,
}

impl GoogleTtsProvider {
    pub fn new(config: &GoogleTtsConfig, sample_rate: u32, timeout: Duration) -> PodcastResult<Self> {
        Ok(Self {
            api_key: require_credential(&config.api_key, ProviderKind::CloudNeural)?,
            config: config.clone(),
            sample_rate,
            client: build_http_client(timeout, true)?,
        })
    }

    /// `en-US-Wavenet-C` -> `en-US`
    fn language_code(&self, voice: &str) -> String {
        if let Some(code) = &self.config.language_code {
            return code.clone();
        }
        let parts: Vec<&str> = voice.splitn(3, '-').collect();
        if parts.len() >= 2 {
            format!("{}-{}", parts[0], parts[1])
        } else {
            "en-US".to_string()
        }
    }

    fn request_body(&self, text: &str, voice: &str) -> serde_json::Value {
        json!({
            "input": { "text": text },
            "voice": { "languageCode": self.language_code(voice), "name": voice },
            "audioConfig": {
                "audioEncoding": "LINEAR16",
                "sampleRateHertz": self.sample_rate,
                "speakingRate": self.config.speaking_rate,
            }
        })
    }

    fn decode_audio_content(body: &[u8]) -> PodcastResult<Vec<u8>> {
        let response: GoogleSynthesizeResponse = serde_json::from_slice(body).map_err(|e| {
            PodcastError::EncodingError(format!("unexpected Google TTS response: {}", e))
        })?;
        base64::engine::general_purpose::STANDARD
            .decode(response.audio_content)
            .map_err(|e| PodcastError::EncodingError(format!("invalid base64 audio: {}", e)))
    }
}

#[async_trait::async_trait]
impl SpeechProvider for GoogleTtsProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::CloudNeural
    }

    fn native_encoding(&self) -> AudioEncoding {
        // LINEAR16 responses carry a WAV header
        AudioEncoding::Wav
    }

    async fn synthesize(&self, text: &str, voice: &str) -> PodcastResult<Vec<u8>> {
        let response = self
            .client
            .post(&self.config.api_url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(text, voice))
            .send()
            .await
            .map_err(|e| request_error(self.kind(), e))?;

        let body = success_bytes(response, self.kind()).await?;
        Self::decode_audio_content(&body)
    }
}

// ============================================================================
// COMMERCIAL VOICE (ElevenLabs)
// ============================================================================

/// PCM output rates offered by ElevenLabs
const ELEVENLABS_PCM_RATES: [u32; 4] = [16_000, 22_050, 24_000, 44_100];

/// ElevenLabs text-to-speech, raw PCM output
pub struct ElevenLabsProvider {
    config: ElevenLabsConfig,
    api_key: String,
    output_rate: u32,
    client: HttpClient,
}

impl ElevenLabsProvider {
    pub fn new(config: &ElevenLabsConfig, sample_rate: u32, timeout: Duration) -> PodcastResult<Self> {
        Ok(Self {
            api_key: require_credential(&config.api_key, ProviderKind::CommercialVoice)?,
            config: config.clone(),
            output_rate: Self::closest_rate(sample_rate),
            client: build_http_client(timeout, true)?,
        })
    }

    fn closest_rate(target: u32) -> u32 {
        ELEVENLABS_PCM_RATES
            .iter()
            .copied()
            .min_by_key(|rate| rate.abs_diff(target))
            .unwrap_or(24_000)
    }

    fn endpoint(&self, voice: &str) -> String {
        format!(
            "{}/text-to-speech/{}?output_format=pcm_{}",
            self.config.api_url.trim_end_matches('/'),
            voice,
            self.output_rate
        )
    }
}

#[async_trait::async_trait]
impl SpeechProvider for ElevenLabsProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::CommercialVoice
    }

    fn native_encoding(&self) -> AudioEncoding {
        AudioEncoding::RawPcm16 {
            sample_rate: self.output_rate,
        }
    }

    async fn synthesize(&self, text: &str, voice: &str) -> PodcastResult<Vec<u8>> {
        let response = self
            .client
            .post(self.endpoint(voice))
            .header("xi-api-key", &self.api_key)
            .json(&json!({ "text": text, "model_id": self.config.model_id }))
            .send()
            .await
            .map_err(|e| request_error(self.kind(), e))?;

        success_bytes(response, self.kind()).await
    }
}

// ============================================================================
// REST SPEECH (OpenAI audio/speech)
// ============================================================================

/// OpenAI-compatible `audio/speech` endpoint, WAV output
pub struct OpenaiSpeechProvider {
    config: OpenaiSpeechConfig,
    api_key: String,
    client: HttpClient,
}

impl OpenaiSpeechProvider {
    pub fn new(config: &OpenaiSpeechConfig, timeout: Duration) -> PodcastResult<Self> {
        Ok(Self {
            api_key: require_credential(&config.api_key, ProviderKind::RestSpeech)?,
            config: config.clone(),
            client: build_http_client(timeout, true)?,
        })
    }

    fn request_body(&self, text: &str, voice: &str) -> serde_json::Value {
        json!({
            "model": self.config.model,
            "input": text,
            "voice": voice,
            "response_format": "wav",
        })
    }
}

#[async_trait::async_trait]
impl SpeechProvider for OpenaiSpeechProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::RestSpeech
    }

    fn native_encoding(&self) -> AudioEncoding {
        AudioEncoding::Wav
    }

    async fn synthesize(&self, text: &str, voice: &str) -> PodcastResult<Vec<u8>> {
        let response = self
            .client
            .post(format!("{}/audio/speech", self.config.api_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.request_body(text, voice))
            .send()
            .await
            .map_err(|e| request_error(self.kind(), e))?;

        success_bytes(response, self.kind()).await
    }
}

// ============================================================================
// OFFLINE LOCAL (command-line engine)
// ============================================================================

/// Local engine driven as a subprocess that writes a WAV file
pub struct LocalCommandProvider {
    config: LocalEngineConfig,
}

impl LocalCommandProvider {
    pub fn new(config: &LocalEngineConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn expand_args(&self, text: &str, voice: &str, output: &std::path::Path) -> Vec<String> {
        let output = output.to_string_lossy();
        self.config
            .args
            .iter()
            .map(|arg| {
                arg.replace("{voice}", voice)
                    .replace("{output}", &output)
                    .replace("{text}", text)
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl SpeechProvider for LocalCommandProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OfflineLocal
    }

    fn native_encoding(&self) -> AudioEncoding {
        AudioEncoding::Wav
    }

    async fn synthesize(&self, text: &str, voice: &str) -> PodcastResult<Vec<u8>> {
        let output_file = tempfile::Builder::new()
            .prefix("podcast-local-")
            .suffix(".wav")
            .tempfile()?;
        let args = self.expand_args(text, voice, output_file.path());

        ::log::debug!("[{}] Running {} for {} chars", self.kind(), self.config.program, text.len());

        let output = tokio::process::Command::new(&self.config.program)
            .args(&args)
            .output()
            .await
            .map_err(|e| PodcastError::ProviderUnavailable {
                provider: self.kind(),
                reason: format!("failed to run '{}': {}", self.config.program, e),
            })?;

        if !output.status.success() {
            return Err(PodcastError::SynthesisFailed {
                provider: self.kind(),
                status: output.status.code().unwrap_or(-1) as u16,
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(tokio::fs::read(output_file.path()).await?)
    }
}

// ============================================================================
// MOCK TTS ENGINE (for testing)
// ============================================================================

/// Deterministic tone generator
///
/// The voice handle `tone-<hz>` picks the frequency. Duration follows text
/// length at 150 words per minute, with a 0.5 s minimum.
pub struct MockTtsEngine {
    sample_rate: u32,
    fail_on_call: Option<usize>,
    calls: AtomicUsize,
    seconds_per_word: f64,
}

impl MockTtsEngine {
    pub fn new() -> Self {
        Self {
            sample_rate: 22_050,
            fail_on_call: None,
            calls: AtomicUsize::new(0),
            seconds_per_word: 60.0 / 150.0,
        }
    }

    /// Fail with `SynthesisFailed` on the k-th call (1-based)
    pub fn failing_on_call(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    /// Native output rate
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Shorter tones keep tests fast
    pub fn with_seconds_per_word(mut self, seconds: f64) -> Self {
        self.seconds_per_word = seconds;
        self
    }

    /// Number of synthesize calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn frequency(voice: &str) -> f64 {
        voice
            .strip_prefix("tone-")
            .and_then(|hz| hz.parse::<f64>().ok())
            .unwrap_or(440.0)
    }

    fn render_wav(&self, text: &str, voice: &str) -> PodcastResult<Vec<u8>> {
        let word_count = text.split_whitespace().count() as f64;
        let duration_secs = (word_count * self.seconds_per_word).max(0.5);
        let num_samples = (duration_secs * self.sample_rate as f64) as usize;
        let frequency = Self::frequency(voice);

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
            for i in 0..num_samples {
                let t = i as f64 / self.sample_rate as f64;
                let amplitude = 32767.0 * 0.3;
                let sample = amplitude * (2.0 * std::f64::consts::PI * frequency * t).sin();
                // Simple decay over the tone
                let decay = 1.0 - (i as f64 / num_samples as f64) * 0.5;
                writer.write_sample((sample * decay) as i16)?;
            }
            writer.finalize()?;
        }
        Ok(cursor.into_inner())
    }
}

impl Default for MockTtsEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SpeechProvider for MockTtsEngine {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Mock
    }

    fn native_encoding(&self) -> AudioEncoding {
        AudioEncoding::Wav
    }

    async fn synthesize(&self, text: &str, voice: &str) -> PodcastResult<Vec<u8>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_call == Some(call) {
            return Err(PodcastError::SynthesisFailed {
                provider: ProviderKind::Mock,
                status: 500,
                detail: format!("scripted failure on call {}", call),
            });
        }
        let wav = self.render_wav(text, voice)?;
        ::log::debug!("MockTtsEngine: synthesized {} chars with {}", text.len(), voice);
        Ok(wav)
    }
}

// ============================================================================
// SYNTHESIZER
// ============================================================================

/// Provider table plus conversion to the target format
#[derive(Clone)]
pub struct SpeechSynthesizer {
    providers: HashMap<ProviderKind, Arc<dyn SpeechProvider>>,
    sample_rate: u32,
}

impl SpeechSynthesizer {
    /// Empty synthesizer producing audio at `sample_rate`
    pub fn new(sample_rate: u32) -> Self {
        Self {
            providers: HashMap::new(),
            sample_rate,
        }
    }

    /// Register a provider under its own kind, replacing any previous one
    pub fn with_provider(mut self, provider: Arc<dyn SpeechProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    /// Build the provider table from configuration
    ///
    /// Providers whose credentials are missing are left out; the selected
    /// provider must be present or startup fails with `ProviderUnavailable`.
    pub fn from_config(
        config: &TtsConfig,
        selected: ProviderKind,
        sample_rate: u32,
        timeout: Duration,
    ) -> PodcastResult<Self> {
        let mut synthesizer = Self::new(sample_rate)
            .with_provider(Arc::new(LocalCommandProvider::new(&config.offline_local)))
            .with_provider(Arc::new(MockTtsEngine::new()));

        let remote: [(ProviderKind, PodcastResult<Arc<dyn SpeechProvider>>); 3] = [
            (
                ProviderKind::CloudNeural,
                GoogleTtsProvider::new(&config.cloud_neural, sample_rate, timeout)
                    .map(|p| Arc::new(p) as Arc<dyn SpeechProvider>),
            ),
            (
                ProviderKind::CommercialVoice,
                ElevenLabsProvider::new(&config.commercial_voice, sample_rate, timeout)
                    .map(|p| Arc::new(p) as Arc<dyn SpeechProvider>),
            ),
            (
                ProviderKind::RestSpeech,
                OpenaiSpeechProvider::new(&config.rest_speech, timeout)
                    .map(|p| Arc::new(p) as Arc<dyn SpeechProvider>),
            ),
        ];

        for (kind, provider) in remote {
            match provider {
                Ok(provider) => synthesizer = synthesizer.with_provider(provider),
                Err(e) if kind == selected => return Err(e),
                Err(e) => ::log::debug!("Provider {} not registered: {}", kind, e),
            }
        }

        synthesizer.require(selected)?;
        ::log::info!(
            "Speech providers ready: {} (selected {})",
            synthesizer.available().iter().map(|k| k.config_key()).collect::<Vec<_>>().join(", "),
            selected.display_name()
        );
        Ok(synthesizer)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Registered provider kinds, sorted
    pub fn available(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<_> = self.providers.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Fail with `ProviderUnavailable` unless `provider` is registered
    pub fn require(&self, provider: ProviderKind) -> PodcastResult<&Arc<dyn SpeechProvider>> {
        self.providers
            .get(&provider)
            .ok_or_else(|| PodcastError::ProviderUnavailable {
                provider,
                reason: "provider is not configured".to_string(),
            })
    }

    /// Synthesize one utterance and conform it to the target format
    pub async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        provider: ProviderKind,
    ) -> PodcastResult<PcmTrack> {
        let backend = self.require(provider)?;
        let bytes = backend.synthesize(text, voice).await?;
        let track = conform(&bytes, backend.native_encoding(), self.sample_rate)?;
        ::log::debug!(
            "[{}] {:.2}s of audio for voice {}",
            provider,
            track.duration_secs(),
            voice
        );
        Ok(track)
    }
}

/// Per-line chunk file name inside a run's chunk directory
pub fn chunk_file_name(index: usize, speaker: &str) -> PathBuf {
    let safe: String = speaker
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    PathBuf::from(format!("{:04}_{}.wav", index, safe))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_engine_conformed_to_target_rate() {
        let synthesizer = SpeechSynthesizer::new(24_000).with_provider(Arc::new(MockTtsEngine::new()));

        let track = synthesizer
            .synthesize("one two three four five", "tone-330", ProviderKind::Mock)
            .await
            .unwrap();

        assert_eq!(track.sample_rate(), 24_000);
        // 5 words at 150 wpm
        assert!((track.duration_secs() - 2.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_mock_engine_scripted_failure() {
        let engine = Arc::new(MockTtsEngine::new().failing_on_call(2));
        let synthesizer = SpeechSynthesizer::new(24_000).with_provider(engine.clone());

        assert!(synthesizer.synthesize("a", "tone-1", ProviderKind::Mock).await.is_ok());
        let err = synthesizer
            .synthesize("b", "tone-1", ProviderKind::Mock)
            .await
            .unwrap_err();
        assert!(matches!(err, PodcastError::SynthesisFailed { status: 500, .. }));
        assert_eq!(engine.calls(), 2);
    }

    #[tokio::test]
    async fn test_unregistered_provider_unavailable() {
        let synthesizer = SpeechSynthesizer::new(24_000);
        let err = synthesizer
            .synthesize("hi", "nova", ProviderKind::RestSpeech)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PodcastError::ProviderUnavailable {
                provider: ProviderKind::RestSpeech,
                ..
            }
        ));
    }

    #[test]
    fn test_selected_provider_without_credentials_is_fatal() {
        let mut config = TtsConfig::default();
        config.rest_speech.api_key = "env:MOFA_PODCAST_TEST_NO_SUCH_KEY".to_string();

        let err = SpeechSynthesizer::from_config(
            &config,
            ProviderKind::RestSpeech,
            24_000,
            Duration::from_secs(5),
        )
        .err()
        .unwrap();
        assert!(matches!(err, PodcastError::ProviderUnavailable { .. }));

        // Same config is fine when another provider is selected
        let synthesizer =
            SpeechSynthesizer::from_config(&config, ProviderKind::Mock, 24_000, Duration::from_secs(5))
                .unwrap();
        assert!(synthesizer.available().contains(&ProviderKind::OfflineLocal));
    }

    #[test]
    fn test_google_request_and_response() {
        let config = GoogleTtsConfig {
            api_key: "literal-key".to_string(),
            ..GoogleTtsConfig::default()
        };
        let provider = GoogleTtsProvider::new(&config, 24_000, Duration::from_secs(5)).unwrap();

        let body = provider.request_body("Hello", "en-GB-Wavenet-A");
        assert_eq!(body["voice"]["languageCode"], "en-GB");
        assert_eq!(body["audioConfig"]["audioEncoding"], "LINEAR16");
        assert_eq!(body["audioConfig"]["sampleRateHertz"], 24_000);

        let encoded = base64::engine::general_purpose::STANDARD.encode(b"RIFFdata");
        let response = format!(r#"{{"audioContent": "{}"}}"#, encoded);
        assert_eq!(
            GoogleTtsProvider::decode_audio_content(response.as_bytes()).unwrap(),
            b"RIFFdata"
        );
        assert!(matches!(
            GoogleTtsProvider::decode_audio_content(b"{}"),
            Err(PodcastError::EncodingError(_))
        ));
    }

    #[test]
    fn test_elevenlabs_endpoint_uses_pcm_rate() {
        let config = ElevenLabsConfig {
            api_key: "literal-key".to_string(),
            ..ElevenLabsConfig::default()
        };
        let provider = ElevenLabsProvider::new(&config, 24_000, Duration::from_secs(5)).unwrap();
        assert_eq!(
            provider.endpoint("voice123"),
            "https://api.elevenlabs.io/v1/text-to-speech/voice123?output_format=pcm_24000"
        );
        assert_eq!(ElevenLabsProvider::closest_rate(48_000), 44_100);
        assert_eq!(
            provider.native_encoding(),
            AudioEncoding::RawPcm16 { sample_rate: 24_000 }
        );
    }

    #[test]
    fn test_openai_speech_request() {
        let config = OpenaiSpeechConfig {
            api_key: "literal-key".to_string(),
            ..OpenaiSpeechConfig::default()
        };
        let provider = OpenaiSpeechProvider::new(&config, Duration::from_secs(5)).unwrap();
        let body = provider.request_body("Hi", "nova");
        assert_eq!(body["model"], "gpt-4o-mini-tts");
        assert_eq!(body["voice"], "nova");
        assert_eq!(body["response_format"], "wav");
    }

    #[test]
    fn test_local_args_expand_placeholders() {
        let provider = LocalCommandProvider::new(&LocalEngineConfig::default());
        let args = provider.expand_args("Hello there", "en-us+f3", std::path::Path::new("/tmp/x.wav"));
        assert_eq!(args, vec!["-v", "en-us+f3", "-w", "/tmp/x.wav", "Hello there"]);
    }

    #[tokio::test]
    async fn test_missing_local_program_is_unavailable() {
        let provider = LocalCommandProvider::new(&LocalEngineConfig {
            program: "mofa-podcast-no-such-engine".to_string(),
            ..LocalEngineConfig::default()
        });
        let err = provider.synthesize("hi", "en").await.unwrap_err();
        assert!(matches!(err, PodcastError::ProviderUnavailable { .. }));
    }

    #[test]
    fn test_chunk_file_name() {
        assert_eq!(chunk_file_name(7, "Dr. Who"), PathBuf::from("0007_Dr__Who.wav"));
    }
}
