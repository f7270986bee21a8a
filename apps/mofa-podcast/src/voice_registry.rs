//! Voice Registry - speaker identities and their per-provider voices
//!
//! The binding table is static configuration loaded once at startup. During a
//! run it is only read, so a single registry can be shared between runs.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::error::{PodcastError, PodcastResult};

// ============================================================================
// DATA MODELS
// ============================================================================

/// Speech synthesis backend variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Cloud neural TTS (Google Cloud Text-to-Speech)
    CloudNeural,
    /// Commercial voice API (ElevenLabs)
    CommercialVoice,
    /// Local offline engine (espeak-ng or another command-line engine)
    OfflineLocal,
    /// REST speech endpoint (OpenAI audio/speech)
    RestSpeech,
    /// Deterministic tone generator for tests and dry runs
    Mock,
}

impl ProviderKind {
    /// All provider variants, in display order
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::CloudNeural,
        ProviderKind::CommercialVoice,
        ProviderKind::OfflineLocal,
        ProviderKind::RestSpeech,
        ProviderKind::Mock,
    ];

    /// Key used in configuration files
    pub fn config_key(&self) -> &'static str {
        match self {
            ProviderKind::CloudNeural => "cloud_neural",
            ProviderKind::CommercialVoice => "commercial_voice",
            ProviderKind::OfflineLocal => "offline_local",
            ProviderKind::RestSpeech => "rest_speech",
            ProviderKind::Mock => "mock",
        }
    }

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::CloudNeural => "Google Cloud TTS",
            ProviderKind::CommercialVoice => "ElevenLabs",
            ProviderKind::OfflineLocal => "Local engine",
            ProviderKind::RestSpeech => "OpenAI speech",
            ProviderKind::Mock => "Mock tone",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

impl FromStr for ProviderKind {
    type Err = PodcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cloud_neural" | "google" => Ok(ProviderKind::CloudNeural),
            "commercial_voice" | "elevenlabs" => Ok(ProviderKind::CommercialVoice),
            "offline_local" | "local" | "espeak" => Ok(ProviderKind::OfflineLocal),
            "rest_speech" | "openai" => Ok(ProviderKind::RestSpeech),
            "mock" => Ok(ProviderKind::Mock),
            other => Err(PodcastError::Config(format!("unknown TTS provider '{}'", other))),
        }
    }
}

/// Named speaker role
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// identity -> provider key -> voice handle
pub type VoiceTable = BTreeMap<String, BTreeMap<String, String>>;

/// Built-in voice bindings for the default cast
pub fn default_voice_table() -> VoiceTable {
    let rows: [(&str, [(&str, &str); 5]); 4] = [
        (
            "Bonnie",
            [
                ("cloud_neural", "en-US-Wavenet-C"),
                ("commercial_voice", "lxYfHSkYm1EzQzGhdbfc"),
                ("offline_local", "en-us+f3"),
                ("rest_speech", "nova"),
                ("mock", "tone-330"),
            ],
        ),
        (
            "Clyde",
            [
                ("cloud_neural", "en-US-Wavenet-D"),
                ("commercial_voice", "pVnrL6sighQX7hVz89cp"),
                ("offline_local", "en-us+m3"),
                ("rest_speech", "fable"),
                ("mock", "tone-220"),
            ],
        ),
        (
            "Alice",
            [
                ("cloud_neural", "en-US-Wavenet-F"),
                ("commercial_voice", "aEO01A4wXwd1O8GPgGlF"),
                ("offline_local", "en-gb+f2"),
                ("rest_speech", "shimmer"),
                ("mock", "tone-440"),
            ],
        ),
        (
            "Bob",
            [
                ("cloud_neural", "en-US-Wavenet-B"),
                ("commercial_voice", "UgBBYS2sOqTuMpoF3BR0"),
                ("offline_local", "en-us+m1"),
                ("rest_speech", "onyx"),
                ("mock", "tone-180"),
            ],
        ),
    ];

    rows.iter()
        .map(|(identity, voices)| {
            let voices = voices
                .iter()
                .map(|(provider, handle)| (provider.to_string(), handle.to_string()))
                .collect();
            (identity.to_string(), voices)
        })
        .collect()
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Read-only mapping of (identity, provider) to a provider voice handle
#[derive(Debug, Clone)]
pub struct VoiceRegistry {
    identities: Vec<Identity>,
    bindings: HashMap<(Identity, ProviderKind), String>,
}

impl VoiceRegistry {
    /// Build the registry from a configuration table
    pub fn from_table(table: &VoiceTable) -> PodcastResult<Self> {
        let mut identities = Vec::with_capacity(table.len());
        let mut bindings = HashMap::new();

        for (name, voices) in table {
            let identity = Identity::new(name.trim());
            if identity.as_str().is_empty() {
                return Err(PodcastError::Config("voice table contains an empty identity".into()));
            }
            for (provider_key, handle) in voices {
                let provider: ProviderKind = provider_key.parse()?;
                bindings.insert((identity.clone(), provider), handle.clone());
            }
            identities.push(identity);
        }

        ::log::debug!(
            "Voice registry loaded: {} identities, {} bindings",
            identities.len(),
            bindings.len()
        );

        Ok(Self { identities, bindings })
    }

    /// Registry with the built-in cast
    pub fn builtin() -> Self {
        // The built-in table only uses known provider keys
        Self::from_table(&default_voice_table()).unwrap_or_else(|_| Self {
            identities: Vec::new(),
            bindings: HashMap::new(),
        })
    }

    /// Resolve the voice handle for a speaker on a provider
    pub fn resolve(&self, identity: &Identity, provider: ProviderKind) -> PodcastResult<&str> {
        self.bindings
            .get(&(identity.clone(), provider))
            .map(String::as_str)
            .ok_or_else(|| PodcastError::NoVoiceBinding {
                identity: identity.to_string(),
                provider,
            })
    }

    /// All configured identities
    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    /// Case-insensitive lookup returning the canonical identity
    pub fn canonical(&self, name: &str) -> Option<&Identity> {
        self.identities
            .iter()
            .find(|i| i.as_str().eq_ignore_ascii_case(name.trim()))
    }

    /// Check that every speaker has a voice on the given provider
    pub fn check_cast(&self, speakers: &[Identity], provider: ProviderKind) -> PodcastResult<()> {
        for speaker in speakers {
            self.resolve(speaker, provider)?;
        }
        Ok(())
    }
}

impl Default for VoiceRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

// ============================================================================
// TESTS
// ============================================================================
