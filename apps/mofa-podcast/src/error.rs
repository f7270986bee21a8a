//! Error taxonomy for a podcast generation run
//!
//! Every failure belongs to one pipeline stage so the host can tell the user
//! *where* a run broke (extraction, manuscript, synthesis, assembly) as well as why.

use std::fmt;

use crate::voice_registry::ProviderKind;

/// Pipeline stage an error originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Configuration,
    Extraction,
    Manuscript,
    Synthesis,
    Assembly,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Configuration => "configuration",
            Stage::Extraction => "extraction",
            Stage::Manuscript => "manuscript",
            Stage::Synthesis => "synthesis",
            Stage::Assembly => "assembly",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while producing a podcast
#[derive(Debug, thiserror::Error)]
pub enum PodcastError {
    #[error("invalid source: {0}")]
    InvalidSource(String),

    #[error("source not found: {0}")]
    SourceNotFound(String),

    #[error("invalid source URL: {0}")]
    InvalidSourceUrl(String),

    #[error("source text is empty")]
    EmptySource,

    #[error("manuscript generation failed: {0}")]
    ManuscriptGenerationFailed(String),

    #[error("unknown speaker '{0}' in manuscript")]
    UnknownSpeaker(String),

    #[error("manuscript contains no dialogue lines")]
    EmptyManuscript,

    #[error("no voice bound to speaker '{identity}' for provider {provider}")]
    NoVoiceBinding {
        identity: String,
        provider: ProviderKind,
    },

    #[error("TTS provider {provider} unavailable: {reason}")]
    ProviderUnavailable {
        provider: ProviderKind,
        reason: String,
    },

    #[error("{provider} synthesis failed (status {status}): {detail}")]
    SynthesisFailed {
        provider: ProviderKind,
        status: u16,
        detail: String,
    },

    #[error("audio encoding error: {0}")]
    EncodingError(String),

    #[error("assembly failed: {0}")]
    AssemblyFailed(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("a podcast run is already in progress")]
    AlreadyRunning,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PodcastError {
    /// Stage of the pipeline this error belongs to
    pub fn stage(&self) -> Stage {
        match self {
            PodcastError::InvalidSource(_)
            | PodcastError::SourceNotFound(_)
            | PodcastError::InvalidSourceUrl(_)
            | PodcastError::EmptySource => Stage::Extraction,
            PodcastError::ManuscriptGenerationFailed(_)
            | PodcastError::UnknownSpeaker(_)
            | PodcastError::EmptyManuscript => Stage::Manuscript,
            PodcastError::NoVoiceBinding { .. }
            | PodcastError::SynthesisFailed { .. }
            | PodcastError::EncodingError(_) => Stage::Synthesis,
            PodcastError::AssemblyFailed(_) | PodcastError::Io(_) => Stage::Assembly,
            PodcastError::ProviderUnavailable { .. }
            | PodcastError::InvalidRequest(_)
            | PodcastError::AlreadyRunning
            | PodcastError::Config(_) => Stage::Configuration,
        }
    }

    /// Human readable message naming the failing stage and the cause
    pub fn user_message(&self) -> String {
        format!("{} failed: {}", self.stage(), self)
    }
}

impl From<figment::Error> for PodcastError {
    fn from(e: figment::Error) -> Self {
        PodcastError::Config(e.to_string())
    }
}

impl From<hound::Error> for PodcastError {
    fn from(e: hound::Error) -> Self {
        PodcastError::EncodingError(e.to_string())
    }
}

/// Result alias used across the crate
pub type PodcastResult<T> = Result<T, PodcastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_names_stage() {
        let err = PodcastError::SynthesisFailed {
            provider: ProviderKind::RestSpeech,
            status: 429,
            detail: "rate limited".to_string(),
        };
        let msg = err.user_message();
        assert!(msg.starts_with("synthesis failed:"));
        assert!(msg.contains("429"));

        assert_eq!(PodcastError::EmptySource.stage(), Stage::Extraction);
        assert_eq!(PodcastError::EmptyManuscript.stage(), Stage::Manuscript);
        assert_eq!(
            PodcastError::AssemblyFailed("x".into()).stage(),
            Stage::Assembly
        );
    }
}
