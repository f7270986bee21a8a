//! MoFA Podcast - Turn source documents into multi-voice podcast audio
//!
//! This crate provides:
//! - Source extraction from encyclopedia articles, PDFs, text files and video transcripts
//! - LLM manuscript generation with a two-prompt fallback (Gemini or OpenAI-compatible)
//! - Dialogue parsing with configurable handling of unknown speakers
//! - Multi-provider TTS synthesis with per-identity voice bindings
//! - Optional background music from the Jamendo catalog, looped and attenuated under speech
//! - WAV and MP3 export with ID3 metadata
//!
//! The [`PodcastPipeline`] runs one request end to end. [`PodcastWorker`] runs it on a
//! background thread and reports progress through [`PodcastEvent`]s.

pub mod audio_mixer;
pub mod background_music;
pub mod config;
pub mod error;
pub mod llm_client;
pub mod manuscript;
pub mod pipeline;
pub mod source;
pub mod transcript_parser;
pub mod tts_batch;
pub mod tts_engine;
pub mod voice_registry;

pub use error::{PodcastError, PodcastResult, Stage};

pub use config::PodcastConfig;

// Re-export pipeline types
pub use pipeline::{
    ManuscriptSource, PodcastEvent, PodcastPipeline, PodcastRequest, PodcastWorker, RunOutcome,
    StopHandle, WorkerState,
};

// Re-export source and manuscript types
pub use llm_client::{create_text_generator, TextGenerator};
pub use manuscript::{LengthPreference, ManuscriptGenerator, PromptTemplate, WordTargetPolicy};
pub use source::{DefaultSourceFetcher, SourceFetcher, SourceType};
pub use transcript_parser::{DialogueParser, Manuscript, UnknownSpeakerPolicy, Utterance};

// Re-export voice and TTS types
pub use tts_batch::{
    AssembledTrack, AssemblerConfig, AssemblerState, AssemblyOutcome, AudioAssembler,
    AudioSegment, TtsProgress,
};
pub use tts_engine::{MockTtsEngine, SpeechProvider, SpeechSynthesizer};
pub use voice_registry::{Identity, ProviderKind, VoiceRegistry};

// Re-export audio types
pub use audio_mixer::{
    AudioMetadata, AudioMixer, ExportFormat, MixerConfig, MixerResult, Mp3Bitrate, PcmTrack,
};
pub use background_music::{BackgroundMixer, JamendoCatalog, MusicCatalog};
