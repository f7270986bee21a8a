//! Podcast pipeline - one run from source document to audio file
//!
//! ```text
//! source ─► extraction ─► manuscript ─► synthesis/assembly ─► music ─► export
//! ```
//!
//! [`PodcastPipeline`] executes a run on the caller's task. [`PodcastWorker`]
//! moves a run onto its own thread with a private tokio runtime and reports
//! back through a crossbeam event channel, so a host never blocks on it.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::audio_mixer::{unique_output_path, AudioMetadata, AudioMixer, MixerConfig};
use crate::background_music::{BackgroundMixer, CatalogTrack, JamendoCatalog, MusicCatalog};
use crate::config::PodcastConfig;
use crate::error::{PodcastError, PodcastResult, Stage};
use crate::llm_client::{create_text_generator, TextGenerator};
use crate::manuscript::{LengthPreference, ManuscriptGenerator};
use crate::source::{source_stem, DefaultSourceFetcher, SourceFetcher, SourceType};
use crate::transcript_parser::{Manuscript, UnknownSpeakerPolicy};
use crate::tts_batch::{
    remove_chunk_dir, AssembledTrack, AssemblerConfig, AssemblyOutcome, AudioAssembler, ProgressCallback,
    TtsProgress,
};
use crate::tts_engine::SpeechSynthesizer;
use crate::voice_registry::{Identity, ProviderKind, VoiceRegistry};

// ============================================================================
// DATA MODELS
// ============================================================================

/// Where the dialogue for a run comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManuscriptSource {
    /// Generate it from the source text
    Generate,
    /// Re-ingest a reviewed manuscript file
    Review(PathBuf),
}

/// One podcast generation request
#[derive(Debug, Clone)]
pub struct PodcastRequest {
    pub source: String,
    pub source_type: SourceType,
    /// Cast, in order; at least two distinct identities
    pub speakers: Vec<Identity>,
    pub length: LengthPreference,
    /// Provider override, else the configured default
    pub provider: Option<ProviderKind>,
    /// Lay catalog music under the podcast (when enabled in config)
    pub background_music: bool,
    pub manuscript: ManuscriptSource,
}

impl PodcastRequest {
    pub fn new(source: impl Into<String>, source_type: SourceType, speakers: Vec<Identity>) -> Self {
        Self {
            source: source.into(),
            source_type,
            speakers,
            length: LengthPreference::Medium,
            provider: None,
            background_music: false,
            manuscript: ManuscriptSource::Generate,
        }
    }

    pub fn with_length(mut self, length: LengthPreference) -> Self {
        self.length = length;
        self
    }

    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_background_music(mut self, enabled: bool) -> Self {
        self.background_music = enabled;
        self
    }

    pub fn with_manuscript(mut self, manuscript: ManuscriptSource) -> Self {
        self.manuscript = manuscript;
        self
    }
}

/// How a run ended when it did not fail
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed {
        path: PathBuf,
        duration_secs: f64,
        segment_count: usize,
        file_size_bytes: u64,
        music: Option<CatalogTrack>,
    },
    /// Stopped on request; nothing was written
    Stopped { completed: usize, total: usize },
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Runs the full source-to-podcast flow
pub struct PodcastPipeline {
    config: PodcastConfig,
    registry: Arc<VoiceRegistry>,
    fetcher: Arc<dyn SourceFetcher>,
    generator: ManuscriptGenerator,
    synthesizer: SpeechSynthesizer,
    music: Option<Arc<dyn MusicCatalog>>,
    /// Canonical remap target for unknown labels
    default_speaker: Option<Identity>,
}

impl PodcastPipeline {
    /// Assemble a pipeline from explicit collaborators
    pub fn new(
        config: PodcastConfig,
        registry: Arc<VoiceRegistry>,
        fetcher: Arc<dyn SourceFetcher>,
        text_backend: Arc<dyn TextGenerator>,
        synthesizer: SpeechSynthesizer,
        music: Option<Arc<dyn MusicCatalog>>,
    ) -> PodcastResult<Self> {
        let default_speaker = match config.manuscript.default_speaker.as_deref() {
            Some(name) => Some(registry.canonical(name).cloned().ok_or_else(|| {
                PodcastError::Config(format!(
                    "manuscript.default_speaker '{}' has no voice configuration",
                    name
                ))
            })?),
            None => None,
        };
        let generator = ManuscriptGenerator::new(text_backend)
            .with_word_policy(config.manuscript.word_target_policy)
            .with_unknown_speaker_policy(config.manuscript.unknown_speaker_policy)
            .with_default_speaker(default_speaker.clone());

        Ok(Self {
            config,
            registry,
            fetcher,
            generator,
            synthesizer,
            music,
            default_speaker,
        })
    }

    /// Build every collaborator from configuration
    ///
    /// Missing credentials for the text backend or the selected speech
    /// provider fail here, before any work starts. A missing music catalog
    /// only disables background music.
    pub fn from_config(config: PodcastConfig) -> PodcastResult<Self> {
        config.validate()?;
        let timeout = Duration::from_secs(config.request_timeout_secs);

        let registry = Arc::new(VoiceRegistry::from_table(&config.voices)?);
        let text_backend = create_text_generator(&config.text_generation, timeout)?;
        let synthesizer =
            SpeechSynthesizer::from_config(&config.tts, config.tts.provider, config.sample_rate, timeout)?;
        let fetcher = Arc::new(DefaultSourceFetcher::new(timeout)?.with_transcript_dir(&config.output_dir));

        let music: Option<Arc<dyn MusicCatalog>> = if config.background_music.enabled {
            match JamendoCatalog::new(&config.background_music, timeout) {
                Ok(catalog) => Some(Arc::new(catalog)),
                Err(e) => {
                    ::log::warn!("Background music disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Self::new(config, registry, fetcher, text_backend, synthesizer, music)
    }

    pub fn config(&self) -> &PodcastConfig {
        &self.config
    }

    pub fn registry(&self) -> &VoiceRegistry {
        &self.registry
    }

    /// Generate a manuscript and write it to the review file
    pub async fn draft_manuscript(&self, request: &PodcastRequest) -> PodcastResult<(Manuscript, PathBuf)> {
        let speakers = self.resolve_cast(&request.speakers)?;
        let manuscript = self.generate_manuscript(request, &speakers).await?;
        let path = self.config.review_path();
        manuscript.save_for_review(&path)?;
        Ok((manuscript, path))
    }

    /// Execute one run
    ///
    /// On failure or stop no output file exists and the run's chunks are gone.
    pub async fn generate_podcast(
        &self,
        request: &PodcastRequest,
        cancel: &CancellationToken,
        progress: ProgressCallback<'_>,
    ) -> PodcastResult<RunOutcome> {
        let provider = request.provider.unwrap_or(self.config.tts.provider);
        let speakers = self.resolve_cast(&request.speakers)?;
        self.synthesizer.require(provider)?;
        self.registry.check_cast(&self.voiced_identities(&speakers), provider)?;

        let manuscript = match &request.manuscript {
            ManuscriptSource::Generate => self.generate_manuscript(request, &speakers).await?,
            ManuscriptSource::Review(path) => {
                ::log::info!("Using reviewed manuscript {}", path.display());
                self.generator.parser_for(&speakers).parse_file(path)?
            }
        };

        if cancel.is_cancelled() {
            ::log::info!("Stop requested before synthesis");
            return Ok(RunOutcome::Stopped {
                completed: 0,
                total: manuscript.len(),
            });
        }

        let chunk_dir = self.config.work_dir.join(uuid::Uuid::new_v4().to_string());
        let assembler_config = AssemblerConfig {
            chunk_dir,
            keep_chunks: self.config.keep_chunks,
            provider,
        };
        let mut assembler = AudioAssembler::new(self.registry.clone(), self.synthesizer.clone());

        let assembled = match assembler.run(&manuscript, &assembler_config, cancel, progress).await? {
            AssemblyOutcome::Completed(assembled) => assembled,
            AssemblyOutcome::Stopped { completed, total } => {
                ::log::info!("Podcast generation stopped. No final file will be created.");
                return Ok(RunOutcome::Stopped { completed, total });
            }
        };

        let outcome = self.finish(request, &speakers, assembled, cancel).await;
        // Retained chunks belong to completed runs only
        if !matches!(outcome, Ok(RunOutcome::Completed { .. })) {
            remove_chunk_dir(&assembler_config.chunk_dir);
        }
        outcome
    }

    /// Mix and export an assembled track
    ///
    /// A stop request that arrives here still discards the run.
    async fn finish(
        &self,
        request: &PodcastRequest,
        speakers: &[Identity],
        assembled: AssembledTrack,
        cancel: &CancellationToken,
    ) -> PodcastResult<RunOutcome> {
        let segment_count = assembled.segments.len();
        let stopped = || -> PodcastResult<RunOutcome> {
            ::log::info!("Podcast generation stopped. No final file will be created.");
            Ok(RunOutcome::Stopped {
                completed: segment_count,
                total: segment_count,
            })
        };
        if cancel.is_cancelled() {
            return stopped();
        }

        let (track, music) = match self.music_mixer(request) {
            Some(mixer) => {
                let mixed = mixer
                    .mix(
                        assembled.track,
                        &self.config.background_music.tags,
                        self.config.background_music.gain_reduction_db,
                    )
                    .await;
                (mixed.track, mixed.music)
            }
            None => (assembled.track, None),
        };
        if cancel.is_cancelled() {
            return stopped();
        }

        let stem = format!(
            "{}_{}Speakers",
            source_stem(&request.source, request.source_type),
            speakers.len()
        );
        let mixer = AudioMixer::new(MixerConfig {
            export_format: self.config.export_format,
            mp3_bitrate: self.config.mp3_bitrate,
            metadata: AudioMetadata {
                title: Some(stem.clone()),
                artist: Some(
                    speakers
                        .iter()
                        .map(Identity::as_str)
                        .collect::<Vec<_>>()
                        .join(", "),
                ),
                album: Some("MoFA Podcast".to_string()),
                date: Some(chrono::Local::now().format("%Y-%m-%d").to_string()),
                comment: Some(format!("Generated from {}", request.source)),
            },
        });

        let path = unique_output_path(
            &self.config.output_dir,
            &stem,
            self.config.export_format.extension(),
        );
        let result = mixer.export(&track, &path)?;

        ::log::info!(
            "Final podcast saved: {} (encoded in {} ms)",
            result.output_file.display(),
            result.duration_ms
        );
        Ok(RunOutcome::Completed {
            path: result.output_file,
            duration_secs: result.total_duration_secs,
            segment_count,
            file_size_bytes: result.file_size_bytes,
            music,
        })
    }

    async fn generate_manuscript(
        &self,
        request: &PodcastRequest,
        speakers: &[Identity],
    ) -> PodcastResult<Manuscript> {
        let source_text = self
            .fetcher
            .fetch_source_text(&request.source, request.source_type)
            .await?;
        ::log::info!(
            "Source text: {} words from {}",
            source_text.split_whitespace().count(),
            request.source_type
        );
        self.generator.generate(&source_text, speakers, request.length).await
    }

    /// Canonical, distinct cast members known to the registry
    fn resolve_cast(&self, requested: &[Identity]) -> PodcastResult<Vec<Identity>> {
        let mut cast: Vec<Identity> = Vec::with_capacity(requested.len());
        for name in requested {
            let identity = self.registry.canonical(name.as_str()).ok_or_else(|| {
                PodcastError::InvalidRequest(format!("speaker '{}' has no voice configuration", name))
            })?;
            if !cast.contains(identity) {
                cast.push(identity.clone());
            }
        }
        if cast.len() < 2 {
            return Err(PodcastError::InvalidRequest(
                "at least two distinct speakers are required".to_string(),
            ));
        }
        Ok(cast)
    }

    /// Every identity a line may be spoken by: the cast, plus the remap target
    fn voiced_identities(&self, speakers: &[Identity]) -> Vec<Identity> {
        let mut voiced = speakers.to_vec();
        if self.config.manuscript.unknown_speaker_policy == UnknownSpeakerPolicy::RemapDefault {
            if let Some(default) = &self.default_speaker {
                if !voiced.contains(default) {
                    voiced.push(default.clone());
                }
            }
        }
        voiced
    }

    fn music_mixer(&self, request: &PodcastRequest) -> Option<BackgroundMixer> {
        if !request.background_music || !self.config.background_music.enabled {
            return None;
        }
        match &self.music {
            Some(catalog) => Some(BackgroundMixer::new(catalog.clone())),
            None => {
                ::log::warn!("Background music requested but no catalog is configured");
                None
            }
        }
    }
}

// ============================================================================
// WORKER
// ============================================================================

/// Events sent from the worker thread to the host
#[derive(Debug, Clone)]
pub enum PodcastEvent {
    Started { source: String },
    Progress {
        completed: usize,
        total: usize,
        speaker: String,
    },
    Stopped { completed: usize, total: usize },
    Finished { path: PathBuf, duration_secs: f64 },
    Failed { stage: Stage, message: String },
}

/// State shared between the host and the worker thread
#[derive(Debug, Default)]
pub struct WorkerState {
    pub running: bool,
    pub completed: usize,
    pub total: usize,
    pub last_output: Option<PathBuf>,
}

/// Clonable handle requesting cooperative cancellation of the active run
#[derive(Clone, Default)]
pub struct StopHandle {
    token: Arc<Mutex<Option<CancellationToken>>>,
}

impl StopHandle {
    /// Returns false when no run is active
    pub fn stop(&self) -> bool {
        match self.token.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// Runs one pipeline at a time on a dedicated thread
pub struct PodcastWorker {
    pipeline: Arc<PodcastPipeline>,
    state: Arc<RwLock<WorkerState>>,
    event_tx: Sender<PodcastEvent>,
    event_rx: Receiver<PodcastEvent>,
    stop: StopHandle,
    worker_handle: Option<thread::JoinHandle<PodcastResult<RunOutcome>>>,
}

impl PodcastWorker {
    pub fn new(pipeline: Arc<PodcastPipeline>) -> Self {
        let (event_tx, event_rx) = unbounded();
        Self {
            pipeline,
            state: Arc::new(RwLock::new(WorkerState::default())),
            event_tx,
            event_rx,
            stop: StopHandle::default(),
            worker_handle: None,
        }
    }

    /// Get shared state
    pub fn state(&self) -> Arc<RwLock<WorkerState>> {
        self.state.clone()
    }

    pub fn is_running(&self) -> bool {
        self.state.read().running
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Request cancellation of the active run
    pub fn stop(&self) -> bool {
        self.stop.stop()
    }

    /// Start a run; refuses while another run is active
    pub fn start(&mut self, request: PodcastRequest) -> PodcastResult<()> {
        {
            let mut state = self.state.write();
            if state.running {
                return Err(PodcastError::AlreadyRunning);
            }
            state.running = true;
            state.completed = 0;
            state.total = 0;
        }
        // A finished previous run may still hold its handle
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }

        let cancel = CancellationToken::new();
        *self.stop.token.lock() = Some(cancel.clone());

        let pipeline = self.pipeline.clone();
        let state = self.state.clone();
        let event_tx = self.event_tx.clone();
        let stop = self.stop.clone();

        let spawned = thread::Builder::new()
            .name("podcast-worker".to_string())
            .spawn(move || {
                let outcome = Self::worker_thread(&pipeline, request, &cancel, &state, &event_tx);
                *stop.token.lock() = None;
                state.write().running = false;
                outcome
            });

        match spawned {
            Ok(handle) => {
                self.worker_handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.state.write().running = false;
                *self.stop.token.lock() = None;
                Err(PodcastError::Io(e))
            }
        }
    }

    /// Poll for events from the worker thread
    pub fn poll_events(&self) -> Vec<PodcastEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Receiver for hosts that prefer blocking on events
    pub fn events(&self) -> Receiver<PodcastEvent> {
        self.event_rx.clone()
    }

    /// Wait for the current run; `None` when nothing was started
    pub fn join(&mut self) -> Option<PodcastResult<RunOutcome>> {
        let handle = self.worker_handle.take()?;
        Some(handle.join().unwrap_or_else(|_| {
            Err(PodcastError::AssemblyFailed("worker thread panicked".to_string()))
        }))
    }

    fn worker_thread(
        pipeline: &PodcastPipeline,
        request: PodcastRequest,
        cancel: &CancellationToken,
        state: &RwLock<WorkerState>,
        event_tx: &Sender<PodcastEvent>,
    ) -> PodcastResult<RunOutcome> {
        let _ = event_tx.send(PodcastEvent::Started {
            source: request.source.clone(),
        });

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let progress = |p: &TtsProgress| {
            ::log::info!("[{}/{}] {} ({:.0}%)", p.completed, p.total, p.speaker, p.percentage());
            {
                let mut state = state.write();
                state.completed = p.completed;
                state.total = p.total;
            }
            let _ = event_tx.send(PodcastEvent::Progress {
                completed: p.completed,
                total: p.total,
                speaker: p.speaker.to_string(),
            });
        };

        let outcome = runtime.block_on(pipeline.generate_podcast(&request, cancel, &progress));

        let event = match &outcome {
            Ok(RunOutcome::Completed { path, duration_secs, .. }) => {
                state.write().last_output = Some(path.clone());
                PodcastEvent::Finished {
                    path: path.clone(),
                    duration_secs: *duration_secs,
                }
            }
            Ok(RunOutcome::Stopped { completed, total }) => PodcastEvent::Stopped {
                completed: *completed,
                total: *total,
            },
            Err(e) => {
                ::log::error!("{}", e.user_message());
                PodcastEvent::Failed {
                    stage: e.stage(),
                    message: e.user_message(),
                }
            }
        };
        let _ = event_tx.send(event);
        outcome
    }
}

impl Drop for PodcastWorker {
    fn drop(&mut self) {
        self.stop.stop();
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
