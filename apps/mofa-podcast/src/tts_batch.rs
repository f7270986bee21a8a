//! Audio Assembler - synthesize a manuscript line by line into one track
//!
//! State machine: `Idle -> Running -> {Completed | Stopped | Failed}`.
//!
//! Lines are synthesized strictly in manuscript order, one call at a time.
//! Each conformed line is written to the run's chunk directory and the chunks
//! are concatenated once every line succeeded. The first failing line aborts
//! the run; cancellation is checked before each line and once more before
//! concatenation, and never interrupts a call in flight. Failed and stopped
//! runs leave no chunks behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::audio_mixer::{concat_tracks, read_wav_file, write_wav_file, PcmTrack};
use crate::error::{PodcastError, PodcastResult};
use crate::transcript_parser::Manuscript;
use crate::tts_engine::{chunk_file_name, SpeechSynthesizer};
use crate::voice_registry::{Identity, ProviderKind, VoiceRegistry};

// ============================================================================
// DATA MODELS
// ============================================================================

/// Assembler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    Idle,
    Running,
    Completed,
    Stopped,
    Failed,
}

/// One synthesized line on disk
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    /// Position in the manuscript
    pub index: usize,
    pub speaker: Identity,
    /// Chunk file (mono PCM16 WAV at the target rate)
    pub path: PathBuf,
    pub duration_secs: f64,
}

/// Progress update, sent after each completed line
#[derive(Debug, Clone)]
pub struct TtsProgress {
    /// Lines synthesized so far
    pub completed: usize,
    /// Lines in the manuscript
    pub total: usize,
    /// Speaker of the line just completed
    pub speaker: Identity,
    /// Start of the line just completed
    pub text_preview: String,
}

impl TtsProgress {
    /// Percentage complete (0-100)
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.completed as f64 / self.total as f64 * 100.0
    }
}

/// Progress callback type
pub type ProgressCallback<'a> = &'a (dyn Fn(&TtsProgress) + Send + Sync);

/// Per-run assembly settings
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Directory owned exclusively by this run
    pub chunk_dir: PathBuf,
    /// Keep chunk files after a successful run
    pub keep_chunks: bool,
    pub provider: ProviderKind,
}

/// Successfully assembled audio
#[derive(Debug, Clone)]
pub struct AssembledTrack {
    pub track: PcmTrack,
    pub segments: Vec<AudioSegment>,
}

/// How an assembler run ended when it did not fail
#[derive(Debug, Clone)]
pub enum AssemblyOutcome {
    Completed(AssembledTrack),
    Stopped { completed: usize, total: usize },
}

// ============================================================================
// ASSEMBLER
// ============================================================================

/// Sequential synthesizer for one run
pub struct AudioAssembler {
    registry: Arc<VoiceRegistry>,
    synthesizer: SpeechSynthesizer,
    state: AssemblerState,
}

impl AudioAssembler {
    pub fn new(registry: Arc<VoiceRegistry>, synthesizer: SpeechSynthesizer) -> Self {
        Self {
            registry,
            synthesizer,
            state: AssemblerState::Idle,
        }
    }

    pub fn state(&self) -> AssemblerState {
        self.state
    }

    /// Synthesize every line of `manuscript` and concatenate the result
    pub async fn run(
        &mut self,
        manuscript: &Manuscript,
        config: &AssemblerConfig,
        cancel: &CancellationToken,
        progress: ProgressCallback<'_>,
    ) -> PodcastResult<AssemblyOutcome> {
        if self.state == AssemblerState::Running {
            return Err(PodcastError::AlreadyRunning);
        }
        self.state = AssemblerState::Running;

        let result = self.run_lines(manuscript, config, cancel, progress).await;

        let keep = config.keep_chunks && matches!(result, Ok(AssemblyOutcome::Completed(_)));
        if !keep {
            remove_chunk_dir(&config.chunk_dir);
        }

        self.state = match &result {
            Ok(AssemblyOutcome::Completed(_)) => AssemblerState::Completed,
            Ok(AssemblyOutcome::Stopped { .. }) => AssemblerState::Stopped,
            Err(_) => AssemblerState::Failed,
        };
        result
    }

    async fn run_lines(
        &self,
        manuscript: &Manuscript,
        config: &AssemblerConfig,
        cancel: &CancellationToken,
        progress: ProgressCallback<'_>,
    ) -> PodcastResult<AssemblyOutcome> {
        let total = manuscript.len();
        std::fs::create_dir_all(&config.chunk_dir).map_err(|e| PodcastError::SynthesisFailed {
            provider: config.provider,
            status: 0,
            detail: format!("cannot create chunk directory {}: {}", config.chunk_dir.display(), e),
        })?;

        ::log::info!(
            "Synthesizing {} lines with {} into {}",
            total,
            config.provider.display_name(),
            config.chunk_dir.display()
        );

        let mut segments: Vec<AudioSegment> = Vec::with_capacity(total);

        for utterance in manuscript.utterances() {
            if cancel.is_cancelled() {
                ::log::info!("Stop requested after {}/{} lines", segments.len(), total);
                return Ok(AssemblyOutcome::Stopped {
                    completed: segments.len(),
                    total,
                });
            }

            let voice = self.registry.resolve(&utterance.speaker, config.provider)?;
            let track = self
                .synthesizer
                .synthesize(&utterance.text, voice, config.provider)
                .await?;

            let path = config
                .chunk_dir
                .join(chunk_file_name(utterance.sequence_index, utterance.speaker.as_str()));
            write_wav_file(&path, &track)?;

            segments.push(AudioSegment {
                index: utterance.sequence_index,
                speaker: utterance.speaker.clone(),
                path,
                duration_secs: track.duration_secs(),
            });

            progress(&TtsProgress {
                completed: segments.len(),
                total,
                speaker: utterance.speaker.clone(),
                text_preview: truncate_text(&utterance.text, 50),
            });
        }

        // A stop after the last line still discards the run
        if cancel.is_cancelled() {
            ::log::info!("Stop requested after {}/{} lines", segments.len(), total);
            return Ok(AssemblyOutcome::Stopped {
                completed: segments.len(),
                total,
            });
        }

        let track = self.concatenate(&mut segments)?;
        ::log::info!(
            "Assembled {} segments, {:.1}s total",
            segments.len(),
            track.duration_secs()
        );
        Ok(AssemblyOutcome::Completed(AssembledTrack { track, segments }))
    }

    /// Join chunk files in sequence order
    fn concatenate(&self, segments: &mut [AudioSegment]) -> PodcastResult<PcmTrack> {
        segments.sort_by_key(|s| s.index);

        let chunks = segments
            .iter()
            .map(|segment| {
                read_wav_file(&segment.path).map_err(|e| {
                    PodcastError::AssemblyFailed(format!("cannot read {}: {}", segment.path.display(), e))
                })
            })
            .collect::<PodcastResult<Vec<_>>>()?;
        concat_tracks(&chunks, self.synthesizer.sample_rate())
    }
}

pub(crate) fn remove_chunk_dir(dir: &Path) {
    if !dir.exists() {
        return;
    }
    match std::fs::remove_dir_all(dir) {
        Ok(()) => ::log::debug!("Removed chunk directory {}", dir.display()),
        Err(e) => ::log::warn!("Failed to remove chunk directory {}: {}", dir.display(), e),
    }
}

/// Truncate text to preview length on a char boundary
fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript_parser::{DialogueParser, UnknownSpeakerPolicy};
    use crate::tts_engine::MockTtsEngine;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manuscript(lines: usize) -> Manuscript {
        let cast = [Identity::from("Bonnie"), Identity::from("Clyde")];
        let text: String = (0..lines)
            .map(|i| format!("{}: line number {}\n", cast[i % 2], i))
            .collect();
        DialogueParser::new(&cast, UnknownSpeakerPolicy::Strict)
            .parse(&text)
            .unwrap()
    }

    fn assembler(engine: Arc<MockTtsEngine>) -> AudioAssembler {
        let synthesizer = SpeechSynthesizer::new(8_000).with_provider(engine);
        AudioAssembler::new(Arc::new(VoiceRegistry::builtin()), synthesizer)
    }

    fn config(dir: &Path, keep_chunks: bool) -> AssemblerConfig {
        AssemblerConfig {
            chunk_dir: dir.join("run-chunks"),
            keep_chunks,
            provider: ProviderKind::Mock,
        }
    }

    fn fast_engine() -> MockTtsEngine {
        MockTtsEngine::new()
            .with_sample_rate(8_000)
            .with_seconds_per_word(0.01)
    }

    #[tokio::test]
    async fn test_completed_run_concatenates_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(fast_engine());
        let mut assembler = assembler(engine.clone());
        let calls = AtomicUsize::new(0);
        let progress = |p: &TtsProgress| {
            calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(p.total, 4);
        };

        let outcome = assembler
            .run(&manuscript(4), &config(dir.path(), false), &CancellationToken::new(), &progress)
            .await
            .unwrap();

        let AssemblyOutcome::Completed(assembled) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(assembler.state(), AssemblerState::Completed);
        assert_eq!(engine.calls(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        let indices: Vec<_> = assembled.segments.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        let expected: f64 = assembled.segments.iter().map(|s| s.duration_secs).sum();
        assert!((assembled.track.duration_secs() - expected).abs() < 1e-9);
        assert!(!dir.path().join("run-chunks").exists());
    }

    #[tokio::test]
    async fn test_keep_chunks_after_success() {
        let dir = tempfile::tempdir().unwrap();
        let mut assembler = assembler(Arc::new(fast_engine()));

        assembler
            .run(&manuscript(2), &config(dir.path(), true), &CancellationToken::new(), &|_| {})
            .await
            .unwrap();

        let chunks = dir.path().join("run-chunks");
        assert!(chunks.join("0000_Bonnie.wav").exists());
        assert!(chunks.join("0001_Clyde.wav").exists());
    }

    #[tokio::test]
    async fn test_failure_on_line_k_reports_k_minus_one_progress() {
        let n = 5;
        for k in 1..=n {
            let dir = tempfile::tempdir().unwrap();
            let engine = Arc::new(fast_engine().failing_on_call(k));
            let mut assembler = assembler(engine.clone());
            let calls = AtomicUsize::new(0);
            let progress = |_: &TtsProgress| {
                calls.fetch_add(1, Ordering::SeqCst);
            };

            let err = assembler
                .run(&manuscript(n), &config(dir.path(), true), &CancellationToken::new(), &progress)
                .await
                .unwrap_err();

            assert!(matches!(err, PodcastError::SynthesisFailed { .. }));
            assert_eq!(assembler.state(), AssemblerState::Failed);
            assert_eq!(calls.load(Ordering::SeqCst), k - 1);
            assert_eq!(engine.calls(), k);
            // keep_chunks never applies to a failed run
            assert!(!dir.path().join("run-chunks").exists());
        }
    }

    #[tokio::test]
    async fn test_stop_after_line_k_issues_no_further_calls() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(fast_engine());
        let mut assembler = assembler(engine.clone());
        let cancel = CancellationToken::new();
        let stop_after = 2;
        let progress = |p: &TtsProgress| {
            if p.completed == stop_after {
                cancel.cancel();
            }
        };

        let outcome = assembler
            .run(&manuscript(6), &config(dir.path(), true), &cancel, &progress)
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            AssemblyOutcome::Stopped { completed: 2, total: 6 }
        ));
        assert_eq!(assembler.state(), AssemblerState::Stopped);
        assert_eq!(engine.calls(), stop_after);
        assert!(!dir.path().join("run-chunks").exists());
    }

    #[tokio::test]
    async fn test_stop_after_last_line_discards_run() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(fast_engine());
        let mut assembler = assembler(engine.clone());
        let cancel = CancellationToken::new();
        let progress = |p: &TtsProgress| {
            if p.completed == p.total {
                cancel.cancel();
            }
        };

        let outcome = assembler
            .run(&manuscript(3), &config(dir.path(), true), &cancel, &progress)
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            AssemblyOutcome::Stopped { completed: 3, total: 3 }
        ));
        assert_eq!(assembler.state(), AssemblerState::Stopped);
        assert_eq!(engine.calls(), 3);
        assert!(!dir.path().join("run-chunks").exists());
    }

    #[tokio::test]
    async fn test_missing_voice_binding_fails_run() {
        let dir = tempfile::tempdir().unwrap();
        let cast = [Identity::from("Host"), Identity::from("Guest")];
        let manuscript = DialogueParser::new(&cast, UnknownSpeakerPolicy::Strict)
            .parse("Host: hi\nGuest: hello")
            .unwrap();
        let mut assembler = assembler(Arc::new(fast_engine()));

        let err = assembler
            .run(&manuscript, &config(dir.path(), false), &CancellationToken::new(), &|_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, PodcastError::NoVoiceBinding { .. }));
        assert_eq!(assembler.state(), AssemblerState::Failed);
    }

    #[test]
    fn test_progress_percentage() {
        let progress = TtsProgress {
            completed: 1,
            total: 4,
            speaker: Identity::from("Bonnie"),
            text_preview: String::new(),
        };
        assert!((progress.percentage() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("héllo world", 5), "héllo...");
    }
}
