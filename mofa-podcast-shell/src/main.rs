//! MoFA Podcast - command-line front end
//!
//! ```text
//! mofa-podcast generate --source notes.txt --source-type text --speaker Alice --speaker Bob
//! mofa-podcast draft --source https://en.wikipedia.org/wiki/Rust --speaker Bonnie --speaker Clyde
//! mofa-podcast voices
//! ```
//!
//! Press Ctrl+C during `generate` to stop after the current line. No output
//! file is written for a stopped run.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use mofa_podcast::{
    Identity, LengthPreference, ManuscriptSource, PodcastConfig, PodcastEvent, PodcastPipeline,
    PodcastRequest, PodcastWorker, ProviderKind, RunOutcome, SourceType, VoiceRegistry,
};

#[derive(Parser)]
#[command(name = "mofa-podcast", version, about = "Turn documents into multi-voice podcasts")]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a podcast audio file
    Generate {
        #[command(flatten)]
        source: SourceArgs,

        /// Speech provider (cloud_neural, commercial_voice, offline_local, rest_speech, mock)
        #[arg(long)]
        provider: Option<ProviderKind>,

        /// Skip background music
        #[arg(long)]
        no_music: bool,

        /// Use a reviewed manuscript instead of generating one
        #[arg(long)]
        manuscript: Option<PathBuf>,
    },
    /// Generate a manuscript and save it for review
    Draft {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// List speakers and their voice bindings
    Voices,
}

#[derive(Args)]
struct SourceArgs {
    /// URL or file path of the source document
    #[arg(long)]
    source: String,

    /// encyclopedia, pdf, text or video
    #[arg(long, default_value = "encyclopedia")]
    source_type: SourceType,

    /// Cast member; repeat for each speaker
    #[arg(long = "speaker", required = true)]
    speakers: Vec<String>,

    /// short, medium, long or a word count
    #[arg(long, default_value = "medium")]
    length: LengthPreference,
}

impl SourceArgs {
    fn request(&self) -> PodcastRequest {
        PodcastRequest::new(
            self.source.clone(),
            self.source_type,
            self.speakers.iter().map(|s| Identity::new(s.as_str())).collect(),
        )
        .with_length(self.length)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = PodcastConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Command::Generate {
            source,
            provider,
            no_music,
            manuscript,
        } => {
            if let Some(provider) = provider {
                config.tts.provider = provider;
            }
            let mut request = source.request().with_background_music(!no_music);
            if let Some(provider) = provider {
                request = request.with_provider(provider);
            }
            if let Some(path) = manuscript {
                request = request.with_manuscript(ManuscriptSource::Review(path));
            }
            generate(config, request)
        }
        Command::Draft { source } => draft(config, source.request()),
        Command::Voices => list_voices(&config),
    }
}

fn generate(config: PodcastConfig, request: PodcastRequest) -> Result<()> {
    let pipeline = Arc::new(PodcastPipeline::from_config(config)?);
    let mut worker = PodcastWorker::new(pipeline);

    let stop = worker.stop_handle();
    ctrlc::set_handler(move || {
        if stop.stop() {
            log::warn!("Stop requested, finishing the current line");
        }
    })
    .context("installing Ctrl+C handler")?;

    worker.start(request)?;

    let events = worker.events();
    while let Ok(event) = events.recv() {
        match event {
            PodcastEvent::Started { source } => log::info!("Generating podcast from {}", source),
            PodcastEvent::Progress { .. } => {}
            PodcastEvent::Stopped { .. } | PodcastEvent::Finished { .. } | PodcastEvent::Failed { .. } => {
                break;
            }
        }
    }

    match worker.join() {
        Some(Ok(RunOutcome::Completed {
            path,
            duration_secs,
            segment_count,
            file_size_bytes,
            music,
        })) => {
            println!("{}", path.display());
            log::info!(
                "{} lines, {:.1}s, {} KB",
                segment_count,
                duration_secs,
                file_size_bytes / 1024
            );
            if let Some(track) = music {
                log::info!("Background music: \"{}\" by {}", track.title, track.artist);
            }
            Ok(())
        }
        Some(Ok(RunOutcome::Stopped { completed, total })) => {
            bail!("stopped after {} of {} lines, no file written", completed, total)
        }
        Some(Err(e)) => bail!(e.user_message()),
        None => bail!("worker did not start"),
    }
}

fn draft(config: PodcastConfig, request: PodcastRequest) -> Result<()> {
    let pipeline = PodcastPipeline::from_config(config)?;
    let runtime = tokio::runtime::Runtime::new()?;
    let (manuscript, path) = runtime
        .block_on(pipeline.draft_manuscript(&request))
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    for stats in manuscript.speaker_stats() {
        log::info!("{}: {} lines, {} words", stats.speaker, stats.line_count, stats.word_count);
    }
    println!("{}", path.display());
    Ok(())
}

fn list_voices(config: &PodcastConfig) -> Result<()> {
    let registry = VoiceRegistry::from_table(&config.voices)?;
    for identity in registry.identities() {
        println!("{}", identity);
        for provider in ProviderKind::ALL {
            if let Ok(voice) = registry.resolve(identity, provider) {
                println!("  {:<18} {}", provider.display_name(), voice);
            }
        }
    }
    Ok(())
}
