//! Transcript Parser - turn generated text into a validated manuscript
//!
//! Accepted line format:
//! ```text
//! Bonnie: Welcome back to the show.
//! **Clyde:** Thanks, glad to be here.
//! ```
//!
//! Lines without a `Speaker: text` shape are dropped silently. What happens to
//! labels that are not part of the cast depends on [`UnknownSpeakerPolicy`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{PodcastError, PodcastResult};
use crate::voice_registry::Identity;

/// Separator between the speaker label and the spoken text
const SEPARATOR: char = ':';

/// Emphasis markup stripped from speaker labels
const LABEL_MARKUP: [char; 3] = ['*', '`', '#'];

// ============================================================================
// DATA MODELS
// ============================================================================

/// One speaker turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub speaker: Identity,
    pub text: String,
    /// Playback position, in manuscript order
    pub sequence_index: usize,
}

/// Ordered, non-empty dialogue ready for synthesis
///
/// A manuscript is never edited in place: a reviewed text is parsed again into
/// a new instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manuscript {
    utterances: Vec<Utterance>,
}

/// Per-speaker statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakerStats {
    pub speaker: Identity,
    pub line_count: usize,
    pub word_count: usize,
}

/// What to do with a label outside the cast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownSpeakerPolicy {
    /// Fail the whole parse
    Strict,
    /// Give the line to the default identity
    RemapDefault,
    /// Drop just that line
    #[default]
    Skip,
}

impl Manuscript {
    fn from_utterances(utterances: Vec<Utterance>) -> PodcastResult<Self> {
        if utterances.is_empty() {
            return Err(PodcastError::EmptyManuscript);
        }
        Ok(Self { utterances })
    }

    pub fn utterances(&self) -> &[Utterance] {
        &self.utterances
    }

    pub fn len(&self) -> usize {
        self.utterances.len()
    }

    /// Always false: an empty manuscript cannot be constructed
    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }

    /// Render as `Speaker: text` lines
    pub fn render(&self) -> String {
        self.utterances
            .iter()
            .map(|u| format!("{}{} {}", u.speaker, SEPARATOR, u.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Total words across all turns
    pub fn word_count(&self) -> usize {
        self.utterances
            .iter()
            .map(|u| u.text.split_whitespace().count())
            .sum()
    }

    /// Distinct speakers in order of first appearance
    pub fn speakers(&self) -> Vec<Identity> {
        let mut seen = Vec::new();
        for u in &self.utterances {
            if !seen.contains(&u.speaker) {
                seen.push(u.speaker.clone());
            }
        }
        seen
    }

    /// Line and word counts per speaker, sorted by name
    pub fn speaker_stats(&self) -> Vec<SpeakerStats> {
        let mut stats: HashMap<&Identity, SpeakerStats> = HashMap::new();
        for u in &self.utterances {
            let entry = stats.entry(&u.speaker).or_insert_with(|| SpeakerStats {
                speaker: u.speaker.clone(),
                line_count: 0,
                word_count: 0,
            });
            entry.line_count += 1;
            entry.word_count += u.text.split_whitespace().count();
        }
        let mut stats: Vec<_> = stats.into_values().collect();
        stats.sort_by(|a, b| a.speaker.cmp(&b.speaker));
        stats
    }

    /// Write the manuscript as an editable review file
    pub fn save_for_review(&self, path: &Path) -> PodcastResult<()> {
        let mut content = self.render();
        content.push('\n');
        let written = match path.parent() {
            Some(parent) => std::fs::create_dir_all(parent).and_then(|_| std::fs::write(path, &content)),
            None => std::fs::write(path, &content),
        };
        written.map_err(|e| {
            PodcastError::ManuscriptGenerationFailed(format!(
                "cannot write review file {}: {}",
                path.display(),
                e
            ))
        })?;
        ::log::info!("Manuscript saved for review: {}", path.display());
        Ok(())
    }
}

// ============================================================================
// DIALOGUE PARSER
// ============================================================================

/// Parser for `Speaker: text` dialogue
#[derive(Debug, Clone)]
pub struct DialogueParser {
    known: Vec<Identity>,
    policy: UnknownSpeakerPolicy,
    default_identity: Option<Identity>,
}

impl DialogueParser {
    /// Create a parser for the given cast
    pub fn new(known: &[Identity], policy: UnknownSpeakerPolicy) -> Self {
        Self {
            known: known.to_vec(),
            policy,
            default_identity: None,
        }
    }

    /// Identity used by [`UnknownSpeakerPolicy::RemapDefault`]
    ///
    /// Falls back to the first cast member when unset.
    pub fn with_default_identity(mut self, identity: Option<Identity>) -> Self {
        self.default_identity = identity;
        self
    }

    /// Parse into utterances; an empty result is not an error here
    pub fn parse_lines(&self, raw_text: &str) -> PodcastResult<Vec<Utterance>> {
        let mut utterances = Vec::new();

        for line in raw_text.lines() {
            let Some((label, text)) = split_dialogue_line(line) else {
                continue;
            };

            let speaker = match self.lookup(&label) {
                Some(identity) => identity.clone(),
                None => match self.policy {
                    UnknownSpeakerPolicy::Strict => {
                        return Err(PodcastError::UnknownSpeaker(label));
                    }
                    UnknownSpeakerPolicy::RemapDefault => {
                        let default = self.default_identity()?;
                        ::log::warn!("Remapping unknown speaker '{}' to '{}'", label, default);
                        default.clone()
                    }
                    UnknownSpeakerPolicy::Skip => {
                        ::log::warn!("Skipping unknown speaker: {}", label);
                        continue;
                    }
                },
            };

            utterances.push(Utterance {
                speaker,
                text,
                sequence_index: utterances.len(),
            });
        }

        Ok(utterances)
    }

    /// Parse into a manuscript, failing with `EmptyManuscript` if nothing qualifies
    pub fn parse(&self, raw_text: &str) -> PodcastResult<Manuscript> {
        let utterances = self.parse_lines(raw_text)?;
        ::log::debug!("Parsed {} dialogue lines", utterances.len());
        Manuscript::from_utterances(utterances)
    }

    /// Re-ingest a reviewed manuscript file
    pub fn parse_file(&self, path: &Path) -> PodcastResult<Manuscript> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PodcastError::InvalidSource(format!("cannot read manuscript {}: {}", path.display(), e))
        })?;
        self.parse(&content)
    }

    fn lookup(&self, label: &str) -> Option<&Identity> {
        self.known
            .iter()
            .find(|i| i.as_str().eq_ignore_ascii_case(label))
    }

    fn default_identity(&self) -> PodcastResult<&Identity> {
        self.default_identity
            .as_ref()
            .or_else(|| self.known.first())
            .ok_or_else(|| PodcastError::Config("no default speaker configured".into()))
    }
}

/// Split a line into a normalized label and text
///
/// Returns `None` when the line has no separator or either side is empty.
fn split_dialogue_line(line: &str) -> Option<(String, String)> {
    let (label, text) = line.split_once(SEPARATOR)?;
    let label = normalize_label(label);
    // "**Bonnie:** text" leaves the closing markup on the text side
    let text = text.trim().trim_start_matches(['*', '_']).trim();

    if label.is_empty() || text.is_empty() {
        return None;
    }
    Some((label, text.to_string()))
}

fn normalize_label(label: &str) -> String {
    let stripped: String = label.chars().filter(|c| !LABEL_MARKUP.contains(c)).collect();
    stripped
        .trim()
        .trim_start_matches(['-', '@'])
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim()
        .to_string()
}

// ============================================================================
// TESTS
// ============================================================================
