//! Manuscript generation - source text to validated dialogue
//!
//! Builds the prompt, calls the text backend, parses the answer and retries
//! exactly once with a more exploratory prompt when nothing usable comes back.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{PodcastError, PodcastResult};
use crate::llm_client::TextGenerator;
use crate::transcript_parser::{DialogueParser, Manuscript, UnknownSpeakerPolicy};
use crate::voice_registry::Identity;

// ============================================================================
// TARGET LENGTH
// ============================================================================

/// Requested podcast length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthPreference {
    Short,
    Medium,
    Long,
    /// Explicit target word count
    Words(usize),
}

impl LengthPreference {
    /// Get display name
    pub fn display_name(&self) -> String {
        match self {
            LengthPreference::Short => "Short (5 min)".to_string(),
            LengthPreference::Medium => "Medium (10 min)".to_string(),
            LengthPreference::Long => "Long (20 min)".to_string(),
            LengthPreference::Words(n) => format!("{} words", n),
        }
    }
}

impl fmt::Display for LengthPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

impl FromStr for LengthPreference {
    type Err = PodcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "short" => Ok(LengthPreference::Short),
            "medium" => Ok(LengthPreference::Medium),
            "long" => Ok(LengthPreference::Long),
            other => other
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .map(LengthPreference::Words)
                .ok_or_else(|| {
                    PodcastError::InvalidRequest(format!(
                        "length must be short, medium, long or a word count, got '{}'",
                        s
                    ))
                }),
        }
    }
}

/// How a length preference becomes a target word count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordTargetPolicy {
    /// Short 700, Medium 1500, Long 3000 words
    #[default]
    FixedTable,
    /// Source word count scaled by 1, 2 or 4
    Proportional,
}

impl WordTargetPolicy {
    pub fn target_words(&self, length: LengthPreference, source_text: &str) -> usize {
        if let LengthPreference::Words(n) = length {
            return n;
        }
        match self {
            WordTargetPolicy::FixedTable => match length {
                LengthPreference::Short => 700,
                LengthPreference::Medium => 1500,
                LengthPreference::Long => 3000,
                LengthPreference::Words(n) => n,
            },
            WordTargetPolicy::Proportional => {
                let factor = match length {
                    LengthPreference::Short => 1,
                    LengthPreference::Medium => 2,
                    LengthPreference::Long => 4,
                    LengthPreference::Words(_) => 1,
                };
                source_text.split_whitespace().count().max(1) * factor
            }
        }
    }
}

// ============================================================================
// PROMPTS
// ============================================================================

/// Prompt variants, tried in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTemplate {
    /// Detailed conversion of the article into dialogue
    Conversion,
    /// Exploratory interview used when the first answer had no dialogue
    Exploration,
}

impl PromptTemplate {
    pub fn render(&self, speakers: &[Identity], target_words: usize, source_text: &str) -> String {
        let speaker_list = speakers
            .iter()
            .map(Identity::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        match self {
            PromptTemplate::Conversion => Self::conversion(&speaker_list, target_words, source_text),
            PromptTemplate::Exploration => Self::exploration(&speaker_list, target_words, source_text),
        }
    }

    fn conversion(speaker_list: &str, target_words: usize, source_text: &str) -> String {
        format!(
            r#"You are tasked with converting the following article into a detailed, engaging dialogue between {speaker_list}.

Instructions:
- Aim for approximately {target_words} words total.
- Only these speakers may talk: {speaker_list}. There is no narrator.
- Make the conversation natural and dynamic, with back-and-forth exchanges.
- Include questions, clarifications, and detailed explanations.
- They may disagree and debate the topic, and interrupt each other without losing context.
- Do NOT include stage directions, sound effects, or descriptions such as (laughing), [coughs], *sighs*, or any text in brackets or parentheses.
- Write exactly one line per turn, in the format:
SpeakerName: Their spoken line.

Article content:
{source_text}"#
        )
    }

    fn exploration(speaker_list: &str, target_words: usize, source_text: &str) -> String {
        format!(
            r#"Simulate a podcast-style interview or conversation between {speaker_list} based on the following text. The goal is to explore ideas, ask questions, and reflect on the topic in a way that's natural, thoughtful, and human.

Instructions:
- Do not summarize; let the speakers discuss the concepts in depth, roughly {target_words} words in total.
- Alternate turns. They may ask questions, challenge assumptions, or agree and disagree.
- No narrator, no stage directions, nothing in brackets or parentheses.
- One line per turn, formatted as: SpeakerName: dialogue

Text to explore:
{source_text}"#
        )
    }
}

// ============================================================================
// GENERATOR
// ============================================================================

/// Generates manuscripts through a pluggable text backend
pub struct ManuscriptGenerator {
    backend: Arc<dyn TextGenerator>,
    word_policy: WordTargetPolicy,
    unknown_policy: UnknownSpeakerPolicy,
    default_speaker: Option<Identity>,
}

impl ManuscriptGenerator {
    pub fn new(backend: Arc<dyn TextGenerator>) -> Self {
        Self {
            backend,
            word_policy: WordTargetPolicy::default(),
            unknown_policy: UnknownSpeakerPolicy::default(),
            default_speaker: None,
        }
    }

    pub fn with_word_policy(mut self, policy: WordTargetPolicy) -> Self {
        self.word_policy = policy;
        self
    }

    pub fn with_unknown_speaker_policy(mut self, policy: UnknownSpeakerPolicy) -> Self {
        self.unknown_policy = policy;
        self
    }

    pub fn with_default_speaker(mut self, speaker: Option<Identity>) -> Self {
        self.default_speaker = speaker;
        self
    }

    /// Parser matching this generator's speaker policy
    pub fn parser_for(&self, speakers: &[Identity]) -> DialogueParser {
        DialogueParser::new(speakers, self.unknown_policy)
            .with_default_identity(self.default_speaker.clone())
    }

    /// Turn source text into a manuscript for the given speakers
    pub async fn generate(
        &self,
        source_text: &str,
        speakers: &[Identity],
        length: LengthPreference,
    ) -> PodcastResult<Manuscript> {
        if source_text.trim().is_empty() {
            return Err(PodcastError::EmptySource);
        }
        if speakers.len() < 2 {
            return Err(PodcastError::InvalidRequest(
                "at least two speakers are required".to_string(),
            ));
        }

        let target_words = self.word_policy.target_words(length, source_text);
        let parser = self.parser_for(speakers);

        ::log::info!(
            "Generating manuscript for {} speakers, ~{} words via {}",
            speakers.len(),
            target_words,
            self.backend.backend_name()
        );

        for template in [PromptTemplate::Conversion, PromptTemplate::Exploration] {
            let prompt = template.render(speakers, target_words, source_text);
            let raw = self.backend.generate_text(&prompt).await.map_err(|e| match e {
                PodcastError::ManuscriptGenerationFailed(_) => e,
                other => PodcastError::ManuscriptGenerationFailed(other.to_string()),
            })?;

            let utterances = parser.parse_lines(&raw)?;
            if !utterances.is_empty() {
                ::log::info!("Manuscript ready: {} dialogue lines", utterances.len());
                return parser.parse(&raw);
            }

            ::log::warn!(
                "{} didn't return usable dialogue with the {:?} prompt",
                self.backend.backend_name(),
                template
            );
        }

        Err(PodcastError::ManuscriptGenerationFailed(
            "no dialogue detected after both prompt attempts".to_string(),
        ))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Backend replaying canned answers and recording prompts
    pub(crate) struct ScriptedBackend {
        answers: Mutex<VecDeque<PodcastResult<String>>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        pub(crate) fn new(answers: Vec<PodcastResult<String>>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers.into()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl TextGenerator for ScriptedBackend {
        async fn generate_text(&self, prompt: &str) -> PodcastResult<String> {
            self.prompts.lock().push(prompt.to_string());
            self.answers
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))
        }

        fn backend_name(&self) -> &str {
            "scripted"
        }
    }

    fn speakers() -> Vec<Identity> {
        vec![Identity::from("A"), Identity::from("B")]
    }

    #[tokio::test]
    async fn test_single_call_when_dialogue_parses() {
        let backend = ScriptedBackend::new(vec![Ok("A: Hi there.\nB: Hello!\n".to_string())]);
        let generator = ManuscriptGenerator::new(backend.clone());

        let manuscript = generator
            .generate("Hello world.", &speakers(), LengthPreference::Short)
            .await
            .unwrap();

        assert_eq!(backend.prompts.lock().len(), 1);
        let pairs: Vec<_> = manuscript
            .utterances()
            .iter()
            .map(|u| (u.speaker.as_str().to_string(), u.text.clone()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("A".to_string(), "Hi there.".to_string()),
                ("B".to_string(), "Hello!".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_prompt_contents() {
        let backend = ScriptedBackend::new(vec![Ok("A: ok\nB: ok".to_string())]);
        let generator = ManuscriptGenerator::new(backend.clone());
        generator
            .generate("The moon is made of rock.", &speakers(), LengthPreference::Medium)
            .await
            .unwrap();

        let prompts = backend.prompts.lock();
        let prompt = &prompts[0];
        assert!(prompt.contains("A, B"));
        assert!(prompt.contains("1500 words"));
        assert!(prompt.contains("SpeakerName: Their spoken line."));
        assert!(prompt.contains("The moon is made of rock."));
    }

    #[tokio::test]
    async fn test_fallback_prompt_used_once() {
        let backend = ScriptedBackend::new(vec![
            Ok("Sorry, here is a summary instead.".to_string()),
            Ok("A: Let's explore.\nB: Sure.".to_string()),
        ]);
        let generator = ManuscriptGenerator::new(backend.clone());

        let manuscript = generator
            .generate("Text.", &speakers(), LengthPreference::Long)
            .await
            .unwrap();

        let prompts = backend.prompts.lock();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].starts_with("Simulate a podcast-style interview"));
        assert_eq!(manuscript.len(), 2);
    }

    #[tokio::test]
    async fn test_both_prompts_empty_is_terminal() {
        let backend = ScriptedBackend::new(vec![
            Ok("nothing".to_string()),
            Ok("still nothing".to_string()),
            Ok("A: never asked".to_string()),
        ]);
        let generator = ManuscriptGenerator::new(backend.clone());

        let err = generator
            .generate("Text.", &speakers(), LengthPreference::Short)
            .await
            .unwrap_err();
        assert!(matches!(err, PodcastError::ManuscriptGenerationFailed(_)));
        assert_eq!(backend.prompts.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_blank_source_never_calls_backend() {
        let backend = ScriptedBackend::new(vec![]);
        let generator = ManuscriptGenerator::new(backend.clone());

        let err = generator
            .generate("  \n\t", &speakers(), LengthPreference::Short)
            .await
            .unwrap_err();
        assert!(matches!(err, PodcastError::EmptySource));
        assert!(backend.prompts.lock().is_empty());
    }

    #[tokio::test]
    async fn test_backend_error_surfaces_as_generation_failure() {
        let backend = ScriptedBackend::new(vec![Err(PodcastError::Config("boom".into()))]);
        let generator = ManuscriptGenerator::new(backend);

        let err = generator
            .generate("Text.", &speakers(), LengthPreference::Short)
            .await
            .unwrap_err();
        assert!(matches!(err, PodcastError::ManuscriptGenerationFailed(_)));
    }

    #[tokio::test]
    async fn test_strict_policy_rejects_unknown_speaker() {
        let backend = ScriptedBackend::new(vec![Ok("A: hi\nNarrator: meanwhile".to_string())]);
        let generator = ManuscriptGenerator::new(backend)
            .with_unknown_speaker_policy(UnknownSpeakerPolicy::Strict);

        let err = generator
            .generate("Text.", &speakers(), LengthPreference::Short)
            .await
            .unwrap_err();
        assert!(matches!(err, PodcastError::UnknownSpeaker(_)));
    }

    #[test]
    fn test_word_target_policies() {
        let source = "one two three four five";
        let fixed = WordTargetPolicy::FixedTable;
        assert_eq!(fixed.target_words(LengthPreference::Short, source), 700);
        assert_eq!(fixed.target_words(LengthPreference::Medium, source), 1500);
        assert_eq!(fixed.target_words(LengthPreference::Long, source), 3000);

        let proportional = WordTargetPolicy::Proportional;
        assert_eq!(proportional.target_words(LengthPreference::Short, source), 5);
        assert_eq!(proportional.target_words(LengthPreference::Medium, source), 10);
        assert_eq!(proportional.target_words(LengthPreference::Long, source), 20);

        assert_eq!(fixed.target_words(LengthPreference::Words(42), source), 42);
        assert_eq!(proportional.target_words(LengthPreference::Words(42), source), 42);
    }

    #[test]
    fn test_length_parsing() {
        assert_eq!("Short".parse::<LengthPreference>().unwrap(), LengthPreference::Short);
        assert_eq!("2500".parse::<LengthPreference>().unwrap(), LengthPreference::Words(2500));
        assert!("0".parse::<LengthPreference>().is_err());
        assert!("epic".parse::<LengthPreference>().is_err());
    }
}
