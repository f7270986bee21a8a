//! Source extraction - turn a source reference into plain text
//!
//! Supported sources:
//! - plain text files
//! - PDF files (through the `pdftotext` tool)
//! - encyclopedia articles (Wikipedia REST summary)
//! - video transcripts (YouTube timed text)

use regex::Regex;
use reqwest::{Client as HttpClient, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::{PodcastError, PodcastResult};
use crate::llm_client::build_http_client;

const TIMEDTEXT_URL: &str = "https://video.google.com/timedtext";

// ============================================================================
// SOURCE TYPE
// ============================================================================

/// Kind of source document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Encyclopedia,
    Pdf,
    Text,
    VideoTranscript,
}

impl SourceType {
    pub fn display_name(&self) -> &'static str {
        match self {
            SourceType::Encyclopedia => "Wikipedia",
            SourceType::Pdf => "PDF",
            SourceType::Text => "Text",
            SourceType::VideoTranscript => "YouTube",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for SourceType {
    type Err = PodcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "encyclopedia" | "wikipedia" | "wiki" => Ok(SourceType::Encyclopedia),
            "pdf" => Ok(SourceType::Pdf),
            "text" | "txt" => Ok(SourceType::Text),
            "video" | "video_transcript" | "youtube" => Ok(SourceType::VideoTranscript),
            other => Err(PodcastError::InvalidSource(format!("unknown source type '{}'", other))),
        }
    }
}

// ============================================================================
// FETCHER
// ============================================================================

/// Source text capability
#[async_trait::async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch_source_text(&self, source: &str, source_type: SourceType) -> PodcastResult<String>;
}

#[derive(Debug, Deserialize)]
struct WikiSummary {
    #[serde(default)]
    extract: String,
}

/// Fetcher for local files and the public encyclopedia/video endpoints
pub struct DefaultSourceFetcher {
    client: HttpClient,
    transcript_dir: Option<PathBuf>,
}

impl DefaultSourceFetcher {
    pub fn new(timeout: Duration) -> PodcastResult<Self> {
        Ok(Self {
            client: build_http_client(timeout, true)?,
            transcript_dir: None,
        })
    }

    /// Save fetched video transcripts into `dir`
    pub fn with_transcript_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.transcript_dir = Some(dir.into());
        self
    }

    async fn read_text_file(path: &str) -> PodcastResult<String> {
        tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PodcastError::SourceNotFound(path.to_string()),
            _ => PodcastError::InvalidSource(format!("{}: {}", path, e)),
        })
    }

    async fn read_pdf(path: &str) -> PodcastResult<String> {
        if !Path::new(path).exists() {
            return Err(PodcastError::SourceNotFound(path.to_string()));
        }
        let output = tokio::process::Command::new("pdftotext")
            .arg("-enc")
            .arg("UTF-8")
            .arg(path)
            .arg("-")
            .output()
            .await
            .map_err(|e| {
                PodcastError::InvalidSource(format!("failed to run pdftotext: {}. Is poppler installed?", e))
            })?;

        if !output.status.success() {
            return Err(PodcastError::InvalidSource(format!(
                "pdftotext failed on {}: {}",
                path,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn fetch_encyclopedia(&self, url: &str) -> PodcastResult<String> {
        let article = EncyclopediaArticle::parse(url)?;
        let endpoint = format!("https://{}/api/rest_v1/page/summary/{}", article.host, article.title);

        ::log::debug!("Fetching encyclopedia summary: {}", endpoint);
        let response = self
            .client
            .get(&endpoint)
            .header("User-Agent", concat!("mofa-podcast/", env!("CARGO_PKG_VERSION")))
            .send()
            .await
            .map_err(|e| PodcastError::InvalidSource(format!("encyclopedia request failed: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(PodcastError::SourceNotFound(format!(
                "page '{}' does not exist",
                article.display_title()
            )));
        }
        if !response.status().is_success() {
            return Err(PodcastError::InvalidSource(format!(
                "encyclopedia returned {}",
                response.status()
            )));
        }

        let summary: WikiSummary = response
            .json()
            .await
            .map_err(|e| PodcastError::InvalidSource(format!("unexpected encyclopedia response: {}", e)))?;
        Ok(summary.extract)
    }

    async fn fetch_video_transcript(&self, url: &str) -> PodcastResult<String> {
        let video_id = video_id(url)?;
        let response = self
            .client
            .get(TIMEDTEXT_URL)
            .query(&[("lang", "en"), ("v", video_id.as_str())])
            .send()
            .await
            .map_err(|e| PodcastError::InvalidSource(format!("transcript request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(PodcastError::SourceNotFound(format!(
                "no transcript for video {} ({})",
                video_id,
                response.status()
            )));
        }
        let body = response
            .text()
            .await
            .map_err(|e| PodcastError::InvalidSource(format!("transcript unreadable: {}", e)))?;

        let transcript = parse_timed_text(&body);
        if transcript.trim().is_empty() {
            return Err(PodcastError::SourceNotFound(format!("no transcript for video {}", video_id)));
        }

        if let Some(dir) = &self.transcript_dir {
            let path = dir.join("video_transcript.txt");
            let saved = match tokio::fs::create_dir_all(dir).await {
                Ok(()) => tokio::fs::write(&path, &transcript).await,
                Err(e) => Err(e),
            };
            saved.map_err(|e| {
                PodcastError::InvalidSource(format!("cannot save transcript to {}: {}", path.display(), e))
            })?;
            ::log::info!("Video transcript saved to {}", path.display());
        }
        Ok(transcript)
    }
}

#[async_trait::async_trait]
impl SourceFetcher for DefaultSourceFetcher {
    async fn fetch_source_text(&self, source: &str, source_type: SourceType) -> PodcastResult<String> {
        ::log::info!("Fetching {} source: {}", source_type, source);
        match source_type {
            SourceType::Text => Self::read_text_file(source).await,
            SourceType::Pdf => Self::read_pdf(source).await,
            SourceType::Encyclopedia => self.fetch_encyclopedia(source).await,
            SourceType::VideoTranscript => self.fetch_video_transcript(source).await,
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Article host and (still percent-encoded) title
#[derive(Debug, Clone, PartialEq, Eq)]
struct EncyclopediaArticle {
    host: String,
    title: String,
}

impl EncyclopediaArticle {
    fn parse(url: &str) -> PodcastResult<Self> {
        let parsed = Url::parse(url.trim())
            .map_err(|e| PodcastError::InvalidSourceUrl(format!("{}: {}", url, e)))?;
        let host = parsed
            .host_str()
            .filter(|h| h.ends_with("wikipedia.org"))
            .ok_or_else(|| PodcastError::InvalidSourceUrl(format!("not an encyclopedia URL: {}", url)))?
            .to_string();
        let title = parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .filter(|title| *title != "wiki")
            .ok_or_else(|| PodcastError::InvalidSourceUrl(format!("no article title in {}", url)))?
            .to_string();
        Ok(Self { host, title })
    }

    /// Title with percent-escapes decoded (`Caf%C3%A9` -> `Café`)
    fn display_title(&self) -> String {
        // Keep literal separators out of the form decoder
        let escaped = self
            .title
            .replace('+', "%2B")
            .replace('&', "%26")
            .replace('=', "%3D");
        url::form_urlencoded::parse(escaped.as_bytes())
            .next()
            .map(|(title, _)| title.into_owned())
            .unwrap_or_default()
    }
}

fn video_id_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:v=|youtu\.be/)([\w-]{11})").ok())
        .as_ref()
}

/// Extract the 11-character video id from a watch or short URL
pub fn video_id(url: &str) -> PodcastResult<String> {
    video_id_regex()
        .and_then(|re| re.captures(url))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| PodcastError::InvalidSourceUrl(format!("invalid video URL: {}", url)))
}

/// Join the captions of a timed-text XML document, one per line
fn parse_timed_text(xml: &str) -> String {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = RE
        .get_or_init(|| Regex::new(r"(?s)<text[^>]*>(.*?)</text>").ok())
        .as_ref()
    else {
        return String::new();
    };

    re.captures_iter(xml)
        .filter_map(|c| c.get(1))
        .map(|m| unescape_xml(m.as_str()).split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn numeric_entity_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"&#(?:[xX]([0-9a-fA-F]+)|([0-9]+));").ok())
        .as_ref()
}

fn unescape_xml(text: &str) -> String {
    let named = text
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'");
    let numeric = match numeric_entity_regex() {
        Some(re) => re
            .replace_all(&named, |caps: &regex::Captures| {
                let code = match (caps.get(1), caps.get(2)) {
                    (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
                    (None, Some(dec)) => dec.as_str().parse::<u32>().ok(),
                    (None, None) => None,
                };
                code.and_then(char::from_u32)
                    .map(String::from)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned(),
        None => named,
    };
    // &amp; last so "&amp;lt;" stays "&lt;"
    numeric.replace("&amp;", "&")
}

/// File-name-safe stem naming the output after its source
pub fn source_stem(source: &str, source_type: SourceType) -> String {
    let raw = match source_type {
        SourceType::Text | SourceType::Pdf => Path::new(source)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        SourceType::Encyclopedia => EncyclopediaArticle::parse(source)
            .map(|a| a.display_title())
            .unwrap_or_default(),
        SourceType::VideoTranscript => video_id(source).unwrap_or_default(),
    };

    let stem: String = raw
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem.trim_matches('_').is_empty() {
        "podcast".to_string()
    } else {
        stem
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_id_forms() {
        assert_eq!(
            video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42").unwrap(),
            "dQw4w9WgXcQ"
        );
        assert_eq!(video_id("https://youtu.be/dQw4w9WgXcQ").unwrap(), "dQw4w9WgXcQ");
        assert!(matches!(
            video_id("https://example.com/video/123"),
            Err(PodcastError::InvalidSourceUrl(_))
        ));
    }

    #[test]
    fn test_encyclopedia_title() {
        let article = EncyclopediaArticle::parse("https://en.wikipedia.org/wiki/Rust_(programming_language)").unwrap();
        assert_eq!(article.host, "en.wikipedia.org");
        assert_eq!(article.title, "Rust_(programming_language)");

        assert!(EncyclopediaArticle::parse("not a url").is_err());
        assert!(EncyclopediaArticle::parse("https://example.com/wiki/Rust").is_err());
        assert!(EncyclopediaArticle::parse("https://en.wikipedia.org/wiki/").is_err());
    }

    #[test]
    fn test_timed_text_parsing() {
        let xml = r#"<?xml version="1.0" encoding="utf-8" ?><transcript>
            <text start="0.5" dur="2.1">Hello &amp; welcome</text>
            <text start="2.6" dur="1.0">it&#39;s a
            test</text>
            <text start="4.0" dur="1.0"></text>
        </transcript>"#;
        assert_eq!(parse_timed_text(xml), "Hello & welcome\nit's a test");
    }

    #[test]
    fn test_numeric_entities_are_decoded() {
        assert_eq!(unescape_xml("it&#8217;s"), "it\u{2019}s");
        assert_eq!(unescape_xml("&#x41;&#X42;&#67;"), "ABC");
        // Escaped ampersand stays a literal entity
        assert_eq!(unescape_xml("&amp;#39;"), "&#39;");
        // Invalid code points are left alone
        assert_eq!(unescape_xml("&#xD800;"), "&#xD800;");
    }

    #[test]
    fn test_source_stem() {
        assert_eq!(source_stem("/tmp/notes/My Article.txt", SourceType::Text), "My_Article");
        assert_eq!(source_stem("paper.pdf", SourceType::Pdf), "paper");
        assert_eq!(
            source_stem("https://en.wikipedia.org/wiki/Alan_Turing", SourceType::Encyclopedia),
            "Alan_Turing"
        );
        assert_eq!(
            source_stem("https://youtu.be/dQw4w9WgXcQ", SourceType::VideoTranscript),
            "dQw4w9WgXcQ"
        );
        assert_eq!(
            source_stem("https://fr.wikipedia.org/wiki/Caf%C3%A9", SourceType::Encyclopedia),
            "Caf\u{e9}"
        );
        assert_eq!(
            source_stem("https://en.wikipedia.org/wiki/C%2B%2B", SourceType::Encyclopedia),
            "C__"
        );
        assert_eq!(source_stem("???", SourceType::Encyclopedia), "podcast");
    }

    #[test]
    fn test_source_type_parsing() {
        assert_eq!("wikipedia".parse::<SourceType>().unwrap(), SourceType::Encyclopedia);
        assert_eq!("TXT".parse::<SourceType>().unwrap(), SourceType::Text);
        assert_eq!("youtube".parse::<SourceType>().unwrap(), SourceType::VideoTranscript);
        assert!("podcast".parse::<SourceType>().is_err());
    }

    #[tokio::test]
    async fn test_text_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, "Hello world.").unwrap();

        let fetcher = DefaultSourceFetcher::new(Duration::from_secs(5)).unwrap();
        let text = fetcher
            .fetch_source_text(path.to_str().unwrap(), SourceType::Text)
            .await
            .unwrap();
        assert_eq!(text, "Hello world.");

        let missing = dir.path().join("missing.txt");
        let err = fetcher
            .fetch_source_text(missing.to_str().unwrap(), SourceType::Text)
            .await
            .unwrap_err();
        assert!(matches!(err, PodcastError::SourceNotFound(_)));

        let err = fetcher
            .fetch_source_text(missing.to_str().unwrap(), SourceType::Pdf)
            .await
            .unwrap_err();
        assert!(matches!(err, PodcastError::SourceNotFound(_)));
    }
}
