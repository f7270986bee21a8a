//! Background Mixer - best-effort music bed under the assembled podcast
//!
//! Music never blocks a run: any catalog, download or decoding problem is
//! logged and the base track is returned unchanged.

use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::audio_mixer::{conform, AudioEncoding, PcmTrack};
use crate::config::{resolve_secret, BackgroundMusicConfig};
use crate::error::{PodcastError, PodcastResult};
use crate::llm_client::build_http_client;

/// Track found in a music catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogTrack {
    pub download_url: String,
    pub title: String,
    pub artist: String,
}

/// Music catalog capability
#[async_trait::async_trait]
pub trait MusicCatalog: Send + Sync {
    /// First track matching `tag`, if any
    async fn find_track(&self, tag: &str) -> PodcastResult<Option<CatalogTrack>>;

    /// Download `track` into `dest`
    async fn download(&self, track: &CatalogTrack, dest: &Path) -> PodcastResult<()>;

    fn catalog_name(&self) -> &str;
}

// ============================================================================
// JAMENDO
// ============================================================================

#[derive(Debug, Deserialize)]
struct JamendoResponse {
    headers: JamendoHeaders,
    #[serde(default)]
    results: Vec<JamendoTrack>,
}

#[derive(Debug, Deserialize)]
struct JamendoHeaders {
    #[serde(default)]
    results_count: usize,
}

#[derive(Debug, Deserialize)]
struct JamendoTrack {
    audio: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    artist_name: String,
}

/// Jamendo track search
pub struct JamendoCatalog {
    client_id: String,
    api_url: String,
    client: HttpClient,
}

impl JamendoCatalog {
    /// Fails with a configuration error when no client id is available
    pub fn new(config: &BackgroundMusicConfig, timeout: Duration) -> PodcastResult<Self> {
        let client_id = resolve_secret(&config.client_id)
            .ok_or_else(|| PodcastError::Config("Jamendo client id is not set".into()))?;
        Ok(Self {
            client_id,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            client: build_http_client(timeout, true)?,
        })
    }

    fn parse_search(body: &str) -> PodcastResult<Option<CatalogTrack>> {
        let response: JamendoResponse = serde_json::from_str(body)
            .map_err(|e| PodcastError::Config(format!("unexpected Jamendo response: {}", e)))?;

        if response.headers.results_count == 0 {
            return Ok(None);
        }
        Ok(response
            .results
            .into_iter()
            .find(|t| !t.audio.is_empty())
            .map(|t| CatalogTrack {
                download_url: t.audio,
                title: t.name,
                artist: t.artist_name,
            }))
    }
}

#[async_trait::async_trait]
impl MusicCatalog for JamendoCatalog {
    async fn find_track(&self, tag: &str) -> PodcastResult<Option<CatalogTrack>> {
        let response = self
            .client
            .get(format!("{}/tracks/", self.api_url))
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("format", "json"),
                ("limit", "1"),
                ("tags", tag),
                ("audioformat", "mp32"),
            ])
            .send()
            .await
            .map_err(|e| PodcastError::Config(format!("Jamendo request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PodcastError::Config(format!("Jamendo response unreadable: {}", e)))?;
        if !status.is_success() {
            return Err(PodcastError::Config(format!("Jamendo returned {}", status)));
        }
        Self::parse_search(&body)
    }

    async fn download(&self, track: &CatalogTrack, dest: &Path) -> PodcastResult<()> {
        let response = self
            .client
            .get(&track.download_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PodcastError::Config(format!("music download failed: {}", e)))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PodcastError::Config(format!("music download failed: {}", e)))?;
        tokio::fs::write(dest, &bytes).await?;
        Ok(())
    }

    fn catalog_name(&self) -> &str {
        "jamendo"
    }
}

// ============================================================================
// MIXER
// ============================================================================

/// Result of a mix attempt
#[derive(Debug, Clone)]
pub struct MixedTrack {
    pub track: PcmTrack,
    /// Track laid under the podcast, `None` when mixing was skipped
    pub music: Option<CatalogTrack>,
}

/// Overlays catalog music onto assembled podcasts
pub struct BackgroundMixer {
    catalog: Arc<dyn MusicCatalog>,
}

impl BackgroundMixer {
    pub fn new(catalog: Arc<dyn MusicCatalog>) -> Self {
        Self { catalog }
    }

    /// Try `tags` in order and lay the first track found under `base`
    ///
    /// Always returns a track; failures fall back to `base`.
    pub async fn mix(&self, base: PcmTrack, tags: &[String], gain_reduction_db: f32) -> MixedTrack {
        if base.is_empty() {
            return MixedTrack { track: base, music: None };
        }

        let Some(candidate) = self.find_first(tags).await else {
            ::log::warn!("No background music found for tags {:?}, continuing without", tags);
            return MixedTrack { track: base, music: None };
        };

        match self.overlay(&base, &candidate, gain_reduction_db).await {
            Ok(track) => {
                ::log::info!(
                    "Background music: '{}' by {} (-{} dB)",
                    candidate.title,
                    candidate.artist,
                    gain_reduction_db
                );
                MixedTrack {
                    track,
                    music: Some(candidate),
                }
            }
            Err(e) => {
                ::log::warn!("Background music skipped: {}", e);
                MixedTrack { track: base, music: None }
            }
        }
    }

    async fn find_first(&self, tags: &[String]) -> Option<CatalogTrack> {
        for tag in tags {
            match self.catalog.find_track(tag).await {
                Ok(Some(track)) => {
                    ::log::debug!("[{}] Found track for tag '{}'", self.catalog.catalog_name(), tag);
                    return Some(track);
                }
                Ok(None) => ::log::debug!("[{}] No track for tag '{}'", self.catalog.catalog_name(), tag),
                Err(e) => ::log::warn!("[{}] Search for '{}' failed: {}", self.catalog.catalog_name(), tag, e),
            }
        }
        None
    }

    async fn overlay(
        &self,
        base: &PcmTrack,
        candidate: &CatalogTrack,
        gain_reduction_db: f32,
    ) -> PodcastResult<PcmTrack> {
        // Removed on drop, whatever happens below
        let download = tempfile::Builder::new()
            .prefix("podcast-music-")
            .suffix(".mp3")
            .tempfile()?;

        self.catalog.download(candidate, download.path()).await?;
        let bytes = tokio::fs::read(download.path()).await?;
        let music = conform(&bytes, AudioEncoding::Mp3, base.sample_rate())?;
        if music.is_empty() {
            return Err(PodcastError::EncodingError("background track is empty".into()));
        }

        let bed = music.attenuate(gain_reduction_db).loop_to_len(base.len());
        let mut mixed = base.clone();
        mixed.overlay(&bed)?;
        Ok(mixed)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::audio_mixer::write_wav_file;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::path::PathBuf;

    /// Catalog serving WAV tones by tag
    pub(crate) struct FakeCatalog {
        pub tracks: HashMap<String, PcmTrack>,
        pub searched: Mutex<Vec<String>>,
        pub downloads: Mutex<Vec<PathBuf>>,
        pub fail_search: bool,
    }

    impl FakeCatalog {
        pub(crate) fn new(tracks: Vec<(&str, PcmTrack)>) -> Self {
            Self {
                tracks: tracks.into_iter().map(|(t, p)| (t.to_string(), p)).collect(),
                searched: Mutex::new(Vec::new()),
                downloads: Mutex::new(Vec::new()),
                fail_search: false,
            }
        }
    }

    #[async_trait::async_trait]
    impl MusicCatalog for FakeCatalog {
        async fn find_track(&self, tag: &str) -> PodcastResult<Option<CatalogTrack>> {
            self.searched.lock().push(tag.to_string());
            if self.fail_search {
                return Err(PodcastError::Config("catalog offline".into()));
            }
            Ok(self.tracks.get(tag).map(|_| CatalogTrack {
                download_url: format!("fake://{}", tag),
                title: format!("{} tune", tag),
                artist: "Test Artist".to_string(),
            }))
        }

        async fn download(&self, track: &CatalogTrack, dest: &Path) -> PodcastResult<()> {
            self.downloads.lock().push(dest.to_path_buf());
            let tag = track.download_url.trim_start_matches("fake://");
            match self.tracks.get(tag) {
                Some(pcm) => write_wav_file(dest, pcm),
                None => Err(PodcastError::Config("gone".into())),
            }
        }

        fn catalog_name(&self) -> &str {
            "fake"
        }
    }

    const RATE: u32 = 100;

    fn constant(value: i16, secs: usize) -> PcmTrack {
        PcmTrack::new(vec![value; secs * RATE as usize], RATE)
    }

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_130s_base_with_40s_track() {
        let music = PcmTrack::new((0..40 * RATE as i16).collect(), RATE);
        let catalog = Arc::new(FakeCatalog::new(vec![("ambient", music.clone())]));
        let mixer = BackgroundMixer::new(catalog.clone());

        let base = constant(1_000, 130);
        let mixed = mixer.mix(base.clone(), &tags(&["lofi", "ambient", "chill"]), 0.0).await;

        assert_eq!(mixed.track.len(), base.len());
        assert_eq!(mixed.music.as_ref().map(|m| m.title.as_str()), Some("ambient tune"));
        // Tags are tried in order and stop at the first hit
        assert_eq!(*catalog.searched.lock(), tags(&["lofi", "ambient"]));
        // Fourth loop starts at 120 s
        let at_120s = 120 * RATE as usize;
        assert_eq!(mixed.track.samples()[at_120s], 1_000 + music.samples()[0]);
        assert_eq!(mixed.track.samples()[at_120s + 5], 1_000 + music.samples()[5]);
        // Downloaded temp file is gone
        for path in catalog.downloads.lock().iter() {
            assert!(!path.exists());
        }
    }

    #[tokio::test]
    async fn test_gain_reduction_applied() {
        let catalog = Arc::new(FakeCatalog::new(vec![("lofi", constant(10_000, 3))]));
        let mixer = BackgroundMixer::new(catalog);

        let mixed = mixer.mix(constant(0, 5), &tags(&["lofi"]), 20.0).await;
        assert!(mixed.track.samples().iter().all(|&s| s == 1_000));
    }

    #[tokio::test]
    async fn test_no_track_returns_base_unchanged() {
        let catalog = Arc::new(FakeCatalog::new(vec![]));
        let mixer = BackgroundMixer::new(catalog.clone());

        let base = constant(42, 10);
        let mixed = mixer.mix(base.clone(), &tags(&["lofi", "chill"]), 20.0).await;
        assert_eq!(mixed.track, base);
        assert!(mixed.music.is_none());
        assert_eq!(catalog.searched.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_catalog_errors_fail_soft() {
        let mut catalog = FakeCatalog::new(vec![("lofi", constant(5, 1))]);
        catalog.fail_search = true;
        let mixer = BackgroundMixer::new(Arc::new(catalog));

        let base = constant(7, 2);
        let mixed = mixer.mix(base.clone(), &tags(&["lofi"]), 20.0).await;
        assert_eq!(mixed.track, base);
    }

    #[test]
    fn test_parse_jamendo_search() {
        let body = r#"{
            "headers": {"status": "success", "code": 0, "results_count": 1},
            "results": [{"id": "1", "name": "Calm", "artist_name": "Someone",
                         "audio": "https://prod-1.storage.jamendo.com/?trackid=1&format=mp32"}]
        }"#;
        let track = JamendoCatalog::parse_search(body).unwrap().unwrap();
        assert_eq!(track.title, "Calm");
        assert_eq!(track.artist, "Someone");
        assert!(track.download_url.contains("format=mp32"));

        let empty = r#"{"headers": {"results_count": 0}, "results": []}"#;
        assert!(JamendoCatalog::parse_search(empty).unwrap().is_none());
    }
}
