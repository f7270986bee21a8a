//! Audio Mixing and Export - PCM tracks, format conversion and final encoding
//!
//! All audio inside a run is held as mono signed 16-bit PCM at the configured
//! target rate ([`PcmTrack`]). Provider output is conformed to that format on
//! arrival, and only the final export leaves it (WAV via `hound`, MP3 via
//! `ffmpeg`).

use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{PodcastError, PodcastResult};

// ============================================================================
// DATA MODELS
// ============================================================================

/// Export format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// WAV format (uncompressed)
    Wav,
    /// MP3 format (compressed)
    Mp3,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Wav => "wav",
            ExportFormat::Mp3 => "mp3",
        }
    }
}

/// MP3 bitrate options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mp3Bitrate {
    /// 128 kbps (Good quality, ~1MB/min)
    #[serde(rename = "128k")]
    Kbps128,
    /// 192 kbps (High quality, ~1.5MB/min) - Recommended
    #[serde(rename = "192k")]
    Kbps192,
    /// 256 kbps (Very high quality, ~2MB/min)
    #[serde(rename = "256k")]
    Kbps256,
    /// 320 kbps (Maximum quality, ~2.5MB/min)
    #[serde(rename = "320k")]
    Kbps320,
}

impl Mp3Bitrate {
    /// Get bitrate value in kbps
    pub fn kbps(&self) -> u32 {
        match self {
            Mp3Bitrate::Kbps128 => 128,
            Mp3Bitrate::Kbps192 => 192,
            Mp3Bitrate::Kbps256 => 256,
            Mp3Bitrate::Kbps320 => 320,
        }
    }

    /// Get display name
    pub fn display_name(&self) -> &str {
        match self {
            Mp3Bitrate::Kbps128 => "128 kbps (Good)",
            Mp3Bitrate::Kbps192 => "192 kbps (High)",
            Mp3Bitrate::Kbps256 => "256 kbps (Very High)",
            Mp3Bitrate::Kbps320 => "320 kbps (Max)",
        }
    }
}

/// Encoding of the bytes a speech provider hands back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEncoding {
    /// RIFF/WAVE container, any rate, channel count or sample format
    Wav,
    /// Headerless little-endian signed 16-bit mono PCM
    RawPcm16 { sample_rate: u32 },
    /// MPEG layer 3, decoded through ffmpeg
    Mp3,
}

/// Audio metadata
#[derive(Debug, Clone, Default)]
pub struct AudioMetadata {
    /// Title
    pub title: Option<String>,
    /// Artist/Author
    pub artist: Option<String>,
    /// Album
    pub album: Option<String>,
    /// Recording date (YYYY-MM-DD)
    pub date: Option<String>,
    /// Comment/Description
    pub comment: Option<String>,
}

/// Export configuration
#[derive(Debug, Clone)]
pub struct MixerConfig {
    /// Export format
    pub export_format: ExportFormat,
    /// MP3 bitrate (only used if export_format is MP3)
    pub mp3_bitrate: Mp3Bitrate,
    /// Metadata written as ID3 tags on MP3 export
    pub metadata: AudioMetadata,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            export_format: ExportFormat::Mp3,
            mp3_bitrate: Mp3Bitrate::Kbps192,
            metadata: AudioMetadata::default(),
        }
    }
}

/// Export result
#[derive(Debug, Clone)]
pub struct MixerResult {
    /// Output file path (with extension)
    pub output_file: PathBuf,
    /// Total duration in seconds
    pub total_duration_secs: f64,
    /// File size in bytes
    pub file_size_bytes: u64,
    /// Export duration in milliseconds
    pub duration_ms: u64,
}

// ============================================================================
// PCM TRACK
// ============================================================================

/// Mono 16-bit PCM audio held in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmTrack {
    samples: Vec<i16>,
    sample_rate: u32,
}

impl PcmTrack {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    /// Empty track at the given rate
    pub fn empty(sample_rate: u32) -> Self {
        Self::new(Vec::new(), sample_rate)
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Append another track; both must share a sample rate
    pub fn append(&mut self, other: &PcmTrack) -> PodcastResult<()> {
        if other.sample_rate != self.sample_rate {
            return Err(PodcastError::AssemblyFailed(format!(
                "sample rate mismatch: expected {}, got {}",
                self.sample_rate, other.sample_rate
            )));
        }
        self.samples.extend_from_slice(&other.samples);
        Ok(())
    }

    /// Scale the signal down by `db` decibels
    pub fn attenuate(&self, db: f32) -> PcmTrack {
        let factor = 10_f32.powf(-db.abs() / 20.0);
        let samples = self
            .samples
            .iter()
            .map(|&s| (s as f32 * factor).round() as i16)
            .collect();
        PcmTrack::new(samples, self.sample_rate)
    }

    /// Repeat end-to-end until `target_len` samples are covered, then cut
    pub fn loop_to_len(&self, target_len: usize) -> PcmTrack {
        if self.samples.is_empty() {
            return PcmTrack::new(vec![0; target_len], self.sample_rate);
        }
        let plan = LoopPlan::new(target_len, self.samples.len());
        let mut samples = Vec::with_capacity(plan.looped_len);
        for _ in 0..plan.loops {
            samples.extend_from_slice(&self.samples);
        }
        samples.truncate(plan.truncated_len);
        PcmTrack::new(samples, self.sample_rate)
    }

    /// Additive mix of `other` onto this track, clipped to the i16 range
    ///
    /// Samples of `other` past this track's end are ignored.
    pub fn overlay(&mut self, other: &PcmTrack) -> PodcastResult<()> {
        if other.sample_rate != self.sample_rate {
            return Err(PodcastError::AssemblyFailed(format!(
                "cannot overlay {} Hz onto {} Hz",
                other.sample_rate, self.sample_rate
            )));
        }
        for (base, extra) in self.samples.iter_mut().zip(other.samples.iter()) {
            *base = base.saturating_add(*extra);
        }
        Ok(())
    }

    /// Linear-interpolation resampling
    pub fn resample(&self, target_rate: u32) -> PcmTrack {
        if self.sample_rate == target_rate || self.samples.is_empty() || self.sample_rate == 0 {
            return PcmTrack::new(self.samples.clone(), target_rate);
        }

        let ratio = self.sample_rate as f64 / target_rate as f64;
        let out_len = ((self.samples.len() as f64) / ratio).round().max(1.0) as usize;
        let last = self.samples.len() - 1;

        let samples = (0..out_len)
            .map(|i| {
                let pos = i as f64 * ratio;
                let idx = (pos.floor() as usize).min(last);
                let next = (idx + 1).min(last);
                let frac = pos - idx as f64;
                let a = self.samples[idx] as f64;
                let b = self.samples[next] as f64;
                (a + (b - a) * frac).round() as i16
            })
            .collect();

        PcmTrack::new(samples, target_rate)
    }
}

/// How a short track is repeated to cover a longer one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopPlan {
    /// Number of full repetitions
    pub loops: usize,
    /// Length after looping
    pub looped_len: usize,
    /// Length after cutting to the base track
    pub truncated_len: usize,
}

impl LoopPlan {
    /// `loops = base / track + 1`, always at least covering the base
    pub fn new(base_len: usize, track_len: usize) -> Self {
        let track_len = track_len.max(1);
        let loops = base_len / track_len + 1;
        Self {
            loops,
            looped_len: loops * track_len,
            truncated_len: base_len,
        }
    }
}

/// Concatenate tracks in order into one track at `sample_rate`
pub fn concat_tracks<'a>(
    tracks: impl IntoIterator<Item = &'a PcmTrack>,
    sample_rate: u32,
) -> PodcastResult<PcmTrack> {
    let mut combined = PcmTrack::empty(sample_rate);
    for track in tracks {
        combined.append(track)?;
    }
    Ok(combined)
}

// ============================================================================
// DECODING / CONFORMING
// ============================================================================

/// Decode provider output and conform it to mono PCM16 at `target_rate`
pub fn conform(bytes: &[u8], encoding: AudioEncoding, target_rate: u32) -> PodcastResult<PcmTrack> {
    if bytes.is_empty() {
        return Err(PodcastError::EncodingError("provider returned no audio".into()));
    }

    // Some endpoints wrap "raw" output in a RIFF header anyway
    let track = if bytes.starts_with(b"RIFF") {
        decode_wav(bytes)?
    } else {
        match encoding {
            AudioEncoding::Wav => {
                return Err(PodcastError::EncodingError("missing RIFF header".into()));
            }
            AudioEncoding::RawPcm16 { sample_rate } => decode_raw_pcm16(bytes, sample_rate)?,
            AudioEncoding::Mp3 => decode_with_ffmpeg(bytes, "mp3", target_rate)?,
        }
    };

    Ok(track.resample(target_rate))
}

/// Decode a WAV container, downmixing to mono
pub fn decode_wav(bytes: &[u8]) -> PodcastResult<PcmTrack> {
    let reader = hound::WavReader::new(Cursor::new(bytes))?;
    read_wav_samples(reader)
}

/// Read a WAV file from disk, downmixing to mono
pub fn read_wav_file(path: &Path) -> PodcastResult<PcmTrack> {
    let reader = hound::WavReader::open(path)?;
    read_wav_samples(reader)
}

fn read_wav_samples<R: std::io::Read>(mut reader: hound::WavReader<R>) -> PodcastResult<PcmTrack> {
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Float, _) => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
            .collect::<Result<_, _>>()?,
        (hound::SampleFormat::Int, bits) if bits <= 16 => {
            let shift = 16 - bits;
            reader
                .samples::<i16>()
                .map(|s| s.map(|v| v << shift))
                .collect::<Result<_, _>>()?
        }
        (hound::SampleFormat::Int, bits) => {
            let shift = bits - 16;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| (v >> shift) as i16))
                .collect::<Result<_, _>>()?
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| (frame.iter().map(|&s| s as i32).sum::<i32>() / frame.len() as i32) as i16)
            .collect()
    };

    Ok(PcmTrack::new(samples, spec.sample_rate))
}

fn decode_raw_pcm16(bytes: &[u8], sample_rate: u32) -> PodcastResult<PcmTrack> {
    if bytes.len() % 2 != 0 {
        return Err(PodcastError::EncodingError(format!(
            "odd PCM16 payload length {}",
            bytes.len()
        )));
    }
    let samples = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    Ok(PcmTrack::new(samples, sample_rate))
}

/// Decode a compressed payload to mono WAV at `target_rate` with ffmpeg
pub fn decode_with_ffmpeg(bytes: &[u8], extension: &str, target_rate: u32) -> PodcastResult<PcmTrack> {
    let input = tempfile::Builder::new()
        .prefix("podcast-in-")
        .suffix(&format!(".{}", extension))
        .tempfile()?;
    std::fs::write(input.path(), bytes)?;
    decode_file_with_ffmpeg(input.path(), target_rate)
}

/// Decode any ffmpeg-readable file to a mono track at `target_rate`
pub fn decode_file_with_ffmpeg(path: &Path, target_rate: u32) -> PodcastResult<PcmTrack> {
    let output = tempfile::Builder::new()
        .prefix("podcast-dec-")
        .suffix(".wav")
        .tempfile()?;

    let result = Command::new("ffmpeg")
        .arg("-y")
        .arg("-loglevel")
        .arg("error")
        .arg("-i")
        .arg(path)
        .arg("-ac")
        .arg("1")
        .arg("-ar")
        .arg(target_rate.to_string())
        .arg("-sample_fmt")
        .arg("s16")
        .arg(output.path())
        .output()
        .map_err(|e| {
            PodcastError::EncodingError(format!("ffmpeg conversion failed: {}. Is ffmpeg installed?", e))
        })?;

    if !result.status.success() {
        return Err(PodcastError::EncodingError(format!(
            "ffmpeg could not decode {}: {}",
            path.display(),
            String::from_utf8_lossy(&result.stderr).trim()
        )));
    }

    read_wav_file(output.path())
}

// ============================================================================
// OUTPUT
// ============================================================================

/// Write a track as mono 16-bit WAV
pub fn write_wav_file(path: &Path, track: &PcmTrack) -> PodcastResult<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: track.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in track.samples() {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// First free `stem.ext`, `stem(1).ext`, `stem(2).ext`, ... in `dir`
pub fn unique_output_path(dir: &Path, stem: &str, extension: &str) -> PathBuf {
    let candidate = dir.join(format!("{}.{}", stem, extension));
    if !candidate.exists() {
        return candidate;
    }
    let mut counter = 1usize;
    loop {
        let candidate = dir.join(format!("{}({}).{}", stem, counter, extension));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Final encoder for assembled tracks
pub struct AudioMixer {
    config: MixerConfig,
}

impl AudioMixer {
    pub fn new(config: MixerConfig) -> Self {
        Self { config }
    }

    /// Encode `track` to `path` in the configured format
    pub fn export(&self, track: &PcmTrack, path: &Path) -> PodcastResult<MixerResult> {
        let start_time = std::time::Instant::now();

        if track.is_empty() {
            return Err(PodcastError::AssemblyFailed("nothing to export".into()));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PodcastError::AssemblyFailed(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        let written = match self.config.export_format {
            ExportFormat::Wav => write_wav_file(path, track).map_err(|e| {
                PodcastError::AssemblyFailed(format!("WAV export to {} failed: {}", path.display(), e))
            }),
            ExportFormat::Mp3 => self.write_mp3_file(path, track),
        };
        if let Err(e) = written {
            if path.exists() {
                let _ = std::fs::remove_file(path);
            }
            return Err(e);
        }

        let file_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        ::log::info!(
            "Exported {:.1}s of audio to {} ({} bytes)",
            track.duration_secs(),
            path.display(),
            file_size
        );

        Ok(MixerResult {
            output_file: path.to_path_buf(),
            total_duration_secs: track.duration_secs(),
            file_size_bytes: file_size,
            duration_ms: start_time.elapsed().as_millis() as u64,
        })
    }

    /// Write an MP3 through a temporary WAV and ffmpeg, with ID3 tags
    fn write_mp3_file(&self, path: &Path, track: &PcmTrack) -> PodcastResult<()> {
        let temp_wav = tempfile::Builder::new()
            .prefix("podcast-export-")
            .suffix(".wav")
            .tempfile()
            .map_err(|e| PodcastError::AssemblyFailed(format!("cannot create temporary WAV: {}", e)))?;
        write_wav_file(temp_wav.path(), track)
            .map_err(|e| PodcastError::AssemblyFailed(format!("temporary WAV write failed: {}", e)))?;

        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-y")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(temp_wav.path())
            .arg("-codec:a")
            .arg("libmp3lame")
            .arg("-b:a")
            .arg(format!("{}k", self.config.mp3_bitrate.kbps()));

        let metadata = &self.config.metadata;
        let tags = [
            ("title", &metadata.title),
            ("artist", &metadata.artist),
            ("album", &metadata.album),
            ("date", &metadata.date),
            ("comment", &metadata.comment),
        ];
        for (key, value) in tags {
            if let Some(value) = value {
                cmd.arg("-metadata").arg(format!("{}={}", key, value));
            }
        }
        cmd.arg("-metadata")
            .arg(format!("encoded_by=MoFA Podcast v{}", env!("CARGO_PKG_VERSION")));
        cmd.arg(path);

        let output = cmd.output().map_err(|e| {
            PodcastError::AssemblyFailed(format!("ffmpeg conversion failed: {}. Is ffmpeg installed?", e))
        })?;

        if !output.status.success() {
            let _ = std::fs::remove_file(path);
            return Err(PodcastError::AssemblyFailed(format!(
                "ffmpeg MP3 export failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        ::log::info!(
            "MP3 export with ID3 tags completed: {} ({})",
            path.display(),
            self.config.mp3_bitrate.display_name()
        );
        Ok(())
    }
}

impl Default for AudioMixer {
    fn default() -> Self {
        Self::new(MixerConfig::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize, rate: u32) -> PcmTrack {
        PcmTrack::new((0..len).map(|i| (i % 100) as i16).collect(), rate)
    }

    #[test]
    fn test_loop_plan_for_130s_over_40s() {
        let rate = 100;
        let plan = LoopPlan::new(130 * rate, 40 * rate);
        assert_eq!(plan.loops, 4);
        assert_eq!(plan.looped_len, 160 * rate);
        assert_eq!(plan.truncated_len, 130 * rate);

        let music = ramp(40 * rate, rate as u32);
        let looped = music.loop_to_len(130 * rate);
        assert_eq!(looped.len(), 130 * rate);
        assert!((looped.duration_secs() - 130.0).abs() < 1e-9);
        // Second repetition starts where the first did
        assert_eq!(looped.samples()[40 * rate], music.samples()[0]);
    }

    #[test]
    fn test_attenuate_20db() {
        let track = PcmTrack::new(vec![10_000, -10_000, 0], 24_000);
        let quiet = track.attenuate(20.0);
        assert_eq!(quiet.samples(), &[1_000, -1_000, 0]);
    }

    #[test]
    fn test_overlay_is_additive_and_saturating() {
        let mut base = PcmTrack::new(vec![100, 200, i16::MAX, 5], 24_000);
        let music = PcmTrack::new(vec![1, 2, 3], 24_000);
        base.overlay(&music).unwrap();
        assert_eq!(base.samples(), &[101, 202, i16::MAX, 5]);

        let other_rate = PcmTrack::new(vec![1], 16_000);
        assert!(base.overlay(&other_rate).is_err());
    }

    #[test]
    fn test_concat_keeps_order() {
        let a = PcmTrack::new(vec![1, 2], 24_000);
        let b = PcmTrack::new(vec![3], 24_000);
        let joined = concat_tracks([&a, &b], 24_000).unwrap();
        assert_eq!(joined.samples(), &[1, 2, 3]);

        let c = PcmTrack::new(vec![4], 22_050);
        assert!(matches!(
            concat_tracks([&a, &c], 24_000),
            Err(PodcastError::AssemblyFailed(_))
        ));
    }

    #[test]
    fn test_resample_changes_length() {
        let track = ramp(22_050, 22_050);
        let resampled = track.resample(24_000);
        assert_eq!(resampled.sample_rate(), 24_000);
        assert_eq!(resampled.len(), 24_000);
    }

    #[test]
    fn test_conform_raw_pcm() {
        let bytes: Vec<u8> = [1i16, -2, 300].iter().flat_map(|s| s.to_le_bytes()).collect();
        let track = conform(&bytes, AudioEncoding::RawPcm16 { sample_rate: 24_000 }, 24_000).unwrap();
        assert_eq!(track.samples(), &[1, -2, 300]);

        assert!(matches!(
            conform(&bytes[..3], AudioEncoding::RawPcm16 { sample_rate: 24_000 }, 24_000),
            Err(PodcastError::EncodingError(_))
        ));
        assert!(matches!(
            conform(&[], AudioEncoding::Wav, 24_000),
            Err(PodcastError::EncodingError(_))
        ));
    }

    #[test]
    fn test_conform_stereo_wav_downmixes() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 24_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for (l, r) in [(100i16, 300i16), (-50, -150)] {
                writer.write_sample(l).unwrap();
                writer.write_sample(r).unwrap();
            }
            writer.finalize().unwrap();
        }

        let track = conform(cursor.get_ref(), AudioEncoding::Wav, 24_000).unwrap();
        assert_eq!(track.samples(), &[200, -100]);
    }

    #[test]
    fn test_wav_export_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let track = ramp(2_400, 24_000);

        let mixer = AudioMixer::new(MixerConfig {
            export_format: ExportFormat::Wav,
            ..MixerConfig::default()
        });
        let result = mixer.export(&track, &path).unwrap();

        assert!(result.file_size_bytes > 44);
        assert!((result.total_duration_secs - 0.1).abs() < 1e-9);
        assert_eq!(read_wav_file(&path).unwrap(), track);
    }

    #[test]
    fn test_export_empty_track_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mixer = AudioMixer::default();
        let err = mixer
            .export(&PcmTrack::empty(24_000), &dir.path().join("x.mp3"))
            .unwrap_err();
        assert!(matches!(err, PodcastError::AssemblyFailed(_)));
    }

    #[test]
    fn test_export_into_blocked_dir_is_assembly_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let err = AudioMixer::default()
            .export(&ramp(800, 8_000), &blocker.join("podcast.wav"))
            .unwrap_err();
        assert!(matches!(err, PodcastError::AssemblyFailed(_)));
        assert_eq!(err.stage(), crate::error::Stage::Assembly);
    }

    #[test]
    fn test_unique_output_path_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let first = unique_output_path(dir.path(), "podcast", "mp3");
        assert_eq!(first, dir.path().join("podcast.mp3"));
        std::fs::write(&first, b"x").unwrap();

        let second = unique_output_path(dir.path(), "podcast", "mp3");
        assert_eq!(second, dir.path().join("podcast(1).mp3"));
        std::fs::write(&second, b"x").unwrap();

        let third = unique_output_path(dir.path(), "podcast", "mp3");
        assert_eq!(third, dir.path().join("podcast(2).mp3"));
    }

    #[test]
    fn test_format_serde_names() {
        let format: ExportFormat = serde_json::from_str("\"wav\"").unwrap();
        assert_eq!(format, ExportFormat::Wav);
        let bitrate: Mp3Bitrate = serde_json::from_str("\"320k\"").unwrap();
        assert_eq!(bitrate.kbps(), 320);
    }
}
