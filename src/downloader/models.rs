// Common data models for the negotiation engine

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Stream composition of a format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    /// Carries both video and audio
    Muxed,
    VideoOnly,
    AudioOnly,
}

impl FormatKind {
    /// Derive the kind from codec presence. `None` when neither stream exists
    /// (storyboards, thumbnails).
    pub fn from_codecs(has_video: bool, has_audio: bool) -> Option<Self> {
        match (has_video, has_audio) {
            (true, true) => Some(Self::Muxed),
            (true, false) => Some(Self::VideoOnly),
            (false, true) => Some(Self::AudioOnly),
            (false, false) => None,
        }
    }

    /// Position in catalog order
    pub fn rank(&self) -> u8 {
        match self {
            Self::Muxed => 0,
            Self::VideoOnly => 1,
            Self::AudioOnly => 2,
        }
    }
}

/// Frame size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Parse the extractor's "1920x1080" notation
    pub fn parse(text: &str) -> Option<Self> {
        let (w, h) = text.trim().split_once('x')?;
        let width = w.trim().parse().ok()?;
        let height = h.trim().parse().ok()?;
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self { width, height })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Where a record's size figure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeSource {
    /// Exact size reported by the extractor
    Reported,
    /// Extractor's own approximation
    Approximate,
    /// bitrate × duration estimate
    Estimated,
    Unknown,
}

/// Treat missing, empty and "none" codecs as absent
fn normalize_codec(codec: Option<String>) -> Option<String> {
    codec
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("none"))
}

/// One selectable encoding.
///
/// `kind` is private and derived from the codec fields in [`FormatRecord::new`];
/// there is no way to set it on its own.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatRecord {
    pub id: String,
    kind: FormatKind,
    pub resolution: Option<Resolution>,
    video_codec: Option<String>,
    audio_codec: Option<String>,
    pub bitrate_kbps: Option<f64>,
    pub size_bytes: Option<u64>,
    pub size_source: SizeSource,
    /// File extension hint (mp4, webm, m4a)
    pub container: String,
    pub fps: Option<f32>,
    /// Extractor's format note (e.g. "1080p", "medium")
    pub note: Option<String>,
}

impl FormatRecord {
    /// Build a record from codec strings. Returns `None` when neither codec
    /// is present.
    pub fn new(
        id: impl Into<String>,
        container: impl Into<String>,
        video_codec: Option<String>,
        audio_codec: Option<String>,
    ) -> Option<Self> {
        let video_codec = normalize_codec(video_codec);
        let audio_codec = normalize_codec(audio_codec);
        let kind = FormatKind::from_codecs(video_codec.is_some(), audio_codec.is_some())?;

        Some(Self {
            id: id.into(),
            kind,
            resolution: None,
            video_codec,
            audio_codec,
            bitrate_kbps: None,
            size_bytes: None,
            size_source: SizeSource::Unknown,
            container: container.into(),
            fps: None,
            note: None,
        })
    }

    pub fn with_resolution(mut self, resolution: Option<Resolution>) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_bitrate(mut self, kbps: Option<f64>) -> Self {
        self.bitrate_kbps = kbps;
        self
    }

    pub fn with_size(mut self, bytes: Option<u64>, source: SizeSource) -> Self {
        self.size_bytes = bytes;
        self.size_source = if bytes.is_some() { source } else { SizeSource::Unknown };
        self
    }

    pub fn kind(&self) -> FormatKind {
        self.kind
    }

    pub fn video_codec(&self) -> Option<&str> {
        self.video_codec.as_deref()
    }

    pub fn audio_codec(&self) -> Option<&str> {
        self.audio_codec.as_deref()
    }

    pub fn has_video(&self) -> bool {
        self.video_codec.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio_codec.is_some()
    }

    /// Synthesize the record describing a video-only + audio-only pairing.
    ///
    /// Size is the sum when both sides are known and unknown otherwise
    /// (including a sum that does not fit); bitrate sums whatever is known.
    pub fn combine(video: &FormatRecord, audio: &FormatRecord, container: &str) -> FormatRecord {
        let size_bytes = match (video.size_bytes, audio.size_bytes) {
            (Some(v), Some(a)) => v.checked_add(a),
            _ => None,
        };
        let size_source = if size_bytes.is_none() {
            SizeSource::Unknown
        } else if video.size_source == SizeSource::Reported
            && audio.size_source == SizeSource::Reported
        {
            SizeSource::Reported
        } else {
            SizeSource::Estimated
        };
        let bitrate_kbps = match (video.bitrate_kbps, audio.bitrate_kbps) {
            (None, None) => None,
            (v, a) => Some(v.unwrap_or(0.0) + a.unwrap_or(0.0)),
        };

        FormatRecord {
            id: format!("{}+{}", video.id, audio.id),
            kind: FormatKind::Muxed,
            resolution: video.resolution,
            video_codec: video.video_codec.clone(),
            audio_codec: audio.audio_codec.clone(),
            bitrate_kbps,
            size_bytes,
            size_source,
            container: container.to_string(),
            fps: video.fps,
            note: video.note.clone(),
        }
    }
}

/// Menu category a user can browse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    All,
    Muxed,
    VideoOnly,
    AudioOnly,
    /// Pair a video-only with an audio-only format
    Combine,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::All,
        Category::Muxed,
        Category::VideoOnly,
        Category::AudioOnly,
        Category::Combine,
    ];

    /// Whether a record of `kind` is listed under this category. Combine
    /// starts from video-only candidates.
    pub fn admits(&self, kind: FormatKind) -> bool {
        match self {
            Self::All => true,
            Self::Muxed => kind == FormatKind::Muxed,
            Self::VideoOnly | Self::Combine => kind == FormatKind::VideoOnly,
            Self::AudioOnly => kind == FormatKind::AudioOnly,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Muxed => "muxed",
            Self::VideoOnly => "video_only",
            Self::AudioOnly => "audio_only",
            Self::Combine => "combine",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == text)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered formats for one resolved URL
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    pub source_url: String,
    pub title: String,
    pub uploader: Option<String>,
    pub duration_seconds: Option<f64>,
    pub formats: Vec<FormatRecord>,
}

impl Catalog {
    pub fn get(&self, id: &str) -> Option<&FormatRecord> {
        self.formats.iter().find(|f| f.id == id)
    }

    /// Records listed under `category`, in catalog order
    pub fn filter(&self, category: Category) -> Vec<&FormatRecord> {
        self.formats
            .iter()
            .filter(|f| category.admits(f.kind()))
            .collect()
    }

    pub fn count(&self, kind: FormatKind) -> usize {
        self.formats.iter().filter(|f| f.kind() == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}

/// How the resolved target should be produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionMode {
    /// Named format, merged into one container if needed
    Video,
    /// Best audio, transcoded to the configured lossy codec
    AudioExtract,
    /// video-only + audio-only merged into one container
    MuxedCombine,
}

/// Fully resolved, executable download request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AcquisitionTarget {
    Single {
        format_id: String,
        mode: AcquisitionMode,
    },
    Combined {
        video_format_id: String,
        audio_format_id: String,
    },
}

impl AcquisitionTarget {
    pub fn video(format_id: impl Into<String>) -> Self {
        Self::Single {
            format_id: format_id.into(),
            mode: AcquisitionMode::Video,
        }
    }

    pub fn audio_extract(format_id: impl Into<String>) -> Self {
        Self::Single {
            format_id: format_id.into(),
            mode: AcquisitionMode::AudioExtract,
        }
    }

    pub fn combined(video: impl Into<String>, audio: impl Into<String>) -> Self {
        Self::Combined {
            video_format_id: video.into(),
            audio_format_id: audio.into(),
        }
    }

    pub fn mode(&self) -> AcquisitionMode {
        match self {
            Self::Single { mode, .. } => *mode,
            Self::Combined { .. } => AcquisitionMode::MuxedCombine,
        }
    }

    /// Id as shown to the user ("137+140" for pairings)
    pub fn display_id(&self) -> String {
        match self {
            Self::Single { format_id, .. } => format_id.clone(),
            Self::Combined {
                video_format_id,
                audio_format_id,
            } => format!("{}+{}", video_format_id, audio_format_id),
        }
    }

    /// Format selector handed to the extraction capability
    pub fn format_spec(&self) -> String {
        match self.mode() {
            AcquisitionMode::AudioExtract => "bestaudio/best".to_string(),
            _ => self.display_id(),
        }
    }
}

/// A validated file on disk.
///
/// Owns the per-invocation working directory: dropping the result deletes the
/// directory and the file in it. Call [`DownloadResult::persist_into`] to keep
/// the file.
#[derive(Debug)]
pub struct DownloadResult {
    pub local_path: PathBuf,
    pub size_bytes: u64,
    pub title: String,
    workdir: TempDir,
}

impl DownloadResult {
    pub(crate) fn new(local_path: PathBuf, size_bytes: u64, title: String, workdir: TempDir) -> Self {
        Self {
            local_path,
            size_bytes,
            title,
            workdir,
        }
    }

    /// Working directory backing this result
    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    pub fn summary(&self) -> DownloadSummary {
        DownloadSummary {
            file_name: self
                .local_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            size_bytes: self.size_bytes,
            title: self.title.clone(),
        }
    }

    /// Move the file into `dir` and remove the working directory.
    pub fn persist_into(self, dir: &Path) -> std::io::Result<PathBuf> {
        let file_name = self
            .local_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "download".into());
        let dest = dir.join(file_name);
        if std::fs::rename(&self.local_path, &dest).is_err() {
            // rename fails across filesystems
            std::fs::copy(&self.local_path, &dest)?;
        }
        self.workdir.close()?;
        Ok(dest)
    }

    /// Delete the file and its working directory now.
    pub fn cleanup(self) -> std::io::Result<()> {
        self.workdir.close()
    }
}

/// Serializable view of a [`DownloadResult`] for presentation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSummary {
    pub file_name: String,
    pub size_bytes: u64,
    pub title: String,
}
