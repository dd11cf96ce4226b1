// ExtractionCapability trait and raw descriptor types

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::downloader::errors::CapabilityError;

/// One encoding as the extractor reports it (yt-dlp `formats[]` entry)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawFormatDescriptor {
    /// Format ID (e.g., "137", "140")
    pub format_id: String,
    /// File extension (mp4, webm, m4a)
    pub ext: Option<String>,
    /// Resolution string (e.g., "1920x1080" or "audio only")
    pub resolution: Option<String>,
    #[serde(deserialize_with = "lenient_u32")]
    pub width: Option<u32>,
    #[serde(deserialize_with = "lenient_u32")]
    pub height: Option<u32>,
    pub fps: Option<f32>,
    /// Video codec (avc1, vp9, av01, none)
    pub vcodec: Option<String>,
    /// Audio codec (mp4a, opus, none)
    pub acodec: Option<String>,
    /// Exact file size in bytes
    #[serde(deserialize_with = "lenient_u64")]
    pub filesize: Option<u64>,
    /// Approximate file size (when exact is unknown)
    #[serde(deserialize_with = "lenient_u64")]
    pub filesize_approx: Option<u64>,
    /// Total bitrate in kbps
    pub tbr: Option<f64>,
    /// Audio bitrate in kbps
    pub abr: Option<f64>,
    /// Video bitrate in kbps
    pub vbr: Option<f64>,
    /// Format note (e.g., "1080p", "tiny")
    pub format_note: Option<String>,
}

// Some extractors report sizes and dimensions as floats
fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| {
        v.as_u64()
            .or_else(|| v.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64))
    }))
}

fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    Ok(lenient_u64(deserializer)?.and_then(|v| u32::try_from(v).ok()))
}

/// Media metadata plus every reported format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawMediaInfo {
    pub id: Option<String>,
    pub title: Option<String>,
    pub uploader: Option<String>,
    /// Seconds; fractional for some sites
    pub duration: Option<f64>,
    pub webpage_url: Option<String>,
    pub formats: Vec<RawFormatDescriptor>,
}

/// Post-processing the capability must apply to the fetched streams
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostProcess {
    /// Merge separate streams into one container
    Merge { container: String },
    /// Transcode to audio only, discarding video
    ExtractAudio { codec: String, quality: String },
}

/// Everything one fetch invocation needs
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    /// Bare id, `video+audio` pairing, or a selector such as `bestaudio/best`
    pub format_spec: String,
    pub client_identity: String,
    /// Directory the capability must write into; nothing else is touched
    pub output_dir: PathBuf,
    pub postprocess: PostProcess,
    /// Socket timeout for individual network calls
    pub socket_timeout: Duration,
    /// Wall-clock ceiling for the whole invocation
    pub deadline: Duration,
}

/// What the capability knows about its output
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Final file path, when the tool reports it
    pub reported_path: Option<PathBuf>,
}

/// Black-box media extraction capability
#[async_trait]
pub trait ExtractionCapability: Send + Sync {
    /// Name of the capability (for logging)
    fn name(&self) -> &'static str;

    /// List every encoding available for `url`
    async fn list_formats(
        &self,
        url: &str,
        client_identity: &str,
        timeout: Duration,
    ) -> Result<RawMediaInfo, CapabilityError>;

    /// Retrieve `request.format_spec` into `request.output_dir`
    async fn fetch_format(&self, request: &FetchRequest) -> Result<FetchOutcome, CapabilityError>;

    /// Exact size of a finished file by external means, used when the
    /// filesystem reports zero bytes
    async fn probe_size(&self, _path: &Path) -> Option<u64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_tolerates_floats_and_nulls() {
        let json = r#"{
            "format_id": "137",
            "ext": "mp4",
            "width": 1920,
            "height": 1080.0,
            "vcodec": "avc1.640028",
            "acodec": "none",
            "filesize": null,
            "filesize_approx": 1234567.8,
            "tbr": 4400.5,
            "unknown_field": [1, 2]
        }"#;
        let desc: RawFormatDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(desc.height, Some(1080));
        assert_eq!(desc.filesize, None);
        assert_eq!(desc.filesize_approx, Some(1_234_567));
        assert_eq!(desc.abr, None);
    }

    #[test]
    fn huge_float_sizes_saturate() {
        let json = r#"{"format_id": "137", "filesize": 1e300, "filesize_approx": -5}"#;
        let desc: RawFormatDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(desc.filesize, Some(u64::MAX));
        assert_eq!(desc.filesize_approx, None);
    }
}
