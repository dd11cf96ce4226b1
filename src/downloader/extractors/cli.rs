// CLI ExtractionCapability - drives the native `yt-dlp` binary
//
// Format listing uses `--dump-json`; fetching writes into the caller's output
// directory and reports the final path with `--print after_move:filepath`, so
// the executor never has to guess which file was produced.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use super::traits::{ExtractionCapability, FetchOutcome, FetchRequest, PostProcess, RawMediaInfo};
use crate::downloader::errors::CapabilityError;
use crate::downloader::tools::{ToolManager, ToolType};
use crate::downloader::utils::{last_error_line, run_output_with_timeout};

/// Listing makes several requests; the process gets this many socket timeouts
const LIST_DEADLINE_FACTOR: u32 = 4;

const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// yt-dlp backed capability
pub struct YtDlpCli {
    ytdlp_path: String,
    ffmpeg_path: Option<String>,
    ffprobe_path: String,
}

impl YtDlpCli {
    /// Locate tools; `ytdlp_override` wins over detection
    pub fn new(ytdlp_override: Option<String>) -> Self {
        let manager = ToolManager::new();
        let ytdlp_path = ytdlp_override.unwrap_or_else(|| manager.resolve(ToolType::YtDlp));
        let ffmpeg_path = manager.locate(ToolType::Ffmpeg);
        if ffmpeg_path.is_none() {
            warn!("ffmpeg not found; merging and audio extraction will fail");
        }

        Self {
            ytdlp_path,
            ffmpeg_path,
            ffprobe_path: manager.resolve(ToolType::Ffprobe),
        }
    }

    fn list_args(url: &str, client_identity: &str, timeout: Duration) -> Vec<String> {
        vec![
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            timeout.as_secs().max(1).to_string(),
            "--user-agent".to_string(),
            client_identity.to_string(),
            url.to_string(),
        ]
    }

    fn fetch_args(&self, request: &FetchRequest) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            request.format_spec.clone(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--no-progress".to_string(),
            "--socket-timeout".to_string(),
            request.socket_timeout.as_secs().max(1).to_string(),
            "--retries".to_string(),
            "3".to_string(),
            "--user-agent".to_string(),
            request.client_identity.clone(),
            "-P".to_string(),
            request.output_dir.to_string_lossy().to_string(),
            "-o".to_string(),
            "%(title).80B.%(ext)s".to_string(),
            "--restrict-filenames".to_string(),
            "--print".to_string(),
            "after_move:filepath".to_string(),
        ];

        if let Some(ffmpeg) = &self.ffmpeg_path {
            args.push("--ffmpeg-location".to_string());
            args.push(ffmpeg.clone());
        }

        match &request.postprocess {
            PostProcess::Merge { container } => {
                args.push("--merge-output-format".to_string());
                args.push(container.clone());
            }
            PostProcess::ExtractAudio { codec, quality } => {
                args.push("-x".to_string());
                args.push("--audio-format".to_string());
                args.push(codec.clone());
                args.push("--audio-quality".to_string());
                args.push(audio_quality_arg(quality));
            }
        }

        args.push(request.url.clone());
        args
    }

    fn parse_json(stdout: &[u8]) -> Result<RawMediaInfo, CapabilityError> {
        serde_json::from_slice(stdout)
            .map_err(|e| CapabilityError::ParseError(format!("Invalid JSON: {}", e)))
    }

    /// Last printed line is the final file path
    fn parse_reported_path(stdout: &[u8]) -> Option<PathBuf> {
        String::from_utf8_lossy(stdout)
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(PathBuf::from)
    }

    fn failure(output: &std::process::Output) -> CapabilityError {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let line = last_error_line(&stderr);
        if line.is_empty() {
            CapabilityError::Failed(format!("yt-dlp exited with {:?}", output.status.code()))
        } else {
            CapabilityError::Failed(line.to_string())
        }
    }
}

/// yt-dlp wants a bitrate like "192K" or a VBR level 0-10
fn audio_quality_arg(quality: &str) -> String {
    match quality.trim().parse::<u32>() {
        Ok(n) if n > 10 => format!("{}K", n),
        _ => quality.trim().to_string(),
    }
}

fn map_run_error(e: String, limit: Duration) -> CapabilityError {
    if e.starts_with("Timed out") {
        CapabilityError::TimedOut(limit.as_secs())
    } else {
        CapabilityError::from(e)
    }
}

impl Default for YtDlpCli {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl ExtractionCapability for YtDlpCli {
    fn name(&self) -> &'static str {
        "cli-yt-dlp"
    }

    async fn list_formats(
        &self,
        url: &str,
        client_identity: &str,
        timeout: Duration,
    ) -> Result<RawMediaInfo, CapabilityError> {
        let args = Self::list_args(url, client_identity, timeout);
        let limit = timeout * LIST_DEADLINE_FACTOR;
        debug!(program = %self.ytdlp_path, "listing formats");

        let output = run_output_with_timeout(&self.ytdlp_path, args, limit)
            .await
            .map_err(|e| map_run_error(e, limit))?;

        if !output.status.success() {
            return Err(Self::failure(&output));
        }
        Self::parse_json(&output.stdout)
    }

    async fn fetch_format(&self, request: &FetchRequest) -> Result<FetchOutcome, CapabilityError> {
        let args = self.fetch_args(request);
        debug!(format_spec = %request.format_spec, "fetching format");

        let output = run_output_with_timeout(&self.ytdlp_path, args, request.deadline)
            .await
            .map_err(|e| map_run_error(e, request.deadline))?;

        if !output.status.success() {
            return Err(Self::failure(&output));
        }
        Ok(FetchOutcome {
            reported_path: Self::parse_reported_path(&output.stdout),
        })
    }

    async fn probe_size(&self, path: &Path) -> Option<u64> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-show_entries".to_string(),
            "format=size".to_string(),
            "-of".to_string(),
            "default=noprint_wrappers=1:nokey=1".to_string(),
            path.to_string_lossy().to_string(),
        ];
        let output = run_output_with_timeout(&self.ffprobe_path, args, PROBE_TIMEOUT)
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        String::from_utf8_lossy(&output.stdout).trim().parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli() -> YtDlpCli {
        YtDlpCli {
            ytdlp_path: "yt-dlp".to_string(),
            ffmpeg_path: None,
            ffprobe_path: "ffprobe".to_string(),
        }
    }

    fn request(postprocess: PostProcess) -> FetchRequest {
        FetchRequest {
            url: "https://video.example/x".to_string(),
            format_spec: "137+140".to_string(),
            client_identity: "ua".to_string(),
            output_dir: PathBuf::from("/work/dir"),
            postprocess,
            socket_timeout: Duration::from_secs(30),
            deadline: Duration::from_secs(300),
        }
    }

    #[test]
    fn list_args_carry_identity_and_timeout() {
        let args = YtDlpCli::list_args("https://v.example/a", "agent-1", Duration::from_secs(30));
        let joined = args.join(" ");
        assert!(joined.contains("--user-agent agent-1"));
        assert!(joined.contains("--socket-timeout 30"));
        assert_eq!(args.last().map(String::as_str), Some("https://v.example/a"));
    }

    #[test]
    fn merge_args() {
        let args = cli().fetch_args(&request(PostProcess::Merge {
            container: "mp4".to_string(),
        }));
        let joined = args.join(" ");
        assert!(joined.contains("-f 137+140"));
        assert!(joined.contains("--merge-output-format mp4"));
        assert!(joined.contains("-P /work/dir"));
        assert!(!joined.contains(" -x "));
    }

    #[test]
    fn audio_extract_args() {
        let args = cli().fetch_args(&request(PostProcess::ExtractAudio {
            codec: "mp3".to_string(),
            quality: "192".to_string(),
        }));
        let joined = args.join(" ");
        assert!(joined.contains("-x --audio-format mp3 --audio-quality 192K"));
    }

    #[test]
    fn audio_quality_levels_pass_through() {
        assert_eq!(audio_quality_arg("192"), "192K");
        assert_eq!(audio_quality_arg("5"), "5");
        assert_eq!(audio_quality_arg("128K"), "128K");
    }

    #[test]
    fn reported_path_is_last_line() {
        let stdout = b"/work/dir/first.webm\n/work/dir/Final_Title.mp4\n\n";
        assert_eq!(
            YtDlpCli::parse_reported_path(stdout),
            Some(PathBuf::from("/work/dir/Final_Title.mp4"))
        );
        assert_eq!(YtDlpCli::parse_reported_path(b""), None);
    }

    #[test]
    fn parse_dump_json() {
        let json = br#"{
            "id": "abc",
            "title": "Clip",
            "duration": 80,
            "formats": [
                {"format_id": "18", "ext": "mp4", "vcodec": "avc1", "acodec": "mp4a", "resolution": "640x360"},
                {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a", "abr": 129.5}
            ]
        }"#;
        let info = YtDlpCli::parse_json(json).unwrap();
        assert_eq!(info.title.as_deref(), Some("Clip"));
        assert_eq!(info.duration, Some(80.0));
        assert_eq!(info.formats.len(), 2);
        assert!(YtDlpCli::parse_json(b"not json").is_err());
    }

    #[test]
    fn timeout_maps_to_timed_out() {
        let err = map_run_error("Timed out after 120s".to_string(), Duration::from_secs(120));
        assert_eq!(err, CapabilityError::TimedOut(120));
    }
}
