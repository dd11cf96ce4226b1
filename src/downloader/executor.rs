// Acquisition executor - resolved target in, validated file out
//
// Each attempt runs in its own temporary directory; the directory is the unit
// of cleanup. Dropping it (on any error path) removes whatever the tool left
// behind. The delivered `DownloadResult` takes ownership of the directory.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::config::EngineConfig;
use super::errors::{CapabilityError, DownloadError};
use super::extractors::{diagnose_capability_error, ExtractionCapability, FetchOutcome, FetchRequest, PostProcess};
use super::models::{AcquisitionMode, AcquisitionTarget, DownloadResult};
use super::utils::safe_diagnostic;

/// Extensions of in-progress files yt-dlp leaves next to the output
const PARTIAL_SUFFIXES: [&str; 3] = [".part", ".ytdl", ".temp"];

fn io_error(context: &str, e: std::io::Error) -> DownloadError {
    DownloadError::Unknown {
        detail: safe_diagnostic(&format!("{}: {}", context, e)),
    }
}

fn is_partial(name: &str) -> bool {
    name.starts_with('.') || PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// Finished files in `dir`, sorted by name
async fn list_outputs(dir: &Path) -> Result<Vec<PathBuf>, DownloadError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| io_error("reading work dir", e))?;
    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| io_error("reading work dir", e))?
    {
        let name = entry.file_name().to_string_lossy().to_string();
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if is_file && !is_partial(&name) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

pub struct AcquisitionExecutor {
    capability: Arc<dyn ExtractionCapability>,
    config: Arc<EngineConfig>,
}

impl AcquisitionExecutor {
    pub fn new(capability: Arc<dyn ExtractionCapability>, config: Arc<EngineConfig>) -> Self {
        Self { capability, config }
    }

    fn postprocess(&self, mode: AcquisitionMode) -> PostProcess {
        match mode {
            AcquisitionMode::AudioExtract => PostProcess::ExtractAudio {
                codec: self.config.audio_codec.clone(),
                quality: self.config.audio_quality.clone(),
            },
            AcquisitionMode::Video | AcquisitionMode::MuxedCombine => PostProcess::Merge {
                container: self.config.merge_container.clone(),
            },
        }
    }

    fn work_dir(&self) -> Result<TempDir, DownloadError> {
        let root = self.config.work_root();
        std::fs::create_dir_all(&root).map_err(|e| io_error("creating work root", e))?;
        tempfile::Builder::new()
            .prefix("videodown-")
            .tempdir_in(&root)
            .map_err(|e| io_error("creating work dir", e))
    }

    /// Retrieve `target` from `source_url`.
    ///
    /// Transient failures are retried up to `download_attempts` with client
    /// identity rotation; a fetch that runs past the transcode ceiling is
    /// fatal. The returned result owns its working directory.
    pub async fn acquire(
        &self,
        target: &AcquisitionTarget,
        source_url: &str,
        title: &str,
    ) -> Result<DownloadResult, DownloadError> {
        let attempts = self.config.download_attempts.max(1);
        let format_spec = target.format_spec();
        let mut last_error = DownloadError::Unknown {
            detail: "no attempts made".to_string(),
        };

        for attempt in 0..attempts {
            if attempt > 0 && !self.config.retry_delay().is_zero() {
                tokio::time::sleep(self.config.retry_delay()).await;
            }

            let workdir = self.work_dir()?;
            let request = FetchRequest {
                url: source_url.to_string(),
                format_spec: format_spec.clone(),
                client_identity: self.config.identity_for_attempt(attempt).to_string(),
                output_dir: workdir.path().to_path_buf(),
                postprocess: self.postprocess(target.mode()),
                socket_timeout: self.config.extraction_timeout(),
                deadline: self.config.transcode_timeout(),
            };
            debug!(
                url = source_url,
                format_spec = %format_spec,
                attempt = attempt + 1,
                capability = self.capability.name(),
                "fetching"
            );

            match self.capability.fetch_format(&request).await {
                Ok(outcome) => return self.finish(outcome, workdir, title).await,
                Err(CapabilityError::TimedOut(secs)) => {
                    warn!(url = source_url, secs, "fetch hit the transcode ceiling");
                    return Err(DownloadError::TranscodeTimeout {
                        limit_secs: self.config.transcode_timeout_secs,
                    });
                }
                Err(e) => {
                    let reason = diagnose_capability_error(&e);
                    let detail = safe_diagnostic(&e.to_string());
                    if !reason.is_transient() {
                        warn!(url = source_url, ?reason, %detail, "download failed");
                        return Err(DownloadError::Unknown { detail });
                    }
                    warn!(url = source_url, attempt = attempt + 1, attempts, ?reason, "transient download failure");
                    last_error = DownloadError::Transient { detail };
                }
            }
        }

        Err(last_error)
    }

    /// Locate, measure and bound the output of a successful fetch
    async fn finish(
        &self,
        outcome: FetchOutcome,
        workdir: TempDir,
        title: &str,
    ) -> Result<DownloadResult, DownloadError> {
        let path = self.locate_output(outcome, workdir.path()).await?;

        let mut size = tokio::fs::metadata(&path)
            .await
            .map_err(|e| io_error("reading output", e))?
            .len();
        if size == 0 {
            size = match self.capability.probe_size(&path).await {
                Some(probed) if probed > 0 => probed,
                _ => return Err(DownloadError::EmptyOutput),
            };
        }

        let limit = self.config.max_file_size_bytes;
        if size > limit {
            warn!(size, limit, "download exceeds size ceiling");
            if let Err(e) = workdir.close() {
                warn!(error = %e, "failed to remove work dir");
            }
            return Err(DownloadError::TooLarge {
                actual_size: size,
                limit,
            });
        }

        info!(size, file = ?path.file_name(), "download complete");
        Ok(DownloadResult::new(path, size, title.to_string(), workdir))
    }

    /// Reported path when it points at a file inside `dir`, otherwise the
    /// first finished file by name. `..` components are never followed.
    async fn locate_output(&self, outcome: FetchOutcome, dir: &Path) -> Result<PathBuf, DownloadError> {
        if let Some(reported) = outcome.reported_path {
            let reported = if reported.is_absolute() {
                reported
            } else {
                dir.join(reported)
            };
            let climbs = reported
                .components()
                .any(|c| matches!(c, Component::ParentDir));
            if !climbs && reported.starts_with(dir) && reported.is_file() {
                return Ok(reported);
            }
            warn!(path = ?reported.file_name(), "reported output not found, scanning work dir");
        }

        let files = list_outputs(dir).await?;
        if files.len() > 1 {
            warn!(count = files.len(), "several outputs, taking the first by name");
        }
        files.into_iter().next().ok_or(DownloadError::EmptyOutput)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::extractors::RawMediaInfo;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Writes `size` bytes into the requested directory per call, or fails
    /// with the scripted errors first
    struct ScriptedFetch {
        errors: Mutex<Vec<CapabilityError>>,
        size: u64,
        file_name: &'static str,
        report: bool,
        /// Reported path relative to the output dir, instead of the file written
        report_as: Option<&'static str>,
        probe: Option<u64>,
        calls: Mutex<Vec<FetchRequest>>,
    }

    impl ScriptedFetch {
        fn new(size: u64) -> Self {
            Self {
                errors: Mutex::new(Vec::new()),
                size,
                file_name: "Clip.mp4",
                report: true,
                report_as: None,
                probe: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing_first(mut self, errors: Vec<CapabilityError>) -> Self {
            self.errors = Mutex::new(errors);
            self
        }

        fn calls(&self) -> Vec<FetchRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ExtractionCapability for ScriptedFetch {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn list_formats(&self, _: &str, _: &str, _: Duration) -> Result<RawMediaInfo, CapabilityError> {
            Ok(RawMediaInfo::default())
        }

        async fn fetch_format(&self, request: &FetchRequest) -> Result<FetchOutcome, CapabilityError> {
            self.calls.lock().unwrap().push(request.clone());
            let next_error = {
                let mut errors = self.errors.lock().unwrap();
                if errors.is_empty() {
                    None
                } else {
                    Some(errors.remove(0))
                }
            };
            if let Some(e) = next_error {
                return Err(e);
            }

            let path = request.output_dir.join(self.file_name);
            let file = std::fs::File::create(&path).unwrap();
            file.set_len(self.size).unwrap();
            std::fs::write(request.output_dir.join("Clip.mp4.part"), b"x").unwrap();
            let reported = match self.report_as {
                Some(rel) => {
                    let elsewhere = request.output_dir.join(rel);
                    std::fs::write(&elsewhere, b"not ours").unwrap();
                    elsewhere
                }
                None => path,
            };
            Ok(FetchOutcome {
                reported_path: self.report.then_some(reported),
            })
        }

        async fn probe_size(&self, _path: &Path) -> Option<u64> {
            self.probe
        }
    }

    fn executor(capability: Arc<ScriptedFetch>, work: &Path) -> AcquisitionExecutor {
        let config = EngineConfig::default()
            .with_retry_delay_ms(0)
            .with_work_dir(Some(work.to_path_buf()))
            .with_client_identities(vec!["ua-0".into(), "ua-1".into()]);
        AcquisitionExecutor::new(capability, Arc::new(config))
    }

    fn rate_limited() -> CapabilityError {
        CapabilityError::Failed("ERROR: HTTP Error 429: Too Many Requests".into())
    }

    #[tokio::test]
    async fn delivers_reported_file() {
        let work = tempfile::tempdir().unwrap();
        let cap = Arc::new(ScriptedFetch::new(1024));
        let result = executor(cap.clone(), work.path())
            .acquire(&AcquisitionTarget::video("18"), "https://video.example/x", "Clip")
            .await
            .unwrap();

        assert_eq!(result.size_bytes, 1024);
        assert!(result.local_path.ends_with("Clip.mp4"));
        assert!(result.local_path.starts_with(work.path()));

        let calls = cap.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].format_spec, "18");
        assert_eq!(calls[0].postprocess, PostProcess::Merge { container: "mp4".into() });

        let dir = result.workdir().to_path_buf();
        result.cleanup().unwrap();
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn oversized_file_is_removed() {
        let work = tempfile::tempdir().unwrap();
        let cap = Arc::new(ScriptedFetch::new(60 * 1024 * 1024));
        let err = executor(cap.clone(), work.path())
            .acquire(&AcquisitionTarget::video("22"), "https://video.example/x", "Clip")
            .await
            .unwrap_err();

        assert_eq!(
            err,
            DownloadError::TooLarge {
                actual_size: 62_914_560,
                limit: 52_428_800
            }
        );
        assert!(!cap.calls()[0].output_dir.exists());
    }

    #[tokio::test]
    async fn transient_errors_retry_with_rotation() {
        let work = tempfile::tempdir().unwrap();
        let cap = Arc::new(ScriptedFetch::new(10).failing_first(vec![rate_limited()]));
        executor(cap.clone(), work.path())
            .acquire(&AcquisitionTarget::video("18"), "https://video.example/x", "Clip")
            .await
            .unwrap();

        let calls = cap.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].client_identity, "ua-0");
        assert_eq!(calls[1].client_identity, "ua-1");
        assert_ne!(calls[0].output_dir, calls[1].output_dir);
        assert!(!calls[0].output_dir.exists());
    }

    #[tokio::test]
    async fn transient_exhaustion_surfaces() {
        let work = tempfile::tempdir().unwrap();
        let cap = Arc::new(ScriptedFetch::new(10).failing_first(vec![rate_limited(), rate_limited()]));
        let err = executor(cap.clone(), work.path())
            .acquire(&AcquisitionTarget::video("18"), "https://video.example/x", "Clip")
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Transient { .. }));
        assert_eq!(cap.calls().len(), 2);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let work = tempfile::tempdir().unwrap();
        let cap = Arc::new(ScriptedFetch::new(10).failing_first(vec![CapabilityError::Failed(
            "ERROR: Requested format is not available".into(),
        )]));
        let err = executor(cap.clone(), work.path())
            .acquire(&AcquisitionTarget::video("999"), "https://video.example/x", "Clip")
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Unknown { .. }));
        assert_eq!(cap.calls().len(), 1);
    }

    #[tokio::test]
    async fn deadline_is_fatal() {
        let work = tempfile::tempdir().unwrap();
        let cap = Arc::new(ScriptedFetch::new(10).failing_first(vec![CapabilityError::TimedOut(300)]));
        let err = executor(cap.clone(), work.path())
            .acquire(&AcquisitionTarget::audio_extract("140"), "https://video.example/x", "Clip")
            .await
            .unwrap_err();
        assert_eq!(err, DownloadError::TranscodeTimeout { limit_secs: 300 });
        assert_eq!(cap.calls().len(), 1);
    }

    #[tokio::test]
    async fn audio_extract_uses_configured_codec() {
        let work = tempfile::tempdir().unwrap();
        let cap = Arc::new(ScriptedFetch::new(10));
        executor(cap.clone(), work.path())
            .acquire(&AcquisitionTarget::audio_extract("18"), "https://video.example/x", "Clip")
            .await
            .unwrap();
        let call = &cap.calls()[0];
        assert_eq!(call.format_spec, "bestaudio/best");
        assert_eq!(
            call.postprocess,
            PostProcess::ExtractAudio {
                codec: "mp3".into(),
                quality: "192".into()
            }
        );
    }

    #[tokio::test]
    async fn unreported_output_found_by_listing() {
        let work = tempfile::tempdir().unwrap();
        let mut cap = ScriptedFetch::new(10);
        cap.report = false;
        cap.file_name = "b_title.mp4";
        let result = executor(Arc::new(cap), work.path())
            .acquire(&AcquisitionTarget::video("18"), "https://video.example/x", "Clip")
            .await
            .unwrap();
        assert!(result.local_path.ends_with("b_title.mp4"));
    }

    #[tokio::test]
    async fn reported_path_outside_work_dir_is_ignored() {
        let work = tempfile::tempdir().unwrap();
        let mut cap = ScriptedFetch::new(10);
        cap.report_as = Some("../escape.mp4");
        let cap = Arc::new(cap);
        let result = executor(cap.clone(), work.path())
            .acquire(&AcquisitionTarget::video("18"), "https://video.example/x", "Clip")
            .await
            .unwrap();

        assert!(result.local_path.starts_with(&cap.calls()[0].output_dir));
        assert!(result.local_path.ends_with("Clip.mp4"));
        assert_eq!(result.size_bytes, 10);

        let outside = cap.calls()[0].output_dir.parent().unwrap().join("escape.mp4");
        let dest = tempfile::tempdir().unwrap();
        let saved = result.persist_into(dest.path()).unwrap();
        assert!(saved.ends_with("Clip.mp4"));
        assert_eq!(std::fs::read(&outside).unwrap(), b"not ours");
    }

    #[tokio::test]
    async fn zero_size_falls_back_to_probe() {
        let work = tempfile::tempdir().unwrap();
        let mut cap = ScriptedFetch::new(0);
        cap.probe = Some(4096);
        let result = executor(Arc::new(cap), work.path())
            .acquire(&AcquisitionTarget::video("18"), "https://video.example/x", "Clip")
            .await
            .unwrap();
        assert_eq!(result.size_bytes, 4096);

        let work = tempfile::tempdir().unwrap();
        let err = executor(Arc::new(ScriptedFetch::new(0)), work.path())
            .acquire(&AcquisitionTarget::video("18"), "https://video.example/x", "Clip")
            .await
            .unwrap_err();
        assert_eq!(err, DownloadError::EmptyOutput);
    }

    #[test]
    fn partial_files_are_ignored() {
        assert!(is_partial("Clip.mp4.part"));
        assert!(is_partial("Clip.f137.mp4.ytdl"));
        assert!(is_partial(".hidden"));
        assert!(!is_partial("Clip.mp4"));
    }
}
