// Scripted extraction capability for engine tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use videodown::downloader::extractors::{
    ExtractionCapability, FetchOutcome, FetchRequest, RawFormatDescriptor, RawMediaInfo,
};
use videodown::downloader::CapabilityError;
use videodown::EngineConfig;

pub const URL: &str = "https://video.example/watch?v=abc";

pub fn descriptor(id: &str, vcodec: &str, acodec: &str, resolution: Option<&str>) -> RawFormatDescriptor {
    RawFormatDescriptor {
        format_id: id.to_string(),
        ext: Some(if vcodec == "none" { "m4a" } else { "mp4" }.to_string()),
        resolution: resolution.map(String::from),
        vcodec: Some(vcodec.to_string()),
        acodec: Some(acodec.to_string()),
        ..Default::default()
    }
}

/// A typical listing: two muxed, two video-only, two audio-only, one storyboard
pub fn sample_info() -> RawMediaInfo {
    let mut f18 = descriptor("18", "avc1.42001E", "mp4a.40.2", Some("640x360"));
    f18.filesize = Some(8_000_000);
    let mut f22 = descriptor("22", "avc1.64001F", "mp4a.40.2", Some("1280x720"));
    f22.tbr = Some(1000.0);
    let mut f137 = descriptor("137", "avc1.640028", "none", Some("1920x1080"));
    f137.filesize = Some(40_000_000);
    let f248 = descriptor("248", "vp9", "none", Some("1920x1080"));
    let mut f140 = descriptor("140", "none", "mp4a.40.2", Some("audio only"));
    f140.filesize = Some(1_300_000);
    let f251 = descriptor("251", "none", "opus", Some("audio only"));
    let sb = descriptor("sb0", "none", "none", Some("48x27"));

    RawMediaInfo {
        id: Some("abc".to_string()),
        title: Some("Sample Clip".to_string()),
        uploader: Some("Uploader".to_string()),
        duration: Some(80.0),
        webpage_url: Some(URL.to_string()),
        formats: vec![f137, f140, f18, sb, f248, f251, f22],
    }
}

/// Config with no delays and a fixed identity pool
pub fn test_config(work: &Path) -> EngineConfig {
    EngineConfig::default()
        .with_retry_delay_ms(0)
        .with_work_dir(Some(work.to_path_buf()))
        .with_client_identities(vec!["ua-0".into(), "ua-1".into(), "ua-2".into()])
        .with_page_size(3)
}

#[derive(Default)]
struct Script {
    list_errors: VecDeque<CapabilityError>,
    fetch_errors: VecDeque<CapabilityError>,
}

/// Fake capability. Listing returns `info` after any scripted errors; fetching
/// writes a sparse file of `fetch_size` bytes into the requested directory.
pub struct FakeCapability {
    info: RawMediaInfo,
    fetch_size: Mutex<u64>,
    script: Mutex<Script>,
    list_identities: Mutex<Vec<String>>,
    fetches: Mutex<Vec<FetchRequest>>,
    /// When set, fetches wait for `release` before writing
    gate: Option<Arc<Notify>>,
    fetch_started: Arc<Notify>,
}

impl FakeCapability {
    pub fn new(info: RawMediaInfo) -> Self {
        Self {
            info,
            fetch_size: Mutex::new(1024),
            script: Mutex::new(Script::default()),
            list_identities: Mutex::new(Vec::new()),
            fetches: Mutex::new(Vec::new()),
            gate: None,
            fetch_started: Arc::new(Notify::new()),
        }
    }

    pub fn with_fetch_size(self, size: u64) -> Self {
        *self.fetch_size.lock().unwrap() = size;
        self
    }

    pub fn with_list_errors(self, errors: Vec<CapabilityError>) -> Self {
        self.script.lock().unwrap().list_errors = errors.into();
        self
    }

    pub fn with_fetch_errors(self, errors: Vec<CapabilityError>) -> Self {
        self.script.lock().unwrap().fetch_errors = errors.into();
        self
    }

    /// Hold every fetch until `release` is notified
    pub fn gated(mut self, release: Arc<Notify>) -> Self {
        self.gate = Some(release);
        self
    }

    pub fn fetch_started(&self) -> Arc<Notify> {
        self.fetch_started.clone()
    }

    pub fn list_identities(&self) -> Vec<String> {
        self.list_identities.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> Vec<FetchRequest> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExtractionCapability for FakeCapability {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn list_formats(
        &self,
        _url: &str,
        client_identity: &str,
        _timeout: Duration,
    ) -> Result<RawMediaInfo, CapabilityError> {
        self.list_identities
            .lock()
            .unwrap()
            .push(client_identity.to_string());
        if let Some(e) = self.script.lock().unwrap().list_errors.pop_front() {
            return Err(e);
        }
        Ok(self.info.clone())
    }

    async fn fetch_format(&self, request: &FetchRequest) -> Result<FetchOutcome, CapabilityError> {
        self.fetches.lock().unwrap().push(request.clone());
        self.fetch_started.notify_one();
        if let Some(release) = &self.gate {
            release.notified().await;
        }
        if let Some(e) = self.script.lock().unwrap().fetch_errors.pop_front() {
            return Err(e);
        }

        let path = request.output_dir.join("Sample_Clip.mp4");
        let file = std::fs::File::create(&path).map_err(|e| CapabilityError::Failed(e.to_string()))?;
        file.set_len(*self.fetch_size.lock().unwrap())
            .map_err(|e| CapabilityError::Failed(e.to_string()))?;
        Ok(FetchOutcome {
            reported_path: Some(path),
        })
    }
}
