// Catalog normalizer - raw descriptors in, ordered FormatRecords out
//
// Handles:
// - Kind classification from codec presence
// - Size fallback (reported → approximate → bitrate × duration)
// - Class ordering (muxed, video-only, audio-only), stable within a class
// - Retry with client identity rotation on transient failures

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::config::EngineConfig;
use super::errors::ExtractionError;
use super::extractors::{diagnose_capability_error, ExtractionCapability, RawFormatDescriptor, RawMediaInfo};
use super::format_selector::FormatSelector;
use super::models::{Catalog, FormatRecord, Resolution, SizeSource};
use super::utils::{is_valid_url, safe_diagnostic};

/// Longest title kept on a catalog
const MAX_TITLE_CHARS: usize = 100;

/// `bitrate_kbps * 1000 / 8 * duration` in bytes, when both are known and
/// positive
pub fn estimate_size(bitrate_kbps: Option<f64>, duration_seconds: Option<f64>) -> Option<u64> {
    let (kbps, secs) = (bitrate_kbps?, duration_seconds?);
    if !(kbps > 0.0 && secs > 0.0) || !kbps.is_finite() || !secs.is_finite() {
        return None;
    }
    Some((kbps * 1000.0 / 8.0 * secs).round() as u64)
}

/// Total bitrate, or the sum of whichever stream bitrates are known
fn effective_bitrate(desc: &RawFormatDescriptor) -> Option<f64> {
    let positive = |v: Option<f64>| v.filter(|b| *b > 0.0);
    positive(desc.tbr).or_else(|| match (positive(desc.vbr), positive(desc.abr)) {
        (None, None) => None,
        (v, a) => Some(v.unwrap_or(0.0) + a.unwrap_or(0.0)),
    })
}

fn resolution_of(desc: &RawFormatDescriptor) -> Option<Resolution> {
    match (desc.width, desc.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Some(Resolution::new(w, h)),
        _ => desc.resolution.as_deref().and_then(Resolution::parse),
    }
}

/// Normalize one descriptor. `None` for descriptors with no usable stream.
///
/// A video signal without a resolution is not trusted: the video codec is
/// dropped, so the record classifies as audio (or is skipped).
pub fn normalize_descriptor(desc: &RawFormatDescriptor, duration_seconds: Option<f64>) -> Option<FormatRecord> {
    if desc.format_id.trim().is_empty() {
        return None;
    }

    let resolution = resolution_of(desc);
    let video_codec = if resolution.is_some() { desc.vcodec.clone() } else { None };
    let container = desc.ext.clone().unwrap_or_else(|| "mp4".to_string());

    let record = FormatRecord::new(desc.format_id.trim(), container, video_codec, desc.acodec.clone())?;
    let bitrate = effective_bitrate(desc);

    let (size, source) = if let Some(exact) = desc.filesize.filter(|s| *s > 0) {
        (Some(exact), SizeSource::Reported)
    } else if let Some(approx) = desc.filesize_approx.filter(|s| *s > 0) {
        (Some(approx), SizeSource::Approximate)
    } else {
        (estimate_size(bitrate, duration_seconds), SizeSource::Estimated)
    };

    // audio records carry no resolution even if the extractor sent one
    let resolution = if record.has_video() { resolution } else { None };
    let mut record = record
        .with_resolution(resolution)
        .with_bitrate(bitrate)
        .with_size(size, source);
    record.fps = desc.fps.filter(|f| *f > 0.0);
    record.note = desc.format_note.clone().filter(|n| !n.trim().is_empty());
    Some(record)
}

/// Turn a full extractor response into a catalog. Returns every usable
/// record; display truncation happens in the menu layer.
pub fn normalize(source_url: &str, info: RawMediaInfo) -> Catalog {
    let duration = info.duration.filter(|d| *d > 0.0);
    let mut seen = HashSet::new();

    let mut formats: Vec<FormatRecord> = info
        .formats
        .iter()
        .filter_map(|desc| normalize_descriptor(desc, duration))
        .filter(|record| seen.insert(record.id.clone()))
        .collect();

    // stable: extractor order survives within a class
    formats.sort_by_key(|f| f.kind().rank());

    let title = info
        .title
        .map(|t| t.trim().chars().take(MAX_TITLE_CHARS).collect::<String>())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled".to_string());

    Catalog {
        source_url: source_url.to_string(),
        title,
        uploader: info.uploader,
        duration_seconds: duration,
        formats,
    }
}

/// Builds catalogs through an extraction capability
pub struct CatalogBuilder {
    capability: Arc<dyn ExtractionCapability>,
    config: Arc<EngineConfig>,
}

impl CatalogBuilder {
    pub fn new(capability: Arc<dyn ExtractionCapability>, config: Arc<EngineConfig>) -> Self {
        Self { capability, config }
    }

    /// List, classify and order every format for `url`.
    ///
    /// Transient failures are retried up to `discovery_attempts`, rotating the
    /// client identity by attempt index. Anything else fails immediately.
    pub async fn build_catalog(&self, url: &str) -> Result<Catalog, ExtractionError> {
        let url = url.trim();
        if !is_valid_url(url) {
            return Err(ExtractionError::Unsupported("not an http(s) URL".to_string()));
        }

        let attempts = self.config.discovery_attempts.max(1);
        let mut last_error = ExtractionError::Unknown("no attempts made".to_string());

        for attempt in 0..attempts {
            if attempt > 0 && !self.config.retry_delay().is_zero() {
                tokio::time::sleep(self.config.retry_delay()).await;
            }
            let client = self.config.identity_for_attempt(attempt);
            debug!(url, attempt = attempt + 1, capability = self.capability.name(), "listing formats");

            match self
                .capability
                .list_formats(url, client, self.config.extraction_timeout())
                .await
            {
                Ok(raw) => {
                    let raw_count = raw.formats.len();
                    let mut catalog = normalize(url, raw);
                    if catalog.is_empty() {
                        warn!(url, raw_count, "no usable formats");
                        return Err(ExtractionError::Unsupported("no usable formats".to_string()));
                    }
                    FormatSelector::apply_order(&mut catalog, self.config.catalog_order);
                    info!(url, formats = catalog.formats.len(), raw_count, "catalog built");
                    return Ok(catalog);
                }
                Err(e) => {
                    let reason = diagnose_capability_error(&e);
                    let detail = safe_diagnostic(&e.to_string());
                    if !reason.is_transient() {
                        warn!(url, ?reason, %detail, "format listing failed");
                        return Err(reason.to_extraction_error(detail));
                    }
                    warn!(url, attempt = attempt + 1, attempts, ?reason, "transient listing failure");
                    last_error = reason.to_extraction_error(detail);
                }
            }
        }

        Err(last_error)
    }
}
