// FormatSelector - quality ordering and codec labelling
//
// The catalog keeps extractor order inside each kind class by default. A
// caller can ask for quality order instead: highest resolution first, then
// highest bitrate, with H.264 ahead of other codecs at equal resolution since
// it plays everywhere. Class boundaries (muxed, video-only, audio-only) never
// move.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::models::{Catalog, FormatRecord};

/// Ordering applied inside each kind class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogOrder {
    /// As reported by the extractor
    #[default]
    Extractor,
    /// Best reported quality first
    Quality,
}

impl std::str::FromStr for CatalogOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "extractor" => Ok(Self::Extractor),
            "quality" => Ok(Self::Quality),
            other => Err(format!("unknown catalog order: {}", other)),
        }
    }
}

/// Video codec family, for display and preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecFamily {
    H264,
    H265,
    Vp9,
    Av1,
    Other,
}

pub struct FormatSelector;

impl FormatSelector {
    /// Reorder within classes. Stable, so ties keep extractor order.
    pub fn apply_order(catalog: &mut Catalog, order: CatalogOrder) {
        match order {
            CatalogOrder::Extractor => {}
            CatalogOrder::Quality => {
                catalog.formats.sort_by(|a, b| {
                    a.kind()
                        .rank()
                        .cmp(&b.kind().rank())
                        .then_with(|| Self::compare_quality(b, a))
                });
            }
        }
    }

    /// `Greater` when `a` is the better format
    fn compare_quality(a: &FormatRecord, b: &FormatRecord) -> Ordering {
        let height = |f: &FormatRecord| f.resolution.map(|r| r.height).unwrap_or(0);
        let bitrate = |f: &FormatRecord| f.bitrate_kbps.unwrap_or(0.0);
        let h264 = |f: &FormatRecord| Self::video_family(f) == Some(CodecFamily::H264);

        height(a)
            .cmp(&height(b))
            .then_with(|| h264(a).cmp(&h264(b)))
            .then_with(|| bitrate(a).partial_cmp(&bitrate(b)).unwrap_or(Ordering::Equal))
    }

    /// Family of the record's video codec, if it has one
    pub fn video_family(format: &FormatRecord) -> Option<CodecFamily> {
        let codec = format.video_codec()?.to_lowercase();
        let family = if codec.starts_with("avc") || codec.starts_with("h264") {
            CodecFamily::H264
        } else if codec.starts_with("hev") || codec.starts_with("hvc") || codec.starts_with("h265") {
            CodecFamily::H265
        } else if codec.starts_with("vp9") || codec.starts_with("vp09") {
            CodecFamily::Vp9
        } else if codec.starts_with("av01") || codec.starts_with("av1") {
            CodecFamily::Av1
        } else {
            CodecFamily::Other
        };
        Some(family)
    }
}
