// Blocking diagnostics - classifies extractor failures
//
// yt-dlp only reports failures as free text on stderr, so classification is a
// substring heuristic over that text. Patterns are checked from most to least
// specific; the first hit wins.

use serde::{Deserialize, Serialize};

use crate::downloader::errors::{CapabilityError, ExtractionError};

/// Reasons a source may refuse a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockingReason {
    /// HTTP 403 Forbidden - general access denied
    Http403Forbidden,

    /// Rate limiting (429 or similar)
    RateLimited,

    /// Bot detection / captcha wall
    BotDetection,

    /// Geographic restriction
    GeoBlocked,

    /// Network timeout (often a soft IP block)
    NetworkTimeout,

    /// Extractor does not know the site or URL
    UnsupportedUrl,

    /// Deleted, removed or otherwise gone
    VideoUnavailable,

    /// Needs an authorized account
    PrivateVideo,

    /// Needs an 18+ login
    AgeRestricted,

    /// DRM, Premium or paid content; permanent
    DrmProtected,

    Unknown,
}

impl BlockingReason {
    /// Anti-bot and transport signatures that a retry with another client
    /// identity may get past
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Http403Forbidden
                | Self::RateLimited
                | Self::BotDetection
                | Self::GeoBlocked
                | Self::NetworkTimeout
        )
    }

    /// Advisory extraction error for this reason
    pub fn to_extraction_error(&self, detail: String) -> ExtractionError {
        match self {
            Self::GeoBlocked => ExtractionError::GeoBlocked(detail),
            Self::NetworkTimeout => ExtractionError::Timeout(detail),
            Self::UnsupportedUrl
            | Self::VideoUnavailable
            | Self::PrivateVideo
            | Self::AgeRestricted
            | Self::DrmProtected => ExtractionError::Unsupported(detail),
            Self::Http403Forbidden | Self::RateLimited | Self::BotDetection | Self::Unknown => {
                ExtractionError::Unknown(detail)
            }
        }
    }
}

/// Analyze error text and return the blocking reason
pub fn diagnose_error(error: &str) -> BlockingReason {
    let lower = error.to_lowercase();

    // DRM and paid content (permanent)
    if lower.contains("drm")
        || lower.contains("widevine")
        || lower.contains("playready")
        || lower.contains("youtube premium")
        || lower.contains("requires purchase")
        || lower.contains("rental")
    {
        return BlockingReason::DrmProtected;
    }

    if lower.contains("unsupported url") || lower.contains("is not a valid url") {
        return BlockingReason::UnsupportedUrl;
    }

    if lower.contains("sign in to confirm your age")
        || lower.contains("age-restricted")
        || lower.contains("age_verification")
    {
        return BlockingReason::AgeRestricted;
    }

    if lower.contains("private video") || lower.contains("video is private") {
        return BlockingReason::PrivateVideo;
    }

    if lower.contains("video unavailable")
        || lower.contains("video has been removed")
        || lower.contains("no longer available")
    {
        return BlockingReason::VideoUnavailable;
    }

    if lower.contains("available in your country")
        || lower.contains("blocked in your country")
        || lower.contains("geo restricted")
        || lower.contains("geo-restricted")
        || lower.contains("georestricted")
        || lower.contains("geographic restriction")
    {
        return BlockingReason::GeoBlocked;
    }

    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
        return BlockingReason::RateLimited;
    }

    // "bot" on its own matches too much (e.g. "robot" in titles)
    if lower.contains("not a bot")
        || lower.contains("bot detection")
        || lower.contains("captcha")
        || lower.contains("unusual traffic")
    {
        return BlockingReason::BotDetection;
    }

    if lower.contains("403") || lower.contains("forbidden") {
        return BlockingReason::Http403Forbidden;
    }

    if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection reset")
        || lower.contains("network unreachable")
    {
        return BlockingReason::NetworkTimeout;
    }

    BlockingReason::Unknown
}

/// Classify a capability failure
pub fn diagnose_capability_error(error: &CapabilityError) -> BlockingReason {
    match error {
        CapabilityError::TimedOut(_) => BlockingReason::NetworkTimeout,
        CapabilityError::ToolNotFound(_) | CapabilityError::ParseError(_) => BlockingReason::Unknown,
        CapabilityError::Failed(stderr) => diagnose_error(stderr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_403_detection() {
        let error = "ERROR: HTTP Error 403: Forbidden";
        assert_eq!(diagnose_error(error), BlockingReason::Http403Forbidden);
    }

    #[test]
    fn test_rate_limit_detection() {
        let error = "ERROR: unable to download webpage: HTTP Error 429: Too Many Requests";
        assert_eq!(diagnose_error(error), BlockingReason::RateLimited);
    }

    #[test]
    fn test_bot_detection() {
        let error = "Sign in to confirm you're not a bot";
        assert_eq!(diagnose_error(error), BlockingReason::BotDetection);
    }

    #[test]
    fn test_geo_detection() {
        let error = "The uploader has not made this video available in your country";
        assert_eq!(diagnose_error(error), BlockingReason::GeoBlocked);
    }

    #[test]
    fn test_timeout_detection() {
        assert_eq!(diagnose_error("Timed out after 30s"), BlockingReason::NetworkTimeout);
        assert_eq!(
            diagnose_capability_error(&CapabilityError::TimedOut(30)),
            BlockingReason::NetworkTimeout
        );
    }

    #[test]
    fn test_unsupported_detection() {
        let error = "ERROR: Unsupported URL: https://example.com/";
        assert_eq!(diagnose_error(error), BlockingReason::UnsupportedUrl);
    }

    #[test]
    fn test_drm_detection() {
        assert_eq!(diagnose_error("This video is DRM protected"), BlockingReason::DrmProtected);
    }

    #[test]
    fn robot_in_title_is_not_bot_detection() {
        let error = "ERROR: [generic] Robot Wars episode 3: Unable to extract data";
        assert_eq!(diagnose_error(error), BlockingReason::Unknown);
    }

    #[test]
    fn transient_set() {
        assert!(BlockingReason::RateLimited.is_transient());
        assert!(BlockingReason::GeoBlocked.is_transient());
        assert!(BlockingReason::NetworkTimeout.is_transient());
        assert!(!BlockingReason::UnsupportedUrl.is_transient());
        assert!(!BlockingReason::DrmProtected.is_transient());
    }

    #[test]
    fn extraction_error_mapping() {
        let err = BlockingReason::GeoBlocked.to_extraction_error("x".into());
        assert_eq!(err, ExtractionError::GeoBlocked("x".into()));
        let err = BlockingReason::NetworkTimeout.to_extraction_error("x".into());
        assert_eq!(err, ExtractionError::Timeout("x".into()));
        let err = BlockingReason::VideoUnavailable.to_extraction_error("x".into());
        assert_eq!(err, ExtractionError::Unsupported("x".into()));
    }
}
