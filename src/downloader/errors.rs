// Error types for catalog building, selection and acquisition

use serde::Serialize;
use thiserror::Error;

use super::models::Category;

/// Failure to turn a URL into a usable catalog.
///
/// The variant is advisory (it only drives user messaging); callers must not
/// branch on it for control flow.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ExtractionError {
    /// URL rejected, site not supported, or no usable formats
    #[error("unsupported source: {0}")]
    Unsupported(String),

    /// Content blocked in the region the request came from
    #[error("geo-blocked: {0}")]
    GeoBlocked(String),

    /// Extractor did not answer in time
    #[error("extraction timed out: {0}")]
    Timeout(String),

    #[error("extraction failed: {0}")]
    Unknown(String),
}

/// Caller sent a token that does not fit the current session.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionError {
    /// The id is not part of the set currently offered
    #[error("format {id} is not available here")]
    FormatNotFound { id: String },

    /// The chosen category has nothing to offer
    #[error("no formats in category {category}")]
    NoCandidatesInCategory { category: Category },

    /// Malformed token, or an action the current state does not accept
    #[error("invalid action: {reason}")]
    InvalidAction { reason: String },
}

/// Failure while retrieving the resolved target.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DownloadError {
    /// Rate limiting / bot detection persisted through every attempt
    #[error("temporarily blocked by the source: {detail}")]
    Transient { detail: String },

    /// File exceeded the size ceiling; it has already been removed
    #[error("file is {actual_size} bytes, limit is {limit} bytes")]
    TooLarge { actual_size: u64, limit: u64 },

    /// Tool reported success but produced nothing usable
    #[error("download produced no output")]
    EmptyOutput,

    /// Fetch/transcode hit the wall-clock ceiling
    #[error("transcode exceeded {limit_secs}s")]
    TranscodeTimeout { limit_secs: u64 },

    #[error("download failed: {detail}")]
    Unknown { detail: String },
}

/// Error surfaced by the engine facade.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum EngineError {
    /// No active session for the identity; restart from a URL
    #[error("session expired, send the link again")]
    SessionExpired,

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Unexpected internal fault (panicked task and the like)
    #[error("internal error: {detail}")]
    Internal { detail: String },
}

impl EngineError {
    /// Caller-input problems are neither retried nor logged as faults
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::SessionExpired | Self::Selection(_))
    }
}

/// Error reported by an extraction capability. Only carries raw text; the
/// components classify it with [`super::extractors::diagnose_error`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// Tool could not be started at all
    #[error("tool not available: {0}")]
    ToolNotFound(String),

    /// Tool ran and failed; carries its stderr
    #[error("{0}")]
    Failed(String),

    /// Tool did not finish within the given bound
    #[error("timed out after {0}s")]
    TimedOut(u64),

    /// Tool output could not be parsed
    #[error("parse error: {0}")]
    ParseError(String),
}

impl From<String> for CapabilityError {
    fn from(s: String) -> Self {
        if s.starts_with("Failed to start") {
            return Self::ToolNotFound(s);
        }
        Self::Failed(s)
    }
}
