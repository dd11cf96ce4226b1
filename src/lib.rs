//! Format negotiation and acquisition engine for chat-driven media downloads.
//!
//! A user submits a URL, browses the available encodings through a small
//! token-driven menu, and ends up with one validated file on local disk.
//! Media extraction itself is delegated to an [`ExtractionCapability`]
//! (`yt-dlp` in production).

pub mod downloader;

pub use downloader::{
    join_task, AcquisitionTarget, Catalog, Category, ConfigError, DownloadError, DownloadResult,
    DownloadSummary, Engine, EngineConfig, EngineError, ExtractionCapability, ExtractionError,
    FormatKind, FormatRecord, Identity, MenuAction, MenuOutcome, MenuView, SelectionError,
    YtDlpCli,
};
