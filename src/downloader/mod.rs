// Downloader module - format negotiation and acquisition engine

pub mod catalog;
pub mod config;
pub mod errors;
pub mod executor;
pub mod extractors;
pub mod format_selector;
pub mod models;
pub mod orchestrator;
pub mod selection;
pub mod session;
pub mod tools;
pub mod utils;

pub use catalog::CatalogBuilder;
pub use config::{ConfigError, EngineConfig};
pub use errors::{CapabilityError, DownloadError, EngineError, ExtractionError, SelectionError};
pub use executor::AcquisitionExecutor;
pub use extractors::{ExtractionCapability, YtDlpCli};
pub use format_selector::{CatalogOrder, CodecFamily};
pub use models::{
    AcquisitionMode, AcquisitionTarget, Catalog, Category, DownloadResult, DownloadSummary,
    FormatKind, FormatRecord,
};
pub use orchestrator::{join_task, Engine, MenuOutcome};
pub use selection::{MenuAction, MenuView};
pub use session::Identity;
