// Extraction capability - the black box that lists and fetches formats
//
// `ExtractionCapability` is the seam between the engine and the tool doing the
// actual work. `YtDlpCli` is the production implementation; tests script
// their own.

mod cli;
mod diagnostics;
mod traits;

pub use cli::YtDlpCli;
pub use diagnostics::{diagnose_capability_error, diagnose_error, BlockingReason};
pub use traits::{
    ExtractionCapability, FetchOutcome, FetchRequest, PostProcess, RawFormatDescriptor,
    RawMediaInfo,
};
