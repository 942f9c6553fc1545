//! insar-stack: Sentinel-1 interferometric stack orchestration
//!
//! Selects the IW subswath a region of interest falls in, builds a redundant
//! network of interferometric pairs over a date-ordered stack, writes a
//! topsApp configuration per pair, drives the external ISCE processor and
//! collects its products and metadata.

pub mod config;
pub mod core;
pub mod io;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export main types and functions for easier access
pub use config::RunConfig;
pub use core::{
    build_network, process_all, process_pair, select_all, select_one, ConfigTemplate,
    FailurePolicy, GeometrySelector, InterferogramProcessor, PairRequest, ProcessorConfig,
    RunFailure, RunReport, RunStage, StackParams, StackProcessor, SwathPolicy, SwathRequest,
    TopsAppProcessor,
};
pub use io::{OrbitCatalog, StackLoader};
pub use types::{
    Acquisition, BoundingBox, PairJob, ProcessingMetadata, Roi, SarError, SarResult, Stack,
    Subswath,
};

/// Crate version, as printed by `--version`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
