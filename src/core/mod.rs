//! Stack processing: geometry, network, configuration, execution, collection

pub mod collect;
pub mod driver;
pub mod geometry;
pub mod metadata;
pub mod network;
pub mod pair_config;

// Re-export main types
pub use collect::{collect_pair, CollectedPair, Converter, ARTIFACTS, PRODUCT_DIR};
pub use driver::{
    process_all, process_pair, FailurePolicy, InterferogramProcessor, PairOutcome, PairRequest,
    PairStatus, ProcessorConfig, RunFailure, RunReport, RunStage, StackParams, StackProcessor,
    SwathRequest, TopsAppProcessor,
};
pub use geometry::{select_all, select_one, Footprint, GeometrySelector, SwathPolicy};
pub use metadata::{extract, write_metadata_file};
pub use network::{build_network, pair_indices, StackPair};
pub use pair_config::{configure_pair, ConfigTemplate, PairConfiguration, Role};
