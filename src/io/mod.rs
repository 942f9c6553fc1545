//! I/O modules for SAFE products, orbits, DEMs and external tools

pub mod annotation;
pub mod command;
pub mod dem;
pub mod granule;
pub mod manifest;
pub mod orbit;
pub mod safe;
pub mod xml_doc;

pub use annotation::AnnotationParser;
pub use command::ExternalCommand;
pub use dem::{CommandDem, DemProvider, ExistingDem};
pub use granule::GranuleName;
pub use manifest::{load_acquisition, StackLoader};
pub use orbit::{OrbitCatalog, OrbitType};
pub use safe::{AnnotationRef, SafeProduct};
pub use xml_doc::{XmlDocument, XmlElement};
