//! Harvesting a finished pair into the run-level `PRODUCT/` directory.

use crate::core::metadata::{extract_from_work_dir, write_metadata_file};
use crate::io::command::ExternalCommand;
use crate::io::safe::AnnotationRef;
use crate::types::{PairJob, ProcessingMetadata, SarError, SarResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Run-level aggregation directory
pub const PRODUCT_DIR: &str = "PRODUCT";

/// Processor output directory inside a pair's working directory
pub const MERGED_DIR: &str = "merged";

/// `merged/` file name and the suffix it is published under
pub const ARTIFACTS: &[(&str, &str)] = &[
    ("colorized_unw.png", "unw_phase.png"),
    ("colorized_unw.png.aux.xml", "unw_phase.png.aux.xml"),
    ("colorized_unw_large.png", "unw_phase_large.png"),
    ("colorized_unw_large.png.aux.xml", "unw_phase_large.png.aux.xml"),
    ("colorized_unw.kmz", "unw_phase.kmz"),
    ("color.png", "color_phase.png"),
    ("color.png.aux.xml", "color_phase.png.aux.xml"),
    ("color_large.png", "color_phase_large.png"),
    ("color_large.png.aux.xml", "color_phase_large.png.aux.xml"),
    ("color.kmz", "color_phase.kmz"),
    ("phase.tif", "unw_phase.tif"),
    ("amp.tif", "amp.tif"),
    ("coherence.tif", "corr.tif"),
];

/// What a collected pair left behind in `PRODUCT/`
#[derive(Debug, Clone)]
pub struct CollectedPair {
    /// The processor's `merged/` directory after the move
    pub output_dir: PathBuf,
    pub artifacts: Vec<PathBuf>,
    pub metadata_file: PathBuf,
    pub metadata: ProcessingMetadata,
}

/// Optional conversion step run inside `merged/` before collection
#[derive(Debug, Clone)]
pub struct Converter {
    pub command: ExternalCommand,
    pub timeout: Option<Duration>,
}

impl Converter {
    /// Runs inside `merged`; its output is captured in `work_dir` so it never
    /// ends up among the published products
    fn run(&self, job: &PairJob, work_dir: &Path, merged: &Path) -> SarResult<()> {
        let command = self.command.substitute(&[
            ("south", format!("{:?}", job.roi.south)),
            ("north", format!("{:?}", job.roi.north)),
            ("west", format!("{:?}", job.roi.west)),
            ("east", format!("{:?}", job.roi.east)),
            ("stem", job.product_stem()),
        ]);
        command.run_logged(merged, work_dir, "convert", self.timeout, &job.key())
    }
}

/// Move the outputs of `job` from `work_dir` into `product_dir`.
///
/// A missing `merged/` directory breaks the processor's output contract.
/// Individual missing artifacts only produce a warning.
pub fn collect_pair(
    job: &PairJob,
    work_dir: &Path,
    product_dir: &Path,
    converter: Option<&Converter>,
    annotation_files: &[AnnotationRef],
) -> SarResult<CollectedPair> {
    let merged = work_dir.join(MERGED_DIR);
    if !merged.is_dir() {
        return Err(SarError::OutputContract {
            pair: job.key(),
            path: merged,
        });
    }
    log::info!("Collecting {}", job.product_stem());
    fs::create_dir_all(product_dir)?;

    if let Some(converter) = converter {
        converter.run(job, work_dir, &merged)?;
    }

    let stem = job.product_stem();
    let mut artifacts = Vec::new();
    for (source, suffix) in ARTIFACTS {
        let from = merged.join(source);
        if !from.is_file() {
            log::warn!("{}: {} not produced, skipping", stem, source);
            continue;
        }
        let to = product_dir.join(format!("{}_{}", stem, suffix));
        fs::copy(&from, &to)?;
        log::debug!("Copied {} -> {}", from.display(), to.display());
        artifacts.push(to);
    }

    let output_dir = product_dir.join(&stem);
    if output_dir.exists() {
        log::warn!("Replacing existing {}", output_dir.display());
        fs::remove_dir_all(&output_dir)?;
    }
    fs::rename(&merged, &output_dir)?;

    let metadata = extract_from_work_dir(work_dir, annotation_files);
    let metadata_file = write_metadata_file(&metadata, product_dir, &stem)?;

    Ok(CollectedPair {
        output_dir,
        artifacts,
        metadata_file,
        metadata,
    })
}
