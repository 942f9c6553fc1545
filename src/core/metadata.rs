//! Scalar metadata of a finished pair.
//!
//! Values come from the processor log (baseline, overlap start time, looks)
//! and from the stack's annotation files (platform heading). Nothing here is
//! fatal: a missing or unparsable value leaves its field empty.

use crate::io::annotation::find_platform_heading;
use crate::io::safe::AnnotationRef;
use crate::types::{ProcessingMetadata, SarResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Processor log inside a pair's working directory
pub const PROCESSOR_LOG: &str = "isce.log";

const BASELINE_MARKER: &str = "Bperp at midrange for first common burst";
const OVERLAP_MARKER: &str = "subset.Overlap";
const START_TIME_MARKER: &str = "start time";
const AZIMUTH_LOOKS_MARKER: &str = "geocode.Azimuth looks";
const RANGE_LOOKS_MARKER: &str = "geocode.Range looks";

/// Build the metadata record of one pair from its log and annotation files
pub fn extract(log_text: &str, annotation_files: &[AnnotationRef]) -> ProcessingMetadata {
    let mut metadata = ProcessingMetadata::default();

    for line in log_text.lines() {
        if metadata.baseline.is_none() && line.contains(BASELINE_MARKER) {
            metadata.baseline = parse_value(line, BASELINE_MARKER, |v| last_token(v)?.parse().ok());
        }
        if metadata.utc_time_seconds.is_none()
            && line.contains(OVERLAP_MARKER)
            && line.contains(START_TIME_MARKER)
        {
            metadata.utc_time_seconds = parse_value(line, OVERLAP_MARKER, seconds_of_day);
        }
        if metadata.azimuth_looks.is_none() && line.contains(AZIMUTH_LOOKS_MARKER) {
            metadata.azimuth_looks =
                parse_value(line, AZIMUTH_LOOKS_MARKER, |v| last_token(v)?.parse().ok());
        }
        if metadata.range_looks.is_none() && line.contains(RANGE_LOOKS_MARKER) {
            metadata.range_looks =
                parse_value(line, RANGE_LOOKS_MARKER, |v| last_token(v)?.parse().ok());
        }
    }

    metadata.heading_degrees = find_heading(annotation_files);

    for (field, missing) in [
        ("baseline", metadata.baseline.is_none()),
        ("utctime", metadata.utc_time_seconds.is_none()),
        ("heading", metadata.heading_degrees.is_none()),
        ("range looks", metadata.range_looks.is_none()),
        ("azimuth looks", metadata.azimuth_looks.is_none()),
    ] {
        if missing {
            log::warn!("No value found for {}", field);
        }
    }
    log::debug!("Extracted metadata: {:?}", metadata);

    metadata
}

/// Apply `parse` to the text after the first `=` of a marker line
fn parse_value<T, F>(line: &str, marker: &str, parse: F) -> Option<T>
where
    F: Fn(&str) -> Option<T>,
{
    let parsed = line.split_once('=').and_then(|(_, value)| parse(value.trim()));
    if parsed.is_none() {
        log::warn!("Could not parse {} from log line '{}'", marker, line.trim());
    }
    parsed
}

fn last_token(value: &str) -> Option<&str> {
    value.split_whitespace().last()
}

/// `"<label> HH:MM:SS[.frac]"` to seconds since midnight
fn seconds_of_day(value: &str) -> Option<f64> {
    let time = value.split_whitespace().find(|token| token.contains(':'))?;
    let mut fields = time.split(':');
    let hours: f64 = fields.next()?.parse().ok()?;
    let minutes: f64 = fields.next()?.parse().ok()?;
    let seconds: f64 = fields.next()?.parse().ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some((hours * 60.0 + minutes) * 60.0 + seconds)
}

/// First platform heading found, visiting files in the order given
fn find_heading(annotation_files: &[AnnotationRef]) -> Option<f64> {
    for annotation in annotation_files {
        let heading = annotation
            .read_to_string()
            .and_then(|xml| find_platform_heading(&xml));
        match heading {
            Ok(Some(heading)) => {
                log::debug!("Heading {} from {}", heading, annotation.file_name());
                return Some(heading);
            }
            Ok(None) => {}
            Err(e) => log::warn!("Skipping {}: {}", annotation.file_name(), e),
        }
    }
    None
}

/// Read `<work_dir>/isce.log` (empty if absent) and extract its metadata
pub fn extract_from_work_dir(
    work_dir: &Path,
    annotation_files: &[AnnotationRef],
) -> ProcessingMetadata {
    let log_path = work_dir.join(PROCESSOR_LOG);
    let log_text = fs::read_to_string(&log_path).unwrap_or_else(|e| {
        log::warn!("Cannot read {}: {}", log_path.display(), e);
        String::new()
    });
    extract(&log_text, annotation_files)
}

/// Write `<product_dir>/<stem>.txt`
pub fn write_metadata_file(
    metadata: &ProcessingMetadata,
    product_dir: &Path,
    stem: &str,
) -> SarResult<PathBuf> {
    let path = product_dir.join(format!("{}.txt", stem));
    fs::write(&path, metadata.to_record())?;
    log::info!("Wrote metadata {}", path.display());
    Ok(path)
}
