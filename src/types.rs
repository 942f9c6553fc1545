use crate::io::safe::AnnotationRef;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Positive-area overlap test; boxes that only share an edge do not intersect.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lat < other.max_lat
            && other.min_lat < self.max_lat
            && self.min_lon < other.max_lon
            && other.min_lon < self.max_lon
    }

    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        if !self.intersects(other) {
            return None;
        }
        Some(BoundingBox {
            min_lon: self.min_lon.max(other.min_lon),
            max_lon: self.max_lon.min(other.max_lon),
            min_lat: self.min_lat.max(other.min_lat),
            max_lat: self.max_lat.min(other.max_lat),
        })
    }

    /// Area in square degrees
    pub fn area(&self) -> f64 {
        (self.max_lon - self.min_lon).max(0.0) * (self.max_lat - self.min_lat).max(0.0)
    }
}

/// Region of interest in degrees, ordered the way the processor expects it:
/// south, north, west, east.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Roi {
    pub south: f64,
    pub north: f64,
    pub west: f64,
    pub east: f64,
}

impl Roi {
    /// Whole-globe region, selects every subswath of a footprint
    pub const GLOBE: Roi = Roi {
        south: -90.0,
        north: 90.0,
        west: -180.0,
        east: 180.0,
    };

    /// Validated constructor.
    ///
    /// Boxes crossing the antimeridian (west >= east) are rejected rather than
    /// silently mis-selected.
    pub fn new(south: f64, north: f64, west: f64, east: f64) -> SarResult<Self> {
        let roi = Roi { south, north, west, east };
        if [south, north, west, east].iter().any(|v| !v.is_finite()) {
            return Err(SarError::Input(format!("Region of interest {} is not finite", roi)));
        }
        if south >= north {
            return Err(SarError::Input(format!(
                "Region of interest {} has south >= north",
                roi
            )));
        }
        if west >= east {
            return Err(SarError::Input(format!(
                "Region of interest {} has west >= east (antimeridian crossing is not supported)",
                roi
            )));
        }
        if south < -90.0 || north > 90.0 || west < -180.0 || east > 180.0 {
            return Err(SarError::Input(format!(
                "Region of interest {} lies outside [-90, 90] x [-180, 180]",
                roi
            )));
        }
        Ok(roi)
    }

    /// Build from a `[south, north, west, east]` slice as given on the command line
    pub fn from_slice(values: &[f64]) -> SarResult<Self> {
        match values {
            [s, n, w, e] => Self::new(*s, *n, *w, *e),
            _ => Err(SarError::Input(format!(
                "Region of interest needs 4 values (south north west east), got {}",
                values.len()
            ))),
        }
    }

    pub fn to_bounding_box(&self) -> BoundingBox {
        BoundingBox {
            min_lon: self.west,
            max_lon: self.east,
            min_lat: self.south,
            max_lat: self.north,
        }
    }

    pub fn from_bounding_box(bbox: &BoundingBox) -> Self {
        Roi {
            south: bbox.min_lat,
            north: bbox.max_lat,
            west: bbox.min_lon,
            east: bbox.max_lon,
        }
    }

    /// Clip this region to `bbox`, `None` when they do not overlap
    pub fn clip_to(&self, bbox: &BoundingBox) -> Option<Roi> {
        self.to_bounding_box()
            .intersection(bbox)
            .map(|clipped| Roi::from_bounding_box(&clipped))
    }
}

impl fmt::Display for Roi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Debug formatting keeps a trailing ".0" on integral degrees
        write!(
            f,
            "[{:?}, {:?}, {:?}, {:?}]",
            self.south, self.north, self.west, self.east
        )
    }
}

/// IW subswath identifier (1, 2 or 3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Subswath(u8);

impl Subswath {
    pub const ALL: [Subswath; 3] = [Subswath(1), Subswath(2), Subswath(3)];

    pub fn new(id: u8) -> SarResult<Self> {
        match id {
            1..=3 => Ok(Subswath(id)),
            _ => Err(SarError::Input(format!(
                "Invalid sub-swath specified {} (expected 1, 2 or 3)",
                id
            ))),
        }
    }

    pub fn id(self) -> u8 {
        self.0
    }

    /// Name of the per-swath working directory, e.g. `iw2`
    pub fn dir_name(self) -> String {
        format!("iw{}", self.0)
    }
}

impl fmt::Display for Subswath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "iw{}", self.0)
    }
}

impl FromStr for Subswath {
    type Err = SarError;

    /// Accepts `2`, `iw2` and `IW2`
    fn from_str(s: &str) -> SarResult<Self> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("iw")
            .or_else(|| trimmed.strip_prefix("IW"))
            .unwrap_or(trimmed);
        let id = digits
            .parse::<u8>()
            .map_err(|_| SarError::Input(format!("Invalid sub-swath specified {}", s)))?;
        Subswath::new(id)
    }
}

/// One Sentinel-1 IW SLC acquisition
#[derive(Debug, Clone)]
pub struct Acquisition {
    /// Granule name without extension
    pub granule: String,
    pub mission: String,
    pub start_time: DateTime<Utc>,
    pub stop_time: DateTime<Utc>,
    /// Absolute path to the SAFE directory or zip archive
    pub path: PathBuf,
    pub footprints: BTreeMap<Subswath, BoundingBox>,
    pub annotations: BTreeMap<Subswath, AnnotationRef>,
    pub orbit_file: Option<PathBuf>,
}

impl Acquisition {
    /// Calendar date used for pairing
    pub fn date(&self) -> NaiveDate {
        self.start_time.date_naive()
    }

    /// `YYYYMMDDTHHMMSS`, the per-acquisition half of a pair directory name
    pub fn timestamp_key(&self) -> String {
        self.start_time.format("%Y%m%dT%H%M%S").to_string()
    }

    pub fn with_orbit_file(mut self, orbit_file: Option<PathBuf>) -> Self {
        self.orbit_file = orbit_file;
        self
    }
}

/// Acquisitions ordered by strictly increasing date
#[derive(Debug, Clone)]
pub struct Stack {
    acquisitions: Vec<Acquisition>,
}

impl Stack {
    /// Sort by acquisition time and validate.
    ///
    /// An empty list means no imagery was found, and two acquisitions on the
    /// same calendar date would make pair directory keys ambiguous; both are
    /// input errors.
    pub fn new(mut acquisitions: Vec<Acquisition>) -> SarResult<Self> {
        if acquisitions.is_empty() {
            return Err(SarError::Input("No imagery found".to_string()));
        }

        acquisitions.sort_by(|a, b| a.start_time.cmp(&b.start_time));

        for window in acquisitions.windows(2) {
            if window[0].date() == window[1].date() {
                return Err(SarError::Input(format!(
                    "Duplicate acquisition date {}: {} and {}",
                    window[0].date(),
                    window[0].granule,
                    window[1].granule
                )));
            }
        }

        Ok(Self { acquisitions })
    }

    pub fn len(&self) -> usize {
        self.acquisitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.acquisitions.is_empty()
    }

    pub fn first(&self) -> &Acquisition {
        &self.acquisitions[0]
    }

    pub fn get(&self, index: usize) -> Option<&Acquisition> {
        self.acquisitions.get(index)
    }

    pub fn acquisitions(&self) -> &[Acquisition] {
        &self.acquisitions
    }

    pub fn into_acquisitions(self) -> Vec<Acquisition> {
        self.acquisitions
    }

    /// Annotation files of the whole stack, in stack order then subswath order
    pub fn annotation_refs(&self) -> Vec<AnnotationRef> {
        self.acquisitions
            .iter()
            .flat_map(|acq| acq.annotations.values().cloned())
            .collect()
    }
}

/// Everything needed to configure and run one interferogram
#[derive(Debug, Clone)]
pub struct PairJob {
    pub reference: Acquisition,
    pub secondary: Acquisition,
    pub subswath: Subswath,
    pub roi: Roi,
    /// Optional explicit geocoding box; the stack driver uses the job ROI
    pub geocode_box: Option<Roi>,
    /// Also restrict the processor's per-acquisition region of interest
    pub crop_to_roi: bool,
    pub dem: Option<PathBuf>,
    pub unwrap: bool,
}

impl PairJob {
    /// `{reference}_{secondary}` directory name
    pub fn key(&self) -> String {
        pair_key(&self.reference, &self.secondary)
    }

    /// `<run_dir>/<key>/iw<n>`
    pub fn work_dir(&self, run_dir: &Path) -> PathBuf {
        run_dir.join(self.key()).join(self.subswath.dir_name())
    }

    /// `<key>_iw<n>`, prefix of every collected artifact
    pub fn product_stem(&self) -> String {
        format!("{}_{}", self.key(), self.subswath.dir_name())
    }
}

pub fn pair_key(reference: &Acquisition, secondary: &Acquisition) -> String {
    format!("{}_{}", reference.timestamp_key(), secondary.timestamp_key())
}

/// Scalars harvested from a finished pair
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    pub baseline: Option<f64>,
    pub utc_time_seconds: Option<f64>,
    pub heading_degrees: Option<f64>,
    pub range_looks: Option<u32>,
    pub azimuth_looks: Option<u32>,
}

impl ProcessingMetadata {
    /// Text record written next to the collected artifacts; absent values
    /// are written as empty strings.
    pub fn to_record(&self) -> String {
        fn float(value: Option<f64>) -> String {
            value.map(|v| format!("{:?}", v)).unwrap_or_default()
        }
        fn int(value: Option<u32>) -> String {
            value.map(|v| v.to_string()).unwrap_or_default()
        }

        format!(
            "baseline: {}\nutctime: {}\nheading: {}\nrange looks: {}\nazimuth looks: {}\n",
            float(self.baseline),
            float(self.utc_time_seconds),
            float(self.heading_degrees),
            int(self.range_looks),
            int(self.azimuth_looks),
        )
    }
}

/// Error types for stack processing
#[derive(Debug, thiserror::Error)]
pub enum SarError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Input error: {0}")]
    Input(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("No overlap of bounding box with imagery: {roi}")]
    Geometry { roi: Roi },

    #[error("External tool failed ({target}): {message}")]
    ExternalTool { target: String, message: String },

    #[error("Pair {pair} did not produce expected output {}", path.display())]
    OutputContract { pair: String, path: PathBuf },

    #[error("Configuration template error: {0}")]
    Template(String),

    #[error("XML parsing error: {0}")]
    XmlParsing(String),

    #[error("Metadata error: {0}")]
    Metadata(String),
}

/// Result type for stack operations
pub type SarResult<T> = Result<T, SarError>;
