use crate::types::{SarError, SarResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Parsed Sentinel-1 SLC granule name, e.g.
/// `S1A_IW_SLC__1SDV_20200103T170815_20200103T170842_030639_0382D5_DADE`
#[derive(Debug, Clone, PartialEq)]
pub struct GranuleName {
    pub name: String,
    pub mission: String,
    pub start_time: DateTime<Utc>,
    pub stop_time: DateTime<Utc>,
}

fn granule_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(S1[ABCD])_IW_SLC__1S[SD][VH]_(\d{8}T\d{6})_(\d{8}T\d{6})_\d{6}_[0-9A-F]{6}_[0-9A-F]{4}$",
        )
        .expect("granule pattern is valid")
    })
}

impl GranuleName {
    /// Parse a bare granule name (no directory, no `.SAFE`/`.zip` suffix)
    pub fn parse(name: &str) -> SarResult<Self> {
        let caps = granule_pattern().captures(name).ok_or_else(|| {
            SarError::Input(format!("Not a Sentinel-1 IW SLC granule name: {}", name))
        })?;

        Ok(Self {
            name: name.to_string(),
            mission: caps[1].to_string(),
            start_time: parse_compact_time(&caps[2])?,
            stop_time: parse_compact_time(&caps[3])?,
        })
    }

    /// Parse the granule name out of a product path such as
    /// `/data/S1A_..._DADE.SAFE` or `S1A_..._DADE.zip`
    pub fn from_path(path: &Path) -> SarResult<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SarError::Input(format!("Invalid product path: {}", path.display())))?;
        Self::parse(strip_product_suffix(file_name))
    }
}

/// Drop a trailing `.SAFE`, `.zip` or `.SAFE.zip` suffix
pub fn strip_product_suffix(file_name: &str) -> &str {
    let trimmed = file_name.trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".zip").unwrap_or(trimmed);
    trimmed.strip_suffix(".SAFE").unwrap_or(trimmed)
}

/// `YYYYMMDDTHHMMSS` as used in granule and orbit file names
pub fn parse_compact_time(value: &str) -> SarResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
        .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc))
        .map_err(|e| SarError::Input(format!("Invalid timestamp '{}': {}", value, e)))
}
