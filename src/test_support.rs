//! In-memory fixtures for unit tests

use crate::types::{Acquisition, BoundingBox, PairJob, Roi, Subswath};
use chrono::{NaiveDate, TimeZone, Utc};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub fn bbox(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> BoundingBox {
    BoundingBox { min_lon, max_lon, min_lat, max_lat }
}

/// Acquisition at 12:00:00 UTC on `date` (`YYYY-MM-DD`) with a single IW2 footprint
pub fn acquisition(date: &str) -> Acquisition {
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
    let start = Utc.from_utc_datetime(&day.and_hms_opt(12, 0, 0).unwrap());
    let stop = Utc.from_utc_datetime(&day.and_hms_opt(12, 0, 27).unwrap());
    let compact = day.format("%Y%m%d");
    let granule = format!(
        "S1A_IW_SLC__1SDV_{}T120000_{}T120027_030610_038200_ABCD",
        compact, compact
    );

    let mut footprints = BTreeMap::new();
    footprints.insert(Subswath::new(2).unwrap(), bbox(37.0, 38.0, -122.0, -121.0));

    Acquisition {
        path: PathBuf::from(format!("/data/{}.SAFE", granule)),
        granule,
        mission: "S1A".to_string(),
        start_time: start,
        stop_time: stop,
        footprints,
        annotations: BTreeMap::new(),
        orbit_file: None,
    }
}

pub fn pair_job(reference: &str, secondary: &str) -> PairJob {
    let roi = Roi::new(37.2, 37.8, -121.8, -121.2).unwrap();
    PairJob {
        reference: acquisition(reference),
        secondary: acquisition(secondary),
        subswath: Subswath::new(2).unwrap(),
        roi,
        geocode_box: Some(roi),
        crop_to_roi: false,
        dem: None,
        unwrap: true,
    }
}
