//! Synthetic Sentinel-1 products and a stand-in processor for integration tests

#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// `(subswath, south, north, west, east)`, three adjacent IW swaths
pub const SWATHS: [(u8, f64, f64, f64, f64); 3] = [
    (1, 37.0, 38.0, -122.0, -121.0),
    (2, 37.0, 38.0, -121.1, -120.0),
    (3, 37.0, 38.0, -120.1, -119.0),
];

pub const HEADING: f64 = -13.05281;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Granule name for an acquisition at 12:00:00 on `date` (`YYYYMMDD`)
pub fn granule_name(date: &str) -> String {
    format!(
        "S1A_IW_SLC__1SDV_{date}T120000_{date}T120027_030610_038200_{}",
        &date[4..8],
        date = date
    )
}

/// Pair key of two `YYYYMMDD` dates
pub fn pair_key(reference: &str, secondary: &str) -> String {
    format!("{}T120000_{}T120000", reference, secondary)
}

pub fn annotation_xml(
    swath: u8,
    date: &str,
    south: f64,
    north: f64,
    west: f64,
    east: f64,
) -> String {
    let start = format!("{}-{}-{}T12:00:00.000000", &date[0..4], &date[4..6], &date[6..8]);
    let mut points = String::new();
    for (line, lat) in [(0, south), (1500, north)] {
        for (pixel, lon) in [(0, west), (20000, east)] {
            points.push_str(&format!(
                "<geolocationGridPoint><azimuthTime>{}</azimuthTime><line>{}</line><pixel>{}</pixel>\
                 <latitude>{}</latitude><longitude>{}</longitude><height>0</height></geolocationGridPoint>",
                start, line, pixel, lat, lon
            ));
        }
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<product>
  <adsHeader>
    <missionId>S1A</missionId>
    <productType>SLC</productType>
    <polarisation>VV</polarisation>
    <mode>IW</mode>
    <swath>IW{swath}</swath>
    <startTime>{start}</startTime>
    <stopTime>{start}</stopTime>
  </adsHeader>
  <generalAnnotation>
    <productInformation>
      <pass>Ascending</pass>
      <platformHeading>-1.305281e+01</platformHeading>
    </productInformation>
  </generalAnnotation>
  <geolocationGrid>
    <geolocationGridPointList count="4">{points}</geolocationGridPointList>
  </geolocationGrid>
</product>
"#,
        swath = swath,
        start = start,
        points = points
    )
}

fn annotation_entries(date: &str) -> Vec<(String, String)> {
    SWATHS
        .iter()
        .map(|(swath, south, north, west, east)| {
            let name = format!(
                "annotation/s1a-iw{}-slc-vv-{}t120000-{}t120027-030610-038200-00{}.xml",
                swath,
                date.to_lowercase(),
                date.to_lowercase(),
                swath
            );
            (name, annotation_xml(*swath, date, *south, *north, *west, *east))
        })
        .collect()
}

/// Unpacked `<name>.SAFE` directory with three annotated swaths
pub fn write_safe_dir(dir: &Path, date: &str) -> PathBuf {
    let safe = dir.join(format!("{}.SAFE", granule_name(date)));
    fs::create_dir_all(safe.join("annotation").join("calibration")).unwrap();
    for (entry, xml) in annotation_entries(date) {
        fs::write(safe.join(entry), xml).unwrap();
    }
    fs::write(
        safe.join("annotation").join("calibration").join("calibration-s1a-iw1-slc-vv.xml"),
        "<calibration/>",
    )
    .unwrap();
    safe
}

/// `<name>.zip` archive with the same layout as [`write_safe_dir`]
pub fn write_safe_zip(dir: &Path, date: &str) -> PathBuf {
    let name = granule_name(date);
    let path = dir.join(format!("{}.zip", name));
    let file = fs::File::create(&path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default();
    for (entry, xml) in annotation_entries(date) {
        zip.start_file(format!("{}.SAFE/{}", name, entry), options).unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
    path
}

pub const PROCESSOR_LOG: &str = "\
isce.topsinsar.runPreprocessor.subset.Overlap 0 start time = 2020-01-01 12:00:05.5
isce.topsinsar.runComputeBaseline.Bperp at midrange for first common burst = 12.34
topsinsar.geocode.Azimuth looks = 7
topsinsar.geocode.Range looks = 19
";

/// Shell script standing in for topsApp.py.
///
/// It requires `topsApp.xml` in its working directory and writes a
/// `merged/` directory plus `isce.log`. A `SKIP` file in the pair directory
/// makes it exit cleanly without output, a `FAIL` file makes it exit 3.
#[cfg(unix)]
pub fn write_fake_processor(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake_topsApp.sh");
    let script = format!(
        "#!/bin/sh\n\
         set -e\n\
         test -f topsApp.xml\n\
         if [ -f ../SKIP ]; then exit 0; fi\n\
         if [ -f ../FAIL ]; then echo boom >&2; exit 3; fi\n\
         mkdir -p merged\n\
         echo phase > merged/phase.tif\n\
         echo amp > merged/amp.tif\n\
         echo corr > merged/coherence.tif\n\
         echo png > merged/colorized_unw.png\n\
         cat > isce.log <<'LOG'\n{}LOG\n",
        PROCESSOR_LOG
    );
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}
