use crate::io::granule::parse_compact_time;
use crate::types::{Acquisition, SarResult};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

/// Orbit file types available from ESA
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OrbitType {
    /// Precise Orbit Ephemerides (best accuracy, ~20 days delay)
    POEORB,
    /// Restituted Orbit Ephemerides (lower accuracy, ~3 hours delay)
    RESORB,
}

impl std::fmt::Display for OrbitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrbitType::POEORB => write!(f, "POEORB"),
            OrbitType::RESORB => write!(f, "RESORB"),
        }
    }
}

/// An EOF file found on disk, described by its name
/// `S1A_OPER_AUX_POEORB_OPOD_[prod]_V[start]_[end].EOF`
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitFile {
    pub path: PathBuf,
    pub mission: String,
    pub orbit_type: OrbitType,
    pub produced: DateTime<Utc>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

impl OrbitFile {
    /// `None` for anything that is not an orbit file name
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let stem = name.strip_suffix(".EOF")?;
        let parts: Vec<&str> = stem.split('_').collect();
        if parts.len() != 8 || parts[1] != "OPER" || parts[2] != "AUX" {
            return None;
        }

        let orbit_type = match parts[3] {
            "POEORB" => OrbitType::POEORB,
            "RESORB" => OrbitType::RESORB,
            _ => return None,
        };

        Some(Self {
            path: path.to_path_buf(),
            mission: parts[0].to_string(),
            orbit_type,
            produced: parse_compact_time(parts[5]).ok()?,
            valid_from: parse_compact_time(parts[6].strip_prefix('V')?).ok()?,
            valid_until: parse_compact_time(parts[7]).ok()?,
        })
    }

    pub fn covers(&self, mission: &str, start: DateTime<Utc>, stop: DateTime<Utc>) -> bool {
        self.mission == mission && self.valid_from <= start && stop <= self.valid_until
    }
}

/// Orbit files available in a local directory.
///
/// Retrieval from ESA is somebody else's job; this only associates what is
/// already on disk with acquisitions.
pub struct OrbitCatalog {
    files: Vec<OrbitFile>,
}

impl OrbitCatalog {
    pub fn scan<P: AsRef<Path>>(orbit_dir: P) -> SarResult<Self> {
        let orbit_dir = fs::canonicalize(orbit_dir.as_ref())?;
        log::info!("Scanning orbit directory: {}", orbit_dir.display());

        let mut files = Vec::new();
        for entry in fs::read_dir(&orbit_dir)? {
            let path = entry?.path();
            if let Some(orbit) = OrbitFile::from_path(&path) {
                files.push(orbit);
            }
        }

        let catalog = Self { files };
        log::debug!("Found {} orbit file(s)", catalog.len());
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Best orbit for the acquisition: precise before restituted, then the
    /// most recently produced file.
    pub fn find_for(&self, acquisition: &Acquisition) -> Option<&OrbitFile> {
        self.files
            .iter()
            .filter(|f| {
                f.covers(&acquisition.mission, acquisition.start_time, acquisition.stop_time)
            })
            .min_by(|a, b| {
                a.orbit_type
                    .cmp(&b.orbit_type)
                    .then_with(|| b.produced.cmp(&a.produced))
            })
    }

    /// Attach the best available orbit to every acquisition
    pub fn attach(&self, acquisitions: Vec<Acquisition>) -> Vec<Acquisition> {
        acquisitions
            .into_iter()
            .map(|acq| {
                let orbit = self.find_for(&acq).map(|f| f.path.clone());
                match &orbit {
                    Some(path) => log::info!("Orbit for {}: {}", acq.granule, path.display()),
                    None => log::warn!("No orbit file found for {}", acq.granule),
                }
                acq.with_orbit_file(orbit)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn acquisition() -> Acquisition {
        Acquisition {
            granule: "S1A_IW_SLC__1SDV_20200103T170815_20200103T170842_030639_0382D5_DADE".to_string(),
            mission: "S1A".to_string(),
            start_time: parse_compact_time("20200103T170815").unwrap(),
            stop_time: parse_compact_time("20200103T170842").unwrap(),
            path: PathBuf::from("/data/x.SAFE"),
            footprints: BTreeMap::new(),
            annotations: BTreeMap::new(),
            orbit_file: None,
        }
    }

    #[test]
    fn test_parse_orbit_file_name() {
        let orbit = OrbitFile::from_path(Path::new(
            "/orbits/S1A_OPER_AUX_POEORB_OPOD_20200123T121610_V20200102T225942_20200104T005942.EOF",
        ))
        .unwrap();
        assert_eq!(orbit.orbit_type, OrbitType::POEORB);
        assert_eq!(orbit.mission, "S1A");
        assert!(OrbitFile::from_path(Path::new("/orbits/readme.txt")).is_none());
    }

    #[test]
    fn test_precise_orbit_preferred() {
        let temp = TempDir::new().unwrap();
        for name in [
            "S1A_OPER_AUX_RESORB_OPOD_20200103T202048_V20200103T163528_20200103T195258.EOF",
            "S1A_OPER_AUX_POEORB_OPOD_20200123T121610_V20200102T225942_20200104T005942.EOF",
            "S1B_OPER_AUX_POEORB_OPOD_20200123T110712_V20200102T225942_20200104T005942.EOF",
        ] {
            fs::write(temp.path().join(name), "").unwrap();
        }

        let catalog = OrbitCatalog::scan(temp.path()).unwrap();
        assert_eq!(catalog.len(), 3);

        let best = catalog.find_for(&acquisition()).unwrap();
        assert_eq!(best.orbit_type, OrbitType::POEORB);
        assert_eq!(best.mission, "S1A");

        let attached = catalog.attach(vec![acquisition()]);
        assert_eq!(attached[0].orbit_file.as_deref(), Some(best.path.as_path()));
    }

    #[test]
    fn test_no_covering_orbit() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("S1A_OPER_AUX_POEORB_OPOD_20200201T121610_V20200130T225942_20200201T005942.EOF"),
            "",
        )
        .unwrap();
        let catalog = OrbitCatalog::scan(temp.path()).unwrap();
        assert!(catalog.find_for(&acquisition()).is_none());
    }
}
