use crate::io::annotation::AnnotationParser;
use crate::io::granule::{strip_product_suffix, GranuleName};
use crate::io::orbit::OrbitCatalog;
use crate::io::safe::SafeProduct;
use crate::types::{Acquisition, SarError, SarResult, Stack};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Read one SAFE directory or zip archive into an [`Acquisition`]
pub fn load_acquisition(path: &Path) -> SarResult<Acquisition> {
    let granule = GranuleName::from_path(path)?;
    let mut product = SafeProduct::open(path)?;
    let annotations = product.find_annotation_files()?;

    let mut footprints = BTreeMap::new();
    for (subswath, annotation) in &annotations {
        let xml = annotation.read_to_string()?;
        let parsed = AnnotationParser::parse_annotation(&xml)?;
        let header_swath = AnnotationParser::extract_subswath(&parsed)?;
        if header_swath != *subswath {
            return Err(SarError::InvalidFormat(format!(
                "{}: annotation {} is named for {} but its header says {}",
                granule.name,
                annotation.file_name(),
                subswath,
                header_swath
            )));
        }
        let bbox = AnnotationParser::extract_bounding_box(&parsed)?;
        log::debug!("{} {} footprint: {:?}", granule.name, subswath, bbox);
        footprints.insert(*subswath, bbox);
    }

    Ok(Acquisition {
        granule: granule.name,
        mission: granule.mission,
        start_time: granule.start_time,
        stop_time: granule.stop_time,
        path: product.path().to_path_buf(),
        footprints,
        annotations,
        orbit_file: None,
    })
}

/// Materializes the acquisition stack from a manifest or a directory scan
pub struct StackLoader {
    data_dir: PathBuf,
    orbits: Option<OrbitCatalog>,
}

impl StackLoader {
    pub fn new<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.into(),
            orbits: None,
        }
    }

    pub fn with_orbits(mut self, catalog: OrbitCatalog) -> Self {
        if catalog.is_empty() {
            log::warn!("Orbit directory holds no orbit files; configurations will carry none");
        }
        self.orbits = Some(catalog);
        self
    }

    /// Use the manifest when given, otherwise scan the data directory
    pub fn load(&self, manifest: Option<&Path>) -> SarResult<Stack> {
        let paths = match manifest {
            Some(manifest) => self.manifest_products(manifest)?,
            None => self.scan_products()?,
        };

        log::info!("Loading {} acquisition(s)", paths.len());
        let acquisitions = paths
            .iter()
            .map(|path| load_acquisition(path))
            .collect::<SarResult<Vec<_>>>()?;

        let acquisitions = match &self.orbits {
            Some(catalog) => catalog.attach(acquisitions),
            None => acquisitions,
        };

        let stack = Stack::new(acquisitions)?;
        for acq in stack.acquisitions() {
            log::info!("  {} ({})", acq.granule, acq.date());
        }
        Ok(stack)
    }

    /// Product paths listed in a manifest.
    ///
    /// One granule per line, first comma-separated field; blank lines, `#`
    /// comments and a leading header line are skipped. Entries are either
    /// paths or bare granule names resolved next to the manifest or in the
    /// data directory.
    pub fn manifest_products(&self, manifest: &Path) -> SarResult<Vec<PathBuf>> {
        let content = fs::read_to_string(manifest).map_err(|e| {
            SarError::Input(format!("Cannot read manifest {}: {}", manifest.display(), e))
        })?;
        let manifest_dir = manifest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut products = Vec::new();
        let mut seen_entry = false;

        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let field = line
                .split(',')
                .next()
                .unwrap_or("")
                .trim()
                .trim_matches('"');

            let first_entry = !seen_entry;
            seen_entry = true;

            if let Some(path) = self.resolve_entry(field, &manifest_dir) {
                products.push(path);
                continue;
            }

            let file_name = Path::new(field)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(field);
            let name = strip_product_suffix(file_name);
            match GranuleName::parse(name) {
                Ok(_) => {
                    return Err(SarError::Input(format!(
                        "Granule {} listed in {} (line {}) not found",
                        name,
                        manifest.display(),
                        line_no + 1
                    )))
                }
                Err(_) if first_entry => log::debug!("Skipping manifest header: {}", line),
                Err(e) => return Err(e),
            }
        }

        Ok(products)
    }

    /// Load two products given by path or granule name, earlier first.
    ///
    /// Two acquisitions from the same date cannot form a pair.
    pub fn load_pair(&self, first: &str, second: &str) -> SarResult<(Acquisition, Acquisition)> {
        let mut acquisitions = Vec::with_capacity(2);
        for entry in [first, second] {
            let path = self.resolve_entry(entry, &self.data_dir).ok_or_else(|| {
                SarError::Input(format!(
                    "Granule {} not found in {}",
                    entry,
                    self.data_dir.display()
                ))
            })?;
            acquisitions.push(load_acquisition(&path)?);
        }
        if let Some(catalog) = &self.orbits {
            acquisitions = catalog.attach(acquisitions);
        }

        let stack = Stack::new(acquisitions)?;
        let mut ordered = stack.into_acquisitions().into_iter();
        match (ordered.next(), ordered.next()) {
            (Some(reference), Some(secondary)) => Ok((reference, secondary)),
            _ => Err(SarError::Input("A pair needs two acquisitions".to_string())),
        }
    }

    fn resolve_entry(&self, field: &str, manifest_dir: &Path) -> Option<PathBuf> {
        if field.is_empty() {
            return None;
        }

        let as_path = Path::new(field);
        let mut candidates = Vec::new();
        if as_path.is_absolute() {
            candidates.push(as_path.to_path_buf());
        } else {
            candidates.push(manifest_dir.join(as_path));
            candidates.push(self.data_dir.join(as_path));
            candidates.push(as_path.to_path_buf());
        }

        if GranuleName::parse(field).is_ok() {
            for dir in [manifest_dir, self.data_dir.as_path()] {
                candidates.push(dir.join(format!("{}.SAFE", field)));
                candidates.push(dir.join(format!("{}.zip", field)));
            }
        }

        candidates.into_iter().find(|c| {
            c.exists()
                && c
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| GranuleName::parse(strip_product_suffix(n)).is_ok())
                    .unwrap_or(false)
        })
    }

    /// SAFE directories and zip archives in the data directory; an unpacked
    /// product wins over its archive
    pub fn scan_products(&self) -> SarResult<Vec<PathBuf>> {
        let mut by_granule: BTreeMap<String, PathBuf> = BTreeMap::new();

        for entry in fs::read_dir(&self.data_dir)? {
            let path = entry?.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            let is_safe = path.is_dir() && file_name.ends_with(".SAFE");
            let is_zip = path.is_file() && file_name.ends_with(".zip");
            if !is_safe && !is_zip {
                continue;
            }

            let name = strip_product_suffix(file_name);
            if GranuleName::parse(name).is_err() {
                log::debug!("Ignoring {}", path.display());
                continue;
            }

            match by_granule.get(name) {
                Some(existing) if existing.is_dir() => {}
                _ => {
                    by_granule.insert(name.to_string(), path);
                }
            }
        }

        Ok(by_granule.into_values().collect())
    }
}
