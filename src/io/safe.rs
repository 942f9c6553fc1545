use crate::types::{SarError, SarResult, Subswath};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use zip::ZipArchive;

/// One annotation XML inside a SAFE product, readable without unpacking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRef {
    /// SAFE directory or zip archive
    pub product: PathBuf,
    /// Path relative to the SAFE directory, or the zip entry name
    pub entry: String,
}

impl AnnotationRef {
    pub fn file_name(&self) -> &str {
        self.entry.rsplit('/').next().unwrap_or(&self.entry)
    }

    pub fn read_to_string(&self) -> SarResult<String> {
        if self.product.is_dir() {
            return Ok(fs::read_to_string(self.product.join(&self.entry))?);
        }

        let mut archive = open_zip(&self.product)?;
        let mut file = archive.by_name(&self.entry).map_err(|e| {
            SarError::InvalidFormat(format!(
                "Failed to read {} from {}: {}",
                self.entry,
                self.product.display(),
                e
            ))
        })?;
        let mut content = String::new();
        file.read_to_string(&mut content)?;
        Ok(content)
    }
}

fn annotation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^s1[abcd]-iw([123])-slc-(vv|vh|hh|hv)-.+\.xml$")
            .expect("annotation pattern is valid")
    })
}

fn open_zip(path: &Path) -> SarResult<ZipArchive<File>> {
    let file = File::open(path)?;
    ZipArchive::new(file).map_err(|e| {
        SarError::InvalidFormat(format!("Failed to open ZIP {}: {}", path.display(), e))
    })
}

/// Sentinel-1 SAFE product, either unpacked or still zipped
pub struct SafeProduct {
    path: PathBuf,
    archive: Option<ZipArchive<File>>,
}

impl SafeProduct {
    /// Open a `.SAFE` directory or `.zip` archive; the stored path is absolute
    pub fn open<P: AsRef<Path>>(path: P) -> SarResult<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(SarError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("File not found: {}", path.display()),
            )));
        }

        Ok(Self {
            path: fs::canonicalize(path)?,
            archive: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_archive(&self) -> bool {
        !self.path.is_dir()
    }

    fn open_archive(&mut self) -> SarResult<&mut ZipArchive<File>> {
        if self.archive.is_none() {
            self.archive = Some(open_zip(&self.path)?);
        }
        self.archive
            .as_mut()
            .ok_or_else(|| {
                SarError::InvalidFormat(format!("{} is not an archive", self.path.display()))
            })
    }

    /// List annotation-level files, sorted by name.
    ///
    /// Directory products list `annotation/*` relative to the SAFE root; zip
    /// products list every entry name.
    pub fn list_files(&mut self) -> SarResult<Vec<String>> {
        let mut files = Vec::new();

        if self.is_archive() {
            let archive = self.open_archive()?;
            for i in 0..archive.len() {
                let file = archive.by_index(i).map_err(|e| {
                    SarError::InvalidFormat(format!("Failed to access file {}: {}", i, e))
                })?;
                files.push(file.name().to_string());
            }
        } else {
            let annotation_dir = self.path.join("annotation");
            if annotation_dir.is_dir() {
                for entry in fs::read_dir(&annotation_dir)? {
                    let entry = entry?;
                    if entry.file_type()?.is_file() {
                        files.push(format!("annotation/{}", entry.file_name().to_string_lossy()));
                    }
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// First annotation file per IW subswath, by file name
    pub fn find_annotation_files(&mut self) -> SarResult<BTreeMap<Subswath, AnnotationRef>> {
        let files = self.list_files()?;
        let mut annotations = BTreeMap::new();

        for file in files {
            let in_annotation_dir =
                file.starts_with("annotation/") || file.contains("/annotation/");
            if !in_annotation_dir || file.contains("calibration/") || file.contains("rfi/") {
                continue;
            }

            let file_name = file.rsplit('/').next().unwrap_or(&file);
            let Some(caps) = annotation_pattern().captures(file_name) else {
                continue;
            };
            let subswath: Subswath = caps[1].parse()?;

            annotations.entry(subswath).or_insert_with(|| AnnotationRef {
                product: self.path.clone(),
                entry: file.clone(),
            });
        }

        if annotations.is_empty() {
            return Err(SarError::InvalidFormat(format!(
                "No annotation files found in {}",
                self.path.display()
            )));
        }

        log::debug!(
            "Found {} subswath annotation(s) in {}",
            annotations.len(),
            self.path.display()
        );

        Ok(annotations)
    }
}
