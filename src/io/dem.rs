use crate::io::command::ExternalCommand;
use crate::types::{Roi, SarError, SarResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name of a DEM produced for a whole stack
pub const STACK_DEM_NAME: &str = "stack_dem.dem";

/// Source of the single DEM shared read-only by every pair of a run
pub trait DemProvider: Send + Sync {
    /// Produce (or locate) a DEM covering `roi`, returning its absolute path
    fn acquire(&self, roi: &Roi, run_dir: &Path) -> SarResult<PathBuf>;
}

/// A DEM file the user already has
pub struct ExistingDem {
    path: PathBuf,
}

impl ExistingDem {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl DemProvider for ExistingDem {
    fn acquire(&self, _roi: &Roi, _run_dir: &Path) -> SarResult<PathBuf> {
        if !self.path.is_file() {
            return Err(SarError::Input(format!(
                "DEM file not found: {}",
                self.path.display()
            )));
        }
        Ok(fs::canonicalize(&self.path)?)
    }
}

/// DEM produced by an external tool. Arguments may use the `{west}`,
/// `{south}`, `{east}`, `{north}` and `{output}` placeholders.
pub struct CommandDem {
    command: ExternalCommand,
    timeout: Option<Duration>,
}

impl CommandDem {
    pub fn new(command: ExternalCommand, timeout: Option<Duration>) -> Self {
        Self { command, timeout }
    }
}

impl DemProvider for CommandDem {
    fn acquire(&self, roi: &Roi, run_dir: &Path) -> SarResult<PathBuf> {
        log::info!("Fetching stack DEM for {}", roi);

        let resolved = self.command.substitute(&[
            ("west", format!("{:?}", roi.west)),
            ("south", format!("{:?}", roi.south)),
            ("east", format!("{:?}", roi.east)),
            ("north", format!("{:?}", roi.north)),
            ("output", STACK_DEM_NAME.to_string()),
        ]);
        resolved.run(run_dir, "dem", self.timeout, "stack DEM")?;

        let output = run_dir.join(STACK_DEM_NAME);
        if !output.is_file() {
            return Err(SarError::ExternalTool {
                target: "stack DEM".to_string(),
                message: format!("{} did not produce {}", resolved.program, output.display()),
            });
        }
        Ok(fs::canonicalize(output)?)
    }
}
