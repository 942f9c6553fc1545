//! Run configuration.
//!
//! Resolved in layers: built-in defaults, an optional XML file, environment
//! overrides, then command-line flags (applied by the binary).

use crate::core::driver::{FailurePolicy, ProcessorConfig};
use crate::core::geometry::SwathPolicy;
use crate::io::command::ExternalCommand;
use crate::types::{SarError, SarResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const ENV_PROCESSOR: &str = "INSAR_STACK_PROCESSOR";
pub const ENV_TIMEOUT_SECS: &str = "INSAR_STACK_TIMEOUT_SECS";
pub const ENV_ORBIT_DIR: &str = "INSAR_STACK_ORBIT_DIR";
pub const ENV_JOBS: &str = "INSAR_STACK_JOBS";

/// Settings shared by every command of one invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub processor: ProcessorConfig,
    /// Directory of `.EOF` orbit files
    pub orbit_dir: Option<PathBuf>,
    /// DEM command with `{west} {south} {east} {north} {output}` placeholders
    pub fleet_dem: Option<ExternalCommand>,
    /// Replacement for the built-in topsApp template
    pub template: Option<PathBuf>,
    pub jobs: usize,
    #[serde(with = "policy_text")]
    pub failure_policy: FailurePolicy,
    #[serde(with = "policy_text")]
    pub swath_policy: SwathPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            processor: ProcessorConfig::default(),
            orbit_dir: None,
            fleet_dem: Some(
                ExternalCommand::new("get_dem.py")
                    .arg("{west}")
                    .arg("{south}")
                    .arg("{east}")
                    .arg("{north}")
                    .arg("{output}"),
            ),
            template: None,
            jobs: 1,
            failure_policy: FailurePolicy::default(),
            swath_policy: SwathPolicy::default(),
        }
    }
}

impl RunConfig {
    /// `<config dir>/insar-stack/config.xml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("insar-stack").join("config.xml"))
    }

    pub fn from_xml(xml: &str) -> SarResult<Self> {
        quick_xml::de::from_str(xml)
            .map_err(|e| SarError::XmlParsing(format!("Failed to parse configuration: {}", e)))
    }

    pub fn load_file(path: &Path) -> SarResult<Self> {
        let xml = fs::read_to_string(path).map_err(|e| {
            SarError::Input(format!("Cannot read configuration {}: {}", path.display(), e))
        })?;
        let config = Self::from_xml(&xml)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Defaults, then `explicit` (which must exist) or the default file if
    /// present, then the process environment
    pub fn resolve(explicit: Option<&Path>) -> SarResult<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::load_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `INSAR_STACK_*` overrides found through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> SarResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(line) = lookup(ENV_PROCESSOR) {
            self.processor.command = ExternalCommand::parse(&line)?;
        }
        if let Some(value) = lookup(ENV_TIMEOUT_SECS) {
            let secs = value.trim().parse::<u64>().map_err(|_| {
                SarError::Input(format!(
                    "{} must be a number of seconds, got '{}'",
                    ENV_TIMEOUT_SECS, value
                ))
            })?;
            self.processor.timeout_secs = (secs > 0).then_some(secs);
        }
        if let Some(dir) = lookup(ENV_ORBIT_DIR) {
            self.orbit_dir = Some(PathBuf::from(dir));
        }
        if let Some(value) = lookup(ENV_JOBS) {
            self.jobs = value.trim().parse::<usize>().map_err(|_| {
                SarError::Input(format!("{} must be a positive integer, got '{}'", ENV_JOBS, value))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> SarResult<()> {
        if self.jobs == 0 {
            return Err(SarError::Input("jobs must be at least 1".to_string()));
        }
        self.processor.command.validate()
    }
}

/// Policies are written as their command-line spelling in the XML file
mod policy_text {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::fmt::Display;
    use std::str::FromStr;

    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Display,
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Abort => f.write_str("abort"),
            FailurePolicy::Continue => f.write_str("continue"),
        }
    }
}

impl fmt::Display for SwathPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwathPolicy::LowestId => f.write_str("lowest-id"),
            SwathPolicy::LargestOverlap => f.write_str("largest-overlap"),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = SarError;

    fn from_str(s: &str) -> SarResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(FailurePolicy::Abort),
            "continue" | "keep-going" => Ok(FailurePolicy::Continue),
            other => Err(SarError::Input(format!(
                "Unknown failure policy '{}' (expected abort or continue)",
                other
            ))),
        }
    }
}

impl FromStr for SwathPolicy {
    type Err = SarError;

    fn from_str(s: &str) -> SarResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lowest-id" | "lowest_id" => Ok(SwathPolicy::LowestId),
            "largest-overlap" | "largest_overlap" => Ok(SwathPolicy::LargestOverlap),
            other => Err(SarError::Input(format!(
                "Unknown swath policy '{}' (expected lowest-id or largest-overlap)",
                other
            ))),
        }
    }
}
