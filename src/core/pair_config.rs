//! Per-pair processor configuration.
//!
//! A shared, read-only template is cloned for every pair and the pair's
//! values are written into it by property name. Optional elements are
//! replaced rather than appended, so regenerating a configuration from a
//! previously generated one never duplicates them.

use crate::io::xml_doc::{XmlDocument, XmlElement};
use crate::types::{Acquisition, PairJob, Roi, SarError, SarResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Built-in topsApp template
pub const DEFAULT_TEMPLATE: &str = include_str!("../../templates/topsApp.xml");

/// Name of the generated document inside a pair's working directory
pub const CONFIG_FILE_NAME: &str = "topsApp.xml";

const PROCESSOR_COMPONENT: &str = "topsinsar";
const COMPONENT: &str = "component";
const PROPERTY: &str = "property";

const DO_UNWRAP: &str = "do unwrap";
const GEOCODE_BOX: &str = "geocode bounding box";
const DEM_FILENAME: &str = "demfilename";
const SAFE: &str = "safe";
const ORBIT_FILE: &str = "orbit file";
const SWATH_NUMBER: &str = "swath number";
const REGION_OF_INTEREST: &str = "region of interest";

/// Acquisition roles inside the processor configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Reference,
    Secondary,
}

impl Role {
    pub const BOTH: [Role; 2] = [Role::Reference, Role::Secondary];

    pub fn component_name(self) -> &'static str {
        match self {
            Role::Reference => "reference",
            Role::Secondary => "secondary",
        }
    }
}

/// The shared base document, validated once at load time
#[derive(Debug, Clone)]
pub struct ConfigTemplate {
    document: XmlDocument,
}

impl ConfigTemplate {
    pub fn builtin() -> SarResult<Self> {
        Self::parse(DEFAULT_TEMPLATE)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> SarResult<Self> {
        let path = path.as_ref();
        let xml = fs::read_to_string(path).map_err(|e| {
            SarError::Template(format!("Cannot read template {}: {}", path.display(), e))
        })?;
        Self::parse(&xml)
    }

    /// Parse and check that every property the generator must set exists.
    ///
    /// A failure here is a defect in the template, not in the input data.
    pub fn parse(xml: &str) -> SarResult<Self> {
        let document = XmlDocument::parse(xml)
            .map_err(|e| SarError::Template(format!("Malformed template: {}", e)))?;

        let processor = processor_component(&document.root)?;
        require_property(processor, PROCESSOR_COMPONENT, DO_UNWRAP)?;
        for role in Role::BOTH {
            let component = processor
                .find_named(COMPONENT, role.component_name())
                .ok_or_else(|| missing(PROCESSOR_COMPONENT, COMPONENT, role.component_name()))?;
            for property in [SAFE, ORBIT_FILE, SWATH_NUMBER] {
                require_property(component, role.component_name(), property)?;
            }
        }

        Ok(Self { document })
    }

    /// Materialize the configuration for one pair. The template itself is
    /// never modified.
    pub fn generate(&self, job: &PairJob) -> SarResult<PairConfiguration> {
        let mut document = self.document.clone();
        let processor = processor_component_mut(&mut document.root)?;

        set_property(processor, PROCESSOR_COMPONENT, DO_UNWRAP, topsapp_bool(job.unwrap))?;
        replace_optional(processor, GEOCODE_BOX, job.geocode_box.as_ref().map(Roi::to_string));
        replace_optional(
            processor,
            DEM_FILENAME,
            job.dem.as_ref().map(|dem| dem.display().to_string()),
        );

        for (role, acquisition) in [
            (Role::Reference, &job.reference),
            (Role::Secondary, &job.secondary),
        ] {
            let component = processor
                .find_named_mut(COMPONENT, role.component_name())
                .ok_or_else(|| missing(PROCESSOR_COMPONENT, COMPONENT, role.component_name()))?;
            configure_role(component, role, acquisition, job)?;
        }

        let xml = document.to_xml_string()?;
        Ok(PairConfiguration { xml })
    }
}

fn configure_role(
    component: &mut XmlElement,
    role: Role,
    acquisition: &Acquisition,
    job: &PairJob,
) -> SarResult<()> {
    let name = role.component_name();
    set_property(component, name, SAFE, acquisition.path.display().to_string())?;

    let orbit = match &acquisition.orbit_file {
        Some(path) => path.display().to_string(),
        None => {
            log::warn!("No orbit file for {} ({})", acquisition.granule, name);
            String::new()
        }
    };
    set_property(component, name, ORBIT_FILE, orbit)?;
    set_property(component, name, SWATH_NUMBER, job.subswath.id().to_string())?;

    let region = job.crop_to_roi.then(|| job.roi.to_string());
    replace_optional(component, REGION_OF_INTEREST, region);
    Ok(())
}

/// A generated document ready to hand to the processor
#[derive(Debug, Clone)]
pub struct PairConfiguration {
    xml: String,
}

impl PairConfiguration {
    pub fn as_str(&self) -> &str {
        &self.xml
    }

    /// Write `topsApp.xml` into `work_dir`, creating it if needed
    pub fn write_to(&self, work_dir: &Path) -> SarResult<PathBuf> {
        fs::create_dir_all(work_dir)?;
        let path = work_dir.join(CONFIG_FILE_NAME);
        fs::write(&path, &self.xml)?;
        log::debug!("Wrote {}", path.display());
        Ok(path)
    }
}

/// Generate and write the configuration for `job` under `run_dir`,
/// returning the pair's working directory
pub fn configure_pair(
    template: &ConfigTemplate,
    job: &PairJob,
    run_dir: &Path,
) -> SarResult<PathBuf> {
    let work_dir = job.work_dir(run_dir);
    let configuration = template.generate(job)?;
    configuration.write_to(&work_dir)?;
    log::info!("Configured pair {} ({})", job.key(), job.subswath);
    Ok(work_dir)
}

fn topsapp_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

fn missing(parent: &str, tag: &str, name: &str) -> SarError {
    SarError::Template(format!("<{} name=\"{}\"> missing under {}", tag, name, parent))
}

fn processor_component(root: &XmlElement) -> SarResult<&XmlElement> {
    root.find_named(COMPONENT, PROCESSOR_COMPONENT)
        .ok_or_else(|| missing(&root.name, COMPONENT, PROCESSOR_COMPONENT))
}

fn processor_component_mut(root: &mut XmlElement) -> SarResult<&mut XmlElement> {
    let root_name = root.name.clone();
    root.find_named_mut(COMPONENT, PROCESSOR_COMPONENT)
        .ok_or_else(|| missing(&root_name, COMPONENT, PROCESSOR_COMPONENT))
}

fn require_property(component: &XmlElement, parent: &str, name: &str) -> SarResult<()> {
    match component.count_named(PROPERTY, name) {
        1 => Ok(()),
        0 => Err(missing(parent, PROPERTY, name)),
        n => Err(SarError::Template(format!(
            "property \"{}\" appears {} times under {}",
            name, n, parent
        ))),
    }
}

/// Overwrite an existing property; an unknown name is a template defect
fn set_property<S: Into<String>>(
    component: &mut XmlElement,
    parent: &str,
    name: &str,
    value: S,
) -> SarResult<()> {
    let property = component
        .find_named_mut(PROPERTY, name)
        .ok_or_else(|| missing(parent, PROPERTY, name))?;
    property.set_text(value);
    Ok(())
}

/// Drop every instance of an optional property, then add it back once if a
/// value is wanted
fn replace_optional(component: &mut XmlElement, name: &str, value: Option<String>) {
    component.remove_named(PROPERTY, name);
    if let Some(value) = value {
        component.push(
            XmlElement::new(PROPERTY)
                .with_attribute("name", name)
                .with_text(value),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::pair_job;

    #[test]
    fn test_builtin_template_is_valid() {
        assert!(ConfigTemplate::builtin().is_ok());
    }

    #[test]
    fn test_template_missing_property() {
        let xml = DEFAULT_TEMPLATE.replace("<property name=\"orbit file\"/>", "");
        let err = ConfigTemplate::parse(&xml).unwrap_err();
        assert!(matches!(err, SarError::Template(ref msg) if msg.contains("orbit file")));
    }

    #[test]
    fn test_template_missing_role() {
        let xml = DEFAULT_TEMPLATE.replace("name=\"secondary\"", "name=\"slave\"");
        assert!(matches!(ConfigTemplate::parse(&xml), Err(SarError::Template(_))));
    }

    #[test]
    fn test_malformed_template() {
        assert!(matches!(
            ConfigTemplate::parse("<topsApp><component name=\"topsinsar\">"),
            Err(SarError::Template(_))
        ));
    }

    fn property<'a>(component: &'a XmlElement, name: &str) -> Option<&'a XmlElement> {
        component.find_named(PROPERTY, name)
    }

    #[test]
    fn test_generate_sets_pair_fields() {
        let mut job = pair_job("2020-01-01", "2020-01-13");
        job.secondary.orbit_file = Some(PathBuf::from("/orbits/S1A_OPER_AUX_POEORB.EOF"));
        job.dem = Some(PathBuf::from("/run/stack_dem.dem"));

        let configuration = ConfigTemplate::builtin().unwrap().generate(&job).unwrap();
        let document = XmlDocument::parse(configuration.as_str()).unwrap();
        let processor = processor_component(&document.root).unwrap();

        assert_eq!(property(processor, DO_UNWRAP).unwrap().text(), "True");
        assert_eq!(
            property(processor, GEOCODE_BOX).unwrap().text(),
            "[37.2, 37.8, -121.8, -121.2]"
        );
        assert_eq!(property(processor, DEM_FILENAME).unwrap().text(), "/run/stack_dem.dem");

        let reference = processor.find_named(COMPONENT, "reference").unwrap();
        assert_eq!(
            property(reference, SAFE).unwrap().text(),
            job.reference.path.display().to_string()
        );
        assert_eq!(property(reference, ORBIT_FILE).unwrap().text(), "");
        assert_eq!(property(reference, SWATH_NUMBER).unwrap().text(), "2");
        assert!(property(reference, REGION_OF_INTEREST).is_none());

        let secondary = processor.find_named(COMPONENT, "secondary").unwrap();
        assert_eq!(
            property(secondary, ORBIT_FILE).unwrap().text(),
            "/orbits/S1A_OPER_AUX_POEORB.EOF"
        );
    }

    #[test]
    fn test_generate_is_deterministic_and_leaves_template_alone() {
        let template = ConfigTemplate::builtin().unwrap();
        let before = template.document.clone();
        let job = pair_job("2020-01-01", "2020-01-13");

        let first = template.generate(&job).unwrap();
        let second = template.generate(&job).unwrap();
        assert_eq!(first.as_str(), second.as_str());
        assert_eq!(template.document, before);
    }

    #[test]
    fn test_regenerating_never_duplicates_optional_elements() {
        let mut job = pair_job("2020-01-01", "2020-01-13");
        job.crop_to_roi = true;
        job.dem = Some(PathBuf::from("/run/stack_dem.dem"));

        let template = ConfigTemplate::builtin().unwrap();
        let generated = template.generate(&job).unwrap();

        // feed the generated document back in as a template
        let reloaded = ConfigTemplate::parse(generated.as_str()).unwrap();
        let regenerated = reloaded.generate(&job).unwrap();
        assert_eq!(generated.as_str(), regenerated.as_str());

        let document = XmlDocument::parse(regenerated.as_str()).unwrap();
        let processor = processor_component(&document.root).unwrap();
        assert_eq!(processor.count_named(PROPERTY, GEOCODE_BOX), 1);
        assert_eq!(processor.count_named(PROPERTY, DEM_FILENAME), 1);
        for role in Role::BOTH {
            let component = processor.find_named(COMPONENT, role.component_name()).unwrap();
            assert_eq!(component.count_named(PROPERTY, REGION_OF_INTEREST), 1);
        }

        // and dropping the options removes them again
        job.crop_to_roi = false;
        job.dem = None;
        job.geocode_box = None;
        job.unwrap = false;
        let stripped = reloaded.generate(&job).unwrap();
        let document = XmlDocument::parse(stripped.as_str()).unwrap();
        let processor = processor_component(&document.root).unwrap();
        assert_eq!(property(processor, DO_UNWRAP).unwrap().text(), "False");
        assert_eq!(processor.count_named(PROPERTY, GEOCODE_BOX), 0);
        assert_eq!(processor.count_named(PROPERTY, DEM_FILENAME), 0);
        assert!(!stripped.as_str().contains(REGION_OF_INTEREST));
    }

    #[test]
    fn test_configure_pair_writes_into_work_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        let job = pair_job("2020-01-01", "2020-01-13");
        let template = ConfigTemplate::builtin().unwrap();
        let work_dir = configure_pair(&template, &job, temp.path()).unwrap();

        assert_eq!(
            work_dir,
            temp.path().join("20200101T120000_20200113T120000").join("iw2")
        );
        let written = fs::read_to_string(work_dir.join(CONFIG_FILE_NAME)).unwrap();
        assert!(written.starts_with("<?xml"));
        assert!(written.contains("<property name=\"swath number\">2</property>"));
    }

    #[test]
    fn test_replace_optional_is_single() {
        let mut component = XmlElement::new(COMPONENT).with_attribute("name", "x");
        replace_optional(&mut component, DEM_FILENAME, Some("/a.dem".to_string()));
        replace_optional(&mut component, DEM_FILENAME, Some("/b.dem".to_string()));
        assert_eq!(component.count_named(PROPERTY, DEM_FILENAME), 1);
        assert_eq!(component.find_named(PROPERTY, DEM_FILENAME).unwrap().text(), "/b.dem");

        replace_optional(&mut component, DEM_FILENAME, None);
        assert_eq!(component.count_named(PROPERTY, DEM_FILENAME), 0);
    }
}
