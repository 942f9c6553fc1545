//! Stack orchestration.
//!
//! `INIT -> ACQUIRE_INPUTS -> DETERMINE_GEOMETRY -> [ACQUIRE_DEM] -> BUILD_NETWORK
//! -> per pair {CONFIGURE -> EXECUTE -> COLLECT} -> AGGREGATE -> DONE`
//!
//! Every path is absolute and passed explicitly, so pairs share no process
//! state and may run on a worker pool.

use crate::core::collect::{collect_pair, CollectedPair, Converter, PRODUCT_DIR};
use crate::core::geometry::{GeometrySelector, SwathPolicy};
use crate::core::network::build_network;
use crate::core::pair_config::{configure_pair, ConfigTemplate};
use crate::io::command::ExternalCommand;
use crate::io::dem::DemProvider;
use crate::io::manifest::StackLoader;
use crate::io::safe::AnnotationRef;
use crate::types::{PairJob, Roi, SarError, SarResult, Stack, Subswath};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Driver state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Init,
    AcquireInputs,
    DetermineGeometry,
    AcquireDem,
    BuildNetwork,
    Configure,
    Execute,
    Collect,
    Aggregate,
    Done,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStage::Init => "INIT",
            RunStage::AcquireInputs => "ACQUIRE_INPUTS",
            RunStage::DetermineGeometry => "DETERMINE_GEOMETRY",
            RunStage::AcquireDem => "ACQUIRE_DEM",
            RunStage::BuildNetwork => "BUILD_NETWORK",
            RunStage::Configure => "CONFIGURE",
            RunStage::Execute => "EXECUTE",
            RunStage::Collect => "COLLECT",
            RunStage::Aggregate => "AGGREGATE",
            RunStage::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// What happens to the run when one pair fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// The first failing pair fails the whole run
    #[default]
    Abort,
    /// Record the failure and carry on with the remaining pairs
    Continue,
}

/// Which part of the reference footprint to process
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SwathRequest {
    /// Full extent of one subswath
    Subswath(Subswath),
    /// The subswath overlapping this region, with the region clipped to it
    Roi(Roi),
}

impl Default for SwathRequest {
    fn default() -> Self {
        SwathRequest::Roi(Roi::GLOBE)
    }
}

/// Parameters of one stack run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackParams {
    /// Absolute directory holding pair working directories and `PRODUCT/`
    pub run_dir: PathBuf,
    pub request: SwathRequest,
    pub unwrap: bool,
    /// Also restrict each acquisition's processing region, not just geocoding
    pub crop_to_roi: bool,
    pub failure_policy: FailurePolicy,
    /// Pairs processed concurrently; 1 keeps strict network order
    pub jobs: usize,
    pub swath_policy: SwathPolicy,
}

impl Default for StackParams {
    fn default() -> Self {
        Self {
            run_dir: PathBuf::from("."),
            request: SwathRequest::default(),
            unwrap: true,
            crop_to_roi: false,
            failure_policy: FailurePolicy::default(),
            jobs: 1,
            swath_policy: SwathPolicy::default(),
        }
    }
}

/// External processor and optional post-processing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    pub command: ExternalCommand,
    #[serde(default)]
    pub converter: Option<ExternalCommand>,
    /// Deadline per invocation, none by default; 0 also means none
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            command: ExternalCommand::new("topsApp.py"),
            converter: None,
            timeout_secs: None,
        }
    }
}

impl ProcessorConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs)
    }

    pub fn converter(&self) -> Option<Converter> {
        self.converter.as_ref().map(|command| Converter {
            command: command.clone(),
            timeout: self.timeout(),
        })
    }
}

/// Runs the interferometric processor for one configured pair
pub trait InterferogramProcessor: Send + Sync {
    /// Blocks until the processor has finished in `work_dir`
    fn run(&self, job: &PairJob, work_dir: &Path) -> SarResult<()>;
}

/// ISCE `topsApp.py`, reading the `topsApp.xml` written next to it
#[derive(Debug, Clone, Default)]
pub struct TopsAppProcessor {
    config: ProcessorConfig,
}

impl TopsAppProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self { config }
    }
}

impl InterferogramProcessor for TopsAppProcessor {
    fn run(&self, job: &PairJob, work_dir: &Path) -> SarResult<()> {
        self.config
            .command
            .run(work_dir, "topsApp", self.config.timeout(), &job.key())
    }
}

/// Result of one pair
#[derive(Debug)]
pub enum PairStatus {
    Completed(CollectedPair),
    Failed { stage: RunStage, error: SarError },
}

#[derive(Debug)]
pub struct PairOutcome {
    pub key: String,
    pub subswath: Subswath,
    pub work_dir: PathBuf,
    pub status: PairStatus,
}

impl PairOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self.status, PairStatus::Completed(_))
    }
}

/// Everything a run produced, complete or partial
#[derive(Debug, Default)]
pub struct RunReport {
    pub run_dir: PathBuf,
    pub product_dir: PathBuf,
    pub subswath: Option<Subswath>,
    pub roi: Option<Roi>,
    pub dem: Option<PathBuf>,
    /// In network order
    pub pairs: Vec<PairOutcome>,
}

impl RunReport {
    pub fn completed(&self) -> usize {
        self.pairs.iter().filter(|p| p.is_completed()).count()
    }

    pub fn failed(&self) -> usize {
        self.pairs.len() - self.completed()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// A hard failure, with whatever the run had produced so far
#[derive(Debug, thiserror::Error)]
#[error("Stack run failed during {stage}")]
pub struct RunFailure {
    pub stage: RunStage,
    #[source]
    pub error: SarError,
    pub report: RunReport,
}

impl RunFailure {
    fn new(stage: RunStage, error: SarError, report: RunReport) -> Self {
        log::error!("{} failed: {}", stage, error);
        Self { stage, error, report }
    }
}

/// Drives one stack run over a single subswath
pub struct StackProcessor {
    params: StackParams,
    template: ConfigTemplate,
    processor: Box<dyn InterferogramProcessor>,
    converter: Option<Converter>,
    dem: Option<Box<dyn DemProvider>>,
}

impl StackProcessor {
    pub fn new(
        params: StackParams,
        template: ConfigTemplate,
        processor: Box<dyn InterferogramProcessor>,
    ) -> Self {
        Self {
            params,
            template,
            processor,
            converter: None,
            dem: None,
        }
    }

    pub fn with_converter(mut self, converter: Option<Converter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_dem(mut self, dem: Option<Box<dyn DemProvider>>) -> Self {
        self.dem = dem;
        self
    }

    pub fn params(&self) -> &StackParams {
        &self.params
    }

    /// Full run: load the stack, then process it
    pub fn run(
        &self,
        loader: &StackLoader,
        manifest: Option<&Path>,
    ) -> Result<RunReport, RunFailure> {
        let report = self.initial_report();
        log::info!("{}: run directory {}", RunStage::Init, report.run_dir.display());

        log::info!("{}", RunStage::AcquireInputs);
        let stack = match loader.load(manifest) {
            Ok(stack) => stack,
            Err(e) => return Err(RunFailure::new(RunStage::AcquireInputs, e, report)),
        };

        self.run_stack(&stack)
    }

    /// Process an already loaded stack
    pub fn run_stack(&self, stack: &Stack) -> Result<RunReport, RunFailure> {
        let mut report = self.initial_report();
        let run_dir =
            fs::create_dir_all(&report.run_dir).and_then(|_| fs::canonicalize(&report.run_dir));
        match run_dir {
            Ok(run_dir) => {
                report.product_dir = run_dir.join(PRODUCT_DIR);
                report.run_dir = run_dir;
            }
            Err(e) => return Err(RunFailure::new(RunStage::Init, e.into(), report)),
        }

        log::info!("{}", RunStage::DetermineGeometry);
        let (subswath, roi) = match self.determine_geometry(stack) {
            Ok(selection) => selection,
            Err(e) => return Err(RunFailure::new(RunStage::DetermineGeometry, e, report)),
        };
        report.subswath = Some(subswath);
        report.roi = Some(roi);

        if let Some(provider) = &self.dem {
            log::info!("{}", RunStage::AcquireDem);
            match provider.acquire(&roi, &report.run_dir) {
                Ok(dem) => report.dem = Some(dem),
                Err(e) => return Err(RunFailure::new(RunStage::AcquireDem, e, report)),
            }
        }

        log::info!("{}", RunStage::BuildNetwork);
        let jobs: Vec<PairJob> = build_network(stack)
            .iter()
            .filter_map(|pair| pair.acquisitions(stack))
            .map(|(reference, secondary)| PairJob {
                reference: reference.clone(),
                secondary: secondary.clone(),
                subswath,
                roi,
                geocode_box: Some(roi),
                crop_to_roi: self.params.crop_to_roi,
                dem: report.dem.clone(),
                unwrap: self.params.unwrap,
            })
            .collect();

        if jobs.is_empty() {
            log::warn!("Fewer than two acquisitions, nothing to process");
            log::info!("{}", RunStage::Done);
            return Ok(report);
        }

        let annotations = stack.annotation_refs();
        let outcomes = match self.process_pairs(
            &jobs,
            &report.run_dir,
            &report.product_dir,
            &annotations,
        ) {
            Ok(outcomes) => outcomes,
            Err(e) => return Err(RunFailure::new(RunStage::Execute, e, report)),
        };

        log::info!("{}", RunStage::Aggregate);
        let abort = self.params.failure_policy == FailurePolicy::Abort;
        for outcome in outcomes {
            match outcome.status {
                PairStatus::Failed { stage, error } if abort => {
                    return Err(RunFailure::new(stage, error, report));
                }
                status => report.pairs.push(PairOutcome { status, ..outcome }),
            }
        }

        log::info!(
            "{}: {} pair(s) completed, {} failed, products in {}",
            RunStage::Done,
            report.completed(),
            report.failed(),
            report.product_dir.display()
        );
        Ok(report)
    }

    fn initial_report(&self) -> RunReport {
        RunReport {
            run_dir: self.params.run_dir.clone(),
            product_dir: self.params.run_dir.join(PRODUCT_DIR),
            ..RunReport::default()
        }
    }

    fn determine_geometry(&self, stack: &Stack) -> SarResult<(Subswath, Roi)> {
        let selector = GeometrySelector::new(self.params.swath_policy);
        let footprint = &stack.first().footprints;
        match self.params.request {
            SwathRequest::Subswath(subswath) => {
                let extent = selector.swath_extent(footprint, subswath)?;
                log::info!("Processing subswath {} over {}", subswath.id(), extent);
                Ok((subswath, extent))
            }
            SwathRequest::Roi(roi) => selector.select_one(footprint, &roi),
        }
    }

    /// Run every job; results come back in job order whatever the worker count
    fn process_pairs(
        &self,
        jobs: &[PairJob],
        run_dir: &Path,
        product_dir: &Path,
        annotations: &[AnnotationRef],
    ) -> SarResult<Vec<PairOutcome>> {
        let total = jobs.len();
        let workers = self.params.jobs.max(1);

        if workers == 1 {
            let mut outcomes = Vec::with_capacity(total);
            for (index, job) in jobs.iter().enumerate() {
                log::info!("Pair {}/{}: {}", index + 1, total, job.key());
                let outcome = self.process_pair(job, run_dir, product_dir, annotations);
                let stop = !outcome.is_completed()
                    && self.params.failure_policy == FailurePolicy::Abort;
                outcomes.push(outcome);
                if stop {
                    break;
                }
            }
            return Ok(outcomes);
        }

        log::info!("Processing {} pairs on {} workers", total, workers);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| SarError::Input(format!("Cannot start {} workers: {}", workers, e)))?;

        Ok(pool.install(|| {
            jobs.par_iter()
                .map(|job| self.process_pair(job, run_dir, product_dir, annotations))
                .collect()
        }))
    }

    /// CONFIGURE, EXECUTE, COLLECT for one pair
    fn process_pair(
        &self,
        job: &PairJob,
        run_dir: &Path,
        product_dir: &Path,
        annotations: &[AnnotationRef],
    ) -> PairOutcome {
        let work_dir = job.work_dir(run_dir);
        let status = match self.configure_execute_collect(job, run_dir, product_dir, annotations) {
            Ok(collected) => PairStatus::Completed(collected),
            Err((stage, error)) => {
                log::error!("Pair {} failed during {}: {}", job.key(), stage, error);
                PairStatus::Failed { stage, error }
            }
        };
        PairOutcome {
            key: job.key(),
            subswath: job.subswath,
            work_dir,
            status,
        }
    }

    fn configure_execute_collect(
        &self,
        job: &PairJob,
        run_dir: &Path,
        product_dir: &Path,
        annotations: &[AnnotationRef],
    ) -> Result<CollectedPair, (RunStage, SarError)> {
        let work_dir = configure_pair(&self.template, job, run_dir)
            .map_err(|e| (RunStage::Configure, e))?;

        self.processor
            .run(job, &work_dir)
            .map_err(|e| (RunStage::Execute, e))?;

        collect_pair(job, &work_dir, product_dir, self.converter.as_ref(), annotations)
            .map_err(|e| (RunStage::Collect, e))
    }
}

/// Process every subswath of the stack that `roi` touches, one run each.
///
/// Zero overlapping subswaths is a geometry error.
pub fn process_all<F>(
    stack: &Stack,
    roi: &Roi,
    policy: SwathPolicy,
    mut make_processor: F,
) -> SarResult<Vec<Result<RunReport, RunFailure>>>
where
    F: FnMut(Subswath) -> SarResult<StackProcessor>,
{
    let subswaths = GeometrySelector::new(policy).select_all(&stack.first().footprints, roi);
    if subswaths.is_empty() {
        return Err(SarError::Geometry { roi: *roi });
    }
    log::info!(
        "Region {} overlaps subswath(s) {}",
        roi,
        subswaths.iter().map(|s| s.id().to_string()).collect::<Vec<_>>().join(", ")
    );

    let mut runs = Vec::with_capacity(subswaths.len());
    for subswath in subswaths {
        let processor = make_processor(subswath)?;
        let result = processor.run_stack(stack);
        let abort = result.is_err() && processor.params().failure_policy == FailurePolicy::Abort;
        runs.push(result);
        if abort {
            break;
        }
    }
    Ok(runs)
}

/// A single pair run
#[derive(Debug, Clone)]
pub struct PairRequest {
    pub subswath: Subswath,
    /// Granule names or product paths, in either order
    pub first: String,
    pub second: String,
    pub geocode_box: Option<Roi>,
    pub dry_run: bool,
    pub unwrap: bool,
    pub dem: Option<PathBuf>,
}

/// Configure and, unless this is a dry run, process one pair.
///
/// The two acquisitions are ordered earlier first; equal dates are rejected.
/// Returns the pair's working directory.
pub fn process_pair(
    loader: &StackLoader,
    request: &PairRequest,
    template: &ConfigTemplate,
    processor: &dyn InterferogramProcessor,
    run_dir: &Path,
) -> SarResult<PathBuf> {
    let subswath = request.subswath;
    let (reference, secondary) = loader.load_pair(&request.first, &request.second)?;

    let footprint = reference.footprints.get(&subswath).ok_or_else(|| {
        SarError::Input(format!(
            "Sub-swath {} is not present in {}",
            subswath.id(),
            reference.granule
        ))
    })?;
    let roi = request.geocode_box.unwrap_or_else(|| Roi::from_bounding_box(footprint));

    let dem = match &request.dem {
        Some(dem) => Some(fs::canonicalize(dem).map_err(|e| {
            SarError::Input(format!("External DEM {} not usable: {}", dem.display(), e))
        })?),
        None => None,
    };

    let job = PairJob {
        reference,
        secondary,
        subswath,
        roi,
        geocode_box: request.geocode_box,
        crop_to_roi: false,
        dem,
        unwrap: request.unwrap,
    };

    fs::create_dir_all(run_dir)?;
    let run_dir = fs::canonicalize(run_dir)?;
    let work_dir = configure_pair(template, &job, &run_dir)?;
    if request.dry_run {
        log::info!("Dry run: configuration written to {}", work_dir.display());
        return Ok(work_dir);
    }

    processor.run(&job, &work_dir)?;
    log::info!("Pair {} processed in {}", job.key(), work_dir.display());
    Ok(work_dir)
}
