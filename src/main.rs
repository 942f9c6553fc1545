//! insar-stack CLI
//!
//! `process-all`, `process-stack` and `process-pair` entry points over the
//! insar_stack library.

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use insar_stack::core::{
    process_all, process_pair, ConfigTemplate, FailurePolicy, PairRequest, PairStatus,
    StackParams, StackProcessor, SwathPolicy, SwathRequest, TopsAppProcessor,
};
use insar_stack::io::dem::{CommandDem, DemProvider, ExistingDem};
use insar_stack::io::{OrbitCatalog, StackLoader};
use insar_stack::{RunConfig, RunReport, Roi, Subswath, VERSION};
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(name = "insar-stack", version = VERSION)]
#[command(
    about = "Sentinel-1 interferometric stack processing with ISCE topsApp",
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Configuration file (default: <config dir>/insar-stack/config.xml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the SAFE directories / zip archives
    #[arg(long, global = true, default_value = ".")]
    data_dir: PathBuf,

    /// Directory receiving pair working directories and PRODUCT/
    #[arg(long, global = true, default_value = ".")]
    work_dir: PathBuf,

    /// Directory of orbit (.EOF) files
    #[arg(long, global = true)]
    orbit_dir: Option<PathBuf>,

    /// Pairs processed concurrently
    #[arg(long, short = 'j', global = true)]
    jobs: Option<usize>,

    /// Record failed pairs and keep processing the rest
    #[arg(long, global = true)]
    keep_going: bool,

    /// Subswath choice when a region overlaps several: lowest-id or largest-overlap
    #[arg(long, global = true)]
    swath_policy: Option<SwathPolicy>,

    /// Debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct StackInputArgs {
    /// CSV list of granules to process (first column)
    #[arg(long, short = 'f')]
    manifest: Option<PathBuf>,

    /// Fetch the DEM with the configured fleet DEM command
    #[arg(long, short = 'd', conflicts_with = "dem")]
    use_fleet_dem: bool,

    /// Use this DEM file for every pair
    #[arg(long)]
    dem: Option<PathBuf>,

    /// Also crop each acquisition to the region, not just the geocoded output
    #[arg(long)]
    crop: bool,

    /// Skip phase unwrapping
    #[arg(long)]
    no_unwrap: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process every subswath overlapping a bounding box
    ProcessAll {
        /// Minimum latitude
        #[arg(allow_negative_numbers = true)]
        south: f64,
        /// Maximum latitude
        #[arg(allow_negative_numbers = true)]
        north: f64,
        /// Minimum longitude
        #[arg(allow_negative_numbers = true)]
        west: f64,
        /// Maximum longitude
        #[arg(allow_negative_numbers = true)]
        east: f64,

        #[command(flatten)]
        inputs: StackInputArgs,
    },

    /// Process a stack over one subswath, given directly or through a region
    #[command(group(ArgGroup::new("area").required(true).args(["roi", "subswath"])))]
    ProcessStack {
        /// Region of interest
        #[arg(
            long,
            short = 'r',
            num_args = 4,
            allow_negative_numbers = true,
            value_names = ["SOUTH", "NORTH", "WEST", "EAST"]
        )]
        roi: Option<Vec<f64>>,

        /// Subswath to process (1, 2 or 3)
        #[arg(long, short = 's')]
        subswath: Option<Subswath>,

        #[command(flatten)]
        inputs: StackInputArgs,
    },

    /// Create one interferogram
    ProcessPair {
        /// Subswath to process (1, 2 or 3)
        subswath: Subswath,
        /// Reference granule name or product path
        reference: String,
        /// Secondary granule name or product path
        secondary: String,

        /// Geocoding bounding box
        #[arg(
            long,
            short = 'g',
            num_args = 4,
            allow_negative_numbers = true,
            value_names = ["SOUTH", "NORTH", "WEST", "EAST"]
        )]
        geocode_box: Option<Vec<f64>>,

        /// Only write topsApp.xml, do not run the processor
        #[arg(long)]
        dry_run: bool,

        /// Run phase unwrapping
        #[arg(long, short = 'u')]
        unwrap: bool,

        /// External DEM file
        #[arg(long, short = 'e')]
        external_dem: Option<PathBuf>,
    },
}

/// Clap's own exit status for usage errors is 2; every failure of this tool is 1
fn parse_cli<I, T>(args: I) -> std::result::Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args)
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();
}

fn main() {
    let cli = match parse_cli(std::env::args_os()) {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            process::exit(code);
        }
    };

    init_logging(cli.global.verbose);

    if let Err(e) = run(cli) {
        log::error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli.global)?;
    let template = match &config.template {
        Some(path) => ConfigTemplate::load(path)?,
        None => ConfigTemplate::builtin()?,
    };

    let mut loader = StackLoader::new(&cli.global.data_dir);
    if let Some(orbit_dir) = &config.orbit_dir {
        let catalog = OrbitCatalog::scan(orbit_dir)
            .with_context(|| format!("scanning orbit directory {}", orbit_dir.display()))?;
        loader = loader.with_orbits(catalog);
    }

    match cli.command {
        Command::ProcessAll { south, north, west, east, inputs } => {
            let roi = Roi::new(south, north, west, east)?;
            let stack = loader.load(inputs.manifest.as_deref())?;
            let runs = process_all(&stack, &roi, config.swath_policy, |subswath| {
                let request = SwathRequest::Subswath(subswath);
                build_stack_processor(
                    &config,
                    &template,
                    &cli.global,
                    &inputs,
                    request,
                    inputs.crop,
                )
            })?;

            let mut failures = 0;
            for run in runs {
                match run {
                    Ok(report) => failures += summarize(&report),
                    Err(failure) => {
                        summarize(&failure.report);
                        return Err(failure.into());
                    }
                }
            }
            finish(failures)
        }

        Command::ProcessStack { roi, subswath, inputs } => {
            let request = match (roi, subswath) {
                (Some(values), None) => SwathRequest::Roi(Roi::from_slice(&values)?),
                (None, Some(subswath)) => SwathRequest::Subswath(subswath),
                _ => bail!("Exactly one of --roi and --subswath is required"),
            };

            let crop = inputs.crop && matches!(request, SwathRequest::Roi(_));
            let processor =
                build_stack_processor(&config, &template, &cli.global, &inputs, request, crop)?;
            match processor.run(&loader, inputs.manifest.as_deref()) {
                Ok(report) => finish(summarize(&report)),
                Err(failure) => {
                    summarize(&failure.report);
                    Err(failure.into())
                }
            }
        }

        Command::ProcessPair {
            subswath,
            reference,
            secondary,
            geocode_box,
            dry_run,
            unwrap,
            external_dem,
        } => {
            let geocode_box = geocode_box.as_deref().map(Roi::from_slice).transpose()?;
            let request = PairRequest {
                subswath,
                first: reference,
                second: secondary,
                geocode_box,
                dry_run,
                unwrap,
                dem: external_dem,
            };
            let processor = TopsAppProcessor::new(config.processor.clone());
            let work_dir =
                process_pair(&loader, &request, &template, &processor, &cli.global.work_dir)?;
            println!("{}", work_dir.display());
            Ok(())
        }
    }
}

/// Defaults, file and environment from the library, then command-line flags
fn resolve_config(global: &GlobalArgs) -> Result<RunConfig> {
    let mut config = RunConfig::resolve(global.config.as_deref())?;
    if let Some(orbit_dir) = &global.orbit_dir {
        config.orbit_dir = Some(orbit_dir.clone());
    }
    if let Some(jobs) = global.jobs {
        config.jobs = jobs;
    }
    if global.keep_going {
        config.failure_policy = FailurePolicy::Continue;
    }
    if let Some(policy) = global.swath_policy {
        config.swath_policy = policy;
    }
    config.validate()?;
    Ok(config)
}

fn build_stack_processor(
    config: &RunConfig,
    template: &ConfigTemplate,
    global: &GlobalArgs,
    inputs: &StackInputArgs,
    request: SwathRequest,
    crop_to_roi: bool,
) -> insar_stack::SarResult<StackProcessor> {
    let params = StackParams {
        run_dir: global.work_dir.clone(),
        request,
        unwrap: !inputs.no_unwrap,
        crop_to_roi,
        failure_policy: config.failure_policy,
        jobs: config.jobs,
        swath_policy: config.swath_policy,
    };

    let dem: Option<Box<dyn DemProvider>> = match (&inputs.dem, inputs.use_fleet_dem) {
        (Some(path), _) => Some(Box::new(ExistingDem::new(path))),
        (None, true) => {
            let command = config.fleet_dem.clone().ok_or_else(|| {
                insar_stack::SarError::Input(
                    "--use-fleet-dem given but no fleet DEM command configured".to_string(),
                )
            })?;
            Some(Box::new(CommandDem::new(command, config.processor.timeout())))
        }
        (None, false) => None,
    };

    Ok(StackProcessor::new(
        params,
        template.clone(),
        Box::new(TopsAppProcessor::new(config.processor.clone())),
    )
    .with_converter(config.processor.converter())
    .with_dem(dem))
}

/// Log a run's outcome, returning its number of failed pairs
fn summarize(report: &RunReport) -> usize {
    for pair in &report.pairs {
        if let PairStatus::Failed { stage, error } = &pair.status {
            log::warn!("{} ({}) failed during {}: {}", pair.key, pair.subswath, stage, error);
        }
    }
    log::info!(
        "{} pair(s) completed, {} failed; products in {}",
        report.completed(),
        report.failed(),
        report.product_dir.display()
    );
    report.failed()
}

fn finish(failures: usize) -> Result<()> {
    if failures > 0 {
        bail!("{} pair(s) failed", failures);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_process_all_accepts_negative_coordinates() {
        let cli =
            parse_cli(["insar-stack", "process-all", "37.0", "38.0", "-122.0", "-121.0"]).unwrap();
        match cli.command {
            Command::ProcessAll { south, west, east, .. } => {
                assert_eq!(south, 37.0);
                assert_eq!(west, -122.0);
                assert_eq!(east, -121.0);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_process_stack_roi_and_subswath_conflict() {
        let err = parse_cli([
            "insar-stack", "process-stack", "--roi", "37", "38", "-122", "-121", "--subswath", "2",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
        assert!(err.use_stderr());

        let err = parse_cli(["insar-stack", "process-stack"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_process_stack_subswath_forms() {
        let cli =
            parse_cli(["insar-stack", "process-stack", "--subswath", "iw3", "-j", "2"]).unwrap();
        assert_eq!(cli.global.jobs, Some(2));
        match cli.command {
            Command::ProcessStack { subswath, roi, .. } => {
                assert_eq!(subswath, Subswath::new(3).ok());
                assert!(roi.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }

        assert!(parse_cli(["insar-stack", "process-stack", "--subswath", "4"]).is_err());
    }

    #[test]
    fn test_process_pair_flags() {
        let cli = parse_cli([
            "insar-stack",
            "process-pair",
            "2",
            "REF",
            "SEC",
            "--geocode-box",
            "37.1",
            "37.9",
            "-121.9",
            "-121.1",
            "--dry-run",
            "--unwrap",
        ])
        .unwrap();
        match cli.command {
            Command::ProcessPair { subswath, geocode_box, dry_run, unwrap, external_dem, .. } => {
                assert_eq!(subswath.id(), 2);
                assert_eq!(geocode_box, Some(vec![37.1, 37.9, -121.9, -121.1]));
                assert!(dry_run);
                assert!(unwrap);
                assert!(external_dem.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_version_is_not_an_error_exit() {
        let err = parse_cli(["insar-stack", "--version"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayVersion);
        assert!(!err.use_stderr());
    }
}
