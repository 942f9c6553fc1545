#![cfg(unix)]

mod common;

use approx::assert_relative_eq;
use common::*;
use insar_stack::core::{
    ConfigTemplate, FailurePolicy, PairStatus, ProcessorConfig, RunStage, StackParams,
    StackProcessor, SwathRequest, TopsAppProcessor,
};
use insar_stack::io::{ExistingDem, ExternalCommand, StackLoader};
use insar_stack::{Roi, SarError, Subswath};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const DATES: [&str; 4] = ["20200101", "20200113", "20200125", "20200206"];

struct Fixture {
    _temp: TempDir,
    data_dir: PathBuf,
    run_dir: PathBuf,
    processor: PathBuf,
}

fn fixture() -> Fixture {
    init_logging();
    let temp = TempDir::new().unwrap();
    let data_dir = temp.path().join("data");
    let run_dir = temp.path().join("run");
    for date in DATES {
        write_safe_dir(&data_dir, date);
    }
    let processor = write_fake_processor(temp.path());
    Fixture {
        data_dir,
        run_dir,
        processor,
        _temp: temp,
    }
}

fn stack_processor(fixture: &Fixture, params: StackParams) -> StackProcessor {
    let config = ProcessorConfig {
        command: ExternalCommand::new(fixture.processor.to_string_lossy()),
        ..ProcessorConfig::default()
    };
    StackProcessor::new(
        params,
        ConfigTemplate::builtin().unwrap(),
        Box::new(TopsAppProcessor::new(config)),
    )
}

fn params(run_dir: &Path, request: SwathRequest) -> StackParams {
    StackParams {
        run_dir: run_dir.to_path_buf(),
        request,
        ..StackParams::default()
    }
}

#[test]
fn test_end_to_end_stack_run() {
    let fixture = fixture();
    let roi = Roi::new(37.2, 37.8, -120.9, -120.3).unwrap();
    let report = stack_processor(&fixture, params(&fixture.run_dir, SwathRequest::Roi(roi)))
        .run(&StackLoader::new(&fixture.data_dir), None)
        .unwrap();

    assert_eq!(report.pairs.len(), 5);
    assert!(report.is_success());
    assert_eq!(report.subswath, Some(Subswath::new(2).unwrap()));
    assert_eq!(report.roi, Some(roi));

    let key = pair_key("20200101", "20200113");
    let stem = format!("{}_iw2", key);
    let product = &report.product_dir;

    let record = fs::read_to_string(product.join(format!("{}.txt", stem))).unwrap();
    assert_eq!(
        record,
        "baseline: 12.34\nutctime: 43205.5\nheading: -13.05281\nrange looks: 19\nazimuth looks: 7\n"
    );
    for suffix in ["unw_phase.tif", "amp.tif", "corr.tif", "unw_phase.png"] {
        assert!(product.join(format!("{}_{}", stem, suffix)).is_file(), "{}", suffix);
    }
    assert!(!product.join(format!("{}_color_phase.png", stem)).exists());
    assert!(product.join(&stem).join("phase.tif").is_file());

    let work_dir = report.run_dir.join(&key).join("iw2");
    assert!(work_dir.join("topsApp.out").is_file());
    assert!(!work_dir.join("merged").exists());

    let config = fs::read_to_string(work_dir.join("topsApp.xml")).unwrap();
    assert!(config.contains("<property name=\"swath number\">2</property>"));
    assert!(config.contains("<property name=\"do unwrap\">True</property>"));
    assert!(config.contains(
        "<property name=\"geocode bounding box\">[37.2, 37.8, -120.9, -120.3]</property>"
    ));
    let safe = fixture.data_dir.join(format!("{}.SAFE", granule_name("20200101")));
    let safe = fs::canonicalize(safe).unwrap();
    assert!(config.contains(&format!("<property name=\"safe\">{}</property>", safe.display())));
}

#[test]
fn test_explicit_subswath_with_user_dem() {
    let fixture = fixture();
    let dem = fixture.run_dir.with_file_name("user.dem");
    fs::write(&dem, "dem").unwrap();

    let request = SwathRequest::Subswath(Subswath::new(3).unwrap());
    let report = stack_processor(&fixture, params(&fixture.run_dir, request))
        .with_dem(Some(Box::new(ExistingDem::new(&dem))))
        .run(&StackLoader::new(&fixture.data_dir), None)
        .unwrap();

    assert_eq!(report.roi, Some(Roi::new(37.0, 38.0, -120.1, -119.0).unwrap()));
    let dem = fs::canonicalize(dem).unwrap();
    assert_eq!(report.dem.as_deref(), Some(dem.as_path()));

    let key = pair_key("20200125", "20200206");
    let config_path = report.run_dir.join(key).join("iw3").join("topsApp.xml");
    let config = fs::read_to_string(config_path).unwrap();
    let dem_property = format!("<property name=\"demfilename\">{}</property>", dem.display());
    assert!(config.contains(&dem_property));
}

#[test]
fn test_roi_outside_imagery_is_geometry_failure() {
    let fixture = fixture();
    let roi = Roi::new(-10.0, -9.0, 30.0, 31.0).unwrap();
    let failure = stack_processor(&fixture, params(&fixture.run_dir, SwathRequest::Roi(roi)))
        .run(&StackLoader::new(&fixture.data_dir), None)
        .unwrap_err();

    assert_eq!(failure.stage, RunStage::DetermineGeometry);
    assert!(matches!(failure.error, SarError::Geometry { .. }));
    assert!(failure
        .error
        .to_string()
        .contains("No overlap of bounding box with imagery"));
    assert!(failure.report.pairs.is_empty());
}

#[test]
fn test_missing_output_aborts_run() {
    let fixture = fixture();
    let key = pair_key("20200101", "20200125");
    fs::create_dir_all(fixture.run_dir.join(&key)).unwrap();
    fs::write(fixture.run_dir.join(&key).join("SKIP"), "").unwrap();

    let request = SwathRequest::Subswath(Subswath::new(1).unwrap());
    let failure = stack_processor(&fixture, params(&fixture.run_dir, request))
        .run(&StackLoader::new(&fixture.data_dir), None)
        .unwrap_err();

    assert_eq!(failure.stage, RunStage::Collect);
    match &failure.error {
        SarError::OutputContract { pair, path } => {
            assert_eq!(pair, &key);
            assert!(path.ends_with("iw1/merged"));
        }
        other => panic!("unexpected error {:?}", other),
    }
    // the first pair was already collected and is left in place
    assert_eq!(failure.report.completed(), 1);
    assert!(failure
        .report
        .product_dir
        .join(format!("{}_iw1.txt", pair_key("20200101", "20200113")))
        .is_file());
}

#[test]
fn test_keep_going_records_processor_failure() {
    let fixture = fixture();
    let key = pair_key("20200113", "20200206");
    fs::create_dir_all(fixture.run_dir.join(&key)).unwrap();
    fs::write(fixture.run_dir.join(&key).join("FAIL"), "").unwrap();

    let mut params = params(&fixture.run_dir, SwathRequest::Subswath(Subswath::new(1).unwrap()));
    params.failure_policy = FailurePolicy::Continue;
    params.jobs = 2;

    let report = stack_processor(&fixture, params)
        .run(&StackLoader::new(&fixture.data_dir), None)
        .unwrap();

    assert_eq!(report.pairs.len(), 5);
    assert_eq!(report.completed(), 4);
    let failed = &report.pairs[3];
    assert_eq!(failed.key, key);
    match &failed.status {
        PairStatus::Failed { stage, error } => {
            assert_eq!(*stage, RunStage::Execute);
            assert!(matches!(error, SarError::ExternalTool { target, .. } if *target == key));
        }
        other => panic!("unexpected status {:?}", other),
    }
    let stderr = fs::read_to_string(failed.work_dir.join("topsApp.err")).unwrap();
    assert_eq!(stderr.trim(), "boom");

    match &report.pairs[4].status {
        PairStatus::Completed(collected) => {
            assert_relative_eq!(collected.metadata.heading_degrees.unwrap(), HEADING);
        }
        other => panic!("unexpected status {:?}", other),
    }
}
