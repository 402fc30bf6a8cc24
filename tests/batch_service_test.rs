//! Tests for BatchService

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use phylim::application::services::{BatchService, BatchSummary, CheckOutcome, FitOutcome};
use phylim::application::ApplicationError;
use phylim::config::Settings;
use phylim::domain::PhyloLimitRec;
use phylim::infrastructure::di::ServiceContainer;
use phylim::infrastructure::traits::RealFileSystem;
use phylim::util::testing;

const FIXTURES: [&str; 7] = [
    "chainsaw_tip.json",
    "identity_tip.json",
    "isolated_node.json",
    "malformed.json",
    "missing_branch.json",
    "sympathetic_internal.json",
    "unnamed_internal.json",
];

/// Copies the named fixtures into a fresh directory.
fn stage(names: &[&str]) -> TempDir {
    let temp = TempDir::new().unwrap();
    for name in names {
        fs::copy(testing::fit_fixture(name), temp.path().join(name)).unwrap();
    }
    temp
}

fn batch(settings: Settings) -> BatchService {
    ServiceContainer::with_deps(settings, Arc::new(RealFileSystem)).batch()
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().to_string()
}

const DLC: [[f64; 4]; 4] = [
    [0.7, 0.1, 0.1, 0.1],
    [0.05, 0.8, 0.1, 0.05],
    [0.1, 0.1, 0.75, 0.05],
    [0.05, 0.05, 0.1, 0.8],
];

/// Fit on `((..((T0,T1)N1,T2)N2..),Tn)Nn` with two sympathetic branches.
fn caterpillar_fit(n: usize) -> String {
    let mut newick = "(T0,T1)N1".to_string();
    for i in 2..=n {
        newick = format!("({newick},T{i})N{i}");
    }
    let sympathetic = [DLC[1], DLC[0], DLC[2], DLC[3]];
    let children = (0..=n)
        .map(|i| format!("T{i}"))
        .chain((1..n).map(|i| format!("N{i}")));
    let psubs: Vec<serde_json::Value> = children
        .map(|edge| {
            let matrix = if edge == "T2" || edge == "N1" { sympathetic } else { DLC };
            serde_json::json!({ "edge": edge, "matrix": matrix })
        })
        .collect();
    serde_json::json!({
        "source": format!("caterpillar_{n}.fasta"),
        "tree": newick + ";",
        "psubs": psubs,
    })
    .to_string()
}

// ============================================================
// collect_fits()
// ============================================================

#[test]
fn given_directory_when_collecting_then_json_files_sorted() {
    testing::init_test_setup();
    let temp = stage(&FIXTURES);
    fs::write(temp.path().join("notes.txt"), "ignored").unwrap();

    let files = batch(Settings::default())
        .collect_fits(&[temp.path().to_path_buf()])
        .unwrap();

    let names: Vec<String> = files.iter().map(|p| file_name(p)).collect();
    assert_eq!(names, FIXTURES.to_vec());
}

#[test]
fn given_nested_directories_when_collecting_then_found_recursively() {
    testing::init_test_setup();
    let temp = stage(&["chainsaw_tip.json"]);
    let nested = temp.path().join("gene/ENSG01");
    fs::create_dir_all(&nested).unwrap();
    fs::copy(testing::fit_fixture("identity_tip.json"), nested.join("fit.json")).unwrap();

    let files = batch(Settings::default())
        .collect_fits(&[temp.path().to_path_buf()])
        .unwrap();

    assert_eq!(files.len(), 2);
    assert!(files.iter().any(|p| p.ends_with("gene/ENSG01/fit.json")));
}

#[test]
fn given_previous_records_when_collecting_then_records_skipped() {
    testing::init_test_setup();
    let temp = stage(&["chainsaw_tip.json"]);
    fs::write(temp.path().join("chainsaw_tip.record.json"), "{}").unwrap();

    let files = batch(Settings::default())
        .collect_fits(&[temp.path().to_path_buf()])
        .unwrap();

    assert_eq!(files.len(), 1);
}

#[test]
fn given_explicit_file_when_collecting_then_taken_as_is() {
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();
    let fit = temp.path().join("fit.txt");
    fs::copy(testing::fit_fixture("chainsaw_tip.json"), &fit).unwrap();

    let files = batch(Settings::default()).collect_fits(&[fit.clone()]).unwrap();

    assert_eq!(files, vec![fit]);
}

#[test]
fn given_empty_directory_when_collecting_then_no_fits() {
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();

    let err = batch(Settings::default())
        .collect_fits(&[temp.path().to_path_buf()])
        .unwrap_err();

    assert!(matches!(err, ApplicationError::NoFits(_)));
}

#[test]
fn given_missing_input_when_collecting_then_error() {
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();

    let err = batch(Settings::default())
        .collect_fits(&[temp.path().join("absent")])
        .unwrap_err();

    assert!(matches!(err, ApplicationError::OperationFailed { .. }));
}

// ============================================================
// run()
// ============================================================

#[test]
fn given_mixed_fits_when_run_then_failures_isolated_and_order_kept() {
    testing::init_test_setup();
    let temp = stage(&FIXTURES);
    let service = batch(Settings::default());
    let files = service.collect_fits(&[temp.path().to_path_buf()]).unwrap();

    let outcomes = service.run(&files).unwrap();

    assert_eq!(outcomes.len(), FIXTURES.len());
    for (outcome, path) in outcomes.iter().zip(&files) {
        assert_eq!(outcome.path(), path.as_path());
    }
    let failed: Vec<String> = outcomes
        .iter()
        .filter(|o| matches!(o, FitOutcome::Failed { .. }))
        .map(|o| file_name(o.path()))
        .collect();
    assert_eq!(failed, vec!["malformed.json", "missing_branch.json"]);

    let summary = BatchSummary::from_outcomes(&outcomes);
    assert_eq!(
        summary,
        BatchSummary {
            completed: 5,
            failed: 2,
            identifiable: 3,
            non_identifiable: 2,
            with_boundary_values: 1,
        }
    );
}

#[test]
fn given_strict_settings_when_run_then_identity_fit_rejected() {
    testing::init_test_setup();
    let temp = stage(&["identity_tip.json", "sympathetic_internal.json"]);
    let mut settings = Settings::default();
    settings.identifiability.strict = true;
    let service = batch(settings);
    let files = service.collect_fits(&[temp.path().to_path_buf()]).unwrap();

    let outcomes = service.run(&files).unwrap();

    let summary = BatchSummary::from_outcomes(&outcomes);
    assert_eq!(summary.non_identifiable, 1);
    assert_eq!(summary.identifiable, 1);
}

#[test]
fn given_bounded_pool_when_run_then_same_records_as_default_pool() {
    testing::init_test_setup();
    let temp = stage(&FIXTURES);
    let mut single = Settings::default();
    single.output.jobs = Some(1);
    let files = batch(Settings::default())
        .collect_fits(&[temp.path().to_path_buf()])
        .unwrap();

    let parallel = batch(Settings::default()).run(&files).unwrap();
    let serial = batch(single).run(&files).unwrap();

    assert_eq!(parallel, serial);
}

#[test]
fn given_deep_caterpillar_fits_when_run_then_each_gets_its_own_outcome() {
    testing::init_test_setup();
    let temp = stage(&["sympathetic_internal.json"]);
    fs::write(temp.path().join("deep.json"), caterpillar_fit(900)).unwrap();
    fs::write(
        temp.path().join("too_deep.json"),
        caterpillar_fit(phylim::domain::MAX_NESTING + 50),
    )
    .unwrap();
    let mut settings = Settings::default();
    settings.output.jobs = Some(2);
    let service = batch(settings);
    let files = service.collect_fits(&[temp.path().to_path_buf()]).unwrap();

    let outcomes = service.run(&files).unwrap();

    let names: Vec<String> = outcomes.iter().map(|o| file_name(o.path())).collect();
    assert_eq!(names, vec!["deep.json", "sympathetic_internal.json", "too_deep.json"]);
    match &outcomes[0] {
        FitOutcome::Completed { record, .. } => {
            assert_eq!(record.source, "caterpillar_900.fasta");
            assert_eq!(record.iscl_mcats.len(), 2);
        }
        other => panic!("deep fit did not complete: {other:?}"),
    }
    assert!(matches!(outcomes[1], FitOutcome::Completed { .. }));
    match &outcomes[2] {
        FitOutcome::Failed { error, .. } => assert!(error.contains("nesting depth"), "{error}"),
        other => panic!("over-deep fit was not rejected: {other:?}"),
    }
}

// ============================================================
// check()
// ============================================================

#[test]
fn given_malformed_fit_when_checking_then_reported_as_failed_outcome() {
    testing::init_test_setup();
    let temp = stage(&["chainsaw_tip.json", "malformed.json", "sympathetic_internal.json"]);
    let service = batch(Settings::default());
    let files = service.collect_fits(&[temp.path().to_path_buf()]).unwrap();

    let outcomes = service.check(&files).unwrap();

    assert_eq!(outcomes.len(), 3);
    assert!(matches!(&outcomes[1], CheckOutcome::Failed { path, .. } if path.ends_with("malformed.json")));
    let json = serde_json::to_value(&outcomes).unwrap();
    assert_eq!(json[0]["status"], "completed");
    assert_eq!(json[0]["result"]["identifiable"], false);
    assert_eq!(json[1]["status"], "failed");
    assert!(json[1]["path"].as_str().unwrap().ends_with("malformed.json"));
    assert!(json[1]["error"].as_str().unwrap().contains("malformed.json"));
    assert_eq!(json[2]["status"], "completed");
    assert_eq!(json[2]["result"]["identifiable"], true);
}

#[test]
fn given_fits_when_checking_then_verdicts_match_full_records() {
    testing::init_test_setup();
    let temp = stage(&FIXTURES);
    let service = batch(Settings::default());
    let files = service.collect_fits(&[temp.path().to_path_buf()]).unwrap();

    let checks = service.check(&files).unwrap();
    let records = service.run(&files).unwrap();

    for (check, record) in checks.iter().zip(&records) {
        assert_eq!(check.path(), record.path());
        match (check, record) {
            (CheckOutcome::Completed { result, .. }, FitOutcome::Completed { record, .. }) => {
                assert_eq!(result.identifiable, record.identifiable);
                assert_eq!(result.bad_nodes, record.bad_nodes);
            }
            (CheckOutcome::Failed { .. }, FitOutcome::Failed { .. }) => {}
            other => panic!("check and record disagree: {other:?}"),
        }
    }
}

// ============================================================
// write_records()
// ============================================================

#[test]
fn given_outcomes_when_writing_then_one_record_per_completed_fit() {
    testing::init_test_setup();
    let temp = stage(&FIXTURES);
    let out = TempDir::new().unwrap();
    let out_dir = out.path().join("records");
    let service = batch(Settings::default());
    let files = service.collect_fits(&[temp.path().to_path_buf()]).unwrap();
    let outcomes = service.run(&files).unwrap();

    let written = service.write_records(&outcomes, &out_dir).unwrap();

    assert_eq!(written.len(), 5);
    assert!(out_dir.join("isolated_node.record.json").exists());
    assert!(!out_dir.join("malformed.record.json").exists());

    let text = fs::read_to_string(out_dir.join("isolated_node.record.json")).unwrap();
    let rec: PhyloLimitRec = serde_json::from_str(&text).unwrap();
    assert_eq!(rec.source, "isolated_node.fasta");
    assert!(!rec.identifiable);
    assert_eq!(
        rec.bad_nodes.unwrap().into_iter().collect::<Vec<_>>(),
        vec!["X"]
    );
}

#[test]
fn given_records_in_input_dir_when_rerun_then_records_not_treated_as_fits() {
    testing::init_test_setup();
    let temp = stage(&["sympathetic_internal.json"]);
    let service = batch(Settings::default());
    let files = service.collect_fits(&[temp.path().to_path_buf()]).unwrap();
    let outcomes = service.run(&files).unwrap();
    service.write_records(&outcomes, temp.path()).unwrap();

    let again = service.collect_fits(&[temp.path().to_path_buf()]).unwrap();

    assert_eq!(again, files);
}

#[test]
fn given_same_named_fits_in_subdirectories_when_writing_then_layout_mirrored() {
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();
    for (sub, fixture) in [("gene1", "identity_tip.json"), ("gene2", "chainsaw_tip.json")] {
        fs::create_dir_all(temp.path().join(sub)).unwrap();
        fs::copy(testing::fit_fixture(fixture), temp.path().join(sub).join("fit.json")).unwrap();
    }
    let out = TempDir::new().unwrap();
    let service = batch(Settings::default());
    let files = service.collect_fits(&[temp.path().to_path_buf()]).unwrap();
    let outcomes = service.run(&files).unwrap();

    let written = service.write_records(&outcomes, out.path()).unwrap();

    assert_eq!(
        written,
        vec![
            out.path().join("gene1/fit.record.json"),
            out.path().join("gene2/fit.record.json"),
        ]
    );
    let text = fs::read_to_string(&written[1]).unwrap();
    let rec: PhyloLimitRec = serde_json::from_str(&text).unwrap();
    assert_eq!(rec.source, "chainsaw_tip.fasta");
}

#[test]
fn given_outcomes_when_serialized_then_tagged_by_status() {
    testing::init_test_setup();
    let temp = stage(&["malformed.json", "unnamed_internal.json"]);
    let service = batch(Settings::default());
    let files = service.collect_fits(&[temp.path().to_path_buf()]).unwrap();
    let outcomes = service.run(&files).unwrap();

    let json = serde_json::to_value(&outcomes).unwrap();

    assert_eq!(json[0]["status"], "failed");
    assert!(json[0]["error"].as_str().unwrap().contains("malformed.json"));
    assert_eq!(json[1]["status"], "completed");
    assert_eq!(json[1]["record"]["identifiable"], true);
}
