use std::collections::HashSet;
use std::fs;

use mutant_runner::error::ConfigError;
use mutant_runner::mutants::{JobOutcome, JobPosition, JobReport, Mutation};
use mutant_runner::select;
use tempfile::TempDir;

fn manifest() -> Vec<Mutation> {
    (1..=4)
        .map(|i| Mutation::new(format!("mutants/{i}/src/A.sol"), "src/A.sol"))
        .collect()
}

fn report(index: usize, outcome: JobOutcome) -> JobReport {
    JobReport {
        position: JobPosition { index, total: 4 },
        mutation: Mutation::new(format!("mutants/{}/src/A.sol", index + 1), "src/A.sol"),
        outcome,
    }
}

#[test]
fn escaped_keeps_only_undetected_in_given_order() {
    let reports = vec![
        report(3, JobOutcome::Undetected),
        report(0, JobOutcome::Detected),
        report(1, JobOutcome::TestTimedOut),
        report(2, JobOutcome::Undetected),
    ];
    let names: Vec<_> = select::escaped(&reports).into_iter().map(|m| m.name).collect();
    assert_eq!(names, ["mutants/4/src/A.sol", "mutants/3/src/A.sol"]);
}

#[test]
fn escaped_of_nothing_is_empty() {
    assert!(select::escaped(&[]).is_empty());
}

#[test]
fn restrict_preserves_manifest_order() {
    let names: HashSet<String> = ["mutants/3/src/A.sol", "mutants/1/src/A.sol", "not-in-manifest"]
        .into_iter()
        .map(String::from)
        .collect();
    let kept: Vec<_> = select::restrict(manifest(), &names).into_iter().map(|m| m.name).collect();
    assert_eq!(kept, ["mutants/1/src/A.sol", "mutants/3/src/A.sol"]);
}

#[test]
fn restrict_to_prior_uses_names_from_result_file() {
    let dir = TempDir::new().unwrap();
    let prior = dir.path().join("results.json");
    fs::write(
        &prior,
        r#"[{"name": "mutants/2/src/A.sol", "original": "src/A.sol"}, {"name": "mutants/4/src/A.sol"}]"#,
    )
    .unwrap();

    let kept = select::restrict_to_prior(manifest(), &dir.path().join("gambit_results.json"), &prior).unwrap();
    let names: Vec<_> = kept.into_iter().map(|m| m.name).collect();
    assert_eq!(names, ["mutants/2/src/A.sol", "mutants/4/src/A.sol"]);
}

#[test]
fn prior_names_ignores_records_without_string_names() {
    let dir = TempDir::new().unwrap();
    let prior = dir.path().join("results.json");
    fs::write(&prior, r#"[{"name": 7}, {"other": "x"}, {"name": "keep"}]"#).unwrap();

    let names = select::prior_names(&prior).unwrap();
    assert_eq!(names.len(), 1);
    assert!(names.contains("keep"));
}

#[test]
fn prior_file_must_be_a_list() {
    let dir = TempDir::new().unwrap();
    let prior = dir.path().join("results.json");
    fs::write(&prior, r#"{"name": "mutants/1/src/A.sol"}"#).unwrap();
    assert!(matches!(select::prior_names(&prior), Err(ConfigError::NotAList(_))));
}

#[test]
fn prior_file_without_names_is_rejected() {
    let dir = TempDir::new().unwrap();
    let prior = dir.path().join("results.json");
    fs::write(&prior, "[]").unwrap();
    assert!(matches!(select::prior_names(&prior), Err(ConfigError::NoPriorNames(_))));
}

#[test]
fn missing_prior_file_is_a_read_error() {
    let dir = TempDir::new().unwrap();
    let result = select::prior_names(&dir.path().join("absent.json"));
    assert!(matches!(result, Err(ConfigError::Read { .. })));
}

#[test]
fn zero_matches_is_an_error() {
    let dir = TempDir::new().unwrap();
    let prior = dir.path().join("results.json");
    fs::write(&prior, r#"[{"name": "mutants/99/src/A.sol"}]"#).unwrap();

    let err = select::restrict_to_prior(manifest(), &dir.path().join("gambit_results.json"), &prior).unwrap_err();
    assert!(matches!(err, ConfigError::NoMatches { .. }));
}
