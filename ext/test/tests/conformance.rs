//! Conformance tests that run YAML fixtures against tgt
//!
//! Run with: cargo test -p tgt-test --test conformance

#![cfg(feature = "fixtures")]

use std::fs;
use std::path::{Path, PathBuf};
use tgt_test::fixture::Fixture;

/// The `fixtures/` directory at the workspace root
fn fixtures_dir() -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    Path::new(manifest_dir)
        .parent() // ext
        .and_then(Path::parent) // workspace root
        .expect("Could not find workspace root")
        .join("fixtures")
}

/// Load and run every fixture in one file
fn run_fixture_file(name: &str) {
    let path = fixtures_dir().join(name);
    let yaml = fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));

    // Parse potentially multiple fixtures (separated by ---)
    let fixtures = Fixture::from_yaml_multi(&yaml).unwrap_or_else(|e| {
        panic!("Failed to parse {}: {}", path.display(), e);
    });
    assert!(!fixtures.is_empty(), "{} has no fixtures", path.display());

    for fixture in fixtures {
        println!("  Running: {}", fixture.name);
        fixture.run_and_assert();
    }
}

#[test]
fn test_atomic_matchers() {
    run_fixture_file("atomic.yaml");
}

#[test]
fn test_compound() {
    run_fixture_file("compound.yaml");
}

#[test]
fn test_delimiters() {
    run_fixture_file("delimiters.yaml");
}

#[test]
fn test_nodegroups() {
    run_fixture_file("nodegroups.yaml");
}

#[test]
fn test_greedy() {
    run_fixture_file("greedy.yaml");
}

#[test]
fn test_errors() {
    run_fixture_file("errors.yaml");
}

#[test]
fn every_fixture_file_is_covered() {
    let covered = [
        "atomic.yaml",
        "compound.yaml",
        "delimiters.yaml",
        "nodegroups.yaml",
        "greedy.yaml",
        "errors.yaml",
    ];
    for entry in fs::read_dir(fixtures_dir()).expect("read dir") {
        let path = entry.expect("dir entry").path();
        if path.extension().is_some_and(|e| e == "yaml" || e == "yml") {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            assert!(covered.contains(&name), "fixture {name} is not run by any test");
        }
    }
}
