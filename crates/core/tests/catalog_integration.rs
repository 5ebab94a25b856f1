//! Scenario catalog integration tests
//!
//! - the shipped `scenarios/` directory
//! - directory loading order and duplicate detection across files

use std::fs;
use std::path::PathBuf;

use gantry_core::catalog::Catalog;
use gantry_core::env::EnvSnapshot;
use gantry_core::error::{CatalogError, GantryError};
use gantry_core::scenario::{ConnectorKind, ServiceKind, VerifySpec};
use tempfile::TempDir;

fn shipped_catalog_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../scenarios")
}

#[tokio::test]
async fn shipped_catalog_loads_and_validates() {
    // When: Loading the repository's scenario directory
    let catalog = Catalog::load(shipped_catalog_dir())
        .await
        .expect("shipped catalog should be valid");

    // Then: Every scenario declares the secrets it references
    assert!(!catalog.is_empty());
    for scenario in catalog.iter() {
        let undeclared: Vec<_> = scenario
            .secret_references()
            .into_iter()
            .filter(|v| !scenario.required_env.contains(v))
            .collect();
        assert!(undeclared.is_empty(), "{}: {undeclared:?}", scenario.name);
    }
}

#[tokio::test]
async fn shipped_catalog_covers_service_kinds() {
    let catalog = Catalog::load(shipped_catalog_dir())
        .await
        .expect("shipped catalog should be valid");

    let opensearch = catalog
        .get("opensearch-dest")
        .expect("opensearch scenario should exist");
    let service = opensearch.service.as_ref().expect("should need a service");
    assert_eq!(service.kind, ServiceKind::Command);

    let mongodb = catalog
        .get("mongodb-dest")
        .expect("mongodb scenario should exist");
    let service = mongodb.service.as_ref().expect("should need a service");
    assert_eq!(service.kind, ServiceKind::Container);
    assert_eq!(service.image.as_deref(), Some("mongo:7"));

    let delta = catalog
        .get("delta-table-dest")
        .expect("delta scenario should exist");
    assert!(matches!(delta.verify, VerifySpec::Command { .. }));
}

#[tokio::test]
async fn local_scenarios_need_no_credentials() {
    let catalog = Catalog::load(shipped_catalog_dir())
        .await
        .expect("shipped catalog should be valid");
    let env = EnvSnapshot::default();

    for scenario in catalog.by_connector(&ConnectorKind::Local) {
        assert!(
            scenario.missing_env(&env).is_empty(),
            "{} should run without credentials",
            scenario.name
        );
    }
}

#[tokio::test]
async fn directory_ignores_non_toml_files() {
    // Given: Two catalog files and a stray README
    let dir = TempDir::new().expect("should create temp dir");
    fs::write(
        dir.path().join("b.toml"),
        "[[scenario]]\nname = \"b\"\nconnector = \"s3\"\n",
    )
    .expect("should write b.toml");
    fs::write(
        dir.path().join("a.toml"),
        "[[scenario]]\nname = \"a\"\nconnector = \"local\"\n",
    )
    .expect("should write a.toml");
    fs::write(dir.path().join("README.md"), "not a catalog").expect("should write readme");

    // When: Loading the directory
    let catalog = Catalog::load(dir.path()).await.expect("should load");

    // Then: Both scenarios, in name order
    let names: Vec<_> = catalog.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[tokio::test]
async fn duplicate_name_across_files_is_rejected() {
    let dir = TempDir::new().expect("should create temp dir");
    for file in ["one.toml", "two.toml"] {
        fs::write(
            dir.path().join(file),
            "[[scenario]]\nname = \"same\"\nconnector = \"local\"\n",
        )
        .expect("should write catalog file");
    }

    let err = Catalog::load(dir.path())
        .await
        .expect_err("duplicates should be rejected");

    assert!(matches!(
        err,
        GantryError::Catalog(CatalogError::DuplicateName { ref name }) if name == "same"
    ));
}

#[tokio::test]
async fn missing_catalog_path_is_reported() {
    let dir = TempDir::new().expect("should create temp dir");

    let err = Catalog::load(dir.path().join("absent"))
        .await
        .expect_err("missing path should fail");

    assert!(matches!(err, GantryError::Catalog(CatalogError::NotFound { .. })));
}
