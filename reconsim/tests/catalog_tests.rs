// tests/catalog_tests.rs
//
// Catalog persistence and validation:
// - JSON and YAML split files round-trip through disk
// - every load-time validation rule rejects the whole catalog
// - the built-in catalog is stable and self-consistent

use std::fs;

use reconsim::catalog::{CatalogError, ScenarioCatalog, Split};
use reconsim::scenario::{Classification, ScenarioRecord};
use reconsim::types::Stage;
use tempfile::tempdir;


use scenario_testkit::{catalog_file, infra_example, web_only_example};

fn expect_malformed(record: ScenarioRecord, needle: &str) {
    let file = catalog_file(Split::Train, vec![web_only_example(), record]);
    match ScenarioCatalog::from_file(file) {
        Err(CatalogError::MalformedScenario { message, .. }) => {
            assert!(message.contains(needle), "unexpected message: {message}")
        }
        other => panic!("expected MalformedScenario containing '{needle}', got {other:?}"),
    }
}

/// Test: built-in catalog written as JSON and YAML loads back identically.
#[test]
fn test_builtin_round_trip_json_and_yaml() {
    let dir = tempdir().unwrap();
    let catalog = reconsim::builtin_catalog().unwrap();

    for ext in ["json", "yaml"] {
        let paths: Vec<_> = Split::ALL
            .iter()
            .map(|s| dir.path().join(format!("{s}.{ext}")))
            .collect();
        for (split, path) in Split::ALL.iter().zip(&paths) {
            catalog.write_split(*split, path).unwrap();
        }
        let loaded = ScenarioCatalog::load_all(paths.as_slice()).unwrap();
        assert_eq!(loaded.len(), catalog.len());
        assert_eq!(loaded.fingerprint(), catalog.fingerprint(), "{ext}");
        for split in Split::ALL {
            assert_eq!(loaded.ids(split), catalog.ids(split));
        }
    }
}

/// Test: hand-written YAML using tool mode names loads and classifies.
#[test]
fn test_yaml_with_tool_mode_names() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("kit.yml");
    let yaml = serde_yaml::to_string(&catalog_file(
        Split::Test,
        vec![infra_example(), web_only_example()],
    ))
    .unwrap();
    assert!(yaml.contains("comprehensive"));
    fs::write(&path, yaml).unwrap();

    let catalog = ScenarioCatalog::load(&path).unwrap();
    assert_eq!(catalog.split_len(Split::Test), 2);
    assert_eq!(
        catalog.get(scenario_testkit::INFRA_ID).unwrap().classification(),
        Classification::Infrastructure
    );
    assert_eq!(
        catalog.get(scenario_testkit::WEB_ID).unwrap().classification(),
        Classification::WebOnly
    );
    assert_eq!(catalog.split_of(scenario_testkit::WEB_ID), Some(Split::Test));
}

/// Test: I/O and parse failures are reported with their own variants.
#[test]
fn test_load_errors() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        ScenarioCatalog::load(dir.path().join("missing.json")),
        Err(CatalogError::Io { .. })
    ));

    let bad = dir.path().join("bad.json");
    fs::write(&bad, "{ not json").unwrap();
    assert!(matches!(
        ScenarioCatalog::load(&bad),
        Err(CatalogError::Parse { format: "JSON", .. })
    ));
}

/// Test: the same id in two files is rejected.
#[test]
fn test_duplicate_ids_across_files() {
    let a = ScenarioCatalog::from_file(catalog_file(Split::Train, vec![infra_example()])).unwrap();
    let b = ScenarioCatalog::from_file(catalog_file(Split::Test, vec![infra_example()])).unwrap();
    assert!(matches!(
        a.merge(b),
        Err(CatalogError::MalformedScenario { .. })
    ));
}

/// Test: declared open-port total must equal the distinct port list.
#[test]
fn test_rejects_port_total_mismatch() {
    let mut record = infra_example();
    record.expected.open_ports = 3;
    expect_malformed(record, "expected.open_ports=3");
}

/// Test: an empty port list is rejected.
#[test]
fn test_rejects_empty_port_list() {
    let mut record = infra_example();
    record.ports.clear();
    expect_malformed(record, "port list cannot be empty");
}

/// Test: a missing (stage, mode) outcome is rejected.
#[test]
fn test_rejects_missing_outcome() {
    let mut record = infra_example();
    record.outcomes.retain(|o| o.stage != Stage::PortAnalysis || o.mode != "quick");
    expect_malformed(record, "missing outcome for port_analysis/quick");
}

/// Test: a slower mode that is faster than a lighter one is rejected.
#[test]
fn test_rejects_elapsed_time_regression() {
    let mut record = infra_example();
    // probing/comprehensive faster than probing/thorough
    record.outcomes[5].elapsed_secs = 1.0;
    expect_malformed(record, "elapsed time decreases");
}

/// Test: a heavier mode discovering less than a lighter one is rejected.
#[test]
fn test_rejects_discovery_regression() {
    let mut record = infra_example();
    record.outcomes[2].subdomains.truncate(3);
    expect_malformed(record, "fewer subdomains");
}

/// Test: outcome counts above the declared totals are rejected.
#[test]
fn test_rejects_counts_above_expected() {
    let mut record = infra_example();
    record.expected.subdomains = 10;
    expect_malformed(record, "expected total is 10");
}

/// Test: outcomes may only reference ports from the scenario port list.
#[test]
fn test_rejects_foreign_port() {
    let mut record = web_only_example();
    record.id = "kit_web_foreign".to_string();
    record.outcomes[3].endpoints[0].port = 8080;
    expect_malformed(record, "port 8080 is not in the scenario port list");
}

/// Test: items in the wrong stage payload are rejected.
#[test]
fn test_rejects_cross_stage_payload() {
    let mut record = infra_example();
    let subs = record.outcomes[0].subdomains.clone();
    record.outcomes[3].subdomains = subs;
    expect_malformed(record, "belonging to another stage");
}

/// Test: more critical services than infrastructure ports is rejected.
#[test]
fn test_rejects_impossible_critical_total() {
    let mut record = web_only_example();
    record.id = "kit_web_critical".to_string();
    record.expected.critical_services = 1;
    expect_malformed(record, "exceeds 0 infrastructure ports");
}

/// Test: unknown mode names are rejected.
#[test]
fn test_rejects_unknown_mode() {
    let mut record = infra_example();
    record.outcomes[0].mode = "stealth".to_string();
    expect_malformed(record, "unknown mode 'stealth'");
}

/// Test: built-in catalog is byte-stable and covers every classification.
#[test]
fn test_builtin_catalog_shape() {
    let a = reconsim::builtin_catalog().unwrap();
    let b = reconsim::builtin_catalog().unwrap();
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert!(a.split_len(Split::Train) > 0);
    assert!(a.split_len(Split::Test) > 0);

    let classes: std::collections::BTreeSet<Classification> = Split::ALL
        .iter()
        .flat_map(|s| a.scenarios(*s).iter().map(|sc| sc.classification()))
        .collect();
    assert_eq!(classes.len(), Classification::ALL.len());
}
