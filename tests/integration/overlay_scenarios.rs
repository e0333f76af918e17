use std::collections::BTreeMap;

use repodata_overlay::patch::PatchOperation;
use repodata_overlay::{ApplyOutcome, PatchError};
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::support::{hash_of, imported, open_cache_with_limit, patch_set, revision, stream, CONDA_BASELINE};

fn conda_records(cache: &repodata_overlay::CacheHandle) -> BTreeMap<String, Value> {
    let snapshot = cache.snapshot();
    let records = snapshot
        .view()
        .enumerate("packages.conda")
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    records
}

const MIT_ONLY: &[u8] = br#"{"packages.conda":{"a-1-0.conda":{"license":"MIT"}}}"#;

#[test]
fn added_record_joins_enumeration() {
    let temp = TempDir::new().unwrap();
    let cache = imported(temp.path(), MIT_ONLY);
    let have = hash_of(MIT_ONLY);

    let patch = patch_set(
        &have,
        &revision(1),
        vec![PatchOperation::add("/packages.conda/b-1-0.conda", json!({"license": "BSD"}))],
    );
    let outcome = cache.apply_stream(&stream(&[patch], &revision(1)), 0).unwrap();
    assert!(matches!(outcome, ApplyOutcome::Applied { patches: 1, .. }));

    let expected: BTreeMap<String, Value> = [
        ("a-1-0.conda".to_string(), json!({"license": "MIT"})),
        ("b-1-0.conda".to_string(), json!({"license": "BSD"})),
    ]
    .into_iter()
    .collect();
    assert_eq!(conda_records(&cache), expected);
}

#[test]
fn removed_record_disappears_but_baseline_file_keeps_it() {
    let temp = TempDir::new().unwrap();
    let cache = imported(temp.path(), MIT_ONLY);

    let patch = patch_set(
        &hash_of(MIT_ONLY),
        &revision(1),
        vec![PatchOperation::remove("/packages.conda/a-1-0.conda")],
    );
    cache.apply_stream(&stream(&[patch], &revision(1)), 0).unwrap();

    let snapshot = cache.snapshot();
    assert_eq!(snapshot.view().lookup("packages.conda", "a-1-0.conda"), None);
    assert_eq!(snapshot.view().enumerate("packages.conda").count(), 0);

    let on_disk = std::fs::read(&cache.paths().json).unwrap();
    assert_eq!(on_disk, MIT_ONLY);
}

#[test]
fn field_add_keeps_other_fields() {
    let temp = TempDir::new().unwrap();
    let cache = imported(temp.path(), CONDA_BASELINE);

    let patch = patch_set(
        &hash_of(CONDA_BASELINE),
        &revision(1),
        vec![PatchOperation::add("/packages.conda/c-1-0.conda/license_family", json!("MIT"))],
    );
    cache.apply_stream(&stream(&[patch], &revision(1)), 0).unwrap();

    let snapshot = cache.snapshot();
    assert_eq!(
        snapshot.view().lookup("packages.conda", "c-1-0.conda"),
        Some(&json!({"name": "c", "version": "1", "depends": ["python"], "license_family": "MIT"}))
    );
    // the baseline copy is untouched
    assert_eq!(
        snapshot.baseline().document()["packages.conda"]["c-1-0.conda"],
        json!({"name": "c", "version": "1", "depends": ["python"]})
    );
}

#[test]
fn move_operation_falls_back_without_mutation() {
    let temp = TempDir::new().unwrap();
    let cache = imported(temp.path(), CONDA_BASELINE);
    let before = conda_records(&cache);

    let mut patch = patch_set(
        &hash_of(CONDA_BASELINE),
        &revision(1),
        vec![PatchOperation::add("/packages.conda/d-1-0.conda", json!({"license": "MIT"}))],
    );
    let mut operation = PatchOperation::remove("/packages.conda/e-1-0.conda");
    operation.op = "move".to_string();
    operation.from = Some("/packages.conda/a-1-0.conda".to_string());
    patch.patch.push(operation);

    let outcome = cache.apply_stream(&stream(&[patch], &revision(1)), 0).unwrap();
    assert_eq!(
        outcome,
        ApplyOutcome::FallbackRequired(PatchError::UnsupportedPatchOperator("move".to_string()))
    );
    assert_eq!(conda_records(&cache), before);
    assert!(cache.snapshot().overlay().is_empty());
}

#[test]
fn top_level_patch_copies_baseline_value() {
    let temp = TempDir::new().unwrap();
    let cache = imported(temp.path(), CONDA_BASELINE);

    let patch = patch_set(
        &hash_of(CONDA_BASELINE),
        &revision(1),
        vec![
            PatchOperation::add("/info/base_url", json!("https://conda.example/noarch")),
            PatchOperation::add("/repodata_version", json!(2)),
        ],
    );
    cache.apply_stream(&stream(&[patch], &revision(1)), 0).unwrap();

    let snapshot = cache.snapshot();
    let view = snapshot.view();
    assert_eq!(
        view.top("info"),
        Some(&json!({"subdir": "noarch", "base_url": "https://conda.example/noarch"}))
    );
    assert_eq!(view.top("repodata_version"), Some(&json!(2)));
    assert_eq!(view.top_names(), vec!["info", "repodata_version"]);
}

#[test]
fn materialized_document_matches_patched_content() {
    let temp = TempDir::new().unwrap();
    let cache = imported(temp.path(), CONDA_BASELINE);

    let patch = patch_set(
        &hash_of(CONDA_BASELINE),
        &revision(1),
        vec![
            PatchOperation::remove("/packages.conda/a-1-0.conda"),
            PatchOperation::replace("/packages.conda/c-1-0.conda/version", json!("2")),
        ],
    );
    cache.apply_stream(&stream(&[patch], &revision(1)), 0).unwrap();

    let document = cache.snapshot().view().materialize();
    assert_eq!(
        document,
        json!({
            "info": {"subdir": "noarch"},
            "packages": {},
            "packages.conda": {
                "c-1-0.conda": {"name": "c", "version": "2", "depends": ["python"]}
            }
        })
    );
}

#[test]
fn overlay_threshold_triggers_fallback() {
    let temp = TempDir::new().unwrap();
    let cache = open_cache_with_limit(temp.path(), 64);
    cache.replace_baseline(CONDA_BASELINE).unwrap();

    let big = "x".repeat(256);
    let patch = patch_set(
        &hash_of(CONDA_BASELINE),
        &revision(1),
        vec![PatchOperation::add("/packages.conda/big-1-0.conda", json!({"about": big}))],
    );
    let outcome = cache.apply_stream(&stream(&[patch], &revision(1)), 0).unwrap();

    assert!(matches!(
        outcome,
        ApplyOutcome::FallbackRequired(PatchError::OverlayTooLarge { limit: 64, .. })
    ));
    assert_eq!(cache.snapshot().view().lookup("packages.conda", "big-1-0.conda"), None);
}

#[test]
fn malformed_pointer_triggers_fallback() {
    let temp = TempDir::new().unwrap();
    let cache = imported(temp.path(), CONDA_BASELINE);

    let patch = patch_set(
        &hash_of(CONDA_BASELINE),
        &revision(1),
        vec![PatchOperation::add("/packages.conda", json!({}))],
    );
    let outcome = cache.apply_stream(&stream(&[patch], &revision(1)), 0).unwrap();

    assert!(matches!(
        outcome,
        ApplyOutcome::FallbackRequired(PatchError::MalformedPointer { .. })
    ));
}
