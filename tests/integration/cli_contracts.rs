use std::fs;

use repodata_overlay::config::OverlayConfig;
use repodata_overlay::error::ApiError;
use repodata_overlay::patch::PatchOperation;
use repodata_overlay::tooling::cli::{CliContext, Commands};
use repodata_overlay::PatchError;
use serde_json::json;
use tempfile::TempDir;

use crate::support::{hash_of, patch_set, revision, stream, CONDA_BASELINE};

fn context(temp: &TempDir) -> CliContext {
    CliContext::new(
        &OverlayConfig::default(),
        Some(temp.path().join("cache")),
        "conda-forge-noarch",
    )
    .unwrap()
}

fn import(temp: &TempDir, cli: &CliContext) {
    let source = temp.path().join("repodata.json");
    fs::write(&source, CONDA_BASELINE).unwrap();
    cli.execute(&Commands::Import { path: source }).unwrap();
}

#[test]
fn list_json_contract_reflects_overlay() {
    let temp = TempDir::new().unwrap();
    let cli = context(&temp);
    import(&temp, &cli);

    let jlap = temp.path().join("repodata.jlap");
    let patch = patch_set(
        &hash_of(CONDA_BASELINE),
        &revision(1),
        vec![
            PatchOperation::remove("/packages.conda/a-1-0.conda"),
            PatchOperation::add("/packages.conda/b-1-0.conda", json!({"name": "b"})),
        ],
    );
    fs::write(&jlap, stream(&[patch], &revision(1))).unwrap();
    let applied = cli
        .execute(&Commands::Apply {
            path: jlap,
            pos: 0,
        })
        .unwrap();
    assert!(applied.starts_with("Applied 1 patch set(s)"));

    let output = cli
        .execute(&Commands::List {
            section: "packages.conda".to_string(),
            format: "json".to_string(),
        })
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
    let keys: Vec<&String> = parsed.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["b-1-0.conda", "c-1-0.conda"]);
}

#[test]
fn list_text_renders_table() {
    let temp = TempDir::new().unwrap();
    let cli = context(&temp);
    import(&temp, &cli);

    let output = cli
        .execute(&Commands::List {
            section: "packages.conda".to_string(),
            format: "text".to_string(),
        })
        .unwrap();
    assert!(output.contains("Filename"));
    assert!(output.contains("c-1-0.conda"));
    assert!(output.ends_with("2 record(s)"));
}

#[test]
fn status_json_contract_has_required_fields() {
    let temp = TempDir::new().unwrap();
    let cli = context(&temp);
    import(&temp, &cli);

    let output = cli
        .execute(&Commands::Status {
            latest: Some(hash_of(CONDA_BASELINE)),
            format: "json".to_string(),
        })
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(parsed["name"], "conda-forge-noarch");
    assert_eq!(parsed["staleness"], "fresh");
    assert!(parsed["overlay_entries"].as_u64().is_some());
    assert!(parsed["overlay_bytes"].as_u64().is_some());
    assert_eq!(parsed["state"]["blake2_256_nominal"], json!(hash_of(CONDA_BASELINE)));
}

#[test]
fn failed_apply_reports_fallback() {
    let temp = TempDir::new().unwrap();
    let cli = context(&temp);
    import(&temp, &cli);

    let jlap = temp.path().join("repodata.jlap");
    let mut operation = PatchOperation::remove("/packages.conda/a-1-0.conda");
    operation.op = "copy".to_string();
    let patch = patch_set(&hash_of(CONDA_BASELINE), &revision(1), vec![operation]);
    fs::write(&jlap, stream(&[patch], &revision(1))).unwrap();

    let result = cli.execute(&Commands::Apply {
        path: jlap,
        pos: 0,
    });
    let err = result.unwrap_err();
    assert!(matches!(
        err,
        ApiError::Patch(PatchError::UnsupportedPatchOperator(_))
    ));
    assert!(err.to_string().contains("download the complete repodata.json"));
}

#[test]
fn jlap_write_builds_applicable_stream() {
    let temp = TempDir::new().unwrap();
    let cli = context(&temp);
    import(&temp, &cli);

    let patch = patch_set(
        &hash_of(CONDA_BASELINE),
        &revision(1),
        vec![PatchOperation::add("/packages.conda/b-1-0.conda", json!({"name": "b"}))],
    );
    let patch_path = temp.path().join("patch-1.json");
    fs::write(&patch_path, serde_json::to_vec(&patch).unwrap()).unwrap();

    let jlap = temp.path().join("written.jlap");
    let output = cli
        .execute(&Commands::JlapWrite {
            patches: vec![patch_path],
            latest: revision(1),
            iv: None,
            output: jlap.clone(),
        })
        .unwrap();
    assert!(output.contains("1 patch set(s)"));
    assert_eq!(fs::read(&jlap).unwrap(), stream(&[patch], &revision(1)));

    let applied = cli
        .execute(&Commands::Apply {
            path: jlap,
            pos: 0,
        })
        .unwrap();
    assert!(applied.starts_with("Applied 1 patch set(s)"));
}

#[test]
fn jlap_write_rejects_bad_latest() {
    let temp = TempDir::new().unwrap();
    let cli = context(&temp);
    let result = cli.execute(&Commands::JlapWrite {
        patches: vec![],
        latest: "not-hex".to_string(),
        iv: None,
        output: temp.path().join("out.jlap"),
    });
    assert!(matches!(result, Err(ApiError::InvalidArgument(_))));
}

#[test]
fn export_writes_merged_document() {
    let temp = TempDir::new().unwrap();
    let cli = context(&temp);
    import(&temp, &cli);

    let out = temp.path().join("merged.json");
    cli.execute(&Commands::Export { output: out.clone() }).unwrap();
    let merged: serde_json::Value = serde_json::from_slice(&fs::read(&out).unwrap()).unwrap();
    let original: serde_json::Value = serde_json::from_slice(CONDA_BASELINE).unwrap();
    assert_eq!(merged, original);
}
