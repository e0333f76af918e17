use repodata_overlay::jlap::{Footer, JlapBuffer, JlapWriter, DEFAULT_IV};
use repodata_overlay::patch::{find_patches, PatchOperation};
use repodata_overlay::{ApplyOutcome, PatchError};
use serde_json::json;
use tempfile::TempDir;

use crate::support::{hash_of, imported, patch_set, revision, stream, CONDA_BASELINE};

#[test]
fn resume_from_recorded_cursor() {
    let temp = TempDir::new().unwrap();
    let cache = imported(temp.path(), CONDA_BASELINE);
    let first = patch_set(
        &hash_of(CONDA_BASELINE),
        &revision(1),
        vec![PatchOperation::add("/packages.conda/b-1-0.conda", json!({"license": "BSD"}))],
    );
    let second = patch_set(
        &revision(1),
        &revision(2),
        vec![PatchOperation::add("/packages.conda/d-1-0.conda", json!({"license": "MPL"}))],
    );

    cache
        .apply_stream(&stream(&[first.clone()], &revision(1)), 0)
        .unwrap();
    let pos = cache.state().jlap.unwrap().cursor.pos;

    // the remote file grew; fetch only the bytes after our cursor
    let grown = stream(&[first, second], &revision(2));
    let outcome = cache.apply_stream(&grown[pos as usize..], pos).unwrap();

    assert_eq!(
        outcome,
        ApplyOutcome::Applied {
            latest: revision(2),
            patches: 1
        }
    );
    let snapshot = cache.snapshot();
    assert!(snapshot.view().lookup("packages.conda", "b-1-0.conda").is_some());
    assert!(snapshot.view().lookup("packages.conda", "d-1-0.conda").is_some());
    assert!(cache.state().jlap.unwrap().cursor.pos > pos);
}

#[test]
fn unchanged_remote_is_up_to_date() {
    let temp = TempDir::new().unwrap();
    let cache = imported(temp.path(), CONDA_BASELINE);
    let first = patch_set(
        &hash_of(CONDA_BASELINE),
        &revision(1),
        vec![PatchOperation::remove("/packages.conda/a-1-0.conda")],
    );
    let bytes = stream(&[first], &revision(1));
    cache.apply_stream(&bytes, 0).unwrap();
    let pos = cache.state().jlap.unwrap().cursor.pos;

    let outcome = cache.apply_stream(&bytes[pos as usize..], pos).unwrap();
    assert_eq!(outcome, ApplyOutcome::UpToDate);
    assert_eq!(cache.state().effective_hash(), Some(revision(1).as_str()));
}

#[test]
fn cursor_mismatch_is_discontinuity() {
    let temp = TempDir::new().unwrap();
    let cache = imported(temp.path(), CONDA_BASELINE);
    let first = patch_set(&hash_of(CONDA_BASELINE), &revision(1), vec![]);
    let bytes = stream(&[first], &revision(1));
    cache.apply_stream(&bytes, 0).unwrap();
    let pos = cache.state().jlap.unwrap().cursor.pos;

    let outcome = cache
        .apply_stream(&bytes[(pos + 1) as usize..], pos + 1)
        .unwrap();
    assert!(matches!(
        outcome,
        ApplyOutcome::FallbackRequired(PatchError::PatchStreamDiscontinuity { .. })
    ));
    assert!(cache.state().jlap.is_none());
}

#[test]
fn mid_stream_read_without_cursor_is_discontinuity() {
    let temp = TempDir::new().unwrap();
    let cache = imported(temp.path(), CONDA_BASELINE);
    let bytes = stream(&[], &hash_of(CONDA_BASELINE));

    let outcome = cache.apply_stream(&bytes[65..], 65).unwrap();
    assert!(matches!(
        outcome,
        ApplyOutcome::FallbackRequired(PatchError::PatchStreamDiscontinuity { .. })
    ));
}

#[test]
fn tampered_stream_fails_integrity() {
    let temp = TempDir::new().unwrap();
    let cache = imported(temp.path(), CONDA_BASELINE);
    let patch = patch_set(
        &hash_of(CONDA_BASELINE),
        &revision(1),
        vec![PatchOperation::add("/packages.conda/b-1-0.conda", json!({"license": "BSD"}))],
    );
    let text = String::from_utf8(stream(&[patch], &revision(1))).unwrap();
    let tampered = text.replace("BSD", "GPL");

    let outcome = cache.apply_stream(tampered.as_bytes(), 0).unwrap();
    assert!(matches!(
        outcome,
        ApplyOutcome::FallbackRequired(PatchError::IntegrityMismatch { .. })
    ));
    assert!(cache.snapshot().overlay().is_empty());
}

#[test]
fn truncated_stream_is_malformed() {
    let temp = TempDir::new().unwrap();
    let cache = imported(temp.path(), CONDA_BASELINE);

    let outcome = cache.apply_stream(b"00", 0).unwrap();
    assert!(matches!(
        outcome,
        ApplyOutcome::FallbackRequired(PatchError::MalformedStream(_))
    ));
}

#[test]
fn unreachable_local_revision_is_not_found() {
    let temp = TempDir::new().unwrap();
    let cache = imported(temp.path(), CONDA_BASELINE);
    let patch = patch_set(&revision(7), &revision(8), vec![]);

    let outcome = cache.apply_stream(&stream(&[patch], &revision(8)), 0).unwrap();
    assert!(matches!(
        outcome,
        ApplyOutcome::FallbackRequired(PatchError::PatchNotFound(_))
    ));
}

#[test]
fn chain_skips_unrelated_branches() {
    let patches = vec![
        patch_set(&revision(1), &revision(2), vec![]),
        patch_set(&revision(9), &revision(10), vec![]),
        patch_set(&revision(2), &revision(3), vec![]),
    ];
    let chain = find_patches(&patches, &revision(1), &revision(3)).unwrap();
    let steps: Vec<&str> = chain.iter().map(|p| p.to.as_str()).collect();
    assert_eq!(steps, vec![revision(2).as_str(), revision(3).as_str()]);
}

#[test]
fn footer_extra_fields_survive() {
    let mut footer = Footer::new(revision(4));
    footer
        .extra
        .insert("url".to_string(), json!("repodata.json.zst"));
    let mut writer = JlapWriter::new(DEFAULT_IV);
    writer
        .push_patch(&patch_set(&revision(3), &revision(4), vec![]))
        .unwrap();
    let bytes = writer.finish(&footer).unwrap();

    let buffer = JlapBuffer::parse(&bytes, &DEFAULT_IV, 0).unwrap();
    assert_eq!(buffer.footer().unwrap(), footer);
    assert_eq!(buffer.patches().unwrap().len(), 1);
}
