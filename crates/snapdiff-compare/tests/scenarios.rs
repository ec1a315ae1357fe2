//! End-to-end comparisons over captured fixture pages.

use std::path::{Path, PathBuf};

use snapdiff_capture::build_signature_from_html;
use snapdiff_compare::{
    BatchReconciler, CompareConfig, CompareError, DiffEngine, VisualOutcome, VisualSentinel,
    BATCH_SUMMARY_FILE,
};
use snapdiff_core::SignatureRecord;
use tempfile::tempdir;

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .canonicalize()
        .expect("workspace root")
}

fn page(name: &str) -> String {
    let path = workspace_root().join("fixtures").join("pages").join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("reading {}: {e}", path.display()))
}

fn record(name: &str, status: u16) -> SignatureRecord {
    build_signature_from_html(&format!("https://harbor.example/{name}"), status, &page(name))
}

fn save(path: &Path, record: &SignatureRecord) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_json::to_string_pretty(record).unwrap()).unwrap();
}

fn engine(diffs_dir: &Path) -> DiffEngine {
    DiffEngine::with_visual(
        CompareConfig {
            diffs_dir: diffs_dir.to_path_buf(),
            ..CompareConfig::default()
        },
        None,
    )
}

#[tokio::test]
async fn identical_pages_are_unchanged() {
    let dir = tempdir().unwrap();
    let (a, b) = (dir.path().join("a.json"), dir.path().join("b.json"));
    save(&a, &record("landing.html", 200));
    save(&b, &record("landing.html", 200));

    let diff = engine(&dir.path().join("diffs"))
        .compare_files(&a, &b, None)
        .await
        .unwrap();
    let s = &diff.summary;
    assert!(!s.changed);
    assert!(!s.http_changed && !s.text_changed && !s.dom_changed);
    assert!(!s.html_hash_changed && !s.tag_counts_changed && !s.assets_changed);
    assert_eq!(diff.dom.text_len_delta, 0);
    assert!(dir.path().join("diffs/a_vs_b.json").exists());
}

#[tokio::test]
async fn added_image_changes_structure_but_not_text() {
    let dir = tempdir().unwrap();
    let (a, b) = (dir.path().join("base.json"), dir.path().join("current.json"));
    save(&a, &record("landing.html", 200));
    save(&b, &record("landing_extra_image.html", 200));

    let out = dir.path().join("landing_diff.json");
    let diff = engine(dir.path()).compare_files(&a, &b, Some(&out)).await.unwrap();

    assert!(diff.summary.tag_counts_changed);
    assert!(diff.summary.assets_changed);
    assert!(diff.summary.dom_changed);
    assert!(diff.summary.changed);
    assert!(!diff.summary.text_changed);
    assert!(!diff.summary.http_changed);
    assert_eq!(diff.structure.assets.images.added, vec!["/img/new-blend.jpg"]);
    assert_eq!(diff.structure.assets.images.count_delta, 1);
    assert!(diff.structure.assets.links.added.is_empty());

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(written["summary"]["dom_changed"], true);
    assert_eq!(written["visual"], "not_available");
}

#[tokio::test]
async fn status_change_alone_is_an_http_change() {
    let dir = tempdir().unwrap();
    let (a, b) = (dir.path().join("ok.json"), dir.path().join("gone.json"));
    save(&a, &record("pricing.html", 200));
    save(&b, &record("pricing.html", 404));

    let diff = engine(dir.path()).compare_files(&a, &b, None).await.unwrap();
    assert!(diff.summary.http_changed);
    assert!(!diff.summary.dom_changed);
    assert!(!diff.summary.text_changed);
    assert!(diff.summary.changed);
    assert_ne!(diff.http.first_hash, diff.http.second_hash);
}

#[tokio::test]
async fn batch_reconciles_stems_across_directories() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("base");
    let current = dir.path().join("current");
    save(&base.join("001_a.json"), &record("landing.html", 200));
    save(&base.join("002_b.json"), &record("pricing.html", 200));
    save(&current.join("001_a.json"), &record("landing_extra_image.html", 200));
    save(&current.join("003_c.json"), &record("pricing.html", 200));

    let out_dir = dir.path().join("diffs");
    let reconciler = BatchReconciler::new(engine(&out_dir));
    let summary = reconciler.compare_dirs(&base, &current, None).await.unwrap();

    assert_eq!(summary.count_compared, 1);
    assert_eq!(summary.missing_in_current, vec!["002_b"]);
    assert_eq!(summary.missing_in_base, vec!["003_c"]);
    assert_eq!(summary.out_dir, out_dir);
    assert_eq!(summary.results.len(), 1);

    let item = &summary.results[0];
    assert_eq!(item.stem, "001_a");
    assert_eq!(item.out, out_dir.join("001_a_diff.json"));
    assert!(item.summary.as_ref().unwrap().dom_changed);
    assert!(item.out.exists());

    let persisted: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(out_dir.join(BATCH_SUMMARY_FILE)).unwrap(),
    )
    .unwrap();
    assert_eq!(persisted["count_compared"], 1);
    assert_eq!(persisted["missing_in_base"], serde_json::json!(["003_c"]));
}

#[tokio::test]
async fn batch_keeps_going_past_bad_records() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("base");
    let current = dir.path().join("current");
    for stem in ["001_a", "002_b"] {
        save(&base.join(format!("{stem}.json")), &record("landing.html", 200));
    }
    save(&current.join("001_a.json"), &record("landing.html", 200));
    std::fs::write(
        current.join("002_b.json"),
        r#"{"url":"https://harbor.example/","error":"connection reset"}"#,
    )
    .unwrap();

    let out_dir = dir.path().join("out");
    let summary = BatchReconciler::new(engine(&dir.path().join("unused")))
        .compare_dirs(&base, &current, Some(&out_dir))
        .await
        .unwrap();

    assert_eq!(summary.results.len(), 2);
    assert!(!summary.results[0].summary.as_ref().unwrap().changed);
    let failed = &summary.results[1];
    assert!(failed.summary.is_none());
    assert!(matches!(failed.error, Some(CompareError::CaptureError { .. })));

    let persisted: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(out_dir.join(BATCH_SUMMARY_FILE)).unwrap(),
    )
    .unwrap();
    assert!(persisted["results"][1]["summary"].is_null());
    assert_eq!(persisted["results"][1]["error"]["error"], "capture_error");
    assert!(!dir.path().join("unused").exists());
}

#[tokio::test]
async fn empty_directories_compare_nothing() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("base");
    let current = dir.path().join("current");
    std::fs::create_dir_all(&base).unwrap();
    std::fs::create_dir_all(&current).unwrap();

    let summary = BatchReconciler::new(engine(&dir.path().join("diffs")))
        .compare_dirs(&base, &current, None)
        .await
        .unwrap();
    assert_eq!(summary.count_compared, 0);
    assert!(summary.results.is_empty());
    assert!(dir.path().join("diffs").join(BATCH_SUMMARY_FILE).exists());
}

#[tokio::test]
async fn default_engine_reports_not_computed_without_screenshots() {
    let dir = tempdir().unwrap();
    let (a, b) = (dir.path().join("a.json"), dir.path().join("b.json"));
    save(&a, &record("landing.html", 200));
    save(&b, &record("landing.html", 200));

    let engine = DiffEngine::new(CompareConfig {
        diffs_dir: dir.path().to_path_buf(),
        ..CompareConfig::default()
    });
    let diff = engine.compare_files(&a, &b, None).await.unwrap();
    let expected = if engine.visual_available() {
        VisualSentinel::NotComputed
    } else {
        VisualSentinel::NotAvailable
    };
    assert_eq!(diff.visual, VisualOutcome::Sentinel(expected));
}
