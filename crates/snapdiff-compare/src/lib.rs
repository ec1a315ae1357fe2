//! Pairwise signature diffing and directory batch reconciliation.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use snapdiff_core::{AssetKind, CaptureOutcome, SignatureRecord};
use snapdiff_storage::write_json_pretty;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, info_span, warn, Instrument};

mod visual;

pub use visual::{default_comparator, ImageSimilarity, VisualComparator, VisualError};
#[cfg(feature = "visual")]
pub use visual::ImageComparator;

pub const CRATE_NAME: &str = "snapdiff-compare";

/// Aggregate summary written into every batch output directory.
pub const BATCH_SUMMARY_FILE: &str = "_batch_summary.json";

const DIFF_NAME_MAX_CHARS: usize = 180;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualThresholds {
    pub phash_distance: u32,
    pub ssim: f64,
}

impl Default for VisualThresholds {
    fn default() -> Self {
        Self {
            phash_distance: 8,
            ssim: 0.95,
        }
    }
}

impl VisualThresholds {
    pub fn classify(&self, phash_distance: u32, ssim: f64) -> VisualHint {
        if phash_distance > self.phash_distance && ssim < self.ssim {
            VisualHint::Significant
        } else {
            VisualHint::MinorOrNone
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompareConfig {
    pub diffs_dir: PathBuf,
    pub visual: VisualThresholds,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            diffs_dir: PathBuf::from("diffs"),
            visual: VisualThresholds::default(),
        }
    }
}

impl CompareConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            diffs_dir: std::env::var("SNAPDIFF_DIFFS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.diffs_dir),
            visual: VisualThresholds {
                phash_distance: std::env::var("SNAPDIFF_VISUAL_PHASH_THRESHOLD")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.visual.phash_distance),
                ssim: std::env::var("SNAPDIFF_VISUAL_SSIM_THRESHOLD")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.visual.ssim),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordRef {
    pub path: PathBuf,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpDiff {
    pub first_hash: String,
    pub second_hash: String,
    pub changed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomDiff {
    pub first_hash: String,
    pub second_hash: String,
    /// Structural rollup: html hash, tag counts or assets changed.
    pub changed: bool,
    /// Visible text digest changed.
    pub text_changed: bool,
    pub text_len_delta: i64,
}

/// Unique-set movement of one asset kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDelta {
    pub count_delta: i64,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDeltas {
    pub images: AssetDelta,
    pub links: AssetDelta,
    pub scripts: AssetDelta,
}

impl AssetDeltas {
    fn slot(&mut self, kind: AssetKind) -> &mut AssetDelta {
        match kind {
            AssetKind::Images => &mut self.images,
            AssetKind::Links => &mut self.links,
            AssetKind::Scripts => &mut self.scripts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureDiff {
    pub html_hash_changed: bool,
    pub tag_counts_changed: bool,
    pub assets_changed: bool,
    pub assets: AssetDeltas,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualHint {
    Significant,
    MinorOrNone,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualMetrics {
    pub phash_distance: u32,
    pub ssim: f64,
    pub visual_hint: VisualHint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualFailure {
    pub error: String,
    pub exception: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualSentinel {
    /// No comparator in this build.
    NotAvailable,
    /// Comparator present but at least one screenshot missing.
    NotComputed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VisualOutcome {
    Metrics(VisualMetrics),
    Failed(VisualFailure),
    Sentinel(VisualSentinel),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffArtifacts {
    pub diff_json: PathBuf,
    pub first_json: PathBuf,
    pub second_json: PathBuf,
    pub first_png: PathBuf,
    pub second_png: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub changed: bool,
    pub http_changed: bool,
    pub text_changed: bool,
    pub dom_changed: bool,
    pub html_hash_changed: bool,
    pub tag_counts_changed: bool,
    pub assets_changed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_phash_distance: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_ssim: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_hint: Option<VisualHint>,
}

/// Structured comparison of a baseline (`first`) and current (`second`) record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffRecord {
    pub first: RecordRef,
    pub second: RecordRef,
    pub http: HttpDiff,
    pub dom: DomDiff,
    pub structure: StructureDiff,
    pub visual: VisualOutcome,
    pub artifacts: DiffArtifacts,
    pub summary: DiffSummary,
}

/// Per-axis flags computed from two records, before any file or visual work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureDiff {
    pub http_changed: bool,
    pub text_changed: bool,
    pub text_len_delta: i64,
    pub html_hash_changed: bool,
    pub tag_counts_changed: bool,
    pub assets_changed: bool,
    pub assets: AssetDeltas,
}

impl SignatureDiff {
    pub fn dom_changed(&self) -> bool {
        self.html_hash_changed || self.tag_counts_changed || self.assets_changed
    }

    pub fn changed(&self) -> bool {
        self.http_changed || self.dom_changed()
    }
}

fn signed_len(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn set_delta(first: &[String], second: &[String]) -> (Vec<String>, Vec<String>) {
    let a: BTreeSet<&String> = first.iter().collect();
    let b: BTreeSet<&String> = second.iter().collect();
    let added = b.difference(&a).map(|s| (*s).clone()).collect();
    let removed = a.difference(&b).map(|s| (*s).clone()).collect();
    (added, removed)
}

/// Compare two signature records axis by axis.
pub fn diff_signatures(first: &SignatureRecord, second: &SignatureRecord) -> SignatureDiff {
    let fa = &first.structure.assets;
    let sa = &second.structure.assets;

    let mut assets_changed = false;
    let mut assets = AssetDeltas::default();
    for kind in AssetKind::ALL {
        assets_changed |= fa.list_hash(kind) != sa.list_hash(kind)
            || fa.unique_hash(kind) != sa.unique_hash(kind)
            || fa.count(kind) != sa.count(kind);

        let (added, removed) = set_delta(fa.unique(kind), sa.unique(kind));
        *assets.slot(kind) = AssetDelta {
            count_delta: signed_len(sa.count(kind)) - signed_len(fa.count(kind)),
            added,
            removed,
        };
    }

    SignatureDiff {
        http_changed: first.http.hash != second.http.hash,
        text_changed: first.dom.hash != second.dom.hash,
        text_len_delta: signed_len(second.dom.text_len) - signed_len(first.dom.text_len),
        html_hash_changed: first.structure.html_hash != second.structure.html_hash,
        tag_counts_changed: first.structure.tag_counts != second.structure.tag_counts,
        assets_changed,
        assets,
    }
}

/// Per-comparison failure. Serialized with an `error` key so callers can
/// print it in place of a diff.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum CompareError {
    #[error("baseline record not found: {}", .path.display())]
    FirstNotFound { path: PathBuf },
    #[error("current record not found: {}", .path.display())]
    SecondNotFound { path: PathBuf },
    #[error("failed to load records (first loaded: {first}, second loaded: {second})")]
    FailedToLoadJson { first: bool, second: bool },
    #[error("record holds a capture error instead of a signature")]
    CaptureError {
        first: Option<String>,
        second: Option<String>,
    },
    #[error("writing diff {}: {message}", .path.display())]
    WriteFailed { path: PathBuf, message: String },
    #[error("baseline directory not found: {}", .path.display())]
    BaseDirNotFound { path: PathBuf },
    #[error("current directory not found: {}", .path.display())]
    CurrentDirNotFound { path: PathBuf },
}

fn absolute_or_given(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn file_stem_string(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Read and parse a record file. Missing, empty or unparseable content is
/// reported as `None`.
async fn load_outcome(path: &Path) -> Option<CaptureOutcome> {
    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "record unreadable");
            return None;
        }
    };
    if text.trim().is_empty() {
        warn!(path = %path.display(), "record is empty");
        return None;
    }
    match serde_json::from_str::<CaptureOutcome>(&text) {
        Ok(outcome) => Some(outcome),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "record does not parse");
            None
        }
    }
}

fn is_well_formed(outcome: &Option<CaptureOutcome>, path: &Path) -> bool {
    match outcome {
        Some(CaptureOutcome::Captured(record)) => match record.validate() {
            Ok(()) => true,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "record is malformed");
                false
            }
        },
        Some(CaptureOutcome::Failed(_)) => true,
        None => false,
    }
}

/// Screenshot bytes for a record: the embedded hex, else a sibling
/// `<stem>.png`. Any failure yields `None`.
pub async fn load_screenshot(record: &SignatureRecord, record_path: &Path) -> Option<Vec<u8>> {
    if let Some(hex_text) = record.screenshot_hex.as_deref().filter(|s| !s.is_empty()) {
        return match hex::decode(hex_text) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(path = %record_path.display(), error = %err, "embedded screenshot is not valid hex");
                None
            }
        };
    }
    let png = record_path.with_extension("png");
    match fs::read(&png).await {
        Ok(bytes) => {
            debug!(png = %png.display(), "screenshot backfilled from sibling file");
            Some(bytes)
        }
        Err(_) => None,
    }
}

/// Compares record pairs and persists the resulting diffs.
pub struct DiffEngine {
    config: CompareConfig,
    visual: Option<Box<dyn VisualComparator>>,
}

impl DiffEngine {
    /// Engine with the comparator compiled into this build.
    pub fn new(config: CompareConfig) -> Self {
        Self::with_visual(config, default_comparator())
    }

    pub fn with_visual(config: CompareConfig, visual: Option<Box<dyn VisualComparator>>) -> Self {
        Self { config, visual }
    }

    pub fn config(&self) -> &CompareConfig {
        &self.config
    }

    pub fn visual_available(&self) -> bool {
        self.visual.is_some()
    }

    /// `<diffs_dir>/<first-stem>_vs_<second-stem>.json`, the name capped at
    /// 180 characters.
    pub fn default_diff_path(&self, first: &Path, second: &Path) -> PathBuf {
        let name = format!("{}_vs_{}", file_stem_string(first), file_stem_string(second));
        let name: String = name.chars().take(DIFF_NAME_MAX_CHARS).collect();
        self.config.diffs_dir.join(format!("{name}.json"))
    }

    pub fn visual_outcome(&self, first: Option<&[u8]>, second: Option<&[u8]>) -> VisualOutcome {
        let Some(comparator) = &self.visual else {
            return VisualOutcome::Sentinel(VisualSentinel::NotAvailable);
        };
        let (Some(first), Some(second)) = (first, second) else {
            return VisualOutcome::Sentinel(VisualSentinel::NotComputed);
        };
        match comparator.compare(first, second) {
            Ok(sim) => VisualOutcome::Metrics(VisualMetrics {
                phash_distance: sim.perceptual_distance,
                ssim: sim.similarity,
                visual_hint: self
                    .config
                    .visual
                    .classify(sim.perceptual_distance, sim.similarity),
            }),
            Err(err) => {
                warn!(error = %err, "visual comparison failed");
                VisualOutcome::Failed(VisualFailure {
                    error: "visual_failed".to_string(),
                    exception: err.to_string(),
                })
            }
        }
    }

    /// Assemble the diff record for two loaded records. No I/O.
    pub fn diff_records(
        &self,
        first: (&SignatureRecord, &Path),
        second: (&SignatureRecord, &Path),
        visual: VisualOutcome,
        out: &Path,
    ) -> DiffRecord {
        let (first, first_path) = first;
        let (second, second_path) = second;
        let diff = diff_signatures(first, second);
        let dom_changed = diff.dom_changed();

        let (visual_phash_distance, visual_ssim, visual_hint) = match &visual {
            VisualOutcome::Metrics(m) => (Some(m.phash_distance), Some(m.ssim), Some(m.visual_hint)),
            _ => (None, None, None),
        };

        let summary = DiffSummary {
            changed: diff.changed(),
            http_changed: diff.http_changed,
            text_changed: diff.text_changed,
            dom_changed,
            html_hash_changed: diff.html_hash_changed,
            tag_counts_changed: diff.tag_counts_changed,
            assets_changed: diff.assets_changed,
            visual_phash_distance,
            visual_ssim,
            visual_hint,
        };

        DiffRecord {
            first: RecordRef {
                path: first_path.to_path_buf(),
                url: first.url.clone(),
            },
            second: RecordRef {
                path: second_path.to_path_buf(),
                url: second.url.clone(),
            },
            http: HttpDiff {
                first_hash: first.http.hash.clone(),
                second_hash: second.http.hash.clone(),
                changed: diff.http_changed,
            },
            dom: DomDiff {
                first_hash: first.dom.hash.clone(),
                second_hash: second.dom.hash.clone(),
                changed: dom_changed,
                text_changed: diff.text_changed,
                text_len_delta: diff.text_len_delta,
            },
            structure: StructureDiff {
                html_hash_changed: diff.html_hash_changed,
                tag_counts_changed: diff.tag_counts_changed,
                assets_changed: diff.assets_changed,
                assets: diff.assets,
            },
            visual,
            artifacts: DiffArtifacts {
                diff_json: out.to_path_buf(),
                first_json: first_path.to_path_buf(),
                second_json: second_path.to_path_buf(),
                first_png: first_path.with_extension("png"),
                second_png: second_path.with_extension("png"),
            },
            summary,
        }
    }

    /// Load two record files, diff them and write the diff to `out` (or the
    /// default diff path).
    pub async fn compare_files(
        &self,
        first: &Path,
        second: &Path,
        out: Option<&Path>,
    ) -> Result<DiffRecord, CompareError> {
        let span = info_span!("compare", first = %first.display(), second = %second.display());
        self.compare_files_inner(first, second, out)
            .instrument(span)
            .await
    }

    async fn compare_files_inner(
        &self,
        first: &Path,
        second: &Path,
        out: Option<&Path>,
    ) -> Result<DiffRecord, CompareError> {
        let first_path = absolute_or_given(first);
        let second_path = absolute_or_given(second);
        if !fs::try_exists(&first_path).await.unwrap_or(false) {
            return Err(CompareError::FirstNotFound { path: first_path });
        }
        if !fs::try_exists(&second_path).await.unwrap_or(false) {
            return Err(CompareError::SecondNotFound { path: second_path });
        }

        let first_outcome = load_outcome(&first_path).await;
        let second_outcome = load_outcome(&second_path).await;
        let first_ok = is_well_formed(&first_outcome, &first_path);
        let second_ok = is_well_formed(&second_outcome, &second_path);
        let (Some(first_outcome), Some(second_outcome)) = (first_outcome, second_outcome) else {
            return Err(CompareError::FailedToLoadJson {
                first: first_ok,
                second: second_ok,
            });
        };
        if !first_ok || !second_ok {
            return Err(CompareError::FailedToLoadJson {
                first: first_ok,
                second: second_ok,
            });
        }

        let (first_record, second_record) =
            match (first_outcome.into_record(), second_outcome.into_record()) {
                (Ok(a), Ok(b)) => (a, b),
                (a, b) => {
                    return Err(CompareError::CaptureError {
                        first: a.err().map(|f| f.error),
                        second: b.err().map(|f| f.error),
                    });
                }
            };

        let visual = if self.visual_available() {
            let first_png = load_screenshot(&first_record, &first_path).await;
            let second_png = load_screenshot(&second_record, &second_path).await;
            self.visual_outcome(first_png.as_deref(), second_png.as_deref())
        } else {
            self.visual_outcome(None, None)
        };

        let out = match out {
            Some(path) => path.to_path_buf(),
            None => self.default_diff_path(&first_path, &second_path),
        };

        let record = self.diff_records(
            (&first_record, &first_path),
            (&second_record, &second_path),
            visual,
            &out,
        );

        write_json_pretty(&out, &record)
            .await
            .map_err(|err| CompareError::WriteFailed {
                path: out.clone(),
                message: format!("{err:#}"),
            })?;

        info!(
            out = %out.display(),
            changed = record.summary.changed,
            "diff written"
        );
        Ok(record)
    }
}

/// Stems present on each side of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub common: Vec<String>,
    pub missing_in_current: Vec<String>,
    pub missing_in_base: Vec<String>,
}

pub fn reconcile_stems<V>(base: &BTreeMap<String, V>, current: &BTreeMap<String, V>) -> Reconciliation {
    let base_keys: BTreeSet<&String> = base.keys().collect();
    let current_keys: BTreeSet<&String> = current.keys().collect();
    Reconciliation {
        common: base_keys
            .intersection(&current_keys)
            .map(|s| (*s).clone())
            .collect(),
        missing_in_current: base_keys
            .difference(&current_keys)
            .map(|s| (*s).clone())
            .collect(),
        missing_in_base: current_keys
            .difference(&base_keys)
            .map(|s| (*s).clone())
            .collect(),
    }
}

/// `stem -> path` for every `*.json` file (extension matched
/// case-insensitively, symlinks followed) directly inside `dir`. An unreadable directory maps to
/// an empty set.
pub async fn json_map_by_stem(dir: &Path) -> BTreeMap<String, PathBuf> {
    let mut map = BTreeMap::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = %dir.display(), error = %err, "directory unreadable");
            return map;
        }
    };
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "directory listing interrupted");
                break;
            }
        };
        let path = entry.path();
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("json"));
        let is_file = fs::metadata(&path).await.is_ok_and(|m| m.is_file());
        if is_json && is_file {
            map.insert(file_stem_string(&path), path);
        }
    }
    map
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub stem: String,
    pub first: PathBuf,
    pub second: PathBuf,
    pub out: PathBuf,
    pub summary: Option<DiffSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CompareError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub count_compared: usize,
    pub missing_in_current: Vec<String>,
    pub missing_in_base: Vec<String>,
    pub out_dir: PathBuf,
    pub results: Vec<BatchItem>,
}

/// Matches record files across two directories by stem and diffs each pair.
pub struct BatchReconciler {
    engine: DiffEngine,
}

impl BatchReconciler {
    pub fn new(engine: DiffEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &DiffEngine {
        &self.engine
    }

    /// Diff every stem present in both directories into `out_dir` (default:
    /// the configured diffs directory) and write [`BATCH_SUMMARY_FILE`].
    /// Per-stem failures are recorded in their result; only a missing
    /// directory root aborts the run.
    pub async fn compare_dirs(
        &self,
        base_dir: &Path,
        current_dir: &Path,
        out_dir: Option<&Path>,
    ) -> Result<BatchSummary, CompareError> {
        let base_dir = absolute_or_given(base_dir);
        let current_dir = absolute_or_given(current_dir);
        if !fs::metadata(&base_dir).await.is_ok_and(|m| m.is_dir()) {
            return Err(CompareError::BaseDirNotFound { path: base_dir });
        }
        if !fs::metadata(&current_dir).await.is_ok_and(|m| m.is_dir()) {
            return Err(CompareError::CurrentDirNotFound { path: current_dir });
        }

        let out_dir = absolute_or_given(out_dir.unwrap_or(&self.engine.config().diffs_dir));
        let span = info_span!("compare_dirs", base = %base_dir.display(), current = %current_dir.display());
        self.run_batch(&base_dir, &current_dir, out_dir)
            .instrument(span)
            .await
    }

    async fn run_batch(
        &self,
        base_dir: &Path,
        current_dir: &Path,
        out_dir: PathBuf,
    ) -> Result<BatchSummary, CompareError> {
        let base_map = json_map_by_stem(base_dir).await;
        let current_map = json_map_by_stem(current_dir).await;
        let stems = reconcile_stems(&base_map, &current_map);

        let mut results = Vec::with_capacity(stems.common.len());
        for stem in &stems.common {
            let (Some(first), Some(second)) = (base_map.get(stem), current_map.get(stem)) else {
                continue;
            };
            let out = out_dir.join(format!("{stem}_diff.json"));
            let item = match self.engine.compare_files(first, second, Some(&out)).await {
                Ok(diff) => BatchItem {
                    stem: stem.clone(),
                    first: first.clone(),
                    second: second.clone(),
                    out,
                    summary: Some(diff.summary),
                    error: None,
                },
                Err(err) => {
                    warn!(stem = %stem, error = %err, "comparison failed");
                    BatchItem {
                        stem: stem.clone(),
                        first: first.clone(),
                        second: second.clone(),
                        out,
                        summary: None,
                        error: Some(err),
                    }
                }
            };
            results.push(item);
        }

        let summary = BatchSummary {
            count_compared: stems.common.len(),
            missing_in_current: stems.missing_in_current,
            missing_in_base: stems.missing_in_base,
            out_dir: out_dir.clone(),
            results,
        };

        let summary_path = out_dir.join(BATCH_SUMMARY_FILE);
        write_json_pretty(&summary_path, &summary)
            .await
            .map_err(|err| CompareError::WriteFailed {
                path: summary_path.clone(),
                message: format!("{err:#}"),
            })?;
        info!(
            compared = summary.count_compared,
            missing_in_current = summary.missing_in_current.len(),
            missing_in_base = summary.missing_in_base.len(),
            "batch complete"
        );
        Ok(summary)
    }
}
