//! Signature record model shared by capture and compare.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "snapdiff-core";

/// HTTP-layer fingerprint: the status code and a digest of its decimal form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpSignature {
    pub status_code: u16,
    pub hash: String,
}

/// Visible-text fingerprint.
///
/// `hash` is taken over the normalized, tokenized text while `text_len` is the
/// character length of the extracted text before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomSignature {
    pub hash: String,
    pub text_len: usize,
    #[serde(default)]
    pub norm_len: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Images,
    Links,
    Scripts,
}

impl AssetKind {
    pub const ALL: [AssetKind; 3] = [AssetKind::Images, AssetKind::Links, AssetKind::Scripts];

    /// Element and attribute the sources are read from.
    pub fn element_attr(self) -> (&'static str, &'static str) {
        match self {
            AssetKind::Images => ("img", "src"),
            AssetKind::Links => ("link", "href"),
            AssetKind::Scripts => ("script", "src"),
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssetKind::Images => "images",
            AssetKind::Links => "links",
            AssetKind::Scripts => "scripts",
        };
        f.write_str(name)
    }
}

/// Asset inventory: raw ordered sources, counts, sorted unique sets and the
/// digests of both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBundle {
    pub img_srcs: Vec<String>,
    pub link_hrefs: Vec<String>,
    pub script_srcs: Vec<String>,
    pub img_count: usize,
    pub link_count: usize,
    pub script_count: usize,

    pub img_srcs_unique: Vec<String>,
    pub link_hrefs_unique: Vec<String>,
    pub script_srcs_unique: Vec<String>,

    pub imgs_list_hash: String,
    pub links_list_hash: String,
    pub scripts_list_hash: String,

    pub imgs_unique_hash: String,
    pub links_unique_hash: String,
    pub scripts_unique_hash: String,
}

impl AssetBundle {
    pub fn sources(&self, kind: AssetKind) -> &[String] {
        match kind {
            AssetKind::Images => &self.img_srcs,
            AssetKind::Links => &self.link_hrefs,
            AssetKind::Scripts => &self.script_srcs,
        }
    }

    pub fn unique(&self, kind: AssetKind) -> &[String] {
        match kind {
            AssetKind::Images => &self.img_srcs_unique,
            AssetKind::Links => &self.link_hrefs_unique,
            AssetKind::Scripts => &self.script_srcs_unique,
        }
    }

    pub fn count(&self, kind: AssetKind) -> usize {
        match kind {
            AssetKind::Images => self.img_count,
            AssetKind::Links => self.link_count,
            AssetKind::Scripts => self.script_count,
        }
    }

    pub fn list_hash(&self, kind: AssetKind) -> &str {
        match kind {
            AssetKind::Images => &self.imgs_list_hash,
            AssetKind::Links => &self.links_list_hash,
            AssetKind::Scripts => &self.scripts_list_hash,
        }
    }

    pub fn unique_hash(&self, kind: AssetKind) -> &str {
        match kind {
            AssetKind::Images => &self.imgs_unique_hash,
            AssetKind::Links => &self.links_unique_hash,
            AssetKind::Scripts => &self.scripts_unique_hash,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureSignature {
    pub tag_counts: BTreeMap<String, usize>,
    pub assets: AssetBundle,
    pub html_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureMeta {
    pub captured_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
}

/// Canonical fingerprint of one page capture. Immutable once built; a
/// re-capture produces a new record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub url: String,
    #[serde(default)]
    pub status_code: u16,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text_hash: String,
    /// Character length of the raw HTML.
    #[serde(default)]
    pub length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    pub http: HttpSignature,
    pub dom: DomSignature,
    pub structure: StructureSignature,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_hex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<CaptureMeta>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("{kind} count {count} does not match {len} recorded sources")]
    AssetCountMismatch {
        kind: AssetKind,
        count: usize,
        len: usize,
    },
}

impl SignatureRecord {
    /// Checks the structural invariants a persisted record must satisfy.
    /// `text_len` is unsigned, so only the asset counts need checking.
    pub fn validate(&self) -> Result<(), RecordError> {
        let assets = &self.structure.assets;
        for kind in AssetKind::ALL {
            let count = assets.count(kind);
            let len = assets.sources(kind).len();
            if count != len {
                return Err(RecordError::AssetCountMismatch { kind, count, len });
            }
        }
        Ok(())
    }
}

/// Record written in place of a signature when the fetch itself failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureFailure {
    pub url: String,
    pub error: String,
}

/// Result of one capture. Persisted untagged: a failure is the bare
/// `{url, error}` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CaptureOutcome {
    Captured(Box<SignatureRecord>),
    Failed(CaptureFailure),
}

impl CaptureOutcome {
    pub fn url(&self) -> &str {
        match self {
            CaptureOutcome::Captured(record) => &record.url,
            CaptureOutcome::Failed(failure) => &failure.url,
        }
    }

    pub fn is_captured(&self) -> bool {
        matches!(self, CaptureOutcome::Captured(_))
    }

    pub fn into_record(self) -> Result<SignatureRecord, CaptureFailure> {
        match self {
            CaptureOutcome::Captured(record) => Ok(*record),
            CaptureOutcome::Failed(failure) => Err(failure),
        }
    }
}

impl From<SignatureRecord> for CaptureOutcome {
    fn from(record: SignatureRecord) -> Self {
        CaptureOutcome::Captured(Box::new(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> SignatureRecord {
        SignatureRecord {
            url: "https://example.com/".into(),
            status_code: 200,
            title: "Example".into(),
            text_hash: "t".into(),
            length: 10,
            html: None,
            http: HttpSignature {
                status_code: 200,
                hash: "h".into(),
            },
            dom: DomSignature {
                hash: "t".into(),
                text_len: 7,
                norm_len: 7,
            },
            structure: StructureSignature {
                tag_counts: BTreeMap::from([("img".to_string(), 2)]),
                assets: AssetBundle {
                    img_srcs: vec!["a.png".into(), "a.png".into()],
                    link_hrefs: vec![],
                    script_srcs: vec![],
                    img_count: 2,
                    link_count: 0,
                    script_count: 0,
                    img_srcs_unique: vec!["a.png".into()],
                    link_hrefs_unique: vec![],
                    script_srcs_unique: vec![],
                    imgs_list_hash: "il".into(),
                    links_list_hash: "ll".into(),
                    scripts_list_hash: "sl".into(),
                    imgs_unique_hash: "iu".into(),
                    links_unique_hash: "lu".into(),
                    scripts_unique_hash: "su".into(),
                },
                html_hash: "x".into(),
            },
            screenshot_hex: None,
            meta: None,
        }
    }

    #[test]
    fn well_formed_record_validates() {
        assert_eq!(sample_record().validate(), Ok(()));
    }

    #[test]
    fn count_mismatch_is_rejected() {
        let mut record = sample_record();
        record.structure.assets.img_count = 3;
        assert_eq!(
            record.validate(),
            Err(RecordError::AssetCountMismatch {
                kind: AssetKind::Images,
                count: 3,
                len: 2,
            })
        );
    }

    #[test]
    fn failed_capture_serializes_as_url_and_error_only() {
        let outcome = CaptureOutcome::Failed(CaptureFailure {
            url: "https://down.example/".into(),
            error: "dns error".into(),
        });
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"url": "https://down.example/", "error": "dns error"})
        );
    }

    #[test]
    fn untagged_outcome_reads_both_shapes() {
        let record = sample_record();
        let text = serde_json::to_string(&record).unwrap();
        let outcome: CaptureOutcome = serde_json::from_str(&text).unwrap();
        assert!(outcome.is_captured());
        assert_eq!(outcome.url(), "https://example.com/");

        let failed: CaptureOutcome =
            serde_json::from_str(r#"{"url":"https://x/","error":"timeout"}"#).unwrap();
        assert!(!failed.is_captured());
        assert_eq!(failed.into_record().unwrap_err().error, "timeout");
    }

    #[test]
    fn record_missing_structure_is_not_an_outcome() {
        let text = r#"{"url":"https://x/","http":{"status_code":200,"hash":"h"}}"#;
        assert!(serde_json::from_str::<CaptureOutcome>(text).is_err());
    }
}
