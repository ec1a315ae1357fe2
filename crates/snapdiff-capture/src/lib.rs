//! Parsed-page contract, signature builder and capture orchestration.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use scraper::{Html, Selector};
use serde::Serialize;
use snapdiff_core::{
    AssetBundle, AssetKind, CaptureFailure, CaptureMeta, CaptureOutcome, DomSignature,
    HttpSignature, SignatureRecord, StructureSignature,
};
use snapdiff_storage::{
    sha256_hex, write_json_pretty, BackoffPolicy, HttpClientConfig, HttpFetcher, PageFetcher,
};
use thiserror::Error;
use tokio::fs;
use tracing::{info, info_span, warn, Instrument};

pub const CRATE_NAME: &str = "snapdiff-capture";

const SLUG_MAX_CHARS: usize = 120;

/// What the signature builder needs from a parsed page.
pub trait PageDocument {
    /// Text of the first `<title>`, if any.
    fn title(&self) -> Option<String>;

    /// Visible text with script/style content excluded: each text node
    /// trimmed, empty nodes dropped, the rest joined by single spaces.
    fn visible_text(&self) -> String;

    /// Every element's tag name in document order.
    fn tag_names(&self) -> Vec<String>;

    /// Values of `attr` on every `element`, in document order. Elements
    /// without the attribute are skipped.
    fn attribute_values(&self, element: &str, attr: &str) -> Vec<String>;

    /// Stable serialization of the whole tree.
    fn serialize(&self) -> String;
}

/// [`PageDocument`] backed by an html5ever tree.
pub struct ScrapedDocument {
    html: Html,
}

impl ScrapedDocument {
    pub fn parse(raw_html: &str) -> Self {
        Self {
            html: Html::parse_document(raw_html),
        }
    }

    fn elements(&self) -> impl Iterator<Item = &scraper::node::Element> + '_ {
        self.html
            .tree
            .root()
            .descendants()
            .filter_map(|node| node.value().as_element())
    }
}

fn text_or_none(value: String) -> Option<String> {
    let trimmed = value.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

impl PageDocument for ScrapedDocument {
    fn title(&self) -> Option<String> {
        let selector = Selector::parse("title").ok()?;
        self.html
            .select(&selector)
            .next()
            .and_then(|n| text_or_none(n.text().collect::<String>()))
    }

    fn visible_text(&self) -> String {
        self.html
            .tree
            .root()
            .descendants()
            .filter_map(|node| {
                let text = node.value().as_text()?;
                let hidden = node.ancestors().any(|a| {
                    a.value()
                        .as_element()
                        .is_some_and(|e| matches!(e.name(), "script" | "style"))
                });
                if hidden {
                    None
                } else {
                    Some(text.trim())
                }
            })
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn tag_names(&self) -> Vec<String> {
        self.elements().map(|e| e.name().to_string()).collect()
    }

    fn attribute_values(&self, element: &str, attr: &str) -> Vec<String> {
        self.elements()
            .filter(|e| e.name() == element)
            .filter_map(|e| e.attr(attr))
            .map(ToString::to_string)
            .collect()
    }

    fn serialize(&self) -> String {
        self.html.html()
    }
}

/// Collapse whitespace runs to single spaces and trim the ends.
pub fn normalize_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replace every whitespace run with one space, keeping leading/trailing runs.
pub fn collapse_whitespace_runs(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_run = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !in_run {
                out.push(' ');
                in_run = true;
            }
        } else {
            out.push(ch);
            in_run = false;
        }
    }
    out
}

fn digest_lines(items: &[String]) -> String {
    sha256_hex(items.join("\n").as_bytes())
}

fn unique_sorted(items: &[String]) -> Vec<String> {
    items
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn asset_sources<D: PageDocument + ?Sized>(document: &D, kind: AssetKind) -> Vec<String> {
    let (element, attr) = kind.element_attr();
    document
        .attribute_values(element, attr)
        .into_iter()
        .filter(|v| !v.is_empty())
        .map(|v| v.trim().to_string())
        .collect()
}

/// Build the asset inventory from raw per-kind source lists.
pub fn asset_bundle(img_srcs: Vec<String>, link_hrefs: Vec<String>, script_srcs: Vec<String>) -> AssetBundle {
    let img_srcs_unique = unique_sorted(&img_srcs);
    let link_hrefs_unique = unique_sorted(&link_hrefs);
    let script_srcs_unique = unique_sorted(&script_srcs);

    AssetBundle {
        img_count: img_srcs.len(),
        link_count: link_hrefs.len(),
        script_count: script_srcs.len(),

        imgs_list_hash: digest_lines(&img_srcs),
        links_list_hash: digest_lines(&link_hrefs),
        scripts_list_hash: digest_lines(&script_srcs),

        imgs_unique_hash: digest_lines(&img_srcs_unique),
        links_unique_hash: digest_lines(&link_hrefs_unique),
        scripts_unique_hash: digest_lines(&script_srcs_unique),

        img_srcs,
        link_hrefs,
        script_srcs,
        img_srcs_unique,
        link_hrefs_unique,
        script_srcs_unique,
    }
}

/// Reduce a fetched, parsed page to its signature record. Pure: identical
/// inputs always produce identical digests.
pub fn build_signature<D: PageDocument + ?Sized>(
    url: &str,
    status_code: u16,
    raw_html: &str,
    document: &D,
) -> SignatureRecord {
    let title = document.title().unwrap_or_default();

    let visible_text = document.visible_text();
    let norm = normalize_text(&visible_text);
    let tokens = norm.split_whitespace().collect::<Vec<_>>();
    let text_hash = sha256_hex(tokens.join(" ").as_bytes());

    let http = HttpSignature {
        status_code,
        hash: sha256_hex(status_code.to_string().as_bytes()),
    };
    let dom = DomSignature {
        hash: text_hash.clone(),
        text_len: visible_text.chars().count(),
        norm_len: norm.chars().count(),
    };

    let mut tag_counts: BTreeMap<String, usize> = BTreeMap::new();
    for tag in document.tag_names() {
        *tag_counts.entry(tag).or_default() += 1;
    }

    let assets = asset_bundle(
        asset_sources(document, AssetKind::Images),
        asset_sources(document, AssetKind::Links),
        asset_sources(document, AssetKind::Scripts),
    );

    let html_hash = sha256_hex(collapse_whitespace_runs(&document.serialize()).as_bytes());

    SignatureRecord {
        url: url.to_string(),
        status_code,
        title,
        text_hash,
        length: raw_html.chars().count(),
        html: None,
        http,
        dom,
        structure: StructureSignature {
            tag_counts,
            assets,
            html_hash,
        },
        screenshot_hex: None,
        meta: None,
    }
}

/// [`build_signature`] over an html5ever parse of `raw_html`.
pub fn build_signature_from_html(url: &str, status_code: u16, raw_html: &str) -> SignatureRecord {
    let document = ScrapedDocument::parse(raw_html);
    build_signature(url, status_code, raw_html, &document)
}

/// Filesystem-safe slug: alphanumeric runs kept lowercased, everything else
/// folded into single dashes, capped at 120 characters.
pub fn slugify(url: &str) -> String {
    url.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .take(SLUG_MAX_CHARS)
        .collect()
}

/// `NNN_<slug>.json` for the 1-based `index`, falling back to `url<index>`
/// when the slug is empty.
pub fn list_record_file_name(index: usize, url: &str) -> String {
    let slug = slugify(url);
    let slug = if slug.is_empty() {
        format!("url{index}")
    } else {
        slug
    };
    format!("{index:03}_{slug}.json")
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub http_max_retries: usize,
    pub embed_html: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            user_agent: "snapdiff-bot/0.1".to_string(),
            http_timeout_secs: 10,
            http_max_retries: 2,
            embed_html: true,
        }
    }
}

impl CaptureConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            user_agent: std::env::var("SNAPDIFF_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs: std::env::var("SNAPDIFF_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
            http_max_retries: std::env::var("SNAPDIFF_HTTP_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_max_retries),
            embed_html: std::env::var("SNAPDIFF_EMBED_HTML")
                .map(|v| !matches!(v.as_str(), "0" | "false" | "FALSE" | "False"))
                .unwrap_or(defaults.embed_html),
        }
    }
}

/// Capture failure outside the fetch itself. Serialized with an `error` key.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum CaptureError {
    #[error("url list not found: {}", .path.display())]
    FileNotFound { path: PathBuf },
    #[error("reading url list {}: {message}", .path.display())]
    ReadFailed { path: PathBuf, message: String },
    #[error("reading screenshot {}: {message}", .path.display())]
    ScreenshotUnreadable { path: PathBuf, message: String },
    #[error("writing signature record {}: {message}", .path.display())]
    WriteFailed { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptureListEntry {
    pub index: usize,
    pub url: String,
    pub status: EntryStatus,
    pub out: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptureListReport {
    pub message: &'static str,
    pub count: usize,
    pub results: Vec<CaptureListEntry>,
}

/// Read a newline-delimited URL list, skipping blank lines and `#` comments.
pub async fn read_urls_from_file(path: &Path) -> Result<Vec<String>, CaptureError> {
    let path = absolute_or_given(path);
    let text = match fs::read_to_string(&path).await {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(CaptureError::FileNotFound { path });
        }
        Err(err) => {
            return Err(CaptureError::ReadFailed {
                path,
                message: err.to_string(),
            });
        }
    };
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(ToString::to_string)
        .collect())
}

fn absolute_or_given(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Fetches pages, builds their signatures and persists the records.
pub struct CapturePipeline {
    config: CaptureConfig,
    fetcher: Box<dyn PageFetcher>,
}

impl CapturePipeline {
    pub fn new(config: CaptureConfig) -> Result<Self> {
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
            backoff: BackoffPolicy {
                max_retries: config.http_max_retries,
                ..Default::default()
            },
        })?;
        Ok(Self::with_fetcher(config, Box::new(http)))
    }

    pub fn with_fetcher(config: CaptureConfig, fetcher: Box<dyn PageFetcher>) -> Self {
        Self { config, fetcher }
    }

    /// Fetch and fingerprint one URL. A fetch failure becomes the error-only
    /// outcome; any HTTP status is recorded as data.
    pub async fn capture(&self, url: &str, batch_index: Option<usize>) -> CaptureOutcome {
        let response = match self.fetcher.fetch(url).await {
            Ok(response) => response,
            Err(err) => {
                warn!(url, error = %err, "capture failed");
                return CaptureOutcome::Failed(CaptureFailure {
                    url: url.to_string(),
                    error: err.to_string(),
                });
            }
        };

        let raw_html = response.body;
        let mut record = build_signature_from_html(url, response.status, &raw_html);
        if self.config.embed_html {
            record.html = Some(raw_html);
        }
        record.meta = Some(CaptureMeta {
            captured_at: Utc::now(),
            batch_index,
            final_url: Some(response.final_url),
        });
        CaptureOutcome::from(record)
    }

    /// Capture `url` and write the outcome to `out`. An explicitly supplied
    /// screenshot is embedded as `screenshot_hex`.
    pub async fn capture_single(
        &self,
        url: &str,
        out: &Path,
        screenshot: Option<&Path>,
    ) -> Result<CaptureOutcome, CaptureError> {
        self.capture_to_path(url, out, screenshot, None)
            .instrument(info_span!("capture_single", url))
            .await
    }

    async fn capture_to_path(
        &self,
        url: &str,
        out: &Path,
        screenshot: Option<&Path>,
        batch_index: Option<usize>,
    ) -> Result<CaptureOutcome, CaptureError> {
        let mut outcome = self.capture(url, batch_index).await;
        if let (CaptureOutcome::Captured(record), Some(png)) = (&mut outcome, screenshot) {
            let bytes = fs::read(png)
                .await
                .map_err(|err| CaptureError::ScreenshotUnreadable {
                    path: png.to_path_buf(),
                    message: err.to_string(),
                })?;
            record.screenshot_hex = Some(hex::encode(bytes));
        }
        write_json_pretty(out, &outcome)
            .await
            .map_err(|err| CaptureError::WriteFailed {
                path: out.to_path_buf(),
                message: format!("{err:#}"),
            })?;
        info!(url, out = %out.display(), captured = outcome.is_captured(), "record written");
        Ok(outcome)
    }

    /// Capture every URL in `file` sequentially into `out_dir`, one record
    /// per URL named by [`list_record_file_name`].
    pub async fn capture_from_list(
        &self,
        file: &Path,
        out_dir: &Path,
    ) -> Result<CaptureListReport, CaptureError> {
        let urls = read_urls_from_file(file).await?;
        let out_dir = absolute_or_given(out_dir);
        let span = info_span!("capture_list", file = %file.display(), urls = urls.len());

        async {
            let mut results = Vec::with_capacity(urls.len());
            for (offset, url) in urls.iter().enumerate() {
                let index = offset + 1;
                let out = out_dir.join(list_record_file_name(index, url));
                let entry = match self.capture_to_path(url, &out, None, Some(index)).await {
                    Ok(CaptureOutcome::Captured(_)) => CaptureListEntry {
                        index,
                        url: url.clone(),
                        status: EntryStatus::Ok,
                        out,
                        error: None,
                    },
                    Ok(CaptureOutcome::Failed(failure)) => CaptureListEntry {
                        index,
                        url: url.clone(),
                        status: EntryStatus::Error,
                        out,
                        error: Some(failure.error),
                    },
                    Err(err) => CaptureListEntry {
                        index,
                        url: url.clone(),
                        status: EntryStatus::Error,
                        out,
                        error: Some(err.to_string()),
                    },
                };
                results.push(entry);
            }
            Ok(CaptureListReport {
                message: "batch_complete",
                count: results.len(),
                results,
            })
        }
        .instrument(span)
        .await
    }
}
