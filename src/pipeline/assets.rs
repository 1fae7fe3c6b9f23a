//! Image assets: pull media out of the DOCX and point the HTML at them.
//!
//! Two steps, always in this order:
//!
//! 1. [`extract_assets`] copies every `word/media/*` entry into the
//!    `images/` folder, flattened to its basename.
//! 2. [`relink_assets`] rewrites every local `src` in the HTML to
//!    `images/<basename>`.
//!
//! LibreOffice does not reuse the archive's media names; it writes its own
//! `<stem>_html_<hash>.<ext>` files next to the HTML. Relinking therefore
//! also moves any such sibling into `images/`, so every packaged `src`
//! resolves to a file inside the package.

use crate::error::{Docx2HtmlError, StageWarning};
use crate::pipeline::rewrite::{attributes, tag_name_len, RE_START_TAG};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use serde::Serialize;
use std::borrow::Cow;
use std::fs::File;
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use zip::ZipArchive;

/// Archive folder holding embedded media.
pub const MEDIA_PREFIX: &str = "word/media/";

/// Folder (relative to the HTML) all images end up in.
pub const IMAGES_DIR: &str = "images";

/// Result of [`extract_assets`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssetReport {
    /// Basenames written to the destination, in archive order.
    pub files: Vec<String>,
    /// Entries that could not be copied.
    pub warnings: Vec<StageWarning>,
}

/// Result of [`relink_assets`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RelinkReport {
    /// `src` attributes rewritten to `images/<basename>`.
    pub rewritten: usize,
    /// Converter-emitted files moved into `images/`.
    pub moved: Vec<String>,
    pub warnings: Vec<StageWarning>,
}

/// Characters escaped when a file name is written back into a `src`.
const SRC_ESCAPES: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'\'')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?')
    .add(b'`');

/// Last component of a `/`- or `\`-separated path.
fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Path part of an image reference as it names a file on disk: query string
/// and fragment dropped, percent-escapes decoded.
pub(crate) fn src_path(src: &str) -> Cow<'_, str> {
    let end = src.find(['?', '#']).unwrap_or(src.len());
    percent_decode_str(&src[..end]).decode_utf8_lossy()
}

/// File name an image reference points at, decoded.
pub(crate) fn src_basename(src: &str) -> String {
    file_name(&src_path(src)).to_string()
}

/// True for references that must never be rewritten: already relinked,
/// remote, protocol-relative or inline.
fn is_external_or_relinked(src: &str) -> bool {
    let lower = src.trim().to_ascii_lowercase();
    lower.starts_with("images/")
        || lower.starts_with("http:")
        || lower.starts_with("https:")
        || lower.starts_with("//")
        || lower.starts_with("data:")
}

// ── Extraction ───────────────────────────────────────────────────────────────

/// Copy every `word/media/` entry of `document` into `destination_dir`.
///
/// Never fails: a document without media yields an empty report, and any
/// per-entry failure becomes a [`StageWarning::AssetCopy`].
pub fn extract_assets(document: &Path, destination_dir: &Path) -> AssetReport {
    let mut report = AssetReport::default();

    if let Err(e) = std::fs::create_dir_all(destination_dir) {
        warn!("Cannot create {}: {}", destination_dir.display(), e);
        report.warnings.push(StageWarning::AssetCopy {
            entry: MEDIA_PREFIX.to_string(),
            detail: e.to_string(),
        });
        return report;
    }

    let archive = File::open(document)
        .map_err(zip::result::ZipError::Io)
        .and_then(|f| ZipArchive::new(BufReader::new(f)));
    let mut archive = match archive {
        Ok(a) => a,
        Err(e) => {
            warn!("Cannot open {} for media extraction: {}", document.display(), e);
            report.warnings.push(StageWarning::AssetCopy {
                entry: MEDIA_PREFIX.to_string(),
                detail: e.to_string(),
            });
            return report;
        }
    };

    for i in 0..archive.len() {
        let mut entry = match archive.by_index(i) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable archive entry #{}: {}", i, e);
                report.warnings.push(StageWarning::AssetCopy {
                    entry: format!("#{i}"),
                    detail: e.to_string(),
                });
                continue;
            }
        };

        let name = entry.name().to_string();
        if !name.starts_with(MEDIA_PREFIX) || entry.is_dir() {
            continue;
        }
        let base = file_name(&name);
        if base.is_empty() || base == "." || base == ".." {
            continue;
        }

        let target = destination_dir.join(base);
        let copied = File::create(&target).and_then(|mut out| std::io::copy(&mut entry, &mut out));
        match copied {
            Ok(bytes) => {
                debug!("Extracted {} → {} ({} bytes)", name, target.display(), bytes);
                report.files.push(base.to_string());
            }
            Err(e) => {
                warn!("Failed to extract {}: {}", name, e);
                // Don't leave a truncated file behind.
                let _ = std::fs::remove_file(&target);
                report.warnings.push(StageWarning::AssetCopy {
                    entry: name,
                    detail: e.to_string(),
                });
            }
        }
    }

    if report.files.is_empty() {
        info!("No media in {}", document.display());
    } else {
        info!("Extracted {} media files", report.files.len());
    }
    report
}

// ── Re-linking ───────────────────────────────────────────────────────────────

/// Rewrite every local `src` in `html_path` to `images/<basename>`.
///
/// References are URLs: the basename is percent-decoded to find the file
/// and re-encoded when written back. Running it twice changes nothing the
/// second time.
///
/// # Errors
/// [`Docx2HtmlError::RewriteFailed`] when the HTML cannot be read or
/// written back.
pub fn relink_assets(html_path: &Path, destination_dir: &Path) -> Result<RelinkReport, Docx2HtmlError> {
    let io_err = |e| Docx2HtmlError::RewriteFailed {
        path: html_path.to_path_buf(),
        source: e,
    };

    let raw = std::fs::read(html_path).map_err(io_err)?;
    let html = String::from_utf8_lossy(&raw);
    let html_dir = html_path.parent().unwrap_or_else(|| Path::new("."));

    let mut report = RelinkReport::default();
    let mut sources: Vec<String> = Vec::new();

    let relinked = RE_START_TAG.replace_all(&html, |caps: &regex::Captures<'_>| {
        let tag = &caps[0];
        let mut out = String::with_capacity(tag.len() + 8);
        let mut cursor = 0;
        for attr in attributes(tag, tag_name_len(tag)) {
            if attr.name != "src" {
                continue;
            }
            let value = attr.value.trim();
            let path = src_path(value);
            let base = file_name(&path);
            if is_external_or_relinked(value) || matches!(base, "" | "." | "..") {
                continue;
            }
            let linked = format!("{IMAGES_DIR}/{}", utf8_percent_encode(base, SRC_ESCAPES));
            out.push_str(&tag[cursor..attr.value_span.start]);
            out.push_str(&linked);
            cursor = attr.value_span.end;
            report.rewritten += 1;
            sources.push(path.into_owned());
        }
        out.push_str(&tag[cursor..]);
        out
    });

    if report.rewritten > 0 {
        std::fs::write(html_path, relinked.as_bytes()).map_err(io_err)?;
    }

    for path in sources {
        adopt_sibling(html_dir, destination_dir, &path, &mut report);
    }

    info!(
        "Relinked {} image references ({} files moved into {}/)",
        report.rewritten,
        report.moved.len(),
        IMAGES_DIR
    );
    Ok(report)
}

/// Move the file at the decoded reference `path` (relative to the HTML)
/// into `destination_dir` unless a file with that basename is already there.
fn adopt_sibling(html_dir: &Path, destination_dir: &Path, path: &str, report: &mut RelinkReport) {
    let base = file_name(path);
    let target = destination_dir.join(base);
    if target.exists() {
        return;
    }

    let relative = Path::new(path);
    // Only files at or below the HTML's directory are adopted.
    if !relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return;
    }
    let candidate: PathBuf = html_dir.join(relative);
    if !candidate.is_file() {
        debug!("No local file for src {:?}; link left dangling", path);
        return;
    }

    let moved = std::fs::create_dir_all(destination_dir).and_then(|_| {
        std::fs::rename(&candidate, &target).or_else(|_| {
            std::fs::copy(&candidate, &target)?;
            std::fs::remove_file(&candidate)
        })
    });
    match moved {
        Ok(()) => {
            debug!("Moved {} → {}", candidate.display(), target.display());
            report.moved.push(base.to_string());
        }
        Err(e) => {
            warn!("Failed to move {} into images: {}", candidate.display(), e);
            report.warnings.push(StageWarning::AssetCopy {
                entry: path.to_string(),
                detail: e.to_string(),
            });
        }
    }
}
