//! ZIP packaging of a finished conversion.
//!
//! The archive holds exactly what a browser needs to render the page:
//!
//! ```text
//! report.html
//! images/
//! images/image1.png
//! ```
//!
//! Entry names are relative to the output directory with `/` separators, so
//! no absolute path from the server ever leaks into the archive. The archive
//! is built under a `.part` name and renamed into place, which means a
//! reader never observes a half-written package and the package never
//! includes itself.

use crate::error::Docx2HtmlError;
use crate::pipeline::assets::IMAGES_DIR;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::result::{ZipError, ZipResult};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Suffix of the package file, appended to the output directory's name.
pub const PACKAGE_SUFFIX: &str = "_package.zip";

/// What went into the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageReport {
    pub path: PathBuf,
    /// Number of entries, directory entries included.
    pub entries: usize,
    /// Size of the finished archive on disk.
    pub bytes: u64,
}

/// `<output_dir>/<dirname>_package.zip`.
pub fn package_path_for(output_dir: &Path) -> PathBuf {
    let name = output_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    output_dir.join(format!("{name}{PACKAGE_SUFFIX}"))
}

/// Zip `html_path` and the `images/` folder of `output_dir` into
/// `package_path`.
///
/// # Errors
/// [`Docx2HtmlError::PackagingFailed`]; the partial archive is removed.
pub fn package(
    output_dir: &Path,
    html_path: &Path,
    package_path: &Path,
) -> Result<PackageReport, Docx2HtmlError> {
    let failed = |detail: String| Docx2HtmlError::PackagingFailed {
        path: package_path.to_path_buf(),
        detail,
    };

    let mut part = package_path.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);

    let entries = match write_archive(output_dir, html_path, package_path, &part) {
        Ok(n) => n,
        Err(e) => {
            warn!("Packaging failed, removing {}", part.display());
            let _ = std::fs::remove_file(&part);
            return Err(failed(e.to_string()));
        }
    };

    if let Err(e) = std::fs::rename(&part, package_path) {
        let _ = std::fs::remove_file(&part);
        return Err(failed(e.to_string()));
    }

    let bytes = std::fs::metadata(package_path)
        .map(|m| m.len())
        .map_err(|e| failed(e.to_string()))?;

    info!(
        "Packaged {} entries into {} ({} bytes)",
        entries,
        package_path.display(),
        bytes
    );
    Ok(PackageReport {
        path: package_path.to_path_buf(),
        entries,
        bytes,
    })
}

fn write_archive(output_dir: &Path, html_path: &Path, package_path: &Path, part: &Path) -> ZipResult<usize> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(BufWriter::new(File::create(part)?));
    let mut entries = 0usize;

    // ── HTML at the root ─────────────────────────────────────────────────
    zip.start_file(entry_name(output_dir, html_path)?, options)?;
    io::copy(&mut File::open(html_path)?, &mut zip)?;
    entries += 1;

    // ── images/ subtree ──────────────────────────────────────────────────
    let images = output_dir.join(IMAGES_DIR);
    zip.add_directory(format!("{IMAGES_DIR}/"), options)?;
    entries += 1;

    if images.is_dir() {
        for item in WalkDir::new(&images).min_depth(1).sort_by_file_name() {
            let item = item.map_err(|e| ZipError::Io(e.into()))?;
            let path = item.path();
            if path == package_path || path == part {
                continue;
            }
            let name = entry_name(output_dir, path)?;
            if item.file_type().is_dir() {
                zip.add_directory(format!("{name}/"), options)?;
            } else {
                zip.start_file(name.as_str(), options)?;
                io::copy(&mut File::open(path)?, &mut zip)?;
            }
            debug!("Added {}", name);
            entries += 1;
        }
    }

    zip.finish()?.flush()?;
    Ok(entries)
}

/// Archive name of `path`: relative to `output_dir`, `/`-separated.
fn entry_name(output_dir: &Path, path: &Path) -> ZipResult<String> {
    let relative = path.strip_prefix(output_dir).map_err(|_| {
        ZipError::Io(io::Error::other(format!(
            "{} is outside {}",
            path.display(),
            output_dir.display()
        )))
    })?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    fn names(zip_path: &Path) -> Vec<String> {
        let archive = ZipArchive::new(File::open(zip_path).unwrap()).unwrap();
        archive.file_names().map(str::to_string).collect()
    }

    fn setup() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("doc_20250101_000000_abcdef12");
        std::fs::create_dir_all(out.join("images")).unwrap();
        let html = out.join("doc.html");
        std::fs::write(&html, "<html><body><img src=\"images/a.png\"></body></html>").unwrap();
        (root, out, html)
    }

    #[test]
    fn package_name_derives_from_dir() {
        let p = package_path_for(Path::new("/tmp/doc_20250101_000000_abcdef12"));
        assert_eq!(
            p,
            PathBuf::from("/tmp/doc_20250101_000000_abcdef12/doc_20250101_000000_abcdef12_package.zip")
        );
    }

    #[test]
    fn archive_holds_html_and_images() {
        let (_root, out, html) = setup();
        std::fs::write(out.join("images/a.png"), b"png").unwrap();
        std::fs::write(out.join("stray.txt"), b"not packaged").unwrap();
        let zip_path = package_path_for(&out);

        let report = package(&out, &html, &zip_path).unwrap();

        let mut got = names(&zip_path);
        got.sort();
        assert_eq!(got, ["doc.html", "images/", "images/a.png"]);
        assert_eq!(report.entries, 3);
        assert!(report.bytes > 0);
        assert!(!out.join(format!("{}.part", zip_path.display())).exists());
    }

    #[test]
    fn empty_images_dir_survives() {
        let (_root, out, html) = setup();
        let zip_path = package_path_for(&out);
        package(&out, &html, &zip_path).unwrap();
        assert!(names(&zip_path).contains(&"images/".to_string()));
    }

    #[test]
    fn archive_never_contains_itself() {
        let (_root, out, html) = setup();
        let zip_path = out.join("images").join("self.zip");
        package(&out, &html, &zip_path).unwrap();
        let got = names(&zip_path);
        assert!(!got.iter().any(|n| n.ends_with(".zip") || n.ends_with(".part")));
    }

    #[test]
    fn no_absolute_paths_in_entries() {
        let (_root, out, html) = setup();
        std::fs::create_dir_all(out.join("images/nested")).unwrap();
        std::fs::write(out.join("images/nested/b.gif"), b"gif").unwrap();
        let zip_path = package_path_for(&out);
        package(&out, &html, &zip_path).unwrap();
        for name in names(&zip_path) {
            assert!(!name.starts_with('/'), "absolute entry: {name}");
            assert!(!name.contains('\\'));
        }
    }

    #[test]
    fn html_content_is_preserved() {
        let (_root, out, html) = setup();
        let zip_path = package_path_for(&out);
        package(&out, &html, &zip_path).unwrap();
        let mut archive = ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        let mut body = String::new();
        archive
            .by_name("doc.html")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert!(body.contains("images/a.png"));
    }

    #[test]
    fn missing_html_leaves_no_partial_archive() {
        let (_root, out, _html) = setup();
        let zip_path = package_path_for(&out);
        let err = package(&out, &out.join("gone.html"), &zip_path).unwrap_err();
        assert!(matches!(err, Docx2HtmlError::PackagingFailed { .. }));
        assert!(!zip_path.exists());
        let leftovers: Vec<_> = std::fs::read_dir(&out)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
