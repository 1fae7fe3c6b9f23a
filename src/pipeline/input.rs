//! Input validation and per-conversion output directories.
//!
//! Every conversion gets its own directory named after the source file, the
//! local time and a short random id:
//!
//! ```text
//! report_20250314_101502_9f3a1c2e/
//! ```
//!
//! The timestamp keeps directories human-sortable; the id makes two
//! conversions of the same file within the same second land in different
//! places, so concurrent conversions never share mutable state.

use crate::error::Docx2HtmlError;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Check that the source document exists and is readable.
pub fn validate_source(path: &Path) -> Result<(), Docx2HtmlError> {
    if !path.exists() {
        return Err(Docx2HtmlError::SourceNotFound {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(f) => {
            let is_file = f.metadata().map(|m| m.is_file()).unwrap_or(false);
            if !is_file {
                return Err(Docx2HtmlError::SourceNotFound {
                    path: path.to_path_buf(),
                });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Docx2HtmlError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(Docx2HtmlError::SourceNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    debug!("Validated source document: {}", path.display());
    Ok(())
}

/// File stem of the source, falling back to `document` for odd paths.
pub fn source_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string())
}

/// Directory name for one conversion of `source` started at `now`.
pub fn output_dir_name(source: &Path, now: DateTime<Local>, id: Uuid) -> String {
    let simple = id.simple().to_string();
    format!(
        "{}_{}_{}",
        source_stem(source),
        now.format("%Y%m%d_%H%M%S"),
        &simple[..8]
    )
}

/// Create a fresh output directory for `source`.
///
/// Placed under `root` when given, otherwise next to the source document.
pub fn create_output_dir(source: &Path, root: Option<&Path>) -> Result<PathBuf, Docx2HtmlError> {
    let parent = match root {
        Some(r) => r.to_path_buf(),
        None => source
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    let dir = parent.join(output_dir_name(source, Local::now(), Uuid::new_v4()));

    std::fs::create_dir_all(&dir).map_err(|e| Docx2HtmlError::OutputDirFailed {
        path: dir.clone(),
        source: e,
    })?;

    debug!("Output directory created: {}", dir.display());
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn missing_source_is_reported() {
        let err = validate_source(Path::new("/definitely/not/here.docx")).unwrap_err();
        assert!(matches!(err, Docx2HtmlError::SourceNotFound { .. }));
    }

    #[test]
    fn directory_is_not_a_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_source(dir.path()).unwrap_err();
        assert!(matches!(err, Docx2HtmlError::SourceNotFound { .. }));
    }

    #[test]
    fn existing_file_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.docx");
        std::fs::write(&path, b"PK").unwrap();
        assert!(validate_source(&path).is_ok());
    }

    #[test]
    fn dir_name_has_stem_timestamp_and_id() {
        let now = Local.with_ymd_and_hms(2025, 3, 14, 10, 15, 2).unwrap();
        let id = Uuid::parse_str("9f3a1c2e-0000-4000-8000-000000000000").unwrap();
        let name = output_dir_name(Path::new("/up/report.docx"), now, id);
        assert_eq!(name, "report_20250314_101502_9f3a1c2e");
    }

    #[test]
    fn same_second_conversions_do_not_collide() {
        let now = Local.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let a = output_dir_name(Path::new("a.docx"), now, Uuid::new_v4());
        let b = output_dir_name(Path::new("a.docx"), now, Uuid::new_v4());
        assert_ne!(a, b);
    }

    #[test]
    fn output_dir_created_under_root() {
        let root = tempfile::tempdir().unwrap();
        let dir = create_output_dir(Path::new("/elsewhere/doc.docx"), Some(root.path())).unwrap();
        assert!(dir.is_dir());
        assert!(dir.starts_with(root.path()));
        assert!(dir
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("doc_"));
    }
}
