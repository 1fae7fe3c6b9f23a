//! External converter invocation: LibreOffice in headless mode.
//!
//! ```text
//! soffice --headless --convert-to html --outdir <output_dir> <document>
//! ```
//!
//! soffice is an opaque tool with two awkward habits this module guards
//! against: it can exit 0 without writing anything (malformed input), and it
//! can hang forever (profile lock held by another instance). The first is
//! reported as [`Docx2HtmlError::ConverterOutputMissing`], the second is
//! bounded by an optional timeout after which the child is killed.

use crate::error::Docx2HtmlError;
use crate::pipeline::input::source_stem;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Path of the HTML file soffice writes for `document` into `output_dir`.
pub fn expected_output(document: &Path, output_dir: &Path) -> PathBuf {
    output_dir.join(format!("{}.html", source_stem(document)))
}

/// Arguments passed to the converter, without the executable.
pub fn converter_args(document: &Path, output_dir: &Path) -> Vec<std::ffi::OsString> {
    vec![
        "--headless".into(),
        "--convert-to".into(),
        "html".into(),
        "--outdir".into(),
        output_dir.as_os_str().to_owned(),
        document.as_os_str().to_owned(),
    ]
}

/// Check the converter executable is present before doing any work.
pub fn check_converter(soffice: &Path) -> Result<(), Docx2HtmlError> {
    if soffice.is_file() {
        Ok(())
    } else {
        Err(Docx2HtmlError::ConverterNotFound {
            path: soffice.to_path_buf(),
        })
    }
}

/// Run the converter and return the path of the produced HTML file.
///
/// # Errors
/// * [`Docx2HtmlError::SourceNotFound`] / [`Docx2HtmlError::ConverterNotFound`]
///   when a precondition fails (nothing is spawned)
/// * [`Docx2HtmlError::ConverterFailed`] on a non-zero exit, carrying stderr
///   (or stdout when stderr is empty)
/// * [`Docx2HtmlError::ConverterTimeout`] when `timeout` expires
/// * [`Docx2HtmlError::ConverterOutputMissing`] when the exit is clean but no
///   `<stem>.html` appeared
pub async fn convert(
    soffice: &Path,
    document: &Path,
    output_dir: &Path,
    timeout: Option<Duration>,
) -> Result<PathBuf, Docx2HtmlError> {
    if !document.exists() {
        return Err(Docx2HtmlError::SourceNotFound {
            path: document.to_path_buf(),
        });
    }
    check_converter(soffice)?;

    let mut cmd = Command::new(soffice);
    cmd.args(converter_args(document, output_dir))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    info!("Running converter: {}", soffice.display());
    debug!("Converter args: {:?}", converter_args(document, output_dir));

    let run = cmd.output();
    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, run)
            .await
            .map_err(|_| Docx2HtmlError::ConverterTimeout {
                secs: limit.as_secs(),
            })?,
        None => run.await,
    }
    .map_err(|e| Docx2HtmlError::ConverterSpawnFailed {
        path: soffice.to_path_buf(),
        source: e,
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let diagnostic = if stderr.is_empty() {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        } else {
            stderr
        };
        return Err(Docx2HtmlError::ConverterFailed {
            status: output.status.to_string(),
            stderr: diagnostic,
        });
    }

    let html = expected_output(document, output_dir);
    if !html.is_file() {
        return Err(Docx2HtmlError::ConverterOutputMissing { expected: html });
    }

    info!("Converter produced {}", html.display());
    Ok(html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_output_uses_stem() {
        let out = expected_output(Path::new("/up/My Report.docx"), Path::new("/out"));
        assert_eq!(out, PathBuf::from("/out/My Report.html"));
    }

    #[test]
    fn args_are_headless_html() {
        let args = converter_args(Path::new("in.docx"), Path::new("out"));
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            ["--headless", "--convert-to", "html", "--outdir", "out", "in.docx"]
        );
    }

    #[test]
    fn missing_converter_detected() {
        let err = check_converter(Path::new("/no/such/soffice")).unwrap_err();
        assert!(matches!(err, Docx2HtmlError::ConverterNotFound { .. }));
    }

    #[tokio::test]
    async fn missing_source_checked_before_converter() {
        let err = convert(
            Path::new("/no/such/soffice"),
            Path::new("/no/such/doc.docx"),
            Path::new("/tmp"),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Docx2HtmlError::SourceNotFound { .. }));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("fake-soffice");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn source(dir: &Path) -> PathBuf {
            let path = dir.join("doc.docx");
            std::fs::write(&path, b"PK").unwrap();
            path
        }

        #[tokio::test]
        async fn non_zero_exit_carries_diagnostics() {
            let dir = tempfile::tempdir().unwrap();
            let soffice = script(dir.path(), "echo 'Error: source file could not be loaded' >&2\nexit 3");
            let err = convert(&soffice, &source(dir.path()), dir.path(), None)
                .await
                .unwrap_err();
            match err {
                Docx2HtmlError::ConverterFailed { stderr, .. } => {
                    assert!(stderr.contains("could not be loaded"), "got: {stderr}")
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[tokio::test]
        async fn clean_exit_without_output_is_distinct() {
            let dir = tempfile::tempdir().unwrap();
            let soffice = script(dir.path(), "exit 0");
            let err = convert(&soffice, &source(dir.path()), dir.path(), None)
                .await
                .unwrap_err();
            assert!(matches!(err, Docx2HtmlError::ConverterOutputMissing { .. }));
        }

        #[tokio::test]
        async fn slow_converter_times_out() {
            let dir = tempfile::tempdir().unwrap();
            let soffice = script(dir.path(), "sleep 5");
            let err = convert(
                &soffice,
                &source(dir.path()),
                dir.path(),
                Some(Duration::from_millis(200)),
            )
            .await
            .unwrap_err();
            assert!(matches!(err, Docx2HtmlError::ConverterTimeout { .. }));
        }

        #[tokio::test]
        async fn produced_html_is_returned() {
            let dir = tempfile::tempdir().unwrap();
            let soffice = script(dir.path(), r#"echo '<html></html>' > "$5/doc.html""#);
            let html = convert(&soffice, &source(dir.path()), dir.path(), None)
                .await
                .unwrap();
            assert_eq!(html, dir.path().join("doc.html"));
        }
    }
}
