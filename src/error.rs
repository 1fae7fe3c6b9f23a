//! Error types for the docx2html5 library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Docx2HtmlError`] — **Fatal**: the conversion cannot produce a
//!   package at all (missing input, missing converter, converter crash,
//!   unwritable HTML, failed archive). Returned as `Err(Docx2HtmlError)` from
//!   [`crate::Converter::convert`].
//!
//! * [`StageWarning`] — **Non-fatal**: a stage degraded but the package is
//!   still valid (alt-text could not be read, one image failed to copy).
//!   Stored inside [`crate::output::ConversionPackage`] so callers can see
//!   what was lost without losing the whole conversion.

use std::path::PathBuf;
use thiserror::Error;

/// Prefix used by [`Docx2HtmlError::user_message`].
///
/// Front ends that only relay strings can branch on this prefix; a package
/// path never starts with it.
pub const ERROR_PREFIX: &str = "Error: ";

/// All fatal errors returned by the docx2html5 library.
///
/// Stage-level degradations use [`StageWarning`] and are stored in
/// [`crate::output::ConversionPackage`] rather than propagated here.
#[derive(Debug, Error)]
pub enum Docx2HtmlError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Source document was not found at the given path.
    #[error("File '{path}' not found.")]
    SourceNotFound { path: PathBuf },

    /// Process does not have read permission on the source document.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    // ── Converter errors ──────────────────────────────────────────────────
    /// The external converter executable does not exist.
    #[error("LibreOffice not found at '{path}'.\nInstall LibreOffice or pass --soffice <PATH>.")]
    ConverterNotFound { path: PathBuf },

    /// The converter exists but could not be started.
    #[error("Failed to start converter '{path}': {source}")]
    ConverterSpawnFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The converter exited with a non-zero status.
    #[error("Conversion failed ({status}): {stderr}")]
    ConverterFailed { status: String, stderr: String },

    /// The converter did not finish within the configured timeout.
    #[error("Converter timed out after {secs}s\nIncrease --timeout or check for a stuck soffice instance.")]
    ConverterTimeout { secs: u64 },

    /// The converter exited successfully but wrote no HTML file.
    #[error("Conversion failed. HTML file not created: '{expected}'")]
    ConverterOutputMissing { expected: PathBuf },

    // ── Rewrite errors ────────────────────────────────────────────────────
    /// The rewriter was handed something that is not an HTML file.
    #[error("The provided file is not an HTML file: '{path}'")]
    NotHtml { path: PathBuf },

    /// Reading, rewriting or writing back the HTML failed.
    #[error("Error processing HTML file '{path}': {source}")]
    RewriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The per-conversion output directory could not be created.
    #[error("Failed to create output directory '{path}': {source}")]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Building the ZIP package failed; no partial archive is left behind.
    #[error("Failed to write package '{path}': {detail}")]
    PackagingFailed { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Docx2HtmlError {
    /// Human-readable message for front ends, always starting with
    /// [`ERROR_PREFIX`].
    pub fn user_message(&self) -> String {
        format!("{ERROR_PREFIX}{self}")
    }

    /// True for failures caused by the external converter rather than by
    /// this crate's own stages.
    pub fn is_converter_error(&self) -> bool {
        matches!(
            self,
            Docx2HtmlError::ConverterNotFound { .. }
                | Docx2HtmlError::ConverterSpawnFailed { .. }
                | Docx2HtmlError::ConverterFailed { .. }
                | Docx2HtmlError::ConverterTimeout { .. }
                | Docx2HtmlError::ConverterOutputMissing { .. }
        )
    }
}

/// A non-fatal degradation recorded while building a package.
///
/// The conversion continues; the resulting HTML simply has less metadata
/// (default alt text) or fewer images than the source document.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum StageWarning {
    /// Namespace declarations could not be read from `word/document.xml`.
    #[error("Could not extract namespaces: {detail}")]
    NamespaceExtraction { detail: String },

    /// Alt-text descriptions could not be read; defaults will be used.
    #[error("Failed to extract alt text from DOCX: {detail}")]
    AltTextExtraction { detail: String },

    /// A single media entry could not be copied out of the archive.
    #[error("Failed to extract image '{entry}': {detail}")]
    AssetCopy { entry: String, detail: String },
}
