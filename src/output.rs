//! Result types returned by a successful conversion.

use crate::error::StageWarning;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Where a conversion currently stands.
///
/// Transitions are strictly sequential in declaration order; `Failed` is
/// reachable from any state and is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason")]
pub enum PipelineState {
    Received,
    NamespacesExtracted,
    AltTextExtracted,
    Converted,
    Rewritten,
    AssetsRelinked,
    Packaged,
    CleanupScheduled,
    Failed(String),
}

impl PipelineState {
    /// Whether no further transition can follow this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::CleanupScheduled | PipelineState::Failed(_))
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Received => f.write_str("received"),
            PipelineState::NamespacesExtracted => f.write_str("namespaces extracted"),
            PipelineState::AltTextExtracted => f.write_str("alt text extracted"),
            PipelineState::Converted => f.write_str("converted"),
            PipelineState::Rewritten => f.write_str("rewritten"),
            PipelineState::AssetsRelinked => f.write_str("assets relinked"),
            PipelineState::Packaged => f.write_str("packaged"),
            PipelineState::CleanupScheduled => f.write_str("cleanup scheduled"),
            PipelineState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// The downloadable result of one conversion.
///
/// Everything under `output_dir` (including `package_path`) is deleted once
/// `expires_at` passes, whether or not the package was downloaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionPackage {
    /// The ZIP archive to hand to the user.
    pub package_path: PathBuf,
    /// Per-conversion directory holding the package, HTML and images.
    pub output_dir: PathBuf,
    /// The rewritten HTML file.
    pub html_path: PathBuf,
    /// Folder the images were re-homed into.
    pub images_dir: PathBuf,
    /// Basenames of every file placed in `images_dir`, sorted.
    pub images: Vec<String>,
    /// Non-fatal problems hit along the way.
    pub warnings: Vec<StageWarning>,
    /// Every state the pipeline passed through, in order.
    pub states: Vec<PipelineState>,
    pub stats: ConversionStats,
    pub created_at: DateTime<Utc>,
    /// When the cleanup task removes the output directory.
    pub expires_at: DateTime<Utc>,
}

impl ConversionPackage {
    /// File name offered to the browser as the attachment name.
    pub fn download_name(&self) -> String {
        self.package_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "package.zip".to_string())
    }
}

/// Counters gathered across the pipeline stages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Namespace declarations found in `word/document.xml`.
    pub namespaces: usize,
    /// Images with an authored description in the source document.
    pub alt_texts: usize,
    /// `<img>` tags seen by the rewriter.
    pub images_rewritten: usize,
    /// `<img>` tags whose alt text came from the document.
    pub images_described: usize,
    /// `<img>` tags tagged as line shapes.
    pub line_shapes: usize,
    /// Tables wrapped for horizontal scrolling.
    pub tables_wrapped: usize,
    /// Files copied out of `word/media/`.
    pub assets_extracted: usize,
    /// `src` attributes re-pointed at `images/`.
    pub sources_relinked: usize,
    /// Entries written to the package (directories included).
    pub package_entries: usize,
    pub package_bytes: u64,
    pub converter_duration_ms: u64,
    pub total_duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(PipelineState::CleanupScheduled.is_terminal());
        assert!(PipelineState::Failed("x".into()).is_terminal());
        assert!(!PipelineState::Rewritten.is_terminal());
    }

    #[test]
    fn failed_state_display_includes_reason() {
        let s = PipelineState::Failed("converter crashed".into());
        assert_eq!(s.to_string(), "failed: converter crashed");
    }

    #[test]
    fn state_serialises_with_tag() {
        let json = serde_json::to_string(&PipelineState::Packaged).unwrap();
        assert_eq!(json, r#"{"state":"Packaged"}"#);
    }
}
