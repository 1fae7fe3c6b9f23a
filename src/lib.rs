//! # docx2html5
//!
//! Convert Word documents (DOCX) into responsive, accessible HTML5 pages,
//! packaged as a single ZIP download.
//!
//! LibreOffice does the heavy lifting of turning the document into HTML.
//! Its output is pixel-exact and ignores the alternate text authors type
//! for images, so this crate rewrites it: fluid images and tables, a
//! mobile-friendly head, and `alt` attributes recovered from the DOCX
//! itself.
//!
//! ## Pipeline Overview
//!
//! ```text
//! DOCX
//!  │
//!  ├─ 1. Metadata  namespace table + alt-text index from word/document.xml
//!  ├─ 2. Convert   soffice --headless --convert-to html (subprocess, timeout)
//!  ├─ 3. Rewrite   head, body class, dimensions, img alt/class, tables, footer
//!  ├─ 4. Assets    word/media/* → images/, every src → images/<basename>
//!  ├─ 5. Package   HTML + images/ → <dir>_package.zip
//!  └─ 6. Cleanup   output directory (and upload) removed after retention
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docx2html5::{Converter, ConverterConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConverterConfig::builder()
//!         .soffice_path("/usr/bin/soffice")
//!         .delete_source(false)
//!         .build()?;
//!     let converter = Converter::new(config);
//!     let package = converter.convert("report.docx").await?;
//!     println!("{}", package.package_path.display());
//!     eprintln!(
//!         "{} images, {} described, expires {}",
//!         package.stats.images_rewritten, package.stats.images_described, package.expires_at
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docx2html5` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docx2html5 = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cleanup;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod template;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cleanup::{schedule_cleanup, CleanupHandle, CleanupOutcome, CleanupReport, CleanupScheduler};
pub use config::{ConverterConfig, ConverterConfigBuilder, RewriteOptions};
pub use convert::{convert, Converter};
pub use error::{Docx2HtmlError, StageWarning, ERROR_PREFIX};
pub use output::{ConversionPackage, ConversionStats, PipelineState};
pub use pipeline::metadata::{AltTextIndex, NamespaceTable};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
