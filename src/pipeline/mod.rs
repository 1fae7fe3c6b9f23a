//! Pipeline stages for DOCX-to-HTML conversion.
//!
//! Each submodule implements exactly one transformation step and can be
//! tested without the others. [`crate::convert`] sequences them.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ metadata ──▶ soffice ──▶ rewrite ──▶ assets ──▶ package
//! (checks)  (alt text)   (HTML)      (markup)    (images/)   (ZIP)
//! ```
//!
//! 1. [`input`]    — validate the source, create the per-conversion directory
//! 2. [`metadata`] — namespace table and alt-text index from `word/document.xml`
//! 3. [`soffice`]  — headless LibreOffice run, the only stage with a subprocess
//! 4. [`rewrite`]  — six markup passes making the page responsive and accessible
//! 5. [`assets`]   — copy `word/media/*` into `images/` and re-point every `src`
//! 6. [`package`]  — ZIP the HTML and `images/`

pub mod assets;
pub mod input;
pub mod metadata;
pub mod package;
pub mod rewrite;
pub mod soffice;
