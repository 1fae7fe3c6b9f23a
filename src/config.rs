//! Configuration types for DOCX-to-HTML conversion.
//!
//! All conversion behaviour is controlled through [`ConverterConfig`], built
//! via its [`ConverterConfigBuilder`]. The converter location, retention
//! window and every fixed string injected into the rewritten page live here
//! instead of in process-wide constants, so two converters with different
//! branding or retention can run side by side in one process.

use crate::error::Docx2HtmlError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default LibreOffice location on Linux distributions.
pub const DEFAULT_SOFFICE_PATH: &str = "/usr/bin/libreoffice";

/// Default retention window before a package and its source are deleted.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(600);

/// Default upper bound on a single converter run.
pub const DEFAULT_CONVERTER_TIMEOUT: Duration = Duration::from_secs(300);

/// Configuration for a DOCX-to-HTML conversion.
///
/// Built via [`ConverterConfig::builder()`] or using
/// [`ConverterConfig::default()`].
///
/// # Example
/// ```rust
/// use docx2html5::ConverterConfig;
/// use std::time::Duration;
///
/// let config = ConverterConfig::builder()
///     .soffice_path("/opt/libreoffice/program/soffice")
///     .retention(Duration::from_secs(300))
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConverterConfig {
    /// Path to the LibreOffice executable. Default: `/usr/bin/libreoffice`.
    pub soffice_path: PathBuf,

    /// Upper bound on a converter run. Default: 300 s. `None` waits forever.
    ///
    /// soffice can hang on malformed input or when another instance holds
    /// the user profile lock. The child is killed when the timeout expires.
    pub converter_timeout: Option<Duration>,

    /// How long the package stays on disk before the cleanup task removes
    /// it. Default: 600 s.
    pub retention: Duration,

    /// Remove the source document together with the output directory.
    /// Default: true (uploads are single-use).
    pub delete_source: bool,

    /// Parent directory for per-conversion output directories.
    /// Default: `None`, meaning the source document's own directory.
    pub output_root: Option<PathBuf>,

    /// Strings and class names injected by the markup rewriter.
    pub rewrite: RewriteOptions,

    /// Receives stage transitions and warnings as the pipeline runs.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            soffice_path: PathBuf::from(DEFAULT_SOFFICE_PATH),
            converter_timeout: Some(DEFAULT_CONVERTER_TIMEOUT),
            retention: DEFAULT_RETENTION,
            delete_source: true,
            output_root: None,
            rewrite: RewriteOptions::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConverterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterConfig")
            .field("soffice_path", &self.soffice_path)
            .field("converter_timeout", &self.converter_timeout)
            .field("retention", &self.retention)
            .field("delete_source", &self.delete_source)
            .field("output_root", &self.output_root)
            .field("rewrite", &self.rewrite)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConverterConfig {
    /// Create a new builder for `ConverterConfig`.
    pub fn builder() -> ConverterConfigBuilder {
        ConverterConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConverterConfig`].
#[derive(Debug)]
pub struct ConverterConfigBuilder {
    config: ConverterConfig,
}

impl ConverterConfigBuilder {
    pub fn soffice_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.soffice_path = path.into();
        self
    }

    pub fn converter_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.converter_timeout = timeout;
        self
    }

    pub fn converter_timeout_secs(mut self, secs: u64) -> Self {
        self.config.converter_timeout = Some(Duration::from_secs(secs));
        self
    }

    pub fn retention(mut self, retention: Duration) -> Self {
        self.config.retention = retention;
        self
    }

    pub fn retention_secs(mut self, secs: u64) -> Self {
        self.config.retention = Duration::from_secs(secs);
        self
    }

    pub fn delete_source(mut self, v: bool) -> Self {
        self.config.delete_source = v;
        self
    }

    pub fn output_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_root = Some(dir.into());
        self
    }

    pub fn rewrite(mut self, options: RewriteOptions) -> Self {
        self.config.rewrite = options;
        self
    }

    pub fn analytics_id(mut self, id: Option<String>) -> Self {
        self.config.rewrite.analytics_id = id;
        self
    }

    pub fn footer_text(mut self, text: impl Into<String>) -> Self {
        self.config.rewrite.footer_text = text.into();
        self
    }

    pub fn default_alt_text(mut self, text: impl Into<String>) -> Self {
        self.config.rewrite.default_alt_text = text.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConverterConfig, Docx2HtmlError> {
        let c = &self.config;
        if c.soffice_path.as_os_str().is_empty() {
            return Err(Docx2HtmlError::InvalidConfig(
                "Converter path must not be empty".into(),
            ));
        }
        if c.retention.is_zero() {
            return Err(Docx2HtmlError::InvalidConfig(
                "Retention must be greater than zero".into(),
            ));
        }
        if matches!(c.converter_timeout, Some(t) if t.is_zero()) {
            return Err(Docx2HtmlError::InvalidConfig(
                "Converter timeout must be greater than zero".into(),
            ));
        }
        c.rewrite.validate()?;
        Ok(self.config)
    }
}

/// Fixed markup injected by the rewriter.
///
/// Defaults reproduce the stock page: Bootstrap 5.3 from jsDelivr, a
/// Google tag, and the latest2all footer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteOptions {
    /// Stylesheet linked from the replacement `<head>`.
    pub stylesheet_href: String,
    /// Google Analytics measurement id. `None` omits the snippet.
    pub analytics_id: Option<String>,
    /// Copyright line rendered in the footer.
    pub footer_text: String,
    /// Alt text for images without an authored description.
    pub default_alt_text: String,
    /// Layout class ensured on `<body>`.
    pub body_class: String,
    /// Class ensured on every `<img>`.
    pub fluid_image_class: String,
    /// Extra class for images whose name starts with "shape".
    pub line_shape_class: String,
    /// Class of the `<div>` wrapped around each table.
    pub table_wrapper_class: String,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            stylesheet_href:
                "https://cdn.jsdelivr.net/npm/bootstrap@5.3.0/dist/css/bootstrap.min.css".into(),
            analytics_id: Some("G-P8LYBP9EDY".into()),
            footer_text: "© 2025 www.latest2all.com".into(),
            default_alt_text: "Illustration from the document".into(),
            body_class: "container".into(),
            fluid_image_class: "img-fluid".into(),
            line_shape_class: "img-line".into(),
            table_wrapper_class: "table-responsive".into(),
        }
    }
}

impl RewriteOptions {
    fn validate(&self) -> Result<(), Docx2HtmlError> {
        if self.default_alt_text.trim().is_empty() {
            return Err(Docx2HtmlError::InvalidConfig(
                "Default alt text must not be blank".into(),
            ));
        }
        let classes = [
            ("body_class", &self.body_class),
            ("fluid_image_class", &self.fluid_image_class),
            ("line_shape_class", &self.line_shape_class),
            ("table_wrapper_class", &self.table_wrapper_class),
        ];
        for (field, value) in classes {
            if value.trim().is_empty() || value.contains(char::is_whitespace) {
                return Err(Docx2HtmlError::InvalidConfig(format!(
                    "{field} must be a single non-empty class name, got {value:?}"
                )));
            }
        }
        Ok(())
    }
}
