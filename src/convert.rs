//! The conversion pipeline: one DOCX in, one ZIP package out.
//!
//! ```text
//! Received ─▶ NamespacesExtracted ─▶ AltTextExtracted ─▶ Converted ─▶
//! Rewritten ─▶ AssetsRelinked ─▶ Packaged ─▶ CleanupScheduled
//!                       (any state) ─▶ Failed(reason)
//! ```
//!
//! Stages run strictly in sequence. The converter subprocess is awaited on
//! the runtime; every stage that touches the filesystem or the DOCX archive
//! runs in `spawn_blocking` so concurrent conversions never stall the
//! runtime's worker threads.
//!
//! ## Failure policy
//!
//! Preconditions (source present and readable, converter installed) are
//! checked before anything is written. Once the output directory exists, a
//! failure schedules that directory for the normal retention cleanup and
//! returns the error; the source document is left in place and no partial
//! package is ever returned.

use crate::cleanup::CleanupScheduler;
use crate::config::ConverterConfig;
use crate::error::{Docx2HtmlError, StageWarning};
use crate::output::{ConversionPackage, ConversionStats, PipelineState};
use crate::pipeline::assets::{self, IMAGES_DIR};
use crate::pipeline::metadata::{self, AltTextIndex, NamespaceTable};
use crate::pipeline::{input, package, rewrite, soffice};
use crate::progress::ProgressCallback;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Runs conversions and owns the cleanup tasks they schedule.
///
/// A single `Converter` is meant to be shared by a front end for its whole
/// lifetime; call [`CleanupScheduler::flush_all`] on
/// [`Converter::cleanup`] at shutdown to reclaim disk space immediately.
///
/// # Example
/// ```rust,no_run
/// use docx2html5::{Converter, ConverterConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let converter = Converter::new(ConverterConfig::default());
/// let package = converter.convert("uploads/report.docx").await?;
/// println!("download: {}", package.package_path.display());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Converter {
    config: ConverterConfig,
    cleanup: CleanupScheduler,
}

impl Converter {
    pub fn new(config: ConverterConfig) -> Self {
        Self {
            config,
            cleanup: CleanupScheduler::new(),
        }
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Pending deletions scheduled by this converter.
    pub fn cleanup(&self) -> &CleanupScheduler {
        &self.cleanup
    }

    /// Convert `source` into a downloadable package.
    ///
    /// # Errors
    /// Any [`Docx2HtmlError`]; non-fatal degradations are returned as
    /// [`ConversionPackage::warnings`] instead.
    pub async fn convert(&self, source: impl AsRef<Path>) -> Result<ConversionPackage, Docx2HtmlError> {
        let total_start = Instant::now();
        let source = source.as_ref().to_path_buf();
        let mut tracker = StageTracker::new(self.config.progress_callback.clone());
        tracker.start(&source);

        // ── Step 1: Preconditions ────────────────────────────────────────
        if let Err(e) = input::validate_source(&source)
            .and_then(|_| soffice::check_converter(&self.config.soffice_path))
        {
            return Err(tracker.fail(e));
        }

        // ── Step 2: Namespace table ──────────────────────────────────────
        let doc = source.clone();
        let namespaces = match run_blocking(move || metadata::try_extract_namespaces(&doc)).await {
            Ok(Ok(table)) => table,
            Ok(Err(e)) => {
                tracker.warn(StageWarning::NamespaceExtraction {
                    detail: e.to_string(),
                });
                NamespaceTable::new()
            }
            Err(e) => return Err(tracker.fail(e)),
        };
        tracker.advance(PipelineState::NamespacesExtracted);

        // ── Step 3: Alt-text index ───────────────────────────────────────
        let doc = source.clone();
        let ns = namespaces.clone();
        let alt_texts = match run_blocking(move || metadata::try_extract_alt_text(&doc, &ns)).await {
            Ok(Ok(index)) => index,
            Ok(Err(e)) => {
                tracker.warn(StageWarning::AltTextExtraction {
                    detail: e.to_string(),
                });
                AltTextIndex::new()
            }
            Err(e) => return Err(tracker.fail(e)),
        };
        tracker.advance(PipelineState::AltTextExtracted);

        // ── Step 4: Output directory ─────────────────────────────────────
        let output_dir = match input::create_output_dir(&source, self.config.output_root.as_deref()) {
            Ok(dir) => dir,
            Err(e) => return Err(tracker.fail(e)),
        };

        let mut stats = ConversionStats {
            namespaces: namespaces.len(),
            alt_texts: alt_texts.len(),
            ..ConversionStats::default()
        };

        // ── Steps 5–8: Convert, rewrite, relink, package ─────────────────
        let built = self
            .build_package(&source, &output_dir, alt_texts, &mut stats, &mut tracker)
            .await;
        let (html_path, package_path, images) = match built {
            Ok(parts) => parts,
            Err(e) => {
                warn!(
                    "Conversion of {} failed; {} kept until retention expires",
                    source.display(),
                    output_dir.display()
                );
                self.cleanup
                    .schedule(output_dir, None, self.config.retention);
                return Err(tracker.fail(e));
            }
        };

        // ── Step 9: Deferred cleanup ─────────────────────────────────────
        let created_at = Utc::now();
        let expires_at = self.cleanup.schedule(
            output_dir.clone(),
            self.config.delete_source.then(|| source.clone()),
            self.config.retention,
        );
        tracker.advance(PipelineState::CleanupScheduled);

        stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
        info!(
            "Conversion complete: {} → {} ({}ms)",
            source.display(),
            package_path.display(),
            stats.total_duration_ms
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_conversion_complete(&package_path);
        }

        let (states, warnings) = tracker.finish();
        Ok(ConversionPackage {
            package_path,
            images_dir: output_dir.join(IMAGES_DIR),
            output_dir,
            html_path,
            images,
            warnings,
            states,
            stats,
            created_at,
            expires_at,
        })
    }

    /// Every stage that writes into `output_dir`.
    ///
    /// Returns the HTML path, the package path and the sorted image names.
    async fn build_package(
        &self,
        source: &Path,
        output_dir: &Path,
        alt_texts: AltTextIndex,
        stats: &mut ConversionStats,
        tracker: &mut StageTracker,
    ) -> Result<(PathBuf, PathBuf, Vec<String>), Docx2HtmlError> {
        // ── Convert ──────────────────────────────────────────────────────
        let convert_start = Instant::now();
        let html_path = soffice::convert(
            &self.config.soffice_path,
            source,
            output_dir,
            self.config.converter_timeout,
        )
        .await?;
        stats.converter_duration_ms = convert_start.elapsed().as_millis() as u64;
        tracker.advance(PipelineState::Converted);

        // ── Rewrite ──────────────────────────────────────────────────────
        let html = html_path.clone();
        let options = self.config.rewrite.clone();
        let report = run_blocking(move || rewrite::rewrite(&html, &alt_texts, &options)).await??;
        stats.images_rewritten = report.images;
        stats.images_described = report.described;
        stats.line_shapes = report.line_shapes;
        stats.tables_wrapped = report.tables_wrapped;
        tracker.advance(PipelineState::Rewritten);

        // ── Extract + relink assets ──────────────────────────────────────
        let doc = source.to_path_buf();
        let html = html_path.clone();
        let images_dir = output_dir.join(IMAGES_DIR);
        let (extracted, relinked, images) = run_blocking(move || {
            let extracted = assets::extract_assets(&doc, &images_dir);
            let relinked = assets::relink_assets(&html, &images_dir)?;
            let images = list_images(&images_dir);
            Ok::<_, Docx2HtmlError>((extracted, relinked, images))
        })
        .await??;
        stats.assets_extracted = extracted.files.len();
        stats.sources_relinked = relinked.rewritten;
        for w in extracted.warnings.into_iter().chain(relinked.warnings) {
            tracker.warn(w);
        }
        tracker.advance(PipelineState::AssetsRelinked);

        // ── Package ──────────────────────────────────────────────────────
        let dir = output_dir.to_path_buf();
        let html = html_path.clone();
        let package_path = package::package_path_for(output_dir);
        let target = package_path.clone();
        let packaged = run_blocking(move || package::package(&dir, &html, &target)).await??;
        stats.package_entries = packaged.entries;
        stats.package_bytes = packaged.bytes;
        tracker.advance(PipelineState::Packaged);

        Ok((html_path, package_path, images))
    }
}

/// One-shot conversion with a throwaway [`Converter`].
///
/// The scheduled cleanup keeps running on the current runtime after this
/// returns.
pub async fn convert(
    source: impl AsRef<Path>,
    config: &ConverterConfig,
) -> Result<ConversionPackage, Docx2HtmlError> {
    Converter::new(config.clone()).convert(source).await
}

async fn run_blocking<T, F>(f: F) -> Result<T, Docx2HtmlError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Docx2HtmlError::Internal(format!("Pipeline task panicked: {}", e)))
}

/// Sorted basenames of the files in `images_dir`.
fn list_images(images_dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(images_dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

// ── State tracking ───────────────────────────────────────────────────────────

/// Records the state trace and warnings, mirroring both to `tracing` and
/// the progress callback.
struct StageTracker {
    states: Vec<PipelineState>,
    warnings: Vec<StageWarning>,
    callback: Option<ProgressCallback>,
}

impl StageTracker {
    fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            states: Vec::with_capacity(8),
            warnings: Vec::new(),
            callback,
        }
    }

    fn start(&mut self, source: &Path) {
        info!("Starting conversion: {}", source.display());
        if let Some(ref cb) = self.callback {
            cb.on_conversion_start(source);
        }
        self.advance(PipelineState::Received);
    }

    fn advance(&mut self, state: PipelineState) {
        debug!("Pipeline state → {}", state);
        if let Some(ref cb) = self.callback {
            cb.on_stage(&state);
        }
        self.states.push(state);
    }

    fn warn(&mut self, warning: StageWarning) {
        warn!("{}", warning);
        if let Some(ref cb) = self.callback {
            cb.on_warning(&warning);
        }
        self.warnings.push(warning);
    }

    fn fail(&mut self, error: Docx2HtmlError) -> Docx2HtmlError {
        let last = self
            .states
            .last()
            .cloned()
            .unwrap_or(PipelineState::Received);
        let message = error.to_string();
        warn!("Conversion failed after '{}': {}", last, message);
        if let Some(ref cb) = self.callback {
            cb.on_conversion_failed(&last, &message);
        }
        self.advance(PipelineState::Failed(message));
        error
    }

    fn finish(self) -> (Vec<PipelineState>, Vec<StageWarning>) {
        (self.states, self.warnings)
    }
}
