//! CLI binary for docx2html5.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConverterConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use docx2html5::{
    ConversionPackage, ConversionProgressCallback, Converter, ConverterConfig, PipelineState,
    ProgressCallback, StageWarning,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner showing the current stage plus one
/// log line per completed stage.
struct CliProgressCallback {
    spinner: ProgressBar,
    warnings: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        spinner.set_style(style);
        spinner.set_prefix("Preparing");
        spinner.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            spinner,
            warnings: AtomicUsize::new(0),
        })
    }
}

/// What the pipeline does right after entering `state`.
fn next_step(state: &PipelineState) -> &'static str {
    match state {
        PipelineState::Received => "reading namespaces…",
        PipelineState::NamespacesExtracted => "reading alt text…",
        PipelineState::AltTextExtracted => "running LibreOffice…",
        PipelineState::Converted => "rewriting markup…",
        PipelineState::Rewritten => "extracting images…",
        PipelineState::AssetsRelinked => "packaging…",
        PipelineState::Packaged => "scheduling cleanup…",
        PipelineState::CleanupScheduled | PipelineState::Failed(_) => "",
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, source: &Path) {
        self.spinner.set_prefix("Converting");
        self.spinner.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {}…", source.display()))
        ));
    }

    fn on_stage(&self, state: &PipelineState) {
        if matches!(state, PipelineState::Failed(_)) {
            return;
        }
        self.spinner
            .println(format!("  {} {}", green("✓"), dim(&state.to_string())));
        self.spinner.set_message(next_step(state));
    }

    fn on_warning(&self, warning: &StageWarning) {
        self.warnings.fetch_add(1, Ordering::SeqCst);
        self.spinner
            .println(format!("  {} {}", yellow("⚠"), warning));
    }

    fn on_conversion_complete(&self, package: &Path) {
        self.spinner.finish_and_clear();
        let warnings = self.warnings.load(Ordering::SeqCst);
        let suffix = if warnings == 0 {
            String::new()
        } else {
            format!("  ({warnings} warnings)")
        };
        eprintln!(
            "{} packaged {}{}",
            green("✔"),
            bold(&package.display().to_string()),
            suffix
        );
    }

    fn on_conversion_failed(&self, last_state: &PipelineState, error: &str) {
        self.spinner.finish_and_clear();
        // Keep the first line only; the full error is printed by main.
        let first = error.lines().next().unwrap_or(error);
        eprintln!("{} failed after {}: {}", red("✘"), last_state, red(first));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert and keep the package next to the document
  docx2html5 report.docx

  # Convert and copy the package somewhere else (working files are removed)
  docx2html5 report.docx -o site/report.zip

  # LibreOffice installed elsewhere, no analytics snippet
  docx2html5 --soffice /opt/libreoffice/program/soffice --no-analytics report.docx

  # Machine-readable result
  docx2html5 --json report.docx > result.json

OUTPUT LAYOUT:
  <dir>/report_<YYYYmmdd_HHMMSS>_<id>/
    report.html                 rewritten, responsive page
    images/                     every image the page references
    report_<…>_package.zip      report.html + images/

ENVIRONMENT VARIABLES:
  DOCX2HTML5_SOFFICE       Path to the LibreOffice executable
  DOCX2HTML5_TIMEOUT       Converter timeout in seconds (0 = none)
  DOCX2HTML5_OUTPUT_ROOT   Parent directory for output directories
  RUST_LOG                 Log filter, e.g. docx2html5=debug
"#;

#[derive(Parser, Debug)]
#[command(
    name = "docx2html5",
    version,
    about = "Convert DOCX documents to responsive, accessible HTML5 packages",
    long_about = "Convert a Word document to HTML with LibreOffice, rewrite the markup to be \
mobile-responsive, restore image alt text from the document, and bundle the page with its \
images into a ZIP archive.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// DOCX document to convert.
    input: PathBuf,

    /// Copy the finished package here.
    #[arg(short, long, env = "DOCX2HTML5_OUTPUT")]
    output: Option<PathBuf>,

    /// LibreOffice executable.
    #[arg(long, env = "DOCX2HTML5_SOFFICE", default_value = docx2html5::config::DEFAULT_SOFFICE_PATH)]
    soffice: PathBuf,

    /// Converter timeout in seconds; 0 waits forever.
    #[arg(long, env = "DOCX2HTML5_TIMEOUT", default_value_t = 300)]
    timeout: u64,

    /// Parent directory for per-conversion output directories.
    #[arg(long, env = "DOCX2HTML5_OUTPUT_ROOT")]
    output_root: Option<PathBuf>,

    /// Leave out the analytics snippet.
    #[arg(long, env = "DOCX2HTML5_NO_ANALYTICS")]
    no_analytics: bool,

    /// Analytics measurement id.
    #[arg(long, env = "DOCX2HTML5_ANALYTICS_ID", conflicts_with = "no_analytics")]
    analytics_id: Option<String>,

    /// Footer text.
    #[arg(long, env = "DOCX2HTML5_FOOTER")]
    footer: Option<String>,

    /// Alt text for images the document does not describe.
    #[arg(long, env = "DOCX2HTML5_DEFAULT_ALT")]
    default_alt: Option<String>,

    /// Print the result as JSON on stdout.
    #[arg(long, env = "DOCX2HTML5_JSON")]
    json: bool,

    #[arg(long, env = "DOCX2HTML5_NO_PROGRESS")]
    no_progress: bool,

    #[arg(short, long, env = "DOCX2HTML5_VERBOSE")]
    verbose: bool,

    #[arg(short, long, env = "DOCX2HTML5_QUIET", conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner already reports every stage; library INFO logs would
    // only interleave with it.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    let converter = Converter::new(config);

    // ── Run conversion ───────────────────────────────────────────────────
    let package = run_conversion(&converter, &cli.input).await?;

    // ── Deliver ──────────────────────────────────────────────────────────
    if let Some(ref output_path) = cli.output {
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::copy(&package.package_path, output_path)
            .await
            .with_context(|| format!("Failed to copy package to {}", output_path.display()))?;
        // The copy is all the user asked for; drop the working directory now.
        converter.cleanup().flush_all().await;
    } else {
        // A CLI user keeps the package; nothing should delete it later.
        converter.cleanup().cancel_all();
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&package).context("Failed to serialize result")?
        );
    } else if !cli.quiet {
        print_summary(&package, cli.output.as_deref(), show_progress);
    }

    Ok(())
}

/// Convert `input`, reclaiming any partial output directory on failure.
///
/// The process exits right after an error, which would abort the pending
/// cleanup task and leave the directory behind.
async fn run_conversion(converter: &Converter, input: &Path) -> Result<ConversionPackage> {
    match converter.convert(input).await {
        Ok(package) => Ok(package),
        Err(e) => {
            converter.cleanup().flush_all().await;
            Err(e).context("Conversion failed")
        }
    }
}

/// Map CLI args to `ConverterConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConverterConfig> {
    let timeout = (cli.timeout > 0).then(|| Duration::from_secs(cli.timeout));

    let mut builder = ConverterConfig::builder()
        .soffice_path(&cli.soffice)
        .converter_timeout(timeout)
        // Never delete a file the user pointed us at.
        .delete_source(false);

    if let Some(ref root) = cli.output_root {
        builder = builder.output_root(root);
    }
    if cli.no_analytics {
        builder = builder.analytics_id(None);
    } else if let Some(ref id) = cli.analytics_id {
        builder = builder.analytics_id(Some(id.clone()));
    }
    if let Some(ref footer) = cli.footer {
        builder = builder.footer_text(footer);
    }
    if let Some(ref alt) = cli.default_alt {
        builder = builder.default_alt_text(alt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(package: &ConversionPackage, copied_to: Option<&Path>, show_progress: bool) {
    let stats = &package.stats;
    let location = copied_to.unwrap_or(package.package_path.as_path());

    if !show_progress {
        eprintln!("Packaged {} in {}ms", package.download_name(), stats.total_duration_ms);
        for w in &package.warnings {
            eprintln!("  warning: {w}");
        }
    }
    eprintln!(
        "   {} images ({} described, {} line shapes)  {} tables  {}",
        stats.images_rewritten,
        stats.images_described,
        stats.line_shapes,
        stats.tables_wrapped,
        dim(&format!("{} bytes", stats.package_bytes)),
    );
    println!("{}", location.display());
}
