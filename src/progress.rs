//! Progress-callback trait for pipeline stage events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConverterConfigBuilder::progress_callback`] to receive
//! events as the pipeline moves from one state to the next.
//!
//! # Example
//!
//! ```rust
//! use docx2html5::{ConversionProgressCallback, ConverterConfig, PipelineState};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     stages: Arc<AtomicUsize>,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_stage(&self, state: &PipelineState) {
//!         self.stages.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("now {state}");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     stages: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ConverterConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::StageWarning;
use crate::output::PipelineState;
use std::path::Path;
use std::sync::Arc;

/// Called by the conversion pipeline as it advances.
///
/// Implementations must be `Send + Sync`: one converter may run several
/// conversions concurrently on different tasks. All methods have default
/// no-op implementations so callers only override what they care about.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once, before any stage runs.
    fn on_conversion_start(&self, source: &Path) {
        let _ = source;
    }

    /// Called after every successful state transition, including
    /// [`PipelineState::Received`].
    fn on_stage(&self, state: &PipelineState) {
        let _ = state;
    }

    /// Called when a stage degrades without failing.
    fn on_warning(&self, warning: &StageWarning) {
        let _ = warning;
    }

    /// Called once the package exists and its cleanup is armed.
    fn on_conversion_complete(&self, package: &Path) {
        let _ = package;
    }

    /// Called when the pipeline stops in [`PipelineState::Failed`].
    ///
    /// # Arguments
    /// * `last_state` — the last state reached before the failure
    /// * `error`      — human-readable error description
    fn on_conversion_failed(&self, last_state: &PipelineState, error: &str) {
        let _ = (last_state, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConverterConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingCallback {
        stages: Mutex<Vec<PipelineState>>,
        warnings: Mutex<Vec<StageWarning>>,
        failures: Mutex<Vec<String>>,
    }

    impl ConversionProgressCallback for RecordingCallback {
        fn on_stage(&self, state: &PipelineState) {
            self.stages.lock().unwrap().push(state.clone());
        }

        fn on_warning(&self, warning: &StageWarning) {
            self.warnings.lock().unwrap().push(warning.clone());
        }

        fn on_conversion_failed(&self, _last_state: &PipelineState, error: &str) {
            self.failures.lock().unwrap().push(error.to_string());
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_conversion_start(Path::new("a.docx"));
        cb.on_stage(&PipelineState::Received);
        cb.on_warning(&StageWarning::AltTextExtraction {
            detail: "bad zip".into(),
        });
        cb.on_conversion_complete(Path::new("a.zip"));
        cb.on_conversion_failed(&PipelineState::Converted, "boom");
    }

    #[test]
    fn recording_callback_receives_events() {
        let cb = RecordingCallback::default();
        cb.on_stage(&PipelineState::Received);
        cb.on_stage(&PipelineState::NamespacesExtracted);
        cb.on_warning(&StageWarning::NamespaceExtraction {
            detail: "missing part".into(),
        });
        cb.on_conversion_failed(&PipelineState::NamespacesExtracted, "converter missing");

        assert_eq!(cb.stages.lock().unwrap().len(), 2);
        assert_eq!(cb.warnings.lock().unwrap().len(), 1);
        assert_eq!(cb.failures.lock().unwrap()[0], "converter missing");
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: Arc<dyn ConversionProgressCallback> = Arc::new(NoopProgressCallback);
        cb.on_stage(&PipelineState::Packaged);
    }
}
