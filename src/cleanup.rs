//! Deferred cleanup of conversion artifacts.
//!
//! Every finished (or failed) conversion leaves an output directory behind
//! and possibly the uploaded source. [`schedule_cleanup`] spawns a tokio
//! task that removes both after a retention delay, whether or not anyone
//! downloaded the package. The caller is never blocked.
//!
//! ## Control
//!
//! A [`CleanupHandle`] can [`cancel`](CleanupHandle::cancel) the deletion,
//! [`flush`](CleanupHandle::flush) it (run it now) or [`wait`](CleanupHandle::wait)
//! for it. Dropping the handle detaches the task; the deletion still runs
//! when the delay expires.
//!
//! [`CleanupScheduler`] tracks every handle a [`crate::Converter`] created so
//! a server can flush pending deletions on shutdown and tests can wait for
//! them deterministically.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What was actually deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub output_dir_removed: bool,
    pub source_removed: bool,
}

/// How a scheduled cleanup ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    Completed(CleanupReport),
    Cancelled,
    /// The task panicked or was aborted by the runtime.
    Aborted(String),
}

enum Signal {
    Cancel,
    Flush,
}

/// Control over one scheduled deletion.
pub struct CleanupHandle {
    output_dir: PathBuf,
    due_at: DateTime<Utc>,
    control: Option<oneshot::Sender<Signal>>,
    task: JoinHandle<CleanupOutcome>,
}

impl std::fmt::Debug for CleanupHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupHandle")
            .field("output_dir", &self.output_dir)
            .field("due_at", &self.due_at)
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

impl CleanupHandle {
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Wall-clock time the deletion is due.
    pub fn due_at(&self) -> DateTime<Utc> {
        self.due_at
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Call off the deletion. Returns `false` once the delay has elapsed
    /// (the deletion is then running or done) or a signal was already sent.
    pub fn cancel(&mut self) -> bool {
        match self.control.take() {
            Some(tx) => tx.send(Signal::Cancel).is_ok(),
            None => false,
        }
    }

    /// Delete now instead of waiting for the delay.
    pub async fn flush(mut self) -> CleanupOutcome {
        if let Some(tx) = self.control.take() {
            let _ = tx.send(Signal::Flush);
        }
        self.wait().await
    }

    /// Wait for the task to finish on its own schedule.
    pub async fn wait(self) -> CleanupOutcome {
        // Keep the sender alive so waiting does not count as detaching.
        let _control = self.control;
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Cleanup task for {} failed: {}", self.output_dir.display(), e);
                CleanupOutcome::Aborted(e.to_string())
            }
        }
    }
}

/// Remove `output_dir` (recursively) and `source` after `delay`.
///
/// Must be called from within a tokio runtime.
pub fn schedule_cleanup(output_dir: PathBuf, source: Option<PathBuf>, delay: Duration) -> CleanupHandle {
    let due_at = due_time(delay);
    let (tx, rx) = oneshot::channel();

    info!(
        "Cleanup of {} scheduled in {}s",
        output_dir.display(),
        delay.as_secs()
    );

    let task = tokio::spawn(run(output_dir.clone(), source, delay, rx));
    CleanupHandle {
        output_dir,
        due_at,
        control: Some(tx),
        task,
    }
}

/// `now + delay`, saturating for absurd delays.
pub(crate) fn due_time(delay: Duration) -> DateTime<Utc> {
    let now = Utc::now();
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

async fn run(
    output_dir: PathBuf,
    source: Option<PathBuf>,
    delay: Duration,
    mut control: oneshot::Receiver<Signal>,
) -> CleanupOutcome {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    tokio::select! {
        _ = &mut sleep => {}
        signal = &mut control => match signal {
            Ok(Signal::Cancel) => {
                info!("Cleanup of {} cancelled", output_dir.display());
                return CleanupOutcome::Cancelled;
            }
            Ok(Signal::Flush) => debug!("Cleanup of {} flushed", output_dir.display()),
            // Handle dropped: detached, keep the original schedule.
            Err(_) => sleep.as_mut().await,
        },
    }

    // Deletion is committed from here on; later signals fail to send.
    control.close();
    if let Ok(Signal::Cancel) = control.try_recv() {
        info!("Cleanup of {} cancelled", output_dir.display());
        return CleanupOutcome::Cancelled;
    }

    CleanupOutcome::Completed(remove(&output_dir, source.as_deref()).await)
}

async fn remove(output_dir: &Path, source: Option<&Path>) -> CleanupReport {
    let mut report = CleanupReport::default();

    match tokio::fs::remove_dir_all(output_dir).await {
        Ok(()) => {
            info!("Deleted output directory {}", output_dir.display());
            report.output_dir_removed = true;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("Output directory {} already gone", output_dir.display());
        }
        Err(e) => warn!("Failed to delete {}: {}", output_dir.display(), e),
    }

    if let Some(source) = source {
        match tokio::fs::remove_file(source).await {
            Ok(()) => {
                info!("Deleted source {}", source.display());
                report.source_removed = true;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete {}: {}", source.display(), e),
        }
    }

    report
}

// ── Scheduler ────────────────────────────────────────────────────────────────

/// Registry of every cleanup a converter scheduled.
#[derive(Debug, Default)]
pub struct CleanupScheduler {
    handles: Mutex<Vec<CleanupHandle>>,
}

impl CleanupScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule and track a deletion; returns when it is due.
    pub fn schedule(&self, output_dir: PathBuf, source: Option<PathBuf>, delay: Duration) -> DateTime<Utc> {
        let handle = schedule_cleanup(output_dir, source, delay);
        let due_at = handle.due_at();
        let mut handles = self.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
        due_at
    }

    /// Deletions that have not run yet.
    pub fn pending(&self) -> usize {
        self.lock().iter().filter(|h| !h.is_finished()).count()
    }

    /// Cancel the deletion of one output directory.
    pub fn cancel(&self, output_dir: &Path) -> bool {
        let mut handles = self.lock();
        let Some(pos) = handles.iter().position(|h| h.output_dir() == output_dir) else {
            return false;
        };
        let mut handle = handles.swap_remove(pos);
        handle.cancel()
    }

    /// Cancel everything still pending. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let handles = std::mem::take(&mut *self.lock());
        handles
            .into_iter()
            .filter_map(|mut h| h.cancel().then_some(()))
            .count()
    }

    /// Run the deletion of one output directory now.
    pub async fn flush(&self, output_dir: &Path) -> Option<CleanupOutcome> {
        let handle = {
            let mut handles = self.lock();
            let pos = handles.iter().position(|h| h.output_dir() == output_dir)?;
            handles.swap_remove(pos)
        };
        Some(handle.flush().await)
    }

    /// Run every pending deletion now and wait for all of them.
    pub async fn flush_all(&self) -> Vec<CleanupOutcome> {
        let handles = std::mem::take(&mut *self.lock());
        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            outcomes.push(handle.flush().await);
        }
        outcomes
    }

    /// Wait for every tracked deletion on its own schedule.
    pub async fn wait_all(&self) -> Vec<CleanupOutcome> {
        let handles = std::mem::take(&mut *self.lock());
        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            outcomes.push(handle.wait().await);
        }
        outcomes
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<CleanupHandle>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifacts() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("doc_out");
        std::fs::create_dir_all(out.join("images")).unwrap();
        std::fs::write(out.join("images/a.png"), b"x").unwrap();
        let source = root.path().join("doc.docx");
        std::fs::write(&source, b"PK").unwrap();
        (root, out, source)
    }

    #[tokio::test(start_paused = true)]
    async fn deletes_only_after_delay() {
        let (_root, out, source) = artifacts();
        let handle = schedule_cleanup(out.clone(), Some(source.clone()), Duration::from_secs(600));

        tokio::time::advance(Duration::from_secs(599)).await;
        tokio::task::yield_now().await;
        assert!(out.exists());
        assert!(!handle.is_finished());

        let outcome = handle.wait().await;
        assert_eq!(
            outcome,
            CleanupOutcome::Completed(CleanupReport {
                output_dir_removed: true,
                source_removed: true
            })
        );
        assert!(!out.exists());
        assert!(!source.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_cleanup_keeps_files() {
        let (_root, out, source) = artifacts();
        let mut handle = schedule_cleanup(out.clone(), Some(source.clone()), Duration::from_secs(600));
        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert_eq!(handle.wait().await, CleanupOutcome::Cancelled);
        assert!(out.exists());
        assert!(source.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_delay_reports_false() {
        let (_root, out, _source) = artifacts();
        let mut handle = schedule_cleanup(out.clone(), None, Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(61)).await;
        while out.exists() {
            tokio::task::yield_now().await;
        }
        assert!(!handle.cancel());
        assert!(matches!(handle.wait().await, CleanupOutcome::Completed(_)));
        assert!(!out.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn flush_runs_immediately() {
        let (_root, out, _source) = artifacts();
        let handle = schedule_cleanup(out.clone(), None, Duration::from_secs(3600));
        let outcome = handle.flush().await;
        assert_eq!(
            outcome,
            CleanupOutcome::Completed(CleanupReport {
                output_dir_removed: true,
                source_removed: false
            })
        );
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn dropped_handle_still_deletes() {
        let (_root, out, source) = artifacts();
        drop(schedule_cleanup(out.clone(), Some(source.clone()), Duration::from_millis(50)));

        for _ in 0..200 {
            if !out.exists() && !source.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!out.exists());
        assert!(!source.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_paths_are_not_errors() {
        let root = tempfile::tempdir().unwrap();
        let handle = schedule_cleanup(
            root.path().join("gone"),
            Some(root.path().join("gone.docx")),
            Duration::from_secs(1),
        );
        assert_eq!(
            handle.wait().await,
            CleanupOutcome::Completed(CleanupReport::default())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_tracks_and_flushes() {
        let (_root, out, _source) = artifacts();
        let other = out.with_file_name("other_out");
        std::fs::create_dir_all(&other).unwrap();

        let scheduler = CleanupScheduler::new();
        scheduler.schedule(out.clone(), None, Duration::from_secs(600));
        scheduler.schedule(other.clone(), None, Duration::from_secs(600));
        assert_eq!(scheduler.pending(), 2);

        assert!(scheduler.cancel(&other));
        let outcomes = scheduler.flush_all().await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(scheduler.pending(), 0);
        assert!(!out.exists());
        assert!(other.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_stops_everything() {
        let (_root, out, source) = artifacts();
        let scheduler = CleanupScheduler::new();
        scheduler.schedule(out.clone(), Some(source.clone()), Duration::from_secs(10));
        assert_eq!(scheduler.cancel_all(), 1);
        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(scheduler.wait_all().await.is_empty());
        assert!(out.exists());
        assert!(source.exists());
    }

    #[test]
    fn due_time_saturates() {
        assert_eq!(due_time(Duration::MAX), DateTime::<Utc>::MAX_UTC);
        assert!(due_time(Duration::from_secs(600)) > Utc::now());
    }
}
