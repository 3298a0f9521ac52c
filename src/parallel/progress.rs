//! Progress tracking shared by every unit of a run

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::debug;

use crate::parallel::Strategy;

/// Thread-safe progress tracker.
///
/// Counters are atomics so units on any thread can report without a lock;
/// events are fanned out on a broadcast channel for UI subscribers.
pub struct ProgressTracker {
    sender: broadcast::Sender<ProgressUpdate>,
    start_time: Mutex<Option<Instant>>,
    total: AtomicUsize,
    started: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
}

/// Snapshot of the current run
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressState {
    pub total_files: usize,
    pub started_files: usize,
    pub completed_files: usize,
    pub failed_files: usize,
    pub skipped_files: usize,
    pub elapsed_time: Duration,
}

impl ProgressState {
    /// Units that started but have not settled yet
    pub fn in_flight(&self) -> usize {
        self.started_files
            .saturating_sub(self.completed_files + self.failed_files)
    }

    pub fn settled(&self) -> usize {
        self.completed_files + self.failed_files + self.skipped_files
    }

    pub fn completion_percentage(&self) -> f64 {
        if self.total_files == 0 {
            return 100.0;
        }
        self.settled() as f64 / self.total_files as f64 * 100.0
    }
}

/// Progress update event
#[derive(Debug, Clone)]
pub enum ProgressUpdate {
    Started { strategy: Strategy, total_files: usize },
    FileCompleted { source: PathBuf, success: bool },
    FileSkipped { source: PathBuf },
    Finished { strategy: Strategy },
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);

        Self {
            sender,
            start_time: Mutex::new(None),
            total: AtomicUsize::new(0),
            started: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
        }
    }

    /// Subscribe to progress events
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.sender.subscribe()
    }

    /// Reset counters for a new run
    pub fn start(&self, strategy: Strategy, total_files: usize) {
        if let Ok(mut start_time) = self.start_time.lock() {
            *start_time = Some(Instant::now());
        }

        self.total.store(total_files, Ordering::Relaxed);
        self.started.store(0, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.skipped.store(0, Ordering::Relaxed);

        let _ = self.sender.send(ProgressUpdate::Started { strategy, total_files });
        debug!("Started progress tracking for {} files ({})", total_files, strategy);
    }

    pub fn start_file(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn complete_file(&self, source: PathBuf, success: bool) {
        if success {
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        let _ = self.sender.send(ProgressUpdate::FileCompleted { source, success });
    }

    pub fn skip_file(&self, source: PathBuf) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
        let _ = self.sender.send(ProgressUpdate::FileSkipped { source });
    }

    pub fn finish(&self, strategy: Strategy) {
        let _ = self.sender.send(ProgressUpdate::Finished { strategy });
    }

    /// Current progress snapshot
    pub fn get_state(&self) -> ProgressState {
        let elapsed_time = self
            .start_time
            .lock()
            .ok()
            .and_then(|start| start.map(|s| s.elapsed()))
            .unwrap_or_default();

        ProgressState {
            total_files: self.total.load(Ordering::Relaxed),
            started_files: self.started.load(Ordering::Relaxed),
            completed_files: self.completed.load(Ordering::Relaxed),
            failed_files: self.failed.load(Ordering::Relaxed),
            skipped_files: self.skipped.load(Ordering::Relaxed),
            elapsed_time,
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counters() {
        let tracker = ProgressTracker::new();
        tracker.start(Strategy::Sequential, 4);

        tracker.start_file();
        tracker.start_file();
        tracker.complete_file(PathBuf::from("a.png"), true);
        tracker.complete_file(PathBuf::from("b.png"), false);
        tracker.skip_file(PathBuf::from("c.png"));

        let state = tracker.get_state();
        assert_eq!(state.completed_files, 1);
        assert_eq!(state.failed_files, 1);
        assert_eq!(state.skipped_files, 1);
        assert_eq!(state.in_flight(), 0);
        assert_eq!(state.settled(), 3);
        assert!((state.completion_percentage() - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_start_resets() {
        let tracker = ProgressTracker::new();
        tracker.start(Strategy::Sequential, 2);
        tracker.complete_file(PathBuf::from("a.png"), true);
        tracker.start(Strategy::DataParallel, 5);

        let state = tracker.get_state();
        assert_eq!(state.total_files, 5);
        assert_eq!(state.completed_files, 0);
    }

    #[test]
    fn test_concurrent_updates() {
        let tracker = Arc::new(ProgressTracker::new());
        tracker.start(Strategy::ParallelWorker, 800);

        std::thread::scope(|s| {
            for _ in 0..8 {
                let tracker = Arc::clone(&tracker);
                s.spawn(move || {
                    for i in 0..100 {
                        tracker.start_file();
                        tracker.complete_file(PathBuf::from(format!("{i}.png")), i % 2 == 0);
                    }
                });
            }
        });

        let state = tracker.get_state();
        assert_eq!(state.completed_files + state.failed_files, 800);
        assert_eq!(state.completed_files, 400);
    }

    #[test]
    fn test_events_are_broadcast() {
        let tracker = ProgressTracker::new();
        let mut rx = tracker.subscribe();

        tracker.start(Strategy::TaskPerFile, 1);
        tracker.complete_file(PathBuf::from("a.png"), true);
        tracker.finish(Strategy::TaskPerFile);

        assert!(matches!(rx.try_recv().unwrap(), ProgressUpdate::Started { total_files: 1, .. }));
        assert!(matches!(rx.try_recv().unwrap(), ProgressUpdate::FileCompleted { success: true, .. }));
        assert!(matches!(rx.try_recv().unwrap(), ProgressUpdate::Finished { .. }));
    }
}
