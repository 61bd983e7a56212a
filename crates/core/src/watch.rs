//! The rescan trigger: react to external "file changed" signals.
//!
//! The file-watch collaborator sends changed paths on a channel; a single
//! [`ChangeMonitor`] task reloads the on-disk snapshot through the Parser
//! collaborator, diffs it against the live database, and forwards the
//! result. No callback registration anywhere: one channel in, one channel
//! out.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::{AppConfig, ScanConfig};
use crate::diff::{Change, SnapshotScanner};
use crate::errors::LoadError;
use crate::loader::DatabaseLoader;
use crate::model::BibDatabase;

/// Shared handle to the live database snapshot.
///
/// The monitor takes a read lock only long enough to clone; diffing runs on
/// the clone, so writers are never blocked by a scan in progress. Apply
/// paths take the write lock.
pub type SharedDatabase = Arc<RwLock<BibDatabase>>;

/// Serializes snapshot loads with saves of the same file.
///
/// Whatever writes the database file must hold this while writing, so a
/// rescan never reads a half-written file.
pub type FileLock = Arc<Mutex<()>>;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// The outcome of one rescan, delivered to the consumer.
#[derive(Debug)]
pub struct ScanReport {
    /// The file that changed.
    pub path: PathBuf,
    /// Monotonic scan number; consumers drop reports older than the newest
    /// one they have seen, so a fresh diff supersedes a stale one.
    pub generation: u64,
    pub scanned_at: DateTime<Utc>,
    /// The changes found, or the load failure that aborted the rescan.
    pub outcome: Result<Vec<Change>, LoadError>,
}

impl ScanReport {
    /// Whether the rescan succeeded and found actual changes.
    pub fn has_changes(&self) -> bool {
        matches!(&self.outcome, Ok(changes) if !changes.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

/// Single consumer of file-changed signals: rescan, diff, notify.
pub struct ChangeMonitor {
    loader: Arc<dyn DatabaseLoader>,
    live: SharedDatabase,
    file_lock: FileLock,
    config: ScanConfig,
    signals: mpsc::Receiver<PathBuf>,
    reports: mpsc::Sender<ScanReport>,
    generation: u64,
}

impl ChangeMonitor {
    /// Create a monitor plus its two channel endpoints: the sender the
    /// file-watch collaborator signals on, and the receiver the resolution
    /// consumer reads reports from.
    pub fn new(
        loader: Arc<dyn DatabaseLoader>,
        live: SharedDatabase,
        file_lock: FileLock,
        config: &AppConfig,
    ) -> (Self, mpsc::Sender<PathBuf>, mpsc::Receiver<ScanReport>) {
        let (signal_tx, signal_rx) = mpsc::channel(config.watch.channel_capacity);
        let (report_tx, report_rx) = mpsc::channel(config.watch.channel_capacity);
        let monitor = Self {
            loader,
            live,
            file_lock,
            config: config.scan.clone(),
            signals: signal_rx,
            reports: report_tx,
            generation: 0,
        };
        (monitor, signal_tx, report_rx)
    }

    /// Run until the signal channel closes or the report consumer goes away.
    ///
    /// Signals that pile up while a scan is in flight are coalesced down to
    /// the newest one; a cancelled (superseded) rescan leaves no trace.
    pub async fn run(mut self) {
        info!("change monitor started");
        while let Some(first) = self.signals.recv().await {
            let mut path = first;
            while let Ok(newer) = self.signals.try_recv() {
                debug!(superseded = %path.display(), "coalescing change signals");
                path = newer;
            }

            self.generation += 1;
            let report = self.rescan(path).await;
            if self.reports.send(report).await.is_err() {
                debug!("report channel closed, stopping monitor");
                break;
            }
        }
        info!("change monitor stopped");
    }

    async fn rescan(&self, path: PathBuf) -> ScanReport {
        debug!(path = %path.display(), generation = self.generation, "rescanning");

        // Hold the file lock across the load so a concurrent save cannot
        // leave us a half-written file.
        let loaded = {
            let _guard = self.file_lock.lock().await;
            self.loader.load(&path)
        };

        let outcome = match loaded {
            Ok(on_disk) => {
                let live = self.live.read().await.clone();
                let changes = SnapshotScanner::scan(&live, &on_disk, &self.config);
                if changes.is_empty() {
                    debug!(path = %path.display(), "no actual changes found");
                } else {
                    info!(
                        path = %path.display(),
                        count = changes.len(),
                        "external changes detected"
                    );
                }
                Ok(changes)
            }
            Err(e) => {
                // Reported, not retried; the live database stays untouched.
                warn!(path = %path.display(), error = %e, "snapshot load failed, rescan aborted");
                Err(e)
            }
        };

        ScanReport {
            path,
            generation: self.generation,
            scanned_at: Utc::now(),
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Entry;

    struct StubLoader;

    impl DatabaseLoader for StubLoader {
        fn parse(&self, bytes: &[u8]) -> Result<BibDatabase, LoadError> {
            let text = std::str::from_utf8(bytes).map_err(|e| LoadError::Parse {
                line: 0,
                message: e.to_string(),
            })?;
            let mut db = BibDatabase::new();
            for line in text.lines().filter(|l| !l.trim().is_empty()) {
                if line.starts_with('!') {
                    return Err(LoadError::Parse {
                        line: 1,
                        message: "forced parse failure".into(),
                    });
                }
                let mut parts = line.split('|');
                let key = parts.next().unwrap_or_default();
                let mut entry = Entry::with_key("article", key);
                for part in parts {
                    if let Some((name, value)) = part.split_once('=') {
                        entry.set_field(name, value);
                    }
                }
                db.insert_entry(entry);
            }
            Ok(db)
        }
    }

    fn live_with(entries: Vec<Entry>) -> SharedDatabase {
        let mut db = BibDatabase::new();
        for e in entries {
            db.insert_entry(e);
        }
        Arc::new(RwLock::new(db))
    }

    #[tokio::test]
    async fn test_rescan_reports_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.db");
        std::fs::write(&path, "a|title=New Title\n").unwrap();

        let mut original = Entry::with_key("article", "a");
        original.set_field("title", "Old Title");
        let live = live_with(vec![original]);

        let (monitor, signals, mut reports) = ChangeMonitor::new(
            Arc::new(StubLoader),
            live,
            Arc::new(Mutex::new(())),
            &AppConfig::default(),
        );
        let handle = tokio::spawn(monitor.run());

        signals.send(path.clone()).await.unwrap();
        let report = reports.recv().await.unwrap();
        assert_eq!(report.path, path);
        assert_eq!(report.generation, 1);
        assert!(report.has_changes());
        assert_eq!(report.outcome.unwrap().len(), 1);

        drop(signals);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_no_actual_changes_reported_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.db");
        std::fs::write(&path, "a|title=Same\n").unwrap();

        let mut same = Entry::with_key("article", "a");
        same.set_field("title", "Same");
        let live = live_with(vec![same]);

        let (monitor, signals, mut reports) = ChangeMonitor::new(
            Arc::new(StubLoader),
            live,
            Arc::new(Mutex::new(())),
            &AppConfig::default(),
        );
        let handle = tokio::spawn(monitor.run());

        signals.send(path).await.unwrap();
        let report = reports.recv().await.unwrap();
        assert!(!report.has_changes());
        assert!(report.outcome.unwrap().is_empty());

        drop(signals);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_load_failure_reported_without_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.db");
        std::fs::write(&path, "!broken\n").unwrap();

        let live = live_with(vec![Entry::with_key("article", "a")]);
        let snapshot_before = live.read().await.clone();

        let (monitor, signals, mut reports) = ChangeMonitor::new(
            Arc::new(StubLoader),
            live.clone(),
            Arc::new(Mutex::new(())),
            &AppConfig::default(),
        );
        let handle = tokio::spawn(monitor.run());

        signals.send(path).await.unwrap();
        let report = reports.recv().await.unwrap();
        assert!(matches!(report.outcome, Err(LoadError::Parse { .. })));
        assert_eq!(*live.read().await, snapshot_before);

        drop(signals);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_burst_of_signals_is_coalesced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.db");
        std::fs::write(&path, "a|title=T\n").unwrap();

        let live = live_with(vec![]);
        let (monitor, signals, mut reports) = ChangeMonitor::new(
            Arc::new(StubLoader),
            live,
            Arc::new(Mutex::new(())),
            &AppConfig::default(),
        );

        // Queue a burst before the monitor starts, then let it drain.
        for _ in 0..5 {
            signals.send(path.clone()).await.unwrap();
        }
        drop(signals);
        let handle = tokio::spawn(monitor.run());

        let report = reports.recv().await.unwrap();
        assert_eq!(report.generation, 1);
        assert!(reports.recv().await.is_none());

        handle.await.unwrap();
    }
}
