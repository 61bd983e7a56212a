//! End-to-end tests for the scan -> resolve -> apply pipeline and the
//! three-way merge path.
//!
//! These tests exercise the real engine with:
//! - A minimal line-oriented stand-in for the Parser collaborator
//! - Real files on disk behind the change monitor
//! - A `Vec`-backed undo sink
//!
//! No network I/O and no real bibliographic parser: the loader format is
//! `@key|field=value|...` per entry, `$name=value` per string, `%text` for
//! the preamble.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{Mutex, RwLock};

use bibsync_core::config::AppConfig;
use bibsync_core::diff::SnapshotScanner;
use bibsync_core::errors::LoadError;
use bibsync_core::loader::DatabaseLoader;
use bibsync_core::merge::{MergeResult, Merger};
use bibsync_core::model::{BibDatabase, Entry};
use bibsync_core::resolve::{PolicyTable, ResolutionLog};
use bibsync_core::undo::CompoundEdit;
use bibsync_core::watch::ChangeMonitor;

// ===========================================================================
// Helpers
// ===========================================================================

struct LineLoader;

impl DatabaseLoader for LineLoader {
    fn parse(&self, bytes: &[u8]) -> Result<BibDatabase, LoadError> {
        let text = std::str::from_utf8(bytes).map_err(|e| LoadError::Parse {
            line: 0,
            message: e.to_string(),
        })?;
        let mut db = BibDatabase::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix('@') {
                let mut parts = rest.split('|');
                let key = parts.next().unwrap_or_default();
                let mut entry = Entry::with_key("article", key);
                for part in parts {
                    let (name, value) = part.split_once('=').ok_or_else(|| LoadError::Parse {
                        line: number + 1,
                        message: format!("malformed field '{part}'"),
                    })?;
                    entry.set_field(name, value);
                }
                db.insert_entry(entry);
            } else if let Some(rest) = line.strip_prefix('$') {
                let (name, value) = rest.split_once('=').ok_or_else(|| LoadError::Parse {
                    line: number + 1,
                    message: "malformed string".into(),
                })?;
                db.set_string(name, value);
            } else if let Some(rest) = line.strip_prefix('%') {
                db.set_preamble(Some(rest));
            } else {
                return Err(LoadError::Parse {
                    line: number + 1,
                    message: format!("unrecognized line '{line}'"),
                });
            }
        }
        Ok(db)
    }
}

fn parse(text: &str) -> BibDatabase {
    LineLoader.parse(text.as_bytes()).unwrap()
}

fn write_library(dir: &Path, content: &str) -> std::path::PathBuf {
    let path = dir.join("library.db");
    std::fs::write(&path, content).unwrap();
    path
}

// ===========================================================================
// Two-way pipeline
// ===========================================================================

#[tokio::test]
async fn monitor_scan_resolve_apply_converges_on_disk_state() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let live_db = parse("@a|title=Old Title\n@gone|title=Gone\n$s=1\n");
    let disk_content = "@a|title=New Title|year=2021\n@fresh|title=Fresh\n$s=2\n%new preamble\n";
    let path = write_library(dir.path(), disk_content);

    let live = Arc::new(RwLock::new(live_db));
    let (monitor, signals, mut reports) = ChangeMonitor::new(
        Arc::new(LineLoader),
        live.clone(),
        Arc::new(Mutex::new(())),
        &AppConfig::default(),
    );
    let handle = tokio::spawn(monitor.run());

    // The file-watch collaborator fires; the monitor reloads and diffs.
    signals.send(path).await?;
    let report = reports.recv().await.expect("monitor dropped");
    assert!(report.has_changes());
    let changes = report.outcome.expect("load should succeed");

    // Accept everything and apply atomically.
    let mut log = ResolutionLog::new(changes);
    log.decide_undecided(&PolicyTable::accept_all());
    let mut undo: Vec<CompoundEdit> = Vec::new();
    let set = {
        let mut db = live.write().await;
        log.apply(&mut db, &mut undo)?
    };

    assert!(set.database_changed);
    assert_eq!(undo.len(), 1);

    // The live database now equals the on-disk snapshot.
    let expected = parse(disk_content);
    assert_eq!(*live.read().await, expected);

    // The compound edit reverts the whole apply as a unit.
    {
        let mut db = live.write().await;
        undo[0].undo(&mut db);
    }
    assert_eq!(
        *live.read().await,
        parse("@a|title=Old Title\n@gone|title=Gone\n$s=1\n")
    );

    drop(signals);
    handle.await?;
    Ok(())
}

#[test]
fn scan_round_trip_reproduces_target_snapshot() {
    let config = AppConfig::default();
    let old = parse("@a|title=A|year=2000\n@b|title=B\n$acm=ACM\n%old\n");
    let new = parse("@a|title=A revised|year=2000\n@c|title=C\n$jacm=ACM\n%new\n");

    let changes = SnapshotScanner::scan(&old, &new, &config.scan);
    let mut log = ResolutionLog::new(changes);
    log.decide_undecided(&PolicyTable::accept_all());

    let mut applied = old.clone();
    let mut undo: Vec<CompoundEdit> = Vec::new();
    log.apply(&mut applied, &mut undo).unwrap();

    assert_eq!(applied, new);
    // And a second scan finds nothing left.
    assert!(SnapshotScanner::scan(&applied, &new, &config.scan).is_empty());
}

#[test]
fn denied_changes_leave_live_database_untouched() {
    let config = AppConfig::default();
    let old = parse("@a|title=Original\n");
    let new = parse("@a|title=Tampered\n");

    let mut log = ResolutionLog::new(SnapshotScanner::scan(&old, &new, &config.scan));
    log.deny(0).unwrap();

    let mut live = old.clone();
    let mut undo: Vec<CompoundEdit> = Vec::new();
    let set = log.apply(&mut live, &mut undo).unwrap();

    assert!(!set.database_changed);
    assert!(undo.is_empty());
    assert_eq!(live, old);
}

// ===========================================================================
// Three-way merge over revision blobs
// ===========================================================================

#[test]
fn merge_blobs_clean_applies_remote_delta() -> Result<()> {
    let base = "@a|author=Smith|title=A\n";
    let local = "@a|author=Smith|title=A|note=local note\n";
    let remote = "@a|author=Jones|title=A\n";

    let config = AppConfig::default();
    let (result, merged) = Merger::merge_blobs(
        &LineLoader,
        base.as_bytes(),
        local.as_bytes(),
        remote.as_bytes(),
        &config.scan,
    )?;

    assert!(result.is_clean());
    let entry = merged.entry_by_key("a").expect("entry should survive");
    assert_eq!(entry.field("author"), Some("Jones"));
    assert_eq!(entry.field("note"), Some("local note"));
    Ok(())
}

#[test]
fn merge_blobs_conflict_is_surfaced_not_applied() -> Result<()> {
    let base = "@a|author=Smith\n";
    let local = "@a|author=Local\n";
    let remote = "@a|author=Remote\n";

    let config = AppConfig::default();
    let (result, merged) = Merger::merge_blobs(
        &LineLoader,
        base.as_bytes(),
        local.as_bytes(),
        remote.as_bytes(),
        &config.scan,
    )?;

    let MergeResult::Conflicts(conflicts) = result else {
        panic!("expected conflicts");
    };
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].citation_key(), Some("a"));
    // Local side untouched.
    assert_eq!(
        merged.entry_by_key("a").unwrap().field("author"),
        Some("Local")
    );
    Ok(())
}

#[test]
fn merge_blobs_parse_failure_names_the_revision() {
    let config = AppConfig::default();
    let err = Merger::merge_blobs(
        &LineLoader,
        b"@a|author=Smith\n",
        b"?broken\n",
        b"@a|author=Smith\n",
        &config.scan,
    )
    .unwrap_err();
    assert!(err.to_string().contains("local"));
}

#[test]
fn independent_additions_merge_without_conflict() -> Result<()> {
    let base = "@a|title=A\n";
    let local = "@a|title=A\n@mine|title=Mine\n";
    let remote = "@a|title=A\n@theirs|title=Theirs\n";

    let config = AppConfig::default();
    let (result, merged) = Merger::merge_blobs(
        &LineLoader,
        base.as_bytes(),
        local.as_bytes(),
        remote.as_bytes(),
        &config.scan,
    )?;

    assert!(result.is_clean());
    assert_eq!(merged.entry_count(), 3);
    assert!(merged.entry_by_key("mine").is_some());
    assert!(merged.entry_by_key("theirs").is_some());
    Ok(())
}
