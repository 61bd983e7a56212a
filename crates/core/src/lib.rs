//! bibsync core library.
//!
//! This crate provides the structured diff/merge engine for bibliographic
//! databases: field-level entry comparison, two-way snapshot scanning,
//! three-way conflict detection and merging, and atomic application of
//! accepted changes with undo support.
//!
//! The comparison, diffing, and merge computations are synchronous pure
//! functions safe to run on any worker thread; the [`watch::ChangeMonitor`]
//! wires them to external file-change signals over channels.

pub mod compare;
pub mod config;
pub mod diff;
pub mod errors;
pub mod loader;
pub mod merge;
pub mod model;
pub mod resolve;
pub mod undo;
pub mod watch;

// Re-exports for convenience.
pub use compare::{compare, similarity, EntryRelationship};
pub use config::AppConfig;
pub use diff::{Change, ChangeKind, Decision, PendingChange, SnapshotScanner};
pub use errors::CoreError;
pub use loader::DatabaseLoader;
pub use merge::{ConflictDetector, EntryConflict, MergePlan, MergeResult, Merger};
pub use model::{BibDatabase, Entry, EntryId, FieldName, GroupNode};
pub use resolve::{AppliedSet, PolicyTable, ResolutionLog};
pub use undo::{CompoundEdit, UndoSink};
pub use watch::{ChangeMonitor, FileLock, ScanReport, SharedDatabase};
