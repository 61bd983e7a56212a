//! Two-way snapshot diffing.
//!
//! The diff subsystem is responsible for:
//! 1. **Change types** -- the closed [`Change`] union and its resolution
//!    wrapper [`PendingChange`].
//! 2. **Scanning** -- matching entries across two snapshots by stable
//!    identity and producing an ordered change list.

pub mod change;
pub mod scanner;

pub(crate) use scanner::match_entries;

pub use change::{preamble_diff, Change, ChangeKind, Decision, PendingChange};
pub use scanner::SnapshotScanner;
