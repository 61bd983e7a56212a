//! Error types for the bibsync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Apply(#[from] ApplyError),
}

// ---------------------------------------------------------------------------
// Load errors
// ---------------------------------------------------------------------------

/// Errors from the Parser collaborator when producing a snapshot.
///
/// A load failure aborts the operation that requested the snapshot; nothing
/// in the live database is touched and no changes are produced.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The backing file could not be read.
    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The file contents could not be parsed into a snapshot.
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// The parsed snapshot violates a structural invariant.
    #[error("invalid snapshot: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Merge errors
// ---------------------------------------------------------------------------

/// Errors from the three-way merge subsystem.
#[derive(Debug, Error)]
pub enum MergeError {
    /// A clean apply was demanded on a triple with unresolved conflicts.
    #[error("cannot apply remote patch: {count} entry conflict(s) require resolution")]
    ConflictsPresent { count: usize },

    /// A merge plan referenced a local entry that no longer exists.
    ///
    /// Plans are only valid against the snapshot they were extracted from;
    /// hitting this is a caller defect.
    #[error("merge plan targets unknown entry {id}")]
    PlanTargetMissing { id: String },

    /// One of the three revision blobs failed to parse.
    #[error("failed to load {revision} revision: {source}")]
    RevisionLoad {
        revision: &'static str,
        #[source]
        source: LoadError,
    },
}

// ---------------------------------------------------------------------------
// Resolution errors
// ---------------------------------------------------------------------------

/// Errors from mutating a change resolution log.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The change index does not exist in the log.
    #[error("change index {index} out of range (log holds {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// A merged replacement entry was supplied for a change that is not an
    /// entry modification.
    #[error("merged replacement is only valid for entry modifications, not {kind}")]
    MergedNotApplicable { kind: String },

    /// The log was already applied; its changes are consumed.
    #[error("resolution log already applied")]
    AlreadyApplied,
}

// ---------------------------------------------------------------------------
// Apply errors
// ---------------------------------------------------------------------------

/// Errors from applying an accepted change set to the live database.
///
/// Any of these rolls the whole application back: the live database is left
/// exactly as it was, and the originating log remains usable for a retry.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The log was already applied successfully once.
    #[error("change set was already applied")]
    AlreadyApplied,

    /// An accepted change references an entry that is no longer present.
    #[error("stale change: {detail}")]
    StaleChange { detail: String },
}
