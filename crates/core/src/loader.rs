//! The Parser collaborator seam.
//!
//! The engine never parses or reads the backing bibliographic format
//! itself; hosts plug their parser in behind [`DatabaseLoader`] and every
//! snapshot load goes through it.

use std::path::Path;

use crate::errors::LoadError;
use crate::model::BibDatabase;

/// Supplies database snapshots from raw bytes or files on disk.
pub trait DatabaseLoader: Send + Sync {
    /// Parse a snapshot from raw file contents.
    fn parse(&self, bytes: &[u8]) -> Result<BibDatabase, LoadError>;

    /// Load a snapshot from a file on disk.
    ///
    /// The default implementation reads the file and delegates to
    /// [`DatabaseLoader::parse`].
    fn load(&self, path: &Path) -> Result<BibDatabase, LoadError> {
        let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.parse(&bytes)
    }
}
