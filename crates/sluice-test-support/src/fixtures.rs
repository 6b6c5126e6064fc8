//! Scratch-directory fixtures built on `tempfile`.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Temporary directory tree for poller and pipeline tests. Removed on drop.
pub struct ScratchDir {
    temp: TempDir,
}

impl ScratchDir {
    /// Create a fresh scratch directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created.
    pub fn new() -> io::Result<Self> {
        let temp = tempfile::Builder::new().prefix("sluice-test-").tempdir()?;
        Ok(Self { temp })
    }

    /// Root of the scratch tree.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// Create (and return) a directory at the given relative path.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory cannot be created.
    pub fn create_dir(&self, relative: &str) -> io::Result<PathBuf> {
        let path = self.temp.path().join(relative);
        fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Write a file at the given relative path, creating parent directories
    /// as needed, and return its absolute path.
    ///
    /// # Errors
    ///
    /// Returns an error when the parents or the file cannot be written.
    pub fn write_file(&self, relative: &str, contents: &[u8]) -> io::Result<PathBuf> {
        let path = self.temp.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Append to an existing file (growing it, as a slow writer would).
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be opened or written.
    pub fn append_file(&self, relative: &str, contents: &[u8]) -> io::Result<PathBuf> {
        let path = self.temp.path().join(relative);
        let mut file = OpenOptions::new().append(true).open(&path)?;
        file.write_all(contents)?;
        Ok(path)
    }
}
