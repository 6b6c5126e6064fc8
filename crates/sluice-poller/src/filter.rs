//! Scan filters composed from a user filter and system rules.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::{PollerError, PollerResult};
use crate::marker;

/// Predicate over directory entries considered by a scan.
///
/// `directory` is the directory being scanned and `name` the entry's file
/// name within it. Implementations must be cheap: filters run once per entry
/// per cycle on the engine task.
pub trait ScanFilter: Send + Sync {
    /// Whether the entry should be considered by this scan.
    fn accept(&self, directory: &Path, name: &str) -> bool;
}

/// Filter that accepts every entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl ScanFilter for AcceptAll {
    fn accept(&self, _directory: &Path, _name: &str) -> bool {
        true
    }
}

/// Case-insensitive file-extension allowlist. An empty list accepts
/// everything; directories always pass so subtree candidates stay visible.
#[derive(Debug, Clone)]
pub struct ExtensionFilter {
    extensions: Vec<String>,
}

impl ExtensionFilter {
    /// Build a filter from normalised (lowercase, dot-less) extensions.
    #[must_use]
    pub fn new(extensions: Vec<String>) -> Self {
        Self { extensions }
    }
}

impl ScanFilter for ExtensionFilter {
    fn accept(&self, directory: &Path, name: &str) -> bool {
        if self.extensions.is_empty() || directory.join(name).is_dir() {
            return true;
        }
        Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                let lowered = ext.to_lowercase();
                self.extensions.iter().any(|allowed| *allowed == lowered)
            })
    }
}

/// Glob-based user filter over entry names.
#[derive(Debug, Clone)]
pub struct GlobFilter {
    set: GlobSet,
}

impl GlobFilter {
    /// Compile a set of glob patterns into a filter.
    ///
    /// # Errors
    ///
    /// Returns [`PollerError::Glob`] when a pattern does not compile.
    pub fn new(patterns: &[String]) -> PollerResult<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(Glob::new(pattern).map_err(|source| PollerError::Glob {
                pattern: pattern.clone(),
                source,
            })?);
        }
        let set = builder.build().map_err(|source| PollerError::Glob {
            pattern: patterns.join(","),
            source,
        })?;
        Ok(Self { set })
    }
}

impl ScanFilter for GlobFilter {
    fn accept(&self, _directory: &Path, name: &str) -> bool {
        self.set.is_match(name)
    }
}

/// System rules wrapped around the user filter.
///
/// Rejects dotfiles (which covers hidden files, markers, and AppleDouble
/// shadows), quarantine directories living under a watch root, and — during
/// plain scans — any subdirectory whose name is not explicitly allow listed.
pub(crate) struct SystemFilter {
    system_subdirectories: Vec<String>,
    quarantines: Vec<PathBuf>,
    inner: Arc<dyn ScanFilter>,
}

impl SystemFilter {
    pub(crate) fn new(
        system_subdirectories: Vec<String>,
        quarantines: Vec<PathBuf>,
        inner: Arc<dyn ScanFilter>,
    ) -> Self {
        Self {
            system_subdirectories,
            quarantines,
            inner,
        }
    }

    pub(crate) fn track_quarantine(&mut self, quarantine: PathBuf) {
        if !self.quarantines.contains(&quarantine) {
            self.quarantines.push(quarantine);
        }
    }

    pub(crate) fn untrack_quarantine(&mut self, quarantine: &Path) {
        self.quarantines.retain(|tracked| tracked != quarantine);
    }
}

impl ScanFilter for SystemFilter {
    fn accept(&self, directory: &Path, name: &str) -> bool {
        if name.starts_with('.') || marker::is_marker_name(name) {
            return false;
        }
        let path = directory.join(name);
        if self.quarantines.iter().any(|tracked| *tracked == path) {
            return false;
        }
        if let Ok(metadata) = std::fs::metadata(&path) {
            if metadata.is_file() && metadata.len() == 0 {
                return false;
            }
            if metadata.is_dir()
                && !self
                    .system_subdirectories
                    .iter()
                    .any(|allowed| allowed == name)
            {
                return false;
            }
        }
        self.inner.accept(directory, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn extension_filter_matches_case_insensitively() {
        let filter = ExtensionFilter::new(vec!["mxf".to_string(), "mov".to_string()]);
        let dir = Path::new("/watch");
        assert!(filter.accept(dir, "clip.MXF"));
        assert!(filter.accept(dir, "clip.mov"));
        assert!(!filter.accept(dir, "clip.txt"));
        assert!(!filter.accept(dir, "noextension"));
    }

    #[test]
    fn empty_extension_filter_accepts_everything() {
        let filter = ExtensionFilter::new(vec![]);
        assert!(filter.accept(Path::new("/watch"), "anything.bin"));
    }

    #[test]
    fn glob_filter_matches_names() -> PollerResult<()> {
        let filter = GlobFilter::new(&["*.txt".to_string()])?;
        assert!(filter.accept(Path::new("/watch"), "a.txt"));
        assert!(!filter.accept(Path::new("/watch"), "a.bin"));
        Ok(())
    }

    #[test]
    fn glob_filter_rejects_invalid_patterns() {
        let err = GlobFilter::new(&["[".to_string()]).expect_err("invalid glob");
        assert!(matches!(err, PollerError::Glob { .. }));
    }

    #[test]
    fn system_filter_hides_dotfiles_markers_and_quarantine() -> Result<(), Box<dyn Error>> {
        let temp = TempDir::new()?;
        let quarantine = temp.path().join("received");
        fs::create_dir_all(&quarantine)?;
        fs::write(temp.path().join("a.txt"), b"payload")?;

        let filter = SystemFilter::new(vec![], vec![quarantine], Arc::new(AcceptAll));
        assert!(filter.accept(temp.path(), "a.txt"));
        assert!(!filter.accept(temp.path(), ".hidden"));
        assert!(!filter.accept(temp.path(), ".~a.txt~"));
        assert!(!filter.accept(temp.path(), "._a.txt"));
        assert!(!filter.accept(temp.path(), "received"));
        Ok(())
    }

    #[test]
    fn system_filter_hides_zero_length_files() -> Result<(), Box<dyn Error>> {
        let temp = TempDir::new()?;
        fs::write(temp.path().join("empty.txt"), b"")?;
        fs::write(temp.path().join("full.txt"), b"payload")?;

        let filter = SystemFilter::new(vec![], vec![], Arc::new(AcceptAll));
        assert!(!filter.accept(temp.path(), "empty.txt"));
        assert!(filter.accept(temp.path(), "full.txt"));
        Ok(())
    }

    #[test]
    fn system_filter_skips_subdirectories_unless_allow_listed() -> Result<(), Box<dyn Error>> {
        let temp = TempDir::new()?;
        fs::create_dir_all(temp.path().join("incoming"))?;
        fs::create_dir_all(temp.path().join("archive"))?;

        let filter = SystemFilter::new(vec!["incoming".to_string()], vec![], Arc::new(AcceptAll));
        assert!(filter.accept(temp.path(), "incoming"));
        assert!(!filter.accept(temp.path(), "archive"));
        Ok(())
    }
}
