//! On-disk snapshot trees
//!
//! Two trees live under the results folder:
//!
//! ```text
//! <results>/screenshots/<scenario>-<browser>.png        candidate (this run)
//! <results>/screenshots/<scenario>-<browser>-diff.png   diff (kept only if meaningful)
//! <results>/old-screenshots/<scenario>-<browser>.png    reference (previous accepted run)
//! ```
//!
//! References are provisioned from outside. The store never rewrites their
//! content; only the differ may re-encode one to a common pixel format.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::driver::Browser;
use crate::error::{E2eError, E2eResult};

pub const CANDIDATE_DIR: &str = "screenshots";
pub const REFERENCE_DIR: &str = "old-screenshots";

/// Paths belonging to one (scenario, browser) key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPaths {
    pub reference: PathBuf,
    pub candidate: PathBuf,
    pub diff: PathBuf,
}

/// Owner of the reference and candidate image trees
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    candidate_root: PathBuf,
    reference_root: PathBuf,
}

impl SnapshotStore {
    pub fn new(results_root: impl AsRef<Path>) -> Self {
        let root = results_root.as_ref();
        Self {
            candidate_root: root.join(CANDIDATE_DIR),
            reference_root: root.join(REFERENCE_DIR),
        }
    }

    pub fn candidate_root(&self) -> &Path {
        &self.candidate_root
    }

    pub fn reference_root(&self) -> &Path {
        &self.reference_root
    }

    /// Create the candidate tree if it is missing.
    pub fn ensure_dirs(&self) -> E2eResult<()> {
        std::fs::create_dir_all(&self.candidate_root)?;
        Ok(())
    }

    pub fn resolve_paths(&self, scenario: &str, browser: Browser) -> SnapshotPaths {
        let stem = format!("{}-{}", scenario, browser);
        SnapshotPaths {
            reference: self.reference_root.join(format!("{}.png", stem)),
            candidate: self.candidate_root.join(format!("{}.png", stem)),
            diff: self.candidate_root.join(format!("{}-diff.png", stem)),
        }
    }

    /// Where the diagnostic screenshot of a failed scenario goes.
    pub fn failure_path(&self, scenario: &str, browser: Browser) -> PathBuf {
        self.candidate_root
            .join(format!("{}-{}-failure.png", scenario, browser))
    }

    /// A missing reference is the normal state of a new scenario.
    pub fn reference_exists(&self, scenario: &str, browser: Browser) -> bool {
        self.resolve_paths(scenario, browser).reference.is_file()
    }

    /// Store encoded image bytes, creating the parent directory on demand.
    pub fn write(&self, image: &[u8], path: &Path) -> E2eResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, image)?;
        debug!("Wrote {} bytes to {}", image.len(), path.display());
        Ok(())
    }

    pub fn delete_diff(&self, path: &Path) -> E2eResult<()> {
        match std::fs::remove_file(path) {
            Ok(()) => {
                debug!("Removed negligible diff {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Accept this run's candidate as the reference for future runs.
    pub fn promote(&self, scenario: &str, browser: Browser) -> E2eResult<PathBuf> {
        let paths = self.resolve_paths(scenario, browser);

        if !paths.candidate.is_file() {
            return Err(E2eError::InvalidScenario(format!(
                "Cannot promote '{}': candidate not found: {}",
                scenario,
                paths.candidate.display()
            )));
        }

        std::fs::create_dir_all(&self.reference_root)?;
        std::fs::copy(&paths.candidate, &paths.reference)?;
        info!("Promoted '{}' ({}) to reference", scenario, browser);

        Ok(paths.reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_paths_layout() {
        let store = SnapshotStore::new("/results");
        let paths = store.resolve_paths("gui", Browser::Chrome);

        assert_eq!(paths.candidate, PathBuf::from("/results/screenshots/gui-chrome.png"));
        assert_eq!(paths.reference, PathBuf::from("/results/old-screenshots/gui-chrome.png"));
        assert_eq!(paths.diff, PathBuf::from("/results/screenshots/gui-chrome-diff.png"));
    }

    #[test]
    fn test_resolve_paths_is_deterministic() {
        let a = SnapshotStore::new("out").resolve_paths("gui", Browser::Firefox);
        let b = SnapshotStore::new("out").resolve_paths("gui", Browser::Firefox);
        assert_eq!(a, b);
        assert_ne!(a, SnapshotStore::new("out").resolve_paths("gui", Browser::Chrome));
    }

    #[test]
    fn test_missing_reference_is_not_an_error() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::new(tmp.path());
        assert!(!store.reference_exists("gui", Browser::Chrome));
    }

    #[test]
    fn test_write_creates_directories() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::new(tmp.path().join("nested"));
        let paths = store.resolve_paths("gui", Browser::Chrome);

        store.write(b"png", &paths.candidate).unwrap();
        store.write(b"png2", &paths.candidate).unwrap();

        assert_eq!(std::fs::read(&paths.candidate).unwrap(), b"png2");
    }

    #[test]
    fn test_delete_diff_tolerates_missing_file() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::new(tmp.path());
        store.ensure_dirs().unwrap();
        store.ensure_dirs().unwrap();

        let paths = store.resolve_paths("gui", Browser::Chrome);
        store.delete_diff(&paths.diff).unwrap();

        store.write(b"diff", &paths.diff).unwrap();
        store.delete_diff(&paths.diff).unwrap();
        assert!(!paths.diff.exists());
    }

    #[test]
    fn test_promote_copies_candidate() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::new(tmp.path());
        let paths = store.resolve_paths("gui", Browser::Chrome);

        assert!(store.promote("gui", Browser::Chrome).is_err());

        store.write(b"candidate", &paths.candidate).unwrap();
        store.promote("gui", Browser::Chrome).unwrap();

        assert!(store.reference_exists("gui", Browser::Chrome));
        assert_eq!(std::fs::read(&paths.reference).unwrap(), b"candidate");
    }
}
