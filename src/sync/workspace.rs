use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info};

use crate::config::WorkspaceConfig;
use crate::error::{IoContext, Result};
use crate::repo::Snapshot;

/// Scratch directory holding the `old/`, `new/` and `merged/` snapshots of
/// one run. Removed on drop unless configured to be kept.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    keep: bool,
}

impl Workspace {
    pub fn create(config: &WorkspaceConfig) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("rpmrepo-");
        let dir = match &config.parent {
            Some(parent) => {
                std::fs::create_dir_all(parent).at_path(parent)?;
                builder.tempdir_in(parent).at_path(parent)?
            }
            None => builder.tempdir().at_path(std::env::temp_dir())?,
        };
        debug!(path = %dir.path().display(), "workspace created");
        Ok(Self {
            dir,
            keep: config.keep,
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn old_snapshot(&self) -> Result<Snapshot> {
        Snapshot::create(self.root().join("old"))
    }

    pub fn new_snapshot(&self) -> Result<Snapshot> {
        Snapshot::create(self.root().join("new"))
    }

    pub fn merged_snapshot(&self) -> Result<Snapshot> {
        Snapshot::create(self.root().join("merged"))
    }

    /// End of run: returns the path when the directory is left behind
    pub fn finish(self) -> Option<PathBuf> {
        if self.keep {
            let path = self.dir.keep();
            info!(path = %path.display(), "workspace kept for inspection");
            Some(path)
        } else {
            debug!(path = %self.dir.path().display(), "removing workspace");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removed_by_default() {
        let parent = TempDir::new().unwrap();
        let config = WorkspaceConfig {
            parent: Some(parent.path().to_path_buf()),
            keep: false,
        };
        let ws = Workspace::create(&config).unwrap();
        let new = ws.new_snapshot().unwrap();
        std::fs::write(new.root().join("a.rpm"), b"a").unwrap();
        let root = ws.root().to_path_buf();

        assert!(ws.finish().is_none());
        assert!(!root.exists());
    }

    #[test]
    fn test_kept_on_request() {
        let parent = TempDir::new().unwrap();
        let config = WorkspaceConfig {
            parent: Some(parent.path().join("nested")),
            keep: true,
        };
        let ws = Workspace::create(&config).unwrap();
        ws.old_snapshot().unwrap();
        ws.merged_snapshot().unwrap();

        let kept = ws.finish().unwrap();
        assert!(kept.join("old").is_dir());
        assert!(kept.join("merged").is_dir());
        assert!(kept.starts_with(parent.path()));
    }
}
