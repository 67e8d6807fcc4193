use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use super::{Catalog, MANIFEST_NAME, REPODATA_DIR, SIGNATURE_NAME};
use crate::error::{IoContext, RepoError, Result};

/// Role of a file inside a snapshot; uploads go out in this order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileKind {
    /// Package artifacts and anything else outside `repodata/`
    Package,
    /// Catalog data files referenced by the manifest
    CatalogData,
    /// `repomd.xml` and its detached signature
    Manifest,
}

/// A file found in a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFile {
    pub path: PathBuf,
    /// Path relative to the snapshot root, `/`-separated
    pub relative: String,
    pub kind: FileKind,
}

impl SnapshotFile {
    fn classify(relative: &str) -> FileKind {
        match relative.strip_prefix(REPODATA_DIR).and_then(|r| r.strip_prefix('/')) {
            Some(MANIFEST_NAME) | Some(SIGNATURE_NAME) => FileKind::Manifest,
            Some(_) => FileKind::CatalogData,
            None => FileKind::Package,
        }
    }
}

/// A local repository directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    root: PathBuf,
}

impl Snapshot {
    /// Create (or reuse) the directory at `root`
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).at_path(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn repodata_dir(&self) -> PathBuf {
        self.root.join(REPODATA_DIR)
    }

    pub fn manifest_path(&self) -> PathBuf {
        Catalog::manifest_path(&self.root)
    }

    pub fn catalog(&self) -> Result<Catalog> {
        Catalog::load(&self.root)
    }

    /// Copy `src` into the snapshot under its base filename, replacing any
    /// package already stored under that name.
    pub fn add_package(&self, src: &Path) -> Result<PathBuf> {
        let name = src.file_name().ok_or_else(|| {
            RepoError::validation(format!("package {} has no file name", src.display()))
        })?;
        let dest = self.root.join(name);
        std::fs::copy(src, &dest).at_path(src)?;
        Ok(dest)
    }

    /// Place a file at `relative` inside the snapshot, creating parents.
    /// `relative` must stay inside the snapshot.
    pub fn path_for(&self, relative: &str) -> Result<PathBuf> {
        let rel = Path::new(relative);
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if relative.is_empty() || escapes {
            return Err(RepoError::validation(format!(
                "refusing to place '{}' outside {}",
                relative,
                self.root.display()
            )));
        }
        Ok(self.root.join(rel))
    }

    /// Package files directly inside the snapshot root, sorted by name
    pub fn packages(&self) -> Result<Vec<PathBuf>> {
        let mut packages = Vec::new();
        for entry in std::fs::read_dir(&self.root).at_path(&self.root)? {
            let entry = entry.at_path(&self.root)?;
            let file_type = entry.file_type().at_path(entry.path())?;
            if file_type.is_file() {
                packages.push(entry.path());
            }
        }
        packages.sort();
        Ok(packages)
    }

    /// Every file in the snapshot, ordered for upload: packages first, then
    /// catalog data, then the manifest and its signature.
    pub fn files(&self) -> Result<Vec<SnapshotFile>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(&self.root).to_path_buf();
                RepoError::local_io(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.push(SnapshotFile {
                path: entry.path().to_path_buf(),
                kind: SnapshotFile::classify(&relative),
                relative,
            });
        }
        files.sort_by(|a, b| {
            a.kind
                .cmp(&b.kind)
                .then_with(|| manifest_rank(a).cmp(&manifest_rank(b)))
                .then_with(|| a.relative.cmp(&b.relative))
        });
        Ok(files)
    }
}

// repomd.xml before its signature
fn manifest_rank(file: &SnapshotFile) -> u8 {
    if file.relative.ends_with(SIGNATURE_NAME) {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn populated() -> (TempDir, Snapshot) {
        let dir = TempDir::new().unwrap();
        let snapshot = Snapshot::create(dir.path().join("new")).unwrap();
        let root = snapshot.root().to_path_buf();
        std::fs::create_dir_all(root.join("repodata")).unwrap();
        std::fs::write(root.join("repodata/repomd.xml.asc"), b"sig").unwrap();
        std::fs::write(root.join("repodata/repomd.xml"), b"<repomd/>").unwrap();
        std::fs::write(root.join("repodata/x-primary.xml.gz"), b"gz").unwrap();
        std::fs::write(root.join("b.rpm"), b"b").unwrap();
        std::fs::write(root.join("a.rpm"), b"a").unwrap();
        (dir, snapshot)
    }

    #[test]
    fn test_files_are_ordered_for_upload() {
        let (_dir, snapshot) = populated();
        let order: Vec<_> = snapshot
            .files()
            .unwrap()
            .into_iter()
            .map(|f| (f.relative, f.kind))
            .collect();
        assert_eq!(
            order,
            vec![
                ("a.rpm".to_string(), FileKind::Package),
                ("b.rpm".to_string(), FileKind::Package),
                ("repodata/x-primary.xml.gz".to_string(), FileKind::CatalogData),
                ("repodata/repomd.xml".to_string(), FileKind::Manifest),
                ("repodata/repomd.xml.asc".to_string(), FileKind::Manifest),
            ]
        );
    }

    #[test]
    fn test_packages_excludes_repodata() {
        let (_dir, snapshot) = populated();
        let names: Vec<_> = snapshot
            .packages()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.rpm", "b.rpm"]);
    }

    #[test]
    fn test_add_package_uses_base_name_and_overwrites() {
        let dir = TempDir::new().unwrap();
        let snapshot = Snapshot::create(dir.path().join("new")).unwrap();
        let first = dir.path().join("one/pkg.rpm");
        let second = dir.path().join("two/pkg.rpm");
        std::fs::create_dir_all(first.parent().unwrap()).unwrap();
        std::fs::create_dir_all(second.parent().unwrap()).unwrap();
        std::fs::write(&first, b"first").unwrap();
        std::fs::write(&second, b"second").unwrap();

        snapshot.add_package(&first).unwrap();
        let dest = snapshot.add_package(&second).unwrap();
        assert_eq!(dest, snapshot.root().join("pkg.rpm"));
        assert_eq!(std::fs::read(dest).unwrap(), b"second");
        assert_eq!(snapshot.packages().unwrap().len(), 1);
    }

    #[test]
    fn test_path_for_rejects_escapes() {
        let dir = TempDir::new().unwrap();
        let snapshot = Snapshot::create(dir.path()).unwrap();
        assert!(snapshot.path_for("repodata/repomd.xml").is_ok());
        assert!(snapshot.path_for("../etc/passwd").is_err());
        assert!(snapshot.path_for("/abs").is_err());
        assert!(snapshot.path_for("").is_err());
    }
}
