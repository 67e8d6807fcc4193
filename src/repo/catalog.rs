use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use super::{MANIFEST_NAME, REPODATA_DIR, SIGNATURE_NAME};
use crate::error::{IoContext, RepoError, Result, ToolStatus};

/// Generated metadata of one snapshot, rooted at `repodata/repomd.xml`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    root: PathBuf,
    /// Files under `repodata/`, relative to the snapshot root, sorted
    files: Vec<PathBuf>,
}

impl Catalog {
    /// Path of the manifest inside a snapshot rooted at `root`
    pub fn manifest_path(root: &Path) -> PathBuf {
        root.join(REPODATA_DIR).join(MANIFEST_NAME)
    }

    /// Path of the detached manifest signature inside a snapshot
    pub fn signature_path(root: &Path) -> PathBuf {
        root.join(REPODATA_DIR).join(SIGNATURE_NAME)
    }

    /// Read the catalog a tool just wrote. `tool` names the producer so a
    /// zero exit without a manifest is reported against it.
    pub fn after_tool(root: &Path, tool: &str) -> Result<Self> {
        let manifest = Self::manifest_path(root);
        if !manifest.is_file() {
            return Err(RepoError::ExternalTool {
                tool: tool.to_string(),
                status: ToolStatus::MissingOutput(manifest),
                stderr: String::new(),
            });
        }
        Self::load(root)
    }

    /// Load the catalog of the snapshot at `root`; the manifest must exist.
    pub fn load(root: &Path) -> Result<Self> {
        let manifest = Self::manifest_path(root);
        if !manifest.is_file() {
            return Err(RepoError::local_io(
                &manifest,
                std::io::Error::new(std::io::ErrorKind::NotFound, "catalog manifest not found"),
            ));
        }

        let repodata = root.join(REPODATA_DIR);
        let mut files = Vec::new();
        for entry in WalkDir::new(&repodata).follow_links(false) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(&repodata).to_path_buf();
                RepoError::local_io(path, e.into())
            })?;
            if entry.file_type().is_file() {
                if let Ok(relative) = entry.path().strip_prefix(root) {
                    files.push(relative.to_path_buf());
                }
            }
        }
        files.sort();

        Ok(Self {
            root: root.to_path_buf(),
            files,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> PathBuf {
        Self::manifest_path(&self.root)
    }

    pub fn signature(&self) -> PathBuf {
        Self::signature_path(&self.root)
    }

    pub fn is_signed(&self) -> bool {
        self.signature().is_file()
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

/// Hex SHA-256 of a file, read in 64KB blocks
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = BufReader::new(File::open(path).at_path(path)?);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buffer).at_path(path)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}
