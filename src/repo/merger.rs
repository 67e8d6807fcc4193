use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::{Catalog, Snapshot};
use crate::error::Result;
use crate::tools::{run_tool, tool_name};

/// Combines two snapshots into a third with one fresh catalog
#[async_trait]
pub trait RepoMerger: Send + Sync {
    /// Write the union of `old` and `new` into `out` and catalog it. On a
    /// filename collision the artifact from `new` wins.
    async fn merge(&self, old: &Snapshot, new: &Snapshot, out: &Snapshot) -> Result<Catalog>;
}

/// `mergerepo_c` over an old catalog and a freshly built one
///
/// mergerepo_c only writes metadata, and keeps a package from the first
/// repository it appears in. The new snapshot is therefore passed first, and
/// its package files are copied into the output afterwards so the merged
/// snapshot physically holds every artifact it introduces. Artifacts known
/// only from the old catalog are already published and stay referenced.
#[derive(Debug, Clone)]
pub struct MergeRepo {
    program: PathBuf,
}

impl MergeRepo {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub(crate) fn command(&self, old: &Snapshot, new: &Snapshot, out: &Snapshot) -> Command {
        let mut repo_new = std::ffi::OsString::from("--repo=");
        repo_new.push(new.root());
        let mut repo_old = std::ffi::OsString::from("--repo=");
        repo_old.push(old.root());

        let mut cmd = Command::new(&self.program);
        cmd.arg(repo_new)
            .arg(repo_old)
            .arg("--all")
            .arg("--omit-baseurl")
            .arg("-o")
            .arg(out.root());
        cmd
    }
}

impl Default for MergeRepo {
    fn default() -> Self {
        Self::new("mergerepo_c")
    }
}

#[async_trait]
impl RepoMerger for MergeRepo {
    async fn merge(&self, old: &Snapshot, new: &Snapshot, out: &Snapshot) -> Result<Catalog> {
        let cmd = self.command(old, new, out);
        let tool = tool_name(&cmd);
        run_tool(cmd, None).await?;

        for package in new.packages()? {
            let dest = out.add_package(&package)?;
            debug!(package = %dest.display(), "carried new package into merged snapshot");
        }

        let catalog = Catalog::after_tool(out.root(), &tool)?;
        info!(
            manifest = %catalog.manifest().display(),
            files = catalog.files().len(),
            "merged catalog built"
        );
        Ok(catalog)
    }
}
