use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use super::{Catalog, Snapshot};
use crate::error::Result;
use crate::tools::{run_tool, tool_name};

/// Produces the catalog for every package directly inside a snapshot
#[async_trait]
pub trait RepoBuilder: Send + Sync {
    /// Regenerate `snapshot`'s catalog from the packages physically present.
    /// Re-running on an unchanged directory reproduces the same catalog
    /// except for its timestamp.
    async fn build(&self, snapshot: &Snapshot) -> Result<Catalog>;
}

/// `createrepo_c` with SHA-256 checksums
#[derive(Debug, Clone)]
pub struct CreateRepo {
    program: PathBuf,
}

impl CreateRepo {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub(crate) fn command(&self, snapshot: &Snapshot) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--checksum").arg("sha256").arg(snapshot.root());
        cmd
    }
}

impl Default for CreateRepo {
    fn default() -> Self {
        Self::new("createrepo_c")
    }
}

#[async_trait]
impl RepoBuilder for CreateRepo {
    async fn build(&self, snapshot: &Snapshot) -> Result<Catalog> {
        let cmd = self.command(snapshot);
        let tool = tool_name(&cmd);
        run_tool(cmd, None).await?;
        let catalog = Catalog::after_tool(snapshot.root(), &tool)?;
        info!(
            manifest = %catalog.manifest().display(),
            files = catalog.files().len(),
            "catalog built"
        );
        Ok(catalog)
    }
}
