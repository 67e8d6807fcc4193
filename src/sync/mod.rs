//! Repository synchronisation
//!
//! [`SyncOrchestrator`] drives one run against one remote prefix. A run takes
//! one of two paths:
//!
//! - **Rebuild**: download everything already published, optionally re-sign
//!   the catalog manifest, replace the remote `repodata/` with it.
//! - **Publish**: catalog the supplied packages, then either upload them as a
//!   fresh repository or merge them with the published catalog and replace
//!   it.
//!
//! Steps run strictly one after another. Transfers inside a single step may
//! run in parallel up to the configured concurrency. The first failure ends
//! the run; remote changes already made are not rolled back.

mod orchestrator;
mod workspace;

pub use orchestrator::SyncOrchestrator;
pub use workspace::Workspace;

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::store::DeleteFailure;

/// Which branch of the state machine a run took
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncPlan {
    /// Rebuild requested but the prefix held no objects
    NothingToRebuild,
    /// Re-derived the remote repository from its own contents
    Rebuild,
    /// No catalog existed remotely; the new snapshot was uploaded as is
    FreshPublish,
    /// Merged the new snapshot with the published catalog
    IncrementalPublish,
}

impl fmt::Display for SyncPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPlan::NothingToRebuild => "nothing-to-rebuild",
            SyncPlan::Rebuild => "rebuild",
            SyncPlan::FreshPublish => "fresh-publish",
            SyncPlan::IncrementalPublish => "incremental-publish",
        };
        f.write_str(name)
    }
}

/// Summary of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub bucket: String,
    pub prefix: String,
    pub plan: Option<SyncPlan>,
    pub downloaded: usize,
    pub uploaded: usize,
    pub deleted: usize,
    pub delete_failures: Vec<DeleteFailure>,
    pub signed_packages: usize,
    pub manifest_signed: bool,
    /// Digest of the `repomd.xml` that was uploaded
    pub manifest_sha256: Option<String>,
    /// Set when the workspace was kept
    pub workspace: Option<PathBuf>,
    pub elapsed_ms: u64,
}

impl SyncReport {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            plan: None,
            downloaded: 0,
            uploaded: 0,
            deleted: 0,
            delete_failures: Vec::new(),
            signed_packages: 0,
            manifest_signed: false,
            manifest_sha256: None,
            workspace: None,
            elapsed_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_serializes_kebab_case() {
        let json = serde_json::to_string(&SyncPlan::IncrementalPublish).unwrap();
        assert_eq!(json, "\"incremental-publish\"");
        assert_eq!(SyncPlan::NothingToRebuild.to_string(), "nothing-to-rebuild");
    }

    #[test]
    fn test_report_json_shape() {
        let mut report = SyncReport::new("bucket", "el9");
        report.plan = Some(SyncPlan::FreshPublish);
        report.uploaded = 3;
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["plan"], "fresh-publish");
        assert_eq!(value["uploaded"], 3);
        assert!(value["workspace"].is_null());
    }
}
