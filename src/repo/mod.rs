//! Local repository snapshots and the tools that catalog them
//!
//! A [`Snapshot`] is a directory of package files plus a generated
//! [`Catalog`] under `repodata/`. Catalogs are never edited by hand: they are
//! produced by a [`RepoBuilder`] (one directory) or a [`RepoMerger`] (two
//! snapshots into a third). The production implementations shell out to
//! `createrepo_c` and `mergerepo_c`; tests inject fakes.

mod builder;
mod catalog;
mod merger;
mod snapshot;

pub use builder::{CreateRepo, RepoBuilder};
pub use catalog::{sha256_file, Catalog};
pub use merger::{MergeRepo, RepoMerger};
pub use snapshot::{FileKind, Snapshot, SnapshotFile};

/// Catalog directory inside a snapshot and under a remote prefix
pub const REPODATA_DIR: &str = "repodata";

/// Root manifest of the catalog
pub const MANIFEST_NAME: &str = "repomd.xml";

/// Detached armored signature of the manifest
pub const SIGNATURE_NAME: &str = "repomd.xml.asc";
