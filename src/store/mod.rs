//! Object store capability
//!
//! The orchestrator never talks to S3 directly; it consumes the narrow
//! [`ObjectStore`] trait below. [`S3Store`] is the production implementation,
//! [`MemoryStore`] an in-process fake used by tests.
//!
//! No transactions, conditional deletes or versioning are assumed. The only
//! conditional operation is [`ObjectStore::put_if_absent`], used for the
//! optional repository lease.

mod error;
mod memory;
mod s3;

pub use error::{StoreError, StoreResult};
pub use memory::{MemoryStore, StoreCall};
pub use s3::{S3Store, S3StoreConfig};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Maximum number of keys per DeleteObjects request
pub const DELETE_BATCH_LIMIT: usize = 1000;

/// A listed remote object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    pub key: String,
    pub size: u64,
}

/// Access-control attribute applied to uploaded objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Readable by anyone (canned ACL `public-read`)
    Public,
    /// Bucket owner only (canned ACL `private`)
    #[default]
    Private,
}

impl Visibility {
    pub fn canned_acl(&self) -> &'static str {
        match self {
            Visibility::Public => "public-read",
            Visibility::Private => "private",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Public => f.write_str("public"),
            Visibility::Private => f.write_str("private"),
        }
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "public" | "public-read" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(format!(
                "unknown visibility '{}', expected 'public' or 'private'",
                other
            )),
        }
    }
}

/// Per-key failure inside a batch delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFailure {
    pub key: String,
    pub message: String,
}

/// Outcome of a batch delete. Failures are reported per key; the batch as a
/// whole never errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    pub deleted: Vec<String>,
    pub failures: Vec<DeleteFailure>,
}

impl DeleteReport {
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn merge(&mut self, other: DeleteReport) {
        self.deleted.extend(other.deleted);
        self.failures.extend(other.failures);
    }
}

/// Operations the orchestrator needs from an object store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Human-readable bucket name, for logs
    fn bucket(&self) -> &str;

    /// List every object whose key starts with `prefix`, following pagination
    /// to the end. An absent prefix yields an empty list.
    async fn list(&self, prefix: &str) -> StoreResult<Vec<RemoteObject>>;

    /// Download `key` to `dest`, creating parent directories and overwriting
    /// any existing file.
    async fn get(&self, key: &str, dest: &Path) -> StoreResult<()>;

    /// Upload `src` as `key`, replacing any existing object.
    async fn put(&self, key: &str, src: &Path, visibility: Visibility) -> StoreResult<()>;

    /// Delete `keys`. Per-key failures are collected in the report.
    async fn delete_batch(&self, keys: &[String]) -> DeleteReport;

    /// Write `body` to `key` only if no object exists there. Returns `false`
    /// when the key was already taken.
    async fn put_if_absent(&self, key: &str, body: Bytes) -> StoreResult<bool>;

    /// Read a small object fully into memory; `None` when it does not exist.
    async fn get_bytes(&self, key: &str) -> StoreResult<Option<Bytes>>;
}
