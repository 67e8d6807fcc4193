/*!
 * rpmrepo - RPM repository sync over S3
 *
 * Publishes package files into a yum/dnf repository kept in an S3 bucket:
 * - Fresh and incremental publish (createrepo_c / mergerepo_c)
 * - Rebuild of an already published repository, e.g. to re-sign it
 * - Package and catalog signing through rpmsign and gpg
 * - Optional single-writer lease on the remote prefix
 *
 * External tools and the object store sit behind traits so the sync state
 * machine can be exercised without binaries or network access.
 */

pub mod config;
pub mod error;
pub mod lease;
pub mod logging;
pub mod prefix;
pub mod repo;
pub mod sign;
pub mod store;
pub mod sync;
mod tools;

// Re-export commonly used types
pub use config::{SigningConfig, SyncConfig, SyncMode, ToolPaths, ToolsFile};
pub use error::{ErrorCategory, RepoError, Result};
pub use prefix::RemotePrefix;
pub use repo::{Catalog, CreateRepo, MergeRepo, RepoBuilder, RepoMerger, Snapshot};
pub use sign::{GpgSigner, Signer};
pub use store::{MemoryStore, ObjectStore, S3Store, S3StoreConfig, Visibility};
pub use sync::{SyncOrchestrator, SyncPlan, SyncReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
