/*!
 * Error types for rpmrepo
 */

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use thiserror::Error;

use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, RepoError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_VALIDATION: i32 = 2;
pub const EXIT_REMOTE: i32 = 3;
pub const EXIT_TOOL: i32 = 4;
pub const EXIT_LOCAL_IO: i32 = 5;

/// Everything that can abort a sync run.
///
/// The first error of any kind ends the run; nothing is retried and remote
/// state already mutated is not rolled back.
#[derive(Debug, Error)]
pub enum RepoError {
    /// Bad or missing input, detected before any remote I/O
    #[error("validation failed: {0}")]
    Validation(String),

    /// A list/get/put/delete call against the object store failed
    #[error("object store {operation} failed for '{key}': {source}")]
    RemoteStore {
        operation: &'static str,
        key: String,
        #[source]
        source: StoreError,
    },

    /// Another writer holds the repository lease
    #[error("repository lease '{key}' is held by {owner} until {expires_at}")]
    LeaseHeld {
        key: String,
        owner: String,
        expires_at: String,
    },

    /// An external tool could not be started or exited non-zero
    #[error("{tool} failed ({status}){}", stderr_suffix(.stderr))]
    ExternalTool {
        tool: String,
        status: ToolStatus,
        stderr: String,
    },

    /// Filesystem failure in the local workspace
    #[error("local I/O error at {}: {source}", .path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// How an external tool ended, for error reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolStatus {
    /// The binary could not be spawned at all
    SpawnFailed(String),
    /// Exited with a non-zero code
    Exited(i32),
    /// Killed by a signal
    Signaled,
    /// Exited 0 but did not produce the expected output
    MissingOutput(PathBuf),
}

impl ToolStatus {
    pub fn from_exit(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => ToolStatus::Exited(code),
            None => ToolStatus::Signaled,
        }
    }
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolStatus::SpawnFailed(reason) => write!(f, "could not start: {}", reason),
            ToolStatus::Exited(code) => write!(f, "exit code {}", code),
            ToolStatus::Signaled => write!(f, "terminated by signal"),
            ToolStatus::MissingOutput(path) => {
                write!(f, "expected output {} was not produced", path.display())
            }
        }
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {}", trimmed)
    }
}

/// Broad error classes used for the final log line and exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    RemoteStore,
    ExternalTool,
    LocalIo,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::RemoteStore => "remote-store",
            ErrorCategory::ExternalTool => "external-tool",
            ErrorCategory::LocalIo => "local-io",
        };
        f.write_str(name)
    }
}

impl RepoError {
    pub fn validation(message: impl Into<String>) -> Self {
        RepoError::Validation(message.into())
    }

    pub fn local_io(path: impl AsRef<Path>, source: io::Error) -> Self {
        RepoError::LocalIo {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn remote(operation: &'static str, key: impl Into<String>, source: StoreError) -> Self {
        RepoError::RemoteStore {
            operation,
            key: key.into(),
            source,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            RepoError::Validation(_) => ErrorCategory::Validation,
            RepoError::RemoteStore { .. } | RepoError::LeaseHeld { .. } => {
                ErrorCategory::RemoteStore
            }
            RepoError::ExternalTool { .. } => ErrorCategory::ExternalTool,
            RepoError::LocalIo { .. } => ErrorCategory::LocalIo,
        }
    }

    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self.category() {
            ErrorCategory::Validation => EXIT_VALIDATION,
            ErrorCategory::RemoteStore => EXIT_REMOTE,
            ErrorCategory::ExternalTool => EXIT_TOOL,
            ErrorCategory::LocalIo => EXIT_LOCAL_IO,
        }
    }
}

/// Attach a path to a bare `io::Error`.
pub trait IoContext<T> {
    fn at_path(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoContext<T> for std::result::Result<T, io::Error> {
    fn at_path(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|e| RepoError::local_io(path, e))
    }
}
