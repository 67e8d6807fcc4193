/*!
 * Configuration types for rpmrepo
 */

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RepoError, Result};
use crate::prefix::RemotePrefix;
use crate::store::Visibility;

/// Default number of parallel transfers within one upload/download batch
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default lease lifetime
pub const DEFAULT_LEASE_TTL_SECS: u64 = 900;

/// What one run should do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMode {
    /// Re-derive the remote repository from what is already published
    Rebuild,

    /// Add these packages to the published repository, creating it if needed
    Publish { packages: Vec<PathBuf> },
}

/// Signing settings. An absent or empty passphrase means signing is
/// delegated to an already-unlocked agent.
#[derive(Debug, Clone, Default)]
pub struct SigningConfig {
    pub passphrase: Option<SecretString>,

    /// GPG key name or id; the tools' default key when unset
    pub key_name: Option<String>,
}

impl SigningConfig {
    /// The passphrase, if one was supplied and is non-empty
    pub fn passphrase(&self) -> Option<&SecretString> {
        self.passphrase
            .as_ref()
            .filter(|p| !p.expose_secret().is_empty())
    }
}

/// Where the ephemeral old/new/merged snapshots live
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceConfig {
    /// Parent directory (system temp dir when unset)
    pub parent: Option<PathBuf>,

    /// Leave the snapshot directories behind for inspection
    pub keep: bool,
}

/// Single-writer lease settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseConfig {
    pub ttl: Duration,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_LEASE_TTL_SECS),
        }
    }
}

/// Immutable parameters for one orchestrator run
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub prefix: RemotePrefix,
    pub visibility: Visibility,
    pub mode: SyncMode,

    /// `None` disables every signing step
    pub signing: Option<SigningConfig>,

    pub workspace: WorkspaceConfig,

    /// Parallel transfers within one batch (steps never overlap)
    pub concurrency: usize,

    /// `None` runs without taking the repository lease
    pub lease: Option<LeaseConfig>,
}

impl SyncConfig {
    pub fn new(prefix: RemotePrefix, mode: SyncMode) -> Self {
        Self {
            prefix,
            visibility: Visibility::Private,
            mode,
            signing: None,
            workspace: WorkspaceConfig::default(),
            concurrency: DEFAULT_CONCURRENCY,
            lease: None,
        }
    }

    pub fn is_rebuild(&self) -> bool {
        matches!(self.mode, SyncMode::Rebuild)
    }

    /// Checks that must pass before any remote I/O happens
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(RepoError::validation("concurrency must be at least 1"));
        }

        if let SyncMode::Publish { packages } = &self.mode {
            if packages.is_empty() {
                return Err(RepoError::validation(
                    "at least one package file must be provided unless --rebuild is set",
                ));
            }
            for package in packages {
                validate_package(package)?;
            }
        }

        Ok(())
    }
}

fn validate_package(path: &Path) -> Result<()> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        RepoError::validation(format!("package {} is not readable: {}", path.display(), e))
    })?;
    if !metadata.is_file() {
        return Err(RepoError::validation(format!(
            "package {} is not a regular file",
            path.display()
        )));
    }
    if path.file_name().is_none() {
        return Err(RepoError::validation(format!(
            "package {} has no file name",
            path.display()
        )));
    }
    Ok(())
}

/// External binaries invoked by the builder, merger and signer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub createrepo: PathBuf,
    pub mergerepo: PathBuf,
    pub rpmsign: PathBuf,
    pub gpg: PathBuf,
    pub expect: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            createrepo: PathBuf::from("createrepo_c"),
            mergerepo: PathBuf::from("mergerepo_c"),
            rpmsign: PathBuf::from("rpmsign"),
            gpg: PathBuf::from("gpg"),
            expect: PathBuf::from("expect"),
        }
    }
}

/// Optional TOML file (`--config`) overriding tool locations
///
/// ```toml
/// signing_key = "Release Engineering <releng@example.com>"
///
/// [tools]
/// createrepo = "/usr/bin/createrepo_c"
/// gpg = "/usr/bin/gpg2"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsFile {
    pub tools: ToolPaths,
    pub signing_key: Option<String>,
}

impl ToolsFile {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| RepoError::local_io(path, e))?;
        toml::from_str(&contents).map_err(|e| {
            RepoError::validation(format!("invalid config file {}: {}", path.display(), e))
        })
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig {
    pub level: LogLevel,

    /// Log file path (None = stderr)
    pub file: Option<PathBuf>,

    /// Shorthand for level = debug
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn publish(packages: Vec<PathBuf>) -> SyncConfig {
        SyncConfig::new(RemotePrefix::new("el9"), SyncMode::Publish { packages })
    }

    #[test]
    fn test_publish_requires_packages() {
        let err = publish(vec![]).validate().unwrap_err();
        assert!(matches!(err, RepoError::Validation(_)));
    }

    #[test]
    fn test_rebuild_needs_no_packages() {
        let config = SyncConfig::new(RemotePrefix::root(), SyncMode::Rebuild);
        assert!(config.validate().is_ok());
        assert!(config.is_rebuild());
    }

    #[test]
    fn test_missing_and_directory_packages_rejected() {
        let dir = TempDir::new().unwrap();
        let err = publish(vec![dir.path().join("nope.rpm")]).validate().unwrap_err();
        assert!(err.to_string().contains("nope.rpm"));

        let err = publish(vec![dir.path().to_path_buf()]).validate().unwrap_err();
        assert!(err.to_string().contains("not a regular file"));

        let pkg = dir.path().join("a-1.0-1.noarch.rpm");
        std::fs::write(&pkg, b"rpm").unwrap();
        assert!(publish(vec![pkg]).validate().is_ok());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = SyncConfig::new(RemotePrefix::root(), SyncMode::Rebuild);
        config.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_passphrase_means_agent() {
        let signing = SigningConfig {
            passphrase: Some(SecretString::from(String::new())),
            key_name: None,
        };
        assert!(signing.passphrase().is_none());

        let signing = SigningConfig {
            passphrase: Some(SecretString::from("hunter2".to_string())),
            key_name: None,
        };
        assert!(signing.passphrase().is_some());
        assert!(!format!("{:?}", signing).contains("hunter2"));
    }

    #[test]
    fn test_tools_file_partial_override() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rpmrepo.toml");
        std::fs::write(
            &path,
            "signing_key = \"releng\"\n[tools]\ngpg = \"/usr/bin/gpg2\"\n",
        )
        .unwrap();

        let file = ToolsFile::from_file(&path).unwrap();
        assert_eq!(file.signing_key.as_deref(), Some("releng"));
        assert_eq!(file.tools.gpg, PathBuf::from("/usr/bin/gpg2"));
        assert_eq!(file.tools.createrepo, PathBuf::from("createrepo_c"));
    }

    #[test]
    fn test_tools_file_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[tools\n").unwrap();
        assert!(matches!(
            ToolsFile::from_file(&path).unwrap_err(),
            RepoError::Validation(_)
        ));
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LogLevel::Error.to_tracing_level(), tracing::Level::ERROR);
        assert_eq!(LogLevel::Trace.to_tracing_level(), tracing::Level::TRACE);
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }
}
