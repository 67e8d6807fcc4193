//! Package and catalog signing
//!
//! Two operations, each in two modes. With no passphrase the key is expected
//! to be usable through an already-unlocked agent and the tools run without
//! any prompt. With a passphrase:
//!
//! - `rpmsign` reads it from the terminal, so it is driven by an `expect`
//!   script. The passphrase reaches the script through the child's
//!   environment, never through its argument list.
//! - `gpg` accepts it on stdin in loopback pinentry mode.
//!
//! Any non-zero exit is an external tool error; nothing is retried.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::process::Command;
use tracing::info;

use crate::config::{SigningConfig, ToolPaths};
use crate::error::{RepoError, Result, ToolStatus};
use crate::repo::Catalog;
use crate::tools::{run_tool, tool_name};

const ENV_PASSPHRASE: &str = "RPMREPO_SIGN_PASSPHRASE";
const ENV_TARGET: &str = "RPMREPO_SIGN_TARGET";
const ENV_RPMSIGN: &str = "RPMREPO_RPMSIGN";
const ENV_KEY: &str = "RPMREPO_SIGN_KEY";

/// Seconds `expect` waits for output from rpmsign before giving up
const EXPECT_TIMEOUT_SECS: u32 = 60;

/// Signs package artifacts and catalog manifests
#[async_trait]
pub trait Signer: Send + Sync {
    /// Embed a signature into the package at `path`, replacing any previous one
    async fn sign_package(&self, path: &Path) -> Result<()>;

    /// Write a detached armored signature next to `manifest` and return its path
    async fn sign_manifest(&self, manifest: &Path) -> Result<PathBuf>;
}

/// Signer backed by `rpmsign` and `gpg`
#[derive(Debug, Clone)]
pub struct GpgSigner {
    tools: ToolPaths,
    signing: SigningConfig,
}

impl GpgSigner {
    pub fn new(tools: ToolPaths, signing: SigningConfig) -> Self {
        Self { tools, signing }
    }

    fn passphrase(&self) -> Option<&SecretString> {
        self.signing.passphrase()
    }

    pub(crate) fn package_command(&self, path: &Path) -> Command {
        match self.passphrase() {
            None => {
                let mut cmd = Command::new(&self.tools.rpmsign);
                cmd.arg("--addsign");
                if let Some(key) = &self.signing.key_name {
                    cmd.arg("--define").arg(format!("_gpg_name {}", key));
                }
                cmd.arg(path);
                cmd
            }
            Some(_) => {
                let mut cmd = Command::new(&self.tools.expect);
                cmd.arg("-c")
                    .arg(self.expect_script())
                    .env(ENV_TARGET, path)
                    .env(ENV_RPMSIGN, &self.tools.rpmsign);
                if let Some(key) = &self.signing.key_name {
                    cmd.env(ENV_KEY, key);
                }
                cmd
            }
        }
    }

    fn expect_script(&self) -> String {
        let define = if self.signing.key_name.is_some() {
            format!(" --define \"_gpg_name $env({})\"", ENV_KEY)
        } else {
            String::new()
        };
        format!(
            r#"set timeout {timeout}
spawn $env({rpmsign}) --addsign{define} $env({target})
expect {{
    -re "(?i)pass ?phrase" {{ send -- "$env({pass})\r"; exp_continue }}
    timeout {{ exit 124 }}
    eof {{ }}
}}
lassign [wait] _ _ _ code
exit $code
"#,
            timeout = EXPECT_TIMEOUT_SECS,
            rpmsign = ENV_RPMSIGN,
            define = define,
            target = ENV_TARGET,
            pass = ENV_PASSPHRASE,
        )
    }

    pub(crate) fn manifest_command(&self, manifest: &Path, signature: &Path) -> Command {
        let mut cmd = Command::new(&self.tools.gpg);
        cmd.arg("--batch").arg("--yes");
        if self.passphrase().is_some() {
            cmd.args(["--pinentry-mode", "loopback", "--passphrase-fd", "0"]);
        }
        if let Some(key) = &self.signing.key_name {
            cmd.arg("--local-user").arg(key);
        }
        cmd.arg("--detach-sign")
            .arg("--armor")
            .arg("--output")
            .arg(signature)
            .arg(manifest);
        cmd
    }
}

#[async_trait]
impl Signer for GpgSigner {
    async fn sign_package(&self, path: &Path) -> Result<()> {
        let mut cmd = self.package_command(path);
        if let Some(passphrase) = self.passphrase() {
            cmd.env(ENV_PASSPHRASE, passphrase.expose_secret());
            info!(package = %path.display(), "signing package (passphrase)");
        } else {
            info!(package = %path.display(), "signing package (agent)");
        }
        run_tool(cmd, None).await
    }

    async fn sign_manifest(&self, manifest: &Path) -> Result<PathBuf> {
        let root = manifest
            .parent()
            .and_then(Path::parent)
            .ok_or_else(|| {
                RepoError::validation(format!("{} is not inside a snapshot", manifest.display()))
            })?;
        let signature = Catalog::signature_path(root);

        let cmd = self.manifest_command(manifest, &signature);
        let tool = tool_name(&cmd);
        info!(
            manifest = %manifest.display(),
            mode = if self.passphrase().is_some() { "passphrase" } else { "agent" },
            "signing catalog manifest"
        );
        run_tool(cmd, self.passphrase()).await?;

        if !signature.is_file() {
            return Err(RepoError::ExternalTool {
                tool,
                status: ToolStatus::MissingOutput(signature),
                stderr: String::new(),
            });
        }
        Ok(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    fn args(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn env(cmd: &Command, key: &str) -> Option<String> {
        cmd.as_std()
            .get_envs()
            .find(|(k, _)| *k == OsStr::new(key))
            .and_then(|(_, v)| v.map(|v| v.to_string_lossy().into_owned()))
    }

    fn signer(passphrase: &str, key: Option<&str>) -> GpgSigner {
        GpgSigner::new(
            ToolPaths::default(),
            SigningConfig {
                passphrase: Some(SecretString::from(passphrase.to_string())),
                key_name: key.map(str::to_string),
            },
        )
    }

    #[test]
    fn test_agent_package_signing() {
        let cmd = signer("", Some("releng")).package_command(Path::new("/w/new/a.rpm"));
        assert_eq!(cmd.as_std().get_program(), "rpmsign");
        assert_eq!(
            args(&cmd),
            vec!["--addsign", "--define", "_gpg_name releng", "/w/new/a.rpm"]
        );
    }

    #[test]
    fn test_passphrase_package_signing_keeps_secret_out_of_argv() {
        let cmd = signer("hunter2", None).package_command(Path::new("/w/new/a.rpm"));
        assert_eq!(cmd.as_std().get_program(), "expect");
        let argv = args(&cmd);
        assert_eq!(argv[0], "-c");
        assert!(argv[1].contains("spawn $env(RPMREPO_RPMSIGN) --addsign $env(RPMREPO_SIGN_TARGET)"));
        assert!(argv.iter().all(|a| !a.contains("hunter2")));
        assert_eq!(env(&cmd, ENV_TARGET).as_deref(), Some("/w/new/a.rpm"));
        assert_eq!(env(&cmd, ENV_PASSPHRASE), None);
    }

    #[test]
    fn test_expect_script_defines_key_when_configured() {
        let script = signer("pw", Some("releng")).expect_script();
        assert!(script.contains("--define \"_gpg_name $env(RPMREPO_SIGN_KEY)\""));
        assert!(script.contains("exit $code"));
    }

    #[test]
    fn test_expect_script_waits_for_eof_once() {
        let script = signer("pw", None).expect_script();
        assert_eq!(script.matches("expect").count(), 1);
        assert!(script.contains("exp_continue"));
    }

    #[test]
    fn test_manifest_signing_modes() {
        let manifest = Path::new("/w/new/repodata/repomd.xml");
        let signature = Path::new("/w/new/repodata/repomd.xml.asc");

        let agent = args(&signer("", None).manifest_command(manifest, signature));
        assert!(!agent.contains(&"--passphrase-fd".to_string()));
        assert_eq!(agent.last().map(String::as_str), Some("/w/new/repodata/repomd.xml"));

        let loopback = args(&signer("pw", Some("releng")).manifest_command(manifest, signature));
        assert!(loopback.windows(2).any(|w| w == ["--pinentry-mode", "loopback"]));
        assert!(loopback.windows(2).any(|w| w == ["--passphrase-fd", "0"]));
        assert!(loopback.windows(2).any(|w| w == ["--local-user", "releng"]));
        assert!(loopback.windows(2).any(|w| w == ["--output", "/w/new/repodata/repomd.xml.asc"]));
    }

    #[cfg(unix)]
    fn stub_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    fn expect_installed() -> bool {
        std::process::Command::new("expect")
            .arg("-v")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    #[cfg(unix)]
    async fn sign_with_rpmsign(body: &str) -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let tools = ToolPaths {
            rpmsign: stub_tool(dir.path(), "rpmsign", body),
            ..ToolPaths::default()
        };
        let signing = SigningConfig {
            passphrase: Some(SecretString::from("hunter2".to_string())),
            key_name: None,
        };
        GpgSigner::new(tools, signing)
            .sign_package(&dir.path().join("a.rpm"))
            .await
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_passphrase_signing_without_prompt_succeeds() {
        if !expect_installed() {
            eprintln!("expect not installed, skipping");
            return;
        }
        sign_with_rpmsign("exit 0").await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_passphrase_signing_answers_prompt() {
        if !expect_installed() {
            eprintln!("expect not installed, skipping");
            return;
        }
        let body = r#"printf 'Enter pass phrase: '
read pw
[ "$pw" = "hunter2" ]"#;
        sign_with_rpmsign(body).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_passphrase_signing_keeps_rpmsign_exit_status() {
        if !expect_installed() {
            eprintln!("expect not installed, skipping");
            return;
        }
        let err = sign_with_rpmsign("exit 3").await.unwrap_err();
        assert!(matches!(
            err,
            RepoError::ExternalTool {
                status: ToolStatus::Exited(3),
                ..
            }
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_signing_is_tool_error() {
        let tools = ToolPaths {
            rpmsign: PathBuf::from("false"),
            ..ToolPaths::default()
        };
        let signer = GpgSigner::new(tools, SigningConfig::default());
        let err = signer.sign_package(Path::new("/w/a.rpm")).await.unwrap_err();
        assert!(matches!(
            err,
            RepoError::ExternalTool {
                status: ToolStatus::Exited(1),
                ..
            }
        ));
    }
}
