//! External process runner
//!
//! createrepo_c, mergerepo_c, rpmsign and gpg are all driven through
//! [`run_tool`]: spawn, optionally feed stdin, wait, and turn anything but a
//! zero exit into [`RepoError::ExternalTool`] carrying the tail of stderr.

use std::process::Stdio;

use secrecy::{ExposeSecret, SecretString};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{RepoError, Result, ToolStatus};

/// Bytes of stderr kept in the error
const STDERR_TAIL: usize = 4096;

/// Name used in errors and logs for a command
pub(crate) fn tool_name(cmd: &Command) -> String {
    let program = cmd.as_std().get_program();
    std::path::Path::new(program)
        .file_name()
        .unwrap_or(program)
        .to_string_lossy()
        .into_owned()
}

/// Run `cmd` to completion. When `stdin` is given it is written followed by
/// a newline and the pipe is closed.
pub(crate) async fn run_tool(mut cmd: Command, stdin: Option<&SecretString>) -> Result<()> {
    let tool = tool_name(&cmd);
    debug!(tool = %tool, args = ?cmd.as_std().get_args().collect::<Vec<_>>(), "running external tool");

    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| RepoError::ExternalTool {
        tool: tool.clone(),
        status: ToolStatus::SpawnFailed(e.to_string()),
        stderr: String::new(),
    })?;

    if let (Some(secret), Some(mut pipe)) = (stdin, child.stdin.take()) {
        let mut line = secret.expose_secret().as_bytes().to_vec();
        line.push(b'\n');
        // a tool that exits before reading stdin reports through its status
        if let Err(e) = pipe.write_all(&line).await {
            debug!(tool = %tool, error = %e, "stdin closed early");
        }
        drop(pipe);
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| RepoError::ExternalTool {
            tool: tool.clone(),
            status: ToolStatus::SpawnFailed(e.to_string()),
            stderr: String::new(),
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        debug!(tool = %tool, "{}", stdout.trim_end());
    }

    if output.status.success() {
        return Ok(());
    }

    Err(RepoError::ExternalTool {
        tool,
        status: ToolStatus::from_exit(output.status),
        stderr: tail(&String::from_utf8_lossy(&output.stderr), STDERR_TAIL),
    })
}

fn tail(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_respects_char_boundaries() {
        assert_eq!(tail("short", 10), "short");
        assert_eq!(tail("abcdef", 3), "def");
        let s = "ééé";
        let t = tail(s, 3);
        assert!(s.ends_with(&t));
    }

    #[test]
    fn test_tool_name_uses_file_name() {
        let cmd = Command::new("/usr/bin/createrepo_c");
        assert_eq!(tool_name(&cmd), "createrepo_c");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_success_and_failure() {
        assert!(run_tool(Command::new("true"), None).await.is_ok());

        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo 'bad passphrase' >&2; exit 3"]);
        match run_tool(cmd, None).await.unwrap_err() {
            RepoError::ExternalTool { tool, status, stderr } => {
                assert_eq!(tool, "sh");
                assert_eq!(status, ToolStatus::Exited(3));
                assert!(stderr.contains("bad passphrase"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdin_is_fed() {
        let secret = SecretString::from("s3cret".to_string());
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "read line; [ \"$line\" = s3cret ]"]);
        assert!(run_tool(cmd, Some(&secret)).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_failure() {
        let err = run_tool(Command::new("/nonexistent/rpmrepo-tool"), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RepoError::ExternalTool {
                status: ToolStatus::SpawnFailed(_),
                ..
            }
        ));
    }
}
