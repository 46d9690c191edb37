use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use scaffold_core::ToolInvocation;
use tokio::process::Command;

use crate::error::VerifyError;

/// Captured result of a tool that ran to completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// Run `invocation` inside `cwd`, capturing output, with a wall-clock limit.
///
/// The child leads its own process group; on timeout the whole group is
/// killed so helpers spawned by the tool do not outlive the call.
pub async fn run_tool(
    invocation: &ToolInvocation,
    cwd: &Path,
    timeout: Duration,
) -> Result<ToolOutput, VerifyError> {
    let rendered = invocation.render();

    let mut command = Command::new(&invocation.program);
    command
        .args(&invocation.args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let started = Instant::now();
    let child = command.spawn().map_err(|source| VerifyError::Io {
        command: rendered.clone(),
        source,
    })?;
    let pid = child.id();

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(ToolOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration: started.elapsed(),
        }),
        Ok(Err(source)) => Err(VerifyError::Io {
            command: rendered,
            source,
        }),
        Err(_elapsed) => {
            // Dropping the wait future dropped the child, which kill_on_drop
            // already signalled; the group kill reaches its descendants.
            if let Some(pid) = pid {
                kill_process_group(pid);
            }
            tracing::warn!(command = %rendered, cwd = %cwd.display(), ?timeout, "tool timed out");
            Err(VerifyError::Timeout {
                command: rendered,
                timeout,
            })
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: killpg has no memory-safety preconditions; a stale group id
    // only yields ESRCH.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        tracing::debug!(pgid, error = %std::io::Error::last_os_error(), "killpg failed");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}
