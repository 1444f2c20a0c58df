#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    ffi::{OsStr, OsString},
    path::Path,
    process::{ExitStatus, Stdio},
    time::Duration,
};

use anyhow::Context;
use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, BufReader},
    process::{Child, Command},
    time::timeout,
};

/// Drop guard that terminates a spawned child process if it is abandoned,
/// which is what enforces the hard timeout.
struct ChildDropGuard(Option<Child>);

impl ChildDropGuard {
    /// Wraps the provided child process with the drop guard.
    fn new(child: Child) -> Self {
        Self(Some(child))
    }

    /// Returns a mutable reference to the underlying child process.
    fn child_mut(&mut self) -> anyhow::Result<&mut Child> {
        self.0
            .as_mut()
            .context("child process already taken from guard")
    }

    /// Prevents the guard from killing the process on drop.
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for ChildDropGuard {
    fn drop(&mut self) {
        if let Some(child) = self.0.as_mut() {
            let _ = child.start_kill();
        }
    }
}

/// Failures of the process layer.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The program could not be started at all.
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        /// Program that was being started.
        program: String,
        /// Underlying OS error.
        #[source]
        source:  std::io::Error,
    },
    /// The process did not finish before its deadline and was killed.
    #[error("subprocess timed out after {0:?}")]
    TimedOut(Duration),
    /// Anything else (pipe or join failures).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProcessError {
    /// True if the process was killed for exceeding its deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProcessError::TimedOut(_))
    }
}

/// Captured result of a finished subprocess.
#[derive(Debug)]
pub struct Collected {
    /// Exit status returned by the process.
    pub status: ExitStatus,
    /// Contents written to stdout.
    pub stdout: Vec<u8>,
    /// Contents written to stderr.
    pub stderr: Vec<u8>,
}

impl Collected {
    /// Exit code of the process; termination by signal `N` is reported as
    /// `-N`.
    pub fn code(&self) -> i32 {
        signed_exit_code(&self.status)
    }

    /// True if the process exited with code 0.
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Stdout decoded lossily.
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stderr decoded lossily.
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Stdout followed by stderr.
    pub fn combined(&self) -> String {
        let mut out = self.stdout_lossy();
        out.push_str(&self.stderr_lossy());
        out
    }
}

/// Maps an exit status onto a signed code.
#[cfg(unix)]
fn signed_exit_code(status: &ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => -signal,
        (None, None) => -1,
    }
}

/// Maps an exit status onto a signed code.
#[cfg(not(unix))]
fn signed_exit_code(status: &ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// Describes how stdin should be wired for the spawned process.
#[derive(Debug)]
pub enum StdinSource {
    /// Attach nothing to stdin.
    Null,
    /// Write the provided bytes, then close stdin.
    Bytes(Vec<u8>),
}

/// Spawns a command, optionally feeds stdin, and collects stdout/stderr.
///
/// With a `deadline`, the child is killed once it expires and
/// [`ProcessError::TimedOut`] is returned.
pub async fn run_collect(
    program: impl AsRef<OsStr>,
    args: &[OsString],
    stdin: StdinSource,
    cwd: Option<&Path>,
    deadline: Option<Duration>,
) -> Result<Collected, ProcessError> {
    let program = program.as_ref();
    let mut cmd = Command::new(program);
    cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());

    match &stdin {
        StdinSource::Null => {
            cmd.stdin(Stdio::null());
        }
        StdinSource::Bytes(_) => {
            cmd.stdin(Stdio::piped());
        }
    }

    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: program.to_string_lossy().into_owned(),
        source,
    })?;
    let mut guard = ChildDropGuard::new(child);

    if let StdinSource::Bytes(bytes) = stdin
        && let Some(mut handle) = guard.child_mut()?.stdin.take()
    {
        tokio::spawn(async move {
            if !bytes.is_empty() {
                let _ = handle.write_all(&bytes).await;
            }
            let _ = handle.shutdown().await;
        });
    }

    let stdout = guard
        .child_mut()?
        .stdout
        .take()
        .context("missing stdout pipe")?;
    let stderr = guard
        .child_mut()?
        .stderr
        .take()
        .context("missing stderr pipe")?;

    let out_task = tokio::spawn(async move {
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .await
            .context("failed to read stdout")?;
        Ok::<Vec<u8>, anyhow::Error>(buf)
    });

    let err_task = tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .await
            .context("failed to read stderr")?;
        Ok::<Vec<u8>, anyhow::Error>(buf)
    });

    let wait_future = async move {
        let mut guard = guard;
        let status = guard
            .child_mut()?
            .wait()
            .await
            .context("failed to wait on process")?;
        let stdout = out_task.await.context("stdout task join error")??;
        let stderr = err_task.await.context("stderr task join error")??;
        guard.disarm();
        Ok::<Collected, anyhow::Error>(Collected {
            status,
            stdout,
            stderr,
        })
    };

    match deadline {
        Some(limit) => match timeout(limit, wait_future).await {
            Ok(collected) => Ok(collected?),
            Err(_) => Err(ProcessError::TimedOut(limit)),
        },
        None => Ok(wait_future.await?),
    }
}
