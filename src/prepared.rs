//! Spawn snapshots.
//!
//! [`ProcessSpec::spawn`](crate::ProcessSpec::spawn) copies its fields into a
//! [`PreparedSpawn`], so nothing done to the spec afterwards can affect the child.
//! `launch` turns the snapshot's dispositions into OS-level stdio, creates the
//! process and collects the parent-side pipe endpoints.

use crate::disposition::{Disposition, DispositionKind, Stream};
use crate::env::Environment;
use crate::error::{ConfigError, ProcError};
use crate::limits::FeedLimits;
use crate::pipe::{Lineage, ReadPipe};
use crate::process::{Endpoint, Process};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Where stdin comes from once any process-output link has been claimed.
#[derive(Debug)]
pub(crate) enum Input {
    Plain(Disposition),
    Upstream(ReadPipe),
}

/// An immutable copy of everything needed to create one process.
#[derive(Debug)]
pub(crate) struct PreparedSpawn {
    pub(crate) args: Vec<String>,
    pub(crate) env: Environment,
    pub(crate) cwd: PathBuf,
    pub(crate) lineage: Lineage,
    pub(crate) stdin: Input,
    pub(crate) stdout: Disposition,
    pub(crate) stderr: Disposition,
    pub(crate) limits: FeedLimits,
}

impl PreparedSpawn {
    /// Create the process.
    ///
    /// # Errors
    ///
    /// - `Launch` if the OS refuses to create the process (e.g. executable not found)
    /// - `Io` if a handle cannot be duplicated for the child
    pub(crate) fn launch(self) -> Result<Process, ProcError> {
        let program = self.args[0].clone();
        debug!(args = ?self.args, cwd = %self.cwd.display(), "spawning process");

        let mut cmd = Command::new(&program);
        cmd.args(&self.args[1..])
            .env_clear()
            .envs(self.env.as_map())
            .current_dir(&self.cwd);

        let stdin_kind = match &self.stdin {
            Input::Plain(d) => d.kind(),
            Input::Upstream(_) => DispositionKind::FromProcessOutput,
        };
        let stdout_kind = self.stdout.kind();
        let stderr_kind = self.stderr.kind();

        let (stdin_stdio, payload) = input_stdio(self.stdin)?;
        cmd.stdin(stdin_stdio);

        let mut merged = None;
        if stderr_kind == DispositionKind::MergeWithStdout {
            let (out, err, reader) = merged_stdio(self.stdout)?;
            cmd.stdout(out).stderr(err);
            merged = reader;
        } else {
            cmd.stdout(output_stdio(self.stdout, Stream::Stdout)?);
            cmd.stderr(output_stdio(self.stderr, Stream::Stderr)?);
        }

        let mut child = cmd.spawn().map_err(|e| {
            error!(program = %program, error = %e, "failed to spawn process");
            ProcError::Launch {
                program: program.clone(),
                source: e,
            }
        })?;

        let pid = child.id().ok_or_else(|| ProcError::Launch {
            program: program.clone(),
            source: std::io::Error::other("spawned child did not have a pid"),
        })?;
        debug!(pid, program = %program, "spawned process");

        let mut feeder = None;
        let stdin = match (child.stdin.take(), payload) {
            (Some(pipe), Some(bytes)) => {
                feeder = Some(spawn_feeder(pid, pipe, bytes, self.limits.timeout));
                Endpoint::Unavailable(DispositionKind::StringSource)
            }
            (Some(pipe), None) => Endpoint::Available(pipe),
            (None, _) => Endpoint::Unavailable(stdin_kind),
        };

        let stdout = match (merged, child.stdout.take()) {
            (Some(reader), _) => Endpoint::Available(reader),
            (None, Some(pipe)) => Endpoint::Available(ReadPipe::Stdout(pipe)),
            (None, None) => Endpoint::Unavailable(stdout_kind),
        };

        let stderr = match child.stderr.take() {
            Some(pipe) => Endpoint::Available(ReadPipe::Stderr(pipe)),
            None => Endpoint::Unavailable(stderr_kind),
        };

        Ok(Process {
            pid,
            args: self.args,
            env: self.env,
            cwd: self.cwd,
            lineage: self.lineage,
            child,
            stdin,
            stdout,
            stderr,
            feeder,
            stopped: false,
            status: None,
        })
    }
}

fn input_stdio(input: Input) -> Result<(Stdio, Option<Vec<u8>>), ProcError> {
    Ok(match input {
        Input::Upstream(pipe) => (pipe.into_stdio()?, None),
        Input::Plain(Disposition::Piped) => (Stdio::piped(), None),
        Input::Plain(Disposition::Inherited) => (Stdio::inherit(), None),
        Input::Plain(Disposition::Null) => (Stdio::null(), None),
        Input::Plain(Disposition::ExternalHandle(file)) => (Stdio::from(file), None),
        Input::Plain(Disposition::StringSource(bytes)) => (Stdio::piped(), Some(bytes)),
        Input::Plain(other) => {
            return Err(ConfigError::IllegalDisposition {
                stream: Stream::Stdin,
                disposition: other.kind(),
            }
            .into())
        }
    })
}

fn output_stdio(disposition: Disposition, stream: Stream) -> Result<Stdio, ProcError> {
    Ok(match disposition {
        Disposition::Piped => Stdio::piped(),
        Disposition::Inherited => Stdio::inherit(),
        Disposition::Null => Stdio::null(),
        Disposition::ExternalHandle(file) => Stdio::from(file),
        other => {
            return Err(ConfigError::IllegalDisposition {
                stream,
                disposition: other.kind(),
            }
            .into())
        }
    })
}

/// stdout and stderr pointing at the same destination.
fn merged_stdio(stdout: Disposition) -> Result<(Stdio, Stdio, Option<ReadPipe>), ProcError> {
    match stdout {
        Disposition::Null => Ok((Stdio::null(), Stdio::null(), None)),
        Disposition::ExternalHandle(file) => {
            let dup = file.try_clone()?;
            Ok((Stdio::from(file), Stdio::from(dup), None))
        }
        #[cfg(unix)]
        Disposition::Piped => {
            let (tx, rx) = tokio::net::unix::pipe::pipe()?;
            let write_end = tx.into_blocking_fd()?;
            let dup = write_end.try_clone()?;
            Ok((Stdio::from(write_end), Stdio::from(dup), Some(ReadPipe::Merged(rx))))
        }
        #[cfg(unix)]
        Disposition::Inherited => {
            use std::os::fd::AsFd;

            let parent_stdout = std::io::stdout().as_fd().try_clone_to_owned()?;
            Ok((Stdio::inherit(), Stdio::from(parent_stdout), None))
        }
        #[cfg(not(unix))]
        Disposition::Piped | Disposition::Inherited => Err(ProcError::Capability {
            operation: "merging stderr into a shared stdout",
        }),
        other => Err(ConfigError::IllegalDisposition {
            stream: Stream::Stdout,
            disposition: other.kind(),
        }
        .into()),
    }
}

/// Write `payload` to the child's stdin on a background task, then close it.
fn spawn_feeder(
    pid: u32,
    mut stdin: ChildStdin,
    payload: Vec<u8>,
    limit: Duration,
) -> JoinHandle<Result<(), ProcError>> {
    tokio::spawn(async move {
        let write = async {
            stdin.write_all(&payload).await?;
            stdin.shutdown().await
        };
        let result = match tokio::time::timeout(limit, write).await {
            Ok(Ok(())) => {
                debug!(pid, bytes = payload.len(), "stdin payload written");
                Ok(())
            }
            Ok(Err(e)) => {
                debug!(pid, error = %e, "stdin payload not fully written");
                Err(ProcError::Io(e))
            }
            Err(_) => {
                warn!(pid, ?limit, "stdin payload write timed out, closing stdin");
                Err(ProcError::Timeout { limit })
            }
        };
        drop(stdin);
        result
    })
}
