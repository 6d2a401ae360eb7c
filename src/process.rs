//! Live child processes.
//!
//! A [`Process`] tracks one spawned child through three states:
//!
//! ```text
//!            stop()                 exits / terminate(force)
//! Running ----------> Stopped  ------------------------------> Finished(status)
//!    ^     <----------    |
//!    |       start()      |
//!    +--------------------+-----------------------------------> Finished(status)
//! ```
//!
//! Completion is detected lazily: every state query polls the OS without blocking.
//! Dropping a `Process` does not kill or reap the child; use [`Process::guard`] for a
//! handle that force-kills an unfinished child when it goes out of scope.

use crate::disposition::{DispositionKind, Stream};
use crate::env::Environment;
use crate::error::ProcError;
use crate::pipe::{Lineage, ProcessOutput, ReadPipe};
use crate::signal;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::{Child, ChildStdin};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Lifecycle state of a [`Process`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Stopped,
    Finished(ExitStatus),
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::Running => write!(f, "running"),
            ProcessState::Stopped => write!(f, "stopped"),
            ProcessState::Finished(status) => write!(f, "finished ({})", status),
        }
    }
}

/// Parent-side endpoint of one standard stream.
#[derive(Debug)]
pub(crate) enum Endpoint<T> {
    Available(T),
    Taken,
    Unavailable(DispositionKind),
}

impl<T> Endpoint<T> {
    fn get(&mut self, stream: Stream) -> Result<&mut T, ProcError> {
        match self {
            Endpoint::Available(handle) => Ok(handle),
            other => Err(other.access_error(stream)),
        }
    }

    fn take(&mut self, stream: Stream) -> Result<T, ProcError> {
        match std::mem::replace(self, Endpoint::Taken) {
            Endpoint::Available(handle) => Ok(handle),
            other => {
                let err = other.access_error(stream);
                *self = other;
                Err(err)
            }
        }
    }

    fn access_error(&self, stream: Stream) -> ProcError {
        let reason = match self {
            Endpoint::Available(_) => "handle is available",
            Endpoint::Taken => "handle was already taken",
            Endpoint::Unavailable(kind) => match kind {
                DispositionKind::Inherited => "stream is inherited from the parent",
                DispositionKind::Null => "stream is connected to the null device",
                DispositionKind::ExternalHandle => "stream is bound to an external handle",
                DispositionKind::MergeWithStdout => "stderr is merged into stdout",
                DispositionKind::StringSource => "stdin is fed from a string payload",
                DispositionKind::FromProcessOutput => "stdin is fed by another process",
                DispositionKind::Piped => "pipe was not created",
            },
        };
        ProcError::Access { stream, reason }
    }
}

/// A spawned child process.
///
/// Created by [`ProcessSpec::spawn`](crate::ProcessSpec::spawn) or
/// [`Pipeline::spawn_all`](crate::Pipeline::spawn_all).
#[derive(Debug)]
pub struct Process {
    pub(crate) pid: u32,
    pub(crate) args: Vec<String>,
    pub(crate) env: Environment,
    pub(crate) cwd: PathBuf,
    pub(crate) lineage: Lineage,
    pub(crate) child: Child,
    pub(crate) stdin: Endpoint<ChildStdin>,
    pub(crate) stdout: Endpoint<ReadPipe>,
    pub(crate) stderr: Endpoint<ReadPipe>,
    pub(crate) feeder: Option<JoinHandle<Result<(), ProcError>>>,
    pub(crate) stopped: bool,
    pub(crate) status: Option<ExitStatus>,
}

impl Process {
    /// OS process id.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The argument vector the process was spawned with.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The environment the process was spawned with.
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// The working directory the process was spawned in.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Identity of this process and everything feeding into it.
    pub fn lineage(&self) -> &Lineage {
        &self.lineage
    }

    /// Writable end of the child's stdin pipe.
    ///
    /// Only a `Piped` stdin has one. With a string or byte payload the write end
    /// belongs to a background task that writes the payload and then closes it, so
    /// this returns `Access`; use [`input_fed`](Process::input_fed) to wait for the
    /// write instead.
    pub fn stdin(&mut self) -> Result<&mut ChildStdin, ProcError> {
        self.stdin.get(Stream::Stdin)
    }

    /// Readable end of the child's stdout pipe (shared with stderr when merged).
    pub fn stdout(&mut self) -> Result<&mut ReadPipe, ProcError> {
        self.stdout.get(Stream::Stdout)
    }

    /// Readable end of the child's stderr pipe.
    pub fn stderr(&mut self) -> Result<&mut ReadPipe, ProcError> {
        self.stderr.get(Stream::Stderr)
    }

    /// Take ownership of the stdin pipe. Dropping it closes the child's input.
    pub fn take_stdin(&mut self) -> Result<ChildStdin, ProcError> {
        self.stdin.take(Stream::Stdin)
    }

    pub fn take_stdout(&mut self) -> Result<ReadPipe, ProcError> {
        self.stdout.take(Stream::Stdout)
    }

    pub fn take_stderr(&mut self) -> Result<ReadPipe, ProcError> {
        self.stderr.take(Stream::Stderr)
    }

    /// Detach stdout so it can feed another process's stdin.
    pub fn output_source(&mut self) -> Result<ProcessOutput, ProcError> {
        let stream = self.stdout.take(Stream::Stdout)?;
        Ok(ProcessOutput::new(&self.lineage, stream)?)
    }

    /// Detach stderr so it can feed another process's stdin.
    pub fn error_source(&mut self) -> Result<ProcessOutput, ProcError> {
        let stream = self.stderr.take(Stream::Stderr)?;
        Ok(ProcessOutput::new(&self.lineage, stream)?)
    }

    /// Current lifecycle state. Never blocks.
    pub fn state(&mut self) -> Result<ProcessState, ProcError> {
        if let Some(status) = self.exit_status()? {
            return Ok(ProcessState::Finished(status));
        }
        if self.stopped {
            Ok(ProcessState::Stopped)
        } else {
            Ok(ProcessState::Running)
        }
    }

    /// Exit status, or `None` while the child has not finished. Never blocks.
    pub fn exit_status(&mut self) -> Result<Option<ExitStatus>, ProcError> {
        if self.status.is_none() {
            if let Some(status) = self.child.try_wait()? {
                debug!(pid = self.pid, %status, "process finished");
                self.record_exit(status);
            }
        }
        Ok(self.status)
    }

    pub fn is_running(&mut self) -> Result<bool, ProcError> {
        Ok(self.state()? == ProcessState::Running)
    }

    /// True while suspended; false once finished, even if it was stopped at exit.
    pub fn is_stopped(&mut self) -> Result<bool, ProcError> {
        Ok(self.state()? == ProcessState::Stopped)
    }

    pub fn is_finished(&mut self) -> Result<bool, ProcError> {
        Ok(self.exit_status()?.is_some())
    }

    /// Suspend a running process.
    ///
    /// # Errors
    ///
    /// - `Capability` if the platform cannot suspend processes
    /// - `Logic` unless the process is `Running`
    pub fn stop(&mut self) -> Result<(), ProcError> {
        signal::require_job_control("stop")?;
        match self.state()? {
            ProcessState::Running => {
                signal::suspend(self.pid)?;
                self.stopped = true;
                Ok(())
            }
            state => Err(ProcError::Logic {
                operation: "stop",
                state,
            }),
        }
    }

    /// Resume a stopped process.
    ///
    /// # Errors
    ///
    /// - `Capability` if the platform cannot resume processes
    /// - `Logic` unless the process is `Stopped`
    pub fn start(&mut self) -> Result<(), ProcError> {
        signal::require_job_control("start")?;
        match self.state()? {
            ProcessState::Stopped => {
                signal::resume(self.pid)?;
                self.stopped = false;
                Ok(())
            }
            state => Err(ProcError::Logic {
                operation: "start",
                state,
            }),
        }
    }

    /// Ask the process to terminate.
    ///
    /// Without `force` this is a request the child may handle or ignore, and a stopped
    /// child will not act on it until resumed. With `force` the child is killed
    /// unconditionally (even when stopped) and reaped before this returns, so it is
    /// `Finished` afterwards; it gets no chance to flush buffers or release resources.
    ///
    /// Terminating a finished process is a no-op.
    pub async fn terminate(&mut self, force: bool) -> Result<(), ProcError> {
        if self.is_finished()? {
            return Ok(());
        }
        if force {
            debug!(pid = self.pid, "killing process");
            self.child.kill().await?;
            self.exit_status()?;
            return Ok(());
        }
        self.request_termination()
    }

    #[cfg(unix)]
    fn request_termination(&mut self) -> Result<(), ProcError> {
        signal::request_termination(self.pid)
    }

    #[cfg(not(unix))]
    fn request_termination(&mut self) -> Result<(), ProcError> {
        self.child.start_kill()?;
        Ok(())
    }

    /// Send an arbitrary signal. Does not change the tracked stopped flag.
    ///
    /// # Errors
    ///
    /// `Logic` if the process has already finished, since its pid may have been reused.
    #[cfg(unix)]
    pub fn kill(&mut self, signal: signal::Signal) -> Result<(), ProcError> {
        if let Some(status) = self.exit_status()? {
            return Err(ProcError::Logic {
                operation: "signal",
                state: ProcessState::Finished(status),
            });
        }
        signal::send(self.pid, signal)
    }

    /// Block until the process finishes, or until `timeout` elapses.
    ///
    /// A stopped process does not finish until it is resumed or force-terminated.
    ///
    /// # Errors
    ///
    /// `Timeout` if the bound expires. The process is unaffected and `wait` can be
    /// called again.
    pub async fn wait(&mut self, timeout: Option<Duration>) -> Result<ExitStatus, ProcError> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        let status = match timeout {
            None => self.child.wait().await?,
            Some(limit) => tokio::time::timeout(limit, self.child.wait())
                .await
                .map_err(|_| ProcError::Timeout { limit })??,
        };
        self.record_exit(status);
        Ok(status)
    }

    /// Wait for a string payload to be fully written to stdin.
    ///
    /// Returns immediately if there is no payload or its outcome was already collected.
    pub async fn input_fed(&mut self) -> Result<(), ProcError> {
        match self.feeder.take() {
            Some(handle) => handle.await.map_err(std::io::Error::other)?,
            None => Ok(()),
        }
    }

    /// Wrap in a guard that force-kills the child if it is still unfinished on drop.
    pub fn guard(self) -> ProcessGuard {
        ProcessGuard {
            process: self,
            armed: true,
        }
    }

    fn record_exit(&mut self, status: ExitStatus) {
        self.status = Some(status);
        self.stopped = false;
    }
}

/// Scoped handle to a [`Process`].
///
/// When dropped, a child that has not finished is killed. Call
/// [`disarm`](ProcessGuard::disarm) to let it outlive the guard.
#[derive(Debug)]
pub struct ProcessGuard {
    process: Process,
    armed: bool,
}

impl ProcessGuard {
    /// Keep the child running after the guard is dropped.
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Deref for ProcessGuard {
    type Target = Process;

    fn deref(&self) -> &Process {
        &self.process
    }
}

impl DerefMut for ProcessGuard {
    fn deref_mut(&mut self) -> &mut Process {
        &mut self.process
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.process.child.try_wait() {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!(pid = self.process.pid, "guard dropped, killing process");
                if let Err(e) = self.process.child.start_kill() {
                    warn!(pid = self.process.pid, error = %e, "failed to kill guarded process");
                }
            }
            Err(e) => {
                warn!(pid = self.process.pid, error = %e, "failed to poll guarded process");
            }
        }
    }
}
