//! Signal delivery.
//!
//! On Unix, suspend/resume use SIGSTOP/SIGCONT and graceful termination uses SIGTERM.
//! Other platforms have no job-control signals; the operations that need them report
//! [`ProcError::Capability`] instead of silently doing nothing.

use crate::error::ProcError;

#[cfg(unix)]
pub use nix::sys::signal::Signal;

/// Whether this platform can suspend and resume processes.
pub const JOB_CONTROL: bool = cfg!(unix);

/// Fail with `Capability` unless job control is available.
pub(crate) fn require_job_control(operation: &'static str) -> Result<(), ProcError> {
    if JOB_CONTROL {
        Ok(())
    } else {
        Err(ProcError::Capability { operation })
    }
}

#[cfg(unix)]
pub(crate) fn suspend(pid: u32) -> Result<(), ProcError> {
    send(pid, Signal::SIGSTOP)
}

#[cfg(unix)]
pub(crate) fn resume(pid: u32) -> Result<(), ProcError> {
    send(pid, Signal::SIGCONT)
}

#[cfg(unix)]
pub(crate) fn request_termination(pid: u32) -> Result<(), ProcError> {
    send(pid, Signal::SIGTERM)
}

/// Send `signal` to a single process.
///
/// `ESRCH` is treated as success: the process is already gone.
#[cfg(unix)]
pub(crate) fn send(pid: u32, signal: Signal) -> Result<(), ProcError> {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    use tracing::{debug, error};

    debug!(pid, signal = signal.as_str(), "sending signal");

    match kill(Pid::from_raw(pid as i32), signal) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => {
            debug!(pid, "process already exited");
            Ok(())
        }
        Err(e) => {
            error!(pid, signal = signal.as_str(), error = %e, "failed to send signal");
            Err(ProcError::Signal {
                pid,
                signal: signal.as_str().to_string(),
                reason: e.to_string(),
            })
        }
    }
}

#[cfg(not(unix))]
pub(crate) fn suspend(_pid: u32) -> Result<(), ProcError> {
    Err(ProcError::Capability { operation: "stop" })
}

#[cfg(not(unix))]
pub(crate) fn resume(_pid: u32) -> Result<(), ProcError> {
    Err(ProcError::Capability { operation: "start" })
}
