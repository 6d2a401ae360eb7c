//! Error types for childproc.
//!
//! Errors are split by the phase in which they are detected:
//! - [`ConfigError`]: rejected while configuring a [`ProcessSpec`](crate::ProcessSpec) or
//!   [`Pipeline`](crate::Pipeline) - nothing was spawned, adjust the configuration and retry
//! - [`OwnershipError`]: an illegal pipe binding was attempted
//! - [`ProcError`]: everything a caller can see, including launch, access, capability,
//!   logic and timeout failures on a live [`Process`](crate::Process)

use crate::disposition::{DispositionKind, Stream};
use crate::process::{Process, ProcessState};
use std::time::Duration;
use thiserror::Error;

/// Configuration rejected before any process was created.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    // Command errors
    /// The argument vector is empty (no executable)
    #[error("command must contain at least one token")]
    EmptyCommand,

    /// A command line could not be split into words
    #[error("cannot tokenize command line {input:?}: {reason}")]
    Tokenize { input: String, reason: &'static str },

    /// An argument token contains an interior NUL byte
    #[error("argument {index} contains a NUL byte")]
    ArgContainsNul { index: usize },

    // Stream errors
    /// A disposition was assigned to a stream it is not defined for
    #[error("{disposition} is not a valid disposition for {stream}")]
    IllegalDisposition {
        stream: Stream,
        disposition: DispositionKind,
    },

    /// A string payload exceeds the configured feed limit
    #[error("stdin payload of {len} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { len: usize, limit: usize },

    // Environment errors
    /// Environment variable name is empty or contains `=` / NUL
    #[error("invalid environment variable name {key:?}: {reason}")]
    EnvKeyInvalid { key: String, reason: &'static str },

    /// Environment variable value contains a NUL byte
    #[error("invalid value for environment variable {key:?}: contains a NUL byte")]
    EnvValueInvalid { key: String },

    /// Environment variable name or value is not valid UTF-8 text
    #[error("environment entry {key:?} is not valid UTF-8 text")]
    EnvNotText { key: String },

    // Working directory errors
    /// Working directory path cannot be used
    #[error("invalid working directory {path:?}: {reason}")]
    CwdInvalid { path: String, reason: &'static str },

    /// The parent's working directory could not be determined
    #[error("cannot determine inherited working directory: {reason}")]
    CwdUnavailable { reason: String },

    // Pipeline errors
    /// A pipeline needs at least one command
    #[error("pipeline requires at least one command")]
    EmptyPipeline,

    /// A stage of a `|`-separated pipeline string is blank
    #[error("pipeline stage {index} is empty")]
    EmptyPipelineStage { index: usize },
}

/// Illegal binding of a pipe endpoint.
///
/// Raised at the point the binding is attempted, never deferred.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OwnershipError {
    /// The pipe already has a reading process
    #[error("pipe {pipe} is already being read by process #{owner}")]
    AlreadyRead { pipe: u64, owner: u64 },

    /// The pipe already has a writing process
    #[error("pipe {pipe} is already being written to by process #{owner}")]
    AlreadyWritten { pipe: u64, owner: u64 },

    /// A process would read its own output
    #[error("process #{owner} cannot read its own output through pipe {pipe}")]
    SelfFeed { pipe: u64, owner: u64 },

    /// The binding would close a loop of output-to-input links
    #[error("binding process #{reader} to pipe {pipe} would create a cycle through process #{writer}")]
    Cycle { pipe: u64, reader: u64, writer: u64 },
}

/// Any failure surfaced by the public API.
#[derive(Debug, Error)]
pub enum ProcError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Ownership(#[from] OwnershipError),

    /// The OS could not create the process
    #[error("failed to launch {program:?}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The stream has no caller-visible handle
    #[error("{stream} is not accessible: {reason}")]
    Access { stream: Stream, reason: &'static str },

    /// The platform lacks the signal support required by the operation
    #[error("{operation} is not supported on this platform")]
    Capability { operation: &'static str },

    /// The operation is not legal in the current lifecycle state
    #[error("cannot {operation} a process that is {state}")]
    Logic {
        operation: &'static str,
        state: ProcessState,
    },

    /// `wait` exceeded its bound. Safe to retry; the process is unaffected.
    #[error("process did not finish within {limit:?}")]
    Timeout { limit: Duration },

    /// Signal delivery failed at the OS level
    #[error("failed to send {signal} to process {pid}: {reason}")]
    Signal {
        pid: u32,
        signal: String,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcError {
    /// True for errors that leave the process untouched and may simply be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProcError::Timeout { .. })
    }
}

/// Result type defaulting to [`ProcError`].
pub type Result<T, E = ProcError> = std::result::Result<T, E>;

/// A pipeline stage failed to spawn.
///
/// Stages spawned before the failing one are still running and are handed back in
/// `spawned`; they are not cleaned up implicitly.
#[derive(Debug, Error)]
#[error("pipeline stage {stage} failed: {source}")]
pub struct PipelineError {
    /// Index of the stage that failed.
    pub stage: usize,

    /// Why it failed.
    #[source]
    pub source: ProcError,

    /// Processes already spawned, in pipeline order.
    pub spawned: Vec<Process>,
}

impl PipelineError {
    /// Force-terminate every already-spawned stage and return the underlying error.
    pub async fn cleanup(mut self) -> ProcError {
        for process in self.spawned.iter_mut() {
            if let Err(e) = process.terminate(true).await {
                tracing::warn!(pid = process.pid(), error = %e, "failed to clean up pipeline stage");
            }
        }
        self.source
    }
}

impl From<PipelineError> for ProcError {
    fn from(err: PipelineError) -> Self {
        err.source
    }
}
