//! Stream dispositions.
//!
//! A [`Disposition`] says what a child's stdin, stdout or stderr is connected to.
//! Raw caller values (open files, byte payloads, another process's output) convert
//! into a disposition through `From`, and every disposition is checked against the
//! stream it is assigned to when it is set, not when the process is spawned.

use crate::error::ConfigError;
use crate::pipe::ProcessOutput;
use std::fmt;
use std::fs::File;

/// One of the three standard streams of a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Stdin,
    Stdout,
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Stdin => write!(f, "stdin"),
            Stream::Stdout => write!(f, "stdout"),
            Stream::Stderr => write!(f, "stderr"),
        }
    }
}

/// The tag of a [`Disposition`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispositionKind {
    Piped,
    Inherited,
    Null,
    MergeWithStdout,
    ExternalHandle,
    StringSource,
    FromProcessOutput,
}

impl fmt::Display for DispositionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispositionKind::Piped => write!(f, "piped"),
            DispositionKind::Inherited => write!(f, "inherited"),
            DispositionKind::Null => write!(f, "null"),
            DispositionKind::MergeWithStdout => write!(f, "merge-with-stdout"),
            DispositionKind::ExternalHandle => write!(f, "external handle"),
            DispositionKind::StringSource => write!(f, "string source"),
            DispositionKind::FromProcessOutput => write!(f, "process output"),
        }
    }
}

/// What a child's standard stream is connected to.
#[derive(Debug, Default)]
pub enum Disposition {
    /// Open an anonymous pipe; the parent's end is available on the [`Process`](crate::Process).
    #[default]
    Piped,

    /// Share the parent's corresponding stream.
    Inherited,

    /// EOF on stdin, discarded output on stdout/stderr.
    Null,

    /// Send stderr wherever stdout goes. Only valid for stderr.
    MergeWithStdout,

    /// Bind the stream to a caller-supplied open file.
    ///
    /// The file is duplicated on every spawn, so one spec can be spawned repeatedly.
    ExternalHandle(File),

    /// Write these bytes to the child's stdin once it starts, then close it.
    /// Only valid for stdin.
    StringSource(Vec<u8>),

    /// Read from another process's piped output. Only valid for stdin.
    FromProcessOutput(ProcessOutput),
}

impl Disposition {
    /// Build a [`Disposition::StringSource`] from any byte payload.
    pub fn bytes(payload: impl Into<Vec<u8>>) -> Self {
        Disposition::StringSource(payload.into())
    }

    /// The tag of this disposition.
    pub fn kind(&self) -> DispositionKind {
        match self {
            Disposition::Piped => DispositionKind::Piped,
            Disposition::Inherited => DispositionKind::Inherited,
            Disposition::Null => DispositionKind::Null,
            Disposition::MergeWithStdout => DispositionKind::MergeWithStdout,
            Disposition::ExternalHandle(_) => DispositionKind::ExternalHandle,
            Disposition::StringSource(_) => DispositionKind::StringSource,
            Disposition::FromProcessOutput(_) => DispositionKind::FromProcessOutput,
        }
    }

    /// Check that this disposition is defined for `stream`.
    pub fn validate_for(&self, stream: Stream) -> Result<(), ConfigError> {
        if self.kind().is_legal_for(stream) {
            Ok(())
        } else {
            Err(ConfigError::IllegalDisposition {
                stream,
                disposition: self.kind(),
            })
        }
    }

    /// Duplicate this disposition for another spawn.
    ///
    /// Files are re-opened through `try_clone`. A process output link is one-shot and
    /// cannot be duplicated.
    pub(crate) fn duplicate(&self, stream: Stream) -> Result<Disposition, crate::ProcError> {
        Ok(match self {
            Disposition::Piped => Disposition::Piped,
            Disposition::Inherited => Disposition::Inherited,
            Disposition::Null => Disposition::Null,
            Disposition::MergeWithStdout => Disposition::MergeWithStdout,
            Disposition::ExternalHandle(file) => Disposition::ExternalHandle(file.try_clone()?),
            Disposition::StringSource(bytes) => Disposition::StringSource(bytes.clone()),
            Disposition::FromProcessOutput(_) => {
                return Err(ConfigError::IllegalDisposition {
                    stream,
                    disposition: DispositionKind::FromProcessOutput,
                }
                .into())
            }
        })
    }
}

impl DispositionKind {
    /// Whether a disposition of this kind may be assigned to `stream`.
    pub fn is_legal_for(self, stream: Stream) -> bool {
        match self {
            DispositionKind::Piped
            | DispositionKind::Inherited
            | DispositionKind::Null
            | DispositionKind::ExternalHandle => true,
            DispositionKind::MergeWithStdout => stream == Stream::Stderr,
            DispositionKind::StringSource | DispositionKind::FromProcessOutput => {
                stream == Stream::Stdin
            }
        }
    }
}

impl From<File> for Disposition {
    fn from(file: File) -> Self {
        Disposition::ExternalHandle(file)
    }
}

#[cfg(unix)]
impl From<std::os::fd::OwnedFd> for Disposition {
    fn from(fd: std::os::fd::OwnedFd) -> Self {
        Disposition::ExternalHandle(File::from(fd))
    }
}

impl From<ProcessOutput> for Disposition {
    fn from(output: ProcessOutput) -> Self {
        Disposition::FromProcessOutput(output)
    }
}

impl From<&str> for Disposition {
    fn from(s: &str) -> Self {
        Disposition::StringSource(s.as_bytes().to_vec())
    }
}

impl From<String> for Disposition {
    fn from(s: String) -> Self {
        Disposition::StringSource(s.into_bytes())
    }
}

impl From<&[u8]> for Disposition {
    fn from(bytes: &[u8]) -> Self {
        Disposition::StringSource(bytes.to_vec())
    }
}

impl From<Vec<u8>> for Disposition {
    fn from(bytes: Vec<u8>) -> Self {
        Disposition::StringSource(bytes)
    }
}
