//! Pipe ownership.
//!
//! Every spawned process gets a [`Lineage`]: its own id plus the ids of every process
//! upstream of it through output-to-input links. A [`PipeConnection`] has at most one
//! writer and one reader, is one-shot in both directions, and refuses a reader that
//! already feeds (directly or transitively) into its writer.

use crate::error::OwnershipError;
use std::collections::BTreeSet;
use std::io;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::process::{ChildStderr, ChildStdout};

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);
static NEXT_PIPE: AtomicU64 = AtomicU64::new(1);

/// Identity of a process plus everything upstream of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lineage {
    owner: u64,
    upstream: Arc<BTreeSet<u64>>,
}

impl Lineage {
    /// A fresh identity, optionally downstream of `source`.
    pub fn new(source: Option<&Lineage>) -> Self {
        let owner = NEXT_OWNER.fetch_add(1, Ordering::Relaxed);
        let mut upstream = source
            .map(|s| s.upstream.as_ref().clone())
            .unwrap_or_default();
        upstream.insert(owner);
        Self {
            owner,
            upstream: Arc::new(upstream),
        }
    }

    /// The id of the process this lineage belongs to.
    pub fn owner(&self) -> u64 {
        self.owner
    }

    /// True if `owner` is this process or feeds into it.
    pub fn contains(&self, owner: u64) -> bool {
        self.upstream.contains(&owner)
    }
}

/// A single anonymous pipe between one writing and one reading process.
#[derive(Debug)]
pub struct PipeConnection {
    id: u64,
    writer: Option<Lineage>,
    reader: Option<u64>,
}

impl PipeConnection {
    /// An unbound connection.
    pub fn new() -> Self {
        Self {
            id: NEXT_PIPE.fetch_add(1, Ordering::Relaxed),
            writer: None,
            reader: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Owner id of the writing process, if bound.
    pub fn writer(&self) -> Option<u64> {
        self.writer.as_ref().map(Lineage::owner)
    }

    /// Owner id of the reading process, if bound.
    pub fn reader(&self) -> Option<u64> {
        self.reader
    }

    /// Bind the writing side.
    ///
    /// # Errors
    ///
    /// - `AlreadyWritten` if a writer is already bound
    /// - `SelfFeed` / `Cycle` if the bound reader is `writer` or upstream of it
    pub fn attach_writer(&mut self, writer: &Lineage) -> Result<(), OwnershipError> {
        if let Some(existing) = &self.writer {
            return Err(OwnershipError::AlreadyWritten {
                pipe: self.id,
                owner: existing.owner,
            });
        }
        if let Some(reader) = self.reader {
            check_acyclic(self.id, reader, writer)?;
        }
        self.writer = Some(writer.clone());
        Ok(())
    }

    /// Bind the reading side.
    ///
    /// # Errors
    ///
    /// - `AlreadyRead` if a reader is already bound
    /// - `SelfFeed` / `Cycle` if `reader` is the bound writer or upstream of it
    pub fn attach_reader(&mut self, reader: &Lineage) -> Result<(), OwnershipError> {
        if let Some(existing) = self.reader {
            return Err(OwnershipError::AlreadyRead {
                pipe: self.id,
                owner: existing,
            });
        }
        if let Some(writer) = &self.writer {
            check_acyclic(self.id, reader.owner, writer)?;
        }
        self.reader = Some(reader.owner);
        Ok(())
    }
}

impl Default for PipeConnection {
    fn default() -> Self {
        Self::new()
    }
}

fn check_acyclic(pipe: u64, reader: u64, writer: &Lineage) -> Result<(), OwnershipError> {
    if reader == writer.owner {
        return Err(OwnershipError::SelfFeed {
            pipe,
            owner: reader,
        });
    }
    if writer.contains(reader) {
        return Err(OwnershipError::Cycle {
            pipe,
            reader,
            writer: writer.owner,
        });
    }
    Ok(())
}

/// Parent-side read end of a child's output pipe.
#[derive(Debug)]
pub enum ReadPipe {
    Stdout(ChildStdout),
    Stderr(ChildStderr),
    /// stdout and stderr sharing one pipe.
    #[cfg(unix)]
    Merged(tokio::net::unix::pipe::Receiver),
}

impl ReadPipe {
    /// Turn the read end into a stdio handle for another child.
    pub(crate) fn into_stdio(self) -> io::Result<Stdio> {
        match self {
            ReadPipe::Stdout(out) => out.try_into(),
            ReadPipe::Stderr(err) => err.try_into(),
            #[cfg(unix)]
            ReadPipe::Merged(rx) => Ok(Stdio::from(rx.into_blocking_fd()?)),
        }
    }
}

impl AsyncRead for ReadPipe {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ReadPipe::Stdout(out) => Pin::new(out).poll_read(cx, buf),
            ReadPipe::Stderr(err) => Pin::new(err).poll_read(cx, buf),
            #[cfg(unix)]
            ReadPipe::Merged(rx) => Pin::new(rx).poll_read(cx, buf),
        }
    }
}

/// A process's output detached for use as another process's stdin.
///
/// Obtained from [`Process::output_source`](crate::Process::output_source) or
/// [`Process::error_source`](crate::Process::error_source). The writing side is already
/// bound to the producing process; binding the reading side happens at spawn and
/// can succeed only once.
#[derive(Debug)]
pub struct ProcessOutput {
    pipe: PipeConnection,
    stream: Option<ReadPipe>,
}

impl ProcessOutput {
    pub(crate) fn new(writer: &Lineage, stream: ReadPipe) -> Result<Self, OwnershipError> {
        let mut pipe = PipeConnection::new();
        pipe.attach_writer(writer)?;
        Ok(Self {
            pipe,
            stream: Some(stream),
        })
    }

    /// The pipe this output travels through.
    pub fn pipe(&self) -> &PipeConnection {
        &self.pipe
    }

    pub(crate) fn writer_lineage(&self) -> Option<&Lineage> {
        self.pipe.writer.as_ref()
    }

    /// Bind `reader` as the consumer and hand over the stream.
    pub(crate) fn connect(&mut self, reader: &Lineage) -> Result<ReadPipe, OwnershipError> {
        self.pipe.attach_reader(reader)?;
        // attach_reader succeeds at most once, so the stream is still present
        self.stream.take().ok_or(OwnershipError::AlreadyRead {
            pipe: self.pipe.id,
            owner: reader.owner,
        })
    }
}
