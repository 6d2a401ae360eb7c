//! # childproc
//!
//! Shell-free child processes with validated stream wiring.
//!
//! `childproc` turns a description of a command (arguments, environment, working
//! directory and where each standard stream goes) into a live OS process, and lets
//! processes be chained stdout-to-stdin without ever invoking a shell. Live processes
//! can be stopped, resumed, terminated and waited on with a bound.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use childproc::{Disposition, Pipeline, ProcessSpec};
//! use std::time::Duration;
//! use tokio::io::AsyncReadExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // One process, fed from a string
//! let mut spec = ProcessSpec::new("sort -r")?;
//! spec.set_stdin("a\nb\nc\n")?.set_stderr(Disposition::Null)?;
//!
//! let mut sort = spec.spawn()?;
//! let mut out = String::new();
//! sort.stdout()?.read_to_string(&mut out).await?;
//! sort.wait(Some(Duration::from_secs(5))).await?;
//!
//! // The same wiring by hand: one process's output feeds the next
//! let mut echo = ProcessSpec::new(["echo", "foo bar baz"])?.spawn()?;
//! let mut wc = ProcessSpec::new("wc -w")?;
//! wc.set_stdin(echo.output_source()?)?;
//! let mut wc = wc.spawn()?;
//!
//! // Or as a pipeline
//! let mut stages = Pipeline::parse("echo 'foo bar baz' | wc -w")?.spawn_all()?;
//! let mut count = String::new();
//! stages[1].stdout()?.read_to_string(&mut count).await?;
//! # let _ = (&mut wc, &mut echo);
//! # Ok(())
//! # }
//! ```
//!
//! ## Design Principles
//!
//! - **No shell interpretation**: commands run argv-style; a string command is only
//!   split into words, never globbed or redirected
//! - **Validate at configuration time**: an illegal stream disposition is rejected by
//!   the setter, not discovered at spawn
//! - **Snapshots**: `spawn()` copies the spec, so a spec can be changed and reused
//! - **Single reader, single writer**: a process-output link can be claimed once and
//!   never forms a cycle
//! - **Explicit cleanup**: dropping a [`Process`] leaves the child alone; use
//!   [`Process::guard`] for scoped termination
//!
//! ## Platform Support
//!
//! Spawning, piping and waiting work everywhere Tokio's process support does.
//! Suspending and resuming need job-control signals and are Unix only; elsewhere
//! `stop`/`start` fail with [`ProcError::Capability`] (see [`JOB_CONTROL`]).

mod args;
mod cwd;
mod disposition;
mod env;
mod error;
mod limits;
mod pipe;
mod pipeline;
mod prepared;
mod process;
mod signal;
mod spec;

// Public API
pub use args::{tokenize, CommandLine};
pub use disposition::{Disposition, DispositionKind, Stream};
pub use env::Environment;
pub use error::{ConfigError, OwnershipError, PipelineError, ProcError, Result};
pub use limits::FeedLimits;
pub use pipe::{Lineage, PipeConnection, ProcessOutput, ReadPipe};
pub use pipeline::Pipeline;
pub use process::{Process, ProcessGuard, ProcessState};
pub use signal::JOB_CONTROL;
pub use spec::ProcessSpec;

#[cfg(unix)]
pub use signal::Signal;
