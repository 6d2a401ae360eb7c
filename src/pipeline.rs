//! Pipelines.
//!
//! A [`Pipeline`] spawns its commands in order, feeding each one's stdout into the
//! next one's stdin. Environment, working directory and stderr are shared by every
//! stage; stdin applies to the first stage only and stdout to the last only.

use crate::args::{split_pipeline, CommandLine};
use crate::cwd::{inherited_cwd, normalize};
use crate::disposition::{Disposition, Stream};
use crate::env::Environment;
use crate::error::{ConfigError, PipelineError, ProcError};
use crate::limits::FeedLimits;
use crate::process::Process;
use crate::spec::{check_payload, ProcessSpec};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A chain of commands connected stdout-to-stdin.
///
/// ```rust,no_run
/// use childproc::Pipeline;
/// use tokio::io::AsyncReadExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut processes = Pipeline::parse("echo 'foo bar baz' | wc -w")?.spawn_all()?;
///
/// let mut count = String::new();
/// processes[1].stdout()?.read_to_string(&mut count).await?;
/// assert_eq!(count.trim(), "3");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Pipeline {
    commands: Vec<Vec<String>>,
    env: Environment,
    cwd: PathBuf,
    stdin: Disposition,
    stdout: Disposition,
    stderr: Disposition,
    limits: FeedLimits,
}

impl Pipeline {
    /// Build a pipeline from commands given as token lists or strings.
    ///
    /// # Errors
    ///
    /// `EmptyPipeline` if there are no commands, or the first command error.
    pub fn new<I, C>(commands: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = C>,
        C: Into<CommandLine>,
    {
        let commands = commands
            .into_iter()
            .map(|c| c.into().into_args())
            .collect::<Result<Vec<_>, _>>()?;
        if commands.is_empty() {
            return Err(ConfigError::EmptyPipeline);
        }

        Ok(Self {
            commands,
            env: Environment::inherited(),
            cwd: inherited_cwd()?,
            stdin: Disposition::Piped,
            stdout: Disposition::Piped,
            stderr: Disposition::Piped,
            limits: FeedLimits::default(),
        })
    }

    /// Build a pipeline from one string with stages separated by unquoted `|`.
    pub fn parse(line: &str) -> Result<Self, ConfigError> {
        Self::new(split_pipeline(line)?)
    }

    /// Argument vectors of every stage, in order.
    pub fn commands(&self) -> &[Vec<String>] {
        &self.commands
    }

    pub fn set_env(&mut self, env: Environment) -> &mut Self {
        self.env = env;
        self
    }

    pub fn inherit_env(&mut self) -> &mut Self {
        self.env = Environment::inherited();
        self
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn set_cwd(&mut self, cwd: impl AsRef<Path>) -> Result<&mut Self, ConfigError> {
        self.cwd = normalize(cwd.as_ref())?;
        Ok(self)
    }

    pub fn inherit_cwd(&mut self) -> Result<&mut Self, ConfigError> {
        self.cwd = inherited_cwd()?;
        Ok(self)
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Stdin of the first stage.
    pub fn set_stdin(&mut self, stdin: impl Into<Disposition>) -> Result<&mut Self, ConfigError> {
        let stdin = stdin.into();
        stdin.validate_for(Stream::Stdin)?;
        check_payload(&stdin, &self.limits)?;
        self.stdin = stdin;
        Ok(self)
    }

    /// Stdout of the last stage.
    pub fn set_stdout(&mut self, stdout: impl Into<Disposition>) -> Result<&mut Self, ConfigError> {
        let stdout = stdout.into();
        stdout.validate_for(Stream::Stdout)?;
        self.stdout = stdout;
        Ok(self)
    }

    /// Stderr of every stage.
    pub fn set_stderr(&mut self, stderr: impl Into<Disposition>) -> Result<&mut Self, ConfigError> {
        let stderr = stderr.into();
        stderr.validate_for(Stream::Stderr)?;
        self.stderr = stderr;
        Ok(self)
    }

    /// Set the bounds for writing a string payload to the first stage's stdin.
    pub fn set_feed_limits(&mut self, limits: FeedLimits) -> Result<&mut Self, ConfigError> {
        check_payload(&self.stdin, &limits)?;
        self.limits = limits;
        Ok(self)
    }

    /// Spawn every stage in order.
    ///
    /// Stage `i`'s output is wired before stage `i + 1` is spawned. If a stage fails,
    /// the returned [`PipelineError`] holds the stages that were already started; they
    /// keep running until the caller terminates them (see [`PipelineError::cleanup`]).
    pub fn spawn_all(&mut self) -> Result<Vec<Process>, PipelineError> {
        let last = self.commands.len() - 1;
        let mut spawned: Vec<Process> = Vec::with_capacity(self.commands.len());
        let mut upstream = None;

        for stage in 0..=last {
            let mut process = match self.spawn_stage(stage, last, upstream.take()) {
                Ok(process) => process,
                Err(source) => {
                    return Err(PipelineError {
                        stage,
                        source,
                        spawned,
                    })
                }
            };
            debug!(stage, pid = process.pid(), "spawned pipeline stage");

            if stage < last {
                match process.output_source() {
                    Ok(output) => upstream = Some(Disposition::FromProcessOutput(output)),
                    Err(source) => {
                        spawned.push(process);
                        return Err(PipelineError {
                            stage,
                            source,
                            spawned,
                        });
                    }
                }
            }
            spawned.push(process);
        }

        Ok(spawned)
    }

    fn spawn_stage(
        &mut self,
        stage: usize,
        last: usize,
        upstream: Option<Disposition>,
    ) -> Result<Process, ProcError> {
        let mut spec = ProcessSpec::from_parts(
            self.commands[stage].clone(),
            self.env.clone(),
            self.cwd.clone(),
            self.limits,
        );

        if stage == last {
            spec.set_stdout(self.stdout.duplicate(Stream::Stdout)?)?;
        }
        spec.set_stderr(self.stderr.duplicate(Stream::Stderr)?)?;

        // A process-output link is one-shot: lend it to the spec and take it back
        // afterwards so that it stays claimed.
        let lent = upstream.is_none() && matches!(self.stdin, Disposition::FromProcessOutput(_));
        let stdin = match upstream {
            Some(link) => link,
            None if lent => std::mem::take(&mut self.stdin),
            None => self.stdin.duplicate(Stream::Stdin)?,
        };
        spec.set_stdin(stdin)?;

        let result = spec.spawn();
        if lent {
            self.stdin = spec.take_stdin();
        }
        result
    }
}
