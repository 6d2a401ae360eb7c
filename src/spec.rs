//! Process configuration.
//!
//! A [`ProcessSpec`] is a mutable, validated description of a child process. Every
//! setter checks its input immediately; [`ProcessSpec::spawn`] snapshots the current
//! values, so one spec can be adjusted and spawned again any number of times.

use crate::args::{validate_args, CommandLine};
use crate::cwd::{inherited_cwd, normalize};
use crate::disposition::{Disposition, Stream};
use crate::env::Environment;
use crate::error::{ConfigError, ProcError};
use crate::limits::FeedLimits;
use crate::pipe::Lineage;
use crate::prepared::{Input, PreparedSpawn};
use crate::process::Process;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Configuration for spawning a child process.
///
/// Defaults: the parent's environment and working directory (captured when the spec
/// is created) and piped stdin, stdout and stderr.
///
/// ```rust,no_run
/// use childproc::{Disposition, ProcessSpec};
/// use tokio::io::AsyncReadExt;
///
/// # async fn example() -> Result<(), childproc::ProcError> {
/// let mut spec = ProcessSpec::new("sort")?;
/// spec.set_stdin("b\nc\na\n")?.set_stderr(Disposition::Null)?;
///
/// let mut process = spec.spawn()?;
/// let mut sorted = String::new();
/// process.stdout()?.read_to_string(&mut sorted).await?;
/// assert_eq!(sorted, "a\nb\nc\n");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ProcessSpec {
    args: Vec<String>,
    env: Environment,
    cwd: PathBuf,
    stdin: Disposition,
    stdout: Disposition,
    stderr: Disposition,
    limits: FeedLimits,
}

impl ProcessSpec {
    /// Create a spec for `command` with inherited environment and working directory.
    ///
    /// # Errors
    ///
    /// `ConfigError` if the command is empty or cannot be tokenized, or the parent's
    /// working directory cannot be determined.
    pub fn new(command: impl Into<CommandLine>) -> Result<Self, ConfigError> {
        Ok(Self::from_parts(
            command.into().into_args()?,
            Environment::inherited(),
            inherited_cwd()?,
            FeedLimits::default(),
        ))
    }

    pub(crate) fn from_parts(
        args: Vec<String>,
        env: Environment,
        cwd: PathBuf,
        limits: FeedLimits,
    ) -> Self {
        Self {
            args,
            env,
            cwd,
            stdin: Disposition::Piped,
            stdout: Disposition::Piped,
            stderr: Disposition::Piped,
            limits,
        }
    }

    /// Replace the command, from tokens or a string split with POSIX word rules.
    pub fn set_args(&mut self, command: impl Into<CommandLine>) -> Result<&mut Self, ConfigError> {
        self.args = command.into().into_args()?;
        Ok(self)
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Mutable access to the argument vector, e.g. to vary one argument per spawn.
    ///
    /// The vector is re-validated by [`spawn`](ProcessSpec::spawn).
    pub fn args_mut(&mut self) -> &mut Vec<String> {
        &mut self.args
    }

    /// Use exactly this environment.
    pub fn set_env(&mut self, env: Environment) -> &mut Self {
        self.env = env;
        self
    }

    /// Go back to a fresh snapshot of the parent's environment.
    pub fn inherit_env(&mut self) -> &mut Self {
        self.env = Environment::inherited();
        self
    }

    /// Set a single environment variable.
    pub fn env_var(
        &mut self,
        key: impl Into<OsString>,
        value: impl Into<OsString>,
    ) -> Result<&mut Self, ConfigError> {
        self.env.set(key, value)?;
        Ok(self)
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// Set the working directory. The path is normalized but not checked for existence.
    pub fn set_cwd(&mut self, cwd: impl AsRef<Path>) -> Result<&mut Self, ConfigError> {
        self.cwd = normalize(cwd.as_ref())?;
        Ok(self)
    }

    /// Go back to the parent's current working directory.
    pub fn inherit_cwd(&mut self) -> Result<&mut Self, ConfigError> {
        self.cwd = inherited_cwd()?;
        Ok(self)
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Set where stdin comes from.
    ///
    /// Accepts any [`Disposition`], or a value that converts into one: a `File`,
    /// a string or byte payload, or a [`ProcessOutput`](crate::ProcessOutput).
    pub fn set_stdin(&mut self, stdin: impl Into<Disposition>) -> Result<&mut Self, ConfigError> {
        let stdin = stdin.into();
        stdin.validate_for(Stream::Stdin)?;
        check_payload(&stdin, &self.limits)?;
        self.stdin = stdin;
        Ok(self)
    }

    /// Set where stdout goes.
    pub fn set_stdout(&mut self, stdout: impl Into<Disposition>) -> Result<&mut Self, ConfigError> {
        let stdout = stdout.into();
        stdout.validate_for(Stream::Stdout)?;
        self.stdout = stdout;
        Ok(self)
    }

    /// Set where stderr goes.
    pub fn set_stderr(&mut self, stderr: impl Into<Disposition>) -> Result<&mut Self, ConfigError> {
        let stderr = stderr.into();
        stderr.validate_for(Stream::Stderr)?;
        self.stderr = stderr;
        Ok(self)
    }

    pub fn stdin(&self) -> &Disposition {
        &self.stdin
    }

    pub fn stdout(&self) -> &Disposition {
        &self.stdout
    }

    pub fn stderr(&self) -> &Disposition {
        &self.stderr
    }

    /// Set the bounds for writing a string payload to stdin.
    pub fn set_feed_limits(&mut self, limits: FeedLimits) -> Result<&mut Self, ConfigError> {
        check_payload(&self.stdin, &limits)?;
        self.limits = limits;
        Ok(self)
    }

    pub fn feed_limits(&self) -> FeedLimits {
        self.limits
    }

    /// Take the stdin disposition out, leaving `Piped` behind.
    pub(crate) fn take_stdin(&mut self) -> Disposition {
        std::mem::take(&mut self.stdin)
    }

    /// Spawn a process from a snapshot of the current configuration.
    ///
    /// Must be called from within a Tokio runtime. A string payload is written to
    /// stdin by a background task bounded by the [`FeedLimits`]; a process-output link
    /// is claimed by this spawn and cannot be used again.
    ///
    /// # Errors
    ///
    /// - `Config` if the argument vector was emptied through [`args_mut`](ProcessSpec::args_mut)
    /// - `Ownership` if the stdin process-output link was already claimed
    /// - `Launch` if the OS cannot create the process
    pub fn spawn(&mut self) -> Result<Process, ProcError> {
        validate_args(&self.args)?;
        let stdout = self.stdout.duplicate(Stream::Stdout)?;
        let stderr = self.stderr.duplicate(Stream::Stderr)?;

        let (lineage, stdin) = match &mut self.stdin {
            Disposition::FromProcessOutput(output) => {
                let lineage = Lineage::new(output.writer_lineage());
                let upstream = output.connect(&lineage)?;
                (lineage, Input::Upstream(upstream))
            }
            other => (
                Lineage::new(None),
                Input::Plain(other.duplicate(Stream::Stdin)?),
            ),
        };

        PreparedSpawn {
            args: self.args.clone(),
            env: self.env.clone(),
            cwd: self.cwd.clone(),
            lineage,
            stdin,
            stdout,
            stderr,
            limits: self.limits,
        }
        .launch()
    }
}

/// Reject a string payload larger than `limits` allows.
pub(crate) fn check_payload(
    stdin: &Disposition,
    limits: &FeedLimits,
) -> Result<(), ConfigError> {
    match stdin {
        Disposition::StringSource(bytes) if bytes.len() > limits.max_bytes => {
            Err(ConfigError::PayloadTooLarge {
                len: bytes.len(),
                limit: limits.max_bytes,
            })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disposition::DispositionKind;

    #[test]
    fn test_defaults() {
        let spec = ProcessSpec::new("echo foo").unwrap();
        assert_eq!(spec.args(), ["echo", "foo"]);
        assert_eq!(spec.stdin().kind(), DispositionKind::Piped);
        assert_eq!(spec.stdout().kind(), DispositionKind::Piped);
        assert_eq!(spec.stderr().kind(), DispositionKind::Piped);
        assert_eq!(spec.cwd(), std::env::current_dir().unwrap());
        assert_eq!(spec.env(), &Environment::inherited());
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(matches!(
            ProcessSpec::new(""),
            Err(ConfigError::EmptyCommand)
        ));
        assert!(matches!(
            ProcessSpec::new(Vec::<String>::new()),
            Err(ConfigError::EmptyCommand)
        ));
    }

    #[test]
    fn test_set_args_failure_keeps_previous() {
        let mut spec = ProcessSpec::new("echo a").unwrap();
        assert!(spec.set_args("echo 'unterminated").is_err());
        assert_eq!(spec.args(), ["echo", "a"]);
    }

    #[test]
    fn test_illegal_dispositions_fail_immediately() {
        let mut spec = ProcessSpec::new("cat").unwrap();

        let result = spec.set_stdin(Disposition::MergeWithStdout);
        assert!(matches!(
            result,
            Err(ConfigError::IllegalDisposition {
                stream: Stream::Stdin,
                disposition: DispositionKind::MergeWithStdout
            })
        ));

        let result = spec.set_stdout("payload");
        assert!(matches!(
            result,
            Err(ConfigError::IllegalDisposition {
                stream: Stream::Stdout,
                disposition: DispositionKind::StringSource
            })
        ));

        assert!(spec.set_stdout(Disposition::MergeWithStdout).is_err());
        assert!(spec.set_stderr(Disposition::MergeWithStdout).is_ok());
        assert_eq!(spec.stdin().kind(), DispositionKind::Piped);
    }

    #[test]
    fn test_payload_limit() {
        let mut spec = ProcessSpec::new("cat").unwrap();
        spec.set_feed_limits(FeedLimits::default().with_max_bytes(4))
            .unwrap();

        assert!(spec.set_stdin("abcd").is_ok());
        assert_eq!(
            spec.set_stdin("abcde").unwrap_err(),
            ConfigError::PayloadTooLarge { len: 5, limit: 4 }
        );

        // tightening the limit below the configured payload is rejected too
        assert!(spec
            .set_feed_limits(FeedLimits::default().with_max_bytes(2))
            .is_err());
    }

    #[test]
    fn test_cwd_normalized_and_reset() {
        let mut spec = ProcessSpec::new("ls").unwrap();
        spec.set_cwd("/usr/./lib/../bin").unwrap();
        assert_eq!(spec.cwd(), Path::new("/usr/bin"));

        spec.inherit_cwd().unwrap();
        assert_eq!(spec.cwd(), std::env::current_dir().unwrap());

        assert!(spec.set_cwd("").is_err());
    }

    #[test]
    fn test_env_setters() {
        let mut spec = ProcessSpec::new("env").unwrap();
        spec.set_env(Environment::empty());
        spec.env_var("FOO", "bar").unwrap();
        assert_eq!(spec.env().get("FOO"), Some("bar"));
        assert_eq!(spec.env().len(), 1);

        assert!(spec.env_var("", "x").is_err());

        spec.inherit_env();
        assert_eq!(spec.env(), &Environment::inherited());
    }

    #[tokio::test]
    async fn test_emptied_args_rejected_at_spawn() {
        let mut spec = ProcessSpec::new("true").unwrap();
        spec.args_mut().clear();
        assert!(matches!(
            spec.spawn(),
            Err(ProcError::Config(ConfigError::EmptyCommand))
        ));
    }

    #[tokio::test]
    async fn test_missing_executable_is_launch_error() {
        let mut spec = ProcessSpec::new("nonexistent_command_12345").unwrap();
        match spec.spawn() {
            Err(ProcError::Launch { program, source }) => {
                assert_eq!(program, "nonexistent_command_12345");
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("expected launch error, got {:?}", other.map(|p| p.pid())),
        }
    }

    #[tokio::test]
    async fn test_spawn_snapshot_is_independent() {
        let mut spec = ProcessSpec::new("sleep 5").unwrap();
        spec.set_stdout(Disposition::Null).unwrap();
        let mut first = spec.spawn().unwrap();

        spec.set_args("true").unwrap();
        spec.env_var("LATER", "1").unwrap();

        assert_eq!(first.args(), ["sleep", "5"]);
        assert_eq!(first.env().get("LATER"), None);
        first.terminate(true).await.unwrap();

        let mut second = spec.spawn().unwrap();
        assert!(second.wait(None).await.unwrap().success());
    }
}
