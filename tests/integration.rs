//! Integration tests for childproc.
//!
//! These tests spawn real binaries and check stream wiring end to end.

use childproc::{ConfigError, Disposition, Environment, FeedLimits, ProcError, ProcessSpec, Stream};
use std::fs::File;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

async fn read_stdout(process: &mut childproc::Process) -> String {
    let mut out = String::new();
    process
        .stdout()
        .unwrap()
        .read_to_string(&mut out)
        .await
        .unwrap();
    out
}

#[tokio::test]
async fn test_echo_one_line() {
    let mut process = ProcessSpec::new("echo foo").unwrap().spawn().unwrap();

    let mut reader = BufReader::new(process.stdout().unwrap());
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    assert_eq!(line, "foo\n");

    let mut rest = String::new();
    reader.read_to_string(&mut rest).await.unwrap();
    assert!(rest.is_empty());

    // exit is observed by polling, never by blocking
    let mut finished = false;
    for _ in 0..250 {
        if process.is_finished().unwrap() {
            finished = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(finished);
    assert!(process.exit_status().unwrap().unwrap().success());
}

#[tokio::test]
async fn test_exit_code_reported() {
    let mut process = ProcessSpec::new(["sh", "-c", "exit 3"])
        .unwrap()
        .spawn()
        .unwrap();
    let status = process.wait(Some(Duration::from_secs(5))).await.unwrap();
    assert_eq!(status.code(), Some(3));
    assert_eq!(process.exit_status().unwrap(), Some(status));
}

#[tokio::test]
async fn test_environment_propagation() {
    let mut env = Environment::inherited();
    env.set("FOO", "bar").unwrap();

    let mut spec = ProcessSpec::new("env").unwrap();
    spec.set_env(env);
    let mut process = spec.spawn().unwrap();

    let out = read_stdout(&mut process).await;
    assert!(out.lines().any(|line| line == "FOO=bar"));
    process.wait(None).await.unwrap();
}

#[tokio::test]
async fn test_environment_is_exact() {
    let mut spec = ProcessSpec::new("/usr/bin/env").unwrap();
    spec.set_env(Environment::from_pairs([("ONLY", "this")]).unwrap());
    let mut process = spec.spawn().unwrap();

    assert_eq!(read_stdout(&mut process).await, "ONLY=this\n");
    process.wait(None).await.unwrap();
}

#[tokio::test]
async fn test_working_directory_propagation() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("alpha.txt"), "a").unwrap();

    let mut spec = ProcessSpec::new("ls").unwrap();
    spec.set_cwd(dir.path()).unwrap();
    let mut process = spec.spawn().unwrap();

    let out = read_stdout(&mut process).await;
    assert_eq!(out.lines().next(), Some("alpha.txt"));
    process.wait(None).await.unwrap();
}

#[tokio::test]
async fn test_string_source_stdin() {
    let mut spec = ProcessSpec::new("sort").unwrap();
    spec.set_stdin("pear\napple\nfig\n").unwrap();
    let mut process = spec.spawn().unwrap();

    // the payload writer owns the write end
    assert!(matches!(
        process.stdin(),
        Err(ProcError::Access {
            stream: Stream::Stdin,
            reason: "stdin is fed from a string payload",
        })
    ));
    assert!(process.take_stdin().is_err());
    assert_eq!(read_stdout(&mut process).await, "apple\nfig\npear\n");
    process.input_fed().await.unwrap();
    assert!(process.wait(None).await.unwrap().success());
}

#[tokio::test]
async fn test_large_payload_does_not_block_spawn() {
    let payload = vec![b'x'; 1024 * 1024];
    let mut spec = ProcessSpec::new("wc -c").unwrap();
    spec.set_stdin(payload).unwrap();
    let mut process = spec.spawn().unwrap();

    let out = read_stdout(&mut process).await;
    assert_eq!(out.trim(), "1048576");
    process.input_fed().await.unwrap();
    process.wait(None).await.unwrap();
}

#[tokio::test]
async fn test_payload_feed_timeout() {
    let mut spec = ProcessSpec::new("sleep 30").unwrap();
    spec.set_feed_limits(FeedLimits::default().with_timeout(Duration::from_millis(100)))
        .unwrap();
    spec.set_stdin(vec![b'x'; 1024 * 1024]).unwrap();
    let mut process = spec.spawn().unwrap();

    let err = process.input_fed().await.unwrap_err();
    assert!(matches!(err, ProcError::Timeout { .. }));
    assert!(process.is_running().unwrap());
    process.terminate(true).await.unwrap();
}

#[tokio::test]
async fn test_piped_stdin_written_by_caller() {
    let mut process = ProcessSpec::new("cat").unwrap().spawn().unwrap();

    let mut stdin = process.take_stdin().unwrap();
    stdin.write_all(b"through the pipe").await.unwrap();
    drop(stdin);

    assert_eq!(read_stdout(&mut process).await, "through the pipe");
    process.wait(None).await.unwrap();
}

#[tokio::test]
async fn test_piped_stderr_read() {
    let mut process = ProcessSpec::new(["sh", "-c", "echo oops >&2"])
        .unwrap()
        .spawn()
        .unwrap();

    let mut err = String::new();
    process
        .stderr()
        .unwrap()
        .read_to_string(&mut err)
        .await
        .unwrap();
    assert_eq!(err, "oops\n");
    assert_eq!(read_stdout(&mut process).await, "");
    process.wait(None).await.unwrap();
}

#[tokio::test]
async fn test_take_stderr_on_separate_task() {
    let mut process = ProcessSpec::new(["sh", "-c", "echo out; echo oops >&2"])
        .unwrap()
        .spawn()
        .unwrap();

    let mut stderr = process.take_stderr().unwrap();
    let reader = tokio::spawn(async move {
        let mut err = String::new();
        stderr.read_to_string(&mut err).await.unwrap();
        err
    });

    assert_eq!(read_stdout(&mut process).await, "out\n");
    assert_eq!(reader.await.unwrap(), "oops\n");
    assert!(matches!(
        process.stderr(),
        Err(ProcError::Access {
            stream: Stream::Stderr,
            reason: "handle was already taken",
        })
    ));
    process.wait(None).await.unwrap();
}

#[tokio::test]
async fn test_merge_stderr_into_inherited_stdout() {
    let mut spec = ProcessSpec::new("true").unwrap();
    spec.set_stdout(Disposition::Inherited)
        .unwrap()
        .set_stderr(Disposition::MergeWithStdout)
        .unwrap();
    let mut process = spec.spawn().unwrap();

    assert!(matches!(
        process.stdout(),
        Err(ProcError::Access {
            stream: Stream::Stdout,
            reason: "stream is inherited from the parent",
        })
    ));
    assert!(matches!(
        process.stderr(),
        Err(ProcError::Access {
            stream: Stream::Stderr,
            reason: "stderr is merged into stdout",
        })
    ));
    assert!(process.wait(None).await.unwrap().success());
}

#[tokio::test]
async fn test_merge_stderr_into_piped_stdout() {
    let mut spec = ProcessSpec::new(["sh", "-c", "echo out; echo err >&2"]).unwrap();
    spec.set_stderr(Disposition::MergeWithStdout).unwrap();
    let mut process = spec.spawn().unwrap();

    let out = read_stdout(&mut process).await;
    assert_eq!(out, "out\nerr\n");

    let err = process.stderr().unwrap_err();
    assert_eq!(
        err.to_string(),
        "stderr is not accessible: stderr is merged into stdout"
    );
    process.wait(None).await.unwrap();
}

#[tokio::test]
async fn test_external_handles() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    let output = dir.path().join("out.txt");
    std::fs::write(&input, "from a file\n").unwrap();

    let mut spec = ProcessSpec::new("cat").unwrap();
    spec.set_stdin(File::open(&input).unwrap())
        .unwrap()
        .set_stdout(File::create(&output).unwrap())
        .unwrap()
        .set_stderr(Disposition::MergeWithStdout)
        .unwrap();
    let mut process = spec.spawn().unwrap();

    assert!(process.stdout().is_err());
    assert!(process.wait(None).await.unwrap().success());
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "from a file\n");
}

#[tokio::test]
async fn test_null_and_inherited_have_no_handles() {
    let mut spec = ProcessSpec::new("true").unwrap();
    spec.set_stdin(Disposition::Null)
        .unwrap()
        .set_stdout(Disposition::Null)
        .unwrap()
        .set_stderr(Disposition::Inherited)
        .unwrap();
    let mut process = spec.spawn().unwrap();

    assert!(matches!(process.stdin(), Err(ProcError::Access { .. })));
    assert!(matches!(process.stdout(), Err(ProcError::Access { .. })));
    assert!(matches!(
        process.stderr(),
        Err(ProcError::Access {
            reason: "stream is inherited from the parent",
            ..
        })
    ));
    process.wait(None).await.unwrap();
}

#[tokio::test]
async fn test_launch_error_carries_cause() {
    let mut spec = ProcessSpec::new("definitely_not_a_real_binary_98765").unwrap();
    let err = spec.spawn().unwrap_err();
    assert!(matches!(err, ProcError::Launch { .. }));
    assert!(std::error::Error::source(&err).is_some());
}

#[tokio::test]
async fn test_missing_cwd_is_launch_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut spec = ProcessSpec::new("true").unwrap();
    spec.set_cwd(dir.path().join("missing")).unwrap();
    assert!(matches!(spec.spawn(), Err(ProcError::Launch { .. })));
}

#[test]
fn test_configuration_errors_are_immediate() {
    assert_eq!(
        ProcessSpec::new("grep 'unterminated").unwrap_err(),
        ConfigError::Tokenize {
            input: "grep 'unterminated".to_string(),
            reason: "unbalanced quotes or trailing escape",
        }
    );

    let mut spec = ProcessSpec::new("cat").unwrap();
    assert!(spec.set_stdout(Disposition::MergeWithStdout).is_err());
    assert!(spec.env_var("BAD=KEY", "v").is_err());
}

#[tokio::test]
async fn test_spec_reused_with_varying_args() {
    let mut spec = ProcessSpec::new(["echo", "placeholder"]).unwrap();

    for word in ["one", "two", "three"] {
        spec.args_mut()[1] = word.to_string();
        let mut process = spec.spawn().unwrap();
        assert_eq!(read_stdout(&mut process).await, format!("{}\n", word));
        process.wait(None).await.unwrap();
    }
}
