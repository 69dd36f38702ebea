//! Process invocation port.
//!
//! Every external tool (generator, patch tool, grid tool, version-control
//! tool, post-run hook) is invoked through the [`CommandRunner`] trait:
//! argument vector, working directory, optional input bytes in; captured
//! output and exit code out. Components never spawn processes directly,
//! which keeps the pipeline deterministic under test via [`ScriptedRunner`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::ProcessError;

/// A single external invocation: program, argument vector, working
/// directory, optional stdin payload and extra environment variables.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub stdin: Option<String>,
    pub env: Vec<(String, String)>,
}

impl ProcessRequest {
    /// Creates a request for `program` executed inside `cwd`.
    pub fn new(program: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            stdin: None,
            env: Vec::new(),
        }
    }

    /// Appends a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Delivers `text` on the child's standard input.
    pub fn stdin_text(mut self, text: impl Into<String>) -> Self {
        self.stdin = Some(text.into());
        self
    }

    /// Adds an environment variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Display name of the program, used in errors and logs.
    pub fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

/// Captured result of an external invocation.
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    /// A successful invocation with the given stdout and empty stderr.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed invocation with the given exit code and stderr.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// True if the process exited with status zero.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout followed by stderr, the form persisted to stage logs.
    pub fn combined(&self) -> String {
        let mut log = self.stdout.clone();
        log.push_str(&self.stderr);
        log
    }

    /// Turns a non-zero exit into a [`ProcessError::Failed`] carrying the
    /// combined captured output.
    pub fn checked(self, program: &str) -> Result<Self, ProcessError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ProcessError::Failed {
                program: program.to_string(),
                code: self.exit_code,
                log: self.combined(),
            })
        }
    }
}

/// Port through which every component invokes external binaries.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs the request to completion, capturing stdout and stderr.
    ///
    /// A non-zero exit status is NOT an error at this level: unchecked patch
    /// application ignores exit codes, so policy lives with the caller.
    async fn run(&self, request: &ProcessRequest) -> Result<CapturedOutput, ProcessError>;
}

/// Production runner backed by `tokio::process`.
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, request: &ProcessRequest) -> Result<CapturedOutput, ProcessError> {
        debug!(
            "Running {} {:?} in {}",
            request.program_name(),
            request.args,
            request.cwd.display()
        );

        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args)
            .current_dir(&request.cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        for (key, value) in &request.env {
            cmd.env(key, value);
        }

        if request.stdin.is_some() {
            cmd.stdin(Stdio::piped());
        } else {
            cmd.stdin(Stdio::null());
        }

        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            program: request.program_name(),
            source,
        })?;

        if let Some(input) = &request.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(input.as_bytes()).await?;
                // closes the pipe so the child sees EOF
                drop(stdin);
            }
        }

        let output = child.wait_with_output().await?;

        Ok(CapturedOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// A recorded invocation, kept by [`ScriptedRunner`] for assertions.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub stdin: Option<String>,
    pub env: Vec<(String, String)>,
}

/// Deterministic fake runner.
///
/// Responses are keyed by `"<program basename> <first arg>"` (or just the
/// basename); unscripted invocations succeed with empty output. Every call
/// is recorded so tests can assert on exact argument vectors.
#[derive(Default)]
pub struct ScriptedRunner {
    responses: Mutex<HashMap<String, CapturedOutput>>,
    touches: Mutex<HashMap<String, Vec<PathBuf>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedRunner {
    /// Creates a runner with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the response for invocations matching `key`.
    pub fn script(&self, key: impl Into<String>, response: CapturedOutput) {
        self.responses
            .lock()
            .expect("responses lock poisoned")
            .insert(key.into(), response);
    }

    /// Registers a file to create whenever an invocation matches `key`,
    /// standing in for an output the real tool would write.
    pub fn touch_on(&self, key: impl Into<String>, path: impl Into<PathBuf>) {
        self.touches
            .lock()
            .expect("touches lock poisoned")
            .entry(key.into())
            .or_default()
            .push(path.into());
    }

    /// Returns a copy of every recorded invocation, in call order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock poisoned").clone()
    }

    /// Recorded invocations whose program basename matches `program`.
    pub fn calls_to(&self, program: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| basename(&call.program) == program)
            .collect()
    }

    fn lookup(&self, request: &ProcessRequest) -> CapturedOutput {
        let responses = self.responses.lock().expect("responses lock poisoned");
        let name = basename(&request.program_name());

        if let Some(first) = request.args.first() {
            if let Some(response) = responses.get(&format!("{name} {first}")) {
                return response.clone();
            }
        }
        responses
            .get(&name)
            .cloned()
            .unwrap_or_else(|| CapturedOutput::ok(""))
    }

    fn apply_touches(&self, request: &ProcessRequest) -> std::io::Result<()> {
        let touches = self.touches.lock().expect("touches lock poisoned");
        let name = basename(&request.program_name());

        let mut keys = vec![name.clone()];
        if let Some(first) = request.args.first() {
            keys.push(format!("{name} {first}"));
        }
        for key in keys {
            if let Some(paths) = touches.get(&key) {
                for path in paths {
                    std::fs::write(path, b"")?;
                }
            }
        }
        Ok(())
    }
}

fn basename(program: &str) -> String {
    Path::new(program)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.to_string())
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, request: &ProcessRequest) -> Result<CapturedOutput, ProcessError> {
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .push(RecordedCall {
                program: request.program_name(),
                args: request.args.clone(),
                cwd: request.cwd.clone(),
                stdin: request.stdin.clone(),
                env: request.env.clone(),
            });

        self.apply_touches(request)?;
        Ok(self.lookup(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = ProcessRequest::new("patch", "/work")
            .arg("-p1")
            .stdin_text("--- a\n+++ b\n")
            .env("GRID", "/work/grid.pineappl");

        assert_eq!(request.args, vec!["-p1"]);
        assert_eq!(request.stdin.as_deref(), Some("--- a\n+++ b\n"));
        assert_eq!(request.env.len(), 1);
    }

    #[test]
    fn test_captured_output_checked() {
        assert!(CapturedOutput::ok("fine").checked("tool").is_ok());

        let err = CapturedOutput::failed(2, "boom")
            .checked("tool")
            .unwrap_err();
        assert!(err.to_string().contains("exited with code 2"));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_combined_orders_stdout_first() {
        let output = CapturedOutput {
            exit_code: 0,
            stdout: "out\n".to_string(),
            stderr: "err\n".to_string(),
        };
        assert_eq!(output.combined(), "out\nerr\n");
    }

    #[tokio::test]
    async fn test_scripted_runner_records_and_replays() {
        let runner = ScriptedRunner::new();
        runner.script("pineappl convolute", CapturedOutput::ok("table\n"));

        let request = ProcessRequest::new("/opt/pineappl", "/dest")
            .arg("convolute")
            .arg("grid.pineappl");
        let output = runner.run(&request).await.unwrap();
        assert_eq!(output.stdout, "table\n");

        let request = ProcessRequest::new("/opt/pineappl", "/dest").arg("orders");
        let output = runner.run(&request).await.unwrap();
        assert!(output.is_success());
        assert!(output.stdout.is_empty());

        let calls = runner.calls_to("pineappl");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].args[0], "convolute");
        assert_eq!(calls[1].args[0], "orders");
    }

    #[tokio::test]
    async fn test_system_runner_captures_output() {
        let runner = SystemRunner;
        let request = ProcessRequest::new("sh", ".")
            .arg("-c")
            .arg("printf hello; exit 3");
        let output = runner.run(&request).await.unwrap();
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout, "hello");
    }

    #[tokio::test]
    async fn test_system_runner_delivers_stdin() {
        let runner = SystemRunner;
        let request = ProcessRequest::new("cat", ".").stdin_text("patch body\n");
        let output = runner.run(&request).await.unwrap();
        assert!(output.is_success());
        assert_eq!(output.stdout, "patch body\n");
    }
}
