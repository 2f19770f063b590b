//! External tool invocation.
//!
//! Archive listing, extraction and metadata injection shell out to `7z` and
//! `rar`; PDF pages are rasterized by `pdftoppm`. Every call goes through
//! [`ToolRunner`], which returns the captured output and exit status, so
//! container code parses text against the documented output contract and
//! tests can swap in a scripted runner.
//!
//! [`SystemRunner`] bounds each call by a timeout. Both pipes are drained on
//! helper threads while the child runs; a chatty listing would otherwise
//! fill the pipe buffer and stall the child until the deadline.

use super::ContainerError;
use std::ffi::OsStr;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Captured result of a finished tool run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code; `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }

    /// Turn a non-zero exit or a crash into a [`ContainerError::Process`].
    pub fn check(self, program: &str) -> Result<ToolOutput, ContainerError> {
        match self.code {
            Some(0) => Ok(self),
            Some(code) => Err(ContainerError::Process(format!(
                "{program} exited with status {code}: {}",
                self.stderr_text()
            ))),
            None => Err(ContainerError::Process(format!(
                "{program} crashed: {}",
                self.stderr_text()
            ))),
        }
    }
}

/// Runs external programs synchronously.
pub trait ToolRunner: Send + Sync {
    /// Run `program` with `args` to completion. Failing to start or
    /// exceeding the time bound is an error; a non-zero exit is not (see
    /// [`ToolOutput::check`]).
    fn run(&self, program: &str, args: &[&OsStr]) -> Result<ToolOutput, ContainerError>;
}

/// Spawns real processes, killing any that outlive `timeout`.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

fn drain<R: Read + Send + 'static>(source: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut bytes = Vec::new();
        if let Some(mut source) = source {
            // A read error just truncates the capture; the exit status decides.
            let _ = source.read_to_end(&mut bytes);
        }
        bytes
    })
}

fn wait_bounded(
    child: &mut Child,
    program: &str,
    timeout: Duration,
) -> Result<ExitStatus, ContainerError> {
    match child.wait_timeout(timeout) {
        Ok(Some(status)) => Ok(status),
        Ok(None) => {
            warn!(program, timeout_ms = timeout.as_millis() as u64, "tool timed out, killing");
            let _ = child.kill();
            let _ = child.wait();
            Err(ContainerError::Process(format!(
                "{program} timed out after {} ms",
                timeout.as_millis()
            )))
        }
        Err(e) => Err(ContainerError::Process(format!(
            "failed waiting for {program}: {e}"
        ))),
    }
}

impl ToolRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&OsStr]) -> Result<ToolOutput, ContainerError> {
        let started = Instant::now();
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ContainerError::Process(format!("failed to start {program}: {e}")))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let status = wait_bounded(&mut child, program, self.timeout);

        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();
        let status = status?;

        debug!(
            program,
            code = ?status.code(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tool finished"
        );
        Ok(ToolOutput {
            code: status.code(),
            stdout,
            stderr,
        })
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Runner that replays canned outputs and records every invocation.
    #[derive(Default)]
    pub struct RecordingRunner {
        pub outputs: Mutex<Vec<ToolOutput>>,
        pub calls: Mutex<Vec<Vec<String>>>,
    }

    impl RecordingRunner {
        pub fn with_outputs(mut outputs: Vec<ToolOutput>) -> Self {
            outputs.reverse();
            Self {
                outputs: Mutex::new(outputs),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn get_calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ToolRunner for RecordingRunner {
        fn run(&self, program: &str, args: &[&OsStr]) -> Result<ToolOutput, ContainerError> {
            let mut call = vec![program.to_string()];
            call.extend(args.iter().map(|a| a.to_string_lossy().into_owned()));
            self.calls.lock().unwrap().push(call);
            self.outputs
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| ContainerError::Process("no scripted output".into()))
        }
    }

    pub fn ok_output(stdout: &str) -> ToolOutput {
        ToolOutput {
            code: Some(0),
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
        }
    }

    #[test]
    fn check_passes_success_through() {
        let out = ok_output("listing").check("7z").unwrap();
        assert_eq!(out.stdout_text(), "listing");
    }

    #[test]
    fn check_reports_exit_code_and_stderr() {
        let out = ToolOutput {
            code: Some(2),
            stdout: Vec::new(),
            stderr: b"  Can not open the file as archive \n".to_vec(),
        };
        let err = out.check("7z").unwrap_err().to_string();
        assert!(err.contains("7z exited with status 2"));
        assert!(err.contains("Can not open the file as archive"));
    }

    #[test]
    fn check_reports_crash() {
        let out = ToolOutput {
            code: None,
            ..ToolOutput::default()
        };
        assert!(matches!(out.check("rar"), Err(ContainerError::Process(m)) if m.contains("crashed")));
    }

    #[test]
    fn missing_program_fails_to_start() {
        let runner = SystemRunner::new(Duration::from_secs(5));
        let err = runner
            .run("comic-shelf-no-such-tool", &[OsStr::new("l")])
            .unwrap_err();
        assert!(matches!(err, ContainerError::Process(m) if m.contains("failed to start")));
    }

    #[cfg(unix)]
    #[test]
    fn captures_stdout_and_exit_code() {
        let runner = SystemRunner::new(Duration::from_secs(5));
        let out = runner
            .run("sh", &[OsStr::new("-c"), OsStr::new("echo listing; exit 3")])
            .unwrap();
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout_text().trim(), "listing");
    }

    #[cfg(unix)]
    #[test]
    fn slow_tools_are_killed() {
        let runner = SystemRunner::new(Duration::from_millis(100));
        let started = Instant::now();
        let err = runner
            .run("sh", &[OsStr::new("-c"), OsStr::new("exec sleep 5")])
            .unwrap_err();
        assert!(matches!(err, ContainerError::Process(m) if m.contains("timed out")));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn recording_runner_replays_in_order() {
        let runner = RecordingRunner::with_outputs(vec![ok_output("a"), ok_output("b")]);
        assert_eq!(runner.run("7z", &[]).unwrap().stdout_text(), "a");
        assert_eq!(runner.run("7z", &[OsStr::new("l")]).unwrap().stdout_text(), "b");
        assert!(runner.run("7z", &[]).is_err());
        assert_eq!(runner.get_calls()[1], vec!["7z", "l"]);
    }
}
