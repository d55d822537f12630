//! Execution of external tools.
//!
//! A [`ToolSpec`] describes one invocation: program, arguments, working
//! directory, the stderr prefix that marks a tool-reported failure, and how
//! captured output is decoded. [`run`] blocks until the tool exits;
//! [`spawn`] hands the invocation to a dedicated worker thread and returns
//! an [`ExecHandle`] whose completion arrives as a single tagged
//! [`Outcome`]: `Completed` with the full [`Execution`] record, or
//! `Cancelled`.

use std::fmt::Display;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;

use derive_builder::Builder;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorSource, Result};
use crate::log::warn;

/// Which tool a classified diagnostic came from.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum DiagnosticSource {
    Simulator,
    Converter,
}

/// One stderr line recognized as a tool-reported failure.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub line: String,
    pub source: DiagnosticSource,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub diagnostics: Vec<Diagnostic>,
}

impl Display for DiagnosticReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "tool reported {} error line(s):\n{}",
            self.diagnostics.len(),
            self.diagnostics.iter().map(|d| d.line.as_str()).join("\n")
        )
    }
}

/// How captured tool output is decoded into text.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum OutputEncoding {
    /// UTF-8, with invalid sequences replaced.
    #[default]
    Utf8Lossy,
    /// UTF-8, rejecting invalid sequences.
    Utf8,
}

impl OutputEncoding {
    /// Strict decode; only [`OutputEncoding::Utf8`] can fail.
    pub fn decode(
        &self,
        bytes: Vec<u8>,
    ) -> std::result::Result<String, std::string::FromUtf8Error> {
        match self {
            OutputEncoding::Utf8Lossy => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            OutputEncoding::Utf8 => String::from_utf8(bytes),
        }
    }

    /// Decode for contexts that cannot report failure; falls back to lossy
    /// replacement with a warning.
    pub(crate) fn decode_lossy(&self, bytes: Vec<u8>) -> String {
        match self.decode(bytes) {
            Ok(text) => text,
            Err(err) => {
                warn!("tool output is not valid UTF-8; decoding lossily");
                String::from_utf8_lossy(&err.into_bytes()).into_owned()
            }
        }
    }
}

/// Description of one external-tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct ToolSpec {
    /// Executable name or path.
    #[builder(setter(into))]
    pub program: String,
    #[builder(default)]
    pub args: Vec<String>,
    #[builder(default, setter(strip_option))]
    pub cwd: Option<PathBuf>,
    /// Prefix marking a stderr line as a tool-reported failure.
    #[builder(setter(into))]
    pub error_marker: String,
    pub source: DiagnosticSource,
    #[builder(default)]
    pub encoding: OutputEncoding,
}

impl ToolSpec {
    #[inline]
    pub fn builder() -> ToolSpecBuilder {
        ToolSpecBuilder::default()
    }

    /// The full command line, program first.
    pub fn command_line(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

/// Record of a finished tool run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub command: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub diagnostics: Vec<Diagnostic>,
}

/// How an asynchronous run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    Completed(Execution),
    Cancelled,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ExecStatus {
    Running,
    Completed,
    Cancelled,
}

/// Runs the tool and blocks until it exits.
///
/// The exit status is recorded but not treated as failure; instead stderr is
/// scanned for lines beginning with the spec's error marker, and any match
/// fails the run with [`ErrorSource::ToolDiagnostics`].
pub fn run(spec: &ToolSpec) -> Result<Execution> {
    let mut child = spawn_child(spec)?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (out, err) = drain_streams(stdout, stderr)?;
    let status = child.wait()?;

    let stdout = spec.encoding.decode(out)?;
    let stderr = spec.encoding.decode(err)?;
    let diagnostics = classify(&stderr, &spec.error_marker, spec.source);
    if !diagnostics.is_empty() {
        return Err(ErrorSource::ToolDiagnostics(DiagnosticReport { diagnostics }).into());
    }

    Ok(Execution {
        command: spec.command_line(),
        cwd: spec.cwd.clone(),
        stdout,
        stderr,
        exit_code: status.code(),
        diagnostics: Vec::new(),
    })
}

/// Spawns the tool and supervises it from a dedicated worker thread.
///
/// Spawning happens on the calling thread, so launch failures surface
/// immediately. The worker drains both output streams, reaps the child, and
/// sends exactly one [`Outcome`] before the handle can observe completion.
pub fn spawn(spec: &ToolSpec) -> Result<ExecHandle> {
    let mut child = spawn_child(spec)?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let child = Arc::new(Mutex::new(Some(child)));
    let cancel_requested = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel();

    let worker_spec = spec.clone();
    let worker_child = Arc::clone(&child);
    let worker_cancel = Arc::clone(&cancel_requested);
    thread::Builder::new()
        .name(format!("{}-worker", spec.program))
        .spawn(move || {
            let outcome = supervise(worker_spec, worker_child, worker_cancel, stdout, stderr);
            // The handle may have been dropped; nothing to report to then.
            let _ = tx.send(outcome);
        })?;

    Ok(ExecHandle {
        child,
        cancel_requested,
        rx,
        outcome: None,
    })
}

/// Handle to a run supervised by a worker thread.
///
/// At most one run is in flight per handle; the worker writes the outcome
/// exactly once.
#[derive(Debug)]
pub struct ExecHandle {
    child: Arc<Mutex<Option<Child>>>,
    cancel_requested: Arc<AtomicBool>,
    rx: Receiver<Outcome>,
    outcome: Option<Outcome>,
}

impl ExecHandle {
    /// Blocks until the run completes or is cancelled.
    pub fn wait(&mut self) -> &Outcome {
        let rx = &self.rx;
        self.outcome.get_or_insert_with(|| {
            rx.recv().unwrap_or_else(|_| {
                warn!("execution worker disappeared before reporting an outcome");
                Outcome::Cancelled
            })
        })
    }

    /// Non-blocking completion check.
    pub fn poll(&mut self) -> Option<&Outcome> {
        if self.outcome.is_none() {
            match self.rx.try_recv() {
                Ok(outcome) => self.outcome = Some(outcome),
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => {
                    warn!("execution worker disappeared before reporting an outcome");
                    self.outcome = Some(Outcome::Cancelled);
                }
            }
        }
        self.outcome.as_ref()
    }

    pub fn status(&mut self) -> ExecStatus {
        match self.poll() {
            None => ExecStatus::Running,
            Some(Outcome::Completed(_)) => ExecStatus::Completed,
            Some(Outcome::Cancelled) => ExecStatus::Cancelled,
        }
    }

    /// The finished execution record; `None` while running and for
    /// cancelled runs.
    pub fn result(&self) -> Option<&Execution> {
        match &self.outcome {
            Some(Outcome::Completed(execution)) => Some(execution),
            _ => None,
        }
    }

    /// Classified error lines of a completed run; empty until then.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.result()
            .map(|execution| execution.diagnostics.as_slice())
            .unwrap_or(&[])
    }

    /// Requests OS-level termination of the child process.
    ///
    /// Idempotent; a no-op once the run has completed. The worker still
    /// reports an outcome (`Cancelled`) after the child dies.
    pub fn cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
        if let Ok(mut guard) = self.child.lock() {
            if let Some(child) = guard.as_mut() {
                if let Err(err) = child.kill() {
                    warn!("failed to terminate child process: {}", err);
                }
            }
        }
    }
}

fn spawn_child(spec: &ToolSpec) -> Result<Child> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }
    cmd.spawn().map_err(|source| {
        ErrorSource::Launch {
            program: spec.program.clone(),
            source,
        }
        .into()
    })
}

/// Reads both streams to EOF without deadlocking on full pipe buffers.
fn drain_streams(
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
) -> std::io::Result<(Vec<u8>, Vec<u8>)> {
    thread::scope(|scope| {
        let err_reader = scope.spawn(move || {
            let mut buf = Vec::new();
            if let Some(mut stream) = stderr {
                stream.read_to_end(&mut buf)?;
            }
            Ok::<_, std::io::Error>(buf)
        });
        let mut out = Vec::new();
        if let Some(mut stream) = stdout {
            stream.read_to_end(&mut out)?;
        }
        let err = err_reader.join().map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::Other, "stderr reader panicked")
        })??;
        Ok((out, err))
    })
}

fn classify(stderr: &str, marker: &str, source: DiagnosticSource) -> Vec<Diagnostic> {
    stderr
        .lines()
        .filter(|line| line.starts_with(marker))
        .map(|line| Diagnostic {
            line: line.to_string(),
            source,
        })
        .collect()
}

/// Worker-thread body: drain, reap, report.
///
/// The child stays in its shared cell while the streams drain so `cancel`
/// can reach it; it is only taken out once both streams hit EOF.
fn supervise(
    spec: ToolSpec,
    child: Arc<Mutex<Option<Child>>>,
    cancel_requested: Arc<AtomicBool>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
) -> Outcome {
    let streams = drain_streams(stdout, stderr);
    let exit_code = reap(&child);

    if cancel_requested.load(Ordering::SeqCst) {
        return Outcome::Cancelled;
    }

    let (out, err) = match streams {
        Ok(pair) => pair,
        Err(err) => {
            warn!("failed to capture tool output: {}", err);
            (Vec::new(), Vec::new())
        }
    };
    let stdout = spec.encoding.decode_lossy(out);
    let stderr = spec.encoding.decode_lossy(err);
    let diagnostics = classify(&stderr, &spec.error_marker, spec.source);

    Outcome::Completed(Execution {
        command: spec.command_line(),
        cwd: spec.cwd.clone(),
        stdout,
        stderr,
        exit_code,
        diagnostics,
    })
}

fn reap(child: &Mutex<Option<Child>>) -> Option<i32> {
    let taken = match child.lock() {
        Ok(mut guard) => guard.take(),
        Err(_) => None,
    };
    match taken {
        Some(mut child) => match child.wait() {
            Ok(status) => status.code(),
            Err(err) => {
                warn!("failed to reap child process: {}", err);
                None
            }
        },
        None => None,
    }
}
