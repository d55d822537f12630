//! Driver for the external Ngspice simulator.
//!
//! Runs the simulator in batch mode against a netlist file, classifies its
//! stderr diagnostics, and parses the report it writes beside the netlist.
//! Both a blocking call and a cancellable background run are provided; in
//! the background case, parsing the report stays an explicit caller step so
//! that "did the tool run" and "is the output well-formed" remain separate
//! questions.

use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use wavescope::error::{ErrorSource, Result};
use wavescope::exec::{
    self, Diagnostic, DiagnosticReport, DiagnosticSource, ExecHandle, ExecStatus, Outcome,
    OutputEncoding, ToolSpec,
};
use wavescope::simulation::SimulationData;

pub mod output;
#[cfg(test)]
mod tests;

pub use output::{parse, parse_file, OutputError};

pub const DEFAULT_BINARY: &str = "ngspice";
/// The simulator's conventional stderr failure prefix.
pub const ERROR_MARKER: &str = "Error:";
pub const FLAGS_ENV_VAR: &str = "NGSPICE_FLAGS";

/// Configuration for simulator invocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct NgspiceOpts {
    /// Executable name or path.
    #[builder(setter(into), default = "DEFAULT_BINARY.to_string()")]
    pub binary: String,
    /// Stderr prefix marking simulator-reported failures.
    #[builder(setter(into), default = "ERROR_MARKER.to_string()")]
    pub error_marker: String,
    #[builder(default)]
    pub encoding: OutputEncoding,
    /// Extra flags placed before the fixed argument list. `None` falls back
    /// to the `NGSPICE_FLAGS` environment variable.
    #[builder(default, setter(strip_option))]
    pub flags: Option<Vec<String>>,
}

impl NgspiceOpts {
    #[inline]
    pub fn builder() -> NgspiceOptsBuilder {
        NgspiceOptsBuilder::default()
    }
}

impl Default for NgspiceOpts {
    fn default() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
            error_marker: ERROR_MARKER.to_string(),
            encoding: OutputEncoding::default(),
            flags: None,
        }
    }
}

/// The simulator driver. Stateless; one instance may serve any number of
/// consecutive runs.
#[derive(Debug, Clone, Default)]
pub struct Ngspice {
    opts: NgspiceOpts,
}

impl Ngspice {
    pub fn new(opts: NgspiceOpts) -> Self {
        Self { opts }
    }

    /// Where the simulator writes its report for the given netlist.
    ///
    /// The file is left in place after a run; cleanup is the caller's
    /// responsibility.
    pub fn output_path(netlist: impl AsRef<Path>) -> PathBuf {
        let mut path = netlist.as_ref().as_os_str().to_os_string();
        path.push(".out");
        PathBuf::from(path)
    }

    fn flags(&self) -> Vec<String> {
        match &self.opts.flags {
            Some(flags) => flags.clone(),
            None => match std::env::var(FLAGS_ENV_VAR) {
                Ok(flags) => flags.split_whitespace().map(str::to_string).collect(),
                Err(_) => Vec::new(),
            },
        }
    }

    fn tool_spec(&self, netlist: &Path) -> ToolSpec {
        let output = Self::output_path(netlist);
        let mut args = self.flags();
        args.push("-b".to_string());
        args.push("-o".to_string());
        args.push(output.to_string_lossy().into_owned());
        args.push(netlist.to_string_lossy().into_owned());
        ToolSpec {
            program: self.opts.binary.clone(),
            args,
            cwd: None,
            error_marker: self.opts.error_marker.clone(),
            source: DiagnosticSource::Simulator,
            encoding: self.opts.encoding,
        }
    }

    /// Runs the simulator on the netlist and parses its report.
    ///
    /// Blocks until the simulator exits. The exit status is ignored in
    /// favor of marker scanning; runner and parser failures propagate
    /// unchanged.
    pub fn simulate(&self, netlist: impl AsRef<Path>) -> Result<SimulationData> {
        let netlist = netlist.as_ref();
        exec::run(&self.tool_spec(netlist))?;
        output::parse_file(Self::output_path(netlist))
    }

    /// Starts the simulator without blocking the calling thread.
    ///
    /// At most one run is in flight per returned [`Simulation`] handle.
    pub fn simulate_async(&self, netlist: impl AsRef<Path>) -> Result<Simulation> {
        let netlist = netlist.as_ref();
        let handle = exec::spawn(&self.tool_spec(netlist))?;
        Ok(Simulation {
            handle,
            output_path: Self::output_path(netlist),
        })
    }
}

/// A simulator run supervised by its worker thread.
#[derive(Debug)]
pub struct Simulation {
    handle: ExecHandle,
    output_path: PathBuf,
}

impl Simulation {
    /// Blocks until the run completes or is cancelled.
    pub fn wait(&mut self) -> &Outcome {
        self.handle.wait()
    }

    /// Non-blocking completion check.
    pub fn poll(&mut self) -> Option<&Outcome> {
        self.handle.poll()
    }

    pub fn status(&mut self) -> ExecStatus {
        self.handle.status()
    }

    /// Requests termination of the simulator; idempotent.
    pub fn cancel(&self) {
        self.handle.cancel()
    }

    /// Classified simulator error lines of a completed run.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.handle.diagnostics()
    }

    #[inline]
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Parses the report of a completed run.
    ///
    /// Call after observing completion; the parse never happens on the
    /// worker thread. Fails with [`ErrorSource::Cancelled`] on a cancelled
    /// run and with [`ErrorSource::ToolDiagnostics`] when the simulator
    /// reported errors.
    pub fn read_output(&mut self) -> Result<SimulationData> {
        match self.handle.status() {
            ExecStatus::Running => {
                Err(ErrorSource::Internal("simulation is still running".to_string()).into())
            }
            ExecStatus::Cancelled => Err(ErrorSource::Cancelled.into()),
            ExecStatus::Completed => {
                let diagnostics = self.handle.diagnostics();
                if !diagnostics.is_empty() {
                    return Err(ErrorSource::ToolDiagnostics(DiagnosticReport {
                        diagnostics: diagnostics.to_vec(),
                    })
                    .into());
                }
                output::parse_file(&self.output_path)
            }
        }
    }
}
