use std::fs::File;
use std::io::Write;
use std::os::unix::prelude::PermissionsExt;
use std::path::{Path, PathBuf};

use tempdir::TempDir;

use wavescope::error::ErrorSource;
use wavescope::exec::{DiagnosticSource, ExecStatus, Outcome};
use wavescope::simulation::AnalysisKind;

use crate::{Ngspice, NgspiceOpts, DEFAULT_BINARY, ERROR_MARKER};

const CANNED_REPORT: &str = "Circuit: stub circuit

stub circuit
Transient Analysis  Mon Jun  8 23:05:46 2015
--------------------------------------------------------------------------------
Index   time            v(out)
--------------------------------------------------------------------------------
0\t0.0\t1.0
1\t1e-3\t0.9
";

/// Installs an executable stub standing in for the simulator binary.
fn install_stub(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    let mut file = File::create(&path).unwrap();
    file.write_all(body.as_bytes()).unwrap();
    let mut perms = file.metadata().unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// A stub that writes the canned report to the `-o` argument, like the real
/// simulator does.
fn reporting_stub(dir: &Path) -> PathBuf {
    let body = format!("#!/bin/sh\ncat <<'EOF' > \"$3\"\n{CANNED_REPORT}EOF\n");
    install_stub(dir, "fake-ngspice", &body)
}

fn stub_opts(binary: &Path) -> NgspiceOpts {
    NgspiceOpts::builder()
        .binary(binary.to_string_lossy().into_owned())
        .flags(Vec::new())
        .build()
        .unwrap()
}

fn write_netlist(dir: &Path) -> PathBuf {
    let path = dir.join("stub.cir");
    std::fs::write(&path, "stub circuit\nR1 in out 1k\n.end\n").unwrap();
    path
}

#[test]
fn output_path_sits_beside_the_netlist() {
    assert_eq!(
        Ngspice::output_path(Path::new("work/rc.cir")),
        PathBuf::from("work/rc.cir.out")
    );
}

#[test]
fn tool_spec_uses_the_fixed_argument_list() {
    let driver = Ngspice::new(
        NgspiceOpts::builder()
            .flags(vec!["-n".to_string()])
            .build()
            .unwrap(),
    );
    let spec = driver.tool_spec(Path::new("rc.cir"));
    assert_eq!(spec.program, DEFAULT_BINARY);
    assert_eq!(spec.args, vec!["-n", "-b", "-o", "rc.cir.out", "rc.cir"]);
    assert_eq!(spec.error_marker, ERROR_MARKER);
    assert_eq!(spec.source, DiagnosticSource::Simulator);
    assert!(spec.cwd.is_none());
}

#[test]
fn default_opts_use_the_conventional_binary_and_marker() {
    let opts = NgspiceOpts::default();
    assert_eq!(opts.binary, "ngspice");
    assert_eq!(opts.error_marker, "Error:");
    assert!(opts.flags.is_none());
}

#[test]
fn simulate_runs_the_tool_and_parses_its_report() {
    let dir = TempDir::new("ngspice-stub").unwrap();
    let stub = reporting_stub(dir.path());
    let netlist = write_netlist(dir.path());

    let data = Ngspice::new(stub_opts(&stub)).simulate(&netlist).unwrap();
    assert_eq!(data.circuit_name, "stub circuit");
    assert_eq!(data.analysis, AnalysisKind::Transient);
    assert_eq!(data.row_count(), 2);
    // The report stays beside the netlist.
    assert!(Ngspice::output_path(&netlist).exists());
}

#[test]
fn async_run_completes_and_parses_on_demand() {
    let dir = TempDir::new("ngspice-stub").unwrap();
    let stub = reporting_stub(dir.path());
    let netlist = write_netlist(dir.path());

    let mut simulation = Ngspice::new(stub_opts(&stub))
        .simulate_async(&netlist)
        .unwrap();
    assert!(matches!(simulation.wait(), Outcome::Completed(_)));
    let data = simulation.read_output().unwrap();
    assert_eq!(data.series_named("v(out)").unwrap().len(), 2);
}

#[test]
fn cancelled_run_never_yields_data() {
    let dir = TempDir::new("ngspice-stub").unwrap();
    let stub = install_stub(dir.path(), "slow-ngspice", "#!/bin/sh\nexec sleep 30\n");
    let netlist = write_netlist(dir.path());

    let mut simulation = Ngspice::new(stub_opts(&stub))
        .simulate_async(&netlist)
        .unwrap();
    assert_eq!(simulation.status(), ExecStatus::Running);
    simulation.cancel();
    assert!(matches!(simulation.wait(), Outcome::Cancelled));
    assert_eq!(simulation.status(), ExecStatus::Cancelled);
    let err = simulation.read_output().unwrap_err();
    assert!(matches!(err.source(), ErrorSource::Cancelled));
}

#[test]
fn simulator_error_lines_fail_the_run() {
    let dir = TempDir::new("ngspice-stub").unwrap();
    let stub = install_stub(
        dir.path(),
        "failing-ngspice",
        "#!/bin/sh\necho 'Error: unknown model nmos4' 1>&2\nexit 1\n",
    );
    let netlist = write_netlist(dir.path());

    let err = Ngspice::new(stub_opts(&stub))
        .simulate(&netlist)
        .unwrap_err();
    match err.source() {
        ErrorSource::ToolDiagnostics(report) => {
            assert_eq!(report.diagnostics.len(), 1);
            assert_eq!(report.diagnostics[0].source, DiagnosticSource::Simulator);
            assert!(report.diagnostics[0].line.contains("unknown model"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
#[ignore = "requires an installed ngspice"]
fn vdivider_end_to_end() {
    let dir = TempDir::new("ngspice-e2e").unwrap();
    let netlist = dir.path().join("vdivider.cir");
    std::fs::write(
        &netlist,
        "voltage divider\n\
         V1 in 0 DC 5\n\
         R1 in out 1k\n\
         R2 out 0 1k\n\
         .dc V1 0 5 0.5\n\
         .print dc v(out)\n\
         .end\n",
    )
    .unwrap();

    let data = Ngspice::default().simulate(&netlist).unwrap();
    assert_eq!(data.analysis, AnalysisKind::DcTransfer);
    assert!(data.row_count() > 0);
}
