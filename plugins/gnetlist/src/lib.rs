//! Driver for the gEDA gnetlist schematic converter.
//!
//! Converts a schematic file to a SPICE netlist with the `spice-sdb`
//! backend. The converter marks its failures on stderr with a prefix of its
//! own, distinct from the simulator's.

use std::path::Path;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use wavescope::error::Result;
use wavescope::exec::{self, DiagnosticSource, OutputEncoding, ToolSpec};

pub const DEFAULT_BINARY: &str = "gnetlist";
pub const DEFAULT_BACKEND: &str = "spice-sdb";
/// The converter's conventional stderr failure prefix.
pub const ERROR_MARKER: &str = "ERROR:";

/// Configuration for converter invocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct GnetlistOpts {
    /// Executable name or path.
    #[builder(setter(into), default = "DEFAULT_BINARY.to_string()")]
    pub binary: String,
    /// Netlist backend passed to `-g`.
    #[builder(setter(into), default = "DEFAULT_BACKEND.to_string()")]
    pub backend: String,
    /// Stderr prefix marking converter-reported failures.
    #[builder(setter(into), default = "ERROR_MARKER.to_string()")]
    pub error_marker: String,
    #[builder(default)]
    pub encoding: OutputEncoding,
}

impl GnetlistOpts {
    #[inline]
    pub fn builder() -> GnetlistOptsBuilder {
        GnetlistOptsBuilder::default()
    }
}

impl Default for GnetlistOpts {
    fn default() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
            backend: DEFAULT_BACKEND.to_string(),
            error_marker: ERROR_MARKER.to_string(),
            encoding: OutputEncoding::default(),
        }
    }
}

/// The converter driver.
#[derive(Debug, Clone, Default)]
pub struct Gnetlist {
    opts: GnetlistOpts,
}

impl Gnetlist {
    pub fn new(opts: GnetlistOpts) -> Self {
        Self { opts }
    }

    fn tool_spec(&self, schematic: &Path, netlist: &Path) -> ToolSpec {
        ToolSpec {
            program: self.opts.binary.clone(),
            args: vec![
                "-g".to_string(),
                self.opts.backend.clone(),
                "-o".to_string(),
                netlist.to_string_lossy().into_owned(),
                "--".to_string(),
                schematic.to_string_lossy().into_owned(),
            ],
            cwd: netlist
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map(Path::to_path_buf),
            error_marker: self.opts.error_marker.clone(),
            source: DiagnosticSource::Converter,
            encoding: self.opts.encoding,
        }
    }

    /// Converts the schematic into a netlist written at `netlist`.
    ///
    /// Blocks until the converter exits; classified stderr failures surface
    /// as [`wavescope::error::ErrorSource::ToolDiagnostics`].
    pub fn convert(&self, schematic: impl AsRef<Path>, netlist: impl AsRef<Path>) -> Result<()> {
        let spec = self.tool_spec(schematic.as_ref(), netlist.as_ref());
        exec::run(&spec)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use wavescope::error::ErrorSource;

    use super::*;

    #[test]
    fn tool_spec_uses_the_backend_and_netlist_directory() {
        let driver = Gnetlist::default();
        let spec = driver.tool_spec(
            Path::new("designs/amp.sch"),
            Path::new("designs/out/amp.net"),
        );
        assert_eq!(spec.program, "gnetlist");
        assert_eq!(
            spec.args,
            vec![
                "-g",
                "spice-sdb",
                "-o",
                "designs/out/amp.net",
                "--",
                "designs/amp.sch"
            ]
        );
        assert_eq!(spec.cwd, Some(PathBuf::from("designs/out")));
        assert_eq!(spec.error_marker, "ERROR:");
        assert_eq!(spec.source, DiagnosticSource::Converter);
    }

    #[test]
    fn bare_netlist_name_runs_in_the_current_directory() {
        let spec = Gnetlist::default().tool_spec(Path::new("amp.sch"), Path::new("amp.net"));
        assert!(spec.cwd.is_none());
    }

    #[test]
    fn opts_are_configurable() {
        let opts = GnetlistOpts::builder()
            .binary("lepton-netlist")
            .backend("spice-noqsi")
            .build()
            .unwrap();
        let spec = Gnetlist::new(opts).tool_spec(Path::new("a.sch"), Path::new("a.net"));
        assert_eq!(spec.program, "lepton-netlist");
        assert_eq!(spec.args[1], "spice-noqsi");
    }

    #[test]
    fn missing_converter_fails_to_launch() {
        let opts = GnetlistOpts::builder()
            .binary("wavescope-no-such-converter")
            .build()
            .unwrap();
        let err = Gnetlist::new(opts)
            .convert(Path::new("a.sch"), Path::new("a.net"))
            .unwrap_err();
        assert!(matches!(err.source(), ErrorSource::Launch { .. }));
    }

    #[test]
    #[ignore = "requires an installed gnetlist"]
    fn converts_a_schematic_end_to_end() {
        let dir = tempdir::TempDir::new("gnetlist-e2e").unwrap();
        let netlist = dir.path().join("out.net");
        Gnetlist::default()
            .convert(Path::new("demos/rc.sch"), &netlist)
            .unwrap();
        assert!(netlist.exists());
    }
}
