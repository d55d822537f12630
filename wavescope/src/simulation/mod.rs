//! The simulation data model: typed value columns recovered from a
//! simulator run, grouped under the analysis that produced them.

use std::io::Write;
use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::io;

pub mod series;

pub use series::{infer_magnitude, DataSeries, Datum, Quantity, SeriesError};

/// The category of a simulation sweep.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum AnalysisKind {
    Transient,
    Ac,
    DcTransfer,
}

impl AnalysisKind {
    /// Matches the fixed report titles the simulator prints above each
    /// result table.
    pub fn from_label(label: &str) -> Option<Self> {
        if label.starts_with("Transient Analysis") {
            Some(AnalysisKind::Transient)
        } else if label.starts_with("AC Analysis") {
            Some(AnalysisKind::Ac)
        } else if label.starts_with("DC transfer characteristic") {
            Some(AnalysisKind::DcTransfer)
        } else {
            None
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AnalysisKind::Transient => "Transient Analysis",
            AnalysisKind::Ac => "AC Analysis",
            AnalysisKind::DcTransfer => "DC transfer characteristic",
        }
    }
}

/// The results of one simulator run: an ordered set of equally long value
/// columns, exactly one of which is the sweep axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationData {
    pub circuit_name: String,
    pub analysis: AnalysisKind,
    /// The report title as printed, e.g. `"Transient Analysis"`.
    pub analysis_label: String,
    pub timestamp: NaiveDateTime,
    pub series: Vec<DataSeries>,
}

impl SimulationData {
    /// The sweep-axis column.
    pub fn independent(&self) -> Option<&DataSeries> {
        self.series.iter().find(|s| s.is_independent())
    }

    /// All plottable columns, in file order.
    pub fn dependents(&self) -> impl Iterator<Item = &DataSeries> {
        self.series.iter().filter(|s| !s.is_independent())
    }

    pub fn series_named(&self, name: &str) -> Option<&DataSeries> {
        self.series.iter().find(|s| s.name() == name)
    }

    pub fn row_count(&self) -> usize {
        self.series.first().map(DataSeries::len).unwrap_or(0)
    }

    /// Writes the series as a CSV table: one header row of column names,
    /// then the values row-major.
    pub fn to_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(self.series.iter().map(DataSeries::name))?;
        for row in 0..self.row_count() {
            writer.write_record(
                self.series
                    .iter()
                    .map(|s| s.values().get(row).map(ToString::to_string).unwrap_or_default()),
            )?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = io::create_file(path)?;
        self.to_csv(file)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn sample() -> SimulationData {
        let time = DataSeries::new("time", vec![0.0.into(), 1e-3.into()]);
        let vout = DataSeries::new("v(out)", vec![1.0.into(), 0.9.into()]);
        SimulationData {
            circuit_name: "rc".to_string(),
            analysis: AnalysisKind::Transient,
            analysis_label: "Transient Analysis".to_string(),
            timestamp: NaiveDate::from_ymd_opt(2015, 6, 8)
                .unwrap()
                .and_hms_opt(23, 5, 46)
                .unwrap(),
            series: vec![time, vout],
        }
    }

    #[test]
    fn kind_from_report_title() {
        assert_eq!(
            AnalysisKind::from_label("Transient Analysis"),
            Some(AnalysisKind::Transient)
        );
        assert_eq!(
            AnalysisKind::from_label("AC Analysis"),
            Some(AnalysisKind::Ac)
        );
        assert_eq!(
            AnalysisKind::from_label("DC transfer characteristic"),
            Some(AnalysisKind::DcTransfer)
        );
        assert_eq!(AnalysisKind::from_label("Operating point"), None);
    }

    #[test]
    fn independent_and_dependents_split() {
        let data = sample();
        assert_eq!(data.independent().map(DataSeries::name), Some("time"));
        let dependents: Vec<_> = data.dependents().map(DataSeries::name).collect();
        assert_eq!(dependents, vec!["v(out)"]);
        assert_eq!(data.row_count(), 2);
    }

    #[test]
    fn csv_has_header_and_one_line_per_row() {
        let mut buf = Vec::new();
        sample().to_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "time,v(out)");
        assert_eq!(lines[1], "0,1");
    }
}
